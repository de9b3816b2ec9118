//! Handle registry.
//!
//! Every live file session and configured device is addressed by a small
//! integer [`Handle`]. Each resource kind has its own [`HandleTable`] with its
//! own lock, so file and device handles are independent value spaces.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::GaudioError;

/// Kind of resource a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// An open audio file.
    File,
    /// A configured audio device.
    Device,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Device => f.write_str("device"),
        }
    }
}

/// Opaque identifier of a live resource.
///
/// Handles are non-negative and unique within their resource kind while the
/// resource is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(i32);

impl Handle {
    /// Wraps a raw handle value received from a host.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value for passing to a host.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Concurrent map from handle to a shared resource.
///
/// Lookups hand out `Arc` clones so a caller can keep using a resource after
/// the table lock is released. [`remove`](Self::remove) returns the stored
/// `Arc` to exactly one caller, which is then responsible for finalizing it.
pub struct HandleTable<T> {
    kind: ResourceKind,
    limit: usize,
    inner: Mutex<TableInner<T>>,
}

struct TableInner<T> {
    counter: i32,
    entries: HashMap<i32, Arc<T>>,
}

impl<T> HandleTable<T> {
    /// Creates an empty table that allows up to `i32::MAX` live handles.
    #[must_use]
    pub fn new(kind: ResourceKind) -> Self {
        Self::with_limit(kind, i32::MAX as usize)
    }

    /// Creates an empty table that allows at most `limit` live handles.
    #[must_use]
    pub fn with_limit(kind: ResourceKind, limit: usize) -> Self {
        Self {
            kind,
            limit: limit.min(i32::MAX as usize),
            inner: Mutex::new(TableInner {
                counter: 0,
                entries: HashMap::new(),
            }),
        }
    }

    /// Returns the resource kind this table holds.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Stores `resource` under a fresh handle.
    ///
    /// The counter advances before every probe and wraps from `i32::MAX` to
    /// zero; the first value not currently live is taken.
    ///
    /// # Errors
    ///
    /// Returns `RefnumExhausted` if the table already holds its limit of live
    /// handles. The resource is dropped in that case.
    pub fn allocate(&self, resource: T) -> Result<Handle, GaudioError> {
        let mut inner = self.inner.lock();
        if inner.entries.len() >= self.limit {
            return Err(GaudioError::RefnumExhausted { kind: self.kind });
        }

        loop {
            inner.counter = inner.counter.wrapping_add(1);
            if inner.counter < 0 {
                inner.counter = 0;
            }
            let candidate = inner.counter;
            if let std::collections::hash_map::Entry::Vacant(slot) = inner.entries.entry(candidate)
            {
                slot.insert(Arc::new(resource));
                return Ok(Handle(candidate));
            }
        }
    }

    /// Returns the resource stored under `handle`, if any.
    pub fn lookup(&self, handle: Handle) -> Option<Arc<T>> {
        self.inner.lock().entries.get(&handle.0).cloned()
    }

    /// Like [`lookup`](Self::lookup), but maps absence to `InvalidHandle`.
    pub fn get(&self, handle: Handle) -> Result<Arc<T>, GaudioError> {
        self.lookup(handle).ok_or(GaudioError::InvalidHandle {
            kind: self.kind,
            handle: handle.0,
        })
    }

    /// Replaces the resource under `handle` if it is live.
    ///
    /// Returns `false` and drops `resource` if the handle is not live.
    pub fn update(&self, handle: Handle, resource: T) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(&handle.0) {
            Some(slot) => {
                *slot = Arc::new(resource);
                true
            }
            None => false,
        }
    }

    /// Retires `handle` and returns its resource.
    pub fn remove(&self, handle: Handle) -> Option<Arc<T>> {
        self.inner.lock().entries.remove(&handle.0)
    }

    /// Like [`remove`](Self::remove), but maps absence to `InvalidHandle`.
    pub fn take(&self, handle: Handle) -> Result<Arc<T>, GaudioError> {
        self.remove(handle).ok_or(GaudioError::InvalidHandle {
            kind: self.kind,
            handle: handle.0,
        })
    }

    /// Returns a snapshot of the live handles.
    ///
    /// The lock is released before returning; handles created or retired
    /// afterwards are not reflected.
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self
            .inner
            .lock()
            .entries
            .keys()
            .map(|&raw| Handle(raw))
            .collect();
        handles.sort_unstable();
        handles
    }

    /// Returns the number of live handles.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if no handle is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn set_counter(&self, value: i32) {
        self.inner.lock().counter = value;
    }
}

impl<T> fmt::Debug for HandleTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("kind", &self.kind)
            .field("live", &self.len())
            .finish()
    }
}
