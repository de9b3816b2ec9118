//! Device run state shared between the application and the audio callback.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Run state of a configured device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceState {
    /// The backend device is gone.
    Uninitialized = 0,
    /// Configured but not running.
    Stopped = 1,
    /// A start request is in flight.
    Starting = 2,
    /// The device is running its callback.
    Started = 3,
    /// A stop request is in flight.
    Stopping = 4,
}

impl DeviceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Stopped,
            2 => Self::Starting,
            3 => Self::Started,
            4 => Self::Stopping,
            _ => Self::Uninitialized,
        }
    }
}

/// Counters for ring pressure observed by the callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Frames of silence played because the ring ran dry.
    pub underrun_frames: u64,
    /// Captured frames dropped because the ring was full.
    pub overflow_frames: u64,
}

/// State flag plus wakeup signal for one device.
///
/// The callback updates counters with atomics and never takes `lock`. It
/// calls [`notify`](Self::notify), which returns after one atomic load unless
/// a caller is parked in [`wait`](Self::wait). Only then does parking_lot take
/// its parking-bucket lock for the unpark, held for a few instructions.
pub struct DeviceStatus {
    state: AtomicU8,
    underrun_frames: AtomicU64,
    overflow_frames: AtomicU64,
    waiters: AtomicUsize,
    lock: Mutex<()>,
    signal: Condvar,
}

impl DeviceStatus {
    /// Creates a status in the [`DeviceState::Stopped`] state.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(DeviceState::Stopped as u8),
            underrun_frames: AtomicU64::new(0),
            overflow_frames: AtomicU64::new(0),
            waiters: AtomicUsize::new(0),
            lock: Mutex::new(()),
            signal: Condvar::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> DeviceState {
        DeviceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Stores a new state and wakes every waiter.
    pub fn set_state(&self, state: DeviceState) {
        self.state.store(state as u8, Ordering::Release);
        self.notify();
    }

    /// Moves to `to` only if the current state is `from`.
    pub fn transition(&self, from: DeviceState, to: DeviceState) -> bool {
        let swapped = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if swapped {
            self.notify();
        }
        swapped
    }

    /// Returns `true` while the device is running or about to run.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), DeviceState::Started | DeviceState::Starting)
    }

    /// Wakes every waiter without changing state.
    ///
    /// A no-op when nobody is waiting.
    pub fn notify(&self) {
        if self.waiters.load(Ordering::SeqCst) > 0 {
            self.signal.notify_all();
        }
    }

    /// Number of callers currently parked in [`wait`](Self::wait).
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    /// Blocks until notified or `timeout` elapses.
    ///
    /// Spurious and missed wakeups are both possible; callers re-check their
    /// condition after every return.
    pub fn wait(&self, timeout: Duration) {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.lock.lock();
        self.signal.wait_for(&mut guard, timeout);
        drop(guard);
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    /// Records frames of silence padded into the output.
    pub fn record_underrun(&self, frames: usize) {
        self.underrun_frames
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Records captured frames dropped on a full ring.
    pub fn record_overflow(&self, frames: usize) {
        self.overflow_frames
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Snapshot of the pressure counters.
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
            overflow_frames: self.overflow_frames.load(Ordering::Relaxed),
        }
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStatus")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
