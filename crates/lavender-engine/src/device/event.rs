use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Host-visible counter the GPU advances as submitted work retires.
///
/// The value only ever moves forward: a late signal carrying an older value
/// is ignored.
#[derive(Debug, Default)]
pub struct SharedEvent {
    value: Mutex<u64>,
    signaled: Condvar,
}

impl SharedEvent {
    pub fn new(initial: u64) -> Self {
        Self {
            value: Mutex::new(initial),
            signaled: Condvar::new(),
        }
    }

    pub fn signaled_value(&self) -> u64 {
        *self.lock()
    }

    /// Raises the value to `value` and wakes every waiter.
    pub fn signal(&self, value: u64) {
        let mut current = self.lock();
        if value > *current {
            *current = value;
        }
        drop(current);
        self.signaled.notify_all();
    }

    /// Blocks until the value reaches `target` or `timeout` elapses.
    ///
    /// Returns `true` if the value reached `target`.
    pub fn wait_until_signaled(&self, target: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut current = self.lock();
        while *current < target {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            current = match self.signaled.wait_timeout(current, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        // The guarded value is a plain integer; a panicked holder cannot leave it torn.
        self.value.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
