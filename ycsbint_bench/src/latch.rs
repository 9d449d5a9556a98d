use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

////////////////////////////////////////// CountDownLatch //////////////////////////////////////////

/// A one-shot barrier:  waiters block until `count_down` has been called `n` times.
#[derive(Debug)]
pub struct CountDownLatch {
    count: Mutex<u64>,
    cond: Condvar,
}

impl CountDownLatch {
    pub fn new(count: u64) -> Self {
        Self {
            count: Mutex::new(count),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        // A bare counter cannot be left inconsistent by a panic.
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decrement the count, waking every waiter when it reaches zero.  Extra calls are no-ops.
    pub fn count_down(&self) {
        let mut count = self.lock();
        if *count > 0 {
            *count -= 1;
            if *count == 0 {
                self.cond.notify_all();
            }
        }
    }

    pub fn count(&self) -> u64 {
        *self.lock()
    }

    /// Block until the count reaches zero.
    pub fn wait(&self) {
        let mut count = self.lock();
        while *count > 0 {
            count = self.cond.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the count reaches zero or `timeout` passes.  Returns true iff it reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.lock();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = self
                .cond
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
