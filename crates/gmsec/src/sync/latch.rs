// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot countdown latch.
//!
//! Used for the start/stop handshakes of the dispatcher, the async publisher
//! and the request loop, and for the "request has been sent" signal a
//! blocking `request()` waits on.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Latch that releases waiters once its count reaches zero.
#[derive(Debug)]
pub struct CountDownLatch {
    count: Mutex<u32>,
    condvar: Condvar,
}

impl CountDownLatch {
    pub fn new(count: u32) -> Self {
        Self {
            count: Mutex::new(count),
            condvar: Condvar::new(),
        }
    }

    /// Decrement the count, waking every waiter when it hits zero.
    pub fn count_down(&self) {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            if *count == 0 {
                self.condvar.notify_all();
            }
        }
    }

    pub fn count(&self) -> u32 {
        *self.count.lock()
    }

    /// Block until the count reaches zero.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.condvar.wait(&mut count);
        }
    }

    /// Block until the count reaches zero or `timeout` expires.
    ///
    /// # Returns
    /// * `true` if the latch opened
    /// * `false` on timeout
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.condvar.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}
