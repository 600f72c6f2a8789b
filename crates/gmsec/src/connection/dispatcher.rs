// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Auto-dispatch thread.
//!
//! Repeatedly asks its target to fetch and dispatch one message. Start and
//! stop are handshakes:
//!
//! ```text
//!   start():  spawn --> thread CAS Created->Running --> start latch --> true
//!                        (start gives up after the handshake timeout and
//!                         CASes Created->Stopped so a late thread exits)
//!
//!   stop():   [read+write locks] Running->Stopped --> stop latch --> join
//! ```
//!
//! Holding both connection locks while flipping the flag guarantees the
//! thread is not in the middle of a receive or a callback when `stop()`
//! starts waiting.

use crate::config::THREAD_HANDSHAKE_TIMEOUT;
use crate::sync::CountDownLatch;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// What the dispatch thread drives.
pub trait DispatchTarget: Send + Sync + 'static {
    /// Receive (bounded wait) and dispatch at most one message.
    fn auto_dispatch(&self);

    /// Run `f` while holding the target's read and write locks.
    fn with_dispatch_locks(&self, f: &mut dyn FnMut());
}

struct Worker {
    state: Arc<AtomicU8>,
    stopped: Arc<CountDownLatch>,
    handle: JoinHandle<()>,
}

/// Owner of at most one auto-dispatch thread.
#[derive(Default)]
pub struct Dispatcher {
    worker: Option<Worker>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.state.load(Ordering::Acquire) == RUNNING)
    }

    /// Spawn the thread and wait for it to report running.
    ///
    /// Returns false if a thread is already running or the handshake
    /// failed.
    pub fn start(&mut self, target: Weak<dyn DispatchTarget>) -> bool {
        self.start_with_timeout(target, THREAD_HANDSHAKE_TIMEOUT)
    }

    pub(crate) fn start_with_timeout(
        &mut self,
        target: Weak<dyn DispatchTarget>,
        timeout: Duration,
    ) -> bool {
        if self.is_running() {
            log::warn!("[Dispatcher] already running");
            return false;
        }
        // A previous thread that was asked to stop but not joined.
        if let Some(old) = self.worker.take() {
            reap(old);
        }

        let state = Arc::new(AtomicU8::new(CREATED));
        let started = Arc::new(CountDownLatch::new(1));
        let stopped = Arc::new(CountDownLatch::new(1));

        let handle = {
            let state = state.clone();
            let started = started.clone();
            let stopped = stopped.clone();
            thread::Builder::new()
                .name("gmsec-dispatcher".to_string())
                .spawn(move || run(target, &state, &started, &stopped))
        };
        let handle = match handle {
            Ok(h) => h,
            Err(e) => {
                log::error!("[Dispatcher] failed to spawn thread: {}", e);
                return false;
            }
        };

        if !started.wait_timeout(timeout)
            && state
                .compare_exchange(CREATED, STOPPED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            log::error!("[Dispatcher] thread did not start within {:?}", timeout);
            return false;
        }

        self.worker = Some(Worker {
            state,
            stopped,
            handle,
        });
        log::debug!("[Dispatcher] started");
        true
    }

    /// Ask the thread to stop; with `wait`, block until it has exited.
    ///
    /// Returns false if nothing was running or the thread failed to
    /// confirm in time. Never waits when called from the dispatch thread
    /// itself (e.g. from a subscription callback).
    pub fn stop(&mut self, target: &dyn DispatchTarget, wait: bool) -> bool {
        let Some(worker) = self.worker.take() else {
            return false;
        };
        if worker.state.load(Ordering::Acquire) != RUNNING {
            reap(worker);
            return false;
        }

        target.with_dispatch_locks(&mut || worker.state.store(STOPPED, Ordering::Release));

        let own_thread = worker.handle.thread().id() == thread::current().id();
        if !wait || own_thread {
            // The thread exits on its own at the next iteration.
            return true;
        }

        if worker.stopped.wait_timeout(THREAD_HANDSHAKE_TIMEOUT) {
            let _ = worker.handle.join();
            log::debug!("[Dispatcher] stopped");
            true
        } else {
            log::error!(
                "[Dispatcher] thread did not stop within {:?}",
                THREAD_HANDSHAKE_TIMEOUT
            );
            false
        }
    }
}

fn reap(worker: Worker) {
    worker.state.store(STOPPED, Ordering::Release);
    if worker.handle.is_finished() {
        let _ = worker.handle.join();
    }
}

fn run(
    target: Weak<dyn DispatchTarget>,
    state: &AtomicU8,
    started: &CountDownLatch,
    stopped: &CountDownLatch,
) {
    if state
        .compare_exchange(CREATED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        stopped.count_down();
        return;
    }
    started.count_down();

    while state.load(Ordering::Acquire) == RUNNING {
        match target.upgrade() {
            Some(t) => t.auto_dispatch(),
            None => break,
        }
    }

    state.store(STOPPED, Ordering::Release);
    stopped.count_down();
}
