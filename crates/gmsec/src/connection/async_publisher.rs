// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background publisher fed by a bounded queue.
//!
//! `publish()` on an async connection enqueues a copy of the message and
//! returns; the worker drains the queue in order. A full queue blocks the
//! caller. On shutdown the worker keeps draining until the queue is empty,
//! unless the teardown wait expires first, in which case the remaining
//! messages are abandoned.

use crate::config::{Config, ASYNC_POLL_INTERVAL};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::sync::CountDownLatch;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// Where the worker delivers messages.
pub trait PublishSink: Send + Sync {
    fn publish(&self, message: &Message, config: &Config) -> Result<()>;

    /// A queued message could not be delivered.
    fn publish_failed(&self, message: &Message, error: &Error);
}

/// One queued publish.
#[derive(Debug, Clone)]
pub struct MessagePublishTask {
    pub message: Message,
    pub config: Config,
}

struct PublisherShared {
    keep_alive: AtomicBool,
    hard_kill: AtomicBool,
    done: CountDownLatch,
    published: AtomicU64,
    failed: AtomicU64,
}

/// Async publish queue plus its worker thread.
///
/// Shared behind an `Arc` by the connection: producers may block in
/// [`enqueue`](Self::enqueue) without holding any connection lock.
pub struct AsyncPublisher {
    tx: Sender<MessagePublishTask>,
    shared: Arc<PublisherShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    worker: ThreadId,
}

impl AsyncPublisher {
    /// Start a worker with a queue of `depth` messages.
    pub fn start(sink: Arc<dyn PublishSink>, depth: usize) -> Result<AsyncPublisher> {
        let (tx, rx) = channel::bounded(depth.max(1));
        let shared = Arc::new(PublisherShared {
            keep_alive: AtomicBool::new(true),
            hard_kill: AtomicBool::new(false),
            done: CountDownLatch::new(1),
            published: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let handle = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("gmsec-async-publisher".to_string())
                .spawn(move || {
                    run(&rx, sink.as_ref(), &shared);
                    shared.done.count_down();
                })
                .map_err(|e| Error::Io(format!("failed to spawn async publisher: {}", e)))?
        };

        log::debug!("[AsyncPublisher] started (queue depth {})", depth);
        Ok(AsyncPublisher {
            tx,
            shared,
            worker: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a message, blocking while the queue is full.
    pub fn enqueue(&self, message: Message, config: Config) -> Result<()> {
        if !self.shared.keep_alive.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        self.tx
            .send(MessagePublishTask { message, config })
            .map_err(|_| Error::Shutdown)
    }

    /// True on the worker thread (inside a publish-failure callback).
    pub fn is_current(&self) -> bool {
        self.worker == thread::current().id()
    }

    /// Messages waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    pub fn published(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.shared.failed.load(Ordering::Relaxed)
    }

    /// Drain and stop. Returns false if the worker had to be abandoned
    /// after `teardown_wait`.
    pub fn stop(&self, teardown_wait: Duration) -> bool {
        let Some(handle) = self.handle.lock().take() else {
            return true;
        };
        self.shared.keep_alive.store(false, Ordering::Release);

        if self.is_current() {
            return true;
        }

        if self.shared.done.wait_timeout(teardown_wait) {
            let _ = handle.join();
            log::debug!("[AsyncPublisher] stopped");
            true
        } else {
            self.shared.hard_kill.store(true, Ordering::Release);
            log::warn!(
                "[AsyncPublisher] abandoning {} queued message(s) after {:?}",
                self.tx.len(),
                teardown_wait
            );
            false
        }
    }
}

impl Drop for AsyncPublisher {
    fn drop(&mut self) {
        if self.handle.get_mut().is_some() {
            self.stop(crate::config::DEFAULT_ASYNC_TEARDOWN_WAIT);
        }
    }
}

fn run(rx: &Receiver<MessagePublishTask>, sink: &dyn PublishSink, shared: &PublisherShared) {
    loop {
        if shared.hard_kill.load(Ordering::Acquire) {
            break;
        }
        if !shared.keep_alive.load(Ordering::Acquire) && rx.is_empty() {
            break;
        }
        let task = match rx.recv_timeout(ASYNC_POLL_INTERVAL) {
            Ok(task) => task,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match sink.publish(&task.message, &task.config) {
            Ok(()) => {
                shared.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "[AsyncPublisher] failed to publish {}: {}",
                    task.message.subject(),
                    e
                );
                sink.publish_failed(&task.message, &e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    #[derive(Default)]
    struct RecordingSink {
        subjects: Mutex<Vec<String>>,
        failures: Mutex<Vec<String>>,
        delay: Duration,
        fail_on: Option<String>,
    }

    impl PublishSink for RecordingSink {
        fn publish(&self, message: &Message, _config: &Config) -> Result<()> {
            thread::sleep(self.delay);
            if self.fail_on.as_deref() == Some(message.subject()) {
                return Err(Error::Middleware("rejected".into()));
            }
            self.subjects.lock().push(message.subject().to_string());
            Ok(())
        }

        fn publish_failed(&self, message: &Message, _error: &Error) {
            self.failures.lock().push(message.subject().to_string());
        }
    }

    fn msg(i: usize) -> Message {
        Message::new(format!("GMSEC.ASYNC.M{}", i), MessageKind::Publish)
    }

    #[test]
    fn test_drains_in_order_on_stop() {
        let sink = Arc::new(RecordingSink {
            delay: Duration::from_millis(1),
            ..Default::default()
        });
        let publisher = AsyncPublisher::start(sink.clone(), 100).unwrap();
        for i in 0..50 {
            publisher.enqueue(msg(i), Config::new()).unwrap();
        }
        assert!(publisher.stop(Duration::from_secs(5)));

        let subjects = sink.subjects.lock();
        assert_eq!(subjects.len(), 50);
        for (i, s) in subjects.iter().enumerate() {
            assert_eq!(*s, format!("GMSEC.ASYNC.M{}", i));
        }
        assert_eq!(publisher.published(), 50);
        assert!(matches!(
            publisher.enqueue(msg(99), Config::new()),
            Err(Error::Shutdown)
        ));
    }

    #[test]
    fn test_full_queue_blocks_producer() {
        let sink = Arc::new(RecordingSink {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let publisher = AsyncPublisher::start(sink.clone(), 2).unwrap();
        let start = std::time::Instant::now();
        for i in 0..6 {
            publisher.enqueue(msg(i), Config::new()).unwrap();
        }
        // At least a few deliveries had to complete before the last enqueue.
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(publisher.queued() <= 2);
        assert!(publisher.stop(Duration::from_secs(5)));
        assert_eq!(sink.subjects.lock().len(), 6);
    }

    #[test]
    fn test_failures_reported() {
        let sink = Arc::new(RecordingSink {
            fail_on: Some("GMSEC.ASYNC.M1".into()),
            ..Default::default()
        });
        let publisher = AsyncPublisher::start(sink.clone(), 10).unwrap();
        for i in 0..3 {
            publisher.enqueue(msg(i), Config::new()).unwrap();
        }
        assert!(publisher.stop(Duration::from_secs(5)));
        assert_eq!(*sink.failures.lock(), vec!["GMSEC.ASYNC.M1".to_string()]);
        assert_eq!(publisher.failed(), 1);
        assert_eq!(publisher.published(), 2);
    }

    #[test]
    fn test_teardown_wait_abandons_backlog() {
        let sink = Arc::new(RecordingSink {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let publisher = AsyncPublisher::start(sink.clone(), 100).unwrap();
        for i in 0..40 {
            publisher.enqueue(msg(i), Config::new()).unwrap();
        }
        assert!(!publisher.stop(Duration::from_millis(100)));
        thread::sleep(Duration::from_millis(150));
        assert!(sink.subjects.lock().len() < 40);
    }
}
