// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request tracking: republish, timeout and reply correlation.
//!
//! All pending requests are owned by one thread. Callers talk to it through
//! a channel of [`Signal`]s; nothing else touches the pending list.
//!
//! ```text
//!   request() ----Request----> +-------------------------+
//!   on_reply() --ReceiveReply->|  gmsec-request thread   |--issue_request()--> middleware
//!   cancel() -----Cancel-----> |  pending: Vec<Pending>  |--deliver_reply()--> callback / waiter
//!   stop() -------Quit-------> +-------------------------+--deliver_event()--> RequestTimeout
//! ```
//!
//! Each iteration sleeps until the earliest republish or expiry instant
//! (between 10 ms and 60 s), then:
//! 1. matches queued replies by correlation id and delivers them,
//! 2. expires requests past their deadline (terminal, even when
//!    republishing),
//! 3. (re)sends requests whose publish time has come.

use super::callback::ReplyCallback;
use super::event::Event;
use crate::config::{
    MIN_REPUBLISH_MS, MIN_TIMEOUT_MS, REPLY_UNIQUE_ID_FIELD, REQUEST_WAIT_LIMIT_MS,
    RESPONSE_STATUS_FIELD, THREAD_HANDSHAKE_TIMEOUT,
};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::status::{Status, StatusClass, StatusCode};
use crate::sync::CountDownLatch;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Shortest sleep of the request loop.
const MIN_WAIT: Duration = Duration::from_millis(MIN_TIMEOUT_MS as u64);

/// Response status values that end a multi-response exchange
/// (successful completion, failed completion, invalid request, final message).
const FINAL_RESPONSE_STATUS: std::ops::RangeInclusive<i32> = 3..=6;

// ============================================================================
// Parameter resolution
// ============================================================================

/// Request timeout: negative waits forever, small values are raised to
/// [`MIN_TIMEOUT_MS`].
pub fn resolve_timeout(timeout_ms: i32) -> Option<Duration> {
    if timeout_ms < 0 {
        None
    } else {
        Some(Duration::from_millis(timeout_ms.max(MIN_TIMEOUT_MS) as u64))
    }
}

/// Republish interval: `0` selects `default_ms`, negative never republishes,
/// positive values are raised to [`MIN_REPUBLISH_MS`].
pub fn resolve_republish(republish_ms: i32, default_ms: i32) -> Option<Duration> {
    let ms = if republish_ms == 0 { default_ms } else { republish_ms };
    if ms <= 0 {
        None
    } else {
        Some(Duration::from_millis(ms.max(MIN_REPUBLISH_MS) as u64))
    }
}

// ============================================================================
// PendingRequest
// ============================================================================

/// Result handed to a blocking `request()` caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Reply(Message),
    TimedOut,
    Failed(String),
}

/// Where a request's reply goes.
pub enum Delivery {
    Callback(Arc<dyn ReplyCallback>),
    Waiter(Sender<RequestOutcome>),
}

/// Completion signal for a request's first transmission.
#[derive(Debug)]
pub struct SendStatus {
    latch: CountDownLatch,
    error: Mutex<Option<String>>,
}

impl SendStatus {
    fn new() -> Self {
        Self {
            latch: CountDownLatch::new(1),
            error: Mutex::new(None),
        }
    }

    fn complete(&self, error: Option<String>) {
        *self.error.lock() = error;
        self.latch.count_down();
    }

    /// Wait for the first transmission attempt.
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        if !self.latch.wait_timeout(timeout) {
            return Err(Error::Timeout("request was not sent in time".to_string()));
        }
        match self.error.lock().clone() {
            None => Ok(()),
            Some(reason) => Err(Error::RequestFailed(reason)),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.latch.count() == 0
    }
}

/// One outstanding request.
pub struct PendingRequest {
    pub(crate) request: Message,
    pub(crate) id: String,
    pub(crate) need_to_send: bool,
    pub(crate) never_expire: bool,
    pub(crate) publish_time: Instant,
    pub(crate) expire_time: Instant,
    pub(crate) republish: Option<Duration>,
    pub(crate) delivery: Delivery,
    pub(crate) sent_once: bool,
    pub(crate) is_done: bool,
    pub(crate) multi_response: bool,
    pub(crate) sent: Arc<SendStatus>,
    pub(crate) reply: Option<Message>,
    pub(crate) transmissions: u32,
}

impl PendingRequest {
    fn new(
        request: Message,
        id: String,
        timeout: Option<Duration>,
        republish: Option<Duration>,
        multi_response: bool,
        delivery: Delivery,
    ) -> Self {
        let now = Instant::now();
        Self {
            request,
            id,
            need_to_send: true,
            never_expire: timeout.is_none(),
            publish_time: now,
            expire_time: now + timeout.unwrap_or(Duration::ZERO),
            republish,
            delivery,
            sent_once: false,
            is_done: false,
            multi_response,
            sent: Arc::new(SendStatus::new()),
            reply: None,
            transmissions: 0,
        }
    }

    /// Request whose replies go to `callback`.
    pub fn with_callback(
        request: Message,
        id: impl Into<String>,
        timeout: Option<Duration>,
        republish: Option<Duration>,
        multi_response: bool,
        callback: Arc<dyn ReplyCallback>,
    ) -> Self {
        Self::new(
            request,
            id.into(),
            timeout,
            republish,
            multi_response,
            Delivery::Callback(callback),
        )
    }

    /// Request with a blocked caller waiting on the returned receiver.
    pub fn blocking(
        request: Message,
        id: impl Into<String>,
        timeout: Option<Duration>,
        republish: Option<Duration>,
    ) -> (Self, Receiver<RequestOutcome>) {
        let (tx, rx) = channel::bounded(1);
        let pending = Self::new(
            request,
            id.into(),
            timeout,
            republish,
            false,
            Delivery::Waiter(tx),
        );
        (pending, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn send_status(&self) -> Arc<SendStatus> {
        self.sent.clone()
    }

    /// Next instant this request needs attention, if any.
    fn next_deadline(&self) -> Option<Instant> {
        if self.is_done {
            return None;
        }
        let publish = self.need_to_send.then_some(self.publish_time);
        let expire = (!self.never_expire).then_some(self.expire_time);
        match (publish, expire) {
            (Some(p), Some(e)) => Some(p.min(e)),
            (p, e) => p.or(e),
        }
    }
}

// ============================================================================
// Request loop
// ============================================================================

/// What the request loop calls back into (the owning connection).
pub trait RequestSink: Send + Sync {
    fn issue_request(&self, request: &Message, id: &str) -> Result<()>;

    fn deliver_reply(&self, callback: &dyn ReplyCallback, request: &Message, reply: &Message);

    /// Report a request-level event; `callback` is the request's own
    /// callback when it has one.
    fn deliver_event(
        &self,
        callback: Option<&dyn ReplyCallback>,
        request: &Message,
        status: &Status,
        event: Event,
    );
}

/// Messages understood by the request thread.
pub enum Signal {
    Quit,
    /// Handshake: the thread is under management
    Managed,
    Request(Box<PendingRequest>),
    ReceiveReply(Message),
    Cancel(String),
}

/// Request loop settings.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestOptions {
    /// Remove the correlation field from replies handed to the application
    pub strip_correlation_field: bool,
}

/// Sleep until the earliest deadline, clamped to `[10 ms, 60 s]`.
pub fn wait_limit(pending: &[PendingRequest], now: Instant) -> Duration {
    let limit = Duration::from_millis(REQUEST_WAIT_LIMIT_MS);
    pending
        .iter()
        .filter_map(PendingRequest::next_deadline)
        .min()
        .map_or(limit, |deadline| {
            deadline.saturating_duration_since(now).clamp(MIN_WAIT, limit)
        })
}

fn timeout_status() -> Status {
    Status::new(
        StatusClass::RequestError,
        StatusCode::TimeoutOccurred,
        "Request timed out waiting for a reply",
    )
}

struct RequestLoop {
    sink: Weak<dyn RequestSink>,
    options: RequestOptions,
    pending: Vec<PendingRequest>,
    replies: Vec<Message>,
    count: Arc<AtomicUsize>,
}

impl RequestLoop {
    fn run(mut self, rx: &Receiver<Signal>, managed: &CountDownLatch) {
        loop {
            let wait = wait_limit(&self.pending, Instant::now());
            match rx.recv_timeout(wait) {
                Ok(Signal::Quit) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(signal) => {
                    self.accept(signal, managed);
                    // Take everything already queued before doing work.
                    while let Ok(signal) = rx.try_recv() {
                        if matches!(signal, Signal::Quit) {
                            self.finish();
                            return;
                        }
                        self.accept(signal, managed);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            let Some(sink) = self.sink.upgrade() else {
                break;
            };
            self.deliver_replies(sink.as_ref());
            self.send_requests(sink.as_ref(), Instant::now());
            self.pending.retain(|p| !p.is_done);
            self.count.store(self.pending.len(), Ordering::Relaxed);
        }
        self.finish();
    }

    fn accept(&mut self, signal: Signal, managed: &CountDownLatch) {
        match signal {
            Signal::Managed => managed.count_down(),
            Signal::Request(request) => {
                log::trace!("[Request] tracking {}", request.id);
                self.pending.push(*request);
            }
            Signal::ReceiveReply(reply) => self.replies.push(reply),
            Signal::Cancel(id) => {
                for p in self.pending.iter_mut().filter(|p| p.id == id) {
                    log::debug!("[Request] {} cancelled", id);
                    p.is_done = true;
                    if let Delivery::Waiter(tx) = &p.delivery {
                        let _ = tx.try_send(RequestOutcome::Failed("cancelled".to_string()));
                    }
                }
            }
            Signal::Quit => {}
        }
    }

    fn finish(&mut self) {
        for p in self.pending.drain(..) {
            if let Delivery::Waiter(tx) = &p.delivery {
                let _ = tx.try_send(RequestOutcome::Failed("connection shutting down".to_string()));
            }
            if !p.sent.is_sent() {
                p.sent.complete(Some("connection shutting down".to_string()));
            }
        }
        self.count.store(0, Ordering::Relaxed);
        log::debug!("[Request] thread exiting");
    }

    fn deliver_replies(&mut self, sink: &dyn RequestSink) {
        for mut reply in std::mem::take(&mut self.replies) {
            let Some(id) = reply.string_value(REPLY_UNIQUE_ID_FIELD) else {
                log::debug!("[Request] reply on {} has no correlation id", reply.subject());
                continue;
            };
            let Some(p) = self.pending.iter_mut().find(|p| p.id == id && !p.is_done) else {
                log::debug!("[Request] no pending request for reply {}", id);
                continue;
            };

            if self.options.strip_correlation_field {
                reply.clear_field(REPLY_UNIQUE_ID_FIELD);
            }
            let more = p.multi_response
                && !reply
                    .i32_value(RESPONSE_STATUS_FIELD)
                    .is_some_and(|s| FINAL_RESPONSE_STATUS.contains(&s));

            match &p.delivery {
                Delivery::Callback(cb) => sink.deliver_reply(cb.as_ref(), &p.request, &reply),
                Delivery::Waiter(tx) => {
                    let _ = tx.try_send(RequestOutcome::Reply(reply.clone()));
                }
            }
            p.reply = Some(reply);
            if !more || matches!(p.delivery, Delivery::Waiter(_)) {
                p.is_done = true;
            }
        }
    }

    fn send_requests(&mut self, sink: &dyn RequestSink, now: Instant) {
        for p in self.pending.iter_mut().filter(|p| !p.is_done) {
            if p.sent_once && !p.never_expire && now >= p.expire_time {
                log::info!("[Request] {} timed out after {} send(s)", p.id, p.transmissions);
                p.is_done = true;
                let status = timeout_status();
                match &p.delivery {
                    Delivery::Callback(cb) => sink.deliver_event(
                        Some(cb.as_ref()),
                        &p.request,
                        &status,
                        Event::RequestTimeout,
                    ),
                    Delivery::Waiter(tx) => {
                        let _ = tx.try_send(RequestOutcome::TimedOut);
                        sink.deliver_event(None, &p.request, &status, Event::RequestTimeout);
                    }
                }
                continue;
            }

            if !p.need_to_send || now < p.publish_time {
                continue;
            }

            match sink.issue_request(&p.request, &p.id) {
                Ok(()) => {
                    p.transmissions += 1;
                    if !p.sent_once {
                        p.sent_once = true;
                        p.sent.complete(None);
                    }
                    match p.republish {
                        Some(interval) => p.publish_time = now + interval,
                        None => p.need_to_send = false,
                    }
                }
                Err(e) if !p.sent_once => {
                    log::warn!("[Request] {} could not be sent: {}", p.id, e);
                    p.is_done = true;
                    p.sent.complete(Some(e.to_string()));
                    if let Delivery::Waiter(tx) = &p.delivery {
                        let _ = tx.try_send(RequestOutcome::Failed(e.to_string()));
                    }
                }
                Err(e) => {
                    log::warn!("[Request] republish of {} failed: {}", p.id, e);
                    match p.republish {
                        Some(interval) => p.publish_time = now + interval,
                        None => p.need_to_send = false,
                    }
                }
            }
        }
    }
}

// ============================================================================
// RequestThread
// ============================================================================

/// Handle onto the running request thread.
pub struct RequestThread {
    tx: Sender<Signal>,
    count: Arc<AtomicUsize>,
    stopped: Arc<CountDownLatch>,
    handle: Option<JoinHandle<()>>,
}

impl RequestThread {
    /// Spawn the loop and wait until it is managed.
    pub fn start(sink: Weak<dyn RequestSink>, options: RequestOptions) -> Result<RequestThread> {
        let (tx, rx) = channel::unbounded();
        let count = Arc::new(AtomicUsize::new(0));
        let managed = Arc::new(CountDownLatch::new(1));
        let stopped = Arc::new(CountDownLatch::new(1));

        let handle = {
            let request_loop = RequestLoop {
                sink,
                options,
                pending: Vec::new(),
                replies: Vec::new(),
                count: count.clone(),
            };
            let managed = managed.clone();
            let stopped = stopped.clone();
            thread::Builder::new()
                .name("gmsec-request".to_string())
                .spawn(move || {
                    request_loop.run(&rx, &managed);
                    stopped.count_down();
                })
                .map_err(|e| Error::Io(format!("failed to spawn request thread: {}", e)))?
        };

        tx.send(Signal::Managed).map_err(|_| Error::Shutdown)?;
        if !managed.wait_timeout(THREAD_HANDSHAKE_TIMEOUT) {
            let _ = tx.send(Signal::Quit);
            return Err(Error::Timeout("request thread did not start".to_string()));
        }
        log::debug!("[Request] thread started");
        Ok(RequestThread {
            tx,
            count,
            stopped,
            handle: Some(handle),
        })
    }

    pub fn add(&self, request: PendingRequest) -> Result<()> {
        self.tx
            .send(Signal::Request(Box::new(request)))
            .map_err(|_| Error::Shutdown)
    }

    /// Hand an inbound reply to the loop for correlation.
    pub fn on_reply(&self, reply: Message) {
        if self.tx.send(Signal::ReceiveReply(reply)).is_err() {
            log::debug!("[Request] reply arrived after shutdown");
        }
    }

    pub fn cancel(&self, id: &str) {
        let _ = self.tx.send(Signal::Cancel(id.to_string()));
    }

    /// True when called from the request thread itself (e.g. inside a
    /// reply callback).
    pub fn is_current(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.thread().id() == thread::current().id())
    }

    /// Requests still tracked after the last loop iteration.
    pub fn pending(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Stop the loop; pending blocking callers receive a failure.
    pub fn stop(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let _ = self.tx.send(Signal::Quit);
        if handle.thread().id() == thread::current().id() {
            return true;
        }
        if self.stopped.wait_timeout(THREAD_HANDSHAKE_TIMEOUT) {
            let _ = handle.join();
            true
        } else {
            log::error!("[Request] thread did not stop in time");
            false
        }
    }
}

impl Drop for RequestThread {
    fn drop(&mut self) {
        self.stop();
    }
}
