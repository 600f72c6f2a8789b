// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection core shared by every [`Connection`] handle.
//!
//! # Locks
//!
//! | Lock                | Held by                                        |
//! |---------------------|------------------------------------------------|
//! | `read_lock`         | `receive()`, each auto-dispatch iteration      |
//! | `write_lock`        | `publish()`, `reply()`, request transmission,  |
//! |                     | async worker deliveries, `connect()`           |
//! | both (read, write)  | dispatcher stop                                |
//! | `subscribe_lock`    | `subscribe()`, `unsubscribe()`                 |
//!
//! Both are reentrant so callbacks running on the dispatch thread may
//! publish and reply. Lock order is always read before write.
//!
//! The dispatcher, async publisher and request thread slots are short-lived
//! locks: a handle is cloned or taken out before anything blocks on it.

use super::async_publisher::{AsyncPublisher, PublishSink};
use super::callback::{Callback, EventCallback, ReplyCallback};
use super::dispatcher::{DispatchTarget, Dispatcher};
use super::event::Event;
use super::interface::{ConnectionInterface, MiddlewareListener};
use super::request::{
    resolve_republish, resolve_timeout, PendingRequest, RequestOptions, RequestOutcome,
    RequestSink, RequestThread,
};
use super::{Connection, ConnectionState, ConnectionStats, SubscriptionInfo};
use crate::bolt::BoltConnection;
use crate::config::{
    Config, ConnectionConfig, AUTO_DISPATCH_POLL, REPLY_UNIQUE_ID_FIELD, THREAD_HANDSHAKE_TIMEOUT,
    WAIT_FOREVER,
};
use crate::error::{Error, Result};
use crate::message::{Message, MessageKind};
use crate::status::{Status, StatusClass, StatusCode};
use crate::subject;
use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

static CONNECTION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Build the adapter named by `mw-id`.
pub(crate) fn create_middleware(config: &ConnectionConfig) -> Result<Arc<dyn ConnectionInterface>> {
    match config.mw_id.as_str() {
        "bolt" => Ok(Arc::new(BoltConnection::new(config))),
        other => Err(Error::InvalidConfig(format!(
            "unsupported middleware '{}'",
            other
        ))),
    }
}

struct Registration {
    id: u64,
    callback: Option<Callback>,
}

struct SubscriptionEntry {
    pattern: String,
    registrations: Vec<Registration>,
}

/// The lazily started request thread.
///
/// `closing` is raised by `disconnect()` before the thread is taken out and
/// cleared by the next `connect()`; no thread is started while it is set.
#[derive(Default)]
struct RequestSlot {
    thread: Option<RequestThread>,
    closing: bool,
}

/// Traffic counters for one connection.
#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    received: AtomicU64,
    requests: AtomicU64,
    replies: AtomicU64,
}

pub(crate) struct InternalConnection {
    id: u64,
    name: Mutex<String>,
    config: ConnectionConfig,
    raw_config: Config,
    mw: Arc<dyn ConnectionInterface>,
    state: Mutex<ConnectionState>,
    read_lock: ReentrantMutex<()>,
    write_lock: ReentrantMutex<()>,
    subscriptions: Mutex<Vec<SubscriptionEntry>>,
    next_registration: AtomicU64,
    event_callbacks: DashMap<Event, EventCallback>,
    excluded: Mutex<Vec<String>>,
    dispatcher: Mutex<Dispatcher>,
    async_publisher: Mutex<Option<Arc<AsyncPublisher>>>,
    request_slot: Mutex<RequestSlot>,
    subscribe_lock: Mutex<()>,
    counters: Counters,
    self_ref: Weak<InternalConnection>,
}

impl InternalConnection {
    pub(crate) fn new(
        raw_config: Config,
        config: ConnectionConfig,
        mw: Arc<dyn ConnectionInterface>,
    ) -> Arc<InternalConnection> {
        let id = CONNECTION_SEQ.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new_cyclic(|weak: &Weak<InternalConnection>| {
            let listener: Weak<dyn MiddlewareListener> = weak.clone();
            mw.attach(listener);
            InternalConnection {
                id,
                name: Mutex::new(format!("Connection-{}", id)),
                config,
                raw_config,
                mw,
                state: Mutex::new(ConnectionState::NotConnected),
                read_lock: ReentrantMutex::new(()),
                write_lock: ReentrantMutex::new(()),
                subscriptions: Mutex::new(Vec::new()),
                next_registration: AtomicU64::new(1),
                event_callbacks: DashMap::new(),
                excluded: Mutex::new(Vec::new()),
                dispatcher: Mutex::new(Dispatcher::new()),
                async_publisher: Mutex::new(None),
                request_slot: Mutex::new(RequestSlot::default()),
                subscribe_lock: Mutex::new(()),
                counters: Counters::default(),
                self_ref: weak.clone(),
            }
        });
        log::debug!(
            "[Connection] {} created ({})",
            conn.name(),
            conn.mw.library_version()
        );
        conn
    }

    fn handle(&self) -> Option<Connection> {
        self.self_ref.upgrade().map(|inner| Connection { inner })
    }

    // ========================================================================
    // Identity
    // ========================================================================

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.lock() = name.to_string();
    }

    pub(crate) fn config(&self) -> &Config {
        &self.raw_config
    }

    pub(crate) fn connection_config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub(crate) fn middleware(&self) -> &Arc<dyn ConnectionInterface> {
        &self.mw
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn check_connected(&self) -> Result<()> {
        match self.state() {
            ConnectionState::NotConnected => Err(Error::NotConnected),
            _ => Ok(()),
        }
    }

    pub(crate) fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            published: self.counters.published.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            requests: self.counters.requests.load(Ordering::Relaxed),
            replies: self.counters.replies.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub(crate) fn connect(&self) -> Result<()> {
        let _w = self.write_lock.lock();
        if self.state() != ConnectionState::NotConnected {
            return Err(Error::AlreadyConnected);
        }

        self.mw.mw_connect()?;
        *self.state.lock() = ConnectionState::Connected;
        self.request_slot.lock().closing = false;

        if self.config.async_publish {
            let sink = Arc::new(ConnectionPublisher {
                mw: self.mw.clone(),
                connection: self.self_ref.clone(),
            });
            match AsyncPublisher::start(sink, self.config.async_queue_depth) {
                Ok(publisher) => *self.async_publisher.lock() = Some(Arc::new(publisher)),
                Err(e) => {
                    let _ = self.mw.mw_disconnect();
                    *self.state.lock() = ConnectionState::NotConnected;
                    return Err(e);
                }
            }
        }

        log::info!(
            "[Connection] {} connected to {}",
            self.name(),
            self.mw.connection_endpoint()
        );
        Ok(())
    }

    pub(crate) fn disconnect(&self) -> Result<()> {
        if self.state() == ConnectionState::NotConnected {
            log::debug!("[Connection] {} already disconnected", self.name());
            return Ok(());
        }

        let mut dispatcher = std::mem::take(&mut *self.dispatcher.lock());
        dispatcher.stop(self, true);

        // Both slots are unlocked before their threads are stopped.
        let requests = {
            let mut slot = self.request_slot.lock();
            slot.closing = true;
            slot.thread.take()
        };
        if let Some(mut requests) = requests {
            requests.stop();
        }
        let publisher = self.async_publisher.lock().take();
        if let Some(publisher) = publisher {
            publisher.stop(self.config.async_teardown_wait);
        }

        let result = {
            let _w = self.write_lock.lock();
            self.mw.mw_disconnect()
        };
        *self.state.lock() = ConnectionState::NotConnected;
        self.subscriptions.lock().clear();
        log::info!("[Connection] {} disconnected", self.name());
        result
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub(crate) fn subscribe(
        &self,
        pattern: &str,
        config: &Config,
        callback: Option<Callback>,
    ) -> Result<SubscriptionInfo> {
        self.check_connected()?;
        subject::validate_pattern(pattern)?;

        // Serializes the registry check with the middleware call.
        let _s = self.subscribe_lock.lock();
        let known = {
            let subs = self.subscriptions.lock();
            match subs.iter().find(|e| e.pattern == pattern) {
                None => false,
                Some(entry) => {
                    let duplicate = match &callback {
                        None => true,
                        Some(cb) => entry
                            .registrations
                            .iter()
                            .any(|r| r.callback.as_ref().is_some_and(|c| Arc::ptr_eq(c, cb))),
                    };
                    if duplicate {
                        return Err(Error::DuplicateSubscription(pattern.to_string()));
                    }
                    true
                }
            }
        };

        if !known {
            self.mw.mw_subscribe(pattern, config)?;
        }

        let id = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let registration = Registration { id, callback };
        let mut subs = self.subscriptions.lock();
        match subs.iter_mut().find(|e| e.pattern == pattern) {
            Some(entry) => entry.registrations.push(registration),
            None => subs.push(SubscriptionEntry {
                pattern: pattern.to_string(),
                registrations: vec![registration],
            }),
        }
        log::debug!("[Connection] {} subscribed to {}", self.name(), pattern);
        Ok(SubscriptionInfo {
            pattern: pattern.to_string(),
            id,
        })
    }

    pub(crate) fn unsubscribe(&self, info: &SubscriptionInfo) -> Result<()> {
        self.check_connected()?;
        let _s = self.subscribe_lock.lock();
        let now_unused = {
            let mut subs = self.subscriptions.lock();
            let pos = subs
                .iter()
                .position(|e| e.pattern == info.pattern && e.registrations.iter().any(|r| r.id == info.id))
                .ok_or_else(|| Error::NotSubscribed(info.pattern.clone()))?;
            subs[pos].registrations.retain(|r| r.id != info.id);
            if subs[pos].registrations.is_empty() {
                subs.remove(pos);
                true
            } else {
                false
            }
        };
        if now_unused {
            self.mw.mw_unsubscribe(&info.pattern)?;
            log::debug!("[Connection] {} unsubscribed from {}", self.name(), info.pattern);
        }
        Ok(())
    }

    pub(crate) fn subscription_patterns(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .iter()
            .map(|e| e.pattern.clone())
            .collect()
    }

    pub(crate) fn exclude_subject(&self, pattern: &str) -> Result<()> {
        subject::validate_pattern(pattern)?;
        let mut excluded = self.excluded.lock();
        if !excluded.iter().any(|p| p == pattern) {
            excluded.push(pattern.to_string());
        }
        Ok(())
    }

    pub(crate) fn remove_excluded_subject(&self, pattern: &str) -> bool {
        let mut excluded = self.excluded.lock();
        let before = excluded.len();
        excluded.retain(|p| p != pattern);
        before != excluded.len()
    }

    fn is_excluded(&self, subject: &str) -> bool {
        self.excluded
            .lock()
            .iter()
            .any(|p| subject::matches(p, subject))
    }

    // ========================================================================
    // Publish / Request / Reply
    // ========================================================================

    pub(crate) fn publish(&self, message: &Message, config: &Config) -> Result<()> {
        self.check_connected()?;
        if message.kind() != MessageKind::Publish {
            return Err(Error::InvalidMessage(format!(
                "cannot publish a {} message",
                message.kind()
            )));
        }
        subject::validate_subject(message.subject())?;

        let publisher = self.async_publisher.lock().clone();
        if let Some(publisher) = publisher.filter(|p| !p.is_current()) {
            publisher.enqueue(message.clone(), config.clone())?;
            return Ok(());
        }

        let _w = self.write_lock.lock();
        self.mw.mw_publish(message, config)?;
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn publish_queue_len(&self) -> usize {
        self.async_publisher
            .lock()
            .as_ref()
            .map_or(0, |p| p.queued())
    }

    fn check_request(&self, request: &Message) -> Result<()> {
        self.check_connected()?;
        if request.kind() != MessageKind::Request {
            return Err(Error::InvalidMessage(format!(
                "cannot issue a {} message as a request",
                request.kind()
            )));
        }
        subject::validate_subject(request.subject())
    }

    /// Start the request thread on first use and hand it `pending`.
    fn track(&self, pending: PendingRequest) -> Result<()> {
        let mut slot = self.request_slot.lock();
        if slot.closing {
            return Err(Error::NotConnected);
        }
        if slot.thread.is_none() {
            let sink: Weak<dyn RequestSink> = self.self_ref.clone();
            let options = RequestOptions {
                strip_correlation_field: self.config.remove_tracking_fields,
            };
            slot.thread = Some(RequestThread::start(sink, options)?);
        }
        match slot.thread.as_ref() {
            Some(thread) => thread.add(pending),
            None => Err(Error::Shutdown),
        }
    }

    fn on_request_thread(&self) -> bool {
        self.request_slot
            .lock()
            .thread
            .as_ref()
            .is_some_and(RequestThread::is_current)
    }

    fn tag_request(&self, request: &Message) -> (Message, String) {
        let id = self.mw.mw_unique_id();
        let mut tagged = request.clone();
        tagged.set_field(REPLY_UNIQUE_ID_FIELD, id.as_str());
        (tagged, id)
    }

    pub(crate) fn request(
        &self,
        request: &Message,
        timeout_ms: i32,
        republish_ms: i32,
    ) -> Result<Option<Message>> {
        self.check_request(request)?;
        if self.on_request_thread() {
            return Err(Error::InvalidState(
                "blocking request issued from a reply callback".to_string(),
            ));
        }

        let (tagged, id) = self.tag_request(request);
        let (pending, rx) = PendingRequest::blocking(
            tagged,
            id,
            resolve_timeout(timeout_ms),
            resolve_republish(republish_ms, self.config.default_republish_ms),
        );
        self.track(pending)?;
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        match rx.recv() {
            Ok(RequestOutcome::Reply(reply)) => {
                self.counters.replies.fetch_add(1, Ordering::Relaxed);
                Ok(Some(reply))
            }
            Ok(RequestOutcome::TimedOut) => Ok(None),
            Ok(RequestOutcome::Failed(reason)) => Err(Error::RequestFailed(reason)),
            Err(_) => Err(Error::Shutdown),
        }
    }

    pub(crate) fn request_with_callback(
        &self,
        request: &Message,
        timeout_ms: i32,
        callback: Arc<dyn ReplyCallback>,
        republish_ms: i32,
    ) -> Result<String> {
        self.check_request(request)?;

        let (tagged, id) = self.tag_request(request);
        let pending = PendingRequest::with_callback(
            tagged,
            id.as_str(),
            resolve_timeout(timeout_ms),
            resolve_republish(republish_ms, self.config.default_republish_ms),
            self.config.multi_response,
            callback,
        );
        let sent = pending.send_status();
        self.track(pending)?;
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        if !self.on_request_thread() {
            sent.wait(THREAD_HANDSHAKE_TIMEOUT)?;
        }
        Ok(id)
    }

    pub(crate) fn cancel_request(&self, id: &str) {
        if let Some(thread) = self.request_slot.lock().thread.as_ref() {
            thread.cancel(id);
        }
    }

    pub(crate) fn pending_requests(&self) -> usize {
        self.request_slot
            .lock()
            .thread
            .as_ref()
            .map_or(0, RequestThread::pending)
    }

    pub(crate) fn reply(&self, request: &Message, reply: &Message) -> Result<()> {
        self.check_connected()?;
        if request.kind() != MessageKind::Request {
            return Err(Error::InvalidMessage(
                "reply() needs the original request".to_string(),
            ));
        }
        if reply.kind() != MessageKind::Reply {
            return Err(Error::InvalidMessage(format!(
                "cannot send a {} message as a reply",
                reply.kind()
            )));
        }
        subject::validate_subject(reply.subject())?;
        let id = request.string_value(REPLY_UNIQUE_ID_FIELD).ok_or_else(|| {
            Error::InvalidMessage(format!("request carries no {}", REPLY_UNIQUE_ID_FIELD))
        })?;

        let mut tagged = reply.clone();
        tagged.set_field(REPLY_UNIQUE_ID_FIELD, id);
        let _w = self.write_lock.lock();
        self.mw.mw_reply(request, &tagged)
    }

    // ========================================================================
    // Receive / Dispatch
    // ========================================================================

    pub(crate) fn receive(&self, timeout_ms: i32) -> Result<Option<Message>> {
        self.check_connected()?;
        if self.dispatcher.lock().is_running() {
            return Err(Error::AutoDispatchActive);
        }
        let timeout = if timeout_ms == WAIT_FOREVER || timeout_ms < 0 {
            None
        } else {
            Some(Duration::from_millis(timeout_ms as u64))
        };
        let _r = self.read_lock.lock();
        self.next_message(timeout)
    }

    /// Receive, skipping excluded subjects, within one overall timeout.
    fn next_message(&self, timeout: Option<Duration>) -> Result<Option<Message>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            match self.mw.mw_receive(remaining)? {
                Some(message) if self.is_excluded(message.subject()) => {
                    log::trace!("[Connection] dropping excluded {}", message.subject());
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Ok(None);
                    }
                }
                Some(message) => {
                    self.counters.received.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(message));
                }
                None => return Ok(None),
            }
        }
    }

    /// Invoke every subscription callback whose pattern matches.
    pub(crate) fn dispatch(&self, message: &Message) {
        let callbacks: Vec<Callback> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|e| subject::matches(&e.pattern, message.subject()))
            .flat_map(|e| e.registrations.iter().filter_map(|r| r.callback.clone()))
            .collect();
        if callbacks.is_empty() {
            return;
        }
        let Some(connection) = self.handle() else {
            return;
        };
        for callback in callbacks {
            callback(&connection, message);
        }
    }

    pub(crate) fn start_auto_dispatch(&self) -> Result<bool> {
        self.check_connected()?;
        let target: Weak<dyn DispatchTarget> = self.self_ref.clone();
        Ok(self.dispatcher.lock().start(target))
    }

    pub(crate) fn stop_auto_dispatch(&self, wait: bool) -> Result<bool> {
        let mut dispatcher = std::mem::take(&mut *self.dispatcher.lock());
        Ok(dispatcher.stop(self, wait))
    }

    pub(crate) fn is_auto_dispatching(&self) -> bool {
        self.dispatcher.lock().is_running()
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub(crate) fn register_event_callback(&self, event: Event, callback: EventCallback) {
        self.event_callbacks.insert(event, callback);
    }

    pub(crate) fn unregister_event_callback(&self, event: Event) -> bool {
        self.event_callbacks.remove(&event).is_some()
    }

    /// Invoke the callback registered for `event`, falling back to
    /// [`Event::AllEvents`].
    pub(crate) fn dispatch_event(&self, event: Event, status: &Status) {
        if status.is_error() {
            log::warn!("[Connection] {} {}: {}", self.name(), event, status);
        } else {
            log::info!("[Connection] {} {}: {}", self.name(), event, status);
        }
        let callback = self
            .event_callbacks
            .get(&event)
            .or_else(|| self.event_callbacks.get(&Event::AllEvents))
            .map(|entry| entry.value().clone());
        if let (Some(callback), Some(connection)) = (callback, self.handle()) {
            callback(&connection, status, event);
        }
    }
}

impl Drop for InternalConnection {
    fn drop(&mut self) {
        if self.state() != ConnectionState::NotConnected {
            if let Err(e) = self.disconnect() {
                log::warn!("[Connection] {} teardown: {}", self.name(), e);
            }
        }
    }
}

// ============================================================================
// Thread-facing trait impls
// ============================================================================

impl DispatchTarget for InternalConnection {
    fn auto_dispatch(&self) {
        let guard = self.read_lock.lock();
        match self.next_message(Some(AUTO_DISPATCH_POLL)) {
            Ok(Some(message)) => self.dispatch(&message),
            Ok(None) => {}
            Err(e) => {
                drop(guard);
                self.dispatch_event(Event::DispatcherError, &Status::from(&e));
                thread::sleep(AUTO_DISPATCH_POLL);
            }
        }
    }

    fn with_dispatch_locks(&self, f: &mut dyn FnMut()) {
        let _r = self.read_lock.lock();
        let _w = self.write_lock.lock();
        f();
    }
}

impl RequestSink for InternalConnection {
    fn issue_request(&self, request: &Message, id: &str) -> Result<()> {
        let _w = self.write_lock.lock();
        self.mw.mw_request(request, id)
    }

    fn deliver_reply(&self, callback: &dyn ReplyCallback, request: &Message, reply: &Message) {
        self.counters.replies.fetch_add(1, Ordering::Relaxed);
        if let Some(connection) = self.handle() {
            callback.on_reply(&connection, request, reply);
        }
    }

    fn deliver_event(
        &self,
        callback: Option<&dyn ReplyCallback>,
        _request: &Message,
        status: &Status,
        event: Event,
    ) {
        self.dispatch_event(event, status);
        if let (Some(callback), Some(connection)) = (callback, self.handle()) {
            callback.on_event(&connection, status, event);
        }
    }
}

impl MiddlewareListener for InternalConnection {
    fn on_reply(&self, reply: Message) {
        match self.request_slot.lock().thread.as_ref() {
            Some(thread) => thread.on_reply(reply),
            None => log::debug!(
                "[Connection] {} reply on {} with no request outstanding",
                self.name(),
                reply.subject()
            ),
        }
    }

    fn on_event(&self, event: Event, status: Status) {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::NotConnected {
                match event {
                    Event::ConnectionBroken | Event::ConnectionReconnect => {
                        *state = ConnectionState::Reconnecting
                    }
                    Event::ConnectionSuccessful => *state = ConnectionState::Connected,
                    _ => {}
                }
            }
        }
        self.dispatch_event(event, &status);
    }
}

/// Async publisher sink: delivers through the middleware under the
/// connection's write lock.
struct ConnectionPublisher {
    mw: Arc<dyn ConnectionInterface>,
    connection: Weak<InternalConnection>,
}

impl PublishSink for ConnectionPublisher {
    fn publish(&self, message: &Message, config: &Config) -> Result<()> {
        match self.connection.upgrade() {
            Some(conn) => {
                let _w = conn.write_lock.lock();
                self.mw.mw_publish(message, config)?;
                conn.counters.published.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => self.mw.mw_publish(message, config),
        }
    }

    fn publish_failed(&self, message: &Message, error: &Error) {
        if let Some(conn) = self.connection.upgrade() {
            let status = Status::new(
                StatusClass::MiddlewareError,
                StatusCode::PublishFailed,
                format!("async publish of {} failed: {}", message.subject(), error),
            );
            conn.dispatch_event(Event::MsgPublishFailure, &status);
        }
    }
}
