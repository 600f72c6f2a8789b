// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connections: publish, subscribe, request and reply over a middleware.
//!
//! # Architecture
//!
//! ```text
//!                     Connection (cloneable handle)
//!                               |
//!                      InternalConnection
//!      +-------------+----------+-----------+-----------------+
//!      |             |                      |                 |
//!  Dispatcher   AsyncPublisher        RequestThread     event callbacks
//!  (receive +   (bounded queue ->     (republish,
//!   callbacks)   mw_publish)           timeout, replies)
//!      |             |                      |
//!      +-------------+----------+-----------+
//!                               |
//!                    dyn ConnectionInterface  (e.g. bolt)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gmsec::{Config, Connection, Message, MessageKind};
//!
//! let config = Config::from_args(&["mw-id=bolt", "mw-server=127.0.0.1:9100"]);
//! let conn = Connection::new(&config)?;
//! conn.connect()?;
//! conn.subscribe("GMSEC.MISSION.>")?;
//! conn.publish(&Message::new("GMSEC.MISSION.SAT1.HB", MessageKind::Publish))?;
//! if let Some(msg) = conn.receive(1000)? {
//!     println!("{}", msg);
//! }
//! conn.disconnect()?;
//! # Ok::<(), gmsec::Error>(())
//! ```

mod async_publisher;
mod callback;
mod dispatcher;
mod event;
mod interface;
mod internal;
mod request;

pub use async_publisher::{AsyncPublisher, MessagePublishTask, PublishSink};
pub use callback::{
    callback, event_callback, Callback, ClosureReplyCallback, EventCallback, ReplyCallback,
};
pub use dispatcher::{DispatchTarget, Dispatcher};
pub use event::Event;
pub use interface::{ConnectionInterface, MiddlewareListener};
pub use request::{
    resolve_republish, resolve_timeout, wait_limit, Delivery, PendingRequest, RequestOptions,
    RequestOutcome, RequestSink, RequestThread, SendStatus,
};

use crate::config::{Config, ConnectionConfig};
use crate::error::{Error, Result};
use crate::message::Message;
use internal::InternalConnection;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state visible to the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    Connected,
    /// Link lost; the middleware is trying to restore it
    Reconnecting,
}

/// Handle returned by subscribe; pass it back to unsubscribe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pattern: String,
    id: u64,
}

impl SubscriptionInfo {
    pub fn subject_pattern(&self) -> &str {
        &self.pattern
    }
}

/// Message counters for one connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub published: u64,
    pub received: u64,
    pub requests: u64,
    pub replies: u64,
}

/// A connection to a middleware. Clones share the same connection.
///
/// Dropping the last clone disconnects.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<InternalConnection>,
}

impl Connection {
    /// Create a connection using the middleware named by `mw-id`.
    pub fn new(config: &Config) -> Result<Connection> {
        let typed = ConnectionConfig::from_config(config)?;
        let mw = internal::create_middleware(&typed)?;
        Self::build(config, typed, mw)
    }

    /// Create a connection over a caller-supplied middleware adapter.
    pub fn with_middleware(
        config: &Config,
        mw: Arc<dyn ConnectionInterface>,
    ) -> Result<Connection> {
        let typed = ConnectionConfig::from_config(config)?;
        Self::build(config, typed, mw)
    }

    fn build(
        config: &Config,
        typed: ConnectionConfig,
        mw: Arc<dyn ConnectionInterface>,
    ) -> Result<Connection> {
        typed
            .validate()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(Connection {
            inner: InternalConnection::new(config.clone(), typed, mw),
        })
    }

    pub fn connect(&self) -> Result<()> {
        self.inner.connect()
    }

    /// Stop the worker threads and close the middleware link.
    pub fn disconnect(&self) -> Result<()> {
        self.inner.disconnect()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Process-unique connection number.
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    pub fn name(&self) -> String {
        self.inner.name()
    }

    pub fn set_name(&self, name: &str) {
        self.inner.set_name(name)
    }

    pub fn config(&self) -> &Config {
        self.inner.config()
    }

    pub fn connection_config(&self) -> &ConnectionConfig {
        self.inner.connection_config()
    }

    pub fn library_root_name(&self) -> &'static str {
        self.inner.middleware().library_root_name()
    }

    pub fn library_version(&self) -> String {
        self.inner.middleware().library_version()
    }

    pub fn mw_info(&self) -> String {
        self.inner.middleware().mw_info()
    }

    pub fn connection_endpoint(&self) -> String {
        self.inner.middleware().connection_endpoint()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.inner.stats()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Subscribe for use with [`Connection::receive`].
    pub fn subscribe(&self, pattern: &str) -> Result<SubscriptionInfo> {
        self.inner.subscribe(pattern, &Config::new(), None)
    }

    /// Subscribe with a callback run by the auto-dispatcher (or by
    /// [`Connection::dispatch`]).
    pub fn subscribe_with_callback(
        &self,
        pattern: &str,
        callback: Callback,
    ) -> Result<SubscriptionInfo> {
        self.inner.subscribe(pattern, &Config::new(), Some(callback))
    }

    /// Subscribe passing middleware-specific options.
    pub fn subscribe_with_config(
        &self,
        pattern: &str,
        config: &Config,
        callback: Option<Callback>,
    ) -> Result<SubscriptionInfo> {
        self.inner.subscribe(pattern, config, callback)
    }

    pub fn unsubscribe(&self, info: &SubscriptionInfo) -> Result<()> {
        self.inner.unsubscribe(info)
    }

    /// Patterns with at least one live subscription.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.subscription_patterns()
    }

    /// Silently drop inbound messages matching `pattern`.
    pub fn exclude_subject(&self, pattern: &str) -> Result<()> {
        self.inner.exclude_subject(pattern)
    }

    pub fn remove_excluded_subject(&self, pattern: &str) -> bool {
        self.inner.remove_excluded_subject(pattern)
    }

    // ========================================================================
    // Traffic
    // ========================================================================

    pub fn publish(&self, message: &Message) -> Result<()> {
        self.inner.publish(message, &Config::new())
    }

    pub fn publish_with_config(&self, message: &Message, config: &Config) -> Result<()> {
        self.inner.publish(message, config)
    }

    /// Messages waiting in the async publish queue.
    pub fn publish_queue_len(&self) -> usize {
        self.inner.publish_queue_len()
    }

    /// Issue a request and block for its reply.
    ///
    /// Returns `Ok(None)` when `timeout_ms` expires first. A negative
    /// timeout waits forever; `republish_ms` of 0 uses the connection
    /// default, negative never republishes.
    pub fn request(
        &self,
        request: &Message,
        timeout_ms: i32,
        republish_ms: i32,
    ) -> Result<Option<Message>> {
        self.inner.request(request, timeout_ms, republish_ms)
    }

    /// Issue a request whose replies go to `callback`. Returns the
    /// correlation id once the request has been sent.
    pub fn request_with_callback(
        &self,
        request: &Message,
        timeout_ms: i32,
        callback: Arc<dyn ReplyCallback>,
        republish_ms: i32,
    ) -> Result<String> {
        self.inner
            .request_with_callback(request, timeout_ms, callback, republish_ms)
    }

    /// Stop tracking an outstanding request.
    pub fn cancel_request(&self, id: &str) {
        self.inner.cancel_request(id)
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.pending_requests()
    }

    pub fn reply(&self, request: &Message, reply: &Message) -> Result<()> {
        self.inner.reply(request, reply)
    }

    /// Next inbound message; negative `timeout_ms` waits forever.
    ///
    /// Fails with [`crate::Error::AutoDispatchActive`] while the
    /// auto-dispatcher runs.
    pub fn receive(&self, timeout_ms: i32) -> Result<Option<Message>> {
        self.inner.receive(timeout_ms)
    }

    /// Run the subscription callbacks matching `message`.
    pub fn dispatch(&self, message: &Message) {
        self.inner.dispatch(message)
    }

    pub fn start_auto_dispatch(&self) -> Result<bool> {
        self.inner.start_auto_dispatch()
    }

    pub fn stop_auto_dispatch(&self, wait: bool) -> Result<bool> {
        self.inner.stop_auto_dispatch(wait)
    }

    pub fn is_auto_dispatching(&self) -> bool {
        self.inner.is_auto_dispatching()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Register `callback` for `event` ([`Event::AllEvents`] catches every
    /// event without a dedicated callback).
    pub fn register_event_callback(&self, event: Event, callback: EventCallback) {
        self.inner.register_event_callback(event, callback)
    }

    pub fn unregister_event_callback(&self, event: Event) -> bool {
        self.inner.unregister_event_callback(event)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id())
            .field("name", &self.inner.name())
            .field("state", &self.inner.state())
            .finish()
    }
}
