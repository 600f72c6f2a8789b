// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Middleware adapter contract.
//!
//! The connection core owns all threading, locking and request tracking; an
//! adapter only moves messages to and from one middleware. Adapters push
//! asynchronous traffic (replies, link events) back through the
//! [`MiddlewareListener`] handed to [`ConnectionInterface::attach`].
//!
//! ```text
//!   InternalConnection ---mw_*()---> ConnectionInterface (e.g. BoltConnection)
//!          ^                                   |
//!          +------ on_reply / on_event --------+
//! ```

use super::event::Event;
use crate::config::Config;
use crate::error::Result;
use crate::message::Message;
use crate::status::Status;
use std::sync::Weak;
use std::time::Duration;

/// Receiver of adapter-originated traffic.
pub trait MiddlewareListener: Send + Sync {
    /// A REPLY arrived for some outstanding request.
    fn on_reply(&self, reply: Message);

    /// The adapter observed a link event.
    fn on_event(&self, event: Event, status: Status);
}

/// Operations every middleware adapter provides.
///
/// All methods take `&self`; the connection core serializes calls with its
/// own read/write locks.
pub trait ConnectionInterface: Send + Sync {
    /// Short adapter name, e.g. `gmsec_bolt`.
    fn library_root_name(&self) -> &'static str;

    fn library_version(&self) -> String;

    /// Middleware description for diagnostics.
    fn mw_info(&self) -> String;

    /// Endpoint currently (or last) connected to.
    fn connection_endpoint(&self) -> String;

    /// Register the connection that receives replies and events.
    fn attach(&self, listener: Weak<dyn MiddlewareListener>);

    /// Unique id for correlating one request with its replies.
    fn mw_unique_id(&self) -> String;

    fn mw_connect(&self) -> Result<()>;

    fn mw_disconnect(&self) -> Result<()>;

    fn mw_subscribe(&self, subject: &str, config: &Config) -> Result<()>;

    fn mw_unsubscribe(&self, subject: &str) -> Result<()>;

    fn mw_publish(&self, message: &Message, config: &Config) -> Result<()>;

    /// Transmit a request already tagged with its correlation `id`.
    fn mw_request(&self, request: &Message, id: &str) -> Result<()>;

    /// Transmit `reply`, which already carries the request's correlation id.
    fn mw_reply(&self, request: &Message, reply: &Message) -> Result<()>;

    /// Next inbound message. `None` timeout blocks until one arrives or the
    /// link closes; `Ok(None)` means nothing arrived in time.
    fn mw_receive(&self, timeout: Option<Duration>) -> Result<Option<Message>>;
}
