// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application callback types.

use super::event::Event;
use super::Connection;
use crate::message::Message;
use crate::status::Status;
use std::sync::Arc;

/// Subscription callback, invoked on the auto-dispatch thread.
pub type Callback = Arc<dyn Fn(&Connection, &Message) + Send + Sync>;

/// Connection event callback.
pub type EventCallback = Arc<dyn Fn(&Connection, &Status, Event) + Send + Sync>;

/// Receiver for the outcome of an asynchronous request.
///
/// Called from the request thread.
pub trait ReplyCallback: Send + Sync {
    fn on_reply(&self, connection: &Connection, request: &Message, reply: &Message);

    /// Request-level events such as [`Event::RequestTimeout`].
    fn on_event(&self, connection: &Connection, status: &Status, event: Event) {
        let _ = (connection, status, event);
    }
}

/// [`ReplyCallback`] built from a closure; events are ignored.
pub struct ClosureReplyCallback<F>
where
    F: Fn(&Connection, &Message, &Message) + Send + Sync,
{
    f: F,
}

impl<F> ClosureReplyCallback<F>
where
    F: Fn(&Connection, &Message, &Message) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ReplyCallback for ClosureReplyCallback<F>
where
    F: Fn(&Connection, &Message, &Message) + Send + Sync,
{
    fn on_reply(&self, connection: &Connection, request: &Message, reply: &Message) {
        (self.f)(connection, request, reply)
    }
}

/// Wrap a closure as a subscription [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Connection, &Message) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as an [`EventCallback`].
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(&Connection, &Status, Event) + Send + Sync + 'static,
{
    Arc::new(f)
}
