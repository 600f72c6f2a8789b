// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection events reported to registered event callbacks.

use std::fmt;

/// Notable things that happen to a connection outside of normal traffic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Middleware link established (or re-established)
    ConnectionSuccessful,
    /// Middleware link lost
    ConnectionBroken,
    /// A reconnect attempt started
    ConnectionReconnect,
    /// Middleware reported a failure not tied to one operation
    ConnectionException,
    /// The auto-dispatcher could not fetch or deliver a message
    DispatcherError,
    /// A request expired without a (final) reply
    RequestTimeout,
    /// The async publisher failed to deliver a message
    MsgPublishFailure,
    /// Registration key matching every event without its own callback
    AllEvents,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::ConnectionSuccessful => "CONNECTION_SUCCESSFUL_EVENT",
            Event::ConnectionBroken => "CONNECTION_BROKEN_EVENT",
            Event::ConnectionReconnect => "CONNECTION_RECONNECT_EVENT",
            Event::ConnectionException => "CONNECTION_EXCEPTION_EVENT",
            Event::DispatcherError => "DISPATCHER_ERROR_EVENT",
            Event::RequestTimeout => "REQUEST_TIMEOUT_EVENT",
            Event::MsgPublishFailure => "MSG_PUBLISH_FAILURE_EVENT",
            Event::AllEvents => "ALL_EVENTS",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
