// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.
//!
//! Every fallible public operation returns [`Result`]. Codec failures surface
//! as [`Error::Protocol`], [`Error::BufferUnderflow`] or
//! [`Error::BufferOverflow`]; socket failures as [`Error::IoError`].

use std::fmt;
use std::io;

/// Errors raised by the bolt codec, the middleware adapters and the
/// connection core.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A configuration value is missing or malformed.
    InvalidConfig(String),

    // ========================================================================
    // State Errors
    // ========================================================================
    /// Operation not allowed in the current connection state.
    InvalidState(String),
    /// Operation requires an established connection.
    NotConnected,
    /// `connect()` called on a connection that is already connected.
    AlreadyConnected,
    /// Manual receive attempted while the auto-dispatcher owns the inbound stream.
    AutoDispatchActive,
    /// The component is shutting down.
    Shutdown,

    // ========================================================================
    // Subject / Message Errors
    // ========================================================================
    /// Subject or subscription pattern is not well formed.
    InvalidSubject(String),
    /// The subscription pattern is already registered.
    DuplicateSubscription(String),
    /// No subscription matches the given handle or pattern.
    NotSubscribed(String),
    /// Message kind or contents are not valid for the operation.
    InvalidMessage(String),

    // ========================================================================
    // Transport / Protocol Errors
    // ========================================================================
    /// Generic I/O failure with a description.
    Io(String),
    /// I/O error with underlying cause.
    IoError(io::Error),
    /// Malformed bolt data (bad header, unknown property type, ...).
    Protocol(String),
    /// Read past the end of an input buffer.
    BufferUnderflow { needed: usize, available: usize },
    /// Write past the end of an output buffer.
    BufferOverflow { needed: usize, available: usize },

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// A bounded wait expired.
    Timeout(String),
    /// Middleware rejected the operation.
    Middleware(String),
    /// A request could not be issued.
    RequestFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::NotConnected => write!(f, "Connection has not been initialized"),
            Error::AlreadyConnected => write!(f, "Connection is already connected"),
            Error::AutoDispatchActive => {
                write!(f, "Cannot receive while the auto-dispatcher is running")
            }
            Error::Shutdown => write!(f, "Shutdown in progress"),
            Error::InvalidSubject(subject) => write!(f, "Invalid subject: {}", subject),
            Error::DuplicateSubscription(subject) => {
                write!(f, "Duplicate subscription: {}", subject)
            }
            Error::NotSubscribed(subject) => write!(f, "Not subscribed to: {}", subject),
            Error::InvalidMessage(msg) => write!(f, "Invalid message: {}", msg),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::BufferUnderflow { needed, available } => write!(
                f,
                "Buffer underflow: need {} bytes, {} available",
                needed, available
            ),
            Error::BufferOverflow { needed, available } => write!(
                f,
                "Buffer overflow: need {} bytes, {} available",
                needed, available
            ),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::Middleware(msg) => write!(f, "Middleware error: {}", msg),
            Error::RequestFailed(msg) => write!(f, "Request failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoError(e)
    }
}

impl Error {
    /// True for failures that mean the link itself is unusable.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, Error::IoError(_) | Error::Io(_) | Error::NotConnected)
    }
}

/// Crate result alias.
pub type Result<T> = std::result::Result<T, Error>;
