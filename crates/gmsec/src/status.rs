// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Operation status reported to event callbacks.

use crate::error::Error;
use std::fmt;

/// Broad category of a [`Status`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StatusClass {
    #[default]
    NoError,
    ConnectionError,
    ConfigError,
    MiddlewareError,
    MsgError,
    DispatcherError,
    RequestError,
}

/// Specific condition inside a [`StatusClass`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StatusCode {
    #[default]
    NoErrorCode,
    ConnectionConnected,
    ConnectionLost,
    ConnectionReconnect,
    NotConnected,
    AlreadyConnected,
    InvalidConfig,
    InvalidSubjectName,
    DuplicateSubscription,
    NotSubscribed,
    InvalidMessage,
    AutodispatchActive,
    TimeoutOccurred,
    ShutdownInProgress,
    IoFailure,
    ProtocolFailure,
    RequestFailed,
    PublishFailed,
    Other,
}

/// Outcome descriptor passed alongside connection events.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub class: StatusClass,
    pub code: StatusCode,
    pub reason: String,
    pub custom_code: i32,
}

impl Status {
    pub fn new(class: StatusClass, code: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            class,
            code,
            reason: reason.into(),
            custom_code: 0,
        }
    }

    /// Status carrying no error.
    pub fn ok(reason: impl Into<String>) -> Self {
        Self::new(StatusClass::NoError, StatusCode::NoErrorCode, reason)
    }

    pub fn with_custom_code(mut self, custom_code: i32) -> Self {
        self.custom_code = custom_code;
        self
    }

    pub fn is_error(&self) -> bool {
        self.class != StatusClass::NoError
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?},{:?},{}] : {}",
            self.class, self.code, self.custom_code, self.reason
        )
    }
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        let (class, code) = match err {
            Error::InvalidConfig(_) => (StatusClass::ConfigError, StatusCode::InvalidConfig),
            Error::InvalidState(_) => (StatusClass::ConnectionError, StatusCode::Other),
            Error::NotConnected => (StatusClass::ConnectionError, StatusCode::NotConnected),
            Error::AlreadyConnected => {
                (StatusClass::ConnectionError, StatusCode::AlreadyConnected)
            }
            Error::AutoDispatchActive => (
                StatusClass::ConnectionError,
                StatusCode::AutodispatchActive,
            ),
            Error::Shutdown => (
                StatusClass::ConnectionError,
                StatusCode::ShutdownInProgress,
            ),
            Error::InvalidSubject(_) => {
                (StatusClass::ConnectionError, StatusCode::InvalidSubjectName)
            }
            Error::DuplicateSubscription(_) => (
                StatusClass::ConnectionError,
                StatusCode::DuplicateSubscription,
            ),
            Error::NotSubscribed(_) => (StatusClass::ConnectionError, StatusCode::NotSubscribed),
            Error::InvalidMessage(_) => (StatusClass::MsgError, StatusCode::InvalidMessage),
            Error::Io(_) | Error::IoError(_) => {
                (StatusClass::MiddlewareError, StatusCode::IoFailure)
            }
            Error::Protocol(_) | Error::BufferUnderflow { .. } | Error::BufferOverflow { .. } => {
                (StatusClass::MiddlewareError, StatusCode::ProtocolFailure)
            }
            Error::Timeout(_) => (StatusClass::ConnectionError, StatusCode::TimeoutOccurred),
            Error::Middleware(_) => (StatusClass::MiddlewareError, StatusCode::Other),
            Error::RequestFailed(_) => (StatusClass::RequestError, StatusCode::RequestFailed),
        };
        Status::new(class, code, err.to_string())
    }
}
