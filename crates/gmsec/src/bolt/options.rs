// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bolt client session settings.
//!
//! # Example
//!
//! ```
//! use gmsec::bolt::BoltOptions;
//! use std::time::Duration;
//!
//! let options = BoltOptions::default()
//!     .with_connect_timeout(Duration::from_secs(2))
//!     .with_compression(true);
//! assert!(options.validate().is_ok());
//! ```

use crate::config::ConnectionConfig;
use std::time::Duration;

/// Default cap on packets waiting for `receive()`.
pub const DEFAULT_MAX_INCOMING: usize = 16_384;

/// Settings for one bolt client session.
#[derive(Clone, Debug)]
pub struct BoltOptions {
    // === Connection ===
    /// TCP connect timeout and handshake timeout
    pub connect_timeout: Duration,

    /// Delay between reconnect attempts
    pub reconnect_interval: Duration,

    /// Reconnect attempts before the session gives up (negative = forever)
    pub max_reconnects: i32,

    /// Enable TCP_NODELAY
    pub nodelay: bool,

    /// Enable SO_KEEPALIVE
    pub keepalive: bool,

    // === I/O ===
    /// Socket read timeout; bounds every reader poll
    pub read_timeout: Duration,

    /// Silence after which the reader pings and warns
    pub idle_warn: Duration,

    /// Silence after which the link is declared broken
    pub idle_limit: Duration,

    /// Consecutive zero-progress writes tolerated before failing
    pub max_stalled_writes: u32,

    /// Largest accepted packet content
    pub max_packet_size: usize,

    /// Time allowed for a SUBSCRIBE/UNSUBSCRIBE acknowledgement
    pub ack_timeout: Duration,

    /// Inbound packets held for `receive()`; the oldest is dropped beyond this
    pub max_incoming: usize,

    // === Payload ===
    /// Deflate packet bodies
    pub compress: bool,

    /// Deliver replies to `receive()` as well
    pub expose_replies: bool,
}

impl Default for BoltOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(5),
            max_reconnects: -1,
            nodelay: true,
            keepalive: true,
            read_timeout: Duration::from_millis(100),
            idle_warn: Duration::from_secs(5),
            idle_limit: Duration::from_secs(10),
            max_stalled_writes: 3,
            max_packet_size: super::frame::DEFAULT_MAX_PACKET_SIZE,
            ack_timeout: Duration::from_secs(10),
            max_incoming: DEFAULT_MAX_INCOMING,
            compress: false,
            expose_replies: false,
        }
    }
}

impl BoltOptions {
    /// Derive session settings from the connection's typed configuration.
    pub fn from_connection_config(config: &ConnectionConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            reconnect_interval: config.reconnect_interval,
            max_reconnects: config.max_reconnects,
            expose_replies: config.expose_replies,
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_max_reconnects(mut self, max: i32) -> Self {
        self.max_reconnects = max;
        self
    }

    pub fn with_idle_limits(mut self, warn: Duration, limit: Duration) -> Self {
        self.idle_warn = warn;
        self.idle_limit = limit;
        self
    }

    pub fn with_max_incoming(mut self, max: usize) -> Self {
        self.max_incoming = max;
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0");
        }
        if self.read_timeout.is_zero() {
            return Err("read_timeout must be > 0");
        }
        if self.idle_limit < self.idle_warn {
            return Err("idle_limit must be >= idle_warn");
        }
        if self.max_packet_size == 0 {
            return Err("max_packet_size must be > 0");
        }
        if self.max_incoming == 0 {
            return Err("max_incoming must be > 0");
        }
        Ok(())
    }
}
