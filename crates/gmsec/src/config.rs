// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration constants and key/value connection settings.
//!
//! [`Config`] is the loosely typed option bag handed to `Connection::new()`
//! and to individual publish/subscribe calls. [`ConnectionConfig`] is the
//! typed view the connection core works from.

use crate::error::{Error, Result};
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Wait value meaning "block until something happens".
pub const WAIT_FOREVER: i32 = -1;

/// Republish value meaning "send the request once".
pub const REQUEST_REPUBLISH_NEVER: i32 = -1;

/// Shortest accepted request timeout (ms).
pub const MIN_TIMEOUT_MS: i32 = 10;

/// Shortest accepted republish interval (ms).
pub const MIN_REPUBLISH_MS: i32 = 50;

/// Default republish interval when none is configured (ms).
pub const DEFAULT_REPUBLISH_MS: i32 = 60_000;

/// Upper bound on the request loop's sleep when nothing is pending (ms).
pub const REQUEST_WAIT_LIMIT_MS: u64 = 60_000;

/// Receive timeout used by each auto-dispatch iteration.
pub const AUTO_DISPATCH_POLL: Duration = Duration::from_millis(250);

/// How long thread start/stop handshakes may take.
pub const THREAD_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default async publish queue capacity.
pub const DEFAULT_ASYNC_QUEUE_DEPTH: usize = 1000;

/// Async publish worker poll interval.
pub const ASYNC_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Grace period before the async publisher abandons unflushed work.
pub const DEFAULT_ASYNC_TEARDOWN_WAIT: Duration = Duration::from_secs(10);

/// Field carrying the request correlation id inside a message.
pub const REPLY_UNIQUE_ID_FIELD: &str = "GMSEC-REPLY-UNIQUE-ID";

/// Field carrying the response status of a reply.
pub const RESPONSE_STATUS_FIELD: &str = "RESPONSE-STATUS";

// ============================================================================
// Config
// ============================================================================

/// Ordered, case-insensitive string key/value options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    entries: Vec<(String, String)>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(key, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut config = Self::new();
        for (k, v) in pairs {
            config.add_value(k, v);
        }
        config
    }

    /// Parse `key=value key2=value2` command-line style arguments.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Self {
        let mut config = Self::new();
        for arg in args {
            if let Some((k, v)) = arg.as_ref().split_once('=') {
                config.add_value(k.trim(), v.trim());
            }
        }
        config
    }

    /// Insert or replace a value.
    pub fn add_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn clear_value(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        before != self.entries.len()
    }

    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get_value(key) {
            None => Ok(default),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Ok(true),
                "false" | "no" | "0" | "off" => Ok(false),
                other => Err(Error::InvalidConfig(format!(
                    "{}: expected a boolean, got '{}'",
                    key, other
                ))),
            },
        }
    }

    pub fn get_i32(&self, key: &str, default: i32) -> Result<i32> {
        match self.get_value(key) {
            None => Ok(default),
            Some(v) => v.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{}: expected an integer, got '{}'", key, v))
            }),
        }
    }

    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.get_value(key) {
            None => Ok(default),
            Some(v) => v.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{}: expected a number, got '{}'", key, v))
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Option keys understood by [`ConnectionConfig::from_config`].
pub mod keys {
    pub const MW_ID: &str = "mw-id";
    pub const MW_SERVER: &str = "mw-server";
    pub const ASYNC_PUBLISH: &str = "gmsec-async-publish";
    pub const ASYNC_QUEUE_DEPTH: &str = "gmsec-async-publish-queue-depth";
    pub const ASYNC_TEARDOWN_WAIT: &str = "gmsec-async-publish-teardown-wait";
    pub const REQUEST_REPUBLISH: &str = "gmsec-request-republish-timeout";
    pub const REMOVE_TRACKING_FIELDS: &str = "gmsec-remove-tracking-fields";
    pub const EXPOSE_RESP: &str = "gmsec-expose-resp";
    pub const MULTI_RESP: &str = "gmsec-multi-resp";
    pub const RECONNECT_INTERVAL: &str = "mw-reconnect-interval";
    pub const MAX_RECONNECTS: &str = "mw-max-reconnects";
    pub const CONNECT_TIMEOUT: &str = "mw-connect-timeout";
}

/// Typed connection settings.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Middleware adapter identifier (`bolt`)
    pub mw_id: String,

    /// Broker address (`host:port`, default port 9100)
    pub server: String,

    /// Route `publish()` through the async queue
    pub async_publish: bool,

    /// Async queue capacity
    pub async_queue_depth: usize,

    /// Grace period granted to the async worker on teardown
    pub async_teardown_wait: Duration,

    /// Default republish interval for requests (ms, negative = never)
    pub default_republish_ms: i32,

    /// Strip the correlation field from replies handed to the application
    pub remove_tracking_fields: bool,

    /// Also queue replies for `receive()` / subscription callbacks
    pub expose_replies: bool,

    /// Keep requests open across several replies
    pub multi_response: bool,

    /// Delay between reconnect attempts
    pub reconnect_interval: Duration,

    /// Reconnect attempts before giving up (negative = forever)
    pub max_reconnects: i32,

    /// Time allowed for the bolt handshake
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            mw_id: "bolt".to_string(),
            server: "127.0.0.1:9100".to_string(),
            async_publish: false,
            async_queue_depth: DEFAULT_ASYNC_QUEUE_DEPTH,
            async_teardown_wait: DEFAULT_ASYNC_TEARDOWN_WAIT,
            default_republish_ms: REQUEST_REPUBLISH_NEVER,
            remove_tracking_fields: false,
            expose_replies: false,
            multi_response: false,
            reconnect_interval: Duration::from_secs(5),
            max_reconnects: -1,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    /// Extract the typed view from a key/value [`Config`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let defaults = Self::default();

        let queue_depth = config.get_i32(
            keys::ASYNC_QUEUE_DEPTH,
            defaults.async_queue_depth as i32,
        )?;
        if queue_depth <= 0 {
            return Err(Error::InvalidConfig(format!(
                "{} must be > 0",
                keys::ASYNC_QUEUE_DEPTH
            )));
        }

        let teardown_ms = config.get_i32(
            keys::ASYNC_TEARDOWN_WAIT,
            defaults.async_teardown_wait.as_millis() as i32,
        )?;
        let reconnect_ms = config.get_i32(
            keys::RECONNECT_INTERVAL,
            defaults.reconnect_interval.as_millis() as i32,
        )?;
        let connect_ms = config.get_i32(
            keys::CONNECT_TIMEOUT,
            defaults.connect_timeout.as_millis() as i32,
        )?;

        let mut server = config
            .get_value(keys::MW_SERVER)
            .unwrap_or(&defaults.server)
            .to_string();
        if !server.contains(':') {
            server.push_str(":9100");
        }

        Ok(Self {
            mw_id: config
                .get_value(keys::MW_ID)
                .unwrap_or(&defaults.mw_id)
                .to_ascii_lowercase(),
            server,
            async_publish: config.get_bool(keys::ASYNC_PUBLISH, defaults.async_publish)?,
            async_queue_depth: queue_depth as usize,
            async_teardown_wait: Duration::from_millis(teardown_ms.max(0) as u64),
            default_republish_ms: config
                .get_i32(keys::REQUEST_REPUBLISH, defaults.default_republish_ms)?,
            remove_tracking_fields: config
                .get_bool(keys::REMOVE_TRACKING_FIELDS, defaults.remove_tracking_fields)?,
            expose_replies: config.get_bool(keys::EXPOSE_RESP, defaults.expose_replies)?,
            multi_response: config.get_bool(keys::MULTI_RESP, defaults.multi_response)?,
            reconnect_interval: Duration::from_millis(reconnect_ms.max(0) as u64),
            max_reconnects: config.get_i32(keys::MAX_RECONNECTS, defaults.max_reconnects)?,
            connect_timeout: Duration::from_millis(connect_ms.max(0) as u64),
        })
    }

    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.async_queue_depth == 0 {
            return Err("async_queue_depth must be > 0");
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0");
        }
        Ok(())
    }
}
