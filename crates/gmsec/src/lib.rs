// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # GMSEC - messaging core with the bolt wire protocol
//!
//! Publish/subscribe and request/reply over a pluggable middleware, with a
//! pure Rust implementation of the bolt broker protocol.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gmsec::{Config, Connection, Message, MessageKind, Result};
//!
//! fn main() -> Result<()> {
//!     let config = Config::from_args(&["mw-id=bolt", "mw-server=localhost:9100"]);
//!     let conn = Connection::new(&config)?;
//!     conn.connect()?;
//!
//!     let request = Message::new("GMSEC.MISSION.SAT1.REQ.DIR", MessageKind::Request)
//!         .with_field("DIRECTIVE", "PING");
//!     if let Some(reply) = conn.request(&request, 5000, -1)? {
//!         println!("{}", reply);
//!     }
//!
//!     conn.disconnect()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                         Application Layer                           |
//! |   Connection: publish | subscribe | request | reply | events        |
//! +---------------------------------------------------------------------+
//! |                          Connection Core                            |
//! |   Dispatcher | AsyncPublisher | RequestThread | subject matching    |
//! +---------------------------------------------------------------------+
//! |                    Middleware (ConnectionInterface)                 |
//! |   BoltConnection -> BoltClient -> Shared (link state machine)       |
//! +---------------------------------------------------------------------+
//! |                           Bolt Codec                                |
//! |   Header | Property | Meta | Packet | FrameReader | compression     |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Connection`] | Entry point: connect, publish, subscribe, request |
//! | [`Message`] | Subject, kind and named fields |
//! | [`Config`] | Case-insensitive key/value configuration |
//! | [`Event`] | Connection events delivered to event callbacks |
//! | [`bolt::BoltServer`] | Minimal in-process bolt broker |

/// Bolt wire protocol: codec, client link and broker.
pub mod bolt;
/// Key/value configuration and tuning constants.
pub mod config;
/// Connection core (dispatch, async publish, request/reply).
pub mod connection;
/// Crate-wide error type.
pub mod error;
/// `log` backend with console and file outputs.
pub mod logging;
/// Messages and field values.
pub mod message;
/// Status values reported with events.
pub mod status;
/// Subject validation and pattern matching.
pub mod subject;
/// Small synchronization helpers.
pub mod sync;

pub use config::{keys, Config, ConnectionConfig};
pub use connection::{
    callback, event_callback, Callback, ClosureReplyCallback, Connection, ConnectionInterface,
    ConnectionState, ConnectionStats, Event, EventCallback, MiddlewareListener, ReplyCallback,
    SubscriptionInfo,
};
pub use error::{Error, Result};
pub use message::{FieldValue, Message, MessageKind};
pub use status::{Status, StatusClass, StatusCode};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
