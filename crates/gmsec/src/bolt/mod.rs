// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bolt: a small binary pub/sub protocol over TCP.
//!
//! # Layers
//!
//! ```text
//! +-------------------------------------------------------------+
//! |  BoltConnection      ConnectionInterface adapter            |
//! +-------------------------------------------------------------+
//! |  BoltClient          reader thread, reconnect, acks         |
//! |  Shared              link state machine, queues, put()      |
//! +-------------------------------------------------------------+
//! |  FrameReader         stream -> (Header, content)            |
//! |  Packet / Meta / Property / Header                          |
//! |  InputBuffer / OutputBuffer / Encoder                       |
//! +-------------------------------------------------------------+
//! |  ByteStream / Connector (TCP via socket2)                   |
//! +-------------------------------------------------------------+
//! ```
//!
//! [`BoltServer`] is a minimal broker speaking the same protocol.
//!
//! All multi-byte integers and doubles are big-endian on the wire.

mod adapter;
mod buffer;
mod client;
mod encoder;
mod frame;
mod header;
mod meta;
mod options;
mod packet;
mod property;
mod server;
mod shared;
pub mod stream;

pub use adapter::{
    decode_fields, encode_fields, message_to_packet, packet_to_message, BoltConnection,
};
pub use buffer::{ByteBuffer, InputBuffer, OutputBuffer};
pub use client::BoltClient;
pub use encoder::{
    decoder, encoder, host_is_big_endian, BigEndianCodec, Decoder, Encoder, LittleEndianCodec,
};
pub use frame::{Frame, FrameReader, DEFAULT_MAX_PACKET_SIZE};
pub use header::{Header, PacketType, F_BODY, F_META, SYNC};
pub use meta::{Meta, MAX_ITEMS};
pub use options::{BoltOptions, DEFAULT_MAX_INCOMING};
pub use packet::Packet;
pub use property::{Property, PropertyType, PropertyValue, MAX_NAME_LEN, MAX_PROPERTY_LEN};
pub use server::BoltServer;
pub use shared::{
    ConnectPhase, IoSnapshot, LinkState, PacketHandler, Shared, StateListener, REASON_PROPERTY,
    VERSION_PROPERTY,
};
pub use stream::{BoxedByteStream, ByteStream, Connector, TcpConnector};
