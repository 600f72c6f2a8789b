// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-size bolt packet header.
//!
//! ```text
//! +----------------+------+------+-------+----------+
//! | size (i32 BE)  | type | sync | flags | reserved |
//! +----------------+------+------+-------+----------+
//!        4            1      1      1         1
//! ```
//!
//! `size` counts the bytes following the header (meta + body).

use super::buffer::{InputBuffer, OutputBuffer};
use crate::error::{Error, Result};
use std::fmt;

/// Marker byte every header must carry.
pub const SYNC: u8 = 0xB7;

/// Meta block present.
pub const F_META: u8 = 0x01;

/// Body blob present.
pub const F_BODY: u8 = 0x02;

/// Bolt packet types.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PacketType {
    #[default]
    Void = 0,
    Welcome = 1,
    Goodbye = 2,
    Echo = 3,
    Error = 4,
    Ack = 5,
    Negotiate = 6,
    Statistics = 7,
    Subscribe = 8,
    Unsubscribe = 9,
    Publish = 10,
    Request = 11,
    Reply = 12,
}

const KNOWN_TYPES: [PacketType; 13] = [
    PacketType::Void,
    PacketType::Welcome,
    PacketType::Goodbye,
    PacketType::Echo,
    PacketType::Error,
    PacketType::Ack,
    PacketType::Negotiate,
    PacketType::Statistics,
    PacketType::Subscribe,
    PacketType::Unsubscribe,
    PacketType::Publish,
    PacketType::Request,
    PacketType::Reply,
];

const fn build_type_table() -> [PacketType; 256] {
    let mut table = [PacketType::Void; 256];
    let mut i = 0;
    while i < KNOWN_TYPES.len() {
        table[KNOWN_TYPES[i] as usize] = KNOWN_TYPES[i];
        i += 1;
    }
    table
}

/// Wire byte to type; anything unknown maps to `Void`.
static TYPE_TABLE: [PacketType; 256] = build_type_table();

impl PacketType {
    /// Sanitizing conversion from the wire byte.
    pub fn from_u8(value: u8) -> PacketType {
        TYPE_TABLE[value as usize]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PacketType::Void => "VOID",
            PacketType::Welcome => "WELCOME",
            PacketType::Goodbye => "GOODBYE",
            PacketType::Echo => "ECHO",
            PacketType::Error => "ERROR",
            PacketType::Ack => "ACK",
            PacketType::Negotiate => "NEGOTIATE",
            PacketType::Statistics => "STATISTICS",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::Publish => "PUBLISH",
            PacketType::Request => "REQUEST",
            PacketType::Reply => "REPLY",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded packet header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
    size: i32,
    packet_type: PacketType,
    flags: u8,
    /// Set when the wire type byte was not a known type.
    unknown_type: bool,
}

impl Header {
    /// Encoded header length.
    pub const SIZE: usize = 8;

    pub fn new(packet_type: PacketType, flags: u8, size: i32) -> Self {
        Self {
            size,
            packet_type,
            flags,
            unknown_type: false,
        }
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    /// Content length as `usize` (never negative after `parse`).
    pub fn content_len(&self) -> usize {
        self.size.max(0) as usize
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn has_meta(&self) -> bool {
        self.flags & F_META != 0
    }

    pub fn has_body(&self) -> bool {
        self.flags & F_BODY != 0
    }

    /// True if the type byte on the wire was not recognised.
    pub fn has_problems(&self) -> bool {
        self.unknown_type
    }

    pub fn encode(&self, out: &mut OutputBuffer<'_>) -> Result<()> {
        if self.size < 0 {
            return Err(Error::Protocol(format!(
                "negative packet size {}",
                self.size
            )));
        }
        out.put_i32(self.size)?;
        out.put_u8(self.packet_type as u8)?;
        out.put_u8(SYNC)?;
        out.put_u8(self.flags)?;
        out.put_u8(0)
    }

    /// Parse and validate a header.
    ///
    /// Rejects a wrong sync byte and a negative size. An unknown type byte is
    /// not an error: the header reads as `Void` and [`Header::has_problems`]
    /// is set.
    pub fn parse(input: &mut InputBuffer<'_>) -> Result<Header> {
        let size = input.get_i32()?;
        let raw_type = input.get_u8()?;
        let sync = input.get_u8()?;
        let flags = input.get_u8()?;
        let _reserved = input.get_u8()?;

        if sync != SYNC {
            return Err(Error::Protocol(format!(
                "bad sync byte 0x{:02x} (expected 0x{:02x})",
                sync, SYNC
            )));
        }
        if size < 0 {
            return Err(Error::Protocol(format!("negative packet size {}", size)));
        }

        let packet_type = PacketType::from_u8(raw_type);
        Ok(Header {
            size,
            packet_type,
            flags,
            unknown_type: packet_type == PacketType::Void && raw_type != 0,
        })
    }

    /// Parse from a raw 8-byte array.
    pub fn parse_bytes(bytes: &[u8; Header::SIZE]) -> Result<Header> {
        Header::parse(&mut InputBuffer::new(bytes))
    }
}
