// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed key/value properties carried in a [`Meta`](super::meta::Meta) block.
//!
//! # Wire Format
//!
//! ```text
//! +-----------------+--------------+----------+------+-------+
//! | enc<<6 | ptype  | len (1-3 BE) | name_len | name | value |
//! +-----------------+--------------+----------+------+-------+
//! ```
//!
//! `len` counts `name_len`, `name` and `value`. Its width is the smallest of
//! 1, 2 or 3 bytes that fits and is recorded in the top two bits of the first
//! byte. Reserved properties (ID, TOPIC, ...) are written without a name and
//! read back under their fixed names.

use super::buffer::{InputBuffer, OutputBuffer};
use crate::error::{Error, Result};
use std::fmt;

/// Largest value representable in the 3-byte length field.
pub const MAX_PROPERTY_LEN: usize = (1 << 24) - 1;

/// Largest property name.
pub const MAX_NAME_LEN: usize = 255;

const ENC_1: u8 = 1;
const ENC_2: u8 = 2;
const ENC_3: u8 = 3;

/// Property kinds.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyType {
    String = 1,
    Blob = 2,
    I32 = 3,
    F64 = 4,
    Flag = 5,
    Id = 6,
    Topic = 7,
    CorrId = 8,
    ReplyTo = 9,
    Selector = 10,
    Compress = 11,
}

impl PropertyType {
    pub fn from_u8(value: u8) -> Option<PropertyType> {
        let t = match value {
            1 => PropertyType::String,
            2 => PropertyType::Blob,
            3 => PropertyType::I32,
            4 => PropertyType::F64,
            5 => PropertyType::Flag,
            6 => PropertyType::Id,
            7 => PropertyType::Topic,
            8 => PropertyType::CorrId,
            9 => PropertyType::ReplyTo,
            10 => PropertyType::Selector,
            11 => PropertyType::Compress,
            _ => return None,
        };
        Some(t)
    }

    /// Fixed name of a reserved (unnamed on the wire) property.
    pub fn reserved_name(self) -> Option<&'static str> {
        match self {
            PropertyType::Id => Some("ID"),
            PropertyType::Topic => Some("TOPIC"),
            PropertyType::CorrId => Some("CORR_ID"),
            PropertyType::ReplyTo => Some("REPLY_TO"),
            PropertyType::Selector => Some("SELECTOR"),
            PropertyType::Compress => Some("COMPRESS"),
            _ => None,
        }
    }

    pub fn is_reserved(self) -> bool {
        self.reserved_name().is_some()
    }
}

/// Property payload.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Bytes(Vec<u8>),
    I32(i32),
    F64(f64),
    Flag(bool),
}

/// A single named, typed value.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    name: String,
    ptype: PropertyType,
    value: PropertyValue,
}

impl Property {
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::named(name, PropertyType::String, PropertyValue::Text(value.into()))
    }

    pub fn blob(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::named(name, PropertyType::Blob, PropertyValue::Bytes(value.into()))
    }

    pub fn i32(name: impl Into<String>, value: i32) -> Self {
        Self::named(name, PropertyType::I32, PropertyValue::I32(value))
    }

    pub fn f64(name: impl Into<String>, value: f64) -> Self {
        Self::named(name, PropertyType::F64, PropertyValue::F64(value))
    }

    pub fn flag(name: impl Into<String>, value: bool) -> Self {
        Self::named(name, PropertyType::Flag, PropertyValue::Flag(value))
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::reserved(PropertyType::Id, PropertyValue::Text(value.into()))
    }

    pub fn topic(value: impl Into<String>) -> Self {
        Self::reserved(PropertyType::Topic, PropertyValue::Text(value.into()))
    }

    pub fn corr_id(value: impl Into<String>) -> Self {
        Self::reserved(PropertyType::CorrId, PropertyValue::Text(value.into()))
    }

    pub fn reply_to(value: impl Into<String>) -> Self {
        Self::reserved(PropertyType::ReplyTo, PropertyValue::Text(value.into()))
    }

    pub fn selector(value: impl Into<String>) -> Self {
        Self::reserved(PropertyType::Selector, PropertyValue::Text(value.into()))
    }

    pub fn compress(value: bool) -> Self {
        Self::reserved(PropertyType::Compress, PropertyValue::Flag(value))
    }

    fn named(name: impl Into<String>, ptype: PropertyType, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            ptype,
            value,
        }
    }

    fn reserved(ptype: PropertyType, value: PropertyValue) -> Self {
        Self {
            name: ptype.reserved_name().unwrap_or_default().to_string(),
            ptype,
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property_type(&self) -> PropertyType {
        self.ptype
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    /// Whether the name travels on the wire.
    pub fn is_named(&self) -> bool {
        !self.ptype.is_reserved()
    }

    // ========================================================================
    // Typed accessors
    // ========================================================================

    /// Text view; numbers and flags are formatted, blobs decoded lossily.
    pub fn as_string(&self) -> String {
        match &self.value {
            PropertyValue::Text(s) => s.clone(),
            PropertyValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            PropertyValue::I32(v) => v.to_string(),
            PropertyValue::F64(v) => v.to_string(),
            PropertyValue::Flag(v) => v.to_string(),
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match &self.value {
            PropertyValue::I32(v) => Some(*v),
            PropertyValue::F64(v) => Some(*v as i32),
            PropertyValue::Flag(v) => Some(i32::from(*v)),
            PropertyValue::Text(s) => s.trim().parse().ok(),
            PropertyValue::Bytes(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &self.value {
            PropertyValue::F64(v) => Some(*v),
            PropertyValue::I32(v) => Some(f64::from(*v)),
            PropertyValue::Flag(v) => Some(if *v { 1.0 } else { 0.0 }),
            PropertyValue::Text(s) => s.trim().parse().ok(),
            PropertyValue::Bytes(_) => None,
        }
    }

    /// Strings read as false when empty or `false`/`0`/`no`.
    pub fn as_flag(&self) -> bool {
        match &self.value {
            PropertyValue::Flag(v) => *v,
            PropertyValue::I32(v) => *v != 0,
            PropertyValue::F64(v) => *v != 0.0,
            PropertyValue::Text(s) => {
                let s = s.trim();
                !(s.is_empty()
                    || s == "0"
                    || s.eq_ignore_ascii_case("false")
                    || s.eq_ignore_ascii_case("no"))
            }
            PropertyValue::Bytes(b) => !b.is_empty(),
        }
    }

    // ========================================================================
    // Wire encoding
    // ========================================================================

    fn value_size(&self) -> usize {
        match &self.value {
            PropertyValue::Text(s) => s.len(),
            PropertyValue::Bytes(b) => b.len(),
            PropertyValue::I32(_) => 4,
            PropertyValue::F64(_) => 8,
            PropertyValue::Flag(_) => 1,
        }
    }

    fn wire_name_len(&self) -> usize {
        if self.is_named() {
            self.name.len()
        } else {
            0
        }
    }

    /// Value of the length field.
    fn count(&self) -> usize {
        1 + self.wire_name_len() + self.value_size()
    }

    fn enc_mode(count: usize) -> u8 {
        if count < 1 << 8 {
            ENC_1
        } else if count < 1 << 16 {
            ENC_2
        } else {
            ENC_3
        }
    }

    /// Bytes this property occupies on the wire.
    pub fn encoded_size(&self) -> usize {
        let count = self.count();
        1 + Self::enc_mode(count) as usize + count
    }

    pub fn encode(&self, out: &mut OutputBuffer<'_>) -> Result<()> {
        let name_len = self.wire_name_len();
        if name_len > MAX_NAME_LEN {
            return Err(Error::Protocol(format!(
                "property name too long ({} bytes): {}",
                name_len, self.name
            )));
        }
        let count = self.count();
        if count > MAX_PROPERTY_LEN {
            return Err(Error::Protocol(format!(
                "property {} too large ({} bytes)",
                self.name, count
            )));
        }

        let enc = Self::enc_mode(count);
        out.put_u8((enc << 6) | self.ptype as u8)?;
        match enc {
            ENC_1 => out.put_u8(count as u8)?,
            ENC_2 => out.put_u16(count as u16)?,
            _ => out.put_u24(count as u32)?,
        }

        out.put_u8(name_len as u8)?;
        if name_len > 0 {
            out.put_bytes(self.name.as_bytes())?;
        }

        match &self.value {
            PropertyValue::Text(s) => out.put_bytes(s.as_bytes()),
            PropertyValue::Bytes(b) => out.put_bytes(b),
            PropertyValue::I32(v) => out.put_i32(*v),
            PropertyValue::F64(v) => out.put_f64(*v),
            PropertyValue::Flag(v) => out.put_u8(u8::from(*v)),
        }
    }

    pub fn decode(input: &mut InputBuffer<'_>) -> Result<Property> {
        let lead = input.get_u8()?;
        let enc = lead >> 6;
        let raw_type = lead & 0x3F;

        let count = match enc {
            ENC_1 => input.get_u8()? as usize,
            ENC_2 => input.get_u16()? as usize,
            ENC_3 => input.get_u24()? as usize,
            other => {
                return Err(Error::Protocol(format!(
                    "unknown property encoding {}",
                    other
                )))
            }
        };
        let ptype = PropertyType::from_u8(raw_type)
            .ok_or_else(|| Error::Protocol(format!("unknown property type {}", raw_type)))?;

        if count == 0 {
            return Err(Error::Protocol("property length 0".to_string()));
        }
        let mut content = InputBuffer::new(input.get_bytes(count)?);

        let name_len = content.get_u8()? as usize;
        let name_bytes = content.get_bytes(name_len)?;
        let name = match ptype.reserved_name() {
            Some(fixed) => fixed.to_string(),
            None => String::from_utf8(name_bytes.to_vec())
                .map_err(|_| Error::Protocol("property name is not UTF-8".to_string()))?,
        };

        let raw = content.get_rest();
        let value = match ptype {
            PropertyType::Blob => PropertyValue::Bytes(raw.to_vec()),
            PropertyType::I32 => PropertyValue::I32(InputBuffer::new(exact(raw, 4, &name)?).get_i32()?),
            PropertyType::F64 => PropertyValue::F64(InputBuffer::new(exact(raw, 8, &name)?).get_f64()?),
            PropertyType::Flag | PropertyType::Compress => {
                PropertyValue::Flag(exact(raw, 1, &name)?[0] != 0)
            }
            _ => PropertyValue::Text(String::from_utf8(raw.to_vec()).map_err(|_| {
                Error::Protocol(format!("property {} is not UTF-8", name))
            })?),
        };

        Ok(Property { name, ptype, value })
    }
}

fn exact<'a>(raw: &'a [u8], len: usize, name: &str) -> Result<&'a [u8]> {
    if raw.len() != len {
        return Err(Error::Protocol(format!(
            "property {}: expected {} value bytes, got {}",
            name,
            len,
            raw.len()
        )));
    }
    Ok(raw)
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})={}", self.name, self.ptype, self.as_string())
    }
}
