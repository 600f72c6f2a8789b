// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ordered property collection forming a packet's metadata block.
//!
//! ```text
//! +-------------------+--------------+---------------------+
//! | total size (i32)  | count (u16)  | property * count    |
//! +-------------------+--------------+---------------------+
//! ```
//!
//! `total size` includes the 6-byte block head.

use super::buffer::{InputBuffer, OutputBuffer};
use super::property::{Property, PropertyType};
use crate::error::{Error, Result};

/// Upper bound on properties per block.
pub const MAX_ITEMS: usize = 10_000;

const META_HEAD: usize = 6;

/// Properties keyed by name, kept in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Meta {
    properties: Vec<Property>,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing any property with the same name in place.
    pub fn set(&mut self, property: Property) {
        match self
            .properties
            .iter_mut()
            .find(|p| p.name() == property.name())
        {
            Some(slot) => *slot = property,
            None => self.properties.push(property),
        }
    }

    /// Builder-style [`Meta::set`].
    pub fn with(mut self, property: Property) -> Self {
        self.set(property);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Property> {
        let index = self.properties.iter().position(|p| p.name() == name)?;
        Some(self.properties.remove(index))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    fn reserved_text(&self, ptype: PropertyType) -> Option<String> {
        self.properties
            .iter()
            .find(|p| p.property_type() == ptype)
            .map(|p| p.as_string())
    }

    pub fn id(&self) -> Option<String> {
        self.reserved_text(PropertyType::Id)
    }

    pub fn topic(&self) -> Option<String> {
        self.reserved_text(PropertyType::Topic)
    }

    pub fn corr_id(&self) -> Option<String> {
        self.reserved_text(PropertyType::CorrId)
    }

    pub fn reply_to(&self) -> Option<String> {
        self.reserved_text(PropertyType::ReplyTo)
    }

    pub fn is_compressed(&self) -> bool {
        self.properties
            .iter()
            .any(|p| p.property_type() == PropertyType::Compress && p.as_flag())
    }

    /// Bytes this block occupies on the wire.
    pub fn encoded_size(&self) -> usize {
        META_HEAD
            + self
                .properties
                .iter()
                .map(Property::encoded_size)
                .sum::<usize>()
    }

    pub fn encode(&self, out: &mut OutputBuffer<'_>) -> Result<()> {
        if self.properties.len() > MAX_ITEMS {
            return Err(Error::Protocol(format!(
                "meta holds {} properties (max {})",
                self.properties.len(),
                MAX_ITEMS
            )));
        }
        let size = self.encoded_size();
        let size = i32::try_from(size)
            .map_err(|_| Error::Protocol(format!("meta block too large ({} bytes)", size)))?;
        out.put_i32(size)?;
        out.put_u16(self.properties.len() as u16)?;
        for property in &self.properties {
            property.encode(out)?;
        }
        Ok(())
    }

    pub fn decode(input: &mut InputBuffer<'_>) -> Result<Meta> {
        let start = input.position();
        let size = input.get_i32()?;
        let count = input.get_u16()? as usize;

        if size < META_HEAD as i32 {
            return Err(Error::Protocol(format!("bad meta size {}", size)));
        }
        if count > MAX_ITEMS {
            return Err(Error::Protocol(format!(
                "meta count {} exceeds {}",
                count, MAX_ITEMS
            )));
        }

        let mut meta = Meta::new();
        for _ in 0..count {
            meta.set(Property::decode(input)?);
        }

        let consumed = input.position() - start;
        if consumed != size as usize {
            return Err(Error::Protocol(format!(
                "meta size mismatch: header says {}, consumed {}",
                size, consumed
            )));
        }
        Ok(meta)
    }
}

impl FromIterator<Property> for Meta {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        let mut meta = Meta::new();
        for p in iter {
            meta.set(p);
        }
        meta
    }
}
