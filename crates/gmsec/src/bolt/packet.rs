// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Complete bolt packets: header, optional meta block, optional body.
//!
//! ```text
//! +----------+--------------------+-------------------+
//! | Header   | Meta (if F_META)   | Body (if F_BODY)  |
//! +----------+--------------------+-------------------+
//! ```
//!
//! The body has no length prefix; it is whatever follows the meta block up
//! to the header's `size`.

use super::buffer::{ByteBuffer, InputBuffer, OutputBuffer};
use super::header::{Header, PacketType, F_BODY, F_META};
use super::meta::Meta;
use super::property::Property;
use crate::error::{Error, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// A bolt protocol data unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Packet {
    packet_type: PacketType,
    meta: Option<Meta>,
    body: Option<ByteBuffer>,
}

impl Packet {
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            meta: None,
            body: None,
        }
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_body(mut self, body: impl Into<ByteBuffer>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Builder shortcut adding one property.
    pub fn with_property(mut self, property: Property) -> Self {
        self.meta_mut().set(property);
        self
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn meta(&self) -> Option<&Meta> {
        self.meta.as_ref()
    }

    /// Mutable meta block, created on first use.
    pub fn meta_mut(&mut self) -> &mut Meta {
        self.meta.get_or_insert_with(Meta::new)
    }

    pub fn body(&self) -> Option<&ByteBuffer> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: Option<ByteBuffer>) {
        self.body = body;
    }

    pub fn take_body(&mut self) -> Option<ByteBuffer> {
        self.body.take()
    }

    /// Shortcut for the reserved ID property.
    pub fn id(&self) -> Option<String> {
        self.meta.as_ref().and_then(Meta::id)
    }

    pub fn topic(&self) -> Option<String> {
        self.meta.as_ref().and_then(Meta::topic)
    }

    pub fn corr_id(&self) -> Option<String> {
        self.meta.as_ref().and_then(Meta::corr_id)
    }

    pub fn reply_to(&self) -> Option<String> {
        self.meta.as_ref().and_then(Meta::reply_to)
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.meta.is_some() {
            flags |= F_META;
        }
        if self.body.is_some() {
            flags |= F_BODY;
        }
        flags
    }

    fn content_size(&self) -> usize {
        self.meta.as_ref().map_or(0, Meta::encoded_size) + self.body.as_ref().map_or(0, ByteBuffer::len)
    }

    /// Header describing this packet.
    pub fn header(&self) -> Result<Header> {
        let size = self.content_size();
        let size = i32::try_from(size)
            .map_err(|_| Error::Protocol(format!("packet too large ({} bytes)", size)))?;
        Ok(Header::new(self.packet_type, self.flags(), size))
    }

    /// Total encoded length including the header.
    pub fn encoded_size(&self) -> usize {
        Header::SIZE + self.content_size()
    }

    /// Serialize into an exactly sized buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = self.header()?;
        let mut bytes = vec![0u8; self.encoded_size()];
        let mut out = OutputBuffer::new(&mut bytes);

        header.encode(&mut out)?;
        if let Some(meta) = &self.meta {
            meta.encode(&mut out)?;
        }
        if let Some(body) = &self.body {
            out.put_bytes(body.as_slice())?;
        }

        if !out.is_full() {
            return Err(Error::Protocol(format!(
                "packet encoding left {} bytes unused",
                out.remaining()
            )));
        }
        Ok(bytes)
    }

    /// Parse a complete packet (header included).
    pub fn decode(bytes: &[u8]) -> Result<Packet> {
        let mut input = InputBuffer::new(bytes);
        let header = Header::parse(&mut input)?;
        let content = input.get_bytes(header.content_len())?;
        if !input.is_exhausted() {
            return Err(Error::Protocol(format!(
                "{} trailing bytes after packet",
                input.remaining()
            )));
        }
        Packet::from_content(&header, content)
    }

    /// Parse the content that follows an already parsed header.
    pub fn from_content(header: &Header, content: &[u8]) -> Result<Packet> {
        if content.len() != header.content_len() {
            return Err(Error::Protocol(format!(
                "content length {} does not match header size {}",
                content.len(),
                header.size()
            )));
        }

        let mut input = InputBuffer::new(content);
        let meta = if header.has_meta() {
            Some(Meta::decode(&mut input)?)
        } else {
            None
        };

        let body = if header.has_body() {
            Some(ByteBuffer::from_bytes(input.get_rest()))
        } else if !input.is_exhausted() {
            return Err(Error::Protocol(format!(
                "{} unexpected bytes without F_BODY",
                input.remaining()
            )));
        } else {
            None
        };

        Ok(Packet {
            packet_type: header.packet_type(),
            meta,
            body,
        })
    }

    // ========================================================================
    // Body compression
    // ========================================================================

    /// Deflate the body and mark the packet with the COMPRESS property.
    pub fn compress_body(&mut self) -> Result<()> {
        let Some(body) = self.body.as_ref() else {
            return Ok(());
        };
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body.as_slice())?;
        let compressed = encoder.finish()?;
        self.body = Some(ByteBuffer::from_vec(compressed));
        self.meta_mut().set(Property::compress(true));
        Ok(())
    }

    /// Inflate a body previously deflated by [`Packet::compress_body`].
    pub fn decompress_body(&mut self) -> Result<()> {
        let compressed = self.meta.as_ref().is_some_and(Meta::is_compressed);
        if !compressed {
            return Ok(());
        }
        if let Some(body) = self.body.as_ref() {
            let mut decoder = DeflateDecoder::new(body.as_slice());
            let mut output = Vec::with_capacity(body.len() * 2);
            decoder
                .read_to_end(&mut output)
                .map_err(|e| Error::Protocol(format!("body inflate failed: {}", e)))?;
            self.body = Some(ByteBuffer::from_vec(output));
        }
        self.meta_mut().remove("COMPRESS");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_follow_presence() {
        let bare = Packet::new(PacketType::Echo);
        assert_eq!(bare.header().unwrap().flags(), 0);
        assert_eq!(bare.encode().unwrap().len(), Header::SIZE);

        let full = Packet::new(PacketType::Publish)
            .with_property(Property::topic("A.B"))
            .with_body(b"payload".to_vec());
        let header = full.header().unwrap();
        assert!(header.has_meta());
        assert!(header.has_body());
        assert_eq!(header.content_len(), full.encoded_size() - Header::SIZE);
    }

    #[test]
    fn test_roundtrip() {
        let packet = Packet::new(PacketType::Request)
            .with_property(Property::id("c_7"))
            .with_property(Property::topic("GMSEC.REQ"))
            .with_property(Property::corr_id("c_7"))
            .with_body(vec![0u8, 1, 2, 255]);
        let bytes = packet.encode().unwrap();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.corr_id().as_deref(), Some("c_7"));
    }

    #[test]
    fn test_empty_body_is_preserved() {
        let packet = Packet::new(PacketType::Publish).with_body(Vec::new());
        let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(decoded.body().map(ByteBuffer::len), Some(0));
    }

    #[test]
    fn test_truncated_packet() {
        let bytes = Packet::new(PacketType::Publish)
            .with_body(b"hello".to_vec())
            .encode()
            .unwrap();
        assert!(matches!(
            Packet::decode(&bytes[..bytes.len() - 2]),
            Err(Error::BufferUnderflow { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Packet::new(PacketType::Ack).encode().unwrap();
        bytes.push(0);
        assert!(Packet::decode(&bytes).is_err());
    }

    #[test]
    fn test_unflagged_content_rejected() {
        let header = Header::new(PacketType::Ack, 0, 2);
        assert!(Packet::from_content(&header, &[1, 2]).is_err());
    }

    #[test]
    fn test_compress_roundtrip() {
        let body = b"GMSEC GMSEC GMSEC GMSEC GMSEC GMSEC GMSEC GMSEC".repeat(20);
        let mut packet = Packet::new(PacketType::Publish)
            .with_property(Property::topic("A.B"))
            .with_body(body.clone());
        packet.compress_body().unwrap();
        assert!(packet.body().unwrap().len() < body.len());

        let mut decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
        assert!(decoded.meta().unwrap().is_compressed());
        decoded.decompress_body().unwrap();
        assert_eq!(decoded.body().unwrap().as_slice(), body.as_slice());
        assert!(decoded.meta().unwrap().get("COMPRESS").is_none());
    }
}
