// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host-order to network-order conversion strategies.
//!
//! Bolt puts every multi-byte value on the wire big-endian. The strategy
//! that turns a host-order byte image into wire order (and back) depends on
//! the host, so it is picked once per process by probing a known integer and
//! handed out as a `&'static` trait object:
//!
//! ```text
//!   value --to_ne_bytes()--> host image --Encoder--> wire (BE)
//!   wire (BE) --Decoder--> host image --from_ne_bytes()--> value
//! ```

use std::sync::OnceLock;

/// Converts host-order byte images into wire order.
pub trait Encoder: Send + Sync {
    fn put_u16(&self, native: [u8; 2]) -> [u8; 2];
    fn put_u32(&self, native: [u8; 4]) -> [u8; 4];
    fn put_u64(&self, native: [u8; 8]) -> [u8; 8];

    fn encode_u16(&self, value: u16) -> [u8; 2] {
        self.put_u16(value.to_ne_bytes())
    }

    /// Low three bytes of `value`; the top byte is dropped.
    fn encode_u24(&self, value: u32) -> [u8; 3] {
        let wire = self.encode_u32(value);
        [wire[1], wire[2], wire[3]]
    }

    fn encode_u32(&self, value: u32) -> [u8; 4] {
        self.put_u32(value.to_ne_bytes())
    }

    fn encode_i32(&self, value: i32) -> [u8; 4] {
        self.put_u32(value.to_ne_bytes())
    }

    fn encode_f64(&self, value: f64) -> [u8; 8] {
        self.put_u64(value.to_ne_bytes())
    }
}

/// Converts wire-order bytes into host-order images.
pub trait Decoder: Send + Sync {
    fn get_u16(&self, wire: [u8; 2]) -> [u8; 2];
    fn get_u32(&self, wire: [u8; 4]) -> [u8; 4];
    fn get_u64(&self, wire: [u8; 8]) -> [u8; 8];

    fn decode_u16(&self, wire: [u8; 2]) -> u16 {
        u16::from_ne_bytes(self.get_u16(wire))
    }

    fn decode_u24(&self, wire: [u8; 3]) -> u32 {
        self.decode_u32([0, wire[0], wire[1], wire[2]])
    }

    fn decode_u32(&self, wire: [u8; 4]) -> u32 {
        u32::from_ne_bytes(self.get_u32(wire))
    }

    fn decode_i32(&self, wire: [u8; 4]) -> i32 {
        i32::from_ne_bytes(self.get_u32(wire))
    }

    fn decode_f64(&self, wire: [u8; 8]) -> f64 {
        f64::from_ne_bytes(self.get_u64(wire))
    }
}

/// Strategy for big-endian hosts: host order already is wire order.
#[derive(Debug, Default, Clone, Copy)]
pub struct BigEndianCodec;

/// Strategy for little-endian hosts: every image is byte-reversed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LittleEndianCodec;

impl Encoder for BigEndianCodec {
    fn put_u16(&self, native: [u8; 2]) -> [u8; 2] {
        native
    }

    fn put_u32(&self, native: [u8; 4]) -> [u8; 4] {
        native
    }

    fn put_u64(&self, native: [u8; 8]) -> [u8; 8] {
        native
    }
}

impl Decoder for BigEndianCodec {
    fn get_u16(&self, wire: [u8; 2]) -> [u8; 2] {
        wire
    }

    fn get_u32(&self, wire: [u8; 4]) -> [u8; 4] {
        wire
    }

    fn get_u64(&self, wire: [u8; 8]) -> [u8; 8] {
        wire
    }
}

impl Encoder for LittleEndianCodec {
    fn put_u16(&self, mut native: [u8; 2]) -> [u8; 2] {
        native.reverse();
        native
    }

    fn put_u32(&self, mut native: [u8; 4]) -> [u8; 4] {
        native.reverse();
        native
    }

    fn put_u64(&self, mut native: [u8; 8]) -> [u8; 8] {
        native.reverse();
        native
    }
}

impl Decoder for LittleEndianCodec {
    fn get_u16(&self, mut wire: [u8; 2]) -> [u8; 2] {
        wire.reverse();
        wire
    }

    fn get_u32(&self, mut wire: [u8; 4]) -> [u8; 4] {
        wire.reverse();
        wire
    }

    fn get_u64(&self, mut wire: [u8; 8]) -> [u8; 8] {
        wire.reverse();
        wire
    }
}

static BIG: BigEndianCodec = BigEndianCodec;
static LITTLE: LittleEndianCodec = LittleEndianCodec;

static ENCODER: OnceLock<&'static dyn Encoder> = OnceLock::new();
static DECODER: OnceLock<&'static dyn Decoder> = OnceLock::new();

/// True when the probe integer's most significant byte is stored first.
pub fn host_is_big_endian() -> bool {
    let probe: u16 = 0x0102;
    probe.to_ne_bytes()[0] == 0x01
}

/// Process-wide encoder for this host.
pub fn encoder() -> &'static dyn Encoder {
    *ENCODER.get_or_init(|| {
        let codec: &'static dyn Encoder = if host_is_big_endian() {
            &BIG
        } else {
            &LITTLE
        };
        codec
    })
}

/// Process-wide decoder for this host.
pub fn decoder() -> &'static dyn Decoder {
    *DECODER.get_or_init(|| {
        let codec: &'static dyn Decoder = if host_is_big_endian() {
            &BIG
        } else {
            &LITTLE
        };
        codec
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_detection_matches_target() {
        assert_eq!(host_is_big_endian(), cfg!(target_endian = "big"));
    }

    #[test]
    fn test_selected_encoder_writes_network_order() {
        assert_eq!(encoder().encode_u32(0x0102_0304), [1, 2, 3, 4]);
        assert_eq!(encoder().encode_u16(0xABCD), [0xAB, 0xCD]);
        assert_eq!(encoder().encode_u24(0x00_0A0B0C), [0x0A, 0x0B, 0x0C]);
        assert_eq!(encoder().encode_i32(-2), [0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(encoder().encode_f64(1.5), 1.5f64.to_be_bytes());
    }

    #[test]
    fn test_both_strategies_produce_identical_wire_bytes() {
        // Each strategy is fed the image its own kind of host would hold.
        let values: [u32; 5] = [0, 1, 0x0102_0304, 0xDEAD_BEEF, u32::MAX];
        for v in values {
            let from_big = BigEndianCodec.put_u32(v.to_be_bytes());
            let from_little = LittleEndianCodec.put_u32(v.to_le_bytes());
            assert_eq!(from_big, from_little);
            assert_eq!(from_big, v.to_be_bytes());
        }

        for v in [0.0f64, -1.25, f64::MAX, f64::MIN_POSITIVE, 2.75] {
            let bits = v.to_bits();
            let from_big = BigEndianCodec.put_u64(bits.to_be_bytes());
            let from_little = LittleEndianCodec.put_u64(bits.to_le_bytes());
            assert_eq!(from_big, from_little);
            assert_eq!(from_big, v.to_be_bytes());
        }

        let from_big = BigEndianCodec.put_u16(0x1234u16.to_be_bytes());
        let from_little = LittleEndianCodec.put_u16(0x1234u16.to_le_bytes());
        assert_eq!(from_big, from_little);
    }

    #[test]
    fn test_both_strategies_decode_to_host_images() {
        let wire = 0xCAFE_F00Du32.to_be_bytes();
        assert_eq!(BigEndianCodec.get_u32(wire), 0xCAFE_F00Du32.to_be_bytes());
        assert_eq!(LittleEndianCodec.get_u32(wire), 0xCAFE_F00Du32.to_le_bytes());
    }

    #[test]
    fn test_decoder_reverses_encoder() {
        let enc = encoder();
        let dec = decoder();
        assert_eq!(dec.decode_u16(enc.encode_u16(0xBEEF)), 0xBEEF);
        assert_eq!(dec.decode_u24(enc.encode_u24(0x00FF_EEDD)), 0x00FF_EEDD);
        assert_eq!(dec.decode_i32(enc.encode_i32(i32::MIN)), i32::MIN);
        assert_eq!(dec.decode_f64(enc.encode_f64(-0.5)), -0.5);
    }
}
