// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte buffers with bounds-checked cursors.
//!
//! [`InputBuffer`] and [`OutputBuffer`] walk a byte range with a cursor that
//! only moves forward. Every access checks the remaining space first and
//! fails with [`Error::BufferUnderflow`] / [`Error::BufferOverflow`]; nothing
//! is ever silently truncated.

use super::encoder::{decoder, encoder};
use crate::error::{Error, Result};

// ============================================================================
// ByteBuffer
// ============================================================================

/// Owned, resizable byte region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Copy `bytes` into a new buffer.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Grow (zero-filled) or shrink to `len` bytes.
    pub fn resize(&mut self, len: usize) {
        self.data.resize(len, 0);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

// ============================================================================
// InputBuffer
// ============================================================================

/// Read cursor over a borrowed byte range.
#[derive(Debug)]
pub struct InputBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> InputBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }

    fn check(&self, needed: usize) -> Result<()> {
        let available = self.remaining();
        if needed > available {
            return Err(Error::BufferUnderflow { needed, available });
        }
        Ok(())
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.check(n)?;
        let data: &'a [u8] = self.data;
        let slice = &data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn get_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.get_bytes(N)?);
        Ok(out)
    }

    /// Borrow everything left.
    pub fn get_rest(&mut self) -> &'a [u8] {
        let data: &'a [u8] = self.data;
        let slice = &data[self.pos..];
        self.pos = data.len();
        slice
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_array::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(decoder().decode_u16(self.get_array()?))
    }

    pub fn get_u24(&mut self) -> Result<u32> {
        Ok(decoder().decode_u24(self.get_array()?))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(decoder().decode_u32(self.get_array()?))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(decoder().decode_i32(self.get_array()?))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(decoder().decode_f64(self.get_array()?))
    }
}

// ============================================================================
// OutputBuffer
// ============================================================================

/// Write cursor over a borrowed, pre-sized byte range.
#[derive(Debug)]
pub struct OutputBuffer<'a> {
    data: &'a mut [u8],
    pos: usize,
}

impl<'a> OutputBuffer<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_full(&self) -> bool {
        self.pos == self.data.len()
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let needed = bytes.len();
        let available = self.remaining();
        if needed > available {
            return Err(Error::BufferOverflow { needed, available });
        }
        self.data[self.pos..self.pos + needed].copy_from_slice(bytes);
        self.pos += needed;
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put_bytes(&[value])
    }

    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.put_bytes(&encoder().encode_u16(value))
    }

    /// Write the low three bytes of `value`.
    pub fn put_u24(&mut self, value: u32) -> Result<()> {
        self.put_bytes(&encoder().encode_u24(value))
    }

    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put_bytes(&encoder().encode_u32(value))
    }

    pub fn put_i32(&mut self, value: i32) -> Result<()> {
        self.put_bytes(&encoder().encode_i32(value))
    }

    pub fn put_f64(&mut self, value: f64) -> Result<()> {
        self.put_bytes(&encoder().encode_f64(value))
    }
}
