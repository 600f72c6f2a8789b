// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Incremental packet framing over a byte stream.
//!
//! TCP has no message boundaries. [`FrameReader`] accumulates bytes until a
//! complete bolt header has arrived, validates it, then reads exactly
//! `header.size` content bytes:
//!
//! ```text
//!   ReadingHeader { n/8 } --8 bytes--> ReadingContent { n/size } --size--> frame
//!          ^                                                                 |
//!          +-----------------------------------------------------------------+
//! ```
//!
//! Reads that time out (`WouldBlock` / `TimedOut`) keep the partial state so
//! a socket with a short read timeout can be polled without losing bytes.

use super::header::Header;
use crate::error::{Error, Result};
use std::io::{self, Read};

/// Default maximum packet content size (16 MB).
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
enum ReadState {
    ReadingHeader { bytes_read: usize },
    ReadingContent { header: Header, bytes_read: usize },
}

impl Default for ReadState {
    fn default() -> Self {
        ReadState::ReadingHeader { bytes_read: 0 }
    }
}

/// A framed packet: validated header plus raw content bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: Header,
    pub content: Vec<u8>,
}

/// Stateful reader splitting a stream into bolt frames.
#[derive(Debug)]
pub struct FrameReader {
    state: ReadState,
    header_buf: [u8; Header::SIZE],
    content: Vec<u8>,
    max_size: usize,
    frames_decoded: u64,
    bytes_decoded: u64,
    frames_rejected: u64,
}

impl FrameReader {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: ReadState::default(),
            header_buf: [0u8; Header::SIZE],
            content: Vec::new(),
            max_size,
            frames_decoded: 0,
            bytes_decoded: 0,
            frames_rejected: 0,
        }
    }

    pub fn with_default_max() -> Self {
        Self::new(DEFAULT_MAX_PACKET_SIZE)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Header plus content bytes of all completed frames.
    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// Discard any partial frame (after a reconnect).
    pub fn reset(&mut self) {
        self.state = ReadState::default();
        self.content.clear();
    }

    /// True while a frame has been started but not completed.
    pub fn is_partial(&self) -> bool {
        match self.state {
            ReadState::ReadingHeader { bytes_read } => bytes_read > 0,
            ReadState::ReadingContent { .. } => true,
        }
    }

    fn finish(&mut self, header: Header) -> Frame {
        self.frames_decoded += 1;
        self.bytes_decoded += (Header::SIZE + header.content_len()) as u64;
        self.state = ReadState::default();
        Frame {
            header,
            content: std::mem::take(&mut self.content),
        }
    }

    /// Try to read one frame.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - a complete frame was read
    /// - `Ok(None)` - the read timed out; call again later
    /// - `Err(Error::Protocol)` - bad header; the stream cannot be resynchronised
    /// - `Err(Error::IoError)` - EOF or socket failure
    pub fn read_frame<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<Option<Frame>> {
        loop {
            match self.state {
                ReadState::ReadingHeader { bytes_read } => {
                    match reader.read(&mut self.header_buf[bytes_read..]) {
                        Ok(0) => {
                            let msg = if bytes_read == 0 {
                                "connection closed"
                            } else {
                                "incomplete packet header"
                            };
                            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, msg).into());
                        }
                        Ok(n) => {
                            let total = bytes_read + n;
                            if total < Header::SIZE {
                                self.state = ReadState::ReadingHeader { bytes_read: total };
                                continue;
                            }

                            let header = match Header::parse_bytes(&self.header_buf) {
                                Ok(h) => h,
                                Err(e) => {
                                    self.frames_rejected += 1;
                                    self.state = ReadState::default();
                                    return Err(e);
                                }
                            };
                            if header.content_len() > self.max_size {
                                self.frames_rejected += 1;
                                self.state = ReadState::default();
                                return Err(Error::Protocol(format!(
                                    "packet too large: {} bytes (max {})",
                                    header.content_len(),
                                    self.max_size
                                )));
                            }

                            self.content.clear();
                            self.content.resize(header.content_len(), 0);
                            if header.content_len() == 0 {
                                return Ok(Some(self.finish(header)));
                            }
                            self.state = ReadState::ReadingContent {
                                header,
                                bytes_read: 0,
                            };
                        }
                        Err(e) if is_timeout(&e) => return Ok(None),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e.into()),
                    }
                }

                ReadState::ReadingContent { header, bytes_read } => {
                    let expected = header.content_len();
                    match reader.read(&mut self.content[bytes_read..expected]) {
                        Ok(0) => {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "incomplete packet content",
                            )
                            .into());
                        }
                        Ok(n) => {
                            let total = bytes_read + n;
                            if total < expected {
                                self.state = ReadState::ReadingContent {
                                    header,
                                    bytes_read: total,
                                };
                                continue;
                            }
                            return Ok(Some(self.finish(header)));
                        }
                        Err(e) if is_timeout(&e) => return Ok(None),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::header::PacketType;
    use crate::bolt::packet::Packet;
    use crate::bolt::property::Property;
    use crate::bolt::stream::mock::MockStream;
    use std::io::Cursor;

    fn publish(topic: &str, body: &[u8]) -> Vec<u8> {
        Packet::new(PacketType::Publish)
            .with_property(Property::topic(topic))
            .with_body(body.to_vec())
            .encode()
            .unwrap()
    }

    #[test]
    fn test_read_multiple_frames() {
        let mut bytes = publish("A", b"one");
        bytes.extend(publish("B", b"two"));
        bytes.extend(Packet::new(PacketType::Echo).encode().unwrap());

        let mut reader = FrameReader::with_default_max();
        let mut cursor = Cursor::new(bytes);

        let f1 = reader.read_frame(&mut cursor).unwrap().unwrap();
        let p1 = Packet::from_content(&f1.header, &f1.content).unwrap();
        assert_eq!(p1.topic().as_deref(), Some("A"));

        let f2 = reader.read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(f2.header.packet_type(), PacketType::Publish);

        let f3 = reader.read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(f3.header.packet_type(), PacketType::Echo);
        assert!(f3.content.is_empty());

        assert_eq!(reader.frames_decoded(), 3);
        assert!(reader.read_frame(&mut cursor).is_err());
    }

    #[test]
    fn test_partial_reads_resume() {
        let bytes = publish("GMSEC.PARTIAL", b"0123456789");
        let mock = MockStream::new();
        let mut stream = mock.clone();
        let mut reader = FrameReader::with_default_max();

        // header split in two, then content split
        mock.feed_read_data(&bytes[..3]);
        assert!(reader.read_frame(&mut stream).unwrap().is_none());
        mock.feed_read_data(&bytes[3..12]);
        assert!(reader.read_frame(&mut stream).unwrap().is_none());
        assert!(reader.is_partial());
        mock.feed_read_data(&bytes[12..]);

        let frame = reader.read_frame(&mut stream).unwrap().unwrap();
        let packet = Packet::from_content(&frame.header, &frame.content).unwrap();
        assert_eq!(packet.body().unwrap().as_slice(), b"0123456789");
        assert!(!reader.is_partial());
    }

    #[test]
    fn test_bad_sync_rejected() {
        let mut bytes = publish("A", b"x");
        bytes[5] = 0;
        let mut reader = FrameReader::with_default_max();
        let result = reader.read_frame(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(Error::Protocol(_))));
        assert_eq!(reader.frames_rejected(), 1);
    }

    #[test]
    fn test_oversized_rejected() {
        let bytes = publish("A", &[0u8; 64]);
        let mut reader = FrameReader::new(16);
        assert!(reader.read_frame(&mut Cursor::new(bytes)).is_err());
        assert_eq!(reader.frames_rejected(), 1);
    }

    #[test]
    fn test_eof_mid_content() {
        let bytes = publish("A", b"hello");
        let mut reader = FrameReader::with_default_max();
        let result = reader.read_frame(&mut Cursor::new(&bytes[..bytes.len() - 1]));
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
