// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte stream abstraction under the bolt client.
//!
//! The session reads on one thread and writes from many, so a stream must
//! be cloneable into independent reader/writer handles (`TcpStream` does
//! this with `try_clone`). A [`Connector`] opens fresh streams for the
//! initial connect and for every reconnect.

use super::options::BoltOptions;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Bidirectional byte stream usable by a bolt session.
pub trait ByteStream: Read + Write + Send {
    /// Independent handle onto the same stream.
    fn try_clone_stream(&self) -> io::Result<BoxedByteStream>;

    /// Close both directions.
    fn shutdown(&self) -> io::Result<()>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Bound blocking reads; a timed-out read reports `WouldBlock`/`TimedOut`.
    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()>;
}

/// Boxed trait object for dynamic dispatch.
pub type BoxedByteStream = Box<dyn ByteStream>;

impl ByteStream for TcpStream {
    fn try_clone_stream(&self) -> io::Result<BoxedByteStream> {
        Ok(Box::new(self.try_clone()?))
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, dur)
    }
}

/// Opens streams to a broker.
pub trait Connector: Send + Sync {
    fn connect(&self) -> io::Result<BoxedByteStream>;

    /// Human-readable endpoint, e.g. `127.0.0.1:9100`.
    fn endpoint(&self) -> String;
}

/// Plain TCP connector built on `socket2`.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    nodelay: bool,
    keepalive: bool,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>, options: &BoltOptions) -> Self {
        Self {
            address: address.into(),
            connect_timeout: options.connect_timeout,
            read_timeout: options.read_timeout,
            nodelay: options.nodelay,
            keepalive: options.keepalive,
        }
    }

    fn connect_addr(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nodelay(self.nodelay)?;
        socket.set_keepalive(self.keepalive)?;
        socket.connect_timeout(&addr.into(), self.connect_timeout)?;

        let stream: TcpStream = socket.into();
        stream.set_read_timeout(Some(self.read_timeout))?;
        Ok(stream)
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> io::Result<BoxedByteStream> {
        let mut last_err = None;
        for addr in self.address.to_socket_addrs()? {
            match self.connect_addr(addr) {
                Ok(stream) => return Ok(Box::new(stream)),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address resolved for {}", self.address),
            )
        }))
    }

    fn endpoint(&self) -> String {
        self.address.clone()
    }
}

// ============================================================================
// Mock Stream for Testing
// ============================================================================
