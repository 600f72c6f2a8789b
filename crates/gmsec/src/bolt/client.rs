// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bolt client session: one reader thread plus a shared write path.
//!
//! ```text
//!   caller threads                     gmsec-bolt-reader
//!   --------------                     -----------------
//!   publish/subscribe --put()--> [writer]      |
//!                                              v
//!   get() <---- Shared.incoming <---- handle() <-- FrameReader <-- stream
//!                                              |
//!                         link broken ---> reconnect loop (interval, max)
//! ```
//!
//! The reader thread owns the read side of the stream and every reconnect.
//! Callers only ever see [`Shared`] state.

use super::frame::FrameReader;
use super::header::PacketType;
use super::options::BoltOptions;
use super::packet::Packet;
use super::property::Property;
use super::shared::{LinkState, Shared};
use super::stream::{BoxedByteStream, Connector};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A bolt client session.
pub struct BoltClient {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl BoltClient {
    pub fn new(
        client_id: impl Into<String>,
        connector: Arc<dyn Connector>,
        options: BoltOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(client_id, options)),
            connector,
            running: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        }
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    pub fn state(&self) -> LinkState {
        self.shared.state()
    }

    /// Open the stream, start the reader and wait for the handshake.
    pub fn connect(&self) -> Result<()> {
        let mut reader = self.reader.lock();
        if reader.is_some() {
            return Err(Error::AlreadyConnected);
        }
        self.shared.reset();

        let stream = self.connector.connect().map_err(|e| {
            Error::Io(format!("cannot reach {}: {}", self.connector.endpoint(), e))
        })?;
        let writer = stream.try_clone_stream()?;
        self.shared.attach(writer)?;

        self.running.store(true, Ordering::Release);
        let shared = self.shared.clone();
        let connector = self.connector.clone();
        let running = self.running.clone();
        let handle = thread::Builder::new()
            .name("gmsec-bolt-reader".to_string())
            .spawn(move || {
                ReaderLoop::new(shared, connector, running).run(stream);
            })
            .map_err(|e| Error::Io(format!("failed to spawn reader thread: {}", e)))?;
        *reader = Some(handle);
        drop(reader);

        let timeout = self.shared.options().connect_timeout;
        if let Err(e) = self.shared.await_connected(timeout) {
            log::error!(
                "[Bolt] {} connect to {} failed: {}",
                self.shared.client_id(),
                self.connector.endpoint(),
                e
            );
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    /// Say goodbye, stop the reader and close the session.
    pub fn disconnect(&self) {
        if self.shared.state() == LinkState::Connected {
            let _ = self.shared.put(&Packet::new(PacketType::Goodbye));
        }
        self.running.store(false, Ordering::Release);
        self.shared.finish();
        if let Some(handle) = self.reader.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    /// Subscribe and wait for the broker's acknowledgement.
    pub fn subscribe(&self, topic: &str) -> Result<()> {
        let id = self.shared.generate_id();
        let packet = Packet::new(PacketType::Subscribe)
            .with_property(Property::id(id.as_str()))
            .with_property(Property::topic(topic));
        self.shared.put(&packet)?;
        self.shared
            .await_ack(&id, self.shared.options().ack_timeout)?;
        self.shared.add_subscription(topic);
        log::debug!("[Bolt] {} subscribed to {}", self.shared.client_id(), topic);
        Ok(())
    }

    pub fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.shared.remove_subscription(topic);
        let id = self.shared.generate_id();
        let packet = Packet::new(PacketType::Unsubscribe)
            .with_property(Property::id(id.as_str()))
            .with_property(Property::topic(topic));
        self.shared.put(&packet)?;
        self.shared.await_ack(&id, self.shared.options().ack_timeout)
    }

    /// Send a packet without waiting for any answer.
    pub fn send(&self, packet: &Packet) -> Result<()> {
        if self.shared.state() != LinkState::Connected {
            return Err(Error::NotConnected);
        }
        self.shared.put(packet)
    }

    /// Next queued inbound packet.
    pub fn get(&self, timeout: Option<Duration>) -> Option<Packet> {
        self.shared.get_input(timeout)
    }
}

impl Drop for BoltClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// Reader thread
// ============================================================================

struct ReaderLoop {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    running: Arc<AtomicBool>,
    frames: FrameReader,
    pinged: bool,
}

impl ReaderLoop {
    fn new(shared: Arc<Shared>, connector: Arc<dyn Connector>, running: Arc<AtomicBool>) -> Self {
        let frames = FrameReader::new(shared.options().max_packet_size);
        Self {
            shared,
            connector,
            running,
            frames,
            pinged: false,
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::Acquire) && self.shared.state() != LinkState::Finished
    }

    fn run(mut self, stream: BoxedByteStream) {
        let mut stream = Some(stream);
        while self.running() {
            match stream.as_mut() {
                Some(s) => {
                    if !self.poll(s.as_mut()) {
                        stream = None;
                        self.frames.reset();
                    }
                }
                None => match self.reconnect() {
                    Some(s) => stream = Some(s),
                    None => break,
                },
            }
        }
        log::debug!("[Bolt] {} reader exiting", self.shared.client_id());
    }

    /// Read at most one frame. Returns false once the link is unusable.
    fn poll(&mut self, stream: &mut dyn super::stream::ByteStream) -> bool {
        match self.frames.read_frame(stream) {
            Ok(Some(frame)) => {
                self.shared.note_input(frame.content.len());
                self.pinged = false;
                match Packet::from_content(&frame.header, &frame.content) {
                    Ok(mut packet) => {
                        if let Err(e) = packet.decompress_body() {
                            log::warn!(
                                "[Bolt] {} dropping {} packet: {}",
                                self.shared.client_id(),
                                packet.packet_type(),
                                e
                            );
                        } else {
                            self.shared.handle(packet);
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "[Bolt] {} dropping malformed packet: {}",
                            self.shared.client_id(),
                            e
                        );
                    }
                }
                self.shared.state() != LinkState::Disconnected
            }
            Ok(None) => self.check_idle(),
            Err(e) => {
                if self.running() {
                    self.shared.io_error(&e.to_string());
                }
                false
            }
        }
    }

    fn check_idle(&mut self) -> bool {
        if self.shared.state() == LinkState::Disconnected {
            return false;
        }
        let options = self.shared.options();
        let idle = self.shared.idle_for();
        if idle >= options.idle_limit {
            self.shared
                .io_error(&format!("no input for {:?}", idle));
            return false;
        }
        if idle >= options.idle_warn && !self.pinged {
            log::warn!(
                "[Bolt] {} no input for {:?}, pinging broker",
                self.shared.client_id(),
                idle
            );
            self.pinged = true;
            return self.shared.ping().is_ok();
        }
        true
    }

    /// Retry until a stream is attached, the attempt budget runs out or the
    /// session stops.
    fn reconnect(&mut self) -> Option<BoxedByteStream> {
        let options = self.shared.options().clone();
        let mut attempts: i32 = 0;
        loop {
            if options.max_reconnects >= 0 && attempts >= options.max_reconnects {
                log::error!(
                    "[Bolt] {} giving up after {} reconnect attempt(s)",
                    self.shared.client_id(),
                    attempts
                );
                self.shared.finish();
                return None;
            }
            if self.shared.wait_finished(options.reconnect_interval) || !self.running() {
                return None;
            }
            attempts += 1;
            log::info!(
                "[Bolt] {} reconnecting to {} (attempt {})",
                self.shared.client_id(),
                self.connector.endpoint(),
                attempts
            );

            let stream = match self.connector.connect() {
                Ok(s) => s,
                Err(e) => {
                    self.shared.reconnect_failed(&e.to_string());
                    continue;
                }
            };
            let attached = stream
                .try_clone_stream()
                .map_err(Error::from)
                .and_then(|writer| self.shared.attach(writer));
            match attached {
                Ok(()) => {
                    self.pinged = false;
                    return Some(stream);
                }
                Err(Error::Shutdown) => return None,
                Err(e) => self.shared.reconnect_failed(&e.to_string()),
            }
        }
    }
}
