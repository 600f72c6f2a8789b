// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-session state shared between the bolt reader thread and callers.
//!
//! ```text
//!                      attach()                 handshake done
//!   Disconnected ----------------> Connecting ------------------> Connected
//!        ^                             |                              |
//!        +------------- io_error() ----+------------------------------+
//!
//!   finish() from any state --> Finished (terminal)
//! ```
//!
//! While `Connecting`, inbound packets drive the handshake phases:
//!
//! ```text
//!   Starting --WELCOME--> Negotiating --ACK--> [Resubscribing --ACK-->] Dispatching
//! ```
//!
//! [`Shared::io_error`] is the single place that tears a link down. It never
//! retries on its own; the reader thread owns reconnection.

use super::header::PacketType;
use super::meta::Meta;
use super::options::BoltOptions;
use super::packet::Packet;
use super::property::Property;
use super::stream::BoxedByteStream;
use crate::error::{Error, Result};
use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Acknowledgements kept for late waiters before the oldest are dropped.
const MAX_PENDING_ACKS: usize = 1024;

/// Name of the property carrying the broker / client protocol version.
pub const VERSION_PROPERTY: &str = "VERSION";

/// Name of the property carrying an ERROR packet's reason.
pub const REASON_PROPERTY: &str = "REASON";

// ============================================================================
// States
// ============================================================================

/// Link state of a bolt session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// No usable stream
    Disconnected,
    /// Stream open, handshake in progress
    Connecting,
    /// Handshake complete, traffic flowing
    Connected,
    /// Session closed for good
    Finished,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "DISCONNECTED",
            LinkState::Connecting => "CONNECTING",
            LinkState::Connected => "CONNECTED",
            LinkState::Finished => "FINISHED",
        };
        write!(f, "{}", s)
    }
}

/// Handshake progress while [`LinkState::Connecting`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectPhase {
    Starting,
    Negotiating,
    Resubscribing,
    Dispatching,
}

// ============================================================================
// Handlers
// ============================================================================

/// Inbound packet hook. Returns true when the packet was consumed; false
/// leaves it on the input queue.
pub struct PacketHandler {
    f: Box<dyn Fn(&Packet) -> bool + Send + Sync>,
}

impl PacketHandler {
    pub fn new(f: impl Fn(&Packet) -> bool + Send + Sync + 'static) -> Self {
        Self { f: Box::new(f) }
    }

    fn call(&self, packet: &Packet) -> bool {
        (self.f)(packet)
    }
}

/// Link state change hook, called outside of any session lock.
pub struct StateListener {
    f: Box<dyn Fn(LinkState, &str) + Send + Sync>,
}

impl StateListener {
    pub fn new(f: impl Fn(LinkState, &str) + Send + Sync + 'static) -> Self {
        Self { f: Box::new(f) }
    }

    fn call(&self, state: LinkState, reason: &str) {
        (self.f)(state, reason)
    }
}

// ============================================================================
// Counters
// ============================================================================

/// Traffic counters for one session (all links).
#[derive(Debug, Default)]
pub struct IoCounters {
    pub packets_in: AtomicU64,
    pub packets_out: AtomicU64,
    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,
    pub links_broken: AtomicU64,
    pub packets_dropped: AtomicU64,
}

/// Point-in-time copy of [`IoCounters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IoSnapshot {
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub links_broken: u64,
    pub packets_dropped: u64,
}

impl IoCounters {
    pub fn snapshot(&self) -> IoSnapshot {
        IoSnapshot {
            packets_in: self.packets_in.load(Ordering::Relaxed),
            packets_out: self.packets_out.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            links_broken: self.links_broken.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Shared
// ============================================================================

#[derive(Debug)]
struct AckRecord {
    id: String,
    /// `Some(reason)` when the broker answered with ERROR
    failure: Option<String>,
}

struct SessionState {
    state: LinkState,
    phase: ConnectPhase,
    incoming: VecDeque<Packet>,
    acks: VecDeque<AckRecord>,
    subscriptions: Vec<String>,
    handshake_id: Option<String>,
    server_version: Option<String>,
    last_input: Instant,
}

/// State shared by a session's reader thread and its callers.
pub struct Shared {
    client_id: String,
    options: BoltOptions,
    state: Mutex<SessionState>,
    cond: Condvar,
    writer: Mutex<Option<BoxedByteStream>>,
    next_id: AtomicU64,
    default_handler: ArcSwapOption<PacketHandler>,
    reply_handler: ArcSwapOption<PacketHandler>,
    state_listener: ArcSwapOption<StateListener>,
    counters: IoCounters,
}

impl Shared {
    pub fn new(client_id: impl Into<String>, options: BoltOptions) -> Self {
        Self {
            client_id: client_id.into(),
            options,
            state: Mutex::new(SessionState {
                state: LinkState::Disconnected,
                phase: ConnectPhase::Starting,
                incoming: VecDeque::new(),
                acks: VecDeque::new(),
                subscriptions: Vec::new(),
                handshake_id: None,
                server_version: None,
                last_input: Instant::now(),
            }),
            cond: Condvar::new(),
            writer: Mutex::new(None),
            next_id: AtomicU64::new(1),
            default_handler: ArcSwapOption::empty(),
            reply_handler: ArcSwapOption::empty(),
            state_listener: ArcSwapOption::empty(),
            counters: IoCounters::default(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn options(&self) -> &BoltOptions {
        &self.options
    }

    /// Session-unique packet id: `{client_id}_{counter}`.
    pub fn generate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", self.client_id, n)
    }

    pub fn state(&self) -> LinkState {
        self.state.lock().state
    }

    pub fn phase(&self) -> ConnectPhase {
        self.state.lock().phase
    }

    /// Version announced by the broker in its last WELCOME.
    pub fn server_version(&self) -> Option<String> {
        self.state.lock().server_version.clone()
    }

    pub fn counters(&self) -> IoSnapshot {
        self.counters.snapshot()
    }

    /// Handler for PUBLISH and REQUEST packets.
    pub fn set_default_handler(&self, handler: Option<PacketHandler>) {
        self.default_handler.store(handler.map(Arc::new));
    }

    /// Handler for REPLY packets.
    pub fn set_reply_handler(&self, handler: Option<PacketHandler>) {
        self.reply_handler.store(handler.map(Arc::new));
    }

    pub fn set_state_listener(&self, listener: Option<StateListener>) {
        self.state_listener.store(listener.map(Arc::new));
    }

    fn notify_state(&self, state: LinkState, reason: &str) {
        if let Some(listener) = self.state_listener.load_full() {
            listener.call(state, reason);
        }
    }

    // ========================================================================
    // Link lifecycle
    // ========================================================================

    /// Install a freshly opened stream and start the handshake.
    ///
    /// `writer` must be an independent handle onto the stream the reader
    /// thread polls.
    pub fn attach(&self, writer: BoxedByteStream) -> Result<()> {
        {
            let mut st = self.state.lock();
            if st.state == LinkState::Finished {
                return Err(Error::Shutdown);
            }
            st.state = LinkState::Connecting;
            st.phase = ConnectPhase::Starting;
            st.handshake_id = None;
            st.last_input = Instant::now();
            *self.writer.lock() = Some(writer);
            self.cond.notify_all();
        }
        self.notify_state(LinkState::Connecting, "stream opened");
        Ok(())
    }

    /// Tear the current link down.
    ///
    /// Closes the stream and moves `Connecting`/`Connected` to
    /// `Disconnected`. Calls on a link that is already down are ignored.
    pub fn io_error(&self, reason: &str) {
        {
            let mut st = self.state.lock();
            if !matches!(st.state, LinkState::Connecting | LinkState::Connected) {
                return;
            }
            st.state = LinkState::Disconnected;
            st.phase = ConnectPhase::Starting;
            st.handshake_id = None;
            self.close_writer();
            self.counters.links_broken.fetch_add(1, Ordering::Relaxed);
            self.cond.notify_all();
        }
        log::warn!("[Bolt] {} link broken: {}", self.client_id, reason);
        self.notify_state(LinkState::Disconnected, reason);
    }

    /// Close the session for good and wake every waiter.
    pub fn finish(&self) {
        {
            let mut st = self.state.lock();
            if st.state == LinkState::Finished {
                return;
            }
            st.state = LinkState::Finished;
            self.close_writer();
            self.cond.notify_all();
        }
        log::debug!("[Bolt] {} session finished", self.client_id);
        self.notify_state(LinkState::Finished, "session closed");
    }

    /// Return a finished session to `Disconnected` so it can be attached
    /// again. Queued input, acks and remembered subscriptions are dropped.
    pub fn reset(&self) {
        let mut st = self.state.lock();
        if st.state != LinkState::Finished {
            return;
        }
        st.state = LinkState::Disconnected;
        st.phase = ConnectPhase::Starting;
        st.handshake_id = None;
        st.incoming.clear();
        st.acks.clear();
        st.subscriptions.clear();
    }

    /// Mark a reconnect attempt as failed (state stays down).
    pub fn reconnect_failed(&self, reason: &str) {
        log::warn!("[Bolt] {} reconnect failed: {}", self.client_id, reason);
    }

    fn close_writer(&self) {
        if let Some(stream) = self.writer.lock().take() {
            if let Err(e) = stream.shutdown() {
                log::debug!("[Bolt] {} shutdown: {}", self.client_id, e);
            }
        }
    }

    /// Sleep up to `dur`, returning early (true) once the session finishes.
    pub fn wait_finished(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        let mut st = self.state.lock();
        while st.state != LinkState::Finished {
            if self.cond.wait_until(&mut st, deadline).timed_out() {
                return st.state == LinkState::Finished;
            }
        }
        true
    }

    /// Block until the handshake reaches `Dispatching`.
    pub fn await_connected(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock();
        loop {
            match st.state {
                LinkState::Connected => return Ok(()),
                LinkState::Finished => return Err(Error::Shutdown),
                LinkState::Disconnected => return Err(Error::NotConnected),
                LinkState::Connecting => {}
            }
            if self.cond.wait_until(&mut st, deadline).timed_out() {
                return match st.state {
                    LinkState::Connected => Ok(()),
                    _ => Err(Error::Timeout(format!(
                        "bolt handshake not complete after {:?}",
                        timeout
                    ))),
                };
            }
        }
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Encode and write one packet.
    ///
    /// Writes are serialized. A write that fails, or that makes no progress
    /// `max_stalled_writes` times in a row, breaks the link.
    pub fn put(&self, packet: &Packet) -> Result<()> {
        let mut packet = packet.clone();
        if self.options.compress && packet.body().is_some() {
            packet.compress_body()?;
        }
        let bytes = packet.encode()?;

        let mut writer = self.writer.lock();
        let stream = writer.as_mut().ok_or(Error::NotConnected)?;

        let mut written = 0;
        let mut stalled = 0;
        let outcome = loop {
            if written == bytes.len() {
                break stream.flush().map_err(Error::from);
            }
            match stream.write(&bytes[written..]) {
                Ok(0) => {
                    stalled += 1;
                    if stalled >= self.options.max_stalled_writes {
                        break Err(Error::Io(format!(
                            "write made no progress {} times",
                            stalled
                        )));
                    }
                }
                Ok(n) => {
                    written += n;
                    stalled = 0;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    stalled += 1;
                    if stalled >= self.options.max_stalled_writes {
                        break Err(Error::IoError(e));
                    }
                }
                Err(e) => break Err(Error::IoError(e)),
            }
        };
        drop(writer);

        match outcome {
            Ok(()) => {
                self.counters.packets_out.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .bytes_out
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                log::trace!(
                    "[Bolt] {} sent {} ({} bytes)",
                    self.client_id,
                    packet.packet_type(),
                    bytes.len()
                );
                Ok(())
            }
            Err(e) => {
                self.io_error(&format!("write failed: {}", e));
                Err(e)
            }
        }
    }

    /// Send an ECHO the broker is expected to bounce back.
    pub fn ping(&self) -> Result<()> {
        let packet = Packet::new(PacketType::Echo).with_property(Property::id(self.generate_id()));
        self.put(&packet)
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Record that `bytes` arrived on the link.
    pub fn note_input(&self, bytes: usize) {
        self.state.lock().last_input = Instant::now();
        self.counters.packets_in.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_in
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Time since the link last produced a packet.
    pub fn idle_for(&self) -> Duration {
        self.state.lock().last_input.elapsed()
    }

    /// Pop the next queued PUBLISH/REQUEST (or exposed REPLY).
    ///
    /// `None` timeout waits until a packet arrives or the session finishes.
    pub fn get_input(&self, timeout: Option<Duration>) -> Option<Packet> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut st = self.state.lock();
        loop {
            if let Some(packet) = st.incoming.pop_front() {
                return Some(packet);
            }
            if st.state == LinkState::Finished {
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut st, deadline).timed_out() {
                        return st.incoming.pop_front();
                    }
                }
                None => self.cond.wait(&mut st),
            }
        }
    }

    pub fn pending_input(&self) -> usize {
        self.state.lock().incoming.len()
    }

    fn enqueue(&self, packet: Packet) {
        let mut st = self.state.lock();
        if st.incoming.len() >= self.options.max_incoming {
            st.incoming.pop_front();
            let dropped = self.counters.packets_dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 1000 == 0 {
                log::warn!(
                    "[Bolt] {} inbound queue full ({}), dropped {} packet(s) so far",
                    self.client_id,
                    self.options.max_incoming,
                    dropped
                );
            }
        }
        st.incoming.push_back(packet);
        self.cond.notify_all();
    }

    fn record_ack(&self, id: String, failure: Option<String>) {
        let mut st = self.state.lock();
        if st.acks.len() >= MAX_PENDING_ACKS {
            st.acks.pop_front();
        }
        st.acks.push_back(AckRecord { id, failure });
        self.cond.notify_all();
    }

    /// True if an ACK for `id` arrived and has not been consumed yet.
    pub fn is_acknowledged(&self, id: &str) -> bool {
        self.state
            .lock()
            .acks
            .iter()
            .any(|a| a.id == id && a.failure.is_none())
    }

    /// Wait for (and consume) the broker's answer to packet `id`.
    pub fn await_ack(&self, id: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock();
        loop {
            if let Some(pos) = st.acks.iter().position(|a| a.id == id) {
                let record = st.acks.remove(pos);
                return match record.and_then(|r| r.failure) {
                    None => Ok(()),
                    Some(reason) => Err(Error::Middleware(reason)),
                };
            }
            match st.state {
                LinkState::Connected | LinkState::Connecting => {}
                LinkState::Finished => return Err(Error::Shutdown),
                LinkState::Disconnected => return Err(Error::NotConnected),
            }
            if self.cond.wait_until(&mut st, deadline).timed_out() {
                return Err(Error::Timeout(format!("no acknowledgement for {}", id)));
            }
        }
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Remember a topic so it is restored after a reconnect.
    pub fn add_subscription(&self, topic: &str) {
        let mut st = self.state.lock();
        if !st.subscriptions.iter().any(|t| t == topic) {
            st.subscriptions.push(topic.to_string());
        }
    }

    pub fn remove_subscription(&self, topic: &str) -> bool {
        let mut st = self.state.lock();
        let before = st.subscriptions.len();
        st.subscriptions.retain(|t| t != topic);
        before != st.subscriptions.len()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().subscriptions.clone()
    }

    /// SUBSCRIBE packet restoring every remembered topic, if any.
    ///
    /// The first topic uses the reserved TOPIC property; the rest are named
    /// `TOPIC-2`, `TOPIC-3`, ...
    pub fn resubscribe_packet(&self, id: &str) -> Option<Packet> {
        let topics = self.subscriptions();
        if topics.is_empty() {
            return None;
        }
        let mut meta = Meta::new().with(Property::id(id));
        for (i, topic) in topics.iter().enumerate() {
            if i == 0 {
                meta.set(Property::topic(topic.as_str()));
            } else {
                meta.set(Property::string(format!("TOPIC-{}", i + 1), topic.as_str()));
            }
        }
        Some(Packet::new(PacketType::Subscribe).with_meta(meta))
    }

    // ========================================================================
    // Inbound routing
    // ========================================================================

    /// Route one inbound packet.
    pub fn handle(&self, packet: Packet) {
        match packet.packet_type() {
            PacketType::Welcome => self.on_welcome(&packet),
            PacketType::Ack => self.on_ack(&packet),
            PacketType::Echo => {
                log::debug!(
                    "[Bolt] {} echo {}",
                    self.client_id,
                    packet.id().unwrap_or_default()
                );
            }
            PacketType::Error => self.on_error(packet),
            PacketType::Goodbye => self.io_error("broker said goodbye"),
            PacketType::Publish | PacketType::Request => {
                let consumed = self
                    .default_handler
                    .load_full()
                    .is_some_and(|h| h.call(&packet));
                if !consumed {
                    self.enqueue(packet);
                }
            }
            PacketType::Reply => {
                let consumed = self
                    .reply_handler
                    .load_full()
                    .is_some_and(|h| h.call(&packet));
                if !consumed || self.options.expose_replies {
                    self.enqueue(packet);
                }
            }
            other => {
                log::debug!(
                    "[Bolt] {} ignoring unexpected {} packet",
                    self.client_id,
                    other
                );
            }
        }
    }

    fn on_welcome(&self, packet: &Packet) {
        let version = packet
            .meta()
            .and_then(|m| m.get(VERSION_PROPERTY))
            .map(|p| p.as_string());

        let id = self.generate_id();
        {
            let mut st = self.state.lock();
            if st.state != LinkState::Connecting || st.phase != ConnectPhase::Starting {
                log::debug!("[Bolt] {} unexpected WELCOME", self.client_id);
                return;
            }
            st.server_version = version.clone();
            st.phase = ConnectPhase::Negotiating;
            st.handshake_id = Some(id.clone());
        }
        log::debug!(
            "[Bolt] {} welcomed by broker (version {})",
            self.client_id,
            version.as_deref().unwrap_or("unknown")
        );

        let negotiate = Packet::new(PacketType::Negotiate)
            .with_property(Property::id(id))
            .with_property(Property::string(VERSION_PROPERTY, env!("CARGO_PKG_VERSION")))
            .with_property(Property::compress(self.options.compress));
        // A failed write has already broken the link.
        let _ = self.put(&negotiate);
    }

    fn on_ack(&self, packet: &Packet) {
        let Some(id) = packet.id() else {
            log::debug!("[Bolt] {} ACK without ID", self.client_id);
            return;
        };

        let phase = {
            let st = self.state.lock();
            if st.state == LinkState::Connecting && st.handshake_id.as_deref() == Some(id.as_str())
            {
                Some(st.phase)
            } else {
                None
            }
        };

        match phase {
            Some(ConnectPhase::Negotiating) => {
                let resub_id = self.generate_id();
                match self.resubscribe_packet(&resub_id) {
                    Some(resub) => {
                        {
                            let mut st = self.state.lock();
                            st.phase = ConnectPhase::Resubscribing;
                            st.handshake_id = Some(resub_id);
                        }
                        log::info!(
                            "[Bolt] {} restoring {} subscription(s)",
                            self.client_id,
                            resub.meta().map_or(0, Meta::len) - 1
                        );
                        let _ = self.put(&resub);
                    }
                    None => self.complete_handshake(),
                }
            }
            Some(ConnectPhase::Resubscribing) => self.complete_handshake(),
            _ => self.record_ack(id, None),
        }
    }

    fn complete_handshake(&self) {
        {
            let mut st = self.state.lock();
            if st.state != LinkState::Connecting {
                return;
            }
            st.phase = ConnectPhase::Dispatching;
            st.state = LinkState::Connected;
            st.handshake_id = None;
            self.cond.notify_all();
        }
        log::info!("[Bolt] {} connected", self.client_id);
        self.notify_state(LinkState::Connected, "handshake complete");
    }

    fn on_error(&self, packet: Packet) {
        let reason = packet
            .meta()
            .and_then(|m| m.get(REASON_PROPERTY))
            .map(|p| p.as_string())
            .unwrap_or_else(|| "unspecified broker error".to_string());
        log::warn!("[Bolt] {} broker error: {}", self.client_id, reason);

        if let Some(id) = packet.id() {
            let handshake = {
                let st = self.state.lock();
                st.state == LinkState::Connecting && st.handshake_id.as_deref() == Some(id.as_str())
            };
            if handshake {
                self.io_error(&format!("handshake rejected: {}", reason));
                return;
            }
            self.record_ack(id, Some(reason));
        }
        self.enqueue(packet);
    }
}
