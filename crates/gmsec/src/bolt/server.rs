// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal in-process bolt broker.
//!
//! Accepts clients, runs the WELCOME / NEGOTIATE handshake and routes
//! traffic by subscription pattern:
//!
//! | Inbound       | Action                                              |
//! |---------------|-----------------------------------------------------|
//! | NEGOTIATE     | ACK                                                 |
//! | SUBSCRIBE     | record TOPIC, TOPIC-2.. then ACK                    |
//! | UNSUBSCRIBE   | forget TOPIC then ACK                               |
//! | PUBLISH       | forward to every matching subscriber                |
//! | REQUEST       | remember CORR_ID -> requester, forward to subscribers |
//! | REPLY         | route to the requester by CORR_ID, else by topic    |
//! | ECHO          | echo back                                           |
//! | GOODBYE       | close the client                                    |
//!
//! One accept thread plus one reader thread per client.

use super::frame::FrameReader;
use super::header::PacketType;
use super::packet::Packet;
use super::property::Property;
use super::shared::{REASON_PROPERTY, VERSION_PROPERTY};
use crate::error::{Error, Result};
use crate::subject;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Outstanding requests remembered for reply routing.
const REQUEST_ROUTE_CAPACITY: usize = 4096;

const ACCEPT_POLL: Duration = Duration::from_millis(20);
const CLIENT_READ_TIMEOUT: Duration = Duration::from_millis(100);

struct ClientEntry {
    name: String,
    writer: Mutex<TcpStream>,
    topics: Mutex<Vec<String>>,
}

impl ClientEntry {
    fn send(&self, packet: &Packet) -> Result<()> {
        let bytes = packet.encode()?;
        let mut writer = self.writer.lock();
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    fn wants(&self, topic: &str) -> bool {
        self.topics
            .lock()
            .iter()
            .any(|pattern| subject::matches(pattern, topic))
    }
}

struct BrokerState {
    version: String,
    running: AtomicBool,
    next_client: AtomicU64,
    clients: DashMap<u64, Arc<ClientEntry>>,
    request_routes: Mutex<LruCache<String, u64>>,
    packets_routed: AtomicU64,
}

/// A running broker bound to a local address.
pub struct BoltServer {
    local_addr: SocketAddr,
    state: Arc<BrokerState>,
    accept: Option<JoinHandle<()>>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BoltServer {
    /// Bind to `address` (`127.0.0.1:0` picks a free port) and start
    /// accepting.
    pub fn bind(address: &str) -> Result<BoltServer> {
        let addr = address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::InvalidConfig(format!("cannot resolve {}", address)))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(128)?;
        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let capacity = NonZeroUsize::new(REQUEST_ROUTE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        let state = Arc::new(BrokerState {
            version: env!("CARGO_PKG_VERSION").to_string(),
            running: AtomicBool::new(true),
            next_client: AtomicU64::new(1),
            clients: DashMap::new(),
            request_routes: Mutex::new(LruCache::new(capacity)),
            packets_routed: AtomicU64::new(0),
        });
        let workers = Arc::new(Mutex::new(Vec::new()));

        let accept = {
            let state = state.clone();
            let workers = workers.clone();
            thread::Builder::new()
                .name("gmsec-broker-accept".to_string())
                .spawn(move || accept_loop(listener, state, workers))
                .map_err(|e| Error::Io(format!("failed to spawn accept thread: {}", e)))?
        };

        log::info!("[Broker] listening on {}", local_addr);
        Ok(BoltServer {
            local_addr,
            state,
            accept: Some(accept),
            workers,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        self.state.clients.len()
    }

    /// PUBLISH/REQUEST/REPLY packets delivered to at least one client.
    pub fn packets_routed(&self) -> u64 {
        self.state.packets_routed.load(Ordering::Relaxed)
    }

    /// Stop accepting, drop every client and join all threads.
    pub fn shutdown(&mut self) {
        if !self.state.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.accept.take() {
            let _ = handle.join();
        }
        for entry in self.state.clients.iter() {
            let _ = entry.value().writer.lock().shutdown(std::net::Shutdown::Both);
        }
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            let _ = handle.join();
        }
        self.state.clients.clear();
        log::info!("[Broker] {} stopped", self.local_addr);
    }
}

impl Drop for BoltServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Threads
// ============================================================================

fn accept_loop(
    listener: TcpListener,
    state: Arc<BrokerState>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    while state.running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = admit(stream, peer, &state, &workers) {
                    log::warn!("[Broker] rejecting {}: {}", peer, e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                log::warn!("[Broker] accept failed: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn admit(
    stream: TcpStream,
    peer: SocketAddr,
    state: &Arc<BrokerState>,
    workers: &Arc<Mutex<Vec<JoinHandle<()>>>>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT))?;

    let id = state.next_client.fetch_add(1, Ordering::Relaxed);
    let entry = Arc::new(ClientEntry {
        name: format!("{}#{}", peer, id),
        writer: Mutex::new(stream.try_clone()?),
        topics: Mutex::new(Vec::new()),
    });

    let welcome = Packet::new(PacketType::Welcome)
        .with_property(Property::id(format!("BROKER_{}", id)))
        .with_property(Property::string(VERSION_PROPERTY, state.version.as_str()));
    entry.send(&welcome)?;
    state.clients.insert(id, entry.clone());
    log::debug!("[Broker] client {} connected", entry.name);

    let state = state.clone();
    let handle = thread::Builder::new()
        .name("gmsec-broker-client".to_string())
        .spawn(move || {
            client_loop(id, stream, &state);
            state.clients.remove(&id);
            log::debug!("[Broker] client {} gone", entry.name);
        })
        .map_err(|e| Error::Io(format!("failed to spawn client thread: {}", e)))?;

    let mut workers = workers.lock();
    workers.retain(|h| !h.is_finished());
    workers.push(handle);
    Ok(())
}

fn client_loop(id: u64, mut stream: TcpStream, state: &BrokerState) {
    let mut frames = FrameReader::with_default_max();
    while state.running.load(Ordering::Acquire) {
        let frame = match frames.read_frame(&mut stream) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                log::debug!("[Broker] client {} read: {}", id, e);
                return;
            }
        };
        let packet = match Packet::from_content(&frame.header, &frame.content) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("[Broker] client {} sent malformed packet: {}", id, e);
                continue;
            }
        };
        if !route(id, packet, state) {
            return;
        }
    }
}

// ============================================================================
// Routing
// ============================================================================

fn reply_to_sender(id: u64, state: &BrokerState, packet: &Packet) {
    if let Some(client) = state.clients.get(&id).map(|c| c.value().clone()) {
        if let Err(e) = client.send(packet) {
            log::debug!("[Broker] answer to {} failed: {}", client.name, e);
        }
    }
}

fn ack(id: u64, state: &BrokerState, packet: &Packet) {
    let mut ack = Packet::new(PacketType::Ack);
    if let Some(packet_id) = packet.id() {
        ack = ack.with_property(Property::id(packet_id));
    }
    reply_to_sender(id, state, &ack);
}

/// Deliver to every client subscribed to `topic`. Returns the fan-out.
fn forward(state: &BrokerState, topic: &str, packet: &Packet) -> usize {
    let targets: Vec<Arc<ClientEntry>> = state
        .clients
        .iter()
        .filter(|c| c.value().wants(topic))
        .map(|c| c.value().clone())
        .collect();
    let mut delivered = 0;
    for client in targets {
        match client.send(packet) {
            Ok(()) => delivered += 1,
            Err(e) => log::debug!("[Broker] forward to {} failed: {}", client.name, e),
        }
    }
    delivered
}

/// Topics named by a SUBSCRIBE/UNSUBSCRIBE: TOPIC, then TOPIC-2, TOPIC-3...
fn packet_topics(packet: &Packet) -> Vec<String> {
    let Some(meta) = packet.meta() else {
        return Vec::new();
    };
    let mut topics: Vec<String> = meta.topic().into_iter().collect();
    let mut n = 2;
    while let Some(p) = meta.get(&format!("TOPIC-{}", n)) {
        topics.push(p.as_string());
        n += 1;
    }
    topics
}

/// Handle one client packet. Returns false when the client should be dropped.
fn route(id: u64, packet: Packet, state: &BrokerState) -> bool {
    match packet.packet_type() {
        PacketType::Negotiate => ack(id, state, &packet),
        PacketType::Subscribe | PacketType::Unsubscribe => {
            let topics = packet_topics(&packet);
            if let Some(bad) = topics.iter().find(|t| subject::validate_pattern(t).is_err()) {
                let error = Packet::new(PacketType::Error)
                    .with_property(Property::id(packet.id().unwrap_or_default()))
                    .with_property(Property::string(
                        REASON_PROPERTY,
                        format!("invalid topic {}", bad),
                    ));
                reply_to_sender(id, state, &error);
                return true;
            }
            if let Some(client) = state.clients.get(&id) {
                let mut current = client.topics.lock();
                for topic in topics {
                    if packet.packet_type() == PacketType::Subscribe {
                        if !current.contains(&topic) {
                            current.push(topic);
                        }
                    } else {
                        current.retain(|t| *t != topic);
                    }
                }
            }
            ack(id, state, &packet);
        }
        PacketType::Publish => {
            let topic = packet.topic().unwrap_or_default();
            if forward(state, &topic, &packet) > 0 {
                state.packets_routed.fetch_add(1, Ordering::Relaxed);
            }
        }
        PacketType::Request => {
            if let Some(corr_id) = packet.corr_id() {
                state.request_routes.lock().put(corr_id, id);
            }
            let topic = packet.topic().unwrap_or_default();
            if forward(state, &topic, &packet) > 0 {
                state.packets_routed.fetch_add(1, Ordering::Relaxed);
            }
        }
        PacketType::Reply => {
            let requester = packet
                .corr_id()
                .and_then(|c| state.request_routes.lock().get(&c).copied());
            let delivered = match requester.and_then(|r| state.clients.get(&r).map(|c| c.value().clone())) {
                Some(client) => usize::from(client.send(&packet).is_ok()),
                None => forward(state, &packet.topic().unwrap_or_default(), &packet),
            };
            if delivered > 0 {
                state.packets_routed.fetch_add(1, Ordering::Relaxed);
            }
        }
        PacketType::Echo => reply_to_sender(id, state, &packet),
        PacketType::Goodbye => return false,
        other => {
            log::debug!("[Broker] client {} sent unexpected {}", id, other);
        }
    }
    true
}
