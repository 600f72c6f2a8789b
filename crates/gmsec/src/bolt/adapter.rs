// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bolt implementation of [`ConnectionInterface`].
//!
//! A message travels as one packet: the meta block carries routing
//! properties and the body carries the message fields, themselves encoded
//! as a meta block.
//!
//! ```text
//!   PUBLISH  meta { ID, TOPIC }                      body { fields.. }
//!   REQUEST  meta { ID, TOPIC, CORR_ID, REPLY_TO }   body { fields.. }
//!   REPLY    meta { ID, TOPIC, CORR_ID }             body { fields.. }
//! ```

use super::buffer::{InputBuffer, OutputBuffer};
use super::client::BoltClient;
use super::header::PacketType;
use super::meta::Meta;
use super::options::BoltOptions;
use super::packet::Packet;
use super::property::{Property, PropertyValue};
use super::shared::{LinkState, PacketHandler, StateListener};
use super::stream::{Connector, TcpConnector};
use crate::config::{Config, ConnectionConfig, REPLY_UNIQUE_ID_FIELD};
use crate::connection::{ConnectionInterface, Event, MiddlewareListener};
use crate::error::{Error, Result};
use crate::message::{FieldValue, Message, MessageKind};
use crate::status::{Status, StatusClass, StatusCode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

static SESSION_SEQ: AtomicU64 = AtomicU64::new(1);

type ListenerSlot = Arc<Mutex<Option<Weak<dyn MiddlewareListener>>>>;

fn current_listener(slot: &ListenerSlot) -> Option<Arc<dyn MiddlewareListener>> {
    slot.lock().as_ref().and_then(Weak::upgrade)
}

// ============================================================================
// Message <-> Packet
// ============================================================================

/// Encode message fields into a packet body.
pub fn encode_fields(message: &Message) -> Result<Vec<u8>> {
    let meta: Meta = message
        .fields()
        .map(|(name, value)| match value {
            FieldValue::String(s) => Property::string(name, s.as_str()),
            FieldValue::I32(v) => Property::i32(name, *v),
            FieldValue::F64(v) => Property::f64(name, *v),
            FieldValue::Bool(v) => Property::flag(name, *v),
            FieldValue::Binary(b) => Property::blob(name, b.clone()),
        })
        .collect();
    let mut bytes = vec![0u8; meta.encoded_size()];
    meta.encode(&mut OutputBuffer::new(&mut bytes))?;
    Ok(bytes)
}

/// Decode a packet body produced by [`encode_fields`] into `message`.
pub fn decode_fields(body: &[u8], message: &mut Message) -> Result<()> {
    let mut input = InputBuffer::new(body);
    let meta = Meta::decode(&mut input)?;
    for property in meta.iter() {
        let value = match property.value() {
            PropertyValue::Text(s) => FieldValue::String(s.clone()),
            PropertyValue::Bytes(b) => FieldValue::Binary(b.clone()),
            PropertyValue::I32(v) => FieldValue::I32(*v),
            PropertyValue::F64(v) => FieldValue::F64(*v),
            PropertyValue::Flag(v) => FieldValue::Bool(*v),
        };
        message.set_field(property.name(), value);
    }
    Ok(())
}

/// Build the packet carrying `message`.
pub fn message_to_packet(message: &Message, id: &str) -> Result<Packet> {
    let packet_type = match message.kind() {
        MessageKind::Publish => PacketType::Publish,
        MessageKind::Request => PacketType::Request,
        MessageKind::Reply => PacketType::Reply,
    };
    let meta = Meta::new()
        .with(Property::id(id))
        .with(Property::topic(message.subject()));
    Ok(Packet::new(packet_type)
        .with_meta(meta)
        .with_body(encode_fields(message)?))
}

/// Rebuild a message from an inbound PUBLISH/REQUEST/REPLY packet.
pub fn packet_to_message(packet: &Packet) -> Result<Message> {
    let kind = match packet.packet_type() {
        PacketType::Publish => MessageKind::Publish,
        PacketType::Request => MessageKind::Request,
        PacketType::Reply => MessageKind::Reply,
        other => {
            return Err(Error::InvalidMessage(format!(
                "{} packet does not carry a message",
                other
            )))
        }
    };
    let subject = packet
        .topic()
        .ok_or_else(|| Error::InvalidMessage("packet has no TOPIC".to_string()))?;
    let mut message = Message::new(subject, kind);
    if let Some(body) = packet.body() {
        decode_fields(body.as_slice(), &mut message)?;
    }
    Ok(message)
}

// ============================================================================
// BoltConnection
// ============================================================================

/// Connection adapter speaking bolt to a broker.
pub struct BoltConnection {
    client: BoltClient,
    listener: ListenerSlot,
    closing: Arc<AtomicBool>,
}

impl BoltConnection {
    /// Adapter for the broker named by `config.server`.
    pub fn new(config: &ConnectionConfig) -> Self {
        let options = BoltOptions::from_connection_config(config);
        let connector = Arc::new(TcpConnector::new(config.server.as_str(), &options));
        Self::with_connector(connector, options)
    }

    /// Adapter using an arbitrary stream source.
    pub fn with_connector(connector: Arc<dyn Connector>, options: BoltOptions) -> Self {
        let client_id = format!(
            "GMSEC_{}_{}",
            std::process::id(),
            SESSION_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let client = BoltClient::new(client_id, connector, options);
        let listener: ListenerSlot = Arc::new(Mutex::new(None));
        let closing = Arc::new(AtomicBool::new(false));

        let slot = listener.clone();
        client
            .shared()
            .set_reply_handler(Some(PacketHandler::new(move |packet| {
                let Some(listener) = current_listener(&slot) else {
                    return false;
                };
                match packet_to_message(packet) {
                    Ok(reply) => listener.on_reply(reply),
                    Err(e) => log::warn!("[Bolt] dropping undecodable reply: {}", e),
                }
                true
            })));

        let slot = listener.clone();
        let closing_flag = closing.clone();
        let ever_connected = AtomicBool::new(false);
        client
            .shared()
            .set_state_listener(Some(StateListener::new(move |state, reason| {
                let Some(listener) = current_listener(&slot) else {
                    return;
                };
                let (event, status) = match state {
                    LinkState::Connected => {
                        ever_connected.store(true, Ordering::Release);
                        (
                            Event::ConnectionSuccessful,
                            Status::new(
                                StatusClass::NoError,
                                StatusCode::ConnectionConnected,
                                "Connection established",
                            ),
                        )
                    }
                    LinkState::Connecting if ever_connected.load(Ordering::Acquire) => (
                        Event::ConnectionReconnect,
                        Status::new(
                            StatusClass::ConnectionError,
                            StatusCode::ConnectionReconnect,
                            "Attempting to reconnect",
                        ),
                    ),
                    LinkState::Disconnected if !closing_flag.load(Ordering::Acquire) => (
                        Event::ConnectionBroken,
                        Status::new(StatusClass::ConnectionError, StatusCode::ConnectionLost, reason),
                    ),
                    LinkState::Finished if !closing_flag.load(Ordering::Acquire) => (
                        Event::ConnectionException,
                        Status::new(StatusClass::ConnectionError, StatusCode::ConnectionLost, reason),
                    ),
                    _ => return,
                };
                listener.on_event(event, status);
            })));

        Self {
            client,
            listener,
            closing,
        }
    }

    pub fn client(&self) -> &BoltClient {
        &self.client
    }

    fn send(&self, packet: &Packet) -> Result<()> {
        self.client.send(packet)
    }
}

impl ConnectionInterface for BoltConnection {
    fn library_root_name(&self) -> &'static str {
        "gmsec_bolt"
    }

    fn library_version(&self) -> String {
        format!("gmsec_bolt v{}", env!("CARGO_PKG_VERSION"))
    }

    fn mw_info(&self) -> String {
        format!(
            "bolt (broker version {})",
            self.client
                .shared()
                .server_version()
                .unwrap_or_else(|| "unknown".to_string())
        )
    }

    fn connection_endpoint(&self) -> String {
        self.client.endpoint()
    }

    fn attach(&self, listener: Weak<dyn MiddlewareListener>) {
        *self.listener.lock() = Some(listener);
    }

    fn mw_unique_id(&self) -> String {
        self.client.shared().generate_id()
    }

    fn mw_connect(&self) -> Result<()> {
        self.closing.store(false, Ordering::Release);
        self.client.connect()
    }

    fn mw_disconnect(&self) -> Result<()> {
        self.closing.store(true, Ordering::Release);
        self.client.disconnect();
        Ok(())
    }

    fn mw_subscribe(&self, subject: &str, _config: &Config) -> Result<()> {
        self.client.subscribe(subject)
    }

    fn mw_unsubscribe(&self, subject: &str) -> Result<()> {
        self.client.unsubscribe(subject)
    }

    fn mw_publish(&self, message: &Message, _config: &Config) -> Result<()> {
        let packet = message_to_packet(message, &self.mw_unique_id())?;
        self.send(&packet)
    }

    fn mw_request(&self, request: &Message, id: &str) -> Result<()> {
        let mut packet = message_to_packet(request, id)?;
        packet.meta_mut().set(Property::corr_id(id));
        packet
            .meta_mut()
            .set(Property::reply_to(self.client.shared().client_id()));
        self.send(&packet)
    }

    fn mw_reply(&self, request: &Message, reply: &Message) -> Result<()> {
        let corr_id = reply
            .string_value(REPLY_UNIQUE_ID_FIELD)
            .or_else(|| request.string_value(REPLY_UNIQUE_ID_FIELD))
            .ok_or_else(|| {
                Error::InvalidMessage(format!("reply lacks {}", REPLY_UNIQUE_ID_FIELD))
            })?;
        let mut packet = message_to_packet(reply, &self.mw_unique_id())?;
        packet.meta_mut().set(Property::corr_id(corr_id));
        self.send(&packet)
    }

    fn mw_receive(&self, timeout: Option<Duration>) -> Result<Option<Message>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            match self.client.get(remaining) {
                Some(packet) => match packet_to_message(&packet) {
                    Ok(message) => return Ok(Some(message)),
                    Err(e) => log::debug!("[Bolt] skipping inbound {}: {}", packet.packet_type(), e),
                },
                None => {
                    if self.client.state() == LinkState::Finished {
                        return Err(Error::NotConnected);
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_packet_conversion() {
        let message = Message::new("GMSEC.SAT1.TLM", MessageKind::Request)
            .with_field("NAME", "battery")
            .with_field("VOLTS", 28.5)
            .with_field("CELLS", 12)
            .with_field("NOMINAL", true)
            .with_field("RAW", vec![0xDE, 0xAD]);

        let packet = message_to_packet(&message, "C_7").unwrap();
        assert_eq!(packet.packet_type(), PacketType::Request);
        assert_eq!(packet.id().as_deref(), Some("C_7"));
        assert_eq!(packet.topic().as_deref(), Some("GMSEC.SAT1.TLM"));

        let wire = Packet::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(packet_to_message(&wire).unwrap(), message);
    }

    #[test]
    fn test_non_message_packets_rejected() {
        assert!(matches!(
            packet_to_message(&Packet::new(PacketType::Ack)),
            Err(Error::InvalidMessage(_))
        ));
        assert!(matches!(
            packet_to_message(&Packet::new(PacketType::Publish)),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_reply_requires_correlation_id() {
        let conn = BoltConnection::with_connector(
            Arc::new(crate::bolt::stream::mock::MockConnector::new(vec![])),
            BoltOptions::default(),
        );
        let request = Message::new("A.B", MessageKind::Request);
        let reply = Message::new("A.B.REPLY", MessageKind::Reply);
        assert!(matches!(
            conn.mw_reply(&request, &reply),
            Err(Error::InvalidMessage(_))
        ));
        assert!(conn.library_version().starts_with("gmsec_bolt v"));
        assert_eq!(conn.connection_endpoint(), "mock:9100");
    }
}
