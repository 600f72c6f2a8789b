// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use crossbeam::channel::{self, Receiver, Sender};
use gmsec::bolt::BoltServer;
use gmsec::config::REPLY_UNIQUE_ID_FIELD;
use gmsec::{
    Config, ConnectionInterface, Error, Event, Message, MessageKind, MiddlewareListener, Result,
    Status,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// In-memory middleware that records every call.
///
/// Inbound traffic is injected with [`RecordingMiddleware::inject`]; with
/// `auto_reply` set, every request is answered immediately on the
/// listener.
pub struct RecordingMiddleware {
    listener: Mutex<Option<Weak<dyn MiddlewareListener>>>,
    inbound_tx: Sender<Message>,
    inbound_rx: Receiver<Message>,
    pub connects: AtomicU64,
    pub disconnects: AtomicU64,
    pub subscribed: Mutex<Vec<String>>,
    pub unsubscribed: Mutex<Vec<String>>,
    pub published: Mutex<Vec<Message>>,
    pub requests: Mutex<Vec<(String, Instant)>>,
    pub replies: Mutex<Vec<Message>>,
    pub auto_reply: AtomicBool,
    pub fail_requests: AtomicBool,
    pub fail_publish: AtomicBool,
    pub publish_delay: Mutex<Duration>,
    next_id: AtomicU64,
}

impl RecordingMiddleware {
    pub fn new() -> Arc<Self> {
        let (inbound_tx, inbound_rx) = channel::unbounded();
        Arc::new(Self {
            listener: Mutex::new(None),
            inbound_tx,
            inbound_rx,
            connects: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            subscribed: Mutex::new(Vec::new()),
            unsubscribed: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            auto_reply: AtomicBool::new(false),
            fail_requests: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            publish_delay: Mutex::new(Duration::ZERO),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn inject(&self, message: Message) {
        let _ = self.inbound_tx.send(message);
    }

    fn listener(&self) -> Option<Arc<dyn MiddlewareListener>> {
        self.listener.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Hand `reply` to the connection as if it came off the wire.
    pub fn deliver_reply(&self, reply: Message) {
        if let Some(listener) = self.listener() {
            listener.on_reply(reply);
        }
    }

    pub fn raise(&self, event: Event, status: Status) {
        if let Some(listener) = self.listener() {
            listener.on_event(event, status);
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn published_subjects(&self) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .map(|m| m.subject().to_string())
            .collect()
    }
}

impl ConnectionInterface for RecordingMiddleware {
    fn library_root_name(&self) -> &'static str {
        "gmsec_recording"
    }

    fn library_version(&self) -> String {
        "gmsec_recording v0".to_string()
    }

    fn mw_info(&self) -> String {
        "recording".to_string()
    }

    fn connection_endpoint(&self) -> String {
        "memory".to_string()
    }

    fn attach(&self, listener: Weak<dyn MiddlewareListener>) {
        *self.listener.lock() = Some(listener);
    }

    fn mw_unique_id(&self) -> String {
        format!("REC_{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn mw_connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn mw_disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn mw_subscribe(&self, subject: &str, _config: &Config) -> Result<()> {
        self.subscribed.lock().push(subject.to_string());
        Ok(())
    }

    fn mw_unsubscribe(&self, subject: &str) -> Result<()> {
        self.unsubscribed.lock().push(subject.to_string());
        Ok(())
    }

    fn mw_publish(&self, message: &Message, _config: &Config) -> Result<()> {
        let delay = *self.publish_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.fail_publish.load(Ordering::Relaxed) {
            return Err(Error::Middleware("publish rejected".to_string()));
        }
        self.published.lock().push(message.clone());
        Ok(())
    }

    fn mw_request(&self, request: &Message, id: &str) -> Result<()> {
        if self.fail_requests.load(Ordering::Relaxed) {
            return Err(Error::Middleware("request rejected".to_string()));
        }
        self.requests.lock().push((id.to_string(), Instant::now()));
        if self.auto_reply.load(Ordering::Relaxed) {
            let reply = Message::new(format!("{}.RESP", request.subject()), MessageKind::Reply)
                .with_field(REPLY_UNIQUE_ID_FIELD, id)
                .with_field("ANSWER", 42);
            self.deliver_reply(reply);
        }
        Ok(())
    }

    fn mw_reply(&self, _request: &Message, reply: &Message) -> Result<()> {
        self.replies.lock().push(reply.clone());
        Ok(())
    }

    fn mw_receive(&self, timeout: Option<Duration>) -> Result<Option<Message>> {
        let received = match timeout {
            Some(t) => self.inbound_rx.recv_timeout(t).ok(),
            None => self.inbound_rx.recv().ok(),
        };
        Ok(received)
    }
}

/// Poll `cond` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Broker on an ephemeral loopback port.
pub fn start_broker() -> BoltServer {
    BoltServer::bind("127.0.0.1:0").expect("broker bind")
}

/// Client configuration pointing at `broker`.
pub fn bolt_config(broker: &BoltServer, extra: &[&str]) -> Config {
    let server = format!("mw-server={}", broker.local_addr());
    let mut args = vec!["mw-id=bolt", server.as_str(), "mw-connect-timeout=2000"];
    args.extend_from_slice(extra);
    Config::from_args(&args)
}
