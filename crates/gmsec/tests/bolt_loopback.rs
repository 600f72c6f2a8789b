// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end tests over TCP loopback with the in-process broker.

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::unwrap_used)]

mod common;

use common::{bolt_config, start_broker, wait_until};
use gmsec::bolt::BoltServer;
use gmsec::{
    callback, event_callback, Connection, ConnectionState, Event, Message, MessageKind,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn open(broker: &BoltServer, extra: &[&str]) -> Connection {
    let conn = Connection::new(&bolt_config(broker, extra)).unwrap();
    conn.connect().unwrap();
    conn
}

#[test]
fn test_connect_reports_bolt_identity() {
    let broker = start_broker();
    let conn = open(&broker, &[]);
    assert_eq!(conn.library_root_name(), "gmsec_bolt");
    assert!(conn.library_version().starts_with("gmsec_bolt v"));
    assert_eq!(conn.connection_endpoint(), broker.local_addr().to_string());
    assert!(wait_until(Duration::from_secs(1), || broker.client_count() == 1));
    conn.disconnect().unwrap();
    assert!(wait_until(Duration::from_secs(2), || broker.client_count() == 0));
}

#[test]
fn test_connect_again_after_disconnect() {
    let broker = start_broker();
    let conn = open(&broker, &[]);
    conn.subscribe("GMSEC.LOOP.AGAIN").unwrap();
    conn.disconnect().unwrap();

    conn.connect().unwrap();
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert!(conn.subscriptions().is_empty());
    conn.subscribe("GMSEC.LOOP.AGAIN").unwrap();
    assert!(wait_until(Duration::from_secs(2), || broker.client_count() == 1));
}

#[test]
fn test_connect_refused_without_broker() {
    let broker = start_broker();
    let config = bolt_config(&broker, &["mw-max-reconnects=0"]);
    drop(broker);
    let conn = Connection::new(&config).unwrap();
    assert!(conn.connect().is_err());
    assert_eq!(conn.state(), ConnectionState::NotConnected);
}

#[test]
fn test_publish_subscribe_roundtrip() {
    let broker = start_broker();
    let subscriber = open(&broker, &[]);
    let publisher = open(&broker, &[]);

    subscriber.subscribe("GMSEC.LOOP.*.HB").unwrap();

    let msg = Message::new("GMSEC.LOOP.SAT1.HB", MessageKind::Publish)
        .with_field("COUNTER", 7)
        .with_field("COMPONENT", "loop-test")
        .with_field("NOMINAL", true)
        .with_field("TEMP", -12.5)
        .with_field("RAW", vec![0u8, 1, 2, 255]);
    publisher.publish(&msg).unwrap();
    publisher
        .publish(&Message::new("GMSEC.LOOP.SAT1.LOG", MessageKind::Publish))
        .unwrap();

    let received = subscriber.receive(2000).unwrap().unwrap();
    assert_eq!(received, msg);
    assert!(subscriber.receive(200).unwrap().is_none());

    subscriber.disconnect().unwrap();
    publisher.disconnect().unwrap();
}

#[test]
fn test_auto_dispatch_over_bolt() {
    let broker = start_broker();
    let subscriber = open(&broker, &[]);
    let publisher = open(&broker, &[]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        subscriber
            .subscribe_with_callback(
                "GMSEC.LOOP.>",
                callback(move |_, msg| seen.lock().push(msg.i32_value("N"))),
            )
            .unwrap();
    }
    assert!(subscriber.start_auto_dispatch().unwrap());

    for n in 0..20 {
        publisher
            .publish(&Message::new("GMSEC.LOOP.SEQ", MessageKind::Publish).with_field("N", n))
            .unwrap();
    }
    assert!(wait_until(Duration::from_secs(3), || seen.lock().len() == 20));
    let expected: Vec<Option<i32>> = (0..20).map(Some).collect();
    assert_eq!(*seen.lock(), expected);

    assert!(subscriber.stop_auto_dispatch(true).unwrap());
}

#[test]
fn test_request_reply_roundtrip() {
    let broker = start_broker();
    let responder = open(&broker, &[]);
    let requester = open(&broker, &[]);

    responder.subscribe("GMSEC.LOOP.REQ.>").unwrap();
    let server = {
        let responder = responder.clone();
        thread::spawn(move || {
            let request = responder.receive(3000).unwrap().unwrap();
            assert_eq!(request.kind(), MessageKind::Request);
            let reply = Message::new("GMSEC.LOOP.RESP.STATUS", MessageKind::Reply)
                .with_field("RESPONSE-STATUS", 4)
                .with_field("ECHO", request.string_value("DIRECTIVE").unwrap_or_default());
            responder.reply(&request, &reply).unwrap();
        })
    };

    let request = Message::new("GMSEC.LOOP.REQ.STATUS", MessageKind::Request)
        .with_field("DIRECTIVE", "PING");
    let reply = requester.request(&request, 3000, -1).unwrap().unwrap();
    server.join().unwrap();

    assert_eq!(reply.kind(), MessageKind::Reply);
    assert_eq!(reply.subject(), "GMSEC.LOOP.RESP.STATUS");
    assert_eq!(reply.string_value("ECHO"), Some("PING".to_string()));
    assert_eq!(requester.stats().replies, 1);
}

#[test]
fn test_request_without_responder_times_out() {
    let broker = start_broker();
    let requester = open(&broker, &[]);
    let request = Message::new("GMSEC.LOOP.NOBODY", MessageKind::Request);
    let reply = requester.request(&request, 300, -1).unwrap();
    assert!(reply.is_none());
}

#[test]
fn test_resubscribes_after_broker_restart() {
    let mut broker = start_broker();
    let addr = broker.local_addr().to_string();
    let extra = ["mw-reconnect-interval=100"];
    let subscriber = open(&broker, &extra);
    let publisher = open(&broker, &extra);

    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let events = events.clone();
        subscriber.register_event_callback(
            Event::AllEvents,
            event_callback(move |_, _, event| events.lock().push(event)),
        );
    }
    subscriber.subscribe("GMSEC.LOOP.RESTART").unwrap();

    broker.shutdown();
    assert!(wait_until(Duration::from_secs(2), || {
        subscriber.state() == ConnectionState::Reconnecting
    }));

    let _restarted = BoltServer::bind(&addr).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        subscriber.state() == ConnectionState::Connected
            && publisher.state() == ConnectionState::Connected
    }));

    publisher
        .publish(&Message::new("GMSEC.LOOP.RESTART", MessageKind::Publish))
        .unwrap();
    let received = subscriber.receive(2000).unwrap().unwrap();
    assert_eq!(received.subject(), "GMSEC.LOOP.RESTART");

    let events = events.lock();
    assert!(events.contains(&Event::ConnectionBroken));
    assert!(events.contains(&Event::ConnectionSuccessful));
}
