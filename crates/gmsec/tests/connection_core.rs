// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection core against an in-memory middleware.
//!
//! Covers subscription bookkeeping, receive vs auto-dispatch, request
//! tracking (reply, republish, timeout), async publish and event routing.

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::unwrap_used)]

mod common;

use common::{wait_until, RecordingMiddleware};
use gmsec::config::{REPLY_UNIQUE_ID_FIELD, RESPONSE_STATUS_FIELD};
use gmsec::{
    callback, event_callback, ClosureReplyCallback, Config, Connection, ConnectionState, Error,
    Event, Message, MessageKind, ReplyCallback, Status,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn connected(args: &[&str]) -> (Connection, Arc<RecordingMiddleware>) {
    let mw = RecordingMiddleware::new();
    let conn = Connection::with_middleware(&Config::from_args(args), mw.clone()).unwrap();
    conn.connect().unwrap();
    (conn, mw)
}

fn publish_msg(subject: &str) -> Message {
    Message::new(subject, MessageKind::Publish)
}

fn request_msg(subject: &str) -> Message {
    Message::new(subject, MessageKind::Request).with_field("DIRECTIVE", "STATUS")
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_unknown_middleware_rejected() {
    let config = Config::from_args(&["mw-id=carrier-pigeon"]);
    let err = Connection::new(&config).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)), "got {:?}", err);
}

#[test]
fn test_operations_require_connect() {
    let mw = RecordingMiddleware::new();
    let conn = Connection::with_middleware(&Config::new(), mw.clone()).unwrap();
    assert_eq!(conn.state(), ConnectionState::NotConnected);
    assert!(matches!(
        conn.publish(&publish_msg("GMSEC.A.B")),
        Err(Error::NotConnected)
    ));
    assert!(matches!(conn.subscribe("GMSEC.>"), Err(Error::NotConnected)));
    assert!(matches!(conn.receive(10), Err(Error::NotConnected)));
    assert!(conn.disconnect().is_ok());
    assert_eq!(mw.disconnects.load(Ordering::Relaxed), 0);
}

#[test]
fn test_connect_twice_rejected() {
    let (conn, mw) = connected(&[]);
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert!(matches!(conn.connect(), Err(Error::AlreadyConnected)));
    assert_eq!(mw.connects.load(Ordering::Relaxed), 1);
    conn.disconnect().unwrap();
    assert_eq!(conn.state(), ConnectionState::NotConnected);
    assert_eq!(mw.disconnects.load(Ordering::Relaxed), 1);
}

#[test]
fn test_identity_comes_from_middleware() {
    let (conn, _mw) = connected(&[]);
    assert_eq!(conn.library_root_name(), "gmsec_recording");
    assert_eq!(conn.connection_endpoint(), "memory");
    conn.set_name("ground-station");
    assert_eq!(conn.name(), "ground-station");
    let other = conn.clone();
    assert_eq!(other.id(), conn.id());
}

// ============================================================================
// Subscriptions
// ============================================================================

#[test]
fn test_duplicate_subscription_rejected() {
    let (conn, mw) = connected(&[]);
    let first = conn.subscribe("GMSEC.MISSION.*.HB").unwrap();
    assert!(matches!(
        conn.subscribe("GMSEC.MISSION.*.HB"),
        Err(Error::DuplicateSubscription(_))
    ));

    let cb = callback(|_, _| {});
    let second = conn
        .subscribe_with_callback("GMSEC.MISSION.*.HB", cb.clone())
        .unwrap();
    assert!(matches!(
        conn.subscribe_with_callback("GMSEC.MISSION.*.HB", cb),
        Err(Error::DuplicateSubscription(_))
    ));

    // One middleware subscription per pattern.
    assert_eq!(*mw.subscribed.lock(), vec!["GMSEC.MISSION.*.HB".to_string()]);
    assert_eq!(first.subject_pattern(), "GMSEC.MISSION.*.HB");

    conn.unsubscribe(&first).unwrap();
    assert!(mw.unsubscribed.lock().is_empty());
    conn.unsubscribe(&second).unwrap();
    assert_eq!(*mw.unsubscribed.lock(), vec!["GMSEC.MISSION.*.HB".to_string()]);
    assert!(matches!(
        conn.unsubscribe(&second),
        Err(Error::NotSubscribed(_))
    ));
    assert!(conn.subscriptions().is_empty());
}

#[test]
fn test_invalid_patterns_rejected() {
    let (conn, mw) = connected(&[]);
    for bad in ["", "GMSEC..HB", "GMSEC.>.HB", "GMSEC.M$N"] {
        assert!(
            matches!(conn.subscribe(bad), Err(Error::InvalidSubject(_))),
            "pattern {:?} accepted",
            bad
        );
    }
    assert!(mw.subscribed.lock().is_empty());
}

#[test]
fn test_disconnect_clears_subscriptions() {
    let (conn, _mw) = connected(&[]);
    conn.subscribe("GMSEC.A.>").unwrap();
    conn.subscribe("GMSEC.B.+").unwrap();
    assert_eq!(conn.subscriptions().len(), 2);
    conn.disconnect().unwrap();
    assert!(conn.subscriptions().is_empty());
}

#[test]
fn test_concurrent_subscribe_same_pattern() {
    let (conn, mw) = connected(&[]);
    for i in 0..20 {
        let pattern = format!("GMSEC.RACE.{}", i);
        let barrier = Arc::new(Barrier::new(2));
        let workers: Vec<_> = (0..2)
            .map(|_| {
                let conn = conn.clone();
                let barrier = barrier.clone();
                let pattern = pattern.clone();
                thread::spawn(move || {
                    barrier.wait();
                    conn.subscribe(&pattern).is_ok()
                })
            })
            .collect();
        let accepted = workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 1, "pattern {} accepted {} times", pattern, accepted);
    }
    assert_eq!(mw.subscribed.lock().len(), 20);
    assert_eq!(conn.subscriptions().len(), 20);
}

// ============================================================================
// Publish / Receive / Dispatch
// ============================================================================

#[test]
fn test_publish_checks_kind_and_subject() {
    let (conn, mw) = connected(&[]);
    assert!(matches!(
        conn.publish(&request_msg("GMSEC.A.B")),
        Err(Error::InvalidMessage(_))
    ));
    assert!(matches!(
        conn.publish(&publish_msg("GMSEC.*.B")),
        Err(Error::InvalidSubject(_))
    ));
    conn.publish(&publish_msg("GMSEC.A.B")).unwrap();
    assert_eq!(mw.published_subjects(), vec!["GMSEC.A.B".to_string()]);
    assert_eq!(conn.stats().published, 1);
}

#[test]
fn test_receive_skips_excluded_subjects() {
    let (conn, mw) = connected(&[]);
    conn.subscribe("GMSEC.>").unwrap();
    conn.exclude_subject("GMSEC.NOISY.>").unwrap();

    mw.inject(publish_msg("GMSEC.NOISY.LOG"));
    mw.inject(publish_msg("GMSEC.MISSION.HB"));
    let msg = conn.receive(500).unwrap().unwrap();
    assert_eq!(msg.subject(), "GMSEC.MISSION.HB");

    assert!(conn.receive(30).unwrap().is_none());

    assert!(conn.remove_excluded_subject("GMSEC.NOISY.>"));
    mw.inject(publish_msg("GMSEC.NOISY.LOG"));
    assert_eq!(
        conn.receive(500).unwrap().unwrap().subject(),
        "GMSEC.NOISY.LOG"
    );
    assert_eq!(conn.stats().received, 2);
}

#[test]
fn test_receive_rejected_while_auto_dispatching() {
    let (conn, mw) = connected(&[]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        conn.subscribe_with_callback(
            "GMSEC.MISSION.>",
            callback(move |_, msg| seen.lock().push(msg.subject().to_string())),
        )
        .unwrap();
    }

    assert!(conn.start_auto_dispatch().unwrap());
    assert!(!conn.start_auto_dispatch().unwrap());
    assert!(matches!(conn.receive(10), Err(Error::AutoDispatchActive)));

    mw.inject(publish_msg("GMSEC.MISSION.SAT1.HB"));
    mw.inject(publish_msg("GMSEC.OTHER.HB"));
    mw.inject(publish_msg("GMSEC.MISSION.SAT2.HB"));
    assert!(wait_until(Duration::from_secs(2), || seen.lock().len() == 2));

    assert!(conn.stop_auto_dispatch(true).unwrap());
    assert!(!conn.is_auto_dispatching());
    assert_eq!(
        *seen.lock(),
        vec![
            "GMSEC.MISSION.SAT1.HB".to_string(),
            "GMSEC.MISSION.SAT2.HB".to_string()
        ]
    );
    assert!(conn.receive(10).unwrap().is_none());
}

#[test]
fn test_stop_auto_dispatch_from_callback() {
    let (conn, mw) = connected(&[]);
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = calls.clone();
        conn.subscribe_with_callback(
            "GMSEC.STOP",
            callback(move |c, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                assert!(c.stop_auto_dispatch(true).unwrap());
            }),
        )
        .unwrap();
    }
    assert!(conn.start_auto_dispatch().unwrap());
    mw.inject(publish_msg("GMSEC.STOP"));
    assert!(wait_until(Duration::from_secs(2), || !conn.is_auto_dispatching()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_manual_dispatch_runs_matching_callbacks() {
    let (conn, _mw) = connected(&[]);
    let hits = Arc::new(AtomicUsize::new(0));
    for pattern in ["GMSEC.A.*", "GMSEC.A.+", "GMSEC.B.>"] {
        let hits = hits.clone();
        conn.subscribe_with_callback(
            pattern,
            callback(move |_, _| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    }
    conn.dispatch(&publish_msg("GMSEC.A.X"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Async publish
// ============================================================================

#[test]
fn test_async_publish_preserves_order() {
    let (conn, mw) = connected(&["gmsec-async-publish=true", "gmsec-async-publish-queue-depth=8"]);
    *mw.publish_delay.lock() = Duration::from_millis(1);
    for i in 0..40 {
        conn.publish(&publish_msg(&format!("GMSEC.ASYNC.M{}", i)))
            .unwrap();
    }
    conn.disconnect().unwrap();

    let subjects = mw.published_subjects();
    assert_eq!(subjects.len(), 40);
    for (i, subject) in subjects.iter().enumerate() {
        assert_eq!(*subject, format!("GMSEC.ASYNC.M{}", i));
    }
    assert_eq!(conn.publish_queue_len(), 0);
}

#[test]
fn test_publish_failure_callback_can_reenter_connection() {
    let (conn, mw) = connected(&["gmsec-async-publish=true", "gmsec-async-publish-queue-depth=1"]);
    mw.fail_publish.store(true, Ordering::Relaxed);

    let failures = Arc::new(AtomicUsize::new(0));
    let nested_publish = Arc::new(Mutex::new(None));
    {
        let failures = failures.clone();
        let nested_publish = nested_publish.clone();
        conn.register_event_callback(
            Event::MsgPublishFailure,
            event_callback(move |c, _, _| {
                thread::sleep(Duration::from_millis(100));
                let _ = c.publish_queue_len();
                let mut nested = nested_publish.lock();
                if nested.is_none() {
                    *nested = Some(c.publish(&publish_msg("GMSEC.ASYNC.NESTED")));
                }
                failures.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    let done = Arc::new(AtomicBool::new(false));
    let producer = {
        let conn = conn.clone();
        let done = done.clone();
        thread::spawn(move || {
            for i in 0..4 {
                conn.publish(&publish_msg(&format!("GMSEC.ASYNC.F{}", i))).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst)));
    producer.join().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        failures.load(Ordering::SeqCst) == 4
    }));
    // Publishing from the worker goes straight to the middleware.
    assert!(matches!(
        nested_publish.lock().take(),
        Some(Err(Error::Middleware(_)))
    ));
    conn.disconnect().unwrap();
}

// ============================================================================
// Request / Reply
// ============================================================================

#[test]
fn test_blocking_request_gets_reply() {
    let (conn, mw) = connected(&[]);
    mw.auto_reply.store(true, Ordering::Relaxed);

    let reply = conn
        .request(&request_msg("GMSEC.MISSION.SAT1.REQ"), 2000, -1)
        .unwrap()
        .unwrap();
    assert_eq!(reply.kind(), MessageKind::Reply);
    assert_eq!(reply.i32_value("ANSWER"), Some(42));
    assert!(reply.has_field(REPLY_UNIQUE_ID_FIELD));
    assert_eq!(mw.request_count(), 1);

    let stats = conn.stats();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.replies, 1);
}

#[test]
fn test_tracking_field_removed_when_configured() {
    let (conn, mw) = connected(&["gmsec-remove-tracking-fields=true"]);
    mw.auto_reply.store(true, Ordering::Relaxed);
    let reply = conn
        .request(&request_msg("GMSEC.MISSION.SAT1.REQ"), 2000, -1)
        .unwrap()
        .unwrap();
    assert!(!reply.has_field(REPLY_UNIQUE_ID_FIELD));
}

#[test]
fn test_request_times_out_after_republishing() {
    let (conn, mw) = connected(&[]);
    let timeouts = Arc::new(AtomicUsize::new(0));
    {
        let timeouts = timeouts.clone();
        conn.register_event_callback(
            Event::RequestTimeout,
            event_callback(move |_, _, event| {
                assert_eq!(event, Event::RequestTimeout);
                timeouts.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    let reply = conn
        .request(&request_msg("GMSEC.MISSION.SAT1.REQ"), 400, 100)
        .unwrap();
    assert!(reply.is_none());

    let sends = mw.request_count();
    assert!((3..=6).contains(&sends), "sent {} times", sends);
    assert!(wait_until(Duration::from_secs(1), || {
        timeouts.load(Ordering::SeqCst) == 1
    }));
    assert!(wait_until(Duration::from_secs(1), || conn.pending_requests() == 0));

    // Every transmission carries the same correlation id.
    let requests = mw.requests.lock();
    assert!(requests.iter().all(|(id, _)| *id == requests[0].0));
}

#[test]
fn test_request_send_failure_reported() {
    let (conn, mw) = connected(&[]);
    mw.fail_requests.store(true, Ordering::Relaxed);
    let err = conn
        .request(&request_msg("GMSEC.MISSION.SAT1.REQ"), 1000, -1)
        .unwrap_err();
    assert!(matches!(err, Error::RequestFailed(_)), "got {:?}", err);

    let cb = Arc::new(ClosureReplyCallback::new(|_, _, _| {}));
    let err = conn
        .request_with_callback(&request_msg("GMSEC.MISSION.SAT1.REQ"), 1000, cb, -1)
        .unwrap_err();
    assert!(matches!(err, Error::RequestFailed(_)), "got {:?}", err);
}

#[test]
fn test_request_with_callback_delivers_reply() {
    let (conn, mw) = connected(&[]);
    mw.auto_reply.store(true, Ordering::Relaxed);

    let replies = Arc::new(Mutex::new(Vec::new()));
    let cb = {
        let replies = replies.clone();
        Arc::new(ClosureReplyCallback::new(move |_, request: &Message, reply: &Message| {
            replies
                .lock()
                .push((request.subject().to_string(), reply.i32_value("ANSWER")));
        }))
    };
    let id = conn
        .request_with_callback(&request_msg("GMSEC.MISSION.SAT1.REQ"), 2000, cb, -1)
        .unwrap();
    assert!(id.starts_with("REC_"));
    assert!(wait_until(Duration::from_secs(2), || replies.lock().len() == 1));
    assert_eq!(
        replies.lock()[0],
        ("GMSEC.MISSION.SAT1.REQ".to_string(), Some(42))
    );
}

#[test]
fn test_blocking_request_from_reply_callback_rejected() {
    let (conn, mw) = connected(&[]);
    mw.auto_reply.store(true, Ordering::Relaxed);

    let nested = Arc::new(Mutex::new(None));
    let cb = {
        let nested = nested.clone();
        Arc::new(ClosureReplyCallback::new(move |c: &Connection, _: &Message, _: &Message| {
            let result = c.request(&request_msg("GMSEC.NESTED.REQ"), 100, -1);
            *nested.lock() = Some(matches!(result, Err(Error::InvalidState(_))));
        }))
    };
    conn.request_with_callback(&request_msg("GMSEC.OUTER.REQ"), 2000, cb, -1)
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || nested.lock().is_some()));
    assert_eq!(*nested.lock(), Some(true));
}

#[test]
fn test_cancel_request_releases_waiter() {
    let (conn, mw) = connected(&[]);
    let worker = {
        let conn = conn.clone();
        std::thread::spawn(move || conn.request(&request_msg("GMSEC.SLOW.REQ"), -1, -1))
    };
    assert!(wait_until(Duration::from_secs(2), || mw.request_count() == 1));
    let id = mw.requests.lock()[0].0.clone();
    conn.cancel_request(&id);
    let result = worker.join().unwrap();
    assert!(matches!(result, Err(Error::RequestFailed(_))));
}

/// Reply callback recording replies and when the first event arrived.
struct TimingCallback {
    started: Instant,
    replies: AtomicUsize,
    event: Mutex<Option<(Event, Duration)>>,
}

impl TimingCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            replies: AtomicUsize::new(0),
            event: Mutex::new(None),
        })
    }
}

impl ReplyCallback for TimingCallback {
    fn on_reply(&self, _connection: &Connection, _request: &Message, _reply: &Message) {
        self.replies.fetch_add(1, Ordering::SeqCst);
    }

    fn on_event(&self, _connection: &Connection, _status: &Status, event: Event) {
        let mut slot = self.event.lock();
        if slot.is_none() {
            *slot = Some((event, self.started.elapsed()));
        }
    }
}

#[test]
fn test_callback_request_times_out_without_reply() {
    let (conn, mw) = connected(&[]);
    let cb = TimingCallback::new();
    conn.request_with_callback(&request_msg("GMSEC.MISSION.SAT1.REQ"), 100, cb.clone(), -1)
        .unwrap();

    assert!(wait_until(Duration::from_secs(2), || cb.event.lock().is_some()));
    let (event, elapsed) = (*cb.event.lock()).unwrap();
    assert_eq!(event, Event::RequestTimeout);
    assert!(
        elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(300),
        "timed out after {:?}",
        elapsed
    );
    assert_eq!(cb.replies.load(Ordering::SeqCst), 0);
    assert_eq!(mw.request_count(), 1);
    assert!(wait_until(Duration::from_secs(1), || conn.pending_requests() == 0));
}

#[test]
fn test_multi_response_request_stays_pending_until_cancelled() {
    let (conn, mw) = connected(&["gmsec-multi-resp=true"]);
    let cb = TimingCallback::new();
    let id = conn
        .request_with_callback(&request_msg("GMSEC.MISSION.SAT1.REQ"), -1, cb.clone(), -1)
        .unwrap();

    for status in [1, 2, 2] {
        mw.deliver_reply(
            Message::new("GMSEC.MISSION.SAT1.RESP", MessageKind::Reply)
                .with_field(REPLY_UNIQUE_ID_FIELD, id.as_str())
                .with_field(RESPONSE_STATUS_FIELD, status),
        );
    }
    assert!(wait_until(Duration::from_secs(2), || {
        cb.replies.load(Ordering::SeqCst) == 3
    }));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(cb.replies.load(Ordering::SeqCst), 3);
    assert_eq!(conn.pending_requests(), 1);
    assert!(cb.event.lock().is_none());

    conn.cancel_request(&id);
    assert!(wait_until(Duration::from_secs(1), || conn.pending_requests() == 0));
    assert_eq!(cb.replies.load(Ordering::SeqCst), 3);
}

#[test]
fn test_disconnect_while_reply_callback_issues_request() {
    let (conn, mw) = connected(&[]);
    mw.auto_reply.store(true, Ordering::Relaxed);

    let entered = Arc::new(AtomicBool::new(false));
    let nested = Arc::new(Mutex::new(None));
    let cb = {
        let entered = entered.clone();
        let nested = nested.clone();
        Arc::new(ClosureReplyCallback::new(move |c: &Connection, _: &Message, _: &Message| {
            entered.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            let follow_up = Arc::new(ClosureReplyCallback::new(|_, _, _| {}));
            *nested.lock() =
                Some(c.request_with_callback(&request_msg("GMSEC.NESTED.REQ"), 1000, follow_up, -1));
        }))
    };
    conn.request_with_callback(&request_msg("GMSEC.OUTER.REQ"), 2000, cb, -1)
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || entered.load(Ordering::SeqCst)));

    let started = Instant::now();
    conn.disconnect().unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "disconnect took {:?}",
        started.elapsed()
    );

    assert!(matches!(nested.lock().take(), Some(Err(Error::NotConnected))));
    assert_eq!(conn.state(), ConnectionState::NotConnected);
    assert_eq!(conn.pending_requests(), 0);
    assert_eq!(mw.request_count(), 1);
}

#[test]
fn test_reply_carries_correlation_id() {
    let (conn, mw) = connected(&[]);
    let request = request_msg("GMSEC.MISSION.SAT1.REQ").with_field(REPLY_UNIQUE_ID_FIELD, "REQ_7");
    let reply = Message::new("GMSEC.MISSION.SAT1.RESP", MessageKind::Reply);
    conn.reply(&request, &reply).unwrap();
    assert_eq!(
        mw.replies.lock()[0].string_value(REPLY_UNIQUE_ID_FIELD),
        Some("REQ_7".to_string())
    );

    let untagged = request_msg("GMSEC.MISSION.SAT1.REQ");
    assert!(matches!(
        conn.reply(&untagged, &reply),
        Err(Error::InvalidMessage(_))
    ));
    assert!(matches!(
        conn.reply(&request, &publish_msg("GMSEC.X")),
        Err(Error::InvalidMessage(_))
    ));
}

// ============================================================================
// Events
// ============================================================================

#[test]
fn test_event_routing_and_state() {
    let (conn, mw) = connected(&[]);
    let specific = Arc::new(Mutex::new(Vec::new()));
    let all = Arc::new(Mutex::new(Vec::new()));
    {
        let specific = specific.clone();
        conn.register_event_callback(
            Event::ConnectionBroken,
            event_callback(move |_, status: &Status, event| {
                specific.lock().push((event, status.is_error()));
            }),
        );
    }
    {
        let all = all.clone();
        conn.register_event_callback(
            Event::AllEvents,
            event_callback(move |_, _, event| all.lock().push(event)),
        );
    }

    mw.raise(
        Event::ConnectionBroken,
        Status::from(&Error::Io("link lost".to_string())),
    );
    assert_eq!(conn.state(), ConnectionState::Reconnecting);
    mw.raise(Event::ConnectionSuccessful, Status::ok("back"));
    assert_eq!(conn.state(), ConnectionState::Connected);

    assert_eq!(*specific.lock(), vec![(Event::ConnectionBroken, true)]);
    assert_eq!(*all.lock(), vec![Event::ConnectionSuccessful]);

    assert!(conn.unregister_event_callback(Event::ConnectionBroken));
    mw.raise(
        Event::ConnectionBroken,
        Status::from(&Error::Io("again".to_string())),
    );
    assert_eq!(
        *all.lock(),
        vec![Event::ConnectionSuccessful, Event::ConnectionBroken]
    );
}
