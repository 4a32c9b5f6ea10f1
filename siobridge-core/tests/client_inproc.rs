//! Client runtime against the in-process transport.

use siobridge_core::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(100);

fn no_reconnect() -> ClientOptions {
    ClientOptions::new().with_reconnect(false)
}

fn next(events: &ClientMonitor) -> ClientEvent {
    events
        .recv_timeout(WAIT)
        .expect("client event within timeout")
}

#[test]
fn test_open_and_join_namespace() {
    let server = InprocServer::bind("inproc://client-open").unwrap();
    let client = Client::with_options(no_reconnect());
    let events = client.monitor();

    let chat = client.socket("chat");
    assert_eq!(chat.namespace(), "/chat");

    client.connect("inproc://client-open").unwrap();
    let conn = server.accept_timeout(WAIT).unwrap();

    assert_eq!(next(&events), ClientEvent::Open);
    assert_eq!(conn.accept_namespace(WAIT).as_deref(), Some("/chat"));
    assert_eq!(next(&events), ClientEvent::SocketOpen("/chat".into()));
    assert!(client.opened());

    client.sync_close();
    assert_eq!(next(&events), ClientEvent::SocketClose("/chat".into()));
    assert_eq!(next(&events), ClientEvent::Close(CloseReason::Normal));
    assert!(!client.opened());
}

#[test]
fn test_same_namespace_same_socket() {
    let client = Client::new();
    let a = client.socket("/news");
    let b = client.socket("news");
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_emit_reaches_server() {
    let server = InprocServer::bind("inproc://client-emit").unwrap();
    let client = Client::with_options(no_reconnect());
    let events = client.monitor();
    let root = client.socket("/");

    client.connect("inproc://client-emit").unwrap();
    let conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(conn.accept_namespace(WAIT).as_deref(), Some("/"));
    assert_eq!(next(&events), ClientEvent::Open);
    assert_eq!(next(&events), ClientEvent::SocketOpen("/".into()));

    root.emit("message", vec![Value::string("hi")]);
    match conn.recv_timeout(WAIT) {
        Some(Packet::Event { nsp, name, args }) => {
            assert_eq!(nsp, "/");
            assert_eq!(name, "message");
            assert_eq!(args[0].get_string(), Some("hi"));
        }
        other => panic!("expected event, got {other:?}"),
    }

    client.sync_close();
}

#[test]
fn test_buffered_emits_flush_in_order() {
    let server = InprocServer::bind("inproc://client-buffered").unwrap();
    let client = Client::with_options(no_reconnect());
    let chat = client.socket("/chat");

    chat.emit("first", vec![Value::integer(1)]);
    chat.emit("second", vec![Value::integer(2)]);
    assert_eq!(chat.pending_len(), 2);

    client.connect("inproc://client-buffered").unwrap();
    let conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(conn.accept_namespace(WAIT).as_deref(), Some("/chat"));

    let names: Vec<String> = (0..2)
        .map(|_| match conn.recv_timeout(WAIT) {
            Some(Packet::Event { name, .. }) => name,
            other => panic!("expected event, got {other:?}"),
        })
        .collect();
    assert_eq!(names, ["first", "second"]);
    assert_eq!(chat.pending_len(), 0);

    client.sync_close();
}

#[test]
fn test_inbound_dispatch_and_off() {
    let server = InprocServer::bind("inproc://client-dispatch").unwrap();
    let client = Client::with_options(no_reconnect());
    let events = client.monitor();
    let chat = client.socket("/chat");

    let (tx, rx) = flume::unbounded();
    let greet_tx = tx.clone();
    chat.on("greet", move |event| {
        let text = event.message().get_string().map(str::to_owned);
        let _ = greet_tx.send(("greet", text));
    });
    chat.on("marker", move |_| {
        let _ = tx.send(("marker", None));
    });

    client.connect("inproc://client-dispatch").unwrap();
    let conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(conn.accept_namespace(WAIT).as_deref(), Some("/chat"));
    assert_eq!(next(&events), ClientEvent::Open);
    assert_eq!(next(&events), ClientEvent::SocketOpen("/chat".into()));

    conn.emit("/chat", "greet", Value::string("hello")).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), ("greet", Some("hello".into())));

    // Events without a listener, or for another namespace, are dropped
    conn.emit("/chat", "unknown", Value::null()).unwrap();
    conn.emit("/other", "greet", Value::null()).unwrap();

    assert!(chat.off("greet"));
    conn.emit("/chat", "greet", Value::string("ignored")).unwrap();
    conn.emit("/chat", "marker", Value::null()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), ("marker", None));

    client.sync_close();
}

#[test]
fn test_server_refuses_namespace() {
    let server = InprocServer::bind("inproc://client-refused").unwrap();
    let client = Client::with_options(no_reconnect());
    let events = client.monitor();
    let _admin = client.socket("/admin");

    client.connect("inproc://client-refused").unwrap();
    let conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(next(&events), ClientEvent::Open);
    assert_eq!(
        conn.reject_namespace(WAIT, "not authorized").as_deref(),
        Some("/admin")
    );
    assert_eq!(
        next(&events),
        ClientEvent::SocketError {
            nsp: "/admin".into(),
            message: "not authorized".into()
        }
    );

    client.sync_close();
    // Never joined, so no SocketClose
    assert_eq!(next(&events), ClientEvent::Close(CloseReason::Normal));
}

#[test]
fn test_socket_close_leaves_namespace() {
    let server = InprocServer::bind("inproc://client-leave").unwrap();
    let client = Client::with_options(no_reconnect());
    let events = client.monitor();
    let chat = client.socket("/chat");

    client.connect("inproc://client-leave").unwrap();
    let conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(conn.accept_namespace(WAIT).as_deref(), Some("/chat"));
    assert_eq!(next(&events), ClientEvent::Open);
    assert_eq!(next(&events), ClientEvent::SocketOpen("/chat".into()));

    chat.close();
    assert!(matches!(
        conn.recv_timeout(WAIT),
        Some(Packet::Disconnect { ref nsp }) if nsp == "/chat"
    ));
    assert_eq!(next(&events), ClientEvent::SocketClose("/chat".into()));

    // A fresh socket for the same namespace is a new registration
    let again = client.socket("/chat");
    assert!(!Arc::ptr_eq(&chat, &again));
    assert_eq!(conn.accept_namespace(WAIT).as_deref(), Some("/chat"));

    client.sync_close();
}

#[test]
fn test_reconnect_after_drop_rejoins() {
    let server = InprocServer::bind("inproc://client-reconnect").unwrap();
    let client = Client::with_options(
        ClientOptions::new()
            .with_reconnect_attempts(Some(2))
            .with_reconnect_delay(Duration::from_millis(20))
            .with_randomization_factor(0.0),
    );
    let events = client.monitor();
    let _chat = client.socket("/chat");

    let attempts = Arc::new(parking_lot::Mutex::new(Vec::new()));
    {
        let attempts = Arc::clone(&attempts);
        client.set_reconnect_listener(move |attempt, delay| attempts.lock().push((attempt, delay)));
    }

    client.connect("inproc://client-reconnect").unwrap();
    let first = server.accept_timeout(WAIT).unwrap();
    assert_eq!(first.accept_namespace(WAIT).as_deref(), Some("/chat"));
    assert_eq!(next(&events), ClientEvent::Open);
    assert_eq!(next(&events), ClientEvent::SocketOpen("/chat".into()));

    first.disconnect();
    assert_eq!(next(&events), ClientEvent::SocketClose("/chat".into()));
    assert_eq!(
        next(&events),
        ClientEvent::Reconnect {
            attempt: 1,
            delay: Duration::from_millis(20)
        }
    );
    assert_eq!(next(&events), ClientEvent::Open);

    let second = server.accept_timeout(WAIT).unwrap();
    assert_eq!(second.accept_namespace(WAIT).as_deref(), Some("/chat"));
    assert_eq!(next(&events), ClientEvent::SocketOpen("/chat".into()));
    assert_eq!(*attempts.lock(), vec![(1, Duration::from_millis(20))]);

    client.sync_close();
}

#[test]
fn test_drop_without_reconnect_closes() {
    let server = InprocServer::bind("inproc://client-drop").unwrap();
    let client = Client::with_options(no_reconnect());
    let events = client.monitor();

    let reasons = Arc::new(parking_lot::Mutex::new(Vec::new()));
    {
        let reasons = Arc::clone(&reasons);
        client.set_close_listener(move |reason| reasons.lock().push(reason));
    }

    client.connect("inproc://client-drop").unwrap();
    let conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(next(&events), ClientEvent::Open);

    conn.disconnect();
    assert_eq!(next(&events), ClientEvent::Close(CloseReason::Drop));
    assert_eq!(*reasons.lock(), vec![CloseReason::Drop]);
    assert!(!client.opened());
}

#[test]
fn test_unbound_endpoint_fails_once() {
    let client = Client::with_options(no_reconnect());
    let events = client.monitor();

    let fails = Arc::new(AtomicUsize::new(0));
    {
        let fails = Arc::clone(&fails);
        client.set_fail_listener(move || {
            fails.fetch_add(1, Ordering::SeqCst);
        });
    }

    client.connect("inproc://client-nobody-home").unwrap();
    assert_eq!(next(&events), ClientEvent::Fail);
    assert!(events.recv_timeout(QUIET).is_err());
    assert_eq!(fails.load(Ordering::SeqCst), 1);
}

#[test]
fn test_invalid_uri_fails_from_runtime() {
    let client = Client::new();
    let events = client.monitor();

    client.connect("gopher://example.com").unwrap();
    assert_eq!(next(&events), ClientEvent::Fail);
}

#[test]
fn test_remote_scheme_without_transport_fails() {
    let client = Client::new();
    let events = client.monitor();

    client.connect("ws://127.0.0.1:3000").unwrap();
    assert_eq!(next(&events), ClientEvent::Fail);
}

#[test]
fn test_close_interrupts_reconnect_wait() {
    let client = Client::with_options(
        ClientOptions::new()
            .with_reconnect_delay(Duration::from_secs(30))
            .with_reconnect_delay_max(Duration::from_secs(30)),
    );
    let events = client.monitor();

    client.connect("inproc://client-never-bound").unwrap();
    assert!(matches!(
        next(&events),
        ClientEvent::Reconnect { attempt: 1, .. }
    ));

    client.sync_close();
    assert_eq!(next(&events), ClientEvent::Close(CloseReason::Normal));
}

#[test]
fn test_sync_close_fires_close_once_before_returning() {
    let server = InprocServer::bind("inproc://client-sync-close").unwrap();
    let client = Client::with_options(no_reconnect());
    let events = client.monitor();

    let closes = Arc::new(AtomicUsize::new(0));
    {
        let closes = Arc::clone(&closes);
        client.set_close_listener(move |_| {
            closes.fetch_add(1, Ordering::SeqCst);
        });
    }

    client.connect("inproc://client-sync-close").unwrap();
    let _conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(next(&events), ClientEvent::Open);

    client.sync_close();
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    // Nothing left to close
    client.sync_close();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_connect_while_live_is_noop() {
    let server = InprocServer::bind("inproc://client-connect-twice").unwrap();
    let client = Client::with_options(no_reconnect());
    let events = client.monitor();

    client.connect("inproc://client-connect-twice").unwrap();
    let _conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(next(&events), ClientEvent::Open);

    client.connect("inproc://client-connect-twice").unwrap();
    assert!(server.accept_timeout(QUIET).is_none());

    client.sync_close();
    assert_eq!(next(&events), ClientEvent::Close(CloseReason::Normal));

    // After a close the client can connect again
    client.connect("inproc://client-connect-twice").unwrap();
    let _conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(next(&events), ClientEvent::Open);
    client.sync_close();
}

#[test]
fn test_sync_close_from_listener_does_not_deadlock() {
    let server = InprocServer::bind("inproc://client-reentrant").unwrap();
    let client = Arc::new(Client::with_options(no_reconnect()));
    let events = client.monitor();

    let weak = Arc::downgrade(&client);
    client.set_open_listener(move || {
        if let Some(client) = weak.upgrade() {
            assert!(client.is_runtime_thread());
            client.sync_close();
        }
    });

    client.connect("inproc://client-reentrant").unwrap();
    let _conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(next(&events), ClientEvent::Open);
    assert_eq!(next(&events), ClientEvent::Close(CloseReason::Normal));

    assert!(!client.is_runtime_thread());
    client.sync_close();
}

#[test]
fn test_listener_replacement_and_clear() {
    let client = Client::with_options(no_reconnect());
    let events = client.monitor();
    let (tx, rx) = flume::unbounded();

    let first = tx.clone();
    client.set_fail_listener(move || {
        let _ = first.send("first");
    });
    client.set_fail_listener(move || {
        let _ = tx.send("second");
    });

    client.connect("inproc://client-replace-nobody").unwrap();
    assert_eq!(next(&events), ClientEvent::Fail);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "second");
    assert!(rx.recv_timeout(QUIET).is_err());

    client.clear_listeners();
    client.connect("inproc://client-replace-nobody").unwrap();
    assert_eq!(next(&events), ClientEvent::Fail);
    assert!(rx.recv_timeout(QUIET).is_err());
}
