//! Sessions and channels through the C entry points, against an in-process
//! server.

use siobridge::ffi::client::*;
use siobridge::ffi::socket::*;
use siobridge::ffi::value::*;
use siobridge::handle::Handle;
use siobridge::registry::ValueRegistry;
use siobridge::ValueKind;
use siobridge_core::inproc::{InprocServer, ServerConnection};
use siobridge_core::transport::Packet;
use siobridge_core::value::Value;
use std::ffi::{c_char, c_uint, c_void, CStr, CString};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
enum Note {
    Open,
    Fail,
    Close,
    Reconnect(u32, u32),
    SocketOpen(String),
    SocketClose(String),
    Event {
        name: String,
        kind: ValueKind,
        text: Option<String>,
    },
}

type Tx = flume::Sender<Note>;

fn ptr_to<T>(value: &T) -> *mut c_void {
    (value as *const T).cast_mut().cast()
}

fn ctx(tx: &Tx) -> *mut c_void {
    ptr_to(tx)
}

unsafe fn sender<'a>(user_data: *mut c_void) -> &'a Tx {
    &*user_data.cast::<Tx>()
}

unsafe fn owned(ptr: *const c_char) -> String {
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

unsafe extern "C" fn on_open(user_data: *mut c_void) {
    let _ = sender(user_data).send(Note::Open);
}

unsafe extern "C" fn on_fail(user_data: *mut c_void) {
    let _ = sender(user_data).send(Note::Fail);
}

unsafe extern "C" fn on_close(user_data: *mut c_void) {
    let _ = sender(user_data).send(Note::Close);
}

unsafe extern "C" fn on_reconnect(attempt: c_uint, delay_ms: c_uint, user_data: *mut c_void) {
    let _ = sender(user_data).send(Note::Reconnect(attempt, delay_ms));
}

unsafe extern "C" fn on_socket_open(nsp: *const c_char, user_data: *mut c_void) {
    let _ = sender(user_data).send(Note::SocketOpen(owned(nsp)));
}

unsafe extern "C" fn on_socket_close(nsp: *const c_char, user_data: *mut c_void) {
    let _ = sender(user_data).send(Note::SocketClose(owned(nsp)));
}

unsafe extern "C" fn on_event(event: *const c_char, msg: *mut c_void, user_data: *mut c_void) {
    let text = sio_message_get_string(msg);
    let note = Note::Event {
        name: owned(event),
        kind: sio_message_get_type(msg),
        text: (!text.is_null()).then(|| owned(text)),
    };
    let _ = sender(user_data).send(note);
}

fn cstr(s: &str) -> CString {
    CString::new(s).unwrap()
}

fn live(msg: *mut c_void) -> bool {
    Handle::from_ptr(msg).is_some_and(|handle| ValueRegistry::global().contains(handle))
}

/// Client with every session listener wired to `tx`.
fn client(tx: &Tx) -> *mut c_void {
    let client = sio_client_create();
    assert!(!client.is_null());
    sio_client_set_open_listener(client, Some(on_open), ctx(tx));
    sio_client_set_fail_listener(client, Some(on_fail), ctx(tx));
    sio_client_set_close_listener(client, Some(on_close), ctx(tx));
    sio_client_set_reconnect_listener(client, Some(on_reconnect), ctx(tx));
    sio_client_set_socket_open_listener(client, Some(on_socket_open), ctx(tx));
    sio_client_set_socket_close_listener(client, Some(on_socket_close), ctx(tx));
    client
}

fn connect(client: *mut c_void, uri: &str) {
    let uri = cstr(uri);
    unsafe { sio_client_connect(client, uri.as_ptr()) };
}

fn socket(client: *mut c_void, nsp: &str) -> *mut c_void {
    let nsp = cstr(nsp);
    unsafe { sio_client_get_socket(client, nsp.as_ptr()) }
}

fn on(socket: *mut c_void, event: &str, tx: &Tx) {
    let event = cstr(event);
    unsafe { sio_socket_on(socket, event.as_ptr(), Some(on_event), ctx(tx)) };
}

fn off(socket: *mut c_void, event: &str) {
    let event = cstr(event);
    unsafe { sio_socket_off(socket, event.as_ptr()) };
}

fn emit(socket: *mut c_void, event: &str, msg: *mut c_void) {
    let event = cstr(event);
    unsafe { sio_socket_emit(socket, event.as_ptr(), msg) };
}

fn next(rx: &flume::Receiver<Note>) -> Note {
    rx.recv_timeout(WAIT).expect("notification within timeout")
}

/// Connect `client` to a fresh server and join `nsp`.
fn open(client: *mut c_void, uri: &str, nsp: &str, rx: &flume::Receiver<Note>) -> (InprocServer, ServerConnection) {
    let server = InprocServer::bind(uri).unwrap();
    connect(client, uri);
    let conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(next(rx), Note::Open);
    assert_eq!(conn.accept_namespace(WAIT).as_deref(), Some(nsp));
    assert_eq!(next(rx), Note::SocketOpen(nsp.to_string()));
    (server, conn)
}

#[test]
fn test_open_event_and_sync_close() {
    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    let chat = socket(client, "chat");
    on(chat, "greet", &tx);

    let (_server, conn) = open(client, "inproc://ffi-session-open", "/chat", &rx);
    assert_eq!(sio_client_opened(client), 1);

    conn.emit("/chat", "greet", Value::string("hello")).unwrap();
    assert_eq!(
        next(&rx),
        Note::Event {
            name: "greet".into(),
            kind: ValueKind::String,
            text: Some("hello".into()),
        }
    );

    sio_client_sync_close(client);
    // Everything was delivered before sync_close returned
    let notes: Vec<Note> = rx.try_iter().collect();
    assert_eq!(notes, [Note::SocketClose("/chat".into()), Note::Close]);
    assert_eq!(sio_client_opened(client), 0);

    sio_socket_destroy(chat);
    sio_client_destroy(client);
}

#[test]
fn test_event_without_arguments_delivers_null() {
    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    let root = socket(client, "");
    on(root, "ping", &tx);

    let (_server, conn) = open(client, "inproc://ffi-session-null", "/", &rx);
    conn.emit_args("/", "ping", Vec::new()).unwrap();
    assert_eq!(
        next(&rx),
        Note::Event {
            name: "ping".into(),
            kind: ValueKind::Null,
            text: None,
        }
    );

    sio_socket_destroy(root);
    sio_client_destroy(client);
}

#[test]
fn test_emit_reaches_server_and_caller_keeps_message() {
    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    let chat = socket(client, "/chat");

    let payload = sio_message_create_object();
    let key = cstr("n");
    unsafe { sio_message_object_set(payload, key.as_ptr(), sio_message_create_integer(7)) };

    // Buffered until the namespace is joined
    emit(chat, "update", payload);
    let (_server, conn) = open(client, "inproc://ffi-session-emit", "/chat", &rx);

    match conn.recv_timeout(WAIT) {
        Some(Packet::Event { name, args, .. }) => {
            assert_eq!(name, "update");
            assert_eq!(args.len(), 1);
            assert_eq!(args[0].object_get("n").map(|n| n.get_integer()), Some(7));
        }
        other => panic!("expected event, got {other:?}"),
    }
    assert!(live(payload));

    // Unknown message handles are dropped, not sent
    emit(chat, "nothing", std::ptr::null_mut());
    assert!(conn.recv_timeout(QUIET).is_none());

    sio_message_destroy(payload);
    sio_socket_destroy(chat);
    sio_client_destroy(client);
}

#[test]
fn test_handler_replacement_and_off() {
    let (tx, rx) = flume::unbounded();
    let (old_tx, old_rx) = flume::unbounded();
    let client = client(&tx);
    let chat = socket(client, "/chat");

    on(chat, "msg", &old_tx);
    on(chat, "msg", &tx);
    on(chat, "marker", &tx);

    let (_server, conn) = open(client, "inproc://ffi-session-replace", "/chat", &rx);

    conn.emit("/chat", "msg", Value::integer(1)).unwrap();
    assert!(matches!(next(&rx), Note::Event { ref name, .. } if name == "msg"));
    assert!(old_rx.try_recv().is_err());

    off(chat, "msg");
    conn.emit("/chat", "msg", Value::integer(2)).unwrap();
    conn.emit("/chat", "marker", Value::null()).unwrap();
    // The marker arrives after the dropped event, so that one was skipped
    assert!(matches!(next(&rx), Note::Event { ref name, .. } if name == "marker"));

    sio_socket_destroy(chat);
    sio_client_destroy(client);
}

#[test]
fn test_channels_on_same_namespace_keep_own_handlers() {
    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    let first = socket(client, "/chat");
    let second = socket(client, "chat");
    assert_ne!(first, second);

    on(first, "a", &tx);
    on(second, "b", &tx);

    let (_server, conn) = open(client, "inproc://ffi-session-shared", "/chat", &rx);

    sio_socket_destroy(first);
    conn.emit("/chat", "a", Value::null()).unwrap();
    conn.emit("/chat", "b", Value::null()).unwrap();
    assert!(matches!(next(&rx), Note::Event { ref name, .. } if name == "b"));

    sio_socket_destroy(second);
    sio_client_destroy(client);
}

struct Keeper {
    array: *mut c_void,
    kept: AtomicPtr<c_void>,
    tx: Tx,
}

unsafe extern "C" fn keep_message(_event: *const c_char, msg: *mut c_void, user_data: *mut c_void) {
    let keeper = &*user_data.cast::<Keeper>();
    keeper.kept.store(msg, Ordering::SeqCst);
    sio_message_array_push(keeper.array, msg);
    let _ = keeper.tx.send(Note::Open);
}

#[test]
fn test_callback_may_keep_message_in_container() {
    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    let chat = socket(client, "/chat");

    let keeper = Keeper {
        array: sio_message_create_array(),
        kept: AtomicPtr::new(std::ptr::null_mut()),
        tx: tx.clone(),
    };
    let event = cstr("store");
    unsafe {
        sio_socket_on(
            chat,
            event.as_ptr(),
            Some(keep_message),
            ptr_to(&keeper),
        );
    }

    let (_server, conn) = open(client, "inproc://ffi-session-keep", "/chat", &rx);
    conn.emit("/chat", "store", Value::integer(99)).unwrap();
    assert_eq!(next(&rx), Note::Open);

    let kept = keeper.kept.load(Ordering::SeqCst);
    assert!(live(kept));
    assert_eq!(sio_message_array_size(keeper.array), 1);
    assert_eq!(sio_message_get_integer(kept), 99);

    sio_socket_destroy(chat);
    sio_client_destroy(client);

    sio_message_destroy(keeper.array);
    assert!(!live(kept));
}

unsafe extern "C" fn capture_message(_event: *const c_char, msg: *mut c_void, user_data: *mut c_void) {
    let slot = &*user_data.cast::<AtomicPtr<c_void>>();
    slot.store(msg, Ordering::SeqCst);
}

#[test]
fn test_transient_message_released_after_callback() {
    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    let chat = socket(client, "/chat");
    let seen: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
    let event = cstr("tick");
    unsafe {
        sio_socket_on(
            chat,
            event.as_ptr(),
            Some(capture_message),
            ptr_to(&seen),
        );
    }
    on(chat, "marker", &tx);

    let (_server, conn) = open(client, "inproc://ffi-session-transient", "/chat", &rx);
    conn.emit("/chat", "tick", Value::integer(1)).unwrap();
    conn.emit("/chat", "marker", Value::null()).unwrap();
    assert!(matches!(next(&rx), Note::Event { ref name, .. } if name == "marker"));

    let msg = seen.load(Ordering::SeqCst);
    assert!(!msg.is_null());
    assert!(!live(msg));

    sio_socket_destroy(chat);
    sio_client_destroy(client);
}

#[test]
fn test_unbound_endpoint_fails_once() {
    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    sio_client_set_reconnect_attempts(client, 0);

    connect(client, "inproc://ffi-session-nobody");
    assert_eq!(next(&rx), Note::Fail);
    assert!(rx.recv_timeout(QUIET).is_err());

    sio_client_destroy(client);
}

#[test]
fn test_reconnect_listener_reports_attempt_and_delay() {
    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    sio_client_set_reconnect_attempts(client, 2);
    sio_client_set_reconnect_delay(client, 10);
    sio_client_set_reconnect_delay_max(client, 15);

    connect(client, "inproc://ffi-session-retry");
    let notes: Vec<Note> = (0..3).map(|_| next(&rx)).collect();
    match notes.as_slice() {
        [Note::Reconnect(1, first), Note::Reconnect(2, second), Note::Fail] => {
            // Jitter keeps delays within the cap
            assert!(*first <= 15);
            assert!(*second <= 15);
        }
        other => panic!("unexpected notifications {other:?}"),
    }

    sio_client_destroy(client);
}

#[test]
fn test_cleared_listener_is_not_called() {
    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    sio_client_set_reconnect_attempts(client, 0);
    sio_client_set_fail_listener(client, None, std::ptr::null_mut());

    connect(client, "inproc://ffi-session-cleared");
    assert!(rx.recv_timeout(QUIET).is_err());

    sio_client_destroy(client);
}

#[test]
fn test_destroy_while_connected_closes_first() {
    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    let _chat = socket(client, "/");

    let (_server, _conn) = open(client, "inproc://ffi-session-destroy", "/", &rx);
    sio_client_destroy(client);

    let closes = rx.try_iter().filter(|note| *note == Note::Close).count();
    assert_eq!(closes, 1);

    // The handle is gone; further calls are ignored
    sio_client_close(client);
    assert_eq!(sio_client_opened(client), 0);
    assert!(rx.recv_timeout(QUIET).is_err());
}

struct SelfDestruct {
    client: AtomicPtr<c_void>,
    tx: Tx,
}

unsafe extern "C" fn destroy_on_open(user_data: *mut c_void) {
    let ctx = &*user_data.cast::<SelfDestruct>();
    sio_client_destroy(ctx.client.load(Ordering::SeqCst));
    let _ = ctx.tx.send(Note::Open);
}

#[test]
fn test_destroy_from_own_callback() {
    let (tx, rx) = flume::unbounded();
    let server = InprocServer::bind("inproc://ffi-session-self-destroy").unwrap();
    let client = client(&tx);
    let ctx = SelfDestruct {
        client: AtomicPtr::new(client),
        tx: tx.clone(),
    };
    sio_client_set_open_listener(
        client,
        Some(destroy_on_open),
        ptr_to(&ctx),
    );

    connect(client, "inproc://ffi-session-self-destroy");
    let _conn = server.accept_timeout(WAIT).unwrap();
    assert_eq!(next(&rx), Note::Open);

    // Slots were cleared before the close was requested
    assert!(rx.recv_timeout(QUIET).is_err());
}

struct Slow {
    entered: flume::Sender<()>,
    finished: AtomicBool,
}

unsafe extern "C" fn slow_handler(_event: *const c_char, _msg: *mut c_void, user_data: *mut c_void) {
    let slow = &*user_data.cast::<Slow>();
    let _ = slow.entered.send(());
    std::thread::sleep(QUIET);
    slow.finished.store(true, Ordering::SeqCst);
}

#[test]
fn test_socket_destroy_waits_for_running_handler() {
    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    let chat = socket(client, "/chat");
    let (entered_tx, entered_rx) = flume::unbounded();
    let slow = Slow {
        entered: entered_tx,
        finished: AtomicBool::new(false),
    };
    let event = cstr("slow");
    unsafe { sio_socket_on(chat, event.as_ptr(), Some(slow_handler), ptr_to(&slow)) };

    let (_server, conn) = open(client, "inproc://ffi-session-slow", "/chat", &rx);
    conn.emit("/chat", "slow", Value::null()).unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();

    sio_socket_destroy(chat);
    // user_data may be freed from here on
    assert!(slow.finished.load(Ordering::SeqCst));

    conn.emit("/chat", "slow", Value::null()).unwrap();
    assert!(entered_rx.recv_timeout(QUIET).is_err());

    sio_client_destroy(client);
}

unsafe extern "C" fn count_event(_event: *const c_char, _msg: *mut c_void, user_data: *mut c_void) {
    let count = &*user_data.cast::<AtomicUsize>();
    count.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_handler_swaps_during_flood_deliver_each_event_once() {
    const EVENTS: usize = 5_000;

    let (tx, rx) = flume::unbounded();
    let client = client(&tx);
    let chat = socket(client, "/chat");
    let counts = [AtomicUsize::new(0), AtomicUsize::new(0)];
    let tick = cstr("tick");
    unsafe { sio_socket_on(chat, tick.as_ptr(), Some(count_event), ptr_to(&counts[0])) };
    on(chat, "done", &tx);

    let (_server, conn) = open(client, "inproc://ffi-session-flood", "/chat", &rx);
    let flood = std::thread::spawn(move || {
        for i in 0..EVENTS {
            conn.emit("/chat", "tick", Value::integer(i as i64)).unwrap();
        }
        conn.emit("/chat", "done", Value::null()).unwrap();
        conn
    });

    let deadline = Instant::now() + WAIT * 5;
    let mut swaps = 0usize;
    let done = loop {
        let target = &counts[swaps % 2];
        unsafe { sio_socket_on(chat, tick.as_ptr(), Some(count_event), ptr_to(target)) };
        swaps += 1;
        if let Ok(note) = rx.try_recv() {
            break note;
        }
        assert!(Instant::now() < deadline, "flood not delivered in time");
    };
    assert!(matches!(done, Note::Event { ref name, .. } if name == "done"));
    let _conn = flood.join().unwrap();

    let total = counts[0].load(Ordering::SeqCst) + counts[1].load(Ordering::SeqCst);
    assert_eq!(total, EVENTS);
    assert!(swaps > 1);

    sio_socket_destroy(chat);
    sio_client_destroy(client);
}
