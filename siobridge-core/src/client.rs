//! Client runtime.
//!
//! A [`Client`] owns at most one runtime thread at a time. `connect` spawns
//! it; the thread opens a link through the [`Transport`], joins the
//! requested namespaces, and then multiplexes two inputs until the
//! connection ends:
//!
//! - commands from the API side (join, leave, flush, close)
//! - packets from the link
//!
//! Every listener and every namespace event listener runs on this thread.
//! Listener slots are read by cloning the `Arc` out of the lock, so a
//! listener may replace listeners or call back into the client freely.
//!
//! ```text
//!   connect ──► open link ──ok──► Open ──► drive ──close──► SocketClose* ► Close(Normal)
//!                   │                        │
//!                  err                     dropped ──► SocketClose*
//!                   │                        │
//!                   └────► backoff ◄─────────┘
//!                            │ allowed: Reconnect{attempt, delay} ► wait ► open link
//!                            │ exhausted: Fail (open failed) / Close(Drop) (link dropped)
//! ```

use flume::{Receiver, RecvTimeoutError, Sender};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::monitor::{create_monitor, ClientEvent, ClientEventSender, ClientMonitor, CloseReason};
use crate::options::ClientOptions;
use crate::reconnect::ReconnectState;
use crate::socket::{normalize_namespace, Event, Socket};
use crate::transport::{InprocTransport, Link, Packet, Transport};

pub type OpenListener = Arc<dyn Fn() + Send + Sync>;
pub type FailListener = Arc<dyn Fn() + Send + Sync>;
pub type CloseListener = Arc<dyn Fn(CloseReason) + Send + Sync>;
pub type ReconnectListener = Arc<dyn Fn(u32, Duration) + Send + Sync>;
pub type SocketListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Listener slots of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Open,
    Fail,
    Close,
    Reconnect,
    SocketOpen,
    SocketClose,
}

impl ListenerKind {
    pub const ALL: [Self; 6] = [
        Self::Open,
        Self::Fail,
        Self::Close,
        Self::Reconnect,
        Self::SocketOpen,
        Self::SocketClose,
    ];
}

/// Commands from the API side to the runtime thread.
#[derive(Debug)]
pub(crate) enum Command {
    Join(String),
    Leave(String),
    Flush(String),
    Close,
}

#[derive(Default)]
struct Listeners {
    open: RwLock<Option<OpenListener>>,
    fail: RwLock<Option<FailListener>>,
    close: RwLock<Option<CloseListener>>,
    reconnect: RwLock<Option<ReconnectListener>>,
    socket_open: RwLock<Option<SocketListener>>,
    socket_close: RwLock<Option<SocketListener>>,
}

/// Clone the listener out of its slot so no lock is held while it runs.
fn current<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.read().clone()
}

struct Worker {
    commands: Sender<Command>,
    thread: JoinHandle<()>,
}

/// State shared between the API side, the runtime thread and sockets.
pub(crate) struct Shared {
    transport: Arc<dyn Transport>,
    options: Mutex<ClientOptions>,
    listeners: Listeners,
    monitors: Mutex<Vec<ClientEventSender>>,
    sockets: Mutex<HashMap<String, Arc<Socket>>>,
    worker: Mutex<Option<Worker>>,
    live: AtomicBool,
    opened: AtomicBool,
}

impl Shared {
    pub(crate) fn send_command(&self, command: Command) {
        match self.worker.lock().as_ref() {
            Some(worker) => {
                if worker.commands.send(command).is_err() {
                    trace!("[CLIENT] Runtime thread gone, command dropped");
                }
            }
            None => trace!("[CLIENT] Not connected, {:?} deferred", command),
        }
    }

    pub(crate) fn forget_socket(&self, nsp: &str) {
        self.sockets.lock().remove(nsp);
    }

    fn socket(&self, nsp: &str) -> Option<Arc<Socket>> {
        self.sockets.lock().get(nsp).cloned()
    }

    fn socket_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sockets.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn notify(&self, event: ClientEvent) {
        debug!("[CLIENT] {}", event);
        match &event {
            ClientEvent::Open => {
                if let Some(listener) = current(&self.listeners.open) {
                    listener();
                }
            }
            ClientEvent::Fail => {
                if let Some(listener) = current(&self.listeners.fail) {
                    listener();
                }
            }
            ClientEvent::Close(reason) => {
                if let Some(listener) = current(&self.listeners.close) {
                    listener(*reason);
                }
            }
            ClientEvent::Reconnect { attempt, delay } => {
                if let Some(listener) = current(&self.listeners.reconnect) {
                    listener(*attempt, *delay);
                }
            }
            ClientEvent::SocketOpen(nsp) => {
                if let Some(listener) = current(&self.listeners.socket_open) {
                    listener(nsp);
                }
            }
            ClientEvent::SocketClose(nsp) => {
                if let Some(listener) = current(&self.listeners.socket_close) {
                    listener(nsp);
                }
            }
            ClientEvent::SocketError { nsp, message } => {
                warn!("[CLIENT] Namespace {} refused: {}", nsp, message);
            }
        }
        self.monitors
            .lock()
            .retain(|monitor| monitor.send(event.clone()).is_ok());
    }
}

/// socket.io-style client.
///
/// # Examples
///
/// ```rust,no_run
/// use siobridge_core::client::Client;
/// use siobridge_core::value::Value;
///
/// let client = Client::new();
/// client.set_open_listener(|| println!("open"));
///
/// let chat = client.socket("/chat");
/// chat.on("message", |event| println!("{:?}", event.message()));
///
/// client.connect("inproc://chat-server").unwrap();
/// chat.emit("message", vec![Value::string("hello")]);
/// client.sync_close();
/// ```
pub struct Client {
    shared: Arc<Shared>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Client with default options and the in-process transport.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    #[must_use]
    pub fn with_options(options: ClientOptions) -> Self {
        Self::with_transport(InprocTransport, options)
    }

    /// Client using a custom transport.
    #[must_use]
    pub fn with_transport(transport: impl Transport, options: ClientOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport: Arc::new(transport),
                options: Mutex::new(options),
                listeners: Listeners::default(),
                monitors: Mutex::new(Vec::new()),
                sockets: Mutex::new(HashMap::new()),
                worker: Mutex::new(None),
                live: AtomicBool::new(false),
                opened: AtomicBool::new(false),
            }),
        }
    }

    /// Current options.
    #[must_use]
    pub fn options(&self) -> ClientOptions {
        self.shared.options.lock().clone()
    }

    /// Modify options; takes effect on the next `connect`.
    pub fn update_options(&self, f: impl FnOnce(&mut ClientOptions)) {
        f(&mut self.shared.options.lock());
    }

    /// Start connecting to `uri`.
    ///
    /// Returns once the runtime thread is spawned. The outcome is reported
    /// through the open / fail listeners, including URI parse errors. Calling
    /// `connect` while a runtime thread is live does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error only if the runtime thread cannot be spawned.
    pub fn connect(&self, uri: &str) -> Result<()> {
        let previous = {
            let mut slot = self.shared.worker.lock();
            if slot.is_some() && self.shared.live.load(Ordering::Acquire) {
                debug!("[CLIENT] Already connected or connecting, ignoring connect({})", uri);
                return Ok(());
            }
            slot.take()
        };

        // The previous run has delivered (or is delivering) its final
        // notification. Joining happens without the slot lock so its last
        // listener may still call back into the client; from that listener
        // itself the thread is left to exit on its own.
        if let Some(previous) = previous {
            if previous.thread.thread().id() != thread::current().id()
                && previous.thread.join().is_err()
            {
                error!("[CLIENT] Previous runtime thread panicked");
            }
        }

        let mut slot = self.shared.worker.lock();
        if slot.is_some() {
            debug!("[CLIENT] Lost connect race, ignoring connect({})", uri);
            return Ok(());
        }

        let (commands, command_rx) = flume::unbounded();
        let shared = Arc::clone(&self.shared);
        let uri = uri.to_string();

        debug!("[CLIENT] Connecting to {}", uri);
        self.shared.live.store(true, Ordering::Release);
        let thread = thread::Builder::new()
            .name("sio-client".to_string())
            .spawn(move || {
                let last = run(&shared, &uri, &command_rx);
                shared.live.store(false, Ordering::Release);
                shared.notify(last);
            })
            .map_err(|e| {
                self.shared.live.store(false, Ordering::Release);
                e
            })?;

        *slot = Some(Worker { commands, thread });
        Ok(())
    }

    /// Request teardown and return immediately.
    pub fn close(&self) {
        self.shared.send_command(Command::Close);
    }

    /// Request teardown and wait until the runtime thread has exited.
    ///
    /// When this returns the close listener has run and no further listener
    /// calls happen for this connection. From inside a listener (on the
    /// runtime thread) this cannot wait for itself and behaves like
    /// [`Client::close`].
    pub fn sync_close(&self) {
        let Some(worker) = self.shared.worker.lock().take() else {
            return;
        };

        // Already exiting if the thread is gone; nothing to wake
        let _ = worker.commands.send(Command::Close);

        if worker.thread.thread().id() == thread::current().id() {
            warn!("[CLIENT] sync_close called from the runtime thread, not waiting");
            *self.shared.worker.lock() = Some(worker);
            return;
        }

        if worker.thread.join().is_err() {
            error!("[CLIENT] Runtime thread panicked");
        }
        debug!("[CLIENT] Closed");
    }

    /// True while a link is open.
    #[must_use]
    pub fn opened(&self) -> bool {
        self.shared.opened.load(Ordering::Acquire)
    }

    /// True when called from this client's runtime thread.
    #[must_use]
    pub fn is_runtime_thread(&self) -> bool {
        let current = thread::current().id();
        self.shared
            .worker
            .lock()
            .as_ref()
            .is_some_and(|worker| worker.thread.thread().id() == current)
    }

    /// Socket for namespace `nsp`, created on first use.
    ///
    /// Requesting the same (normalized) namespace again returns the same
    /// socket.
    pub fn socket(&self, nsp: &str) -> Arc<Socket> {
        let nsp = normalize_namespace(nsp);
        let (socket, created) = {
            let mut sockets = self.shared.sockets.lock();
            match sockets.get(&nsp) {
                Some(socket) => (Arc::clone(socket), false),
                None => {
                    let socket = Arc::new(Socket::new(nsp.clone(), Arc::downgrade(&self.shared)));
                    sockets.insert(nsp.clone(), Arc::clone(&socket));
                    (socket, true)
                }
            }
        };

        if created {
            self.shared.send_command(Command::Join(nsp));
        }
        socket
    }

    /// Subscribe to a copy of every lifecycle event.
    #[must_use]
    pub fn monitor(&self) -> ClientMonitor {
        let (tx, rx) = create_monitor();
        self.shared.monitors.lock().push(tx);
        rx
    }

    pub fn set_open_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        *self.shared.listeners.open.write() = Some(Arc::new(listener));
    }

    pub fn set_fail_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        *self.shared.listeners.fail.write() = Some(Arc::new(listener));
    }

    pub fn set_close_listener(&self, listener: impl Fn(CloseReason) + Send + Sync + 'static) {
        *self.shared.listeners.close.write() = Some(Arc::new(listener));
    }

    /// Listener for scheduled reconnection attempts (1-based attempt, delay).
    pub fn set_reconnect_listener(&self, listener: impl Fn(u32, Duration) + Send + Sync + 'static) {
        *self.shared.listeners.reconnect.write() = Some(Arc::new(listener));
    }

    pub fn set_socket_open_listener(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        *self.shared.listeners.socket_open.write() = Some(Arc::new(listener));
    }

    pub fn set_socket_close_listener(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        *self.shared.listeners.socket_close.write() = Some(Arc::new(listener));
    }

    /// Empty one listener slot.
    pub fn clear_listener(&self, kind: ListenerKind) {
        let listeners = &self.shared.listeners;
        match kind {
            ListenerKind::Open => *listeners.open.write() = None,
            ListenerKind::Fail => *listeners.fail.write() = None,
            ListenerKind::Close => *listeners.close.write() = None,
            ListenerKind::Reconnect => *listeners.reconnect.write() = None,
            ListenerKind::SocketOpen => *listeners.socket_open.write() = None,
            ListenerKind::SocketClose => *listeners.socket_close.write() = None,
        }
    }

    /// Empty every listener slot.
    pub fn clear_listeners(&self) {
        for kind in ListenerKind::ALL {
            self.clear_listener(kind);
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // The runtime thread holds its own reference to `Shared`; tell it to go.
        self.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("opened", &self.opened())
            .field("sockets", &self.shared.socket_names())
            .finish()
    }
}

/// How a live connection ended.
enum Exit {
    Closed,
    Dropped,
}

/// Runtime thread body. Returns the final notification for this run.
fn run(shared: &Shared, uri: &str, commands: &Receiver<Command>) -> ClientEvent {
    let endpoint = match Endpoint::parse(uri) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!("[CLIENT] Invalid uri {}: {}", uri, e);
            return ClientEvent::Fail;
        }
    };

    let options = shared.options.lock().clone();
    let mut backoff = ReconnectState::new(&options);

    loop {
        let dropped = match shared.transport.open(&endpoint, &options) {
            Ok(link) => {
                backoff.reset();
                shared.opened.store(true, Ordering::Release);
                shared.notify(ClientEvent::Open);

                let exit = Connection::new(shared, &link).drive(commands);
                shared.opened.store(false, Ordering::Release);

                match exit {
                    Exit::Closed => return ClientEvent::Close(CloseReason::Normal),
                    Exit::Dropped => true,
                }
            }
            Err(e) if e.is_retryable() => {
                debug!("[CLIENT] Open {} failed: {}", endpoint, e);
                false
            }
            Err(e) => {
                warn!("[CLIENT] Open {} failed permanently: {}", endpoint, e);
                return ClientEvent::Fail;
            }
        };

        let Some((attempt, delay)) = backoff.next_attempt() else {
            return if dropped {
                ClientEvent::Close(CloseReason::Drop)
            } else {
                ClientEvent::Fail
            };
        };

        shared.notify(ClientEvent::Reconnect { attempt, delay });
        if !wait_for_retry(commands, delay) {
            return ClientEvent::Close(CloseReason::Normal);
        }
    }
}

/// Sleep until `delay` elapses. Returns false if a close arrived first.
fn wait_for_retry(commands: &Receiver<Command>, delay: Duration) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        match commands.recv_deadline(deadline) {
            Ok(Command::Close) | Err(RecvTimeoutError::Disconnected) => return false,
            // Joins and flushes are picked up by the next connection
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => return true,
        }
    }
}

enum Input {
    Command(std::result::Result<Command, flume::RecvError>),
    Packet(std::result::Result<Packet, flume::RecvError>),
}

/// One open link.
struct Connection<'a> {
    shared: &'a Shared,
    link: &'a Link,
    joined: Vec<String>,
}

impl<'a> Connection<'a> {
    fn new(shared: &'a Shared, link: &'a Link) -> Self {
        Self {
            shared,
            link,
            joined: Vec::new(),
        }
    }

    fn drive(mut self, commands: &Receiver<Command>) -> Exit {
        for nsp in self.shared.socket_names() {
            if self.send(Packet::Connect { nsp }).is_break() {
                return self.dropped();
            }
        }

        loop {
            let input = flume::Selector::new()
                .recv(commands, Input::Command)
                .recv(&self.link.rx, Input::Packet)
                .wait();

            let step = match input {
                Input::Command(Ok(command)) => self.handle_command(command),
                Input::Command(Err(_)) => ControlFlow::Break(Exit::Closed),
                Input::Packet(Ok(packet)) => self.handle_packet(packet),
                Input::Packet(Err(_)) => ControlFlow::Break(Exit::Dropped),
            };

            match step {
                ControlFlow::Continue(()) => {}
                ControlFlow::Break(Exit::Closed) => return self.closed(),
                ControlFlow::Break(Exit::Dropped) => return self.dropped(),
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<Exit> {
        match command {
            Command::Join(nsp) => {
                if !self.is_joined(&nsp) {
                    return self.send(Packet::Connect { nsp });
                }
                ControlFlow::Continue(())
            }
            Command::Leave(nsp) => {
                if self.leave(&nsp) {
                    self.send(Packet::Disconnect { nsp: nsp.clone() })?;
                    self.shared.notify(ClientEvent::SocketClose(nsp));
                }
                ControlFlow::Continue(())
            }
            Command::Flush(nsp) => self.flush(&nsp),
            Command::Close => ControlFlow::Break(Exit::Closed),
        }
    }

    fn handle_packet(&mut self, packet: Packet) -> ControlFlow<Exit> {
        trace!("[CLIENT] Received {:?}", packet);
        match packet {
            Packet::Connect { nsp } => {
                if self.is_joined(&nsp) {
                    return ControlFlow::Continue(());
                }
                if self.shared.socket(&nsp).is_none() {
                    // Closed before the server acknowledged the join
                    return self.send(Packet::Disconnect { nsp });
                }
                self.joined.push(nsp.clone());
                self.shared.notify(ClientEvent::SocketOpen(nsp.clone()));
                self.flush(&nsp)
            }
            Packet::Disconnect { nsp } => {
                if self.leave(&nsp) {
                    self.shared.notify(ClientEvent::SocketClose(nsp));
                }
                ControlFlow::Continue(())
            }
            Packet::ConnectError { nsp, message } => {
                self.shared.notify(ClientEvent::SocketError { nsp, message });
                ControlFlow::Continue(())
            }
            Packet::Event { nsp, name, args } => {
                match self.shared.socket(&nsp) {
                    Some(socket) => socket.dispatch(&Event::new(nsp, name, args)),
                    None => trace!("[CLIENT] Event '{}' for unknown namespace {}", name, nsp),
                }
                ControlFlow::Continue(())
            }
        }
    }

    fn flush(&mut self, nsp: &str) -> ControlFlow<Exit> {
        if !self.is_joined(nsp) {
            return ControlFlow::Continue(());
        }
        let Some(socket) = self.shared.socket(nsp) else {
            return ControlFlow::Continue(());
        };
        for (name, args) in socket.take_pending() {
            self.send(Packet::Event {
                nsp: nsp.to_string(),
                name,
                args,
            })?;
        }
        ControlFlow::Continue(())
    }

    fn send(&self, packet: Packet) -> ControlFlow<Exit> {
        trace!("[CLIENT] Sending {:?}", packet);
        match self.link.tx.send(packet) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(Exit::Dropped),
        }
    }

    fn is_joined(&self, nsp: &str) -> bool {
        self.joined.iter().any(|joined| joined == nsp)
    }

    fn leave(&mut self, nsp: &str) -> bool {
        let before = self.joined.len();
        self.joined.retain(|joined| joined != nsp);
        self.joined.len() != before
    }

    fn closed(mut self) -> Exit {
        for nsp in std::mem::take(&mut self.joined) {
            // Best effort: the peer may already be gone
            let _ = self.link.tx.send(Packet::Disconnect { nsp: nsp.clone() });
            self.shared.notify(ClientEvent::SocketClose(nsp));
        }
        Exit::Closed
    }

    fn dropped(mut self) -> Exit {
        debug!("[CLIENT] Link dropped");
        for nsp in std::mem::take(&mut self.joined) {
            self.shared.notify(ClientEvent::SocketClose(nsp));
        }
        Exit::Dropped
    }
}
