//! Connection and its event loop.
//!
//! Each [`Connection`] owns one script host, driven by one tokio task. That
//! task is the single sequencing context: it loads the page, executes
//! outbound commands one at a time, and runs every callback.
//!
//! # Ready Sequence
//!
//! Commands issued before the adapter posts `"ready"` are held back. On
//! `"ready"` the loop runs, in order:
//!
//! 1. `initialize('<url>', <isHub>)`
//! 2. Commands issued before `"ready"`
//! 3. The `on_ready` callback
//! 4. Commands issued inside `on_ready`
//! 5. `start()`

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::page::Page;
use crate::protocol::marshal::{to_json, validate_identifier};
use crate::protocol::{Command, HubEvent, InboundMessage, Lifecycle, Request};
use crate::transport::{MessageSink, ScriptHost};

use super::builder::ConnectionBuilder;
use super::evaluation::Evaluation;
use super::hub::HubProxy;
use super::options::{ConnectionOptions, ConnectionType};

// ============================================================================
// Types
// ============================================================================

/// Callback run once, between `initialize` and `start`.
pub type ReadyCallback = Box<dyn FnOnce(&Connection) + Send>;

/// Callback for generic `{ data }` payloads.
pub type ReceivedCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Callback for the `"disconnected"` lifecycle signal.
pub type DisconnectedCallback = Arc<dyn Fn() + Send + Sync>;

/// Callbacks handed over by the builder.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub on_ready: Option<ReadyCallback>,
    pub received: Option<ReceivedCallback>,
    pub on_disconnected: Option<DisconnectedCallback>,
}

/// A queued request and its completion.
type Pending = (Request, oneshot::Sender<Result<Value>>);

// ============================================================================
// ConnectionState
// ============================================================================

/// Observable lifecycle of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Page loading, or waiting for the adapter to post `"ready"`.
    Connecting,
    /// `start()` has been evaluated.
    Ready,
    /// The adapter posted `"disconnected"` or the page socket was lost.
    Disconnected,
    /// The page failed to load, or `initialize` or `start` failed.
    Failed(String),
    /// The event loop has stopped.
    Closed,
}

// ============================================================================
// LoopCommand
// ============================================================================

/// Internal commands for the event loop.
enum LoopCommand {
    /// Execute a request and report its outcome.
    Execute {
        request: Request,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    /// Stop the event loop.
    Shutdown,
}

// ============================================================================
// ConnectionInner
// ============================================================================

/// Shared state behind every [`Connection`] clone.
pub(crate) struct ConnectionInner {
    /// Process-unique identifier for logging.
    id: ConnectionId,
    /// Target URL as given.
    url: String,
    /// Hub-style or persistent.
    connection_type: ConnectionType,
    /// Bound for `wait_ready`.
    ready_timeout: Option<Duration>,
    /// Channel to the event loop.
    command_tx: mpsc::UnboundedSender<LoopCommand>,
    /// Published lifecycle state (shared with the event loop).
    state: Arc<watch::Sender<ConnectionState>>,
    /// Lowercase hub name to proxy.
    hubs: Mutex<FxHashMap<String, HubProxy>>,
    /// Generic payload callback.
    received: Mutex<Option<ReceivedCallback>>,
    /// Disconnect callback.
    on_disconnected: Mutex<Option<DisconnectedCallback>>,
    /// Last query string assigned.
    query_string: Mutex<Option<Value>>,
}

impl ConnectionInner {
    /// Queues a command for the event loop.
    pub(crate) fn enqueue(&self, command: Command) -> Result<Evaluation> {
        let request = Request::new(command)?;
        let (evaluation, response_tx) = Evaluation::channel(request.id, request.method_name());

        trace!(
            connection_id = %self.id,
            request_id = %request.id,
            method = request.method_name(),
            "Command queued"
        );

        self.command_tx
            .send(LoopCommand::Execute {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(evaluation)
    }

    /// Looks a hub up by case-insensitive name.
    fn hub(&self, name: &str) -> Option<HubProxy> {
        self.hubs.lock().get(&name.to_lowercase()).cloned()
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A relay between native code and the hub client running in a script host.
///
/// `Connection` is cheap to clone; clones share the same host and event loop.
/// The event loop stops once every clone is dropped or [`shutdown`] is called.
///
/// [`shutdown`]: Self::shutdown
///
/// # Example
///
/// ```no_run
/// use hub_relay::{Connection, MemoryHost};
/// use serde_json::json;
///
/// # async fn example() -> hub_relay::Result<()> {
/// let host = MemoryHost::new();
/// let connection = Connection::builder("wss://example/chat")
///     .on_ready(|connection| {
///         let _ = connection.set_query_string(&json!({"token": "abc"}));
///     })
///     .connect(host.clone())?;
///
/// let chat = connection.create_hub_proxy("chat")?;
/// let _ = chat.on("receiveMessage", |arguments| println!("{arguments:?}"))?;
///
/// connection.wait_ready().await?;
/// chat.invoke("send", &[json!("hello")])?.await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Arc<ConnectionInner>,
}

// ============================================================================
// Connection - Display
// ============================================================================

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url)
            .field("connection_type", &self.inner.connection_type)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructor
// ============================================================================

impl Connection {
    /// Creates a builder for a connection to `url`.
    #[inline]
    #[must_use]
    pub fn builder(url: impl Into<String>) -> ConnectionBuilder {
        ConnectionBuilder::new(url)
    }

    /// Assembles the page and spawns the event loop.
    pub(crate) fn spawn(
        host: Arc<dyn ScriptHost>,
        options: ConnectionOptions,
        callbacks: Callbacks,
    ) -> Result<Self> {
        options.validate()?;

        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Connecting requires a running tokio runtime"))?;
        let page = options.page.build(host.prelude().as_deref())?;

        let id = ConnectionId::next();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (sink, inbound_rx) = MessageSink::channel();
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state_tx);

        let connection = Self {
            inner: Arc::new(ConnectionInner {
                id,
                url: options.url.clone(),
                connection_type: options.connection_type,
                ready_timeout: options.ready_timeout,
                command_tx,
                state: Arc::clone(&state),
                hubs: Mutex::new(FxHashMap::default()),
                received: Mutex::new(callbacks.received),
                on_disconnected: Mutex::new(callbacks.on_disconnected),
                query_string: Mutex::new(None),
            }),
        };

        if let Some(value) = &options.query_string {
            drop(connection.set_query_string(value)?);
        }

        let event_loop = EventLoop {
            id,
            url: options.url.clone(),
            connection_type: options.connection_type,
            evaluation_timeout: options.evaluation_timeout,
            host,
            inner: Arc::downgrade(&connection.inner),
            state,
            command_rx,
            inbound_rx,
            deferred: VecDeque::new(),
            started: false,
        };
        runtime.spawn(event_loop.run(page, sink, callbacks.on_ready));

        info!(
            connection_id = %id,
            url = %options.url,
            connection_type = %options.connection_type,
            "Connection created"
        );

        Ok(connection)
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the process-unique connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the target URL as given.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Returns the connection type.
    #[inline]
    #[must_use]
    pub fn connection_type(&self) -> ConnectionType {
        self.inner.connection_type
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Returns the last assigned query string.
    #[must_use]
    pub fn query_string(&self) -> Option<Value> {
        self.inner.query_string.lock().clone()
    }

    /// Waits until `start()` has been evaluated.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the ready timeout elapses first
    /// - [`Error::Connection`] if the page failed to load or initialize
    /// - [`Error::ConnectionClosed`] if the connection closed or disconnected
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.inner.state.subscribe();

        let wait = async move {
            loop {
                let state = rx.borrow_and_update().clone();
                match state {
                    ConnectionState::Ready => return Ok(()),
                    ConnectionState::Failed(message) => return Err(Error::connection(message)),
                    ConnectionState::Disconnected | ConnectionState::Closed => {
                        return Err(Error::ConnectionClosed);
                    }
                    ConnectionState::Connecting => {}
                }

                if rx.changed().await.is_err() {
                    return Err(Error::ConnectionClosed);
                }
            }
        };

        match self.inner.ready_timeout {
            Some(limit) => timeout(limit, wait)
                .await
                .map_err(|_| Error::connection_timeout(limit.as_millis() as u64))?,
            None => wait.await,
        }
    }
}

// ============================================================================
// Connection - Hubs
// ============================================================================

impl Connection {
    /// Creates and registers a hub proxy.
    ///
    /// Names are matched case-insensitively; creating a hub whose name is
    /// already registered returns the existing proxy.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedMode`] on a persistent connection
    /// - [`Error::InvalidIdentifier`] if `name` is not a script identifier or
    ///   names a global the page already defines
    pub fn create_hub_proxy(&self, name: &str) -> Result<HubProxy> {
        if !self.inner.connection_type.is_hub() {
            return Err(Error::unsupported_mode(
                "create_hub_proxy",
                self.inner.connection_type,
            ));
        }
        validate_identifier(name)?;

        let mut hubs = self.inner.hubs.lock();
        let key = name.to_lowercase();

        if let Some(existing) = hubs.get(&key) {
            debug!(connection_id = %self.inner.id, hub = name, "Hub proxy already registered");
            return Ok(existing.clone());
        }

        let hub = HubProxy::new(name, Arc::downgrade(&self.inner));
        hubs.insert(key, hub.clone());

        debug!(connection_id = %self.inner.id, hub = name, "Hub proxy created");
        Ok(hub)
    }

    /// Returns the registered hub proxy for `name`, case-insensitively.
    #[must_use]
    pub fn hub(&self, name: &str) -> Option<HubProxy> {
        self.inner.hub(name)
    }
}

// ============================================================================
// Connection - Outbound
// ============================================================================

impl Connection {
    /// Sends a payload over a persistent connection.
    ///
    /// Strings render as quoted literals; everything else as JSON.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedMode`] on a hub-style connection
    /// - [`Error::Json`] if `payload` has no JSON form
    /// - [`Error::ConnectionClosed`] if the event loop has stopped
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Evaluation> {
        if self.inner.connection_type.is_hub() {
            return Err(Error::unsupported_mode("send", self.inner.connection_type));
        }

        let data = to_json(payload)?;
        self.inner.enqueue(Command::Send { data })
    }

    /// Replaces the connection query string.
    ///
    /// Takes effect for the next negotiation the protocol library performs;
    /// an established connection is unaffected.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if `value` has no JSON form
    /// - [`Error::ConnectionClosed`] if the event loop has stopped
    pub fn set_query_string<T: Serialize + ?Sized>(&self, value: &T) -> Result<Evaluation> {
        let value = to_json(value)?;
        *self.inner.query_string.lock() = Some(value.clone());
        self.inner.enqueue(Command::SetQueryString { value })
    }
}

// ============================================================================
// Connection - Callbacks
// ============================================================================

impl Connection {
    /// Sets the callback for generic `{ data }` payloads.
    pub fn set_received<F>(&self, callback: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        *self.inner.received.lock() = Some(Arc::new(callback));
    }

    /// Removes the generic payload callback.
    pub fn clear_received(&self) {
        *self.inner.received.lock() = None;
    }

    /// Sets the callback for the `"disconnected"` signal.
    pub fn set_on_disconnected<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.on_disconnected.lock() = Some(Arc::new(callback));
    }

    /// Stops the event loop.
    ///
    /// Queued commands resolve with [`Error::ConnectionClosed`].
    pub fn shutdown(&self) {
        let _ = self.inner.command_tx.send(LoopCommand::Shutdown);
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// What woke the event loop.
enum Wake {
    Command(Option<LoopCommand>),
    Inbound(Option<Value>),
}

/// The task that owns the script host.
struct EventLoop {
    id: ConnectionId,
    url: String,
    connection_type: ConnectionType,
    evaluation_timeout: Duration,
    host: Arc<dyn ScriptHost>,
    /// Callbacks are reached through here; the loop never keeps it alive.
    inner: Weak<ConnectionInner>,
    state: Arc<watch::Sender<ConnectionState>>,
    command_rx: mpsc::UnboundedReceiver<LoopCommand>,
    inbound_rx: mpsc::UnboundedReceiver<Value>,
    /// Commands issued before `"ready"`.
    deferred: VecDeque<Pending>,
    /// Set on the first `"ready"`.
    started: bool,
}

impl EventLoop {
    async fn run(mut self, page: Page, sink: MessageSink, mut on_ready: Option<ReadyCallback>) {
        debug!(connection_id = %self.id, "Loading relay page");

        if let Err(e) = self.host.load_page(&page, sink).await {
            error!(connection_id = %self.id, error = %e, "Failed to load relay page");
            self.fail(e.to_string()).await;
            return;
        }

        debug!(connection_id = %self.id, "Relay page loaded");

        loop {
            let wake = tokio::select! {
                biased;
                command = self.command_rx.recv() => Wake::Command(command),
                body = self.inbound_rx.recv() => Wake::Inbound(body),
            };

            match wake {
                Wake::Command(Some(LoopCommand::Execute {
                    request,
                    response_tx,
                })) => {
                    if self.started {
                        self.execute_and_reply(request, response_tx).await;
                    } else {
                        trace!(
                            connection_id = %self.id,
                            request_id = %request.id,
                            "Deferred until ready"
                        );
                        self.deferred.push_back((request, response_tx));
                    }
                }

                Wake::Command(Some(LoopCommand::Shutdown)) => {
                    debug!(connection_id = %self.id, "Connection shutdown requested");
                    break;
                }

                Wake::Command(None) => {
                    debug!(connection_id = %self.id, "Connection released");
                    break;
                }

                Wake::Inbound(Some(body)) => {
                    if self.dispatch(body, &mut on_ready).await.is_break() {
                        break;
                    }
                }

                Wake::Inbound(None) => {
                    debug!(connection_id = %self.id, "Message channel closed");
                    break;
                }
            }
        }

        self.close();
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    async fn dispatch(
        &mut self,
        body: Value,
        on_ready: &mut Option<ReadyCallback>,
    ) -> ControlFlow<()> {
        let message = InboundMessage::parse(body);
        trace!(connection_id = %self.id, kind = message.kind(), "Inbound message");

        match message {
            InboundMessage::Lifecycle(Lifecycle::Ready) => return self.handle_ready(on_ready).await,
            InboundMessage::Lifecycle(Lifecycle::Disconnected) => self.handle_disconnected(),
            InboundMessage::Data(data) => self.handle_data(data),
            InboundMessage::Hub(event) => self.handle_hub_event(event),
            InboundMessage::Unrecognized(body) => {
                debug!(connection_id = %self.id, %body, "Ignoring unrecognized message");
            }
        }

        ControlFlow::Continue(())
    }

    async fn handle_ready(&mut self, on_ready: &mut Option<ReadyCallback>) -> ControlFlow<()> {
        if self.started {
            debug!(connection_id = %self.id, "Duplicate ready ignored");
            return ControlFlow::Continue(());
        }
        self.started = true;

        let initialize = Command::Initialize {
            url: self.url.clone(),
            is_hub: self.connection_type.is_hub(),
        };
        if let Err(e) = self.execute_command(initialize).await {
            error!(connection_id = %self.id, error = %e, "Initialize failed");
            self.fail(e.to_string()).await;
            return ControlFlow::Break(());
        }

        if self.drain_pending().await.is_break() {
            return ControlFlow::Break(());
        }

        if let Some(callback) = on_ready.take()
            && let Some(inner) = self.inner.upgrade()
        {
            callback(&Connection { inner });
        }

        if self.drain_pending().await.is_break() {
            return ControlFlow::Break(());
        }

        match self.execute_command(Command::Start).await {
            Ok(_) => {
                self.state.send_replace(ConnectionState::Ready);
                info!(connection_id = %self.id, url = %self.url, "Connection started");
            }
            Err(e) => {
                error!(connection_id = %self.id, error = %e, "Start failed");
                self.fail(e.to_string()).await;
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    fn handle_disconnected(&self) {
        info!(connection_id = %self.id, "Connection disconnected");
        self.state.send_replace(ConnectionState::Disconnected);

        let callback = self
            .inner
            .upgrade()
            .and_then(|inner| inner.on_disconnected.lock().clone());
        if let Some(callback) = callback {
            callback();
        }
    }

    fn handle_data(&self, data: Value) {
        let callback = self
            .inner
            .upgrade()
            .and_then(|inner| inner.received.lock().clone());

        match callback {
            Some(callback) => callback(data),
            None => trace!(connection_id = %self.id, "No received callback"),
        }
    }

    fn handle_hub_event(&self, event: HubEvent) {
        let handler = self
            .inner
            .upgrade()
            .and_then(|inner| inner.hub(&event.hub))
            .and_then(|hub| hub.handler(&event.method));

        match handler {
            Some(handler) => {
                trace!(
                    connection_id = %self.id,
                    hub = %event.hub,
                    method = %event.method,
                    "Dispatching hub event"
                );
                handler(event.arguments);
            }
            None => {
                trace!(
                    connection_id = %self.id,
                    hub = %event.hub,
                    method = %event.method,
                    "No handler for hub event"
                );
            }
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Executes deferred commands, then everything already queued.
    async fn drain_pending(&mut self) -> ControlFlow<()> {
        let mut flow = ControlFlow::Continue(());

        while let Ok(command) = self.command_rx.try_recv() {
            match command {
                LoopCommand::Execute {
                    request,
                    response_tx,
                } => self.deferred.push_back((request, response_tx)),
                LoopCommand::Shutdown => {
                    flow = ControlFlow::Break(());
                    break;
                }
            }
        }

        if flow.is_break() {
            return flow;
        }

        while let Some((request, response_tx)) = self.deferred.pop_front() {
            self.execute_and_reply(request, response_tx).await;
        }

        flow
    }

    async fn execute_command(&self, command: Command) -> Result<Value> {
        let request = Request::new(command)?;
        self.execute(&request).await
    }

    async fn execute_and_reply(
        &self,
        request: Request,
        response_tx: oneshot::Sender<Result<Value>>,
    ) {
        let result = self.execute(&request).await;

        if let Err(Err(e)) = response_tx.send(result) {
            warn!(
                connection_id = %self.id,
                request_id = %request.id,
                method = request.method_name(),
                error = %e,
                "Unobserved evaluation failed"
            );
        }
    }

    async fn execute(&self, request: &Request) -> Result<Value> {
        trace!(
            connection_id = %self.id,
            request_id = %request.id,
            script = %request.script,
            "Evaluating"
        );

        match timeout(self.evaluation_timeout, self.host.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::request_timeout(
                request.id,
                self.evaluation_timeout.as_millis() as u64,
            )),
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Marks the connection failed and rejects commands until released.
    async fn fail(&mut self, message: String) {
        self.state.send_replace(ConnectionState::Failed(message.clone()));

        for (_, response_tx) in self.deferred.drain(..) {
            let _ = response_tx.send(Err(Error::connection(message.clone())));
        }

        while let Some(command) = self.command_rx.recv().await {
            match command {
                LoopCommand::Execute { response_tx, .. } => {
                    let _ = response_tx.send(Err(Error::connection(message.clone())));
                }
                LoopCommand::Shutdown => break,
            }
        }
    }

    /// Publishes `Closed` unless the connection already failed or
    /// disconnected.
    fn close(&self) {
        self.state.send_if_modified(|state| {
            if matches!(state, ConnectionState::Failed(_) | ConnectionState::Disconnected) {
                return false;
            }
            *state = ConnectionState::Closed;
            true
        });

        debug!(connection_id = %self.id, "Connection event loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;

    use crate::transport::{MemoryHost, SocketHost};

    const URL: &str = "wss://example/test";

    async fn post_ready(host: &MemoryHost, connection: &Connection) {
        host.wait_loaded().await;
        host.post(json!("ready")).expect("post ready");
        connection.wait_ready().await.expect("wait ready");
    }

    #[tokio::test]
    async fn test_ready_sequence() {
        let host = MemoryHost::new();
        let seen_in_callback = Arc::new(Mutex::new(Vec::new()));

        let probe = host.clone();
        let seen = Arc::clone(&seen_in_callback);
        let connection = crate::connect(host.clone(), URL, ConnectionType::Hub, move |connection| {
            *seen.lock() = probe.scripts();
            drop(connection.set_query_string(&json!({"token": "abc"})));
        })
        .expect("connect");

        assert_eq!(connection.state(), ConnectionState::Connecting);
        post_ready(&host, &connection).await;

        assert_eq!(
            *seen_in_callback.lock(),
            vec!["initialize('wss://example/test', true)".to_string()]
        );
        assert_eq!(
            host.scripts(),
            vec![
                "initialize('wss://example/test', true)".to_string(),
                r#"connection.qs = {"token":"abc"}"#.to_string(),
                "start()".to_string(),
            ]
        );
        assert_eq!(connection.query_string(), Some(json!({"token": "abc"})));
        assert_eq!(connection.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_commands_before_ready_run_between_initialize_and_start() {
        let host = MemoryHost::new();
        let connection = Connection::builder(URL)
            .query_string(json!("a=1"))
            .connect(host.clone())
            .expect("connect");

        let chat = connection.create_hub_proxy("chat").expect("hub");
        drop(chat.on("receiveMessage", |_| {}));

        post_ready(&host, &connection).await;

        assert_eq!(
            host.scripts(),
            vec![
                "initialize('wss://example/test', true)".to_string(),
                r#"connection.qs = "a=1""#.to_string(),
                "if (typeof chat == 'undefined') chat = connection.createHubProxy('chat')"
                    .to_string(),
                "addHandler(chat, 'receiveMessage', null)".to_string(),
                "start()".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_hub_event_end_to_end() {
        let host = MemoryHost::new();
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
        let connection = crate::connect(host.clone(), URL, ConnectionType::Hub, move |_| {
            let _ = ready_tx.send(());
        })
        .expect("connect");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let chat = connection.create_hub_proxy("chat").expect("hub");
        drop(chat.on("receiveMessage", move |arguments| {
            let _ = tx.send(arguments);
        }));

        post_ready(&host, &connection).await;
        assert_eq!(ready_rx.recv().await, Some(()));

        let event = json!({
            "hub": "chat",
            "method": "receiveMessage",
            "arguments": ["Alice", "hi"]
        });
        host.post(event).expect("post");

        assert_eq!(rx.recv().await, Some(Some(json!(["Alice", "hi"]))));
    }

    #[tokio::test]
    async fn test_hub_lookup_is_case_insensitive() {
        let host = MemoryHost::new();
        let connection = crate::connect(host.clone(), URL, ConnectionType::Hub, |_| {})
            .expect("connect");

        let chat = connection.create_hub_proxy("Chat").expect("hub");
        let again = connection.create_hub_proxy("chat").expect("hub");
        assert_eq!(again, chat);
        assert_eq!(again.name(), "Chat");
        assert_eq!(connection.hub("CHAT"), Some(chat.clone()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(chat.on("m", move |arguments| {
            let _ = tx.send(arguments);
        }));

        post_ready(&host, &connection).await;
        host.post(json!({"hub": "cHaT", "method": "m"})).expect("post");

        assert_eq!(rx.recv().await, Some(None));
    }

    #[tokio::test]
    async fn test_unknown_hub_or_method_is_ignored() {
        let host = MemoryHost::new();
        let connection = crate::connect(host.clone(), URL, ConnectionType::Hub, |_| {})
            .expect("connect");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let chat = connection.create_hub_proxy("chat").expect("hub");
        drop(chat.on("m", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.set_received(move |data| {
            let _ = tx.send(data);
        });

        post_ready(&host, &connection).await;
        host.post(json!({"hub": "other", "method": "m"})).expect("post");
        host.post(json!({"hub": "chat", "method": "other"})).expect("post");
        host.post(json!({"unexpected": true})).expect("post");
        host.post(json!(42)).expect("post");
        host.post(json!({"data": "marker"})).expect("post");

        assert_eq!(rx.recv().await, Some(json!("marker")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(connection.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_received_callback_can_be_cleared() {
        let host = MemoryHost::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = Connection::builder(URL)
            .received(move |data| {
                let _ = tx.send(data);
            })
            .connect(host.clone())
            .expect("connect");

        post_ready(&host, &connection).await;
        host.post(json!({"data": [1, 2]})).expect("post");
        assert_eq!(rx.recv().await, Some(json!([1, 2])));

        connection.clear_received();
        host.post(json!({"data": 3})).expect("post");

        // The only sender lived in the cleared callback.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_duplicate_ready_ignored() {
        let host = MemoryHost::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let connection = crate::connect(host.clone(), URL, ConnectionType::Hub, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("connect");

        post_ready(&host, &connection).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.set_received(move |data| {
            let _ = tx.send(data);
        });
        host.post(json!("ready")).expect("post");
        host.post(json!({"data": "after"})).expect("post");
        assert_eq!(rx.recv().await, Some(json!("after")));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let starts = host.scripts().iter().filter(|s| *s == "start()").count();
        assert_eq!(starts, 1);
    }

    #[tokio::test]
    async fn test_disconnected_signal() {
        let host = MemoryHost::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = Connection::builder(URL)
            .on_disconnected(move || {
                let _ = tx.send(());
            })
            .connect(host.clone())
            .expect("connect");

        post_ready(&host, &connection).await;
        host.post(json!("disconnected")).expect("post");

        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_requires_persistent_mode() {
        let host = MemoryHost::new();
        let connection = crate::connect(host.clone(), URL, ConnectionType::Hub, |_| {})
            .expect("connect");

        let err = connection.send(&json!({"a": 1})).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMode { operation: "send", .. }));
        assert!(err.is_usage_error());
    }

    #[tokio::test]
    async fn test_persistent_send() {
        let host = MemoryHost::new();
        let connection = crate::connect(host.clone(), URL, ConnectionType::Persistent, |_| {})
            .expect("connect");

        assert!(matches!(
            connection.create_hub_proxy("chat"),
            Err(Error::UnsupportedMode { .. })
        ));

        post_ready(&host, &connection).await;
        connection.send("hi there").expect("send").await.expect("sent");
        connection
            .send(&json!({"n": 1}))
            .expect("send")
            .await
            .expect("sent");

        let scripts = host.scripts();
        assert_eq!(scripts[0], "initialize('wss://example/test', false)");
        assert!(scripts.contains(&"connection.send('hi there')".to_string()));
        assert!(scripts.contains(&r#"connection.send({"n":1})"#.to_string()));
    }

    #[tokio::test]
    async fn test_invalid_hub_name_rejected() {
        let host = MemoryHost::new();
        let connection = crate::connect(host, URL, ConnectionType::Hub, |_| {}).expect("connect");

        for name in ["", "my hub", "1chat", "chat');alert(1)//"] {
            assert!(matches!(
                connection.create_hub_proxy(name),
                Err(Error::InvalidIdentifier { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_hub_name_colliding_with_page_rejected() {
        let host = MemoryHost::new();
        let connection = crate::connect(host, URL, ConnectionType::Hub, |_| {}).expect("connect");

        for name in ["connection", "start", "$", "class", "delete", "window"] {
            assert!(
                matches!(
                    connection.create_hub_proxy(name),
                    Err(Error::InvalidIdentifier { .. })
                ),
                "{name} accepted"
            );
        }
        assert!(connection.hub("connection").is_none());
        assert!(connection.create_hub_proxy("Connection").is_ok());
    }

    #[tokio::test]
    async fn test_start_failure_rejects_later_commands() {
        let host = MemoryHost::new();
        host.fail_on("start()");
        let connection = crate::connect(host.clone(), URL, ConnectionType::Hub, |_| {})
            .expect("connect");
        let chat = connection.create_hub_proxy("chat").expect("hub");

        host.wait_loaded().await;
        host.post(json!("ready")).expect("post ready");
        host.wait_for_script("start()").await;

        let err = connection.wait_ready().await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert!(matches!(connection.state(), ConnectionState::Failed(_)));

        let err = chat.invoke("send", &[]).expect("invoke").await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));

        // initialize, then start; nothing after the failure reaches the host.
        host.wait_for_requests(2).await;
        assert_eq!(
            host.scripts(),
            vec![
                "initialize('wss://example/test', true)".to_string(),
                "start()".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let result = crate::connect(MemoryHost::new(), "not a url", ConnectionType::Hub, |_| {});
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_connect_requires_runtime() {
        let result = crate::connect(MemoryHost::new(), URL, ConnectionType::Hub, |_| {});
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_ready_timeout() {
        let connection = Connection::builder(URL)
            .ready_timeout(Duration::from_millis(20))
            .connect(MemoryHost::new())
            .expect("connect");

        let err = connection.wait_ready().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 20 }));
    }

    #[tokio::test]
    async fn test_shutdown_closes_connection() {
        let host = MemoryHost::new();
        let connection = crate::connect(host.clone(), URL, ConnectionType::Hub, |_| {})
            .expect("connect");
        let chat = connection.create_hub_proxy("chat").expect("hub");
        post_ready(&host, &connection).await;

        connection.shutdown();

        let mut state = connection.inner.state.subscribe();
        state
            .wait_for(|state| *state == ConnectionState::Closed)
            .await
            .expect("closed");

        let result = match chat.invoke("send", &[]) {
            Ok(evaluation) => evaluation.await,
            Err(e) => Err(e),
        };
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_page_load_failure() {
        let host = SocketHost::bind(|_| Err(Error::config("no web view")))
            .await
            .expect("bind");
        let connection = Connection::builder(URL).connect(host).expect("connect");
        let chat = connection.create_hub_proxy("chat").expect("hub");

        let err = connection.wait_ready().await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert!(matches!(connection.state(), ConnectionState::Failed(_)));

        let err = chat.invoke("send", &[]).expect("invoke").await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }

    /// A host whose evaluations never complete.
    struct StalledHost {
        sink: Mutex<Option<MessageSink>>,
    }

    #[async_trait]
    impl ScriptHost for StalledHost {
        async fn load_page(&self, _page: &Page, sink: MessageSink) -> Result<()> {
            sink.post(json!("ready"))?;
            *self.sink.lock() = Some(sink);
            Ok(())
        }

        async fn execute(&self, _request: &Request) -> Result<Value> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_evaluation_timeout_fails_initialize() {
        let host = StalledHost {
            sink: Mutex::new(None),
        };
        let connection = Connection::builder(URL)
            .evaluation_timeout(Duration::from_millis(20))
            .connect(host)
            .expect("connect");

        let err = connection.wait_ready().await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert!(matches!(connection.state(), ConnectionState::Failed(_)));
    }

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    /// Sends `payload` over a fresh persistent connection and returns the
    /// evaluated script.
    fn sent_script(payload: &Value) -> String {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        runtime.block_on(async {
            let host = MemoryHost::new();
            let connection =
                crate::connect(host.clone(), URL, ConnectionType::Persistent, |_| {})
                    .expect("connect");
            post_ready(&host, &connection).await;
            connection.send(payload).expect("send").await.expect("sent");
            host.scripts().last().cloned().expect("script")
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_send_round_trips(
            payload in json_value().prop_filter("not a string", |v| !v.is_string())
        ) {
            let script = sent_script(&payload);

            let inner = script
                .strip_prefix("connection.send(")
                .and_then(|rest| rest.strip_suffix(')'))
                .expect("send script");
            let parsed: Value = serde_json::from_str(inner).expect("json");
            prop_assert_eq!(parsed, payload);
        }
    }
}
