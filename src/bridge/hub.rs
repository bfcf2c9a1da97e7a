//! Hub proxy.
//!
//! A [`HubProxy`] is a named facade over a hub-style [`Connection`]. It keeps
//! the client method callbacks for its hub and issues `addHandler` and
//! `invoke` commands into the adapter script.
//!
//! [`Connection`]: super::Connection

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::Command;

use super::core::ConnectionInner;
use super::evaluation::Evaluation;

// ============================================================================
// Types
// ============================================================================

/// Callback for a hub client method; receives the posted `arguments`.
pub type HubHandler = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// Shared state behind every [`HubProxy`] clone.
struct HubInner {
    /// Hub name as given by the caller.
    name: String,
    /// Client method name to callback.
    handlers: Mutex<FxHashMap<String, HubHandler>>,
    /// Owning connection.
    connection: Weak<ConnectionInner>,
}

// ============================================================================
// HubProxy
// ============================================================================

/// A named hub on a hub-style connection.
///
/// Cheap to clone; clones share handlers. Two proxies are equal when their
/// names are equal. Every operation fails with [`Error::ConnectionClosed`]
/// once the owning connection has been released.
///
/// # Example
///
/// ```ignore
/// let chat = connection.create_hub_proxy("chat")?;
///
/// chat.on("receiveMessage", |arguments| {
///     println!("received {arguments:?}");
/// })?;
///
/// chat.invoke("send", &[json!("hello")])?.await?;
/// ```
#[derive(Clone)]
pub struct HubProxy {
    inner: Arc<HubInner>,
}

impl fmt::Debug for HubProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<String> = self.inner.handlers.lock().keys().cloned().collect();
        f.debug_struct("HubProxy")
            .field("name", &self.inner.name)
            .field("methods", &methods)
            .finish_non_exhaustive()
    }
}

impl PartialEq for HubProxy {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
    }
}

impl Eq for HubProxy {}

impl Hash for HubProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
    }
}

// ============================================================================
// HubProxy - Constructor
// ============================================================================

impl HubProxy {
    /// Creates a proxy bound to `connection`.
    pub(crate) fn new(name: impl Into<String>, connection: Weak<ConnectionInner>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                name: name.into(),
                handlers: Mutex::new(FxHashMap::default()),
                connection,
            }),
        }
    }
}

// ============================================================================
// HubProxy - Accessors
// ============================================================================

impl HubProxy {
    /// Returns the hub name as given at creation.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns `true` if a callback is registered for `method`.
    #[must_use]
    pub fn has_handler(&self, method: &str) -> bool {
        self.inner.handlers.lock().contains_key(method)
    }

    /// Returns the callback registered for `method`.
    pub(crate) fn handler(&self, method: &str) -> Option<HubHandler> {
        self.inner.handlers.lock().get(method).cloned()
    }
}

// ============================================================================
// HubProxy - Handlers
// ============================================================================

impl HubProxy {
    /// Registers `callback` for the client method `method`.
    ///
    /// A later registration for the same method replaces this one. Safe to
    /// call before the connection has started; the script-side handler is
    /// registered before `start()` runs.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `method` is empty
    /// - [`Error::ConnectionClosed`] if the connection is gone
    pub fn on<F>(&self, method: &str, callback: F) -> Result<Evaluation>
    where
        F: Fn(Option<Value>) + Send + Sync + 'static,
    {
        self.register(method, None, Arc::new(callback))
    }

    /// Registers `callback` and declares the expected parameter names.
    ///
    /// # Errors
    ///
    /// Same as [`on`](Self::on).
    pub fn on_with_parameters<F>(
        &self,
        method: &str,
        parameters: &[&str],
        callback: F,
    ) -> Result<Evaluation>
    where
        F: Fn(Option<Value>) + Send + Sync + 'static,
    {
        let parameters = parameters.iter().map(|p| (*p).to_string()).collect();
        self.register(method, Some(parameters), Arc::new(callback))
    }

    fn register(
        &self,
        method: &str,
        parameters: Option<Vec<String>>,
        callback: HubHandler,
    ) -> Result<Evaluation> {
        let connection = self.connection()?;
        validate_method(method)?;

        let replaced = self
            .inner
            .handlers
            .lock()
            .insert(method.to_string(), callback)
            .is_some();

        debug!(hub = %self.inner.name, method, replaced, "Handler registered");

        self.ensure_hub(&connection)?;
        connection.enqueue(Command::AddHandler {
            hub: self.inner.name.clone(),
            method: method.to_string(),
            parameters,
        })
    }
}

// ============================================================================
// HubProxy - Invocation
// ============================================================================

impl HubProxy {
    /// Invokes the server method `method`.
    ///
    /// Each argument is rendered on its own: strings as quoted literals,
    /// everything else as JSON. The returned [`Evaluation`] resolves once the
    /// adapter has issued the call; server replies arrive later as hub events.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `method` is empty
    /// - [`Error::ConnectionClosed`] if the connection is gone
    pub fn invoke(&self, method: &str, arguments: &[Value]) -> Result<Evaluation> {
        let connection = self.connection()?;
        validate_method(method)?;

        self.ensure_hub(&connection)?;
        connection.enqueue(Command::Invoke {
            hub: self.inner.name.clone(),
            method: method.to_string(),
            arguments: arguments.to_vec(),
        })
    }
}

// ============================================================================
// HubProxy - Internal
// ============================================================================

impl HubProxy {
    /// Upgrades the back-reference to the owning connection.
    fn connection(&self) -> Result<Arc<ConnectionInner>> {
        self.inner.connection.upgrade().ok_or(Error::ConnectionClosed)
    }

    /// Queues the script-side proxy creation; idempotent in script.
    ///
    /// The outcome is not awaited; a failure is logged by the event loop.
    fn ensure_hub(&self, connection: &ConnectionInner) -> Result<()> {
        let evaluation = connection.enqueue(Command::EnsureHub {
            hub: self.inner.name.clone(),
        })?;
        drop(evaluation);
        Ok(())
    }
}

/// Rejects empty method names.
fn validate_method(method: &str) -> Result<()> {
    if method.is_empty() {
        return Err(Error::invalid_argument("Hub method name is empty"));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::bridge::{Connection, ConnectionType};
    use crate::transport::MemoryHost;

    async fn ready_connection(host: &MemoryHost) -> Connection {
        let connection =
            crate::connect(host.clone(), "wss://example/test", ConnectionType::Hub, |_| {})
                .expect("connect");
        host.wait_loaded().await;
        host.post(json!("ready")).expect("ready");
        connection.wait_ready().await.expect("wait ready");
        connection
    }

    #[test]
    fn test_equality_by_name() {
        let a = HubProxy::new("chat", Weak::new());
        let b = HubProxy::new("chat", Weak::new());
        let c = HubProxy::new("Chat", Weak::new());

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<HubProxy> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_detached_proxy_is_closed() {
        let hub = HubProxy::new("chat", Weak::new());
        assert!(matches!(hub.invoke("send", &[]), Err(Error::ConnectionClosed)));
        assert!(matches!(hub.on("m", |_| {}), Err(Error::ConnectionClosed)));
        assert!(!hub.has_handler("m"));
    }

    #[tokio::test]
    async fn test_invoke_renders_arguments() {
        let host = MemoryHost::new();
        let connection = ready_connection(&host).await;
        let chat = connection.create_hub_proxy("Chat").expect("hub");

        chat.invoke("send", &[json!("hello")])
            .expect("invoke")
            .await
            .expect("evaluated");
        chat.invoke("ping", &[]).expect("invoke").await.expect("evaluated");
        chat.invoke("move", &[json!(1), json!({"x": 2})])
            .expect("invoke")
            .await
            .expect("evaluated");

        let scripts = host.scripts();
        assert!(scripts.contains(&"Chat.invoke('send', 'hello')".to_string()));
        assert!(scripts.contains(&"Chat.invoke('ping')".to_string()));
        assert!(scripts.contains(&r#"Chat.invoke('move', 1,{"x":2})"#.to_string()));
    }

    #[tokio::test]
    async fn test_ensure_hub_precedes_every_call() {
        let host = MemoryHost::new();
        let connection = ready_connection(&host).await;
        let chat = connection.create_hub_proxy("chat").expect("hub");
        let before = host.scripts().len();

        chat.on("m", |_| {}).expect("on").await.expect("evaluated");
        chat.invoke("send", &[]).expect("invoke").await.expect("evaluated");

        let ensure = "if (typeof chat == 'undefined') chat = connection.createHubProxy('chat')";
        assert_eq!(
            host.scripts()[before..],
            [
                ensure.to_string(),
                "addHandler(chat, 'm', null)".to_string(),
                ensure.to_string(),
                "chat.invoke('send')".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_on_with_parameters() {
        let host = MemoryHost::new();
        let connection = ready_connection(&host).await;
        let chat = connection.create_hub_proxy("chat").expect("hub");

        chat.on_with_parameters("receive", &["name", "text"], |_| {})
            .expect("on")
            .await
            .expect("evaluated");

        assert!(chat.has_handler("receive"));
        assert!(
            host.scripts()
                .contains(&"addHandler(chat, 'receive', ['name','text'])".to_string())
        );
    }

    #[tokio::test]
    async fn test_second_registration_replaces_first() {
        let host = MemoryHost::new();
        let connection = ready_connection(&host).await;
        let chat = connection.create_hub_proxy("chat").expect("hub");

        let first = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let counter = Arc::clone(&first);
        drop(chat.on("m", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        drop(chat.on("m", move |arguments| {
            let _ = tx.send(arguments);
        }));

        host.post(json!({"hub": "chat", "method": "m", "arguments": [1]}))
            .expect("post");

        assert_eq!(rx.recv().await, Some(Some(json!([1]))));
        assert_eq!(first.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_method_rejected() {
        let host = MemoryHost::new();
        let connection = ready_connection(&host).await;
        let chat = connection.create_hub_proxy("chat").expect("hub");

        assert!(matches!(chat.invoke("", &[]), Err(Error::InvalidArgument { .. })));
        assert!(matches!(chat.on("", |_| {}), Err(Error::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_use_after_connection_dropped() {
        let host = MemoryHost::new();
        let connection = ready_connection(&host).await;
        let chat = connection.create_hub_proxy("chat").expect("hub");

        drop(connection);

        assert!(matches!(chat.invoke("send", &[]), Err(Error::ConnectionClosed)));
        assert!(matches!(chat.on("m", |_| {}), Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_failing_invoke_surfaces_error() {
        let host = MemoryHost::new();
        host.fail_on("explode");
        let connection = ready_connection(&host).await;
        let chat = connection.create_hub_proxy("chat").expect("hub");

        let err = chat
            .invoke("explode", &[])
            .expect("invoke")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ScriptError { .. }));
    }
}
