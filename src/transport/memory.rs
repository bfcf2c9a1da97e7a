//! In-process script host.
//!
//! [`MemoryHost`] stands in for a web runtime: it records the page and every
//! request it is asked to execute, and lets the caller post messages as if
//! the adapter script had sent them.
//!
//! # Example
//!
//! ```no_run
//! use hub_relay::{ConnectionType, MemoryHost};
//! use serde_json::json;
//!
//! # async fn example() -> hub_relay::Result<()> {
//! let host = MemoryHost::new();
//! let connection = hub_relay::connect(host.clone(), "wss://example/chat", ConnectionType::Hub, |_| {})?;
//!
//! host.wait_loaded().await;
//! host.post(json!("ready"))?;
//! connection.wait_ready().await?;
//!
//! assert!(host.scripts().contains(&"start()".to_string()));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::trace;

use crate::error::{Error, Result};
use crate::page::Page;
use crate::protocol::Request;

use super::host::{MessageSink, ScriptHost};

// ============================================================================
// Types
// ============================================================================

/// Shared state behind every [`MemoryHost`] clone.
struct MemoryHostInner {
    /// Loaded page, once any.
    page: Mutex<Option<Page>>,
    /// Sink registered at load.
    sink: Mutex<Option<MessageSink>>,
    /// Executed requests, in order.
    requests: Mutex<Vec<Request>>,
    /// Scripts containing one of these fragments fail.
    failures: Mutex<Vec<String>>,
    /// Bumped on every load and every execution.
    version: watch::Sender<u64>,
}

// ============================================================================
// MemoryHost
// ============================================================================

/// A recording script host.
///
/// Clones share state, so a test can keep one clone and hand the other to
/// the connection.
#[derive(Clone)]
pub struct MemoryHost {
    inner: Arc<MemoryHostInner>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("loaded", &self.is_loaded())
            .field("requests", &self.inner.requests.lock().len())
            .finish_non_exhaustive()
    }
}

impl MemoryHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(MemoryHostInner {
                page: Mutex::new(None),
                sink: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
                failures: Mutex::new(Vec::new()),
                version,
            }),
        }
    }

    /// Makes every script containing `fragment` fail with a script error.
    pub fn fail_on(&self, fragment: impl Into<String>) {
        self.inner.failures.lock().push(fragment.into());
    }

    /// Returns `true` once a page has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.page.lock().is_some()
    }

    /// Returns the loaded page.
    #[must_use]
    pub fn page(&self) -> Option<Page> {
        self.inner.page.lock().clone()
    }

    /// Returns every executed request, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.inner.requests.lock().clone()
    }

    /// Returns every executed script, in order.
    #[must_use]
    pub fn scripts(&self) -> Vec<String> {
        self.inner
            .requests
            .lock()
            .iter()
            .map(|request| request.script.clone())
            .collect()
    }

    /// Posts a body as the adapter script would.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if no page has been loaded yet
    /// - [`Error::ConnectionClosed`] if the connection is gone
    pub fn post(&self, body: Value) -> Result<()> {
        let sink = self
            .inner
            .sink
            .lock()
            .clone()
            .ok_or_else(|| Error::protocol("No page loaded"))?;
        sink.post(body)
    }

    /// Waits until the connection has loaded its page.
    pub async fn wait_loaded(&self) {
        self.wait_until(|host| host.is_loaded()).await;
    }

    /// Waits until some executed script equals `script`.
    pub async fn wait_for_script(&self, script: &str) {
        self.wait_until(|host| host.scripts().iter().any(|s| s == script))
            .await;
    }

    /// Waits until at least `count` requests have been executed.
    pub async fn wait_for_requests(&self, count: usize) {
        self.wait_until(|host| host.inner.requests.lock().len() >= count)
            .await;
    }

    /// Waits for `condition` to hold, rechecking after every change.
    async fn wait_until(&self, condition: impl Fn(&Self) -> bool) {
        let mut rx = self.inner.version.subscribe();
        while !condition(self) {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Signals waiters that something changed.
    fn bump(&self) {
        self.inner.version.send_modify(|version| *version += 1);
    }
}

#[async_trait]
impl ScriptHost for MemoryHost {
    async fn load_page(&self, page: &Page, sink: MessageSink) -> Result<()> {
        trace!(len = page.html().len(), "Memory host loading page");
        *self.inner.page.lock() = Some(page.clone());
        *self.inner.sink.lock() = Some(sink);
        self.bump();
        Ok(())
    }

    async fn execute(&self, request: &Request) -> Result<Value> {
        trace!(request_id = %request.id, script = %request.script, "Memory host executing");
        self.inner.requests.lock().push(request.clone());

        let failing = self
            .inner
            .failures
            .lock()
            .iter()
            .any(|fragment| request.script.contains(fragment.as_str()));
        self.bump();

        if failing {
            return Err(Error::script_error(format!(
                "{} failed",
                request.method_name()
            )));
        }

        Ok(Value::Null)
    }
}

// ============================================================================
// Tests
// ============================================================================
