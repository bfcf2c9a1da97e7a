//! WebSocket relay and event loop.
//!
//! Handles the socket to a relayed page, including request/response
//! correlation and forwarding of posted messages.
//!
//! # Event Loop
//!
//! The relay spawns a tokio task that handles:
//!
//! - Incoming frames from the page (responses, posted messages)
//! - Outgoing requests from the connection
//! - Request/response correlation by UUID
//!
//! # Frames
//!
//! | Frame | Direction |
//! |-------|-----------|
//! | [`Request`] | Native → Page |
//! | [`Response`] | Page → Native |
//! | `{ "type": "message", "body": <any> }` | Page → Native |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{Value, from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{DISCONNECTED_TAG, Request, Response};

use super::host::MessageSink;

// ============================================================================
// Constants
// ============================================================================

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// Map of request IDs to response channels.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Result<Response>>>;

/// A body the page posted through `window.hubRelay.post`.
#[derive(Debug, Deserialize)]
struct PostedFrame {
    /// Frame type marker (always "message").
    #[serde(rename = "type")]
    frame_type: String,
    /// Posted body.
    #[serde(default)]
    body: Value,
}

// ============================================================================
// RelayCommand
// ============================================================================

/// Internal commands for the event loop.
enum RelayCommand {
    /// Send a request and wait for response.
    Send {
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(RequestId),
    /// Shutdown the relay.
    Shutdown,
}

// ============================================================================
// Relay
// ============================================================================

/// WebSocket link to a relayed page.
///
/// `Relay` is `Send + Sync` and cheap to clone; clones share the same
/// socket and event loop.
#[derive(Clone)]
pub struct Relay {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<RelayCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
}

impl Relay {
    /// Creates a relay from an accepted WebSocket stream.
    ///
    /// Spawns the event loop task internally. Posted bodies go to `sink`.
    pub(crate) fn new(ws_stream: WebSocketStream<TcpStream>, sink: MessageSink) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            sink,
        ));

        Self {
            command_tx,
            correlation,
        }
    }

    /// Sends a request and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the socket is closed
    /// - [`Error::RequestTimeout`] if no response arrives within `request_timeout`
    /// - [`Error::Protocol`] if too many requests are pending
    pub async fn send(&self, request: Request, request_timeout: Duration) -> Result<Response> {
        let request_id = request.id;

        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(RelayCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = self
                    .command_tx
                    .send(RelayCommand::RemoveCorrelation(request_id));

                Err(Error::request_timeout(
                    request_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Closes the socket.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(RelayCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WebSocketStream<TcpStream>,
        mut command_rx: mpsc::UnboundedReceiver<RelayCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        sink: MessageSink,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlation, &sink);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("Page socket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "Page socket error");
                            break;
                        }

                        None => {
                            debug!("Page socket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(RelayCommand::Send { request, response_tx }) => {
                            Self::handle_send_command(
                                request,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(RelayCommand::RemoveCorrelation(request_id)) => {
                            correlation.lock().remove(&request_id);
                            debug!(%request_id, "Removed timed-out correlation");
                        }

                        Some(RelayCommand::Shutdown) => {
                            debug!("Relay shutdown requested");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Relay command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        Self::fail_pending_requests(&correlation);

        // A lost page is a lost connection.
        let _ = sink.post(Value::String(DISCONNECTED_TAG.to_string()));

        debug!("Relay event loop terminated");
    }

    /// Handles an incoming text frame from the page.
    fn handle_incoming_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        sink: &MessageSink,
    ) {
        if let Ok(response) = from_str::<Response>(text) {
            let tx = correlation.lock().remove(&response.id);

            if let Some(tx) = tx {
                let _ = tx.send(Ok(response));
            } else {
                warn!(id = %response.id, "Response for unknown request");
            }

            return;
        }

        if let Ok(frame) = from_str::<PostedFrame>(text)
            && frame.frame_type == "message"
        {
            if sink.post(frame.body).is_err() {
                debug!("Posted message dropped, connection gone");
            }
            return;
        }

        warn!(text = %text, "Failed to parse page frame");
    }

    /// Handles a send command from the connection.
    async fn handle_send_command(
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
        ws_write: &mut futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        let request_id = request.id;

        let json = match to_string(&request) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        correlation.lock().insert(request_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await
            && let Some(tx) = correlation.lock().remove(&request_id)
        {
            let _ = tx.send(Err(Error::WebSocket(e)));
        }

        trace!(%request_id, method = request.method_name(), "Request sent");
    }

    /// Fails all pending requests with ConnectionClosed error.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constants() {
        assert_eq!(MAX_PENDING_REQUESTS, 100);
    }

    #[test]
    fn test_incoming_response_resolves_correlation() {
        let (sink, _rx) = MessageSink::channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let id = RequestId::generate();
        let (tx, mut rx) = oneshot::channel();
        correlation.lock().insert(id, tx);

        let frame = to_string(&Response::success(id, json!(7))).expect("serialize");
        Relay::handle_incoming_message(&frame, &correlation, &sink);

        let response = rx.try_recv().expect("resolved").expect("ok");
        assert_eq!(response.into_result().expect("success"), json!(7));
        assert!(correlation.lock().is_empty());
    }

    #[test]
    fn test_incoming_post_forwarded() {
        let (sink, mut rx) = MessageSink::channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));

        Relay::handle_incoming_message(
            r#"{"type":"message","body":{"hub":"chat","method":"m"}}"#,
            &correlation,
            &sink,
        );
        Relay::handle_incoming_message(r#"{"type":"message","body":"ready"}"#, &correlation, &sink);

        assert_eq!(rx.try_recv().expect("1"), json!({"hub": "chat", "method": "m"}));
        assert_eq!(rx.try_recv().expect("2"), json!("ready"));
    }

    #[test]
    fn test_garbage_frame_ignored() {
        let (sink, mut rx) = MessageSink::channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));

        Relay::handle_incoming_message("not json", &correlation, &sink);
        Relay::handle_incoming_message(r#"{"type":"other","body":1}"#, &correlation, &sink);

        assert!(rx.try_recv().is_err());
    }
}
