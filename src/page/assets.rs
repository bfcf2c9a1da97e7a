//! Bundled scripts and HTML templates for the relay page.
//!
//! The page the script host loads is assembled from:
//!
//! 1. A host prelude defining `window.hubRelay.post(body)`
//! 2. The protocol libraries, in order
//! 3. The adapter script, which posts `"ready"` once loaded
//!
//! # Adapter Contract
//!
//! The adapter exposes these globals to evaluated commands:
//!
//! | Global | Purpose |
//! |--------|---------|
//! | `connection` | Underlying connection object |
//! | `initialize(url, isHub)` | Create `connection` |
//! | `start()` | Start `connection` |
//! | `addHandler(hub, method, parameters)` | Forward a client method to native |

// ============================================================================
// Imports
// ============================================================================

use serde_json::json;

// ============================================================================
// Public Functions
// ============================================================================

/// Builds the default prelude for hosts that expose a native message handler.
///
/// Posts go to `window.webkit.messageHandlers[<handler>]` when present,
/// otherwise to `window.ipc.postMessage` as JSON text.
#[must_use]
pub fn native_prelude(message_handler: &str) -> String {
    NATIVE_PRELUDE_TEMPLATE.replace("$HANDLER_JSON", &json!(message_handler).to_string())
}

/// Builds the prelude for pages that reach native code over a WebSocket.
///
/// Requests arriving on the socket are evaluated and answered by id; posts
/// are queued until the socket opens.
#[must_use]
pub fn socket_prelude(ws_url: &str) -> String {
    SOCKET_PRELUDE_TEMPLATE.replace("$WS_URL_JSON", &json!(ws_url).to_string())
}

/// Wraps rendered head elements and `<script>` elements into a full HTML
/// document.
#[must_use]
pub fn page_html(head: &str, scripts: &str) -> String {
    PAGE_TEMPLATE
        .replace("$HEAD", head)
        .replace("$SCRIPTS", scripts)
}

// ============================================================================
// Constants
// ============================================================================

/// Default protocol library files, referenced relative to the page base URL.
pub const DEFAULT_LIBRARIES: &[&str] = &["jquery-2.1.3.min.js", "jquery.signalR-2.2.0.min.js"];

/// Default message handler name registered by native hosts.
pub const DEFAULT_MESSAGE_HANDLER: &str = "interOp";

/// HTML shell. Scripts run in document order inside `<body>`.
const PAGE_TEMPLATE: &str = concat!(
    r#"<!doctype html><html><head><meta charset="utf-8">$HEAD</head>"#,
    "<body>$SCRIPTS</body></html>",
);

/// Prelude for in-process web views.
const NATIVE_PRELUDE_TEMPLATE: &str = r#"window.hubRelay = window.hubRelay || {
    post: function (body) {
        var handlers = window.webkit && window.webkit.messageHandlers;
        var handler = handlers && handlers[$HANDLER_JSON];
        if (handler) {
            handler.postMessage(body);
        } else if (window.ipc && window.ipc.postMessage) {
            window.ipc.postMessage(JSON.stringify(body));
        }
    }
};"#;

/// Prelude for socket-relayed pages.
const SOCKET_PRELUDE_TEMPLATE: &str = r#"(function () {
    var queue = [];
    var socket = new WebSocket($WS_URL_JSON);

    function send(frame) {
        var text = JSON.stringify(frame);
        if (socket.readyState === 1) {
            socket.send(text);
        } else {
            queue.push(text);
        }
    }

    function portable(value) {
        var kind = typeof value;
        if (value === null || kind === 'string' || kind === 'number' || kind === 'boolean') {
            return value;
        }
        return null;
    }

    socket.onopen = function () {
        while (queue.length) {
            socket.send(queue.shift());
        }
    };

    socket.onmessage = function (event) {
        var request = JSON.parse(event.data);
        try {
            var result = (0, eval)(request.script);
            send({ id: request.id, type: 'success', result: portable(result) });
        } catch (e) {
            send({ id: request.id, type: 'error', error: 'script error', message: String(e) });
        }
    };

    window.hubRelay = {
        post: function (body) {
            send({ type: 'message', body: body });
        }
    };
})();"#;

/// Default adapter over the jQuery hub client.
pub const ADAPTER_SCRIPT: &str = r#"(function () {
    'use strict';

    function post(body) {
        window.hubRelay.post(body);
    }

    window.connection = null;

    window.initialize = function (url, isHub) {
        if (isHub) {
            window.connection = $.hubConnection(url, { useDefaultPath: false });
        } else {
            window.connection = $.connection(url);
            window.connection.received(function (data) {
                post({ data: data });
            });
        }
        window.connection.disconnected(function () {
            post('disconnected');
        });
    };

    window.start = function () {
        return window.connection.start();
    };

    window.addHandler = function (hub, method, parameters) {
        hub.on(method, function () {
            var args = Array.prototype.slice.call(arguments);
            var value = args;
            if (parameters) {
                value = {};
                parameters.forEach(function (name, i) {
                    value[name] = args[i];
                });
            }
            post({ hub: hub.hubName, method: method, arguments: value });
        });
    };

    post('ready');
})();"#;

// ============================================================================
// Tests
// ============================================================================
