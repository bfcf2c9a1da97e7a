//! Hub chat walkthrough against the in-process host.
//!
//! Demonstrates:
//! - Connecting with an `on_ready` callback
//! - Registering hub client methods before the connection starts
//! - Invoking server methods
//! - Dispatch of posted hub events and data payloads
//!
//! The adapter's side is played by [`MemoryHost::post`]; point a real web
//! view at `connection`'s page to talk to a live hub instead.
//!
//! Usage:
//!   cargo run --example chat
//!   cargo run --example chat -- --debug

// ============================================================================
// Imports
// ============================================================================

use anyhow::Context;
use hub_relay::{Connection, ConnectionState, MemoryHost};
use serde_json::json;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const HUB_URL: &str = "https://example.com/signalr";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    println!("=== Hub chat ===\n");

    // ========================================================================
    // Setup
    // ========================================================================

    println!("[Setup] Connecting to {HUB_URL}...");

    let host = MemoryHost::new();
    let connection = Connection::builder(HUB_URL)
        .on_ready(|connection| {
            println!("        on_ready: setting query string");
            let _ = connection.set_query_string(&json!({"user": "demo"}));
        })
        .connect(host.clone())?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let chat = connection.create_hub_proxy("chat")?;
    let _ = chat.on_with_parameters("receiveMessage", &["name", "text"], move |arguments| {
        let _ = tx.send(arguments);
    })?;

    // ========================================================================
    // Ready
    // ========================================================================

    host.wait_loaded().await;
    println!("[1] Adapter posts \"ready\"");
    host.post(json!("ready"))?;
    connection.wait_ready().await?;
    assert_eq!(connection.state(), ConnectionState::Ready);

    for script in host.scripts() {
        println!("    eval: {script}");
    }
    println!("    ✓ Started\n");

    // ========================================================================
    // Invoke
    // ========================================================================

    println!("[2] Invoke chat.send('hello')");
    chat.invoke("send", &[json!("hello")])?.await?;
    let last = host.scripts().pop().context("no script evaluated")?;
    println!("    eval: {last}");
    println!("    ✓ Invoked\n");

    // ========================================================================
    // Inbound
    // ========================================================================

    println!("[3] Server pushes receiveMessage");
    host.post(json!({
        "hub": "Chat",
        "method": "receiveMessage",
        "arguments": ["Alice", "hi"]
    }))?;
    let arguments = rx.recv().await.context("handler dropped")?;
    println!("    Handler got: {arguments:?}");
    println!("    ✓ Dispatched\n");

    println!("[4] Adapter posts a data payload");
    let (data_tx, mut data_rx) = mpsc::unbounded_channel();
    connection.set_received(move |data| {
        let _ = data_tx.send(data);
    });
    host.post(json!({"data": {"ticks": 3}}))?;
    let data = data_rx.recv().await.context("received callback dropped")?;
    println!("    Data received: {data}");
    println!("    ✓ Dispatched\n");

    // ========================================================================
    // Teardown
    // ========================================================================

    println!("[5] Adapter posts \"disconnected\"");
    let (gone_tx, mut gone_rx) = mpsc::unbounded_channel();
    connection.set_on_disconnected(move || {
        let _ = gone_tx.send(());
    });
    host.post(json!("disconnected"))?;
    gone_rx.recv().await.context("disconnect callback dropped")?;
    println!("    State: {:?}", connection.state());

    connection.shutdown();
    println!("\n=== Done ===");

    Ok(())
}

/// Initializes tracing.
fn init_logging(debug: bool) {
    let filter = if debug {
        "hub_relay=trace"
    } else {
        "hub_relay=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
