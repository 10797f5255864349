//! Live connection status monitor.
//!
//! Demonstrates:
//! - Loading endpoint settings (file, then environment overrides)
//! - Building a manager with exponential backoff
//! - Observing status changes and incoming message types
//! - Tracking domain invalidations
//! - Graceful shutdown
//!
//! Usage:
//!   cargo run --example status_monitor
//!   cargo run --example status_monitor -- --url ws://127.0.0.1:8000/ws
//!   cargo run --example status_monitor -- --settings ./settings.json --debug
//!   cargo run --example status_monitor -- --no-wait

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::Args;
use console_link::invalidation::{BRAIN, DATA, LOGS};
use console_link::{ConnectionManager, InvalidationTracker, Result, Settings};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Status Monitor ===\n");

    // ========================================================================
    // Load Settings
    // ========================================================================

    println!("[1] Loading settings...");

    let path = match args.settings {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let mut settings = Settings::load(&path)?.with_env_overrides();
    if let Some(url) = args.url {
        settings.ws_url = url;
    }

    println!("    File:      {}", path.display());
    println!("    API:       {}", settings.api_base_url);
    println!("    WebSocket: {}", settings.ws_url);
    println!("    ✓ Settings ready\n");

    // ========================================================================
    // Build Manager
    // ========================================================================

    println!("[2] Building manager...");

    let manager = settings
        .connection_builder()?
        .exponential_backoff(Duration::from_secs(1), Duration::from_secs(30), 8)
        .build()?;

    let tracker = Arc::new(InvalidationTracker::new());
    tracker.attach(&manager);

    manager.on_status_change(|state| {
        let since = state
            .since_last_sync(SystemTime::now())
            .map(|d| format!("{}s ago", d.as_secs()))
            .unwrap_or_else(|| "never".to_string());

        match &state.error_message {
            Some(error) => println!(
                "    [status] {:<14} attempts={} last_sync={since} error={error}",
                state.status.label(),
                state.reconnect_attempts
            ),
            None => println!(
                "    [status] {:<14} attempts={} last_sync={since}",
                state.status.label(),
                state.reconnect_attempts
            ),
        }
    });

    manager.on_any_message(|message| {
        println!("    [message] {}", message.message_type);
    });

    println!("    ✓ Manager ready\n");

    // ========================================================================
    // Connect & Monitor
    // ========================================================================

    println!("[3] Connecting...");
    manager.connect()?;

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Shutdown
    // ========================================================================

    println!("\n[4] Shutting down...");
    print_generations(&manager, &tracker);
    manager.shutdown().await;
    println!("    ✓ Disconnected\n");

    println!("=== Done ===");
    Ok(())
}

fn print_generations(manager: &ConnectionManager, tracker: &InvalidationTracker) {
    println!("    Final status: {}", manager.status().label());
    for domain in [DATA, LOGS, BRAIN] {
        println!("    {domain:<6} generation {}", tracker.generation(domain));
    }
}
