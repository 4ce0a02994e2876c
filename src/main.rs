//! Tally Integration Bridge
//!
//! Runs the relay executor next to a Tally instance and exposes it over a
//! REST API and a `/relay` WebSocket, so the payment-reminder dashboard can
//! pull companies, ledgers, outstanding bills and dealer summaries.

mod config;
mod executor;
mod models;
mod web;

use std::sync::Arc;

use clap::Parser;
use tally_link::BridgeConfig;

use crate::config::{ConfigStore, FileConfigStore, MemoryConfigStore};
use crate::executor::Executor;

/// Tally Integration Bridge: relay executor and HTTP surface.
#[derive(Parser, Debug)]
#[command(name = "tally-bridge", version = "1.0.0")]
struct Args {
    /// Tally XML gateway URL (seeds the config on first run only)
    #[arg(long = "tally-endpoint", default_value = tally_link::protocol::DEFAULT_ENDPOINT)]
    tally_endpoint: String,

    /// Web server port
    #[arg(long = "web-port", default_value_t = 5000)]
    web_port: u16,

    /// Address to bind the web server to
    #[arg(long = "bind", default_value = "127.0.0.1")]
    bind: String,

    /// Browser origin allowed to call the API (repeatable)
    #[arg(
        long = "allow-origin",
        default_values = ["http://localhost:5173", "http://127.0.0.1:5173"]
    )]
    allow_origin: Vec<String>,

    /// Where the bridge configuration is persisted
    #[arg(long = "config-path", default_value = "tally-bridge.json")]
    config_path: String,

    /// Keep configuration in memory only
    #[arg(long = "no-persist")]
    no_persist: bool,
}

fn print_banner() {
    println!("========================================");
    println!("   Tally Integration Bridge");
    println!("   Payment-reminder dashboard relay");
    println!("   Version 1.0.0  (Rust)");
    println!("========================================");
    println!();
}

fn print_endpoints(port: u16) {
    println!();
    println!("========================================");
    println!("   Tally Bridge is READY!");
    println!("========================================");
    println!();
    println!("API Endpoints:");
    println!("  Health Check:     GET  http://localhost:{port}/health");
    println!();
    println!("  Tally:");
    println!("    Companies:      GET  http://localhost:{port}/api/tally/companies");
    println!("    Ledgers:        GET  http://localhost:{port}/api/tally/ledgers?company=NAME");
    println!("    Bills:          GET  http://localhost:{port}/api/tally/bills?company=NAME");
    println!("    Dealers:        GET  http://localhost:{port}/api/tally/dealers?company=NAME");
    println!();
    println!("  Configuration:");
    println!("    Get Config:     GET  http://localhost:{port}/api/config");
    println!("    Set Config:     POST http://localhost:{port}/api/config");
    println!();
    println!("  Diagnostics:");
    println!("    Snapshot:       GET  http://localhost:{port}/api/diagnostics");
    println!("    Clear:          POST http://localhost:{port}/api/diagnostics/clear");
    println!();
    println!("  Relay:            WS   ws://localhost:{port}/relay");
    println!();
    println!("Press Ctrl+C to stop the server...");
    println!();
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    print_banner();

    let store: Box<dyn ConfigStore> = if args.no_persist {
        println!("Configuration is in-memory only (--no-persist)");
        Box::new(MemoryConfigStore::new())
    } else {
        println!("Configuration file: {}", args.config_path);
        Box::new(FileConfigStore::new(&args.config_path))
    };

    let seed = BridgeConfig {
        enabled: true,
        endpoint: args.tally_endpoint.clone(),
    };

    let executor = match Executor::activate(store, seed) {
        Ok(executor) => Arc::new(executor),
        Err(e) => {
            eprintln!("Failed to load bridge configuration!");
            eprintln!("  Error: {e}");
            eprintln!("Fix or delete the configuration file and try again.");
            std::process::exit(1);
        }
    };

    let config = executor.config();
    println!(
        "Tally endpoint: {} ({})",
        config.endpoint,
        if config.enabled { "enabled" } else { "disabled" }
    );

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown_tx = Arc::new(std::sync::Mutex::new(Some(shutdown_tx)));

    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, shutting down gracefully...");
        if let Some(tx) = shutdown_tx.lock().ok().and_then(|mut guard| guard.take()) {
            let _ = tx.send(());
        }
    })
    .expect("Failed to set Ctrl+C handler");

    // Build router
    let app = web::create_router(Arc::clone(&executor), web::cors_for(&args.allow_origin));
    println!("Allowed origins: {}", args.allow_origin.join(", "));

    print_endpoints(args.web_port);

    // Start server
    let addr = format!("{}:{}", args.bind, args.web_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .expect("Server error");

    println!("Shutdown complete. Goodbye!");
}
