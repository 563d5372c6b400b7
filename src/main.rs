//! EmberKV - A Log-Structured Persistent Key-Value Store
//!
//! This is the main entry point for the EmberKV server.
//! It resolves the configuration, opens the store (recovering whatever the
//! log directory already holds), starts the expiry sweeper, and serves the
//! HTTP API until Ctrl+C.

use std::sync::Arc;

use emberkv::storage::{start_expiry_sweeper, LogStore, LogStoreOptions};
use emberkv::{server, DEFAULT_DATA_DIR, DEFAULT_HOST, DEFAULT_PORT};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Log directory the store owns
    dir: String,
    /// Segment size cap in bytes
    max_segment_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        // Environment variables seed the defaults; flags override them.
        let port = std::env::var("PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let dir = std::env::var("DATABASE_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());

        Self {
            host: DEFAULT_HOST.to_string(),
            port,
            dir,
            max_segment_bytes: emberkv::storage::DEFAULT_MAX_SEGMENT_BYTES,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" => {
                    config.host = take_value(&args, i, "--host");
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = take_value(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--dir" | "-d" => {
                    config.dir = take_value(&args, i, "--dir");
                    i += 2;
                }
                "--max-segment-bytes" => {
                    config.max_segment_bytes = take_value(&args, i, "--max-segment-bytes")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid segment size");
                            std::process::exit(1);
                        });
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("EmberKV version {}", emberkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn take_value(args: &[String], i: usize, flag: &str) -> String {
    args.get(i + 1).cloned().unwrap_or_else(|| {
        eprintln!("Error: {flag} requires a value");
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
EmberKV - A Log-Structured Persistent Key-Value Store

USAGE:
    emberkv [OPTIONS]

OPTIONS:
        --host <HOST>              Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>              Port to listen on (default: 8000, env PORT)
    -d, --dir <DIR>                Log directory (default: ./store, env DATABASE_DIR)
        --max-segment-bytes <N>    Segment size cap in bytes (default: 32 MiB)
    -v, --version                  Print version information
        --help                     Print this help message

EXAMPLES:
    emberkv                        # Serve ./store on 127.0.0.1:8000
    emberkv --dir /var/lib/ember   # Use a different log directory
    emberkv --port 8080            # Listen on port 8080

USING:
    $ curl -X POST 'localhost:8000/set?key=greeting' -d 'hello'
    $ curl 'localhost:8000/get?key=greeting'
    hello
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments (env vars seed the defaults)
    let config = Config::from_args();

    // Set up logging
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    // Open the store, replaying whatever the directory already holds.
    // Recovery failures are fatal: better to refuse to start than to serve
    // from a half-built index.
    let store = Arc::new(LogStore::open(
        &config.dir,
        LogStoreOptions {
            max_segment_bytes: config.max_segment_bytes,
        },
    )?);
    info!(keys = store.key_count(), dir = %config.dir, "store ready");

    // Start the background expiry sweeper
    let _sweeper = start_expiry_sweeper(Arc::clone(&store));

    // Serve the HTTP API until Ctrl+C
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    axum::serve(listener, server::router(store))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Shutdown signal received, stopping server...");
}
