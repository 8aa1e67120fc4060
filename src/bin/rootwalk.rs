//! A DNS server resolving names iteratively from the root.

use clap::Parser;
use rootwalk::resolver::{self, Resolver};
use rootwalk::server::{self, Server};
use rootwalk::transport::{self, UdpTransport};
use std::error::Error as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5354)]
    port: u16,

    /// Seconds to wait for a name server to respond.
    #[arg(long, default_value_t = 3)]
    timeout: u64,

    /// Maximum number of referrals and aliases followed per lookup.
    #[arg(long, default_value_t = 30)]
    max_depth: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing based logging. Override with env var RUST_LOG, e.g.
    // RUST_LOG=debug.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_thread_ids(true)
        .without_time()
        .try_init()
        .ok();

    let args = Args::parse();

    let mut transport_config = transport::Config::new();
    transport_config.set_timeout(Duration::from_secs(args.timeout));
    let mut resolver_config = resolver::Config::new();
    resolver_config.set_max_depth(args.max_depth);
    let resolver = Arc::new(Resolver::with_config(
        UdpTransport::with_config(transport_config),
        resolver_config,
    ));

    let config = server::Config::new(args.host, args.port);
    let server = match Server::bind(&config, resolver).await {
        Ok(server) => server,
        Err(err) => {
            match err.source() {
                Some(cause) => {
                    eprintln!("Cannot listen on {config}: {err}: {cause}")
                }
                None => eprintln!("Cannot listen on {config}: {err}"),
            }
            return ExitCode::FAILURE;
        }
    };

    println!("Server started on {config}");
    tokio::select! {
        _ = server.run() => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                eprintln!("Cannot wait for interrupt: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
    println!("\nServer stopped.");
    ExitCode::SUCCESS
}
