//! # extstate - external state store
//!
//! Entry point for the gRPC state store served to an application runtime.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

use extstate::server::{ServerConfig, StateServer};

/// External key/value state store served over gRPC.
///
/// The store starts uninitialized and listens for the runtime's `Init` call,
/// which selects an on-disk database (`dataDir`) or a temporary one (`inMemory`).
#[derive(Parser, Debug)]
#[command(
    name = "extstate",
    version,
    about = "External key/value state store served over gRPC"
)]
struct Args {
    /// Port to listen on for gRPC traffic.
    #[arg(long, env = "EXT_SS_PORT", default_value_t = 9191)]
    port: u16,

    /// Host name or address to bind.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Log level - 'trace', 'debug', 'info', 'warn', or 'error'.
    /// 'debug' logs every state call.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Interval in milliseconds between sweeps that purge expired records.
    /// 0 disables the sweeper; expired records still read as absent.
    #[arg(long, default_value_t = 1000)]
    ttl_sweep_interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing/logging
    initialize_tracing(&args.log_level)?;

    print_startup_banner(&args);

    let server = StateServer::new(build_server_config(&args));

    // Set up signal handlers for graceful shutdown
    let shutdown = setup_signal_handlers()?;

    info!("Starting extstate server...");
    match server.run(shutdown).await {
        Ok(()) => {
            info!("Server shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {:?}", e);
            Err(e)
        }
    }
}

/// Initialize the tracing/logging system with the specified log level.
fn initialize_tracing(log_level: &str) -> anyhow::Result<()> {
    let env_filter = match log_level {
        "trace" | "debug" | "info" | "warn" | "error" => EnvFilter::new(log_level),
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            EnvFilter::new("info")
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    Ok(())
}

fn print_startup_banner(args: &Args) {
    println!("extstate v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Configuration:");
    println!("  Listen:                {}:{}", args.host, args.port);
    println!("  Schemas:               state.v1, state.v1alpha1");
    println!("  TTL sweep interval:    {}ms", args.ttl_sweep_interval_ms);
    println!("  Log level:             {}", args.log_level);
    println!();
}

fn build_server_config(args: &Args) -> ServerConfig {
    ServerConfig {
        host: args.host.clone(),
        port: args.port,
        ttl_sweep_interval_ms: args.ttl_sweep_interval_ms,
        ..ServerConfig::default()
    }
}

/// Set up signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn setup_signal_handlers() -> anyhow::Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_default_args() {
        // The port is pinned so an EXT_SS_PORT in the environment cannot leak in.
        let args = Args::try_parse_from(["extstate", "--port", "9191"]).unwrap();
        assert_eq!(args.port, 9191);
        assert_eq!(args.host, "localhost");
        assert_eq!(args.log_level, "info");
        assert_eq!(args.ttl_sweep_interval_ms, 1000);
    }

    #[test]
    fn test_port_default_and_env() {
        let command = Args::command();
        let port = command
            .get_arguments()
            .find(|arg| arg.get_id() == "port")
            .unwrap();

        assert_eq!(port.get_env().and_then(|env| env.to_str()), Some("EXT_SS_PORT"));
        let defaults: Vec<_> = port
            .get_default_values()
            .iter()
            .map(|value| value.to_str().unwrap())
            .collect();
        assert_eq!(defaults, vec!["9191"]);
    }

    #[test]
    fn test_build_server_config() {
        let args = Args::try_parse_from([
            "extstate",
            "--port",
            "50051",
            "--host",
            "0.0.0.0",
            "--ttl-sweep-interval-ms",
            "0",
        ])
        .unwrap();

        let config = build_server_config(&args);
        assert_eq!(config.port, 50051);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.ttl_sweep_interval_ms, 0);
        assert_eq!(
            config.keepalive_interval_secs,
            ServerConfig::default().keepalive_interval_secs
        );
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Args::try_parse_from(["extstate", "--port", "70000"]).is_err());
    }
}
