//! # rusty-iperf entry point
//!
//! Parses CLI arguments, wires up logging, and dispatches to the client or
//! server control-plane state machine.

use anyhow::{bail, Result};
use clap::Parser;
use rusty_iperf::cli::Args;
use rusty_iperf::{client_fsm, server_fsm};
use tracing::info;

use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

mod logging;
use logging::ColorizedFormatter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configure logging level based on verbosity flags. Applies to both the
    // log file and stdout.
    // - default: INFO
    // -v: DEBUG
    // -vv and more: TRACE
    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let guard;
    let detailed_log_layer;

    if let Some("stderr") = args.log_file.as_deref() {
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed();
        guard = None;
    } else {
        let file_appender = match args.log_file.as_deref() {
            Some(path_str) => {
                let log_path = std::path::Path::new(path_str);
                let log_dir = log_path
                    .parent()
                    .unwrap_or_else(|| std::path::Path::new("."));
                let log_filename = log_path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("rusty-iperf.log"));
                tracing_appender::rolling::daily(log_dir, log_filename)
            }
            None => tracing_appender::rolling::daily(".", "rusty-iperf.log"),
        };
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_filter(log_level)
            .boxed();
        guard = Some(file_guard);
    }

    let stdout_log = if !args.quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(detailed_log_layer)
        .with(stdout_log)
        .init();

    // Keep the logging guard alive for the duration of the program; if we
    // don't assign it, file logging stops as soon as it's dropped.
    let _log_guard = guard;

    match (args.server, args.client.is_some()) {
        (true, true) => bail!("--server and --client are mutually exclusive"),
        (false, false) => bail!("specify either --server or --client <host>"),
        (true, false) => {
            info!(port = args.port, data_port = args.resolved_data_port(), "starting server");
            let config = args.build_config();
            tokio::select! {
                result = server_fsm::serve(config) => result?,
                _ = tokio::signal::ctrl_c() => info!("received interrupt, shutting down server"),
            }
        }
        (false, true) => {
            let config = args.build_config();
            let params = args.build_params();
            info!(
                target = %config.target,
                transport = ?params.transport(),
                time = params.time,
                "starting client"
            );
            tokio::select! {
                result = client_fsm::run(config, params) => result?,
                _ = tokio::signal::ctrl_c() => info!("received interrupt, ending client session"),
            }
        }
    }

    Ok(())
}
