mod cli;
mod commands;
mod config;
mod format;

use std::process::ExitCode;

use clap::Parser;
use fleetcert_ca::CaError;
use fleetcert_common::ErrorCode;
use fleetcert_crypto::CodecError;
use fleetcert_rotation::RotationError;

use cli::{Cli, Command};
use config::Config;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => cli.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _log_guards = match init_logging(env_filter, cli.log_file.as_deref()) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Error: failed to initialise logging: {e:#}");
            return exit_code(ErrorCode::IoError);
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = error_code(&e);
            tracing::debug!(error = ?e, "Command failed");
            if cli.json {
                commands::print_json(&serde_json::json!({
                    "error": code,
                    "message": format!("{e:#}"),
                }));
            } else {
                eprintln!("Error: {e:#}");
            }
            exit_code(code)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::from_cli(cli)?;
    tracing::debug!(data_dir = %config.data_dir.display(), "Configuration resolved");

    match &cli.command {
        Command::Ca(ca) => commands::ca::run(&config, &ca.command, cli.json),
        Command::Device(device) => commands::device::run(&config, &device.command, cli.json),
        Command::Rotate(args) => commands::rotate::run(&config, args, cli.json),
    }
}

/// Classify an error by the first typed error in its chain.
fn error_code(err: &anyhow::Error) -> ErrorCode {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<RotationError>() {
            return ErrorCode::from(e);
        }
        if let Some(e) = cause.downcast_ref::<CaError>() {
            return ErrorCode::from(e);
        }
        if cause.downcast_ref::<CodecError>().is_some() {
            return ErrorCode::ParseError;
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ErrorCode::IoError;
        }
    }
    ErrorCode::Internal
}

fn exit_code(code: ErrorCode) -> ExitCode {
    ExitCode::from(u8::try_from(code.exit_code()).unwrap_or(1))
}

/// Set up tracing to stderr, plus an append-mode log file when requested.
/// The returned guards flush buffered lines on drop.
fn init_logging(
    env_filter: tracing_subscriber::EnvFilter,
    log_file: Option<&std::path::Path>,
) -> anyhow::Result<Vec<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let (nb_stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(nb_stderr);

    if let Some(path) = log_file {
        if let Some(parent) = fleetcert_common::fs::parent_dir(path) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let (nb_file, file_guard) = tracing_appender::non_blocking(file);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(nb_file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();

        Ok(vec![stderr_guard, file_guard])
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();

        Ok(vec![stderr_guard])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn typed_errors_survive_context() {
        let err = anyhow::Error::from(RotationError::NoPending).context("promoting");
        assert_eq!(error_code(&err), ErrorCode::NoPending);

        let err = anyhow::Error::from(CaError::NotInitialized).context("loading CA");
        assert_eq!(error_code(&err), ErrorCode::CaNotInitialized);
    }

    #[test]
    fn io_errors_map_to_io_code() {
        let err: anyhow::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ))
        .context("reading CSR");
        assert_eq!(error_code(&err.unwrap_err()), ErrorCode::IoError);
    }

    #[test]
    fn untyped_errors_are_internal() {
        let err = anyhow::anyhow!("something odd");
        assert_eq!(error_code(&err), ErrorCode::Internal);
        assert_eq!(ErrorCode::Internal.exit_code(), 70);
    }
}
