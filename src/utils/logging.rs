//! Tracing setup for the command-line binary.
//!
//! Diagnostics go to stderr so that json and junit reports on stdout stay
//! machine-readable. `RUST_LOG` takes precedence over the verbosity flag.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

use crate::utils::error::{GateError, GateResult};

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Map `-v` occurrences to a default filter directive
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Subsequent calls are no-ops.
pub fn init(verbosity: u8) -> GateResult<()> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("smokegate={}", level_for_verbosity(verbosity))));

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact(),
    );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| GateError::Internal(format!("Failed to install tracing subscriber: {}", e)))?;
    let _ = INITIALIZED.set(());
    Ok(())
}
