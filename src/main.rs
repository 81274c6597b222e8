// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chimera_logmind::cfg::{Config, logger::init_logger};
use chimera_logmind::{server, store::Store};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The logger may not have initialized successfully; fall back to
            // stderr so the failure is never silent.
            eprintln!("chimerad: fatal: {e:#}");
            ExitCode::FAILURE
        },
    }
}

async fn run() -> Result<()> {
    let cfg = Config::from_env().context("invalid configuration")?;
    let _logger_guard = init_logger(&cfg).context("failed to initialize logger")?;

    info!(
        socket = %cfg.socket_path.display(),
        db = %cfg.db_path.display(),
        "chimerad starting"
    );

    let store = Store::open(&cfg.db_path).map_err(|e| {
        error!(error = %e, "failed to open analytic store");
        anyhow::anyhow!("store startup failed: {e}")
    })?;

    let shutdown = CancellationToken::new();
    let signal_task = tokio::spawn(server::wait_for_shutdown_signal(shutdown.clone()));

    let result = server::run(Arc::new(cfg), Arc::new(store), shutdown).await;
    signal_task.abort();

    match &result {
        Ok(()) => info!("chimerad exited cleanly"),
        Err(e) => error!(error = %e, "chimerad exited with an error"),
    }
    result
}
