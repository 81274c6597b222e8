// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};

const DEFAULT_SOCKET_PATH: &str = "/run/chimera/api.sock";
const DEFAULT_DB_PATH: &str = "/var/lib/chimera/chimera.duckdb";
const DEFAULT_JOURNAL_CMD: &str = "journalctl";
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Runtime configuration, assembled entirely from environment variables
/// (spec.md §1 excludes a config-file loader from this core).
#[derive(Debug, Clone)]
pub struct Config {
    /// `CHIMERA_API_SOCKET`, defaulting to `/run/chimera/api.sock`.
    pub socket_path: PathBuf,
    /// `CHIMERA_DB_PATH`, defaulting to `/var/lib/chimera/chimera.duckdb`.
    pub db_path: PathBuf,
    /// `CHIMERA_LOG_LEVEL`, an `EnvFilter` directive string.
    pub log_level: String,
    /// `CHIMERA_LOG_FILE`, an optional log destination path.
    pub log_file: Option<PathBuf>,
    /// `CHIMERA_JOURNAL_CMD`, the journal tool to invoke.
    pub journal_cmd: String,
    /// `CHIMERA_LOG_FORMAT`: `"json"` (default) or `"pretty"`.
    pub log_format: LogFormat,
    /// `CHIMERA_SHUTDOWN_GRACE_SECS`, seconds to let in-flight connections
    /// finish after a shutdown signal.
    pub shutdown_grace_secs: u64,
    /// `CHIMERA_MAX_LINE_BYTES`, the cap on one request line.
    pub max_line_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Config {
    /// Reads and validates configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let socket_path = env::var("CHIMERA_API_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOCKET_PATH));

        let db_path = env::var("CHIMERA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));

        let log_level = env::var("CHIMERA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_file = env::var("CHIMERA_LOG_FILE").ok().map(PathBuf::from);

        let journal_cmd =
            env::var("CHIMERA_JOURNAL_CMD").unwrap_or_else(|_| DEFAULT_JOURNAL_CMD.to_string());

        let log_format = match env::var("CHIMERA_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Ok(other) => anyhow::bail!("CHIMERA_LOG_FORMAT must be json or pretty, got {other:?}"),
            Err(_) => LogFormat::Json,
        };

        let shutdown_grace_secs = match env::var("CHIMERA_SHUTDOWN_GRACE_SECS") {
            Ok(v) => v
                .parse()
                .context("CHIMERA_SHUTDOWN_GRACE_SECS must be a non-negative integer")?,
            Err(_) => DEFAULT_SHUTDOWN_GRACE_SECS,
        };

        let max_line_bytes = match env::var("CHIMERA_MAX_LINE_BYTES") {
            Ok(v) => v
                .parse()
                .context("CHIMERA_MAX_LINE_BYTES must be a positive integer")?,
            Err(_) => DEFAULT_MAX_LINE_BYTES,
        };

        let cfg = Self {
            socket_path,
            db_path,
            log_level,
            log_file,
            journal_cmd,
            log_format,
            shutdown_grace_secs,
            max_line_bytes,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.journal_cmd.trim().is_empty(), "CHIMERA_JOURNAL_CMD must not be empty");
        ensure!(self.max_line_bytes > 0, "CHIMERA_MAX_LINE_BYTES must be > 0");
        Ok(())
    }
}
