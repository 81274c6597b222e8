// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Maps one parsed [`crate::protocol::Request`] to a [`Response`],
//! routing by verb per spec.md §4.E/§4.F.

use tracing::{debug, warn};

use crate::cfg::Config;
use crate::error::ChimeraError;
use crate::ingest;
use crate::model::{DiscoverDimension, Order, QueryFilters, Severity};
use crate::protocol::{self, Request};
use crate::store::Store;

/// What a connection writes back before closing.
pub enum Response {
    /// One line (without its trailing `\n`).
    Scalar(String),
    /// Zero or more self-contained JSON lines; connection closes after
    /// the last one.
    NdjsonLines(Vec<String>),
}

/// Parses `line` and routes it to the matching handler.
pub async fn dispatch(line: &str, store: &Store, cfg: &Config) -> Response {
    let request = match protocol::parse_request(line) {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "bad-arguments: failed to parse request line");
            return Response::Scalar(protocol::err_line("bad-arguments"));
        },
    };

    let result = match request.verb.as_str() {
        "PING" => Ok(Response::Scalar("PONG".to_string())),
        "HEALTH" => Ok(Response::Scalar(protocol::ok_line(&[]))),
        "VERSION" => Ok(Response::Scalar(env!("CARGO_PKG_VERSION").to_string())),
        "INGEST_JOURNAL" => handle_ingest_journal(&request, store, cfg).await,
        "QUERY_LOGS" => handle_query_logs(&request, store),
        "DISCOVER" => handle_discover(&request, store),
        _ => Err(ChimeraError::UnknownCommand),
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            log_error(&e);
            match e.wire_reason() {
                Some(reason) => Response::Scalar(protocol::err_line(&reason)),
                None => Response::Scalar(protocol::err_line("internal")),
            }
        },
    }
}

fn log_error(e: &ChimeraError) {
    match e {
        ChimeraError::BadRequest(_) | ChimeraError::UnknownCommand => {},
        ChimeraError::ExternalUnavailable(reason) => warn!(reason, "journal unavailable"),
        ChimeraError::Storage(reason) => tracing::error!(reason, "storage error"),
        ChimeraError::ClientDisconnected => debug!("client disconnected"),
        ChimeraError::StartupFatal(reason) => tracing::error!(reason, "startup fatal"),
    }
}

async fn handle_ingest_journal(
    request: &Request,
    store: &Store,
    cfg: &Config,
) -> Result<Response, ChimeraError> {
    let seconds: u64 = request
        .positional(0)
        .ok_or_else(|| ChimeraError::BadRequest("INGEST_JOURNAL requires <seconds>".to_string()))?
        .parse()
        .map_err(|_| ChimeraError::BadRequest("<seconds> must be a non-negative integer".to_string()))?;
    if seconds == 0 {
        return Err(ChimeraError::BadRequest("<seconds> must be at least 1".to_string()));
    }

    let limit: Option<u64> = match request.positional(1) {
        Some(raw) => Some(
            raw.parse()
                .map_err(|_| ChimeraError::BadRequest("[limit] must be a non-negative integer".to_string()))?,
        ),
        None => None,
    };

    let outcome = ingest::ingest_journal(store, &cfg.journal_cmd, seconds, limit).await?;

    Ok(Response::Scalar(protocol::ok_line(&[
        ("inserted", outcome.inserted.to_string()),
        ("total", outcome.total_after.to_string()),
    ])))
}

fn handle_query_logs(request: &Request, store: &Store) -> Result<Response, ChimeraError> {
    let since_seconds = parse_opt_i64(request, "since")?;
    let min_severity = request.kv("min_severity").map(|s| Severity::parse(s));
    let limit = parse_opt_u32(request, "limit")?;
    let order = match request.kv("order").map(str::to_ascii_lowercase).as_deref() {
        None | Some("desc") => Order::Desc,
        Some("asc") => Order::Asc,
        Some(_) => return Err(ChimeraError::BadRequest("order must be asc or desc".to_string())),
    };

    let filters = QueryFilters {
        since_seconds,
        min_severity,
        source: request.kv("source").map(str::to_string),
        unit: request.kv("unit").map(str::to_string),
        hostname: request.kv("hostname").map(str::to_string),
        contains: request.kv("contains").map(str::to_string),
        limit,
        order,
    };

    let rows = store.query_logs(&filters)?;
    let lines = rows
        .iter()
        .map(|row| serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string()))
        .collect();
    Ok(Response::NdjsonLines(lines))
}

fn handle_discover(request: &Request, store: &Store) -> Result<Response, ChimeraError> {
    let dimension = request
        .positional(0)
        .ok_or_else(|| ChimeraError::BadRequest("DISCOVER requires a dimension".to_string()))
        .and_then(|raw| {
            DiscoverDimension::parse(raw)
                .ok_or_else(|| ChimeraError::BadRequest(format!("unknown dimension {raw:?}")))
        })?;

    let since_seconds = parse_opt_i64(request, "since")?;
    let limit = parse_opt_u32(request, "limit")?;

    let rows = store.discover(dimension, since_seconds, limit)?;
    let lines = rows
        .iter()
        .map(|row| serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string()))
        .collect();
    Ok(Response::NdjsonLines(lines))
}

fn parse_opt_i64(request: &Request, key: &str) -> Result<Option<i64>, ChimeraError> {
    match request.kv(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ChimeraError::BadRequest(format!("{key} must be an integer"))),
        None => Ok(None),
    }
}

fn parse_opt_u32(request: &Request, key: &str) -> Result<Option<u32>, ChimeraError> {
    match request.kv(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ChimeraError::BadRequest(format!("{key} must be a non-negative integer"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn test_config(journal_cmd: &str) -> Config {
        Config {
            socket_path: "/tmp/unused.sock".into(),
            db_path: "/tmp/unused.duckdb".into(),
            log_level: "info".to_string(),
            log_file: None,
            journal_cmd: journal_cmd.to_string(),
            log_format: crate::cfg::config::LogFormat::Json,
            shutdown_grace_secs: 10,
            max_line_bytes: 65536,
        }
    }

    #[tokio::test]
    async fn ping_returns_pong() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("c.duckdb")).expect("open");
        let cfg = test_config("journalctl");
        match dispatch("PING", &store, &cfg).await {
            Response::Scalar(s) => assert_eq!(s, "PONG"),
            _ => panic!("expected scalar"),
        }
    }

    #[tokio::test]
    async fn unknown_verb_is_unknown_command() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("c.duckdb")).expect("open");
        let cfg = test_config("journalctl");
        match dispatch("FROBNICATE", &store, &cfg).await {
            Response::Scalar(s) => assert_eq!(s, "ERR unknown-command"),
            _ => panic!("expected scalar"),
        }
    }

    #[tokio::test]
    async fn query_logs_on_empty_store_yields_no_lines() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("c.duckdb")).expect("open");
        let cfg = test_config("journalctl");
        match dispatch("QUERY_LOGS since=3600 limit=10", &store, &cfg).await {
            Response::NdjsonLines(lines) => assert!(lines.is_empty()),
            _ => panic!("expected ndjson"),
        }
    }

    #[tokio::test]
    async fn ingest_journal_bad_seconds_is_bad_arguments() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("c.duckdb")).expect("open");
        let cfg = test_config("journalctl");
        match dispatch("INGEST_JOURNAL not-a-number", &store, &cfg).await {
            Response::Scalar(s) => assert_eq!(s, "ERR bad-arguments"),
            _ => panic!("expected scalar"),
        }
    }

    #[tokio::test]
    async fn ingest_journal_zero_seconds_is_bad_arguments() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("c.duckdb")).expect("open");
        let cfg = test_config("journalctl");
        match dispatch("INGEST_JOURNAL 0", &store, &cfg).await {
            Response::Scalar(s) => assert_eq!(s, "ERR bad-arguments"),
            _ => panic!("expected scalar"),
        }
    }
}
