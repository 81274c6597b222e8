// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chimera_logmind::cfg::Config;
use chimera_logmind::cfg::config::LogFormat;
use chimera_logmind::store::Store;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running server bound to a throwaway socket under a temp directory,
/// torn down when dropped.
pub struct TestServer {
    pub socket_path: std::path::PathBuf,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    /// Sends one request line and returns the full response (everything
    /// written before the server closes the connection).
    pub async fn request(&self, line: &str) -> Result<String> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .context("connect to test socket")?;
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;

        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        Ok(response)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.handle.abort();
    }
}

/// Spawns a real server on a temp socket, backed by a temp DuckDB file,
/// with `journal_cmd` as its journal tool (normally a fixture script).
pub async fn spawn_server(journal_cmd: &str) -> Result<TestServer> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let socket_path = dir.path().join("api.sock");
    let db_path = dir.path().join("chimera.duckdb");

    let cfg = Config {
        socket_path: socket_path.clone(),
        db_path,
        log_level: "error".to_string(),
        log_file: None,
        journal_cmd: journal_cmd.to_string(),
        log_format: LogFormat::Json,
        shutdown_grace_secs: 2,
        max_line_bytes: 65536,
    };

    let store = Store::open(&cfg.db_path).context("open test store")?;
    let shutdown = CancellationToken::new();

    let run_shutdown = shutdown.clone();
    let run_cfg = Arc::new(cfg);
    let run_store = Arc::new(store);
    let handle = tokio::spawn(async move {
        let _ = chimera_logmind::server::run(run_cfg, run_store, run_shutdown).await;
    });

    // Give the accept loop a moment to bind before the first connection.
    for _ in 0..50 {
        if UnixStream::connect(&socket_path).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    Ok(TestServer { socket_path, shutdown, handle, _dir: dir })
}

/// Writes `lines` to a temp NDJSON fixture and returns the path to a tiny
/// shell script that `cat`s it, suitable for `CHIMERA_JOURNAL_CMD`.
pub fn fixture_journal_cmd(dir: &std::path::Path, lines: &[String]) -> String {
    let data_path = dir.join("fixture.ndjson");
    std::fs::write(&data_path, lines.join("\n")).expect("write fixture");

    let script_path = dir.join("fake-journalctl.sh");
    std::fs::write(&script_path, format!("#!/bin/sh\ncat {}\n", data_path.display()))
        .expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&script_path).expect("meta").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms).expect("chmod");
    }
    script_path.display().to_string()
}

/// Builds one `journalctl -o json`-shaped fixture line.
pub fn journal_line(cursor: &str, ts_micros: i64, unit: &str, priority: u8, message: &str) -> String {
    format!(
        r#"{{"__REALTIME_TIMESTAMP":"{ts_micros}","_HOSTNAME":"test-host","_SYSTEMD_UNIT":"{unit}","PRIORITY":"{priority}","MESSAGE":"{message}","__CURSOR":"{cursor}"}}"#
    )
}

/// A `__REALTIME_TIMESTAMP` value `offset_seconds` in the past from the
/// moment the test runs, so fixtures stay inside a `since=...` window
/// regardless of when the suite executes.
pub fn recent_ts_micros(offset_seconds: i64) -> i64 {
    (chrono::Utc::now() - chrono::Duration::seconds(offset_seconds)).timestamp_micros()
}
