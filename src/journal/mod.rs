// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Streams newline-delimited JSON records from the host's journal tool.
//!
//! Grounded on `ClientConnection::read_loop` (a background task owns the
//! read side of an external I/O source and forwards parsed units through a
//! channel) generalized from a TCP byte stream to a child process's line
//! stream.

use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ChimeraError;
use crate::model::{RawRecord, Severity};

/// Fixed source name the ingestor's rows are tagged with.
pub const SOURCE_NAME: &str = "journal";

/// Raw shape of one line emitted by the journal tool, before mapping to
/// [`RawRecord`]. Field names follow `journalctl -o json` output.
#[derive(Debug, Deserialize)]
struct RawJournalLine {
    #[serde(rename = "__REALTIME_TIMESTAMP")]
    realtime_timestamp: Option<String>,
    #[serde(rename = "_HOSTNAME")]
    hostname: Option<String>,
    #[serde(rename = "_SYSTEMD_UNIT")]
    unit: Option<String>,
    #[serde(rename = "PRIORITY")]
    priority: Option<String>,
    #[serde(rename = "MESSAGE")]
    message: Option<String>,
    #[serde(rename = "__CURSOR")]
    cursor: Option<String>,
}

/// Bounds for one read of the journal.
#[derive(Debug, Clone)]
pub struct ReadBounds {
    pub window_seconds: u64,
    pub max_records: Option<u64>,
    pub start_cursor: Option<String>,
}

/// Outcome of a finished journal read: how many lines were malformed and
/// skipped, and whether the underlying process exited non-zero.
#[derive(Debug, Default)]
pub struct ReadSummary {
    pub skipped_malformed: u64,
    pub process_failed: bool,
}

/// Spawns the journal tool and streams normalized records to `tx` until
/// the process exits, `max_records` is reached, or the channel receiver is
/// dropped. Returns once the stream has ended.
///
/// `journal_cmd` is the program to invoke (`$CHIMERA_JOURNAL_CMD`,
/// normally `journalctl`); arguments are derived from `bounds`.
pub async fn stream_records(
    journal_cmd: &str,
    bounds: ReadBounds,
    tx: mpsc::Sender<RawRecord>,
) -> Result<ReadSummary, ChimeraError> {
    let mut cmd = Command::new(journal_cmd);
    cmd.arg("-o").arg("json");

    if let Some(cursor) = &bounds.start_cursor {
        cmd.arg("--after-cursor").arg(cursor);
    } else {
        cmd.arg("--since").arg(format!("-{}s", bounds.window_seconds));
    }
    if let Some(max_records) = bounds.max_records {
        cmd.arg("--lines").arg(max_records.to_string());
    }

    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| {
        ChimeraError::ExternalUnavailable(format!("cannot launch {journal_cmd}: {e}"))
    })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        ChimeraError::ExternalUnavailable(format!("{journal_cmd} produced no stdout"))
    })?;
    let mut lines = BufReader::new(stdout).lines();

    let mut summary = ReadSummary::default();
    let mut emitted = 0u64;

    loop {
        if let Some(max_records) = bounds.max_records {
            if emitted >= max_records {
                break;
            }
        }

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "journal reader I/O error, ending stream");
                break;
            },
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_line(&line) {
            Some(record) => {
                emitted += 1;
                if tx.send(record).await.is_err() {
                    // Receiver dropped; stop reading and let the child be
                    // killed on drop.
                    break;
                }
            },
            None => {
                summary.skipped_malformed += 1;
                debug!(line = %line, "skipping malformed journal line");
            },
        }
    }

    drop(lines);
    match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
        Ok(Ok(status)) if !status.success() => {
            summary.process_failed = true;
            warn!(?status, "journal tool exited non-zero");
        },
        Ok(Ok(_)) => {},
        Ok(Err(e)) => warn!(error = %e, "failed to wait for journal tool"),
        Err(_) => {
            warn!("journal tool did not exit promptly after EOF; killing");
            let _ = child.start_kill();
        },
    }

    Ok(summary)
}

fn parse_line(line: &str) -> Option<RawRecord> {
    let raw: RawJournalLine = serde_json::from_str(line).ok()?;

    let ts = raw
        .realtime_timestamp
        .as_deref()
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|micros| Utc.timestamp_micros(micros).single());

    let priority: u8 = raw
        .priority
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(6);

    Some(RawRecord {
        ts,
        hostname: raw.hostname.unwrap_or_default(),
        unit: raw.unit.unwrap_or_default(),
        source: SOURCE_NAME.to_string(),
        severity: Severity::from_priority(priority),
        message: raw.message.unwrap_or_default(),
        cursor: raw.cursor,
    })
}

/// Parses a raw `__REALTIME_TIMESTAMP` (microseconds since epoch) string
/// on its own, for callers that only need the timestamp.
pub fn parse_realtime_timestamp(s: &str) -> Option<DateTime<Utc>> {
    s.parse::<i64>().ok().and_then(|micros| Utc.timestamp_micros(micros).single())
}
