// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use super::common::{fixture_journal_cmd, journal_line, recent_ts_micros, spawn_server};

#[tokio::test]
async fn reingesting_five_identical_records_dedups() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = recent_ts_micros(60);
    let lines: Vec<String> = (1..=5)
        .map(|i| journal_line(&format!("c{i}"), base + i, "sshd.service", 6, "same message"))
        .collect();
    let journal_cmd = fixture_journal_cmd(dir.path(), &lines);

    let server = spawn_server(&journal_cmd).await.expect("spawn server");

    let first = server.request("INGEST_JOURNAL 60").await.expect("first ingest");
    assert_eq!(first, "OK inserted=5 total=5\n");

    let second = server.request("INGEST_JOURNAL 60").await.expect("second ingest");
    assert_eq!(second, "OK inserted=0 total=5\n");
}
