// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use super::common::{fixture_journal_cmd, journal_line, recent_ts_micros, spawn_server};

#[tokio::test]
async fn min_severity_err_returns_crit_and_err_in_ascending_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = recent_ts_micros(60);
    let lines = vec![
        journal_line("c1", base, "svc.service", 6, "info row"),   // info
        journal_line("c2", base + 1, "svc.service", 3, "err row"), // err
        journal_line("c3", base + 2, "svc.service", 7, "debug row"), // debug
        journal_line("c4", base + 3, "svc.service", 2, "crit row"), // crit
    ];
    let journal_cmd = fixture_journal_cmd(dir.path(), &lines);

    let server = spawn_server(&journal_cmd).await.expect("spawn server");
    let ingest = server.request("INGEST_JOURNAL 60").await.expect("ingest");
    assert_eq!(ingest, "OK inserted=4 total=4\n");

    let response = server
        .request("QUERY_LOGS since=3600 min_severity=err order=asc")
        .await
        .expect("query");
    let rows: Vec<&str> = response.lines().collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains(r#""severity":"crit""#));
    assert!(rows[1].contains(r#""severity":"err""#));
}
