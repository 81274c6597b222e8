// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use super::common::{fixture_journal_cmd, journal_line, recent_ts_micros, spawn_server};

#[tokio::test]
async fn discover_units_orders_by_count_descending() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = recent_ts_micros(60);
    let lines = vec![
        journal_line("c1", base, "sshd.service", 6, "one"),
        journal_line("c2", base + 1, "sshd.service", 6, "two"),
        journal_line("c3", base + 2, "sshd.service", 6, "three"),
        journal_line("c4", base + 3, "nginx.service", 6, "four"),
    ];
    let journal_cmd = fixture_journal_cmd(dir.path(), &lines);

    let server = spawn_server(&journal_cmd).await.expect("spawn server");
    server.request("INGEST_JOURNAL 60").await.expect("ingest");

    let response = server.request("DISCOVER UNITS since=3600").await.expect("discover");
    let rows: Vec<&str> = response.lines().collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains(r#""value":"sshd.service""#));
    assert!(rows[0].contains(r#""count":3"#));
    assert!(rows[1].contains(r#""value":"nginx.service""#));
    assert!(rows[1].contains(r#""count":1"#));
}
