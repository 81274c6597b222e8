// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use super::common::{fixture_journal_cmd, journal_line, recent_ts_micros, spawn_server};

#[tokio::test]
async fn contains_filter_matches_case_insensitively() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lines = vec![journal_line(
        "c1",
        recent_ts_micros(60),
        "sshd.service",
        3,
        "Failed password for root",
    )];
    let journal_cmd = fixture_journal_cmd(dir.path(), &lines);

    let server = spawn_server(&journal_cmd).await.expect("spawn server");
    server.request("INGEST_JOURNAL 60").await.expect("ingest");

    for needle in [r#"contains="failed password""#, r#"contains="Failed Password""#] {
        let response = server
            .request(&format!("QUERY_LOGS since=3600 {needle}"))
            .await
            .expect("query");
        assert_eq!(response.lines().count(), 1, "needle {needle} should match one row");
    }
}
