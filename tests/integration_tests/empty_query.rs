// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use super::common::spawn_server;

#[tokio::test]
async fn fresh_database_yields_no_rows() {
    let server = spawn_server("journalctl").await.expect("spawn server");
    let response = server.request("QUERY_LOGS since=3600 limit=10").await.expect("request");
    assert_eq!(response, "");
}
