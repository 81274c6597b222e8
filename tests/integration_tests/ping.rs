// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use super::common::spawn_server;

#[tokio::test]
async fn ping_replies_pong() {
    let server = spawn_server("journalctl").await.expect("spawn server");
    let response = server.request("PING").await.expect("request");
    assert_eq!(response, "PONG\n");
}
