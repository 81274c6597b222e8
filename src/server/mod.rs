// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The UDS dispatcher: binds the socket, accepts connections, and spawns
//! one task per connection.
//!
//! Grounded on `ClientConnection::connect` (spawn a background task per
//! I/O peer) and its `cancel`/`stop_writes`/`graceful_quiesce`
//! `CancellationToken` shutdown idiom, generalized from a single
//! outbound TCP connection to an accept loop serving many inbound UDS
//! connections.

use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cfg::Config;
use crate::error::ChimeraError;
use crate::handlers;
use crate::store::Store;

/// Minimum accept backlog, per spec.md §4.E.
const BACKLOG_HINT: u32 = 16;
/// Read timeout applied only to the initial request line.
const REQUEST_LINE_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves the socket path to bind: `cfg.socket_path`, falling back to a
/// per-user path under the system temp directory if the configured
/// parent directory is not writable.
fn resolve_socket_path(cfg: &Config) -> PathBuf {
    if let Some(parent) = cfg.socket_path.parent() {
        if parent.as_os_str().is_empty() || is_writable_dir(parent) {
            return cfg.socket_path.clone();
        }
    }

    let fallback_dir = std::env::temp_dir().join(format!("chimera-{}", whoami_uid()));
    let _ = std::fs::create_dir_all(&fallback_dir);
    warn!(
        configured = %cfg.socket_path.display(),
        fallback = %fallback_dir.display(),
        "socket parent directory not writable; falling back to per-user temp path"
    );
    fallback_dir.join("api.sock")
}

fn is_writable_dir(dir: &Path) -> bool {
    match std::fs::metadata(dir) {
        Ok(meta) => !meta.permissions().readonly(),
        Err(_) => false,
    }
}

fn whoami_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}

/// Binds the UDS listener: unlinks a stale socket, binds, sets
/// permissions, and best-effort `chown`s the group.
fn bind_listener(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create socket directory {}", parent.display()))?;
    }

    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "unlinked stale socket"),
        Err(e) if e.kind() == ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "failed to unlink stale socket"),
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("cannot bind unix socket at {}", path.display()))?;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o660))
        .with_context(|| format!("cannot set permissions on {}", path.display()))?;

    if let Err(e) = nix::unistd::chown(path, None, None) {
        debug!(path = %path.display(), error = %e, "best-effort group chown skipped");
    }

    Ok(listener)
}

/// Runs the accept loop until `shutdown` is cancelled. Every accepted
/// connection is handed to an independently spawned task (spec.md §5).
pub async fn run(
    cfg: Arc<Config>,
    store: Arc<Store>,
    shutdown: CancellationToken,
) -> Result<()> {
    let socket_path = resolve_socket_path(&cfg);
    let listener = bind_listener(&socket_path)?;
    info!(path = %socket_path.display(), backlog_hint = BACKLOG_HINT, "listening");

    let mut inflight = tokio::task::JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown signal received; closing accept loop");
                break;
            },
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let cfg = Arc::clone(&cfg);
                        let store = Arc::clone(&store);
                        let conn_shutdown = shutdown.clone();
                        inflight.spawn(async move {
                            handle_connection(stream, cfg, store, conn_shutdown).await;
                        });
                    },
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            },
        }
    }

    drop(listener);
    let _ = std::fs::remove_file(&socket_path);

    let grace = Duration::from_secs(cfg.shutdown_grace_secs);
    info!(grace_secs = cfg.shutdown_grace_secs, "waiting for in-flight connections to finish");
    if timeout(grace, async {
        while inflight.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("shutdown grace period elapsed with connections still in flight; aborting them");
        inflight.shutdown().await;
    }

    Ok(())
}

/// Serves exactly one request on `stream`, per spec.md §4.E.
async fn handle_connection(
    stream: UnixStream,
    cfg: Arc<Config>,
    store: Arc<Store>,
    shutdown: CancellationToken,
) {
    let (reader_half, mut writer_half) = stream.into_split();
    let mut reader = BufReader::new(reader_half).take(cfg.max_line_bytes as u64 + 1);

    let mut line = String::new();
    let read_result = tokio::select! {
        _ = shutdown.cancelled() => {
            debug!("connection dropped: server shutting down before request was read");
            return;
        },
        res = timeout(REQUEST_LINE_TIMEOUT, reader.read_line(&mut line)) => res,
    };

    let bytes_read = match read_result {
        Ok(Ok(n)) => n,
        Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof || e.kind() == ErrorKind::BrokenPipe => {
            debug!("client disconnected before sending a request");
            return;
        },
        Ok(Err(e)) => {
            warn!(error = %e, "error reading request line");
            return;
        },
        Err(_) => {
            debug!("request line read timed out");
            let _ = write_line(&mut writer_half, "ERR bad-arguments").await;
            return;
        },
    };

    if bytes_read == 0 {
        debug!("client disconnected without sending a request");
        return;
    }
    if line.len() as u64 > cfg.max_line_bytes as u64 {
        let _ = write_line(&mut writer_half, "ERR bad-arguments").await;
        return;
    }

    let line = line.trim_end_matches(['\n', '\r']);
    let response = handlers::dispatch(line, &store, &cfg).await;

    match response {
        handlers::Response::Scalar(text) => {
            let _ = write_line(&mut writer_half, &text).await;
        },
        handlers::Response::NdjsonLines(lines) => {
            for entry in lines {
                if writer_half.write_all(entry.as_bytes()).await.is_err() {
                    debug!("client disconnected mid-stream");
                    return;
                }
                if writer_half.write_all(b"\n").await.is_err() {
                    return;
                }
            }
        },
    }
    let _ = writer_half.shutdown().await;
}

async fn write_line(
    writer: &mut (impl AsyncWriteExt + Unpin),
    text: &str,
) -> Result<(), ChimeraError> {
    writer
        .write_all(text.as_bytes())
        .await
        .map_err(|_| ChimeraError::ClientDisconnected)?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|_| ChimeraError::ClientDisconnected)?;
    Ok(())
}

/// Installs a future that resolves once `SIGTERM` or `SIGINT` is
/// received and cancels `token` accordingly.
pub async fn wait_for_shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                return;
            },
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGINT handler");
                return;
            },
        };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
        token.cancel();
    }
    #[cfg(not(unix))]
    {
        let _ = token;
    }
}

