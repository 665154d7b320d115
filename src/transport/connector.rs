//! # Connection Establisher
//!
//! Resolve an endpoint to its candidate addresses and race concurrent
//! connect attempts across address families.
//!
//! The host is resolved once; the first IPv4 and the first IPv6 address
//! found become the candidates. Both are dialed concurrently and the first
//! attempt to succeed wins unconditionally. A failing attempt defers the
//! decision to the other; only when every attempt has failed does the race
//! as a whole fail. Losing and late attempts are aborted and their sockets
//! dropped, so chunk I/O is never started on a non-winning socket.

use crate::core::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Race connect attempts against `endpoint`'s candidate addresses.
///
/// Returns the winning stream, or an error when resolution yields no usable
/// address, every attempt fails, the time budget runs out, or `cancel` fires
/// (a forced close during the race).
pub(crate) async fn connect_race(
    endpoint: &Endpoint,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<TcpStream> {
    let candidates = resolve_candidates(endpoint).await?;

    let mut attempts = JoinSet::new();
    for addr in candidates {
        debug!(%addr, "starting connect attempt");
        attempts.spawn(async move {
            TcpStream::connect(addr)
                .await
                .map_err(|e| (addr, e))
        });
    }

    let race = async {
        let mut last_failure: Option<(SocketAddr, std::io::Error)> = None;

        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(Ok(stream)) => {
                    // first success wins; stragglers are aborted and their
                    // sockets dropped when the JoinSet goes out of scope
                    if let Ok(peer) = stream.peer_addr() {
                        debug!(%peer, "connect race won");
                    }
                    return Ok(stream);
                }
                Ok(Err((addr, error))) => {
                    debug!(%addr, %error, "connect attempt failed");
                    last_failure = Some((addr, error));
                }
                Err(join_error) => {
                    warn!(%join_error, "connect attempt task failed");
                }
            }
        }

        match last_failure {
            Some((addr, error)) => Err(TransportError::ConnectFailed(format!(
                "{addr}: {error}"
            ))),
            None => Err(TransportError::ConnectFailed(
                "no connect attempt completed".to_string(),
            )),
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(TransportError::ConnectionClosed),
        outcome = tokio::time::timeout(timeout, race) => match outcome {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectFailed(format!(
                "no attempt completed within {timeout:?}"
            ))),
        },
    }
}

/// Resolve the endpoint host and keep at most one address per family.
async fn resolve_candidates(endpoint: &Endpoint) -> Result<Vec<SocketAddr>> {
    let addresses = lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| TransportError::Resolution(format!("{endpoint}: {e}")))?;

    let mut v4: Option<SocketAddr> = None;
    let mut v6: Option<SocketAddr> = None;

    for addr in addresses {
        match addr {
            SocketAddr::V4(_) if v4.is_none() => v4 = Some(addr),
            SocketAddr::V6(_) if v6.is_none() => v6 = Some(addr),
            _ => {}
        }
        if v4.is_some() && v6.is_some() {
            break;
        }
    }

    let candidates: Vec<SocketAddr> = [v4, v6].into_iter().flatten().collect();

    if candidates.is_empty() {
        return Err(TransportError::Resolution(format!(
            "{endpoint}: host has no usable address"
        )));
    }

    Ok(candidates)
}
