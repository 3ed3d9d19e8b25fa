use std::io;
use std::net::SocketAddr;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Admission;
use crate::http::connection::{ConnectionSettings, lingering_close};
use crate::http::response::{ResponseBuilder, StatusCode};
use crate::http::writer::write_response;
use crate::server::endpoint::Endpoint;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Most 503 answers in flight at once; beyond this, overflow is dropped unanswered.
const MAX_PENDING_REJECTS: usize = 64;

/// Any byte stream a connection can be served over.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// An accepted connection waiting in the work queue.
pub struct Accepted {
    pub stream: Box<dyn Stream>,
    pub peer: String,
}

/// A bound TCP or Unix domain socket listener.
///
/// A Unix socket file is removed when the listener is closed or dropped.
pub enum Listener {
    Tcp(TcpListener),
    Unix {
        listener: UnixListener,
        path: Option<PathBuf>,
    },
}

impl Listener {
    pub async fn bind(endpoint: &Endpoint) -> anyhow::Result<Self> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port))
                    .await
                    .with_context(|| format!("binding {endpoint}"))?;
                Ok(Listener::Tcp(listener))
            }
            Endpoint::Unix(path) => {
                remove_stale_socket(path)?;
                let listener =
                    UnixListener::bind(path).with_context(|| format!("binding {endpoint}"))?;
                Ok(Listener::Unix {
                    listener,
                    path: Some(path.clone()),
                })
            }
        }
    }

    pub async fn accept(&self) -> io::Result<Accepted> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok(Accepted {
                    stream: Box::new(stream),
                    peer: peer.ip().to_string(),
                })
            }
            Listener::Unix { listener, .. } => {
                let (stream, peer) = listener.accept().await?;
                let peer = peer
                    .as_pathname()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "unix".to_string());
                Ok(Accepted {
                    stream: Box::new(stream),
                    peer,
                })
            }
        }
    }

    /// Bound TCP address; `None` for Unix sockets.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            Listener::Unix { .. } => None,
        }
    }

    /// Removes the socket file, if any. Safe to call more than once.
    pub fn cleanup(&mut self) {
        if let Listener::Unix { path, .. } = self {
            if let Some(path) = path.take() {
                match std::fs::remove_file(&path) {
                    Ok(()) => info!(path = %path.display(), "Removed socket file"),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove socket file"),
                }
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// A socket file nobody answers on is left over from a dead process.
fn remove_stale_socket(path: &Path) -> anyhow::Result<()> {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return Ok(());
    };
    if !meta.file_type().is_socket() {
        bail!("{} exists and is not a socket", path.display());
    }
    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        bail!("{} is in use by another process", path.display());
    }
    std::fs::remove_file(path).with_context(|| format!("removing stale socket {}", path.display()))?;
    warn!(path = %path.display(), "Removed stale socket file");
    Ok(())
}

/// Accepts connections and pushes them onto `queue` until `shutdown`
/// flips to `true` or every worker is gone.
///
/// The acceptor never serves a request itself. When the queue is full the
/// admission policy decides: `Block` waits for a free slot, `Reject`
/// answers 503 on a detached task and closes the connection. The number of
/// those tasks is capped; past the cap a connection is closed unanswered.
pub async fn accept_loop(
    listener: &Listener,
    queue: mpsc::Sender<Accepted>,
    admission: Admission,
    settings: Arc<ConnectionSettings>,
    mut shutdown: watch::Receiver<bool>,
) {
    let rejects = Arc::new(Semaphore::new(MAX_PENDING_REJECTS));
    loop {
        let accepted = tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            res = listener.accept() => res,
        };

        let conn = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        debug!(peer = %conn.peer, "Accepted connection");

        match admission {
            Admission::Block => {
                let sent = tokio::select! {
                    _ = shutdown.wait_for(|stop| *stop) => break,
                    res = queue.send(conn) => res,
                };
                if sent.is_err() {
                    break;
                }
            }
            Admission::Reject => match queue.try_send(conn) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(conn)) => {
                    reject_overloaded(conn, &rejects, settings.write_timeout);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            },
        }
    }
}

/// Answers 503 on a detached task holding one of `limiter`'s permits.
/// Returns `None` when no permit is free and the connection was just dropped.
fn reject_overloaded(
    conn: Accepted,
    limiter: &Arc<Semaphore>,
    write_timeout: Duration,
) -> Option<JoinHandle<()>> {
    let Ok(permit) = Arc::clone(limiter).try_acquire_owned() else {
        debug!(peer = %conn.peer, "Too many pending rejections, dropping connection");
        return None;
    };

    Some(tokio::spawn(async move {
        let Accepted { mut stream, peer } = conn;
        warn!(peer = %peer, "Work queue full, rejecting connection");

        let response = ResponseBuilder::new(StatusCode::SERVICE_UNAVAILABLE)
            .header("Content-Type", "text/plain")
            .body("server busy\n")
            .build();
        let _ = write_response(&mut stream, "HTTP/1.1", response, write_timeout).await;
        lingering_close(stream).await;
        drop(permit);
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn accepted(stream: tokio::io::DuplexStream) -> Accepted {
        Accepted {
            stream: Box::new(stream),
            peer: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn rejection_answers_503_and_returns_its_permit() {
        let limiter = Arc::new(Semaphore::new(1));
        let (mut client, server) = tokio::io::duplex(4096);

        let task = reject_overloaded(accepted(server), &limiter, Duration::from_secs(5))
            .expect("a permit was free");

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        drop(client);
        task.await.unwrap();

        assert!(out.starts_with(b"HTTP/1.1 503 Service Unavailable\r\n"));
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn rejection_past_the_cap_closes_without_answer() {
        let limiter = Arc::new(Semaphore::new(0));
        let (mut client, server) = tokio::io::duplex(4096);

        assert!(reject_overloaded(accepted(server), &limiter, Duration::from_secs(5)).is_none());

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }
}
