use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::config::{Admission, Config};
use crate::http::connection::ConnectionSettings;
use crate::http::handler::Handler;
use crate::server::endpoint::Endpoint;
use crate::server::listener::{Listener, accept_loop};
use crate::server::pool::WorkerPool;

/// Requests an orderly stop of a running [`Server`].
///
/// Cheap to clone; triggering more than once has no further effect.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns `true` for the call that actually initiated shutdown.
    pub fn trigger(&self) -> bool {
        let was_triggered = self.tx.send_replace(true);
        if !was_triggered {
            info!("Shutdown requested");
        }
        !was_triggered
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// A bound server: listener, handler and pool settings.
///
/// Binding happens in [`Server::bind`] so startup fails fast on an
/// unusable address; nothing is served until [`Server::run`].
pub struct Server<H> {
    endpoint: Endpoint,
    listener: Listener,
    handler: Arc<H>,
    settings: Arc<ConnectionSettings>,
    workers: usize,
    queue_capacity: usize,
    admission: Admission,
    shutdown_timeout: Duration,
    shutdown: ShutdownHandle,
}

impl<H: Handler> Server<H> {
    pub async fn bind(cfg: &Config, handler: Arc<H>) -> anyhow::Result<Self> {
        cfg.validate()?;
        let endpoint = cfg.endpoint()?;
        let listener = Listener::bind(&endpoint).await?;

        Ok(Self {
            endpoint,
            listener,
            handler,
            settings: Arc::new(cfg.connection_settings()),
            workers: cfg.workers,
            queue_capacity: cfg.queue_capacity,
            admission: cfg.admission,
            shutdown_timeout: cfg.shutdown_timeout(),
            shutdown: ShutdownHandle::new(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Actual bound TCP address (useful when binding port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serves until shutdown is triggered.
    ///
    /// Shutdown stops the acceptor, closes the listener (removing a Unix
    /// socket file), then lets the workers drain connections already queued
    /// for up to the configured shutdown timeout.
    pub async fn run(self) -> anyhow::Result<()> {
        let Server {
            endpoint,
            mut listener,
            handler,
            settings,
            workers,
            queue_capacity,
            admission,
            shutdown_timeout,
            shutdown,
        } = self;

        let (tx, rx) = mpsc::channel(queue_capacity);
        let pool = WorkerPool::spawn(workers, rx, handler, Arc::clone(&settings));

        info!(
            endpoint = %endpoint,
            workers = pool.size(),
            queue_capacity,
            "Listening"
        );

        accept_loop(&listener, tx, admission, settings, shutdown.subscribe()).await;
        shutdown.trigger();

        listener.cleanup();
        drop(listener);
        info!("Listener closed, draining queued connections");

        let drained = pool.join(shutdown_timeout).await;
        info!(drained, "Server stopped");
        Ok(())
    }
}

/// PID file written at startup and removed when dropped.
pub struct PidFile {
    path: Option<PathBuf>,
}

impl PidFile {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        std::fs::write(path, format!("{}\n", std::process::id()))
            .with_context(|| format!("writing pid file {}", path.display()))?;
        Ok(Self {
            path: Some(path.to_path_buf()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Deletes the file. Later calls do nothing.
    pub fn remove(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove pid file"),
            }
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("waiting for SIGINT")?,
        _ = term.recv() => {}
    }
    Ok(())
}
