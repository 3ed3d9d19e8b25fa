use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};

use crate::http::connection::{Connection, ConnectionSettings};
use crate::http::handler::Handler;
use crate::server::listener::Accepted;

/// Receiving half of the work queue, shared by every worker.
type SharedQueue = Arc<Mutex<mpsc::Receiver<Accepted>>>;

/// A fixed set of workers draining the work queue.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `size` workers. Each one loops: take the next connection,
    /// serve it to completion, repeat. Workers stop once the queue is
    /// closed and empty.
    pub fn spawn<H: Handler>(
        size: usize,
        queue: mpsc::Receiver<Accepted>,
        handler: Arc<H>,
        settings: Arc<ConnectionSettings>,
    ) -> Self {
        let queue: SharedQueue = Arc::new(Mutex::new(queue));
        let workers = (0..size)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&handler),
                    Arc::clone(&settings),
                ))
            })
            .collect();

        Self { workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every worker to finish the queue, giving up after `grace`.
    /// Workers still busy at the deadline are aborted, dropping whatever
    /// connections they held. Returns `true` when the queue drained in time.
    pub async fn join(self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        let mut drained = true;

        for mut handle in self.workers {
            if !drained {
                handle.abort();
                continue;
            }
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Worker terminated abnormally"),
                Err(_) => {
                    handle.abort();
                    drained = false;
                }
            }
        }

        if !drained {
            tracing::warn!("Shutdown grace period elapsed, abandoning queued connections");
        }
        drained
    }
}

async fn worker<H: Handler>(
    id: usize,
    queue: SharedQueue,
    handler: Arc<H>,
    settings: Arc<ConnectionSettings>,
) {
    tracing::debug!(worker = id, "Worker started");

    loop {
        let next = queue.lock().await.recv().await;
        let Some(Accepted { stream, peer }) = next else {
            break;
        };

        let outcome = Connection::new(stream, peer, Arc::clone(&settings))
            .run(Arc::clone(&handler))
            .await;
        tracing::trace!(worker = id, ?outcome, "Connection finished");
    }

    tracing::debug!(worker = id, "Worker stopped");
}
