use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use crate::http::fault::{Fault, install_panic_hook, write_fault};
use crate::http::handler::Handler;
use crate::http::parser::{ParseError, ParseOptions, parse_request};
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::http::writer::{is_disconnect, write_response};

const FALLBACK_VERSION: &str = "HTTP/1.1";

/// How long to keep discarding input after an early error response.
const LINGER: Duration = Duration::from_secs(1);
const LINGER_MAX_BYTES: usize = 64 * 1024;

/// Per-connection settings shared by all workers.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub parse: ParseOptions,
    /// Upper bound for reading the whole request, body included
    pub read_timeout: Duration,
    /// Upper bound for each write to the peer
    pub write_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
        }
    }
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler's response was written (or the peer left mid-write)
    Responded(StatusCode),
    /// The handler failed and a diagnostic 500 was attempted
    Faulted,
    /// The request was malformed and answered with an error status
    Rejected(StatusCode),
    /// Nothing was written: the peer closed early, stalled, or the stream broke
    Dropped,
}

/// One accepted stream, serving exactly one request.
pub struct Connection<S> {
    reader: BufReader<S>,
    peer: String,
    settings: Arc<ConnectionSettings>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: impl Into<String>, settings: Arc<ConnectionSettings>) -> Self {
        Self {
            reader: BufReader::new(stream),
            peer: peer.into(),
            settings,
        }
    }

    /// Reads the request, runs `handler`, writes the response and closes
    /// the stream. Never fails: every error is turned into a response, a
    /// log line, or a silent drop.
    pub async fn run<H: Handler>(mut self, handler: Arc<H>) -> Outcome {
        let req = match self.read_request().await {
            Ok(Some(req)) => req,
            Ok(None) => {
                self.close().await;
                return Outcome::Dropped;
            }
            Err(e) => return self.reject(e).await,
        };

        let version = req.version.clone();
        let method = req.method.clone();
        let path = req.path.clone();

        let (req, result) = dispatch(handler, req).await;

        let outcome = match result {
            Ok(response) => {
                let status = response.status;
                match write_response(
                    self.reader.get_mut(),
                    &version,
                    response,
                    self.settings.write_timeout,
                )
                .await
                {
                    Ok(()) => {
                        tracing::info!(
                            peer = %self.peer,
                            method = %method,
                            path = %path,
                            status = status.as_u16(),
                            "Request handled"
                        );
                    }
                    Err(e) => log_write_error(&self.peer, &e),
                }
                Outcome::Responded(status)
            }
            Err(fault) => {
                if let Err(e) =
                    write_fault(self.reader.get_mut(), &version, &fault, self.settings.write_timeout)
                        .await
                {
                    log_write_error(&self.peer, &e);
                }
                tracing::error!(
                    peer = %self.peer,
                    method = %method,
                    path = %path,
                    error = %fault,
                    "Handler failed\n{}",
                    fault.render_body()
                );
                Outcome::Faulted
            }
        };

        if let Some(mut req) = req {
            req.body.release();
        }
        self.close().await;
        outcome
    }

    async fn read_request(&mut self) -> Result<Option<Request>, ParseError> {
        match timeout(
            self.settings.read_timeout,
            parse_request(&mut self.reader, &self.peer, &self.settings.parse),
        )
        .await
        {
            Ok(res) => res,
            Err(_) => {
                tracing::debug!(peer = %self.peer, "Timed out reading request");
                Ok(None)
            }
        }
    }

    async fn reject(mut self, err: ParseError) -> Outcome {
        let Some(status) = err.status() else {
            tracing::debug!(peer = %self.peer, error = %err, "Dropping connection");
            self.close().await;
            return Outcome::Dropped;
        };

        tracing::warn!(peer = %self.peer, error = %err, "Malformed request");

        let response = ResponseBuilder::new(status)
            .header("Content-Type", "text/plain")
            .body(format!("{err}\n"))
            .build();
        if let Err(e) = write_response(
            self.reader.get_mut(),
            FALLBACK_VERSION,
            response,
            self.settings.write_timeout,
        )
        .await
        {
            log_write_error(&self.peer, &e);
        }

        lingering_close(self.reader.into_inner()).await;
        Outcome::Rejected(status)
    }

    async fn close(self) {
        let mut stream = self.reader.into_inner();
        let _ = stream.shutdown().await;
    }
}

/// Closes a stream whose request was not read to the end.
///
/// Closing with unread input makes the kernel reset the connection, which
/// can destroy the response before the client reads it. The write side is
/// shut first, then input is discarded until the peer closes, a byte budget
/// runs out, or a short timer fires.
pub async fn lingering_close<S>(mut stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if stream.shutdown().await.is_err() {
        return;
    }

    let drain = async {
        let mut scratch = [0u8; 4096];
        let mut discarded = 0;
        while discarded < LINGER_MAX_BYTES {
            match stream.read(&mut scratch).await {
                Ok(0) | Err(_) => break,
                Ok(n) => discarded += n,
            }
        }
    };
    let _ = timeout(LINGER, drain).await;
}

/// Runs the handler on the blocking pool.
///
/// Errors and panics become a [`Fault`]; a panic is caught on the blocking
/// thread so its trace points at the panic site. The request comes back so
/// its body can be released, unless the blocking task itself was lost.
pub async fn dispatch<H: Handler>(
    handler: Arc<H>,
    mut req: Request,
) -> (Option<Request>, Result<Response, Fault>) {
    install_panic_hook();

    let task = tokio::task::spawn_blocking(move || {
        let result = match panic::catch_unwind(AssertUnwindSafe(|| handler.call(&mut req))) {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Fault::from_error(&e)),
            Err(payload) => Err(Fault::from_panic(payload)),
        };
        (req, result)
    });

    match task.await {
        Ok((req, result)) => (Some(req), result),
        Err(e) if e.is_panic() => (None, Err(Fault::from_panic(e.into_panic()))),
        Err(e) => (None, Err(Fault::from_error(&e))),
    }
}

// Write failures mean the client is gone or stuck; they are not server faults.
fn log_write_error(peer: &str, err: &std::io::Error) {
    tracing::debug!(
        peer = %peer,
        error = %err,
        disconnect = is_disconnect(err),
        "Response write abandoned"
    );
}
