use std::io;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::http::response::{Response, StatusCode};

/// Serializes the status line and headers of `resp`.
///
/// Any `Connection` header the handler set (in any case) is replaced in
/// place by `Connection: close`; if there was none it is appended after the
/// handler's headers.
pub fn serialize_head(version: &str, status: StatusCode, headers: &[(String, String)]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(256);

    buf.put_slice(version.as_bytes());
    buf.put_slice(format!(" {} {}\r\n", status.as_u16(), status.reason_phrase()).as_bytes());

    let mut connection_written = false;
    for (k, v) in headers {
        if k.eq_ignore_ascii_case("connection") {
            if connection_written {
                continue;
            }
            connection_written = true;
            buf.put_slice(b"Connection: close\r\n");
            continue;
        }
        buf.put_slice(k.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(v.as_bytes());
        buf.put_slice(b"\r\n");
    }
    if !connection_written {
        buf.put_slice(b"Connection: close\r\n");
    }

    // Header/body separator
    buf.put_slice(b"\r\n");
    buf
}

/// Writes a complete response: head, then every body chunk in order.
///
/// Each individual write is bounded by `write_timeout`; expiry surfaces as
/// `io::ErrorKind::TimedOut`. The body producer is dropped before
/// returning, whatever the outcome.
pub async fn write_response<W>(
    stream: &mut W,
    version: &str,
    resp: Response,
    write_timeout: Duration,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let Response { status, headers, body } = resp;

    let head = serialize_head(version, status, &headers);
    bounded(write_timeout, stream.write_all(&head)).await?;

    for chunk in body {
        if chunk.is_empty() {
            continue;
        }
        bounded(write_timeout, stream.write_all(&chunk)).await?;
    }

    bounded(write_timeout, stream.flush()).await
}

pub(crate) async fn bounded<F>(limit: Duration, op: F) -> io::Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    match timeout(limit, op).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
    }
}

/// Whether an I/O error just means the peer went away.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_connection_header_is_replaced_in_place() {
        let headers = vec![
            ("connection".to_string(), "keep-alive".to_string()),
            ("X-A".to_string(), "1".to_string()),
        ];
        let head = serialize_head("HTTP/1.0", StatusCode::OK, &headers);
        assert_eq!(
            &head[..],
            b"HTTP/1.0 200 OK\r\nConnection: close\r\nX-A: 1\r\n\r\n"
        );
    }
}
