use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::http::body::{DEFAULT_SPOOL_THRESHOLD, RewindableBody};
use crate::http::request::{Request, canonical_key};
use crate::http::response::StatusCode;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("missing Host header")]
    MissingHost,
    #[error("request head exceeds configured limits")]
    HeadersTooLarge,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ParseError {
    /// Status to answer the client with, or `None` when the connection is
    /// unusable and should just be dropped.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ParseError::Io(_) => None,
            ParseError::HeadersTooLarge => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            _ => Some(StatusCode::BAD_REQUEST),
        }
    }
}

/// Limits and buffering policy applied while parsing.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Longest accepted request or header line, terminator included
    pub max_line_bytes: usize,
    pub max_headers: usize,
    pub spool_threshold: usize,
    /// Where spooled bodies are created; the system temp dir when `None`
    pub spool_dir: Option<PathBuf>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_line_bytes: 8 * 1024,
            max_headers: 100,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            spool_dir: None,
        }
    }
}

/// Reads one request off `reader`.
///
/// Returns `Ok(None)` when the peer closed the stream before sending a
/// complete request line. On success the body has been fully buffered and
/// is positioned at its start.
pub async fn parse_request<R>(
    reader: &mut R,
    remote_addr: &str,
    opts: &ParseOptions,
) -> Result<Option<Request>, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    // Request line
    let line = match read_line(reader, opts.max_line_bytes).await? {
        Some(Line::Complete(line)) => line,
        Some(Line::Partial(_)) | None => return Ok(None),
    };
    let line = std::str::from_utf8(&line).map_err(|_| ParseError::InvalidRequestLine)?;
    let (method, target, version) =
        parse_request_line(line).ok_or(ParseError::InvalidRequestLine)?;

    let mut req = Request::new(method, target, version);
    req.remote_addr = remote_addr.to_string();

    // Headers
    let mut count = 0;
    loop {
        let line = match read_line(reader, opts.max_line_bytes).await? {
            Some(Line::Complete(line)) | Some(Line::Partial(line)) => line,
            None => break,
        };
        if line.is_empty() {
            break;
        }

        count += 1;
        if count > opts.max_headers {
            return Err(ParseError::HeadersTooLarge);
        }

        let line = String::from_utf8_lossy(&line);
        let (name, value) = parse_header_line(&line).ok_or(ParseError::InvalidHeader)?;
        apply_header(&mut req, name, value)?;
    }

    // Host
    let host = req
        .header("HTTP_HOST")
        .filter(|h| !h.is_empty())
        .ok_or(ParseError::MissingHost)?;
    let (name, port) = host.split_once(':').unwrap_or((host, ""));
    let (name, port) = (name.to_string(), port.to_string());
    req.server_name = name;
    req.server_port = port;

    // Body
    req.body = RewindableBody::read_from(
        reader,
        req.content_length,
        opts.spool_threshold,
        opts.spool_dir.as_deref(),
    )
    .await?;

    Ok(Some(req))
}

/// Matches `METHOD SP TARGET SP HTTP/1.x`.
///
/// `METHOD` is one or more ASCII upper-case letters, `TARGET` any non-empty
/// run of non-space characters, and the version exactly `HTTP/1.` followed
/// by a single digit.
pub fn parse_request_line(line: &str) -> Option<(&str, &str, &str)> {
    let mut parts = line.split(' ');
    let method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let method_ok = !method.is_empty() && method.bytes().all(|b| b.is_ascii_uppercase());
    let target_ok = !target.is_empty() && !target.bytes().any(|b| b.is_ascii_whitespace());
    let version_ok = version
        .strip_prefix("HTTP/1.")
        .is_some_and(|minor| minor.len() == 1 && minor.bytes().all(|b| b.is_ascii_digit()));

    (method_ok && target_ok && version_ok).then_some((method, target, version))
}

/// Splits `name: value`. The name must be non-empty and free of
/// whitespace; the value is trimmed.
pub fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    if name.is_empty() || name.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return None;
    }
    Some((name, value.trim()))
}

fn apply_header(req: &mut Request, name: &str, value: &str) -> Result<(), ParseError> {
    let key = canonical_key(name);
    match key.as_str() {
        "CONTENT_TYPE" => req.content_type = Some(value.to_string()),
        "CONTENT_LENGTH" => {
            req.content_length = value
                .parse()
                .map_err(|_| ParseError::InvalidContentLength)?;
        }
        _ => req.set_header(key, value.to_string()),
    }
    Ok(())
}

enum Line {
    Complete(Vec<u8>),
    /// Stream ended before a line terminator
    Partial(Vec<u8>),
}

async fn read_line<R>(reader: &mut R, max: usize) -> Result<Option<Line>, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(max as u64)
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        return Ok(None);
    }

    if line.last() != Some(&b'\n') {
        if line.len() >= max {
            return Err(ParseError::HeadersTooLarge);
        }
        return Ok(Some(Line::Partial(line)));
    }

    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(Line::Complete(line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_shapes() {
        assert_eq!(
            parse_request_line("GET /x HTTP/1.1"),
            Some(("GET", "/x", "HTTP/1.1"))
        );
        assert_eq!(parse_request_line("get /x HTTP/1.1"), None);
        assert_eq!(parse_request_line("GET /x HTTP/2.0"), None);
        assert_eq!(parse_request_line("GET /x HTTP/1.10"), None);
        assert_eq!(parse_request_line("GET  HTTP/1.1"), None);
        assert_eq!(parse_request_line("GET /x"), None);
    }

    #[test]
    fn header_line_shapes() {
        assert_eq!(parse_header_line("Host: a:1"), Some(("Host", "a:1")));
        assert_eq!(parse_header_line("X-Empty:"), Some(("X-Empty", "")));
        assert_eq!(parse_header_line("Bad Name: v"), None);
        assert_eq!(parse_header_line(": v"), None);
        assert_eq!(parse_header_line("NoColon"), None);
    }
}
