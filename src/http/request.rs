use std::borrow::Cow;

use crate::http::body::RewindableBody;
use crate::logging::ErrorSink;

/// Prefix given to every request header that has no dedicated field.
pub const HEADER_PREFIX: &str = "HTTP_";

/// Represents a parsed HTTP request handed to the application.
///
/// Every field the parser fills in is also reachable through [`Request::get`]
/// under its conventional upper-case key (`REQUEST_METHOD`, `PATH_INFO`,
/// `HTTP_USER_AGENT`, ...), so handlers can treat the record as a plain
/// string-keyed mapping.
#[derive(Debug)]
pub struct Request {
    /// Request method as sent by the client (e.g. "GET")
    pub method: String,
    /// Target path without the query string
    pub path: String,
    /// Everything after the last `?` of the target, or empty
    pub query: String,
    /// HTTP version token (e.g. "HTTP/1.1")
    pub version: String,
    /// Peer address of the connection
    pub remote_addr: String,
    /// Host part of the `Host` header
    pub server_name: String,
    /// Port part of the `Host` header, empty when the client sent none
    pub server_port: String,
    pub content_type: Option<String>,
    pub content_length: usize,
    /// Canonical `HTTP_*` header keys in first-seen order
    pub headers: Vec<(String, String)>,
    /// Mount point of the application; always empty
    pub script_name: String,
    pub body: RewindableBody,
    pub errors: ErrorSink,
}

impl Request {
    pub const URL_SCHEME: &'static str = "http";
    pub const MULTITHREAD: bool = true;
    pub const MULTIPROCESS: bool = false;
    pub const RUN_ONCE: bool = false;

    /// Creates a record with the three mandatory request-line fields and
    /// everything else empty.
    pub fn new(
        method: impl Into<String>,
        target: &str,
        version: impl Into<String>,
    ) -> Self {
        let (path, query) = split_target(target);
        Self {
            method: method.into(),
            path: path.to_string(),
            query: query.to_string(),
            version: version.into(),
            remote_addr: String::new(),
            server_name: String::new(),
            server_port: String::new(),
            content_type: None,
            content_length: 0,
            headers: Vec::new(),
            script_name: String::new(),
            body: RewindableBody::empty(),
            errors: ErrorSink::default(),
        }
    }

    /// Looks up a header by its canonical key (`HTTP_X_FOO_BAR`).
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Stores a header under `key`, replacing an earlier value with the same
    /// key in place.
    pub fn set_header(&mut self, key: String, value: String) {
        match self.headers.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((key, value)),
        }
    }

    /// Reads a field by its conventional key.
    pub fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        let value = match key {
            "REQUEST_METHOD" => self.method.as_str(),
            "PATH_INFO" | "REQUEST_PATH" => self.path.as_str(),
            "QUERY_STRING" => self.query.as_str(),
            "HTTP_VERSION" | "SERVER_PROTOCOL" => self.version.as_str(),
            "REMOTE_ADDR" => self.remote_addr.as_str(),
            "SERVER_NAME" => self.server_name.as_str(),
            "SERVER_PORT" => self.server_port.as_str(),
            "SCRIPT_NAME" => self.script_name.as_str(),
            "CONTENT_TYPE" => return self.content_type.as_deref().map(Cow::Borrowed),
            "CONTENT_LENGTH" => return Some(Cow::Owned(self.content_length.to_string())),
            "url_scheme" => Self::URL_SCHEME,
            _ => return self.header(key).map(Cow::Borrowed),
        };
        Some(Cow::Borrowed(value))
    }

    /// Target path plus query string, as it appeared on the request line.
    pub fn full_path(&self) -> Cow<'_, str> {
        if self.query.is_empty() {
            Cow::Borrowed(&self.path)
        } else {
            Cow::Owned(format!("{}?{}", self.path, self.query))
        }
    }
}

/// Splits a request target at its last `?`.
pub fn split_target(target: &str) -> (&str, &str) {
    target.rsplit_once('?').unwrap_or((target, ""))
}

/// Maps a header name to its canonical key: upper-cased with `-` turned into
/// `_`. `Content-Type` and `Content-Length` keep no prefix; every other name
/// gets [`HEADER_PREFIX`].
pub fn canonical_key(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| if c == '-' { '_' } else { c.to_ascii_uppercase() })
        .collect();

    match normalized.as_str() {
        "CONTENT_TYPE" | "CONTENT_LENGTH" => normalized,
        _ => format!("{HEADER_PREFIX}{normalized}"),
    }
}
