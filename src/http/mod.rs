//! HTTP protocol implementation.
//!
//! A deliberately small HTTP/1.x server side: one request per connection,
//! no keep-alive, no chunked encoding.
//!
//! # Architecture
//!
//! - **`connection`**: drives one accepted stream from request to close
//! - **`parser`**: reads the request line, headers and body off the stream
//! - **`request`**: the request record handed to the application
//! - **`body`**: in-memory or disk-spooled rewindable request bodies
//! - **`handler`**: the application contract
//! - **`response`**: status codes and the status/headers/body triple
//! - **`writer`**: serializes responses onto the stream
//! - **`fault`**: diagnostic 500 responses for failed handlers
//!
//! # Connection lifecycle
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← request line, headers, body (bounded by read timeout)
//!        └──────┬──────┘
//!               │ Request parsed          ── malformed → 400 / 431, close
//!               ▼                         ── EOF / stalled → close silently
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← handler runs on the blocking pool
//!        └──────┬───────────┘
//!               │ Ok(Response)            ── Err / panic → 500 diagnostic
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← head with `Connection: close`, then body chunks
//!        └──────┬───────────┘
//!               ▼
//!           Closed (body buffer released)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tack::http::connection::{Connection, ConnectionSettings};
//! use tack::http::request::Request;
//! use tack::http::response::Response;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:9292").await?;
//!     let settings = Arc::new(ConnectionSettings::default());
//!     let app = Arc::new(|req: &mut Request| -> Result<Response, std::io::Error> {
//!         Ok(Response::ok(format!("you asked for {}\n", req.path)))
//!     });
//!
//!     loop {
//!         let (socket, addr) = listener.accept().await?;
//!         let conn = Connection::new(socket, addr.to_string(), settings.clone());
//!         tokio::spawn(conn.run(app.clone()));
//!     }
//! }
//! ```

pub mod body;
pub mod connection;
pub mod fault;
pub mod handler;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
