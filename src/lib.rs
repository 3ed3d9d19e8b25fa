//! tack - a small HTTP/1.x application server
//!
//! Core library: wire parsing, response writing, the worker pool and the
//! server lifecycle around a single in-process request handler.

pub mod config;
pub mod http;
pub mod logging;
pub mod server;
