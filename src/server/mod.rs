//! Listening, queueing and the worker pool.
//!
//! One acceptor task pushes accepted streams onto a bounded queue; a fixed
//! pool of workers pops them and serves one request per stream.

pub mod endpoint;
pub mod lifecycle;
pub mod listener;
pub mod pool;

pub use endpoint::Endpoint;
pub use lifecycle::{PidFile, Server, ShutdownHandle};
pub use pool::WorkerPool;
