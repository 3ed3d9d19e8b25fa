use std::error::Error as StdError;

use crate::http::request::Request;
use crate::http::response::Response;

/// The application served by the worker pool.
///
/// One instance is built at startup and shared by every worker, so `call`
/// runs concurrently from several threads. It is invoked on a blocking
/// thread and may read the request body synchronously. Returning `Err` (or
/// panicking) makes the server answer with a diagnostic 500.
///
/// Closures of the right shape implement this trait:
///
/// ```
/// use tack::http::handler::Handler;
/// use tack::http::request::Request;
/// use tack::http::response::Response;
///
/// fn assert_handler<H: Handler>(_: &H) {}
///
/// let app = |req: &mut Request| -> Result<Response, std::io::Error> {
///     Ok(Response::ok(format!("hello from {}", req.path)))
/// };
/// assert_handler(&app);
/// ```
pub trait Handler: Send + Sync + 'static {
    type Error: StdError + Send + 'static;

    fn call(&self, req: &mut Request) -> Result<Response, Self::Error>;
}

impl<F, E> Handler for F
where
    F: Fn(&mut Request) -> Result<Response, E> + Send + Sync + 'static,
    E: StdError + Send + 'static,
{
    type Error = E;

    fn call(&self, req: &mut Request) -> Result<Response, E> {
        self(req)
    }
}
