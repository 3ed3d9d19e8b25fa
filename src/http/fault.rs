//! Handler faults and the diagnostic 500 response rendered for them.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Once;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::writer::bounded;

/// Marker header telling clients the 500 was produced by the server itself
/// rather than by the application.
pub const FAULT_HEADER: &str = "X-Server-Fault";

thread_local! {
    // Trace recorded by the panic hook, taken by the next `from_panic` on this thread.
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a panic hook that records the call stack at the panic site.
///
/// Installed once per process; the previously registered hook still runs.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = PANIC_TRACE.try_with(|slot| {
                *slot.borrow_mut() = Some(Backtrace::force_capture());
            });
            previous(info);
        }));
    });
}

/// A failed handler invocation.
#[derive(Debug)]
pub struct Fault {
    /// Rust type name of the error, or `"panic"`
    pub kind: String,
    pub message: String,
    /// Messages of the error's `source()` chain, outermost first
    pub causes: Vec<String>,
    pub backtrace: Backtrace,
}

impl Fault {
    pub fn from_error<E>(err: &E) -> Self
    where
        E: StdError + 'static,
    {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            causes,
            backtrace: Backtrace::force_capture(),
        }
    }

    /// Must be called on the thread that panicked to get the trace of the
    /// panic site; otherwise the current stack is used.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };

        Self {
            kind: "panic".to_string(),
            message,
            causes: Vec::new(),
            backtrace: PANIC_TRACE
                .try_with(|slot| slot.borrow_mut().take())
                .ok()
                .flatten()
                .unwrap_or_else(Backtrace::force_capture),
        }
    }

    /// Plain-text body: `kind: message`, then causes, then backtrace frames.
    pub fn render_body(&self) -> String {
        let mut out = format!("{}: {}\n", self.kind, self.message);
        for cause in &self.causes {
            out.push_str("caused by: ");
            out.push_str(cause);
            out.push('\n');
        }
        if self.backtrace.status() == BacktraceStatus::Captured {
            out.push_str(&self.backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for cause in &self.causes {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// Serializes the fixed 500 diagnostic response for `fault`.
pub fn serialize_fault(version: &str, fault: &Fault) -> BytesMut {
    let body = fault.render_body();
    let mut buf = BytesMut::with_capacity(128 + body.len());

    buf.put_slice(version.as_bytes());
    buf.put_slice(b" 500 Internal Server Error\r\n");
    buf.put_slice(b"Connection: close\r\n");
    buf.put_slice(b"Content-Type: text/plain\r\n");
    buf.put_slice(FAULT_HEADER.as_bytes());
    buf.put_slice(b": true\r\n");
    buf.put_slice(b"\r\n");
    buf.put_slice(body.as_bytes());
    buf
}

/// Writes the diagnostic response for `fault`. Errors are returned to the
/// caller, which treats them like any other write to a departed peer.
pub async fn write_fault<W>(
    stream: &mut W,
    version: &str,
    fault: &Fault,
    write_timeout: Duration,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let buf = serialize_fault(version, fault);
    bounded(write_timeout, stream.write_all(&buf)).await?;
    bounded(write_timeout, stream.flush()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("disk full")
        }
    }

    impl StdError for Inner {}

    #[derive(Debug)]
    struct Outer(Inner);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("could not save")
        }
    }

    impl StdError for Outer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn fault_carries_type_name_and_cause_chain() {
        let fault = Fault::from_error(&Outer(Inner));
        assert!(fault.kind.ends_with("Outer"));
        assert_eq!(fault.message, "could not save");
        assert_eq!(fault.causes, vec!["disk full".to_string()]);

        let body = fault.render_body();
        assert!(body.starts_with(&format!("{}: could not save\n", fault.kind)));
        assert!(body.contains("caused by: disk full\n"));
    }

    #[test]
    fn error_fault_carries_call_stack() {
        let fault = Fault::from_error(&Inner);
        let body = fault.render_body();
        let mut lines = body.lines();
        assert_eq!(lines.next(), Some(format!("{}: disk full", fault.kind).as_str()));
        assert!(lines.next().is_some(), "no stack trace in {body:?}");
    }

    #[inline(never)]
    fn explode_in_helper() {
        panic!("deep failure");
    }

    #[test]
    fn panic_fault_traces_the_panic_site() {
        install_panic_hook();
        let payload = std::panic::catch_unwind(explode_in_helper).unwrap_err();
        let fault = Fault::from_panic(payload);

        assert_eq!(fault.message, "deep failure");
        let body = fault.render_body();
        assert!(body.starts_with("panic: deep failure\n"));
        assert!(body.contains("explode_in_helper"), "{body}");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let fault = Fault::from_panic(Box::new("boom"));
        assert_eq!(fault.kind, "panic");
        assert_eq!(fault.message, "boom");

        let fault = Fault::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(fault.message, "owned boom");
    }
}
