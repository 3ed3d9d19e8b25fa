//! Process-wide logging setup and the error sink handed to applications.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// The level filter comes from `RUST_LOG` (default `info`). When `log_file`
/// is set, output is appended to that file instead of stdout.
pub fn init(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        None => {
            builder.try_init().map_err(|e| anyhow::anyhow!(e))?;
        }
    }

    Ok(())
}

/// Write-only sink that forwards application diagnostics to the log.
///
/// Each complete line becomes one `error` event; a trailing partial line is
/// emitted on flush or drop.
#[derive(Debug, Default)]
pub struct ErrorSink {
    pending: Vec<u8>,
}

impl ErrorSink {
    fn emit(line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches('\r');
        if !text.is_empty() {
            tracing::error!(target: "tack::app", "{text}");
        }
    }
}

impl io::Write for ErrorSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            Self::emit(&line[..line.len() - 1]);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            Self::emit(&rest);
        }
        Ok(())
    }
}

impl Drop for ErrorSink {
    fn drop(&mut self) {
        let _ = io::Write::flush(self);
    }
}
