use std::io::Read;
use std::sync::Arc;

use tack::config::Config;
use tack::http::request::Request;
use tack::http::response::{Response, ResponseBuilder, StatusCode};
use tack::server::{PidFile, Server};

/// Built-in application: describes the request it received.
fn inspect(req: &mut Request) -> Result<Response, std::io::Error> {
    let mut body = Vec::with_capacity(req.content_length);
    req.body.read_to_end(&mut body)?;

    let mut out = format!(
        "{} {} {}\nquery: {}\nremote: {}\nhost: {}:{}\n",
        req.method,
        req.path,
        req.version,
        req.query,
        req.remote_addr,
        req.server_name,
        req.server_port,
    );
    for (k, v) in &req.headers {
        out.push_str(&format!("{k}: {v}\n"));
    }
    out.push_str(&format!("body: {} bytes\n", body.len()));

    Ok(ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "text/plain")
        .header("Content-Length", out.len().to_string())
        .body(out)
        .build())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    tack::logging::init(cfg.log_file.as_deref())?;

    let _pid_file = cfg.pid_file.as_deref().map(PidFile::create).transpose()?;

    let server = Server::bind(&cfg, Arc::new(inspect)).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        match tack::server::lifecycle::wait_for_signal().await {
            Ok(()) => {
                shutdown.trigger();
            }
            Err(e) => tracing::error!(error = %e, "Signal handling failed"),
        }
    });

    server.run().await
}
