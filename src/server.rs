//! HTTP server and graceful shutdown.
//!
//! # Request flow
//!
//! ```text
//! hyper connection task
//!   └─ dispatch: collect body, build Request
//!        └─ spawn_blocking: Application::handle (router → container → view)
//!             └─ Response → hyper
//! ```
//!
//! The framework pipeline is synchronous. Running it on tokio's blocking
//! pool keeps the reactor free and makes blocking database drivers safe to
//! call from handlers.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or **Ctrl-C** the server:
//! 1. Stops accepting connections immediately.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Repository;
use crate::error::{Error, Result};
use crate::foundation::Application;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Address used when `server.address` is not configured.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8000";

/// The HTTP server.
pub struct Server {
    addr: String,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called. The address is validated there.
    ///
    /// ```rust,no_run
    /// use trellis::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        Self { addr: addr.to_owned() }
    }

    /// Binds to `server.address`, or [`DEFAULT_ADDRESS`].
    pub fn from_config(config: &Repository) -> Self {
        match config.get("server.address") {
            Some(serde_json::Value::String(addr)) => Self::bind(&addr),
            _ => Self::bind(DEFAULT_ADDRESS),
        }
    }

    /// Boots `app`, then accepts connections and dispatches them through it.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, app: Arc<Application>) -> Result<()> {
        let addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|e| Error::Config(format!("invalid server address [{}]: {e}", self.addr)))?;

        {
            let app = Arc::clone(&app);
            tokio::task::spawn_blocking(move || app.boot())
                .await
                .map_err(|e| Error::Config(format!("boot task failed: {e}")))??;
        }

        let listener = TcpListener::bind(addr).await?;
        let name = app.config().get("app.name");
        let name = name.as_ref().and_then(|v| v.as_str()).unwrap_or("trellis");
        info!(%addr, app = name, "listening");

        // Tracks every connection task so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even with connections still queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(app, req, remote_addr).await }
                        });

                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("server stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response. Every failure is turned
/// into a status code here, so hyper never sees an error.
async fn dispatch(
    app: Arc<Application>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let request = match into_request(req).await {
        Ok(request) => request,
        Err(response) => return Ok(response.into_http()),
    };

    let response = match tokio::task::spawn_blocking(move || app.handle(request)).await {
        Ok(response) => response,
        Err(e) => {
            error!(peer = %remote_addr, "request task failed: {e}");
            Response::status(Status::InternalServerError)
        }
    };

    Ok(response.into_http())
}

async fn into_request(req: hyper::Request<Incoming>) -> Result<Request, Response> {
    let (parts, body) = req.into_parts();

    let method = Method::try_from(&parts.method)
        .map_err(|_| Response::status(Status::MethodNotAllowed))?;
    let uri = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());

    let body = body.collect().await.map_err(|e| {
        warn!("failed to read request body: {e}");
        Response::status(Status::BadRequest)
    })?;

    let mut request = Request::new(method, uri).with_body(body.to_bytes().to_vec());
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    Ok(request)
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C). On Windows only Ctrl-C
/// is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn address_comes_from_config() {
        let config = Repository::from_value(json!({ "server": { "address": "0.0.0.0:9000" } }));
        assert_eq!(Server::from_config(&config).addr, "0.0.0.0:9000");
        assert_eq!(Server::from_config(&Repository::new()).addr, DEFAULT_ADDRESS);
    }

    #[tokio::test]
    async fn invalid_address_is_a_config_error() {
        let app = Arc::new(Application::with_config("/nonexistent", Repository::new()));
        let result = Server::bind("not an address").serve(app).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
