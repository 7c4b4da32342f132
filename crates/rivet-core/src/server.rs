//! HTTP server implementation

use crate::dispatch::Service;
use crate::error::ApiError;
use crate::response::Response;
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address {addr:?}: {source}")]
    Addr {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves a built [`Service`] over HTTP/1.1, one task per connection.
pub struct Server {
    service: Service,
}

impl Server {
    pub fn new(service: Service) -> Self {
        Self { service }
    }

    /// Run the server until the process exits.
    pub async fn run(self, addr: &str) -> Result<(), ServerError> {
        self.run_until(addr, std::future::pending::<()>()).await
    }

    /// Run the server until `shutdown` completes. Access writers are
    /// flushed on the way out.
    pub async fn run_until<F>(self, addr: &str, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let addr: SocketAddr = addr.parse().map_err(|source| ServerError::Addr {
            addr: addr.to_string(),
            source,
        })?;
        let listener = TcpListener::bind(addr).await?;
        info!("Rivet server running on http://{}", listener.local_addr()?);

        let result = self.accept_loop(listener, shutdown).await;
        self.service.access_log().flush();
        info!("Rivet server stopped");
        result
    }

    async fn accept_loop<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => return Ok(()),
            };
            let io = TokioIo::new(stream);
            let service = self.service.clone();

            tokio::spawn(async move {
                let handler = service_fn(move |req: hyper::Request<Incoming>| {
                    let service = service.clone();
                    async move { Ok::<_, Infallible>(handle_request(service, req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, handler).await {
                    error!(remote = %remote_addr, "Connection error: {}", err);
                }
            });
        }
    }
}

/// Collect the body within the limit, then dispatch.
async fn handle_request(service: Service, req: hyper::Request<Incoming>) -> Response {
    let (parts, body) = req.into_parts();
    let limit = service.body_limit();
    match Limited::new(body, limit).collect().await {
        Ok(collected) => {
            let request = http::Request::from_parts(parts, collected.to_bytes());
            service.dispatch(request).await
        }
        Err(err) => {
            let request = http::Request::from_parts(parts, Bytes::new());
            let rejection = if err.is::<http_body_util::LengthLimitError>() {
                ApiError::payload_too_large(limit)
            } else {
                ApiError::bad_request("Failed to read request body").with_internal(err.to_string())
            };
            service.reject(request, rejection).await
        }
    }
}
