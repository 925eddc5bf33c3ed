//! HTTP serving helpers shared by the gateway and the discovery service

use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::rt::tokio::TokioIo;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub type HttpResponse = Response<Full<Bytes>>;

/// Accept HTTP/1 connections on `listener` and serve each request with
/// `handler` until `shutdown` changes or its sender is dropped.
///
/// Connections already accepted keep running to completion.
pub async fn serve<F, Fut>(
    listener: TcpListener,
    handler: F,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()>
where
    F: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, hyper::Error>> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    info!("HTTP server listening on {}", local_addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Error accepting connection on {}: {}", local_addr, e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let handler = handler.clone();

                tokio::task::spawn(async move {
                    let service = service_fn(move |req| handler(req));
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("Error serving HTTP connection from {}: {}", peer_addr, e);
                    }
                });
            }
            _ = shutdown.changed() => {
                info!("HTTP server on {} shutting down", local_addr);
                return Ok(());
            }
        }
    }
}

/// Collect a request body into memory
pub async fn collect_body(body: Incoming) -> Result<Bytes, hyper::Error> {
    Ok(body.collect().await?.to_bytes())
}

/// Decode a URL query string into a map; later duplicates win
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

/// Build a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            warn!("Failed to encode response body: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
        }
    }
}

/// Build a plain-text response
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Create a 404 Not Found response
pub fn not_found_response() -> HttpResponse {
    text_response(StatusCode::NOT_FOUND, "Not Found\n")
}

/// Create a 405 Method Not Allowed response
pub fn method_not_allowed_response() -> HttpResponse {
    text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n")
}
