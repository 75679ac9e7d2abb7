//! JSON API over HTTP
//!
//! Exposes the cache to a web front end:
//!
//! - `GET /api/data` returns the current snapshot
//! - `GET /api/status` returns the cache status
//! - `POST /api/refresh` starts a forced refresh in the background
//!
//! Each connection is served on its own task. The accept loop ends when the
//! shutdown future resolves; connections already open finish on their own.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::cache::{DashboardCache, RefreshOutcome};

type ApiResponse = Response<Full<Bytes>>;

/// Serves the API on `listener` until `shutdown` resolves
pub async fn serve<F>(cache: Arc<DashboardCache>, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            let service = service_fn(move |request| route(Arc::clone(&cache), request));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(%peer, "Connection ended with error: {}", e);
            }
        });
    }

    info!("API server stopped accepting connections");
}

async fn route(
    cache: Arc<DashboardCache>,
    request: Request<Incoming>,
) -> Result<ApiResponse, Infallible> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    debug!(%method, %path, "API request");

    let response = match (method, path.as_str()) {
        (Method::GET, "/api/data") => json_response(StatusCode::OK, &*cache.get_data().await),
        (Method::GET, "/api/status") => json_response(StatusCode::OK, &cache.get_status()),
        (Method::POST, "/api/refresh") => start_refresh(cache),
        (_, "/api/data" | "/api/status" | "/api/refresh") => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &json!({ "error": "method not allowed" }),
        ),
        _ => json_response(StatusCode::NOT_FOUND, &json!({ "error": "not found" })),
    };
    Ok(response)
}

/// Kicks off a forced refresh without holding the request open
fn start_refresh(cache: Arc<DashboardCache>) -> ApiResponse {
    if cache.is_stopped() {
        return json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &json!({ "error": "cache has been stopped" }),
        );
    }

    tokio::spawn(async move {
        match cache.force_update().await {
            Ok(RefreshOutcome::Updated(_)) => info!("Refresh requested over API completed"),
            Ok(RefreshOutcome::AlreadyRunning) => debug!("Refresh already in progress"),
            Ok(RefreshOutcome::Failed(failures)) => {
                warn!(failed = failures.len(), "Refresh requested over API failed")
            }
            Err(e) => warn!("Refresh requested over API rejected: {}", e),
        }
    });

    json_response(StatusCode::ACCEPTED, &json!({ "status": "refresh_initiated" }))
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> ApiResponse {
    let (status, body) = match serde_json::to_vec(body) {
        Ok(body) => (status, body),
        Err(e) => {
            warn!("Failed to serialize API response: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"serialization failed"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
