//! HTTP routes over the query surface.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use jobmirror_core::query::{QueryError, QuerySurface};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::json;
use tokio_util::io::ReaderStream;

pub fn router(surface: Arc<QuerySurface>) -> Router {
    Router::new()
        .route("/api/file-name", get(file_name))
        .route("/api/layer-count", get(layer_count))
        .route("/api/file", get(file))
        .route("/healthz", get(healthz))
        .with_state(surface)
}

async fn file_name(State(surface): State<Arc<QuerySurface>>) -> impl IntoResponse {
    Json(surface.file_name())
}

async fn layer_count(State(surface): State<Arc<QuerySurface>>) -> impl IntoResponse {
    Json(surface.layer_count())
}

async fn healthz(State(surface): State<Arc<QuerySurface>>) -> impl IntoResponse {
    Json(surface.health())
}

async fn file(State(surface): State<Arc<QuerySurface>>) -> Response {
    match surface.active_file().await {
        Ok(content) => {
            let stream = ReaderStream::new(content.file);
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "application/octet-stream")
                .header(CONTENT_LENGTH, content.len.to_string())
                .header(CONTENT_DISPOSITION, attachment(&content.name))
                .body(Body::from_stream(stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &QueryError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// RFC 5987 `attr-char`: everything outside ALPHA / DIGIT and
/// `!#$&+-.^_`|~` is percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// `Content-Disposition` value. Quotes, backslashes and non-ASCII characters
/// are replaced in the fallback name; the full name goes in `filename*`.
fn attachment(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(name, ATTR_CHAR)
    )
}

pub async fn shutdown_signal() {
    tracing::info!("shutdown signal listener active");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received");
}
