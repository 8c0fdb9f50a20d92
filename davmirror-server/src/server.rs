use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use davmirror_core::{DavError, ReplicatedStore, Result, UploadSource, hashed_name};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use tower_http::trace::TraceLayer;

/// Upload bodies past this size are spooled to a temporary file.
pub const SPOOL_THRESHOLD: usize = 2 * 1024 * 1024;

pub struct GatewayState {
    pub store: ReplicatedStore,
    pub max_upload_bytes: usize,
    pub spool_threshold: usize,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
struct SavedObject {
    name: String,
    url: String,
}

pub fn router(store: ReplicatedStore, max_upload_bytes: usize) -> Router {
    gateway_router(GatewayState {
        store,
        max_upload_bytes,
        spool_threshold: SPOOL_THRESHOLD,
    })
}

fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/objects/*name",
            get(get_object)
                .head(head_object)
                .put(put_object)
                .post(post_object)
                .delete(delete_object),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn run_server(store: ReplicatedStore, bind_addr: &str, max_upload_bytes: usize) -> Result<()> {
    let app = router(store, max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Gateway listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "locations": state.store.locations().len(),
        "replication_mode": state.store.replication_mode(),
    });

    (StatusCode::OK, Json(response))
}

/// Rejects names that would resolve outside the configured locations once
/// joined onto them.
///
/// `name` is already percent-decoded by the router; an encoded dot segment
/// left over from double encoding is still caught.
fn check_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("object name cannot be empty".to_string());
    }
    if name.starts_with(['/', '\\']) {
        return Err(format!("object name must be relative: {}", name));
    }
    if name.contains(['?', '#']) || name.chars().any(char::is_control) {
        return Err(format!("object name contains a reserved character: {}", name));
    }

    let first = name.split(['/', '\\']).next().unwrap_or_default();
    if first.contains(':') {
        return Err(format!("object name must not carry a scheme: {}", name));
    }

    let dot_segment = name.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    });
    if dot_segment {
        return Err(format!("object name contains a dot segment: {}", name));
    }

    Ok(())
}

fn checked_name(name: String) -> std::result::Result<String, Response> {
    match check_name(&name) {
        Ok(()) => Ok(name),
        Err(message) => {
            tracing::warn!("rejecting request: {}", message);
            Err(failure(StatusCode::BAD_REQUEST, message))
        }
    }
}

async fn get_object(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> Response {
    let name = match checked_name(name) {
        Ok(name) => name,
        Err(response) => return response,
    };

    match state.store.open(&name).await {
        Ok(object) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            object.into_bytes(),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

async fn head_object(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> Response {
    let name = match checked_name(name) {
        Ok(name) => name,
        Err(response) => return response,
    };

    if !state.store.exists(&name).await {
        return StatusCode::NOT_FOUND.into_response();
    }

    match state.store.size(&name).await {
        Some(size) => (StatusCode::OK, [(header::CONTENT_LENGTH, size.to_string())]).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

async fn put_object(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
    body: Body,
) -> Response {
    match checked_name(name) {
        Ok(name) => save_object(&state, &name, body).await,
        Err(response) => response,
    }
}

/// Stores the body under the md5-hashed form of `name`.
async fn post_object(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
    body: Body,
) -> Response {
    match checked_name(name) {
        Ok(name) => save_object(&state, &hashed_name(&name), body).await,
        Err(response) => response,
    }
}

async fn save_object(state: &GatewayState, name: &str, body: Body) -> Response {
    let upload = match spool_upload(state, body).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    match state.store.save(name, &upload.source).await {
        Ok(stored) => {
            let url = state.store.url(&stored);
            (
                StatusCode::CREATED,
                Json(ApiResponse::ok(SavedObject { name: stored, url })),
            )
                .into_response()
        }
        Err(error) => error_response(error),
    }
}

/// Request body ready for replication. The temporary file, if any, is
/// removed when this is dropped.
struct SpooledUpload {
    source: UploadSource,
    _spool: Option<TempPath>,
}

async fn spool_upload(
    state: &GatewayState,
    body: Body,
) -> std::result::Result<SpooledUpload, Response> {
    let mut stream = body.into_data_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut spool: Option<(tokio::fs::File, TempPath)> = None;
    let mut received = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| {
            failure(
                StatusCode::BAD_REQUEST,
                format!("failed to read upload body: {}", error),
            )
        })?;

        received += chunk.len();
        if received > state.max_upload_bytes {
            return Err(failure(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("upload exceeds {} bytes", state.max_upload_bytes),
            ));
        }

        match spool.as_mut() {
            Some((file, _)) => file.write_all(&chunk).await.map_err(io_failure)?,
            None if buffer.len() + chunk.len() > state.spool_threshold => {
                let (file, path) = NamedTempFile::new().map_err(io_failure)?.into_parts();
                let mut file = tokio::fs::File::from_std(file);
                file.write_all(&buffer).await.map_err(io_failure)?;
                file.write_all(&chunk).await.map_err(io_failure)?;
                tracing::debug!("spooling upload to {}", path.display());
                buffer = Vec::new();
                spool = Some((file, path));
            }
            None => buffer.extend_from_slice(&chunk),
        }
    }

    match spool {
        Some((mut file, path)) => {
            file.flush().await.map_err(io_failure)?;
            Ok(SpooledUpload {
                source: UploadSource::file(path.to_path_buf()),
                _spool: Some(path),
            })
        }
        None => Ok(SpooledUpload {
            source: UploadSource::Memory(Bytes::from(buffer)),
            _spool: None,
        }),
    }
}

async fn delete_object(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> Response {
    let name = match checked_name(name) {
        Ok(name) => name,
        Err(response) => return response,
    };

    match state.store.delete(&name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

fn failure(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::failure(message))).into_response()
}

fn io_failure(error: std::io::Error) -> Response {
    error_response(DavError::Io(error))
}

fn error_response(error: DavError) -> Response {
    let status = match &error {
        DavError::ReadFailed { status: 404, .. } => StatusCode::NOT_FOUND,
        DavError::ReadFailed { .. } | DavError::Replication { .. } | DavError::Transport { .. } => {
            StatusCode::BAD_GATEWAY
        }
        DavError::Config(_) | DavError::Io(_) | DavError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    failure(status, error.to_string())
}
