//! Peer HTTP service
//!
//! Routes:
//! - `POST /file/upload` - multipart field `file`, stored in the shared dir
//! - `GET /file/download/:name` - serve a file from the shared dir
//! - `GET /discovery/devices` - registry snapshot as JSON
//! - `GET /health`

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lanchat_core::{envelope::guess_mime_type, sanitize_file_name, DeviceListing, DeviceRegistry, FileInfo};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Shared state for the peer server
pub struct PeerServerState {
    pub registry: Arc<DeviceRegistry>,
    pub shared_dir: PathBuf,
}

/// Bind the peer listener; port 0 picks a free port
pub async fn bind_peer_listener(port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    Ok(listener)
}

pub fn router(state: Arc<PeerServerState>) -> Router {
    Router::new()
        .route("/file/upload", post(upload_file))
        .route("/file/download/:name", get(download_file))
        .route("/discovery/devices", get(list_devices))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Serve on an already bound listener
pub async fn start_peer_server(
    listener: TcpListener,
    state: Arc<PeerServerState>,
) -> Result<(u16, tokio::task::JoinHandle<()>)> {
    tokio::fs::create_dir_all(&state.shared_dir).await?;

    let port = listener.local_addr()?.port();
    let app = router(state);

    info!("🌐 Peer server listening on port {}", port);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Peer server error: {}", e);
        }
    });

    Ok((port, handle))
}

/// POST /file/upload - store the `file` part in the shared dir
async fn upload_file(
    State(state): State<Arc<PeerServerState>>,
    mut multipart: Multipart,
) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        };

        if field.name() != Some("file") {
            continue;
        }

        let Some(name) = field.file_name().and_then(sanitize_file_name) else {
            return (StatusCode::BAD_REQUEST, "missing or invalid file name").into_response();
        };

        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        };

        let dest = state.shared_dir.join(&name);
        if let Err(e) = tokio::fs::write(&dest, &data).await {
            error!("Failed to store upload {}: {}", name, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }

        let info = FileInfo::new(name, data.len() as u64, guess_mime_type(&dest));
        info!(file = %info.name, size = info.size_bytes, "📥 Received upload");
        return Json(info).into_response();
    }

    (StatusCode::BAD_REQUEST, "no `file` field in form").into_response()
}

/// GET /file/download/:name - serve a shared file
async fn download_file(
    State(state): State<Arc<PeerServerState>>,
    Path(name): Path<String>,
) -> Response {
    let Some(file_name) = sanitize_file_name(&name) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let path = state.shared_dir.join(&file_name);
    match tokio::fs::read(&path).await {
        Ok(data) => {
            debug!(file = %file_name, size = data.len(), "Serving download");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, guess_mime_type(&path)),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file_name),
                    ),
                ],
                data,
            )
                .into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(file = %file_name, "Download requested for missing file");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            error!("Failed to read {}: {}", file_name, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /discovery/devices - known peers in registry order
async fn list_devices(State(state): State<Arc<PeerServerState>>) -> Json<Vec<DeviceListing>> {
    Json(state.registry.listings())
}

/// GET /health - Simple health check
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanchat_core::{ChatError, Device, TransferClient};

    async fn serve(shared_dir: PathBuf, registry: Arc<DeviceRegistry>) -> SocketAddr {
        let listener = bind_peer_listener(0).await.unwrap();
        let state = Arc::new(PeerServerState {
            registry,
            shared_dir,
        });
        let (port, _handle) = start_peer_server(listener, state).await.unwrap();
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_health() {
        let shared = tempfile::tempdir().unwrap();
        let addr = serve(shared.path().to_path_buf(), Arc::new(DeviceRegistry::new())).await;

        let resp = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert!(resp.status().is_success());
        assert_eq!(resp.text().await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let shared = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let addr = serve(shared.path().to_path_buf(), Arc::new(DeviceRegistry::new())).await;

        let source = work.path().join("notes.txt");
        std::fs::write(&source, b"Hello LAN!").unwrap();

        let client = TransferClient::new(work.path().join("downloads"));
        let info = client.upload(addr, &source).await.unwrap();
        assert_eq!(info.name, "notes.txt");
        assert_eq!(info.size_bytes, 10);
        assert_eq!(info.mime_type, "text/plain");
        assert_eq!(std::fs::read(shared.path().join("notes.txt")).unwrap(), b"Hello LAN!");

        let saved = client.download(addr, "notes.txt").await.unwrap();
        assert_eq!(saved, work.path().join("downloads").join("notes.txt"));
        assert_eq!(std::fs::read(saved).unwrap(), b"Hello LAN!");
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let shared = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let addr = serve(shared.path().to_path_buf(), Arc::new(DeviceRegistry::new())).await;

        let client = TransferClient::new(work.path());
        let err = client.download(addr, "nope.bin").await.unwrap_err();
        assert!(matches!(err, ChatError::DownloadFailed(msg) if msg.contains("404")));
        assert!(!work.path().join("nope.bin").exists());
    }

    #[tokio::test]
    async fn test_upload_name_stays_inside_shared_dir() {
        let shared = tempfile::tempdir().unwrap();
        let addr = serve(shared.path().to_path_buf(), Arc::new(DeviceRegistry::new())).await;

        let part = reqwest::multipart::Part::bytes(b"x".to_vec()).file_name("../../escape.txt");
        let form = reqwest::multipart::Form::new()
            .percent_encode_noop()
            .part("file", part);
        let resp = reqwest::Client::new()
            .post(format!("http://{}/file/upload", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert!(shared.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_without_file_field() {
        let shared = tempfile::tempdir().unwrap();
        let addr = serve(shared.path().to_path_buf(), Arc::new(DeviceRegistry::new())).await;

        let form = reqwest::multipart::Form::new().text("note", "hi");
        let resp = reqwest::Client::new()
            .post(format!("http://{}/file/upload", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_device_listing() {
        let shared = tempfile::tempdir().unwrap();
        let registry = Arc::new(DeviceRegistry::new());
        registry.upsert(Device::new("A", "192.168.1.10:9001".parse().unwrap()));
        registry.upsert(Device::new("B", "192.168.1.11:9002".parse().unwrap()));
        let addr = serve(shared.path().to_path_buf(), Arc::clone(&registry)).await;

        let listings = TransferClient::new(".").list_devices(addr).await.unwrap();
        assert_eq!(listings, registry.listings());
        assert_eq!(listings[0].name, "A");
        assert_eq!(listings[1].port, 9002);
    }
}
