// ABOUTME: Video upload endpoint
// ABOUTME: Validates and stores multipart uploads, then hands the resource to the sync hub

use crate::error::UploadError;
use crate::server::config::ServerConfig;
use crate::server::server::AppState;
use axum::extract::multipart::{Field, Multipart};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = match self {
            UploadError::Storage(_) | UploadError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            log::error!("Upload failed: {:?}", self);
        } else {
            log::warn!("Upload rejected: {}", self);
        }
        (status, Json(json!({"success": false, "error": self.to_string()}))).into_response()
    }
}

/// Reduce an uploaded filename to a safe basename
///
/// Path components are dropped, whitespace becomes `_`, and anything other than ASCII
/// alphanumerics, `.`, `-` and `_` is removed along with leading/trailing `.` and `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Sanitize `original` and check its extension against the allow-list
pub fn accepted_filename(original: &str, config: &ServerConfig) -> Result<String, UploadError> {
    if original.is_empty() {
        return Err(UploadError::NoSelectedFile);
    }
    let name = sanitize_filename(original);
    let extension = Path::new(&name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");
    let has_stem = Path::new(&name).file_stem().is_some_and(|stem| !stem.is_empty());
    if !has_stem || !config.is_allowed_extension(extension) {
        return Err(UploadError::FileTypeNotAllowed);
    }
    Ok(name)
}

/// A file accepted from the multipart body, still under its temporary name
struct PendingFile {
    name: String,
    temp_path: PathBuf,
}

impl PendingFile {
    async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
            log::debug!("Failed to remove {}: {}", self.temp_path.display(), e);
        }
    }
}

fn multipart_error(e: impl std::fmt::Display) -> UploadError {
    UploadError::Multipart(e.to_string())
}

/// Stream a multipart field to `path`
async fn write_field(field: &mut Field<'_>, path: &Path) -> Result<u64, UploadError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// `POST /upload`: multipart with a `file` and the uploader's `sid`
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<StatusCode, UploadError> {
    let config = &state.config;
    let mut sid: Option<String> = None;
    let mut pending: Option<PendingFile> = None;

    let outcome = async {
        while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
            let field_name = field.name().map(str::to_string);
            match field_name.as_deref() {
                Some("sid") => sid = Some(field.text().await.map_err(multipart_error)?),
                Some("file") if pending.is_none() => {
                    let original = field.file_name().unwrap_or_default().to_string();
                    let name = accepted_filename(&original, config)?;

                    tokio::fs::create_dir_all(&config.upload_dir).await?;
                    let temp_path = config
                        .upload_dir
                        .join(format!(".{}.part", uuid::Uuid::new_v4()));
                    let file = PendingFile { name, temp_path };
                    let result = write_field(&mut field, &file.temp_path).await;
                    match result {
                        Ok(bytes) => {
                            log::debug!("Received {} ({} bytes)", file.name, bytes);
                            pending = Some(file);
                        }
                        Err(e) => {
                            file.discard().await;
                            return Err(e);
                        }
                    }
                }
                _ => {}
            }
        }
        Ok::<(), UploadError>(())
    }
    .await;

    if let Err(e) = outcome {
        if let Some(file) = pending {
            file.discard().await;
        }
        return Err(e);
    }

    let Some(file) = pending else {
        return Err(UploadError::NoFilePart);
    };
    let issuer = match state.hub.validate_issuer(sid.as_deref().unwrap_or("")) {
        Ok(issuer) => issuer.to_string(),
        Err(e) => {
            file.discard().await;
            return Err(e);
        }
    };

    let final_path = config.upload_dir.join(&file.name);
    if let Err(e) = tokio::fs::rename(&file.temp_path, &final_path).await {
        file.discard().await;
        return Err(e.into());
    }

    let url = format!("{}/{}", config.video_route.trim_end_matches('/'), file.name);
    if let Err(e) = state.hub.load_video(&url, &issuer) {
        if let Err(remove) = tokio::fs::remove_file(&final_path).await {
            log::debug!("Failed to remove {}: {}", final_path.display(), remove);
        }
        return Err(e);
    }
    Ok(StatusCode::NO_CONTENT)
}
