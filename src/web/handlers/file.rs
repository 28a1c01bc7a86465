//! File handlers.

use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use chrono::Utc;
use std::io::{self, Cursor};
use std::sync::Arc;

use crate::storage::FileEntry;
use crate::web::dto::{
    ApiResponse, DeletedResponse, FileQuery, PruneRequest, PruneResponse, PublicPathResponse,
    UploadQuery,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Generate a safe Content-Disposition header value.
///
/// Control characters are dropped (no header injection), quotes and
/// backslashes are replaced in the ASCII fallback, and non-ASCII names get an
/// RFC 5987 `filename*` parameter.
fn content_disposition_header(disposition: &str, filename: &str) -> String {
    let needs_encoding = !filename.is_ascii()
        || filename
            .chars()
            .any(|c| c.is_control() || c == '"' || c == '\\');

    if !needs_encoding {
        return format!("{disposition}; filename=\"{filename}\"");
    }

    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();
    let encoded = urlencoding::encode(filename);

    format!("{disposition}; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::payload_too_large("Upload exceeds the size limit");
    }
    tracing::debug!("Failed to read multipart body: {}", e);
    ApiError::bad_request(format!("Invalid multipart data: {}", e.body_text()))
}

/// POST /api/files?path=&on_conflict= - Upload a file.
///
/// Request body: multipart/form-data with a `file` field. Only the first
/// `file` field is stored.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<FileEntry>>), ApiError> {
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("File field has no filename"))?;
        let content = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, content));
        break;
    }

    let (filename, content) = upload.ok_or_else(|| ApiError::bad_request("No file provided"))?;

    if content.len() as u64 > state.max_upload_size {
        let max_mb = state.max_upload_size / 1024 / 1024;
        return Err(ApiError::payload_too_large(format!(
            "File too large (max {}MB)",
            max_mb
        )));
    }

    let policy = query.on_conflict.unwrap_or(state.on_conflict);
    let entry = state
        .run(move |engine| {
            engine.upload_file(&query.path, &mut Cursor::new(content), &filename, policy)
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(entry))))
}

/// DELETE /api/files?path=&filename= - Delete a file.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> Result<Json<ApiResponse<DeletedResponse>>, ApiError> {
    let deleted_path = state
        .run(move |engine| engine.delete_file(&query.path, &query.filename))
        .await?;
    Ok(Json(ApiResponse::new(DeletedResponse { deleted_path })))
}

/// POST /api/prune - Delete files older than a threshold.
pub async fn prune(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PruneRequest>,
) -> Result<Json<ApiResponse<PruneResponse>>, ApiError> {
    let threshold = req.threshold(Utc::now()).ok_or_else(|| {
        ApiError::bad_request("Specify exactly one of older_than or max_age_secs")
    })?;

    let deleted_paths = state
        .run(move |engine| engine.prune_older_than(&req.path, threshold))
        .await?;
    Ok(Json(ApiResponse::new(PruneResponse { deleted_paths })))
}

/// GET /api/public-path?path=&filename= - Compose a shareable locator.
///
/// Does not check that the file exists.
pub async fn public_path(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> Result<Json<ApiResponse<PublicPathResponse>>, ApiError> {
    let public_path = state.engine.public_path(&query.path, &query.filename)?;
    Ok(Json(ApiResponse::new(PublicPathResponse::new(public_path))))
}

/// GET /api/download/*path - Download a file as an attachment.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response<Body>, ApiError> {
    serve_file(&state, path, "attachment").await
}

/// GET /public/*path - Serve a file inline without authentication.
pub async fn public_download(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response<Body>, ApiError> {
    serve_file(&state, path, "inline").await
}

async fn serve_file(
    state: &AppState,
    path: String,
    disposition: &str,
) -> Result<Response<Body>, ApiError> {
    let display_path = path.clone();
    let absolute = state
        .run(move |engine| engine.resolve_for_serving(&path))
        .await?;

    let content = tokio::fs::read(&absolute).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            // Deleted between resolution and read.
            ApiError::not_found(format!("{display_path} not found"))
        } else {
            tracing::error!("Failed to read {}: {}", absolute.display(), e);
            ApiError::internal("Failed to read file")
        }
    })?;

    let filename = absolute
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content_type = mime_guess::from_path(&absolute)
        .first_or_octet_stream()
        .to_string();

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(disposition, &filename),
        )
        .header(header::CONTENT_LENGTH, content.len())
        .body(Body::from(content))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_header_simple_ascii() {
        let result = content_disposition_header("attachment", "document.txt");
        assert_eq!(result, "attachment; filename=\"document.txt\"");
    }

    #[test]
    fn test_content_disposition_header_inline() {
        let result = content_disposition_header("inline", "photo.png");
        assert_eq!(result, "inline; filename=\"photo.png\"");
    }

    #[test]
    fn test_content_disposition_header_japanese() {
        let result = content_disposition_header("attachment", "日本語ファイル.txt");
        assert!(result.starts_with("attachment; filename=\""));
        assert!(result.contains("filename*=UTF-8''"));
        assert!(result.contains("%E6%97%A5%E6%9C%AC%E8%AA%9E"));
    }

    #[test]
    fn test_content_disposition_header_double_quote() {
        let result = content_disposition_header("attachment", "test\"file.txt");
        assert!(result.contains("filename=\"test_file.txt\""));
        assert!(result.contains("%22"));
    }

    #[test]
    fn test_content_disposition_header_control_characters() {
        let result = content_disposition_header("attachment", "test\r\nX-Injected: bad.txt");
        assert!(!result.contains('\r'));
        assert!(!result.contains('\n'));
        assert!(result.starts_with("attachment; filename="));
    }
}
