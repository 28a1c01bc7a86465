//! Folder handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::storage::{DirectoryEntry, Listing};
use crate::web::dto::{
    ApiResponse, CreateFolderRequest, DeletedResponse, PathQuery, RenameFolderRequest,
    ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// GET /api/list?path= - List the immediate children of a folder.
pub async fn list_folder(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ApiResponse<Listing>>, ApiError> {
    let listing = state.run(move |engine| engine.list(&query.path)).await?;
    Ok(Json(ApiResponse::new(listing)))
}

/// POST /api/folders - Create a folder.
pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateFolderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DirectoryEntry>>), ApiError> {
    let entry = state
        .run(move |engine| engine.create_folder(&req.parent, &req.name))
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(entry))))
}

/// DELETE /api/folders?path= - Recursively delete a folder.
pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ApiResponse<DeletedResponse>>, ApiError> {
    let deleted_path = state
        .run(move |engine| engine.delete_folder(&query.path))
        .await?;
    Ok(Json(ApiResponse::new(DeletedResponse { deleted_path })))
}

/// POST /api/folders/rename - Rename a folder within its parent.
pub async fn rename_folder(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<RenameFolderRequest>,
) -> Result<Json<ApiResponse<DirectoryEntry>>, ApiError> {
    let entry = state
        .run(move |engine| engine.rename_folder(&req.path, &req.new_name))
        .await?;
    Ok(Json(ApiResponse::new(entry)))
}
