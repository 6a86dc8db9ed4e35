use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use offerhub_sdk::objects::ExportFileInfo;
use std::io::ErrorKind;
use std::path::{Component, PathBuf};

use crate::state::AppState;

use super::AdminApiError;

/// Resolve `name` inside the export directory.
///
/// Only a single plain file name is accepted, so the resolved path cannot
/// leave the directory. The filesystem is not consulted.
fn resolve_export(state: &AppState, name: &str) -> Result<PathBuf, AdminApiError> {
    let mut components = std::path::Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) if !name.contains(['/', '\\']) => {
            Ok(state.export_dir().join(file))
        }
        _ => Err(AdminApiError::InvalidFileName),
    }
}

/// `GET /exports`: list the files in the export directory, sorted by name.
///
/// In-progress `.tmp` and `.prev` files are skipped; a missing directory lists
/// nothing.
pub async fn list_exports(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AdminApiError> {
    let mut entries = match tokio::fs::read_dir(state.export_dir()).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Json(Vec::<ExportFileInfo>::new())),
        Err(e) => return Err(AdminApiError::Io(e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(AdminApiError::Io)? {
        let metadata = entry.metadata().await.map_err(AdminApiError::Io)?;
        if !metadata.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.ends_with(".tmp") || name.ends_with(".prev") {
            continue;
        }
        let modified_at = metadata
            .modified()
            .map(|t| time::OffsetDateTime::from(t).unix_timestamp())
            .unwrap_or_default();
        files.push(ExportFileInfo {
            name,
            size: metadata.len(),
            modified_at,
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(files))
}

/// `GET /exports/{name}`: download one export file as CSV.
pub async fn download_export(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AdminApiError> {
    let path = resolve_export(&state, &name)?;
    let body = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => AdminApiError::NotFound,
        _ => AdminApiError::Io(e),
    })?;

    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body))
}
