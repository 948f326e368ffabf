use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::now_millis;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// How long an issued upload slot stays writable.
const UPLOAD_TTL_SECS: i64 = 3600;

// --- Request/Response types ---

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub upload_url: String,
    pub storage_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadComplete {
    pub storage_id: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/media/uploads", post(create_upload))
        .route("/media/upload/{id}", put(upload))
        .route("/media/{id}/url", get(resolve_url))
        .route("/media/{id}", get(serve))
}

// --- Handlers ---

/// POST /media/uploads
/// Issues a short-lived write target. The caller PUTs raw bytes to the
/// returned URL, then hands the storage id to post creation.
async fn create_upload(State(state): State<AppState>) -> AppResult<Json<UploadTarget>> {
    let storage_id = uuid::Uuid::now_v7().to_string();
    let now = now_millis();

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO media_objects (id, uploaded, created_at, expires_at) VALUES (?1, 0, ?2, ?3)",
        params![storage_id, now, now + UPLOAD_TTL_SECS * 1000],
    )?;

    Ok(Json(UploadTarget {
        upload_url: format!("/media/upload/{}", storage_id),
        storage_id,
    }))
}

/// PUT /media/upload/{id}
/// Accepts the bytes for a previously issued slot. Unknown slots are 404;
/// expired slots are rejected. Re-uploading an already written slot just
/// overwrites it, matching best-effort storage semantics.
async fn upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<UploadComplete>> {
    let conn = state.db.get()?;
    let expires_at: i64 = conn
        .query_row(
            "SELECT expires_at FROM media_objects WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?
        .ok_or(AppError::NotFound)?;

    if now_millis() > expires_at {
        return Err(AppError::BadRequest("Upload URL has expired".into()));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let uploads_dir = state.config.uploads_path();
    std::fs::create_dir_all(uploads_dir)?;
    std::fs::write(uploads_dir.join(&id), &body)?;

    conn.execute(
        "UPDATE media_objects SET uploaded = 1, content_type = ?2, size = ?3 WHERE id = ?1",
        params![id, content_type, body.len() as i64],
    )?;

    tracing::info!(storage_id = %id, size = body.len(), "media uploaded");
    Ok(Json(UploadComplete { storage_id: id }))
}

/// GET /media/{id}/url
/// Maps a storage id to its fetchable URL. Unknown ids, slots whose upload
/// never completed, and objects whose bytes were removed all resolve to
/// JSON null rather than an error.
async fn resolve_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Option<String>>> {
    let conn = state.db.get()?;
    let uploaded: Option<bool> = conn
        .query_row(
            "SELECT uploaded FROM media_objects WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    let url = match uploaded {
        Some(true) if state.config.uploads_path().join(&id).exists() => {
            Some(format!("/media/{}", id))
        }
        _ => None,
    };

    Ok(Json(url))
}

/// GET /media/{id}
/// Serves the stored bytes with the content type captured at upload.
async fn serve(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let conn = state.db.get()?;
    let (uploaded, content_type): (bool, Option<String>) = conn
        .query_row(
            "SELECT uploaded, content_type FROM media_objects WHERE id = ?1",
            params![id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?
        .ok_or(AppError::NotFound)?;

    if !uploaded {
        return Err(AppError::NotFound);
    }

    let path = state.config.uploads_path().join(&id);
    let data = std::fs::read(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::NotFound,
        _ => AppError::Io(e),
    })?;

    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        data,
    )
        .into_response())
}

// --- Tests ---
