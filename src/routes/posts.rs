use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::models::{EnrichedPost, Post};
use crate::db::now_millis;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

/// Display name substituted when a post's owner cannot be resolved. The feed
/// never fails outright over a single dangling owner reference.
const UNKNOWN_USER: &str = "Unknown User";

// --- Forms ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub content: String,
    pub image_url: Option<String>,
    pub image_storage_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostResponse {
    pub post_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub success: bool,
    pub likes: i64,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/{id}/like", post(like_post))
        .route("/feed", get(feed))
        .route("/users/{id}/posts", get(user_posts))
}

// --- Handlers ---

/// POST /posts
/// A post needs text or an image. The owner is the session user, so posts
/// can never reference an account that does not exist. A storage id is
/// accepted whether or not its upload finished: post creation stays
/// independent of upload success.
async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<Json<CreatePostResponse>> {
    let content = req.content.trim().to_string();
    let image_url = req.image_url.filter(|s| !s.trim().is_empty());
    let image_storage_id = req.image_storage_id.filter(|s| !s.trim().is_empty());

    if content.is_empty() && image_url.is_none() && image_storage_id.is_none() {
        return Err(AppError::BadRequest(
            "Post must have text or an image".into(),
        ));
    }

    let post_id = uuid::Uuid::now_v7().to_string();
    {
        let conn = state.db.get()?;
        conn.execute(
            "INSERT INTO posts (id, user_id, content, image_url, image_storage_id, likes, comments, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6)",
            params![post_id, user.id, content, image_url, image_storage_id, now_millis()],
        )?;
    }

    tracing::info!(post_id = %post_id, user_id = %user.id, "post created");
    Ok(Json(CreatePostResponse { post_id }))
}

/// POST /posts/{id}/like
/// Single-statement increment, atomic per row: concurrent likers all land.
/// Likes are unattributed and not idempotent; the same caller can like a
/// post any number of times.
async fn like_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<LikeResponse>> {
    let conn = state.db.get()?;

    let updated = conn.execute("UPDATE posts SET likes = likes + 1 WHERE id = ?1", params![id])?;
    if updated == 0 {
        return Err(AppError::NotFound);
    }

    let likes: i64 = conn.query_row(
        "SELECT likes FROM posts WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;

    Ok(Json(LikeResponse {
        success: true,
        likes,
    }))
}

/// GET /feed
/// The global feed: every post, newest first, each carrying its owner's
/// current name and avatar.
async fn feed(State(state): State<AppState>) -> AppResult<Json<Vec<EnrichedPost>>> {
    let conn = state.db.get()?;
    let posts = query_feed(&conn)?;
    Ok(Json(posts))
}

/// GET /users/{id}/posts
/// One user's posts, newest first, without enrichment. An unknown user id
/// simply yields an empty list.
async fn user_posts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    let posts = query_user_posts(&conn, &id)?;
    Ok(Json(posts))
}

// --- Query helpers ---

/// Read the whole feed, enriched. Ordering is created_at DESC with the
/// creation-ordered post id as tie-break, so equal timestamps produce the
/// same order on every call. Owner name/avatar come from the users row as
/// it is now; deleted or dangling owners render as "Unknown User".
fn query_feed(conn: &rusqlite::Connection) -> Result<Vec<EnrichedPost>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.user_id, p.content, p.image_url, p.image_storage_id,
                p.likes, p.comments, p.created_at,
                u.name, u.avatar,
                m.uploaded
         FROM posts p
         LEFT JOIN users u ON u.id = p.user_id
         LEFT JOIN media_objects m ON m.id = p.image_storage_id
         ORDER BY p.created_at DESC, p.id DESC",
    )?;

    let posts = stmt
        .query_map([], |row| {
            let image_url: Option<String> = row.get(3)?;
            let image_storage_id: Option<String> = row.get(4)?;
            let owner_name: Option<String> = row.get(8)?;
            let owner_avatar: Option<String> = row.get(9)?;
            let media_uploaded: Option<bool> = row.get(10)?;

            // Prefer the stored URL; otherwise resolve an uploaded storage
            // id to its fetchable path.
            let effective_url = image_url.or_else(|| {
                image_storage_id
                    .as_deref()
                    .filter(|_| media_uploaded.unwrap_or(false))
                    .map(|sid| format!("/media/{}", sid))
            });

            Ok(EnrichedPost {
                post: Post {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    content: row.get(2)?,
                    image_url: effective_url,
                    image_storage_id,
                    likes: row.get(5)?,
                    comments: row.get(6)?,
                    created_at: row.get(7)?,
                },
                user_name: owner_name.unwrap_or_else(|| UNKNOWN_USER.to_string()),
                user_avatar: owner_avatar,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(posts)
}

fn query_user_posts(
    conn: &rusqlite::Connection,
    user_id: &str,
) -> Result<Vec<Post>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, content, image_url, image_storage_id, likes, comments, created_at
         FROM posts
         WHERE user_id = ?1
         ORDER BY created_at DESC, id DESC",
    )?;

    let posts = stmt
        .query_map(params![user_id], |row| {
            Ok(Post {
                id: row.get(0)?,
                user_id: row.get(1)?,
                content: row.get(2)?,
                image_url: row.get(3)?,
                image_storage_id: row.get(4)?,
                likes: row.get(5)?,
                comments: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(posts)
}

// --- Tests ---
