use axum::extract::{Path, State};
use axum::Json;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::auth::{credential, session};
use crate::db::models::UserProfile;
use crate::db::{normalize_email, now_millis};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

// -- Request/Response types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpResponse {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: LoginUser,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// -- Handlers --

/// POST /auth/signup
/// Creates an account. The unique index on users.email is what makes the
/// exists-check atomic: concurrent signups with the same address race to a
/// single INSERT and the losers get Conflict.
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> AppResult<Json<SignUpResponse>> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    if name.is_empty() {
        return Err(AppError::BadRequest("Name cannot be empty".into()));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }
    if req.password.is_empty() {
        return Err(AppError::BadRequest("Password cannot be empty".into()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let password_hash = credential::hash(&req.password);

    let conn = state.db.get()?;
    let result = conn.execute(
        "INSERT INTO users (id, name, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, name, email, password_hash, now_millis()],
    );

    match result {
        Ok(_) => {
            tracing::info!(user_id = %id, "account created");
            Ok(Json(SignUpResponse { id, name, email }))
        }
        Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(
            "User with this email already exists".into(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// POST /auth/login
/// Unknown email and wrong password return the same error so callers cannot
/// probe which addresses have accounts.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let email = normalize_email(&req.email);

    let conn = state.db.get()?;
    let row: Option<(String, String, String, Option<String>, String)> = conn
        .query_row(
            "SELECT id, name, email, avatar, password_hash FROM users WHERE email = ?1",
            params![email],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                ))
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    let (id, name, email, avatar, password_hash) =
        row.ok_or(AppError::InvalidCredentials)?;

    if !credential::verify(&req.password, &password_hash) {
        return Err(AppError::InvalidCredentials);
    }

    let token = session::create_session(&state.db, &id, state.config.auth.session_hours)?;

    Ok(Json(LoginResponse {
        token,
        user: LoginUser {
            id,
            name,
            email,
            avatar,
        },
    }))
}

/// POST /auth/logout
/// Invalidates the presented session token.
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<SuccessResponse>> {
    session::delete_session(&state.db, &user.token)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /users/{id}
/// Missing ids are not an error: the body is JSON null, mirroring a query
/// that found nothing.
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Option<UserProfile>>> {
    let conn = state.db.get()?;
    let profile = conn
        .query_row(
            "SELECT id, name, email, avatar, created_at FROM users WHERE id = ?1",
            params![id],
            |r| {
                Ok(UserProfile {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    email: r.get(2)?,
                    avatar: r.get(3)?,
                    created_at: r.get(4)?,
                })
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    Ok(Json(profile))
}

/// PATCH /users/{id}
/// Partial update of name/avatar. Only the account owner's session may
/// update a profile; omitted fields are left unchanged.
pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<SuccessResponse>> {
    if user.id != id {
        return Err(AppError::Unauthorized);
    }

    let conn = state.db.get()?;
    let updated = conn.execute(
        "UPDATE users SET
            name = COALESCE(?2, name),
            avatar = COALESCE(?3, avatar)
         WHERE id = ?1",
        params![id, req.name, req.avatar],
    )?;

    if updated == 0 {
        return Err(AppError::NotFound);
    }

    Ok(Json(SuccessResponse { success: true }))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
