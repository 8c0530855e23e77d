//! API routes for taskwelld.
//!
//! All handlers live here, grouped by concern. Update and task routes
//! require a bearer token; task routes additionally require the path user
//! to match the token subject.

use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use taskwell_common::auth::{create_access_token, hash_password, verify_password};
use taskwell_common::{
    ApplyResponse, Error, LogPage, LoginRequest, LoginResponse, NewTask, NewUpdate,
    RegisterRequest, RollbackResponse, Task, TaskComplete, TaskPatch, Update, UpdatePatch,
    UserInfo,
};
use tracing::info;

type AppStateArc = Arc<AppState>;

// ============================================================================
// Service Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Taskwell API" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

// ============================================================================
// Auth Routes
// ============================================================================

pub fn auth_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
}

async fn register(
    State(state): State<AppStateArc>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserInfo>), ApiError> {
    if state.store.user_exists(&req.username, &req.email)? {
        return Err(Error::bad_request("User with this email or username already exists").into());
    }

    let hash = hash_password(&req.password);
    let user = state.store.insert_user(&req.username, &req.email, &hash)?;
    info!("Registered user {} ({})", user.username, user.id);

    Ok((StatusCode::CREATED, Json(UserInfo::from(&user))))
}

async fn login(
    State(state): State<AppStateArc>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .store
        .find_user_by_email(&req.email)?
        .ok_or(Error::Unauthenticated)?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(Error::Unauthenticated.into());
    }

    let access_token = create_access_token(user.id, &state.config.jwt_secret)?;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        user_id: user.id,
        username: user.username,
    }))
}

// ============================================================================
// Task Routes
// ============================================================================

pub fn task_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/:user_id/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/:user_id/tasks/:task_id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route(
            "/api/:user_id/tasks/:task_id/complete",
            patch(toggle_task_completion),
        )
}

async fn list_tasks(
    State(state): State<AppStateArc>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Task>>, ApiError> {
    auth.require_user(user_id)?;
    Ok(Json(state.store.list_tasks(user_id)?))
}

async fn create_task(
    State(state): State<AppStateArc>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
    Json(task): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    auth.require_user(user_id)?;
    let task = state.store.insert_task(user_id, &task)?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppStateArc>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(i64, i64)>,
) -> Result<Json<Task>, ApiError> {
    auth.require_user(user_id)?;
    let task = state
        .store
        .get_task(user_id, task_id)?
        .ok_or(Error::NotFound("Task"))?;
    Ok(Json(task))
}

async fn update_task(
    State(state): State<AppStateArc>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(i64, i64)>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    auth.require_user(user_id)?;
    let task = state
        .store
        .patch_task(user_id, task_id, &patch)?
        .ok_or(Error::NotFound("Task"))?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppStateArc>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    auth.require_user(user_id)?;
    if !state.store.delete_task(user_id, task_id)? {
        return Err(Error::NotFound("Task").into());
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_task_completion(
    State(state): State<AppStateArc>,
    auth: AuthUser,
    Path((user_id, task_id)): Path<(i64, i64)>,
    Json(body): Json<TaskComplete>,
) -> Result<Json<Task>, ApiError> {
    auth.require_user(user_id)?;
    let task = state
        .store
        .set_task_completed(user_id, task_id, body.completed)?
        .ok_or(Error::NotFound("Task"))?;
    Ok(Json(task))
}

// ============================================================================
// Update Routes
// ============================================================================

pub fn update_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/updates", get(list_updates).post(create_update))
        .route(
            "/api/updates/:update_id",
            get(get_update).put(patch_update).delete(delete_update),
        )
        .route("/api/updates/:update_id/apply", post(apply_update))
        .route("/api/updates/:update_id/rollback", post(rollback_update))
        .route("/api/updates/:update_id/logs", get(read_update_logs))
}

async fn list_updates(
    State(state): State<AppStateArc>,
    _auth: AuthUser,
) -> Result<Json<Vec<Update>>, ApiError> {
    Ok(Json(state.store.list_updates()?))
}

async fn create_update(
    State(state): State<AppStateArc>,
    _auth: AuthUser,
    Json(update): Json<NewUpdate>,
) -> Result<(StatusCode, Json<Update>), ApiError> {
    let update = state.lifecycle.create(&update)?;
    info!("Created update {} ({})", update.id, update.version);
    Ok((StatusCode::CREATED, Json(update)))
}

async fn get_update(
    State(state): State<AppStateArc>,
    _auth: AuthUser,
    Path(update_id): Path<i64>,
) -> Result<Json<Update>, ApiError> {
    let update = state
        .store
        .get_update(update_id)?
        .ok_or(Error::NotFound("Update"))?;
    Ok(Json(update))
}

async fn patch_update(
    State(state): State<AppStateArc>,
    _auth: AuthUser,
    Path(update_id): Path<i64>,
    Json(patch): Json<UpdatePatch>,
) -> Result<Json<Update>, ApiError> {
    let update = state
        .lifecycle
        .update_fields(update_id, &patch)?
        .ok_or(Error::NotFound("Update"))?;
    Ok(Json(update))
}

async fn delete_update(
    State(state): State<AppStateArc>,
    _auth: AuthUser,
    Path(update_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.lifecycle.delete(update_id)? {
        return Err(Error::NotFound("Update").into());
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn apply_update(
    State(state): State<AppStateArc>,
    _auth: AuthUser,
    Path(update_id): Path<i64>,
) -> Result<Json<ApplyResponse>, ApiError> {
    if !state.lifecycle.apply(update_id)? {
        return Err(Error::internal("Update application failed").into());
    }

    let update = state
        .store
        .get_update(update_id)?
        .ok_or(Error::NotFound("Update"))?;

    Ok(Json(ApplyResponse {
        message: "Update applied successfully".to_string(),
        status: update.status,
        applied_at: update.applied_at,
    }))
}

async fn rollback_update(
    State(state): State<AppStateArc>,
    _auth: AuthUser,
    Path(update_id): Path<i64>,
) -> Result<Json<RollbackResponse>, ApiError> {
    if !state.lifecycle.rollback(update_id)? {
        return Err(Error::internal("Update rollback failed").into());
    }

    let update = state
        .store
        .get_update(update_id)?
        .ok_or(Error::NotFound("Update"))?;

    Ok(Json(RollbackResponse {
        message: "Update rolled back successfully".to_string(),
        status: update.status,
        rolled_back_at: Some(Utc::now()),
    }))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    level: Option<String>,
    #[serde(default = "default_log_limit")]
    limit: u64,
    #[serde(default)]
    offset: u64,
}

fn default_log_limit() -> u64 {
    50
}

async fn read_update_logs(
    State(state): State<AppStateArc>,
    _auth: AuthUser,
    Path(update_id): Path<i64>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogPage>, ApiError> {
    // Existence check first: a missing update is 404, never an empty page.
    if state.store.get_update(update_id)?.is_none() {
        return Err(Error::NotFound("Update").into());
    }

    let page = state.store.logs_for_update(
        update_id,
        query.level.as_deref(),
        query.limit,
        query.offset,
    )?;
    Ok(Json(page))
}
