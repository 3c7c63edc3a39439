use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::PublicUser;
use crate::state::AppState;
use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::JsonRejection,
        Multipart, Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct RegisterUser {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginUser {
    name: Option<String>,
    password: Option<String>,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::Validation(e.body_text()))
}

pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    format!("Api is running on port {}", state.config.port)
}

pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterUser>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let body = json_body(payload)?;
    let user = state
        .accounts
        .register(
            body.name.as_deref(),
            body.email.as_deref(),
            body.password.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "id": user.id,
            "name": user.name,
            "email": user.email,
        })),
    ))
}

pub async fn login_user(
    State(state): State<AppState>,
    payload: Result<Json<LoginUser>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let body = json_body(payload)?;
    let token = state
        .accounts
        .login(body.name.as_deref(), body.password.as_deref())
        .await?;

    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
    })))
}

pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<PublicUser>>> {
    Ok(Json(state.accounts.list_users().await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PublicUser>> {
    let not_found = || AppError::NotFound("user not found".to_string());
    let id: u64 = id.parse().map_err(|_| not_found())?;
    state
        .accounts
        .get_user(id)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn upload_files(
    AuthUser(claims): AuthUser,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<impl IntoResponse> {
    let mut multipart = multipart.map_err(|e| match e {
        // No multipart body at all means nothing was attached.
        MultipartRejection::InvalidBoundary(_) => AppError::EmptyUpload,
        other => AppError::Multipart(other.body_text()),
    })?;
    tracing::info!("Upload started by user id {}", claims.id);

    let files = state.uploads.accept(&mut multipart, claims.id).await?;

    Ok(Json(json!({
        "message": "Upload completed successfully",
        "files": files,
    })))
}
