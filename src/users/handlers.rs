use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::PublicUser,
        jwt::AuthUser,
        repo_types::User,
    },
    error::ApiError,
    state::AppState,
};

use super::dto::{
    AvatarResponse, UpdateAvatarRequest, UpdateNotificationsRequest, UpdateProfileRequest,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(get_profile).put(update_profile))
        .route("/users/avatar", put(update_avatar))
        .route("/users/notifications", put(update_notifications))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    if let Some(name) = &payload.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("Name is required".into()));
        }
    }

    let user = User::update_profile(
        &state.db,
        user_id,
        payload.name.as_deref().map(str::trim),
        payload.location.as_deref(),
        payload.phone.as_deref(),
        payload.land_area,
    )
    .await?
    .ok_or(ApiError::NotFound("User"))?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateAvatarRequest>,
) -> Result<Json<AvatarResponse>, ApiError> {
    if payload.avatar_url.trim().is_empty() {
        return Err(ApiError::Validation("avatar_url is required".into()));
    }

    let user = User::set_avatar(&state.db, user_id, payload.avatar_url.trim())
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    Ok(Json(AvatarResponse {
        avatar_url: user.avatar_url,
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_notifications(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateNotificationsRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = User::set_notifications(&state.db, user_id, payload.notifications)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    Ok(Json(user.into()))
}
