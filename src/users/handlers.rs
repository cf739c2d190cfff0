use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    middleware::from_fn_with_state,
    routing::{get, patch},
    Json, Router,
};
use bytes::Bytes;
use tracing::instrument;

use super::services::{self, MAX_AVATAR_BYTES};
use crate::{
    auth::{
        dto::PublicUser,
        extractors::{AdminUser, CurrentUser},
    },
    error::{AppError, AppResult},
    ratelimit::rate_limit_me,
    state::AppState,
};

pub fn user_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/users/me",
            get(me).route_layer(from_fn_with_state(state.clone(), rate_limit_me)),
        )
        .route(
            "/users/avatar",
            patch(update_avatar).layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES + 64 * 1024)),
        )
}

#[instrument(skip(user), fields(user_id = user.id))]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(user.into())
}

#[instrument(skip(state, user, mp), fields(user_id = user.id))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    mut mp: Multipart,
) -> AppResult<Json<PublicUser>> {
    let mut file: Option<(Bytes, String)> = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.to_string()))?
    {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field.bytes().await.map_err(|e| AppError::validation(e.to_string()))?;
            file = Some((data, content_type));
            break;
        }
    }
    let (data, content_type) = file.ok_or_else(|| AppError::validation("file is required"))?;

    let updated = services::update_avatar(
        state.users.as_ref(),
        state.avatars.as_ref(),
        &user,
        data,
        &content_type,
    )
    .await?;
    Ok(Json(updated.into()))
}
