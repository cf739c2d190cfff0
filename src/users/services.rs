use bytes::Bytes;
use tracing::info;

use crate::{
    auth::{repo::UserRepo, repo_types::User},
    db::StoreError,
    error::{AppError, AppResult},
    storage::{ext_from_mime, AvatarStore},
};

pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

pub async fn update_avatar(
    users: &dyn UserRepo,
    avatars: &dyn AvatarStore,
    user: &User,
    body: Bytes,
    content_type: &str,
) -> AppResult<User> {
    if body.is_empty() {
        return Err(AppError::validation("file is empty"));
    }
    if ext_from_mime(content_type).is_none() {
        return Err(AppError::validation("file must be a jpeg, png, webp, gif or heic image"));
    }

    let url = avatars.upload(&user.username, body, content_type).await?;
    let updated = users.update_avatar(user.id, &url).await.map_err(|e| match e {
        StoreError::NotFound => AppError::unauthorized("Could not validate credentials"),
        other => AppError::Internal(anyhow::Error::new(other)),
    })?;
    info!(user_id = user.id, "avatar updated");
    Ok(updated)
}
