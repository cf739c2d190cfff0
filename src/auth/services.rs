use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest, TokenResponse},
        jwt::JwtKeys,
        password::{hash_password, verify_dummy, verify_password},
        repo::UserRepo,
        repo_types::{NewUser, User},
    },
    db::StoreError,
    error::{AppError, AppResult},
};

const MIN_PASSWORD_LEN: usize = 8;
pub(crate) const MAX_USERNAME_LEN: usize = 50;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Default avatar for a freshly registered account.
pub(crate) fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!("https://www.gravatar.com/avatar/{}?d=identicon", hex::encode(digest))
}

pub async fn register(users: &dyn UserRepo, mut req: RegisterRequest) -> AppResult<User> {
    req.email = req.email.trim().to_lowercase();
    req.username = req.username.trim().to_string();

    if req.username.is_empty() {
        return Err(AppError::validation("Username is required"));
    }
    if req.username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::validation(format!(
            "Username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    if !is_valid_email(&req.email) {
        warn!(email = %req.email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("Password too short"));
    }

    if users.find_by_email(&req.email).await.map_err(internal)?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::Conflict("User with this email already exists".into()));
    }
    if users.find_by_username(&req.username).await.map_err(internal)?.is_some() {
        warn!(username = %req.username, "username already registered");
        return Err(AppError::Conflict("User with this username already exists".into()));
    }

    let new = NewUser {
        password_hash: hash_password(&req.password)?,
        avatar: Some(gravatar_url(&req.email)),
        username: req.username,
        email: req.email,
    };

    // The unique indexes catch a registration racing past the checks above.
    let user = users.create(&new).await.map_err(|e| match e {
        StoreError::Conflict => AppError::Conflict("User with this username or email already exists".into()),
        other => internal(other),
    })?;

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok(user)
}

pub async fn login(users: &dyn UserRepo, keys: &JwtKeys, mut req: LoginRequest) -> AppResult<TokenResponse> {
    req.username = req.username.trim().to_string();
    let invalid = || AppError::unauthorized("Incorrect username or password");

    let Some(user) = users.find_by_username(&req.username).await.map_err(internal)? else {
        verify_dummy(&req.password);
        warn!(username = %req.username, "login unknown username");
        return Err(invalid());
    };

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(invalid());
    }

    let token = keys.sign(&user.username)?;
    info!(user_id = user.id, "user logged in");
    Ok(TokenResponse::bearer(token))
}

/// Maps a bearer token onto a live user record.
pub async fn resolve_current_user(users: &dyn UserRepo, keys: &JwtKeys, token: &str) -> AppResult<User> {
    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "token rejected");
        AppError::unauthorized("Could not validate credentials")
    })?;

    users
        .find_by_username(&claims.sub)
        .await
        .map_err(internal)?
        .ok_or_else(|| AppError::unauthorized("Could not validate credentials"))
}

fn internal(e: StoreError) -> AppError {
    AppError::Internal(anyhow::Error::new(e))
}
