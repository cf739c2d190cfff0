use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::auth::repo::{PgUserRepo, UserRepo};
use crate::cache::create_cache_client;
use crate::config::AppConfig;
use crate::contacts::{
    cache::ContactCache,
    repo::{ContactRepo, PgContactRepo},
};
use crate::db;
use crate::ratelimit::{RateLimitConfig, RateLimiter};
use crate::storage::{AvatarStore, S3AvatarStore};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub contacts: Arc<dyn ContactRepo>,
    pub contact_cache: ContactCache,
    pub avatars: Arc<dyn AvatarStore>,
    pub me_limiter: RateLimiter,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = db::connect(&config).await?;

        let cache_client = create_cache_client(&config.cache).await;
        let contact_cache = ContactCache::new(cache_client, Duration::from_secs(config.cache.ttl_seconds));

        // Real S3/MinIO
        let avatars = Arc::new(S3AvatarStore::new(&config.avatar).await?) as Arc<dyn AvatarStore>;

        Ok(Self {
            users: Arc::new(PgUserRepo::new(db.clone())),
            contacts: Arc::new(PgContactRepo::new(db.clone())),
            me_limiter: RateLimiter::new(RateLimitConfig::per_minute(config.me_rate_limit_per_minute)),
            db,
            config,
            contact_cache,
            avatars,
        })
    }

    pub async fn shutdown(&self) {
        self.contact_cache.close().await;
        self.db.close().await;
        tracing::info!("connections closed");
    }
}
