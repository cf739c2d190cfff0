use std::str::FromStr;

use anyhow::Context;
use axum_client_ip::SecureClientIpSource;
use jsonwebtoken::Algorithm;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub issuer: String,
    pub audience: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// `None` selects the in-process cache.
    pub redis_url: Option<String>,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvatarConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub cache: CacheConfig,
    pub avatar: AvatarConfig,
    pub me_rate_limit_per_minute: u32,
    /// Where the rate limiter reads the client address from.
    pub client_ip_source: SecureClientIpSource,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET")?,
            algorithm: parse_algorithm(
                &std::env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".into()),
            )?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "contacts-api".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "contacts-api-users".into()),
            ttl_seconds: env_or("JWT_EXPIRATION_SECONDS", 3600)?,
        };
        let cache = CacheConfig {
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            ttl_seconds: env_or("CACHE_TTL_SECONDS", 3600)?,
        };

        let endpoint = std::env::var("AVATAR_ENDPOINT").context("AVATAR_ENDPOINT")?;
        let bucket = std::env::var("AVATAR_BUCKET").context("AVATAR_BUCKET")?;
        let public_url = std::env::var("AVATAR_PUBLIC_URL")
            .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
        let avatar = AvatarConfig {
            access_key: std::env::var("AVATAR_ACCESS_KEY").context("AVATAR_ACCESS_KEY")?,
            secret_key: std::env::var("AVATAR_SECRET_KEY").context("AVATAR_SECRET_KEY")?,
            region: std::env::var("AVATAR_REGION").unwrap_or_else(|_| "us-east-1".into()),
            endpoint,
            bucket,
            public_url,
        };

        Ok(Self {
            database_url,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            jwt,
            cache,
            avatar,
            me_rate_limit_per_minute: positive(
                env_or("RATE_LIMIT_ME_PER_MINUTE", 10)?,
                "RATE_LIMIT_ME_PER_MINUTE",
            )?,
            client_ip_source: parse_ip_source(
                &std::env::var("CLIENT_IP_SOURCE").unwrap_or_else(|_| "ConnectInfo".into()),
            )?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v.parse::<T>().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

fn positive(value: u32, key: &str) -> anyhow::Result<u32> {
    if value == 0 {
        anyhow::bail!("{key} must be at least 1");
    }
    Ok(value)
}

pub fn parse_ip_source(name: &str) -> anyhow::Result<SecureClientIpSource> {
    Ok(match name {
        "ConnectInfo" => SecureClientIpSource::ConnectInfo,
        "RightmostXForwardedFor" => SecureClientIpSource::RightmostXForwardedFor,
        "RightmostForwarded" => SecureClientIpSource::RightmostForwarded,
        "XRealIp" => SecureClientIpSource::XRealIp,
        "FlyClientIp" => SecureClientIpSource::FlyClientIp,
        "TrueClientIp" => SecureClientIpSource::TrueClientIp,
        "CfConnectingIp" => SecureClientIpSource::CfConnectingIp,
        other => anyhow::bail!("unknown CLIENT_IP_SOURCE {other}"),
    })
}

/// Only HMAC algorithms are usable with a shared secret.
pub fn parse_algorithm(name: &str) -> anyhow::Result<Algorithm> {
    let alg = Algorithm::from_str(name).with_context(|| format!("unknown JWT_ALGORITHM {name}"))?;
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(alg),
        other => anyhow::bail!("JWT_ALGORITHM {other:?} needs a key pair, only HS* is supported"),
    }
}
