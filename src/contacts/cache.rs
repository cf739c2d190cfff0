//! Cache-aside reads and write-through updates for single-contact lookups.
//!
//! The database stays authoritative. Every cache call here is best-effort:
//! failures are logged and reported as a miss or ignored, never returned.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::CacheClient;
use crate::contacts::dto::ContactResponse;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    owner_id: i64,
    contact: ContactResponse,
}

#[derive(Clone)]
pub struct ContactCache {
    client: Arc<dyn CacheClient>,
    ttl: Duration,
}

pub fn cache_key(id: i64) -> String {
    format!("contact:{id}")
}

impl ContactCache {
    pub fn new(client: Arc<dyn CacheClient>, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    /// A hit owned by someone other than `owner_id` counts as a miss.
    pub async fn get(&self, id: i64, owner_id: i64) -> Option<ContactResponse> {
        let key = cache_key(id);
        let raw = match self.client.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(%key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(%key, error = %e, "cache read failed");
                return None;
            }
        };

        match serde_json::from_slice::<Snapshot>(&raw) {
            Ok(snap) if snap.owner_id == owner_id => {
                debug!(%key, "cache hit");
                Some(snap.contact)
            }
            Ok(_) => {
                debug!(%key, "cache entry belongs to another owner");
                None
            }
            Err(e) => {
                warn!(%key, error = %e, "undecodable cache entry");
                None
            }
        }
    }

    pub async fn put(&self, owner_id: i64, contact: &ContactResponse) {
        let key = cache_key(contact.id);
        let snap = Snapshot {
            owner_id,
            contact: contact.clone(),
        };
        let raw = match serde_json::to_vec(&snap) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%key, error = %e, "cache encode failed");
                return;
            }
        };
        match self.client.set_ex(&key, raw, self.ttl).await {
            Ok(()) => debug!(%key, ttl_secs = self.ttl.as_secs(), "cache populated"),
            Err(e) => {
                // An older snapshot may still be there; drop it so reads go to the store.
                warn!(%key, error = %e, "cache write failed, evicting");
                if let Err(e) = self.client.delete(&key).await {
                    warn!(%key, error = %e, "cache eviction failed");
                }
            }
        }
    }

    pub async fn evict(&self, id: i64) {
        let key = cache_key(id);
        match self.client.delete(&key).await {
            Ok(()) => debug!(%key, "cache evicted"),
            Err(e) => warn!(%key, error = %e, "cache eviction failed"),
        }
    }

    pub async fn close(&self) {
        self.client.close().await;
    }
}
