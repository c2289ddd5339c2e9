use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::{cache::Cache, AppError};

const LINK_PREFIX: &str = "activation:";
const EMAIL_PREFIX: &str = "activation-email:";

/// Registration awaiting email confirmation. Lives only in the cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingRegistration {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

fn link_key(link: &str) -> String {
    format!("{}{}", LINK_PREFIX, link)
}

fn email_key(email: &str) -> String {
    format!("{}{}", EMAIL_PREFIX, email)
}

/// Stores the pending record under a fresh link and returns the link.
/// A previous link for the same email stops working.
pub async fn stash(cache: &dyn Cache, pending: &PendingRegistration, ttl_secs: u64) -> Result<String, AppError> {
    if let Some(previous) = cache.get(&email_key(&pending.email)).await? {
        cache.delete(&link_key(&previous)).await?;
        log::info!("🔁 Replacing pending activation for {}", pending.email);
    }

    let link = Uuid::new_v4().to_string();
    let payload = serde_json::to_string(pending)?;

    cache.set_ex(&link_key(&link), &payload, ttl_secs).await?;
    cache.set_ex(&email_key(&pending.email), &link, ttl_secs).await?;

    Ok(link)
}

/// Consumes a link. `None` when unknown, expired or already used.
pub async fn take(cache: &dyn Cache, link: &str) -> Result<Option<PendingRegistration>, AppError> {
    let Some(payload) = cache.take(&link_key(link)).await? else {
        return Ok(None);
    };

    let pending: PendingRegistration = serde_json::from_str(&payload)?;
    cache.delete(&email_key(&pending.email)).await?;

    Ok(Some(pending))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::cache::MemoryCache;

    fn pending(email: &str) -> PendingRegistration {
        PendingRegistration {
            email: email.to_string(),
            name: "Cook".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_link_is_single_use() {
        let cache = MemoryCache::new();
        let record = pending("cook@example.com");
        let link = stash(&cache, &record, 60).await.unwrap();

        assert!(cache.exists(&email_key("cook@example.com")).await.unwrap());
        assert_eq!(take(&cache, &link).await.unwrap(), Some(record));
        assert_eq!(take(&cache, &link).await.unwrap(), None);
        assert!(!cache.exists(&email_key("cook@example.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_reregistration_replaces_link() {
        let cache = MemoryCache::new();
        let first = stash(&cache, &pending("cook@example.com"), 60).await.unwrap();
        let second = stash(&cache, &pending("cook@example.com"), 60).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(take(&cache, &first).await.unwrap(), None);
        assert!(take(&cache, &second).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_link_expires() {
        let cache = MemoryCache::new();
        let link = stash(&cache, &pending("late@example.com"), 1).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert_eq!(take(&cache, &link).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_link() {
        let cache = MemoryCache::new();
        assert_eq!(take(&cache, "not-a-link").await.unwrap(), None);
    }
}
