use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;

use crate::utils::error::AppError;

/// Outcome of a single upstream attempt made with one key.
#[derive(Debug)]
pub enum KeyAttemptError {
    /// The upstream refused the key (expired or exhausted). The key is
    /// retired and the call retried with the next one.
    KeyRejected(String),
    /// Any other failure. Returned to the caller as is.
    Failed(AppError),
}

impl From<AppError> for KeyAttemptError {
    fn from(e: AppError) -> Self {
        KeyAttemptError::Failed(e)
    }
}

/// Round-robin pool of upstream API keys.
///
/// `next_key` hands out the head key and cycles it to the tail. A rejected
/// key is dropped instead of recycled. The queue is guarded by a mutex that
/// is never held across an `.await`.
pub struct ApiKeyRotator {
    keys: Mutex<VecDeque<String>>,
}

impl ApiKeyRotator {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queue = VecDeque::new();
        for key in keys {
            let key = key.into().trim().to_string();
            if !key.is_empty() && !queue.contains(&key) {
                queue.push_back(key);
            }
        }
        Self { keys: Mutex::new(queue) }
    }

    pub fn len(&self) -> usize {
        self.keys.lock().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_key(&self) -> Option<String> {
        let mut keys = self.keys.lock().ok()?;
        let key = keys.pop_front()?;
        keys.push_back(key.clone());
        Some(key)
    }

    /// Removes `key` from the rotation. Returns false if it was already gone.
    pub fn retire(&self, key: &str) -> bool {
        match self.keys.lock() {
            Ok(mut keys) => {
                let before = keys.len();
                keys.retain(|k| k != key);
                before != keys.len()
            }
            Err(_) => false,
        }
    }

    /// Runs `attempt` with successive keys until one is accepted.
    ///
    /// At most as many attempts as there were keys when the call started.
    pub async fn call_with_rotation<T, F, Fut>(&self, mut attempt: F) -> Result<T, AppError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, KeyAttemptError>>,
    {
        let attempts = self.len();
        if attempts == 0 {
            return Err(AppError::Upstream("No upstream API keys available".to_string()));
        }

        for _ in 0..attempts {
            let key = match self.next_key() {
                Some(key) => key,
                None => break,
            };

            match attempt(key.clone()).await {
                Ok(value) => return Ok(value),
                Err(KeyAttemptError::KeyRejected(reason)) => {
                    self.retire(&key);
                    log::warn!(
                        "🔑 Upstream rejected API key ...{} ({}); {} key(s) left",
                        key_suffix(&key),
                        reason,
                        self.len()
                    );
                }
                Err(KeyAttemptError::Failed(e)) => return Err(e),
            }
        }

        Err(AppError::Upstream("No upstream API keys available".to_string()))
    }
}

fn key_suffix(key: &str) -> &str {
    let start = key.len().saturating_sub(4);
    key.get(start..).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_round_robin_order() {
        let rotator = ApiKeyRotator::new(["k1", "k2", "k3"]);
        let seen: Vec<String> = (0..4).filter_map(|_| rotator.next_key()).collect();
        assert_eq!(seen, vec!["k1", "k2", "k3", "k1"]);
    }

    #[test]
    fn test_blank_and_duplicate_keys_are_ignored() {
        let rotator = ApiKeyRotator::new(vec![" k1 ".to_string(), "".into(), "k1".into(), "k2".into()]);
        assert_eq!(rotator.len(), 2);
    }

    #[test]
    fn test_retire() {
        let rotator = ApiKeyRotator::new(["k1", "k2"]);
        assert!(rotator.retire("k1"));
        assert!(!rotator.retire("k1"));
        assert_eq!(rotator.next_key(), Some("k2".to_string()));
        assert_eq!(rotator.next_key(), Some("k2".to_string()));
    }

    #[tokio::test]
    async fn test_rejected_key_is_dropped_and_next_key_used() {
        let rotator = ApiKeyRotator::new(["expired", "good"]);
        let result = rotator
            .call_with_rotation(|key| async move {
                if key == "expired" {
                    Err(KeyAttemptError::KeyRejected("404".into()))
                } else {
                    Ok(format!("served by {}", key))
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "served by good");
        assert_eq!(rotator.len(), 1);
        assert_eq!(rotator.next_key(), Some("good".to_string()));
    }

    #[tokio::test]
    async fn test_all_keys_rejected() {
        let rotator = ApiKeyRotator::new(["a", "b"]);
        let result: Result<(), AppError> = rotator
            .call_with_rotation(|_| async { Err(KeyAttemptError::KeyRejected("404".into())) })
            .await;

        assert!(matches!(result, Err(AppError::Upstream(_))));
        assert!(rotator.is_empty());
    }

    #[tokio::test]
    async fn test_other_failures_keep_the_key() {
        let rotator = ApiKeyRotator::new(["a", "b"]);
        let result: Result<(), AppError> = rotator
            .call_with_rotation(|_| async { Err(KeyAttemptError::Failed(AppError::Upstream("timeout".into()))) })
            .await;

        assert!(matches!(result, Err(AppError::Upstream(msg)) if msg == "timeout"));
        assert_eq!(rotator.len(), 2);
    }

    #[tokio::test]
    async fn test_no_keys() {
        let rotator = ApiKeyRotator::new(Vec::<String>::new());
        let result: Result<(), AppError> = rotator.call_with_rotation(|_| async { Ok(()) }).await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_concurrent_rotation_hands_out_every_key() {
        let rotator = Arc::new(ApiKeyRotator::new(["k1", "k2", "k3", "k4"]));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let r = Arc::clone(&rotator);
            handles.push(tokio::spawn(async move { r.next_key().unwrap() }));
        }
        let mut keys = Vec::new();
        for h in handles {
            keys.push(h.await.unwrap());
        }
        for k in ["k1", "k2", "k3", "k4"] {
            assert_eq!(keys.iter().filter(|x| x.as_str() == k).count(), 2);
        }
        assert_eq!(rotator.len(), 4);
    }
}
