use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;

use crate::utils::cache::Cache;
use crate::utils::error::AppError;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

/// `?page=&limit=` query parameters (1-based page).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PageQuery {
    pub fn new(page: u64, limit: u64) -> Self {
        Self { page: Some(page), limit: Some(limit) }
    }

    pub fn page(&self) -> u64 {
        self.page.unwrap_or(DEFAULT_PAGE).max(1)
    }

    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Saturates for absurd `?page=` values (such a page is simply empty).
    /// Capped at `i64::MAX`, the largest skip MongoDB accepts.
    pub fn skip(&self) -> u64 {
        (self.page() - 1)
            .saturating_mul(self.limit())
            .min(i64::MAX as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, query: &PageQuery, total: u64) -> Self {
        let limit = query.limit();
        let page = query.page();
        let total_pages = total.div_ceil(limit);
        Self {
            items,
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
        }
    }
}

/// Pages an in-memory list with the same math as a store query.
pub fn paginate_slice<T>(items: Vec<T>, query: &PageQuery) -> Page<T> {
    let total = items.len() as u64;
    let skip = usize::try_from(query.skip()).unwrap_or(usize::MAX);
    let items = items
        .into_iter()
        .skip(skip)
        .take(query.limit() as usize)
        .collect();
    Page::new(items, query, total)
}

/// `"{prefix}:{part}:{part}..."`
pub fn page_cache_key(prefix: &str, parts: &[&str]) -> String {
    let mut key = prefix.to_string();
    for part in parts {
        key.push(':');
        key.push_str(part);
    }
    key
}

/// Cache-aside for a page: serve from the cache on hit, otherwise run the
/// loader and store its result for `ttl_secs`. Cache failures fall back to
/// the loader.
pub async fn cached_page<T, F, Fut>(
    cache: &dyn Cache,
    key: &str,
    ttl_secs: u64,
    loader: F,
) -> Result<Page<T>, AppError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Page<T>, AppError>>,
{
    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str::<Page<T>>(&raw) {
            Ok(page) => {
                log::debug!("📦 Page cache hit: {}", key);
                return Ok(page);
            }
            Err(e) => log::warn!("⚠️ Discarding unreadable cached page {}: {}", key, e),
        },
        Ok(None) => {}
        Err(e) => log::warn!("⚠️ Page cache read failed for {}: {}", key, e),
    }

    let page = loader().await?;

    match serde_json::to_string(&page) {
        Ok(raw) => {
            if let Err(e) = cache.set_ex(key, &raw, ttl_secs).await {
                log::warn!("⚠️ Page cache write failed for {}: {}", key, e);
            }
        }
        Err(e) => log::warn!("⚠️ Could not serialize page {}: {}", key, e),
    }

    Ok(page)
}

/// Drops every cached page under `prefix`. Best-effort: failures are logged.
pub async fn invalidate(cache: &dyn Cache, prefix: &str) {
    let pattern = format!("{}*", prefix);
    if let Err(e) = cache.delete_pattern(&pattern).await {
        log::warn!("⚠️ Cache invalidation failed for {}: {}", pattern, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::cache::MemoryCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_page_query_defaults_and_clamping() {
        let q = PageQuery { page: None, limit: None };
        assert_eq!(q.page(), 1);
        assert_eq!(q.limit(), 10);
        assert_eq!(q.skip(), 0);

        let q = PageQuery { page: Some(0), limit: Some(0) };
        assert_eq!(q.page(), 1);
        assert_eq!(q.limit(), 1);

        let q = PageQuery { page: Some(3), limit: Some(500) };
        assert_eq!(q.limit(), MAX_LIMIT);
        assert_eq!(q.skip(), 200);
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let q = PageQuery { page: Some(u64::MAX), limit: Some(10) };
        assert_eq!(q.skip(), i64::MAX as u64);

        let page = paginate_slice(vec![1, 2, 3], &PageQuery { page: Some(u64::MAX / 2), limit: Some(100) });
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
        assert!(!page.has_next);
    }

    #[test]
    fn test_page_math() {
        let page: Page<u32> = Page::new(vec![], &PageQuery::new(2, 10), 25);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);

        let last: Page<u32> = Page::new(vec![], &PageQuery::new(3, 10), 25);
        assert!(!last.has_next);

        let empty: Page<u32> = Page::new(vec![], &PageQuery::new(1, 10), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }

    #[test]
    fn test_paginate_slice() {
        let items: Vec<u32> = (1..=25).collect();

        let page = paginate_slice(items.clone(), &PageQuery::new(3, 10));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);
        assert!(!page.has_next);

        let past_end = paginate_slice(items, &PageQuery::new(9, 10));
        assert!(past_end.items.is_empty());
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn test_page_cache_key() {
        assert_eq!(page_cache_key("recipes:list", &["1", "10"]), "recipes:list:1:10");
        assert_eq!(page_cache_key("recipes", &[]), "recipes");
    }

    #[tokio::test]
    async fn test_cached_page_hit_and_invalidate() {
        let cache = MemoryCache::new();
        let calls = AtomicUsize::new(0);
        let query = PageQuery::new(1, 2);

        let load = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Page::new(vec!["a".to_string(), "b".to_string()], &query, 5))
        };

        let first = cached_page(&cache, "recipes:list:1:2", 60, load).await.unwrap();
        let second = cached_page(&cache, "recipes:list:1:2", 60, load).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        invalidate(&cache, "recipes:").await;
        cached_page(&cache, "recipes:list:1:2", 60, load).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_page_loader_error_is_not_cached() {
        let cache = MemoryCache::new();
        let result: Result<Page<String>, AppError> =
            cached_page(&cache, "k", 60, || async { Err(AppError::NotFound("nope".into())) }).await;
        assert!(result.is_err());
        assert!(!cache.exists("k").await.unwrap());
    }
}
