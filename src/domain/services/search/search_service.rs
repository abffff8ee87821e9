use std::sync::Arc;

use tracing::debug;

use crate::domain::models::types::SearchDocument;
use crate::domain::services::cache::{CacheKey, ReadThroughCache};
use crate::domain::services::store::{DocumentFilter, DocumentStore, StoreError};

/// Number of results returned when the caller does not ask for a limit
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

// Upper bound on matches kept per cached query.
const MAX_CACHED_MATCHES: u32 = 100;

/// Term search over the projection
///
/// The full (bounded) match list of a query is cached under `search:<query>`, so
/// different limits share one entry.
pub struct SearchService {
    documents: Arc<dyn DocumentStore<SearchDocument>>,
    cache: ReadThroughCache,
}

impl SearchService {
    pub fn new(documents: Arc<dyn DocumentStore<SearchDocument>>, cache: ReadThroughCache) -> Self {
        Self { documents, cache }
    }

    /// Newest-first documents whose text contains any term of `query`, ignoring case
    ///
    /// # Arguments
    /// * `query` - Whitespace separated terms; a blank query matches nothing
    /// * `limit` - Maximum number of results, `DEFAULT_SEARCH_LIMIT` when None
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchDocument>, StoreError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let key = CacheKey::search(query);

        let mut matches: Vec<SearchDocument> = self
            .cache
            .get_or_load(&key, || async move {
                self.documents
                    .find(
                        &DocumentFilter::Text(query.to_string()),
                        1,
                        MAX_CACHED_MATCHES,
                    )
                    .await
            })
            .await?;

        debug!(query, found = matches.len(), "search executed");
        matches.truncate(limit);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::services::cache::CacheTtls;
    use crate::outbounds::in_memory_cache::InMemoryCacheStore;
    use crate::outbounds::in_memory_store::InMemoryDocumentStore;
    use chrono::{Duration, Utc};

    async fn service_with(texts: &[&str]) -> (SearchService, Arc<InMemoryCacheStore>) {
        let documents = Arc::new(InMemoryDocumentStore::<SearchDocument>::new());
        let now = Utc::now();
        for (i, text) in texts.iter().enumerate() {
            documents
                .save(SearchDocument {
                    content_id: format!("p{}", i),
                    owner_id: "u1".to_string(),
                    text: text.to_string(),
                    created_at: now + Duration::seconds(i as i64),
                })
                .await
                .unwrap();
        }
        let cache_store = Arc::new(InMemoryCacheStore::new(Arc::new(ManualClock::default())));
        let service = SearchService::new(
            documents,
            ReadThroughCache::new(cache_store.clone(), CacheTtls::default()),
        );
        (service, cache_store)
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_newest_first() {
        let (service, cache_store) = service_with(&["Rust tips", "more rust", "go"]).await;

        let found = service.search("RUST", None).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|d| d.content_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p0"]);
        assert!(cache_store.contains("search:rust"));
    }

    #[tokio::test]
    async fn test_default_limit_is_ten() {
        let texts = vec!["post"; 15];
        let (service, _) = service_with(&texts).await;

        assert_eq!(service.search("post", None).await.unwrap().len(), 10);
        assert_eq!(service.search("post", Some(3)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_blank_query_matches_nothing() {
        let (service, cache_store) = service_with(&["anything"]).await;
        assert!(service.search("   ", None).await.unwrap().is_empty());
        assert!(cache_store.keys().is_empty());
    }
}
