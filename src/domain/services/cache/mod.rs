//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Read-through TTL cache in front of paginated and single-resource reads.
//
// | Component                | Description                                                |
// |--------------------------|------------------------------------------------------------|
// | CacheStore               | Outbound port to a key/value store with expiry             |
// | CacheKey                 | Deterministic keys: listing:<page>, resource:<id>, ...      |
// | CacheTtls                | Fixed TTL per key family                                   |
// | ReadThroughCache         | get-or-load plus write-path invalidation                   |
//
// A cache outage is never fatal: reads fall back to the loader and invalidations are
// skipped, leaving the TTL as the upper bound on staleness.
//--------------------------------------------------------------------------------------------------

mod read_through;

use async_trait::async_trait;
use std::{fmt, time::Duration};
use thiserror::Error;

pub use read_through::ReadThroughCache;

const LISTING_PREFIX: &str = "listing:";
const RESOURCE_PREFIX: &str = "resource:";
const SEARCH_PREFIX: &str = "search:";

/// Errors returned by a cache store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The cache endpoint cannot be reached
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    /// A cached value could not be (de)serialized
    #[error("Cache value serialization failed: {0}")]
    Serialization(String),

    /// The expiry of an entry cannot be represented
    #[error("Invalid cache TTL: {0}")]
    InvalidTtl(String),
}

/// Outbound port to the cache store
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live value of `key`; expired entries are never returned
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key` for `ttl`
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Returns true if an entry was removed
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes every key starting with `prefix`; returns how many were removed
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
}

/// Key families, each with its own TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Listing,
    Resource,
    Search,
}

/// Cache key; the textual form depends only on the page number, id or query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Listing(u32),
    Resource(String),
    Search(String),
}

impl CacheKey {
    pub fn listing(page: u32) -> Self {
        CacheKey::Listing(page)
    }

    pub fn resource(id: &str) -> Self {
        CacheKey::Resource(id.to_string())
    }

    /// Queries are normalized so equivalent searches share an entry
    pub fn search(query: &str) -> Self {
        let normalized = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");
        CacheKey::Search(normalized)
    }

    pub fn family(&self) -> KeyFamily {
        match self {
            CacheKey::Listing(_) => KeyFamily::Listing,
            CacheKey::Resource(_) => KeyFamily::Resource,
            CacheKey::Search(_) => KeyFamily::Search,
        }
    }

    pub fn family_prefix(family: KeyFamily) -> &'static str {
        match family {
            KeyFamily::Listing => LISTING_PREFIX,
            KeyFamily::Resource => RESOURCE_PREFIX,
            KeyFamily::Search => SEARCH_PREFIX,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Listing(page) => write!(f, "{}{}", LISTING_PREFIX, page),
            CacheKey::Resource(id) => write!(f, "{}{}", RESOURCE_PREFIX, id),
            CacheKey::Search(query) => write!(f, "{}{}", SEARCH_PREFIX, query),
        }
    }
}

/// Fixed TTL per key family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub listing: Duration,
    pub resource: Duration,
    pub search: Duration,
}

impl CacheTtls {
    pub fn for_family(&self, family: KeyFamily) -> Duration {
        match family {
            KeyFamily::Listing => self.listing,
            KeyFamily::Resource => self.resource,
            KeyFamily::Search => self.search,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            listing: Duration::from_secs(300),
            resource: Duration::from_secs(3600),
            search: Duration::from_secs(120),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic() {
        assert_eq!(CacheKey::listing(1).to_string(), "listing:1");
        assert_eq!(CacheKey::resource("p1").to_string(), "resource:p1");
        assert_eq!(
            CacheKey::search("  Rust   LANG ").to_string(),
            "search:rust lang"
        );
        assert_eq!(CacheKey::search("rust lang"), CacheKey::search("RUST lang"));
    }

    #[test]
    fn test_each_family_has_its_own_ttl() {
        let ttls = CacheTtls::default();
        assert_eq!(
            ttls.for_family(CacheKey::listing(3).family()),
            Duration::from_secs(300)
        );
        assert_eq!(
            ttls.for_family(CacheKey::resource("x").family()),
            Duration::from_secs(3600)
        );
        assert_eq!(
            ttls.for_family(CacheKey::search("x").family()),
            Duration::from_secs(120)
        );
    }
}
