//! Content source trait definition.

use async_trait::async_trait;
use blogcache_core::{CacheKey, KeyKind, ListQuery, Result};
use serde_json::Value;

/// The content layer the cache pulls from when warming or refreshing.
///
/// The cache never performs network I/O on its own; every fetch goes
/// through an implementation of this trait injected by the application.
///
/// # Example
///
/// ```ignore
/// use blogcache_engine::ContentSource;
///
/// struct MySource;
///
/// #[async_trait]
/// impl ContentSource for MySource {
///     fn name(&self) -> &str {
///         "my-source"
///     }
///
///     async fn fetch_content_list(&self, query: &ListQuery) -> Result<Value> { ... }
///     async fn fetch_content_item(&self, slug: &str) -> Result<Value> { ... }
///     async fn fetch_categories(&self) -> Result<Value> { ... }
/// }
/// ```
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Returns the name of this source, for logs.
    fn name(&self) -> &str;

    /// Fetches one page of a content list.
    ///
    /// # Errors
    ///
    /// `CacheError::FetchFailure` when the backend cannot answer.
    async fn fetch_content_list(&self, query: &ListQuery) -> Result<Value>;

    /// Fetches a single content item by slug.
    async fn fetch_content_item(&self, slug: &str) -> Result<Value>;

    /// Fetches the category listing.
    async fn fetch_categories(&self) -> Result<Value>;
}

/// Dispatches a key to the matching fetch call.
pub async fn fetch_for_key(source: &dyn ContentSource, key: &CacheKey) -> Result<Value> {
    match key.kind() {
        KeyKind::Posts(query) => source.fetch_content_list(query).await,
        KeyKind::Post { slug } => source.fetch_content_item(slug).await,
        KeyKind::Categories => source.fetch_categories().await,
        KeyKind::Search { term, page, limit } => {
            let query = ListQuery::new(*page, *limit).with_search(term);
            source.fetch_content_list(&query).await
        },
    }
}
