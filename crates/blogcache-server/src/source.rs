//! Content source backed by a directory of JSON post files.
//!
//! Each `*.json` file holds one `{"post": {...}}` document. Posts are
//! loaded once and kept sorted by `publishedAt`, newest first.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use blogcache_core::{CacheError, ListQuery, Result};
use blogcache_engine::ContentSource;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

/// Search terms shorter than this match nothing.
const MIN_SEARCH_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Category {
    name: String,
    slug: String,
}

#[derive(Debug, Clone)]
struct StaticPost {
    slug: String,
    published_at: String,
    category: Option<Category>,
    /// Lowercased title, excerpt and content.
    haystack: String,
    document: Value,
}

impl StaticPost {
    fn from_document(document: Value) -> Option<Self> {
        let post = document.get("post")?.as_object()?;
        let slug = text(post, "slug");
        if slug.is_empty() {
            return None;
        }

        let published_at = post
            .get("publishedAt")
            .or_else(|| post.get("createdAt"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let haystack = ["title", "excerpt", "content"]
            .iter()
            .map(|field| text(post, field).to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");

        Some(Self {
            slug,
            published_at,
            category: post.get("category").and_then(parse_category),
            haystack,
            document: Value::Object(post.clone()),
        })
    }

    fn in_category(&self, wanted: &str) -> bool {
        let wanted = slugify(wanted);
        self.category
            .as_ref()
            .is_some_and(|c| c.slug == wanted || slugify(&c.name) == wanted)
    }

    fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.chars().count() < MIN_SEARCH_LEN {
            return false;
        }
        // keys store spaces as '-'
        self.haystack.contains(&term) || self.haystack.contains(&term.replace('-', " "))
    }
}

fn text(post: &Map<String, Value>, field: &str) -> String {
    post.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_category(value: &Value) -> Option<Category> {
    let (name, slug) = match value {
        Value::String(name) => (name.clone(), None),
        Value::Object(obj) => (
            obj.get("name")?.as_str()?.to_string(),
            obj.get("slug").and_then(Value::as_str).map(str::to_string),
        ),
        _ => return None,
    };
    let slug = slug.unwrap_or_else(|| slugify(&name));
    Some(Category { name, slug })
}

fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// [`ContentSource`] over posts read from disk.
#[derive(Debug, Default)]
pub struct StaticContentSource {
    posts: Vec<StaticPost>,
}

impl StaticContentSource {
    /// Reads every `*.json` file in `dir`. Unreadable or malformed files
    /// are skipped with a warning.
    pub fn load(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        let mut documents = Vec::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|e| e.to_string()));
            match parsed {
                Ok(document) => documents.push(document),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping post file"),
            }
        }

        let source = Self::from_documents(documents);
        info!(dir = %dir.display(), posts = source.len(), "Static content loaded");
        Ok(source)
    }

    /// Builds a source from in-memory `{"post": {...}}` documents.
    pub fn from_documents(documents: impl IntoIterator<Item = Value>) -> Self {
        let mut posts: Vec<StaticPost> = documents
            .into_iter()
            .filter_map(|document| {
                let post = StaticPost::from_document(document);
                if post.is_none() {
                    debug!("Ignoring document without a post slug");
                }
                post
            })
            .collect();

        posts.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.slug.cmp(&b.slug))
        });
        Self { posts }
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

#[async_trait]
impl ContentSource for StaticContentSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_content_list(&self, query: &ListQuery) -> Result<Value> {
        let filtered: Vec<&StaticPost> = self
            .posts
            .iter()
            .filter(|post| {
                query
                    .category
                    .as_deref()
                    .is_none_or(|category| post.in_category(category))
            })
            .filter(|post| {
                query
                    .search
                    .as_deref()
                    .is_none_or(|term| post.matches_search(term))
            })
            .collect();

        let page = query.page.max(1) as usize;
        let limit = query.limit.max(1) as usize;
        let total = filtered.len();
        let total_pages = total.div_ceil(limit);

        let posts: Vec<Value> = filtered
            .iter()
            .skip((page - 1) * limit)
            .take(limit)
            .map(|post| post.document.clone())
            .collect();

        let mut body = json!({
            "posts": posts,
            "pagination": {
                "page": page,
                "limit": limit,
                "total": total,
                "totalPages": total_pages,
                "hasNext": page < total_pages,
                "hasPrev": page > 1,
            },
        });
        if let Some(search) = &query.search {
            body["query"] = json!(search);
        }
        if let Some(category) = &query.category {
            body["category"] = json!(category);
        }
        Ok(body)
    }

    async fn fetch_content_item(&self, slug: &str) -> Result<Value> {
        self.posts
            .iter()
            .find(|post| post.slug == slug)
            .map(|post| json!({ "post": post.document }))
            .ok_or_else(|| CacheError::fetch_failure(format!("post:{slug}"), "post not found"))
    }

    async fn fetch_categories(&self) -> Result<Value> {
        let mut counts: BTreeMap<String, (String, usize)> = BTreeMap::new();
        for category in self.posts.iter().filter_map(|post| post.category.as_ref()) {
            counts
                .entry(category.slug.clone())
                .or_insert_with(|| (category.name.clone(), 0))
                .1 += 1;
        }

        let mut categories: Vec<(String, String, usize)> = counts
            .into_iter()
            .map(|(slug, (name, count))| (name, slug, count))
            .collect();
        categories.sort();

        let categories: Vec<Value> = categories
            .into_iter()
            .map(|(name, slug, count)| json!({ "name": name, "slug": slug, "postCount": count }))
            .collect();
        Ok(json!({ "categories": categories }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(slug: &str, published: &str, category: Value, title: &str) -> Value {
        json!({
            "post": {
                "slug": slug,
                "title": title,
                "excerpt": "",
                "content": format!("Body of {slug}"),
                "publishedAt": published,
                "category": category,
            }
        })
    }

    fn source() -> StaticContentSource {
        StaticContentSource::from_documents([
            post("old", "2024-01-01T00:00:00Z", json!("Design"), "SketchUp basics"),
            post(
                "new",
                "2024-03-01T00:00:00Z",
                json!({"name": "Business Intelligence", "slug": "business-intelligence"}),
                "Power BI dashboards",
            ),
            post("mid", "2024-02-01T00:00:00Z", json!("design"), "Enscape lighting"),
            json!({"unrelated": true}),
        ])
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paginated() {
        let source = source();
        assert_eq!(source.len(), 3);

        let page = source
            .fetch_content_list(&ListQuery::new(1, 2))
            .await
            .unwrap();
        let slugs: Vec<&str> = page["posts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["slug"].as_str().unwrap())
            .collect();
        assert_eq!(slugs, vec!["new", "mid"]);
        assert_eq!(page["pagination"]["totalPages"], 2);
        assert_eq!(page["pagination"]["hasNext"], true);

        let last = source
            .fetch_content_list(&ListQuery::new(2, 2))
            .await
            .unwrap();
        assert_eq!(last["posts"][0]["slug"], "old");
        assert_eq!(last["pagination"]["hasPrev"], true);
    }

    #[tokio::test]
    async fn test_category_and_search_filters() {
        let source = source();

        let design = source
            .fetch_content_list(&ListQuery::new(1, 10).with_category("Design"))
            .await
            .unwrap();
        assert_eq!(design["pagination"]["total"], 2);

        let bi = source
            .fetch_content_list(&ListQuery::new(1, 10).with_category("business_intelligence"))
            .await
            .unwrap();
        assert_eq!(bi["posts"][0]["slug"], "new");

        let search = source
            .fetch_content_list(&ListQuery::new(1, 10).with_search("power bi"))
            .await
            .unwrap();
        assert_eq!(search["pagination"]["total"], 1);
        assert_eq!(search["query"], "power-bi");

        let too_short = source
            .fetch_content_list(&ListQuery::new(1, 10).with_search("x"))
            .await
            .unwrap();
        assert_eq!(too_short["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn test_item_lookup() {
        let source = source();

        let item = source.fetch_content_item("mid").await.unwrap();
        assert_eq!(item["post"]["title"], "Enscape lighting");

        let err = source.fetch_content_item("missing").await.unwrap_err();
        assert!(matches!(err, CacheError::FetchFailure { .. }));
    }

    #[tokio::test]
    async fn test_categories_are_aggregated() {
        let categories = source().fetch_categories().await.unwrap();
        let list = categories["categories"].as_array().unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["slug"], "business-intelligence");
        assert_eq!(list[0]["postCount"], 1);
        assert_eq!(list[1]["slug"], "design");
        assert_eq!(list[1]["postCount"], 2);
    }

    #[test]
    fn test_load_skips_bad_files() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(
            dir.path().join("intro.json"),
            post("intro", "2024-01-01", json!("Design"), "Intro").to_string(),
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = StaticContentSource::load(dir.path()).unwrap();
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Business Intelligence"), "business-intelligence");
        assert_eq!(slugify("  Design & 3D "), "design-3d");
    }
}
