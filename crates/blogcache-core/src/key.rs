//! Canonical cache key encoding.
//!
//! Every key is `<contentType>:<positional-params-joined-by-underscore>`.
//! Keys must be built through this module so that prefix scans and tag
//! extraction can rely on the positions.
//!
//! ```
//! use blogcache_core::{CacheKey, ListQuery};
//!
//! let key = CacheKey::posts(ListQuery::new(1, 10));
//! assert_eq!(key.to_string(), "posts:1_10_null_null");
//!
//! let key = CacheKey::post("My Slug");
//! assert_eq!(key.as_str(), "post:my-slug");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

const NULL: &str = "null";
const SEPARATOR: char = '_';

/// Domain content types; each owns one key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// A paginated content list.
    Posts,
    /// A single content item.
    Post,
    /// The category listing.
    Categories,
    /// Search results.
    Search,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Posts,
        ContentType::Post,
        ContentType::Categories,
        ContentType::Search,
    ];

    /// Query types that may contain a copy of a single item.
    pub const LISTS: [ContentType; 2] = [ContentType::Posts, ContentType::Search];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Posts => "posts",
            ContentType::Post => "post",
            ContentType::Categories => "categories",
            ContentType::Search => "search",
        }
    }

    /// Prefix including the separator, so `post:` never matches `posts:`.
    pub fn key_prefix(&self) -> String {
        format!("{}:", self.as_str())
    }

    /// Returns true if `raw` starts with this type's prefix.
    pub fn matches(&self, raw: &str) -> bool {
        raw.strip_prefix(self.as_str())
            .is_some_and(|rest| rest.starts_with(':'))
    }

    /// Content type owning a raw storage key, if any.
    pub fn of(raw: &str) -> Option<ContentType> {
        Self::ALL.into_iter().find(|ct| ct.matches(raw))
    }

    /// Returns true if a raw storage key belongs to the cache namespace.
    pub fn owns(raw: &str) -> bool {
        Self::of(raw).is_some()
    }

    /// Returns true for the list-like types.
    pub fn is_list(&self) -> bool {
        Self::LISTS.contains(self)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "posts" => Ok(ContentType::Posts),
            "post" => Ok(ContentType::Post),
            "categories" => Ok(ContentType::Categories),
            "search" => Ok(ContentType::Search),
            other => Err(CacheError::invalid_key(other, "unknown content type")),
        }
    }
}

/// Parameters of a content list query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

impl ListQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            category: None,
            search: None,
        }
    }

    pub fn with_category(mut self, category: impl AsRef<str>) -> Self {
        self.category = normalize_optional(category.as_ref());
        self
    }

    pub fn with_search(mut self, search: impl AsRef<str>) -> Self {
        self.search = normalize_optional(search.as_ref());
        self
    }

    fn normalized(self) -> Self {
        Self {
            page: self.page,
            limit: self.limit,
            category: self.category.as_deref().and_then(normalize_optional),
            search: self.search.as_deref().and_then(normalize_optional),
        }
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

/// Structured form of a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Posts(ListQuery),
    Post { slug: String },
    Categories,
    Search { term: String, page: u32, limit: u32 },
}

/// A canonical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey {
    kind: KeyKind,
    encoded: String,
}

impl CacheKey {
    /// Key for a content list page.
    pub fn posts(query: ListQuery) -> Self {
        Self::from_kind(KeyKind::Posts(query.normalized()))
    }

    /// Key for a single content item.
    pub fn post(slug: impl AsRef<str>) -> Self {
        Self::from_kind(KeyKind::Post {
            slug: normalize(slug.as_ref()),
        })
    }

    /// Key for the category listing.
    pub fn categories() -> Self {
        Self::from_kind(KeyKind::Categories)
    }

    /// Key for a search result page.
    pub fn search(term: impl AsRef<str>, page: u32, limit: u32) -> Self {
        Self::from_kind(KeyKind::Search {
            term: normalize(term.as_ref()),
            page,
            limit,
        })
    }

    fn from_kind(kind: KeyKind) -> Self {
        let encoded = encode(&kind);
        Self { kind, encoded }
    }

    /// Parses a raw key produced by [`CacheKey`]'s `Display`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (prefix, rest) = raw
            .split_once(':')
            .ok_or_else(|| CacheError::invalid_key(raw, "missing ':' separator"))?;
        let content_type: ContentType = prefix
            .parse()
            .map_err(|_| CacheError::invalid_key(raw, "unknown content type prefix"))?;

        let kind = match content_type {
            ContentType::Posts => {
                let parts: Vec<&str> = rest.split(SEPARATOR).collect();
                let [page, limit, category, search] = parts.as_slice() else {
                    return Err(CacheError::invalid_key(raw, "expected 4 list parameters"));
                };
                KeyKind::Posts(ListQuery {
                    page: parse_number(raw, page)?,
                    limit: parse_number(raw, limit)?,
                    category: decode_optional(category),
                    search: decode_optional(search),
                })
            },
            ContentType::Post => {
                if rest.is_empty() || rest.contains(SEPARATOR) {
                    return Err(CacheError::invalid_key(raw, "invalid slug"));
                }
                KeyKind::Post {
                    slug: rest.to_string(),
                }
            },
            ContentType::Categories => {
                if rest != "all" {
                    return Err(CacheError::invalid_key(raw, "expected 'categories:all'"));
                }
                KeyKind::Categories
            },
            ContentType::Search => {
                let parts: Vec<&str> = rest.split(SEPARATOR).collect();
                let [term, page, limit] = parts.as_slice() else {
                    return Err(CacheError::invalid_key(raw, "expected 3 search parameters"));
                };
                if term.is_empty() {
                    return Err(CacheError::invalid_key(raw, "empty search term"));
                }
                KeyKind::Search {
                    term: term.to_string(),
                    page: parse_number(raw, page)?,
                    limit: parse_number(raw, limit)?,
                }
            },
        };

        let key = Self::from_kind(kind);
        if key.encoded != raw {
            return Err(CacheError::invalid_key(raw, "key is not in canonical form"));
        }
        Ok(key)
    }

    pub fn kind(&self) -> &KeyKind {
        &self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn content_type(&self) -> ContentType {
        match self.kind {
            KeyKind::Posts(_) => ContentType::Posts,
            KeyKind::Post { .. } => ContentType::Post,
            KeyKind::Categories => ContentType::Categories,
            KeyKind::Search { .. } => ContentType::Search,
        }
    }

    /// Slug of a single-item key.
    pub fn slug(&self) -> Option<&str> {
        match &self.kind {
            KeyKind::Post { slug } => Some(slug),
            _ => None,
        }
    }

    /// Tags derived from the positional parameters.
    pub fn tags(&self) -> Vec<String> {
        match &self.kind {
            KeyKind::Posts(query) => {
                let mut tags = Vec::new();
                if let Some(category) = &query.category {
                    tags.push(format!("category:{category}"));
                }
                if let Some(search) = &query.search {
                    tags.push(format!("search:{search}"));
                }
                tags
            },
            KeyKind::Post { slug } => vec![format!("slug:{slug}")],
            KeyKind::Categories => Vec::new(),
            KeyKind::Search { term, .. } => vec![format!("search:{term}")],
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.encoded
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.encoded
    }
}

fn encode(kind: &KeyKind) -> String {
    match kind {
        KeyKind::Posts(q) => format!(
            "posts:{}_{}_{}_{}",
            q.page,
            q.limit,
            q.category.as_deref().unwrap_or(NULL),
            q.search.as_deref().unwrap_or(NULL)
        ),
        KeyKind::Post { slug } => format!("post:{slug}"),
        KeyKind::Categories => "categories:all".to_string(),
        KeyKind::Search { term, page, limit } => format!("search:{term}_{page}_{limit}"),
    }
}

/// Lowercases and replaces characters that would break positional decoding.
fn normalize(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            '_' | ':' => '-',
            c if c.is_whitespace() => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect::<String>()
        .to_lowercase()
}

fn normalize_optional(value: &str) -> Option<String> {
    let normalized = normalize(value);
    (!normalized.is_empty() && normalized != NULL).then_some(normalized)
}

fn decode_optional(part: &str) -> Option<String> {
    (part != NULL && !part.is_empty()).then(|| part.to_string())
}

fn parse_number(raw: &str, part: &str) -> Result<u32> {
    part.parse()
        .map_err(|_| CacheError::invalid_key(raw, format!("'{part}' is not a number")))
}
