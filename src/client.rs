use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed query request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("feed query endpoint returned status {0}")]
    Status(u16),
}

/// A single feed item as returned by the backend query endpoint.
///
/// Upstream RSS sources disagree on identifiers, so there is no stable
/// primary key; `source_url` and `title` are the only fields reliable
/// enough to deduplicate on, and either may be missing. Everything else
/// is opaque display payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Article {
    /// Key used to decide whether two articles are the same underlying item:
    /// trimmed, lower-cased `source_url`, falling back to the title under the
    /// same rule. `None` means the article can never collide with another.
    pub fn dedup_key(&self) -> Option<String> {
        normalize(self.source_url.as_deref()).or_else(|| normalize(self.title.as_deref()))
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// One page of query results plus the continuation token for the next one.
/// A missing token means the result set is exhausted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    #[serde(default)]
    pub articles: Vec<Article>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// The effective query parameters of one feed view: free-text search
/// (empty = no text filter), category constraint (empty = unconstrained),
/// and language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedQuery {
    pub search: String,
    pub categories: BTreeSet<String>,
    pub language: String,
}

impl FeedQuery {
    pub fn new(
        search: impl Into<String>,
        categories: BTreeSet<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            search: search.into(),
            categories,
            language: language.into(),
        }
    }

    /// Comma-joined category list for the wire, or `None` when unconstrained.
    pub fn category_param(&self) -> Option<String> {
        if self.categories.is_empty() {
            None
        } else {
            Some(
                self.categories
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            )
        }
    }
}

/// Seam between the aggregator and the backend query endpoint.
///
/// The aggregator only ever asks for one page at a time; everything about
/// merging, deduplication, and pagination state lives above this trait.
pub trait FeedBackend: Send + Sync {
    fn fetch_page(
        &self,
        query: &FeedQuery,
        cursor: Option<&str>,
        limit: u32,
    ) -> impl Future<Output = Result<FeedPage, FeedError>> + Send;
}

/// `reqwest`-backed implementation talking to the intranet query API.
pub struct HttpBackend {
    client: Client,
    query_url: String,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("PulseFeed/1.0 (Intranet News)")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            query_url: config.query_url.clone(),
        }
    }
}

impl FeedBackend for HttpBackend {
    async fn fetch_page(
        &self,
        query: &FeedQuery,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<FeedPage, FeedError> {
        let mut params: Vec<(&str, String)> = vec![
            ("lang", query.language.clone()),
            ("limit", limit.to_string()),
        ];
        if !query.search.is_empty() {
            params.push(("q", query.search.clone()));
        }
        if let Some(categories) = query.category_param() {
            params.push(("categories", categories));
        }
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }

        let response = self
            .client
            .get(&self.query_url)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let page = response.json::<FeedPage>().await?;
        debug!(
            articles = page.articles.len(),
            has_cursor = page.next_cursor.is_some(),
            "fetched feed page"
        );
        Ok(page)
    }
}
