use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::client::FeedError;
use crate::config::Config;

pub const DEFAULT_LANGUAGE: &str = "en";

/// A user's durable feed configuration, created server-side on first access
/// and mutated only by explicit saves in the settings surface.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedPreferences {
    pub categories: Vec<String>,
    pub language: String,
    pub onboarding_complete: bool,
}

impl Default for FeedPreferences {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            onboarding_complete: false,
        }
    }
}

impl FeedPreferences {
    /// Advisory first-run signal: when true the rendering surface should
    /// offer the category-selection prompt before fetching. Not a gate:
    /// the feed still works with an empty category set if the prompt is
    /// dismissed without a selection.
    pub fn should_prompt_onboarding(&self) -> bool {
        !self.onboarding_complete
    }
}

/// The user-selected feed scope. Transient UI state, never persisted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewMode {
    /// Use the stored preference categories.
    Personal,
    /// No category constraint.
    All,
    /// One explicit category, independent of stored preferences.
    Category(String),
}

/// Resolve the effective category filter for a view mode.
///
/// An empty set means "unconstrained" to the backend, so `All` and a
/// `Personal` mode with no saved categories query the same way.
pub fn resolve_categories(mode: &ViewMode, prefs: &FeedPreferences) -> BTreeSet<String> {
    match mode {
        ViewMode::All => BTreeSet::new(),
        ViewMode::Category(category) => BTreeSet::from([category.clone()]),
        ViewMode::Personal => prefs.categories.iter().cloned().collect(),
    }
}

/// Read side of the preference storage endpoint.
///
/// The record is fetched once per session and cached; writes happen in the
/// settings surface, which calls [`PreferenceClient::invalidate`] after a
/// save. Absent or malformed data degrades to [`FeedPreferences::default`]
/// rather than surfacing an error.
pub struct PreferenceClient {
    client: Client,
    preferences_url: String,
    default_language: String,
    cached: RwLock<Option<FeedPreferences>>,
}

impl PreferenceClient {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("PulseFeed/1.0 (Intranet News)")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            preferences_url: config.preferences_url.clone(),
            default_language: config.language.clone(),
            cached: RwLock::new(None),
        }
    }

    pub async fn load(&self) -> FeedPreferences {
        if let Some(prefs) = self.cached.read().await.clone() {
            return prefs;
        }

        let mut prefs = match self.fetch().await {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!("Failed to load feed preferences, using defaults: {}", e);
                FeedPreferences {
                    language: self.default_language.clone(),
                    ..Default::default()
                }
            }
        };
        if prefs.language.trim().is_empty() {
            prefs.language = self.default_language.clone();
        }

        *self.cached.write().await = Some(prefs.clone());
        prefs
    }

    /// Drop the cached record so the next `load` refetches it.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn fetch(&self) -> Result<FeedPreferences, FeedError> {
        let response = self.client.get(&self.preferences_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}
