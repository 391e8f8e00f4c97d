use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::{Article, FeedBackend, FeedQuery};

/// Where the aggregator is in its fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    LoadingFresh,
    LoadingMore,
    Error,
}

/// Read-only view of the accumulated feed, handed to the rendering surface.
#[derive(Debug, Clone)]
pub struct FeedState {
    /// Accumulated articles in first-seen order.
    pub items: Vec<Article>,
    /// Continuation token from the last page, absent when exhausted.
    pub cursor: Option<String>,
    pub has_more: bool,
    /// A successful first page came back with zero articles. Distinct from
    /// an error; the surface shows an empty-feed message, not a retry.
    pub empty: bool,
    pub phase: Phase,
    /// Message from the last failed fetch, kept for display.
    pub error: Option<String>,
}

impl FeedState {
    /// Predicate the scroll sentinel checks before invoking
    /// [`FeedAggregator::load_more`]. Viewport visibility itself is the
    /// rendering surface's concern.
    pub fn should_load_more(&self) -> bool {
        self.has_more && self.phase == Phase::Idle
    }
}

/// The aggregator's working set. Guarded by one lock; the seen-key set and
/// the active query never leave it.
#[derive(Debug)]
struct Accumulated {
    items: Vec<Article>,
    seen: HashSet<String>,
    cursor: Option<String>,
    has_more: bool,
    empty: bool,
    phase: Phase,
    error: Option<String>,
    query: FeedQuery,
}

impl Accumulated {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
            cursor: None,
            has_more: false,
            empty: false,
            phase: Phase::Idle,
            error: None,
            query: FeedQuery::default(),
        }
    }

    fn snapshot(&self) -> FeedState {
        FeedState {
            items: self.items.clone(),
            cursor: self.cursor.clone(),
            has_more: self.has_more,
            empty: self.empty,
            phase: self.phase,
            error: self.error.clone(),
        }
    }

    /// Append a batch, dropping articles whose dedup key was already seen.
    /// The seen-set spans the whole accumulated list, so an article that
    /// reappears on a later page (upstream sources resort on every poll) is
    /// silently dropped. First occurrence wins; a keyless article is always
    /// kept.
    fn absorb(&mut self, articles: Vec<Article>) -> usize {
        let mut accepted = 0;
        for article in articles {
            match article.dedup_key() {
                Some(key) => {
                    if self.seen.insert(key) {
                        self.items.push(article);
                        accepted += 1;
                    }
                }
                None => {
                    self.items.push(article);
                    accepted += 1;
                }
            }
        }
        accepted
    }
}

/// Orchestrates backend queries for the news feed: accumulates results
/// across pages, deduplicates, tracks the continuation cursor, and exposes
/// the loading/error/exhausted state machine the infinite-scroll surface
/// consumes.
///
/// At most one fetch is in flight at a time. `load_more` is single-flight
/// (a second call while one is outstanding is a no-op); `start_fresh_query`
/// always supersedes, and a superseded fetch's result is discarded when it
/// eventually settles.
pub struct FeedAggregator<B> {
    backend: B,
    page_size: u32,
    state: RwLock<Accumulated>,
    in_flight: RwLock<bool>,
    generation: AtomicU64,
}

impl<B: FeedBackend> FeedAggregator<B> {
    pub fn new(backend: B, page_size: u32) -> Self {
        Self {
            backend,
            page_size,
            state: RwLock::new(Accumulated::new()),
            in_flight: RwLock::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn snapshot(&self) -> FeedState {
        self.state.read().await.snapshot()
    }

    /// Drop the accumulated set and fetch page 1 for `query`.
    ///
    /// May be called in any phase. Any outstanding fetch, fresh or
    /// continuation, is superseded: its result is ignored when it arrives.
    /// On failure the phase moves to `Error` with the message preserved;
    /// re-invoking with the same arguments retries.
    pub async fn start_fresh_query(&self, query: FeedQuery) {
        let generation;
        {
            let mut in_flight = self.in_flight.write().await;
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *in_flight = true;
        }

        {
            let mut state = self.state.write().await;
            state.items.clear();
            state.seen.clear();
            state.cursor = None;
            state.has_more = false;
            state.empty = false;
            state.error = None;
            state.phase = Phase::LoadingFresh;
            state.query = query.clone();
        }

        let result = self.backend.fetch_page(&query, None, self.page_size).await;

        let mut state = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            // A newer query owns the state and the in-flight flag now.
            debug!("Discarding superseded fresh query result");
            return;
        }

        match result {
            Ok(page) => {
                state.cursor = page.next_cursor.clone();
                state.has_more = page.next_cursor.is_some();
                let accepted = state.absorb(page.articles);
                state.empty = state.items.is_empty();
                state.phase = Phase::Idle;
                info!(
                    accepted,
                    has_more = state.has_more,
                    "Fresh feed query applied"
                );
            }
            Err(e) => {
                warn!("Fresh feed query failed: {}", e);
                state.phase = Phase::Error;
                state.error = Some(e.to_string());
            }
        }
        drop(state);

        *self.in_flight.write().await = false;
    }

    /// Fetch the next page with the current cursor and merge it in.
    ///
    /// A no-op while a fetch is outstanding or when the feed is exhausted;
    /// callable again after a failed continuation (the cursor is unchanged,
    /// so the retry behaves as if the failure never happened).
    pub async fn load_more(&self) {
        let generation;
        {
            // Tested-and-set before any asynchronous work: the race guard
            // that keeps continuation fetches single-flight.
            let mut in_flight = self.in_flight.write().await;
            if *in_flight {
                debug!("load_more ignored, a fetch is already in flight");
                return;
            }
            let state = self.state.read().await;
            if !state.has_more
                || matches!(state.phase, Phase::LoadingFresh | Phase::LoadingMore)
            {
                return;
            }
            *in_flight = true;
            generation = self.generation.load(Ordering::SeqCst);
        }

        let (query, cursor) = {
            let mut state = self.state.write().await;
            state.phase = Phase::LoadingMore;
            state.error = None;
            (state.query.clone(), state.cursor.clone())
        };

        let result = self
            .backend
            .fetch_page(&query, cursor.as_deref(), self.page_size)
            .await;

        let mut state = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding superseded continuation result");
            return;
        }

        match result {
            Ok(page) => {
                state.cursor = page.next_cursor.clone();
                state.has_more = page.next_cursor.is_some();
                let accepted = state.absorb(page.articles);
                state.phase = Phase::Idle;
                debug!(
                    accepted,
                    has_more = state.has_more,
                    "Continuation fetch applied"
                );
            }
            Err(e) => {
                // Items and cursor stay untouched; partial results from a
                // failed continuation are never applied.
                warn!("Continuation fetch failed: {}", e);
                state.phase = Phase::Error;
                state.error = Some(e.to_string());
            }
        }
        drop(state);

        *self.in_flight.write().await = false;
    }
}
