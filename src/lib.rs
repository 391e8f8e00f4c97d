//! Pulse Feed - news feed aggregation core for the Pulse intranet
//!
//! This crate is the client-side orchestration layer between the intranet's
//! feed query API and the rendered news list: it resolves the effective
//! category filter from the user's view mode and stored preferences, pulls
//! paginated results from the backend, merges pages while deduplicating
//! articles that upstream RSS sources report under different identifiers,
//! and exposes the loading/error/exhausted state machine that drives
//! infinite scroll.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod prefs;
