//! # SensorySearch tracking backend
//!
//! Tracking and rating core of the SensorySearch directory of
//! sensory-friendly venues, events and parks.
//!
//! ## Features
//!
//! - **Deduplication**: one count per (listing, day, session, event type)
//! - **Daily metrics**: views, unique viewers, detail clicks, favorites and
//!   calendar adds per listing and day
//! - **Ratings**: 1 to 5 stars, one per session per rolling 24 hours, with a
//!   recomputed mean and histogram
//! - **Top-N reports**: most visited pages, most frequent searches and most
//!   clicked targets
//! - **HTTP API**: the endpoints called by the site's instrumentation
//!
//! ## Architecture
//!
//! - [`api`]: Domain types shared by every layer
//! - [`config`]: Application configuration (TOML + environment)
//! - [`db`]: Repository traits and the local / Postgres stores
//! - [`services`]: Tracking rules, timeouts and failure degradation
//! - [`http`]: Axum router, handlers and session handling

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod api;
pub mod config;
pub mod db;
pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
