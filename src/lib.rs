//! # Timeline Vault
//!
//! A local-first timeline aggregation and bulk media export service.
//!
//! Timeline Vault aggregates timestamped content records — posts and
//! messages with media attachments — stored as per-entity JSON documents
//! on disk, and exports their media as a single compressed archive.
//! Fetches fan out under a fixed concurrency cap; successes stream into
//! one serialized ZIP writer; individual failures are counted and skipped
//! without aborting the batch.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │ Record store │──▶│ Selector │──▶│ Task planner │──▶│  Bounded  │
//! │ JSON on disk │   │ + cutoff │   │  (pure)      │   │  fetchers │
//! └──────────────┘   └──────────┘   └──────────────┘   └─────┬─────┘
//!                                                           │ channel
//!                                          ┌────────────────▼──────┐
//!                                          │ Single archive writer │
//!                                          │ (ZIP, one consumer)   │
//!                                          └───────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tlv records                              # inspect the store
//! tlv export --output DCIM.zip             # export the desired-list
//! tlv export --output DCIM.zip --date 20240101
//! tlv text --output prompts.json           # text-only export
//! tlv serve                                # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | On-disk record store and desired-lists |
//! | [`select`] | Export filters and cutoff handling |
//! | [`plan`] | Fetch-task planning (pure) |
//! | [`fetch`] | Attachment fetching with bounded retry |
//! | [`export`] | Pipeline orchestration and the worker pool |
//! | [`archive`] | Serialized ZIP writing |
//! | [`prompts`] | Text-only export |
//! | [`report`] | Progress and outcome reporting |
//! | [`auth`] | Signed session cookies |
//! | [`server`] | HTTP API server |

pub mod archive;
pub mod auth;
pub mod config;
pub mod export;
pub mod fetch;
pub mod models;
pub mod plan;
pub mod prompts;
pub mod report;
pub mod select;
pub mod server;
pub mod store;
