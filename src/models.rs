//! Core data models used throughout Timeline Vault.
//!
//! These types mirror the on-disk record documents and flow through the
//! selection, planning, and export pipeline unchanged. The pipeline never
//! mutates a loaded [`Record`]; every request reloads from the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked content-producing entity, loaded from one JSON document at
/// `<store.root>/<group>/<name>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub items: Vec<Item>,
}

/// One timestamped content unit (post or message) owned by a [`Record`].
///
/// An item with no attachments, no local file, and no text contributes
/// nothing to any export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
    /// Relative media locators: absolute URLs, root-relative URL paths
    /// (joined onto the group's `base_url`), or store-relative file paths.
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Media already downloaded next to the record store, relative to
    /// `store.root`. Planned like one more attachment of this item.
    #[serde(default)]
    pub local_file: Option<String>,
}

impl Item {
    /// Publish timestamp of the newest item in a slice, if any.
    pub fn latest(items: &[Item]) -> Option<DateTime<Utc>> {
        items.iter().map(|i| i.published_at).max()
    }
}
