//! On-disk record store.
//!
//! One JSON document per record at `<store.root>/<group>/<name>.json`.
//! Loads fail soft: a missing group directory yields an empty list and a
//! malformed document is skipped with a warning, so one bad file never
//! takes down a request.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::Record;

/// Load every record document in one group's directory, sorted by name.
pub fn load_group_records(config: &Config, group: &str) -> Vec<Record> {
    let dir = config.store.root.join(group);
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut records = Vec::new();
    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                eprintln!("Warning: cannot read store entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        if let Some(record) = read_json_document::<Record>(path) {
            records.push(record);
        }
    }

    records.sort_by(|a, b| a.name.cmp(&b.name));
    records
}

/// Load the records of every configured group, in configuration order.
pub fn load_all_records(config: &Config) -> Vec<Record> {
    config
        .groups
        .iter()
        .flat_map(|g| load_group_records(config, &g.name))
        .collect()
}

/// Per-user document at `<store.root>/users/<user>.json`.
#[derive(Debug, Default, Deserialize)]
pub struct UserDocument {
    #[serde(default)]
    pub desired: Vec<String>,
}

/// Resolve the desired-list for an identity.
///
/// An authenticated user gets the `desired` array of their own document
/// (empty when absent); anonymous callers get the global list file.
pub fn load_desired_list(config: &Config, user: Option<&str>) -> Vec<String> {
    match user {
        Some(user) => {
            let path = config.store.root.join("users").join(format!("{}.json", user));
            read_json_document::<UserDocument>(&path)
                .map(|doc| doc.desired)
                .unwrap_or_default()
        }
        None => read_json_document::<Vec<String>>(&config.store.desired_list).unwrap_or_default(),
    }
}

fn read_json_document<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                eprintln!("Warning: failed to read {}: {}", path.display(), e);
            }
            return None;
        }
    };
    match serde_json::from_str(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            eprintln!("Warning: skipping malformed document {}: {}", path.display(), e);
            None
        }
    }
}
