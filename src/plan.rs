//! Fetch-task planning for archive exports.
//!
//! Expands selected records into a flat sequence of [`FetchTask`]s, one per
//! qualifying attachment. Pure and synchronous: no I/O happens here, only
//! locator resolution, destination-path sanitization, and archive-timestamp
//! computation.

use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

use crate::config::{Config, GroupConfig};
use crate::models::Record;

/// Media extensions accepted into archives (lowercase, without dot).
const SOURCE_EXTENSIONS: [&str; 6] = ["jpeg", "jpg", "png", "gif", "mp4", "m4a"];

/// Generic CMS filenames are truncated to this many characters, keeping
/// the extension.
const MAX_BASE_NAME_CHARS: usize = 52;

/// Where one attachment's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Url(String),
    Local(PathBuf),
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Url(url) => write!(f, "{}", url),
            Locator::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One planned unit of work: fetch one attachment and place it in the
/// archive. Created here, consumed exactly once by the export executor.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub locator: Locator,
    /// Destination path inside the archive, `/`-separated.
    pub archive_path: String,
    /// Entry timestamp: publish time shifted into the configured timezone,
    /// plus one minute per preceding sibling attachment so entries within
    /// one item keep distinct, ordered timestamps.
    pub timestamp: DateTime<Utc>,
    /// Owning record, for log lines only.
    pub record_name: String,
}

/// Expand records into fetch tasks, in record → item → attachment order.
pub fn plan_tasks(records: &[Record], config: &Config) -> Vec<FetchTask> {
    let mut tasks = Vec::new();
    let offset = Duration::hours(config.export.timezone_offset_hours);

    for record in records {
        let group = config.groups.iter().find(|g| g.name == record.group);
        let folder = group
            .map(GroupConfig::archive_folder)
            .unwrap_or(record.group.as_str());

        for item in &record.items {
            let sources = item
                .attachments
                .iter()
                .map(String::as_str)
                .chain(item.local_file.as_deref())
                .filter(|raw| has_supported_extension(raw));

            for (index, raw) in sources.enumerate() {
                let (base, ext) = split_name(raw);
                let filename = sanitize_file_name(&base, &ext, &item.id);
                tasks.push(FetchTask {
                    locator: resolve_locator(raw, group, &config.store.root),
                    archive_path: format!("{}/{}/{}", folder, record.name, filename),
                    timestamp: item.published_at + offset + Duration::minutes(index as i64),
                    record_name: record.name.clone(),
                });
            }
        }
    }

    tasks
}

fn has_supported_extension(raw: &str) -> bool {
    match Path::new(raw).extension().and_then(|e| e.to_str()) {
        Some(ext) => SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Split a locator into (base name, lowercased dotted extension).
fn split_name(raw: &str) -> (String, String) {
    let path = Path::new(raw);
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default();
    (base, ext)
}

/// Produce a collision-safe archive filename.
///
/// Bare 4-digit sequences (common CMS auto-names) are prefixed with the
/// owning item's id so sibling items sharing generic names stay distinct;
/// over-long names are truncated to [`MAX_BASE_NAME_CHARS`] characters.
pub fn sanitize_file_name(base: &str, extension: &str, id: &str) -> String {
    let is_generic_sequence = base.len() == 4 && base.chars().all(|c| c.is_ascii_digit());
    if is_generic_sequence {
        return format!("{}_{}{}", id, base, extension);
    }

    if base.chars().count() > MAX_BASE_NAME_CHARS {
        let truncated: String = base.chars().take(MAX_BASE_NAME_CHARS).collect();
        return format!("{}{}", truncated, extension);
    }

    format!("{}{}", base, extension)
}

/// Resolve an attachment reference to something fetchable.
///
/// Absolute URLs pass through; root-relative paths join the group's
/// `base_url` when it has one; everything else reads from the local store.
fn resolve_locator(raw: &str, group: Option<&GroupConfig>, store_root: &Path) -> Locator {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Locator::Url(raw.to_string());
    }

    if raw.starts_with('/') {
        if let Some(base_url) = group.and_then(|g| g.base_url.as_deref()) {
            if !base_url.is_empty() {
                return Locator::Url(format!("{}{}", base_url.trim_end_matches('/'), raw));
            }
        }
    }

    Locator::Local(store_root.join(raw.trim_start_matches('/')))
}
