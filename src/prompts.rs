//! Text-only export.
//!
//! Collects the textual bodies of selected items into one JSON document,
//! newest first — the same selection semantics as the archive export, with
//! none of the fetch machinery.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::export::ExportError;
use crate::models::Record;
use crate::select::{self, ExportRequest};

#[derive(Debug, Serialize)]
pub struct PromptEntry {
    pub record: String,
    pub id: String,
    pub published_at: DateTime<Utc>,
    pub text: String,
}

/// Resolve a request and collect its text entries.
///
/// Shares the archive export's NotFound contract: an empty candidate set
/// fails before any aggregation.
pub fn run_text_export(
    config: &Config,
    request: &ExportRequest,
) -> Result<Vec<PromptEntry>, ExportError> {
    let records = select::resolve_records(config, request);
    if records.is_empty() {
        return Err(ExportError::NotFound);
    }
    Ok(collect_entries(&records))
}

/// Flatten records into text entries, newest first. Items without text
/// are skipped.
pub fn collect_entries(records: &[Record]) -> Vec<PromptEntry> {
    let mut entries: Vec<PromptEntry> = records
        .iter()
        .flat_map(|record| {
            record.items.iter().filter_map(|item| {
                let text = item.text.as_deref()?.trim();
                if text.is_empty() {
                    return None;
                }
                Some(PromptEntry {
                    record: record.name.clone(),
                    id: item.id.clone(),
                    published_at: item.published_at,
                    text: text.to_string(),
                })
            })
        })
        .collect();

    entries.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Item;
    use chrono::TimeZone;

    fn item(id: &str, day: u32, text: Option<&str>) -> Item {
        Item {
            id: id.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            text: text.map(str::to_string),
            attachments: vec![],
            local_file: None,
        }
    }

    #[test]
    fn entries_sort_newest_first_and_skip_empty_text() {
        let records = vec![Record {
            name: "A".to_string(),
            group: "G1".to_string(),
            items: vec![
                item("1", 1, Some("oldest")),
                item("2", 3, Some("newest")),
                item("3", 2, Some("  ")),
                item("4", 2, None),
            ],
        }];

        let entries = collect_entries(&records);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "newest");
        assert_eq!(entries[1].text, "oldest");
    }
}
