//! Export selection: which records, which items.
//!
//! A request carries one of three filter kinds — an exact (name, group)
//! pair, a desired-list of names, or no filter — plus an optional cutoff
//! date and an optional single-item id. Selecting one specific record
//! disables the cutoff: a directly requested entity always exports its
//! full history.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;

use crate::config::Config;
use crate::models::Record;
use crate::store;

/// Which records an export covers. Matching is exhaustive so a new filter
/// kind cannot slip through selection unhandled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportFilter {
    /// Exactly one record, identified by name and group.
    Single { name: String, group: String },
    /// Every record whose name appears in the list.
    Desired(Vec<String>),
    /// Every record in the store.
    All,
}

/// A fully resolved export request.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub filter: ExportFilter,
    /// Minimum item publish time. Ignored for [`ExportFilter::Single`].
    pub cutoff: Option<DateTime<Utc>>,
    /// Narrow the export to one item id. Takes precedence over the cutoff.
    pub item: Option<String>,
}

/// Load the candidate records for a request and apply its filters.
///
/// Records whose items are all filtered away are still returned; the
/// planner simply yields no tasks for them. An empty result means no
/// record matched the identity filter at all.
pub fn resolve_records(config: &Config, request: &ExportRequest) -> Vec<Record> {
    let records = match &request.filter {
        ExportFilter::Single { group, .. } => store::load_group_records(config, group),
        _ => store::load_all_records(config),
    };
    select(records, request)
}

/// Apply a request's filters to already-loaded records.
pub fn select(records: Vec<Record>, request: &ExportRequest) -> Vec<Record> {
    let mut selected: Vec<Record> = match &request.filter {
        ExportFilter::Single { name, group } => records
            .into_iter()
            .filter(|r| &r.name == name && &r.group == group)
            .collect(),
        ExportFilter::Desired(names) => {
            let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
            records
                .into_iter()
                .filter(|r| wanted.contains(r.name.as_str()))
                .collect()
        }
        ExportFilter::All => records,
    };

    let cutoff = match &request.filter {
        ExportFilter::Single { .. } => None,
        _ => request.cutoff,
    };

    for record in &mut selected {
        if let Some(item_id) = &request.item {
            record.items.retain(|i| &i.id == item_id);
        } else if let Some(cutoff) = cutoff {
            record.items.retain(|i| i.published_at >= cutoff);
        }
    }

    selected
}

/// Parse a `yyyyMMdd` cutoff parameter into the start of that day (UTC).
pub fn parse_cutoff(date: &str) -> Result<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(date, "%Y%m%d")
        .with_context(|| format!("Invalid cutoff date '{}' (expected yyyyMMdd)", date))?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid cutoff date '{}'", date))?;
    Ok(midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Item;

    fn record(name: &str, group: &str, item_days: &[u32]) -> Record {
        Record {
            name: name.to_string(),
            group: group.to_string(),
            items: item_days
                .iter()
                .map(|d| Item {
                    id: format!("i{}", d),
                    published_at: parse_cutoff(&format!("202401{:02}", d)).unwrap(),
                    text: None,
                    attachments: vec![],
                    local_file: None,
                })
                .collect(),
        }
    }

    fn request(filter: ExportFilter, cutoff: Option<&str>, item: Option<&str>) -> ExportRequest {
        ExportRequest {
            filter,
            cutoff: cutoff.map(|d| parse_cutoff(d).unwrap()),
            item: item.map(str::to_string),
        }
    }

    #[test]
    fn single_matches_name_and_group() {
        let records = vec![record("A", "G1", &[1]), record("A", "G2", &[1])];
        let selected = select(
            records,
            &request(
                ExportFilter::Single {
                    name: "A".to_string(),
                    group: "G2".to_string(),
                },
                None,
                None,
            ),
        );
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].group, "G2");
    }

    #[test]
    fn single_ignores_cutoff() {
        let records = vec![record("A", "G1", &[1, 20])];
        let selected = select(
            records,
            &request(
                ExportFilter::Single {
                    name: "A".to_string(),
                    group: "G1".to_string(),
                },
                Some("20240110"),
                None,
            ),
        );
        assert_eq!(selected[0].items.len(), 2);
    }

    #[test]
    fn desired_list_filters_by_name_across_groups() {
        let records = vec![
            record("A", "G1", &[1]),
            record("B", "G1", &[1]),
            record("C", "G2", &[1]),
        ];
        let selected = select(
            records,
            &request(
                ExportFilter::Desired(vec!["A".to_string(), "C".to_string()]),
                None,
                None,
            ),
        );
        let names: Vec<&str> = selected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[test]
    fn cutoff_drops_older_items_but_keeps_record() {
        let records = vec![record("A", "G1", &[1, 15, 25])];
        let selected = select(
            records,
            &request(ExportFilter::All, Some("20240115"), None),
        );
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].items.len(), 2);
        assert!(selected[0]
            .items
            .iter()
            .all(|i| i.published_at >= parse_cutoff("20240115").unwrap()));
    }

    #[test]
    fn record_emptied_by_cutoff_is_still_returned() {
        let records = vec![record("A", "G1", &[1])];
        let selected = select(
            records,
            &request(ExportFilter::All, Some("20240201"), None),
        );
        assert_eq!(selected.len(), 1);
        assert!(selected[0].items.is_empty());
    }

    #[test]
    fn item_filter_takes_precedence_over_cutoff() {
        let records = vec![record("A", "G1", &[1, 20])];
        let selected = select(
            records,
            &request(ExportFilter::All, Some("20240115"), Some("i1")),
        );
        assert_eq!(selected[0].items.len(), 1);
        assert_eq!(selected[0].items[0].id, "i1");
    }

    #[test]
    fn unknown_name_selects_nothing() {
        let records = vec![record("A", "G1", &[1])];
        let selected = select(
            records,
            &request(
                ExportFilter::Single {
                    name: "Z".to_string(),
                    group: "G1".to_string(),
                },
                None,
                None,
            ),
        );
        assert!(selected.is_empty());
    }

    #[test]
    fn cutoff_parsing() {
        let cutoff = parse_cutoff("20240115").unwrap();
        assert_eq!(cutoff.to_rfc3339(), "2024-01-15T00:00:00+00:00");
        assert!(parse_cutoff("2024-01-15").is_err());
        assert!(parse_cutoff("garbage").is_err());
    }
}
