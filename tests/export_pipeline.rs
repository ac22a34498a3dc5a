//! End-to-end export pipeline tests against a temporary record store.
//!
//! These use only local attachments so the production fetcher runs for
//! real, without any network.

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use timeline_vault::config::{Config, ExportConfig, GroupConfig, StoreConfig};
use timeline_vault::export::{run_export, ExportError};
use timeline_vault::fetch::StoreFetcher;
use timeline_vault::report::NoProgress;
use timeline_vault::select::{parse_cutoff, ExportFilter, ExportRequest};

fn test_config(root: &Path, workers: usize) -> Config {
    Config {
        store: StoreConfig {
            root: root.to_path_buf(),
            desired_list: root.join("desired.json"),
        },
        groups: vec![GroupConfig {
            name: "G1".to_string(),
            folder_name: Some("Group One".to_string()),
            base_url: None,
        }],
        export: ExportConfig {
            workers,
            ..Default::default()
        },
        auth: Default::default(),
        server: Default::default(),
    }
}

fn write_record(root: &Path, name: &str, items: serde_json::Value) {
    let dir = root.join("G1");
    fs::create_dir_all(&dir).unwrap();
    let doc = serde_json::json!({ "name": name, "group": "G1", "items": items });
    fs::write(dir.join(format!("{}.json", name)), doc.to_string()).unwrap();
}

fn write_media(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn fetcher(config: &Config) -> Arc<StoreFetcher> {
    Arc::new(StoreFetcher::new(&config.export).unwrap())
}

fn archive_names(cursor: Cursor<Vec<u8>>) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(cursor).unwrap();
    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn exports_local_attachments_end_to_end() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path(), 2);

    write_media(tmp.path(), "media/sunrise.jpg", b"jpeg-bytes");
    write_media(tmp.path(), "media/clip.mp4", b"mp4-bytes");
    write_record(
        tmp.path(),
        "A",
        serde_json::json!([{
            "id": "p1",
            "published_at": "2024-01-05T09:00:00Z",
            "attachments": ["media/sunrise.jpg"],
            "local_file": "media/clip.mp4",
        }]),
    );

    let request = ExportRequest {
        filter: ExportFilter::All,
        cutoff: None,
        item: None,
    };
    let (cursor, outcome) = run_export(
        &config,
        &request,
        fetcher(&config),
        Cursor::new(Vec::new()),
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 0);

    let mut archive = zip::ZipArchive::new(cursor).unwrap();
    assert_eq!(archive.len(), 2);
    let mut buf = Vec::new();
    std::io::copy(
        &mut archive.by_name("Group One/A/sunrise.jpg").unwrap(),
        &mut buf,
    )
    .unwrap();
    assert_eq!(buf, b"jpeg-bytes");
    assert!(archive.by_name("Group One/A/clip.mp4").is_ok());
}

#[tokio::test]
async fn missing_file_fails_its_task_only() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path(), 2);

    write_media(tmp.path(), "media/kept.png", b"png");
    write_record(
        tmp.path(),
        "A",
        serde_json::json!([{
            "id": "p1",
            "published_at": "2024-01-05T09:00:00Z",
            "attachments": ["media/kept.png", "media/vanished.jpg"],
        }]),
    );

    let request = ExportRequest {
        filter: ExportFilter::All,
        cutoff: None,
        item: None,
    };
    let (cursor, outcome) = run_export(
        &config,
        &request,
        fetcher(&config),
        Cursor::new(Vec::new()),
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed, 1);
    assert!(outcome.failures[0].0.ends_with("vanished.jpg"));

    assert_eq!(archive_names(cursor), vec!["Group One/A/kept.png"]);
}

#[tokio::test]
async fn cutoff_excludes_older_items_from_the_archive() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path(), 2);

    write_media(tmp.path(), "media/old.jpg", b"old");
    write_media(tmp.path(), "media/new.jpg", b"new");
    write_record(
        tmp.path(),
        "A",
        serde_json::json!([
            {
                "id": "p1",
                "published_at": "2023-12-01T00:00:00Z",
                "attachments": ["media/old.jpg"],
            },
            {
                "id": "p2",
                "published_at": "2024-02-01T00:00:00Z",
                "attachments": ["media/new.jpg"],
            }
        ]),
    );

    let request = ExportRequest {
        filter: ExportFilter::All,
        cutoff: Some(parse_cutoff("20240101").unwrap()),
        item: None,
    };
    let (cursor, outcome) = run_export(
        &config,
        &request,
        fetcher(&config),
        Cursor::new(Vec::new()),
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(outcome.attempted, 1);
    assert_eq!(archive_names(cursor), vec!["Group One/A/new.jpg"]);
}

#[tokio::test]
async fn desired_list_limits_which_records_export() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path(), 2);

    write_media(tmp.path(), "media/a.jpg", b"a");
    write_media(tmp.path(), "media/b.jpg", b"b");
    write_record(
        tmp.path(),
        "A",
        serde_json::json!([{
            "id": "p1",
            "published_at": "2024-01-05T00:00:00Z",
            "attachments": ["media/a.jpg"],
        }]),
    );
    write_record(
        tmp.path(),
        "B",
        serde_json::json!([{
            "id": "p1",
            "published_at": "2024-01-05T00:00:00Z",
            "attachments": ["media/b.jpg"],
        }]),
    );

    let request = ExportRequest {
        filter: ExportFilter::Desired(vec!["B".to_string()]),
        cutoff: None,
        item: None,
    };
    let (cursor, _) = run_export(
        &config,
        &request,
        fetcher(&config),
        Cursor::new(Vec::new()),
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(archive_names(cursor), vec!["Group One/B/b.jpg"]);
}

#[tokio::test]
async fn single_item_narrowing_exports_one_item() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path(), 2);

    write_media(tmp.path(), "media/first.jpg", b"1");
    write_media(tmp.path(), "media/second.jpg", b"2");
    write_record(
        tmp.path(),
        "A",
        serde_json::json!([
            {
                "id": "p1",
                "published_at": "2024-01-05T00:00:00Z",
                "attachments": ["media/first.jpg"],
            },
            {
                "id": "p2",
                "published_at": "2024-01-06T00:00:00Z",
                "attachments": ["media/second.jpg"],
            }
        ]),
    );

    let request = ExportRequest {
        filter: ExportFilter::Single {
            name: "A".to_string(),
            group: "G1".to_string(),
        },
        cutoff: None,
        item: Some("p2".to_string()),
    };
    let (cursor, _) = run_export(
        &config,
        &request,
        fetcher(&config),
        Cursor::new(Vec::new()),
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(archive_names(cursor), vec!["Group One/A/second.jpg"]);
}

#[tokio::test]
async fn unknown_record_is_not_found() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path(), 2);
    write_record(tmp.path(), "A", serde_json::json!([]));

    let request = ExportRequest {
        filter: ExportFilter::Single {
            name: "Nobody".to_string(),
            group: "G1".to_string(),
        },
        cutoff: None,
        item: None,
    };
    let err = run_export(
        &config,
        &request,
        fetcher(&config),
        Cursor::new(Vec::new()),
        &NoProgress,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ExportError::NotFound));
}

#[tokio::test]
async fn rerunning_an_export_yields_the_same_entry_set() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = test_config(tmp.path(), 4);

    for i in 0..6 {
        write_media(tmp.path(), &format!("media/img{}.jpg", i), b"x");
    }
    write_record(
        tmp.path(),
        "A",
        serde_json::json!([{
            "id": "p1",
            "published_at": "2024-01-05T00:00:00Z",
            "attachments": [
                "media/img0.jpg", "media/img1.jpg", "media/img2.jpg",
                "media/img3.jpg", "media/img4.jpg", "media/img5.jpg"
            ],
        }]),
    );

    let request = ExportRequest {
        filter: ExportFilter::All,
        cutoff: None,
        item: None,
    };

    let (first, _) = run_export(
        &config,
        &request,
        fetcher(&config),
        Cursor::new(Vec::new()),
        &NoProgress,
    )
    .await
    .unwrap();
    let (second, _) = run_export(
        &config,
        &request,
        fetcher(&config),
        Cursor::new(Vec::new()),
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(archive_names(first), archive_names(second));
}
