use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8Path;
use disclosure_harvester::app::{App, ProgressEvent, ProgressSink, Source};
use disclosure_harvester::config::{ConfigFile, ConfigLoader, ConfigOverrides, RunConfig};
use disclosure_harvester::domain::Category;
use disclosure_harvester::error::HarvestError;
use disclosure_harvester::http::{FetchMode, FetchResponse, Fetcher};

const BASE: &str = "https://www.example.gov";
const LANDING: &str = "https://www.example.gov/epstein/doj-disclosures";
const GROUP_ONE: &str = "https://www.example.gov/epstein/doj-disclosures/data-set-1-files";

#[derive(Default)]
struct MockPortal {
    responses: HashMap<String, Vec<u8>>,
    calls: Mutex<Vec<String>>,
}

impl MockPortal {
    fn page(mut self, url: &str, html: &str) -> Self {
        self.responses.insert(url.to_string(), html.as_bytes().to_vec());
        self
    }

    fn file(mut self, path: &str, bytes: usize) -> Self {
        self.responses.insert(format!("{BASE}{path}"), vec![b'x'; bytes]);
        self
    }

    fn calls_for(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(needle))
            .count()
    }
}

impl Fetcher for MockPortal {
    fn fetch(&self, url: &str, _mode: FetchMode) -> Result<FetchResponse, HarvestError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.responses.get(url) {
            Some(bytes) => Ok(FetchResponse::from_bytes(url, bytes.clone())),
            None => Err(HarvestError::FetchExhausted {
                url: url.to_string(),
                attempts: 3,
                last_error: "HTTP 404".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event.message);
    }
}

fn config(output: &Utf8Path, download_files: bool, groups: Option<Vec<u32>>) -> RunConfig {
    ConfigLoader::resolve_config(
        ConfigFile {
            base_url: Some(BASE.to_string()),
            landing_url: Some(LANDING.to_string()),
            output_dir: Some(output.to_string()),
            rate_limit_delay_secs: Some(0.0),
            retry_delay_secs: Some(0.0),
            download_files: Some(download_files),
            groups,
            ..ConfigFile::default()
        },
        &ConfigOverrides::default(),
    )
    .unwrap()
}

fn listing(links: &[&str], last_page: Option<u32>) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<li><a href="{href}">{href}</a></li>"#))
        .collect();
    let nav = match last_page {
        Some(index) => format!(
            r#"<nav aria-label="Pagination"><a href="?page=0">1</a><a href="?page={index}">Last</a></nav>"#
        ),
        None => String::new(),
    };
    format!("<html><body><ul>{anchors}</ul>{nav}</body></html>")
}

fn landing(groups: &[u32]) -> String {
    let anchors: String = groups
        .iter()
        .map(|id| format!(r#"<a href="/epstein/doj-disclosures/data-set-{id}-files">Data Set {id}</a>"#))
        .collect();
    format!("<html><body>{anchors}<a href=\"/about\">About</a></body></html>")
}

fn two_page_portal() -> MockPortal {
    MockPortal::default()
        .page(LANDING, &landing(&[1]))
        .page(
            GROUP_ONE,
            &listing(
                &["/files/EFTA0001.pdf", "/files/EFTA0002.mp4", "/files/EFTA0003.jpg"],
                Some(1),
            ),
        )
        .page(
            &format!("{GROUP_ONE}?page=1"),
            &listing(&["/files/EFTA0004.zip", "/files/EFTA0005.mp3"], Some(1)),
        )
        .file("/files/EFTA0001.pdf", 2048)
        .file("/files/EFTA0002.mp4", 1_048_576)
        .file("/files/EFTA0003.jpg", 10)
        .file("/files/EFTA0004.zip", 5)
        .file("/files/EFTA0005.mp3", 7)
}

fn utf8_tempdir() -> (tempfile::TempDir, camino::Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = camino::Utf8PathBuf::from_path_buf(temp.path().join("out")).unwrap();
    (temp, root)
}

#[test]
fn web_run_scrapes_every_page_and_downloads_each_file() {
    let (_temp, root) = utf8_tempdir();
    let app = App::new(config(&root, true, None), two_page_portal()).unwrap();
    let sink = RecordingSink::default();

    let result = app.run(&Source::Web, &sink).unwrap();

    let group = result.metadata.get(1).unwrap();
    let names: Vec<&str> = group.records.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(
        names,
        vec!["EFTA0001.pdf", "EFTA0002.mp4", "EFTA0003.jpg", "EFTA0004.zip", "EFTA0005.mp3"]
    );
    assert!(group.records.iter().all(|record| record.has_size()));
    assert_eq!(group.records[1].size_mb, Some(1.0));

    for (category, name) in [
        (Category::Documents, "EFTA0001.pdf"),
        (Category::Videos, "EFTA0002.mp4"),
        (Category::Images, "EFTA0003.jpg"),
        (Category::Archives, "EFTA0004.zip"),
        (Category::Audio, "EFTA0005.mp3"),
    ] {
        assert!(app.layout().category_dir(1, category).join(name).is_file());
    }

    let summary = &result.summary;
    assert_eq!(summary.total_records, 5);
    assert_eq!(summary.groups.len(), 1);
    assert_eq!(summary.groups[0].downloaded, 5);
    assert_eq!(summary.groups[0].failed, 0);
    assert!(summary.metadata_written);
    assert!(sink.events.lock().unwrap().iter().any(|e| e.starts_with("phase=Done")));

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("metadata.json")).unwrap()).unwrap();
    let object = written.as_object().unwrap();
    assert_eq!(object.len(), 1);
    let entries = object["data_set_1"].as_array().unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[0]["data_set"], 1);
    assert_eq!(entries[0]["category"], "documents");
    assert_eq!(entries[0]["file_size_bytes"], 2048);
}

#[test]
fn second_run_fetches_no_files() {
    let (_temp, root) = utf8_tempdir();
    let first = App::new(config(&root, true, None), two_page_portal()).unwrap();
    first.run(&Source::Web, &RecordingSink::default()).unwrap();

    let second = App::new(config(&root, true, None), two_page_portal()).unwrap();
    let result = second.run(&Source::Web, &RecordingSink::default()).unwrap();

    assert_eq!(result.summary.groups[0].already_present, 5);
    assert_eq!(result.summary.groups[0].downloaded, 0);
}

#[test]
fn failed_page_and_file_do_not_stop_the_group() {
    let (_temp, root) = utf8_tempdir();
    let portal = MockPortal::default()
        .page(LANDING, &landing(&[1]))
        .page(GROUP_ONE, &listing(&["/files/EFTA0001.pdf", "/files/EFTA0009.pdf"], Some(2)))
        .page(
            &format!("{GROUP_ONE}?page=2"),
            &listing(&["/files/EFTA0003.txt"], Some(2)),
        )
        .file("/files/EFTA0001.pdf", 3)
        .file("/files/EFTA0003.txt", 4);
    let app = App::new(config(&root, true, None), portal).unwrap();

    let result = app.run(&Source::Web, &RecordingSink::default()).unwrap();

    let group = result.metadata.get(1).unwrap();
    assert_eq!(group.records.len(), 3);
    assert_eq!(result.summary.groups[0].downloaded, 2);
    assert_eq!(result.summary.groups[0].failed, 1);
    assert!(!group.records[1].has_size());
    assert!(!app.layout().category_dir(1, Category::Documents).join("EFTA0009.pdf").exists());
}

#[test]
fn selection_reports_missing_groups_and_skips_others() {
    let (_temp, root) = utf8_tempdir();
    let portal = two_page_portal().page(LANDING, &landing(&[1, 2]));
    let app = App::new(config(&root, false, Some(vec![1, 5])), &portal).unwrap();

    let result = app.run(&Source::Web, &RecordingSink::default()).unwrap();

    assert_eq!(result.summary.missing_groups, vec![5]);
    assert_eq!(result.metadata.groups().len(), 1);
    assert_eq!(portal.calls_for("data-set-2-files"), 0);
}

#[test]
fn metadata_only_run_writes_no_files() {
    let (_temp, root) = utf8_tempdir();
    let portal = two_page_portal();
    let app = App::new(config(&root, false, None), portal).unwrap();

    let result = app.run(&Source::Web, &RecordingSink::default()).unwrap();

    assert_eq!(result.summary.total_records, 5);
    assert!(!result.summary.downloads_enabled);
    assert!(!app.layout().group_dir(1).exists());
    assert!(result.metadata.get(1).unwrap().records.iter().all(|r| !r.has_size()));
    assert!(root.join("metadata.json").is_file());
}

#[test]
fn unreachable_landing_page_fails_the_run() {
    let (_temp, root) = utf8_tempdir();
    let app = App::new(config(&root, true, None), MockPortal::default()).unwrap();

    let err = app.run(&Source::Web, &RecordingSink::default()).unwrap_err();

    assert_matches!(err, HarvestError::LandingPageUnavailable { .. });
    assert!(!root.join("metadata.json").exists());
}

#[test]
fn csv_run_downloads_listed_files() {
    let (temp, root) = utf8_tempdir();
    let csv_path = temp.path().join("links.csv");
    fs::write(
        &csv_path,
        "data_set,url,link_text\n\
         4,/files/EFTA0001.pdf,EFTA0001.pdf\n\
         4,/files/EFTA0005.mp3,EFTA0005.mp3\n\
         x,/files/EFTA0002.mp4,EFTA0002.mp4\n",
    )
    .unwrap();
    let portal = two_page_portal();
    let app = App::new(config(&root, true, None), portal).unwrap();

    let result = app.run(&Source::Csv(csv_path), &RecordingSink::default()).unwrap();

    assert_eq!(result.summary.source, "csv");
    assert_eq!(result.summary.total_records, 2);
    assert_eq!(result.summary.groups[0].group_id, 4);
    assert_eq!(result.summary.groups[0].downloaded, 2);
    assert!(root.join("group_4/audio/EFTA0005.mp3").is_file());
}

#[test]
fn metadata_write_failure_is_reported_not_fatal() {
    let (_temp, root) = utf8_tempdir();
    fs::create_dir_all(root.join("metadata.json").join("blocker")).unwrap();
    let app = App::new(config(&root, false, None), two_page_portal()).unwrap();

    let result = app.run(&Source::Web, &RecordingSink::default()).unwrap();

    assert!(!result.summary.metadata_written);
    assert!(result.summary.metadata_error.is_some());
    assert_eq!(result.metadata.total_records(), 5);
}

#[test]
fn run_counts_page_requests() {
    let (_temp, root) = utf8_tempdir();
    let portal = two_page_portal();
    let app = App::new(config(&root, false, None), &portal).unwrap();

    app.run(&Source::Web, &RecordingSink::default()).unwrap();

    assert_eq!(portal.calls_for("data-set-1-files"), 2);
    assert_eq!(portal.calls_for("/files/"), 0);
}

#[test]
fn run_clears_partials_left_by_an_interrupted_run() {
    let (_temp, root) = utf8_tempdir();
    let documents = root.join("group_1").join("documents");
    fs::create_dir_all(&documents).unwrap();
    fs::write(documents.join(".harvest.Qw3rTy.part"), b"%PDF-1.4 trunc").unwrap();
    let app = App::new(config(&root, true, None), two_page_portal()).unwrap();

    let result = app.run(&Source::Web, &RecordingSink::default()).unwrap();

    assert_eq!(result.summary.groups[0].downloaded, 5);
    let names: Vec<String> = fs::read_dir(&documents)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["EFTA0001.pdf"]);
}
