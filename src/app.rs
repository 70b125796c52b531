use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::domain::{FileRecord, GroupListing, RunMetadata};
use crate::download::{DownloadOutcome, Downloader, remove_stale_partials};
use crate::error::HarvestError;
use crate::http::Fetcher;
use crate::page::PageParser;
use crate::scrape::scrape_group;
use crate::source::{discover_groups, load_csv};
use crate::store::{Layout, write_metadata};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Crawl the landing page and every group listing.
    Web,
    /// Read pre-extracted links from a CSV file.
    Csv(PathBuf),
}

impl Source {
    pub fn label(&self) -> &'static str {
        match self {
            Source::Web => "web",
            Source::Csv(_) => "csv",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupSummary {
    pub group_id: u32,
    pub records: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub failed: usize,
    pub categories: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub groups: Vec<GroupSummary>,
    pub missing_groups: Vec<u32>,
    pub total_records: usize,
    pub downloads_enabled: bool,
    pub metadata_path: String,
    pub metadata_written: bool,
    pub metadata_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub summary: RunSummary,
    pub metadata: RunMetadata,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<F: Fetcher> {
    config: RunConfig,
    fetcher: F,
    parser: PageParser,
    layout: Layout,
}

impl<F: Fetcher> App<F> {
    pub fn new(config: RunConfig, fetcher: F) -> Result<Self, HarvestError> {
        let parser = PageParser::new(&config)?;
        let layout = Layout::new(config.output_root.clone());
        Ok(Self {
            config,
            fetcher,
            parser,
            layout,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Runs one harvest over `source`.
    ///
    /// Only failures that invalidate the source itself are returned as errors.
    /// Failed pages, links and downloads are logged and counted, and a failed
    /// metadata write is reported in the summary.
    pub fn run(&self, source: &Source, sink: &dyn ProgressSink) -> Result<RunResult, HarvestError> {
        let started = Instant::now();
        info!(source = source.label(), "starting harvest");
        self.layout.ensure_output_root()?;

        let mut metadata = RunMetadata::new();
        let mut groups = Vec::new();

        sink.event(ProgressEvent::new("phase=Resolve; enumerating groups"));
        let missing_groups = match source {
            Source::Web => {
                let urls = discover_groups(&self.fetcher, &self.parser, &self.config.landing_url)?;
                let selection = self.config.groups.resolve(urls.keys().copied());
                for group_id in &selection.missing {
                    warn!(group = group_id, "group not found on portal");
                }
                for group_id in urls.keys().filter(|id| !self.config.groups.contains(**id)) {
                    debug!(group = group_id, "group not selected");
                }
                for group_id in &selection.selected {
                    let Some(url) = urls.get(group_id) else {
                        continue;
                    };
                    sink.event(ProgressEvent::new(format!(
                        "phase=Fetch; scraping group {group_id}"
                    )));
                    let records = scrape_group(&self.fetcher, &self.parser, *group_id, url);
                    let (listing, summary) = self.process_group(*group_id, records, sink);
                    metadata.insert(listing);
                    groups.push(summary);
                }
                selection.missing
            }
            Source::Csv(path) => {
                let mut loaded = load_csv(path, &self.config.base_url)?;
                let selection = self.config.groups.resolve(loaded.keys().copied());
                for group_id in &selection.missing {
                    warn!(group = group_id, "group not found in CSV");
                }
                for group_id in &selection.selected {
                    let records = loaded.remove(group_id).unwrap_or_default();
                    let (listing, summary) = self.process_group(*group_id, records, sink);
                    metadata.insert(listing);
                    groups.push(summary);
                }
                selection.missing
            }
        };

        if metadata.is_empty() {
            warn!("no groups selected, metadata will be empty");
        }

        sink.event(ProgressEvent::new("phase=Store; writing metadata"));
        let metadata_path = self.layout.metadata_path(&self.config.metadata_filename);
        let metadata_error = match write_metadata(&metadata, metadata_path.as_std_path()) {
            Ok(()) => {
                info!(path = %metadata_path, "metadata saved");
                None
            }
            Err(err) => {
                error!(error = %err, "metadata not saved");
                Some(err.to_string())
            }
        };

        let total_records = metadata.total_records();
        info!(
            files = total_records,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "harvest complete"
        );
        sink.event(ProgressEvent {
            message: format!("phase=Done; {total_records} files"),
            elapsed: Some(started.elapsed()),
        });

        Ok(RunResult {
            summary: RunSummary {
                source: source.label().to_string(),
                groups,
                missing_groups,
                total_records,
                downloads_enabled: self.config.download_files,
                metadata_path: metadata_path.to_string(),
                metadata_written: metadata_error.is_none(),
                metadata_error,
            },
            metadata,
        })
    }

    fn process_group(
        &self,
        group_id: u32,
        records: Vec<FileRecord>,
        sink: &dyn ProgressSink,
    ) -> (GroupListing, GroupSummary) {
        let mut listing = GroupListing::new(group_id, records);
        let categories: BTreeMap<String, usize> = listing
            .category_counts()
            .into_iter()
            .map(|(category, count)| (category.to_string(), count))
            .collect();
        let mut summary = GroupSummary {
            group_id,
            records: listing.records.len(),
            categories,
            ..GroupSummary::default()
        };

        if !self.config.download_files {
            info!(group = group_id, "metadata collected, downloads disabled");
            return (listing, summary);
        }
        if listing.records.is_empty() {
            return (listing, summary);
        }

        info!(group = group_id, categories = ?summary.categories, "file types found");
        let group_dir = match self.layout.ensure_group_dir(group_id) {
            Ok(dir) => dir,
            Err(err) => {
                error!(group = group_id, error = %err, "cannot create group directory");
                summary.failed = listing.records.len();
                return (listing, summary);
            }
        };

        if let Err(err) = remove_stale_partials(group_dir.as_std_path()) {
            warn!(group = group_id, error = %err, "cannot clear partial downloads");
        }

        let downloader = Downloader::new(&self.fetcher);
        let total = listing.records.len();
        for (index, record) in listing.records.iter_mut().enumerate() {
            sink.event(ProgressEvent::new(format!(
                "phase=Download; group {group_id} {}/{total} {}",
                index + 1,
                record.filename
            )));
            match downloader.download_one(record, group_dir.as_std_path()) {
                Ok(DownloadOutcome::Downloaded { .. }) => summary.downloaded += 1,
                Ok(DownloadOutcome::AlreadyPresent) => summary.already_present += 1,
                Err(err) => {
                    error!(
                        group = group_id,
                        filename = %record.filename,
                        error = %err,
                        "download failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            group = group_id,
            succeeded = summary.downloaded + summary.already_present,
            total,
            "group downloads finished"
        );
        (listing, summary)
    }
}
