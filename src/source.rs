//! Where group listings come from: the portal's landing page or a CSV of direct links.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};
use url::Url;

use crate::domain::FileRecord;
use crate::error::HarvestError;
use crate::http::Fetcher;
use crate::page::PageParser;

pub const CSV_GROUP_COLUMN: &str = "data_set";
pub const CSV_URL_COLUMN: &str = "url";
pub const CSV_FILENAME_COLUMN: &str = "link_text";

/// Fetches the landing page and returns every group listing URL it links to.
pub fn discover_groups<F: Fetcher + ?Sized>(
    fetcher: &F,
    parser: &PageParser,
    landing_url: &str,
) -> Result<BTreeMap<u32, String>, HarvestError> {
    info!(url = landing_url, "fetching landing page");
    let html = fetcher
        .fetch_text(landing_url)
        .map_err(|err| HarvestError::LandingPageUnavailable {
            url: landing_url.to_string(),
            reason: err.to_string(),
        })?;

    let document = PageParser::parse(&html);
    let groups = parser.group_links(&document);
    if groups.is_empty() {
        return Err(HarvestError::NoGroupsFound(landing_url.to_string()));
    }
    for (group_id, url) in &groups {
        info!(group = group_id, url = %url, "found group");
    }
    Ok(groups)
}

/// Loads `data_set,url,link_text` rows grouped by data set.
///
/// A header without the required columns fails the whole load. Rows with an
/// unparseable data set, an empty url or filename, or an unresolvable url are
/// skipped with a warning.
pub fn load_csv(path: &Path, base_url: &Url) -> Result<BTreeMap<u32, Vec<FileRecord>>, HarvestError> {
    info!(path = %path.display(), "loading CSV");
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| HarvestError::CsvRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

    let headers = reader.headers().map_err(|err| HarvestError::CsvRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let column = |name: &str| headers.iter().position(|header| header == name);
    let (group_idx, url_idx, filename_idx) = match (
        column(CSV_GROUP_COLUMN),
        column(CSV_URL_COLUMN),
        column(CSV_FILENAME_COLUMN),
    ) {
        (Some(group), Some(url), Some(filename)) => (group, url, filename),
        (group, url, filename) => {
            let missing = [
                (CSV_GROUP_COLUMN, group),
                (CSV_URL_COLUMN, url),
                (CSV_FILENAME_COLUMN, filename),
            ]
            .into_iter()
            .filter(|(_, idx)| idx.is_none())
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join(", ");
            return Err(HarvestError::CsvMissingColumns {
                path: path.to_path_buf(),
                columns: missing,
            });
        }
    };

    let mut groups: BTreeMap<u32, Vec<FileRecord>> = BTreeMap::new();
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                let line = err.position().map(|pos| pos.line()).unwrap_or(0);
                warn!(
                    "{}",
                    HarvestError::InvalidRow {
                        line,
                        message: err.to_string(),
                    }
                );
                continue;
            }
        };
        let line = row.position().map(|pos| pos.line()).unwrap_or(0);
        match parse_row(&row, group_idx, url_idx, filename_idx, base_url, line) {
            Ok(record) => groups.entry(record.group_id).or_default().push(record),
            Err(err) => warn!("skipping {err}"),
        }
    }

    let total: usize = groups.values().map(Vec::len).sum();
    info!(files = total, groups = groups.len(), "loaded CSV");
    for (group_id, records) in &groups {
        info!(group = group_id, files = records.len(), "group loaded");
    }
    Ok(groups)
}

fn parse_row(
    row: &csv::StringRecord,
    group_idx: usize,
    url_idx: usize,
    filename_idx: usize,
    base_url: &Url,
    line: u64,
) -> Result<FileRecord, HarvestError> {
    let invalid = |message: String| HarvestError::InvalidRow { line, message };

    let group_raw = row.get(group_idx).unwrap_or("");
    let group_id = group_raw
        .parse::<u32>()
        .map_err(|err| invalid(format!("{CSV_GROUP_COLUMN} {group_raw:?}: {err}")))?;

    let url = row.get(url_idx).unwrap_or("");
    if url.is_empty() {
        return Err(invalid(format!("empty {CSV_URL_COLUMN}")));
    }
    let filename = row.get(filename_idx).unwrap_or("");
    if filename.is_empty() {
        return Err(invalid(format!("empty {CSV_FILENAME_COLUMN}")));
    }

    let url = base_url
        .join(url)
        .map_err(|err| invalid(format!("{CSV_URL_COLUMN} {url:?}: {err}")))?;
    if !url.has_host() {
        return Err(invalid(format!("{url} has no network location")));
    }

    Ok(FileRecord::new(filename, url.to_string(), group_id))
}
