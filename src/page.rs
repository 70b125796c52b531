//! HTML listing pages: pagination bounds, file links and group links.

use std::collections::{BTreeMap, BTreeSet};

use regex::{Regex, RegexBuilder};
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::config::RunConfig;
use crate::domain::{FileRecord, file_type_of};
use crate::error::HarvestError;

const PAGINATION_SELECTOR: &str = r#"nav[aria-label="Pagination"]"#;
const LINK_SELECTOR: &str = "a[href]";
const LAST_PAGE_LABEL: &str = "Last";
const PAGE_PARAM_PATTERN: &str = r"[?&]page=(\d+)";

pub struct PageParser {
    base_url: Url,
    supported_extensions: BTreeSet<String>,
    filename_pattern: Regex,
    group_link_pattern: Regex,
    page_param: Regex,
    pagination: Selector,
    links: Selector,
    anchors: Selector,
}

impl PageParser {
    pub fn new(config: &RunConfig) -> Result<Self, HarvestError> {
        let filename_pattern = RegexBuilder::new(&config.filename_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|err| HarvestError::InvalidConfig(format!("filename_pattern: {err}")))?;
        let group_link_pattern = Regex::new(&config.group_link_pattern)
            .map_err(|err| HarvestError::InvalidConfig(format!("group_link_pattern: {err}")))?;
        let page_param = Regex::new(PAGE_PARAM_PATTERN)
            .map_err(|err| HarvestError::InvalidConfig(err.to_string()))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            supported_extensions: config.supported_extensions.clone(),
            filename_pattern,
            group_link_pattern,
            page_param,
            pagination: selector(PAGINATION_SELECTOR)?,
            links: selector(LINK_SELECTOR)?,
            anchors: selector("a")?,
        })
    }

    pub fn parse(html: &str) -> Html {
        Html::parse_document(html)
    }

    /// Total number of listing pages, never less than one.
    ///
    /// A "Last" control whose href carries `page=<n>` wins with `n + 1`
    /// because the query parameter is zero-based. Otherwise the largest
    /// numeric link label is used.
    pub fn pagination_bounds(&self, document: &Html) -> u32 {
        let Some(nav) = document.select(&self.pagination).next() else {
            return 1;
        };

        let mut max_label = 1u32;
        let mut last_index = None;
        for link in nav.select(&self.anchors) {
            let text = link.text().collect::<String>();
            if last_index.is_none() && text.contains(LAST_PAGE_LABEL) {
                last_index = link
                    .value()
                    .attr("href")
                    .and_then(|href| self.page_param.captures(href))
                    .and_then(|caps| caps.get(1))
                    .and_then(|index| index.as_str().parse::<u32>().ok());
            }

            let label = text.trim();
            if !label.is_empty() && label.chars().all(|ch| ch.is_ascii_digit()) {
                if let Ok(value) = label.parse::<u32>() {
                    max_label = max_label.max(value);
                }
            }
        }

        match last_index {
            Some(index) => index.saturating_add(1),
            None => max_label,
        }
    }

    /// File records for every accepted link, in document order.
    pub fn extract_links(&self, document: &Html, group_id: u32) -> Vec<FileRecord> {
        let mut records = Vec::new();
        for link in document.select(&self.links) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if let Some(record) = self.accept_link(href, group_id) {
                records.push(record);
            }
        }
        records
    }

    fn accept_link(&self, href: &str, group_id: u32) -> Option<FileRecord> {
        let path = href_path(href);
        let file_type = file_type_of(path);
        if !self.supported_extensions.contains(&file_type) || !self.filename_pattern.is_match(href)
        {
            return None;
        }

        let url = match self.resolve(href) {
            Ok(url) => url,
            Err(err) => {
                warn!(group = group_id, href, error = %err, "skipping link");
                return None;
            }
        };

        let filename = path.rsplit('/').next().unwrap_or(path);
        let record = FileRecord::new(filename, url, group_id);
        debug!(group = group_id, filename = %record.filename, "accepted link");
        Some(record)
    }

    /// Listing URLs keyed by group number, taken from the landing page.
    pub fn group_links(&self, document: &Html) -> BTreeMap<u32, String> {
        let mut groups = BTreeMap::new();
        for link in document.select(&self.links) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let Some(group_id) = self
                .group_link_pattern
                .captures(href)
                .and_then(|caps| caps.get(1))
                .and_then(|value| value.as_str().parse::<u32>().ok())
            else {
                continue;
            };
            match self.resolve(href) {
                Ok(url) => {
                    debug!(group = group_id, url = %url, "found group listing");
                    groups.insert(group_id, url);
                }
                Err(err) => warn!(group = group_id, href, error = %err, "skipping group link"),
            }
        }
        groups
    }

    /// Resolves `href` against the base origin; the result must carry a host.
    pub fn resolve(&self, href: &str) -> Result<String, HarvestError> {
        let url = self
            .base_url
            .join(href)
            .map_err(|err| HarvestError::InvalidUrl {
                href: href.to_string(),
                message: err.to_string(),
            })?;
        if !url.has_host() {
            return Err(HarvestError::InvalidUrl {
                href: href.to_string(),
                message: format!("{url} has no network location"),
            });
        }
        Ok(url.to_string())
    }
}

/// Path component of an href: scheme and authority, query and fragment removed.
fn href_path(href: &str) -> &str {
    let end = href.find(['?', '#']).unwrap_or(href.len());
    let without_query = &href[..end];
    match without_query.find("://") {
        Some(idx) => {
            let rest = &without_query[idx + 3..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or("")
        }
        None if without_query.starts_with("//") => {
            let rest = &without_query[2..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or("")
        }
        None => without_query,
    }
}

fn selector(css: &str) -> Result<Selector, HarvestError> {
    Selector::parse(css)
        .map_err(|err| HarvestError::InvalidConfig(format!("selector {css}: {err:?}")))
}
