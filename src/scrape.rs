use tracing::{debug, info, warn};
use url::Url;

use crate::domain::FileRecord;
use crate::http::Fetcher;
use crate::page::PageParser;

/// Walks every page of a group listing and collects its file records.
///
/// A failed first page yields an empty listing; a failed later page
/// contributes nothing and the walk moves on.
pub fn scrape_group<F: Fetcher + ?Sized>(
    fetcher: &F,
    parser: &PageParser,
    group_id: u32,
    start_url: &str,
) -> Vec<FileRecord> {
    info!(group = group_id, url = start_url, "scraping group");
    let first = match fetcher.fetch_text(start_url) {
        Ok(html) => PageParser::parse(&html),
        Err(err) => {
            warn!(group = group_id, error = %err, "skipping group, first page unavailable");
            return Vec::new();
        }
    };

    let total_pages = parser.pagination_bounds(&first);
    info!(group = group_id, pages = total_pages, "pagination resolved");

    let mut records = parser.extract_links(&first, group_id);
    debug!(group = group_id, page = 1, files = records.len(), "page scraped");

    for page in 1..total_pages {
        let url = page_url(start_url, page);
        let document = match fetcher.fetch_text(&url) {
            Ok(html) => PageParser::parse(&html),
            Err(err) => {
                warn!(group = group_id, page = page + 1, error = %err, "skipping page");
                continue;
            }
        };
        let found = parser.extract_links(&document, group_id);
        debug!(group = group_id, page = page + 1, files = found.len(), "page scraped");
        records.extend(found);
    }

    info!(group = group_id, files = records.len(), "group scraped");
    records
}

/// URL of the zero-based `page` of a listing.
pub fn page_url(start_url: &str, page: u32) -> String {
    match Url::parse(start_url) {
        Ok(mut url) => {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| key != "page")
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair("page", &page.to_string());
            url.to_string()
        }
        Err(_) => format!("{start_url}?page={page}"),
    }
}
