use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::domain::FileRecord;
use crate::error::HarvestError;
use crate::http::{FetchMode, Fetcher};

const PARTIAL_PREFIX: &str = ".harvest.";
const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    /// Destination already existed, nothing was fetched.
    AlreadyPresent,
}

pub struct Downloader<'a, F: Fetcher + ?Sized> {
    fetcher: &'a F,
}

impl<'a, F: Fetcher + ?Sized> Downloader<'a, F> {
    pub fn new(fetcher: &'a F) -> Self {
        Self { fetcher }
    }

    /// Downloads `record` into `<group_dir>/<category>/<filename>`.
    ///
    /// The body is streamed into a hidden `.part` file next to the destination
    /// and renamed into place only once it is complete, so an interrupted
    /// download never leaves a truncated file under the final name. Size
    /// fields are set on the record only for files written by this call.
    pub fn download_one(
        &self,
        record: &mut FileRecord,
        group_dir: &Path,
    ) -> Result<DownloadOutcome, HarvestError> {
        let destination = destination_path(group_dir, record)?;
        let category_dir = group_dir.join(record.category.as_str());
        fs::create_dir_all(&category_dir)
            .map_err(|err| HarvestError::Filesystem(format!("{}: {err}", category_dir.display())))?;

        if destination.exists() {
            debug!(filename = %record.filename, "already exists");
            return Ok(DownloadOutcome::AlreadyPresent);
        }

        let response = self.fetcher.fetch(&record.url, FetchMode::Streaming)?;
        let declared = response.content_length();
        let mut body = response.into_reader();

        let write_error = |err: io::Error| HarvestError::DownloadWrite {
            filename: record.filename.clone(),
            message: err.to_string(),
        };
        let mut partial = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(&category_dir)
            .map_err(write_error)?;
        io::copy(&mut body, partial.as_file_mut()).map_err(write_error)?;
        partial.as_file().sync_all().map_err(write_error)?;

        if let Err(err) = partial.persist_noclobber(&destination) {
            if err.error.kind() == io::ErrorKind::AlreadyExists {
                debug!(filename = %record.filename, "written concurrently, keeping existing file");
                return Ok(DownloadOutcome::AlreadyPresent);
            }
            return Err(write_error(err.error));
        }

        let bytes = fs::metadata(&destination).map_err(write_error)?.len();
        if let Some(expected) = declared.filter(|expected| *expected != bytes) {
            warn!(
                filename = %record.filename,
                declared = expected,
                written = bytes,
                "content length mismatch"
            );
        }
        record.record_size(bytes);
        info!(filename = %record.filename, size_mb = record.size_mb.unwrap_or_default(), "downloaded");
        Ok(DownloadOutcome::Downloaded { bytes })
    }
}

/// Removes `.part` files left in the category directories of `group_dir`
/// by a run that was killed mid-download. Returns how many were removed.
pub fn remove_stale_partials(group_dir: &Path) -> Result<usize, HarvestError> {
    let filesystem = |path: &Path, err: io::Error| {
        HarvestError::Filesystem(format!("{}: {err}", path.display()))
    };
    let categories = match fs::read_dir(group_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(filesystem(group_dir, err)),
    };

    let mut removed = 0;
    for category in categories {
        let category = category.map_err(|err| filesystem(group_dir, err))?;
        if !category.file_type().map_err(|err| filesystem(group_dir, err))?.is_dir() {
            continue;
        }
        let dir = category.path();
        for entry in fs::read_dir(&dir).map_err(|err| filesystem(dir.as_path(), err))? {
            let entry = entry.map_err(|err| filesystem(dir.as_path(), err))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with(PARTIAL_PREFIX) && name.ends_with(PARTIAL_SUFFIX)) {
                continue;
            }
            let path = entry.path();
            fs::remove_file(&path).map_err(|err| filesystem(path.as_path(), err))?;
            warn!(path = %path.display(), "removed partial download from an interrupted run");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Final location of a record, rejecting names that would escape the category directory.
pub fn destination_path(group_dir: &Path, record: &FileRecord) -> Result<PathBuf, HarvestError> {
    let name = record.filename.as_str();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(HarvestError::InvalidFilename(name.to_string()));
    }
    Ok(group_dir.join(record.category.as_str()).join(name))
}
