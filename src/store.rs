use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{Category, RunMetadata};
use crate::error::HarvestError;

/// On-disk layout under the output root.
#[derive(Debug, Clone)]
pub struct Layout {
    output_root: Utf8PathBuf,
}

impl Layout {
    pub fn new(output_root: Utf8PathBuf) -> Self {
        Self { output_root }
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub fn group_dir(&self, group_id: u32) -> Utf8PathBuf {
        self.output_root.join(format!("group_{group_id}"))
    }

    pub fn category_dir(&self, group_id: u32, category: Category) -> Utf8PathBuf {
        self.group_dir(group_id).join(category.as_str())
    }

    pub fn metadata_path(&self, filename: &str) -> Utf8PathBuf {
        self.output_root.join(filename)
    }

    pub fn ensure_output_root(&self) -> Result<(), HarvestError> {
        fs::create_dir_all(self.output_root.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("{}: {err}", self.output_root)))
    }

    pub fn ensure_group_dir(&self, group_id: u32) -> Result<Utf8PathBuf, HarvestError> {
        let dir = self.group_dir(group_id);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("{dir}: {err}")))?;
        Ok(dir)
    }
}

/// Writes the metadata document as indented JSON, replacing any previous file.
pub fn write_metadata(metadata: &RunMetadata, path: &Path) -> Result<(), HarvestError> {
    let persistence = |message: String| HarvestError::Persistence {
        path: path.to_path_buf(),
        message,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| persistence(err.to_string()))?;
    }
    let mut content =
        serde_json::to_vec_pretty(metadata).map_err(|err| persistence(err.to_string()))?;
    content.push(b'\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &content).map_err(|err| persistence(err.to_string()))?;
    fs::rename(&tmp_path, path).map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        persistence(err.to_string())
    })?;
    Ok(())
}
