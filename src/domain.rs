use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Documents,
    Videos,
    Audio,
    Images,
    Archives,
    Other,
}

impl Category {
    /// Directory name used under a group directory.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Documents => "documents",
            Category::Videos => "videos",
            Category::Audio => "audio",
            Category::Images => "images",
            Category::Archives => "archives",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a lowercased extension (with leading dot) to its category.
///
/// Both the web and CSV sources go through this table, so a record's
/// category only ever depends on its `file_type`.
pub fn classify(file_type: &str) -> Category {
    match file_type {
        ".pdf" | ".doc" | ".docx" | ".txt" | ".rtf" => Category::Documents,
        ".mp4" | ".mov" | ".avi" | ".wmv" | ".flv" => Category::Videos,
        ".mp3" | ".wav" | ".m4a" | ".aac" | ".ogg" => Category::Audio,
        ".jpg" | ".jpeg" | ".png" | ".gif" | ".bmp" | ".tiff" => Category::Images,
        ".zip" | ".rar" | ".7z" => Category::Archives,
        _ => Category::Other,
    }
}

/// Lowercased extension of the final path segment, including the dot.
///
/// Returns an empty string for names without an extension, hidden names
/// such as `.profile`, and names ending in a dot.
pub fn file_type_of(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => name[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    pub url: String,
    #[serde(rename = "data_set")]
    pub group_id: u32,
    pub file_type: String,
    pub category: Category,
    #[serde(
        rename = "file_size_bytes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub size_bytes: Option<u64>,
    #[serde(
        rename = "file_size_mb",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub size_mb: Option<f64>,
}

impl FileRecord {
    pub fn new(filename: impl Into<String>, url: impl Into<String>, group_id: u32) -> Self {
        let filename = filename.into();
        let file_type = file_type_of(&filename);
        let category = classify(&file_type);
        Self {
            filename,
            url: url.into(),
            group_id,
            file_type,
            category,
            size_bytes: None,
            size_mb: None,
        }
    }

    pub fn record_size(&mut self, bytes: u64) {
        self.size_bytes = Some(bytes);
        self.size_mb = Some(round_mib(bytes));
    }

    pub fn has_size(&self) -> bool {
        self.size_bytes.is_some()
    }
}

fn round_mib(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MIB * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupListing {
    pub group_id: u32,
    pub records: Vec<FileRecord>,
}

impl GroupListing {
    pub fn new(group_id: u32, records: Vec<FileRecord>) -> Self {
        Self { group_id, records }
    }

    pub fn key(&self) -> String {
        group_key(self.group_id)
    }

    pub fn category_counts(&self) -> BTreeMap<Category, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.category).or_insert(0) += 1;
        }
        counts
    }
}

pub fn group_key(group_id: u32) -> String {
    format!("data_set_{group_id}")
}

/// Everything collected in one run, in the order groups were processed.
///
/// Serializes as a JSON object keyed by `data_set_<id>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetadata {
    groups: Vec<GroupListing>,
}

impl RunMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listing, replacing any earlier listing for the same group.
    pub fn insert(&mut self, listing: GroupListing) {
        match self
            .groups
            .iter_mut()
            .find(|existing| existing.group_id == listing.group_id)
        {
            Some(existing) => *existing = listing,
            None => self.groups.push(listing),
        }
    }

    pub fn get(&self, group_id: u32) -> Option<&GroupListing> {
        self.groups.iter().find(|group| group.group_id == group_id)
    }

    pub fn groups(&self) -> &[GroupListing] {
        &self.groups
    }

    pub fn total_records(&self) -> usize {
        self.groups.iter().map(|group| group.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl Serialize for RunMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for group in &self.groups {
            map.serialize_entry(&group.key(), &group.records)?;
        }
        map.end()
    }
}
