use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::{BaseDirs, UserDirs};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::HarvestError;

pub const DEFAULT_CONFIG_FILE: &str = "harvest.json";
pub const DEFAULT_BASE_URL: &str = "https://www.justice.gov";
pub const DEFAULT_LANDING_URL: &str = "https://www.justice.gov/epstein/doj-disclosures";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_FILENAME_PATTERN: &str = r"EFTA\d+";
pub const DEFAULT_GROUP_LINK_PATTERN: &str = r"data-set-(\d+)-files";
pub const DEFAULT_METADATA_FILE: &str = "metadata.json";

const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 30.0;
const DEFAULT_RATE_LIMIT_DELAY_SECS: f64 = 2.0;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: f64 = 10.0;

pub const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] = &[
    ".pdf", ".mp4", ".mov", ".avi", ".wmv", ".flv", ".mp3", ".wav", ".m4a", ".aac", ".ogg",
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".doc", ".docx", ".txt", ".rtf", ".zip",
    ".rar", ".7z",
];

/// On-disk configuration. Every key is optional and falls back to the defaults above.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub landing_url: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<f64>,
    #[serde(default)]
    pub rate_limit_delay_secs: Option<f64>,
    /// Total attempts per request, the first one included.
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_secs: Option<f64>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub logs_dir: Option<String>,
    #[serde(default)]
    pub metadata_file: Option<String>,
    #[serde(default)]
    pub groups: Option<Vec<u32>>,
    #[serde(default)]
    pub supported_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub filename_pattern: Option<String>,
    #[serde(default)]
    pub group_link_pattern: Option<String>,
    #[serde(default)]
    pub download_files: Option<bool>,
}

/// Values supplied by the command line; applied after the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_root: Option<Utf8PathBuf>,
    pub logs_root: Option<Utf8PathBuf>,
    pub groups: Option<Vec<u32>>,
    pub download_files: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSelection {
    All,
    Only(BTreeSet<u32>),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectedGroups {
    pub selected: Vec<u32>,
    pub missing: Vec<u32>,
}

impl GroupSelection {
    pub fn from_ids(ids: impl IntoIterator<Item = u32>) -> Self {
        GroupSelection::Only(ids.into_iter().collect())
    }

    pub fn contains(&self, group_id: u32) -> bool {
        match self {
            GroupSelection::All => true,
            GroupSelection::Only(ids) => ids.contains(&group_id),
        }
    }

    /// Splits the selection into available ids (ascending) and requested ids that are absent.
    pub fn resolve(&self, available: impl IntoIterator<Item = u32>) -> SelectedGroups {
        let available: BTreeSet<u32> = available.into_iter().collect();
        match self {
            GroupSelection::All => SelectedGroups {
                selected: available.into_iter().collect(),
                missing: Vec::new(),
            },
            GroupSelection::Only(ids) => {
                let (selected, missing) = ids.iter().copied().partition(|id| available.contains(id));
                SelectedGroups { selected, missing }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_url: Url,
    pub landing_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub rate_limit_delay: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub output_root: Utf8PathBuf,
    pub logs_root: Utf8PathBuf,
    pub metadata_filename: String,
    pub groups: GroupSelection,
    pub supported_extensions: BTreeSet<String>,
    pub filename_pattern: String,
    pub group_link_pattern: String,
    pub download_files: bool,
}

impl RunConfig {
    pub fn metadata_path(&self) -> Utf8PathBuf {
        self.output_root.join(&self.metadata_filename)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: &ConfigOverrides,
    ) -> Result<RunConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(ConfigFile::default(), overrides);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: ConfigFile = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: ConfigFile,
        overrides: &ConfigOverrides,
    ) -> Result<RunConfig, HarvestError> {
        let base_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base_url)
            .map_err(|err| HarvestError::InvalidConfig(format!("base_url {base_url}: {err}")))?;
        if !base_url.has_host() {
            return Err(HarvestError::InvalidConfig(format!(
                "base_url {base_url} has no host"
            )));
        }

        let landing_url = config
            .landing_url
            .unwrap_or_else(|| DEFAULT_LANDING_URL.to_string());
        Url::parse(&landing_url).map_err(|err| {
            HarvestError::InvalidConfig(format!("landing_url {landing_url}: {err}"))
        })?;

        let max_retries = config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if max_retries == 0 {
            return Err(HarvestError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }

        let filename_pattern = config
            .filename_pattern
            .unwrap_or_else(|| DEFAULT_FILENAME_PATTERN.to_string());
        RegexBuilder::new(&filename_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|err| HarvestError::InvalidConfig(format!("filename_pattern: {err}")))?;

        let group_link_pattern = config
            .group_link_pattern
            .unwrap_or_else(|| DEFAULT_GROUP_LINK_PATTERN.to_string());
        let group_regex = RegexBuilder::new(&group_link_pattern)
            .build()
            .map_err(|err| HarvestError::InvalidConfig(format!("group_link_pattern: {err}")))?;
        if group_regex.captures_len() < 2 {
            return Err(HarvestError::InvalidConfig(
                "group_link_pattern needs a capture group for the group number".to_string(),
            ));
        }

        let metadata_filename = config
            .metadata_file
            .unwrap_or_else(|| DEFAULT_METADATA_FILE.to_string());
        if metadata_filename.trim().is_empty()
            || metadata_filename.contains(['/', '\\'])
        {
            return Err(HarvestError::InvalidConfig(format!(
                "metadata_file must be a plain file name, got {metadata_filename:?}"
            )));
        }

        let supported_extensions = match config.supported_extensions {
            Some(values) => normalize_extensions(values.iter().map(String::as_str)),
            None => normalize_extensions(DEFAULT_SUPPORTED_EXTENSIONS.iter().copied()),
        };

        let output_root = match (overrides.output_root.clone(), config.output_dir) {
            (Some(path), _) => path,
            (None, Some(path)) => Utf8PathBuf::from(path),
            (None, None) => default_output_root()?,
        };
        let logs_root = match (overrides.logs_root.clone(), config.logs_dir) {
            (Some(path), _) => path,
            (None, Some(path)) => Utf8PathBuf::from(path),
            (None, None) => Utf8PathBuf::from("logs"),
        };

        let groups = match overrides.groups.clone().or(config.groups) {
            Some(ids) => GroupSelection::from_ids(ids),
            None => GroupSelection::All,
        };

        Ok(RunConfig {
            base_url,
            landing_url,
            user_agent: config
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            request_timeout: positive_seconds(
                "request_timeout_secs",
                config
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            )?,
            rate_limit_delay: seconds(
                "rate_limit_delay_secs",
                config
                    .rate_limit_delay_secs
                    .unwrap_or(DEFAULT_RATE_LIMIT_DELAY_SECS),
            )?,
            max_retries,
            retry_delay: seconds(
                "retry_delay_secs",
                config.retry_delay_secs.unwrap_or(DEFAULT_RETRY_DELAY_SECS),
            )?,
            output_root,
            logs_root,
            metadata_filename,
            groups,
            supported_extensions,
            filename_pattern,
            group_link_pattern,
            download_files: overrides
                .download_files
                .or(config.download_files)
                .unwrap_or(true),
        })
    }
}

/// Lowercases extensions and makes sure each carries a leading dot.
pub fn normalize_extensions<'a>(values: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty() && value != ".")
        .map(|value| {
            if value.starts_with('.') {
                value
            } else {
                format!(".{value}")
            }
        })
        .collect()
}

fn seconds(key: &str, value: f64) -> Result<Duration, HarvestError> {
    Duration::try_from_secs_f64(value)
        .map_err(|err| HarvestError::InvalidConfig(format!("{key} = {value}: {err}")))
}

fn positive_seconds(key: &str, value: f64) -> Result<Duration, HarvestError> {
    let duration = seconds(key, value)?;
    if duration.is_zero() {
        return Err(HarvestError::InvalidConfig(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(duration)
}

fn default_output_root() -> Result<Utf8PathBuf, HarvestError> {
    let documents = UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(|dir| dir.to_path_buf()))
        .or_else(|| BaseDirs::new().map(|dirs| dirs.home_dir().join("Documents")))
        .ok_or_else(|| {
            HarvestError::InvalidConfig("unable to resolve a documents directory".to_string())
        })?;
    Utf8PathBuf::from_path_buf(documents.join("Epstein"))
        .map_err(|_| HarvestError::InvalidConfig("non-UTF-8 output directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_normalized() {
        let set = normalize_extensions(["PDF", ".Mp4", " ", "."]);
        assert_eq!(
            set.into_iter().collect::<Vec<_>>(),
            vec![".mp4".to_string(), ".pdf".to_string()]
        );
    }

    #[test]
    fn selection_splits_missing_ids() {
        let selection = GroupSelection::from_ids([3, 1, 9]);
        let resolved = selection.resolve([1, 2, 3]);
        assert_eq!(resolved.selected, vec![1, 3]);
        assert_eq!(resolved.missing, vec![9]);

        let all = GroupSelection::All.resolve([4, 2]);
        assert_eq!(all.selected, vec![2, 4]);
        assert!(all.missing.is_empty());
    }
}
