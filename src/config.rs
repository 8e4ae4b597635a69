//! Run configuration.
//!
//! One explicit [`RunConfig`] value is passed to every component that needs a
//! filesystem root or an upstream endpoint. There are no process-wide toggles;
//! directory preparation happens once per distinct path in the writer.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one harvest run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root directory for all datasets, wiped and recreated at run start.
    pub output_root: PathBuf,

    /// Cache directory for downloaded SDK platform archives. Survives runs;
    /// an archive already present on disk is not fetched again.
    pub download_root: PathBuf,

    /// Reference for the unversioned "current main tree" snapshots.
    pub main_ref: String,

    /// Lowest API level harvested at all.
    pub min_api: u32,

    /// Levels with no meaningful or reachable data, skipped unconditionally.
    pub excluded_apis: Vec<u32>,

    /// Lowest API level for which API-to-permission mappings exist.
    pub mapping_min_api: u32,

    /// Spacing between successive manifest fetches in the provider sweep.
    pub request_delay: Duration,

    /// Base URL of the source-control host serving tags and file contents.
    pub gitiles_base: String,

    /// Base URL of the SDK package repository.
    pub sdk_repository_base: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("outputs"),
            download_root: PathBuf::from("download_tmp"),
            main_ref: "refs/heads/main".to_string(),
            min_api: 4,
            excluded_apis: vec![11, 12, 20],
            mapping_min_api: 26,
            request_delay: Duration::from_secs(1),
            gitiles_base: "https://android.googlesource.com".to_string(),
            sdk_repository_base: "https://dl.google.com/android/repository".to_string(),
        }
    }
}

impl RunConfig {
    /// Sets the output root.
    pub fn with_output_root(mut self, root: PathBuf) -> Self {
        self.output_root = root;
        self
    }

    /// Sets the archive download cache directory.
    pub fn with_download_root(mut self, root: PathBuf) -> Self {
        self.download_root = root;
        self
    }

    /// Sets the main-tree reference.
    pub fn with_main_ref(mut self, main_ref: String) -> Self {
        self.main_ref = main_ref;
        self
    }

    /// Whether an API level is inside the supported harvest range.
    pub fn is_supported(&self, api: u32) -> bool {
        api >= self.min_api && !self.excluded_apis.contains(&api)
    }

    /// Whether an API level is eligible for the mapping harvest.
    pub fn has_mappings(&self, api: u32) -> bool {
        self.is_supported(api) && api >= self.mapping_min_api
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_range_floors_and_excludes() {
        let config = RunConfig::default();

        assert!(!config.is_supported(3));
        assert!(config.is_supported(4));
        assert!(!config.is_supported(11));
        assert!(!config.is_supported(12));
        assert!(!config.is_supported(20));
        assert!(config.is_supported(13));
        assert!(config.is_supported(34));
    }

    #[test]
    fn test_mapping_range_has_higher_floor() {
        let config = RunConfig::default();

        assert!(!config.has_mappings(25));
        assert!(config.has_mappings(26));
        assert!(config.has_mappings(30));
    }
}
