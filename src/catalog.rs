//! Release/tag universe and the "latest tag for a version" rule.
//!
//! The catalog is loaded once per run through a [`CatalogSource`] collaborator
//! and is read-only afterwards. Absence of a tag for a version is a normal
//! value (`None`), never an error; the only fallible step is the initial load,
//! whose transport errors propagate unchanged. Retrying over *different*
//! versions is the resolver's job, not the catalog's.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::info;

use crate::model::{BuildTag, Release};
use crate::source::{FetchError, GitilesClient};

/// Project whose tags define the build-tag universe.
pub const FRAMEWORK_PROJECT: &str = "platform/frameworks/base";

// ============================================================================
// Version ordering
// ============================================================================

/// Compares two version strings in release-chronological order.
///
/// Versions tokenize into (number, alpha-suffix) pairs (`"4.4w"` becomes
/// `(4, "")`, `(4, "w")`); pairs compare numerically then by suffix, with
/// missing tokens padded as `(0, "")`. Under this scheme `"5.1"` and
/// `"5.1.0"` compare equal, which is what tag matching relies on.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let ta = version_tokens(a);
    let tb = version_tokens(b);
    for i in 0..ta.len().max(tb.len()) {
        let (na, sa) = ta.get(i).map_or((0, ""), |(n, s)| (*n, s.as_str()));
        let (nb, sb) = tb.get(i).map_or((0, ""), |(n, s)| (*n, s.as_str()));

        match na.cmp(&nb).then_with(|| sa.cmp(sb)) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    Ordering::Equal
}

fn version_tokens(version: &str) -> Vec<(u64, String)> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| Regex::new(r"(\d+)([a-zA-Z]*)").expect("valid regex"));
    token
        .captures_iter(version)
        .map(|c| (c[1].parse().unwrap_or(u64::MAX), c[2].to_string()))
        .collect()
}

/// Chronological ordering of build tags: version first, then revision.
pub fn compare_build_tags(a: &BuildTag, b: &BuildTag) -> Ordering {
    compare_versions(&a.version, &b.version)
        .then_with(|| compare_versions(&a.revision, &b.revision))
}

/// Parses a platform build tag name into a [`BuildTag`].
///
/// Only `android[-security]-<version>_r<revision>` names with a numeric
/// version qualify; cts/wear/preview and other non-platform tags yield `None`.
pub fn parse_build_tag(name: &str) -> Option<BuildTag> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| {
        Regex::new(r"^android(-security)?-([0-9][0-9a-zA-Z.]*)_r([0-9][0-9.]*)$")
            .expect("valid regex")
    });

    let captures = tag.captures(name)?;
    Some(BuildTag {
        tag: name.to_string(),
        version: captures[2].to_string(),
        revision: captures[3].to_string(),
        is_security: captures.get(1).is_some(),
    })
}

// ============================================================================
// Static release table
// ============================================================================

/// API levels and their point versions, oldest → newest within each level.
///
/// The upstream release documentation carries no machine-readable form of
/// this mapping; the table changes only when a new platform version ships.
const RELEASE_TABLE: &[(u32, Option<&str>, &[&str])] = &[
    (1, None, &["1.0"]),
    (2, None, &["1.1"]),
    (3, Some("Cupcake"), &["1.5"]),
    (4, Some("Donut"), &["1.6"]),
    (5, Some("Eclair"), &["2.0"]),
    (6, Some("Eclair"), &["2.0.1"]),
    (7, Some("Eclair"), &["2.1"]),
    (8, Some("Froyo"), &["2.2", "2.2.1", "2.2.2", "2.2.3"]),
    (9, Some("Gingerbread"), &["2.3", "2.3.1", "2.3.2"]),
    (
        10,
        Some("Gingerbread"),
        &["2.3.3", "2.3.4", "2.3.5", "2.3.6", "2.3.7"],
    ),
    (11, Some("Honeycomb"), &["3.0"]),
    (12, Some("Honeycomb"), &["3.1"]),
    (
        13,
        Some("Honeycomb"),
        &["3.2", "3.2.1", "3.2.2", "3.2.4", "3.2.6"],
    ),
    (14, Some("Ice Cream Sandwich"), &["4.0.1", "4.0.2"]),
    (15, Some("Ice Cream Sandwich"), &["4.0.3", "4.0.4"]),
    (16, Some("Jelly Bean"), &["4.1.1", "4.1.2"]),
    (17, Some("Jelly Bean"), &["4.2", "4.2.1", "4.2.2"]),
    (18, Some("Jelly Bean"), &["4.3", "4.3.1"]),
    (
        19,
        Some("KitKat"),
        &["4.4", "4.4.1", "4.4.2", "4.4.3", "4.4.4"],
    ),
    (20, Some("KitKat Wear"), &["4.4w"]),
    (21, Some("Lollipop"), &["5.0.0", "5.0.1", "5.0.2", "5.1.0"]),
    (22, Some("Lollipop"), &["5.1.1"]),
    (23, Some("Marshmallow"), &["6.0.0", "6.0.1"]),
    (24, Some("Nougat"), &["7.0.0"]),
    (25, Some("Nougat"), &["7.1.0", "7.1.1", "7.1.2"]),
    (26, Some("Oreo"), &["8.0.0"]),
    (27, Some("Oreo"), &["8.1.0"]),
    (28, Some("Pie"), &["9.0.0"]),
    (29, Some("Android 10"), &["10.0.0"]),
    (30, Some("Android 11"), &["11.0.0"]),
    (31, Some("Android 12"), &["12.0.0"]),
    (32, Some("Android 12L"), &["12.1.0"]),
    (33, Some("Android 13"), &["13.0.0"]),
    (34, Some("Android 14"), &["14.0.0"]),
];

fn static_releases() -> Vec<Release> {
    RELEASE_TABLE
        .iter()
        .map(|(api, name, versions)| Release {
            api: *api,
            name: name.map(str::to_string),
            versions: versions.iter().map(|v| v.to_string()).collect(),
        })
        .collect()
}

// ============================================================================
// Catalog
// ============================================================================

/// Collaborator that queries the external source-control system for the tag
/// universe.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Returns every tag name of the platform framework project.
    async fn fetch_tag_names(&self) -> Result<Vec<String>, FetchError>;
}

#[async_trait]
impl CatalogSource for GitilesClient {
    async fn fetch_tag_names(&self) -> Result<Vec<String>, FetchError> {
        self.list_tags(FRAMEWORK_PROJECT).await
    }
}

/// The release/tag universe for one run.
///
/// Owned by the orchestrator for the run's lifetime; loaded once, read-only
/// thereafter.
pub struct VersionCatalog {
    releases: Vec<Release>,
    build_tags: Vec<BuildTag>,
}

impl VersionCatalog {
    /// Loads the full universe through `source`.
    ///
    /// # Errors
    ///
    /// Propagates the collaborator's transport error unchanged. No retry
    /// happens here.
    pub async fn load(source: &dyn CatalogSource) -> Result<Self, FetchError> {
        let names = source.fetch_tag_names().await?;
        let mut build_tags: Vec<BuildTag> =
            names.iter().filter_map(|n| parse_build_tag(n)).collect();
        build_tags.sort_by(|a, b| compare_build_tags(a, b).then_with(|| a.tag.cmp(&b.tag)));

        let releases = static_releases();
        info!(
            releases = releases.len(),
            build_tags = build_tags.len(),
            "catalog loaded"
        );

        Ok(Self {
            releases,
            build_tags,
        })
    }

    /// All known releases, ascending by API level.
    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    /// All known build tags, chronologically sorted.
    pub fn build_tags(&self) -> &[BuildTag] {
        &self.build_tags
    }

    /// The most recent build tag matching `version`, or `None` when the
    /// version has no tag at all.
    pub fn latest_build_tag(&self, version: &str) -> Option<&BuildTag> {
        self.build_tags
            .iter()
            .filter(|t| compare_versions(&t.version, version).is_eq())
            .max_by(|a, b| compare_build_tags(a, b))
    }

    /// Releases keyed by API level, for the reference dataset.
    pub fn releases_by_api(&self) -> BTreeMap<u32, &Release> {
        self.releases.iter().map(|r| (r.api, r)).collect()
    }

    /// Build tags keyed by tag name, for the reference dataset.
    pub fn build_tags_by_name(&self) -> BTreeMap<&str, &BuildTag> {
        self.build_tags.iter().map(|t| (t.tag.as_str(), t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Vec<&'static str>);

    #[async_trait]
    impl CatalogSource for FixedSource {
        async fn fetch_tag_names(&self) -> Result<Vec<String>, FetchError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    async fn catalog_with(tags: Vec<&'static str>) -> VersionCatalog {
        VersionCatalog::load(&FixedSource(tags)).await.unwrap()
    }

    #[test]
    fn test_version_ordering_is_chronological_not_lexical() {
        assert_eq!(compare_versions("9.0.0", "11.0.0"), Ordering::Less);
        assert_eq!(compare_versions("2.3.4", "2.3.4"), Ordering::Equal);
        assert_eq!(compare_versions("4.4", "4.4w"), Ordering::Less);
        assert_eq!(compare_versions("4.4w", "5.0.0"), Ordering::Less);
    }

    #[test]
    fn test_version_ordering_pads_missing_components() {
        assert_eq!(compare_versions("5.1", "5.1.0"), Ordering::Equal);
        assert_eq!(compare_versions("5.1", "5.1.1"), Ordering::Less);
    }

    #[test]
    fn test_revision_ordering_is_numeric() {
        let r1 = parse_build_tag("android-1.6_r1.1").unwrap();
        let r2 = parse_build_tag("android-1.6_r2").unwrap();
        let r11 = parse_build_tag("android-1.6_r11").unwrap();
        assert_eq!(compare_build_tags(&r1, &r2), Ordering::Less);
        assert_eq!(compare_build_tags(&r2, &r11), Ordering::Less);
    }

    #[test]
    fn test_tag_parsing_accepts_platform_and_security_tags() {
        let tag = parse_build_tag("android-11.0.0_r1").unwrap();
        assert_eq!(tag.version, "11.0.0");
        assert_eq!(tag.revision, "1");
        assert!(!tag.is_security);

        let security = parse_build_tag("android-security-11.0.0_r60").unwrap();
        assert_eq!(security.version, "11.0.0");
        assert!(security.is_security);
    }

    #[test]
    fn test_tag_parsing_rejects_non_platform_tags() {
        assert!(parse_build_tag("android-cts-7.0_r33").is_none());
        assert!(parse_build_tag("android-wear-5.1.1_r1").is_none());
        assert!(parse_build_tag("android-o-preview-1").is_none());
        assert!(parse_build_tag("aml_tz4_331012000").is_none());
    }

    #[tokio::test]
    async fn test_latest_build_tag_prefers_highest_revision() {
        let catalog = catalog_with(vec![
            "android-11.0.0_r1",
            "android-11.0.0_r17",
            "android-11.0.0_r3",
            "android-cts-11.0_r5",
        ])
        .await;

        let latest = catalog.latest_build_tag("11.0.0").unwrap();
        assert_eq!(latest.tag, "android-11.0.0_r17");
    }

    #[tokio::test]
    async fn test_latest_build_tag_matches_padded_versions() {
        let catalog = catalog_with(vec!["android-5.1_r1"]).await;
        // "5.1.0" from the release table matches the "5.1" tag family.
        assert_eq!(
            catalog.latest_build_tag("5.1.0").unwrap().tag,
            "android-5.1_r1"
        );
    }

    #[tokio::test]
    async fn test_latest_build_tag_absence_is_none() {
        let catalog = catalog_with(vec!["android-11.0.0_r1"]).await;
        assert!(catalog.latest_build_tag("3.0").is_none());
    }

    #[tokio::test]
    async fn test_releases_cover_contiguous_api_levels() {
        let catalog = catalog_with(vec![]).await;
        let releases = catalog.releases();

        assert_eq!(releases.first().unwrap().api, 1);
        assert_eq!(releases.last().unwrap().api, 34);
        // Unique, ascending, versions non-empty.
        for pair in releases.windows(2) {
            assert!(pair[0].api < pair[1].api);
        }
        assert!(releases.iter().all(|r| !r.versions.is_empty()));
    }
}
