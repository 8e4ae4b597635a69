//! Domain types shared across harvest kinds.
//!
//! Everything here is a plain serde value: payloads are produced once by a
//! harvest task, serialized by the dataset writer, and never mutated. Map
//! fields use [`BTreeMap`] so serialized key order is stable across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Release universe
// ============================================================================

/// One platform API level and its ordered point versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// API level, unique across the catalog
    pub api: u32,

    /// Marketing / codename for this level (e.g., "KitKat Wear")
    pub name: Option<String>,

    /// Point versions belonging to this level, oldest → newest
    pub versions: Vec<String>,
}

/// A concrete, fetchable source-tree tag for one point version.
///
/// Parsed from tag names of the form `android[-security]-<version>_r<revision>`.
/// Zero or more tags may exist per version; absence is expected, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTag {
    /// Full tag name (e.g., "android-11.0.0_r1")
    pub tag: String,

    /// Platform version the tag belongs to (e.g., "11.0.0")
    pub version: String,

    /// Release revision within the version (e.g., "1", "1.1")
    pub revision: String,

    /// Whether this is a security-branch tag
    pub is_security: bool,
}

// ============================================================================
// Permission definitions
// ============================================================================

/// Markers from the doc comment immediately preceding a manifest element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceComment {
    pub deprecated: bool,
    pub system_api: bool,
    pub test_api: bool,
    pub hide: bool,
}

/// A `<permission-group>` declaration from the framework core manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroup {
    pub name: String,
    pub description: Option<String>,
    pub label: Option<String>,
    pub priority: i32,
    pub comment: SourceComment,
}

/// A `<permission>` declaration from the framework core manifest.
///
/// `description` and `label` are already resolved through the resource string
/// table; `group` embeds the full group declaration rather than its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    pub description: Option<String>,
    pub label: Option<String>,
    pub group: Option<PermissionGroup>,
    pub protection_levels: Vec<String>,
    pub permission_flags: Vec<String>,
    pub priority: i32,
    pub comment: SourceComment,
}

/// Payload of one permission-definitions snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub permission_groups: BTreeMap<String, PermissionGroup>,
    pub permissions: BTreeMap<String, Permission>,
}

// ============================================================================
// API-to-permission mappings
// ============================================================================

/// The API surface a permission requirement is attached to.
///
/// Serialized with a `type` discriminator so method and field entries can be
/// told apart in the flat mapping files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiSurface {
    Method {
        class_name: String,
        name: String,
        args: Vec<String>,
        return_value: String,
        /// JVM descriptor computed from `args` and `return_value`
        signature: String,
    },
    Field {
        class_name: String,
        name: String,
    },
}

/// One `RequiresPermission` entry extracted from SDK annotation data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApiPermission {
    pub api: ApiSurface,
    pub permissions: Vec<String>,
    /// `true` when any one of `permissions` suffices, `false` when all are required
    pub any_of: bool,
}

// ============================================================================
// Content providers
// ============================================================================

/// Which `<grant-uri-permission>` attribute matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UriMatch {
    Path,
    PathPrefix,
    PathPattern,
}

/// One `<grant-uri-permission>` child of a provider declaration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UriPermission {
    #[serde(rename = "type")]
    pub kind: UriMatch,
    pub path: String,
}

/// A content provider declared in a platform manifest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentProvider {
    /// Package of the declaring manifest
    pub package: String,

    /// Fully qualified provider class name
    pub name: String,

    /// Authorities served by this provider, `${packageName}` already substituted
    pub authorities: Vec<String>,

    pub exported: bool,
    pub read_permission: Option<String>,
    pub write_permission: Option<String>,

    /// Whether the provider grants URI permissions
    pub has_uri_permission: bool,
    pub grant_uri_permissions: Vec<UriPermission>,
}

impl ContentProvider {
    /// Whether any access to this provider is gated by a permission.
    pub fn needs_permission(&self) -> bool {
        self.read_permission.is_some() || self.write_permission.is_some()
    }
}

/// Payload of the provider harvest: the full provider list plus the subset
/// gated by a permission. The two lists are written as sibling datasets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub all: Vec<ContentProvider>,
    pub requiring_permission: Vec<ContentProvider>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_surface_serializes_with_type_tag() {
        let field = ApiSurface::Field {
            class_name: "android.provider.Settings".to_string(),
            name: "ACTION_SETTINGS".to_string(),
        };

        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "field");
        assert_eq!(json["class_name"], "android.provider.Settings");

        let back: ApiSurface = serde_json::from_value(json).unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn test_uri_match_uses_manifest_attribute_names() {
        let uri = UriPermission {
            kind: UriMatch::PathPrefix,
            path: "/documents".to_string(),
        };
        let json = serde_json::to_value(&uri).unwrap();
        assert_eq!(json["type"], "pathPrefix");
        assert_eq!(json["path"], "/documents");
    }

    #[test]
    fn test_provider_permission_gating() {
        let mut provider = ContentProvider {
            package: "com.android.providers.media".to_string(),
            name: "com.android.providers.media.MediaProvider".to_string(),
            authorities: vec!["media".to_string()],
            exported: true,
            read_permission: None,
            write_permission: None,
            has_uri_permission: false,
            grant_uri_permissions: Vec::new(),
        };
        assert!(!provider.needs_permission());

        provider.write_permission = Some("android.permission.WRITE_MEDIA_STORAGE".to_string());
        assert!(provider.needs_permission());
    }
}
