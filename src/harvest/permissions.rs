//! Permission-definition harvest.
//!
//! Extracts `<permission>` and `<permission-group>` declarations from the
//! framework core manifest at one resolved reference, resolving
//! `@string/...` descriptions and labels through the resource string table
//! of the same tree. Doc-comment markers immediately preceding an element
//! (`@deprecated`, `@SystemApi`, `@TestApi`, `@hide`) are carried along as
//! [`SourceComment`] flags.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use roxmltree::{Document, Node};

use super::traits::{HarvestError, HarvestOutcome, HarvestResult, HarvestTask};
use crate::catalog::FRAMEWORK_PROJECT;
use crate::model::{Permission, PermissionGroup, PermissionSet, SourceComment};
use crate::source::GitilesClient;

/// Namespace of `android:` attributes in platform manifests.
pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

const CORE_MANIFEST: &str = "core/res/AndroidManifest.xml";
const RES_STRINGS: &str = "core/res/res/values/strings.xml";
const STRING_REF_PREFIX: &str = "@string/";

/// Harvest task for permission definitions.
pub struct PermissionHarvest {
    source: Arc<GitilesClient>,
}

impl PermissionHarvest {
    pub fn new(source: Arc<GitilesClient>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl HarvestTask for PermissionHarvest {
    type Payload = PermissionSet;

    fn kind(&self) -> &'static str {
        "permissions"
    }

    async fn run(&self, reference: &str) -> HarvestResult<PermissionSet> {
        let manifest = match HarvestOutcome::from_fetch(
            self.source
                .source_file(FRAMEWORK_PROJECT, reference, CORE_MANIFEST)
                .await,
        )? {
            HarvestOutcome::Success(text) => text,
            HarvestOutcome::NotFound => return Ok(HarvestOutcome::NotFound),
        };

        let strings = match HarvestOutcome::from_fetch(
            self.source
                .source_file(FRAMEWORK_PROJECT, reference, RES_STRINGS)
                .await,
        )? {
            HarvestOutcome::Success(text) => text,
            HarvestOutcome::NotFound => return Ok(HarvestOutcome::NotFound),
        };

        let res_strings = parse_res_strings(&strings)?;
        let set = parse_core_manifest(&manifest, &res_strings)?;
        Ok(HarvestOutcome::Success(set))
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn android_attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute((ANDROID_NS, name))
}

/// Flags from the comment node immediately preceding `node`, if any.
///
/// Whitespace between the comment and the element is skipped; any other
/// intervening element means the comment belongs to someone else.
fn leading_comment(node: Node<'_, '_>) -> SourceComment {
    for sibling in node.prev_siblings() {
        if sibling.is_comment() {
            let text = sibling.text().unwrap_or_default();
            return SourceComment {
                deprecated: text.contains("@deprecated"),
                system_api: text.contains("@SystemApi"),
                test_api: text.contains("@TestApi"),
                hide: text.contains("@hide"),
            };
        }
        if sibling.is_element() {
            break;
        }
    }
    SourceComment::default()
}

/// Parses the resource string table.
fn parse_res_strings(xml: &str) -> Result<BTreeMap<String, String>, HarvestError> {
    let doc = Document::parse(xml).map_err(|e| HarvestError::parse(RES_STRINGS, e))?;
    let mut strings = BTreeMap::new();
    for node in doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("string"))
    {
        if let Some(name) = node.attribute("name") {
            strings.insert(
                name.to_string(),
                node.text().unwrap_or_default().to_string(),
            );
        }
    }
    Ok(strings)
}

/// Resolves a raw attribute value that may be a `@string/...` reference.
fn resolve_text(
    raw: Option<&str>,
    strings: &BTreeMap<String, String>,
) -> Result<Option<String>, HarvestError> {
    match raw {
        None => Ok(None),
        Some(text) if text.starts_with('@') => {
            let resolved = text
                .strip_prefix(STRING_REF_PREFIX)
                .and_then(|key| strings.get(key));
            match resolved {
                Some(value) => Ok(Some(value.clone())),
                None => Err(HarvestError::parse(
                    CORE_MANIFEST,
                    format!("unknown string resource id: {text}"),
                )),
            }
        }
        Some(text) => Ok(Some(text.to_string())),
    }
}

fn parse_priority(raw: Option<&str>) -> Result<i32, HarvestError> {
    match raw {
        None => Ok(0),
        Some(p) => p
            .parse()
            .map_err(|e| HarvestError::parse(CORE_MANIFEST, format!("bad priority {p:?}: {e}"))),
    }
}

/// Splits a `|`-separated attribute into its parts.
fn split_values(raw: Option<&str>) -> Vec<String> {
    raw.map_or_else(Vec::new, |text| {
        text.split('|').map(str::to_string).collect()
    })
}

/// Extracts the full permission set from the core manifest.
fn parse_core_manifest(
    xml: &str,
    strings: &BTreeMap<String, String>,
) -> Result<PermissionSet, HarvestError> {
    let doc = Document::parse(xml).map_err(|e| HarvestError::parse(CORE_MANIFEST, e))?;
    let root = doc.root_element();

    let mut groups: BTreeMap<String, PermissionGroup> = BTreeMap::new();
    for node in root
        .children()
        .filter(|n| n.has_tag_name("permission-group"))
    {
        let Some(name) = android_attr(node, "name") else {
            continue;
        };
        groups.insert(
            name.to_string(),
            PermissionGroup {
                name: name.to_string(),
                description: resolve_text(android_attr(node, "description"), strings)?,
                label: resolve_text(android_attr(node, "label"), strings)?,
                priority: parse_priority(android_attr(node, "priority"))?,
                comment: leading_comment(node),
            },
        );
    }

    let mut permissions: BTreeMap<String, Permission> = BTreeMap::new();
    for node in root.children().filter(|n| n.has_tag_name("permission")) {
        let Some(name) = android_attr(node, "name") else {
            continue;
        };

        let group = match android_attr(node, "group") {
            None => None,
            Some(group_name) => Some(
                groups
                    .get(group_name)
                    .cloned()
                    .ok_or_else(|| {
                        HarvestError::parse(
                            CORE_MANIFEST,
                            format!("permission {name} references unknown group {group_name}"),
                        )
                    })?,
            ),
        };

        permissions.insert(
            name.to_string(),
            Permission {
                name: name.to_string(),
                description: resolve_text(android_attr(node, "description"), strings)?,
                label: resolve_text(android_attr(node, "label"), strings)?,
                group,
                protection_levels: split_values(android_attr(node, "protectionLevel")),
                permission_flags: split_values(android_attr(node, "permissionFlags")),
                priority: parse_priority(android_attr(node, "priority"))?,
                comment: leading_comment(node),
            },
        );
    }

    Ok(PermissionSet {
        permission_groups: groups,
        permissions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRINGS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<resources>
    <string name="permgrouplab_network">Réseau – accès réseau</string>
    <string name="permgroupdesc_network">access various network features</string>
    <string name="permlab_internet">have full network access</string>
</resources>"#;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="android">

    <permission-group android:name="android.permission-group.NETWORK"
        android:label="@string/permgrouplab_network"
        android:description="@string/permgroupdesc_network"
        android:priority="270" />

    <!-- Allows applications to open network sockets. -->
    <permission android:name="android.permission.INTERNET"
        android:group="android.permission-group.NETWORK"
        android:label="@string/permlab_internet"
        android:protectionLevel="normal|instant" />

    <!-- @SystemApi @hide Allows access to the vendor HAL. -->
    <permission android:name="android.permission.VENDOR_HAL"
        android:protectionLevel="signature"
        android:permissionFlags="removed|instant" />

    <permission android:name="android.permission.PLAIN"
        android:label="Literal label" />
</manifest>"#;

    fn parsed() -> PermissionSet {
        let strings = parse_res_strings(STRINGS).unwrap();
        parse_core_manifest(MANIFEST, &strings).unwrap()
    }

    #[test]
    fn test_groups_resolve_string_references() {
        let set = parsed();
        let group = &set.permission_groups["android.permission-group.NETWORK"];
        assert_eq!(group.label.as_deref(), Some("Réseau – accès réseau"));
        assert_eq!(
            group.description.as_deref(),
            Some("access various network features")
        );
        assert_eq!(group.priority, 270);
    }

    #[test]
    fn test_permission_embeds_its_group_and_splits_levels() {
        let set = parsed();
        let internet = &set.permissions["android.permission.INTERNET"];
        assert_eq!(
            internet.group.as_ref().unwrap().name,
            "android.permission-group.NETWORK"
        );
        assert_eq!(internet.protection_levels, vec!["normal", "instant"]);
        assert_eq!(internet.label.as_deref(), Some("have full network access"));
        assert_eq!(internet.priority, 0);
    }

    #[test]
    fn test_leading_comment_markers_are_detected() {
        let set = parsed();
        let internet = &set.permissions["android.permission.INTERNET"];
        assert!(!internet.comment.system_api);
        assert!(!internet.comment.hide);

        let vendor = &set.permissions["android.permission.VENDOR_HAL"];
        assert!(vendor.comment.system_api);
        assert!(vendor.comment.hide);
        assert!(!vendor.comment.deprecated);
        assert_eq!(vendor.permission_flags, vec!["removed", "instant"]);
    }

    #[test]
    fn test_literal_labels_pass_through() {
        let set = parsed();
        let plain = &set.permissions["android.permission.PLAIN"];
        assert_eq!(plain.label.as_deref(), Some("Literal label"));
        assert!(plain.group.is_none());
        assert!(plain.protection_levels.is_empty());
    }

    #[test]
    fn test_unknown_string_reference_is_a_parse_failure() {
        let manifest = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android">
            <permission android:name="p" android:label="@string/missing" />
        </manifest>"#;
        let result = parse_core_manifest(manifest, &BTreeMap::new());
        assert!(matches!(result, Err(HarvestError::Parse { .. })));
    }

    #[test]
    fn test_unknown_group_reference_is_a_parse_failure() {
        let manifest = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android">
            <permission android:name="p" android:group="android.permission-group.GHOST" />
        </manifest>"#;
        let result = parse_core_manifest(manifest, &BTreeMap::new());
        assert!(matches!(result, Err(HarvestError::Parse { .. })));
    }

    #[test]
    fn test_malformed_manifest_is_a_parse_failure() {
        let result = parse_core_manifest("<manifest", &BTreeMap::new());
        assert!(matches!(result, Err(HarvestError::Parse { .. })));
    }
}
