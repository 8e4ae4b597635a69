//! Content-provider manifest harvest.
//!
//! Sweeps a curated index of platform manifests at one reference and
//! extracts every `<provider>` that is reachable from other apps — exported,
//! or granting URI permissions. A manifest absent at the reference is
//! skipped; the sweep itself only fails on transport or parse errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use roxmltree::{Document, Node};
use tracing::debug;

use super::permissions::ANDROID_NS;
use super::traits::{HarvestError, HarvestOutcome, HarvestResult, HarvestTask};
use crate::model::{ContentProvider, ProviderSnapshot, UriMatch, UriPermission};
use crate::source::GitilesClient;

/// Platform manifests known to declare shared content providers.
///
/// The upstream tree has no single machine-readable index of provider
/// manifests; this list names the framework manifest plus the provider and
/// app packages that ship exported providers.
const PROVIDER_MANIFESTS: &[(&str, &str)] = &[
    ("platform/frameworks/base", "core/res/AndroidManifest.xml"),
    (
        "platform/packages/providers/BlockedNumberProvider",
        "AndroidManifest.xml",
    ),
    (
        "platform/packages/providers/CalendarProvider",
        "AndroidManifest.xml",
    ),
    (
        "platform/packages/providers/ContactsProvider",
        "AndroidManifest.xml",
    ),
    (
        "platform/packages/providers/DownloadProvider",
        "AndroidManifest.xml",
    ),
    (
        "platform/packages/providers/MediaProvider",
        "AndroidManifest.xml",
    ),
    (
        "platform/packages/providers/TelephonyProvider",
        "AndroidManifest.xml",
    ),
    (
        "platform/packages/providers/UserDictionaryProvider",
        "AndroidManifest.xml",
    ),
    ("platform/packages/apps/DocumentsUI", "AndroidManifest.xml"),
    ("platform/packages/apps/Settings", "AndroidManifest.xml"),
];

/// Harvest task for content-provider permission manifests.
pub struct ProviderHarvest {
    source: Arc<GitilesClient>,
    request_delay: Duration,
}

impl ProviderHarvest {
    pub fn new(source: Arc<GitilesClient>, request_delay: Duration) -> Self {
        Self {
            source,
            request_delay,
        }
    }
}

#[async_trait]
impl HarvestTask for ProviderHarvest {
    type Payload = ProviderSnapshot;

    fn kind(&self) -> &'static str {
        "content_providers"
    }

    async fn run(&self, reference: &str) -> HarvestResult<ProviderSnapshot> {
        let mut providers: Vec<ContentProvider> = Vec::new();

        for (i, (project, path)) in PROVIDER_MANIFESTS.iter().enumerate() {
            if i > 0 {
                // Bounded pacing against the shared upstream host.
                tokio::time::sleep(self.request_delay).await;
            }

            match HarvestOutcome::from_fetch(
                self.source.source_file(project, reference, path).await,
            )? {
                HarvestOutcome::Success(xml) => {
                    providers.extend(parse_provider_manifest(&xml, path)?);
                }
                HarvestOutcome::NotFound => {
                    debug!(project = %project, "manifest absent at reference");
                }
            }
        }

        providers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.cmp(b)));
        providers.dedup();

        let requiring_permission = providers
            .iter()
            .filter(|p| p.needs_permission())
            .cloned()
            .collect();

        Ok(HarvestOutcome::Success(ProviderSnapshot {
            all: providers,
            requiring_permission,
        }))
    }
}

// ============================================================================
// Manifest parsing
// ============================================================================

fn android_attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute((ANDROID_NS, name))
}

fn parse_bool(raw: Option<&str>, context: &str) -> Result<bool, HarvestError> {
    match raw.unwrap_or("false") {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(HarvestError::parse(
            context,
            format!("unknown boolean string: {other}"),
        )),
    }
}

/// Substitutes manifest placeholders with the declaring package.
fn substitute_package(package: &str, value: &str) -> String {
    value
        .replace("${packageName}", package)
        .replace("${applicationId}", package)
}

/// Qualifies a provider class name against its package.
fn qualify_name(package: &str, name: &str) -> String {
    if let Some(rest) = name.strip_prefix('.') {
        format!("{package}.{rest}")
    } else if !name.contains('.') {
        format!("{package}.{name}")
    } else {
        name.to_string()
    }
}

fn split_authorities(package: &str, authorities: &str) -> Vec<String> {
    authorities
        .split(';')
        .map(|a| substitute_package(package, a))
        .collect()
}

fn grant_uri_permissions(provider: Node<'_, '_>) -> Vec<UriPermission> {
    const ATTRS: &[(&str, UriMatch)] = &[
        ("path", UriMatch::Path),
        ("pathPrefix", UriMatch::PathPrefix),
        ("pathPattern", UriMatch::PathPattern),
    ];

    let mut result = Vec::new();
    for grant in provider
        .children()
        .filter(|n| n.has_tag_name("grant-uri-permission"))
    {
        // First matching attribute wins; the kinds are mutually exclusive.
        for (attr, kind) in ATTRS {
            if let Some(path) = android_attr(grant, attr) {
                result.push(UriPermission {
                    kind: *kind,
                    path: path.to_string(),
                });
                break;
            }
        }
    }
    result
}

/// Extracts every shareable provider declaration from one manifest.
///
/// A provider qualifies when it declares `android:authorities` and is either
/// exported or grants URI permissions. `android:permission` seeds both the
/// read and write permission; the dedicated attributes override it.
fn parse_provider_manifest(
    xml: &str,
    context: &str,
) -> Result<Vec<ContentProvider>, HarvestError> {
    let doc = Document::parse(xml).map_err(|e| HarvestError::parse(context, e))?;
    let root = doc.root_element();
    let package = root
        .attribute("package")
        .ok_or_else(|| HarvestError::parse(context, "manifest without package attribute"))?;

    let mut result = Vec::new();
    for application in root.children().filter(|n| n.has_tag_name("application")) {
        for provider in application
            .children()
            .filter(|n| n.has_tag_name("provider"))
        {
            let Some(authorities) = android_attr(provider, "authorities") else {
                continue;
            };
            let shared = android_attr(provider, "exported") == Some("true")
                || android_attr(provider, "grantUriPermissions") == Some("true");
            if !shared {
                continue;
            }

            let name = android_attr(provider, "name")
                .ok_or_else(|| HarvestError::parse(context, "provider without name"))?;

            let mut read_permission = android_attr(provider, "permission").map(str::to_string);
            let mut write_permission = read_permission.clone();
            if let Some(read) = android_attr(provider, "readPermission") {
                read_permission = Some(read.to_string());
            }
            if let Some(write) = android_attr(provider, "writePermission") {
                write_permission = Some(write.to_string());
            }

            result.push(ContentProvider {
                package: package.to_string(),
                name: qualify_name(package, name),
                authorities: split_authorities(package, authorities),
                exported: parse_bool(android_attr(provider, "exported"), context)?,
                read_permission,
                write_permission,
                has_uri_permission: parse_bool(
                    android_attr(provider, "grantUriPermissions"),
                    context,
                )?,
                grant_uri_permissions: grant_uri_permissions(provider),
            });
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="com.android.providers.demo">
    <application>
        <provider android:name=".DemoProvider"
            android:authorities="${packageName}.files;demo"
            android:exported="true"
            android:permission="android.permission.MANAGE_DOCUMENTS" />

        <provider android:name="Relative"
            android:authorities="relative"
            android:exported="true"
            android:readPermission="android.permission.READ_DEMO" />

        <provider android:name="com.android.other.GrantOnly"
            android:authorities="grant.only"
            android:grantUriPermissions="true">
            <grant-uri-permission android:pathPrefix="/shared" />
            <grant-uri-permission android:path="/exact" />
        </provider>

        <provider android:name=".Internal"
            android:authorities="internal" />

        <provider android:name=".NoAuthorities"
            android:exported="true" />
    </application>
</manifest>"#;

    fn parsed() -> Vec<ContentProvider> {
        parse_provider_manifest(MANIFEST, "test").unwrap()
    }

    #[test]
    fn test_only_shared_providers_with_authorities_qualify() {
        let providers = parsed();
        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "com.android.providers.demo.DemoProvider",
                "com.android.providers.demo.Relative",
                "com.android.other.GrantOnly",
            ]
        );
    }

    #[test]
    fn test_authorities_split_and_substitute_package() {
        let providers = parsed();
        assert_eq!(
            providers[0].authorities,
            vec!["com.android.providers.demo.files", "demo"]
        );
    }

    #[test]
    fn test_permission_attribute_seeds_read_and_write() {
        let providers = parsed();
        let demo = &providers[0];
        assert_eq!(
            demo.read_permission.as_deref(),
            Some("android.permission.MANAGE_DOCUMENTS")
        );
        assert_eq!(
            demo.write_permission.as_deref(),
            Some("android.permission.MANAGE_DOCUMENTS")
        );

        let relative = &providers[1];
        assert_eq!(
            relative.read_permission.as_deref(),
            Some("android.permission.READ_DEMO")
        );
        assert!(relative.write_permission.is_none());
    }

    #[test]
    fn test_grant_uri_permissions_take_first_matching_attribute() {
        let providers = parsed();
        let grant_only = &providers[2];
        assert!(grant_only.has_uri_permission);
        assert!(!grant_only.exported);
        assert_eq!(
            grant_only.grant_uri_permissions,
            vec![
                UriPermission {
                    kind: UriMatch::PathPrefix,
                    path: "/shared".to_string()
                },
                UriPermission {
                    kind: UriMatch::Path,
                    path: "/exact".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_malformed_boolean_is_a_parse_failure() {
        let manifest = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android"
            package="p">
            <application>
                <provider android:name=".P" android:authorities="a"
                    android:exported="true" android:grantUriPermissions="yes" />
            </application>
        </manifest>"#;
        assert!(matches!(
            parse_provider_manifest(manifest, "test"),
            Err(HarvestError::Parse { .. })
        ));
    }

    #[test]
    fn test_manifest_without_package_is_a_parse_failure() {
        let manifest = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android"/>"#;
        assert!(matches!(
            parse_provider_manifest(manifest, "test"),
            Err(HarvestError::Parse { .. })
        ));
    }
}
