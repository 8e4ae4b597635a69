//! API-to-permission mapping harvest.
//!
//! Mappings come from the SDK platform packages: each platform archive
//! carries an `annotations.zip` whose `annotations.xml` files attach
//! `RequiresPermission` annotations to JVM methods and fields. The harvest
//! resolves the newest stable platform package for one API level from the
//! repository index, downloads its archive (cached on disk across runs), and
//! scans the nested annotation data in a blocking task.

use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use roxmltree::{Document, Node};
use tokio::sync::OnceCell;
use tracing::debug;

use super::traits::{HarvestError, HarvestOutcome, HarvestResult, HarvestTask};
use crate::model::{ApiPermission, ApiSurface};
use crate::source::SdkRepoClient;

/// Stable release channel of the SDK repository.
const STABLE_CHANNEL: &str = "channel-0";

// ============================================================================
// Shared repository state
// ============================================================================

/// SDK repository with a once-per-run cached index.
///
/// One instance is shared by every per-release [`ApiMappingHarvest`], so the
/// index document is fetched once no matter how many levels are harvested.
pub struct SdkRepository {
    client: SdkRepoClient,
    download_root: PathBuf,
    index: OnceCell<String>,
}

impl SdkRepository {
    pub fn new(client: SdkRepoClient, download_root: PathBuf) -> Self {
        Self {
            client,
            download_root,
            index: OnceCell::new(),
        }
    }

    async fn index(&self) -> Result<&str, HarvestError> {
        let xml = self
            .index
            .get_or_try_init(|| async {
                self.client
                    .repository_index()
                    .await
                    .map_err(HarvestError::from)
            })
            .await?;
        Ok(xml.as_str())
    }

    /// Downloads the newest stable platform archive for `api`, returning its
    /// local path, or `None` when the repository carries no such package.
    pub async fn platform_archive(&self, api: u32) -> Result<Option<PathBuf>, HarvestError> {
        let Some(archive_name) = find_platform_archive(self.index().await?, api)? else {
            return Ok(None);
        };
        let path = self
            .client
            .download_archive(&archive_name, &self.download_root)
            .await?;
        Ok(Some(path))
    }
}

// ============================================================================
// Harvest task
// ============================================================================

/// Harvest task for one release's API-to-permission mappings.
///
/// The SDK repository is keyed by API level rather than by source tag, so
/// the resolved reference only gates the attempt; the archive lookup uses
/// the level the task was built for.
pub struct ApiMappingHarvest {
    repo: Arc<SdkRepository>,
    api: u32,
}

impl ApiMappingHarvest {
    pub fn new(repo: Arc<SdkRepository>, api: u32) -> Self {
        Self { repo, api }
    }
}

#[async_trait]
impl HarvestTask for ApiMappingHarvest {
    type Payload = Vec<ApiPermission>;

    fn kind(&self) -> &'static str {
        "permission_mappings"
    }

    async fn run(&self, _reference: &str) -> HarvestResult<Vec<ApiPermission>> {
        let Some(archive_path) = self.repo.platform_archive(self.api).await? else {
            debug!(api = self.api, "no platform package in repository");
            return Ok(HarvestOutcome::NotFound);
        };

        let mappings = tokio::task::spawn_blocking(move || scan_platform_archive(&archive_path))
            .await
            .map_err(|e| HarvestError::parse("annotations", format!("task join error: {e}")))??;

        Ok(HarvestOutcome::Success(mappings))
    }
}

// ============================================================================
// Repository index
// ============================================================================

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(name))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name).and_then(|c| c.text())
}

fn package_revision(pkg: Node<'_, '_>) -> (u32, u32, u32) {
    let rev = child(pkg, "revision");
    let part = |name: &str| {
        rev.and_then(|r| child_text(r, name))
            .and_then(|t| t.trim().parse().ok())
            .unwrap_or(0)
    };
    (part("major"), part("minor"), part("micro"))
}

fn host_os_of<'a>(archive: Node<'a, '_>) -> Option<&'a str> {
    child_text(archive, "host-os").map(str::trim)
}

fn current_host_os() -> &'static str {
    match std::env::consts::OS {
        "windows" => "windows",
        "macos" => "macosx",
        _ => "linux",
    }
}

/// Finds the archive name of the newest stable `platforms;android-<api>`
/// package, or `None` when the repository has no package for that level.
fn find_platform_archive(xml: &str, api: u32) -> Result<Option<String>, HarvestError> {
    let doc = Document::parse(xml)
        .map_err(|e| HarvestError::parse(SdkRepoClient::REPOSITORY_INDEX, e))?;
    let wanted = format!("platforms;android-{api}");

    let mut best: Option<((u32, u32, u32), Node)> = None;
    for pkg in doc
        .descendants()
        .filter(|n| n.has_tag_name("remotePackage"))
    {
        if pkg.attribute("path") != Some(wanted.as_str()) {
            continue;
        }
        let stable = pkg
            .children()
            .any(|c| c.has_tag_name("channelRef") && c.attribute("ref") == Some(STABLE_CHANNEL));
        if !stable {
            continue;
        }
        let revision = package_revision(pkg);
        if best.as_ref().map_or(true, |(r, _)| revision > *r) {
            best = Some((revision, pkg));
        }
    }

    let Some((_, pkg)) = best else {
        return Ok(None);
    };

    let archives: Vec<Node> = child(pkg, "archives")
        .map(|a| a.children().filter(|c| c.has_tag_name("archive")).collect())
        .unwrap_or_default();

    let chosen = match archives.as_slice() {
        [] => None,
        [only] => Some(*only),
        many => many
            .iter()
            .copied()
            .find(|a| host_os_of(*a) == Some(current_host_os()))
            .or_else(|| many.iter().copied().find(|a| host_os_of(*a).is_none())),
    };

    let url = chosen
        .and_then(|a| child(a, "complete"))
        .and_then(|c| child_text(c, "url"))
        .ok_or_else(|| {
            HarvestError::parse(
                SdkRepoClient::REPOSITORY_INDEX,
                format!("no usable archive for {wanted}"),
            )
        })?;

    Ok(Some(url.trim().to_string()))
}

// ============================================================================
// Annotation extraction
// ============================================================================

fn annotation_zip_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^android-.*/data/annotations\.zip$").expect("valid regex"))
}

/// Opens a downloaded platform archive and extracts every mapping from the
/// nested annotation data. Runs on a blocking thread.
fn scan_platform_archive(path: &std::path::Path) -> Result<Vec<ApiPermission>, HarvestError> {
    let context = path.display().to_string();
    let file = std::fs::File::open(path)?;
    let mut outer =
        zip::ZipArchive::new(file).map_err(|e| HarvestError::parse(&context, e))?;

    let annotation_entry = outer
        .file_names()
        .find(|name| annotation_zip_pattern().is_match(name))
        .map(str::to_string)
        .ok_or_else(|| HarvestError::parse(&context, "no annotation data in platform archive"))?;

    let mut inner_bytes = Vec::new();
    outer
        .by_name(&annotation_entry)
        .map_err(|e| HarvestError::parse(&context, e))?
        .read_to_end(&mut inner_bytes)?;

    let mut inner = zip::ZipArchive::new(Cursor::new(inner_bytes))
        .map_err(|e| HarvestError::parse(&annotation_entry, e))?;

    let mut result: BTreeSet<ApiPermission> = BTreeSet::new();
    let names: Vec<String> = inner.file_names().map(str::to_string).collect();
    for name in names {
        if name.rsplit('/').next() != Some("annotations.xml") {
            continue;
        }
        let mut xml = String::new();
        inner
            .by_name(&name)
            .map_err(|e| HarvestError::parse(&name, e))?
            .read_to_string(&mut xml)?;
        result.extend(extract_permission_annotations(&xml, &name)?);
    }

    Ok(result.into_iter().collect())
}

/// Pulls every `RequiresPermission` item out of one `annotations.xml`.
fn extract_permission_annotations(
    xml: &str,
    context: &str,
) -> Result<Vec<ApiPermission>, HarvestError> {
    let doc = Document::parse(xml).map_err(|e| HarvestError::parse(context, e))?;
    let mut result = Vec::new();

    for item in doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("item"))
    {
        let Some(name) = item.attribute("name") else {
            continue;
        };

        let requires = item.children().filter(|c| {
            c.has_tag_name("annotation")
                && c.attribute("name")
                    .is_some_and(|n| n.contains("RequiresPermission"))
        });
        let Some(val) = requires.flat_map(|a| a.children()).find(|c| c.has_tag_name("val"))
        else {
            continue;
        };

        let permissions = val
            .attribute("val")
            .map(parse_permission_list)
            .unwrap_or_default();
        let any_of = val.attribute("name") == Some("anyOf");

        result.push(parse_api_entry(name, permissions, any_of).map_err(|reason| {
            HarvestError::parse(context, reason)
        })?);
    }

    Ok(result)
}

/// Parses a `{"A", "B"}` annotation value into its permission names.
fn parse_permission_list(raw: &str) -> Vec<String> {
    raw.trim_matches(|c| c == '{' || c == '}' || c == ' ')
        .split(',')
        .map(|p| p.trim().trim_matches('"').to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

// ============================================================================
// JVM name parsing
// ============================================================================

const JVM_BASIC_SIGNATURES: &[(&str, &str)] = &[
    ("void", "V"),
    ("boolean", "Z"),
    ("byte", "B"),
    ("char", "C"),
    ("short", "S"),
    ("int", "I"),
    ("long", "J"),
    ("float", "F"),
    ("double", "D"),
];

fn method_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*?)\s(.*?)\s(.*?)\((.*?)\)\s?(\d+)?$").expect("valid regex")
    })
}

fn field_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*?)\s(.*?)$").expect("valid regex"))
}

/// JVM descriptor for one declared type name.
fn jvm_type_signature(type_name: &str) -> String {
    static GENERIC: OnceLock<Regex> = OnceLock::new();
    let generic = GENERIC.get_or_init(|| Regex::new(r"<.*>|\[\]").expect("valid regex"));

    let is_array = type_name.ends_with("[]");
    let bare = generic.replace_all(type_name, "");
    let base = JVM_BASIC_SIGNATURES
        .iter()
        .find(|(name, _)| *name == bare)
        .map(|(_, sig)| (*sig).to_string())
        .unwrap_or_else(|| format!("L{};", bare.replace('.', "/")));

    if is_array {
        format!("[{base}")
    } else {
        base
    }
}

/// Parses one annotation item name into a method or field entry.
///
/// Items carrying a trailing argument index (annotations attached to a
/// single parameter) have no whole-API meaning here and are rejected.
fn parse_api_entry(
    name: &str,
    permissions: Vec<String>,
    any_of: bool,
) -> Result<ApiPermission, String> {
    if let Some(captures) = method_pattern().captures(name) {
        if captures.get(5).is_none() {
            let args: Vec<String> = captures[4]
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
            let return_value = captures[2].to_string();
            let signature = format!(
                "({}){}",
                args.iter()
                    .map(|a| jvm_type_signature(a))
                    .collect::<String>(),
                jvm_type_signature(&return_value)
            );
            return Ok(ApiPermission {
                api: ApiSurface::Method {
                    class_name: captures[1].to_string(),
                    name: captures[3].to_string(),
                    args,
                    return_value,
                    signature,
                },
                permissions,
                any_of,
            });
        }
    } else if let Some(captures) = field_pattern().captures(name) {
        return Ok(ApiPermission {
            api: ApiSurface::Field {
                class_name: captures[1].to_string(),
                name: captures[2].to_string(),
            },
            permissions,
            any_of,
        });
    }

    Err(format!("unknown jvm api format: {name}"))
}
