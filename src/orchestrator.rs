//! Run lifecycle orchestration.
//!
//! The run is a linear sequence of stages with no branching back:
//! `Init → LoadCatalog → HarvestPermissions → HarvestApiMappings →
//! HarvestProviders → Done`. Any hard failure moves the run to the absorbing
//! `Failed` state: remaining stages are skipped, already-written datasets
//! stay on disk for inspection, and the process exits non-zero. A `NotFound`
//! never does — it only means one release gets no file.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::VersionCatalog;
use crate::config::RunConfig;
use crate::harvest::mappings::{ApiMappingHarvest, SdkRepository};
use crate::harvest::permissions::PermissionHarvest;
use crate::harvest::providers::ProviderHarvest;
use crate::harvest::resolver::FallbackResolver;
use crate::harvest::traits::{HarvestError, HarvestOutcome, HarvestTask};
use crate::model::Release;
use crate::source::{build_client, FetchError, GitilesClient, SdkRepoClient};
use crate::writer::{DatasetWriter, WriteError};

// ============================================================================
// Stages and errors
// ============================================================================

/// The linear stages of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Init,
    LoadCatalog,
    HarvestPermissions,
    HarvestApiMappings,
    HarvestProviders,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Init => "init",
            RunStage::LoadCatalog => "load-catalog",
            RunStage::HarvestPermissions => "harvest-permissions",
            RunStage::HarvestApiMappings => "harvest-api-mappings",
            RunStage::HarvestProviders => "harvest-providers",
        };
        f.write_str(name)
    }
}

/// Failure inside one stage, before stage attribution.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Harvest(#[from] HarvestError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Catalog(#[from] FetchError),
}

/// A run that reached the absorbing failed state.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: RunStage,
        #[source]
        source: StageError,
    },

    #[error("failed to initialize HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl RunError {
    fn at(stage: RunStage) -> impl FnOnce(StageError) -> RunError {
        move |source| RunError::Stage { stage, source }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Owns the run lifecycle: output root, catalog, and the three harvest
/// stages, in a fixed order.
pub struct RunOrchestrator {
    config: RunConfig,
    gitiles: Arc<GitilesClient>,
    sdk_repo: Arc<SdkRepository>,
    writer: DatasetWriter,
}

impl RunOrchestrator {
    /// Builds the orchestrator and its HTTP collaborators from `config`.
    pub fn new(config: RunConfig) -> Result<Self, RunError> {
        let client = build_client()?;
        let gitiles = Arc::new(GitilesClient::new(
            client.clone(),
            config.gitiles_base.clone(),
        ));
        let sdk_repo = Arc::new(SdkRepository::new(
            SdkRepoClient::new(client, config.sdk_repository_base.clone()),
            config.download_root.clone(),
        ));
        let writer = DatasetWriter::new(config.output_root.clone());

        Ok(Self {
            config,
            gitiles,
            sdk_repo,
            writer,
        })
    }

    /// Executes the full run.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; later stages do not run. Output from
    /// completed stages is left on disk.
    pub async fn run(&self) -> Result<(), RunError> {
        info!(stage = %RunStage::Init, root = %self.writer.root().display(), "starting run");
        self.writer
            .reset()
            .map_err(|e| RunError::at(RunStage::Init)(e.into()))?;

        let catalog = self.load_catalog().await?;
        self.harvest_permissions(&catalog).await?;
        self.harvest_api_mappings(&catalog).await?;
        self.harvest_providers().await?;

        info!("run complete");
        Ok(())
    }

    /// Loads the release/tag universe and writes the two reference datasets
    /// before any harvesting, so downstream failures still leave a usable
    /// version map.
    async fn load_catalog(&self) -> Result<VersionCatalog, RunError> {
        let stage = RunStage::LoadCatalog;
        info!(stage = %stage, "loading versions");

        let catalog = VersionCatalog::load(self.gitiles.as_ref())
            .await
            .map_err(|e| RunError::at(stage)(e.into()))?;

        self.writer
            .write_json("api_levels.json", &catalog.releases_by_api())
            .map_err(|e| RunError::at(stage)(e.into()))?;
        self.writer
            .write_json("build_versions.json", &catalog.build_tags_by_name())
            .map_err(|e| RunError::at(stage)(e.into()))?;

        Ok(catalog)
    }

    async fn harvest_permissions(&self, catalog: &VersionCatalog) -> Result<(), RunError> {
        let stage = RunStage::HarvestPermissions;
        info!(stage = %stage, "loading permissions");
        self.writer
            .prepare_dir("permissions")
            .map_err(|e| RunError::at(stage)(e.into()))?;

        // The unversioned main-tree snapshot comes first, unconditionally and
        // independent of the fallback search.
        let task = PermissionHarvest::new(self.gitiles.clone());
        let rel = task
            .run(&self.config.main_ref)
            .await
            .map_err(|e| RunError::at(stage)(e.into()))?;
        let HarvestOutcome::Success(set) = rel else {
            return Err(RunError::at(stage)(
                HarvestError::parse(
                    self.config.main_ref.clone(),
                    "current main tree has no permission manifest",
                )
                .into(),
            ));
        };
        self.writer
            .write_json("permissions/permissions-REL.json", &set)
            .map_err(|e| RunError::at(stage)(e.into()))?;

        let supported = catalog
            .releases()
            .iter()
            .filter(|r| self.config.is_supported(r.api));
        harvest_releases(
            &self.writer,
            catalog,
            supported,
            |_| PermissionHarvest::new(self.gitiles.clone()),
            |api| format!("permissions/permissions-{api}.json"),
        )
        .await
        .map_err(RunError::at(stage))
    }

    async fn harvest_api_mappings(&self, catalog: &VersionCatalog) -> Result<(), RunError> {
        let stage = RunStage::HarvestApiMappings;
        info!(stage = %stage, "loading API-permission mappings");
        self.writer
            .prepare_dir("permission_mappings")
            .map_err(|e| RunError::at(stage)(e.into()))?;

        let eligible = catalog
            .releases()
            .iter()
            .filter(|r| self.config.has_mappings(r.api));
        harvest_releases(
            &self.writer,
            catalog,
            eligible,
            |release| ApiMappingHarvest::new(self.sdk_repo.clone(), release.api),
            |api| format!("permission_mappings/sdk-{api}.json"),
        )
        .await
        .map_err(RunError::at(stage))
    }

    /// Single unversioned harvest against the main tree; the two sibling
    /// datasets are written together or not at all.
    async fn harvest_providers(&self) -> Result<(), RunError> {
        let stage = RunStage::HarvestProviders;
        info!(stage = %stage, "loading content provider permissions");
        self.writer
            .prepare_dir("permission_mappings")
            .map_err(|e| RunError::at(stage)(e.into()))?;

        let task = ProviderHarvest::new(self.gitiles.clone(), self.config.request_delay);
        let outcome = task
            .run(&self.config.main_ref)
            .await
            .map_err(|e| RunError::at(stage)(e.into()))?;
        let HarvestOutcome::Success(snapshot) = outcome else {
            return Err(RunError::at(stage)(
                HarvestError::parse(
                    self.config.main_ref.clone(),
                    "current main tree has no provider manifests",
                )
                .into(),
            ));
        };

        self.writer
            .write_json(
                "permission_mappings/all_content_providers-REL.json",
                &snapshot.all,
            )
            .map_err(|e| RunError::at(stage)(e.into()))?;
        self.writer
            .write_json(
                "permission_mappings/permission_content_providers-REL.json",
                &snapshot.requiring_permission,
            )
            .map_err(|e| RunError::at(stage)(e.into()))
    }
}

// ============================================================================
// Per-release harvest loop
// ============================================================================

/// Resolves and harvests every release in `releases`, writing one snapshot
/// per success.
///
/// `NotFound` writes *no file* — absence of a file is the signal that the
/// feature predates or postdates that level. Any hard failure aborts the
/// loop and bubbles up to fail the stage.
async fn harvest_releases<'a, T, F, N>(
    writer: &DatasetWriter,
    catalog: &VersionCatalog,
    releases: impl Iterator<Item = &'a Release>,
    make_task: F,
    file_name: N,
) -> Result<(), StageError>
where
    T: HarvestTask,
    F: Fn(&Release) -> T,
    N: Fn(u32) -> String,
{
    let resolver = FallbackResolver::new(catalog);
    for release in releases {
        let task = make_task(release);
        match resolver.resolve_and_harvest(release, &task).await? {
            HarvestOutcome::Success(payload) => {
                writer.write_json(&file_name(release.api), &payload)?;
            }
            HarvestOutcome::NotFound => {
                debug!(api = release.api, "no harvestable version, skipping");
            }
        }
    }
    Ok(())
}
