//! Newest-first fallback search over a release's versions.
//!
//! The search has three independent exit conditions — first success wins,
//! expected absence continues with an older candidate, any hard failure
//! aborts — expressed as a single reverse iteration with early returns
//! rather than nested conditionals over shared flags.

use tracing::{debug, info};

use super::traits::{HarvestOutcome, HarvestResult, HarvestTask};
use crate::catalog::VersionCatalog;
use crate::model::Release;

/// Finds the newest version of a release for which a harvest actually
/// succeeds, without wasting attempts on versions known to have no tag.
pub struct FallbackResolver<'a> {
    catalog: &'a VersionCatalog,
}

impl<'a> FallbackResolver<'a> {
    pub fn new(catalog: &'a VersionCatalog) -> Self {
        Self { catalog }
    }

    /// Resolves `release` to its newest harvestable tag and runs `task` on it.
    ///
    /// Walks `release.versions` newest-first:
    /// - a version with no build tag is skipped without a harvest attempt;
    /// - `NotFound` from the task is treated the same way — continue older;
    /// - the first success wins, and older candidates are never attempted
    ///   even if they would also succeed;
    /// - a hard failure aborts the search immediately. Masking it by trying
    ///   older versions would hide an unexpected condition.
    ///
    /// Exhausting every version yields `NotFound` for the whole release,
    /// which is expected for levels predating the harvested feature.
    ///
    /// # Errors
    ///
    /// Propagates the task's [`HarvestError`](super::traits::HarvestError)
    /// from the first version whose harvest hard-fails.
    pub async fn resolve_and_harvest<T: HarvestTask>(
        &self,
        release: &Release,
        task: &T,
    ) -> HarvestResult<T::Payload> {
        for version in release.versions.iter().rev() {
            let Some(build_tag) = self.catalog.latest_build_tag(version) else {
                debug!(api = release.api, version = %version, "no build tag, trying older");
                continue;
            };

            match task.run(&build_tag.tag).await? {
                HarvestOutcome::Success(payload) => {
                    info!(
                        api = release.api,
                        tag = %build_tag.tag,
                        kind = task.kind(),
                        "harvested"
                    );
                    return Ok(HarvestOutcome::Success(payload));
                }
                HarvestOutcome::NotFound => {
                    debug!(api = release.api, tag = %build_tag.tag, "no data at tag, trying older");
                }
            }
        }

        Ok(HarvestOutcome::NotFound)
    }
}
