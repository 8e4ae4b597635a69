//! Core trait and outcome types for the harvest system.
//!
//! This module defines the contract every harvest kind implements:
//! - One attempt against one source-tree reference via [`HarvestTask`]
//! - The three-way outcome via [`HarvestOutcome`] and [`HarvestError`]
//!
//! The split is deliberate: expected absence (`NotFound`) is a *value* the
//! fallback search iterates over, while transport and parse failures are
//! errors that abort the search immediately. Encoding absence as an error
//! would force every caller to re-distinguish the two.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::source::FetchError;

/// Result alias used by every harvest task.
pub type HarvestResult<T> = Result<HarvestOutcome<T>, HarvestError>;

// ============================================================================
// Outcome
// ============================================================================

/// Outcome of one harvest attempt that did not hard-fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestOutcome<T> {
    /// The reference was fetched and parsed; the payload may be empty.
    Success(T),

    /// The tree exists but lacks the expected data (or the reference itself
    /// is absent). Expected for sparse version spaces; the fallback search
    /// continues with an older candidate.
    NotFound,
}

impl<T> HarvestOutcome<T> {
    /// `true` for [`HarvestOutcome::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, HarvestOutcome::NotFound)
    }

    /// Converts into `Option`, discarding the distinction's name.
    pub fn into_option(self) -> Option<T> {
        match self {
            HarvestOutcome::Success(payload) => Some(payload),
            HarvestOutcome::NotFound => None,
        }
    }

    /// Lifts a collaborator fetch result into an outcome: a 404 becomes
    /// `NotFound`, any other fetch error stays fatal.
    pub fn from_fetch(result: Result<T, FetchError>) -> HarvestResult<T> {
        match result {
            Ok(payload) => Ok(HarvestOutcome::Success(payload)),
            Err(FetchError::NotFound { .. }) => Ok(HarvestOutcome::NotFound),
            Err(e) => Err(HarvestError::Transport(e)),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Hard failures of a harvest attempt. Both variants are fatal to the run;
/// neither is retried.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Network/HTTP failure other than an expected 404.
    #[error("transport failure: {0}")]
    Transport(#[source] FetchError),

    /// A collaborator returned data we could not make sense of.
    #[error("parse failure in {context}: {reason}")]
    Parse { context: String, reason: String },
}

impl HarvestError {
    /// Builds a parse failure with its source context.
    pub fn parse(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

/// A fetch error reaching a site that does not expect absence is fatal,
/// 404 included: an unexpected 404 means something is actually broken.
impl From<FetchError> for HarvestError {
    fn from(e: FetchError) -> Self {
        Self::Transport(e)
    }
}

/// Local I/O failures (archive cache reads, downloads) count as transport.
impl From<std::io::Error> for HarvestError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(FetchError::Io(e))
    }
}

// ============================================================================
// Task trait
// ============================================================================

/// One domain-specific extraction against a single resolved reference.
///
/// `reference` is either a concrete build tag name or the fixed main-tree
/// ref. Implementations are stateless per invocation — no catalog or
/// filesystem ownership, only the injected fetch collaborator — and never
/// retry internally; retry-over-versions belongs to the resolver.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`.
#[async_trait]
pub trait HarvestTask: Send + Sync {
    /// Payload produced on success, serialized by the dataset writer.
    type Payload: Serialize + Send;

    /// Short identifier for logging (e.g., "permissions").
    fn kind(&self) -> &'static str;

    /// Executes the harvest against `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] only for conditions that must abort the
    /// current run; expected absence is `Ok(HarvestOutcome::NotFound)`.
    async fn run(&self, reference: &str) -> HarvestResult<Self::Payload>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_not_found_becomes_outcome() {
        let result: Result<(), FetchError> = Err(FetchError::NotFound {
            url: "https://example.test/missing".to_string(),
        });
        assert!(HarvestOutcome::from_fetch(result).unwrap().is_not_found());
    }

    #[test]
    fn test_fetch_success_becomes_payload() {
        let outcome = HarvestOutcome::from_fetch(Ok(42)).unwrap();
        assert_eq!(outcome.into_option(), Some(42));
    }

    #[test]
    fn test_fetch_status_error_stays_fatal() {
        let result: Result<(), FetchError> = Err(FetchError::Status {
            url: "https://example.test/flaky".to_string(),
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        });
        assert!(matches!(
            HarvestOutcome::from_fetch(result),
            Err(HarvestError::Transport(_))
        ));
    }
}
