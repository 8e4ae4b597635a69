//! Harvest module - fallback resolution and the three dataset tasks.
//!
//! This module provides the core abstractions of the harvest system:
//! - **Traits**: [`HarvestTask`] with its [`HarvestOutcome`]/[`HarvestError`] taxonomy
//! - **Resolution**: newest-first fallback search via [`FallbackResolver`]
//! - **Tasks**: one adapter per dataset kind (permissions, API mappings, providers)

pub mod mappings;
pub mod permissions;
pub mod providers;
pub mod resolver;
pub mod traits;

// Re-export commonly used types
pub use mappings::{ApiMappingHarvest, SdkRepository};
pub use permissions::PermissionHarvest;
pub use providers::ProviderHarvest;
pub use resolver::FallbackResolver;
pub use traits::{HarvestError, HarvestOutcome, HarvestResult, HarvestTask};
