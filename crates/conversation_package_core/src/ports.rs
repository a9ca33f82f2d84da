//! crates/conversation_package_core/src/ports.rs
//!
//! Defines the service contracts (traits) the generation pipeline depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to stay independent of the concrete database, model API and queue clients.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AnalysisRecord, GeneratedPackage, Package, UserContext};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Upstream generation error: {0}")]
    Generation(String),
    #[error("Generated package failed schema validation: {0}")]
    SchemaValidation(String),
    /// A conditional write lost against a concurrent writer.
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Data Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AnalysisHistoryReader: Send + Sync {
    /// Lists at most `limit` analysis records for a user, newest first.
    async fn list_by_user(&self, user_id: &str, limit: usize) -> PortResult<Vec<AnalysisRecord>>;
}

#[async_trait]
pub trait GenerationStateTracker: Send + Sync {
    async fn get_last_processed_at(
        &self,
        user_id: &str,
        language: &str,
    ) -> PortResult<Option<DateTime<Utc>>>;

    /// Records a completed run. Implementations never move the stored timestamp backwards.
    async fn set_last_processed_at(
        &self,
        user_id: &str,
        language: &str,
        at: DateTime<Utc>,
    ) -> PortResult<()>;
}

#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Finds the single package for a (user, language) pair, if any.
    async fn find_by_user_and_language(
        &self,
        user_id: &str,
        language: &str,
    ) -> PortResult<Option<Package>>;

    /// Full upsert guarded by `Package::version`.
    ///
    /// Version 1 inserts and fails with `PortError::Conflict` when the pair
    /// already has a package. Version `n > 1` only replaces a stored row whose
    /// version is `n - 1`.
    async fn save(&self, package: &Package) -> PortResult<()>;
}

#[async_trait]
pub trait UserContextReader: Send + Sync {
    async fn get_context(&self, user_id: &str) -> PortResult<Option<UserContext>>;
}

//=========================================================================================
// Generation and Notification Ports
//=========================================================================================

/// Everything the generation model sees for one run.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub target_language: &'a str,
    pub existing_package: Option<&'a Package>,
    /// Records since the last run, newest first.
    pub analysis_records: &'a [AnalysisRecord],
    pub user_context: Option<&'a UserContext>,
}

#[async_trait]
pub trait PackageGenerationService: Send + Sync {
    /// Calls the external model and returns a structurally valid package.
    ///
    /// Transport failures surface as `PortError::Generation`; responses that
    /// cannot be normalized surface as `PortError::SchemaValidation`.
    async fn generate(&self, request: GenerationRequest<'_>) -> PortResult<GeneratedPackage>;
}

#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, package: &Package, was_update: bool) -> PortResult<()>;
}

//=========================================================================================
// Clock
//=========================================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
