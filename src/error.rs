//! Pipeline error taxonomy.
//!
//! Stage-fatal errors abort an analysis run and surface to the caller;
//! per-item classification failures never appear here — they are absorbed
//! into a degraded [`crate::models::Verdict`] (see [`crate::classify`]).

use thiserror::Error;

/// Errors that abort an analysis run.
///
/// The caller always receives either a fully valid report or one of these
/// variants — never a half-built report.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad retrieval input (empty query, k == 0). Fatal to the run.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The persistent index is missing, empty of schema, or corrupt.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    /// An external capability (embedding endpoint) failed during a stage
    /// where the failure cannot be absorbed per-item.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The assembled report violated its schema. Indicates an internal
    /// bug, not a runtime condition to handle.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
