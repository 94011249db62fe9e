use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure taxonomy for a release run. Everything except `MissingInput`,
/// `ToolUnavailable` and `PartialAssetSet` is local to a single target.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("required input {} does not exist", .path.display())]
    MissingInput { path: PathBuf },

    #[error("`{tool}` is unavailable: {remedy}")]
    ToolUnavailable { tool: String, remedy: String },

    #[error("toolchain failed for {triple}: {reason}")]
    ToolchainFailure { triple: String, reason: String },

    #[error("staging failed at {}: {source}", .path.display())]
    StagingIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("icon asset set is incomplete, missing {missing:?}")]
    PartialAssetSet { missing: Vec<String> },

    #[error("cancelled before {target} started")]
    Cancelled { target: String },

    #[error("bitmap processing failed for {}: {reason}", .path.display())]
    Image { path: PathBuf, reason: String },

    #[error("manifest template {} could not be rendered: {reason}", .path.display())]
    ManifestTemplate { path: PathBuf, reason: String },
}

impl ReleaseError {
    pub fn io(path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> ReleaseError {
        let path = path.as_ref().to_path_buf();
        move |source| ReleaseError::StagingIo { path, source }
    }

    pub fn image<E: std::fmt::Display>(path: impl AsRef<Path>) -> impl FnOnce(E) -> ReleaseError {
        let path = path.as_ref().to_path_buf();
        move |err| ReleaseError::Image {
            path,
            reason: err.to_string(),
        }
    }

    /// Short name used in batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ReleaseError::MissingInput { .. } => "missing-input",
            ReleaseError::ToolUnavailable { .. } => "tool-unavailable",
            ReleaseError::ToolchainFailure { .. } => "toolchain-failure",
            ReleaseError::StagingIo { .. } => "staging-io",
            ReleaseError::PartialAssetSet { .. } => "partial-asset-set",
            ReleaseError::Cancelled { .. } => "cancelled",
            ReleaseError::Image { .. } => "image",
            ReleaseError::ManifestTemplate { .. } => "manifest-template",
        }
    }
}

pub type ReleaseResult<T> = Result<T, ReleaseError>;
