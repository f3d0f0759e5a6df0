// ABOUTME: Error types for the export pipeline and the host adapters it drives.
// ABOUTME: ExportError is what callers see; HostError and ShareError come back from adapters.

use thiserror::Error;

/// Terminal or intermediate failure of one export attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("prediction is not visible; reveal the card first")]
    NotReady,

    #[error("could not capture the prediction: {0}")]
    CaptureFailure(String),

    #[error("share was cancelled")]
    ShareCancelled,

    #[error("share failed: {0}")]
    ShareFailure(String),

    #[error("could not save the image: {0}")]
    DownloadFailure(String),
}

impl ExportError {
    /// Errors the user is told about. Share cancel and share failure are
    /// silent: the first is the user's choice, the second falls back.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            ExportError::NotReady | ExportError::CaptureFailure(_) | ExportError::DownloadFailure(_)
        )
    }
}

/// Failure reported by a host adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("surface not found")]
    SurfaceNotFound,

    #[error("mount failed: {0}")]
    Mount(String),

    #[error("rasterize failed: {0}")]
    Rasterize(String),

    #[error("asset load failed: {0}")]
    AssetLoad(String),

    #[error("download failed: {0}")]
    Download(String),
}

/// Outcome of a native share request that did not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShareError {
    #[error("cancelled by user")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}
