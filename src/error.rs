//! Capture error types

use thiserror::Error;

/// Errors surfaced synchronously by capture activation and host setup.
///
/// Per-cycle conditions (a failed readback, an empty ready queue) are never
/// reported through this type; they are absorbed and counted in
/// [`CaptureStats`](crate::stats::CaptureStats).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("No capture source is available")]
    MissingSource,
    #[error("Capture stage is already installed")]
    AlreadyInitialized,
    #[error("Unsupported capture configuration: {0}")]
    UnsupportedConfiguration(String),
    #[error("Capture host failure: {0}")]
    Backend(String),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Reasons an individual readback can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadbackError {
    #[error("Device lost during readback")]
    DeviceLost,
    #[error("Readback surface was resized while the transfer was in flight")]
    SurfaceResized,
    #[error("Failed to map readback memory: {0}")]
    MapFailed(String),
    #[error("Readback cancelled by the host")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            CaptureError::MissingSource.to_string(),
            "No capture source is available"
        );

        let err = CaptureError::UnsupportedConfiguration("multi-pass capture".to_string());
        assert_eq!(
            err.to_string(),
            "Unsupported capture configuration: multi-pass capture"
        );

        let err = ReadbackError::MapFailed("buffer destroyed".to_string());
        assert_eq!(
            err.to_string(),
            "Failed to map readback memory: buffer destroyed"
        );
    }
}
