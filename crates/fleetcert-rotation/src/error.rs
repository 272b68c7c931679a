//! Rotation store error types.

use std::path::PathBuf;

use fleetcert_common::ErrorCode;
use fleetcert_crypto::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("no pending certificate to swap")]
    NoPending,

    #[error("certificate swap failed: {0}")]
    Swap(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RotationError {
    /// True for the expected-absent case (first boot, nothing staged).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<&RotationError> for ErrorCode {
    fn from(e: &RotationError) -> Self {
        match e {
            RotationError::NotFound { .. } => ErrorCode::NotFound,
            RotationError::Parse { .. } => ErrorCode::ParseError,
            RotationError::NoPending => ErrorCode::NoPending,
            RotationError::Swap(_) => ErrorCode::SwapFailed,
            RotationError::Io(_) => ErrorCode::IoError,
        }
    }
}
