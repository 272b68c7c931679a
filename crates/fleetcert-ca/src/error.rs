//! Authority domain error types.

use fleetcert_common::ErrorCode;
use fleetcert_crypto::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum CaError {
    #[error("CA not initialized: run `fleetcert ca init` first")]
    NotInitialized,

    #[error("CA material incomplete: {present} exists but {missing} does not")]
    PartialMaterial { present: String, missing: String },

    #[error("invalid CA configuration: {0}")]
    Config(String),

    #[error("unknown extended key usage: {0}")]
    UnknownUsage(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("CSR rejected: {0}")]
    Csr(String),

    #[error("serial number error: {0}")]
    Serial(String),

    #[error("template option failed: {0}")]
    Option(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<&CaError> for ErrorCode {
    fn from(e: &CaError) -> Self {
        match e {
            CaError::NotInitialized => ErrorCode::CaNotInitialized,
            CaError::PartialMaterial { .. } | CaError::Config(_) | CaError::UnknownUsage(_) => {
                ErrorCode::InvalidConfig
            }
            CaError::Csr(_) => ErrorCode::CsrRejected,
            CaError::Serial(_) => ErrorCode::SerialFailed,
            CaError::Codec(_) => ErrorCode::ParseError,
            CaError::Io(_) => ErrorCode::IoError,
            CaError::Certificate(_) | CaError::Option(_) => ErrorCode::Internal,
        }
    }
}
