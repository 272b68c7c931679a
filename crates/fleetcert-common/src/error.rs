use serde::{Deserialize, Serialize};

/// Machine-readable error codes shared by every fleetcert crate.
/// Emitted in JSON output and mapped to process exit codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    ParseError,
    IoError,
    InvalidConfig,
    // Rotation
    NoPending,
    SwapFailed,
    // Authority
    CaNotInitialized,
    CsrRejected,
    SerialFailed,
    Internal,
}

impl ErrorCode {
    /// Process exit code for this error (sysexits-style).
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound | Self::NoPending => 66,
            Self::ParseError | Self::CsrRejected => 65,
            Self::InvalidConfig => 78,
            Self::CaNotInitialized => 69,
            Self::IoError | Self::SwapFailed | Self::SerialFailed => 74,
            Self::Internal => 70,
        }
    }
}
