#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid PEM: {0}")]
    Pem(String),

    #[error("unexpected PEM label: expected {expected}, found {found}")]
    UnexpectedLabel { expected: &'static str, found: String },

    #[error("certificate parse failed: {0}")]
    Certificate(String),

    #[error("private key parse failed: {0}")]
    Key(String),

    #[error("signature verification failed: {0}")]
    Verification(String),

    #[error("request generation failed: {0}")]
    Request(String),
}

impl From<::pem::PemError> for CodecError {
    fn from(e: ::pem::PemError) -> Self {
        Self::Pem(e.to_string())
    }
}
