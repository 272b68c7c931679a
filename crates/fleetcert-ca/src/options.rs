//! Issuance knobs: extended key usages and template-mutation options.

use std::fmt;
use std::str::FromStr;

use rcgen::{CertificateParams, CustomExtension, ExtendedKeyUsagePurpose};

use crate::error::CaError;

/// Extended key usage requested for an issued certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtendedUsage {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

impl ExtendedUsage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerAuth => "serverAuth",
            Self::ClientAuth => "clientAuth",
            Self::CodeSigning => "codeSigning",
            Self::EmailProtection => "emailProtection",
            Self::TimeStamping => "timeStamping",
            Self::OcspSigning => "ocspSigning",
        }
    }

    pub(crate) fn purpose(self) -> ExtendedKeyUsagePurpose {
        match self {
            Self::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
            Self::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
            Self::CodeSigning => ExtendedKeyUsagePurpose::CodeSigning,
            Self::EmailProtection => ExtendedKeyUsagePurpose::EmailProtection,
            Self::TimeStamping => ExtendedKeyUsagePurpose::TimeStamping,
            Self::OcspSigning => ExtendedKeyUsagePurpose::OcspSigning,
        }
    }
}

impl fmt::Display for ExtendedUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtendedUsage {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serverAuth" => Ok(Self::ServerAuth),
            "clientAuth" => Ok(Self::ClientAuth),
            "codeSigning" => Ok(Self::CodeSigning),
            "emailProtection" => Ok(Self::EmailProtection),
            "timeStamping" => Ok(Self::TimeStamping),
            "ocspSigning" => Ok(Self::OcspSigning),
            other => Err(CaError::UnknownUsage(other.to_string())),
        }
    }
}

/// A mutation applied to the leaf template after the authority has filled
/// in its own fields and before signing. Options run in order; the first
/// failure aborts issuance.
pub trait TemplateOption {
    fn apply(&self, params: &mut CertificateParams) -> Result<(), CaError>;
}

impl<F> TemplateOption for F
where
    F: Fn(&mut CertificateParams) -> Result<(), CaError>,
{
    fn apply(&self, params: &mut CertificateParams) -> Result<(), CaError> {
        self(params)
    }
}

/// Add a non-critical extension with pre-encoded DER `content`.
pub fn custom_extension(oid: &[u64], content: Vec<u8>) -> impl TemplateOption {
    let oid = oid.to_vec();
    move |params: &mut CertificateParams| {
        if oid.len() < 2 {
            return Err(CaError::Option(format!("invalid extension OID {oid:?}")));
        }
        params
            .custom_extensions
            .push(CustomExtension::from_oid_content(&oid, content.clone()));
        Ok(())
    }
}
