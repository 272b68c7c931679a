//! Device-side key and CSR generation.

use std::net::IpAddr;

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType};
use zeroize::Zeroizing;

use crate::error::CodecError;

/// A freshly generated private key and the CSR that carries its public half.
pub struct GeneratedRequest {
    pub csr_pem: String,
    pub key_pem: Zeroizing<String>,
}

/// Generate a P-256 key and a CSR for `common_name`.
///
/// Entries in `sans` that parse as IP addresses become IP SANs; the rest
/// become DNS SANs.
pub fn generate_request(common_name: &str, sans: &[String]) -> Result<GeneratedRequest, CodecError> {
    let key = KeyPair::generate().map_err(|e| CodecError::Request(e.to_string()))?;

    let dns_sans: Vec<String> = sans
        .iter()
        .filter(|s| s.parse::<IpAddr>().is_err())
        .cloned()
        .collect();

    let mut params =
        CertificateParams::new(dns_sans).map_err(|e| CodecError::Request(e.to_string()))?;

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, common_name);
    params.distinguished_name = distinguished_name;

    for san in sans {
        if let Ok(ip) = san.parse::<IpAddr>() {
            params.subject_alt_names.push(SanType::IpAddress(ip));
        }
    }

    let csr = params
        .serialize_request(&key)
        .map_err(|e| CodecError::Request(e.to_string()))?;
    let csr_pem = csr.pem().map_err(|e| CodecError::Request(e.to_string()))?;

    Ok(GeneratedRequest {
        csr_pem,
        key_pem: Zeroizing::new(key.serialize_pem()),
    })
}
