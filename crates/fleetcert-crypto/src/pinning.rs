//! Certificate fingerprints and hex rendering.
//!
//! Fingerprints identify certificates in logs, audit entries, and status
//! output without printing the whole PEM.

use std::fmt::Write;

use sha2::{Digest, Sha256};

/// SHA-256 over the certificate DER, as lowercase hex.
pub fn fingerprint_sha256(cert_der: &[u8]) -> String {
    hex(&Sha256::digest(cert_der), false)
}

/// Uppercase hex, two digits per byte. Serial numbers use this form.
pub fn hex_upper(bytes: &[u8]) -> String {
    hex(bytes, true)
}

fn hex(bytes: &[u8], upper: bool) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            // Writing to a String cannot fail.
            let _ = if upper {
                write!(out, "{b:02X}")
            } else {
                write!(out, "{b:02x}")
            };
            out
        })
}
