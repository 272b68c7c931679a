//! fleetcert crypto: certificate codec and key helpers.
//!
//! PEM armor for certificates and keys, parsed certificate summaries,
//! SHA-256 fingerprints, key/certificate matching, and device-side CSR
//! generation.

pub mod codec;
pub mod error;
pub mod pinning;
pub mod request;

pub use codec::{
    decode_certificate_pem, decode_certificates_pem, decode_private_key_pem,
    encode_certificate_pem, encode_certificates_pem, encode_private_key_pem,
    key_matches_certificate, Certificate,
};
pub use error::CodecError;
pub use request::{generate_request, GeneratedRequest};
