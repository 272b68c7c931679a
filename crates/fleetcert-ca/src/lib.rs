//! fleetcert CA: certificate authority for device identities.
//!
//! Loads or bootstraps a self-signed root, signs leaf certificates from
//! device CSRs with unique serial numbers, and publishes the trust bundle
//! devices verify against.

pub mod audit;
pub mod ca;
pub mod error;
pub mod options;
pub mod serial;

pub use ca::{CaConfig, CaState, DEFAULT_CA_VALIDITY_DAYS};
pub use error::CaError;
pub use options::{custom_extension, ExtendedUsage, TemplateOption};
pub use serial::{FileSerialGenerator, RandomSerialGenerator, Serial, SerialGenerator};
