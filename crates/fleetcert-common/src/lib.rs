//! Shared plumbing for fleetcert crates: the rooted file access port,
//! wire error codes, data paths, and JSON persistence helpers.

pub mod error;
pub mod fs;
pub mod paths;
pub mod persist;

pub use error::ErrorCode;
pub use fs::{FileAccess, FileMode, RootedFs};
