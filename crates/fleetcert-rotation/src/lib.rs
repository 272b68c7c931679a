//! fleetcert rotation: crash-safe device certificate store.
//!
//! A device keeps one active certificate/key pair. Replacements are staged
//! in a pending slot and promoted by two single-file renames guarded by a
//! backup copy, so a crash at any point leaves either the old or the new
//! pair recoverable. See [`CertificateStore`] for the protocol and
//! [`CertificateStore::recover`] for startup recovery.
//!
//! Single-file `rename` must be atomic on the filesystem holding the store.
//! That holds for local POSIX and NTFS volumes but not for every network
//! filesystem.

pub mod error;
pub mod recovery;
pub mod slots;
pub mod store;

pub use error::RotationError;
pub use recovery::RecoveryAction;
pub use slots::{ArtifactKind, BackupState, PairPaths, SlotInventory, SlotPaths, SlotState};
pub use store::CertificateStore;
