//! Slot layout: where each slot's certificate and key live.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use fleetcert_common::FileMode;

const PENDING_SUFFIX: &str = ".pending";
const BACKUP_SUFFIX: &str = ".backup";

/// What a persisted file holds. Decides its permission class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Certificate,
    Key,
}

impl ArtifactKind {
    pub fn file_mode(self) -> FileMode {
        match self {
            Self::Certificate => FileMode::Public,
            Self::Key => FileMode::Private,
        }
    }
}

/// Certificate and key path of one slot (active, pending, or backup).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Paths of all three slots, derived from the active cert and key paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPaths {
    pub active: PairPaths,
    pub pending: PairPaths,
    pub backup: PairPaths,
}

impl SlotPaths {
    pub fn new(cert_base: impl Into<PathBuf>, key_base: impl Into<PathBuf>) -> Self {
        let cert = cert_base.into();
        let key = key_base.into();
        Self {
            pending: PairPaths {
                cert: with_suffix(&cert, PENDING_SUFFIX),
                key: with_suffix(&key, PENDING_SUFFIX),
            },
            backup: PairPaths {
                cert: with_suffix(&cert, BACKUP_SUFFIX),
                key: with_suffix(&key, BACKUP_SUFFIX),
            },
            active: PairPaths { cert, key },
        }
    }
}

/// Whether promotion made a copy of the previous active pair.
///
/// Produced by the backup step and handed to rollback so rollback never
/// has to guess from file existence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupState {
    /// First certificate: nothing was active, nothing to restore.
    Absent,
    Present { cert: PathBuf, key: PathBuf },
}

/// Observable protocol state of the three slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No active certificate and nothing staged.
    Empty,
    /// Nothing active yet, but a first certificate is staged.
    PendingOnly,
    ActiveOnly,
    ActiveAndPending,
    /// Backup and pending files both present: promotion was interrupted.
    SwapInProgress,
    /// Backup left behind after promotion finished renaming.
    ActiveAndBackup,
}

impl SlotState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::PendingOnly => "pending_only",
            Self::ActiveOnly => "active_only",
            Self::ActiveAndPending => "active_and_pending",
            Self::SwapInProgress => "swap_in_progress",
            Self::ActiveAndBackup => "active_and_backup",
        }
    }

    /// True when a crash left files that `recover()` should resolve.
    pub fn needs_recovery(self) -> bool {
        matches!(self, Self::SwapInProgress | Self::ActiveAndBackup)
    }
}

/// Which of the six slot files exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotInventory {
    pub active_cert: bool,
    pub active_key: bool,
    pub pending_cert: bool,
    pub pending_key: bool,
    pub backup_cert: bool,
    pub backup_key: bool,
}

impl SlotInventory {
    pub fn any_pending(&self) -> bool {
        self.pending_cert || self.pending_key
    }

    pub fn any_backup(&self) -> bool {
        self.backup_cert || self.backup_key
    }

    pub fn state(&self) -> SlotState {
        match (self.active_cert, self.any_pending(), self.any_backup()) {
            (_, true, true) => SlotState::SwapInProgress,
            (_, false, true) => SlotState::ActiveAndBackup,
            (true, true, false) => SlotState::ActiveAndPending,
            (true, false, false) => SlotState::ActiveOnly,
            (false, true, false) => SlotState::PendingOnly,
            (false, false, false) => SlotState::Empty,
        }
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixes_are_appended_to_file_names() {
        let paths = SlotPaths::new("certs/device.crt", "keys/device.key");
        assert_eq!(paths.pending.cert, PathBuf::from("certs/device.crt.pending"));
        assert_eq!(paths.pending.key, PathBuf::from("keys/device.key.pending"));
        assert_eq!(paths.backup.cert, PathBuf::from("certs/device.crt.backup"));
        assert_eq!(paths.backup.key, PathBuf::from("keys/device.key.backup"));
        assert_eq!(paths.active.cert, PathBuf::from("certs/device.crt"));
    }

    #[test]
    fn key_artifacts_are_private() {
        assert_eq!(ArtifactKind::Key.file_mode(), FileMode::Private);
        assert_eq!(ArtifactKind::Certificate.file_mode(), FileMode::Public);
    }

    #[test]
    fn inventory_classifies_protocol_states() {
        let mut inv = SlotInventory::default();
        assert_eq!(inv.state(), SlotState::Empty);

        inv.pending_cert = true;
        inv.pending_key = true;
        assert_eq!(inv.state(), SlotState::PendingOnly);

        inv.active_cert = true;
        inv.active_key = true;
        assert_eq!(inv.state(), SlotState::ActiveAndPending);

        inv.backup_cert = true;
        assert_eq!(inv.state(), SlotState::SwapInProgress);
        assert!(inv.state().needs_recovery());

        inv.pending_cert = false;
        inv.pending_key = false;
        assert_eq!(inv.state(), SlotState::ActiveAndBackup);

        inv.backup_cert = false;
        assert_eq!(inv.state(), SlotState::ActiveOnly);
        assert!(!inv.state().needs_recovery());
    }
}
