//! Slot-state inspection and startup recovery.

use fleetcert_crypto::key_matches_certificate;

use crate::error::RotationError;
use crate::slots::{BackupState, SlotInventory, SlotState};
use crate::store::CertificateStore;

/// What [`CertificateStore::recover`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Layout was already consistent.
    Nothing,
    /// The backup was stale and has been removed; active pair kept.
    DiscardedBackup,
    /// The active pair was restored from backup.
    RestoredBackup,
    /// A pending key without its certificate was removed.
    RemovedOrphanPending,
    /// The pending key was moved onto the active key path, finishing a
    /// promotion that stopped after its certificate rename.
    CompletedKeyRename,
}

impl RecoveryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::DiscardedBackup => "discarded_backup",
            Self::RestoredBackup => "restored_backup",
            Self::RemovedOrphanPending => "removed_orphan_pending",
            Self::CompletedKeyRename => "completed_key_rename",
        }
    }
}

impl CertificateStore {
    /// Existence of each of the six slot files.
    pub fn inventory(&self) -> Result<SlotInventory, RotationError> {
        let fs = self.file_access();
        let p = self.paths();
        Ok(SlotInventory {
            active_cert: fs.exists(&p.active.cert)?,
            active_key: fs.exists(&p.active.key)?,
            pending_cert: fs.exists(&p.pending.cert)?,
            pending_key: fs.exists(&p.pending.key)?,
            backup_cert: fs.exists(&p.backup.cert)?,
            backup_key: fs.exists(&p.backup.key)?,
        })
    }

    pub fn state(&self) -> Result<SlotState, RotationError> {
        Ok(self.inventory()?.state())
    }

    /// Resolve whatever an interrupted promotion left behind.
    ///
    /// Run once at startup, before any other mutation. The decision follows
    /// the rename order of `promote`: certificate first, then key.
    pub fn recover(&self) -> Result<RecoveryAction, RotationError> {
        let inv = self.inventory()?;

        if !inv.any_backup() {
            if inv.pending_key && !inv.pending_cert && inv.active_cert {
                // Either a staging write failed halfway or a first promotion
                // died after the certificate rename. In the second case the
                // pending key is the only key for the active certificate.
                if !inv.active_key || self.pending_key_matches_active() {
                    self.finish_key_rename()?;
                    return Ok(RecoveryAction::CompletedKeyRename);
                }
                tracing::warn!("Pending key without pending certificate; removing");
                self.cleanup_pending();
                return Ok(RecoveryAction::RemovedOrphanPending);
            }
            return Ok(RecoveryAction::Nothing);
        }

        let backup = BackupState::Present {
            cert: self.paths().backup.cert.clone(),
            key: self.paths().backup.key.clone(),
        };

        if inv.pending_cert {
            // Crash before the certificate rename: active pair untouched.
            tracing::info!("Promotion interrupted before any rename; discarding backup");
            self.discard_backup(&backup);
            return Ok(RecoveryAction::DiscardedBackup);
        }

        if inv.pending_key {
            // Certificate renamed, key not: active pair is mismatched.
            self.restore(&backup, "promotion interrupted between certificate and key rename");
            return Ok(RecoveryAction::RestoredBackup);
        }

        // Both renames done; only cleanup was lost. Keep the new pair if it
        // is usable.
        match self.active_pair_is_usable() {
            Some(false) => {
                self.restore(&backup, "active pair unusable after interrupted promotion");
                Ok(RecoveryAction::RestoredBackup)
            }
            _ => {
                tracing::info!("Promotion completed before interruption; discarding backup");
                self.discard_backup(&backup);
                Ok(RecoveryAction::DiscardedBackup)
            }
        }
    }

    fn pending_key_matches_active(&self) -> bool {
        let (Ok(cert), Ok(key)) = (self.load_active(), self.load_pending_key()) else {
            return false;
        };
        key_matches_certificate(&cert, &key).unwrap_or(false)
    }

    fn finish_key_rename(&self) -> Result<(), RotationError> {
        let p = self.paths();
        self.file_access().rename(&p.pending.key, &p.active.key)?;
        tracing::warn!(
            path = %p.active.key.display(),
            "Promotion interrupted after certificate rename; pending key moved into place"
        );
        Ok(())
    }

    /// `Some(false)` when the active pair is missing, unparseable, or
    /// mismatched. `None` when the key encoding is opaque to us.
    fn active_pair_is_usable(&self) -> Option<bool> {
        let cert = match self.load_active() {
            Ok(cert) => cert,
            Err(e) => {
                tracing::warn!(error = %e, "Active certificate unusable");
                return Some(false);
            }
        };
        let key = match self.load_active_key() {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "Active key unusable");
                return Some(false);
            }
        };
        match key_matches_certificate(&cert, &key) {
            Ok(matches) => {
                if !matches {
                    tracing::warn!(
                        path = %self.paths().active.key.display(),
                        "Active key does not match active certificate"
                    );
                }
                Some(matches)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Active key not parseable; keeping active pair");
                None
            }
        }
    }
}
