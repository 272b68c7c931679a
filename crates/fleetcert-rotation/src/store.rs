//! Device certificate store with staged, crash-safe promotion.
//!
//! One store owns the files of one device identity: the active pair, a
//! staged (pending) replacement, and a transient backup taken during
//! promotion. Promotion copies the active pair to the backup slot, then
//! renames the pending certificate and the pending key onto the active
//! paths in that order. Each rename is atomic on its own; the pair is not,
//! which is why the backup must exist before the first rename.
//!
//! The store does no locking. Callers serialise `write`, `write_pending`,
//! `promote`, `rollback`, and `recover` per device. Reads are safe while
//! no mutation is in flight.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fleetcert_common::fs::parent_dir;
use fleetcert_common::FileAccess;
use fleetcert_crypto::{decode_certificate_pem, encode_certificate_pem, Certificate};
use zeroize::Zeroizing;

use crate::error::RotationError;
use crate::slots::{ArtifactKind, BackupState, PairPaths, SlotPaths};

pub struct CertificateStore {
    fs: Arc<dyn FileAccess>,
    paths: SlotPaths,
}

impl CertificateStore {
    /// Store rooted at `cert_path` / `key_path` (rooted paths within `fs`).
    pub fn new(
        fs: Arc<dyn FileAccess>,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fs,
            paths: SlotPaths::new(cert_path, key_path),
        }
    }

    pub fn paths(&self) -> &SlotPaths {
        &self.paths
    }

    pub(crate) fn file_access(&self) -> &dyn FileAccess {
        &*self.fs
    }

    // ── Active slot ─────────────────────────────────────────────────

    /// Read and decode the active certificate. Does not touch the key.
    pub fn load_active(&self) -> Result<Certificate, RotationError> {
        self.load_certificate(&self.paths.active.cert)
    }

    pub fn load_active_key(&self) -> Result<Zeroizing<Vec<u8>>, RotationError> {
        self.load_key(&self.paths.active.key)
    }

    /// Overwrite the active pair directly.
    ///
    /// For first-time provisioning only; rotation goes through
    /// [`write_pending`](Self::write_pending) and [`promote`](Self::promote).
    pub fn write(&self, cert: &Certificate, key: &[u8]) -> Result<(), RotationError> {
        self.write_pair(&self.paths.active, cert, key)?;
        tracing::info!(
            path = %self.paths.active.cert.display(),
            fingerprint = %cert.fingerprint(),
            "Active certificate written"
        );
        Ok(())
    }

    /// Remove the active pair. Missing files are not an error.
    ///
    /// Returns whether either file was actually removed.
    pub fn delete(&self) -> bool {
        let cert = self.remove_quietly(&self.paths.active.cert, "active certificate");
        let key = self.remove_quietly(&self.paths.active.key, "active key");
        if cert || key {
            tracing::info!(path = %self.paths.active.cert.display(), "Active certificate deleted");
        } else {
            tracing::debug!(path = %self.paths.active.cert.display(), "No active certificate to delete");
        }
        cert || key
    }

    // ── Pending slot ────────────────────────────────────────────────

    /// Whether a pending certificate is staged.
    ///
    /// Only the certificate file is checked. A pending certificate whose key
    /// went missing still counts, and fails later at promotion.
    pub fn has_pending(&self) -> Result<bool, RotationError> {
        Ok(self.fs.exists(&self.paths.pending.cert)?)
    }

    /// Stage a replacement pair. The active slot is not touched.
    pub fn write_pending(&self, cert: &Certificate, key: &[u8]) -> Result<(), RotationError> {
        self.write_pair(&self.paths.pending, cert, key)?;
        tracing::info!(
            path = %self.paths.pending.cert.display(),
            fingerprint = %cert.fingerprint(),
            "Pending certificate staged"
        );
        Ok(())
    }

    pub fn load_pending(&self) -> Result<Certificate, RotationError> {
        self.load_certificate(&self.paths.pending.cert)
    }

    pub fn load_pending_key(&self) -> Result<Zeroizing<Vec<u8>>, RotationError> {
        self.load_key(&self.paths.pending.key)
    }

    /// Remove both pending files. Idempotent; missing files are fine.
    pub fn cleanup_pending(&self) {
        self.remove_quietly(&self.paths.pending.cert, "pending certificate");
        self.remove_quietly(&self.paths.pending.key, "pending key");
        tracing::debug!(path = %self.paths.pending.cert.display(), "Pending slot cleared");
    }

    // ── Promotion ───────────────────────────────────────────────────

    /// Atomically promote the pending pair to active.
    ///
    /// On [`RotationError::Swap`] the caller must re-check
    /// [`load_active`](Self::load_active): the error does not say which
    /// certificate ended up active.
    pub fn promote(&self) -> Result<(), RotationError> {
        if !self.has_pending()? {
            return Err(RotationError::NoPending);
        }

        let backup = self.create_backup()?;

        // Certificate first, then key. The recovery logic below depends on
        // this order.
        if let Err(e) = self
            .fs
            .rename(&self.paths.pending.cert, &self.paths.active.cert)
        {
            tracing::error!(error = %e, "Certificate rename failed; active pair unchanged");
            self.discard_backup(&backup);
            return Err(RotationError::Swap(format!(
                "failed to swap certificate: {e}"
            )));
        }

        if let Err(e) = self
            .fs
            .rename(&self.paths.pending.key, &self.paths.active.key)
        {
            tracing::error!(
                error = %e,
                "Key rename failed after certificate rename; active pair is mismatched"
            );
            self.restore(&backup, "key swap failed during promotion");
            match self.load_active() {
                Ok(cert) => tracing::info!(
                    fingerprint = %cert.fingerprint(),
                    "Active certificate after rollback"
                ),
                Err(check) => tracing::error!(
                    error = %check,
                    "No usable active certificate after rollback; manual intervention may be required"
                ),
            }
            return Err(RotationError::Swap(format!("failed to swap key: {e}")));
        }

        self.discard_backup(&backup);
        tracing::info!(path = %self.paths.active.cert.display(), "Pending certificate promoted");
        Ok(())
    }

    /// Restore the active pair from backup, if one exists, and drop any
    /// pending pair.
    ///
    /// Best effort: never fails. Callers that need to know whether the
    /// device is healthy afterwards must re-check [`load_active`](Self::load_active).
    pub fn rollback(&self, reason: &str) {
        let backup = self.detect_backup();
        self.restore(&backup, reason);
    }

    pub(crate) fn detect_backup(&self) -> BackupState {
        let backup = &self.paths.backup;
        let present = self.fs.exists(&backup.cert).and_then(|cert| {
            if cert {
                Ok(true)
            } else {
                self.fs.exists(&backup.key)
            }
        });
        match present {
            Ok(true) => BackupState::Present {
                cert: backup.cert.clone(),
                key: backup.key.clone(),
            },
            Ok(false) => BackupState::Absent,
            Err(e) => {
                tracing::warn!(error = %e, "Could not check for backup files; assuming none");
                BackupState::Absent
            }
        }
    }

    pub(crate) fn restore(&self, backup: &BackupState, reason: &str) {
        match backup {
            BackupState::Present { cert, key } => {
                tracing::warn!(reason, "Rolling back to backup certificate");
                match self.fs.rename(cert, &self.paths.active.cert) {
                    Ok(()) => tracing::info!("Backup certificate restored"),
                    Err(e) => tracing::error!(
                        error = %e,
                        path = %cert.display(),
                        "Failed to restore backup certificate"
                    ),
                }
                match self.fs.rename(key, &self.paths.active.key) {
                    Ok(()) => tracing::info!("Backup key restored"),
                    Err(e) => tracing::error!(
                        error = %e,
                        path = %key.display(),
                        "Failed to restore backup key"
                    ),
                }
            }
            BackupState::Absent => {
                tracing::warn!(
                    reason,
                    "No backup available for rollback; manual intervention may be required"
                );
            }
        }

        self.cleanup_pending();
    }

    /// Copy the active pair into the backup slot, if anything is active.
    fn create_backup(&self) -> Result<BackupState, RotationError> {
        if !self.fs.exists(&self.paths.active.cert)? {
            tracing::debug!("No active certificate; promoting first certificate without backup");
            return Ok(BackupState::Absent);
        }

        let result = self
            .copy_artifact(
                &self.paths.active.cert,
                &self.paths.backup.cert,
                ArtifactKind::Certificate,
            )
            .and_then(|()| {
                self.copy_artifact(&self.paths.active.key, &self.paths.backup.key, ArtifactKind::Key)
            });

        if let Err(e) = result {
            self.remove_quietly(&self.paths.backup.cert, "partial backup certificate");
            self.remove_quietly(&self.paths.backup.key, "partial backup key");
            return Err(RotationError::Swap(format!(
                "failed to back up active pair: {e}"
            )));
        }

        tracing::debug!(path = %self.paths.backup.cert.display(), "Active pair backed up");
        Ok(BackupState::Present {
            cert: self.paths.backup.cert.clone(),
            key: self.paths.backup.key.clone(),
        })
    }

    pub(crate) fn discard_backup(&self, backup: &BackupState) {
        if let BackupState::Present { cert, key } = backup {
            self.remove_quietly(cert, "backup certificate");
            self.remove_quietly(key, "backup key");
        }
    }

    // ── File helpers ────────────────────────────────────────────────

    fn load_certificate(&self, path: &Path) -> Result<Certificate, RotationError> {
        let bytes = self.read(path)?;
        decode_certificate_pem(&bytes).map_err(|source| RotationError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn load_key(&self, path: &Path) -> Result<Zeroizing<Vec<u8>>, RotationError> {
        self.read(path).map(Zeroizing::new)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, RotationError> {
        self.fs.read(path).map_err(|e| not_found_or_io(e, path))
    }

    /// Write certificate then key; on failure remove what was written.
    fn write_pair(
        &self,
        pair: &PairPaths,
        cert: &Certificate,
        key: &[u8],
    ) -> Result<(), RotationError> {
        let cert_pem = encode_certificate_pem(cert);
        self.ensure_parent(&pair.cert)?;
        self.ensure_parent(&pair.key)?;

        if let Err(e) = self.write_artifact(&pair.cert, cert_pem.as_bytes(), ArtifactKind::Certificate)
        {
            self.remove_quietly(&pair.cert, "partially written certificate");
            return Err(e.into());
        }

        if let Err(e) = self.write_artifact(&pair.key, key, ArtifactKind::Key) {
            self.remove_quietly(&pair.cert, "certificate without key");
            self.remove_quietly(&pair.key, "partially written key");
            return Err(e.into());
        }

        Ok(())
    }

    fn write_artifact(&self, path: &Path, contents: &[u8], kind: ArtifactKind) -> io::Result<()> {
        self.fs.write(path, contents, kind.file_mode())
    }

    fn copy_artifact(&self, from: &Path, to: &Path, kind: ArtifactKind) -> io::Result<()> {
        let contents = Zeroizing::new(self.fs.read(from)?);
        self.ensure_parent(to)?;
        self.write_artifact(to, &contents, kind)
    }

    /// Create the parent directory; a bare file name means the store root.
    fn ensure_parent(&self, path: &Path) -> io::Result<()> {
        self.fs
            .create_dir_all(parent_dir(path).unwrap_or_else(|| Path::new("")))
    }

    /// Remove a file, logging instead of failing. Absence is expected.
    /// Best-effort removal; `true` when the file was there and is gone.
    pub(crate) fn remove_quietly(&self, path: &Path, what: &str) -> bool {
        match self.fs.remove(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), what, "Removed");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    what,
                    "Failed to remove file"
                );
                false
            }
        }
    }
}

fn not_found_or_io(e: io::Error, path: &Path) -> RotationError {
    if e.kind() == io::ErrorKind::NotFound {
        RotationError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        RotationError::Io(e)
    }
}
