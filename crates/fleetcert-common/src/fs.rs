//! Rooted file access port.
//!
//! Every component that persists state goes through [`FileAccess`] so the
//! storage root is chosen once at wiring time and tests can substitute a
//! fault-injecting implementation. Paths handed to a `FileAccess` are
//! *rooted*: they are interpreted relative to the implementation's root.
//!
//! `rename` is expected to be atomic for a single file on the same
//! filesystem. Callers that build multi-file protocols on top of it (the
//! rotation store) depend on that guarantee; it does not hold on every
//! network filesystem.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Permission class applied when a file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// World-readable (0644 on Unix).
    Public,
    /// Owner-only (0600 on Unix).
    Private,
}

impl FileMode {
    /// Unix permission bits for this class.
    pub fn unix_mode(self) -> u32 {
        match self {
            Self::Public => 0o644,
            Self::Private => 0o600,
        }
    }
}

/// Blocking file primitives scoped to a root directory.
pub trait FileAccess: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate `path` and write `contents` with the given mode.
    fn write(&self, path: &Path, contents: &[u8], mode: FileMode) -> io::Result<()>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> io::Result<bool>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Replace `to` with `from` in a single step.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Host path backing a rooted path.
    fn resolve(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Production [`FileAccess`] backed by `std::fs` under a root directory.
#[derive(Debug, Clone)]
pub struct RootedFs {
    root: PathBuf,
}

impl RootedFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileAccess for RootedFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(path)?)
    }

    fn write(&self, path: &Path, contents: &[u8], mode: FileMode) -> io::Result<()> {
        let full = self.resolve(path)?;
        write_with_mode(&full, contents, mode)?;
        tracing::trace!(path = %full.display(), ?mode, "File written");
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(self.resolve(path)?)
    }

    fn exists(&self, path: &Path) -> io::Result<bool> {
        let full = self.resolve(path)?;
        match std::fs::metadata(&full) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(self.resolve(path)?)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(self.resolve(from)?, self.resolve(to)?)
    }

    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for component in path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("path escapes storage root: {}", path.display()),
                    ));
                }
            }
        }
        Ok(resolved)
    }
}

/// Write a host path (not rooted) with the given permission class.
#[cfg(unix)]
pub fn write_with_mode(path: &Path, contents: &[u8], mode: FileMode) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode.unix_mode())
        .open(path)?;
    // The open mode only applies to newly created files.
    file.set_permissions(std::fs::Permissions::from_mode(mode.unix_mode()))?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
pub fn write_with_mode(path: &Path, contents: &[u8], _mode: FileMode) -> io::Result<()> {
    std::fs::write(path, contents)
}

/// Parent directory of a rooted path, if it has a non-empty one.
pub fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::temp_dir;

    #[test]
    fn resolve_strips_leading_root() {
        let fs = RootedFs::new("/srv/fleet");
        let resolved = fs.resolve(Path::new("/certs/device.pem")).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/fleet/certs/device.pem"));
    }

    #[test]
    fn resolve_rejects_parent_components() {
        let fs = RootedFs::new("/srv/fleet");
        let err = fs.resolve(Path::new("certs/../../etc/passwd")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn write_read_rename_remove() {
        let fs = RootedFs::new(temp_dir("fs-basic"));
        fs.create_dir_all(Path::new("a/b")).unwrap();
        fs.write(Path::new("a/b/one"), b"hello", FileMode::Public)
            .unwrap();
        assert!(fs.exists(Path::new("a/b/one")).unwrap());

        fs.rename(Path::new("a/b/one"), Path::new("a/two")).unwrap();
        assert!(!fs.exists(Path::new("a/b/one")).unwrap());
        assert_eq!(fs.read(Path::new("a/two")).unwrap(), b"hello");

        fs.remove(Path::new("a/two")).unwrap();
        let err = fs.remove(Path::new("a/two")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn private_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let fs = RootedFs::new(temp_dir("fs-mode"));
        fs.create_dir_all(Path::new("")).unwrap();
        fs.write(Path::new("key.pem"), b"k", FileMode::Public).unwrap();
        // Rewriting an existing file must still tighten its mode.
        fs.write(Path::new("key.pem"), b"k", FileMode::Private).unwrap();

        let meta = std::fs::metadata(fs.resolve(Path::new("key.pem")).unwrap()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn parent_dir_skips_empty() {
        assert_eq!(parent_dir(Path::new("cert.pem")), None);
        assert_eq!(parent_dir(Path::new("a/cert.pem")), Some(Path::new("a")));
    }
}
