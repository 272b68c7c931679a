//! JSON files on host paths (the config file).

use serde::de::DeserializeOwned;
use std::io;
use std::path::Path;

/// Parse `path` as JSON. Syntax and shape errors surface as `InvalidData`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {e}", path.display()),
        )
    })
}

/// Like [`read_json`], but a missing file yields `T::default()`.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> io::Result<T> {
    match read_json(path) {
        Ok(value) => Ok(value),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No file; using defaults");
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}
