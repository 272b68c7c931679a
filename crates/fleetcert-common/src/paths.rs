use std::path::PathBuf;

/// Root data directory for fleetcert.
///
/// `FLEETCERT_DATA_DIR` overrides the platform default:
///
/// - Linux: `~/.fleetcert/`
/// - macOS: `~/Library/Application Support/fleetcert/`
/// - Windows: `%LOCALAPPDATA%\fleetcert\`
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("FLEETCERT_DATA_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("fleetcert");
        }
    }

    #[cfg(windows)]
    {
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            return PathBuf::from(local).join("fleetcert");
        }
    }

    #[cfg(not(any(target_os = "macos", windows)))]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".fleetcert");
        }
    }

    PathBuf::from(".fleetcert")
}
