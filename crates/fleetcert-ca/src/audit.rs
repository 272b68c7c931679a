//! Append-only issuance audit log.
//!
//! One line per event: `2026-02-11T10:30:00Z | certificate_issued | serial=0A | subject=CN=stone-05`.
//! Lines are never rewritten.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use fleetcert_common::fs::parent_dir;
use fleetcert_common::FileAccess;

pub const CA_CREATED: &str = "ca_created";
pub const CA_LOADED: &str = "ca_loaded";
pub const CERTIFICATE_ISSUED: &str = "certificate_issued";

/// Append one entry to the log at rooted `path`.
pub fn append_entry(
    fs: &dyn FileAccess,
    path: &Path,
    event: &str,
    fields: &[(&str, &str)],
) -> Result<(), std::io::Error> {
    fs.create_dir_all(parent_dir(path).unwrap_or_else(|| Path::new("")))?;

    let entry = format_entry(Utc::now(), event, fields);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(fs.resolve(path)?)?
        .write_all(entry.as_bytes())?;

    tracing::debug!(event, path = %path.display(), "Audit entry appended");
    Ok(())
}

fn format_entry(at: DateTime<Utc>, event: &str, fields: &[(&str, &str)]) -> String {
    let columns = std::iter::once(at.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .chain(std::iter::once(event.to_string()))
        .chain(fields.iter().map(|(key, value)| format!("{key}={value}")));
    let mut entry = columns.collect::<Vec<_>>().join(" | ");
    entry.push('\n');
    entry
}

/// Entire log, or an empty string if nothing has been logged yet.
pub fn read_log(fs: &dyn FileAccess, path: &Path) -> Result<String, std::io::Error> {
    match fs.read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcert_common::test::temp_dir;
    use fleetcert_common::RootedFs;

    #[test]
    fn entry_columns_are_pipe_separated() {
        let at = DateTime::from_timestamp(1_770_805_800, 0).unwrap();
        assert_eq!(
            format_entry(at, CA_LOADED, &[("fingerprint", "ab12")]),
            "2026-02-11T10:30:00Z | ca_loaded | fingerprint=ab12\n"
        );
        assert_eq!(format_entry(at, CA_LOADED, &[]), "2026-02-11T10:30:00Z | ca_loaded\n");
    }

    #[test]
    fn entries_accumulate_in_order() {
        let fs = RootedFs::new(temp_dir("audit"));
        let path = Path::new("logs/ca-audit.log");

        assert_eq!(read_log(&fs, path).unwrap(), "");

        append_entry(&fs, path, CA_CREATED, &[("subject", "CN=test-ca")]).unwrap();
        append_entry(
            &fs,
            path,
            CERTIFICATE_ISSUED,
            &[("serial", "00"), ("subject", "CN=stone-05")],
        )
        .unwrap();

        let content = read_log(&fs, path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("| ca_created | subject=CN=test-ca"));
        assert!(lines[1].contains("certificate_issued"));
        assert!(lines[1].ends_with("| serial=00 | subject=CN=stone-05"));
    }
}
