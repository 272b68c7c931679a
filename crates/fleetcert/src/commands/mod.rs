//! CLI command handlers.
//!
//! Each handler works on the data directory named by [`Config`] and prints
//! either human-readable text or one JSON object per command.

pub mod ca;
pub mod device;
pub mod rotate;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use fleetcert_ca::ExtendedUsage;
use fleetcert_common::{FileAccess, RootedFs};
use fleetcert_rotation::CertificateStore;

use crate::cli::{IdentityArgs, LeafArgs};
use crate::config::{parse_usages, Config};

/// Print a serializable value as JSON, handling serialization errors
/// gracefully instead of panicking.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: failed to serialize response: {e}"),
    }
}

pub(crate) fn data_fs(config: &Config) -> Arc<dyn FileAccess> {
    Arc::new(RootedFs::new(&config.data_dir))
}

pub(crate) fn device_store(config: &Config, fs: Arc<dyn FileAccess>) -> CertificateStore {
    CertificateStore::new(fs, &config.device_cert, &config.device_key)
}

/// Leaf lifetime and usages: flags win over the config file.
pub(crate) fn leaf_settings(
    config: &Config,
    args: &LeafArgs,
) -> anyhow::Result<(Duration, Vec<ExtendedUsage>)> {
    let days = args.validity_days.unwrap_or(config.leaf_validity_days);
    let usages = if args.usages.is_empty() {
        config.usages.clone()
    } else {
        parse_usages(&args.usages)?
    };
    Ok((Duration::days(i64::from(days)), usages))
}

/// Common name and SANs: flags win over the config file.
pub(crate) fn identity(
    config: &Config,
    args: &IdentityArgs,
) -> anyhow::Result<(String, Vec<String>)> {
    let cn = args
        .cn
        .clone()
        .or_else(|| config.common_name.clone())
        .context("no common name: pass --cn or set device.common_name in the config file")?;
    let sans = if args.sans.is_empty() {
        config.sans.clone()
    } else {
        args.sans.clone()
    };
    Ok((cn, sans))
}

/// Read a file given on the command line (host path, not data-dir rooted).
pub(crate) fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

/// Write PEM text to `out`, or stdout when no path is given.
pub(crate) fn write_output(out: Option<&Path>, pem: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = fleetcert_common::fs::parent_dir(path) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::write(path, pem).with_context(|| format!("writing {}", path.display()))
        }
        None => {
            print!("{pem}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, Overrides};
    use std::path::PathBuf;

    fn config() -> Config {
        Config::merge(PathBuf::from("/srv"), FileConfig::default(), &Overrides::default()).unwrap()
    }

    #[test]
    fn leaf_flags_override_config() {
        let mut config = config();
        config.leaf_validity_days = 90;

        let (validity, usages) = leaf_settings(&config, &LeafArgs::default()).unwrap();
        assert_eq!(validity, Duration::days(90));
        assert_eq!(usages, [ExtendedUsage::ClientAuth]);

        let args = LeafArgs {
            validity_days: Some(7),
            usages: vec!["serverAuth".into()],
        };
        let (validity, usages) = leaf_settings(&config, &args).unwrap();
        assert_eq!(validity, Duration::days(7));
        assert_eq!(usages, [ExtendedUsage::ServerAuth]);
    }

    #[test]
    fn identity_requires_a_common_name() {
        let err = identity(&config(), &IdentityArgs::default()).unwrap_err();
        assert!(err.to_string().contains("--cn"), "{err}");

        let mut config = config();
        config.common_name = Some("stone-01".into());
        config.sans = vec!["stone-01.local".into()];
        let (cn, sans) = identity(&config, &IdentityArgs::default()).unwrap();
        assert_eq!(cn, "stone-01");
        assert_eq!(sans, ["stone-01.local"]);
    }
}
