//! Effective configuration: defaults, then the JSON file, then CLI flags.

use std::path::{Path, PathBuf};

use anyhow::Context;
use fleetcert_ca::{CaConfig, ExtendedUsage, DEFAULT_CA_VALIDITY_DAYS};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

const DEFAULT_CA_SUBJECT: &str = "fleetcert CA";
const DEFAULT_LEAF_VALIDITY_DAYS: u32 = 30;

/// On-disk config file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub ca: CaSection,
    pub device: DeviceSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaSection {
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    /// Hex serial counter. Absent means random serials.
    pub serial: Option<PathBuf>,
    pub subject: Option<String>,
    pub validity_days: Option<u32>,
    pub audit_log: Option<PathBuf>,
    pub leaf_validity_days: Option<u32>,
    pub usages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceSection {
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub common_name: Option<String>,
    pub sans: Option<Vec<String>>,
}

/// Values given on the command line; `None` defers to the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub device_cert: Option<PathBuf>,
    pub device_key: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub ca: CaConfig,
    pub leaf_validity_days: u32,
    pub usages: Vec<ExtendedUsage>,
    pub device_cert: PathBuf,
    pub device_key: PathBuf,
    pub common_name: Option<String>,
    pub sans: Vec<String>,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = cli
            .data_dir
            .clone()
            .unwrap_or_else(fleetcert_common::paths::data_dir);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("fleetcert.json"));

        let file = load_file(&config_path)?;
        let overrides = Overrides {
            device_cert: cli.device_cert.clone(),
            device_key: cli.device_key.clone(),
        };
        Self::merge(data_dir, file, &overrides)
    }

    pub fn merge(data_dir: PathBuf, file: FileConfig, overrides: &Overrides) -> anyhow::Result<Self> {
        let ca = CaConfig {
            cert_path: file.ca.cert.unwrap_or_else(|| PathBuf::from("ca/ca.crt")),
            key_path: file.ca.key.unwrap_or_else(|| PathBuf::from("ca/ca.key")),
            serial_path: file.ca.serial,
            subject: file
                .ca
                .subject
                .unwrap_or_else(|| DEFAULT_CA_SUBJECT.to_string()),
            validity_days: file.ca.validity_days.unwrap_or(DEFAULT_CA_VALIDITY_DAYS),
            audit_log: Some(
                file.ca
                    .audit_log
                    .unwrap_or_else(|| PathBuf::from("logs/ca-audit.log")),
            ),
        };

        let usages = parse_usages(
            &file
                .ca
                .usages
                .unwrap_or_else(|| vec![ExtendedUsage::ClientAuth.as_str().to_string()]),
        )?;

        Ok(Self {
            data_dir,
            ca,
            leaf_validity_days: file
                .ca
                .leaf_validity_days
                .unwrap_or(DEFAULT_LEAF_VALIDITY_DAYS),
            usages,
            device_cert: overrides
                .device_cert
                .clone()
                .or(file.device.cert)
                .unwrap_or_else(|| PathBuf::from("device/device.crt")),
            device_key: overrides
                .device_key
                .clone()
                .or(file.device.key)
                .unwrap_or_else(|| PathBuf::from("device/device.key")),
            common_name: file.device.common_name,
            sans: file.device.sans.unwrap_or_default(),
        })
    }
}

pub fn parse_usages(names: &[String]) -> anyhow::Result<Vec<ExtendedUsage>> {
    names
        .iter()
        .map(|name| name.parse::<ExtendedUsage>().map_err(anyhow::Error::from))
        .collect()
}

fn load_file(path: &Path) -> anyhow::Result<FileConfig> {
    let file: FileConfig = fleetcert_common::persist::read_json_or_default(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Config loaded");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcert_common::test::temp_dir;

    #[test]
    fn defaults_apply_without_file() {
        let config =
            Config::merge(PathBuf::from("/srv"), FileConfig::default(), &Overrides::default())
                .unwrap();
        assert_eq!(config.ca.cert_path, PathBuf::from("ca/ca.crt"));
        assert_eq!(config.ca.serial_path, None);
        assert_eq!(config.ca.validity_days, DEFAULT_CA_VALIDITY_DAYS);
        assert_eq!(config.usages, [ExtendedUsage::ClientAuth]);
        assert_eq!(config.device_cert, PathBuf::from("device/device.crt"));
        assert_eq!(config.leaf_validity_days, DEFAULT_LEAF_VALIDITY_DAYS);
    }

    #[test]
    fn cli_overrides_file_overrides_defaults() {
        let file: FileConfig = serde_json::from_str(
            r#"{
                "ca": { "serial": "ca/serial", "subject": "plant-ca", "usages": ["serverAuth", "clientAuth"] },
                "device": { "cert": "tls/file.crt", "key": "tls/file.key", "sans": ["a.local"] }
            }"#,
        )
        .unwrap();
        let overrides = Overrides {
            device_cert: Some(PathBuf::from("tls/cli.crt")),
            device_key: None,
        };

        let config = Config::merge(PathBuf::from("/srv"), file, &overrides).unwrap();
        assert_eq!(config.ca.serial_path, Some(PathBuf::from("ca/serial")));
        assert_eq!(config.ca.subject, "plant-ca");
        assert_eq!(
            config.usages,
            [ExtendedUsage::ServerAuth, ExtendedUsage::ClientAuth]
        );
        assert_eq!(config.device_cert, PathBuf::from("tls/cli.crt"));
        assert_eq!(config.device_key, PathBuf::from("tls/file.key"));
        assert_eq!(config.sans, ["a.local"]);
    }

    #[test]
    fn unknown_usage_in_file_is_an_error() {
        let file: FileConfig =
            serde_json::from_str(r#"{ "ca": { "usages": ["superAuth"] } }"#).unwrap();
        assert!(Config::merge(PathBuf::from("/srv"), file, &Overrides::default()).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<FileConfig>(r#"{ "authority": {} }"#).is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = temp_dir("config-missing").join("fleetcert.json");
        assert_eq!(load_file(&path).unwrap(), FileConfig::default());
    }
}
