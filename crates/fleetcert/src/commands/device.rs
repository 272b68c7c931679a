//! `fleetcert device`: operations on the device certificate store.

use std::path::Path;

use anyhow::{bail, Context};
use fleetcert_common::fs::write_with_mode;
use fleetcert_common::FileMode;
use fleetcert_crypto::{decode_certificate_pem, generate_request, key_matches_certificate, Certificate};
use fleetcert_rotation::{CertificateStore, RotationError};
use serde_json::json;

use super::{data_fs, device_store, identity, print_json, read_input};
use crate::cli::{DeviceSubcommand, IdentityArgs, PairArgs};
use crate::config::Config;
use crate::format;

pub fn run(config: &Config, command: &DeviceSubcommand, json: bool) -> anyhow::Result<()> {
    let store = device_store(config, data_fs(config));
    match command {
        DeviceSubcommand::Status => status(&store, json),
        DeviceSubcommand::Install(pair) => install(&store, pair, json),
        DeviceSubcommand::Stage(pair) => stage(&store, pair, json),
        DeviceSubcommand::Promote => promote(&store, json),
        DeviceSubcommand::Rollback { reason } => {
            store.rollback(reason);
            report_active(&store, "rolled_back", json)
        }
        DeviceSubcommand::Discard => {
            store.cleanup_pending();
            done("discarded", "Pending pair removed.", json);
            Ok(())
        }
        DeviceSubcommand::Recover => {
            let action = store.recover()?;
            if json {
                print_json(&json!({ "action": action.as_str() }));
            } else {
                format::recovery(action);
            }
            Ok(())
        }
        DeviceSubcommand::Delete => {
            if store.delete() {
                done("deleted", "Active pair removed.", json);
            } else {
                done("absent", "No active pair to remove.", json);
            }
            Ok(())
        }
        DeviceSubcommand::Request {
            identity: id,
            csr_out,
            key_out,
        } => request(config, id, csr_out, key_out, json),
    }
}

fn status(store: &CertificateStore, json: bool) -> anyhow::Result<()> {
    let state = store.state()?;
    let active = optional(store.load_active())?;
    let pending = optional(store.load_pending())?;

    if json {
        print_json(&json!({
            "state": state.as_str(),
            "needs_recovery": state.needs_recovery(),
            "active": active.as_ref().map(format::certificate_json),
            "pending": pending.as_ref().map(format::certificate_json),
        }));
        return Ok(());
    }

    format::slot_state(state);
    match &active {
        Some(cert) => format::certificate("Active certificate", cert),
        None => println!("No active certificate."),
    }
    if let Some(cert) = &pending {
        format::certificate("Pending certificate", cert);
    }
    Ok(())
}

fn install(store: &CertificateStore, pair: &PairArgs, json: bool) -> anyhow::Result<()> {
    let (cert, key) = read_pair(pair)?;
    store.write(&cert, &key)?;
    report(&cert, "installed", "Installed certificate", json);
    Ok(())
}

fn stage(store: &CertificateStore, pair: &PairArgs, json: bool) -> anyhow::Result<()> {
    let (cert, key) = read_pair(pair)?;
    store.write_pending(&cert, &key)?;
    report(&cert, "staged", "Staged certificate", json);
    Ok(())
}

fn promote(store: &CertificateStore, json: bool) -> anyhow::Result<()> {
    if let Err(e) = store.promote() {
        if matches!(e, RotationError::Swap(_)) {
            // The device may be on either certificate now; say which.
            match store.load_active() {
                Ok(cert) => tracing::warn!(fingerprint = %cert.fingerprint(), "Active certificate after failed promotion"),
                Err(check) => tracing::error!(error = %check, "No usable active certificate after failed promotion"),
            }
        }
        return Err(e.into());
    }
    report_active(store, "promoted", json)
}

fn request(
    config: &Config,
    args: &IdentityArgs,
    csr_out: &Path,
    key_out: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let (cn, sans) = identity(config, args)?;
    let generated = generate_request(&cn, &sans)?;

    for path in [csr_out, key_out] {
        if let Some(parent) = fleetcert_common::fs::parent_dir(path) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    write_with_mode(key_out, generated.key_pem.as_bytes(), FileMode::Private)
        .with_context(|| format!("writing {}", key_out.display()))?;
    write_with_mode(csr_out, generated.csr_pem.as_bytes(), FileMode::Public)
        .with_context(|| format!("writing {}", csr_out.display()))?;
    tracing::info!(cn = %cn, csr = %csr_out.display(), "Certificate request generated");

    if json {
        print_json(&json!({
            "common_name": cn,
            "sans": sans,
            "csr": csr_out.display().to_string(),
            "key": key_out.display().to_string(),
        }));
    } else {
        println!("Request for {cn} written to {}", csr_out.display());
        println!("  Private key: {}", key_out.display());
    }
    Ok(())
}

/// Read a certificate/key pair from host files.
///
/// A key that is readable PEM but does not match the certificate is
/// refused. Keys in other encodings are stored as given.
fn read_pair(pair: &PairArgs) -> anyhow::Result<(Certificate, Vec<u8>)> {
    let cert = decode_certificate_pem(&read_input(&pair.cert)?)
        .with_context(|| format!("parsing {}", pair.cert.display()))?;
    let key = read_input(&pair.key)?;

    match key_matches_certificate(&cert, &key) {
        Ok(true) => {}
        Ok(false) => bail!(
            "{} does not match the public key of {}",
            pair.key.display(),
            pair.cert.display()
        ),
        Err(e) => tracing::warn!(error = %e, "Could not check key against certificate; storing as given"),
    }
    Ok((cert, key))
}

/// `Ok(None)` when the slot is empty; other failures propagate.
fn optional(result: Result<Certificate, RotationError>) -> anyhow::Result<Option<Certificate>> {
    match result {
        Ok(cert) => Ok(Some(cert)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn report_active(store: &CertificateStore, status: &str, json: bool) -> anyhow::Result<()> {
    let active = optional(store.load_active())?;
    if json {
        print_json(&json!({
            "status": status,
            "active": active.as_ref().map(format::certificate_json),
        }));
    } else {
        match &active {
            Some(cert) => format::certificate("Active certificate", cert),
            None => println!("No active certificate."),
        }
    }
    Ok(())
}

fn report(cert: &Certificate, status: &str, heading: &str, json: bool) {
    if json {
        print_json(&json!({
            "status": status,
            "certificate": format::certificate_json(cert),
        }));
    } else {
        format::certificate(heading, cert);
    }
}

fn done(status: &str, message: &str, json: bool) {
    if json {
        print_json(&json!({ "status": status }));
    } else {
        println!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, Overrides};
    use fleetcert_common::test::temp_dir;
    use fleetcert_rotation::SlotState;

    fn config(prefix: &str) -> Config {
        let dir = temp_dir(prefix);
        std::fs::create_dir_all(&dir).unwrap();
        let mut config = Config::merge(dir, FileConfig::default(), &Overrides::default()).unwrap();
        config.common_name = Some("stone-07".into());
        config
    }

    /// Self-signed pair written to host files under the data dir.
    fn pair_files(config: &Config, name: &str) -> PairArgs {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec![format!("{name}.local")])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let pair = PairArgs {
            cert: config.data_dir.join(format!("{name}.crt")),
            key: config.data_dir.join(format!("{name}.key")),
        };
        std::fs::write(&pair.cert, cert.pem()).unwrap();
        std::fs::write(&pair.key, key.serialize_pem()).unwrap();
        pair
    }

    #[test]
    fn install_stage_promote() {
        let config = config("cmd-device-promote");
        let store = device_store(&config, data_fs(&config));

        install(&store, &pair_files(&config, "old"), true).unwrap();
        let staged = pair_files(&config, "new");
        stage(&store, &staged, true).unwrap();
        assert_eq!(store.state().unwrap(), SlotState::ActiveAndPending);

        promote(&store, true).unwrap();
        let expected = decode_certificate_pem(&std::fs::read(&staged.cert).unwrap()).unwrap();
        assert_eq!(store.load_active().unwrap(), expected);
        assert_eq!(store.state().unwrap(), SlotState::ActiveOnly);
    }

    #[test]
    fn mismatched_key_is_refused() {
        let config = config("cmd-device-mismatch");
        let store = device_store(&config, data_fs(&config));
        let first = pair_files(&config, "first");
        let second = pair_files(&config, "second");
        let crossed = PairArgs {
            cert: first.cert,
            key: second.key,
        };

        let err = stage(&store, &crossed, true).unwrap_err();
        assert!(err.to_string().contains("does not match"), "{err}");
        assert!(!store.has_pending().unwrap());
    }

    #[test]
    fn promote_without_pending_is_typed() {
        let config = config("cmd-device-nopending");
        let store = device_store(&config, data_fs(&config));
        let err = promote(&store, true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RotationError>(),
            Some(RotationError::NoPending)
        ));
    }

    #[test]
    fn status_on_empty_store() {
        let config = config("cmd-device-status");
        let store = device_store(&config, data_fs(&config));
        status(&store, true).unwrap();
        status(&store, false).unwrap();
    }

    #[test]
    fn request_writes_private_key() {
        let config = config("cmd-device-request");
        let csr = config.data_dir.join("req/device.csr");
        let key = config.data_dir.join("req/device.key");
        request(&config, &IdentityArgs::default(), &csr, &key, true).unwrap();

        let pem = std::fs::read_to_string(&csr).unwrap();
        assert!(pem.contains("CERTIFICATE REQUEST"));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&key).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
