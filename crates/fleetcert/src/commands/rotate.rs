//! `fleetcert rotate`: one complete rotation against the local CA.
//!
//! The sequence is recover, request, issue, stage, verify, promote. A staged
//! pair that fails verification is rolled back and never promoted; the
//! active pair is untouched until the promote step.

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Duration;
use fleetcert_ca::{CaState, ExtendedUsage};
use fleetcert_common::FileAccess;
use fleetcert_crypto::{generate_request, key_matches_certificate, Certificate};
use fleetcert_rotation::{CertificateStore, RecoveryAction};
use serde_json::json;

use super::{data_fs, device_store, identity, leaf_settings, print_json};
use crate::cli::RotateArgs;
use crate::config::Config;
use crate::format;

/// What a rotation did, for reporting.
#[derive(Debug)]
pub struct Rotation {
    pub recovered: RecoveryAction,
    pub previous: Option<Certificate>,
    pub active: Certificate,
}

pub fn run(config: &Config, args: &RotateArgs, json: bool) -> anyhow::Result<()> {
    let (cn, sans) = identity(config, &args.identity)?;
    let (validity, usages) = leaf_settings(config, &args.leaf)?;

    let fs = data_fs(config);
    let mut ca = CaState::load(fs.clone(), &config.ca).context("loading CA")?;
    let rotation = rotate(config, fs, &mut ca, &cn, &sans, validity, &usages)?;

    if json {
        print_json(&json!({
            "status": "rotated",
            "recovered": rotation.recovered.as_str(),
            "previous_serial": rotation.previous.as_ref().map(Certificate::serial_hex),
            "active": format::certificate_json(&rotation.active),
        }));
    } else {
        if rotation.recovered != RecoveryAction::Nothing {
            format::recovery(rotation.recovered);
        }
        format::certificate("Rotated to", &rotation.active);
    }
    Ok(())
}

pub fn rotate(
    config: &Config,
    fs: Arc<dyn FileAccess>,
    ca: &mut CaState,
    cn: &str,
    sans: &[String],
    validity: Duration,
    usages: &[ExtendedUsage],
) -> anyhow::Result<Rotation> {
    let store = device_store(config, fs);

    // A crash during an earlier promotion must be settled before staging.
    let recovered = store.recover().context("recovering certificate store")?;
    if recovered != RecoveryAction::Nothing {
        tracing::info!(action = recovered.as_str(), "Recovered certificate store");
    }
    if store.has_pending()? {
        tracing::warn!("Discarding previously staged certificate");
        store.cleanup_pending();
    }

    let previous = match store.load_active() {
        Ok(cert) => Some(cert),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e).context("loading active certificate"),
    };

    let request = generate_request(cn, sans)?;
    let issued = ca
        .issue(&request.csr_pem, validity, usages, &[])
        .context("issuing certificate")?;
    store.write_pending(&issued, request.key_pem.as_bytes())?;

    if let Err(e) = verify_pending(&store, ca) {
        store.rollback("staged certificate failed verification");
        return Err(e.context("staged certificate rejected"));
    }

    if let Err(e) = store.promote() {
        match store.load_active() {
            Ok(cert) => tracing::warn!(
                fingerprint = %cert.fingerprint(),
                "Active certificate after failed promotion"
            ),
            Err(check) => tracing::error!(
                error = %check,
                "No usable active certificate after failed promotion"
            ),
        }
        return Err(anyhow::Error::from(e).context("promoting certificate"));
    }

    let active = store.load_active()?;
    tracing::info!(
        cn,
        serial = %active.serial_hex(),
        not_after = %active.not_after(),
        "Rotation complete"
    );
    Ok(Rotation {
        recovered,
        previous,
        active,
    })
}

/// Re-read the staged pair from disk and check it before promotion.
fn verify_pending(store: &CertificateStore, ca: &CaState) -> anyhow::Result<()> {
    let cert = store.load_pending()?;
    let key = store.load_pending_key()?;
    if !key_matches_certificate(&cert, &key)? {
        bail!("pending key does not match pending certificate");
    }

    let anchors = ca.ca_bundle();
    let chained = anchors
        .iter()
        .any(|anchor| cert.verify_signed_by(anchor).is_ok());
    if !chained {
        bail!("pending certificate does not chain to the CA bundle");
    }
    Ok(())
}
