//! `fleetcert ca`: authority bootstrap, CSR signing, and the trust bundle.

use std::path::Path;

use anyhow::Context;
use fleetcert_ca::CaState;
use fleetcert_crypto::encode_certificates_pem;
use serde_json::json;

use super::{data_fs, leaf_settings, print_json, read_input, write_output};
use crate::cli::{CaSubcommand, LeafArgs};
use crate::config::Config;
use crate::format;

pub fn run(config: &Config, command: &CaSubcommand, json: bool) -> anyhow::Result<()> {
    match command {
        CaSubcommand::Init {
            subject,
            validity_days,
        } => init(config, subject.as_deref(), *validity_days, json),
        CaSubcommand::Issue { csr, out, leaf } => issue(config, csr, out.as_deref(), leaf, json),
        CaSubcommand::Bundle { out } => bundle(config, out.as_deref(), json),
    }
}

fn init(
    config: &Config,
    subject: Option<&str>,
    validity_days: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let mut ca_config = config.ca.clone();
    if let Some(subject) = subject {
        ca_config.subject = subject.to_string();
    }
    if let Some(days) = validity_days {
        ca_config.validity_days = days;
    }

    let (ca, created) = CaState::load_or_bootstrap(data_fs(config), &ca_config)?;
    if json {
        print_json(&json!({
            "created": created,
            "certificate": format::certificate_json(ca.certificate()),
        }));
    } else {
        format::ca_created(ca.certificate(), created);
    }
    Ok(())
}

fn issue(
    config: &Config,
    csr_path: &Path,
    out: Option<&Path>,
    leaf: &LeafArgs,
    json: bool,
) -> anyhow::Result<()> {
    let csr = String::from_utf8(read_input(csr_path)?)
        .with_context(|| format!("{} is not PEM text", csr_path.display()))?;
    let (validity, usages) = leaf_settings(config, leaf)?;

    let mut ca = CaState::load(data_fs(config), &config.ca)?;
    let cert = ca
        .issue(&csr, validity, &usages, &[])
        .with_context(|| format!("signing {}", csr_path.display()))?;
    let pem = cert.to_pem();

    if json {
        let mut value = json!({ "certificate": format::certificate_json(&cert) });
        match out {
            Some(path) => {
                write_output(Some(path), &pem)?;
                value["path"] = json!(path.display().to_string());
            }
            None => value["pem"] = json!(pem),
        }
        print_json(&value);
    } else {
        write_output(out, &pem)?;
        if let Some(path) = out {
            format::certificate(&format!("Issued {}", path.display()), &cert);
        }
    }
    Ok(())
}

fn bundle(config: &Config, out: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let ca = CaState::load(data_fs(config), &config.ca)?;
    let anchors = ca.ca_bundle();
    let pem = encode_certificates_pem(&anchors);

    if json {
        print_json(&json!({
            "fingerprint": ca.ca_fingerprint(),
            "count": anchors.len(),
            "pem": pem,
        }));
        if let Some(path) = out {
            write_output(Some(path), &pem)?;
        }
    } else {
        write_output(out, &pem)?;
    }
    Ok(())
}
