//! Human-readable and JSON renderings of command results.

use fleetcert_crypto::Certificate;
use fleetcert_rotation::{RecoveryAction, SlotState};
use serde_json::{json, Value};

/// JSON summary of a certificate.
pub fn certificate_json(cert: &Certificate) -> Value {
    json!({
        "subject": cert.subject(),
        "issuer": cert.issuer(),
        "serial": cert.serial_hex(),
        "not_before": cert.not_before().to_rfc3339(),
        "not_after": cert.not_after().to_rfc3339(),
        "fingerprint": cert.fingerprint(),
        "dns_names": cert.dns_names(),
        "ip_addresses": cert.ip_addresses(),
        "is_ca": cert.is_ca(),
    })
}

/// Print a certificate summary, indented under a heading.
pub fn certificate(heading: &str, cert: &Certificate) {
    println!("{heading}");
    println!("  Subject:     {}", cert.subject());
    println!("  Issuer:      {}", cert.issuer());
    println!("  Serial:      {}", cert.serial_hex());
    println!(
        "  Valid:       {} .. {}",
        cert.not_before().format("%Y-%m-%d %H:%M:%S"),
        cert.not_after().format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Fingerprint: {}", cert.fingerprint());
    let sans: Vec<String> = cert
        .dns_names()
        .iter()
        .cloned()
        .chain(cert.ip_addresses().iter().map(|ip| ip.to_string()))
        .collect();
    if !sans.is_empty() {
        println!("  SANs:        {}", sans.join(", "));
    }
}

pub fn slot_state(state: SlotState) {
    println!("Slot state: {}", state.as_str());
    if state.needs_recovery() {
        println!("  An interrupted promotion left files behind; run `fleetcert device recover`.");
    }
}

pub fn recovery(action: RecoveryAction) {
    let message = match action {
        RecoveryAction::Nothing => "Nothing to recover.",
        RecoveryAction::DiscardedBackup => "Promotion had completed; stale backup removed.",
        RecoveryAction::RestoredBackup => "Promotion had not completed; previous pair restored.",
        RecoveryAction::RemovedOrphanPending => "Removed a pending key with no certificate.",
        RecoveryAction::CompletedKeyRename => "Promotion had stopped before the key rename; pending key moved into place.",
    };
    println!("{message}");
}

pub fn ca_created(cert: &Certificate, created: bool) {
    if created {
        println!("Certificate authority created.");
    } else {
        println!("Certificate authority already exists.");
    }
    println!("  Subject:        {}", cert.subject());
    println!("  CA fingerprint: {}", cert.fingerprint());
    println!("  Expires:        {}", cert.not_after().format("%Y-%m-%d"));
}
