//! End-to-end issuance against a bootstrapped authority.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use fleetcert_ca::{custom_extension, CaConfig, CaState, ExtendedUsage, TemplateOption};
use fleetcert_common::test::temp_dir;
use fleetcert_common::{FileAccess, RootedFs};
use fleetcert_crypto::generate_request;
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::*;

fn authority(prefix: &str, config: &CaConfig) -> CaState {
    let fs: Arc<dyn FileAccess> = Arc::new(RootedFs::new(temp_dir(prefix)));
    let (ca, created) = CaState::load_or_bootstrap(fs, config).unwrap();
    assert!(created);
    ca
}

fn csr(cn: &str) -> String {
    generate_request(cn, &[format!("{cn}.fleet.internal")])
        .unwrap()
        .csr_pem
}

#[test]
fn random_serial_ca_issues_verifiable_client_certificates() {
    let mut config = CaConfig::new("ca.crt", "ca.key", "test-ca");
    config.validity_days = 3650;
    let mut ca = authority("issuance-random", &config);

    let first = ca
        .issue(&csr("device-a"), Duration::days(7), &[ExtendedUsage::ClientAuth], &[])
        .unwrap();
    let second = ca
        .issue(&csr("device-b"), Duration::days(7), &[ExtendedUsage::ClientAuth], &[])
        .unwrap();

    let bundle = ca.ca_bundle();
    assert_eq!(bundle.len(), 1);
    assert_eq!(bundle[0].common_name(), Some("test-ca"));

    for leaf in [&first, &second] {
        leaf.verify_signed_by(&bundle[0]).unwrap();
        let skew = (leaf.validity() - Duration::days(7)).num_seconds().abs();
        assert!(skew <= 1, "validity off by {skew}s");
    }
    assert_ne!(first.serial(), second.serial());

    let ca_span = bundle[0].validity() - Duration::days(3650);
    assert!(ca_span.num_seconds().abs() <= 1);
}

#[test]
fn file_serials_start_at_zero_and_increase() {
    let mut config = CaConfig::new("ca/ca.crt", "ca/ca.key", "serial-ca");
    config.serial_path = Some(PathBuf::from("ca/serial"));
    let mut ca = authority("issuance-file", &config);

    let serials: Vec<u128> = (0..3)
        .map(|i| {
            let leaf = ca
                .issue(&csr(&format!("device-{i}")), Duration::hours(1), &[], &[])
                .unwrap();
            u128::from_str_radix(&leaf.serial_hex(), 16).unwrap()
        })
        .collect();

    assert_eq!(serials, [0, 1, 2]);
}

#[test]
fn reloaded_authority_continues_serials_and_chain() {
    let root = temp_dir("issuance-reload");
    let mut config = CaConfig::new("ca/ca.crt", "ca/ca.key", "reload-ca");
    config.serial_path = Some(PathBuf::from("ca/serial"));

    let fs: Arc<dyn FileAccess> = Arc::new(RootedFs::new(&root));
    let (mut first, _) = CaState::load_or_bootstrap(fs.clone(), &config).unwrap();
    let before = first
        .issue(&csr("device-1"), Duration::days(1), &[], &[])
        .unwrap();
    let anchor = first.certificate().clone();
    drop(first);

    let (mut second, created) = CaState::load_or_bootstrap(fs, &config).unwrap();
    assert!(!created);
    let after = second
        .issue(&csr("device-2"), Duration::days(1), &[], &[])
        .unwrap();

    assert_eq!(before.serial_hex(), "00");
    assert_eq!(after.serial_hex(), "01");
    after.verify_signed_by(&anchor).unwrap();
    assert_eq!(after.authority_key_id(), before.authority_key_id());
}

#[test]
fn issued_certificate_extensions() {
    let config = CaConfig::new("ca.crt", "ca.key", "ext-ca");
    let mut ca = authority("issuance-ext", &config);

    let marker = custom_extension(&[1, 3, 6, 1, 4, 1, 55555, 7], vec![0x0c, 0x02, b'o', b'k']);
    let options: [&dyn TemplateOption; 1] = [&marker];
    let leaf = ca
        .issue(
            &csr("device-x"),
            Duration::days(2),
            &[ExtendedUsage::ServerAuth, ExtendedUsage::ClientAuth],
            &options,
        )
        .unwrap();

    let (_, parsed) = parse_x509_certificate(leaf.der()).unwrap();
    assert!(!parsed.is_ca());

    let key_usage = parsed.key_usage().unwrap().unwrap().value;
    assert!(key_usage.digital_signature());
    assert!(key_usage.key_encipherment());
    assert!(!key_usage.key_cert_sign());

    let eku = parsed.extended_key_usage().unwrap().unwrap().value;
    assert!(eku.server_auth);
    assert!(eku.client_auth);
    assert!(!eku.code_signing);

    let has_aki = parsed
        .extensions()
        .iter()
        .any(|ext| matches!(ext.parsed_extension(), ParsedExtension::AuthorityKeyIdentifier(_)));
    assert!(has_aki);

    let marker_oid = "1.3.6.1.4.1.55555.7";
    assert!(parsed
        .extensions()
        .iter()
        .any(|ext| ext.oid.to_id_string() == marker_oid));

    let ca_cert = ca.certificate();
    let (_, parsed_ca) = parse_x509_certificate(ca_cert.der()).unwrap();
    assert!(parsed_ca.is_ca());
    let ca_usage = parsed_ca.key_usage().unwrap().unwrap().value;
    assert!(ca_usage.key_cert_sign());
    assert!(ca_usage.digital_signature());
    assert!(ca_usage.key_encipherment());
    assert_eq!(parsed.issuer(), parsed_ca.subject());
}
