//! Certificate Authority load-or-bootstrap and leaf issuance.
//!
//! The CA is a self-signed P-256 root created with `rcgen` on first start
//! and loaded from its PEM files afterwards. Leaves are signed from device
//! CSRs; the authority copies the requested subject, key, and SANs
//! verbatim and applies no naming policy of its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fleetcert_common::fs::parent_dir;
use fleetcert_common::{FileAccess, FileMode};
use fleetcert_crypto::{decode_certificate_pem, key_matches_certificate, Certificate};
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use zeroize::Zeroizing;

use crate::audit;
use crate::error::CaError;
use crate::options::{ExtendedUsage, TemplateOption};
use crate::serial::{FileSerialGenerator, RandomSerialGenerator, SerialGenerator};

/// Default CA lifetime.
pub const DEFAULT_CA_VALIDITY_DAYS: u32 = 3650;

/// Backdating applied to every `not_before` to absorb clock skew.
fn clock_skew() -> Duration {
    Duration::seconds(1)
}

/// Where the CA lives and what to create if it does not exist yet.
///
/// All paths are rooted paths within the authority's [`FileAccess`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// File-backed serial counter. `None` selects random serials.
    pub serial_path: Option<PathBuf>,
    /// Common name of a newly created CA.
    pub subject: String,
    pub validity_days: u32,
    pub audit_log: Option<PathBuf>,
}

impl CaConfig {
    pub fn new(
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            serial_path: None,
            subject: subject.into(),
            validity_days: DEFAULT_CA_VALIDITY_DAYS,
            audit_log: None,
        }
    }
}

/// A loaded CA, ready to sign.
///
/// Issuance takes `&mut self`: the serial generator is owned state, so
/// concurrent issuers must share the authority behind a lock.
pub struct CaState {
    fs: Arc<dyn FileAccess>,
    key: KeyPair,
    /// Issuer handle for `rcgen`; carries the CA name and key identifier.
    issuer: rcgen::Certificate,
    /// The CA certificate as persisted.
    certificate: Certificate,
    serials: Box<dyn SerialGenerator>,
    audit_log: Option<PathBuf>,
}

impl CaState {
    /// Load the CA if its files exist, otherwise create and persist one.
    ///
    /// Returns `true` alongside the state when a new CA was created.
    pub fn load_or_bootstrap(
        fs: Arc<dyn FileAccess>,
        config: &CaConfig,
    ) -> Result<(Self, bool), CaError> {
        if material_present(&*fs, config)? {
            Ok((Self::load_existing(fs, config)?, false))
        } else {
            Ok((Self::bootstrap(fs, config)?, true))
        }
    }

    /// Load an existing CA; never creates one.
    pub fn load(fs: Arc<dyn FileAccess>, config: &CaConfig) -> Result<Self, CaError> {
        if !material_present(&*fs, config)? {
            return Err(CaError::NotInitialized);
        }
        Self::load_existing(fs, config)
    }

    fn bootstrap(fs: Arc<dyn FileAccess>, config: &CaConfig) -> Result<Self, CaError> {
        if config.subject.trim().is_empty() {
            return Err(CaError::Config("CA subject must not be empty".to_string()));
        }
        if config.validity_days == 0 {
            return Err(CaError::Config("CA validity must be at least one day".to_string()));
        }

        let key = KeyPair::generate().map_err(certificate_error)?;

        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, config.subject.as_str());
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.use_authority_key_identifier_extension = true;

        let now = Utc::now();
        params.not_before = to_offset(now - clock_skew())?;
        params.not_after = to_offset(now + Duration::days(i64::from(config.validity_days)))?;
        params.serial_number = Some(SerialNumber::from(
            RandomSerialGenerator.next()?.into_bytes(),
        ));

        let issuer = params.self_signed(&key).map_err(certificate_error)?;
        let certificate = Certificate::from_der(issuer.der())?;

        // The CA itself used a random serial; leaves start from zero.
        let serials = serial_generator(&fs, config, true)?;

        persist_material(&*fs, config, &certificate, &key)?;

        tracing::info!(
            subject = %certificate.subject(),
            fingerprint = %certificate.fingerprint(),
            serials = serials.kind(),
            "CA created"
        );

        let state = Self {
            fs,
            key,
            issuer,
            certificate,
            serials,
            audit_log: config.audit_log.clone(),
        };
        let fingerprint = state.ca_fingerprint();
        state.audit(
            audit::CA_CREATED,
            &[
                ("subject", state.certificate.subject()),
                ("fingerprint", fingerprint.as_str()),
            ],
        );
        Ok(state)
    }

    fn load_existing(fs: Arc<dyn FileAccess>, config: &CaConfig) -> Result<Self, CaError> {
        let certificate = decode_certificate_pem(&fs.read(&config.cert_path)?)?;
        if !certificate.is_ca() {
            return Err(CaError::Config(format!(
                "{} is not a CA certificate",
                config.cert_path.display()
            )));
        }

        let key_pem = Zeroizing::new(fs.read(&config.key_path)?);
        if !key_matches_certificate(&certificate, &key_pem)? {
            return Err(CaError::Config(format!(
                "CA key {} does not match CA certificate {}",
                config.key_path.display(),
                config.cert_path.display()
            )));
        }
        let key_str = std::str::from_utf8(&key_pem)
            .map_err(|e| CaError::Config(format!("CA key is not PEM text: {e}")))?;
        let key = KeyPair::from_pem(key_str).map_err(certificate_error)?;

        // rcgen signs against a Certificate value; rebuild one from the
        // persisted CA so issuer name and key identifier carry over.
        let issuer = CertificateParams::from_ca_cert_pem(&certificate.to_pem())
            .and_then(|params| params.self_signed(&key))
            .map_err(certificate_error)?;

        let serials = serial_generator(&fs, config, false)?;

        tracing::info!(
            subject = %certificate.subject(),
            fingerprint = %certificate.fingerprint(),
            serials = serials.kind(),
            "CA loaded"
        );

        let state = Self {
            fs,
            key,
            issuer,
            certificate,
            serials,
            audit_log: config.audit_log.clone(),
        };
        let fingerprint = state.ca_fingerprint();
        state.audit(audit::CA_LOADED, &[("fingerprint", fingerprint.as_str())]);
        Ok(state)
    }

    /// Sign a leaf certificate for `csr_pem`.
    ///
    /// The leaf is valid from one second ago for `validity`, carries the
    /// key-encipherment and digital-signature usages plus `usages`, and is
    /// marked as not a CA. `options` run in order after those fields are
    /// set; a failing option aborts before a serial is consumed.
    pub fn issue(
        &mut self,
        csr_pem: &str,
        validity: Duration,
        usages: &[ExtendedUsage],
        options: &[&dyn TemplateOption],
    ) -> Result<Certificate, CaError> {
        if validity <= Duration::zero() {
            return Err(CaError::Certificate(
                "certificate validity must be positive".to_string(),
            ));
        }

        let mut csr = CertificateSigningRequestParams::from_pem(csr_pem)
            .map_err(|e| CaError::Csr(e.to_string()))?;

        let now = Utc::now();
        let not_after = now
            .checked_add_signed(validity)
            .ok_or_else(|| CaError::Certificate("validity overflows".to_string()))?;

        let params = &mut csr.params;
        params.not_before = to_offset(now - clock_skew())?;
        params.not_after = to_offset(not_after)?;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.extended_key_usages = usages.iter().map(|u| u.purpose()).collect();
        params.use_authority_key_identifier_extension = true;

        for option in options {
            option.apply(params)?;
        }

        let serial = self.serials.next()?;
        params.serial_number = Some(SerialNumber::from(serial.as_bytes().to_vec()));

        let signed = csr
            .signed_by(&self.issuer, &self.key)
            .map_err(certificate_error)?;
        let certificate = Certificate::from_der(signed.der())?;

        tracing::info!(
            subject = %certificate.subject(),
            serial = %serial,
            not_after = %certificate.not_after(),
            "Certificate issued"
        );
        let serial_hex = serial.to_string();
        let fingerprint = certificate.fingerprint();
        self.audit(
            audit::CERTIFICATE_ISSUED,
            &[
                ("serial", serial_hex.as_str()),
                ("subject", certificate.subject()),
                ("fingerprint", fingerprint.as_str()),
            ],
        );

        Ok(certificate)
    }

    /// The CA certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Trust anchors for issued certificates. A single root today.
    pub fn ca_bundle(&self) -> Vec<Certificate> {
        vec![self.certificate.clone()]
    }

    pub fn ca_fingerprint(&self) -> String {
        self.certificate.fingerprint()
    }

    fn audit(&self, event: &str, fields: &[(&str, &str)]) {
        let Some(path) = &self.audit_log else {
            return;
        };
        if let Err(e) = audit::append_entry(&*self.fs, path, event, fields) {
            tracing::warn!(error = %e, event, "Failed to write audit entry");
        }
    }
}

fn material_present(fs: &dyn FileAccess, config: &CaConfig) -> Result<bool, CaError> {
    let cert = fs.exists(&config.cert_path)?;
    let key = fs.exists(&config.key_path)?;
    match (cert, key) {
        (true, true) => Ok(true),
        (false, false) => Ok(false),
        (true, false) => Err(partial(&config.cert_path, &config.key_path)),
        (false, true) => Err(partial(&config.key_path, &config.cert_path)),
    }
}

fn partial(present: &Path, missing: &Path) -> CaError {
    CaError::PartialMaterial {
        present: present.display().to_string(),
        missing: missing.display().to_string(),
    }
}

fn serial_generator(
    fs: &Arc<dyn FileAccess>,
    config: &CaConfig,
    fresh: bool,
) -> Result<Box<dyn SerialGenerator>, CaError> {
    match &config.serial_path {
        Some(path) => {
            let generator = FileSerialGenerator::new(Arc::clone(fs), path.clone());
            if fresh {
                generator.reset()?;
            } else {
                // An existing CA must pick up where its counter left off.
                generator.peek()?;
            }
            Ok(Box::new(generator))
        }
        None => Ok(Box::new(RandomSerialGenerator)),
    }
}

/// Write the CA certificate then key; remove both if the key cannot be
/// written so the pair never exists half-way.
fn persist_material(
    fs: &dyn FileAccess,
    config: &CaConfig,
    certificate: &Certificate,
    key: &KeyPair,
) -> Result<(), CaError> {
    for path in [&config.cert_path, &config.key_path] {
        fs.create_dir_all(parent_dir(path).unwrap_or_else(|| Path::new("")))?;
    }

    fs.write(
        &config.cert_path,
        certificate.to_pem().as_bytes(),
        FileMode::Public,
    )?;

    let key_pem = Zeroizing::new(key.serialize_pem());
    if let Err(e) = fs.write(&config.key_path, key_pem.as_bytes(), FileMode::Private) {
        for path in [&config.cert_path, &config.key_path] {
            match fs.remove(path) {
                Ok(()) => {}
                Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => {}
                Err(cleanup) => tracing::warn!(
                    error = %cleanup,
                    path = %path.display(),
                    "Failed to remove CA material after key write failure"
                ),
            }
        }
        return Err(e.into());
    }
    Ok(())
}

fn to_offset(at: DateTime<Utc>) -> Result<time::OffsetDateTime, CaError> {
    time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| CaError::Certificate(format!("timestamp out of range: {e}")))
}

fn certificate_error(e: rcgen::Error) -> CaError {
    CaError::Certificate(e.to_string())
}
