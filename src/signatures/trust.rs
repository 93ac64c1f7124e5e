//! Trust anchors, validation context and certification path validation.

use super::crypto;
use super::fetch::{Fetcher, NoFetch};
use super::status::{unix_to_utc, CertificateSummary, RevocationSummary};
use super::types::DigestAlgorithm;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use const_oid::{AssociatedOid, ObjectIdentifier};
use der::{Decode, DecodeOwned, Encode};
use std::path::Path;
use std::sync::Arc;
use x509_cert::crl::CertificateList;
use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
use x509_cert::ext::pkix::{
    AuthorityInfoAccessSyntax, BasicConstraints, CrlDistributionPoints, KeyUsage,
};
use x509_cert::Certificate;

/// Longest certification path considered, anchor included.
pub const MAX_PATH_LENGTH: usize = 10;

const ID_AD_CA_ISSUERS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.2");

/// Decode the extension of type `T`, if the certificate carries one.
pub(crate) fn extension<T: DecodeOwned + AssociatedOid>(cert: &Certificate) -> Result<Option<T>> {
    let Some(extensions) = &cert.tbs_certificate.extensions else {
        return Ok(None);
    };
    match extensions.iter().find(|ext| ext.extn_id == T::OID) {
        Some(ext) => Ok(Some(T::from_der(ext.extn_value.as_bytes())?)),
        None => Ok(None),
    }
}

/// Parse one or more certificates from PEM or DER bytes.
pub fn parse_certificates(data: &[u8]) -> Result<Vec<Certificate>> {
    if data.starts_with(b"-----BEGIN") || data.windows(11).any(|w| w == b"-----BEGIN ") {
        let certs = Certificate::load_pem_chain(data)
            .map_err(|e| Error::Certificate(format!("invalid PEM certificate: {}", e)))?;
        if certs.is_empty() {
            return Err(Error::Certificate("PEM data holds no certificate".to_string()));
        }
        Ok(certs)
    } else {
        let cert = Certificate::from_der(data)
            .map_err(|e| Error::Certificate(format!("invalid DER certificate: {}", e)))?;
        Ok(vec![cert])
    }
}

/// Set of trusted root certificates.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    anchors: Vec<Certificate>,
}

impl TrustStore {
    /// Empty store: nothing is trusted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding `anchors`.
    pub fn from_certificates(anchors: Vec<Certificate>) -> Self {
        Self { anchors }
    }

    /// Add an anchor, ignoring duplicates.
    pub fn add(&mut self, cert: Certificate) {
        if !self.anchors.contains(&cert) {
            self.anchors.push(cert);
        }
    }

    /// Add every certificate in a PEM or DER blob. Returns how many were read.
    pub fn add_bytes(&mut self, data: &[u8]) -> Result<usize> {
        let certs = parse_certificates(data)?;
        let count = certs.len();
        for cert in certs {
            self.add(cert);
        }
        Ok(count)
    }

    /// Load a certificate file, or every `.pem`, `.crt`, `.cer` and `.der` file
    /// in a directory.
    pub fn load_path(&mut self, path: &Path) -> Result<usize> {
        if path.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "pem" | "crt" | "cer" | "der"))
                        .unwrap_or(false)
                })
                .collect();
            entries.sort();
            let mut total = 0;
            for file in entries {
                total += self.load_file(&file)?;
            }
            Ok(total)
        } else {
            self.load_file(path)
        }
    }

    fn load_file(&mut self, path: &Path) -> Result<usize> {
        let data = std::fs::read(path)?;
        let count = self.add_bytes(&data).map_err(|e| {
            Error::Config(format!("trust root {}: {}", path.display(), e))
        })?;
        log::debug!("loaded {} trust anchor(s) from {}", count, path.display());
        Ok(count)
    }

    /// The anchors.
    pub fn anchors(&self) -> &[Certificate] {
        &self.anchors
    }

    /// Number of anchors.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether no anchor is configured.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

/// What to do when revocation information cannot be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationMode {
    /// Record a warning and carry on
    #[default]
    SoftFail,
    /// Treat the certificate as untrusted
    HardFail,
}

/// Trust and revocation policy for one validation run.
#[derive(Clone)]
pub struct ValidationContext {
    trust: Arc<TrustStore>,
    allow_fetching: bool,
    revocation_mode: RevocationMode,
    validation_time: DateTime<Utc>,
    fetcher: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationContext")
            .field("anchors", &self.trust.len())
            .field("allow_fetching", &self.allow_fetching)
            .field("revocation_mode", &self.revocation_mode)
            .field("validation_time", &self.validation_time)
            .finish()
    }
}

impl ValidationContext {
    /// Context trusting `trust`, fetching through `fetcher`, validating now.
    pub fn new(trust: Arc<TrustStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            trust,
            allow_fetching: true,
            revocation_mode: RevocationMode::default(),
            validation_time: Utc::now(),
            fetcher,
        }
    }

    /// Context that never touches the network.
    pub fn offline(trust: Arc<TrustStore>) -> Self {
        Self::new(trust, Arc::new(NoFetch)).with_allow_fetching(false)
    }

    /// Permit or forbid fetching issuers and CRLs.
    pub fn with_allow_fetching(mut self, allow: bool) -> Self {
        self.allow_fetching = allow;
        self
    }

    /// Set the revocation policy.
    pub fn with_revocation_mode(mut self, mode: RevocationMode) -> Self {
        self.revocation_mode = mode;
        self
    }

    /// Validate as of `time` instead of now.
    pub fn with_validation_time(mut self, time: DateTime<Utc>) -> Self {
        self.validation_time = time;
        self
    }

    /// Trust anchors.
    pub fn trust_store(&self) -> &TrustStore {
        &self.trust
    }

    /// Whether network fetching is allowed.
    pub fn allow_fetching(&self) -> bool {
        self.allow_fetching
    }

    /// Revocation policy.
    pub fn revocation_mode(&self) -> RevocationMode {
        self.revocation_mode
    }

    /// Validation time.
    pub fn validation_time(&self) -> DateTime<Utc> {
        self.validation_time
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if !self.allow_fetching {
            return Err(Error::Fetch {
                url: url.to_string(),
                reason: "network fetching is disabled".to_string(),
            });
        }
        self.fetcher.fetch(url)
    }
}

/// Result of path validation for one signer certificate.
#[derive(Debug, Clone, Default)]
pub struct TrustReport {
    /// `Some(true)` when a valid path to an anchor exists
    pub trust_ok: Option<bool>,
    /// Path, signer first, anchor last (when found)
    pub chain: Vec<CertificateSummary>,
    /// Reasons trust was not established
    pub problems: Vec<String>,
    /// Revocation results
    pub revocation: RevocationSummary,
    /// Non-fatal anomalies
    pub warnings: Vec<String>,
}

fn display_name(cert: &Certificate) -> String {
    CertificateSummary::from_certificate(cert).display_name().to_string()
}

/// Whether `issuer`'s key verifies the signature on `cert`.
fn issued_by(cert: &Certificate, issuer: &Certificate) -> bool {
    if cert.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        return false;
    }
    let Some(signature) = cert.signature.as_bytes() else {
        return false;
    };
    let Ok(tbs) = cert.tbs_certificate.to_der() else {
        return false;
    };
    match crypto::verify_signature(
        &issuer.tbs_certificate.subject_public_key_info,
        &cert.signature_algorithm.oid,
        DigestAlgorithm::Sha256,
        &tbs,
        signature,
    ) {
        Ok(ok) => ok,
        Err(e) => {
            log::debug!("certificate signature not evaluated: {}", e);
            false
        },
    }
}

fn is_ca(cert: &Certificate) -> bool {
    matches!(extension::<BasicConstraints>(cert), Ok(Some(bc)) if bc.ca)
}

fn path_len_constraint(cert: &Certificate) -> Option<u8> {
    extension::<BasicConstraints>(cert)
        .ok()
        .flatten()
        .and_then(|bc| bc.path_len_constraint)
}

fn ca_issuer_urls(cert: &Certificate) -> Vec<String> {
    let Ok(Some(aia)) = extension::<AuthorityInfoAccessSyntax>(cert) else {
        return Vec::new();
    };
    aia.0
        .iter()
        .filter(|desc| desc.access_method == ID_AD_CA_ISSUERS)
        .filter_map(|desc| match &desc.access_location {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
            _ => None,
        })
        .collect()
}

fn crl_urls(cert: &Certificate) -> Vec<String> {
    let Ok(Some(points)) = extension::<CrlDistributionPoints>(cert) else {
        return Vec::new();
    };
    points
        .0
        .iter()
        .filter_map(|point| match &point.distribution_point {
            Some(DistributionPointName::FullName(names)) => Some(names),
            _ => None,
        })
        .flatten()
        .filter_map(|name| match name {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
            _ => None,
        })
        .collect()
}

fn within_validity(cert: &Certificate, at: DateTime<Utc>) -> bool {
    let validity = &cert.tbs_certificate.validity;
    let not_before = unix_to_utc(validity.not_before.to_unix_duration());
    let not_after = unix_to_utc(validity.not_after.to_unix_duration());
    not_before <= at && at <= not_after
}

fn key_usage_problem(signer: &Certificate) -> Option<String> {
    match extension::<KeyUsage>(signer) {
        Ok(Some(usage)) if !(usage.digital_signature() || usage.non_repudiation()) => Some(
            "signer certificate key usage allows neither digitalSignature nor nonRepudiation"
                .to_string(),
        ),
        Ok(_) => None,
        Err(e) => Some(format!("signer certificate key usage is malformed: {}", e)),
    }
}

/// Find an issuer of `cert` among `candidates`, skipping certificates already
/// on the path.
fn find_issuer<'a>(
    cert: &Certificate,
    candidates: &'a [Certificate],
    path: &[Certificate],
) -> Option<&'a Certificate> {
    candidates
        .iter()
        .filter(|candidate| !path.contains(candidate))
        .find(|candidate| issued_by(cert, candidate))
}

enum RevocationState {
    Good,
    Revoked,
    Unavailable(String),
}

/// Check `cert` against the CRLs its distribution points name.
fn check_crls(cert: &Certificate, issuer: &Certificate, ctx: &ValidationContext) -> RevocationState {
    let urls = crl_urls(cert);
    if urls.is_empty() {
        return RevocationState::Unavailable("no CRL distribution point".to_string());
    }

    let mut last_error = String::new();
    for url in urls {
        let data = match ctx.fetch(&url) {
            Ok(data) => data,
            Err(e) => {
                last_error = e.to_string();
                continue;
            },
        };
        match evaluate_crl(&data, cert, issuer, ctx.validation_time()) {
            Ok(revoked) => {
                return if revoked {
                    RevocationState::Revoked
                } else {
                    RevocationState::Good
                };
            },
            Err(e) => last_error = format!("CRL from {}: {}", url, e),
        }
    }
    RevocationState::Unavailable(last_error)
}

/// Verify a DER CRL against `issuer` and look up `cert`'s serial number.
///
/// A CRL that is not yet issued or past its `nextUpdate` at `at` is an
/// error, so the caller treats the status as unavailable.
fn evaluate_crl(data: &[u8], cert: &Certificate, issuer: &Certificate, at: DateTime<Utc>) -> Result<bool> {
    let crl = CertificateList::from_der(data)?;
    let tbs_list = &crl.tbs_cert_list;
    if tbs_list.issuer != issuer.tbs_certificate.subject {
        return Err(Error::Certificate("CRL issuer does not match the certificate issuer".to_string()));
    }
    let this_update = unix_to_utc(tbs_list.this_update.to_unix_duration());
    if this_update > at {
        return Err(Error::Certificate(format!(
            "CRL is not valid before {}",
            this_update.format("%Y-%m-%d %H:%M:%S UTC")
        )));
    }
    if let Some(next_update) = &tbs_list.next_update {
        let next_update = unix_to_utc(next_update.to_unix_duration());
        if next_update < at {
            return Err(Error::Certificate(format!(
                "CRL expired at {}",
                next_update.format("%Y-%m-%d %H:%M:%S UTC")
            )));
        }
    }
    let signature = crl
        .signature
        .as_bytes()
        .ok_or_else(|| Error::Certificate("CRL signature has unused bits".to_string()))?;
    let tbs = crypto::first_element(data)?;
    let verified = crypto::verify_signature(
        &issuer.tbs_certificate.subject_public_key_info,
        &crl.signature_algorithm.oid,
        DigestAlgorithm::Sha256,
        tbs,
        signature,
    )?;
    if !verified {
        return Err(Error::Certificate("CRL signature does not verify".to_string()));
    }

    let serial = &cert.tbs_certificate.serial_number;
    Ok(tbs_list
        .revoked_certificates
        .as_ref()
        .map(|revoked| revoked.iter().any(|entry| &entry.serial_number == serial))
        .unwrap_or(false))
}

/// Build and validate a path from `signer` to one of the context's anchors.
///
/// `pool` holds the certificates embedded alongside the signature. When the
/// context allows fetching, missing issuers are downloaded from the
/// authority information access extension.
pub fn validate_path(signer: &Certificate, pool: &[Certificate], ctx: &ValidationContext) -> TrustReport {
    let mut report = TrustReport::default();
    let anchors = ctx.trust_store().anchors();
    if anchors.is_empty() {
        report.problems.push("no trust anchors are configured".to_string());
        return report;
    }

    let mut problems = Vec::new();
    if let Some(problem) = key_usage_problem(signer) {
        problems.push(problem);
    }

    let mut pool: Vec<Certificate> = pool.to_vec();
    let mut path = vec![signer.clone()];
    let mut anchored = anchors.contains(signer);

    while !anchored {
        if path.len() >= MAX_PATH_LENGTH {
            problems.push(format!("no trust anchor within {} certificates", MAX_PATH_LENGTH));
            break;
        }
        let Some(current) = path.last().cloned() else {
            break;
        };

        if let Some(anchor) = find_issuer(&current, anchors, &path) {
            path.push(anchor.clone());
            anchored = true;
            break;
        }
        if let Some(intermediate) = find_issuer(&current, &pool, &path) {
            path.push(intermediate.clone());
            if anchors.contains(intermediate) {
                anchored = true;
            }
            continue;
        }

        let mut fetched_any = false;
        if ctx.allow_fetching() {
            for url in ca_issuer_urls(&current) {
                match ctx.fetch(&url).and_then(|data| parse_certificates(&data)) {
                    Ok(certs) => {
                        log::debug!("fetched {} issuer certificate(s) from {}", certs.len(), url);
                        for cert in certs {
                            if !pool.contains(&cert) {
                                pool.push(cert);
                                fetched_any = true;
                            }
                        }
                    },
                    Err(e) => report.warnings.push(format!("issuer retrieval failed: {}", e)),
                }
            }
        }
        if !fetched_any {
            problems.push(format!(
                "no issuer found for \"{}\"",
                current.tbs_certificate.issuer
            ));
            break;
        }
    }

    report.chain = path.iter().map(CertificateSummary::from_certificate).collect();
    if !anchored {
        report.trust_ok = Some(false);
        report.problems = problems;
        return report;
    }

    // Everything below the anchor: validity, CA flag and path length.
    let at = ctx.validation_time();
    let anchor_index = path.len() - 1;
    for (index, cert) in path.iter().enumerate().take(anchor_index) {
        if !within_validity(cert, at) {
            problems.push(format!(
                "\"{}\" is not valid at {}",
                display_name(cert),
                at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        if index > 0 {
            if !is_ca(cert) {
                problems.push(format!("\"{}\" is not a CA certificate", display_name(cert)));
            }
            if let Some(limit) = path_len_constraint(cert) {
                if index - 1 > limit as usize {
                    problems.push(format!("path length constraint of \"{}\" exceeded", display_name(cert)));
                }
            }
        }
    }
    if anchor_index > 0 {
        if let Some(limit) = path_len_constraint(&path[anchor_index]) {
            if anchor_index - 1 > limit as usize {
                problems.push("path length constraint of the trust anchor exceeded".to_string());
            }
        }
    }

    // Revocation of every certificate below the anchor.
    if ctx.allow_fetching() {
        report.revocation.checked = true;
        for pair in path[..=anchor_index].windows(2) {
            let (cert, issuer) = (&pair[0], &pair[1]);
            let name = display_name(cert);
            match check_crls(cert, issuer, ctx) {
                RevocationState::Good => report.revocation.good.push(name),
                RevocationState::Revoked => {
                    problems.push(format!("\"{}\" has been revoked", name));
                    report.revocation.revoked.push(name);
                },
                RevocationState::Unavailable(reason) => {
                    let line = format!("{}: {}", name, reason);
                    match ctx.revocation_mode() {
                        RevocationMode::SoftFail => {
                            report.warnings.push(format!("revocation status unavailable for {}", line))
                        },
                        RevocationMode::HardFail => {
                            problems.push(format!("revocation status unavailable for {}", line))
                        },
                    }
                    report.revocation.unavailable.push(line);
                },
            }
        }
    }

    report.trust_ok = Some(problems.is_empty());
    report.problems = problems;
    report
}
