//! Per-signature validation and the document-level verifier seam.

use super::byterange::ByteRange;
use super::cms::{self, SignerCheck};
use super::fetch::Fetcher;
use super::status::{CertificateSummary, SignatureStatus, TimestampSummary, Tristate};
use super::trust::{self, RevocationMode, TrustStore, ValidationContext};
use super::types::{EmbeddedSignature, SignatureSubFilter};
use crate::document::PdfReader;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Validate one embedded signature of `reader`.
///
/// Byte-range and CMS structure problems are errors; a digest mismatch or a
/// signature that fails to verify is reported through the returned status.
pub fn validate_pdf_signature(
    reader: &PdfReader,
    signature: &EmbeddedSignature,
    ctx: &ValidationContext,
) -> Result<SignatureStatus> {
    let data = reader.data();
    let mut status = SignatureStatus {
        field_name: signature.field_name.clone(),
        is_doc_timestamp: signature.is_doc_timestamp,
        sub_filter: signature.sub_filter.clone(),
        signer_name: signature.text_entry("Name"),
        reason: signature.text_entry("Reason"),
        location: signature.text_entry("Location"),
        contact_info: signature.text_entry("ContactInfo"),
        dict_signing_time: signature.text_entry("M"),
        ..Default::default()
    };

    let range = ByteRange::parse(&signature.byte_range, data.len())?;
    range.check_contents_gap(data)?;
    status.coverage = Some(range.coverage(data.len(), &reader.revision_boundaries()));
    let signed_bytes = range.extract_signed_bytes(data)?;

    let kind = signature.sub_filter_kind();
    if let (Some(name), None) = (&signature.sub_filter, kind) {
        return Err(Error::UnsupportedAlgorithm(format!("signature sub-filter {}", name)));
    }
    if kind == Some(SignatureSubFilter::X509RsaSha1) {
        status
            .warnings
            .push("adbe.x509.rsa_sha1 signatures are not supported; integrity not evaluated".to_string());
        return Ok(status);
    }

    let check = if signature.is_doc_timestamp {
        cms::check_document_timestamp(&signature.contents, &signed_bytes)?
    } else {
        cms::check_signature(&signature.contents, &signed_bytes, kind)?
    };
    log::debug!(
        "{}: intact={:?} valid={:?} mechanism={}",
        signature.field_name,
        check.intact,
        check.valid,
        check.mechanism
    );
    apply_signer_check(&mut status, &check, ctx);
    Ok(status)
}

fn apply_signer_check(status: &mut SignatureStatus, check: &SignerCheck, ctx: &ValidationContext) {
    status.intact = check.intact;
    status.valid = check.valid;
    status.digest_algorithm = Some(check.digest);
    status.signature_mechanism = Some(check.mechanism.clone());
    status.signing_time = check.signing_time;
    status.warnings.extend(check.warnings.iter().cloned());
    status.timestamp = check.timestamp.as_ref().map(|ts| TimestampSummary {
        time: ts.time,
        intact: ts.intact,
        valid: ts.valid,
        tsa: ts
            .tsa
            .as_ref()
            .map(|cert| CertificateSummary::from_certificate(cert).display_name().to_string()),
    });

    match &check.signer {
        Some(signer) => {
            status.signer = Some(CertificateSummary::from_certificate(signer));
            let report = trust::validate_path(signer, &check.certificates, ctx);
            status.trust_ok = report.trust_ok;
            status.chain = report.chain;
            status.trust_problems = report.problems;
            status.revocation = report.revocation;
            status.warnings.extend(report.warnings);
        },
        None => status
            .trust_problems
            .push("no signer certificate to evaluate".to_string()),
    }
}

/// Flat display record for one signature.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationOutcome {
    /// Signature field name, empty when unknown
    pub field_name: String,
    /// Integrity of the signed content
    pub intact: Tristate,
    /// Trust in the signer
    pub trusted: Tristate,
    /// One-line status; `UNKNOWN` when the verifier gives none
    pub summary: String,
    /// Detailed report; empty when the verifier gives none
    pub details: String,
}

impl Default for ValidationOutcome {
    fn default() -> Self {
        Self {
            field_name: String::new(),
            intact: Tristate::Unknown,
            trusted: Tristate::Unknown,
            summary: "UNKNOWN".to_string(),
            details: String::new(),
        }
    }
}

impl From<&SignatureStatus> for ValidationOutcome {
    fn from(status: &SignatureStatus) -> Self {
        Self {
            field_name: status.field_name.clone(),
            intact: status.intact.into(),
            trusted: status.trust_ok.into(),
            summary: status.summary(),
            details: status.pretty_print_details(),
        }
    }
}

/// Verifies every signature in an uploaded document.
pub trait DocumentVerifier: Send + Sync {
    /// One outcome per embedded signature, in signing order. A document
    /// without signatures yields an empty vector.
    fn verify(&self, document: &[u8]) -> Result<Vec<ValidationOutcome>>;
}

/// Production verifier: PDF parsing, CMS checks and path validation.
#[derive(Clone)]
pub struct PdfVerifier {
    trust: Arc<TrustStore>,
    fetcher: Arc<dyn Fetcher>,
    allow_fetching: bool,
    revocation_mode: RevocationMode,
}

impl PdfVerifier {
    /// Verifier trusting `trust` and fetching through `fetcher`.
    pub fn new(trust: Arc<TrustStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            trust,
            fetcher,
            allow_fetching: true,
            revocation_mode: RevocationMode::default(),
        }
    }

    /// Permit or forbid network fetching.
    pub fn with_allow_fetching(mut self, allow: bool) -> Self {
        self.allow_fetching = allow;
        self
    }

    /// Set the revocation policy.
    pub fn with_revocation_mode(mut self, mode: RevocationMode) -> Self {
        self.revocation_mode = mode;
        self
    }

    /// A fresh context for one request.
    pub fn context(&self) -> ValidationContext {
        ValidationContext::new(Arc::clone(&self.trust), Arc::clone(&self.fetcher))
            .with_allow_fetching(self.allow_fetching)
            .with_revocation_mode(self.revocation_mode)
    }

    /// Full statuses rather than display records.
    pub fn verify_statuses(&self, document: &[u8]) -> Result<Vec<SignatureStatus>> {
        let ctx = self.context();
        let reader = PdfReader::from_bytes(document.to_vec())?;
        let signatures = reader.embedded_signatures()?;
        log::debug!("found {} embedded signature(s)", signatures.len());
        signatures
            .iter()
            .map(|signature| validate_pdf_signature(&reader, signature, &ctx))
            .collect()
    }
}

impl DocumentVerifier for PdfVerifier {
    fn verify(&self, document: &[u8]) -> Result<Vec<ValidationOutcome>> {
        Ok(self
            .verify_statuses(document)?
            .iter()
            .map(ValidationOutcome::from)
            .collect())
    }
}
