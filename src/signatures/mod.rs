//! PDF digital signature validation.
//!
//! Given the signature fields found by [`PdfReader::embedded_signatures`],
//! this module checks each one:
//!
//! - the `/ByteRange` covers the file up to the `/Contents` hole;
//! - the CMS message digest matches the signed bytes, and the signer's
//!   signature over its signed attributes verifies;
//! - the signer certificate chains to a configured trust anchor, optionally
//!   fetching missing issuers and CRLs over HTTP.
//!
//! ## Signature Types Supported
//!
//! - PKCS#7 detached signatures (adbe.pkcs7.detached)
//! - PKCS#7 SHA-1 signatures (adbe.pkcs7.sha1)
//! - PAdES signatures (ETSI.CAdES.detached)
//! - Document timestamps (ETSI.RFC3161)
//!
//! ## Example
//!
//! ```ignore
//! use pdf_sigcheck::signatures::{DocumentVerifier, NoFetch, PdfVerifier, TrustStore};
//! use std::sync::Arc;
//!
//! let mut roots = TrustStore::new();
//! roots.load_path("roots.pem".as_ref())?;
//! let verifier = PdfVerifier::new(Arc::new(roots), Arc::new(NoFetch)).with_allow_fetching(false);
//! for outcome in verifier.verify(&std::fs::read("signed.pdf")?)? {
//!     println!("{}: {}", outcome.field_name, outcome.summary);
//! }
//! ```
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - RFC 5652 (CMS), RFC 5280 (X.509 paths and CRLs), RFC 3161 (timestamps)
//!
//! [`PdfReader::embedded_signatures`]: crate::document::PdfReader::embedded_signatures

mod byterange;
mod cms;
mod crypto;
mod fetch;
mod status;
mod trust;
mod types;
mod validator;

pub use byterange::{ByteRange, Coverage};
pub use cms::{check_document_timestamp, check_signature, SignerCheck, TimestampCheck};
pub use fetch::{Fetcher, HttpFetcher, NoFetch, StaticFetcher};
pub use status::{
    CertificateSummary, RevocationSummary, SignatureStatus, TimestampSummary, Tristate,
};
pub use trust::{
    parse_certificates, validate_path, RevocationMode, TrustReport, TrustStore, ValidationContext,
    MAX_PATH_LENGTH,
};
pub use types::{DigestAlgorithm, EmbeddedSignature, SignatureSubFilter};
pub use validator::{validate_pdf_signature, DocumentVerifier, PdfVerifier, ValidationOutcome};
