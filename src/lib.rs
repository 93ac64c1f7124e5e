// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::redundant_guards)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # PDF Sigcheck
//!
//! Validation of digital signatures embedded in PDF documents, behind a small
//! upload form.
//!
//! ## Core Features
//!
//! ### Reading
//! - **Object layer**: nom-based lexer and parser, Flate/ASCIIHex/ASCII85 streams
//!   with PNG and TIFF predictors
//! - **Cross-references**: tables, xref streams, hybrid files, object streams,
//!   `/Prev` chains across incremental updates, rebuild-by-scan for damaged files
//! - **Signature fields**: `/AcroForm` walk with inherited field names and types
//!
//! ### Validation
//! - **Byte ranges**: structural checks and coverage (whole file, whole revision, partial)
//! - **CMS**: messageDigest and signer signature (RSA PKCS#1 v1.5, ECDSA P-256/P-384),
//!   signature timestamp tokens, document timestamps
//! - **Trust**: path building to configured anchors, AIA issuer fetching,
//!   CRL revocation checks with soft or hard failure
//! - **Reports**: tri-state integrity and trust, one-line summary, detailed text report
//!
//! ### Web
//! - `GET /` upload form, `POST /verify` result page, static assets, 404/405 pages
//!
//! ## Quick Start - Rust
//!
//! ```ignore
//! use pdf_sigcheck::signatures::{DocumentVerifier, NoFetch, PdfVerifier, TrustStore};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = PdfVerifier::new(Arc::new(TrustStore::new()), Arc::new(NoFetch))
//!     .with_allow_fetching(false);
//! let data = std::fs::read("signed.pdf")?;
//! for outcome in verifier.verify(&data)? {
//!     println!("{} intact={} trusted={}", outcome.summary, outcome.intact, outcome.trusted);
//! }
//! # Ok(())
//! # }
//! ```

// Error handling
pub mod error;

// Core PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;

// Stream decoders
pub mod decoders;

// Signature validation
pub mod signatures;

// HTTP front door
pub mod web;

// Configuration
pub mod config;

// Re-exports
pub use config::ServerConfig;
pub use document::PdfReader;
pub use error::{Error, ErrorKind, Result};
pub use signatures::{DocumentVerifier, PdfVerifier, ValidationOutcome};
pub use web::AppContext;
