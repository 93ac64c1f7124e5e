//! Validation status of one embedded signature, and its text renderings.

use super::byterange::Coverage;
use super::types::DigestAlgorithm;
use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;
use std::fmt;
use std::fmt::Write as _;
use std::time::Duration;
use x509_cert::name::Name;
use x509_cert::Certificate;

const ID_AT_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

pub(crate) fn unix_to_utc(since_epoch: Duration) -> DateTime<Utc> {
    i64::try_from(since_epoch.as_secs())
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_default()
}

/// Three-valued check result. Unknown is never folded into true or false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum Tristate {
    /// Check passed
    True,
    /// Check failed
    False,
    /// Check could not be evaluated
    #[default]
    Unknown,
}

impl From<Option<bool>> for Tristate {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Tristate::True,
            Some(false) => Tristate::False,
            None => Tristate::Unknown,
        }
    }
}

impl fmt::Display for Tristate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tristate::True => "True",
            Tristate::False => "False",
            Tristate::Unknown => "Unknown",
        })
    }
}

/// Printable identity of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    /// Subject distinguished name (RFC 4514)
    pub subject: String,
    /// Subject common name, if any
    pub common_name: Option<String>,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number in hex
    pub serial: String,
    /// Start of validity
    pub not_before: DateTime<Utc>,
    /// End of validity
    pub not_after: DateTime<Utc>,
}

pub(crate) fn common_name(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == ID_AT_COMMON_NAME)
        .map(|atv| String::from_utf8_lossy(atv.value.value()).into_owned())
}

impl CertificateSummary {
    /// Summarize a certificate.
    pub fn from_certificate(cert: &Certificate) -> Self {
        let tbs = &cert.tbs_certificate;
        let serial = tbs
            .serial_number
            .as_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Self {
            subject: tbs.subject.to_string(),
            common_name: common_name(&tbs.subject),
            issuer: tbs.issuer.to_string(),
            serial,
            not_before: unix_to_utc(tbs.validity.not_before.to_unix_duration()),
            not_after: unix_to_utc(tbs.validity.not_after.to_unix_duration()),
        }
    }

    /// Common name if present, else the full subject.
    pub fn display_name(&self) -> &str {
        self.common_name.as_deref().unwrap_or(&self.subject)
    }
}

/// Revocation checking results across the certification path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevocationSummary {
    /// Whether revocation checking ran at all
    pub checked: bool,
    /// Certificates confirmed not revoked
    pub good: Vec<String>,
    /// Revoked certificates
    pub revoked: Vec<String>,
    /// Certificates whose status could not be determined, with the reason
    pub unavailable: Vec<String>,
}

/// Timestamp attached to a signature, or the document timestamp itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampSummary {
    /// Time asserted by the TSA
    pub time: DateTime<Utc>,
    /// Message imprint matched
    pub intact: bool,
    /// TSA signature verified
    pub valid: Option<bool>,
    /// TSA identity, when its certificate is embedded
    pub tsa: Option<String>,
}

/// Everything known about one embedded signature after validation.
#[derive(Debug, Clone, Default)]
pub struct SignatureStatus {
    /// Fully qualified form field name
    pub field_name: String,
    /// Signed content digest matches
    pub intact: Option<bool>,
    /// Cryptographic signature value verifies
    pub valid: Option<bool>,
    /// Signer certificate chains to a trust anchor
    pub trust_ok: Option<bool>,
    /// How much of the file the signature covers
    pub coverage: Option<Coverage>,
    /// Whether this is a document timestamp rather than a signature
    pub is_doc_timestamp: bool,
    /// `/SubFilter`
    pub sub_filter: Option<String>,
    /// Digest algorithm
    pub digest_algorithm: Option<DigestAlgorithm>,
    /// Signature mechanism, e.g. `sha256_rsa`
    pub signature_mechanism: Option<String>,
    /// Signer certificate
    pub signer: Option<CertificateSummary>,
    /// Certification path, signer first
    pub chain: Vec<CertificateSummary>,
    /// Claimed signing time from the signed attributes
    pub signing_time: Option<DateTime<Utc>>,
    /// Signature timestamp token
    pub timestamp: Option<TimestampSummary>,
    /// `/Name` of the signature dictionary
    pub signer_name: Option<String>,
    /// `/Reason`
    pub reason: Option<String>,
    /// `/Location`
    pub location: Option<String>,
    /// `/ContactInfo`
    pub contact_info: Option<String>,
    /// `/M`, as written
    pub dict_signing_time: Option<String>,
    /// Why trust was not established
    pub trust_problems: Vec<String>,
    /// Revocation results
    pub revocation: RevocationSummary,
    /// Non-fatal anomalies
    pub warnings: Vec<String>,
}

fn tristate_word(value: Option<bool>, yes: &'static str, no: &'static str) -> &'static str {
    match value {
        Some(true) => yes,
        Some(false) => no,
        None => "UNKNOWN",
    }
}

impl SignatureStatus {
    /// Whether the signature and its timestamp (if any) hold up cryptographically.
    pub fn bottom_line(&self) -> bool {
        self.intact == Some(true)
            && self.valid == Some(true)
            && self.trust_ok == Some(true)
            && self.timestamp.as_ref().map_or(true, |ts| ts.intact && ts.valid != Some(false))
    }

    /// One-line status, e.g. `INTACT:TRUSTED,UNTOUCHED`.
    pub fn summary(&self) -> String {
        if self.intact == Some(false) || self.valid == Some(false) {
            return "INVALID".to_string();
        }
        if self.intact.is_none() {
            return "UNKNOWN".to_string();
        }

        let trust = match (self.valid, self.trust_ok) {
            (None, _) => "SIGNATURE_UNVERIFIED",
            (_, Some(true)) => "TRUSTED",
            (_, Some(false)) => "UNTRUSTED",
            (_, None) => "TRUST_UNKNOWN",
        };
        let mut summary = format!("INTACT:{}", trust);
        if let Some(coverage) = self.coverage {
            summary.push(',');
            summary.push_str(coverage.modification_token());
        }
        if let Some(ts) = &self.timestamp {
            let state = if ts.intact && ts.valid != Some(false) {
                "INTACT"
            } else {
                "INVALID"
            };
            let _ = write!(summary, ",TIMESTAMP_TOKEN<{}>", state);
        }
        summary
    }

    /// Multi-section plain-text report.
    pub fn pretty_print_details(&self) -> String {
        let mut out = String::new();
        let kind = if self.is_doc_timestamp {
            "Document timestamp"
        } else {
            "Signature"
        };
        let _ = writeln!(out, "{} field: {}", kind, self.field_name);
        if let Some(sub_filter) = &self.sub_filter {
            let _ = writeln!(out, "Sub-filter: {}", sub_filter);
        }
        out.push('\n');

        let _ = writeln!(out, "Signer info");
        let _ = writeln!(out, "-----------");
        match &self.signer {
            Some(signer) => {
                let _ = writeln!(out, "Certificate subject: \"{}\"", signer.subject);
                let _ = writeln!(out, "Certificate issuer: \"{}\"", signer.issuer);
                let _ = writeln!(out, "Certificate serial: {}", signer.serial);
                let _ = writeln!(
                    out,
                    "Certificate validity: {} to {}",
                    signer.not_before.format("%Y-%m-%d %H:%M:%S UTC"),
                    signer.not_after.format("%Y-%m-%d %H:%M:%S UTC")
                );
            },
            None => {
                let _ = writeln!(out, "No signer certificate available.");
            },
        }
        for (label, value) in [
            ("Name", &self.signer_name),
            ("Reason", &self.reason),
            ("Location", &self.location),
            ("Contact info", &self.contact_info),
        ] {
            if let Some(value) = value {
                let _ = writeln!(out, "{}: {}", label, value);
            }
        }
        out.push('\n');

        let _ = writeln!(out, "Integrity");
        let _ = writeln!(out, "---------");
        if let Some(mechanism) = &self.signature_mechanism {
            let _ = writeln!(out, "Signature mechanism: {}", mechanism);
        }
        if let Some(digest) = self.digest_algorithm {
            let _ = writeln!(out, "Digest algorithm: {}", digest.name());
        }
        let _ = writeln!(
            out,
            "Digest of signed content: {}",
            tristate_word(self.intact, "MATCHES", "DOES NOT MATCH")
        );
        let _ = writeln!(
            out,
            "Cryptographic signature: {}",
            tristate_word(self.valid, "VALID", "INVALID")
        );
        out.push('\n');

        let _ = writeln!(out, "Signing time");
        let _ = writeln!(out, "------------");
        match self.signing_time {
            Some(time) => {
                let _ = writeln!(
                    out,
                    "Signing time as reported by signer: {}",
                    time.format("%Y-%m-%dT%H:%M:%S+00:00")
                );
            },
            None => {
                let _ = writeln!(out, "No signing time in the signed attributes.");
            },
        }
        if let Some(m) = &self.dict_signing_time {
            let _ = writeln!(out, "Signature dictionary /M: {}", m);
        }
        match &self.timestamp {
            Some(ts) => {
                let _ = writeln!(
                    out,
                    "Signature timestamp token: {} (imprint {}, TSA signature {})",
                    ts.time.format("%Y-%m-%dT%H:%M:%S+00:00"),
                    if ts.intact { "matches" } else { "does not match" },
                    tristate_word(ts.valid, "valid", "invalid").to_ascii_lowercase(),
                );
                if let Some(tsa) = &ts.tsa {
                    let _ = writeln!(out, "Timestamp authority: {}", tsa);
                }
            },
            None if !self.is_doc_timestamp => {
                let _ = writeln!(out, "No signature timestamp token.");
            },
            None => {},
        }
        out.push('\n');

        let _ = writeln!(out, "Trust");
        let _ = writeln!(out, "-----");
        match self.trust_ok {
            Some(true) => {
                let _ = writeln!(out, "The signer's certificate is trusted.");
                for (depth, cert) in self.chain.iter().enumerate() {
                    let _ = writeln!(out, "  [{}] {}", depth, cert.display_name());
                }
            },
            Some(false) => {
                let _ = writeln!(out, "The signer's certificate is untrusted.");
            },
            None => {
                let _ = writeln!(out, "Trust could not be evaluated.");
            },
        }
        for problem in &self.trust_problems {
            let _ = writeln!(out, "  - {}", problem);
        }
        out.push('\n');

        let _ = writeln!(out, "Revocation");
        let _ = writeln!(out, "----------");
        let revocation = &self.revocation;
        if !revocation.checked {
            let _ = writeln!(out, "Revocation status was not checked.");
        } else {
            for subject in &revocation.good {
                let _ = writeln!(out, "Not revoked: {}", subject);
            }
            for subject in &revocation.revoked {
                let _ = writeln!(out, "REVOKED: {}", subject);
            }
            for reason in &revocation.unavailable {
                let _ = writeln!(out, "Unavailable: {}", reason);
            }
        }
        out.push('\n');

        let _ = writeln!(out, "Modifications");
        let _ = writeln!(out, "-------------");
        let _ = writeln!(
            out,
            "{}",
            match self.coverage {
                Some(Coverage::EntireFile) => "The signature covers the entire file.",
                Some(Coverage::EntireRevision) => {
                    "The signature covers a complete revision; the file was extended by later incremental updates."
                },
                Some(Coverage::Partial) => "The signature does not cover a complete revision of the file.",
                None => "Coverage could not be determined.",
            }
        );

        if !self.warnings.is_empty() {
            out.push('\n');
            let _ = writeln!(out, "Warnings");
            let _ = writeln!(out, "--------");
            for warning in &self.warnings {
                let _ = writeln!(out, "- {}", warning);
            }
        }

        out.push('\n');
        let _ = writeln!(out, "Bottom line");
        let _ = writeln!(out, "-----------");
        let _ = write!(
            out,
            "The {} is judged {}.",
            kind.to_ascii_lowercase(),
            if self.bottom_line() { "VALID" } else { "INVALID" }
        );
        out
    }
}
