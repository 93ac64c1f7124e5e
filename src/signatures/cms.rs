//! CMS (PKCS#7) SignedData processing for document signatures and timestamps.
//!
//! The `/Contents` hex string of a signature dictionary holds a DER
//! `ContentInfo`, zero padded up to the size reserved when the document was
//! prepared for signing. This module decodes it, picks the signer, checks the
//! content digest and the signer's signature, and reads the signed and
//! unsigned attributes a report needs.

use super::crypto::{self, mechanism_name};
use super::status::unix_to_utc;
use super::trust::extension;
use super::types::{DigestAlgorithm, SignatureSubFilter};
use crate::error::{Error, Result};
use ::cms::cert::CertificateChoices;
use ::cms::content_info::ContentInfo;
use ::cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use const_oid::ObjectIdentifier;
use der::asn1::{Any, OctetString, SetOfVec};
use der::{Decode, DecodeOwned, Encode};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::time::Time;
use x509_cert::Certificate;

const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
const ID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
const ID_TIMESTAMP_TOKEN: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.14");

/// Outcome of checking one CMS signer against its content.
#[derive(Debug, Clone)]
pub struct SignerCheck {
    /// Content digest matches (or the signature over the content verifies
    /// when there are no signed attributes)
    pub intact: Option<bool>,
    /// The signer's signature verifies with the signer certificate key
    pub valid: Option<bool>,
    /// Digest algorithm of the signer
    pub digest: DigestAlgorithm,
    /// Signature mechanism, e.g. `sha256_rsa`
    pub mechanism: String,
    /// Signer certificate, if the CMS carries it
    pub signer: Option<Certificate>,
    /// All certificates embedded in the CMS
    pub certificates: Vec<Certificate>,
    /// Claimed signing time (`signingTime` attribute or TSTInfo `genTime`)
    pub signing_time: Option<DateTime<Utc>>,
    /// Signature timestamp token, if one is attached
    pub timestamp: Option<TimestampCheck>,
    /// Non-fatal anomalies
    pub warnings: Vec<String>,
}

/// Outcome of checking an RFC 3161 timestamp token.
#[derive(Debug, Clone)]
pub struct TimestampCheck {
    /// `genTime` of the token
    pub time: DateTime<Utc>,
    /// The message imprint matches what the token claims to timestamp
    pub intact: bool,
    /// The TSA signature verifies
    pub valid: Option<bool>,
    /// TSA certificate, if embedded
    pub tsa: Option<Certificate>,
}

struct TstInfo {
    imprint_digest: DigestAlgorithm,
    imprint: Vec<u8>,
    gen_time: DateTime<Utc>,
}

/// Decode `/Contents` into a `SignedData`.
pub fn parse_signed_data(contents: &[u8]) -> Result<SignedData> {
    let der = crypto::trim_der_padding(contents)?;
    let content_info = ContentInfo::from_der(der)?;
    signed_data_of(&content_info)
}

fn signed_data_of(content_info: &ContentInfo) -> Result<SignedData> {
    if content_info.content_type != ID_SIGNED_DATA {
        return Err(Error::Cms(format!(
            "expected SignedData, found content type {}",
            content_info.content_type
        )));
    }
    Ok(SignedData::from_der(&content_info.content.to_der()?)?)
}

fn embedded_certificates(signed_data: &SignedData) -> Vec<Certificate> {
    signed_data
        .certificates
        .as_ref()
        .map(|set| {
            set.0
                .iter()
                .filter_map(|choice| match choice {
                    CertificateChoices::Certificate(cert) => Some(cert.clone()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn first_signer<'a>(signed_data: &'a SignedData, warnings: &mut Vec<String>) -> Result<&'a SignerInfo> {
    let mut signers = signed_data.signer_infos.0.iter();
    let first = signers
        .next()
        .ok_or_else(|| Error::Cms("SignedData contains no SignerInfo".to_string()))?;
    if signers.next().is_some() {
        warnings.push("CMS carries more than one signer; only the first is evaluated".to_string());
    }
    Ok(first)
}

/// Certificate named by the signer identifier.
fn find_signer_certificate(signer_info: &SignerInfo, certs: &[Certificate]) -> Option<Certificate> {
    match &signer_info.sid {
        SignerIdentifier::IssuerAndSerialNumber(ias) => certs
            .iter()
            .find(|cert| {
                cert.tbs_certificate.issuer == ias.issuer
                    && cert.tbs_certificate.serial_number == ias.serial_number
            })
            .cloned(),
        SignerIdentifier::SubjectKeyIdentifier(ski) => certs
            .iter()
            .find(|cert| {
                matches!(
                    extension::<SubjectKeyIdentifier>(cert),
                    Ok(Some(own)) if own.0.as_bytes() == ski.0.as_bytes()
                )
            })
            .cloned(),
    }
}

fn attribute<T: DecodeOwned>(attrs: &SetOfVec<Attribute>, oid: ObjectIdentifier) -> Result<Option<T>> {
    let Some(attr) = attrs.iter().find(|attr| attr.oid == oid) else {
        return Ok(None);
    };
    let value = attr
        .values
        .iter()
        .next()
        .ok_or_else(|| Error::Cms(format!("attribute {} has no value", oid)))?;
    Ok(Some(T::from_der(&value.to_der()?)?))
}

fn encapsulated_content(signed_data: &SignedData) -> Result<Option<Vec<u8>>> {
    match &signed_data.encap_content_info.econtent {
        None => Ok(None),
        Some(any) => Ok(Some(OctetString::from_der(&any.to_der()?)?.as_bytes().to_vec())),
    }
}

/// Check one signer of `signed_data` against `content`.
fn check_signer(
    signed_data: &SignedData,
    signer_info: &SignerInfo,
    certificates: Vec<Certificate>,
    content: &[u8],
    mut warnings: Vec<String>,
) -> Result<SignerCheck> {
    let digest = DigestAlgorithm::from_oid(&signer_info.digest_alg.oid)?;
    let mechanism_oid = signer_info.signature_algorithm.oid;
    let signer = find_signer_certificate(signer_info, &certificates);
    let content_digest = digest.digest(content);
    let signature = signer_info.signature.as_bytes();

    let mut signing_time = None;
    let (digest_ok, message) = match &signer_info.signed_attrs {
        Some(attrs) => {
            let claimed: OctetString = attribute(attrs, ID_MESSAGE_DIGEST)?.ok_or_else(|| {
                Error::Cms("signed attributes lack a messageDigest".to_string())
            })?;
            if let Some(content_type) = attribute::<ObjectIdentifier>(attrs, ID_CONTENT_TYPE)? {
                if content_type != signed_data.encap_content_info.econtent_type {
                    warnings.push(format!(
                        "contentType attribute {} differs from encapsulated type {}",
                        content_type, signed_data.encap_content_info.econtent_type
                    ));
                }
            }
            signing_time = attribute::<Time>(attrs, ID_SIGNING_TIME)?
                .map(|t| unix_to_utc(t.to_unix_duration()));
            (Some(claimed.as_bytes() == content_digest.as_slice()), attrs.to_der()?)
        },
        None => (None, content.to_vec()),
    };

    let valid = match &signer {
        None => {
            warnings.push("signer certificate is not embedded in the signature".to_string());
            None
        },
        Some(cert) => match crypto::verify_signature(
            &cert.tbs_certificate.subject_public_key_info,
            &mechanism_oid,
            digest,
            &message,
            signature,
        ) {
            Ok(ok) => Some(ok),
            Err(e) => {
                log::debug!("signer signature not evaluated: {}", e);
                warnings.push(format!("signature value not evaluated: {}", e));
                None
            },
        },
    };

    Ok(SignerCheck {
        intact: digest_ok.or(valid),
        valid,
        digest,
        mechanism: mechanism_name(&mechanism_oid, digest),
        signer,
        certificates,
        signing_time,
        timestamp: None,
        warnings,
    })
}

fn parse_tst_info(der: &[u8]) -> Result<TstInfo> {
    let fields = Vec::<Any>::from_der(der)?;
    let (imprint, gen_time) = match (fields.get(2), fields.get(4)) {
        (Some(imprint), Some(gen_time)) => (imprint, gen_time),
        _ => return Err(Error::Cms("TSTInfo is missing required fields".to_string())),
    };

    let imprint_fields = Vec::<Any>::from_der(&imprint.to_der()?)?;
    let [algorithm, hashed] = imprint_fields.as_slice() else {
        return Err(Error::Cms("malformed TSTInfo messageImprint".to_string()));
    };
    let algorithm = AlgorithmIdentifierOwned::from_der(&algorithm.to_der()?)?;
    let hashed = OctetString::from_der(&hashed.to_der()?)?;

    Ok(TstInfo {
        imprint_digest: DigestAlgorithm::from_oid(&algorithm.oid)?,
        imprint: hashed.as_bytes().to_vec(),
        gen_time: parse_generalized_time(gen_time.value())?,
    })
}

/// `YYYYMMDDHHMMSS[.f*]Z`; fractional seconds are dropped.
fn parse_generalized_time(raw: &[u8]) -> Result<DateTime<Utc>> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| Error::Cms("genTime is not ASCII".to_string()))?;
    let seconds = text
        .get(..14)
        .ok_or_else(|| Error::Cms(format!("genTime too short: {}", text)))?;
    let naive = NaiveDateTime::parse_from_str(seconds, "%Y%m%d%H%M%S")
        .map_err(|e| Error::Cms(format!("bad genTime {}: {}", text, e)))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Check an RFC 3161 token (a `ContentInfo`) against the data it should stamp.
fn check_timestamp_token(token: &ContentInfo, stamped: &[u8]) -> Result<TimestampCheck> {
    let signed_data = signed_data_of(token)?;
    let tst_der = encapsulated_content(&signed_data)?
        .ok_or_else(|| Error::Cms("timestamp token has no TSTInfo".to_string()))?;
    let tst = parse_tst_info(&tst_der)?;

    let mut warnings = Vec::new();
    let signer_info = first_signer(&signed_data, &mut warnings)?;
    let certificates = embedded_certificates(&signed_data);
    let check = check_signer(&signed_data, signer_info, certificates, &tst_der, warnings)?;

    let imprint_ok = tst.imprint == tst.imprint_digest.digest(stamped);
    Ok(TimestampCheck {
        time: tst.gen_time,
        intact: imprint_ok && check.intact != Some(false),
        valid: check.valid,
        tsa: check.signer,
    })
}

/// Check a regular signature over `signed_bytes`.
pub fn check_signature(
    contents: &[u8],
    signed_bytes: &[u8],
    sub_filter: Option<SignatureSubFilter>,
) -> Result<SignerCheck> {
    let signed_data = parse_signed_data(contents)?;
    let certificates = embedded_certificates(&signed_data);
    let mut warnings = Vec::new();
    let signer_info = first_signer(&signed_data, &mut warnings)?;
    let encapsulated = encapsulated_content(&signed_data)?;

    let mut check = if sub_filter == Some(SignatureSubFilter::Pkcs7Sha1) {
        // The signer signs a SHA-1 digest of the byte range, carried as content.
        let content = encapsulated
            .ok_or_else(|| Error::Cms("adbe.pkcs7.sha1 signature without content".to_string()))?;
        let range_ok = content == DigestAlgorithm::Sha1.digest(signed_bytes);
        let mut check = check_signer(&signed_data, signer_info, certificates, &content, warnings)?;
        check.intact = check.intact.map(|ok| ok && range_ok);
        check
    } else {
        if encapsulated.is_some() {
            warnings.push("detached signature carries encapsulated content; it is ignored".to_string());
        }
        check_signer(&signed_data, signer_info, certificates, signed_bytes, warnings)?
    };

    if let Some(unsigned) = &signer_info.unsigned_attrs {
        match attribute::<ContentInfo>(unsigned, ID_TIMESTAMP_TOKEN) {
            Ok(Some(token)) => {
                match check_timestamp_token(&token, signer_info.signature.as_bytes()) {
                    Ok(ts) => check.timestamp = Some(ts),
                    Err(e) => check.warnings.push(format!("signature timestamp unreadable: {}", e)),
                }
            },
            Ok(None) => {},
            Err(e) => check.warnings.push(format!("signature timestamp unreadable: {}", e)),
        }
    }

    Ok(check)
}

/// Check a document timestamp (`/Type /DocTimeStamp`) over `signed_bytes`.
pub fn check_document_timestamp(contents: &[u8], signed_bytes: &[u8]) -> Result<SignerCheck> {
    let signed_data = parse_signed_data(contents)?;
    let tst_der = encapsulated_content(&signed_data)?
        .ok_or_else(|| Error::Cms("document timestamp has no TSTInfo".to_string()))?;
    let tst = parse_tst_info(&tst_der)?;

    let mut warnings = Vec::new();
    let signer_info = first_signer(&signed_data, &mut warnings)?;
    let certificates = embedded_certificates(&signed_data);
    let mut check = check_signer(&signed_data, signer_info, certificates, &tst_der, warnings)?;

    let imprint_ok = tst.imprint == tst.imprint_digest.digest(signed_bytes);
    check.intact = Some(imprint_ok && check.intact != Some(false));
    check.digest = tst.imprint_digest;
    check.signing_time = Some(tst.gen_time);
    Ok(check)
}
