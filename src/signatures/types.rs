//! Core signature types: algorithms, sub-filters and the embedded signature
//! record produced while walking the form fields.

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use const_oid::ObjectIdentifier;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

pub(crate) const OID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
pub(crate) const OID_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
pub(crate) const OID_SHA384: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
pub(crate) const OID_SHA512: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

/// Digest algorithm of a signer or timestamp imprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-1 (still common in legacy PDFs)
    Sha1,
    /// SHA-256
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// Map an AlgorithmIdentifier OID to a supported digest.
    pub fn from_oid(oid: &ObjectIdentifier) -> Result<Self> {
        match *oid {
            OID_SHA1 => Ok(DigestAlgorithm::Sha1),
            OID_SHA256 => Ok(DigestAlgorithm::Sha256),
            OID_SHA384 => Ok(DigestAlgorithm::Sha384),
            OID_SHA512 => Ok(DigestAlgorithm::Sha512),
            other => Err(Error::UnsupportedAlgorithm(format!("digest {}", other))),
        }
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Hash `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Signature format named by `/SubFilter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached
    Pkcs7Detached,
    /// adbe.pkcs7.sha1: the CMS signs a SHA-1 digest of the byte range
    Pkcs7Sha1,
    /// ETSI.CAdES.detached (PAdES)
    CadesDetached,
    /// ETSI.RFC3161 document timestamp
    Rfc3161,
    /// adbe.x509.rsa_sha1: bare PKCS#1 signature, not CMS
    X509RsaSha1,
}

impl SignatureSubFilter {
    /// The PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::Pkcs7Sha1 => "adbe.pkcs7.sha1",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
            SignatureSubFilter::Rfc3161 => "ETSI.RFC3161",
            SignatureSubFilter::X509RsaSha1 => "adbe.x509.rsa_sha1",
        }
    }

    /// Parse a PDF name.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "adbe.pkcs7.sha1" => Some(SignatureSubFilter::Pkcs7Sha1),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            "ETSI.RFC3161" => Some(SignatureSubFilter::Rfc3161),
            "adbe.x509.rsa_sha1" => Some(SignatureSubFilter::X509RsaSha1),
            _ => None,
        }
    }
}

/// A signed signature field found in the document.
#[derive(Debug, Clone)]
pub struct EmbeddedSignature {
    /// Fully qualified field name (`Parent.Child`)
    pub field_name: String,
    /// The field's indirect reference, when it has one
    pub field_ref: Option<ObjectRef>,
    /// The signature dictionary (`/V`)
    pub dict: Dict,
    /// Decoded `/Contents` (DER, usually zero padded)
    pub contents: Vec<u8>,
    /// Raw `/ByteRange` values, validated later against the file
    pub byte_range: Vec<i64>,
    /// `/SubFilter`, if present
    pub sub_filter: Option<String>,
    /// `/Type /DocTimeStamp` or an RFC 3161 sub-filter
    pub is_doc_timestamp: bool,
}

impl EmbeddedSignature {
    /// Build the record from a resolved signature dictionary.
    pub fn from_dict(field_name: String, field_ref: Option<ObjectRef>, dict: Dict) -> Result<Self> {
        let contents = dict
            .get("Contents")
            .and_then(Object::as_string)
            .ok_or_else(|| {
                Error::Cms(format!("signature field {} has no /Contents string", field_name))
            })?
            .to_vec();
        let byte_range = dict
            .get("ByteRange")
            .and_then(Object::as_array)
            .map(|values| values.iter().filter_map(Object::as_integer).collect())
            .unwrap_or_default();
        let sub_filter = dict
            .get("SubFilter")
            .and_then(Object::as_name)
            .map(str::to_string);
        let is_doc_timestamp = dict.get("Type").and_then(Object::as_name) == Some("DocTimeStamp")
            || sub_filter.as_deref() == Some("ETSI.RFC3161");

        Ok(Self {
            field_name,
            field_ref,
            dict,
            contents,
            byte_range,
            sub_filter,
            is_doc_timestamp,
        })
    }

    /// Where the signed range ends; used to order signatures by signing time.
    pub fn signed_end(&self) -> i64 {
        match self.byte_range.as_slice() {
            [_, _, start, len] => start.saturating_add(*len),
            _ => 0,
        }
    }

    /// Known sub-filter, if the name is one we recognise.
    pub fn sub_filter_kind(&self) -> Option<SignatureSubFilter> {
        self.sub_filter.as_deref().and_then(SignatureSubFilter::from_pdf_name)
    }

    /// A text entry of the signature dictionary (`/Name`, `/Reason`, ...).
    pub fn text_entry(&self, key: &str) -> Option<String> {
        self.dict
            .get(key)
            .and_then(Object::as_text)
            .filter(|s| !s.trim().is_empty())
    }
}
