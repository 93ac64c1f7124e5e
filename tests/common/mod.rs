//! Fixtures shared by the integration tests: certificates, CMS blobs and
//! signed PDFs assembled in memory.

#![allow(dead_code)]

use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use const_oid::{AssociatedOid, ObjectIdentifier};
use der::asn1::{Any, BitString, GeneralizedTime, OctetString, SetOfVec, UtcTime};
use der::{Decode, Encode};
use p256::ecdsa::SigningKey;
use rand::SeedableRng;
use sha2::{Digest, Sha256, Sha384};
use signature::hazmat::PrehashSigner;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use std::str::FromStr;
use std::time::Duration;
use x509_cert::attr::Attribute;
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::pkix::crl::dp::DistributionPoint;
use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
use x509_cert::ext::pkix::{BasicConstraints, CrlDistributionPoints, SubjectKeyIdentifier};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

pub const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
pub const ID_CT_TST_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");
const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
const ID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
const ID_TIMESTAMP_TOKEN: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.14");
const ID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const TSA_POLICY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1");

/// 2020-01-01T00:00:00Z
pub const NOT_BEFORE: u64 = 1_577_836_800;
/// 2049-12-01T00:00:00Z, inside the UTCTime range
pub const NOT_AFTER: u64 = 2_522_016_000;
/// 2024-01-01T12:00:00Z
pub const SIGNING_TIME: u64 = 1_704_110_400;

/// Hex digits reserved for `/Contents`.
pub const CONTENTS_HEX_LEN: usize = 16384;
const BYTE_RANGE_PLACEHOLDER: &str = "/ByteRange [0000000000 0000000000 0000000000 0000000000]";

/// A private key able to sign certificates and CMS signer infos.
pub enum TestKey {
    Ec(SigningKey),
    P384(p384::ecdsa::SigningKey),
    Rsa(Box<rsa::RsaPrivateKey>),
}

impl TestKey {
    /// Deterministic P-256 key.
    pub fn ec(seed: u8) -> Self {
        let bytes = [seed.max(1); 32];
        TestKey::Ec(SigningKey::from_bytes(&bytes.into()).unwrap())
    }

    /// Deterministic P-384 key.
    pub fn p384(seed: u8) -> Self {
        let bytes = p384::FieldBytes::clone_from_slice(&[seed.max(1); 48]);
        TestKey::P384(p384::ecdsa::SigningKey::from_bytes(&bytes).unwrap())
    }

    /// Deterministic 1024-bit RSA key.
    pub fn rsa(seed: u64) -> Self {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        TestKey::Rsa(Box::new(rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap()))
    }

    pub fn spki(&self) -> SubjectPublicKeyInfoOwned {
        let der = match self {
            TestKey::Ec(key) => {
                use p256::pkcs8::EncodePublicKey;
                key.verifying_key().to_public_key_der().unwrap()
            },
            TestKey::P384(key) => {
                use p384::pkcs8::EncodePublicKey;
                key.verifying_key().to_public_key_der().unwrap()
            },
            TestKey::Rsa(key) => {
                use rsa::pkcs8::EncodePublicKey;
                key.to_public_key().to_public_key_der().unwrap()
            },
        };
        SubjectPublicKeyInfoOwned::from_der(der.as_bytes()).unwrap()
    }

    pub fn algorithm(&self) -> AlgorithmIdentifierOwned {
        match self {
            TestKey::Ec(_) => AlgorithmIdentifierOwned {
                oid: ECDSA_WITH_SHA256,
                parameters: None,
            },
            TestKey::P384(_) => AlgorithmIdentifierOwned {
                oid: ECDSA_WITH_SHA384,
                parameters: None,
            },
            TestKey::Rsa(_) => AlgorithmIdentifierOwned {
                oid: SHA256_WITH_RSA,
                parameters: Some(Any::null()),
            },
        }
    }

    /// Signature over `message` with the digest [`TestKey::algorithm`] names:
    /// SHA-384 for P-384 keys, SHA-256 otherwise.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let prehash = Sha256::digest(message);
        match self {
            TestKey::Ec(key) => {
                let sig: p256::ecdsa::Signature = key.sign_prehash(&prehash).unwrap();
                sig.to_der().as_bytes().to_vec()
            },
            TestKey::P384(key) => {
                let sig: p384::ecdsa::Signature = key.sign_prehash(&Sha384::digest(message)).unwrap();
                sig.to_der().as_bytes().to_vec()
            },
            TestKey::Rsa(key) => key
                .sign(rsa::Pkcs1v15Sign::new::<Sha256>(), &prehash)
                .unwrap(),
        }
    }
}

/// A certificate together with its private key.
pub struct Identity {
    pub cert: Certificate,
    pub key: TestKey,
}

impl Identity {
    pub fn name(&self) -> &Name {
        &self.cert.tbs_certificate.subject
    }
}

fn utc(secs: u64) -> Time {
    Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(secs)).unwrap())
}

fn extension<T: Encode + AssociatedOid>(value: &T, critical: bool) -> Extension {
    Extension {
        extn_id: T::OID,
        critical,
        extn_value: OctetString::new(value.to_der().unwrap()).unwrap(),
    }
}

/// Issue a certificate for `key` named `subject`. Self-signed when `issuer`
/// is `None`.
pub fn issue(subject: &str, key: TestKey, serial: u8, ca: bool, issuer: Option<&Identity>) -> Identity {
    issue_with(subject, key, serial, ca, issuer, Vec::new())
}

/// Like [`issue`], with `extra` appended to the certificate extensions.
pub fn issue_with(
    subject: &str,
    key: TestKey,
    serial: u8,
    ca: bool,
    issuer: Option<&Identity>,
    extra: Vec<Extension>,
) -> Identity {
    let subject = Name::from_str(subject).unwrap();
    let (issuer_name, signer) = match issuer {
        Some(issuer) => (issuer.name().clone(), &issuer.key),
        None => (subject.clone(), &key),
    };
    let mut extensions = if ca {
        vec![extension(
            &BasicConstraints {
                ca: true,
                path_len_constraint: None,
            },
            true,
        )]
    } else {
        Vec::new()
    };
    extensions.extend(extra);

    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[serial & 0x7f]).unwrap(),
        signature: signer.algorithm(),
        issuer: issuer_name,
        validity: Validity {
            not_before: utc(NOT_BEFORE),
            not_after: utc(NOT_AFTER),
        },
        subject,
        subject_public_key_info: key.spki(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: if extensions.is_empty() { None } else { Some(extensions) },
    };
    let signature = signer.sign(&tbs_certificate.to_der().unwrap());
    let cert = Certificate {
        tbs_certificate,
        signature_algorithm: signer.algorithm(),
        signature: BitString::from_bytes(&signature).unwrap(),
    };
    Identity { cert, key }
}

/// Self-signed P-256 root.
pub fn root_ca(common_name: &str, seed: u8) -> Identity {
    issue(&format!("CN={},O=Sigcheck Tests", common_name), TestKey::ec(seed), seed, true, None)
}

/// End-entity P-256 certificate issued by `issuer`.
pub fn signer(common_name: &str, seed: u8, issuer: &Identity) -> Identity {
    issue(&format!("CN={},O=Sigcheck Tests", common_name), TestKey::ec(seed), seed, false, Some(issuer))
}

/// CRL distribution point extension naming `url`.
pub fn crl_distribution_point(url: &str) -> Extension {
    let point = DistributionPoint {
        distribution_point: Some(DistributionPointName::FullName(vec![
            GeneralName::UniformResourceIdentifier(der::asn1::Ia5String::new(url).unwrap()),
        ])),
        reasons: None,
        crl_issuer: None,
    };
    extension(&CrlDistributionPoints(vec![point]), false)
}

/// Subject key identifier extension.
pub fn subject_key_identifier(id: &[u8]) -> Extension {
    extension(&SubjectKeyIdentifier(OctetString::new(id.to_vec()).unwrap()), false)
}

/// CRL from `issuer` listing `revoked`, valid from `this_update` to
/// `next_update` (unix seconds).
pub fn crl(issuer: &Identity, revoked: &[&Certificate], this_update: u64, next_update: u64) -> CertificateList {
    let entries: Vec<RevokedCert> = revoked
        .iter()
        .map(|cert| RevokedCert {
            serial_number: cert.tbs_certificate.serial_number.clone(),
            revocation_date: utc(this_update),
            crl_entry_extensions: None,
        })
        .collect();
    let tbs_cert_list = TbsCertList {
        version: Version::V2,
        signature: issuer.key.algorithm(),
        issuer: issuer.name().clone(),
        this_update: utc(this_update),
        next_update: Some(utc(next_update)),
        revoked_certificates: if entries.is_empty() { None } else { Some(entries) },
        crl_extensions: None,
    };
    let signature = issuer.key.sign(&tbs_cert_list.to_der().unwrap());
    CertificateList {
        tbs_cert_list,
        signature_algorithm: issuer.key.algorithm(),
        signature: BitString::from_bytes(&signature).unwrap(),
    }
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Attribute {
    Attribute {
        oid,
        values: SetOfVec::try_from(vec![value]).unwrap(),
    }
}

fn sha256_alg() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: ID_SHA256,
        parameters: None,
    }
}

/// How a CMS signer identifies itself and what its signature covers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignerStyle {
    /// Name the signer by subject key identifier instead of issuer and serial
    pub by_key_id: bool,
    /// Sign the content itself, without signed attributes
    pub bare: bool,
}

/// SignedData `ContentInfo` with one signer whose signed attributes bind
/// `signed_content`.
///
/// `econtent` is embedded when given; `unsigned` becomes the signer's
/// unsigned attributes. `chain` lists extra certificates to embed.
pub fn content_info(
    identity: &Identity,
    chain: &[&Certificate],
    econtent_type: ObjectIdentifier,
    econtent: Option<&[u8]>,
    signed_content: &[u8],
    unsigned: Option<Attribute>,
) -> ContentInfo {
    content_info_with(
        identity,
        chain,
        econtent_type,
        econtent,
        signed_content,
        unsigned,
        SignerStyle::default(),
    )
}

fn own_key_identifier(cert: &Certificate) -> SubjectKeyIdentifier {
    let ext = cert
        .tbs_certificate
        .extensions
        .iter()
        .flatten()
        .find(|ext| ext.extn_id == SubjectKeyIdentifier::OID)
        .expect("certificate has a subject key identifier");
    SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes()).unwrap()
}

/// [`content_info`] with a non-default [`SignerStyle`].
pub fn content_info_with(
    identity: &Identity,
    chain: &[&Certificate],
    econtent_type: ObjectIdentifier,
    econtent: Option<&[u8]>,
    signed_content: &[u8],
    unsigned: Option<Attribute>,
    style: SignerStyle,
) -> ContentInfo {
    let signed_attrs = SetOfVec::try_from(vec![
        attribute(ID_CONTENT_TYPE, Any::encode_from(&econtent_type).unwrap()),
        attribute(
            ID_MESSAGE_DIGEST,
            Any::encode_from(&OctetString::new(Sha256::digest(signed_content).to_vec()).unwrap())
                .unwrap(),
        ),
        attribute(ID_SIGNING_TIME, Any::encode_from(&utc(SIGNING_TIME)).unwrap()),
    ])
    .unwrap();
    let (signature, signed_attrs) = if style.bare {
        (identity.key.sign(signed_content), None)
    } else {
        (identity.key.sign(&signed_attrs.to_der().unwrap()), Some(signed_attrs))
    };
    let (version, sid) = if style.by_key_id {
        (CmsVersion::V3, SignerIdentifier::SubjectKeyIdentifier(own_key_identifier(&identity.cert)))
    } else {
        (
            CmsVersion::V1,
            SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: identity.cert.tbs_certificate.issuer.clone(),
                serial_number: identity.cert.tbs_certificate.serial_number.clone(),
            }),
        )
    };

    let signer_info = SignerInfo {
        version,
        sid,
        digest_alg: sha256_alg(),
        signed_attrs,
        signature_algorithm: identity.key.algorithm(),
        signature: OctetString::new(signature).unwrap(),
        unsigned_attrs: unsigned.map(|attr| SetOfVec::try_from(vec![attr]).unwrap()),
    };

    let mut certificates = vec![CertificateChoices::Certificate(identity.cert.clone())];
    certificates.extend(chain.iter().map(|cert| CertificateChoices::Certificate((*cert).clone())));

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![sha256_alg()]).unwrap(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type,
            econtent: econtent
                .map(|bytes| Any::encode_from(&OctetString::new(bytes.to_vec()).unwrap()).unwrap()),
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(certificates).unwrap())),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).unwrap()),
    };

    ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::encode_from(&signed_data).unwrap(),
    }
}

/// DER TSTInfo stamping `stamped` at `gen_time` (unix seconds).
pub fn tst_info(stamped: &[u8], gen_time: u64) -> Vec<u8> {
    let imprint = vec![
        Any::encode_from(&sha256_alg()).unwrap(),
        Any::encode_from(&OctetString::new(Sha256::digest(stamped).to_vec()).unwrap()).unwrap(),
    ];
    let fields = vec![
        Any::encode_from(&1u8).unwrap(),
        Any::encode_from(&TSA_POLICY).unwrap(),
        Any::encode_from(&imprint).unwrap(),
        Any::encode_from(&42u8).unwrap(),
        Any::encode_from(&GeneralizedTime::from_unix_duration(Duration::from_secs(gen_time)).unwrap())
            .unwrap(),
    ];
    fields.to_der().unwrap()
}

/// RFC 3161 timestamp token from `tsa` over `stamped`.
pub fn timestamp_token(tsa: &Identity, stamped: &[u8], gen_time: u64) -> ContentInfo {
    let tst = tst_info(stamped, gen_time);
    content_info(tsa, &[], ID_CT_TST_INFO, Some(&tst), &tst, None)
}

/// A detached CMS signature over `signed_bytes`, DER encoded.
pub fn detached_signature(identity: &Identity, chain: &[&Certificate], signed_bytes: &[u8]) -> Vec<u8> {
    content_info(identity, chain, ID_DATA, None, signed_bytes, None)
        .to_der()
        .unwrap()
}

/// Like [`detached_signature`] with a non-default [`SignerStyle`].
pub fn detached_signature_with(identity: &Identity, signed_bytes: &[u8], style: SignerStyle) -> Vec<u8> {
    content_info_with(identity, &[], ID_DATA, None, signed_bytes, None, style)
        .to_der()
        .unwrap()
}

/// Like [`detached_signature`] with a signature timestamp from `tsa`.
pub fn timestamped_signature(identity: &Identity, tsa: &Identity, signed_bytes: &[u8]) -> Vec<u8> {
    // The token stamps the signature value, which only exists after signing.
    let bare = content_info(identity, &[], ID_DATA, None, signed_bytes, None);
    let signed_data = SignedData::from_der(&bare.content.to_der().unwrap()).unwrap();
    let signature = signed_data.signer_infos.0.iter().next().unwrap().signature.clone();

    let token = timestamp_token(tsa, signature.as_bytes(), SIGNING_TIME + 5);
    let unsigned = attribute(ID_TIMESTAMP_TOKEN, Any::encode_from(&token).unwrap());
    // Deterministic ECDSA gives the same signature value on re-signing.
    content_info(identity, &[], ID_DATA, None, signed_bytes, Some(unsigned))
        .to_der()
        .unwrap()
}

/// Classic single-revision file with a correct xref table. Objects are
/// numbered from 1.
pub fn build_pdf(objects: &[String]) -> Vec<u8> {
    let mut out = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}

fn last_startxref(pdf: &[u8]) -> usize {
    let text = String::from_utf8_lossy(pdf);
    let at = text.rfind("startxref").unwrap() + "startxref".len();
    text[at..].split_whitespace().next().unwrap().parse().unwrap()
}

fn find(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .unwrap()
}

/// Signature dictionary with a ByteRange placeholder and an empty
/// `/Contents` of [`CONTENTS_HEX_LEN`] digits.
pub fn signature_dictionary(sub_filter: &str, doc_timestamp: bool) -> String {
    let kind = if doc_timestamp { "/DocTimeStamp" } else { "/Sig" };
    format!(
        "<< /Type {} /Filter /Adobe.PPKLite /SubFilter /{} /Name (Test Signer) /Reason (Approval) \
         /Location (Test Lab) /M (D:20240101120000Z) {} /Contents <{}> >>",
        kind,
        sub_filter,
        BYTE_RANGE_PLACEHOLDER,
        "0".repeat(CONTENTS_HEX_LEN)
    )
}

/// A one-page-tree document whose AcroForm holds one signature field.
pub fn unsigned_pdf(field_name: &str, sub_filter: &str, doc_timestamp: bool) -> Vec<u8> {
    build_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [3 0 R] /SigFlags 3 >> >>".to_string(),
        "<< /Type /Pages /Count 0 /Kids [] >>".to_string(),
        format!("<< /FT /Sig /T ({}) /V 4 0 R >>", field_name),
        signature_dictionary(sub_filter, doc_timestamp),
    ])
}

/// Overwrite the ByteRange of the first signature in place.
pub fn write_byte_range(pdf: &mut [u8], range: [usize; 4]) {
    let text = format!(
        "/ByteRange [{:<10} {:<10} {:<10} {:<10}]",
        range[0], range[1], range[2], range[3]
    );
    assert_eq!(text.len(), BYTE_RANGE_PLACEHOLDER.len());
    let at = find(pdf, b"/ByteRange [");
    pdf[at..at + text.len()].copy_from_slice(text.as_bytes());
}

/// Fill in the ByteRange of a prepared document and write the `/Contents`
/// produced by `make_contents` from the signed bytes.
pub fn sign_prepared(mut pdf: Vec<u8>, make_contents: impl FnOnce(&[u8]) -> Vec<u8>) -> Vec<u8> {
    let gap_start = find(&pdf, b"/Contents <") + "/Contents ".len();
    let gap_end = gap_start + CONTENTS_HEX_LEN + 2;
    let range = [0, gap_start, gap_end, pdf.len() - gap_end];
    write_byte_range(&mut pdf, range);

    let mut signed = pdf[..gap_start].to_vec();
    signed.extend_from_slice(&pdf[gap_end..]);
    let contents = make_contents(&signed);

    let hex: String = contents.iter().map(|b| format!("{:02X}", b)).collect();
    assert!(hex.len() <= CONTENTS_HEX_LEN, "signature does not fit the reserved space");
    pdf[gap_start + 1..gap_start + 1 + hex.len()].copy_from_slice(hex.as_bytes());
    pdf
}

/// A document signed with a detached CMS signature by `identity`.
pub fn signed_pdf(identity: &Identity, chain: &[&Certificate]) -> Vec<u8> {
    sign_prepared(unsigned_pdf("Signature1", "adbe.pkcs7.detached", false), |signed| {
        detached_signature(identity, chain, signed)
    })
}

/// An `adbe.pkcs7.sha1` document: the CMS carries and signs the SHA-1 digest
/// of the byte range.
pub fn sha1_signed_pdf(identity: &Identity) -> Vec<u8> {
    sign_prepared(unsigned_pdf("Signature1", "adbe.pkcs7.sha1", false), |signed| {
        let digest = sha1::Sha1::digest(signed);
        content_info(identity, &[], ID_DATA, Some(digest.as_slice()), &digest, None)
            .to_der()
            .unwrap()
    })
}

/// Append an incremental update that adds one unrelated object.
pub fn append_revision(pdf: &[u8]) -> Vec<u8> {
    let prev = last_startxref(pdf);
    let mut out = pdf.to_vec();
    let offset = out.len();
    out.extend_from_slice(b"5 0 obj\n<< /Producer (incremental update) >>\nendobj\n");
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n5 1\n{:010} 00000 n \n", offset).as_bytes());
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size 6 /Root 1 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            prev, xref_at
        )
        .as_bytes(),
    );
    out
}

/// Replace the first occurrence of `from` with `to` (same length).
pub fn patch(pdf: &mut [u8], from: &[u8], to: &[u8]) {
    assert_eq!(from.len(), to.len());
    let at = find(pdf, from);
    pdf[at..at + to.len()].copy_from_slice(to);
}
