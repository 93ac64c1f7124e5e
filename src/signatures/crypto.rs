//! Raw signature verification and small DER helpers.

use super::types::DigestAlgorithm;
use crate::error::{Error, Result};
use const_oid::ObjectIdentifier;
use der::asn1::AnyRef;
use der::{Decode, Encode, Reader, SliceReader, Tag};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use signature::hazmat::PrehashVerifier;
use spki::SubjectPublicKeyInfoOwned;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const RSASSA_PSS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.10");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const ECDSA_WITH_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const ECDSA_WITH_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
const CURVE_P256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const CURVE_P384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// Public-key family of a signature algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Rsa,
    Ecdsa,
}

/// Resolve a signature algorithm OID into a key family and, when the OID
/// names one, the digest it implies.
fn mechanism(oid: &ObjectIdentifier) -> Result<(KeyFamily, Option<DigestAlgorithm>)> {
    let resolved = match *oid {
        RSA_ENCRYPTION => (KeyFamily::Rsa, None),
        SHA1_WITH_RSA => (KeyFamily::Rsa, Some(DigestAlgorithm::Sha1)),
        SHA256_WITH_RSA => (KeyFamily::Rsa, Some(DigestAlgorithm::Sha256)),
        SHA384_WITH_RSA => (KeyFamily::Rsa, Some(DigestAlgorithm::Sha384)),
        SHA512_WITH_RSA => (KeyFamily::Rsa, Some(DigestAlgorithm::Sha512)),
        EC_PUBLIC_KEY => (KeyFamily::Ecdsa, None),
        ECDSA_WITH_SHA1 => (KeyFamily::Ecdsa, Some(DigestAlgorithm::Sha1)),
        ECDSA_WITH_SHA256 => (KeyFamily::Ecdsa, Some(DigestAlgorithm::Sha256)),
        ECDSA_WITH_SHA384 => (KeyFamily::Ecdsa, Some(DigestAlgorithm::Sha384)),
        ECDSA_WITH_SHA512 => (KeyFamily::Ecdsa, Some(DigestAlgorithm::Sha512)),
        RSASSA_PSS => {
            return Err(Error::UnsupportedAlgorithm("RSASSA-PSS".to_string()));
        },
        other => {
            return Err(Error::UnsupportedAlgorithm(format!("signature mechanism {}", other)));
        },
    };
    Ok(resolved)
}

/// Human-readable mechanism name, e.g. `sha256_rsa` or `sha384_ecdsa`.
pub fn mechanism_name(oid: &ObjectIdentifier, digest: DigestAlgorithm) -> String {
    match mechanism(oid) {
        Ok((family, implied)) => {
            let digest = implied.unwrap_or(digest);
            let hash = digest.name().to_ascii_lowercase().replace('-', "");
            match family {
                KeyFamily::Rsa => format!("{}_rsa", hash),
                KeyFamily::Ecdsa => format!("{}_ecdsa", hash),
            }
        },
        Err(_) if *oid == RSASSA_PSS => "rsassa_pss".to_string(),
        Err(_) => oid.to_string(),
    }
}

/// Verify `signature` over `message` with the key in `spki`.
///
/// `mechanism_oid` is the signature algorithm (or bare key algorithm) from the
/// signer info or certificate; `digest` is used when the mechanism does not
/// imply one. Returns `Ok(false)` for a well-formed but wrong signature and an
/// error when the key or algorithm cannot be used at all.
pub fn verify_signature(
    spki: &SubjectPublicKeyInfoOwned,
    mechanism_oid: &ObjectIdentifier,
    digest: DigestAlgorithm,
    message: &[u8],
    signature: &[u8],
) -> Result<bool> {
    let (family, implied) = mechanism(mechanism_oid)?;
    let digest = implied.unwrap_or(digest);
    let prehash = digest.digest(message);
    let spki_der = spki.to_der()?;

    match (family, spki.algorithm.oid) {
        (KeyFamily::Rsa, RSA_ENCRYPTION) => verify_rsa(&spki_der, digest, &prehash, signature),
        (KeyFamily::Ecdsa, EC_PUBLIC_KEY) => {
            let curve = spki
                .algorithm
                .parameters
                .as_ref()
                .and_then(|p| p.to_der().ok())
                .and_then(|der| ObjectIdentifier::from_der(&der).ok())
                .ok_or_else(|| Error::Certificate("EC key without a named curve".to_string()))?;
            match curve {
                CURVE_P256 => verify_p256(&spki_der, &prehash, signature),
                CURVE_P384 => verify_p384(&spki_der, &prehash, signature),
                other => Err(Error::UnsupportedAlgorithm(format!("elliptic curve {}", other))),
            }
        },
        (_, key_oid) => Err(Error::Certificate(format!(
            "public key type {} does not match signature mechanism {}",
            key_oid, mechanism_oid
        ))),
    }
}

fn verify_rsa(
    spki_der: &[u8],
    digest: DigestAlgorithm,
    prehash: &[u8],
    signature: &[u8],
) -> Result<bool> {
    use rsa::pkcs8::DecodePublicKey;
    use rsa::{Pkcs1v15Sign, RsaPublicKey};

    let key = RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| Error::Certificate(format!("unusable RSA key: {}", e)))?;
    let scheme = match digest {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    };
    Ok(key.verify(scheme, prehash, signature).is_ok())
}

fn verify_p256(spki_der: &[u8], prehash: &[u8], signature: &[u8]) -> Result<bool> {
    use p256::ecdsa::{Signature, VerifyingKey};
    use p256::pkcs8::DecodePublicKey;

    let key = VerifyingKey::from_public_key_der(spki_der)
        .map_err(|e| Error::Certificate(format!("unusable P-256 key: {}", e)))?;
    let Ok(sig) = Signature::from_der(signature) else {
        return Ok(false);
    };
    Ok(key.verify_prehash(prehash, &sig).is_ok())
}

fn verify_p384(spki_der: &[u8], prehash: &[u8], signature: &[u8]) -> Result<bool> {
    use p384::ecdsa::{Signature, VerifyingKey};
    use p384::pkcs8::DecodePublicKey;

    let key = VerifyingKey::from_public_key_der(spki_der)
        .map_err(|e| Error::Certificate(format!("unusable P-384 key: {}", e)))?;
    let Ok(sig) = Signature::from_der(signature) else {
        return Ok(false);
    };
    Ok(key.verify_prehash(prehash, &sig).is_ok())
}

/// Read the SEQUENCE at the start of `data`.
///
/// Returns the offset of its contents and the offset just past it; bytes
/// after the element are left alone.
fn sequence_bounds(data: &[u8], what: &str) -> Result<(usize, usize)> {
    let mut reader = SliceReader::new(data)?;
    let header = reader.peek_header().map_err(|e| Error::Cms(format!("{}: {}", what, e)))?;
    if header.tag != Tag::Sequence {
        return Err(Error::Cms(format!("{} is not a DER SEQUENCE", what)));
    }
    let contents_at = usize::try_from(header.encoded_len()?)?;
    reader.decode::<AnyRef<'_>>()?;
    Ok((contents_at, usize::try_from(reader.position())?))
}

/// Drop the zero padding that follows the DER value in `/Contents`.
pub fn trim_der_padding(data: &[u8]) -> Result<&[u8]> {
    let (_, end) = sequence_bounds(data, "signature contents")?;
    Ok(&data[..end])
}

/// First element inside the outer SEQUENCE, tag and length included.
///
/// For certificates and CRLs this is the to-be-signed part, exactly as it was
/// signed.
pub fn first_element(data: &[u8]) -> Result<&[u8]> {
    let (contents_at, end) = sequence_bounds(data, "signed object")?;
    let inner = &data[contents_at..end];
    let mut reader = SliceReader::new(inner)?;
    reader.decode::<AnyRef<'_>>()?;
    Ok(&inner[..usize::try_from(reader.position())?])
}
