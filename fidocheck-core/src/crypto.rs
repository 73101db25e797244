//! Digest and signature primitives over openssl.

use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::hash::{hash, MessageDigest};
use openssl::pkey::{Id, PKeyRef, Public};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Verifier};
use tracing::debug;

use crate::codec::cose::{CoseAlgorithm, EcCurve, KeyType};
use crate::error::{Result, VerificationError};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    openssl::sha::sha256(data)
}

pub fn sha1(data: &[u8]) -> [u8; 20] {
    openssl::sha::sha1(data)
}

pub fn digest(md: MessageDigest, data: &[u8]) -> Result<Vec<u8>> {
    Ok(hash(md, data)?.to_vec())
}

/// Concatenate byte slices; used to assemble signed payloads.
pub fn concat(parts: &[&[u8]]) -> Vec<u8> {
    parts.iter().flat_map(|p| p.iter().copied()).collect()
}

fn key_type_of(key: &PKeyRef<Public>) -> Option<KeyType> {
    match key.id() {
        Id::EC => Some(KeyType::Ec2),
        Id::RSA => Some(KeyType::Rsa),
        Id::ED25519 => Some(KeyType::Okp),
        _ => None,
    }
}

fn required_curve(alg: CoseAlgorithm) -> Option<EcCurve> {
    match alg {
        CoseAlgorithm::ES256 => Some(EcCurve::P256),
        CoseAlgorithm::ES384 => Some(EcCurve::P384),
        CoseAlgorithm::ES512 => Some(EcCurve::P521),
        _ => None,
    }
}

/// Verify `sig` over `data` with `key` under the COSE algorithm `alg`.
///
/// ECDSA signatures are expected in DER form, as WebAuthn transmits them.
/// A key that cannot carry `alg` is `BadAlgorithm`, including an EC key on
/// a curve other than the one `alg` names. A signature that does not verify
/// is `BadSignature`.
pub fn verify_signature(
    alg: CoseAlgorithm,
    key: &PKeyRef<Public>,
    data: &[u8],
    sig: &[u8],
) -> Result<()> {
    if key_type_of(key) != Some(alg.key_type()) {
        return Err(VerificationError::BadAlgorithm(format!(
            "{alg} cannot be used with key type {}",
            key.id().as_raw()
        )));
    }
    if let Some(required) = required_curve(alg) {
        let curve = key.ec_key()?.group().curve_name().and_then(EcCurve::from_nid);
        if curve != Some(required) {
            return Err(VerificationError::BadAlgorithm(format!(
                "{alg} requires curve {required:?}"
            )));
        }
    }

    let verified = match alg.digest() {
        None => {
            let mut verifier = Verifier::new_without_digest(key)?;
            verifier.verify_oneshot(sig, data).unwrap_or(false)
        }
        Some(md) => {
            let mut verifier = Verifier::new(md, key)?;
            if matches!(
                alg,
                CoseAlgorithm::PS256 | CoseAlgorithm::PS384 | CoseAlgorithm::PS512
            ) {
                verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
                verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
                verifier.set_rsa_mgf1_md(md)?;
            }
            verifier.update(data)?;
            // Malformed DER surfaces as an openssl error; both mean "does not verify".
            verifier.verify(sig).unwrap_or(false)
        }
    };

    if verified {
        Ok(())
    } else {
        debug!(alg = %alg, "signature did not verify");
        Err(VerificationError::bad_signature(format!(
            "{alg} signature does not verify"
        )))
    }
}

/// Convert a JOSE `r || s` ECDSA signature into DER.
pub fn ecdsa_raw_to_der(raw: &[u8]) -> Result<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(VerificationError::bad_signature(
            "raw ECDSA signature has odd length",
        ));
    }
    let (r, s) = raw.split_at(raw.len() / 2);
    let sig = EcdsaSig::from_private_components(BigNum::from_slice(r)?, BigNum::from_slice(s)?)?;
    Ok(sig.to_der()?)
}
