//! Compact JWS carrying an `x5c` header, as used by SafetyNet responses and
//! the FIDO MDS3 BLOB.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use jsonwebtoken::Algorithm;
use serde::de::DeserializeOwned;

use super::cose::CoseAlgorithm;
use crate::cert::AttestationCertificate;
use crate::crypto;
use crate::error::{Result, VerificationError};

#[derive(Debug, Clone)]
pub struct Jws<T> {
    pub alg: CoseAlgorithm,
    /// `x5c` certificates, leaf first, DER.
    pub x5c: Vec<Vec<u8>>,
    pub payload: T,
    signing_input: String,
    signature: Vec<u8>,
}

fn map_algorithm(alg: Algorithm) -> Result<CoseAlgorithm> {
    Ok(match alg {
        Algorithm::ES256 => CoseAlgorithm::ES256,
        Algorithm::ES384 => CoseAlgorithm::ES384,
        Algorithm::RS256 => CoseAlgorithm::RS256,
        Algorithm::RS384 => CoseAlgorithm::RS384,
        Algorithm::RS512 => CoseAlgorithm::RS512,
        Algorithm::PS256 => CoseAlgorithm::PS256,
        Algorithm::PS384 => CoseAlgorithm::PS384,
        Algorithm::PS512 => CoseAlgorithm::PS512,
        Algorithm::EdDSA => CoseAlgorithm::EdDSA,
        other => {
            return Err(VerificationError::UnsupportedAlgorithm(format!(
                "JWS algorithm {other:?}"
            )))
        }
    })
}

impl<T: DeserializeOwned> Jws<T> {
    pub fn parse(compact: &str) -> Result<Self> {
        let compact = compact.trim();
        let mut parts = compact.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(VerificationError::decode("JWS must have three segments"));
        };

        let header = jsonwebtoken::decode_header(compact)
            .map_err(|e| VerificationError::decode(format!("JWS header: {e}")))?;
        let alg = map_algorithm(header.alg)?;
        let x5c = header
            .x5c
            .unwrap_or_default()
            .iter()
            .map(|c| STANDARD.decode(c))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VerificationError::decode(format!("JWS x5c: {e}")))?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| VerificationError::decode(format!("JWS payload encoding: {e}")))?;
        let payload = serde_json::from_slice(&payload_json)
            .map_err(|e| VerificationError::decode(format!("JWS payload: {e}")))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| VerificationError::decode(format!("JWS signature encoding: {e}")))?;

        Ok(Self {
            alg,
            x5c,
            payload,
            signing_input: format!("{header_b64}.{payload_b64}"),
            signature,
        })
    }
}

impl<T> Jws<T> {
    pub fn certificates(&self) -> Result<Vec<AttestationCertificate>> {
        AttestationCertificate::chain_from_der(&self.x5c)
    }

    /// Verify the JWS signature with the `x5c` leaf.
    pub fn verify_signature(&self) -> Result<()> {
        let leaf = self
            .x5c
            .first()
            .ok_or_else(|| VerificationError::bad_statement("JWS has no x5c certificate"))?;
        let key = AttestationCertificate::from_der(leaf)?.public_key()?;
        let signature = match self.alg.key_type() {
            crate::codec::cose::KeyType::Ec2 => crypto::ecdsa_raw_to_der(&self.signature)?,
            _ => self.signature.clone(),
        };
        crypto::verify_signature(self.alg, &key, self.signing_input.as_bytes(), &signature)
    }
}

/// Build a compact JWS signed with `key`; the inverse of [`Jws::parse`].
/// Used by tooling that republishes metadata and by tests.
pub fn sign_compact<P: serde::Serialize>(
    payload: &P,
    x5c: &[Vec<u8>],
    alg: CoseAlgorithm,
    key: &openssl::pkey::PKeyRef<openssl::pkey::Private>,
) -> Result<String> {
    let (name, md) = match alg {
        CoseAlgorithm::ES256 => ("ES256", openssl::hash::MessageDigest::sha256()),
        CoseAlgorithm::RS256 => ("RS256", openssl::hash::MessageDigest::sha256()),
        other => {
            return Err(VerificationError::UnsupportedAlgorithm(format!(
                "JWS signing with {other}"
            )))
        }
    };
    let header = serde_json::json!({
        "alg": name,
        "typ": "JWT",
        "x5c": x5c.iter().map(|c| STANDARD.encode(c)).collect::<Vec<_>>(),
    });
    let encode = |v: &serde_json::Value| -> Result<String> {
        serde_json::to_vec(v)
            .map(|b| URL_SAFE_NO_PAD.encode(b))
            .map_err(|e| VerificationError::decode(format!("JWS encode: {e}")))
    };
    let payload = serde_json::to_value(payload)
        .map_err(|e| VerificationError::decode(format!("JWS encode: {e}")))?;
    let signing_input = format!("{}.{}", encode(&header)?, encode(&payload)?);

    let mut signer = openssl::sign::Signer::new(md, key)?;
    signer.update(signing_input.as_bytes())?;
    let der = signer.sign_to_vec()?;
    let signature = if alg == CoseAlgorithm::ES256 {
        let sig = openssl::ecdsa::EcdsaSig::from_der(&der)?;
        let mut raw = sig.r().to_vec_padded(32)?;
        raw.extend(sig.s().to_vec_padded(32)?);
        raw
    } else {
        der
    };
    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}
