//! COSE_Key codec (RFC 9052 §7) for the three key types WebAuthn uses.

use std::fmt;

use ciborium::value::{Integer, Value};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Public};
use openssl::rsa::Rsa;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VerificationError};

const LABEL_KTY: i64 = 1;
const LABEL_KID: i64 = 2;
const LABEL_ALG: i64 = 3;
const LABEL_CRV_OR_N: i64 = -1;
const LABEL_X_OR_E: i64 = -2;
const LABEL_Y: i64 = -3;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

/// COSE signature algorithms accepted for credentials and attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum CoseAlgorithm {
    ES256,
    ES384,
    ES512,
    EdDSA,
    PS256,
    PS384,
    PS512,
    RS256,
    RS384,
    RS512,
    RS1,
}

impl CoseAlgorithm {
    pub fn id(self) -> i64 {
        match self {
            Self::ES256 => -7,
            Self::ES384 => -35,
            Self::ES512 => -36,
            Self::EdDSA => -8,
            Self::PS256 => -37,
            Self::PS384 => -38,
            Self::PS512 => -39,
            Self::RS256 => -257,
            Self::RS384 => -258,
            Self::RS512 => -259,
            Self::RS1 => -65535,
        }
    }

    pub fn from_id(id: i64) -> Result<Self> {
        Ok(match id {
            -7 => Self::ES256,
            -35 => Self::ES384,
            -36 => Self::ES512,
            -8 => Self::EdDSA,
            -37 => Self::PS256,
            -38 => Self::PS384,
            -39 => Self::PS512,
            -257 => Self::RS256,
            -258 => Self::RS384,
            -259 => Self::RS512,
            -65535 => Self::RS1,
            other => {
                return Err(VerificationError::UnsupportedAlgorithm(format!(
                    "COSE algorithm {other}"
                )))
            }
        })
    }

    /// Hash function paired with the algorithm; `None` for EdDSA, which hashes internally.
    pub fn digest(self) -> Option<MessageDigest> {
        match self {
            Self::ES256 | Self::PS256 | Self::RS256 => Some(MessageDigest::sha256()),
            Self::ES384 | Self::PS384 | Self::RS384 => Some(MessageDigest::sha384()),
            Self::ES512 | Self::PS512 | Self::RS512 => Some(MessageDigest::sha512()),
            Self::RS1 => Some(MessageDigest::sha1()),
            Self::EdDSA => None,
        }
    }

    pub fn key_type(self) -> KeyType {
        match self {
            Self::ES256 | Self::ES384 | Self::ES512 => KeyType::Ec2,
            Self::EdDSA => KeyType::Okp,
            _ => KeyType::Rsa,
        }
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = VerificationError;

    fn try_from(id: i64) -> Result<Self> {
        Self::from_id(id)
    }
}

impl From<CoseAlgorithm> for i64 {
    fn from(alg: CoseAlgorithm) -> Self {
        alg.id()
    }
}

impl fmt::Display for CoseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Okp,
    Ec2,
    Rsa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
    P521,
}

impl EcCurve {
    fn from_id(id: i64) -> Result<Self> {
        match id {
            1 => Ok(Self::P256),
            2 => Ok(Self::P384),
            3 => Ok(Self::P521),
            other => Err(VerificationError::UnsupportedAlgorithm(format!(
                "EC2 curve {other}"
            ))),
        }
    }

    fn id(self) -> i64 {
        match self {
            Self::P256 => 1,
            Self::P384 => 2,
            Self::P521 => 3,
        }
    }

    pub fn nid(self) -> Nid {
        match self {
            Self::P256 => Nid::X9_62_PRIME256V1,
            Self::P384 => Nid::SECP384R1,
            Self::P521 => Nid::SECP521R1,
        }
    }

    pub fn from_nid(nid: Nid) -> Option<Self> {
        match nid {
            Nid::X9_62_PRIME256V1 => Some(Self::P256),
            Nid::SECP384R1 => Some(Self::P384),
            Nid::SECP521R1 => Some(Self::P521),
            _ => None,
        }
    }

    /// Coordinate length in bytes.
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ec2Key {
    pub alg: Option<CoseAlgorithm>,
    pub kid: Option<Vec<u8>>,
    pub curve: EcCurve,
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKey {
    pub alg: Option<CoseAlgorithm>,
    pub kid: Option<Vec<u8>>,
    pub n: Vec<u8>,
    pub e: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OkpKey {
    pub alg: Option<CoseAlgorithm>,
    pub kid: Option<Vec<u8>>,
    /// Only Ed25519 (crv 6) is accepted.
    pub x: Vec<u8>,
}

const OKP_CRV_ED25519: i64 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Ec2(Ec2Key),
    Rsa(RsaKey),
    Okp(OkpKey),
}

impl CoseKey {
    pub fn alg(&self) -> Option<CoseAlgorithm> {
        match self {
            Self::Ec2(k) => k.alg,
            Self::Rsa(k) => k.alg,
            Self::Okp(k) => k.alg,
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Ec2(_) => KeyType::Ec2,
            Self::Rsa(_) => KeyType::Rsa,
            Self::Okp(_) => KeyType::Okp,
        }
    }

    /// Decode from raw CBOR bytes; the whole input must be a single map.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let value: Value = ciborium::de::from_reader(&mut reader)
            .map_err(|e| VerificationError::decode(format!("COSE key: {e}")))?;
        if !reader.is_empty() {
            return Err(VerificationError::decode("COSE key: trailing bytes"));
        }
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| VerificationError::decode("COSE key is not a CBOR map"))?;
        let fields = Fields { map };

        // kty decides how the remaining labels are interpreted.
        let kty = fields
            .int(LABEL_KTY)?
            .ok_or_else(|| VerificationError::decode("COSE key: missing kty"))?;
        let kid = fields.bytes(LABEL_KID)?;
        let alg = fields.int(LABEL_ALG)?.map(CoseAlgorithm::from_id).transpose()?;

        match kty {
            KTY_EC2 => {
                let curve = EcCurve::from_id(fields.required_int(LABEL_CRV_OR_N, "crv")?)?;
                let x = fields.required_bytes(LABEL_X_OR_E, "x")?;
                let y = fields.required_bytes(LABEL_Y, "y")?;
                if x.len() != curve.coordinate_len() || y.len() != curve.coordinate_len() {
                    return Err(VerificationError::decode(
                        "COSE key: EC2 coordinate length does not match curve",
                    ));
                }
                Ok(Self::Ec2(Ec2Key {
                    alg,
                    kid,
                    curve,
                    x,
                    y,
                }))
            }
            KTY_RSA => Ok(Self::Rsa(RsaKey {
                alg,
                kid,
                n: fields.required_bytes(LABEL_CRV_OR_N, "n")?,
                e: fields.required_bytes(LABEL_X_OR_E, "e")?,
            })),
            KTY_OKP => {
                let crv = fields.required_int(LABEL_CRV_OR_N, "crv")?;
                if crv != OKP_CRV_ED25519 {
                    return Err(VerificationError::UnsupportedAlgorithm(format!(
                        "OKP curve {crv}"
                    )));
                }
                let x = fields.required_bytes(LABEL_X_OR_E, "x")?;
                if x.len() != 32 {
                    return Err(VerificationError::decode("COSE key: Ed25519 key must be 32 bytes"));
                }
                Ok(Self::Okp(OkpKey { alg, kid, x }))
            }
            other => Err(VerificationError::decode(format!(
                "COSE key: unknown kty {other}"
            ))),
        }
    }

    /// Canonical CTAP2 map: labels in the order 1, 2, 3, -1, -2, -3.
    pub fn to_value(&self) -> Value {
        let mut entries: Vec<(Value, Value)> = Vec::with_capacity(6);
        let (kty, alg, kid) = match self {
            Self::Ec2(k) => (KTY_EC2, k.alg, &k.kid),
            Self::Rsa(k) => (KTY_RSA, k.alg, &k.kid),
            Self::Okp(k) => (KTY_OKP, k.alg, &k.kid),
        };
        entries.push((int(LABEL_KTY), int(kty)));
        if let Some(kid) = kid {
            entries.push((int(LABEL_KID), Value::Bytes(kid.clone())));
        }
        if let Some(alg) = alg {
            entries.push((int(LABEL_ALG), int(alg.id())));
        }
        match self {
            Self::Ec2(k) => {
                entries.push((int(LABEL_CRV_OR_N), int(k.curve.id())));
                entries.push((int(LABEL_X_OR_E), Value::Bytes(k.x.clone())));
                entries.push((int(LABEL_Y), Value::Bytes(k.y.clone())));
            }
            Self::Rsa(k) => {
                entries.push((int(LABEL_CRV_OR_N), Value::Bytes(k.n.clone())));
                entries.push((int(LABEL_X_OR_E), Value::Bytes(k.e.clone())));
            }
            Self::Okp(k) => {
                entries.push((int(LABEL_CRV_OR_N), int(OKP_CRV_ED25519)));
                entries.push((int(LABEL_X_OR_E), Value::Bytes(k.x.clone())));
            }
        }
        Value::Map(entries)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(&self.to_value(), &mut out)
            .map_err(|e| VerificationError::decode(format!("COSE key encode: {e}")))?;
        Ok(out)
    }

    /// Materialize the key for signature verification.
    pub fn to_pkey(&self) -> Result<PKey<Public>> {
        match self {
            Self::Ec2(k) => {
                let group = EcGroup::from_curve_name(k.curve.nid())?;
                let x = BigNum::from_slice(&k.x)?;
                let y = BigNum::from_slice(&k.y)?;
                let ec = EcKey::from_public_key_affine_coordinates(&group, &x, &y)
                    .map_err(|e| VerificationError::decode(format!("EC point not on curve: {e}")))?;
                Ok(PKey::from_ec_key(ec)?)
            }
            Self::Rsa(k) => {
                let rsa =
                    Rsa::from_public_components(BigNum::from_slice(&k.n)?, BigNum::from_slice(&k.e)?)?;
                Ok(PKey::from_rsa(rsa)?)
            }
            Self::Okp(k) => Ok(PKey::public_key_from_raw_bytes(&k.x, Id::ED25519)?),
        }
    }

    /// Compare the key material only, ignoring `alg` and `kid`.
    pub fn same_public_key(&self, other: &CoseKey) -> bool {
        match (self, other) {
            (Self::Ec2(a), Self::Ec2(b)) => a.curve == b.curve && a.x == b.x && a.y == b.y,
            (Self::Rsa(a), Self::Rsa(b)) => strip_zeros(&a.n) == strip_zeros(&b.n)
                && strip_zeros(&a.e) == strip_zeros(&b.e),
            (Self::Okp(a), Self::Okp(b)) => a.x == b.x,
            _ => false,
        }
    }
}

fn strip_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn int(v: i64) -> Value {
    Value::Integer(Integer::from(v))
}

struct Fields<'a> {
    map: &'a [(Value, Value)],
}

impl Fields<'_> {
    fn get(&self, label: i64) -> Option<&Value> {
        self.map.iter().find_map(|(k, v)| match k {
            Value::Integer(i) if i128::from(*i) == i128::from(label) => Some(v),
            _ => None,
        })
    }

    fn int(&self, label: i64) -> Result<Option<i64>> {
        match self.get(label) {
            None => Ok(None),
            Some(Value::Integer(i)) => i64::try_from(i128::from(*i))
                .map(Some)
                .map_err(|_| VerificationError::decode(format!("COSE key: label {label} out of range"))),
            Some(_) => Err(VerificationError::decode(format!(
                "COSE key: label {label} is not an integer"
            ))),
        }
    }

    fn bytes(&self, label: i64) -> Result<Option<Vec<u8>>> {
        match self.get(label) {
            None => Ok(None),
            Some(Value::Bytes(b)) => Ok(Some(b.clone())),
            Some(_) => Err(VerificationError::decode(format!(
                "COSE key: label {label} is not a byte string"
            ))),
        }
    }

    fn required_int(&self, label: i64, name: &str) -> Result<i64> {
        self.int(label)?
            .ok_or_else(|| VerificationError::decode(format!("COSE key: missing {name}")))
    }

    fn required_bytes(&self, label: i64, name: &str) -> Result<Vec<u8>> {
        self.bytes(label)?
            .ok_or_else(|| VerificationError::decode(format!("COSE key: missing {name}")))
    }
}
