//! Authenticator data (WebAuthn §6.1) and attested credential data.

use std::fmt;
use std::str::FromStr;

use ciborium::value::Value;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::cose::CoseKey;
use crate::error::{Result, VerificationError};

const RP_ID_HASH_LEN: usize = 32;
const FIXED_LEN: usize = RP_ID_HASH_LEN + 1 + 4;
const AAGUID_LEN: usize = 16;

/// Authenticator Attestation GUID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Aaguid(pub [u8; AAGUID_LEN]);

impl Aaguid {
    pub const ZERO: Aaguid = Aaguid([0; AAGUID_LEN]);

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; AAGUID_LEN] = bytes
            .try_into()
            .map_err(|_| VerificationError::decode(format!("AAGUID must be 16 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; AAGUID_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; AAGUID_LEN] {
        &self.0
    }
}

impl fmt::Display for Aaguid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0))
    }
}

impl fmt::Debug for Aaguid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aaguid({self})")
    }
}

impl FromStr for Aaguid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(*Uuid::parse_str(s)?.as_bytes()))
    }
}

impl Serialize for Aaguid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Aaguid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Flags byte of the authenticator data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthenticatorFlags(pub u8);

impl AuthenticatorFlags {
    pub const USER_PRESENT: u8 = 0x01;
    pub const USER_VERIFIED: u8 = 0x04;
    pub const BACKUP_ELIGIBLE: u8 = 0x08;
    pub const BACKUP_STATE: u8 = 0x10;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
    pub const EXTENSION_DATA: u8 = 0x80;

    pub fn user_present(self) -> bool {
        self.0 & Self::USER_PRESENT != 0
    }

    pub fn user_verified(self) -> bool {
        self.0 & Self::USER_VERIFIED != 0
    }

    pub fn backup_eligible(self) -> bool {
        self.0 & Self::BACKUP_ELIGIBLE != 0
    }

    pub fn backup_state(self) -> bool {
        self.0 & Self::BACKUP_STATE != 0
    }

    pub fn has_attested_credential_data(self) -> bool {
        self.0 & Self::ATTESTED_CREDENTIAL_DATA != 0
    }

    pub fn has_extensions(self) -> bool {
        self.0 & Self::EXTENSION_DATA != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: Aaguid,
    pub credential_id: Vec<u8>,
    pub credential_public_key: CoseKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; RP_ID_HASH_LEN],
    pub flags: AuthenticatorFlags,
    pub sign_count: u32,
    pub attested_credential_data: Option<AttestedCredentialData>,
    /// Authenticator extension outputs, always a CBOR map when present.
    pub extensions: Option<Value>,
}

impl AuthenticatorData {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FIXED_LEN {
            return Err(VerificationError::decode(format!(
                "authenticator data is {} bytes, need at least {FIXED_LEN}",
                bytes.len()
            )));
        }
        let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
        rp_id_hash.copy_from_slice(&bytes[..RP_ID_HASH_LEN]);
        let flags = AuthenticatorFlags(bytes[RP_ID_HASH_LEN]);
        let sign_count = u32::from_be_bytes([
            bytes[RP_ID_HASH_LEN + 1],
            bytes[RP_ID_HASH_LEN + 2],
            bytes[RP_ID_HASH_LEN + 3],
            bytes[RP_ID_HASH_LEN + 4],
        ]);

        let mut rest = &bytes[FIXED_LEN..];

        let attested_credential_data = if flags.has_attested_credential_data() {
            Some(decode_attested_credential_data(&mut rest)?)
        } else {
            None
        };

        let extensions = if flags.has_extensions() {
            if rest.is_empty() {
                return Err(VerificationError::decode(
                    "ED flag set but extension data is missing",
                ));
            }
            let value: Value = ciborium::de::from_reader(&mut rest)
                .map_err(|e| VerificationError::decode(format!("extension data: {e}")))?;
            if !value.is_map() {
                return Err(VerificationError::decode("extension data is not a CBOR map"));
            }
            Some(value)
        } else {
            None
        };

        if !rest.is_empty() {
            return Err(VerificationError::decode(format!(
                "{} trailing bytes after authenticator data",
                rest.len()
            )));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }

    /// Inverse of [`decode`](Self::decode). The flag bits for attested
    /// credential data and extensions must agree with the optional fields.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.flags.has_attested_credential_data() != self.attested_credential_data.is_some() {
            return Err(VerificationError::IllegalArgument(
                "AT flag disagrees with attested credential data".into(),
            ));
        }
        if self.flags.has_extensions() != self.extensions.is_some() {
            return Err(VerificationError::IllegalArgument(
                "ED flag disagrees with extension data".into(),
            ));
        }

        let mut out = Vec::with_capacity(FIXED_LEN + 128);
        out.extend_from_slice(&self.rp_id_hash);
        out.push(self.flags.0);
        out.extend_from_slice(&self.sign_count.to_be_bytes());

        if let Some(acd) = &self.attested_credential_data {
            let id_len = u16::try_from(acd.credential_id.len()).map_err(|_| {
                VerificationError::IllegalArgument("credential id longer than 65535 bytes".into())
            })?;
            out.extend_from_slice(acd.aaguid.as_bytes());
            out.extend_from_slice(&id_len.to_be_bytes());
            out.extend_from_slice(&acd.credential_id);
            out.extend(acd.credential_public_key.to_cbor()?);
        }
        if let Some(ext) = &self.extensions {
            ciborium::ser::into_writer(ext, &mut out)
                .map_err(|e| VerificationError::decode(format!("extension encode: {e}")))?;
        }
        Ok(out)
    }

    /// Identifiers of the authenticator extension outputs.
    pub fn extension_ids(&self) -> Vec<String> {
        self.extensions
            .as_ref()
            .and_then(Value::as_map)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, _)| k.as_text().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn decode_attested_credential_data(rest: &mut &[u8]) -> Result<AttestedCredentialData> {
    if rest.len() < AAGUID_LEN + 2 {
        return Err(VerificationError::decode(
            "AT flag set but attested credential data is truncated",
        ));
    }
    let aaguid = Aaguid::from_slice(&rest[..AAGUID_LEN])?;
    let id_len = usize::from(u16::from_be_bytes([rest[AAGUID_LEN], rest[AAGUID_LEN + 1]]));
    let id_start = AAGUID_LEN + 2;
    if rest.len() < id_start + id_len {
        return Err(VerificationError::decode(format!(
            "credential id length {id_len} exceeds remaining {} bytes",
            rest.len() - id_start
        )));
    }
    let credential_id = rest[id_start..id_start + id_len].to_vec();
    *rest = &rest[id_start + id_len..];

    if rest.is_empty() {
        return Err(VerificationError::decode("credential public key is missing"));
    }
    let value: Value = ciborium::de::from_reader(&mut *rest)
        .map_err(|e| VerificationError::decode(format!("credential public key: {e}")))?;
    let credential_public_key = CoseKey::from_value(&value)?;

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        credential_public_key,
    })
}
