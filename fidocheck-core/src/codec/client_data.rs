//! CollectedClientData (WebAuthn §5.8.1).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{Result, VerificationError};

pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBindingStatus {
    Present,
    Supported,
    #[serde(other)]
    NotSupported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    pub status: TokenBindingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClientData {
    #[serde(rename = "type")]
    ty: String,
    challenge: String,
    origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cross_origin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_binding: Option<TokenBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedClientData {
    pub ty: String,
    pub challenge: Vec<u8>,
    pub origin: String,
    pub cross_origin: Option<bool>,
    pub token_binding: Option<TokenBinding>,
    /// The exact JSON the browser produced; signatures cover its hash.
    pub raw: Vec<u8>,
    pub hash: [u8; 32],
}

impl CollectedClientData {
    pub fn decode(json: &[u8]) -> Result<Self> {
        let raw: RawClientData = serde_json::from_slice(json)
            .map_err(|e| VerificationError::decode(format!("client data JSON: {e}")))?;
        let challenge = URL_SAFE_NO_PAD
            .decode(raw.challenge.trim_end_matches('='))
            .map_err(|e| VerificationError::decode(format!("client data challenge: {e}")))?;
        Ok(Self {
            ty: raw.ty,
            challenge,
            origin: raw.origin,
            cross_origin: raw.cross_origin,
            token_binding: raw.token_binding,
            raw: json.to_vec(),
            hash: crypto::sha256(json),
        })
    }

    /// Serialize a client data JSON document; used by tooling and test fixtures.
    pub fn to_json(
        ty: &str,
        challenge: &[u8],
        origin: &str,
        token_binding: Option<TokenBinding>,
    ) -> Result<Vec<u8>> {
        let raw = RawClientData {
            ty: ty.to_string(),
            challenge: URL_SAFE_NO_PAD.encode(challenge),
            origin: origin.to_string(),
            cross_origin: None,
            token_binding,
        };
        serde_json::to_vec(&raw)
            .map_err(|e| VerificationError::decode(format!("client data JSON: {e}")))
    }
}
