//! Immutable inputs to the registration and authentication validators.

use chrono::{DateTime, Utc};

use super::server_property::ServerProperty;
use crate::attestation::AttestationType;
use crate::codec::attestation_object::AttestationObject;
use crate::codec::authenticator_data::{Aaguid, AttestedCredentialData, AuthenticatorData};
use crate::codec::client_data::CollectedClientData;
use crate::codec::cose::CoseKey;
use crate::error::{Result, VerificationError};

/// Everything a registration ceremony presents for verification.
#[derive(Debug, Clone)]
pub struct RegistrationObject {
    pub attestation_object: AttestationObject,
    pub attestation_object_bytes: Vec<u8>,
    pub client_data: CollectedClientData,
    /// Client extension inputs the relying party requested.
    pub client_extensions: serde_json::Map<String, serde_json::Value>,
    pub server_property: ServerProperty,
    /// Evaluation time for certificate validity and freshness checks.
    pub timestamp: DateTime<Utc>,
}

impl RegistrationObject {
    /// Assemble from an already-decoded client data, so callers can check it
    /// before touching the attestation object.
    pub fn from_parts(
        client_data: CollectedClientData,
        attestation_object: &[u8],
        server_property: ServerProperty,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            attestation_object: AttestationObject::decode(attestation_object)?,
            attestation_object_bytes: attestation_object.to_vec(),
            client_data,
            client_extensions: serde_json::Map::new(),
            server_property,
            timestamp,
        })
    }

    pub fn with_client_extensions(
        mut self,
        extensions: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.client_extensions = extensions;
        self
    }

    pub fn auth_data(&self) -> &AuthenticatorData {
        &self.attestation_object.auth_data
    }

    pub fn auth_data_bytes(&self) -> &[u8] {
        &self.attestation_object.auth_data_bytes
    }

    pub fn client_data_hash(&self) -> &[u8; 32] {
        &self.client_data.hash
    }

    pub fn attested_credential_data(&self) -> Result<&AttestedCredentialData> {
        self.auth_data()
            .attested_credential_data
            .as_ref()
            .ok_or_else(|| VerificationError::decode("attested credential data is missing"))
    }

    /// `authData || clientDataHash`, the payload most formats sign.
    pub fn signed_data(&self) -> Vec<u8> {
        crate::crypto::concat(&[self.auth_data_bytes(), self.client_data_hash()])
    }
}

/// A registered credential as the relying party stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticator {
    pub credential_id: Vec<u8>,
    pub aaguid: Aaguid,
    pub public_key: CoseKey,
    pub counter: u32,
    pub attestation_type: AttestationType,
}

/// Everything an authentication ceremony presents for verification.
#[derive(Debug, Clone)]
pub struct AuthenticationObject {
    pub credential_id: Vec<u8>,
    pub auth_data: AuthenticatorData,
    pub auth_data_bytes: Vec<u8>,
    pub client_data: CollectedClientData,
    pub signature: Vec<u8>,
    pub server_property: ServerProperty,
    pub authenticator: Authenticator,
    pub timestamp: DateTime<Utc>,
}

impl AuthenticationObject {
    /// Client data arrives already decoded and checked; only the
    /// authenticator data is decoded here.
    pub fn from_parts(
        credential_id: &[u8],
        authenticator_data: &[u8],
        client_data: CollectedClientData,
        signature: &[u8],
        server_property: ServerProperty,
        authenticator: Authenticator,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            credential_id: credential_id.to_vec(),
            auth_data: AuthenticatorData::decode(authenticator_data)?,
            auth_data_bytes: authenticator_data.to_vec(),
            client_data,
            signature: signature.to_vec(),
            server_property,
            authenticator,
            timestamp,
        })
    }
}
