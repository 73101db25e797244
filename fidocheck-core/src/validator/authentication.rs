use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::objects::{AuthenticationObject, Authenticator};
use super::server_property::ServerProperty;
use super::{verify_auth_data, verify_client_data};
use crate::codec::client_data::{CollectedClientData, TYPE_GET};
use crate::codec::cose::{CoseAlgorithm, CoseKey, EcCurve};
use crate::config::VerifierConfig;
use crate::crypto;
use crate::error::{Result, VerificationError};

/// Raw payloads of a `navigator.credentials.get()` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRequest {
    #[serde(with = "crate::serde_b64url")]
    pub credential_id: Vec<u8>,
    #[serde(with = "crate::serde_b64url")]
    pub authenticator_data: Vec<u8>,
    #[serde(rename = "clientDataJSON", with = "crate::serde_b64url")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "crate::serde_b64url")]
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticationResult {
    /// Counter the caller should persist for the credential.
    pub new_counter: u32,
    pub user_verified: bool,
    pub backup_state: bool,
}

/// Decides what happens when the signature counter did not advance.
pub trait MaliciousCounterValueHandler: Send + Sync {
    fn handle(&self, presented: u32, stored: u32) -> Result<()>;
}

/// Treats a non-increasing counter as a cloned authenticator.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMaliciousCounterValueHandler;

impl MaliciousCounterValueHandler for DefaultMaliciousCounterValueHandler {
    fn handle(&self, presented: u32, stored: u32) -> Result<()> {
        Err(VerificationError::MaliciousCounterValue { presented, stored })
    }
}

/// Validates authentication ceremonies.
pub struct AuthenticationValidator {
    config: VerifierConfig,
    counter_handler: Arc<dyn MaliciousCounterValueHandler>,
}

impl AuthenticationValidator {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            counter_handler: Arc::new(DefaultMaliciousCounterValueHandler),
        }
    }

    pub fn with_counter_handler(mut self, handler: Arc<dyn MaliciousCounterValueHandler>) -> Self {
        self.counter_handler = handler;
        self
    }

    #[instrument(skip_all, fields(rp_id = %server_property.rp_id))]
    pub fn validate(
        &self,
        request: &AuthenticationRequest,
        server_property: &ServerProperty,
        authenticator: &Authenticator,
        timestamp: DateTime<Utc>,
    ) -> Result<AuthenticationResult> {
        if request.credential_id != authenticator.credential_id {
            return Err(VerificationError::MissingCredential);
        }

        let client_data = CollectedClientData::decode(&request.client_data_json)?;
        verify_client_data(&client_data, TYPE_GET, server_property, &self.config)?;

        let object = AuthenticationObject::from_parts(
            &request.credential_id,
            &request.authenticator_data,
            client_data,
            &request.signature,
            server_property.clone(),
            authenticator.clone(),
            timestamp,
        )?;
        verify_auth_data(&object.auth_data, server_property, &self.config)?;

        let key = &object.authenticator.public_key;
        let alg = signature_algorithm(key);
        let signed = crypto::concat(&[&object.auth_data_bytes, &object.client_data.hash]);
        let public_key = key.to_pkey()?;
        crypto::verify_signature(alg, &public_key, &signed, &object.signature)?;

        let new_counter = self.check_counter(object.auth_data.sign_count, authenticator.counter)?;

        info!(new_counter, "assertion verified");
        Ok(AuthenticationResult {
            new_counter,
            user_verified: object.auth_data.flags.user_verified(),
            backup_state: object.auth_data.flags.backup_state(),
        })
    }

    fn check_counter(&self, presented: u32, stored: u32) -> Result<u32> {
        if (presented > 0 || stored > 0) && presented <= stored {
            warn!(presented, stored, "signature counter did not increase");
            self.counter_handler.handle(presented, stored)?;
            return Ok(stored);
        }
        Ok(presented)
    }
}

/// The key's declared algorithm, or the usual one for its type.
fn signature_algorithm(key: &CoseKey) -> CoseAlgorithm {
    if let Some(alg) = key.alg() {
        return alg;
    }
    match key {
        CoseKey::Ec2(k) => match k.curve {
            EcCurve::P256 => CoseAlgorithm::ES256,
            EcCurve::P384 => CoseAlgorithm::ES384,
            EcCurve::P521 => CoseAlgorithm::ES512,
        },
        CoseKey::Rsa(_) => CoseAlgorithm::RS256,
        CoseKey::Okp(_) => CoseAlgorithm::EdDSA,
    }
}
