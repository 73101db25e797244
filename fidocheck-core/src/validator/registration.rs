use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::objects::{Authenticator, RegistrationObject};
use super::server_property::ServerProperty;
use super::{verify_auth_data, verify_client_data};
use crate::attestation::{AttestationType, AttestationVerifier};
use crate::codec::client_data::{CollectedClientData, TYPE_CREATE};
use crate::config::VerifierConfig;
use crate::error::{Result, VerificationError};
use crate::trust::TrustworthinessVerifier;

/// Raw payloads of a `navigator.credentials.create()` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    #[serde(with = "crate::serde_b64url")]
    pub attestation_object: Vec<u8>,
    #[serde(rename = "clientDataJSON", with = "crate::serde_b64url")]
    pub client_data_json: Vec<u8>,
    /// Client extension inputs the relying party passed to `create()`.
    #[serde(default)]
    pub client_extensions: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct RegistrationResult {
    pub attestation_type: AttestationType,
    pub authenticator: Authenticator,
}

/// Validates registration ceremonies.
pub struct RegistrationValidator {
    config: VerifierConfig,
    attestation: AttestationVerifier,
    trust: TrustworthinessVerifier,
}

impl RegistrationValidator {
    pub fn new(
        config: VerifierConfig,
        attestation: AttestationVerifier,
        trust: TrustworthinessVerifier,
    ) -> Self {
        Self {
            config,
            attestation,
            trust,
        }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Client data is checked before the attestation object is decoded, so a
    /// wrong origin is reported even when the attestation object is garbage.
    #[instrument(skip_all, fields(rp_id = %server_property.rp_id))]
    pub async fn validate(
        &self,
        request: &RegistrationRequest,
        server_property: &ServerProperty,
        timestamp: DateTime<Utc>,
    ) -> Result<RegistrationResult> {
        let client_data = CollectedClientData::decode(&request.client_data_json)?;
        verify_client_data(&client_data, TYPE_CREATE, server_property, &self.config)?;

        let registration = RegistrationObject::from_parts(
            client_data,
            &request.attestation_object,
            server_property.clone(),
            timestamp,
        )?
        .with_client_extensions(request.client_extensions.clone());

        verify_auth_data(registration.auth_data(), server_property, &self.config)?;

        let auth_data = registration.auth_data();
        if !auth_data.flags.has_attested_credential_data() {
            return Err(VerificationError::decode("AT flag is not set"));
        }
        let credential = registration.attested_credential_data()?;

        if !self.config.allowed_algorithms.is_empty() {
            let alg = credential.credential_public_key.alg();
            if !alg.is_some_and(|a| self.config.allowed_algorithms.contains(&a)) {
                return Err(VerificationError::BadAlgorithm(format!(
                    "credential algorithm {:?} is not allowed",
                    alg.map(|a| a.id())
                )));
            }
        }

        self.log_unrequested_extensions(&registration);

        let attestation_type = self.attestation.verify(&registration)?;
        self.trust.verify(&registration, attestation_type).await?;

        let authenticator = Authenticator {
            credential_id: credential.credential_id.clone(),
            aaguid: credential.aaguid,
            public_key: credential.credential_public_key.clone(),
            counter: auth_data.sign_count,
            attestation_type,
        };
        info!(
            format = %registration.attestation_object.format(),
            %attestation_type,
            aaguid = %authenticator.aaguid,
            "registration verified"
        );
        Ok(RegistrationResult {
            attestation_type,
            authenticator,
        })
    }

    fn log_unrequested_extensions(&self, registration: &RegistrationObject) {
        let requested: HashSet<&str> = registration
            .client_extensions
            .keys()
            .map(String::as_str)
            .collect();
        for id in registration.auth_data().extension_ids() {
            if !requested.contains(id.as_str()) {
                warn!(extension = %id, "authenticator returned an extension that was not requested");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::authenticator_data::{Aaguid, AuthenticatorFlags};
    use crate::codec::client_data::{TokenBinding, TokenBindingStatus};
    use crate::codec::cose::CoseAlgorithm;
    use crate::test_support::{fixtures, p256_keypair};
    use crate::trust::{CertificateBundleTrustAnchorRepository, TrustworthinessVerifier};
    use std::sync::Arc;

    const ORIGIN: &str = "https://example.com";
    const RP_ID: &str = "example.com";

    fn validator(config: VerifierConfig) -> RegistrationValidator {
        let trust = TrustworthinessVerifier::from_config(
            &config,
            Arc::new(CertificateBundleTrustAnchorRepository::default()),
        );
        RegistrationValidator::new(config.clone(), AttestationVerifier::with_defaults(&config), trust)
    }

    fn server_property() -> ServerProperty {
        ServerProperty::new(ORIGIN, RP_ID, b"registration-challenge".to_vec())
    }

    fn none_request(flags: u8) -> RegistrationRequest {
        let (_, cose) = p256_keypair();
        let auth_data = fixtures::auth_data(RP_ID, flags, 0, Some((Aaguid::ZERO, vec![7; 16], cose)));
        RegistrationRequest {
            attestation_object: fixtures::none_attestation_object(&auth_data),
            client_data_json: fixtures::client_data(TYPE_CREATE, b"registration-challenge", ORIGIN),
            client_extensions: Default::default(),
        }
    }

    const UP_AT: u8 = AuthenticatorFlags::USER_PRESENT | AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA;

    #[tokio::test]
    async fn test_none_attestation_registers() {
        let result = validator(VerifierConfig::default())
            .validate(&none_request(UP_AT), &server_property(), Utc::now())
            .await
            .unwrap();
        assert_eq!(result.attestation_type, AttestationType::None);
        assert_eq!(result.authenticator.credential_id, vec![7; 16]);
    }

    #[tokio::test]
    async fn test_wrong_type_rejected() {
        let mut request = none_request(UP_AT);
        request.client_data_json = fixtures::client_data("webauthn.get", b"registration-challenge", ORIGIN);
        let err = validator(VerifierConfig::default())
            .validate(&request, &server_property(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::BadClientDataType(_)));
    }

    #[tokio::test]
    async fn test_bad_origin_detected_before_attestation_object() {
        let request = RegistrationRequest {
            attestation_object: b"definitely not cbor".to_vec(),
            client_data_json: fixtures::client_data(TYPE_CREATE, b"registration-challenge", "https://evil.example"),
            client_extensions: Default::default(),
        };
        let err = validator(VerifierConfig::default())
            .validate(&request, &server_property(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::BadOrigin(_)));
    }

    #[tokio::test]
    async fn test_challenge_mismatch() {
        let mut request = none_request(UP_AT);
        request.client_data_json = fixtures::client_data(TYPE_CREATE, b"other", ORIGIN);
        let err = validator(VerifierConfig::default())
            .validate(&request, &server_property(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::BadChallenge));
    }

    #[tokio::test]
    async fn test_token_binding_present_not_implemented() {
        let mut request = none_request(UP_AT);
        request.client_data_json = CollectedClientData::to_json(
            TYPE_CREATE,
            b"registration-challenge",
            ORIGIN,
            Some(TokenBinding {
                status: TokenBindingStatus::Present,
                id: Some("abc".into()),
            }),
        )
        .unwrap();
        let err = validator(VerifierConfig::default())
            .validate(&request, &server_property(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::NotImplemented(_)));
    }

    #[tokio::test]
    async fn test_user_presence_and_verification_flags() {
        let err = validator(VerifierConfig::default())
            .validate(
                &none_request(AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA),
                &server_property(),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::UserNotPresent));

        let config = VerifierConfig {
            user_verification_required: true,
            ..Default::default()
        };
        let err = validator(config)
            .validate(&none_request(UP_AT), &server_property(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::UserNotVerified));
    }

    #[tokio::test]
    async fn test_cross_origin_denied_unless_allowed() {
        let mut request = none_request(UP_AT);
        request.client_data_json =
            fixtures::cross_origin_client_data(TYPE_CREATE, b"registration-challenge", ORIGIN);
        let err = validator(VerifierConfig::default())
            .validate(&request, &server_property(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::CrossOrigin));

        let config = VerifierConfig {
            cross_origin_allowed: true,
            ..Default::default()
        };
        let result = validator(config)
            .validate(&request, &server_property(), Utc::now())
            .await
            .unwrap();
        assert_eq!(result.attestation_type, AttestationType::None);
    }

    #[tokio::test]
    async fn test_backup_state_without_eligibility_rejected() {
        let err = validator(VerifierConfig::default())
            .validate(
                &none_request(UP_AT | AuthenticatorFlags::BACKUP_STATE),
                &server_property(),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::BadBackupFlags));

        let flags = UP_AT | AuthenticatorFlags::BACKUP_ELIGIBLE | AuthenticatorFlags::BACKUP_STATE;
        let result = validator(VerifierConfig::default())
            .validate(&none_request(flags), &server_property(), Utc::now())
            .await
            .unwrap();
        assert_eq!(result.authenticator.credential_id.len(), 16);
    }

    #[tokio::test]
    async fn test_rp_id_mismatch() {
        let sp = ServerProperty::new(ORIGIN, "other.example", b"registration-challenge".to_vec());
        let err = validator(VerifierConfig::default())
            .validate(&none_request(UP_AT), &sp, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::BadRpId));
    }

    #[tokio::test]
    async fn test_algorithm_allow_list() {
        let config = VerifierConfig {
            allowed_algorithms: vec![CoseAlgorithm::RS256],
            ..Default::default()
        };
        let err = validator(config)
            .validate(&none_request(UP_AT), &server_property(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::BadAlgorithm(_)));
    }

    #[test]
    fn test_request_json_uses_webauthn_names() {
        let request = none_request(UP_AT);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("clientDataJSON").is_some());
        assert!(json.get("attestationObject").is_some());
        let back: RegistrationRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.client_data_json, request.client_data_json);
    }
}
