use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{format_mismatch, leaf_and_chain, AttestationStatementVerifier, AttestationType};
use crate::codec::attestation_object::{AttestationFormat, AttestationStatement};
use crate::codec::jws::Jws;
use crate::crypto;
use crate::error::{Result, VerificationError};
use crate::validator::RegistrationObject;

const ATTEST_HOSTNAME: &str = "attest.android.com";

/// SafetyNet attestation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyNetResponse {
    pub nonce: String,
    pub timestamp_ms: i64,
    pub apk_package_name: String,
    pub apk_certificate_digest_sha256: Vec<String>,
    pub apk_digest_sha256: String,
    pub cts_profile_match: bool,
    pub basic_integrity: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
}

/// `android-safetynet`: Google Play Services device attestation.
#[derive(Debug, Clone, Copy)]
pub struct AndroidSafetyNetVerifier {
    backward_threshold: Duration,
    forward_threshold: Duration,
}

impl Default for AndroidSafetyNetVerifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::ZERO)
    }
}

impl AndroidSafetyNetVerifier {
    /// `backward_threshold` bounds how old the response may be,
    /// `forward_threshold` how far ahead of the server clock it may be.
    pub fn new(backward_threshold: Duration, forward_threshold: Duration) -> Self {
        Self {
            backward_threshold,
            forward_threshold,
        }
    }

    fn check_freshness(&self, timestamp_ms: i64, now: DateTime<Utc>) -> Result<()> {
        let as_ms = |d: Duration| i64::try_from(d.as_millis()).unwrap_or(i64::MAX);
        let now_ms = now.timestamp_millis();
        let earliest = now_ms.saturating_sub(as_ms(self.backward_threshold));
        let latest = now_ms.saturating_add(as_ms(self.forward_threshold));
        if timestamp_ms < earliest || timestamp_ms > latest {
            return Err(VerificationError::bad_statement(format!(
                "SafetyNet response timestamp {timestamp_ms} is outside [{earliest}, {latest}]"
            )));
        }
        Ok(())
    }
}

impl AttestationStatementVerifier for AndroidSafetyNetVerifier {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::AndroidSafetyNet
    }

    fn verify(&self, registration: &RegistrationObject) -> Result<AttestationType> {
        let AttestationStatement::AndroidSafetyNet(stmt) =
            &registration.attestation_object.statement
        else {
            return Err(format_mismatch(self.format(), registration));
        };

        if stmt.ver.is_empty() || stmt.ver.parse::<u64>().is_err() {
            return Err(VerificationError::bad_statement(format!(
                "SafetyNet ver \"{}\" is not a version number",
                stmt.ver
            )));
        }

        let compact = std::str::from_utf8(&stmt.response)
            .map_err(|_| VerificationError::decode("SafetyNet response is not UTF-8"))?;
        let jws: Jws<SafetyNetResponse> = Jws::parse(compact)?;
        let response = &jws.payload;

        let expected_nonce = STANDARD.encode(crypto::sha256(&registration.signed_data()));
        if response.nonce != expected_nonce {
            return Err(VerificationError::bad_signature(
                "SafetyNet nonce does not match authenticator data and client data hash",
            ));
        }

        let (leaf, _) = leaf_and_chain(&jws.x5c)?;
        if leaf.common_name()?.as_deref() != Some(ATTEST_HOSTNAME) {
            return Err(VerificationError::bad_statement(format!(
                "SafetyNet certificate is not issued to {ATTEST_HOSTNAME}"
            )));
        }

        if !response.cts_profile_match {
            return Err(VerificationError::bad_statement(
                "SafetyNet ctsProfileMatch is false",
            ));
        }
        if !response.basic_integrity {
            warn!(package = %response.apk_package_name, "SafetyNet basicIntegrity is false");
        }

        self.check_freshness(response.timestamp_ms, registration.timestamp)?;
        jws.verify_signature()?;

        debug!(
            package = %response.apk_package_name,
            timestamp_ms = response.timestamp_ms,
            "android-safetynet attestation verified"
        );
        Ok(AttestationType::Basic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::attestation_object::AndroidSafetyNetStatement;
    use crate::codec::authenticator_data::{Aaguid, AuthenticatorFlags};
    use crate::codec::client_data::TYPE_CREATE;
    use crate::codec::cose::CoseAlgorithm;
    use crate::codec::jws::sign_compact;
    use crate::test_support::{fixtures, p256_keypair, CertBuilder};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn response(nonce: String) -> SafetyNetResponse {
        SafetyNetResponse {
            nonce,
            timestamp_ms: now().timestamp_millis() - 1_000,
            apk_package_name: "com.google.android.gms".into(),
            apk_certificate_digest_sha256: vec!["digest".into()],
            apk_digest_sha256: "apk".into(),
            cts_profile_match: true,
            basic_integrity: true,
            advice: None,
        }
    }

    /// Registration whose SafetyNet nonce is computed by `nonce` from the
    /// signed data.
    fn registration(nonce: impl FnOnce(&[u8]) -> String) -> RegistrationObject {
        let (_, cose) = p256_keypair();
        let auth_data = fixtures::auth_data(
            "example.com",
            AuthenticatorFlags::USER_PRESENT,
            0,
            Some((Aaguid::ZERO, vec![3; 16], cose)),
        );
        let client_data_json = fixtures::client_data(TYPE_CREATE, b"challenge", "https://example.com");
        let signed = fixtures::signed_data(&auth_data, &client_data_json);

        let (attest_key, _) = p256_keypair();
        let leaf = CertBuilder::new(&attest_key)
            .subject(&[("CN", ATTEST_HOSTNAME)])
            .build_self_signed();
        let payload = response(nonce(signed.as_slice()));
        let jws = sign_compact(&payload, &[leaf], CoseAlgorithm::ES256, &attest_key).unwrap();
        let statement = AttestationStatement::AndroidSafetyNet(AndroidSafetyNetStatement {
            ver: "12685023".into(),
            response: jws.into_bytes(),
        });
        let object = fixtures::attestation_object(&auth_data, statement);
        fixtures::registration(&object, &client_data_json, now())
    }

    #[test]
    fn test_valid_response_is_basic() {
        let registration = registration(|signed| STANDARD.encode(crypto::sha256(signed)));
        assert_eq!(
            AndroidSafetyNetVerifier::default().verify(&registration).unwrap(),
            AttestationType::Basic
        );
    }

    #[test]
    fn test_tampered_client_data_breaks_nonce() {
        let mut registration = registration(|signed| STANDARD.encode(crypto::sha256(signed)));
        fixtures::tamper_client_data(&mut registration);
        assert!(matches!(
            AndroidSafetyNetVerifier::default().verify(&registration),
            Err(VerificationError::BadSignature(_))
        ));
    }

    #[test]
    fn test_nonce_over_other_data_rejected() {
        let registration = registration(|_| STANDARD.encode(crypto::sha256(b"other")));
        assert!(matches!(
            AndroidSafetyNetVerifier::default().verify(&registration),
            Err(VerificationError::BadSignature(_))
        ));
    }

    #[test]
    fn test_response_uses_camel_case() {
        let json = r#"{
            "nonce": "abc",
            "timestampMs": 1700000000000,
            "apkPackageName": "com.google.android.gms",
            "apkCertificateDigestSha256": ["digest"],
            "apkDigestSha256": "apk",
            "ctsProfileMatch": true,
            "basicIntegrity": true
        }"#;
        let response: SafetyNetResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.timestamp_ms, 1_700_000_000_000);
        assert!(response.advice.is_none());
    }

    #[test]
    fn test_freshness_window() {
        let verifier = AndroidSafetyNetVerifier::default();
        let now_ms = now().timestamp_millis();
        assert!(verifier.check_freshness(now_ms, now()).is_ok());
        assert!(verifier.check_freshness(now_ms - 59_000, now()).is_ok());
        assert!(verifier.check_freshness(now_ms - 61_000, now()).is_err());
        assert!(verifier.check_freshness(now_ms + 1, now()).is_err());
    }

    #[test]
    fn test_forward_threshold_allows_clock_skew() {
        let verifier = AndroidSafetyNetVerifier::new(Duration::from_secs(60), Duration::from_secs(5));
        let now_ms = now().timestamp_millis();
        assert!(verifier.check_freshness(now_ms + 4_000, now()).is_ok());
        assert!(verifier.check_freshness(now_ms + 6_000, now()).is_err());
    }
}
