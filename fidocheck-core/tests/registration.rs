//! End-to-end registration with certificate-backed attestation.

mod common;

use std::sync::Arc;

use chrono::Utc;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};

use common::fidocheck::codec::attestation_object::{
    AttestationObject, AttestationStatement, FidoU2fStatement,
};
use common::fidocheck::codec::client_data::TYPE_CREATE;
use common::fidocheck::codec::cose::{CoseAlgorithm, CoseKey};
use common::fidocheck::{
    crypto, AttestationType, CertificateBundleTrustAnchorRepository, CertificateTrustFailure,
    RegistrationRequest, TrustAnchor, VerificationError, VerifierConfig,
};
use common::support::{fixtures, p256_keypair, sign, CertBuilder};
use common::*;

fn anchors(ca: &Ca) -> Arc<CertificateBundleTrustAnchorRepository> {
    Arc::new(CertificateBundleTrustAnchorRepository::new([
        TrustAnchor::from_der(&ca.der).unwrap()
    ]))
}

#[tokio::test]
async fn test_packed_full_attestation_chains_to_anchor() {
    let ca = Ca::new("Example Attestation Root");
    let (att_key, _) = p256_keypair();
    let leaf = ca.issue_packed_leaf(&att_key);
    let credential = Credential::new();

    let result = validator(VerifierConfig::default(), anchors(&ca))
        .validate(
            &packed_request(&credential, Some((&att_key, leaf))),
            &server_property(),
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(result.attestation_type, AttestationType::Basic);
    assert_eq!(result.authenticator.aaguid, AAGUID);
    assert_eq!(result.authenticator.public_key, credential.cose);
}

#[tokio::test]
async fn test_packed_full_attestation_without_anchor() {
    let ca = Ca::new("Example Attestation Root");
    let stranger = Ca::new("Unrelated Root");
    let (att_key, _) = p256_keypair();
    let leaf = ca.issue_packed_leaf(&att_key);

    let err = validator(VerifierConfig::default(), anchors(&stranger))
        .validate(
            &packed_request(&Credential::new(), Some((&att_key, leaf))),
            &server_property(),
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VerificationError::CertificateTrust(CertificateTrustFailure::PathValidation(_))
    ));

    let err = validator(
        VerifierConfig::default(),
        Arc::new(CertificateBundleTrustAnchorRepository::default()),
    )
    .validate(
        &packed_request(&Credential::new(), Some((&att_key, ca.issue_packed_leaf(&att_key)))),
        &server_property(),
        Utc::now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        VerificationError::CertificateTrust(CertificateTrustFailure::TrustAnchorNotFound)
    ));
}

#[tokio::test]
async fn test_expired_attestation_certificate_rejected() {
    let ca = Ca::new("Example Attestation Root");
    let (att_key, _) = p256_keypair();
    let now = Utc::now().timestamp();
    let leaf = CertBuilder::new(&att_key)
        .subject(&[
            ("C", "US"),
            ("O", "Example Authenticators"),
            ("OU", "Authenticator Attestation"),
            ("CN", "Example Attestation"),
        ])
        .validity(now - 20 * 86_400, now - 10 * 86_400)
        .build_signed_by(&ca.der, &ca.key);

    let err = validator(VerifierConfig::default(), anchors(&ca))
        .validate(
            &packed_request(&Credential::new(), Some((&att_key, leaf))),
            &server_property(),
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VerificationError::CertificateTrust(CertificateTrustFailure::PathValidation(_))
    ));
}

#[tokio::test]
async fn test_packed_self_attestation_follows_policy() {
    let credential = Credential::new();
    let request = packed_request(&credential, None);
    let repository = Arc::new(CertificateBundleTrustAnchorRepository::default());

    let err = validator(VerifierConfig::default(), repository.clone())
        .validate(&request, &server_property(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::SelfAttestationProhibited));

    let config = VerifierConfig {
        allow_self_attestation: true,
        ..Default::default()
    };
    let result = validator(config, repository)
        .validate(&request, &server_property(), Utc::now())
        .await
        .unwrap();
    assert_eq!(result.attestation_type, AttestationType::SelfAttestation);
}

/// Same type, challenge and origin, different bytes: only the hash changes.
fn tamper_client_data(request: &mut RegistrationRequest) {
    let mut json: serde_json::Value = serde_json::from_slice(&request.client_data_json).unwrap();
    json["extra"] = serde_json::Value::Bool(true);
    request.client_data_json = serde_json::to_vec(&json).unwrap();
}

#[tokio::test]
async fn test_tampered_client_data_breaks_signature() {
    let ca = Ca::new("Example Attestation Root");
    let (att_key, _) = p256_keypair();
    let leaf = ca.issue_packed_leaf(&att_key);
    let credential = Credential::new();

    let mut request = packed_request(&credential, Some((&att_key, leaf)));
    tamper_client_data(&mut request);

    let err = validator(VerifierConfig::default(), anchors(&ca))
        .validate(&request, &server_property(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::BadSignature(_)));
}

#[tokio::test]
async fn test_packed_aaguid_extension_must_match_auth_data() {
    let ca = Ca::new("Example Attestation Root");
    let (att_key, _) = p256_keypair();
    let leaf = CertBuilder::new(&att_key)
        .subject(&[
            ("C", "US"),
            ("O", "Example Authenticators"),
            ("OU", "Authenticator Attestation"),
            ("CN", "Example Attestation"),
        ])
        .ca(false)
        .aaguid([0x11; 16])
        .build_signed_by(&ca.der, &ca.key);

    let err = validator(VerifierConfig::default(), anchors(&ca))
        .validate(
            &packed_request(&Credential::new(), Some((&att_key, leaf))),
            &server_property(),
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::BadAttestationStatement(_)));
}

#[tokio::test]
async fn test_packed_self_attestation_alg_must_match_credential() {
    let mut request = packed_request(&Credential::new(), None);
    let mut object = AttestationObject::decode(&request.attestation_object).unwrap();
    let AttestationStatement::Packed(stmt) = &mut object.statement else {
        unreachable!("packed_request builds packed statements");
    };
    stmt.alg = CoseAlgorithm::ES384;
    request.attestation_object = object.encode().unwrap();

    let config = VerifierConfig {
        allow_self_attestation: true,
        ..Default::default()
    };
    let err = validator(config, Arc::new(CertificateBundleTrustAnchorRepository::default()))
        .validate(&request, &server_property(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::BadAlgorithm(_)));
}

fn u2f_request(
    credential: &Credential,
    att_key: &PKey<Private>,
    x5c: Vec<Vec<u8>>,
) -> RegistrationRequest {
    let auth_data = credential.auth_data(common::fidocheck::Aaguid::ZERO);
    let client_data_json = fixtures::client_data(TYPE_CREATE, CHALLENGE, ORIGIN);
    let CoseKey::Ec2(key) = &credential.cose else {
        unreachable!("test credentials are EC2");
    };
    let signed = crypto::concat(&[
        &[0x00],
        &crypto::sha256(RP_ID.as_bytes()),
        &crypto::sha256(&client_data_json),
        &credential.id,
        &[0x04],
        &key.x,
        &key.y,
    ]);
    let statement = FidoU2fStatement {
        sig: sign(att_key, MessageDigest::sha256(), &signed),
        x5c,
    };
    RegistrationRequest {
        attestation_object: fixtures::attestation_object(
            &auth_data,
            AttestationStatement::FidoU2f(statement),
        ),
        client_data_json,
        client_extensions: Default::default(),
    }
}

#[tokio::test]
async fn test_fido_u2f_basic_attestation() {
    let ca = Ca::new("U2F Root");
    let (att_key, _) = p256_keypair();
    let leaf = CertBuilder::new(&att_key)
        .subject(&[("CN", "U2F Token")])
        .build_signed_by(&ca.der, &ca.key);

    let result = validator(VerifierConfig::default(), anchors(&ca))
        .validate(
            &u2f_request(&Credential::new(), &att_key, vec![leaf]),
            &server_property(),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(result.attestation_type, AttestationType::Basic);
}

#[tokio::test]
async fn test_fido_u2f_chain_through_intermediate_is_basic() {
    let root = Ca::new("U2F Root");
    let (intermediate_key, _) = p256_keypair();
    let intermediate = CertBuilder::new(&intermediate_key)
        .subject(&[("CN", "U2F Intermediate")])
        .ca(true)
        .build_signed_by(&root.der, &root.key);
    let (att_key, _) = p256_keypair();
    let leaf = CertBuilder::new(&att_key)
        .subject(&[("CN", "U2F Token")])
        .build_signed_by(&intermediate, &intermediate_key);

    let result = validator(VerifierConfig::default(), anchors(&root))
        .validate(
            &u2f_request(&Credential::new(), &att_key, vec![leaf, intermediate]),
            &server_property(),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(result.attestation_type, AttestationType::Basic);
}

#[tokio::test]
async fn test_fido_u2f_tampered_client_data_breaks_signature() {
    let ca = Ca::new("U2F Root");
    let (att_key, _) = p256_keypair();
    let leaf = CertBuilder::new(&att_key)
        .subject(&[("CN", "U2F Token")])
        .build_signed_by(&ca.der, &ca.key);
    let mut request = u2f_request(&Credential::new(), &att_key, vec![leaf]);
    tamper_client_data(&mut request);

    let err = validator(VerifierConfig::default(), anchors(&ca))
        .validate(&request, &server_property(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::BadSignature(_)));
}

#[tokio::test]
async fn test_fido_u2f_self_signed_is_self_attestation() {
    let (att_key, _) = p256_keypair();
    let leaf = CertBuilder::new(&att_key)
        .subject(&[("CN", "U2F Token")])
        .build_self_signed();
    let config = VerifierConfig {
        allow_self_attestation: true,
        ..Default::default()
    };

    let result = validator(config, Arc::new(CertificateBundleTrustAnchorRepository::default()))
        .validate(
            &u2f_request(&Credential::new(), &att_key, vec![leaf]),
            &server_property(),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(result.attestation_type, AttestationType::SelfAttestation);
}
