//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};

pub use fidocheck_core as fidocheck;

#[path = "../../src/test_support.rs"]
pub mod support;

use fidocheck::codec::attestation_object::{AttestationStatement, PackedStatement};
use fidocheck::codec::client_data::TYPE_CREATE;
use fidocheck::codec::{Aaguid, AuthenticatorFlags, CoseAlgorithm, CoseKey};
use fidocheck::{
    AttestationVerifier, RegistrationRequest, RegistrationValidator, ServerProperty,
    TrustAnchorRepository, TrustworthinessVerifier, VerifierConfig,
};
use support::{fixtures, p256_keypair, sign, CertBuilder};

pub const ORIGIN: &str = "https://example.com";
pub const RP_ID: &str = "example.com";
pub const CHALLENGE: &[u8] = b"integration-challenge";
pub const AAGUID: Aaguid = Aaguid([0x42; 16]);

pub fn server_property() -> ServerProperty {
    ServerProperty::new(ORIGIN, RP_ID, CHALLENGE.to_vec())
}

pub fn validator(
    config: VerifierConfig,
    repository: Arc<dyn TrustAnchorRepository>,
) -> RegistrationValidator {
    let trust = TrustworthinessVerifier::from_config(&config, repository);
    RegistrationValidator::new(config.clone(), AttestationVerifier::with_defaults(&config), trust)
}

/// A self-signed CA and its key.
pub struct Ca {
    pub key: PKey<Private>,
    pub der: Vec<u8>,
}

impl Ca {
    pub fn new(cn: &str) -> Self {
        let (key, _) = p256_keypair();
        let der = CertBuilder::new(&key)
            .subject(&[("CN", cn)])
            .ca(true)
            .build_self_signed();
        Self { key, der }
    }

    /// Packed-conformant attestation certificate issued by this CA.
    pub fn issue_packed_leaf(&self, key: &PKey<Private>) -> Vec<u8> {
        CertBuilder::new(key)
            .subject(&[
                ("C", "US"),
                ("O", "Example Authenticators"),
                ("OU", "Authenticator Attestation"),
                ("CN", "Example Attestation"),
            ])
            .ca(false)
            .aaguid(AAGUID.0)
            .build_signed_by(&self.der, &self.key)
    }
}

/// The credential a registration carries, plus the key to sign assertions.
pub struct Credential {
    pub key: PKey<Private>,
    pub cose: CoseKey,
    pub id: Vec<u8>,
}

impl Credential {
    pub fn new() -> Self {
        let (key, cose) = p256_keypair();
        Self {
            key,
            cose,
            id: vec![0xc1; 32],
        }
    }

    pub fn auth_data(&self, aaguid: Aaguid) -> Vec<u8> {
        fixtures::auth_data(
            RP_ID,
            AuthenticatorFlags::USER_PRESENT,
            0,
            Some((aaguid, self.id.clone(), self.cose.clone())),
        )
    }
}

/// Registration carrying a `packed` statement. With `attestation` the
/// statement is full (x5c = [leaf]); otherwise it is self attestation signed
/// by the credential key.
pub fn packed_request(
    credential: &Credential,
    attestation: Option<(&PKey<Private>, Vec<u8>)>,
) -> RegistrationRequest {
    let auth_data = credential.auth_data(AAGUID);
    let client_data_json = fixtures::client_data(TYPE_CREATE, CHALLENGE, ORIGIN);
    let signed = fixtures::signed_data(&auth_data, &client_data_json);

    let statement = match attestation {
        Some((key, leaf)) => PackedStatement {
            alg: CoseAlgorithm::ES256,
            sig: sign(key, MessageDigest::sha256(), &signed),
            x5c: Some(vec![leaf]),
            ecdaa_key_id: None,
        },
        None => PackedStatement {
            alg: CoseAlgorithm::ES256,
            sig: sign(&credential.key, MessageDigest::sha256(), &signed),
            x5c: None,
            ecdaa_key_id: None,
        },
    };
    RegistrationRequest {
        attestation_object: fixtures::attestation_object(
            &auth_data,
            AttestationStatement::Packed(statement),
        ),
        client_data_json,
        client_extensions: Default::default(),
    }
}
