use tracing::debug;

use super::{format_mismatch, leaf_and_chain, AttestationStatementVerifier, AttestationType};
use crate::codec::asn1::Asn1Node;
use crate::codec::attestation_object::{AttestationFormat, AttestationStatement};
use crate::crypto;
use crate::error::{Result, VerificationError};
use crate::validator::RegistrationObject;

/// Apple anonymous attestation nonce extension.
pub const OID_APPLE_NONCE: &str = "1.2.840.113635.100.8.2";

const NONCE_TAG: u32 = 1;

/// `apple`: anonymous attestation issued by Apple's attestation CA.
///
/// The statement is unsigned. The leaf certificate binds the credential key
/// to `sha256(authData || clientDataHash)` through the nonce extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppleAnonymousVerifier;

/// `SEQUENCE { [1] EXPLICIT OCTET STRING }`
fn parse_nonce(extension: &[u8]) -> Result<Vec<u8>> {
    Asn1Node::parse(extension)?
        .find_context(NONCE_TAG)?
        .ok_or_else(|| VerificationError::decode("nonce field is missing"))?
        .explicit_inner()?
        .as_octet_string()
}

impl AttestationStatementVerifier for AppleAnonymousVerifier {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::Apple
    }

    fn verify(&self, registration: &RegistrationObject) -> Result<AttestationType> {
        let AttestationStatement::Apple(stmt) = &registration.attestation_object.statement else {
            return Err(format_mismatch(self.format(), registration));
        };
        let credential = registration.attested_credential_data()?;
        let (leaf, _) = leaf_and_chain(&stmt.x5c)?;

        let extension = leaf
            .extension_value(OID_APPLE_NONCE)?
            .ok_or_else(|| VerificationError::bad_statement("apple nonce extension is missing"))?;
        let nonce = parse_nonce(&extension)
            .map_err(|e| VerificationError::bad_statement(format!("apple nonce: {e}")))?;
        if nonce != crypto::sha256(&registration.signed_data()) {
            return Err(VerificationError::bad_statement(
                "apple nonce does not match authenticator data and client data hash",
            ));
        }

        let leaf_key = leaf.public_key()?;
        let credential_key = credential.credential_public_key.to_pkey()?;
        if !leaf_key.public_eq(&credential_key) {
            return Err(VerificationError::bad_statement(
                "attestation certificate key does not match the credential key",
            ));
        }

        debug!("apple anonymous attestation verified");
        Ok(AttestationType::AnonCa)
    }
}
