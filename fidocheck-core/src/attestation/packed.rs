use tracing::debug;

use super::{
    check_aaguid_extension, format_mismatch, leaf_and_chain, AttestationStatementVerifier,
    AttestationType,
};
use crate::cert::AttestationCertificate;
use crate::codec::attestation_object::{AttestationFormat, AttestationStatement};
use crate::crypto;
use crate::error::{Result, VerificationError};
use crate::validator::RegistrationObject;

const REQUIRED_OU: &str = "Authenticator Attestation";

/// `packed`: the WebAuthn-native format, with full or self attestation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackedVerifier;

impl AttestationStatementVerifier for PackedVerifier {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::Packed
    }

    fn verify(&self, registration: &RegistrationObject) -> Result<AttestationType> {
        let AttestationStatement::Packed(stmt) = &registration.attestation_object.statement else {
            return Err(format_mismatch(self.format(), registration));
        };
        let credential = registration.attested_credential_data()?;
        let signed = registration.signed_data();

        if let Some(x5c) = &stmt.x5c {
            let (leaf, _) = leaf_and_chain(x5c)?;
            let leaf_key = leaf.public_key()?;
            crypto::verify_signature(stmt.alg, &leaf_key, &signed, &stmt.sig)?;
            check_certificate_requirements(&leaf)?;
            check_aaguid_extension(&leaf, &credential.aaguid)?;
            debug!(alg = %stmt.alg, "packed full attestation verified");
            return Ok(AttestationType::Basic);
        }

        if stmt.ecdaa_key_id.is_some() {
            return Ok(AttestationType::Ecdaa);
        }

        let key = &credential.credential_public_key;
        if key.alg() != Some(stmt.alg) {
            return Err(VerificationError::BadAlgorithm(format!(
                "statement alg {} does not match credential key alg {:?}",
                stmt.alg,
                key.alg().map(|a| a.id())
            )));
        }
        let credential_key = key.to_pkey()?;
        crypto::verify_signature(stmt.alg, &credential_key, &signed, &stmt.sig)?;
        debug!(alg = %stmt.alg, "packed self attestation verified");
        Ok(AttestationType::SelfAttestation)
    }
}

/// Packed attestation certificate requirements (WebAuthn §8.2.1).
fn check_certificate_requirements(cert: &AttestationCertificate) -> Result<()> {
    if cert.version()? != 3 {
        return Err(VerificationError::bad_statement(
            "packed attestation certificate must be X.509 v3",
        ));
    }
    let present = |v: Option<String>| v.is_some_and(|s| !s.is_empty());
    if !present(cert.country()?) || !present(cert.organization()?) || !present(cert.common_name()?)
    {
        return Err(VerificationError::bad_statement(
            "packed attestation certificate subject must carry C, O and CN",
        ));
    }
    if cert.organizational_unit()?.as_deref() != Some(REQUIRED_OU) {
        return Err(VerificationError::bad_statement(format!(
            "packed attestation certificate OU must be \"{REQUIRED_OU}\""
        )));
    }
    if cert.is_ca()? {
        return Err(VerificationError::bad_statement(
            "packed attestation certificate must not be a CA",
        ));
    }
    Ok(())
}
