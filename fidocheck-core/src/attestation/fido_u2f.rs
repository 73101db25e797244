use openssl::nid::Nid;
use tracing::debug;

use super::{format_mismatch, leaf_and_chain, AttestationStatementVerifier, AttestationType};
use crate::codec::attestation_object::{AttestationFormat, AttestationStatement};
use crate::codec::cose::{CoseAlgorithm, CoseKey, EcCurve};
use crate::crypto;
use crate::error::{Result, VerificationError};
use crate::validator::RegistrationObject;

/// `fido-u2f`: legacy U2F registration signatures.
#[derive(Debug, Default, Clone, Copy)]
pub struct FidoU2fVerifier;

impl AttestationStatementVerifier for FidoU2fVerifier {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::FidoU2f
    }

    fn verify(&self, registration: &RegistrationObject) -> Result<AttestationType> {
        let AttestationStatement::FidoU2f(stmt) = &registration.attestation_object.statement else {
            return Err(format_mismatch(self.format(), registration));
        };
        let credential = registration.attested_credential_data()?;
        let (leaf, rest) = leaf_and_chain(&stmt.x5c)?;

        let leaf_key = leaf.public_key()?;
        let on_p256 = leaf_key
            .ec_key()
            .ok()
            .and_then(|ec| ec.group().curve_name())
            == Some(Nid::X9_62_PRIME256V1);
        if !on_p256 {
            return Err(VerificationError::bad_statement(
                "fido-u2f attestation certificate key must be EC P-256",
            ));
        }

        let CoseKey::Ec2(key) = &credential.credential_public_key else {
            return Err(VerificationError::bad_statement(
                "fido-u2f credential key must be EC2",
            ));
        };
        if key.curve != EcCurve::P256 {
            return Err(VerificationError::bad_statement(
                "fido-u2f credential key must be on P-256",
            ));
        }

        // U2F raw registration message layout.
        let rp_id_hash = registration.server_property.rp_id_hash();
        let signed = crypto::concat(&[
            &[0x00],
            &rp_id_hash,
            registration.client_data_hash(),
            &credential.credential_id,
            &[0x04],
            &key.x,
            &key.y,
        ]);
        crypto::verify_signature(CoseAlgorithm::ES256, &leaf_key, &signed, &stmt.sig)?;

        let attestation_type = if rest.is_empty() && leaf.is_self_signed()? {
            AttestationType::SelfAttestation
        } else {
            AttestationType::Basic
        };
        debug!(chain_len = rest.len() + 1, %attestation_type, "fido-u2f signature verified");
        Ok(attestation_type)
    }
}
