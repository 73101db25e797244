use super::{format_mismatch, AttestationStatementVerifier, AttestationType};
use crate::codec::attestation_object::{AttestationFormat, AttestationStatement};
use crate::error::Result;
use crate::validator::RegistrationObject;

/// `none`: the authenticator made no claim about its provenance.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneVerifier;

impl AttestationStatementVerifier for NoneVerifier {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::None
    }

    fn verify(&self, registration: &RegistrationObject) -> Result<AttestationType> {
        match registration.attestation_object.statement {
            AttestationStatement::None => Ok(AttestationType::None),
            _ => Err(format_mismatch(self.format(), registration)),
        }
    }
}
