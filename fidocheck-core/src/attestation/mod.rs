//! Attestation statement verification
//!
//! One verifier per format, composed into an ordered list. Each verifier checks
//! the statement against the registration data and classifies the attestation;
//! whether that classification is trusted is decided later by
//! [`crate::trust`].

mod android_key;
mod android_safetynet;
mod apple;
mod fido_u2f;
mod none;
mod packed;
mod tpm;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use android_key::{AndroidKeyVerifier, AuthorizationList, KeyDescription};
pub use android_safetynet::{AndroidSafetyNetVerifier, SafetyNetResponse};
pub use apple::AppleAnonymousVerifier;
pub use fido_u2f::FidoU2fVerifier;
pub use none::NoneVerifier;
pub use packed::PackedVerifier;
pub use tpm::TpmVerifier;

use crate::cert::AttestationCertificate;
use crate::codec::attestation_object::AttestationFormat;
use crate::codec::authenticator_data::Aaguid;
use crate::config::VerifierConfig;
use crate::error::{Result, VerificationError};
use crate::validator::RegistrationObject;

/// Trust classification produced by statement verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationType {
    Basic,
    #[serde(rename = "self")]
    SelfAttestation,
    AttCa,
    AnonCa,
    Ecdaa,
    None,
}

impl fmt::Display for AttestationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Basic => "Basic",
            Self::SelfAttestation => "Self",
            Self::AttCa => "AttCA",
            Self::AnonCa => "AnonCA",
            Self::Ecdaa => "ECDAA",
            Self::None => "None",
        };
        f.write_str(name)
    }
}

/// Verifies one attestation statement format.
pub trait AttestationStatementVerifier: Send + Sync {
    fn format(&self) -> AttestationFormat;

    fn supports(&self, registration: &RegistrationObject) -> bool {
        registration.attestation_object.format() == self.format()
    }

    fn verify(&self, registration: &RegistrationObject) -> Result<AttestationType>;
}

/// Dispatches to the first verifier that supports the statement's format.
pub struct AttestationVerifier {
    verifiers: Vec<Box<dyn AttestationStatementVerifier>>,
}

impl AttestationVerifier {
    pub fn new(verifiers: Vec<Box<dyn AttestationStatementVerifier>>) -> Self {
        Self { verifiers }
    }

    /// All seven formats, configured from `config`.
    pub fn with_defaults(config: &VerifierConfig) -> Self {
        Self::new(vec![
            Box::new(NoneVerifier),
            Box::new(FidoU2fVerifier),
            Box::new(PackedVerifier),
            Box::new(AndroidSafetyNetVerifier::new(
                config.safetynet_backward_threshold,
                config.safetynet_forward_threshold,
            )),
            Box::new(AndroidKeyVerifier::new(config.tee_enforced_only)),
            Box::new(TpmVerifier),
            Box::new(AppleAnonymousVerifier),
        ])
    }

    pub fn verify(&self, registration: &RegistrationObject) -> Result<AttestationType> {
        let format = registration.attestation_object.format();
        let verifier = self
            .verifiers
            .iter()
            .find(|v| v.supports(registration))
            .ok_or_else(|| VerificationError::UnsupportedFormat(format.to_string()))?;
        let attestation_type = verifier.verify(registration)?;
        debug!(%format, %attestation_type, "attestation statement verified");
        Ok(attestation_type)
    }
}

impl fmt::Debug for AttestationVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formats: Vec<_> = self.verifiers.iter().map(|v| v.format()).collect();
        f.debug_struct("AttestationVerifier")
            .field("formats", &formats)
            .finish()
    }
}

fn format_mismatch(expected: AttestationFormat, registration: &RegistrationObject) -> VerificationError {
    VerificationError::IllegalArgument(format!(
        "{expected} verifier called with a {} statement",
        registration.attestation_object.format()
    ))
}

/// Leaf-first certificate chain from an `x5c` array; it must not be empty.
fn leaf_and_chain(x5c: &[Vec<u8>]) -> Result<(AttestationCertificate, Vec<AttestationCertificate>)> {
    let mut chain = AttestationCertificate::chain_from_der(x5c)?;
    if chain.is_empty() {
        return Err(VerificationError::bad_statement("x5c is empty"));
    }
    let leaf = chain.remove(0);
    Ok((leaf, chain))
}

/// When the attestation certificate carries the FIDO AAGUID extension its
/// value must match the authenticator data.
fn check_aaguid_extension(cert: &AttestationCertificate, aaguid: &Aaguid) -> Result<()> {
    match cert.aaguid_extension()? {
        Some(in_cert) if in_cert != *aaguid => Err(VerificationError::bad_statement(format!(
            "AAGUID in attestation certificate ({in_cert}) does not match authenticator data ({aaguid})"
        ))),
        _ => Ok(()),
    }
}
