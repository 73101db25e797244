use tracing::warn;

use crate::error::{Result, VerificationError};

/// Self attestation proves key possession only; whether that is enough is a
/// relying-party policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfAttestationTrustworthinessVerifier {
    allowed: bool,
}

impl SelfAttestationTrustworthinessVerifier {
    pub fn new(allowed: bool) -> Self {
        Self { allowed }
    }

    pub fn verify(&self) -> Result<()> {
        if self.allowed {
            Ok(())
        } else {
            warn!("self attestation rejected by policy");
            Err(VerificationError::SelfAttestationProhibited)
        }
    }
}
