//! Trustworthiness evaluation
//!
//! Decides whether an attestation that verified cryptographically is also
//! trusted, based on its [`AttestationType`].

pub mod anchor;
pub mod certpath;
pub mod metadata_status;
pub mod self_attestation;

use std::sync::Arc;

use tracing::debug;

pub use anchor::{
    AggregatingTrustAnchorRepository, CertificateBundleTrustAnchorRepository, TrustAnchor,
    TrustAnchorRepository,
};
pub use certpath::{CertPathTrustworthinessVerifier, PathOptions};
pub use metadata_status::{MetadataStatusVerifier, StatusPolicy};
pub use self_attestation::SelfAttestationTrustworthinessVerifier;

use crate::attestation::AttestationType;
use crate::config::VerifierConfig;
use crate::error::{Result, VerificationError};
use crate::validator::RegistrationObject;

pub struct TrustworthinessVerifier {
    self_attestation: SelfAttestationTrustworthinessVerifier,
    certpath: CertPathTrustworthinessVerifier,
    metadata_status: Option<MetadataStatusVerifier>,
}

impl TrustworthinessVerifier {
    pub fn new(
        self_attestation: SelfAttestationTrustworthinessVerifier,
        certpath: CertPathTrustworthinessVerifier,
    ) -> Self {
        Self {
            self_attestation,
            certpath,
            metadata_status: None,
        }
    }

    /// Wire self-attestation policy and path options from `config`.
    pub fn from_config(config: &VerifierConfig, repository: Arc<dyn TrustAnchorRepository>) -> Self {
        let options = PathOptions {
            revocation_check_enabled: config.revocation_check_enabled,
            crl_file: config.crl_file.clone(),
            policy_qualifiers_rejected: config.policy_qualifiers_rejected,
            full_chain_prohibited: config.full_chain_prohibited,
        };
        Self::new(
            SelfAttestationTrustworthinessVerifier::new(config.allow_self_attestation),
            CertPathTrustworthinessVerifier::new(repository, options),
        )
    }

    pub fn with_metadata_status(mut self, verifier: MetadataStatusVerifier) -> Self {
        self.metadata_status = Some(verifier);
        self
    }

    pub async fn verify(
        &self,
        registration: &RegistrationObject,
        attestation_type: AttestationType,
    ) -> Result<()> {
        match attestation_type {
            AttestationType::None => Ok(()),
            AttestationType::SelfAttestation => self.self_attestation.verify(),
            AttestationType::Ecdaa => Err(VerificationError::NotImplemented("ECDAA".into())),
            AttestationType::Basic | AttestationType::AttCa | AttestationType::AnonCa => {
                self.certpath.verify(registration).await?;
                if let Some(status) = &self.metadata_status {
                    status.verify(registration).await?;
                }
                debug!(%attestation_type, "attestation trusted");
                Ok(())
            }
        }
    }
}
