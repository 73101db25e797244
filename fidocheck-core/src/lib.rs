//! fidocheck core - server-side WebAuthn / FIDO2 verification
//!
//! Verifies registration (attestation) and authentication (assertion)
//! ceremonies on behalf of a relying party: client data, authenticator data,
//! every standard attestation statement format, certificate path trust against
//! configured anchors or the FIDO Metadata Service, and signature counters.
//!
//! # Features
//!
//! - Attestation formats: `none`, `fido-u2f`, `packed`, `android-key`,
//!   `android-safetynet`, `tpm`
//! - COSE keys: EC2 (P-256/384/521), RSA (PKCS#1 v1.5 and PSS), OKP (Ed25519)
//! - Trust anchors from PEM bundles or a verified MDS3 BLOB, cached until
//!   `nextUpdate`
//! - `network` feature (default): HTTP fetching of the MDS BLOB with retry
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use fidocheck_core::{
//!     AttestationVerifier, CertificateBundleTrustAnchorRepository, RegistrationRequest,
//!     RegistrationValidator, ServerProperty, TrustworthinessVerifier, VerifierConfig,
//! };
//!
//! # async fn example(request: RegistrationRequest, challenge: Vec<u8>) -> fidocheck_core::Result<()> {
//! let config = VerifierConfig::default();
//! let anchors = CertificateBundleTrustAnchorRepository::from_pem_file("roots.pem").await?;
//! let validator = RegistrationValidator::new(
//!     config.clone(),
//!     AttestationVerifier::with_defaults(&config),
//!     TrustworthinessVerifier::from_config(&config, Arc::new(anchors)),
//! );
//!
//! let server_property = ServerProperty::new("https://example.com", "example.com", challenge);
//! let result = validator.validate(&request, &server_property, Utc::now()).await?;
//! println!("registered {:?} credential", result.attestation_type);
//! # Ok(())
//! # }
//! ```

pub mod attestation;
pub mod cert;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod metadata;
pub mod ports;
pub mod serde_b64url;
pub mod store;
pub mod trust;
pub mod validator;

#[cfg(test)]
use crate as fidocheck;
#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use attestation::{AttestationStatementVerifier, AttestationType, AttestationVerifier};
pub use codec::{
    Aaguid, AttestationFormat, AttestationObject, AuthenticatorData, CollectedClientData,
    CoseAlgorithm, CoseKey,
};
pub use config::{MetadataConfig, VerifierConfig};
pub use error::{CertificateTrustFailure, Result, VerificationError};
pub use metadata::{
    BlobVerifier, CachingBlobProvider, FidoMds3BlobProvider, LocalFileBlobProvider,
    MetadataBlobProvider, MetadataBlobTrustAnchorRepository, MetadataError,
};
pub use ports::{
    Challenge, ChallengeRepository, CredentialStore, RelyingParty, RelyingPartyProvider,
    RequestContext, StaticRelyingPartyProvider,
};
pub use store::{InMemoryChallengeRepository, InMemoryCredentialStore};
pub use trust::{
    AggregatingTrustAnchorRepository, CertificateBundleTrustAnchorRepository, TrustAnchor,
    TrustAnchorRepository, TrustworthinessVerifier,
};
pub use validator::{
    AuthenticationRequest, AuthenticationResult, AuthenticationValidator, Authenticator,
    Ceremony, RegistrationRequest, RegistrationResult, RegistrationValidator, ServerProperty,
};

#[cfg(feature = "network")]
pub use metadata::ReqwestHttpClient;
