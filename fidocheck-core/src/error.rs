use thiserror::Error;

use crate::metadata::MetadataError;

/// Sub-kinds of a failed certificate trust evaluation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificateTrustFailure {
    #[error("no trust anchor found")]
    TrustAnchorNotFound,

    #[error("certificate path validation failed: {0}")]
    PathValidation(String),

    #[error("presented path contains the trust anchor")]
    FullChainProhibited,

    #[error("certificate carries policy qualifiers")]
    PolicyQualifiersRejected,

    #[error("authenticator status is not acceptable: {0}")]
    BadStatus(String),
}

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Structural decode error: {0}")]
    StructuralDecode(String),

    #[error("Bad signature: {0}")]
    BadSignature(String),

    #[error("Challenge mismatch")]
    BadChallenge,

    #[error("Origin mismatch: {0}")]
    BadOrigin(String),

    #[error("Cross-origin request is prohibited")]
    CrossOrigin,

    #[error("RP ID hash mismatch")]
    BadRpId,

    #[error("Unexpected client data type: {0}")]
    BadClientDataType(String),

    #[error("User presence flag not set")]
    UserNotPresent,

    #[error("User verification flag not set")]
    UserNotVerified,

    #[error("Backup state flag set without backup eligibility")]
    BadBackupFlags,

    #[error("Bad attestation statement: {0}")]
    BadAttestationStatement(String),

    #[error("Bad algorithm: {0}")]
    BadAlgorithm(String),

    #[error("Unsupported attestation format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Certificate trust error: {0}")]
    CertificateTrust(CertificateTrustFailure),

    #[error("Self attestation is prohibited")]
    SelfAttestationProhibited,

    #[error("Malicious counter value: presented={presented}, stored={stored}")]
    MaliciousCounterValue { presented: u32, stored: u32 },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Credential not found")]
    MissingCredential,

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Crypto provider error: {0}")]
    CryptoProvider(#[from] openssl::error::ErrorStack),
}

impl VerificationError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::StructuralDecode(message.into())
    }

    pub fn bad_signature(message: impl Into<String>) -> Self {
        Self::BadSignature(message.into())
    }

    pub fn bad_statement(message: impl Into<String>) -> Self {
        Self::BadAttestationStatement(message.into())
    }

    pub fn trust(failure: CertificateTrustFailure) -> Self {
        Self::CertificateTrust(failure)
    }

    pub fn trust_anchor_not_found() -> Self {
        Self::CertificateTrust(CertificateTrustFailure::TrustAnchorNotFound)
    }

    /// Stable machine-readable code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StructuralDecode(_) => "STRUCTURAL_DECODE",
            Self::BadSignature(_) => "BAD_SIGNATURE",
            Self::BadChallenge => "BAD_CHALLENGE",
            Self::BadOrigin(_) => "BAD_ORIGIN",
            Self::CrossOrigin => "CROSS_ORIGIN",
            Self::BadRpId => "BAD_RP_ID",
            Self::BadClientDataType(_) => "BAD_CLIENT_DATA_TYPE",
            Self::UserNotPresent => "USER_NOT_PRESENT",
            Self::UserNotVerified => "USER_NOT_VERIFIED",
            Self::BadBackupFlags => "BAD_BACKUP_FLAGS",
            Self::BadAttestationStatement(_) => "BAD_ATTESTATION_STATEMENT",
            Self::BadAlgorithm(_) => "BAD_ALGORITHM",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::UnsupportedAlgorithm(_) => "UNSUPPORTED_ALGORITHM",
            Self::CertificateTrust(failure) => match failure {
                CertificateTrustFailure::TrustAnchorNotFound => "TRUST_ANCHOR_NOT_FOUND",
                CertificateTrustFailure::PathValidation(_) => "CERT_PATH_INVALID",
                CertificateTrustFailure::FullChainProhibited => "FULL_CHAIN_PROHIBITED",
                CertificateTrustFailure::PolicyQualifiersRejected => "POLICY_QUALIFIERS_REJECTED",
                CertificateTrustFailure::BadStatus(_) => "BAD_STATUS",
            },
            Self::SelfAttestationProhibited => "SELF_ATTESTATION_PROHIBITED",
            Self::MaliciousCounterValue { .. } => "MALICIOUS_COUNTER_VALUE",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::IllegalArgument(_) => "ILLEGAL_ARGUMENT",
            Self::Metadata(_) => "METADATA_UNAVAILABLE",
            Self::CryptoProvider(_) => "CRYPTO_PROVIDER",
        }
    }

    /// Message that is safe to hand back to the relying party's client.
    ///
    /// Never includes the internal detail carried in the variant; that goes
    /// to the log instead.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::StructuralDecode(_) => "The authenticator response could not be decoded",
            Self::BadSignature(_) => "The authenticator signature is invalid",
            Self::BadChallenge => "The challenge does not match",
            Self::BadOrigin(_) => "The origin is not allowed",
            Self::CrossOrigin => "Cross-origin requests are not allowed",
            Self::BadRpId => "The relying party identifier does not match",
            Self::BadClientDataType(_) => "The client data type is not valid for this ceremony",
            Self::UserNotPresent => "User presence is required",
            Self::UserNotVerified => "User verification is required",
            Self::BadBackupFlags => "The authenticator flags are inconsistent",
            Self::BadAttestationStatement(_) => "The attestation statement is invalid",
            Self::BadAlgorithm(_) => "The signature algorithm is not acceptable",
            Self::UnsupportedFormat(_) => "The attestation format is not supported",
            Self::UnsupportedAlgorithm(_) => "The signature algorithm is not supported",
            Self::CertificateTrust(CertificateTrustFailure::BadStatus(_)) => {
                "The authenticator model is not trusted"
            }
            Self::CertificateTrust(_) => "The attestation certificate is not trusted",
            Self::SelfAttestationProhibited => "Self attestation is not accepted",
            Self::MaliciousCounterValue { .. } => "The authenticator may have been cloned",
            Self::NotImplemented(_) => "The requested feature is not supported",
            Self::MissingCredential => "The credential is not registered",
            Self::IllegalArgument(_) | Self::Metadata(_) | Self::CryptoProvider(_) => {
                "Internal verification error"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, VerificationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_for_trust_sub_kinds() {
        let not_found = VerificationError::trust_anchor_not_found();
        let status = VerificationError::trust(CertificateTrustFailure::BadStatus("REVOKED".into()));
        assert_eq!(not_found.code(), "TRUST_ANCHOR_NOT_FOUND");
        assert_eq!(status.code(), "BAD_STATUS");
        assert_ne!(not_found.user_message(), status.user_message());
    }

    #[test]
    fn test_user_message_does_not_leak_detail() {
        let err = VerificationError::decode("cbor item at offset 42 truncated");
        assert!(!err.user_message().contains("42"));
        assert!(err.to_string().contains("42"));
    }
}
