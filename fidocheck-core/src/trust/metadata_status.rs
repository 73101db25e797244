//! Authenticator status checks against the metadata BLOB.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::cert::AttestationCertificate;
use crate::codec::attestation_object::AttestationFormat;
use crate::error::{CertificateTrustFailure, Result, VerificationError};
use crate::metadata::model::{AuthenticatorStatus, MetadataBlobPayloadEntry};
use crate::metadata::MetadataBlobProvider;
use crate::validator::RegistrationObject;

use super::certpath::presented_chain;

/// Which non-certified statuses a relying party tolerates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    pub not_fido_certified_allowed: bool,
    pub self_assertion_submitted_allowed: bool,
}

impl StatusPolicy {
    pub fn accepts(&self, status: AuthenticatorStatus) -> bool {
        match status {
            AuthenticatorStatus::UpdateAvailable => true,
            s if s.is_fido_certified() => true,
            AuthenticatorStatus::NotFidoCertified => self.not_fido_certified_allowed,
            AuthenticatorStatus::SelfAssertionSubmitted => self.self_assertion_submitted_allowed,
            _ => false,
        }
    }

    /// The first status report in `entry` that the policy rejects.
    pub fn rejected_status(&self, entry: &MetadataBlobPayloadEntry) -> Option<AuthenticatorStatus> {
        entry
            .status_reports
            .iter()
            .map(|r| r.status)
            .find(|s| !self.accepts(*s))
    }

    pub fn accepts_entry(&self, entry: &MetadataBlobPayloadEntry) -> bool {
        self.rejected_status(entry).is_none()
    }
}

/// Rejects registrations from authenticators the BLOB reports as
/// compromised, revoked or otherwise untrusted.
pub struct MetadataStatusVerifier {
    provider: Arc<dyn MetadataBlobProvider>,
    policy: StatusPolicy,
}

impl MetadataStatusVerifier {
    pub fn new(provider: Arc<dyn MetadataBlobProvider>, policy: StatusPolicy) -> Self {
        Self { provider, policy }
    }

    #[instrument(skip_all)]
    pub async fn verify(&self, registration: &RegistrationObject) -> Result<()> {
        let payload = self.provider.provide().await?;

        let key_identifier: Vec<u8>;
        let aaguid;
        let entries: Vec<&MetadataBlobPayloadEntry> =
            if registration.attestation_object.format() == AttestationFormat::FidoU2f {
                let chain = presented_chain(registration)?;
                key_identifier = chain
                    .first()
                    .map(AttestationCertificate::key_identifier)
                    .transpose()?
                    .unwrap_or_default();
                payload.entries_for_key_identifier(&key_identifier).collect()
            } else {
                aaguid = registration.attested_credential_data()?.aaguid;
                payload.entries_for_aaguid(&aaguid).collect()
            };

        for entry in &entries {
            if let Some(status) = self.policy.rejected_status(entry) {
                warn!(?status, "authenticator status rejected");
                return Err(VerificationError::trust(CertificateTrustFailure::BadStatus(
                    format!("{status:?}"),
                )));
            }
        }
        debug!(entries = entries.len(), "authenticator status accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::model::StatusReport;

    fn entry(statuses: &[AuthenticatorStatus]) -> MetadataBlobPayloadEntry {
        MetadataBlobPayloadEntry {
            aaid: None,
            aaguid: None,
            attestation_certificate_key_identifiers: None,
            metadata_statement: None,
            status_reports: statuses
                .iter()
                .map(|s| StatusReport {
                    status: *s,
                    effective_date: None,
                    authenticator_version: None,
                    certificate: None,
                    url: None,
                    certification_descriptor: None,
                    certificate_number: None,
                    certification_policy_version: None,
                    certification_requirements_version: None,
                })
                .collect(),
            time_of_last_status_change: None,
            rogue_list_url: None,
            rogue_list_hash: None,
        }
    }

    #[test]
    fn test_certified_and_update_available_accepted() {
        let policy = StatusPolicy::default();
        assert!(policy.accepts_entry(&entry(&[
            AuthenticatorStatus::FidoCertifiedL2,
            AuthenticatorStatus::UpdateAvailable,
        ])));
    }

    #[test]
    fn test_compromise_rejected_even_after_certification() {
        let policy = StatusPolicy {
            not_fido_certified_allowed: true,
            self_assertion_submitted_allowed: true,
        };
        let e = entry(&[
            AuthenticatorStatus::FidoCertified,
            AuthenticatorStatus::AttestationKeyCompromise,
        ]);
        assert_eq!(
            policy.rejected_status(&e),
            Some(AuthenticatorStatus::AttestationKeyCompromise)
        );
        assert!(!policy.accepts(AuthenticatorStatus::Revoked));
        assert!(!policy.accepts(AuthenticatorStatus::Unknown));
    }

    #[test]
    fn test_allow_flags() {
        let strict = StatusPolicy::default();
        assert!(!strict.accepts(AuthenticatorStatus::NotFidoCertified));
        assert!(!strict.accepts(AuthenticatorStatus::SelfAssertionSubmitted));

        let loose = StatusPolicy {
            not_fido_certified_allowed: true,
            self_assertion_submitted_allowed: true,
        };
        assert!(loose.accepts(AuthenticatorStatus::NotFidoCertified));
        assert!(loose.accepts(AuthenticatorStatus::SelfAssertionSubmitted));
    }
}
