use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::model::{MetadataBlobPayload, MetadataBlobPayloadEntry};
use super::MetadataBlobProvider;
use crate::codec::authenticator_data::Aaguid;
use crate::error::Result;
use crate::trust::anchor::{TrustAnchor, TrustAnchorRepository};
use crate::trust::metadata_status::StatusPolicy;

/// Trust anchors taken from the `attestationRootCertificates` of BLOB entries
/// whose status reports the policy accepts.
///
/// An unavailable BLOB yields no anchors, which the path verifier reports
/// as `TrustAnchorNotFound`.
pub struct MetadataBlobTrustAnchorRepository {
    provider: Arc<dyn MetadataBlobProvider>,
    policy: StatusPolicy,
}

impl MetadataBlobTrustAnchorRepository {
    pub fn new(provider: Arc<dyn MetadataBlobProvider>, policy: StatusPolicy) -> Self {
        Self { provider, policy }
    }

    async fn payload(&self) -> Option<Arc<MetadataBlobPayload>> {
        match self.provider.provide().await {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(error = %err, "metadata unavailable, no anchors resolved");
                None
            }
        }
    }

    fn anchors<'a>(
        &self,
        entries: impl Iterator<Item = &'a MetadataBlobPayloadEntry>,
    ) -> HashSet<TrustAnchor> {
        entries
            .filter(|entry| self.policy.accepts_entry(entry))
            .flat_map(MetadataBlobPayloadEntry::attestation_root_certificates)
            .filter_map(|der| match TrustAnchor::from_der(&der) {
                Ok(anchor) => Some(anchor),
                Err(err) => {
                    debug!(error = %err, "skipping unparsable root certificate");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl TrustAnchorRepository for MetadataBlobTrustAnchorRepository {
    async fn find_by_aaguid(&self, aaguid: &Aaguid) -> Result<HashSet<TrustAnchor>> {
        let Some(payload) = self.payload().await else {
            return Ok(HashSet::new());
        };
        Ok(self.anchors(payload.entries_for_aaguid(aaguid)))
    }

    async fn find_by_key_identifier(&self, key_identifier: &[u8]) -> Result<HashSet<TrustAnchor>> {
        let Some(payload) = self.payload().await else {
            return Ok(HashSet::new());
        };
        Ok(self.anchors(payload.entries_for_key_identifier(key_identifier)))
    }
}
