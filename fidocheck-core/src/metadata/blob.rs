use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::model::MetadataBlobPayload;
use super::MetadataError;
use crate::codec::jws::Jws;
use crate::trust::anchor::TrustAnchor;
use crate::trust::certpath::{validate_path, PathOptions};

/// Checks a compact-JWS metadata BLOB: signature by the `x5c` leaf, and the
/// `x5c` chain leading to one of the configured MDS roots.
#[derive(Debug, Clone)]
pub struct BlobVerifier {
    roots: HashSet<TrustAnchor>,
    options: PathOptions,
}

impl BlobVerifier {
    pub fn new(roots: impl IntoIterator<Item = TrustAnchor>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            options: PathOptions::default(),
        }
    }

    /// Check the BLOB chain against CRLs loaded from `crl_file`.
    pub fn with_revocation_check(mut self, crl_file: std::path::PathBuf) -> Self {
        self.options.revocation_check_enabled = true;
        self.options.crl_file = Some(crl_file);
        self
    }

    pub fn verify(&self, compact: &str, at: DateTime<Utc>) -> Result<MetadataBlobPayload, MetadataError> {
        if self.roots.is_empty() {
            return Err(MetadataError::Config("no MDS root certificate configured".into()));
        }

        let jws: Jws<MetadataBlobPayload> =
            Jws::parse(compact).map_err(|e| MetadataError::InvalidBlob(e.to_string()))?;
        if jws.x5c.is_empty() {
            return Err(MetadataError::Untrusted("BLOB header has no x5c chain".into()));
        }
        jws.verify_signature()
            .map_err(|e| MetadataError::Untrusted(format!("BLOB signature: {e}")))?;

        let chain = jws
            .certificates()
            .map_err(|e| MetadataError::InvalidBlob(format!("BLOB x5c: {e}")))?;
        validate_path(&chain, &self.roots, &self.options, at)
            .map_err(|e| MetadataError::Untrusted(format!("BLOB certificate chain: {e}")))?;

        debug!(
            no = jws.payload.no,
            next_update = %jws.payload.next_update,
            entries = jws.payload.entries.len(),
            "metadata BLOB verified"
        );
        Ok(jws.payload)
    }
}
