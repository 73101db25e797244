use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument};

use super::blob::BlobVerifier;
use super::http::MetadataHttpClient;
use super::model::MetadataBlobPayload;
use super::{MetadataBlobProvider, MetadataError};

/// Fetches the BLOB from a FIDO MDS3 endpoint.
pub struct FidoMds3BlobProvider {
    client: Arc<dyn MetadataHttpClient>,
    url: String,
    verifier: BlobVerifier,
}

impl FidoMds3BlobProvider {
    pub fn new(
        client: Arc<dyn MetadataHttpClient>,
        url: impl Into<String>,
        verifier: BlobVerifier,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            verifier,
        }
    }
}

#[async_trait]
impl MetadataBlobProvider for FidoMds3BlobProvider {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn provide(&self) -> Result<Arc<MetadataBlobPayload>, MetadataError> {
        let response = self.client.fetch(&self.url).await?;
        if !response.is_success() {
            return Err(MetadataError::HttpStatus(response.status));
        }
        let compact = String::from_utf8(response.body)
            .map_err(|_| MetadataError::InvalidBlob("BLOB is not UTF-8".into()))?;
        let payload = self.verifier.verify(&compact, Utc::now())?;
        info!(no = payload.no, entries = payload.entries.len(), "fetched metadata BLOB");
        Ok(Arc::new(payload))
    }
}

/// Reads the BLOB from a file, e.g. a mirrored copy.
pub struct LocalFileBlobProvider {
    path: PathBuf,
    verifier: BlobVerifier,
}

impl LocalFileBlobProvider {
    pub fn new(path: impl Into<PathBuf>, verifier: BlobVerifier) -> Self {
        Self {
            path: path.into(),
            verifier,
        }
    }
}

#[async_trait]
impl MetadataBlobProvider for LocalFileBlobProvider {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn provide(&self) -> Result<Arc<MetadataBlobPayload>, MetadataError> {
        let compact = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| MetadataError::Io(format!("{}: {e}", self.path.display())))?;
        let payload = self.verifier.verify(&compact, Utc::now())?;
        info!(no = payload.no, entries = payload.entries.len(), "loaded metadata BLOB");
        Ok(Arc::new(payload))
    }
}
