//! FIDO Metadata Service integration
//!
//! Fetches the MDS3 BLOB, verifies it against the configured root, caches
//! it until `nextUpdate`, and turns matching entries into trust anchors.

pub mod blob;
pub mod cache;
pub mod http;
pub mod model;
pub mod provider;
pub mod repository;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use blob::BlobVerifier;
pub use cache::{CachingBlobProvider, Clock, FixedClock, SystemClock};
pub use http::{HttpResponse, MetadataHttpClient, TransportError};
#[cfg(feature = "network")]
pub use http::{ReqwestHttpClient, RetryConfig};
pub use model::{
    AuthenticatorStatus, MetadataBlobPayload, MetadataBlobPayloadEntry, MetadataStatement,
    StatusReport,
};
pub use provider::{FidoMds3BlobProvider, LocalFileBlobProvider};
pub use repository::MetadataBlobTrustAnchorRepository;

/// Errors from fetching, verifying or caching the metadata BLOB.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("metadata service returned HTTP {0}")]
    HttpStatus(u16),

    #[error("invalid metadata BLOB: {0}")]
    InvalidBlob(String),

    #[error("metadata BLOB is not trusted: {0}")]
    Untrusted(String),

    #[error("failed to read metadata: {0}")]
    Io(String),

    #[error("metadata fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("metadata configuration error: {0}")]
    Config(String),
}

/// Source of a verified metadata BLOB payload.
#[async_trait]
pub trait MetadataBlobProvider: Send + Sync {
    async fn provide(&self) -> Result<Arc<MetadataBlobPayload>, MetadataError>;
}

#[async_trait]
impl<P: MetadataBlobProvider + ?Sized> MetadataBlobProvider for Arc<P> {
    async fn provide(&self) -> Result<Arc<MetadataBlobPayload>, MetadataError> {
        (**self).provide().await
    }
}
