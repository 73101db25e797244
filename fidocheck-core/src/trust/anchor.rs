//! Trust anchors and the repositories that resolve them.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use openssl::x509::X509;

use crate::cert::AttestationCertificate;
use crate::codec::authenticator_data::Aaguid;
use crate::error::{Result, VerificationError};

/// A certificate treated as trusted. No name constraints are attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrustAnchor {
    der: Vec<u8>,
}

impl TrustAnchor {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        AttestationCertificate::from_der(der)?;
        Ok(Self { der: der.to_vec() })
    }

    /// Every certificate in a PEM bundle.
    pub fn from_pem_bundle(pem: &[u8]) -> Result<Vec<Self>> {
        X509::stack_from_pem(pem)?
            .iter()
            .map(|cert| Ok(Self { der: cert.to_der()? }))
            .collect()
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn certificate(&self) -> Result<AttestationCertificate> {
        AttestationCertificate::from_der(&self.der)
    }
}

/// Resolves the anchors an attestation chain must lead to.
#[async_trait]
pub trait TrustAnchorRepository: Send + Sync {
    async fn find_by_aaguid(&self, aaguid: &Aaguid) -> Result<HashSet<TrustAnchor>>;

    /// Lookup for FIDO U2F, keyed by SHA-1 of the attestation public key.
    async fn find_by_key_identifier(&self, key_identifier: &[u8]) -> Result<HashSet<TrustAnchor>>;
}

/// A fixed set of anchors returned for every query, key-store style.
#[derive(Debug, Clone, Default)]
pub struct CertificateBundleTrustAnchorRepository {
    anchors: HashSet<TrustAnchor>,
}

impl CertificateBundleTrustAnchorRepository {
    pub fn new(anchors: impl IntoIterator<Item = TrustAnchor>) -> Self {
        Self {
            anchors: anchors.into_iter().collect(),
        }
    }

    pub async fn from_pem_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = tokio::fs::read(path).await.map_err(|e| {
            VerificationError::IllegalArgument(format!("{}: {e}", path.display()))
        })?;
        Ok(Self::new(TrustAnchor::from_pem_bundle(&pem)?))
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

#[async_trait]
impl TrustAnchorRepository for CertificateBundleTrustAnchorRepository {
    async fn find_by_aaguid(&self, _aaguid: &Aaguid) -> Result<HashSet<TrustAnchor>> {
        Ok(self.anchors.clone())
    }

    async fn find_by_key_identifier(&self, _key_identifier: &[u8]) -> Result<HashSet<TrustAnchor>> {
        Ok(self.anchors.clone())
    }
}

/// Union of several repositories.
#[derive(Default, Clone)]
pub struct AggregatingTrustAnchorRepository {
    repositories: Vec<Arc<dyn TrustAnchorRepository>>,
}

impl AggregatingTrustAnchorRepository {
    pub fn new(repositories: Vec<Arc<dyn TrustAnchorRepository>>) -> Self {
        Self { repositories }
    }
}

#[async_trait]
impl TrustAnchorRepository for AggregatingTrustAnchorRepository {
    async fn find_by_aaguid(&self, aaguid: &Aaguid) -> Result<HashSet<TrustAnchor>> {
        let mut anchors = HashSet::new();
        for repository in &self.repositories {
            anchors.extend(repository.find_by_aaguid(aaguid).await?);
        }
        Ok(anchors)
    }

    async fn find_by_key_identifier(&self, key_identifier: &[u8]) -> Result<HashSet<TrustAnchor>> {
        let mut anchors = HashSet::new();
        for repository in &self.repositories {
            anchors.extend(repository.find_by_key_identifier(key_identifier).await?);
        }
        Ok(anchors)
    }
}
