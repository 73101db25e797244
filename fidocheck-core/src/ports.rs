//! Collaborator interfaces the ceremony façade depends on.
//!
//! Persistence and HTTP glue live outside this crate; [`crate::store::memory`]
//! has in-memory implementations for tests and tooling.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{Result, VerificationError};
use crate::validator::Authenticator;

const CHALLENGE_LEN: usize = 32;

/// Identifies the user agent session a ceremony belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestContext {
    pub session_id: String,
    /// Origin of the page that started the ceremony, e.g. `https://example.com`.
    pub origin: String,
}

impl RequestContext {
    pub fn new(session_id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            origin: origin.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Challenge(Vec<u8>);

impl Challenge {
    /// 32 random bytes from the OpenSSL CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut bytes = vec![0u8; CHALLENGE_LEN];
        openssl::rand::rand_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// base64url form, as placed in the client's options.
    pub fn encoded(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Challenge({})", self.encoded())
    }
}

#[async_trait]
pub trait ChallengeRepository: Send + Sync {
    async fn save(&self, context: &RequestContext, challenge: Challenge) -> Result<()>;

    async fn load(&self, context: &RequestContext) -> Result<Option<Challenge>>;

    async fn delete(&self, context: &RequestContext) -> Result<()>;

    /// Load and delete in one step; a challenge is single-use.
    async fn take(&self, context: &RequestContext) -> Result<Option<Challenge>> {
        let challenge = self.load(context).await?;
        self.delete(context).await?;
        Ok(challenge)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    pub origin: String,
    pub rp_id: String,
}

pub trait RelyingPartyProvider: Send + Sync {
    fn provide(&self, context: &RequestContext) -> Result<RelyingParty>;
}

/// Takes the origin from the request; the RP ID is the configured override or
/// the origin's host.
#[derive(Debug, Clone, Default)]
pub struct StaticRelyingPartyProvider {
    rp_id: Option<String>,
}

impl StaticRelyingPartyProvider {
    pub fn new(rp_id: Option<String>) -> Self {
        Self { rp_id }
    }
}

impl RelyingPartyProvider for StaticRelyingPartyProvider {
    fn provide(&self, context: &RequestContext) -> Result<RelyingParty> {
        let rp_id = match &self.rp_id {
            Some(rp_id) => rp_id.clone(),
            None => url::Url::parse(&context.origin)
                .ok()
                .and_then(|u| u.host_str().map(str::to_owned))
                .ok_or_else(|| {
                    VerificationError::IllegalArgument(format!(
                        "cannot derive RP ID from origin {}",
                        context.origin
                    ))
                })?,
        };
        Ok(RelyingParty {
            origin: context.origin.clone(),
            rp_id,
        })
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_credential_id(&self, credential_id: &[u8]) -> Result<Option<Authenticator>>;

    async fn update_sign_count(&self, credential_id: &[u8], counter: u32) -> Result<()>;

    async fn save(&self, authenticator: Authenticator) -> Result<()>;
}
