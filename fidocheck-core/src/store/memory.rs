//! In-memory collaborator implementations
//!
//! Thread-safe via `DashMap`. Challenges expire after 5 minutes by default;
//! credentials live as long as the process.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{Result, VerificationError};
use crate::ports::{Challenge, ChallengeRepository, CredentialStore, RequestContext};
use crate::validator::Authenticator;

/// Maximum age for challenges (5 minutes)
const CHALLENGE_EXPIRY_SECS: u64 = 300;

struct ChallengeEntry {
    challenge: Challenge,
    expires_at: Instant,
}

pub struct InMemoryChallengeRepository {
    /// Pending challenges (session id -> challenge)
    challenges: DashMap<String, ChallengeEntry>,
    ttl: Duration,
}

impl Default for InMemoryChallengeRepository {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(CHALLENGE_EXPIRY_SECS))
    }
}

impl InMemoryChallengeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            challenges: DashMap::new(),
            ttl,
        }
    }

    /// Remove expired challenges (called periodically)
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.challenges.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

#[async_trait]
impl ChallengeRepository for InMemoryChallengeRepository {
    async fn save(&self, context: &RequestContext, challenge: Challenge) -> Result<()> {
        self.challenges.insert(
            context.session_id.clone(),
            ChallengeEntry {
                challenge,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn load(&self, context: &RequestContext) -> Result<Option<Challenge>> {
        Ok(self
            .challenges
            .get(&context.session_id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.challenge.clone()))
    }

    async fn delete(&self, context: &RequestContext) -> Result<()> {
        self.challenges.remove(&context.session_id);
        Ok(())
    }

    async fn take(&self, context: &RequestContext) -> Result<Option<Challenge>> {
        let Some((_, entry)) = self.challenges.remove(&context.session_id) else {
            return Ok(None);
        };
        if entry.expires_at > Instant::now() {
            Ok(Some(entry.challenge))
        } else {
            Ok(None) // Expired
        }
    }
}

impl std::fmt::Debug for InMemoryChallengeRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChallengeRepository")
            .field("challenges", &self.challenges.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Registered credentials (credential id -> authenticator)
#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: DashMap<Vec<u8>, Authenticator>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_credential_id(&self, credential_id: &[u8]) -> Result<Option<Authenticator>> {
        Ok(self
            .credentials
            .get(credential_id)
            .map(|entry| entry.value().clone()))
    }

    async fn update_sign_count(&self, credential_id: &[u8], counter: u32) -> Result<()> {
        match self.credentials.get_mut(credential_id) {
            Some(mut entry) => {
                entry.counter = counter;
                Ok(())
            }
            None => Err(VerificationError::MissingCredential),
        }
    }

    async fn save(&self, authenticator: Authenticator) -> Result<()> {
        self.credentials
            .insert(authenticator.credential_id.clone(), authenticator);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCredentialStore")
            .field("credentials", &self.credentials.len())
            .finish()
    }
}
