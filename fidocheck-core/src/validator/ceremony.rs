use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use super::authentication::{AuthenticationRequest, AuthenticationResult, AuthenticationValidator};
use super::registration::{RegistrationRequest, RegistrationResult, RegistrationValidator};
use super::server_property::ServerProperty;
use crate::error::{Result, VerificationError};
use crate::ports::{
    Challenge, ChallengeRepository, CredentialStore, RelyingPartyProvider, RequestContext,
};

/// Runs complete ceremonies against the collaborator ports: issues and
/// consumes challenges, resolves the relying party, and persists credentials.
pub struct Ceremony {
    challenges: Arc<dyn ChallengeRepository>,
    relying_party: Arc<dyn RelyingPartyProvider>,
    credentials: Arc<dyn CredentialStore>,
    registration: RegistrationValidator,
    authentication: AuthenticationValidator,
}

impl Ceremony {
    pub fn new(
        challenges: Arc<dyn ChallengeRepository>,
        relying_party: Arc<dyn RelyingPartyProvider>,
        credentials: Arc<dyn CredentialStore>,
        registration: RegistrationValidator,
        authentication: AuthenticationValidator,
    ) -> Self {
        Self {
            challenges,
            relying_party,
            credentials,
            registration,
            authentication,
        }
    }

    /// Issue a fresh challenge for the session, replacing any pending one.
    #[instrument(skip_all, fields(session = %context.session_id))]
    pub async fn start(&self, context: &RequestContext) -> Result<Challenge> {
        let challenge = Challenge::generate()?;
        self.challenges.save(context, challenge.clone()).await?;
        debug!("challenge issued");
        Ok(challenge)
    }

    #[instrument(skip_all, fields(session = %context.session_id))]
    pub async fn finish_registration(
        &self,
        context: &RequestContext,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResult> {
        let server_property = self.server_property(context).await?;
        let result = self
            .registration
            .validate(request, &server_property, Utc::now())
            .await?;
        self.credentials.save(result.authenticator.clone()).await?;
        Ok(result)
    }

    #[instrument(skip_all, fields(session = %context.session_id))]
    pub async fn finish_authentication(
        &self,
        context: &RequestContext,
        request: &AuthenticationRequest,
    ) -> Result<AuthenticationResult> {
        let server_property = self.server_property(context).await?;
        let authenticator = self
            .credentials
            .find_by_credential_id(&request.credential_id)
            .await?
            .ok_or(VerificationError::MissingCredential)?;
        let result =
            self.authentication
                .validate(request, &server_property, &authenticator, Utc::now())?;
        self.credentials
            .update_sign_count(&authenticator.credential_id, result.new_counter)
            .await?;
        Ok(result)
    }

    /// Consumes the pending challenge; a replayed response finds none.
    async fn server_property(&self, context: &RequestContext) -> Result<ServerProperty> {
        let challenge = self
            .challenges
            .take(context)
            .await?
            .ok_or(VerificationError::BadChallenge)?;
        let rp = self.relying_party.provide(context)?;
        Ok(ServerProperty::new(rp.origin, rp.rp_id, challenge.as_bytes().to_vec()))
    }
}
