//! Registration and authentication ceremony validators.

mod authentication;
mod ceremony;
mod objects;
mod registration;
mod server_property;

pub use authentication::{
    AuthenticationRequest, AuthenticationResult, AuthenticationValidator,
    DefaultMaliciousCounterValueHandler, MaliciousCounterValueHandler,
};
pub use ceremony::Ceremony;
pub use objects::{AuthenticationObject, Authenticator, RegistrationObject};
pub use registration::{RegistrationRequest, RegistrationResult, RegistrationValidator};
pub use server_property::ServerProperty;

use tracing::debug;

use crate::codec::authenticator_data::AuthenticatorData;
use crate::codec::client_data::{CollectedClientData, TokenBindingStatus};
use crate::config::VerifierConfig;
use crate::error::{Result, VerificationError};

/// Client data checks shared by both ceremonies, in order: type, challenge,
/// origin, cross-origin policy, token binding.
fn verify_client_data(
    client_data: &CollectedClientData,
    expected_type: &str,
    server_property: &ServerProperty,
    config: &VerifierConfig,
) -> Result<()> {
    if client_data.ty != expected_type {
        return Err(VerificationError::BadClientDataType(client_data.ty.clone()));
    }

    let challenge_ok = client_data.challenge.len() == server_property.challenge.len()
        && openssl::memcmp::eq(&client_data.challenge, &server_property.challenge);
    if !challenge_ok {
        return Err(VerificationError::BadChallenge);
    }

    if !server_property.origin_allowed(&client_data.origin) {
        return Err(VerificationError::BadOrigin(client_data.origin.clone()));
    }

    if client_data.cross_origin == Some(true) && !config.cross_origin_allowed {
        return Err(VerificationError::CrossOrigin);
    }

    if let Some(binding) = &client_data.token_binding {
        if binding.status == TokenBindingStatus::Present {
            return Err(VerificationError::NotImplemented("token binding".into()));
        }
    }
    debug!(origin = %client_data.origin, ty = expected_type, "client data verified");
    Ok(())
}

/// rpIdHash, UP and UV flags per policy, then backup flag consistency.
fn verify_auth_data(
    auth_data: &AuthenticatorData,
    server_property: &ServerProperty,
    config: &VerifierConfig,
) -> Result<()> {
    if !openssl::memcmp::eq(&auth_data.rp_id_hash, &server_property.rp_id_hash()) {
        return Err(VerificationError::BadRpId);
    }
    if config.user_presence_required && !auth_data.flags.user_present() {
        return Err(VerificationError::UserNotPresent);
    }
    if config.user_verification_required && !auth_data.flags.user_verified() {
        return Err(VerificationError::UserNotVerified);
    }
    // BS may only be set on a backup-eligible credential.
    if auth_data.flags.backup_state() && !auth_data.flags.backup_eligible() {
        return Err(VerificationError::BadBackupFlags);
    }
    Ok(())
}
