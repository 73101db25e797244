//! Verify a captured registration ceremony.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use fidocheck_core::{
    serde_b64url, AttestationVerifier, CertificateBundleTrustAnchorRepository,
    RegistrationRequest, RegistrationValidator, ServerProperty, TrustworthinessVerifier,
    VerifierConfig,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::exit_codes::InputError;
use crate::utils::{b64url, read_input};

/// A registration as captured by a relying party: what it expected, and what
/// the browser returned.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationCapture {
    /// Accepted origins; a single string is also accepted.
    #[serde(deserialize_with = "one_or_many")]
    pub origin: Vec<String>,
    pub rp_id: String,
    #[serde(with = "serde_b64url")]
    pub challenge: Vec<u8>,
    pub response: RegistrationRequest,
    /// Evaluation time for certificate checks (default: now).
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn one_or_many<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(origin) => vec![origin],
        OneOrMany::Many(origins) => origins,
    })
}

pub struct VerifyOptions {
    pub capture: PathBuf,
    pub roots: Option<PathBuf>,
    pub allow_self_attestation: bool,
    pub require_user_verification: bool,
    pub json: bool,
    pub quiet: bool,
}

/// Execute the verify-registration command.
pub async fn execute(options: VerifyOptions) -> Result<()> {
    let raw = read_input(&options.capture)?;
    let capture: RegistrationCapture = serde_json::from_slice(&raw)
        .map_err(|e| InputError(format!("Failed to parse capture: {e}")))?;
    info!(path = %options.capture.display(), rp_id = %capture.rp_id, "Read capture");

    // Environment supplies the baseline; flags only tighten or loosen the two policies they name
    let mut config = VerifierConfig::from_env();
    config.allow_self_attestation |= options.allow_self_attestation;
    config.user_verification_required |= options.require_user_verification;

    let anchors = match &options.roots {
        Some(path) => CertificateBundleTrustAnchorRepository::from_pem_file(path)
            .await
            .with_context(|| format!("Failed to load trust anchors from {}", path.display()))?,
        None => CertificateBundleTrustAnchorRepository::default(),
    };
    info!(anchors = anchors.len(), "Loaded trust anchors");

    let validator = RegistrationValidator::new(
        config.clone(),
        AttestationVerifier::with_defaults(&config),
        TrustworthinessVerifier::from_config(&config, Arc::new(anchors)),
    );
    let server_property =
        ServerProperty::with_origins(capture.origin, capture.rp_id, capture.challenge);
    let timestamp = capture.timestamp.unwrap_or_else(Utc::now);

    let result = match validator
        .validate(&capture.response, &server_property, timestamp)
        .await
    {
        Ok(result) => result,
        Err(err) => {
            error!(code = err.code(), error = %err, "Registration rejected");
            if options.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "verified": false,
                        "code": err.code(),
                        "message": err.user_message(),
                    })
                );
            } else if !options.quiet {
                println!();
                println!("{}", "╔════════════════════════════════════════╗".red());
                println!("{}", "║              REJECTED                  ║".red().bold());
                println!("{}", "╚════════════════════════════════════════╝".red());
                println!();
                println!("   {} {}", "Code:".dimmed(), err.code().red());
                println!("   {} {}", "Reason:".dimmed(), err.user_message());
            }
            return Err(err).context("Registration verification failed");
        }
    };

    let authenticator = &result.authenticator;
    if options.json {
        println!(
            "{}",
            serde_json::json!({
                "verified": true,
                "attestationType": result.attestation_type,
                "aaguid": authenticator.aaguid,
                "credentialId": b64url(&authenticator.credential_id),
                "algorithm": authenticator.public_key.alg().map(|a| a.id()),
                "signCount": authenticator.counter,
            })
        );
    } else if !options.quiet {
        println!();
        println!("{}", "╔════════════════════════════════════════╗".green());
        println!("{}", "║              VERIFIED                  ║".green().bold());
        println!("{}", "╚════════════════════════════════════════╝".green());
        println!();
        println!(
            "   {} {}",
            "Format:".dimmed(),
            crate::commands::attestation_format(&capture.response.attestation_object)
        );
        println!("   {} {}", "Attestation:".dimmed(), result.attestation_type);
        println!("   {} {}", "AAGUID:".dimmed(), authenticator.aaguid);
        println!(
            "   {} {}",
            "Credential:".dimmed(),
            b64url(&authenticator.credential_id)
        );
        if let Some(alg) = authenticator.public_key.alg() {
            println!("   {} {}", "Algorithm:".dimmed(), alg);
        }
        println!("   {} {}", "Sign count:".dimmed(), authenticator.counter);
    }
    Ok(())
}
