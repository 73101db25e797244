//! Verifier configuration
//!
//! Every knob has a documented default and can be overridden from
//! `FIDOCHECK_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::codec::cose::CoseAlgorithm;

/// Default FIDO Metadata Service endpoint.
pub const DEFAULT_MDS_URL: &str = "https://mds.fidoalliance.org/";

/// Attestation and assertion verification policy.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Require the UP flag (default: true)
    pub user_presence_required: bool,
    /// Require the UV flag (default: false)
    pub user_verification_required: bool,
    /// Accept client data with `crossOrigin: true` (default: false)
    pub cross_origin_allowed: bool,
    /// Accept self attestation (default: false)
    pub allow_self_attestation: bool,
    /// Android key: only the TEE authorization list may satisfy origin/purpose (default: false)
    pub tee_enforced_only: bool,
    /// SafetyNet: how far in the past `timestampMs` may be (default: 60s)
    pub safetynet_backward_threshold: Duration,
    /// SafetyNet: how far in the future `timestampMs` may be (default: 0s)
    pub safetynet_forward_threshold: Duration,
    /// Enable CRL checking during path validation (default: false)
    pub revocation_check_enabled: bool,
    /// PEM file with CRLs used when revocation checking is enabled
    pub crl_file: Option<PathBuf>,
    /// Reject certificates whose policies carry qualifiers (default: false)
    pub policy_qualifiers_rejected: bool,
    /// Reject paths that include the trust anchor itself (default: false)
    pub full_chain_prohibited: bool,
    /// Credential algorithms accepted at registration; empty accepts all supported
    pub allowed_algorithms: Vec<CoseAlgorithm>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            user_presence_required: true,
            user_verification_required: false,
            cross_origin_allowed: false,
            allow_self_attestation: false,
            tee_enforced_only: false,
            safetynet_backward_threshold: Duration::from_secs(60),
            safetynet_forward_threshold: Duration::ZERO,
            revocation_check_enabled: false,
            crl_file: None,
            policy_qualifiers_rejected: false,
            full_chain_prohibited: false,
            allowed_algorithms: Vec::new(),
        }
    }
}

impl VerifierConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let allowed_algorithms = std::env::var("FIDOCHECK_ALLOWED_ALGORITHMS")
            .ok()
            .map(|v| {
                v.split(',')
                    .filter_map(|s| s.trim().parse::<i64>().ok())
                    .filter_map(|id| CoseAlgorithm::from_id(id).ok())
                    .collect()
            })
            .unwrap_or(defaults.allowed_algorithms);

        Self {
            user_presence_required: env_bool(
                "FIDOCHECK_USER_PRESENCE_REQUIRED",
                defaults.user_presence_required,
            ),
            user_verification_required: env_bool(
                "FIDOCHECK_USER_VERIFICATION_REQUIRED",
                defaults.user_verification_required,
            ),
            cross_origin_allowed: env_bool(
                "FIDOCHECK_CROSS_ORIGIN_ALLOWED",
                defaults.cross_origin_allowed,
            ),
            allow_self_attestation: env_bool(
                "FIDOCHECK_ALLOW_SELF_ATTESTATION",
                defaults.allow_self_attestation,
            ),
            tee_enforced_only: env_bool("FIDOCHECK_TEE_ENFORCED_ONLY", defaults.tee_enforced_only),
            safetynet_backward_threshold: env_secs(
                "FIDOCHECK_SAFETYNET_BACKWARD_SECS",
                defaults.safetynet_backward_threshold,
            ),
            safetynet_forward_threshold: env_secs(
                "FIDOCHECK_SAFETYNET_FORWARD_SECS",
                defaults.safetynet_forward_threshold,
            ),
            revocation_check_enabled: env_bool(
                "FIDOCHECK_REVOCATION_CHECK",
                defaults.revocation_check_enabled,
            ),
            crl_file: std::env::var("FIDOCHECK_CRL_FILE").ok().map(PathBuf::from),
            policy_qualifiers_rejected: env_bool(
                "FIDOCHECK_POLICY_QUALIFIERS_REJECTED",
                defaults.policy_qualifiers_rejected,
            ),
            full_chain_prohibited: env_bool(
                "FIDOCHECK_FULL_CHAIN_PROHIBITED",
                defaults.full_chain_prohibited,
            ),
            allowed_algorithms,
        }
    }
}

/// Metadata service configuration.
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// BLOB endpoint (default: https://mds.fidoalliance.org/)
    pub url: String,
    /// PEM file with the MDS root certificate the BLOB chain must lead to
    pub root_certificate: Option<PathBuf>,
    /// Per-fetch timeout (default: 30s)
    pub fetch_timeout: Duration,
    /// Minimum spacing between refresh attempts once nextUpdate has passed (default: 1h)
    pub refresh_debounce: Duration,
    /// Accept entries whose latest status is NOT_FIDO_CERTIFIED (default: false)
    pub not_fido_certified_allowed: bool,
    /// Accept entries whose latest status is SELF_ASSERTION_SUBMITTED (default: false)
    pub self_assertion_submitted_allowed: bool,
    /// Check the BLOB chain against CRLs (default: false)
    pub revocation_check_enabled: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MDS_URL.to_string(),
            root_certificate: None,
            fetch_timeout: Duration::from_secs(30),
            refresh_debounce: Duration::from_secs(3600),
            not_fido_certified_allowed: false,
            self_assertion_submitted_allowed: false,
            revocation_check_enabled: false,
        }
    }
}

impl MetadataConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("FIDOCHECK_MDS_URL").unwrap_or(defaults.url),
            root_certificate: std::env::var("FIDOCHECK_MDS_ROOT_CERT")
                .ok()
                .map(PathBuf::from),
            fetch_timeout: env_secs("FIDOCHECK_MDS_TIMEOUT_SECS", defaults.fetch_timeout),
            refresh_debounce: env_secs("FIDOCHECK_MDS_DEBOUNCE_SECS", defaults.refresh_debounce),
            not_fido_certified_allowed: env_bool(
                "FIDOCHECK_NOT_FIDO_CERTIFIED_ALLOWED",
                defaults.not_fido_certified_allowed,
            ),
            self_assertion_submitted_allowed: env_bool(
                "FIDOCHECK_SELF_ASSERTION_SUBMITTED_ALLOWED",
                defaults.self_assertion_submitted_allowed,
            ),
            revocation_check_enabled: env_bool(
                "FIDOCHECK_MDS_REVOCATION_CHECK",
                defaults.revocation_check_enabled,
            ),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
