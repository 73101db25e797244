//! Certificate path trust evaluation.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use openssl::ssl::SslFiletype;
use openssl::stack::Stack;
use openssl::x509::store::{X509Lookup, X509StoreBuilder};
use openssl::x509::verify::{X509VerifyFlags, X509VerifyParam};
use openssl::x509::{X509StoreContext, X509};
use tracing::{debug, instrument};

use super::anchor::{TrustAnchor, TrustAnchorRepository};
use crate::cert::AttestationCertificate;
use crate::codec::attestation_object::{AttestationFormat, AttestationStatement};
use crate::codec::jws::Jws;
use crate::error::{CertificateTrustFailure, Result, VerificationError};
use crate::validator::RegistrationObject;

/// Knobs for PKIX path validation.
#[derive(Debug, Clone, Default)]
pub struct PathOptions {
    pub revocation_check_enabled: bool,
    pub crl_file: Option<PathBuf>,
    pub policy_qualifiers_rejected: bool,
    pub full_chain_prohibited: bool,
}

/// Validate `chain` (leaf first) against `anchors` at time `at`.
///
/// Intermediate certificates may themselves be anchors (partial chains).
pub fn validate_path(
    chain: &[AttestationCertificate],
    anchors: &HashSet<TrustAnchor>,
    options: &PathOptions,
    at: DateTime<Utc>,
) -> Result<()> {
    if options.revocation_check_enabled && options.crl_file.is_none() {
        return Err(VerificationError::IllegalArgument(
            "revocation checking is enabled but no CRL file is configured".into(),
        ));
    }
    let Some((leaf, intermediates)) = chain.split_first() else {
        return Err(VerificationError::bad_statement("certificate path is empty"));
    };
    if anchors.is_empty() {
        return Err(VerificationError::trust_anchor_not_found());
    }

    if options.policy_qualifiers_rejected {
        for cert in chain {
            if cert.has_policy_qualifiers()? {
                return Err(VerificationError::trust(
                    CertificateTrustFailure::PolicyQualifiersRejected,
                ));
            }
        }
    }

    if intermediates.is_empty() && anchors.iter().any(|a| a.der() == leaf.der()) {
        debug!("leaf certificate is itself a trust anchor");
        return Ok(());
    }

    let mut store = X509StoreBuilder::new()?;
    for anchor in anchors {
        store.add_cert(X509::from_der(anchor.der())?)?;
    }
    let mut flags = X509VerifyFlags::PARTIAL_CHAIN;
    if let (true, Some(crl_file)) = (options.revocation_check_enabled, &options.crl_file) {
        flags |= X509VerifyFlags::CRL_CHECK | X509VerifyFlags::CRL_CHECK_ALL;
        store
            .add_lookup(X509Lookup::file())?
            .load_crl_file(crl_file, SslFiletype::PEM)?;
    }
    let mut param = X509VerifyParam::new()?;
    param.set_flags(flags)?;
    param.set_time(at.timestamp() as _);
    store.set_param(&param)?;
    let store = store.build();

    let mut untrusted = Stack::new()?;
    for cert in intermediates {
        untrusted.push(cert.x509().clone())?;
    }

    let mut context = X509StoreContext::new()?;
    let outcome = context.init(&store, leaf.x509(), &untrusted, |ctx| {
        if ctx.verify_cert()? {
            Ok(Ok(()))
        } else {
            Ok(Err(ctx.error().error_string().to_string()))
        }
    })?;
    if let Err(reason) = outcome {
        return Err(VerificationError::trust(CertificateTrustFailure::PathValidation(
            reason,
        )));
    }

    if options.full_chain_prohibited
        && chain
            .iter()
            .any(|cert| anchors.iter().any(|a| a.der() == cert.der()))
    {
        return Err(VerificationError::trust(
            CertificateTrustFailure::FullChainProhibited,
        ));
    }
    Ok(())
}

/// Certificates presented by the attestation, leaf first.
pub fn presented_chain(registration: &RegistrationObject) -> Result<Vec<AttestationCertificate>> {
    match &registration.attestation_object.statement {
        AttestationStatement::AndroidSafetyNet(stmt) => {
            let compact = std::str::from_utf8(&stmt.response)
                .map_err(|_| VerificationError::decode("SafetyNet response is not UTF-8"))?;
            Jws::<serde_json::Value>::parse(compact)?.certificates()
        }
        other => {
            let x5c = other.x5c().ok_or_else(|| {
                VerificationError::bad_statement("attestation carries no certificate chain")
            })?;
            AttestationCertificate::chain_from_der(x5c)
        }
    }
}

/// Resolves anchors for the attestation and validates the presented chain.
pub struct CertPathTrustworthinessVerifier {
    repository: Arc<dyn TrustAnchorRepository>,
    options: PathOptions,
}

impl CertPathTrustworthinessVerifier {
    pub fn new(repository: Arc<dyn TrustAnchorRepository>, options: PathOptions) -> Self {
        Self { repository, options }
    }

    #[instrument(skip_all, fields(format = %registration.attestation_object.format()))]
    pub async fn verify(&self, registration: &RegistrationObject) -> Result<()> {
        let chain = presented_chain(registration)?;
        let leaf = chain
            .first()
            .ok_or_else(|| VerificationError::bad_statement("x5c is empty"))?;

        let anchors = if registration.attestation_object.format() == AttestationFormat::FidoU2f {
            let key_identifier = leaf.key_identifier()?;
            debug!(key_identifier = %hex::encode(&key_identifier), "resolving anchors by key identifier");
            self.repository.find_by_key_identifier(&key_identifier).await?
        } else {
            let aaguid = registration.attested_credential_data()?.aaguid;
            debug!(%aaguid, "resolving anchors by AAGUID");
            self.repository.find_by_aaguid(&aaguid).await?
        };

        validate_path(&chain, &anchors, &self.options, registration.timestamp)?;
        debug!(chain_len = chain.len(), anchors = anchors.len(), "certificate path trusted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{p256_keypair, CertBuilder};

    struct Pki {
        root: Vec<u8>,
        intermediate: Vec<u8>,
        leaf: Vec<u8>,
    }

    fn pki() -> Pki {
        let (root_key, _) = p256_keypair();
        let root = CertBuilder::new(&root_key)
            .subject(&[("CN", "Root")])
            .ca(true)
            .build_self_signed();
        let (int_key, _) = p256_keypair();
        let intermediate = CertBuilder::new(&int_key)
            .subject(&[("CN", "Intermediate")])
            .ca(true)
            .build_signed_by(&root, &root_key);
        let (leaf_key, _) = p256_keypair();
        let leaf = CertBuilder::new(&leaf_key)
            .subject(&[("CN", "Leaf")])
            .build_signed_by(&intermediate, &int_key);
        Pki {
            root,
            intermediate,
            leaf,
        }
    }

    fn chain(ders: &[&Vec<u8>]) -> Vec<AttestationCertificate> {
        ders.iter()
            .map(|d| AttestationCertificate::from_der(d).unwrap())
            .collect()
    }

    fn anchors(ders: &[&Vec<u8>]) -> HashSet<TrustAnchor> {
        ders.iter().map(|d| TrustAnchor::from_der(d).unwrap()).collect()
    }

    #[test]
    fn test_chain_to_root_validates() {
        let pki = pki();
        validate_path(
            &chain(&[&pki.leaf, &pki.intermediate]),
            &anchors(&[&pki.root]),
            &PathOptions::default(),
            Utc::now(),
        )
        .unwrap();
    }

    #[test]
    fn test_intermediate_anchor_allowed() {
        let pki = pki();
        validate_path(
            &chain(&[&pki.leaf]),
            &anchors(&[&pki.intermediate]),
            &PathOptions::default(),
            Utc::now(),
        )
        .unwrap();
    }

    #[test]
    fn test_empty_anchor_set() {
        let pki = pki();
        let err = validate_path(
            &chain(&[&pki.leaf]),
            &HashSet::new(),
            &PathOptions::default(),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "TRUST_ANCHOR_NOT_FOUND");
    }

    #[test]
    fn test_unrelated_anchor_fails_path_validation() {
        let pki = pki();
        let other = pki_root_only();
        let err = validate_path(
            &chain(&[&pki.leaf, &pki.intermediate]),
            &anchors(&[&other]),
            &PathOptions::default(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            VerificationError::CertificateTrust(CertificateTrustFailure::PathValidation(_))
        ));
    }

    fn pki_root_only() -> Vec<u8> {
        let (key, _) = p256_keypair();
        CertBuilder::new(&key)
            .subject(&[("CN", "Root")])
            .ca(true)
            .build_self_signed()
    }

    #[test]
    fn test_evaluation_time_outside_validity() {
        let pki = pki();
        let far_future = Utc::now() + chrono::Duration::days(3650);
        let err = validate_path(
            &chain(&[&pki.leaf, &pki.intermediate]),
            &anchors(&[&pki.root]),
            &PathOptions::default(),
            far_future,
        )
        .unwrap_err();
        assert_eq!(err.code(), "CERT_PATH_INVALID");
    }

    #[test]
    fn test_full_chain_prohibited() {
        let pki = pki();
        let options = PathOptions {
            full_chain_prohibited: true,
            ..Default::default()
        };
        let full = chain(&[&pki.leaf, &pki.intermediate, &pki.root]);
        let err = validate_path(&full, &anchors(&[&pki.root]), &options, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "FULL_CHAIN_PROHIBITED");

        let partial = chain(&[&pki.leaf, &pki.intermediate]);
        validate_path(&partial, &anchors(&[&pki.root]), &options, Utc::now()).unwrap();
    }

    #[test]
    fn test_revocation_without_crl_file_is_config_error() {
        let pki = pki();
        let options = PathOptions {
            revocation_check_enabled: true,
            ..Default::default()
        };
        let err = validate_path(
            &chain(&[&pki.leaf, &pki.intermediate]),
            &anchors(&[&pki.root]),
            &options,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, VerificationError::IllegalArgument(_)));
    }

    #[test]
    fn test_leaf_equal_to_anchor() {
        let pki = pki();
        validate_path(
            &chain(&[&pki.root]),
            &anchors(&[&pki.root]),
            &PathOptions::default(),
            Utc::now(),
        )
        .unwrap();
    }
}
