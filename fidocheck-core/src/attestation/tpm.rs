use tracing::debug;

use super::{
    check_aaguid_extension, format_mismatch, leaf_and_chain, AttestationStatementVerifier,
    AttestationType,
};
use crate::cert::{AttestationCertificate, OID_SUBJECT_ALT_NAME, OID_TCG_KP_AIK_CERTIFICATE};
use crate::codec::attestation_object::{AttestationFormat, AttestationStatement};
use crate::codec::cose::{CoseKey, EcCurve};
use crate::codec::tpm::{
    name_alg_digest, TpmParameters, TpmUnique, TpmsAttest, TpmtPublic, TPM_ECC_NIST_P256,
    TPM_ECC_NIST_P384, TPM_ECC_NIST_P521, TPM_GENERATED_VALUE, TPM_ST_ATTEST_CERTIFY,
};
use crate::crypto;
use crate::error::{Result, VerificationError};
use crate::validator::RegistrationObject;

const SUPPORTED_VERSION: &str = "2.0";

/// `tpm`: attestation by a TPM 2.0 Attestation Identity Key.
#[derive(Debug, Default, Clone, Copy)]
pub struct TpmVerifier;

impl AttestationStatementVerifier for TpmVerifier {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::Tpm
    }

    fn verify(&self, registration: &RegistrationObject) -> Result<AttestationType> {
        let AttestationStatement::Tpm(stmt) = &registration.attestation_object.statement else {
            return Err(format_mismatch(self.format(), registration));
        };
        if stmt.ver != SUPPORTED_VERSION {
            return Err(VerificationError::bad_statement(format!(
                "TPM version \"{}\" is not supported",
                stmt.ver
            )));
        }
        let credential = registration.attested_credential_data()?;

        let pub_area = TpmtPublic::decode(&stmt.pub_area)?;
        check_public_area_key(&pub_area, &credential.credential_public_key)?;

        let cert_info = TpmsAttest::decode(&stmt.cert_info)?;
        if cert_info.magic != TPM_GENERATED_VALUE {
            return Err(VerificationError::bad_statement(
                "certInfo magic is not TPM_GENERATED_VALUE",
            ));
        }
        if cert_info.attest_type != TPM_ST_ATTEST_CERTIFY {
            return Err(VerificationError::bad_statement(
                "certInfo type is not TPM_ST_ATTEST_CERTIFY",
            ));
        }

        let md = stmt.alg.digest().ok_or_else(|| {
            VerificationError::UnsupportedAlgorithm(format!("{} has no digest for extraData", stmt.alg))
        })?;
        if cert_info.extra_data != crypto::digest(md, &registration.signed_data())? {
            return Err(VerificationError::bad_signature(
                "certInfo extraData does not match authenticator data and client data hash",
            ));
        }

        if cert_info.attested_name.hash_alg != pub_area.name_alg {
            return Err(VerificationError::bad_statement(
                "certInfo name algorithm differs from pubArea nameAlg",
            ));
        }
        let name_md = name_alg_digest(pub_area.name_alg)?;
        if cert_info.attested_name.digest != crypto::digest(name_md, &stmt.pub_area)? {
            return Err(VerificationError::bad_statement(
                "certInfo attested name does not match pubArea",
            ));
        }

        if let Some(x5c) = &stmt.x5c {
            let (aik, _) = leaf_and_chain(x5c)?;
            let aik_key = aik.public_key()?;
            crypto::verify_signature(stmt.alg, &aik_key, &stmt.cert_info, &stmt.sig)?;
            check_aik_certificate(&aik)?;
            check_aaguid_extension(&aik, &credential.aaguid)?;
            debug!(alg = %stmt.alg, "tpm AIK attestation verified");
            return Ok(AttestationType::AttCa);
        }

        if stmt.ecdaa_key_id.is_some() {
            return Ok(AttestationType::Ecdaa);
        }

        Err(VerificationError::bad_statement(
            "tpm statement carries neither x5c nor ecdaaKeyId",
        ))
    }
}

fn check_public_area_key(pub_area: &TpmtPublic, key: &CoseKey) -> Result<()> {
    let matches = match (&pub_area.parameters, &pub_area.unique, key) {
        (TpmParameters::Rsa { exponent, .. }, TpmUnique::Rsa { n }, CoseKey::Rsa(rsa)) => {
            strip_zeros(n) == strip_zeros(&rsa.n)
                && strip_zeros(&exponent.to_be_bytes()) == strip_zeros(&rsa.e)
        }
        (TpmParameters::Ecc { curve_id, .. }, TpmUnique::Ecc { x, y }, CoseKey::Ec2(ec)) => {
            tpm_curve(*curve_id) == Some(ec.curve) && *x == ec.x && *y == ec.y
        }
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(VerificationError::bad_statement(
            "pubArea key does not match the credential public key",
        ))
    }
}

fn tpm_curve(curve_id: u16) -> Option<EcCurve> {
    match curve_id {
        TPM_ECC_NIST_P256 => Some(EcCurve::P256),
        TPM_ECC_NIST_P384 => Some(EcCurve::P384),
        TPM_ECC_NIST_P521 => Some(EcCurve::P521),
        _ => None,
    }
}

fn strip_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// TPM AIK certificate requirements (WebAuthn §8.3.1).
fn check_aik_certificate(cert: &AttestationCertificate) -> Result<()> {
    if cert.version()? != 3 {
        return Err(VerificationError::bad_statement("AIK certificate must be X.509 v3"));
    }
    if !cert.subject_is_empty()? {
        return Err(VerificationError::bad_statement("AIK certificate subject must be empty"));
    }
    if !cert.has_extension(OID_SUBJECT_ALT_NAME)? {
        return Err(VerificationError::bad_statement(
            "AIK certificate must carry a subject alternative name",
        ));
    }
    if !cert
        .extended_key_usages()?
        .iter()
        .any(|oid| oid == OID_TCG_KP_AIK_CERTIFICATE)
    {
        return Err(VerificationError::bad_statement(
            "AIK certificate EKU must include tcg-kp-AIKCertificate",
        ));
    }
    if cert.is_ca()? {
        return Err(VerificationError::bad_statement("AIK certificate must not be a CA"));
    }
    Ok(())
}
