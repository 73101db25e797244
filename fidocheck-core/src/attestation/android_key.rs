use tracing::debug;

use super::{format_mismatch, leaf_and_chain, AttestationStatementVerifier, AttestationType};
use crate::codec::asn1::Asn1Node;
use crate::codec::attestation_object::{AttestationFormat, AttestationStatement};
use crate::crypto;
use crate::error::{Result, VerificationError};
use crate::validator::RegistrationObject;

pub const OID_ANDROID_KEY_DESCRIPTION: &str = "1.3.6.1.4.1.11129.2.1.17";

const KEY_DESCRIPTION_CHALLENGE: usize = 4;
const KEY_DESCRIPTION_SOFTWARE_ENFORCED: usize = 6;
const KEY_DESCRIPTION_TEE_ENFORCED: usize = 7;

const KM_TAG_PURPOSE: u32 = 1;
const KM_TAG_ALL_APPLICATIONS: u32 = 600;
const KM_TAG_ORIGIN: u32 = 702;

const KM_ORIGIN_GENERATED: i64 = 0;
const KM_PURPOSE_SIGN: i64 = 2;

/// The subset of a KeyMint authorization list the verifier inspects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationList {
    pub purpose: Option<Vec<i64>>,
    pub all_applications: bool,
    pub origin: Option<i64>,
}

impl AuthorizationList {
    fn parse(node: &Asn1Node) -> Result<Self> {
        let mut list = Self::default();
        for entry in node.sequence()? {
            if entry.is_context(KM_TAG_PURPOSE) {
                list.purpose = Some(entry.explicit_inner()?.as_integer_set()?);
            } else if entry.is_context(KM_TAG_ALL_APPLICATIONS) {
                list.all_applications = true;
            } else if entry.is_context(KM_TAG_ORIGIN) {
                list.origin = Some(entry.explicit_inner()?.as_i64()?);
            }
        }
        Ok(list)
    }

    fn has_sign_purpose(&self) -> bool {
        self.purpose
            .as_ref()
            .is_some_and(|p| p.contains(&KM_PURPOSE_SIGN))
    }

    fn origin_generated(&self) -> bool {
        self.origin == Some(KM_ORIGIN_GENERATED)
    }
}

/// Android key attestation extension (`KeyDescription`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescription {
    pub attestation_challenge: Vec<u8>,
    pub software_enforced: AuthorizationList,
    pub tee_enforced: AuthorizationList,
}

impl KeyDescription {
    pub fn parse(der: &[u8]) -> Result<Self> {
        let root = Asn1Node::parse(der)?;
        let fields = root.sequence()?;
        let field = |index: usize| {
            fields.get(index).ok_or_else(|| {
                VerificationError::decode(format!("key description field {index} is missing"))
            })
        };
        Ok(Self {
            attestation_challenge: field(KEY_DESCRIPTION_CHALLENGE)?.as_octet_string()?,
            software_enforced: AuthorizationList::parse(field(KEY_DESCRIPTION_SOFTWARE_ENFORCED)?)?,
            tee_enforced: AuthorizationList::parse(field(KEY_DESCRIPTION_TEE_ENFORCED)?)?,
        })
    }
}

/// `android-key`: hardware-backed keystore attestation.
#[derive(Debug, Default, Clone, Copy)]
pub struct AndroidKeyVerifier {
    tee_enforced_only: bool,
}

impl AndroidKeyVerifier {
    pub fn new(tee_enforced_only: bool) -> Self {
        Self { tee_enforced_only }
    }

    fn check_authorization_lists(&self, description: &KeyDescription) -> Result<()> {
        let software = &description.software_enforced;
        let tee = &description.tee_enforced;

        if software.all_applications || tee.all_applications {
            return Err(VerificationError::bad_statement(
                "key description grants allApplications; the key is not scoped to the RP",
            ));
        }

        let (origin_ok, purpose_ok) = if self.tee_enforced_only {
            (tee.origin_generated(), tee.has_sign_purpose())
        } else {
            (
                tee.origin_generated() || software.origin_generated(),
                tee.has_sign_purpose() || software.has_sign_purpose(),
            )
        };
        if !origin_ok {
            return Err(VerificationError::bad_statement(
                "key origin is not KM_ORIGIN_GENERATED",
            ));
        }
        if !purpose_ok {
            return Err(VerificationError::bad_statement(
                "key purpose does not include KM_PURPOSE_SIGN",
            ));
        }
        Ok(())
    }
}

impl AttestationStatementVerifier for AndroidKeyVerifier {
    fn format(&self) -> AttestationFormat {
        AttestationFormat::AndroidKey
    }

    fn verify(&self, registration: &RegistrationObject) -> Result<AttestationType> {
        let AttestationStatement::AndroidKey(stmt) = &registration.attestation_object.statement
        else {
            return Err(format_mismatch(self.format(), registration));
        };
        let credential = registration.attested_credential_data()?;
        let (leaf, _) = leaf_and_chain(&stmt.x5c)?;
        let leaf_key = leaf.public_key()?;

        crypto::verify_signature(stmt.alg, &leaf_key, &registration.signed_data(), &stmt.sig)?;

        let credential_key = credential.credential_public_key.to_pkey()?;
        if !leaf_key.public_eq(&credential_key) {
            return Err(VerificationError::bad_statement(
                "attestation certificate key does not match the credential key",
            ));
        }

        let extension = leaf
            .extension_value(OID_ANDROID_KEY_DESCRIPTION)?
            .ok_or_else(|| VerificationError::bad_statement("key description extension is missing"))?;
        let description = KeyDescription::parse(&extension)
            .map_err(|e| VerificationError::bad_statement(format!("key description: {e}")))?;

        if description.attestation_challenge != registration.client_data_hash() {
            return Err(VerificationError::bad_statement(
                "attestation challenge does not match client data hash",
            ));
        }
        self.check_authorization_lists(&description)?;

        debug!(tee_enforced_only = self.tee_enforced_only, "android-key attestation verified");
        Ok(AttestationType::Basic)
    }
}
