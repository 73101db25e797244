//! FIDO Metadata Service v3 BLOB payload.
//!
//! Only the fields the verifier consumes are typed; the rest of a metadata
//! statement is kept as raw JSON so nothing is lost when re-serializing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::codec::authenticator_data::Aaguid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBlobPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_header: Option<String>,
    /// Serial number of this BLOB.
    pub no: u64,
    pub next_update: NaiveDate,
    pub entries: Vec<MetadataBlobPayloadEntry>,
}

impl MetadataBlobPayload {
    pub fn entries_for_aaguid<'a>(
        &'a self,
        aaguid: &'a Aaguid,
    ) -> impl Iterator<Item = &'a MetadataBlobPayloadEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.aaguid.as_ref() == Some(aaguid))
    }

    pub fn entries_for_key_identifier<'a>(
        &'a self,
        key_identifier: &'a [u8],
    ) -> impl Iterator<Item = &'a MetadataBlobPayloadEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.has_key_identifier(key_identifier))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBlobPayloadEntry {
    /// UAF authenticator id; carried but not interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aaid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aaguid: Option<Aaguid>,
    /// Hex-encoded SHA-1 identifiers of U2F attestation public keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_certificate_key_identifiers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_statement: Option<MetadataStatement>,
    #[serde(default)]
    pub status_reports: Vec<StatusReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_last_status_change: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "rogueListURL")]
    pub rogue_list_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rogue_list_hash: Option<String>,
}

impl MetadataBlobPayloadEntry {
    /// Matches against the entry's own identifiers and its statement's.
    pub fn has_key_identifier(&self, key_identifier: &[u8]) -> bool {
        let statement_ids = self
            .metadata_statement
            .as_ref()
            .and_then(|s| s.attestation_certificate_key_identifiers.as_ref());
        self.attestation_certificate_key_identifiers
            .iter()
            .chain(statement_ids)
            .flatten()
            .any(|id| hex::decode(id).is_ok_and(|bytes| bytes == key_identifier))
    }

    /// DER attestation root certificates from the metadata statement.
    pub fn attestation_root_certificates(&self) -> Vec<Vec<u8>> {
        self.metadata_statement
            .as_ref()
            .map(|s| {
                s.attestation_root_certificates
                    .iter()
                    .filter_map(|pem_body| STANDARD.decode(pem_body.trim()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The most recent status report by effective date.
    pub fn latest_status(&self) -> Option<&StatusReport> {
        self.status_reports
            .iter()
            .max_by_key(|r| r.effective_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aaid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aaguid: Option<Aaguid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_certificate_key_identifiers: Option<Vec<String>>,
    pub description: String,
    #[serde(default)]
    pub authenticator_version: u32,
    #[serde(default)]
    pub protocol_family: String,
    #[serde(default)]
    pub schema: u16,
    #[serde(default)]
    pub authentication_algorithms: Vec<String>,
    #[serde(default)]
    pub attestation_types: Vec<String>,
    /// Base64 (not URL-safe) DER certificates.
    #[serde(default)]
    pub attestation_root_certificates: Vec<String>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: AuthenticatorStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_descriptor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_policy_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_requirements_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthenticatorStatus {
    #[serde(rename = "NOT_FIDO_CERTIFIED")]
    NotFidoCertified,
    #[serde(rename = "FIDO_CERTIFIED")]
    FidoCertified,
    #[serde(rename = "USER_VERIFICATION_BYPASS")]
    UserVerificationBypass,
    #[serde(rename = "ATTESTATION_KEY_COMPROMISE")]
    AttestationKeyCompromise,
    #[serde(rename = "USER_KEY_REMOTE_COMPROMISE")]
    UserKeyRemoteCompromise,
    #[serde(rename = "USER_KEY_PHYSICAL_COMPROMISE")]
    UserKeyPhysicalCompromise,
    #[serde(rename = "UPDATE_AVAILABLE")]
    UpdateAvailable,
    #[serde(rename = "REVOKED")]
    Revoked,
    #[serde(rename = "SELF_ASSERTION_SUBMITTED")]
    SelfAssertionSubmitted,
    #[serde(rename = "FIDO_CERTIFIED_L1")]
    FidoCertifiedL1,
    #[serde(rename = "FIDO_CERTIFIED_L1plus")]
    FidoCertifiedL1Plus,
    #[serde(rename = "FIDO_CERTIFIED_L2")]
    FidoCertifiedL2,
    #[serde(rename = "FIDO_CERTIFIED_L2plus")]
    FidoCertifiedL2Plus,
    #[serde(rename = "FIDO_CERTIFIED_L3")]
    FidoCertifiedL3,
    #[serde(rename = "FIDO_CERTIFIED_L3plus")]
    FidoCertifiedL3Plus,
    /// A status string this build does not know; never trusted.
    #[serde(other)]
    Unknown,
}

impl AuthenticatorStatus {
    pub fn is_fido_certified(self) -> bool {
        matches!(
            self,
            Self::FidoCertified
                | Self::FidoCertifiedL1
                | Self::FidoCertifiedL1Plus
                | Self::FidoCertifiedL2
                | Self::FidoCertifiedL2Plus
                | Self::FidoCertifiedL3
                | Self::FidoCertifiedL3Plus
        )
    }

    pub fn is_compromise(self) -> bool {
        matches!(
            self,
            Self::UserVerificationBypass
                | Self::AttestationKeyCompromise
                | Self::UserKeyRemoteCompromise
                | Self::UserKeyPhysicalCompromise
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOB: &str = r#"{
        "legalHeader": "Retrieval and use of this BLOB indicates acceptance of the appropriate agreement",
        "no": 42,
        "nextUpdate": "2026-04-01",
        "entries": [{
            "aaguid": "2fc0579f-8113-47ea-b116-bb5a8db9202a",
            "metadataStatement": {
                "description": "YubiKey 5 NFC",
                "aaguid": "2fc0579f-8113-47ea-b116-bb5a8db9202a",
                "authenticatorVersion": 50100,
                "protocolFamily": "fido2",
                "schema": 3,
                "attestationTypes": ["basic_full"],
                "attestationRootCertificates": ["AQID"],
                "upv": [{"major": 1, "minor": 0}]
            },
            "statusReports": [
                {"status": "FIDO_CERTIFIED_L1plus", "effectiveDate": "2020-05-12"},
                {"status": "SOMETHING_NEW", "effectiveDate": "2021-01-01"}
            ],
            "timeOfLastStatusChange": "2021-01-01"
        }, {
            "attestationCertificateKeyIdentifiers": ["923881fe2f214ee465484371aeb72e97f5a58e0a"],
            "statusReports": [{"status": "REVOKED"}]
        }]
    }"#;

    #[test]
    fn test_parse_blob_payload() {
        let payload: MetadataBlobPayload = serde_json::from_str(BLOB).unwrap();
        assert_eq!(payload.no, 42);
        assert_eq!(payload.next_update, NaiveDate::from_ymd_opt(2026, 4, 1).unwrap());
        assert_eq!(payload.entries.len(), 2);

        let entry = &payload.entries[0];
        let statement = entry.metadata_statement.as_ref().unwrap();
        assert_eq!(statement.description, "YubiKey 5 NFC");
        assert!(statement.other.contains_key("upv"));
        assert_eq!(entry.attestation_root_certificates(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_unknown_status_is_captured() {
        let payload: MetadataBlobPayload = serde_json::from_str(BLOB).unwrap();
        let statuses: Vec<_> = payload.entries[0]
            .status_reports
            .iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![AuthenticatorStatus::FidoCertifiedL1Plus, AuthenticatorStatus::Unknown]
        );
        assert_eq!(
            payload.entries[0].latest_status().map(|r| r.status),
            Some(AuthenticatorStatus::Unknown)
        );
    }

    #[test]
    fn test_lookup_by_aaguid_and_key_identifier() {
        let payload: MetadataBlobPayload = serde_json::from_str(BLOB).unwrap();
        let aaguid: Aaguid = "2fc0579f-8113-47ea-b116-bb5a8db9202a".parse().unwrap();
        assert_eq!(payload.entries_for_aaguid(&aaguid).count(), 1);

        let key_id = hex::decode("923881fe2f214ee465484371aeb72e97f5a58e0a").unwrap();
        let found: Vec<_> = payload.entries_for_key_identifier(&key_id).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status_reports[0].status, AuthenticatorStatus::Revoked);
    }
}
