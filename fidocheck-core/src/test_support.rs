//! Key, certificate and DER fixtures shared by unit and integration tests.
//!
//! Crate items are reached through the `fidocheck` alias so the same file
//! compiles inside the library and under `tests/common`.

use std::sync::atomic::{AtomicU32, Ordering};

use openssl::asn1::{Asn1Object, Asn1OctetString, Asn1Time};
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509Extension, X509NameBuilder, X509};

use super::fidocheck::codec::attestation_object::{AttestationObject, AttestationStatement};
use super::fidocheck::codec::authenticator_data::{
    Aaguid, AttestedCredentialData, AuthenticatorData, AuthenticatorFlags,
};
use super::fidocheck::codec::client_data::CollectedClientData;
use super::fidocheck::codec::cose::{CoseAlgorithm, CoseKey, Ec2Key, EcCurve, RsaKey};
use super::fidocheck::crypto;
use super::fidocheck::validator::{RegistrationObject, ServerProperty};

static SERIAL: AtomicU32 = AtomicU32::new(1);

pub fn p256_keypair() -> (PKey<Private>, CoseKey) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("group");
    let ec = EcKey::generate(&group).expect("ec key");
    let key = PKey::from_ec_key(ec).expect("pkey");
    let cose = ec_cose_key(&key, CoseAlgorithm::ES256);
    (key, cose)
}

pub fn rsa_keypair() -> (PKey<Private>, CoseKey) {
    let rsa = Rsa::generate(2048).expect("rsa key");
    let cose = CoseKey::Rsa(RsaKey {
        alg: Some(CoseAlgorithm::RS256),
        kid: None,
        n: rsa.n().to_vec(),
        e: rsa.e().to_vec(),
    });
    (PKey::from_rsa(rsa).expect("pkey"), cose)
}

/// COSE form of an EC P-256 private key's public half.
pub fn ec_cose_key(key: &PKey<Private>, alg: CoseAlgorithm) -> CoseKey {
    let ec = key.ec_key().expect("ec key");
    let mut ctx = BigNumContext::new().expect("ctx");
    let mut x = BigNum::new().expect("bn");
    let mut y = BigNum::new().expect("bn");
    ec.public_key()
        .affine_coordinates(ec.group(), &mut x, &mut y, &mut ctx)
        .expect("coordinates");
    CoseKey::Ec2(Ec2Key {
        alg: Some(alg),
        kid: None,
        curve: EcCurve::P256,
        x: x.to_vec_padded(32).expect("x"),
        y: y.to_vec_padded(32).expect("y"),
    })
}

pub fn sign(key: &PKey<Private>, md: MessageDigest, data: &[u8]) -> Vec<u8> {
    let mut signer = Signer::new(md, key).expect("signer");
    signer.update(data).expect("update");
    signer.sign_to_vec().expect("sign")
}

/// Builder for test certificates. Defaults to a v3 certificate valid from
/// yesterday until next year.
pub struct CertBuilder<'a> {
    key: &'a PKey<Private>,
    subject: Vec<(String, String)>,
    ca: Option<bool>,
    eku: Vec<String>,
    aaguid: Option<[u8; 16]>,
    san: bool,
    extensions: Vec<(String, bool, Vec<u8>)>,
    not_before: i64,
    not_after: i64,
    version: i32,
}

impl<'a> CertBuilder<'a> {
    pub fn new(key: &'a PKey<Private>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            key,
            subject: vec![("CN".into(), "Test Certificate".into())],
            ca: None,
            eku: Vec::new(),
            aaguid: None,
            san: false,
            extensions: Vec::new(),
            not_before: now - 86_400,
            not_after: now + 365 * 86_400,
            version: 2,
        }
    }

    pub fn subject(mut self, entries: &[(&str, &str)]) -> Self {
        self.subject = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    pub fn ca(mut self, ca: bool) -> Self {
        self.ca = Some(ca);
        self
    }

    pub fn extended_key_usage(mut self, oid: &str) -> Self {
        self.eku.push(oid.to_string());
        self
    }

    pub fn aaguid(mut self, aaguid: [u8; 16]) -> Self {
        self.aaguid = Some(aaguid);
        self
    }

    pub fn subject_alt_name(mut self) -> Self {
        self.san = true;
        self
    }

    /// Custom extension; `value` is the DER placed inside extnValue.
    pub fn extension(mut self, oid: &str, critical: bool, value: Vec<u8>) -> Self {
        self.extensions.push((oid.to_string(), critical, value));
        self
    }

    pub fn validity(mut self, not_before: i64, not_after: i64) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    /// Zero-based X.509 version field.
    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn build_self_signed(self) -> Vec<u8> {
        let key = self.key;
        self.build(None, key)
    }

    pub fn build_signed_by(self, issuer_der: &[u8], issuer_key: &PKey<Private>) -> Vec<u8> {
        let issuer = X509::from_der(issuer_der).expect("issuer cert");
        self.build(Some(issuer), issuer_key)
    }

    fn build(self, issuer: Option<X509>, signing_key: &PKey<Private>) -> Vec<u8> {
        let mut builder = X509Builder::new().expect("builder");
        builder.set_version(self.version).expect("version");
        let serial = BigNum::from_u32(SERIAL.fetch_add(1, Ordering::Relaxed))
            .and_then(|bn| bn.to_asn1_integer())
            .expect("serial");
        builder.set_serial_number(&serial).expect("serial");

        let mut name = X509NameBuilder::new().expect("name");
        for (k, v) in &self.subject {
            name.append_entry_by_text(k, v).expect("name entry");
        }
        let name = name.build();
        builder.set_subject_name(&name).expect("subject");
        match &issuer {
            Some(issuer) => builder.set_issuer_name(issuer.subject_name()),
            None => builder.set_issuer_name(&name),
        }
        .expect("issuer");
        builder.set_pubkey(self.key).expect("pubkey");
        builder
            .set_not_before(&Asn1Time::from_unix(self.not_before).expect("time"))
            .expect("not before");
        builder
            .set_not_after(&Asn1Time::from_unix(self.not_after).expect("time"))
            .expect("not after");

        if let Some(ca) = self.ca {
            let mut bc = BasicConstraints::new();
            if ca {
                bc.critical().ca();
            }
            builder.append_extension(bc.build().expect("bc")).expect("bc");
        }
        if !self.eku.is_empty() {
            let mut eku = ExtendedKeyUsage::new();
            for oid in &self.eku {
                eku.other(oid);
            }
            builder.append_extension(eku.build().expect("eku")).expect("eku");
        }
        if self.san {
            let san = SubjectAlternativeName::new()
                .critical()
                .dns("tpm.example.com")
                .build(&builder.x509v3_context(issuer.as_deref(), None))
                .expect("san");
            builder.append_extension(san).expect("san");
        }
        if let Some(aaguid) = self.aaguid {
            let ext = custom_extension("1.3.6.1.4.1.45724.1.1.4", false, &der::octets(&aaguid));
            builder.append_extension(ext).expect("aaguid");
        }
        for (oid, critical, value) in &self.extensions {
            builder
                .append_extension(custom_extension(oid, *critical, value))
                .expect("extension");
        }

        builder
            .sign(signing_key, MessageDigest::sha256())
            .expect("sign");
        builder.build().to_der().expect("der")
    }
}

fn custom_extension(oid: &str, critical: bool, value: &[u8]) -> X509Extension {
    let object = Asn1Object::from_str(oid).expect("oid");
    let octets = Asn1OctetString::new_from_bytes(value).expect("octets");
    X509Extension::new_from_der(&object, critical, &octets).expect("extension")
}

/// Tiny DER writer for hand-built extension payloads.
pub mod der {
    fn tlv(tag: &[u8], content: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        let len = content.len();
        if len < 0x80 {
            out.push(len as u8);
        } else {
            let bytes: Vec<u8> = len
                .to_be_bytes()
                .iter()
                .copied()
                .skip_while(|b| *b == 0)
                .collect();
            out.push(0x80 | bytes.len() as u8);
            out.extend(bytes);
        }
        out.extend_from_slice(content);
        out
    }

    pub fn seq(items: &[Vec<u8>]) -> Vec<u8> {
        tlv(&[0x30], &items.concat())
    }

    pub fn set(items: &[Vec<u8>]) -> Vec<u8> {
        tlv(&[0x31], &items.concat())
    }

    pub fn int(value: i64) -> Vec<u8> {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < 7
            && ((bytes[start] == 0 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0))
        {
            start += 1;
        }
        tlv(&[0x02], &bytes[start..])
    }

    pub fn enumerated(value: i64) -> Vec<u8> {
        let mut out = int(value);
        out[0] = 0x0a;
        out
    }

    pub fn octets(bytes: &[u8]) -> Vec<u8> {
        tlv(&[0x04], bytes)
    }

    pub fn null() -> Vec<u8> {
        vec![0x05, 0x00]
    }

    pub fn boolean(value: bool) -> Vec<u8> {
        vec![0x01, 0x01, if value { 0xff } else { 0x00 }]
    }

    /// Context-specific constructed `[tag] EXPLICIT inner`, high-tag form when needed.
    pub fn explicit(tag: u32, inner: &[u8]) -> Vec<u8> {
        let header = if tag < 31 {
            vec![0xa0 | tag as u8]
        } else {
            let mut digits = Vec::new();
            let mut t = tag;
            while t > 0 {
                digits.push((t & 0x7f) as u8);
                t >>= 7;
            }
            digits.reverse();
            let last = digits.len() - 1;
            for d in &mut digits[..last] {
                *d |= 0x80;
            }
            let mut h = vec![0xbf];
            h.extend(digits);
            h
        };
        tlv(&header, inner)
    }
}

/// Ceremony payload builders.
pub mod fixtures {
    use super::*;

    /// Encoded authenticator data for `rp_id`. The AT flag is set whenever a
    /// credential is supplied.
    pub fn auth_data(
        rp_id: &str,
        flags: u8,
        sign_count: u32,
        credential: Option<(Aaguid, Vec<u8>, CoseKey)>,
    ) -> Vec<u8> {
        let mut flags = flags & !AuthenticatorFlags::EXTENSION_DATA;
        if credential.is_some() {
            flags |= AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA;
        } else {
            flags &= !AuthenticatorFlags::ATTESTED_CREDENTIAL_DATA;
        }
        AuthenticatorData {
            rp_id_hash: crypto::sha256(rp_id.as_bytes()),
            flags: AuthenticatorFlags(flags),
            sign_count,
            attested_credential_data: credential.map(|(aaguid, credential_id, key)| {
                AttestedCredentialData {
                    aaguid,
                    credential_id,
                    credential_public_key: key,
                }
            }),
            extensions: None,
        }
        .encode()
        .expect("auth data")
    }

    pub fn attestation_object(auth_data: &[u8], statement: AttestationStatement) -> Vec<u8> {
        AttestationObject {
            auth_data: AuthenticatorData::decode(auth_data).expect("auth data"),
            auth_data_bytes: auth_data.to_vec(),
            statement,
        }
        .encode()
        .expect("attestation object")
    }

    pub fn none_attestation_object(auth_data: &[u8]) -> Vec<u8> {
        attestation_object(auth_data, AttestationStatement::None)
    }

    pub fn client_data(ty: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
        CollectedClientData::to_json(ty, challenge, origin, None).expect("client data")
    }

    /// Client data from an embedded iframe, `crossOrigin: true`.
    pub fn cross_origin_client_data(ty: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
        let mut value: serde_json::Value =
            serde_json::from_slice(&client_data(ty, challenge, origin)).expect("client data json");
        value["crossOrigin"] = serde_json::Value::Bool(true);
        serde_json::to_vec(&value).expect("client data json")
    }

    /// `authData || sha256(clientDataJSON)`
    pub fn signed_data(auth_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
        crypto::concat(&[auth_data, &crypto::sha256(client_data_json)])
    }

    /// Registration for `https://example.com` as seen at `timestamp`, for
    /// driving a single statement verifier.
    pub fn registration(
        attestation_object: &[u8],
        client_data_json: &[u8],
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> RegistrationObject {
        RegistrationObject::from_parts(
            CollectedClientData::decode(client_data_json).expect("client data"),
            attestation_object,
            ServerProperty::new("https://example.com", "example.com", b"challenge".to_vec()),
            timestamp,
        )
        .expect("registration object")
    }

    /// Replace the client data with a document that keeps type, challenge
    /// and origin but hashes differently.
    pub fn tamper_client_data(registration: &mut RegistrationObject) {
        let mut value: serde_json::Value =
            serde_json::from_slice(&registration.client_data.raw).expect("client data json");
        value["extra"] = serde_json::Value::Bool(true);
        let json = serde_json::to_vec(&value).expect("client data json");
        registration.client_data = CollectedClientData::decode(&json).expect("client data");
    }
}
