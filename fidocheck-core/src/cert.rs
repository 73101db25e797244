//! X.509 attestation certificate accessors.
//!
//! openssl owns the certificate for signature and path work; `x509-parser`
//! is used for field access. Extension payloads are decoded with the crate's
//! own BER reader.

use openssl::pkey::{PKey, Public};
use openssl::x509::X509;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::codec::asn1::{Asn1Node, TAG_BOOLEAN};
use crate::codec::authenticator_data::Aaguid;
use crate::crypto;
use crate::error::{Result, VerificationError};

pub const OID_SUBJECT_ALT_NAME: &str = "2.5.29.17";
pub const OID_BASIC_CONSTRAINTS: &str = "2.5.29.19";
pub const OID_CERTIFICATE_POLICIES: &str = "2.5.29.32";
pub const OID_EXTENDED_KEY_USAGE: &str = "2.5.29.37";
pub const OID_FIDO_GEN_CE_AAGUID: &str = "1.3.6.1.4.1.45724.1.1.4";
pub const OID_TCG_KP_AIK_CERTIFICATE: &str = "2.23.133.8.3";

/// A DER certificate from an attestation statement or metadata.
#[derive(Clone)]
pub struct AttestationCertificate {
    der: Vec<u8>,
    x509: X509,
}

impl std::fmt::Debug for AttestationCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationCertificate")
            .field("subject", &self.subject_string())
            .finish()
    }
}

impl PartialEq for AttestationCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for AttestationCertificate {}

impl AttestationCertificate {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let x509 = X509::from_der(der)
            .map_err(|e| VerificationError::bad_statement(format!("malformed certificate: {e}")))?;
        let (rest, _) = X509Certificate::from_der(der)
            .map_err(|e| VerificationError::bad_statement(format!("malformed certificate: {e}")))?;
        if !rest.is_empty() {
            return Err(VerificationError::bad_statement(
                "trailing bytes after certificate",
            ));
        }
        Ok(Self {
            der: der.to_vec(),
            x509,
        })
    }

    /// Parse an `x5c` chain, leaf first.
    pub fn chain_from_der(chain: &[Vec<u8>]) -> Result<Vec<Self>> {
        chain.iter().map(|der| Self::from_der(der)).collect()
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    fn parsed(&self) -> Result<X509Certificate<'_>> {
        X509Certificate::from_der(&self.der)
            .map(|(_, cert)| cert)
            .map_err(|e| VerificationError::bad_statement(format!("malformed certificate: {e}")))
    }

    pub fn public_key(&self) -> Result<PKey<Public>> {
        Ok(self.x509.public_key()?)
    }

    /// 1-based X.509 version.
    pub fn version(&self) -> Result<u32> {
        Ok(self.parsed()?.version().0 + 1)
    }

    pub fn subject_string(&self) -> String {
        self.parsed()
            .map(|c| c.subject().to_string())
            .unwrap_or_default()
    }

    pub fn subject_is_empty(&self) -> Result<bool> {
        Ok(self.parsed()?.subject().iter().next().is_none())
    }

    pub fn common_name(&self) -> Result<Option<String>> {
        let cert = self.parsed()?;
        let cn = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_owned);
        Ok(cn)
    }

    pub fn country(&self) -> Result<Option<String>> {
        let cert = self.parsed()?;
        let value = cert
            .subject()
            .iter_country()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_owned);
        Ok(value)
    }

    pub fn organization(&self) -> Result<Option<String>> {
        let cert = self.parsed()?;
        let value = cert
            .subject()
            .iter_organization()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_owned);
        Ok(value)
    }

    pub fn organizational_unit(&self) -> Result<Option<String>> {
        let cert = self.parsed()?;
        let value = cert
            .subject()
            .iter_organizational_unit()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_owned);
        Ok(value)
    }

    /// Raw extnValue contents (the bytes inside the OCTET STRING).
    pub fn extension_value(&self, oid: &str) -> Result<Option<Vec<u8>>> {
        let cert = self.parsed()?;
        let value = cert
            .extensions()
            .iter()
            .find(|ext| ext.oid.to_id_string() == oid)
            .map(|ext| ext.value.to_vec());
        Ok(value)
    }

    pub fn has_extension(&self, oid: &str) -> Result<bool> {
        Ok(self.extension_value(oid)?.is_some())
    }

    /// Basic constraints cA flag; a certificate without the extension is not a CA.
    pub fn is_ca(&self) -> Result<bool> {
        let Some(value) = self.extension_value(OID_BASIC_CONSTRAINTS)? else {
            return Ok(false);
        };
        let node = Asn1Node::parse(&value)?;
        match node.sequence()?.first() {
            Some(first) if first.is_universal(TAG_BOOLEAN) => first.as_bool(),
            _ => Ok(false),
        }
    }

    pub fn extended_key_usages(&self) -> Result<Vec<String>> {
        let Some(value) = self.extension_value(OID_EXTENDED_KEY_USAGE)? else {
            return Ok(Vec::new());
        };
        Asn1Node::parse(&value)?
            .sequence()?
            .iter()
            .map(Asn1Node::as_oid)
            .collect()
    }

    /// Whether any certificate policy carries policy qualifiers.
    pub fn has_policy_qualifiers(&self) -> Result<bool> {
        let Some(value) = self.extension_value(OID_CERTIFICATE_POLICIES)? else {
            return Ok(false);
        };
        let node = Asn1Node::parse(&value)?;
        for policy in node.sequence()? {
            if policy.sequence()?.len() > 1 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// AAGUID from the FIDO `id-fido-gen-ce-aaguid` extension, if present.
    pub fn aaguid_extension(&self) -> Result<Option<Aaguid>> {
        let Some(value) = self.extension_value(OID_FIDO_GEN_CE_AAGUID)? else {
            return Ok(None);
        };
        let inner = Asn1Node::parse(&value)
            .and_then(|node| node.as_octet_string())
            .map_err(|_| VerificationError::bad_statement("AAGUID extension is malformed"))?;
        Aaguid::from_slice(&inner)
            .map(Some)
            .map_err(|_| VerificationError::bad_statement("AAGUID extension is not 16 bytes"))
    }

    /// Contents of the subjectPublicKey BIT STRING.
    pub fn subject_public_key_bits(&self) -> Result<Vec<u8>> {
        let spki = self.public_key()?.public_key_to_der()?;
        let node = Asn1Node::parse(&spki)?;
        node.child(1)?.as_bit_string()
    }

    /// FIDO U2F attestation key identifier: SHA-1 over the public key bits.
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        Ok(crypto::sha1(&self.subject_public_key_bits()?).to_vec())
    }

    /// Whether this certificate verifies under its own public key.
    pub fn is_self_signed(&self) -> Result<bool> {
        let key = self.public_key()?;
        Ok(self.x509.verify(&key).unwrap_or(false))
    }
}
