//! Decoders for authenticator-produced structures.

pub mod asn1;
pub mod attestation_object;
pub mod authenticator_data;
pub mod client_data;
pub mod cose;
pub mod jws;
pub mod tpm;

pub use attestation_object::{AttestationFormat, AttestationObject, AttestationStatement};
pub use authenticator_data::{Aaguid, AttestedCredentialData, AuthenticatorData, AuthenticatorFlags};
pub use client_data::CollectedClientData;
pub use cose::{CoseAlgorithm, CoseKey};
