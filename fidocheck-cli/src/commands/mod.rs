pub mod inspect;
pub mod mds;
pub mod verify_registration;

use fidocheck_core::codec::AttestationObject;

/// Attestation format name for display, or `unknown` when undecodable.
pub fn attestation_format(attestation_object: &[u8]) -> String {
    AttestationObject::decode(attestation_object)
        .map(|o| o.format().to_string())
        .unwrap_or_else(|_| "unknown".into())
}
