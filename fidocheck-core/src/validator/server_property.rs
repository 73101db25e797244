use crate::crypto;

/// What the relying party expects of a ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProperty {
    /// Accepted origins, compared exactly against `clientData.origin`.
    pub origins: Vec<String>,
    pub rp_id: String,
    pub challenge: Vec<u8>,
}

impl ServerProperty {
    pub fn new(origin: impl Into<String>, rp_id: impl Into<String>, challenge: Vec<u8>) -> Self {
        Self {
            origins: vec![origin.into()],
            rp_id: rp_id.into(),
            challenge,
        }
    }

    pub fn with_origins(origins: Vec<String>, rp_id: impl Into<String>, challenge: Vec<u8>) -> Self {
        Self {
            origins,
            rp_id: rp_id.into(),
            challenge,
        }
    }

    pub fn rp_id_hash(&self) -> [u8; 32] {
        crypto::sha256(self.rp_id.as_bytes())
    }

    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }
}
