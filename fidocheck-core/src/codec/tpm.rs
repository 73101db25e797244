//! TPM 2.0 structures carried by the `tpm` attestation format.
//!
//! All integers are big-endian. Every length prefix is checked against the
//! remaining input and surplus bytes after the structure are rejected.

use openssl::hash::MessageDigest;

use crate::error::{Result, VerificationError};

pub const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
pub const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

pub const TPM_ALG_RSA: u16 = 0x0001;
pub const TPM_ALG_SHA1: u16 = 0x0004;
pub const TPM_ALG_SHA256: u16 = 0x000B;
pub const TPM_ALG_SHA384: u16 = 0x000C;
pub const TPM_ALG_SHA512: u16 = 0x000D;
pub const TPM_ALG_NULL: u16 = 0x0010;
pub const TPM_ALG_ECC: u16 = 0x0023;

pub const TPM_ECC_NIST_P256: u16 = 0x0003;
pub const TPM_ECC_NIST_P384: u16 = 0x0004;
pub const TPM_ECC_NIST_P521: u16 = 0x0005;

/// Digest for a TPM_ALG_ID naming a hash. Anything else is unsupported.
pub fn name_alg_digest(alg: u16) -> Result<MessageDigest> {
    match alg {
        TPM_ALG_SHA1 => Ok(MessageDigest::sha1()),
        TPM_ALG_SHA256 => Ok(MessageDigest::sha256()),
        TPM_ALG_SHA384 => Ok(MessageDigest::sha384()),
        TPM_ALG_SHA512 => Ok(MessageDigest::sha512()),
        other => Err(VerificationError::UnsupportedAlgorithm(format!(
            "TPM name algorithm {other:#06x}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockInfo {
    pub clock: u64,
    pub reset_count: u32,
    pub restart_count: u32,
    pub safe: bool,
}

/// TPM2B_NAME holding a digest: `nameAlg || H(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmName {
    pub hash_alg: u16,
    pub digest: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    pub magic: u32,
    pub attest_type: u16,
    pub qualified_signer: Vec<u8>,
    pub extra_data: Vec<u8>,
    pub clock_info: ClockInfo,
    pub firmware_version: u64,
    pub attested_name: TpmName,
    pub attested_qualified_name: Vec<u8>,
}

impl TpmsAttest {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes, "TPMS_ATTEST");
        let magic = r.u32()?;
        let attest_type = r.u16()?;
        let qualified_signer = r.sized()?.to_vec();
        let extra_data = r.sized()?.to_vec();
        let clock_info = ClockInfo {
            clock: r.u64()?,
            reset_count: r.u32()?,
            restart_count: r.u32()?,
            safe: r.u8()? != 0,
        };
        let firmware_version = r.u64()?;

        let name = r.sized()?;
        if name.len() < 2 {
            return Err(VerificationError::decode("TPMS_ATTEST: attested name too short"));
        }
        let attested_name = TpmName {
            hash_alg: u16::from_be_bytes([name[0], name[1]]),
            digest: name[2..].to_vec(),
        };
        let attested_qualified_name = r.sized()?.to_vec();
        r.finish()?;

        Ok(Self {
            magic,
            attest_type,
            qualified_signer,
            extra_data,
            clock_info,
            firmware_version,
            attested_name,
            attested_qualified_name,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(self.magic.to_be_bytes());
        out.extend(self.attest_type.to_be_bytes());
        put_sized(&mut out, &self.qualified_signer);
        put_sized(&mut out, &self.extra_data);
        out.extend(self.clock_info.clock.to_be_bytes());
        out.extend(self.clock_info.reset_count.to_be_bytes());
        out.extend(self.clock_info.restart_count.to_be_bytes());
        out.push(u8::from(self.clock_info.safe));
        out.extend(self.firmware_version.to_be_bytes());
        let mut name = self.attested_name.hash_alg.to_be_bytes().to_vec();
        name.extend(&self.attested_name.digest);
        put_sized(&mut out, &name);
        put_sized(&mut out, &self.attested_qualified_name);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmParameters {
    Rsa {
        symmetric: u16,
        scheme: u16,
        key_bits: u16,
        /// Zero on the wire means the default exponent 65537; stored resolved.
        exponent: u32,
    },
    Ecc {
        symmetric: u16,
        scheme: u16,
        curve_id: u16,
        kdf: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmUnique {
    Rsa { n: Vec<u8> },
    Ecc { x: Vec<u8>, y: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    pub key_type: u16,
    pub name_alg: u16,
    pub object_attributes: u32,
    pub auth_policy: Vec<u8>,
    pub parameters: TpmParameters,
    pub unique: TpmUnique,
}

impl TpmtPublic {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes, "TPMT_PUBLIC");
        let key_type = r.u16()?;
        let name_alg = r.u16()?;
        let object_attributes = r.u32()?;
        let auth_policy = r.sized()?.to_vec();

        let (parameters, unique) = match key_type {
            TPM_ALG_RSA => {
                let symmetric = r.u16()?;
                let scheme = r.u16()?;
                let key_bits = r.u16()?;
                let exponent = match r.u32()? {
                    0 => 65537,
                    e => e,
                };
                let n = r.sized()?.to_vec();
                (
                    TpmParameters::Rsa {
                        symmetric,
                        scheme,
                        key_bits,
                        exponent,
                    },
                    TpmUnique::Rsa { n },
                )
            }
            TPM_ALG_ECC => {
                let params = TpmParameters::Ecc {
                    symmetric: r.u16()?,
                    scheme: r.u16()?,
                    curve_id: r.u16()?,
                    kdf: r.u16()?,
                };
                let x = r.sized()?.to_vec();
                let y = r.sized()?.to_vec();
                (params, TpmUnique::Ecc { x, y })
            }
            other => {
                return Err(VerificationError::UnsupportedAlgorithm(format!(
                    "TPM key type {other:#06x}"
                )))
            }
        };
        r.finish()?;

        Ok(Self {
            key_type,
            name_alg,
            object_attributes,
            auth_policy,
            parameters,
            unique,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(self.key_type.to_be_bytes());
        out.extend(self.name_alg.to_be_bytes());
        out.extend(self.object_attributes.to_be_bytes());
        put_sized(&mut out, &self.auth_policy);
        match &self.parameters {
            TpmParameters::Rsa {
                symmetric,
                scheme,
                key_bits,
                exponent,
            } => {
                out.extend(symmetric.to_be_bytes());
                out.extend(scheme.to_be_bytes());
                out.extend(key_bits.to_be_bytes());
                out.extend(exponent.to_be_bytes());
            }
            TpmParameters::Ecc {
                symmetric,
                scheme,
                curve_id,
                kdf,
            } => {
                out.extend(symmetric.to_be_bytes());
                out.extend(scheme.to_be_bytes());
                out.extend(curve_id.to_be_bytes());
                out.extend(kdf.to_be_bytes());
            }
        }
        match &self.unique {
            TpmUnique::Rsa { n } => put_sized(&mut out, n),
            TpmUnique::Ecc { x, y } => {
                put_sized(&mut out, x);
                put_sized(&mut out, y);
            }
        }
        out
    }
}

fn put_sized(out: &mut Vec<u8>, bytes: &[u8]) {
    // TPM2B sizes are u16; callers only build structures from bounded inputs.
    let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    out.extend(len.to_be_bytes());
    out.extend(&bytes[..usize::from(len)]);
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8], what: &'static str) -> Self {
        Self { bytes, pos: 0, what }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|e| *e <= self.bytes.len());
        match end {
            Some(end) => {
                let out = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(VerificationError::decode(format!(
                "{}: need {n} bytes at offset {}, have {}",
                self.what,
                self.pos,
                self.bytes.len() - self.pos
            ))),
        }
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    fn sized(&mut self) -> Result<&'a [u8]> {
        let len = usize::from(self.u16()?);
        self.take(len)
    }

    fn finish(&self) -> Result<()> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(VerificationError::decode(format!(
                "{}: {} surplus bytes",
                self.what,
                self.bytes.len() - self.pos
            )))
        }
    }
}
