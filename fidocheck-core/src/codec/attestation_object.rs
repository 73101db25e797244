//! Attestation object: `{fmt, authData, attStmt}` and the seven statement shapes.

use std::fmt;
use std::str::FromStr;

use ciborium::value::{Integer, Value};

use super::authenticator_data::AuthenticatorData;
use super::cose::CoseAlgorithm;
use crate::error::{Result, VerificationError};

/// Closed set of attestation statement formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttestationFormat {
    None,
    FidoU2f,
    Packed,
    AndroidSafetyNet,
    AndroidKey,
    Tpm,
    Apple,
}

impl AttestationFormat {
    pub const ALL: [AttestationFormat; 7] = [
        Self::None,
        Self::FidoU2f,
        Self::Packed,
        Self::AndroidSafetyNet,
        Self::AndroidKey,
        Self::Tpm,
        Self::Apple,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FidoU2f => "fido-u2f",
            Self::Packed => "packed",
            Self::AndroidSafetyNet => "android-safetynet",
            Self::AndroidKey => "android-key",
            Self::Tpm => "tpm",
            Self::Apple => "apple",
        }
    }
}

impl FromStr for AttestationFormat {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| VerificationError::UnsupportedFormat(s.to_string()))
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FidoU2fStatement {
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedStatement {
    pub alg: CoseAlgorithm,
    pub sig: Vec<u8>,
    pub x5c: Option<Vec<Vec<u8>>>,
    pub ecdaa_key_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidKeyStatement {
    pub alg: CoseAlgorithm,
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
}

/// Apple anonymous attestation carries no signature; the nonce lives in the
/// leaf certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleStatement {
    pub x5c: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidSafetyNetStatement {
    pub ver: String,
    /// Compact JWS, UTF-8.
    pub response: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmStatement {
    pub ver: String,
    pub alg: CoseAlgorithm,
    pub x5c: Option<Vec<Vec<u8>>>,
    pub ecdaa_key_id: Option<Vec<u8>>,
    pub sig: Vec<u8>,
    pub cert_info: Vec<u8>,
    pub pub_area: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationStatement {
    None,
    FidoU2f(FidoU2fStatement),
    Packed(PackedStatement),
    AndroidSafetyNet(AndroidSafetyNetStatement),
    AndroidKey(AndroidKeyStatement),
    Tpm(TpmStatement),
    Apple(AppleStatement),
}

impl AttestationStatement {
    pub fn format(&self) -> AttestationFormat {
        match self {
            Self::None => AttestationFormat::None,
            Self::FidoU2f(_) => AttestationFormat::FidoU2f,
            Self::Packed(_) => AttestationFormat::Packed,
            Self::AndroidSafetyNet(_) => AttestationFormat::AndroidSafetyNet,
            Self::AndroidKey(_) => AttestationFormat::AndroidKey,
            Self::Tpm(_) => AttestationFormat::Tpm,
            Self::Apple(_) => AttestationFormat::Apple,
        }
    }

    /// Certificate chain carried directly in the statement, leaf first.
    ///
    /// SafetyNet keeps its chain inside the JWS header and returns `None` here.
    pub fn x5c(&self) -> Option<&[Vec<u8>]> {
        match self {
            Self::FidoU2f(s) => Some(&s.x5c),
            Self::AndroidKey(s) => Some(&s.x5c),
            Self::Apple(s) => Some(&s.x5c),
            Self::Packed(s) => s.x5c.as_deref(),
            Self::Tpm(s) => s.x5c.as_deref(),
            Self::None | Self::AndroidSafetyNet(_) => None,
        }
    }

    fn decode(format: AttestationFormat, value: &Value) -> Result<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| VerificationError::decode("attStmt is not a CBOR map"))?;
        let stmt = StatementFields { map };

        Ok(match format {
            AttestationFormat::None => {
                if !map.is_empty() {
                    return Err(VerificationError::bad_statement(
                        "none attestation must carry an empty attStmt",
                    ));
                }
                Self::None
            }
            AttestationFormat::FidoU2f => Self::FidoU2f(FidoU2fStatement {
                sig: stmt.required_bytes("sig")?,
                x5c: stmt
                    .cert_chain("x5c")?
                    .ok_or_else(|| VerificationError::bad_statement("fido-u2f: missing x5c"))?,
            }),
            AttestationFormat::Packed => Self::Packed(PackedStatement {
                alg: stmt.alg()?,
                sig: stmt.required_bytes("sig")?,
                x5c: stmt.cert_chain("x5c")?,
                ecdaa_key_id: stmt.bytes("ecdaaKeyId")?,
            }),
            AttestationFormat::AndroidKey => Self::AndroidKey(AndroidKeyStatement {
                alg: stmt.alg()?,
                sig: stmt.required_bytes("sig")?,
                x5c: stmt
                    .cert_chain("x5c")?
                    .ok_or_else(|| VerificationError::bad_statement("android-key: missing x5c"))?,
            }),
            AttestationFormat::AndroidSafetyNet => {
                Self::AndroidSafetyNet(AndroidSafetyNetStatement {
                    ver: stmt.required_text("ver")?,
                    response: stmt.required_bytes("response")?,
                })
            }
            AttestationFormat::Tpm => Self::Tpm(TpmStatement {
                ver: stmt.required_text("ver")?,
                alg: stmt.alg()?,
                x5c: stmt.cert_chain("x5c")?,
                ecdaa_key_id: stmt.bytes("ecdaaKeyId")?,
                sig: stmt.required_bytes("sig")?,
                cert_info: stmt.required_bytes("certInfo")?,
                pub_area: stmt.required_bytes("pubArea")?,
            }),
            AttestationFormat::Apple => Self::Apple(AppleStatement {
                x5c: stmt
                    .cert_chain("x5c")?
                    .ok_or_else(|| VerificationError::bad_statement("apple: missing x5c"))?,
            }),
        })
    }

    fn to_value(&self) -> Value {
        let mut m: Vec<(Value, Value)> = Vec::new();
        let mut put = |k: &str, v: Value| m.push((Value::Text(k.into()), v));
        let chain = |c: &[Vec<u8>]| Value::Array(c.iter().cloned().map(Value::Bytes).collect());
        let alg = |a: CoseAlgorithm| Value::Integer(Integer::from(a.id()));
        match self {
            Self::None => {}
            Self::FidoU2f(s) => {
                put("sig", Value::Bytes(s.sig.clone()));
                put("x5c", chain(&s.x5c));
            }
            Self::Packed(s) => {
                put("alg", alg(s.alg));
                put("sig", Value::Bytes(s.sig.clone()));
                if let Some(x5c) = &s.x5c {
                    put("x5c", chain(x5c));
                }
                if let Some(id) = &s.ecdaa_key_id {
                    put("ecdaaKeyId", Value::Bytes(id.clone()));
                }
            }
            Self::AndroidKey(s) => {
                put("alg", alg(s.alg));
                put("sig", Value::Bytes(s.sig.clone()));
                put("x5c", chain(&s.x5c));
            }
            Self::AndroidSafetyNet(s) => {
                put("ver", Value::Text(s.ver.clone()));
                put("response", Value::Bytes(s.response.clone()));
            }
            Self::Tpm(s) => {
                put("ver", Value::Text(s.ver.clone()));
                put("alg", alg(s.alg));
                if let Some(x5c) = &s.x5c {
                    put("x5c", chain(x5c));
                }
                if let Some(id) = &s.ecdaa_key_id {
                    put("ecdaaKeyId", Value::Bytes(id.clone()));
                }
                put("sig", Value::Bytes(s.sig.clone()));
                put("certInfo", Value::Bytes(s.cert_info.clone()));
                put("pubArea", Value::Bytes(s.pub_area.clone()));
            }
            Self::Apple(s) => put("x5c", chain(&s.x5c)),
        }
        Value::Map(m)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub auth_data: AuthenticatorData,
    /// Exact bytes of `authData`; signatures are computed over these.
    pub auth_data_bytes: Vec<u8>,
    pub statement: AttestationStatement,
}

impl AttestationObject {
    pub fn format(&self) -> AttestationFormat {
        self.statement.format()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let value: Value = ciborium::de::from_reader(&mut reader)
            .map_err(|e| VerificationError::decode(format!("attestation object: {e}")))?;
        if !reader.is_empty() {
            return Err(VerificationError::decode("attestation object: trailing bytes"));
        }
        let map = value
            .as_map()
            .ok_or_else(|| VerificationError::decode("attestation object is not a CBOR map"))?;
        let fields = StatementFields { map };

        let fmt_name = fields
            .text("fmt")?
            .ok_or_else(|| VerificationError::decode("attestation object: missing fmt"))?;
        let auth_data_bytes = fields
            .bytes("authData")?
            .ok_or_else(|| VerificationError::decode("attestation object: missing authData"))?;
        let att_stmt = fields
            .get("attStmt")
            .ok_or_else(|| VerificationError::decode("attestation object: missing attStmt"))?;

        let format: AttestationFormat = fmt_name.parse()?;
        let auth_data = AuthenticatorData::decode(&auth_data_bytes)?;
        let statement = AttestationStatement::decode(format, att_stmt)?;

        Ok(Self {
            auth_data,
            auth_data_bytes,
            statement,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let value = Value::Map(vec![
            (
                Value::Text("fmt".into()),
                Value::Text(self.format().as_str().into()),
            ),
            (
                Value::Text("attStmt".into()),
                self.statement.to_value(),
            ),
            (
                Value::Text("authData".into()),
                Value::Bytes(self.auth_data_bytes.clone()),
            ),
        ]);
        let mut out = Vec::new();
        ciborium::ser::into_writer(&value, &mut out)
            .map_err(|e| VerificationError::decode(format!("attestation object encode: {e}")))?;
        Ok(out)
    }
}

struct StatementFields<'a> {
    map: &'a [(Value, Value)],
}

impl StatementFields<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.map
            .iter()
            .find_map(|(k, v)| (k.as_text() == Some(key)).then_some(v))
    }

    fn bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bytes(b)) => Ok(Some(b.clone())),
            Some(_) => Err(VerificationError::bad_statement(format!(
                "{key} is not a byte string"
            ))),
        }
    }

    fn text(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Text(t)) => Ok(Some(t.clone())),
            Some(_) => Err(VerificationError::bad_statement(format!(
                "{key} is not a text string"
            ))),
        }
    }

    fn required_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.bytes(key)?
            .ok_or_else(|| VerificationError::bad_statement(format!("missing {key}")))
    }

    fn required_text(&self, key: &str) -> Result<String> {
        self.text(key)?
            .ok_or_else(|| VerificationError::bad_statement(format!("missing {key}")))
    }

    fn alg(&self) -> Result<CoseAlgorithm> {
        match self.get("alg") {
            Some(Value::Integer(i)) => {
                let id = i64::try_from(i128::from(*i))
                    .map_err(|_| VerificationError::bad_statement("alg out of range"))?;
                CoseAlgorithm::from_id(id)
            }
            Some(_) => Err(VerificationError::bad_statement("alg is not an integer")),
            None => Err(VerificationError::bad_statement("missing alg")),
        }
    }

    fn cert_chain(&self, key: &str) -> Result<Option<Vec<Vec<u8>>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => {
                if items.is_empty() {
                    return Err(VerificationError::bad_statement(format!("{key} is empty")));
                }
                items
                    .iter()
                    .map(|item| match item {
                        Value::Bytes(b) => Ok(b.clone()),
                        _ => Err(VerificationError::bad_statement(format!(
                            "{key} entry is not a byte string"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Some)
            }
            Some(_) => Err(VerificationError::bad_statement(format!(
                "{key} is not an array"
            ))),
        }
    }
}
