//! Minimal BER reader for certificate extension payloads.
//!
//! Certificates themselves are handled by `x509-parser`; this reader exists for
//! the nested vendor structures inside their extensions (the Android key
//! description, the FIDO AAGUID extension) where KeyMint uses high tag numbers
//! that generic DER tooling rejects.

use crate::error::{Result, VerificationError};

const MAX_DEPTH: usize = 32;

pub const TAG_BOOLEAN: u32 = 1;
pub const TAG_INTEGER: u32 = 2;
pub const TAG_BIT_STRING: u32 = 3;
pub const TAG_OCTET_STRING: u32 = 4;
pub const TAG_NULL: u32 = 5;
pub const TAG_OID: u32 = 6;
pub const TAG_ENUMERATED: u32 = 10;
pub const TAG_UTF8_STRING: u32 = 12;
pub const TAG_SEQUENCE: u32 = 16;
pub const TAG_SET: u32 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asn1Content {
    Primitive(Vec<u8>),
    Constructed(Vec<Asn1Node>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asn1Node {
    pub tag: Tag,
    /// Declared length, `None` for the indefinite form.
    pub length: Option<usize>,
    pub content: Asn1Content,
}

impl Asn1Node {
    /// Parse exactly one node; trailing bytes are an error.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader { bytes, pos: 0 };
        let node = reader.read_node(0)?;
        if reader.pos != bytes.len() {
            return Err(VerificationError::decode(format!(
                "asn1: {} trailing bytes",
                bytes.len() - reader.pos
            )));
        }
        Ok(node)
    }

    pub fn is_universal(&self, number: u32) -> bool {
        self.tag.class == TagClass::Universal && self.tag.number == number
    }

    pub fn is_context(&self, number: u32) -> bool {
        self.tag.class == TagClass::ContextSpecific && self.tag.number == number
    }

    pub fn children(&self) -> Result<&[Asn1Node]> {
        match &self.content {
            Asn1Content::Constructed(children) => Ok(children),
            Asn1Content::Primitive(_) => Err(VerificationError::decode(format!(
                "asn1: expected constructed node, found primitive tag {}",
                self.tag.number
            ))),
        }
    }

    pub fn child(&self, index: usize) -> Result<&Asn1Node> {
        self.children()?.get(index).ok_or_else(|| {
            VerificationError::decode(format!("asn1: missing element at index {index}"))
        })
    }

    /// Children of a universal SEQUENCE.
    pub fn sequence(&self) -> Result<&[Asn1Node]> {
        self.expect_universal(TAG_SEQUENCE)?;
        self.children()
    }

    /// Children of a universal SET.
    pub fn set(&self) -> Result<&[Asn1Node]> {
        self.expect_universal(TAG_SET)?;
        self.children()
    }

    /// Find the first child with the given context-specific tag number.
    pub fn find_context(&self, number: u32) -> Result<Option<&Asn1Node>> {
        Ok(self.children()?.iter().find(|c| c.is_context(number)))
    }

    /// Unwrap an explicitly tagged node: its single inner value.
    pub fn explicit_inner(&self) -> Result<&Asn1Node> {
        self.child(0)
    }

    pub fn primitive(&self) -> Result<&[u8]> {
        match &self.content {
            Asn1Content::Primitive(bytes) => Ok(bytes),
            Asn1Content::Constructed(_) => Err(VerificationError::decode(format!(
                "asn1: expected primitive node, found constructed tag {}",
                self.tag.number
            ))),
        }
    }

    /// Signed INTEGER or ENUMERATED value. Values wider than 64 bits are rejected.
    pub fn as_i64(&self) -> Result<i64> {
        if !(self.is_universal(TAG_INTEGER) || self.is_universal(TAG_ENUMERATED)) {
            return Err(VerificationError::decode(format!(
                "asn1: expected INTEGER, found tag {}",
                self.tag.number
            )));
        }
        let bytes = self.primitive()?;
        if bytes.is_empty() || bytes.len() > 8 {
            return Err(VerificationError::decode("asn1: integer length out of range"));
        }
        let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        for b in bytes {
            value = (value << 8) | i64::from(*b);
        }
        Ok(value)
    }

    pub fn as_octet_string(&self) -> Result<Vec<u8>> {
        self.expect_universal(TAG_OCTET_STRING)?;
        self.flatten_string()
    }

    /// BIT STRING payload with the unused-bits prefix removed. The unused bits
    /// of the final octet are cleared.
    pub fn as_bit_string(&self) -> Result<Vec<u8>> {
        self.expect_universal(TAG_BIT_STRING)?;
        let bytes = self.primitive()?;
        let (&unused, rest) = bytes
            .split_first()
            .ok_or_else(|| VerificationError::decode("asn1: empty BIT STRING"))?;
        if unused > 7 || (rest.is_empty() && unused != 0) {
            return Err(VerificationError::decode("asn1: invalid BIT STRING padding"));
        }
        let mut out = rest.to_vec();
        if let Some(last) = out.last_mut() {
            *last &= 0xffu8 << unused;
        }
        Ok(out)
    }

    pub fn as_utf8(&self) -> Result<String> {
        self.expect_universal(TAG_UTF8_STRING)?;
        String::from_utf8(self.flatten_string()?)
            .map_err(|e| VerificationError::decode(format!("asn1: invalid UTF8String: {e}")))
    }

    pub fn as_bool(&self) -> Result<bool> {
        self.expect_universal(TAG_BOOLEAN)?;
        match self.primitive()? {
            [b] => Ok(*b != 0),
            _ => Err(VerificationError::decode("asn1: BOOLEAN must be one byte")),
        }
    }

    /// OBJECT IDENTIFIER in dotted form.
    pub fn as_oid(&self) -> Result<String> {
        self.expect_universal(TAG_OID)?;
        let bytes = self.primitive()?;
        if bytes.is_empty() {
            return Err(VerificationError::decode("asn1: empty OBJECT IDENTIFIER"));
        }
        let mut arcs: Vec<u64> = Vec::new();
        let mut acc: u64 = 0;
        for (i, b) in bytes.iter().enumerate() {
            if acc > (u64::MAX >> 7) {
                return Err(VerificationError::decode("asn1: OID arc overflow"));
            }
            acc = (acc << 7) | u64::from(b & 0x7f);
            if b & 0x80 == 0 {
                if arcs.is_empty() {
                    let first = (acc / 40).min(2);
                    arcs.push(first);
                    arcs.push(acc - first * 40);
                } else {
                    arcs.push(acc);
                }
                acc = 0;
            } else if i == bytes.len() - 1 {
                return Err(VerificationError::decode("asn1: truncated OID arc"));
            }
        }
        Ok(arcs
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join("."))
    }

    /// SET OF INTEGER, as used by KeyMint repeated tags such as purpose.
    pub fn as_integer_set(&self) -> Result<Vec<i64>> {
        self.set()?.iter().map(Asn1Node::as_i64).collect()
    }

    fn expect_universal(&self, number: u32) -> Result<()> {
        if self.is_universal(number) {
            Ok(())
        } else {
            Err(VerificationError::decode(format!(
                "asn1: expected universal tag {number}, found {:?} {}",
                self.tag.class, self.tag.number
            )))
        }
    }

    // BER allows string types in constructed (segmented) form.
    fn flatten_string(&self) -> Result<Vec<u8>> {
        match &self.content {
            Asn1Content::Primitive(bytes) => Ok(bytes.clone()),
            Asn1Content::Constructed(parts) => {
                let mut out = Vec::new();
                for part in parts {
                    out.extend(part.flatten_string()?);
                }
                Ok(out)
            }
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn read_byte(&mut self) -> Result<u8> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| VerificationError::decode("asn1: unexpected end of input"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_tag(&mut self) -> Result<Tag> {
        let first = self.read_byte()?;
        let class = match first >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        };
        let constructed = first & 0x20 != 0;
        let mut number = u32::from(first & 0x1f);
        if number == 0x1f {
            // High-tag-number form: base-128, continuation bit set on all but the last.
            number = 0;
            loop {
                let b = self.read_byte()?;
                if number > (u32::MAX >> 7) {
                    return Err(VerificationError::decode("asn1: tag number overflow"));
                }
                number = (number << 7) | u32::from(b & 0x7f);
                if b & 0x80 == 0 {
                    break;
                }
            }
        }
        Ok(Tag {
            class,
            constructed,
            number,
        })
    }

    fn read_length(&mut self) -> Result<Option<usize>> {
        let first = self.read_byte()?;
        if first & 0x80 == 0 {
            return Ok(Some(usize::from(first)));
        }
        let count = usize::from(first & 0x7f);
        if count == 0 {
            return Ok(None);
        }
        if count > std::mem::size_of::<usize>() {
            return Err(VerificationError::decode("asn1: length field too wide"));
        }
        let mut length = 0usize;
        for _ in 0..count {
            length = (length << 8) | usize::from(self.read_byte()?);
        }
        Ok(Some(length))
    }

    fn at_end_of_contents(&self) -> bool {
        self.bytes.get(self.pos..self.pos + 2) == Some(&[0, 0][..])
    }

    fn read_node(&mut self, depth: usize) -> Result<Asn1Node> {
        if depth > MAX_DEPTH {
            return Err(VerificationError::decode("asn1: nesting too deep"));
        }
        let tag = self.read_tag()?;
        let length = self.read_length()?;

        let content = match length {
            Some(len) => {
                let end = self
                    .pos
                    .checked_add(len)
                    .filter(|end| *end <= self.bytes.len())
                    .ok_or_else(|| {
                        VerificationError::decode(format!(
                            "asn1: declared length {len} exceeds remaining input"
                        ))
                    })?;
                if tag.constructed {
                    let mut inner = Reader {
                        bytes: &self.bytes[..end],
                        pos: self.pos,
                    };
                    let mut children = Vec::new();
                    while inner.pos < end {
                        children.push(inner.read_node(depth + 1)?);
                    }
                    self.pos = end;
                    Asn1Content::Constructed(children)
                } else {
                    let bytes = self.bytes[self.pos..end].to_vec();
                    self.pos = end;
                    Asn1Content::Primitive(bytes)
                }
            }
            None => {
                if !tag.constructed {
                    return Err(VerificationError::decode(
                        "asn1: indefinite length on primitive node",
                    ));
                }
                let mut children = Vec::new();
                loop {
                    if self.at_end_of_contents() {
                        self.pos += 2;
                        break;
                    }
                    if self.pos >= self.bytes.len() {
                        return Err(VerificationError::decode(
                            "asn1: missing end-of-contents marker",
                        ));
                    }
                    children.push(self.read_node(depth + 1)?);
                }
                Asn1Content::Constructed(children)
            }
        };

        Ok(Asn1Node {
            tag,
            length,
            content,
        })
    }
}
