//! Order-preserving value encodings used by index keys.
//!
//! Every encoding sorts byte-wise in the same order as the values it
//! encodes, and is self-delimiting so that several can be concatenated in
//! one key.

use std::fmt;

use crate::kv::{KvError, KvResult};

/// A field value type: its schema type name and its key encoding.
pub trait FieldType: Send + Sync {
    type Value: Clone + Ord + fmt::Debug;

    /// Type name as it appears in schema fields.
    fn name(&self) -> &str;

    /// Appends the encoding of `value` to `out`.
    fn write(&self, value: &Self::Value, out: &mut Vec<u8>);

    /// Decodes one value from the front of `input`, advancing it.
    fn read(&self, input: &mut &[u8]) -> KvResult<Self::Value>;
}

/// Identity of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjId(pub u64);

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

fn take<'a>(input: &mut &'a [u8], len: usize, what: &str) -> KvResult<&'a [u8]> {
    if input.len() < len {
        return Err(KvError::Corrupt(format!(
            "truncated {what}: need {len} bytes, found {}",
            input.len()
        )));
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    Ok(head)
}

fn read_u64(input: &mut &[u8], what: &str) -> KvResult<u64> {
    let bytes = take(input, 8, what)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf))
}

/// Object references, encoded as the 8-byte big-endian object id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjIdType;

impl FieldType for ObjIdType {
    type Value = ObjId;

    fn name(&self) -> &str {
        crate::schema::field::REFERENCE_TYPE_NAME
    }

    fn write(&self, value: &ObjId, out: &mut Vec<u8>) {
        out.extend_from_slice(&value.0.to_be_bytes());
    }

    fn read(&self, input: &mut &[u8]) -> KvResult<ObjId> {
        read_u64(input, "object id").map(ObjId)
    }
}

/// Signed 64-bit integers, big-endian with the sign bit flipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct I64Type;

const SIGN_BIT: u64 = 1 << 63;

impl FieldType for I64Type {
    type Value = i64;

    fn name(&self) -> &str {
        "long"
    }

    fn write(&self, value: &i64, out: &mut Vec<u8>) {
        out.extend_from_slice(&((*value as u64) ^ SIGN_BIT).to_be_bytes());
    }

    fn read(&self, input: &mut &[u8]) -> KvResult<i64> {
        Ok((read_u64(input, "long")? ^ SIGN_BIT) as i64)
    }
}

/// UTF-8 strings, escaped and terminated by `0x00`.
///
/// `0x00` is written as `0x01 0x01` and `0x01` as `0x01 0x02`, so the
/// terminator sorts below any continuation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringType;

const END: u8 = 0x00;
const ESCAPE: u8 = 0x01;

impl FieldType for StringType {
    type Value = String;

    fn name(&self) -> &str {
        "string"
    }

    fn write(&self, value: &String, out: &mut Vec<u8>) {
        for &b in value.as_bytes() {
            match b {
                END => out.extend_from_slice(&[ESCAPE, 0x01]),
                ESCAPE => out.extend_from_slice(&[ESCAPE, 0x02]),
                _ => out.push(b),
            }
        }
        out.push(END);
    }

    fn read(&self, input: &mut &[u8]) -> KvResult<String> {
        let mut bytes = Vec::new();
        let mut pos = 0;
        loop {
            match input.get(pos).copied() {
                None => return Err(KvError::Corrupt("unterminated string".to_string())),
                Some(END) => break,
                Some(ESCAPE) => {
                    match input.get(pos + 1).copied() {
                        Some(0x01) => bytes.push(END),
                        Some(0x02) => bytes.push(ESCAPE),
                        other => {
                            return Err(KvError::Corrupt(format!(
                                "invalid string escape {other:?}"
                            )))
                        }
                    }
                    pos += 2;
                }
                Some(b) => {
                    bytes.push(b);
                    pos += 1;
                }
            }
        }
        *input = &input[pos + 1..];
        String::from_utf8(bytes).map_err(|e| KvError::Corrupt(format!("invalid UTF-8 in string: {e}")))
    }
}

/// Booleans as a single `0x00` or `0x01` byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolType;

impl FieldType for BoolType {
    type Value = bool;

    fn name(&self) -> &str {
        "boolean"
    }

    fn write(&self, value: &bool, out: &mut Vec<u8>) {
        out.push(u8::from(*value));
    }

    fn read(&self, input: &mut &[u8]) -> KvResult<bool> {
        match take(input, 1, "boolean")?[0] {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(KvError::Corrupt(format!("invalid boolean byte {b:#04x}"))),
        }
    }
}
