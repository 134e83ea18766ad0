//! MMDB data section decoding
//!
//! Every entry starts with a control byte: the top 3 bits select the type
//! and the low 5 bits carry the payload size. Type 0 marks an extended type
//! whose real id is `7 + next_byte`. Sizes 29, 30 and 31 pull 1, 2 or 3
//! further big-endian bytes. Pointers (type 1) reuse the size bits for their
//! own layout and are resolved transparently here, so decoded values never
//! contain them.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use super::types::MmdbError;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::HashMap;

/// Nesting limit for maps, arrays and pointer hops
pub const MAX_DEPTH: usize = 512;

const TYPE_EXTENDED: u8 = 0;
const TYPE_POINTER: u8 = 1;
const TYPE_STRING: u8 = 2;
const TYPE_DOUBLE: u8 = 3;
const TYPE_BYTES: u8 = 4;
const TYPE_UINT16: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_MAP: u8 = 7;
const TYPE_INT32: u8 = 8;
const TYPE_UINT64: u8 = 9;
const TYPE_UINT128: u8 = 10;
const TYPE_ARRAY: u8 = 11;
const TYPE_BOOL: u8 = 14;
const TYPE_FLOAT: u8 = 15;

/// A decoded data-section value
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map (string keys only)
    Map(HashMap<String, DataValue>),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// Map entry by key
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        match self {
            DataValue::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Follow a path of map keys and array indices
    ///
    /// Path elements that parse as integers index into arrays, so
    /// `["subdivisions", "0", "iso_code"]` reads the first subdivision.
    pub fn path(&self, keys: &[&str]) -> Option<&DataValue> {
        keys.iter().try_fold(self, |value, key| match value {
            DataValue::Map(map) => map.get(*key),
            DataValue::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Name of the value's MMDB type
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::String(_) => "string",
            DataValue::Double(_) => "double",
            DataValue::Bytes(_) => "bytes",
            DataValue::Uint16(_) => "uint16",
            DataValue::Uint32(_) => "uint32",
            DataValue::Map(_) => "map",
            DataValue::Int32(_) => "int32",
            DataValue::Uint64(_) => "uint64",
            DataValue::Uint128(_) => "uint128",
            DataValue::Array(_) => "array",
            DataValue::Bool(_) => "boolean",
            DataValue::Float(_) => "float",
        }
    }

    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value if it fits in `u64` and is non-negative
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            DataValue::Uint16(n) => Some(n as u64),
            DataValue::Uint32(n) => Some(n as u64),
            DataValue::Uint64(n) => Some(n),
            DataValue::Uint128(n) => u64::try_from(n).ok(),
            DataValue::Int32(n) => u64::try_from(n).ok(),
            _ => None,
        }
    }

    /// Numeric value widened to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            DataValue::Double(d) => Some(d),
            DataValue::Float(f) => Some(f as f64),
            DataValue::Int32(n) => Some(n as f64),
            _ => self.as_u64().map(|n| n as f64),
        }
    }

    /// Boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            DataValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Array items
    pub fn as_array(&self) -> Option<&[DataValue]> {
        match self {
            DataValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Map entries
    pub fn as_map(&self) -> Option<&HashMap<String, DataValue>> {
        match self {
            DataValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DataValue::String(s) => serializer.serialize_str(s),
            DataValue::Double(d) => serializer.serialize_f64(*d),
            DataValue::Bytes(b) => serializer.serialize_bytes(b),
            DataValue::Uint16(n) => serializer.serialize_u16(*n),
            DataValue::Uint32(n) => serializer.serialize_u32(*n),
            DataValue::Int32(n) => serializer.serialize_i32(*n),
            DataValue::Uint64(n) => serializer.serialize_u64(*n),
            DataValue::Uint128(n) => serializer.serialize_u128(*n),
            DataValue::Bool(b) => serializer.serialize_bool(*b),
            DataValue::Float(f) => serializer.serialize_f32(*f),
            DataValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            DataValue::Map(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for key in keys {
                    out.serialize_entry(key, &map[key])?;
                }
                out.end()
            }
        }
    }
}

/// Result of decoding a top-level record map leniently
#[derive(Debug, Clone, Default)]
pub struct PartialRecord {
    /// Entries that decoded cleanly
    pub entries: HashMap<String, DataValue>,
    /// First failure seen, if any
    pub error: Option<MmdbError>,
}

impl PartialRecord {
    /// Entries as a map value
    pub fn into_value(self) -> DataValue {
        DataValue::Map(self.entries)
    }
}

/// Error bookkeeping for lenient decoding
#[derive(Debug, Default)]
struct Salvage {
    /// First error seen
    error: Option<MmdbError>,
    /// Set once the cursor can no longer be trusted
    lost: bool,
}

impl Salvage {
    /// A value was dropped but decoding can continue after it
    fn skip(&mut self, err: MmdbError) {
        self.error.get_or_insert(err);
    }

    /// Decoding cannot continue in the current stream
    fn lose(&mut self, err: MmdbError) {
        self.skip(err);
        self.lost = true;
    }
}

/// Data section decoder
///
/// Offsets, including pointer targets, are relative to the start of
/// `buffer`. For lookups that is the data section; for metadata it is the
/// byte after the metadata marker.
#[derive(Debug, Clone, Copy)]
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder over a data section
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Decode the value at `offset`
    ///
    /// Returns the value and the offset just past it. When the entry is a
    /// pointer, the returned offset is the one after the pointer bytes.
    pub fn decode(&self, offset: usize) -> Result<(DataValue, usize), MmdbError> {
        let mut cursor = offset;
        let value = self.decode_at(&mut cursor, 0)?;
        Ok((value, cursor))
    }

    /// Decode a record map, dropping only the entries that are corrupt
    ///
    /// An entry whose header is intact but whose payload is bad (invalid
    /// UTF-8 or a dangling pointer) is skipped by its declared size
    /// and decoding continues with the next key, at every nesting level.
    /// Once a header itself is unreadable the position of everything after
    /// it is unknown, so the entries decoded up to that point are kept and
    /// the rest dropped. The first error seen is reported either way.
    pub fn decode_record(&self, offset: usize) -> PartialRecord {
        let mut salvage = Salvage::default();
        let mut cursor = offset;
        let entries = match self.salvage_at(&mut cursor, 0, &mut salvage) {
            Some(DataValue::Map(entries)) => entries,
            Some(other) => {
                salvage.skip(MmdbError::Decode(format!(
                    "record is {}, expected map",
                    other.type_name()
                )));
                HashMap::new()
            }
            None => HashMap::new(),
        };
        PartialRecord {
            entries,
            error: salvage.error,
        }
    }

    /// Lenient decode; `None` means the value was dropped
    fn salvage_at(
        &self,
        cursor: &mut usize,
        depth: usize,
        salvage: &mut Salvage,
    ) -> Option<DataValue> {
        if depth > MAX_DEPTH {
            salvage.lose(MmdbError::Decode(format!(
                "nesting exceeds {} levels",
                MAX_DEPTH
            )));
            return None;
        }

        let start = *cursor;
        let (type_id, size_bits) = match self.read_control(cursor) {
            Ok(header) => header,
            Err(e) => {
                salvage.lose(e);
                return None;
            }
        };

        if type_id == TYPE_POINTER {
            // From here on the pointer bytes are consumed, so the caller can
            // always continue after a bad target
            let target = match self.pointer_target(cursor, size_bits) {
                Ok(target) => target,
                Err(e) => {
                    salvage.lose(e);
                    return None;
                }
            };
            let resolved = self.check_pointer(target).and_then(|target| {
                if self.peek_type(target)? == TYPE_POINTER {
                    return Err(MmdbError::Decode("pointer to pointer".to_string()));
                }
                Ok(target)
            });
            let mut target = match resolved {
                Ok(target) => target,
                Err(e) => {
                    salvage.skip(e);
                    return None;
                }
            };
            let mut inner = Salvage::default();
            let value = self.salvage_at(&mut target, depth + 1, &mut inner);
            if let Some(e) = inner.error {
                salvage.skip(e);
            }
            return value;
        }

        let size = match self.read_size(cursor, size_bits) {
            Ok(size) => size,
            Err(e) => {
                salvage.lose(e);
                return None;
            }
        };

        match type_id {
            TYPE_MAP => {
                let mut map = HashMap::with_capacity(size.min(self.remaining(*cursor)));
                for _ in 0..size {
                    let key = self.salvage_at(cursor, depth + 1, salvage);
                    if salvage.lost {
                        break;
                    }
                    let value = self.salvage_at(cursor, depth + 1, salvage);
                    match (key, value) {
                        (Some(DataValue::String(key)), Some(value)) => {
                            map.insert(key, value);
                        }
                        (Some(DataValue::String(_)), None) | (None, _) => {}
                        (Some(_), _) => {
                            salvage.skip(MmdbError::Decode("map key must be a string".to_string()))
                        }
                    }
                    if salvage.lost {
                        break;
                    }
                }
                Some(DataValue::Map(map))
            }
            TYPE_ARRAY => {
                let mut items = Vec::with_capacity(size.min(self.remaining(*cursor)));
                for _ in 0..size {
                    if let Some(item) = self.salvage_at(cursor, depth + 1, salvage) {
                        items.push(item);
                    }
                    if salvage.lost {
                        break;
                    }
                }
                Some(DataValue::Array(items))
            }
            _ => {
                // Scalar payloads are exactly `size` bytes, booleans carry none
                let payload = if type_id == TYPE_BOOL { 0 } else { size };
                let payload_end = match cursor
                    .checked_add(payload)
                    .filter(|end| *end <= self.buffer.len())
                {
                    Some(end) => end,
                    None => {
                        salvage.lose(MmdbError::Decode(format!(
                            "payload of {} bytes at offset {} out of bounds",
                            payload, cursor
                        )));
                        return None;
                    }
                };
                let mut strict = start;
                match self.decode_at(&mut strict, depth) {
                    Ok(value) => {
                        *cursor = strict;
                        Some(value)
                    }
                    Err(e) => {
                        *cursor = payload_end;
                        salvage.skip(e);
                        None
                    }
                }
            }
        }
    }

    fn decode_at(&self, cursor: &mut usize, depth: usize) -> Result<DataValue, MmdbError> {
        if depth > MAX_DEPTH {
            return Err(MmdbError::Decode(format!(
                "nesting exceeds {} levels",
                MAX_DEPTH
            )));
        }

        let (type_id, size_bits) = self.read_control(cursor)?;

        if type_id == TYPE_POINTER {
            let mut target = self.read_pointer(cursor, size_bits)?;
            if self.peek_type(target)? == TYPE_POINTER {
                return Err(MmdbError::Decode("pointer to pointer".to_string()));
            }
            return self.decode_at(&mut target, depth + 1);
        }

        let size = self.read_size(cursor, size_bits)?;

        match type_id {
            TYPE_STRING => {
                let bytes = self.take(cursor, size)?;
                std::str::from_utf8(bytes)
                    .map(|s| DataValue::String(s.to_string()))
                    .map_err(|_| MmdbError::Decode("invalid UTF-8 in string".to_string()))
            }
            TYPE_DOUBLE => {
                let bytes = self.take_exact::<8>(cursor, size, "double")?;
                Ok(DataValue::Double(f64::from_be_bytes(bytes)))
            }
            TYPE_BYTES => Ok(DataValue::Bytes(self.take(cursor, size)?.to_vec())),
            TYPE_UINT16 => Ok(DataValue::Uint16(self.read_uint(cursor, size, 2)? as u16)),
            TYPE_UINT32 => Ok(DataValue::Uint32(self.read_uint(cursor, size, 4)? as u32)),
            TYPE_INT32 => Ok(DataValue::Int32(self.read_uint(cursor, size, 4)? as u32 as i32)),
            TYPE_UINT64 => Ok(DataValue::Uint64(self.read_uint(cursor, size, 8)? as u64)),
            TYPE_UINT128 => Ok(DataValue::Uint128(self.read_uint(cursor, size, 16)?)),
            TYPE_MAP => {
                let mut map = HashMap::with_capacity(size.min(self.remaining(*cursor)));
                for _ in 0..size {
                    let key = self.decode_key(cursor, depth + 1)?;
                    let value = self.decode_at(cursor, depth + 1)?;
                    map.insert(key, value);
                }
                Ok(DataValue::Map(map))
            }
            TYPE_ARRAY => {
                let mut items = Vec::with_capacity(size.min(self.remaining(*cursor)));
                for _ in 0..size {
                    items.push(self.decode_at(cursor, depth + 1)?);
                }
                Ok(DataValue::Array(items))
            }
            TYPE_BOOL => match size {
                0 => Ok(DataValue::Bool(false)),
                1 => Ok(DataValue::Bool(true)),
                _ => Err(MmdbError::Decode(format!("invalid boolean size {}", size))),
            },
            TYPE_FLOAT => {
                let bytes = self.take_exact::<4>(cursor, size, "float")?;
                Ok(DataValue::Float(f32::from_be_bytes(bytes)))
            }
            other => Err(MmdbError::Decode(format!("unsupported data type {}", other))),
        }
    }

    fn decode_key(&self, cursor: &mut usize, depth: usize) -> Result<String, MmdbError> {
        match self.decode_at(cursor, depth)? {
            DataValue::String(s) => Ok(s),
            _ => Err(MmdbError::Decode("map key must be a string".to_string())),
        }
    }

    /// Read the control byte (and extended type byte), returning (type, size bits)
    fn read_control(&self, cursor: &mut usize) -> Result<(u8, u8), MmdbError> {
        let ctrl = self.byte(cursor)?;
        let mut type_id = ctrl >> 5;
        if type_id == TYPE_EXTENDED {
            let ext = self.byte(cursor)?;
            type_id = ext.checked_add(7).filter(|t| *t > 7).ok_or_else(|| {
                MmdbError::Decode(format!("invalid extended type byte {}", ext))
            })?;
        }
        Ok((type_id, ctrl & 0x1F))
    }

    fn peek_type(&self, offset: usize) -> Result<u8, MmdbError> {
        let mut cursor = offset;
        self.read_control(&mut cursor).map(|(t, _)| t)
    }

    fn read_size(&self, cursor: &mut usize, size_bits: u8) -> Result<usize, MmdbError> {
        Ok(match size_bits {
            0..=28 => size_bits as usize,
            29 => 29 + self.read_be(cursor, 1)? as usize,
            30 => 285 + self.read_be(cursor, 2)? as usize,
            _ => 65_821 + self.read_be(cursor, 3)? as usize,
        })
    }

    pub(crate) fn read_pointer(&self, cursor: &mut usize, size_bits: u8) -> Result<usize, MmdbError> {
        let target = self.pointer_target(cursor, size_bits)?;
        self.check_pointer(target)
    }

    /// Raw pointer target, not yet checked against the buffer
    fn pointer_target(&self, cursor: &mut usize, size_bits: u8) -> Result<usize, MmdbError> {
        let ss = (size_bits >> 3) & 0x3;
        let vvv = (size_bits & 0x7) as u64;
        let target = match ss {
            0 => (vvv << 8) | self.read_be(cursor, 1)? as u64,
            1 => ((vvv << 16) | self.read_be(cursor, 2)? as u64) + 2_048,
            2 => ((vvv << 24) | self.read_be(cursor, 3)? as u64) + 526_336,
            _ => self.read_be(cursor, 4)? as u64,
        };
        Ok(target as usize)
    }

    fn check_pointer(&self, target: usize) -> Result<usize, MmdbError> {
        if target >= self.buffer.len() {
            return Err(MmdbError::Decode(format!(
                "pointer {} beyond data section of {} bytes",
                target,
                self.buffer.len()
            )));
        }
        Ok(target)
    }

    /// Variable-width big-endian unsigned integer of `size` bytes
    fn read_uint(&self, cursor: &mut usize, size: usize, max: usize) -> Result<u128, MmdbError> {
        if size > max {
            return Err(MmdbError::Decode(format!(
                "integer of {} bytes exceeds {} byte type",
                size, max
            )));
        }
        self.read_be(cursor, size)
    }

    fn read_be(&self, cursor: &mut usize, len: usize) -> Result<u128, MmdbError> {
        Ok(self
            .take(cursor, len)?
            .iter()
            .fold(0u128, |acc, b| (acc << 8) | *b as u128))
    }

    fn take_exact<const N: usize>(
        &self,
        cursor: &mut usize,
        size: usize,
        what: &str,
    ) -> Result<[u8; N], MmdbError> {
        if size != N {
            return Err(MmdbError::Decode(format!(
                "{} must be {} bytes, got {}",
                what, N, size
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(cursor, N)?);
        Ok(out)
    }

    fn take(&self, cursor: &mut usize, len: usize) -> Result<&'a [u8], MmdbError> {
        let end = cursor
            .checked_add(len)
            .filter(|end| *end <= self.buffer.len())
            .ok_or_else(|| {
                MmdbError::Decode(format!(
                    "read of {} bytes at offset {} out of bounds",
                    len, cursor
                ))
            })?;
        let bytes = &self.buffer[*cursor..end];
        *cursor = end;
        Ok(bytes)
    }

    fn byte(&self, cursor: &mut usize) -> Result<u8, MmdbError> {
        self.take(cursor, 1).map(|b| b[0])
    }

    fn remaining(&self, cursor: usize) -> usize {
        self.buffer.len().saturating_sub(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> DataValue {
        let (value, next) = DataDecoder::new(bytes).decode(0).unwrap();
        assert_eq!(next, bytes.len());
        value
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_all(&[0x43, b'f', b'o', b'o']), DataValue::String("foo".into()));
        assert_eq!(decode_all(&[0xA0]), DataValue::Uint16(0));
        assert_eq!(decode_all(&[0xA1, 0xFF]), DataValue::Uint16(255));
        assert_eq!(decode_all(&[0xC3, 0x01, 0x00, 0x00]), DataValue::Uint32(65536));
        assert_eq!(decode_all(&[0x01, 0x07]), DataValue::Bool(true));
        assert_eq!(decode_all(&[0x00, 0x07]), DataValue::Bool(false));
        assert_eq!(
            decode_all(&[0x04, 0x01, 0xFF, 0xFF, 0xFF, 0xFF]),
            DataValue::Int32(-1)
        );
        assert_eq!(decode_all(&[0x02, 0x02, 0x01, 0x00]), DataValue::Uint64(256));

        let mut double = vec![0x68];
        double.extend_from_slice(&1.5f64.to_be_bytes());
        assert_eq!(decode_all(&double), DataValue::Double(1.5));

        let mut float = vec![0x04, 0x08];
        float.extend_from_slice(&2.5f32.to_be_bytes());
        assert_eq!(decode_all(&float), DataValue::Float(2.5));
    }

    #[test]
    fn test_decode_long_string_size() {
        // size 29 + 1 extra byte
        let mut bytes = vec![0x5D, 0x01];
        bytes.extend(std::iter::repeat(b'x').take(30));
        assert_eq!(decode_all(&bytes).as_str().unwrap().len(), 30);

        // size 285 + 2 extra bytes
        let mut bytes = vec![0x5E, 0x00, 0x01];
        bytes.extend(std::iter::repeat(b'y').take(286));
        assert_eq!(decode_all(&bytes).as_str().unwrap().len(), 286);
    }

    #[test]
    fn test_decode_map_and_array() {
        // {"en": "Berlin", "ids": [1, 2]}
        let bytes = [
            0xE2, 0x42, b'e', b'n', 0x46, b'B', b'e', b'r', b'l', b'i', b'n', 0x43, b'i', b'd',
            b's', 0x02, 0x04, 0xA1, 0x01, 0xA1, 0x02,
        ];
        let value = decode_all(&bytes);
        assert_eq!(value.get("en").and_then(DataValue::as_str), Some("Berlin"));
        assert_eq!(value.path(&["ids", "1"]).and_then(DataValue::as_u64), Some(2));
        assert!(value.path(&["ids", "2"]).is_none());
    }

    #[test]
    fn test_pointer_resolution() {
        // offset 0: "abc"; offset 4: map {"k": ptr(0)}
        let bytes = [0x43, b'a', b'b', b'c', 0xE1, 0x41, b'k', 0x20, 0x00];
        let (value, next) = DataDecoder::new(&bytes).decode(4).unwrap();
        assert_eq!(next, bytes.len());
        assert_eq!(value.get("k").and_then(DataValue::as_str), Some("abc"));
    }

    #[test]
    fn test_pointer_layouts() {
        let mut buf = vec![0u8; 600_000];
        // SS=0: (vvv << 8) | 1 byte
        buf[1] = 0x05;
        let mut cursor = 1;
        assert_eq!(DataDecoder::new(&buf).read_pointer(&mut cursor, 0x03).unwrap(), 0x305);
        assert_eq!(cursor, 2);

        // SS=1: ((vvv << 16) | 2 bytes) + 2048
        buf[1] = 0x00;
        buf[2] = 0x10;
        let mut cursor = 1;
        assert_eq!(
            DataDecoder::new(&buf).read_pointer(&mut cursor, 0x09).unwrap(),
            0x10010 + 2048
        );
        assert_eq!(cursor, 3);

        // SS=3: plain 4 bytes, out of range here
        let mut cursor = 0;
        let far = [0xFF, 0xFF, 0xFF, 0xFF];
        assert!(DataDecoder::new(&far).read_pointer(&mut cursor, 0x18).is_err());
    }

    #[test]
    fn test_pointer_to_pointer_rejected() {
        let bytes = [0x20, 0x02, 0x20, 0x00];
        assert!(DataDecoder::new(&bytes).decode(0).is_err());
    }

    #[test]
    fn test_truncated_and_oversized() {
        assert!(DataDecoder::new(&[0x44, b'a']).decode(0).is_err());
        // uint16 claiming 3 bytes
        assert!(DataDecoder::new(&[0xA3, 0, 0, 0]).decode(0).is_err());
        // double with wrong size
        assert!(DataDecoder::new(&[0x64, 0, 0, 0, 0]).decode(0).is_err());
        assert!(DataDecoder::new(&[]).decode(0).is_err());
    }

    #[test]
    fn test_self_referential_depth_limit() {
        // map {"a": ptr(0)} pointing back to itself
        let bytes = [0xE1, 0x41, b'a', 0x20, 0x00];
        let err = DataDecoder::new(&bytes).decode(0).unwrap_err();
        assert!(err.to_string().contains("nesting"));
    }

    #[test]
    fn test_decode_record_keeps_prefix() {
        // map of 3: "a" -> 1, "b" -> 2, "c" -> truncated string
        let bytes = [
            0xE3, 0x41, b'a', 0xA1, 0x01, 0x41, b'b', 0xA1, 0x02, 0x41, b'c', 0x45, b'x',
        ];
        let record = DataDecoder::new(&bytes).decode_record(0);
        assert!(record.error.is_some());
        assert_eq!(record.entries.len(), 2);
        assert_eq!(record.entries["b"], DataValue::Uint16(2));
    }

    #[test]
    fn test_decode_record_skips_bad_utf8() {
        // map of 3: "a" -> invalid UTF-8, "b" -> 2, "c" -> "ok"
        let bytes = [
            0xE3, 0x41, b'a', 0x42, 0xC3, 0x28, 0x41, b'b', 0xA1, 0x02, 0x41, b'c', 0x42, b'o',
            b'k',
        ];
        let record = DataDecoder::new(&bytes).decode_record(0);
        assert!(matches!(record.error, Some(MmdbError::Decode(_))));
        assert!(!record.entries.contains_key("a"));
        assert_eq!(record.entries["b"], DataValue::Uint16(2));
        assert_eq!(record.entries["c"], DataValue::String("ok".into()));
    }

    #[test]
    fn test_decode_record_nested_degrades_per_key() {
        // {"city": {"de": "K\xF6ln", "en": "Cologne"}, "code": "DE"}
        let bytes = [
            0xE2, 0x44, b'c', b'i', b't', b'y', 0xE2, 0x42, b'd', b'e', 0x44, b'K', 0xF6, b'l',
            b'n', 0x42, b'e', b'n', 0x47, b'C', b'o', b'l', b'o', b'g', b'n', b'e', 0x44, b'c',
            b'o', b'd', b'e', 0x42, b'D', b'E',
        ];
        let record = DataDecoder::new(&bytes).decode_record(0);
        assert!(record.error.is_some());
        let value = record.into_value();
        assert_eq!(value.path(&["city", "en"]).and_then(DataValue::as_str), Some("Cologne"));
        assert!(value.path(&["city", "de"]).is_none());
        assert_eq!(value.get("code").and_then(DataValue::as_str), Some("DE"));
    }

    #[test]
    fn test_decode_record_skips_dangling_pointer() {
        // {"a": ptr(0x7FF), "b": true, "c": [1, bool of size 5, 3]}
        let bytes = [
            0xE3, 0x41, b'a', 0x27, 0xFF, 0x41, b'b', 0x01, 0x07, 0x41, b'c', 0x03, 0x04, 0xA1,
            0x01, 0x05, 0x07, 0xA1, 0x03,
        ];
        let record = DataDecoder::new(&bytes).decode_record(0);
        assert!(record.error.is_some());
        assert!(!record.entries.contains_key("a"));
        assert_eq!(record.entries["b"], DataValue::Bool(true));
        assert_eq!(
            record.entries["c"],
            DataValue::Array(vec![DataValue::Uint16(1), DataValue::Uint16(3)])
        );
    }

    #[test]
    fn test_decode_record_through_pointer() {
        // offset 0: {"k": "v"}; offset 5: ptr(0)
        let bytes = [0xE1, 0x41, b'k', 0x41, b'v', 0x20, 0x00];
        let record = DataDecoder::new(&bytes).decode_record(5);
        assert!(record.error.is_none());
        assert_eq!(record.entries["k"], DataValue::String("v".into()));
    }

    #[test]
    fn test_decode_record_not_a_map() {
        let record = DataDecoder::new(&[0x41, b'a']).decode_record(0);
        assert!(record.error.is_some());
        assert!(record.entries.is_empty());
    }

    #[test]
    fn test_serialize_to_json() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), DataValue::Uint32(2));
        map.insert("a".to_string(), DataValue::Bool(true));
        let json = serde_json::to_string(&DataValue::Map(map)).unwrap();
        assert_eq!(json, r#"{"a":true,"b":2}"#);
    }
}
