//! MMDB Type Definitions
//!
//! Errors, record widths and constants shared by the decoder, the search
//! tree and the writer.

use std::fmt;

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Zero bytes between the search tree and the data section
pub const DATA_SECTION_SEPARATOR: usize = 16;

/// MMDB error types
///
/// `Clone` so a failed load can be cached and handed to every later caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmdbError {
    /// Structural problem in the search tree or file layout
    InvalidFormat(String),
    /// Metadata marker not found in the last 128KB
    MetadataNotFound,
    /// Metadata present but missing or invalid fields
    InvalidMetadata(String),
    /// A data-section entry could not be decoded
    Decode(String),
    /// File could not be read or mapped
    Io(String),
}

impl fmt::Display for MmdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmdbError::InvalidFormat(msg) => write!(f, "Invalid MMDB format: {}", msg),
            MmdbError::MetadataNotFound => write!(f, "MMDB metadata marker not found"),
            MmdbError::InvalidMetadata(msg) => write!(f, "Invalid metadata: {}", msg),
            MmdbError::Decode(msg) => write!(f, "Data decode error: {}", msg),
            MmdbError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for MmdbError {}

impl From<std::io::Error> for MmdbError {
    fn from(err: std::io::Error) -> Self {
        MmdbError::Io(err.to_string())
    }
}

/// IP version of the search tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    /// IPv4 only, 32-bit tree
    V4,
    /// IPv6 tree, IPv4 space reachable under `::/96`
    V6,
}

impl IpVersion {
    /// Numeric version as stored in metadata
    pub fn as_u16(self) -> u16 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }

    /// Tree depth in bits
    pub fn tree_depth(self) -> u8 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }
}

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// Size of a node (2 records) in bytes
    pub fn node_bytes(self) -> usize {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Record width in bits
    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Largest value a single record can hold
    pub fn max_record(self) -> u32 {
        match self {
            RecordSize::Bits24 => 0x00FF_FFFF,
            RecordSize::Bits28 => 0x0FFF_FFFF,
            RecordSize::Bits32 => u32::MAX,
        }
    }

    /// Create from bit size
    pub fn from_bits(bits: u64) -> Result<Self, MmdbError> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(MmdbError::InvalidMetadata(format!(
                "Invalid record size: {} bits",
                bits
            ))),
        }
    }

    /// Read one record from a node's bytes
    ///
    /// `node` must be exactly `node_bytes()` long; `side` 0 is the left
    /// record (address bit 0), 1 the right.
    pub fn read(self, node: &[u8], side: u8) -> u32 {
        let be24 = |b: &[u8]| ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32);
        match (self, side) {
            (RecordSize::Bits24, 0) => be24(&node[0..3]),
            (RecordSize::Bits24, _) => be24(&node[3..6]),
            // Middle byte holds the high nibble of each record
            (RecordSize::Bits28, 0) => (((node[3] & 0xF0) as u32) << 20) | be24(&node[0..3]),
            (RecordSize::Bits28, _) => (((node[3] & 0x0F) as u32) << 24) | be24(&node[4..7]),
            (RecordSize::Bits32, 0) => u32::from_be_bytes([node[0], node[1], node[2], node[3]]),
            (RecordSize::Bits32, _) => u32::from_be_bytes([node[4], node[5], node[6], node[7]]),
        }
    }

    /// Append one node holding `left` and `right`
    ///
    /// Values must not exceed `max_record()`.
    pub fn write(self, out: &mut Vec<u8>, left: u32, right: u32) {
        match self {
            RecordSize::Bits24 => {
                out.extend_from_slice(&left.to_be_bytes()[1..]);
                out.extend_from_slice(&right.to_be_bytes()[1..]);
            }
            RecordSize::Bits28 => {
                out.extend_from_slice(&left.to_be_bytes()[1..]);
                out.push((((left >> 24) & 0x0F) << 4) as u8 | ((right >> 24) & 0x0F) as u8);
                out.extend_from_slice(&right.to_be_bytes()[1..]);
            }
            RecordSize::Bits32 => {
                out.extend_from_slice(&left.to_be_bytes());
                out.extend_from_slice(&right.to_be_bytes());
            }
        }
    }
}
