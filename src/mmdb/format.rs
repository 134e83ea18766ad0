//! MMDB Binary Format Parsing
//!
//! File layout: `[search tree][16 zero bytes][data section][marker][metadata]`.
//! The metadata is an MMDB-encoded map following the last marker in the
//! final 128KB of the file. Everything needed to walk the tree and bound
//! the data section is derived from it here, once, at load.

use super::decoder::{DataDecoder, DataValue};
use super::types::{IpVersion, MmdbError, RecordSize, DATA_SECTION_SEPARATOR, METADATA_MARKER};
use std::collections::HashMap;

const METADATA_SEARCH_SIZE: usize = 128 * 1024;

/// Database metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Major version of the binary format (always 2)
    pub binary_format_major_version: u16,
    /// Minor version of the binary format
    pub binary_format_minor_version: u16,
    /// Build time, seconds since the Unix epoch
    pub build_epoch: u64,
    /// Database type, e.g. `GeoLite2-City`
    pub database_type: String,
    /// Description by language code
    pub description: HashMap<String, String>,
    /// Tree IP version
    pub ip_version: IpVersion,
    /// Languages that localized names may be available in
    pub languages: Vec<String>,
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record width
    pub record_size: RecordSize,
}

impl Metadata {
    /// Parse the metadata map that follows the marker
    pub fn from_value(value: &DataValue) -> Result<Self, MmdbError> {
        if value.as_map().is_none() {
            return Err(MmdbError::InvalidMetadata("metadata is not a map".to_string()));
        }

        let major = required_uint(value, "binary_format_major_version")?;
        if major != 2 {
            return Err(MmdbError::InvalidMetadata(format!(
                "unsupported binary format major version {}",
                major
            )));
        }

        let ip_version = match required_uint(value, "ip_version")? {
            4 => IpVersion::V4,
            6 => IpVersion::V6,
            other => {
                return Err(MmdbError::InvalidMetadata(format!(
                    "Invalid IP version: {}",
                    other
                )))
            }
        };

        let record_size = RecordSize::from_bits(required_uint(value, "record_size")?)?;

        let node_count = required_uint(value, "node_count")?;
        if node_count == 0 || node_count > record_size.max_record() as u64 {
            return Err(MmdbError::InvalidMetadata(format!(
                "node_count {} out of range for {}-bit records",
                node_count,
                record_size.bits()
            )));
        }

        let description = value
            .get("description")
            .and_then(DataValue::as_map)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let languages = value
            .get("languages")
            .and_then(DataValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Metadata {
            binary_format_major_version: major as u16,
            binary_format_minor_version: optional_uint(value, "binary_format_minor_version") as u16,
            build_epoch: optional_uint(value, "build_epoch"),
            database_type: value
                .get("database_type")
                .and_then(DataValue::as_str)
                .unwrap_or_default()
                .to_string(),
            description,
            ip_version,
            languages,
            node_count: node_count as u32,
            record_size,
        })
    }

    /// Search tree size in bytes
    pub fn tree_size(&self) -> usize {
        self.node_count as usize * self.record_size.node_bytes()
    }
}

/// Byte ranges of a validated file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Search tree size in bytes, starting at offset 0
    pub tree_size: usize,
    /// Start of the data section
    pub data_start: usize,
    /// End of the data section (the marker offset)
    pub data_end: usize,
}

/// Locate and parse the metadata, and check the file is large enough for it
pub fn parse_header(data: &[u8]) -> Result<(Metadata, Layout), MmdbError> {
    let marker_offset = find_metadata_marker(data)?;
    let metadata_bytes = &data[marker_offset + METADATA_MARKER.len()..];

    let (value, _) = DataDecoder::new(metadata_bytes)
        .decode(0)
        .map_err(|e| MmdbError::InvalidMetadata(format!("failed to decode metadata: {}", e)))?;
    let metadata = Metadata::from_value(&value)?;

    let tree_size = metadata.tree_size();
    let data_start = tree_size + DATA_SECTION_SEPARATOR;
    if data_start > marker_offset {
        return Err(MmdbError::InvalidFormat(format!(
            "search tree of {} bytes does not fit before metadata at offset {}",
            tree_size, marker_offset
        )));
    }

    Ok((
        metadata,
        Layout {
            tree_size,
            data_start,
            data_end: marker_offset,
        },
    ))
}

/// Offset of the last metadata marker within the final 128KB
pub fn find_metadata_marker(data: &[u8]) -> Result<usize, MmdbError> {
    let search_start = data.len().saturating_sub(METADATA_SEARCH_SIZE);
    memchr::memmem::rfind(&data[search_start..], METADATA_MARKER)
        .map(|pos| search_start + pos)
        .ok_or(MmdbError::MetadataNotFound)
}

fn required_uint(map: &DataValue, key: &str) -> Result<u64, MmdbError> {
    match map.get(key) {
        Some(value) => value.as_u64().ok_or_else(|| {
            MmdbError::InvalidMetadata(format!("Field '{}' is not an unsigned integer", key))
        }),
        None => Err(MmdbError::InvalidMetadata(format!(
            "Required field '{}' not found",
            key
        ))),
    }
}

fn optional_uint(map: &DataValue, key: &str) -> u64 {
    map.get(key).and_then(DataValue::as_u64).unwrap_or(0)
}
