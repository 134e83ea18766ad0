//! MMDB database writer
//!
//! Builds complete MMDB images: search tree, separator, data section and
//! metadata. Used to generate fixture databases for tests and benchmarks
//! and by hosts that need small synthetic databases.
//!
//! Networks may be inserted in any order. A less specific network never
//! overrides a more specific one, whichever is inserted first.

use super::decoder::DataValue;
use super::types::{IpVersion, MmdbError, RecordSize, DATA_SECTION_SEPARATOR, METADATA_MARKER};
use crate::addr::Family;
use crate::network::CidrNetwork;
use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Data section encoder
///
/// Produces control bytes with extended types and minimal-width integers.
/// Identical top-level values share one offset, and repeated strings
/// inside maps and arrays are written once and referenced by pointer.
#[derive(Debug, Default)]
pub struct DataEncoder {
    buffer: Vec<u8>,
    dedup_map: HashMap<Vec<u8>, u32>,
    strings: HashMap<String, u32>,
}

impl DataEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a value and return its offset
    pub fn encode(&mut self, value: &DataValue) -> u32 {
        let mut standalone = Vec::new();
        write_value(value, &mut standalone, &mut None);

        if let Some(&offset) = self.dedup_map.get(&standalone) {
            return offset;
        }

        let offset = self.buffer.len() as u32;
        let mut shared = Some((&mut self.strings, offset));
        let mut encoded = Vec::with_capacity(standalone.len());
        write_value(value, &mut encoded, &mut shared);
        self.buffer.extend_from_slice(&encoded);
        self.dedup_map.insert(standalone, offset);
        offset
    }

    /// Current size of the encoded data
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Get the final encoded data section
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// String table and the absolute offset of `out[0]`
type SharedStrings<'a> = Option<(&'a mut HashMap<String, u32>, u32)>;

fn write_value(value: &DataValue, out: &mut Vec<u8>, shared: &mut SharedStrings<'_>) {
    match value {
        DataValue::String(s) => write_string(s, out, shared),
        DataValue::Double(d) => {
            write_control(out, 3, 8);
            out.extend_from_slice(&d.to_be_bytes());
        }
        DataValue::Bytes(b) => {
            write_control(out, 4, b.len());
            out.extend_from_slice(b);
        }
        DataValue::Uint16(n) => write_uint(out, 5, &n.to_be_bytes()),
        DataValue::Uint32(n) => write_uint(out, 6, &n.to_be_bytes()),
        DataValue::Map(map) => {
            write_control(out, 7, map.len());
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                write_string(key, out, shared);
                write_value(&map[key], out, shared);
            }
        }
        DataValue::Int32(n) => write_uint(out, 8, &n.to_be_bytes()),
        DataValue::Uint64(n) => write_uint(out, 9, &n.to_be_bytes()),
        DataValue::Uint128(n) => write_uint(out, 10, &n.to_be_bytes()),
        DataValue::Array(items) => {
            write_control(out, 11, items.len());
            for item in items {
                write_value(item, out, shared);
            }
        }
        DataValue::Bool(b) => write_control(out, 14, *b as usize),
        DataValue::Float(f) => {
            write_control(out, 15, 4);
            out.extend_from_slice(&f.to_be_bytes());
        }
    }
}

fn write_string(s: &str, out: &mut Vec<u8>, shared: &mut SharedStrings<'_>) {
    if let Some((strings, base)) = shared {
        // Short strings are cheaper inline than behind a pointer
        if s.len() > 3 {
            if let Some(&target) = strings.get(s) {
                write_pointer(out, target);
                return;
            }
            strings.insert(s.to_string(), *base + out.len() as u32);
        }
    }
    write_control(out, 2, s.len());
    out.extend_from_slice(s.as_bytes());
}

/// Big-endian integer with leading zero bytes stripped
fn write_uint(out: &mut Vec<u8>, type_id: u8, be_bytes: &[u8]) {
    let skip = be_bytes.iter().take_while(|b| **b == 0).count();
    let payload = &be_bytes[skip..];
    write_control(out, type_id, payload.len());
    out.extend_from_slice(payload);
}

fn write_control(out: &mut Vec<u8>, type_id: u8, size: usize) {
    let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
        (size as u8, Vec::new())
    } else if size < 285 {
        (29, vec![(size - 29) as u8])
    } else if size < 65_821 {
        (30, ((size - 285) as u16).to_be_bytes().to_vec())
    } else {
        (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
    };

    if type_id <= 7 {
        out.push((type_id << 5) | size_bits);
    } else {
        out.push(size_bits);
        out.push(type_id - 7);
    }
    out.extend_from_slice(&extra);
}

fn write_pointer(out: &mut Vec<u8>, target: u32) {
    if target < 2_048 {
        out.push(0x20 | ((target >> 8) & 0x7) as u8);
        out.push(target as u8);
    } else if target < 526_336 {
        let v = target - 2_048;
        out.push(0x28 | ((v >> 16) & 0x7) as u8);
        out.extend_from_slice(&(v as u16).to_be_bytes());
    } else if target < 134_744_064 {
        let v = target - 526_336;
        out.push(0x30 | ((v >> 24) & 0x7) as u8);
        out.extend_from_slice(&v.to_be_bytes()[1..]);
    } else {
        out.push(0x38);
        out.extend_from_slice(&target.to_be_bytes());
    }
}

/// Child slot of a tree node under construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodePointer {
    /// Another node in the arena
    Node(u32),
    /// Data offset, with the prefix length that put it there
    Data(u32, u8),
    /// Not found
    Empty,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    children: [NodePointer; 2],
}

impl Node {
    fn empty() -> Self {
        Self {
            children: [NodePointer::Empty; 2],
        }
    }
}

/// Arena-allocated search tree builder
#[derive(Debug)]
struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            nodes: vec![Node::empty()],
        }
    }

    fn allocate_node(&mut self) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(Node::empty());
        id
    }

    /// Insert `prefix_len` bits of `bits` (MSB first, left-aligned)
    fn insert(&mut self, bits: u128, prefix_len: u8, data_offset: u32) {
        if prefix_len == 0 {
            self.backfill(0, data_offset, 0);
            return;
        }

        let mut node_id = 0u32;
        for depth in 0..prefix_len {
            let bit = ((bits >> (127 - depth as u32)) & 1) as usize;
            let child = self.nodes[node_id as usize].children[bit];

            if depth + 1 == prefix_len {
                match child {
                    NodePointer::Empty => {
                        self.nodes[node_id as usize].children[bit] =
                            NodePointer::Data(data_offset, prefix_len);
                    }
                    NodePointer::Data(_, existing_len) => {
                        if prefix_len >= existing_len {
                            self.nodes[node_id as usize].children[bit] =
                                NodePointer::Data(data_offset, prefix_len);
                        }
                    }
                    // More specific networks already live below; fill the gaps
                    NodePointer::Node(child_id) => self.backfill(child_id, data_offset, prefix_len),
                }
                return;
            }

            node_id = match child {
                NodePointer::Node(child_id) => child_id,
                NodePointer::Empty => {
                    let new_id = self.allocate_node();
                    self.nodes[node_id as usize].children[bit] = NodePointer::Node(new_id);
                    new_id
                }
                NodePointer::Data(existing_offset, existing_len) => {
                    // Split a less specific leaf so the longer prefix can go below it
                    let new_id = self.allocate_node();
                    self.nodes[new_id as usize].children =
                        [NodePointer::Data(existing_offset, existing_len); 2];
                    self.nodes[node_id as usize].children[bit] = NodePointer::Node(new_id);
                    new_id
                }
            };
        }
    }

    /// Point every empty or less specific slot under `node_id` at `data_offset`
    fn backfill(&mut self, node_id: u32, data_offset: u32, prefix_len: u8) {
        for bit in 0..2 {
            match self.nodes[node_id as usize].children[bit] {
                NodePointer::Empty => {
                    self.nodes[node_id as usize].children[bit] =
                        NodePointer::Data(data_offset, prefix_len);
                }
                NodePointer::Data(_, existing_len) if prefix_len > existing_len => {
                    self.nodes[node_id as usize].children[bit] =
                        NodePointer::Data(data_offset, prefix_len);
                }
                NodePointer::Data(..) => {}
                NodePointer::Node(child_id) => self.backfill(child_id, data_offset, prefix_len),
            }
        }
    }

    fn serialize(&self, record_size: RecordSize) -> Result<(Vec<u8>, u32), MmdbError> {
        let node_count = self.nodes.len() as u32;
        let to_record = |pointer: NodePointer| -> Result<u32, MmdbError> {
            let value = match pointer {
                NodePointer::Empty => node_count as u64,
                NodePointer::Node(id) => id as u64,
                NodePointer::Data(offset, _) => {
                    node_count as u64 + DATA_SECTION_SEPARATOR as u64 + offset as u64
                }
            };
            if value > record_size.max_record() as u64 {
                return Err(MmdbError::InvalidFormat(format!(
                    "record value {} does not fit in {}-bit records",
                    value,
                    record_size.bits()
                )));
            }
            Ok(value as u32)
        };

        let mut tree = Vec::with_capacity(self.nodes.len() * record_size.node_bytes());
        for node in &self.nodes {
            let left = to_record(node.children[0])?;
            let right = to_record(node.children[1])?;
            record_size.write(&mut tree, left, right);
        }
        Ok((tree, node_count))
    }
}

/// Builder for complete MMDB images
#[derive(Debug, Clone)]
pub struct MmdbWriter {
    ip_version: IpVersion,
    record_size: RecordSize,
    database_type: String,
    description: HashMap<String, String>,
    languages: Vec<String>,
    build_epoch: Option<u64>,
    entries: Vec<(CidrNetwork, DataValue)>,
}

impl MmdbWriter {
    /// Create a writer for an IPv4 or IPv6 tree with 28-bit records
    pub fn new(ip_version: IpVersion) -> Self {
        Self {
            ip_version,
            record_size: RecordSize::Bits28,
            database_type: "iptools-test".to_string(),
            description: HashMap::new(),
            languages: vec!["en".to_string()],
            build_epoch: None,
            entries: Vec::new(),
        }
    }

    /// Set the record width
    pub fn with_record_size(mut self, record_size: RecordSize) -> Self {
        self.record_size = record_size;
        self
    }

    /// Set the database type name
    pub fn with_database_type(mut self, db_type: impl Into<String>) -> Self {
        self.database_type = db_type.into();
        self
    }

    /// Add a description in a specific language
    pub fn with_description(
        mut self,
        language: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.description.insert(language.into(), text.into());
        self
    }

    /// Set the languages list
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Fix the build epoch instead of using the current time
    pub fn with_build_epoch(mut self, epoch: u64) -> Self {
        self.build_epoch = Some(epoch);
        self
    }

    /// Insert a network literal such as `"1.2.3.0/24"` with its record
    pub fn insert(&mut self, cidr: &str, value: DataValue) -> Result<(), MmdbError> {
        let network =
            CidrNetwork::parse(cidr).map_err(|e| MmdbError::InvalidFormat(e.to_string()))?;
        self.insert_network(network, value)
    }

    /// Insert a parsed network with its record
    ///
    /// IPv4 networks in an IPv6 tree are placed under `::/96`.
    pub fn insert_network(
        &mut self,
        network: CidrNetwork,
        value: DataValue,
    ) -> Result<(), MmdbError> {
        if network.family() == Family::V6 && self.ip_version == IpVersion::V4 {
            return Err(MmdbError::InvalidFormat(format!(
                "cannot insert IPv6 network {} into an IPv4 tree",
                network
            )));
        }
        self.entries.push((network, value));
        Ok(())
    }

    /// Number of inserted networks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been inserted
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the database image
    pub fn build(&self) -> Result<Vec<u8>, MmdbError> {
        let mut encoder = DataEncoder::new();
        let mut tree = TreeBuilder::new();

        for (network, value) in &self.entries {
            let offset = encoder.encode(value);
            let (bits, prefix_len) = match (network.family(), self.ip_version) {
                (Family::V4, IpVersion::V6) => {
                    (network.network_bits() >> 96, network.prefix_len() + 96)
                }
                _ => (network.network_bits(), network.prefix_len()),
            };
            tree.insert(bits, prefix_len, offset);
        }

        let (tree_bytes, node_count) = tree.serialize(self.record_size)?;
        let data_section = encoder.into_bytes();

        let mut database = Vec::with_capacity(
            tree_bytes.len() + DATA_SECTION_SEPARATOR + data_section.len() + 512,
        );
        database.extend_from_slice(&tree_bytes);
        database.extend_from_slice(&[0u8; DATA_SECTION_SEPARATOR]);
        database.extend_from_slice(&data_section);
        database.extend_from_slice(METADATA_MARKER);

        let mut metadata_encoder = DataEncoder::new();
        metadata_encoder.encode(&self.metadata_value(node_count));
        database.extend_from_slice(&metadata_encoder.into_bytes());

        log::debug!(
            "built MMDB image: {} networks, {} nodes, {} data bytes",
            self.entries.len(),
            node_count,
            data_section.len()
        );

        Ok(database)
    }

    /// Build and write the image to `path`
    ///
    /// An existing file is replaced by rename, so databases that still map
    /// the old file keep reading it intact.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), MmdbError> {
        let path = path.as_ref();
        let bytes = self.build()?;
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        std::fs::write(&staging, bytes)?;
        std::fs::rename(&staging, path)?;
        Ok(())
    }

    fn metadata_value(&self, node_count: u32) -> DataValue {
        let build_epoch = self.build_epoch.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });
        let description = self
            .description
            .iter()
            .map(|(k, v)| (k.clone(), DataValue::String(v.clone())))
            .collect();
        let languages = self
            .languages
            .iter()
            .map(|l| DataValue::String(l.clone()))
            .collect();

        let mut metadata = HashMap::new();
        metadata.insert("binary_format_major_version".to_string(), DataValue::Uint16(2));
        metadata.insert("binary_format_minor_version".to_string(), DataValue::Uint16(0));
        metadata.insert("build_epoch".to_string(), DataValue::Uint64(build_epoch));
        metadata.insert(
            "database_type".to_string(),
            DataValue::String(self.database_type.clone()),
        );
        metadata.insert("description".to_string(), DataValue::Map(description));
        metadata.insert("languages".to_string(), DataValue::Array(languages));
        metadata.insert(
            "ip_version".to_string(),
            DataValue::Uint16(self.ip_version.as_u16()),
        );
        metadata.insert("node_count".to_string(), DataValue::Uint32(node_count));
        metadata.insert(
            "record_size".to_string(),
            DataValue::Uint16(self.record_size.bits()),
        );
        DataValue::Map(metadata)
    }
}
