//! MMDB Search Tree Traversal
//!
//! Each node holds two records. A record below `node_count` is the next
//! node, a record equal to `node_count` means "no data", and anything
//! larger points into the data section.

use super::format::{Layout, Metadata};
use super::types::{IpVersion, MmdbError, RecordSize, DATA_SECTION_SEPARATOR};
use crate::addr::{Family, IpAddress};

/// Result of an IP lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupResult {
    /// Offset into the data section (relative to data section start)
    pub data_offset: usize,
    /// Prefix length of the matching network, in the address's own family
    pub prefix_len: u8,
}

/// Tree parameters fixed at load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeInfo {
    node_count: u32,
    record_size: RecordSize,
    ip_version: IpVersion,
    data_size: usize,
    /// Record reached after 96 zero bits; the IPv4 root in IPv6 trees
    ipv4_start: u32,
    /// Bits consumed to reach `ipv4_start`
    ipv4_start_depth: u8,
}

impl TreeInfo {
    /// Derive tree parameters and locate the IPv4 subtree
    pub fn new(tree: &[u8], metadata: &Metadata, layout: &Layout) -> Result<Self, MmdbError> {
        let mut info = TreeInfo {
            node_count: metadata.node_count,
            record_size: metadata.record_size,
            ip_version: metadata.ip_version,
            data_size: layout.data_end - layout.data_start,
            ipv4_start: 0,
            ipv4_start_depth: 0,
        };

        if info.ip_version == IpVersion::V6 {
            let search = SearchTree::new(tree, &info);
            let mut record = 0u32;
            let mut depth = 0u8;
            while depth < 96 && record < info.node_count {
                record = search.read_record(record, 0)?;
                depth += 1;
            }
            info.ipv4_start = record;
            info.ipv4_start_depth = depth;
        }

        Ok(info)
    }

    /// Number of nodes in the tree
    pub fn node_count(&self) -> u32 {
        self.node_count
    }
}

/// Search tree over borrowed tree bytes
pub struct SearchTree<'a> {
    tree: &'a [u8],
    info: &'a TreeInfo,
}

impl<'a> SearchTree<'a> {
    /// Create a new search tree
    pub fn new(tree: &'a [u8], info: &'a TreeInfo) -> Self {
        Self { tree, info }
    }

    /// Look up an address
    ///
    /// `Ok(None)` when the address is not covered, including IPv6 addresses
    /// against an IPv4-only tree. Errors mean the tree itself is corrupt.
    pub fn lookup(&self, addr: &IpAddress) -> Result<Option<LookupResult>, MmdbError> {
        let bits = addr.left_aligned_bits();
        let (start, start_depth, width) = match (addr.family(), self.info.ip_version) {
            (Family::V6, IpVersion::V4) => return Ok(None),
            (Family::V6, IpVersion::V6) => (0, 0, 128u8),
            (Family::V4, IpVersion::V4) => (0, 0, 32u8),
            (Family::V4, IpVersion::V6) => {
                (self.info.ipv4_start, self.info.ipv4_start_depth, 32u8)
            }
        };

        let node_count = self.info.node_count;
        let mut record = start;
        let mut consumed = 0u8;
        while consumed < width && record < node_count {
            let bit = ((bits >> (127 - consumed as u32)) & 1) as u8;
            record = self.read_record(record, bit)?;
            consumed += 1;
        }

        if record == node_count {
            return Ok(None);
        }
        if record < node_count {
            return Err(MmdbError::InvalidFormat(format!(
                "search tree deeper than {} bits",
                width
            )));
        }

        // For IPv4 in an IPv6 tree, a terminal inside the ::/96 walk covers all of IPv4
        let prefix_len = if addr.family() == Family::V4 && self.info.ip_version == IpVersion::V6 {
            (start_depth + consumed).saturating_sub(96)
        } else {
            consumed
        };

        Ok(Some(LookupResult {
            data_offset: self.data_offset(record)?,
            prefix_len,
        }))
    }

    /// Read the left (0) or right (1) record of `node`
    pub fn read_record(&self, node: u32, side: u8) -> Result<u32, MmdbError> {
        if node >= self.info.node_count {
            return Err(MmdbError::InvalidFormat(format!(
                "Node index {} exceeds node count {}",
                node, self.info.node_count
            )));
        }
        let node_bytes = self.info.record_size.node_bytes();
        let start = node as usize * node_bytes;
        let bytes = self.tree.get(start..start + node_bytes).ok_or_else(|| {
            MmdbError::InvalidFormat(format!("Node {} outside search tree", node))
        })?;
        Ok(self.info.record_size.read(bytes, side))
    }

    /// Data section offset for a data record
    ///
    /// `record - node_count - 16`, bounds-checked against the data section.
    fn data_offset(&self, record: u32) -> Result<usize, MmdbError> {
        let offset = (record - self.info.node_count) as usize;
        offset
            .checked_sub(DATA_SECTION_SEPARATOR)
            .filter(|offset| *offset < self.info.data_size)
            .ok_or_else(|| {
                MmdbError::InvalidFormat(format!(
                    "record {} points outside data section (node_count={}, data size={})",
                    record, self.info.node_count, self.info.data_size
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(node_count: u32, ip_version: IpVersion, data_size: usize) -> TreeInfo {
        TreeInfo {
            node_count,
            record_size: RecordSize::Bits24,
            ip_version,
            data_size,
            ipv4_start: 0,
            ipv4_start_depth: 0,
        }
    }

    #[test]
    fn test_data_offset() {
        let info = info(100, IpVersion::V6, 1000);
        let tree = SearchTree::new(&[], &info);

        // (116 - 100 - 16 = 0)
        assert_eq!(tree.data_offset(116).unwrap(), 0);
        // (200 - 100 - 16 = 84)
        assert_eq!(tree.data_offset(200).unwrap(), 84);
        // inside the separator
        assert!(tree.data_offset(110).is_err());
        // beyond the data section
        assert!(tree.data_offset(100 + 16 + 1000).is_err());
    }

    #[test]
    fn test_ipv4_tree_lookup() {
        // Single node: 0.0.0.0/1 -> data 0, 128.0.0.0/1 -> not found
        let node_count = 1;
        let mut tree = Vec::new();
        RecordSize::Bits24.write(&mut tree, node_count + 16, node_count);
        let info = info(node_count, IpVersion::V4, 8);
        let search = SearchTree::new(&tree, &info);

        let hit = search
            .lookup(&IpAddress::parse("8.8.8.8").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(hit, LookupResult { data_offset: 0, prefix_len: 1 });
        assert_eq!(search.lookup(&IpAddress::parse("200.0.0.1").unwrap()).unwrap(), None);
        assert_eq!(search.lookup(&IpAddress::parse("::1").unwrap()).unwrap(), None);
    }

    #[test]
    fn test_corrupt_child_index() {
        let mut tree = Vec::new();
        // Left record points at a node that does not exist in the bytes
        RecordSize::Bits24.write(&mut tree, 1, 1);
        let info = info(2, IpVersion::V4, 8);
        let search = SearchTree::new(&tree, &info);
        assert!(search.lookup(&IpAddress::parse("1.1.1.1").unwrap()).is_err());
    }
}
