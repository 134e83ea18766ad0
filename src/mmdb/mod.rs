//! MaxMind DB (MMDB) Reader
//!
//! Reads MaxMind DB files (GeoLite2, GeoIP2, Spur and any other producer
//! of the format) into an immutable [`MmdbDatabase`]. Files are memory
//! mapped; validation of the metadata and file layout happens once at open,
//! so a database that opens successfully only fails later on corrupt tree
//! paths or data entries.
//!
//! ## Architecture
//!
//! - **types**: errors, record widths and constants
//! - **format**: metadata marker search and metadata parsing
//! - **tree**: search tree traversal for IP lookups
//! - **decoder**: data section decoding into [`DataValue`]
//! - **writer**: builds MMDB images, used for fixtures

pub mod decoder;
pub mod format;
pub mod tree;
pub mod types;
pub mod writer;

pub use decoder::{DataDecoder, DataValue, PartialRecord};
pub use format::{find_metadata_marker, Layout, Metadata};
pub use tree::{LookupResult, SearchTree, TreeInfo};
pub use types::{IpVersion, MmdbError, RecordSize, METADATA_MARKER};
pub use writer::{DataEncoder, MmdbWriter};

use crate::addr::IpAddress;
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Storage for database bytes - either owned or memory-mapped
enum Storage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v.as_slice(),
            Storage::Mmap(m) => &m[..],
        }
    }
}

/// An opened, validated MMDB database
pub struct MmdbDatabase {
    storage: Storage,
    path: Option<PathBuf>,
    metadata: Metadata,
    layout: Layout,
    tree: TreeInfo,
}

impl fmt::Debug for MmdbDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmdbDatabase")
            .field("path", &self.path)
            .field("database_type", &self.metadata.database_type)
            .field("node_count", &self.metadata.node_count)
            .field("record_size", &self.metadata.record_size)
            .field("ip_version", &self.metadata.ip_version)
            .finish()
    }
}

impl MmdbDatabase {
    /// Open and memory-map a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MmdbError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| MmdbError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

        // SAFETY: the map is read-only and owned by the database. Files are
        // replaced by rename on update, so the mapped inode is never
        // truncated under us.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| MmdbError::Io(format!("Failed to mmap {}: {}", path.display(), e)))?;

        let mut db = Self::from_storage(Storage::Mmap(mmap))?;
        db.path = Some(path.to_path_buf());
        Ok(db)
    }

    /// Create a database from raw bytes
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, MmdbError> {
        Self::from_storage(Storage::Owned(data))
    }

    fn from_storage(storage: Storage) -> Result<Self, MmdbError> {
        let data = storage.as_slice();
        let (metadata, layout) = format::parse_header(data)?;
        let tree = TreeInfo::new(&data[..layout.tree_size], &metadata, &layout)?;

        Ok(Self {
            storage,
            path: None,
            metadata,
            layout,
            tree,
        })
    }

    /// Database metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// File the database was opened from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn tree_bytes(&self) -> &[u8] {
        &self.storage.as_slice()[..self.layout.tree_size]
    }

    fn data_section(&self) -> &[u8] {
        &self.storage.as_slice()[self.layout.data_start..self.layout.data_end]
    }

    /// Walk the search tree for `addr`
    pub fn locate(&self, addr: &IpAddress) -> Result<Option<LookupResult>, MmdbError> {
        SearchTree::new(self.tree_bytes(), &self.tree).lookup(addr)
    }

    /// Look up `addr` and decode its record strictly
    ///
    /// Any decode failure inside the record is returned as an error.
    pub fn lookup(&self, addr: &IpAddress) -> Result<Option<DataValue>, MmdbError> {
        match self.locate(addr)? {
            Some(found) => {
                let (value, _) = DataDecoder::new(self.data_section()).decode(found.data_offset)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Look up `addr` and decode its record leniently
    ///
    /// Tree corruption is an error; a corrupt record entry is reported in
    /// the returned [`PartialRecord`] next to the entries that survived.
    pub fn lookup_record(&self, addr: &IpAddress) -> Result<Option<PartialRecord>, MmdbError> {
        Ok(self
            .locate(addr)?
            .map(|found| DataDecoder::new(self.data_section()).decode_record(found.data_offset)))
    }
}
