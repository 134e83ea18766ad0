//! iptools - IP Address Semantics for Columnar Data
//!
//! iptools evaluates IP-address operations over whole columns of nullable
//! text: validation, RFC 1918 classification, IPv4 numeric conversion,
//! extraction from free text, CIDR-set membership, and MaxMind/Spur MMDB
//! enrichment behind a reloadable reader cache.
//!
//! # Quick Start
//!
//! ```rust
//! use iptools::{columns, NetworkSet};
//!
//! let rows = [Some("8.8.8.8"), Some("192.168.1.1"), Some("not an ip"), None];
//!
//! assert_eq!(
//!     columns::is_private(&rows),
//!     vec![Some(false), Some(true), Some(false), None]
//! );
//!
//! let set = NetworkSet::parse_all(["8.8.8.0/24", "192.168.0.0/16"])?;
//! assert_eq!(set.is_in("8.8.8.8"), Some(true));
//! assert_eq!(set.is_in("1.1.1.1"), Some(false));
//! assert_eq!(set.is_in("not an ip"), None);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Enrichment
//!
//! ```rust,no_run
//! use iptools::{EnrichmentConfig, EnrichmentService, ReaderCache};
//!
//! let config = EnrichmentConfig::new().with_maxmind_dir("/usr/local/share/GeoIP");
//! let service = EnrichmentService::new(config, ReaderCache::global());
//!
//! let rows = [Some("8.8.8.8"), None];
//! let labels = service.asn_column(&rows, false)?;
//! assert_eq!(labels[0].as_deref(), Some("AS15169 GOOGLE"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Null Handling
//!
//! Row-level problems never fail a batch. An unparseable address becomes
//! null (or `false` for the predicates), an address missing from a
//! database becomes a default record, and a corrupt database entry yields
//! whatever decoded cleanly. Only set-level and resource-level failures,
//! such as an invalid CIDR literal or a missing database file, are errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod addr;
pub mod cache;
pub mod classify;
pub mod codec;
pub mod columns;
pub mod enrich;
pub mod error;
pub mod extractor;
pub mod mmdb;
pub mod network;

pub use crate::addr::{AddrParseError, Family, IpAddress};
pub use crate::cache::{ReaderCache, Snapshot};
pub use crate::enrich::{EnrichmentConfig, EnrichmentService, GeoRecord, SpurRecord};
pub use crate::error::{Error, Result};
pub use crate::extractor::IpExtractor;
pub use crate::mmdb::{DataValue, MmdbDatabase, MmdbError, MmdbWriter};
pub use crate::network::{CidrNetwork, CidrParseError, NetworkSet};

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
