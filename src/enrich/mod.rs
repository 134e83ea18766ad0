//! GeoIP and Spur enrichment over MMDB files
//!
//! An [`EnrichmentService`] resolves database paths from its
//! [`EnrichmentConfig`] and takes snapshots from an injected
//! [`ReaderCache`]. Each batch call takes its snapshots once, optionally
//! reloading first, and then evaluates every row against those snapshots in
//! parallel. A reload that lands mid-batch is never observed by that batch.
//!
//! Row semantics:
//! - null address: `None`
//! - unparseable address: `None` for records, `""` for ASN labels
//! - address not covered by the database: a default record (`""` for ASN)
//! - corrupt tree path or data entry: whatever decoded cleanly, defaults for
//!   the rest, and a warning in the log

pub mod config;
pub mod records;

pub use config::EnrichmentConfig;
pub use records::{asn_label, GeoRecord, SpurRecord};

use crate::addr::IpAddress;
use crate::cache::{ReaderCache, Snapshot};
use crate::error::Result;
use crate::mmdb::{DataValue, MmdbDatabase};
use rayon::prelude::*;
use std::sync::Arc;

/// Enrichment lookups backed by a shared reader cache
#[derive(Debug, Clone)]
pub struct EnrichmentService {
    config: EnrichmentConfig,
    cache: Arc<ReaderCache<MmdbDatabase>>,
}

impl EnrichmentService {
    /// Service over an explicit cache
    pub fn new(config: EnrichmentConfig, cache: Arc<ReaderCache<MmdbDatabase>>) -> Self {
        Self { config, cache }
    }

    /// Service configured from the environment, sharing the process-wide cache
    pub fn from_env() -> Self {
        Self::new(EnrichmentConfig::from_env(), ReaderCache::global())
    }

    /// Active configuration
    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Cache the service reads through
    pub fn cache(&self) -> &Arc<ReaderCache<MmdbDatabase>> {
        &self.cache
    }

    /// Snapshot of the ASN database
    pub fn asn_reader(&self, reload: bool) -> Result<AsnReader> {
        let path = self.config.asn_path()?;
        Ok(AsnReader {
            db: self.cache.get_or_reload(&path, reload)?,
        })
    }

    /// Snapshots of the ASN and City databases
    ///
    /// A reload refreshes both MaxMind files and nothing else.
    pub fn geo_reader(&self, reload: bool) -> Result<GeoReader> {
        let asn = self.asn_reader(reload)?;
        let city_path = self.config.city_path()?;
        Ok(GeoReader {
            asn,
            city: self.cache.get_or_reload(&city_path, reload)?,
            language: self.config.language.clone(),
        })
    }

    /// Snapshot of the Spur database
    pub fn spur_reader(&self, reload: bool) -> Result<SpurReader> {
        let path = self.config.spur_path()?;
        Ok(SpurReader {
            db: self.cache.get_or_reload(&path, reload)?,
        })
    }

    /// `AS{num} {org}` for one address, `""` when invalid or not covered
    pub fn asn(&self, text: &str, reload: bool) -> Result<String> {
        Ok(self.asn_reader(reload)?.asn(text))
    }

    /// ASN and city geolocation for one address
    pub fn full(&self, text: &str, reload: bool) -> Result<Option<GeoRecord>> {
        Ok(self.geo_reader(reload)?.full(text))
    }

    /// Spur context for one address
    pub fn spur(&self, text: &str, reload: bool) -> Result<Option<SpurRecord>> {
        Ok(self.spur_reader(reload)?.lookup(text))
    }

    /// [`asn`](Self::asn) over a column
    pub fn asn_column<S>(&self, rows: &[Option<S>], reload: bool) -> Result<Vec<Option<String>>>
    where
        S: AsRef<str> + Sync,
    {
        let reader = self.asn_reader(reload)?;
        Ok(map_rows(rows, |text| Some(reader.asn(text))))
    }

    /// [`full`](Self::full) over a column
    pub fn full_column<S>(&self, rows: &[Option<S>], reload: bool) -> Result<Vec<Option<GeoRecord>>>
    where
        S: AsRef<str> + Sync,
    {
        let reader = self.geo_reader(reload)?;
        Ok(map_rows(rows, |text| reader.full(text)))
    }

    /// [`spur`](Self::spur) over a column
    pub fn spur_column<S>(
        &self,
        rows: &[Option<S>],
        reload: bool,
    ) -> Result<Vec<Option<SpurRecord>>>
    where
        S: AsRef<str> + Sync,
    {
        let reader = self.spur_reader(reload)?;
        Ok(map_rows(rows, |text| reader.lookup(text)))
    }
}

/// ASN lookups against one snapshot
#[derive(Debug, Clone)]
pub struct AsnReader {
    db: Snapshot<MmdbDatabase>,
}

impl AsnReader {
    /// Snapshot generation in use
    pub fn generation(&self) -> u64 {
        self.db.generation()
    }

    /// `AS{num} {org}` for a found entry, `""` for invalid text or an
    /// address the database does not cover
    pub fn asn(&self, text: &str) -> String {
        let Ok(addr) = IpAddress::parse(text) else {
            return String::new();
        };
        match find_entry(&self.db, &addr) {
            Some(entry) => {
                let mut record = GeoRecord::default();
                record.apply_asn(&entry);
                asn_label(record.asnnum, &record.asnorg)
            }
            None => String::new(),
        }
    }
}

/// ASN plus City lookups against one pair of snapshots
#[derive(Debug, Clone)]
pub struct GeoReader {
    asn: AsnReader,
    city: Snapshot<MmdbDatabase>,
    language: String,
}

impl GeoReader {
    /// Generations of the ASN and City snapshots in use
    pub fn generations(&self) -> (u64, u64) {
        (self.asn.generation(), self.city.generation())
    }

    /// Full record for `text`, `None` for invalid text
    pub fn full(&self, text: &str) -> Option<GeoRecord> {
        let addr = IpAddress::parse(text).ok()?;
        let mut record = GeoRecord::default();
        if let Some(entry) = find_entry(&self.asn.db, &addr) {
            record.apply_asn(&entry);
        }
        if let Some(entry) = find_entry(&self.city, &addr) {
            record.apply_city(&entry, &self.language);
        }
        Some(record)
    }
}

/// Spur lookups against one snapshot
#[derive(Debug, Clone)]
pub struct SpurReader {
    db: Snapshot<MmdbDatabase>,
}

impl SpurReader {
    /// Snapshot generation in use
    pub fn generation(&self) -> u64 {
        self.db.generation()
    }

    /// Spur record for `text`, `None` for invalid text
    pub fn lookup(&self, text: &str) -> Option<SpurRecord> {
        let addr = IpAddress::parse(text).ok()?;
        Some(
            find_entry(&self.db, &addr)
                .map(|entry| SpurRecord::from_entry(&entry))
                .unwrap_or_default(),
        )
    }
}

/// Decoded entry for `addr`, `None` when the address is not covered
///
/// A corrupt tree path counts as not covered.
fn find_entry(db: &MmdbDatabase, addr: &IpAddress) -> Option<DataValue> {
    match db.lookup_record(addr) {
        Ok(Some(record)) => {
            if let Some(err) = &record.error {
                log::warn!(
                    "{}: partial entry for {}: {}",
                    source_name(db),
                    addr,
                    err
                );
            }
            Some(record.into_value())
        }
        Ok(None) => None,
        Err(err) => {
            log::warn!("{}: lookup of {} failed: {}", source_name(db), addr, err);
            None
        }
    }
}

fn source_name(db: &MmdbDatabase) -> String {
    match db.path() {
        Some(path) => path.display().to_string(),
        None => db.metadata().database_type.clone(),
    }
}

fn map_rows<S, T, F>(rows: &[Option<S>], f: F) -> Vec<Option<T>>
where
    S: AsRef<str> + Sync,
    T: Send,
    F: Fn(&str) -> Option<T> + Sync,
{
    rows.par_iter()
        .map(|row| row.as_ref().and_then(|text| f(text.as_ref())))
        .collect()
}
