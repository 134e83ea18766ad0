//! Reloadable, shared cache of opened databases
//!
//! Each entry is keyed by the database file path and moves through
//! `Unloaded -> Loaded` on first use and `Loaded -> Reloading -> Loaded`
//! on an explicit reload. Readers take a lock-free snapshot through
//! `ArcSwapOption`; a reload builds the new database while readers keep
//! using the old one and then publishes it with a single atomic store.
//! Loads and reloads of one entry are serialized by a per-entry mutex that
//! readers never touch once the entry is populated.
//!
//! A failed load is cached as well, so every later lookup sees the same
//! error until someone asks for a reload.

use crate::error::{Error, Result};
use crate::mmdb::{MmdbDatabase, MmdbError};
use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

static GLOBAL: LazyLock<Arc<ReaderCache<MmdbDatabase>>> =
    LazyLock::new(|| Arc::new(ReaderCache::new()));

/// A loaded database together with the generation it was loaded in
pub struct Snapshot<T> {
    value: Arc<T>,
    generation: u64,
}

impl<T> Snapshot<T> {
    /// Load generation of this entry, starting at 1
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Shared handle to the value
    pub fn shared(&self) -> &Arc<T> {
        &self.value
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            generation: self.generation,
        }
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("generation", &self.generation)
            .field("value", &self.value)
            .finish()
    }
}

type Loaded<T> = Result<Snapshot<T>>;

/// Function that opens the database at a path
pub type Loader<T> = dyn Fn(&Path) -> std::result::Result<T, MmdbError> + Send + Sync;

struct CacheEntry<T> {
    path: PathBuf,
    current: ArcSwapOption<Loaded<T>>,
    reload_lock: Mutex<()>,
    generation: AtomicU64,
}

impl<T> CacheEntry<T> {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            current: ArcSwapOption::new(None),
            reload_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    fn published(&self) -> Option<Loaded<T>> {
        self.current.load_full().map(|loaded| (*loaded).clone())
    }
}

/// Cache of databases keyed by file path
pub struct ReaderCache<T> {
    loader: Box<Loader<T>>,
    entries: RwLock<FxHashMap<PathBuf, Arc<CacheEntry<T>>>>,
}

impl ReaderCache<MmdbDatabase> {
    /// Cache that opens MMDB files with [`MmdbDatabase::open`]
    pub fn new() -> Self {
        Self::with_loader(|path| {
            let db = MmdbDatabase::open(path)?;
            log::debug!(
                "opened {}: type={} nodes={} record_size={}",
                path.display(),
                db.metadata().database_type,
                db.metadata().node_count,
                db.metadata().record_size.bits()
            );
            Ok(db)
        })
    }

    /// Process-wide cache shared by every service that does not bring its own
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }
}

impl Default for ReaderCache<MmdbDatabase> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReaderCache<T> {
    /// Cache with a custom loader
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn(&Path) -> std::result::Result<T, MmdbError> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    fn entry(&self, path: &Path) -> Arc<CacheEntry<T>> {
        if let Some(entry) = self.entries.read().get(path) {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write();
        Arc::clone(
            entries
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(CacheEntry::new(path))),
        )
    }

    /// Snapshot for `path`, loading it on first use
    ///
    /// Returns the cached failure if the last load attempt failed.
    pub fn get(&self, path: &Path) -> Result<Snapshot<T>> {
        let entry = self.entry(path);
        if let Some(loaded) = entry.published() {
            return loaded;
        }

        let _guard = entry.reload_lock.lock();
        // Another thread may have finished loading while we waited
        if let Some(loaded) = entry.published() {
            return loaded;
        }
        let loaded = self.load(&entry);
        entry.current.store(Some(Arc::new(loaded.clone())));
        loaded
    }

    /// Load `path` again and publish the result
    ///
    /// Lookups already holding the previous snapshot keep using it. When the
    /// reload fails but an earlier load succeeded, the earlier snapshot
    /// stays published and the failure is only returned to this caller.
    pub fn reload(&self, path: &Path) -> Result<Snapshot<T>> {
        let entry = self.entry(path);
        let _guard = entry.reload_lock.lock();

        let loaded = self.load(&entry);
        let previous_ok = matches!(entry.published(), Some(Ok(_)));
        if loaded.is_err() && previous_ok {
            log::warn!(
                "reload of {} failed, keeping generation {}",
                path.display(),
                entry.generation.load(Ordering::Acquire)
            );
        } else {
            entry.current.store(Some(Arc::new(loaded.clone())));
        }
        loaded
    }

    /// [`reload`](Self::reload) when `force` is set, [`get`](Self::get) otherwise
    pub fn get_or_reload(&self, path: &Path, force: bool) -> Result<Snapshot<T>> {
        if force {
            self.reload(path)
        } else {
            self.get(path)
        }
    }

    /// Drop the published state so the next `get` loads from disk
    pub fn invalidate(&self, path: &Path) {
        let entry = self.entry(path);
        let _guard = entry.reload_lock.lock();
        entry.current.store(None);
        log::debug!("invalidated {}", path.display());
    }

    /// Number of successful loads for `path` so far
    pub fn generation(&self, path: &Path) -> u64 {
        self.entries
            .read()
            .get(path)
            .map(|entry| entry.generation.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Number of known entries, loaded or failed
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if no entry has been requested yet
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn load(&self, entry: &CacheEntry<T>) -> Loaded<T> {
        match (self.loader)(&entry.path) {
            Ok(value) => {
                let generation = entry.generation.fetch_add(1, Ordering::AcqRel) + 1;
                log::info!(
                    "loaded {} (generation {})",
                    entry.path.display(),
                    generation
                );
                Ok(Snapshot {
                    value: Arc::new(value),
                    generation,
                })
            }
            Err(source) => {
                log::error!("failed to load {}: {}", entry.path.display(), source);
                Err(Error::Mmdb {
                    path: entry.path.clone(),
                    source,
                })
            }
        }
    }
}

impl<T> fmt::Debug for ReaderCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderCache")
            .field("entries", &self.entries.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_cache(fail: bool) -> (ReaderCache<String>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = ReaderCache::with_loader(move |path: &Path| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if fail {
                Err(MmdbError::Io("missing".to_string()))
            } else {
                Ok(format!("{}#{}", path.display(), n))
            }
        });
        (cache, calls)
    }

    #[test]
    fn test_loads_once() {
        let (cache, calls) = counting_cache(false);
        let path = Path::new("/db/a.mmdb");
        let first = cache.get(path).unwrap();
        let second = cache.get(path).unwrap();
        assert_eq!(*first, "/db/a.mmdb#1");
        assert!(Arc::ptr_eq(first.shared(), second.shared()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.generation(path), 1);
    }

    #[test]
    fn test_reload_bumps_generation() {
        let (cache, calls) = counting_cache(false);
        let path = Path::new("/db/a.mmdb");
        let old = cache.get(path).unwrap();
        let new = cache.get_or_reload(path, true).unwrap();
        assert_eq!(old.generation(), 1);
        assert_eq!(new.generation(), 2);
        assert_eq!(*old, "/db/a.mmdb#1");
        assert_eq!(*cache.get(path).unwrap(), "/db/a.mmdb#2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_is_cached() {
        let (cache, calls) = counting_cache(true);
        let path = Path::new("/db/missing.mmdb");
        let err = cache.get(path).unwrap_err();
        assert!(matches!(err, Error::Mmdb { .. }));
        assert!(cache.get(path).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(cache.reload(path).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.generation(path), 0);
    }

    #[test]
    fn test_entries_are_independent() {
        let (cache, calls) = counting_cache(false);
        let a = Path::new("/maxmind/GeoLite2-ASN.mmdb");
        let b = Path::new("/spur/spur.mmdb");
        cache.get(a).unwrap();
        cache.get(b).unwrap();
        cache.reload(a).unwrap();
        assert_eq!(cache.generation(a), 2);
        assert_eq!(cache.generation(b), 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invalidate_forces_load() {
        let (cache, calls) = counting_cache(false);
        let path = Path::new("/db/a.mmdb");
        cache.get(path).unwrap();
        cache.invalidate(path);
        assert_eq!(*cache.get(path).unwrap(), "/db/a.mmdb#2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_path_generation() {
        let (cache, _) = counting_cache(false);
        assert_eq!(cache.generation(Path::new("/nowhere")), 0);
        assert!(cache.is_empty());
    }
}
