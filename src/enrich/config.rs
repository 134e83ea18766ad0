//! Database location settings for enrichment
//!
//! Directories come from `MAXMIND_MMDB_DIR` and `SPUR_MMDB_DIR`, falling
//! back to the usual GeoIP install locations. Settings can also be read
//! from a JSON file or built up in code.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable naming the MaxMind database directory
pub const MAXMIND_DIR_ENV: &str = "MAXMIND_MMDB_DIR";

/// Environment variable naming the Spur database directory
pub const SPUR_DIR_ENV: &str = "SPUR_MMDB_DIR";

/// Directories searched when no environment variable is set
pub const DEFAULT_DIRS: [&str; 2] = ["/usr/local/share/GeoIP", "/opt/homebrew/var/GeoIP"];

/// Where the enrichment databases live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Directory holding the MaxMind ASN and City files
    pub maxmind_dir: Option<PathBuf>,
    /// Directory holding the Spur file
    pub spur_dir: Option<PathBuf>,
    /// ASN database file name
    pub asn_file: String,
    /// City database file name
    pub city_file: String,
    /// Spur database file name
    pub spur_file: String,
    /// Language used for localized names
    pub language: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            maxmind_dir: None,
            spur_dir: None,
            asn_file: "GeoLite2-ASN.mmdb".to_string(),
            city_file: "GeoLite2-City.mmdb".to_string(),
            spur_file: "spur.mmdb".to_string(),
            language: "en".to_string(),
        }
    }
}

impl EnrichmentConfig {
    /// Default file names and no directories
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve directories from the environment and the default locations
    pub fn from_env() -> Self {
        let defaults: Vec<&Path> = DEFAULT_DIRS.iter().map(Path::new).collect();
        Self {
            maxmind_dir: resolve_dir(std::env::var_os(MAXMIND_DIR_ENV), &defaults),
            spur_dir: resolve_dir(std::env::var_os(SPUR_DIR_ENV), &defaults),
            ..Self::default()
        }
    }

    /// Parse settings from JSON; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid enrichment config: {}", e)))
    }

    /// Read settings from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Set the MaxMind directory
    pub fn with_maxmind_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.maxmind_dir = Some(dir.into());
        self
    }

    /// Set the Spur directory
    pub fn with_spur_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spur_dir = Some(dir.into());
        self
    }

    /// Set the ASN file name
    pub fn with_asn_file(mut self, name: impl Into<String>) -> Self {
        self.asn_file = name.into();
        self
    }

    /// Set the City file name
    pub fn with_city_file(mut self, name: impl Into<String>) -> Self {
        self.city_file = name.into();
        self
    }

    /// Set the Spur file name
    pub fn with_spur_file(mut self, name: impl Into<String>) -> Self {
        self.spur_file = name.into();
        self
    }

    /// Set the language for localized names
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Full path of the ASN database
    pub fn asn_path(&self) -> Result<PathBuf> {
        Ok(require_dir(&self.maxmind_dir, "MaxMind", MAXMIND_DIR_ENV)?.join(&self.asn_file))
    }

    /// Full path of the City database
    pub fn city_path(&self) -> Result<PathBuf> {
        Ok(require_dir(&self.maxmind_dir, "MaxMind", MAXMIND_DIR_ENV)?.join(&self.city_file))
    }

    /// Full path of the Spur database
    pub fn spur_path(&self) -> Result<PathBuf> {
        Ok(require_dir(&self.spur_dir, "Spur", SPUR_DIR_ENV)?.join(&self.spur_file))
    }
}

/// Pick the directory named by an environment value, else the first
/// candidate that exists
pub fn resolve_dir(env_value: Option<OsString>, candidates: &[&Path]) -> Option<PathBuf> {
    match env_value {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => candidates
            .iter()
            .find(|dir| dir.is_dir())
            .map(|dir| dir.to_path_buf()),
    }
}

fn require_dir<'a>(dir: &'a Option<PathBuf>, name: &str, env: &str) -> Result<&'a Path> {
    dir.as_deref().ok_or_else(|| {
        Error::Config(format!(
            "No {} MMDB directory found\nHint: specify a directory containing {} MMDB files with the environment variable {}",
            name, name, env
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EnrichmentConfig::new();
        assert_eq!(config.asn_file, "GeoLite2-ASN.mmdb");
        assert_eq!(config.city_file, "GeoLite2-City.mmdb");
        assert_eq!(config.spur_file, "spur.mmdb");
        assert_eq!(config.language, "en");
    }

    #[test]
    fn test_paths() {
        let config = EnrichmentConfig::new()
            .with_maxmind_dir("/data/maxmind")
            .with_spur_dir("/data/spur")
            .with_city_file("GeoIP2-City.mmdb");
        assert_eq!(
            config.asn_path().unwrap(),
            PathBuf::from("/data/maxmind/GeoLite2-ASN.mmdb")
        );
        assert_eq!(
            config.city_path().unwrap(),
            PathBuf::from("/data/maxmind/GeoIP2-City.mmdb")
        );
        assert_eq!(config.spur_path().unwrap(), PathBuf::from("/data/spur/spur.mmdb"));
    }

    #[test]
    fn test_missing_dir_hint() {
        let err = EnrichmentConfig::new().asn_path().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("MAXMIND_MMDB_DIR"), "{}", text);

        let err = EnrichmentConfig::new().spur_path().unwrap_err();
        assert!(err.to_string().contains("SPUR_MMDB_DIR"));
    }

    #[test]
    fn test_resolve_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let candidates = [missing.as_path(), dir.path()];

        assert_eq!(
            resolve_dir(Some(OsString::from("/from/env")), &candidates),
            Some(PathBuf::from("/from/env"))
        );
        assert_eq!(
            resolve_dir(Some(OsString::new()), &candidates),
            Some(dir.path().to_path_buf())
        );
        assert_eq!(resolve_dir(None, &candidates[..1]), None);
    }

    #[test]
    fn test_from_json() {
        let config = EnrichmentConfig::from_json_str(
            r#"{"maxmind_dir": "/srv/geoip", "language": "de"}"#,
        )
        .unwrap();
        assert_eq!(config.maxmind_dir, Some(PathBuf::from("/srv/geoip")));
        assert_eq!(config.language, "de");
        assert_eq!(config.spur_file, "spur.mmdb");

        assert!(matches!(
            EnrichmentConfig::from_json_str("{not json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enrich.json");
        std::fs::write(&path, r#"{"spur_dir": "/srv/spur"}"#).unwrap();
        let config = EnrichmentConfig::from_json_file(&path).unwrap();
        assert_eq!(config.spur_dir, Some(PathBuf::from("/srv/spur")));

        assert!(EnrichmentConfig::from_json_file(dir.path().join("nope.json")).is_err());
    }
}
