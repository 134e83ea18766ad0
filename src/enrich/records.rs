//! Enrichment output records
//!
//! Every field has a zero or empty default. A record built from a partial
//! or empty map keeps those defaults for whatever is missing, so "address
//! not in the database" and "field absent from the entry" look the same to
//! callers.

use crate::mmdb::DataValue;
use serde::{Deserialize, Serialize};

/// ASN and city-level geolocation for one address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    /// Autonomous system number, 0 if unknown
    pub asnnum: u32,
    /// Autonomous system organization
    pub asnorg: String,
    /// City name
    pub city: String,
    /// Continent code, e.g. `NA`
    pub continent: String,
    /// ISO code of the first subdivision
    pub subdivision_iso: String,
    /// Name of the first subdivision
    pub subdivision: String,
    /// ISO country code
    pub country_iso: String,
    /// Country name
    pub country: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// IANA time zone name
    pub timezone: String,
    /// Postal code
    pub postalcode: String,
}

impl GeoRecord {
    /// Fill the ASN fields from a GeoLite2-ASN style entry
    pub fn apply_asn(&mut self, entry: &DataValue) {
        self.asnnum = entry
            .get("autonomous_system_number")
            .and_then(DataValue::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);
        self.asnorg = text(entry, &["autonomous_system_organization"]);
    }

    /// Fill the location fields from a GeoLite2-City style entry
    ///
    /// Localized names are read for `language`; only the first subdivision
    /// is used.
    pub fn apply_city(&mut self, entry: &DataValue, language: &str) {
        self.city = text(entry, &["city", "names", language]);
        self.continent = text(entry, &["continent", "code"]);
        self.subdivision_iso = text(entry, &["subdivisions", "0", "iso_code"]);
        self.subdivision = text(entry, &["subdivisions", "0", "names", language]);
        self.country_iso = text(entry, &["country", "iso_code"]);
        self.country = text(entry, &["country", "names", language]);
        self.latitude = number(entry, &["location", "latitude"]);
        self.longitude = number(entry, &["location", "longitude"]);
        self.timezone = text(entry, &["location", "time_zone"]);
        self.postalcode = text(entry, &["postal", "code"]);
    }
}

/// Spur IP context for one address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpurRecord {
    /// Estimated number of clients behind the address
    pub client_count: f32,
    /// Infrastructure classification, e.g. `DATACENTER`
    pub infrastructure: String,
    /// City of the observed clients
    pub location_city: String,
    /// Country of the observed clients
    pub location_country: String,
    /// State of the observed clients
    pub location_state: String,
    /// Services seen on the address
    pub services: Vec<String>,
    /// Anonymization service tag
    pub tag: String,
}

impl SpurRecord {
    /// Build from a Spur MMDB entry
    pub fn from_entry(entry: &DataValue) -> Self {
        Self {
            client_count: number(entry, &["clientCount"]) as f32,
            infrastructure: text(entry, &["infrastructure"]),
            location_city: text(entry, &["locationCity"]),
            location_country: text(entry, &["locationCountry"]),
            location_state: text(entry, &["locationState"]),
            services: entry
                .get("services")
                .and_then(DataValue::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            tag: text(entry, &["tag"]),
        }
    }
}

/// Format the ASN label of a found entry: `AS{num} {org}`, or `AS{num}`
/// without an organization
pub fn asn_label(asnnum: u32, asnorg: &str) -> String {
    if asnorg.is_empty() {
        format!("AS{}", asnnum)
    } else {
        format!("AS{} {}", asnnum, asnorg)
    }
}

fn text(entry: &DataValue, path: &[&str]) -> String {
    entry
        .path(path)
        .and_then(DataValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn number(entry: &DataValue, path: &[&str]) -> f64 {
    entry.path(path).and_then(DataValue::as_f64).unwrap_or(0.0)
}
