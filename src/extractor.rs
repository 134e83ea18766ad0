//! Extraction of IP-like substrings from free text
//!
//! Matching is purely syntactic: a candidate is whatever the fixed IPv4
//! (and optionally IPv6) pattern matches, scanned left to right with
//! leftmost-first semantics. Matches are not re-validated as addresses, so
//! a browser version string such as `Chrome/120.0.0.0` yields `120.0.0.0`.

use regex::Regex;
use std::sync::LazyLock;

/// IPv4 candidate: four dot-separated 1-3 digit groups constrained to 0-255
pub const IPV4_PATTERN: &str =
    r"((?:(?:\d|[01]?\d\d|2[0-4]\d|25[0-5])\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d\d|\d))";

/// IPv6 candidate: hextets, `::` compression, IPv4-mapped and link-local zone forms
pub const IPV6_PATTERN: &str = r"((?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,4}:[^\s:](?:(?:(?:25[0-5]|(?:2[0-4]|1{0,1}[0-9]){0,1}[0-9]).){3,3}(?:25[0-5]|(?:2[0-4]|1{0,1}[0-9]){0,1}[0-9])))|(?:::(?:ffff(?::0{1,4}){0,1}:){0,1}[^\s:](?:(?:(?:25[0-5]|(?:2[0-4]|1{0,1}[0-9]){0,1}[0-9]).){3,3}(?:25[0-5]|(?:2[0-4]|1{0,1}[0-9]){0,1}[0-9])))|(?:fe80:(?::(?:(?:[0-9a-fA-F]){1,4})){0,4}%[0-9a-zA-Z]{1,})|(?::(?:(?::(?:(?:[0-9a-fA-F]){1,4})){1,7}|:))|(?:(?:(?:[0-9a-fA-F]){1,4}):(?:(?::(?:(?:[0-9a-fA-F]){1,4})){1,6}))|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,2}(?::(?:(?:[0-9a-fA-F]){1,4})){1,5})|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,3}(?::(?:(?:[0-9a-fA-F]){1,4})){1,4})|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,4}(?::(?:(?:[0-9a-fA-F]){1,4})){1,3})|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,5}(?::(?:(?:[0-9a-fA-F]){1,4})){1,2})|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,6}:(?:(?:[0-9a-fA-F]){1,4}))|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){1,7}:)|(?:(?:(?:(?:[0-9a-fA-F]){1,4}):){7,7}(?:(?:[0-9a-fA-F]){1,4})))";

// Both patterns are compile-time constants covered by tests; a failure here
// is a programming error, not an input error.
static IPV4_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IPV4_PATTERN).expect("IPv4 extraction pattern compiles"));

static ANY_IP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("{}|{}", IPV4_PATTERN, IPV6_PATTERN))
        .expect("IPv4|IPv6 extraction pattern compiles")
});

/// Scanner for IP-like substrings
///
/// Holds no per-text state; the same extractor can scan any number of texts
/// from any number of threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpExtractor {
    include_v6: bool,
}

impl IpExtractor {
    /// Extractor for IPv4 candidates only
    pub fn ipv4() -> Self {
        Self { include_v6: false }
    }

    /// Extractor for IPv4 and IPv6 candidates, IPv4 tried first at each position
    pub fn any() -> Self {
        Self { include_v6: true }
    }

    /// Extractor selected by flag
    pub fn new(include_v6: bool) -> Self {
        Self { include_v6 }
    }

    /// Whether IPv6 candidates are included
    pub fn includes_v6(&self) -> bool {
        self.include_v6
    }

    fn regex(&self) -> &'static Regex {
        if self.include_v6 {
            &ANY_IP_RE
        } else {
            &IPV4_RE
        }
    }

    /// Iterate over non-overlapping candidates in `text`, left to right
    pub fn find_iter<'t>(&self, text: &'t str) -> impl Iterator<Item = &'t str> + 't {
        self.regex().find_iter(text).map(|m| m.as_str())
    }

    /// Collect all candidates in `text`
    pub fn extract_all(&self, text: &str) -> Vec<String> {
        self.find_iter(text).map(str::to_string).collect()
    }
}

/// Collect all IP-like candidates in `text`
pub fn extract_all(text: &str, include_v6: bool) -> Vec<String> {
    IpExtractor::new(include_v6).extract_all(text)
}
