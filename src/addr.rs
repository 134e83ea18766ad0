//! Address parsing and classification
//!
//! Parses textual IPv4 (dotted quad) and IPv6 (standard, compressed,
//! IPv4-embedded and zone-qualified) addresses into an [`IpAddress`].
//! An `IpAddress` can only be obtained through a successful parse, so every
//! downstream component can assume it holds a well-formed value.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// IPv4, 32 address bits
    V4,
    /// IPv6, 128 address bits
    V6,
}

impl Family {
    /// Number of address bits for this family
    pub fn bit_width(self) -> u8 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Bits {
    V4(u32),
    V6(u128),
}

/// A parsed IP address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpAddress {
    bits: Bits,
}

/// Error returned when text is not a valid IP address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrParseError {
    input: String,
}

impl AddrParseError {
    pub(crate) fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
        }
    }

    /// The text that failed to parse
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for AddrParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid IP address: {}", self.input)
    }
}

impl std::error::Error for AddrParseError {}

impl IpAddress {
    /// Parse an IPv4 or IPv6 address
    pub fn parse(text: &str) -> Result<Self, AddrParseError> {
        if let Ok(v4) = Ipv4Addr::from_str(text) {
            return Ok(Self::from_v4(v4));
        }
        parse_v6(text)
            .map(Self::from_v6)
            .ok_or_else(|| AddrParseError::new(text))
    }

    /// Parse strictly as IPv4
    pub fn parse_v4(text: &str) -> Result<Self, AddrParseError> {
        Ipv4Addr::from_str(text)
            .map(Self::from_v4)
            .map_err(|_| AddrParseError::new(text))
    }

    pub(crate) fn from_v4(addr: Ipv4Addr) -> Self {
        Self {
            bits: Bits::V4(u32::from(addr)),
        }
    }

    pub(crate) fn from_v6(addr: Ipv6Addr) -> Self {
        Self {
            bits: Bits::V6(u128::from(addr)),
        }
    }

    /// Address family
    pub fn family(&self) -> Family {
        match self.bits {
            Bits::V4(_) => Family::V4,
            Bits::V6(_) => Family::V6,
        }
    }

    /// The 32-bit value for IPv4 addresses, `None` for IPv6
    pub fn as_u32(&self) -> Option<u32> {
        match self.bits {
            Bits::V4(v) => Some(v),
            Bits::V6(_) => None,
        }
    }

    /// Address bits left-aligned in a `u128`
    ///
    /// Bit 127 is the first address bit for both families, so walks over
    /// the first `family().bit_width()` bits read the address MSB first.
    pub fn left_aligned_bits(&self) -> u128 {
        match self.bits {
            Bits::V4(v) => (v as u128) << 96,
            Bits::V6(v) => v,
        }
    }

    /// Convert to the standard library representation
    pub fn to_std(&self) -> IpAddr {
        match self.bits {
            Bits::V4(v) => IpAddr::V4(Ipv4Addr::from(v)),
            Bits::V6(v) => IpAddr::V6(Ipv6Addr::from(v)),
        }
    }
}

impl FromStr for IpAddress {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_std().fmt(f)
    }
}

/// Parse IPv6 text, accepting an optional `%zone` suffix
///
/// The zone identifier is validated (non-empty, no whitespace or further
/// `%`) and then discarded; it does not take part in the address value.
fn parse_v6(text: &str) -> Option<Ipv6Addr> {
    let addr_part = match text.split_once('%') {
        Some((addr, zone)) => {
            if zone.is_empty() || zone.contains('%') || zone.chars().any(char::is_whitespace) {
                return None;
            }
            addr
        }
        None => text,
    };
    Ipv6Addr::from_str(addr_part).ok()
}

/// Parse an address, returning `None` on failure
pub fn parse(text: &str) -> Option<IpAddress> {
    IpAddress::parse(text).ok()
}

/// True iff `text` parses as an IPv4 or IPv6 address
pub fn is_valid(text: &str) -> bool {
    IpAddress::parse(text).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        let addr = IpAddress::parse("8.8.8.8").unwrap();
        assert_eq!(addr.family(), Family::V4);
        assert_eq!(addr.as_u32(), Some(134744072));
        assert_eq!(addr.to_string(), "8.8.8.8");
    }

    #[test]
    fn test_parse_ipv6_forms() {
        for text in [
            "2606:4700::1111",
            "::1",
            "::",
            "2001:db8:85a3:8d3:1319:8a2e:370:7348",
            "::ffff:192.0.2.1",
            "fe80::1%eth0",
        ] {
            let addr = IpAddress::parse(text).unwrap();
            assert_eq!(addr.family(), Family::V6, "{}", text);
        }
    }

    #[test]
    fn test_zone_does_not_change_value() {
        let with_zone = IpAddress::parse("fe80::1%en0").unwrap();
        let without = IpAddress::parse("fe80::1").unwrap();
        assert_eq!(with_zone, without);
    }

    #[test]
    fn test_rejects_malformed() {
        for text in [
            "999.9.9.9",
            "abcd",
            "",
            "1.2.3",
            "1.2.3.4.5",
            "fe80::1%",
            "fe80::1%a%b",
            "2606:4700::1111::1",
            " 8.8.8.8",
        ] {
            assert!(!is_valid(text), "{} should be invalid", text);
        }
    }

    #[test]
    fn test_parse_v4_rejects_v6() {
        assert!(IpAddress::parse_v4("2606:4700::1111").is_err());
        assert!(IpAddress::parse_v4("10.0.0.1").is_ok());
    }

    #[test]
    fn test_left_aligned_bits() {
        let v4 = IpAddress::parse("192.168.1.1").unwrap();
        assert_eq!(v4.left_aligned_bits() >> 96, 0xC0A80101);

        let v6 = IpAddress::parse("2001:db8::1").unwrap();
        assert_eq!(v6.left_aligned_bits() >> 112, 0x2001);
    }

    #[test]
    fn test_error_display() {
        let err = IpAddress::parse("abc").unwrap_err();
        assert_eq!(err.to_string(), "Invalid IP address: abc");
        assert_eq!(err.input(), "abc");
    }
}
