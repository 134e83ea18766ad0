//! IPv4 <-> 32-bit integer conversion

use crate::addr::IpAddress;
use std::net::Ipv4Addr;

/// Big-endian numeric value of an IPv4 address
///
/// `None` unless `text` parses as IPv4; IPv6 text is never converted.
pub fn ipv4_to_numeric(text: &str) -> Option<u32> {
    IpAddress::parse_v4(text).ok().and_then(|addr| addr.as_u32())
}

/// Dotted-decimal rendering of a numeric IPv4 value
///
/// The input is first range-checked into `[0, 2^32 - 1]`; anything outside
/// that domain, including non-numeric text, yields `None`.
pub fn numeric_to_ipv4<T: Ipv4Numeric>(value: T) -> Option<String> {
    value
        .to_u32_domain()
        .map(|n| Ipv4Addr::from(n).to_string())
}

/// Values that can be range-checked into the unsigned 32-bit domain
pub trait Ipv4Numeric {
    /// The value as `u32`, or `None` when out of range or not numeric
    fn to_u32_domain(&self) -> Option<u32>;
}

macro_rules! impl_int_numeric {
    ($($t:ty),*) => {
        $(
            impl Ipv4Numeric for $t {
                fn to_u32_domain(&self) -> Option<u32> {
                    u32::try_from(*self).ok()
                }
            }
        )*
    };
}

impl_int_numeric!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl Ipv4Numeric for f64 {
    fn to_u32_domain(&self) -> Option<u32> {
        if !self.is_finite() {
            return None;
        }
        let truncated = self.trunc();
        if truncated < 0.0 || truncated > u32::MAX as f64 {
            return None;
        }
        Some(truncated as u32)
    }
}

impl Ipv4Numeric for f32 {
    fn to_u32_domain(&self) -> Option<u32> {
        (*self as f64).to_u32_domain()
    }
}

impl Ipv4Numeric for str {
    fn to_u32_domain(&self) -> Option<u32> {
        self.trim().parse::<i128>().ok()?.to_u32_domain()
    }
}

impl<T: Ipv4Numeric + ?Sized> Ipv4Numeric for &T {
    fn to_u32_domain(&self) -> Option<u32> {
        (**self).to_u32_domain()
    }
}

impl Ipv4Numeric for String {
    fn to_u32_domain(&self) -> Option<u32> {
        self.as_str().to_u32_domain()
    }
}

impl<T: Ipv4Numeric> Ipv4Numeric for Option<T> {
    fn to_u32_domain(&self) -> Option<u32> {
        self.as_ref().and_then(|v| v.to_u32_domain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_to_numeric() {
        assert_eq!(ipv4_to_numeric("8.8.8.8"), Some(134744072));
        assert_eq!(ipv4_to_numeric("192.168.30.30"), Some(3232243230));
        assert_eq!(ipv4_to_numeric("999.9.9.9"), None);
        assert_eq!(ipv4_to_numeric("2606:4700::1111"), None);
    }

    #[test]
    fn test_numeric_to_ipv4() {
        assert_eq!(numeric_to_ipv4(134744072u32).as_deref(), Some("8.8.8.8"));
        assert_eq!(
            numeric_to_ipv4(4294967295u64).as_deref(),
            Some("255.255.255.255")
        );
        assert_eq!(numeric_to_ipv4(4294967296u64), None);
        assert_eq!(numeric_to_ipv4(-1i64), None);
        assert_eq!(numeric_to_ipv4(0u32).as_deref(), Some("0.0.0.0"));
    }

    #[test]
    fn test_numeric_to_ipv4_text_and_floats() {
        assert_eq!(numeric_to_ipv4("abcde"), None);
        assert_eq!(numeric_to_ipv4("134744072").as_deref(), Some("8.8.8.8"));
        assert_eq!(numeric_to_ipv4(134744072.9f64).as_deref(), Some("8.8.8.8"));
        assert_eq!(numeric_to_ipv4(f64::NAN), None);
        assert_eq!(numeric_to_ipv4(4294967296.0f64), None);
    }

    #[test]
    fn test_null_propagates() {
        assert_eq!(numeric_to_ipv4(None::<u32>), None);
        assert_eq!(numeric_to_ipv4(Some(1u32)).as_deref(), Some("0.0.0.1"));
    }
}
