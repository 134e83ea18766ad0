//! RFC 1918 private range classification
//!
//! Only IPv4 addresses are ever private here. IPv6 addresses, including the
//! unique-local `fc00::/7` block, always classify as not private.

use crate::addr::IpAddress;

/// RFC 1918 ranges as (network, prefix length)
pub const RFC1918_RANGES: [(u32, u8); 3] = [
    (0x0A00_0000, 8),  // 10.0.0.0/8
    (0xAC10_0000, 12), // 172.16.0.0/12
    (0xC0A8_0000, 16), // 192.168.0.0/16
];

/// True iff the address is IPv4 and inside one of the RFC 1918 ranges
pub fn is_private_addr(addr: &IpAddress) -> bool {
    match addr.as_u32() {
        Some(value) => RFC1918_RANGES
            .iter()
            .any(|&(network, prefix_len)| value & mask(prefix_len) == network),
        None => false,
    }
}

/// True iff `text` parses as an RFC 1918 IPv4 address
///
/// Unparseable text and every IPv6 address yield `false`.
pub fn is_private(text: &str) -> bool {
    IpAddress::parse(text)
        .map(|addr| is_private_addr(&addr))
        .unwrap_or(false)
}

fn mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len)
    }
}
