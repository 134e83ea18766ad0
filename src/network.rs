//! CIDR network sets and membership tests
//!
//! A [`NetworkSet`] is built once from a collection of CIDR literals and is
//! immutable afterwards. Construction is all-or-nothing: one malformed
//! literal fails the whole set. Membership is "any network contains the
//! address", answered by walking a per-family binary prefix trie in
//! O(prefix length) regardless of how many networks the set holds.

use crate::addr::{Family, IpAddress};
use rustc_hash::FxHashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Error for a network literal that is not a valid CIDR range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrParseError {
    literal: String,
}

impl CidrParseError {
    fn new(literal: &str) -> Self {
        Self {
            literal: literal.to_string(),
        }
    }

    /// The offending literal
    pub fn literal(&self) -> &str {
        &self.literal
    }
}

impl fmt::Display for CidrParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid CIDR range: {}", self.literal)
    }
}

impl std::error::Error for CidrParseError {}

/// A validated CIDR network
///
/// Host bits below the prefix are cleared on parse, so `10.1.2.3/8` and
/// `10.0.0.0/8` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CidrNetwork {
    family_v6: bool,
    network: u128,
    prefix_len: u8,
}

impl CidrNetwork {
    /// Parse `address/prefix_len`
    ///
    /// The prefix must be plain decimal digits and no larger than 32 for
    /// IPv4 or 128 for IPv6. A bare address without a prefix is rejected.
    pub fn parse(literal: &str) -> Result<Self, CidrParseError> {
        let (addr_part, prefix_part) = literal
            .split_once('/')
            .ok_or_else(|| CidrParseError::new(literal))?;

        if prefix_part.is_empty()
            || prefix_part.len() > 3
            || !prefix_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(CidrParseError::new(literal));
        }
        let prefix_len: u8 = prefix_part
            .parse()
            .map_err(|_| CidrParseError::new(literal))?;

        let addr = IpAddr::from_str(addr_part).map_err(|_| CidrParseError::new(literal))?;
        let (family_v6, bits, width) = match addr {
            IpAddr::V4(v4) => (false, (u32::from(v4) as u128) << 96, 32),
            IpAddr::V6(v6) => (true, u128::from(v6), 128),
        };
        if prefix_len > width {
            return Err(CidrParseError::new(literal));
        }

        Ok(Self {
            family_v6,
            network: bits & prefix_mask(prefix_len),
            prefix_len,
        })
    }

    /// Address family of the network
    pub fn family(&self) -> Family {
        if self.family_v6 {
            Family::V6
        } else {
            Family::V4
        }
    }

    /// Prefix length in bits
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Network bits, left-aligned in a `u128`
    pub fn network_bits(&self) -> u128 {
        self.network
    }

    /// True if `addr` falls inside this network
    pub fn contains(&self, addr: &IpAddress) -> bool {
        addr.family() == self.family()
            && addr.left_aligned_bits() & prefix_mask(self.prefix_len) == self.network
    }
}

impl FromStr for CidrNetwork {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CidrNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.family_v6 {
            write!(f, "{}/{}", Ipv6Addr::from(self.network), self.prefix_len)
        } else {
            write!(
                f,
                "{}/{}",
                Ipv4Addr::from((self.network >> 96) as u32),
                self.prefix_len
            )
        }
    }
}

/// Mask with the top `prefix_len` bits set
fn prefix_mask(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - prefix_len as u32)
    }
}

const NO_CHILD: u32 = 0;

/// Trie node; children index into the arena, 0 means absent (root is never a child)
#[derive(Debug, Clone, Copy, Default)]
struct TrieNode {
    children: [u32; 2],
    terminal: bool,
}

/// Binary prefix trie for one address family
#[derive(Debug, Clone)]
struct PrefixTrie {
    nodes: Vec<TrieNode>,
    width: u8,
}

impl PrefixTrie {
    fn new(family: Family) -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            width: family.bit_width(),
        }
    }

    fn insert(&mut self, bits: u128, prefix_len: u8) {
        let mut node_id = 0usize;

        for depth in 0..prefix_len {
            // A shorter network already covers everything below this node
            if self.nodes[node_id].terminal {
                return;
            }
            let bit = ((bits >> (127 - depth as u32)) & 1) as usize;
            let child = self.nodes[node_id].children[bit];
            node_id = if child == NO_CHILD {
                let new_id = self.nodes.len() as u32;
                self.nodes.push(TrieNode::default());
                self.nodes[node_id].children[bit] = new_id;
                new_id as usize
            } else {
                child as usize
            };
        }

        let node = &mut self.nodes[node_id];
        node.terminal = true;
        // Longer networks under this one can never change the answer
        node.children = [NO_CHILD; 2];
    }

    fn contains(&self, bits: u128) -> bool {
        let mut node = &self.nodes[0];

        for depth in 0..self.width {
            if node.terminal {
                return true;
            }
            let bit = ((bits >> (127 - depth as u32)) & 1) as usize;
            match node.children[bit] {
                NO_CHILD => return false,
                child => node = &self.nodes[child as usize],
            }
        }

        node.terminal
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Immutable, deduplicated set of CIDR networks with per-family tries
#[derive(Debug, Clone)]
pub struct NetworkSet {
    networks: Vec<CidrNetwork>,
    v4: PrefixTrie,
    v6: PrefixTrie,
}

impl NetworkSet {
    /// Build from nullable network literals
    ///
    /// `None` entries and duplicates are dropped; input order is irrelevant.
    /// The first literal that fails to parse aborts the build.
    pub fn from_literals<I, S>(literals: I) -> Result<Self, CidrParseError>
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let mut seen = FxHashSet::default();
        for literal in literals.into_iter().flatten() {
            seen.insert(CidrNetwork::parse(literal.as_ref())?);
        }
        Ok(Self::from_networks(seen))
    }

    /// Build from non-null network literals
    pub fn parse_all<I, S>(literals: I) -> Result<Self, CidrParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_literals(literals.into_iter().map(Some))
    }

    /// Build from already validated networks
    pub fn from_networks<I>(networks: I) -> Self
    where
        I: IntoIterator<Item = CidrNetwork>,
    {
        let mut networks: Vec<CidrNetwork> = networks.into_iter().collect();
        networks.sort_unstable();
        networks.dedup();

        let mut v4 = PrefixTrie::new(Family::V4);
        let mut v6 = PrefixTrie::new(Family::V6);
        for net in &networks {
            match net.family() {
                Family::V4 => v4.insert(net.network_bits(), net.prefix_len()),
                Family::V6 => v6.insert(net.network_bits(), net.prefix_len()),
            }
        }

        log::debug!(
            "built network set: {} networks, {} v4 trie nodes, {} v6 trie nodes",
            networks.len(),
            v4.node_count(),
            v6.node_count()
        );

        Self { networks, v4, v6 }
    }

    /// Canonical (sorted, deduplicated) networks in the set
    pub fn networks(&self) -> &[CidrNetwork] {
        &self.networks
    }

    /// Number of distinct networks
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// True if the set holds no networks
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// True if any network of the address's family contains it
    pub fn contains(&self, addr: &IpAddress) -> bool {
        let bits = addr.left_aligned_bits();
        match addr.family() {
            Family::V4 => self.v4.contains(bits),
            Family::V6 => self.v6.contains(bits),
        }
    }

    /// Membership for address text: `None` if the text is not an address
    pub fn is_in(&self, text: &str) -> Option<bool> {
        IpAddress::parse(text).ok().map(|addr| self.contains(&addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> IpAddress {
        IpAddress::parse(text).unwrap()
    }

    #[test]
    fn test_parse_cidr() {
        let net = CidrNetwork::parse("8.8.8.0/24").unwrap();
        assert_eq!(net.family(), Family::V4);
        assert_eq!(net.prefix_len(), 24);
        assert_eq!(net.to_string(), "8.8.8.0/24");

        let net = CidrNetwork::parse("2606:4700::/32").unwrap();
        assert_eq!(net.family(), Family::V6);
        assert_eq!(net.to_string(), "2606:4700::/32");
    }

    #[test]
    fn test_host_bits_cleared() {
        assert_eq!(
            CidrNetwork::parse("10.1.2.3/8").unwrap(),
            CidrNetwork::parse("10.0.0.0/8").unwrap()
        );
    }

    #[test]
    fn test_invalid_cidr() {
        for literal in [
            "8.8.8.0/55",
            "2606:4700::/129",
            "8.8.8.8",
            "8.8.8.0/",
            "8.8.8.0/+8",
            "8.8.8.0/-1",
            "8.8.8.0/0008",
            "999.8.8.0/8",
            "abcd/8",
            "fe80::1%eth0/64",
        ] {
            let err = CidrNetwork::parse(literal).unwrap_err();
            assert!(err.to_string().contains("Invalid CIDR range"), "{}", literal);
            assert_eq!(err.literal(), literal);
        }
    }

    #[test]
    fn test_membership() {
        let set = NetworkSet::parse_all(["8.8.8.0/24", "2606:4700::/32"]).unwrap();
        assert_eq!(set.is_in("8.8.8.8"), Some(true));
        assert_eq!(set.is_in("1.1.1.1"), Some(false));
        assert_eq!(set.is_in("abcd"), None);
        assert_eq!(set.is_in("2606:4700::1111"), Some(true));
        assert_eq!(set.is_in("2606:4701::1"), Some(false));
    }

    #[test]
    fn test_families_do_not_interact() {
        // ::/0 must not match IPv4 and 0.0.0.0/0 must not match IPv6
        let set = NetworkSet::parse_all(["::/0"]).unwrap();
        assert!(!set.contains(&addr("1.2.3.4")));
        assert!(set.contains(&addr("2001:db8::1")));

        let set = NetworkSet::parse_all(["0.0.0.0/0"]).unwrap();
        assert!(set.contains(&addr("1.2.3.4")));
        assert!(!set.contains(&addr("::1")));
    }

    #[test]
    fn test_any_match_with_nested_networks() {
        let set = NetworkSet::parse_all(["10.0.0.0/8", "10.1.0.0/16", "10.1.2.3/32"]).unwrap();
        assert!(set.contains(&addr("10.1.2.3")));
        assert!(set.contains(&addr("10.200.0.1")));
        assert!(!set.contains(&addr("11.0.0.1")));

        // Insert order reversed: specific first, broad later
        let set = NetworkSet::parse_all(["10.1.2.3/32", "10.0.0.0/8"]).unwrap();
        assert!(set.contains(&addr("10.9.9.9")));
    }

    #[test]
    fn test_host_routes() {
        let set = NetworkSet::parse_all(["192.0.2.1/32", "2001:db8::1/128"]).unwrap();
        assert!(set.contains(&addr("192.0.2.1")));
        assert!(!set.contains(&addr("192.0.2.2")));
        assert!(set.contains(&addr("2001:db8::1")));
        assert!(!set.contains(&addr("2001:db8::2")));
    }

    #[test]
    fn test_nulls_and_duplicates_dropped() {
        let set = NetworkSet::from_literals([
            Some("8.8.8.0/24"),
            None,
            Some("8.8.8.0/24"),
            Some("8.8.8.77/24"),
        ])
        .unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_fail_fast() {
        let err = NetworkSet::parse_all(["8.8.8.0/24", "8.8.8.0/55", "junk"]).unwrap_err();
        assert_eq!(err.literal(), "8.8.8.0/55");
    }

    #[test]
    fn test_empty_set() {
        let set = NetworkSet::parse_all(Vec::<&str>::new()).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.is_in("8.8.8.8"), Some(false));
    }
}
