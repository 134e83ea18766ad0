//! Nullable column operations
//!
//! Every function maps one input row to one output row, in order. A null
//! input row always produces a null output row. Rows are evaluated in
//! parallel; any structure they share is built before evaluation starts.

use crate::classify;
use crate::codec::{self, Ipv4Numeric};
use crate::error::Result;
use crate::extractor::IpExtractor;
use crate::network::NetworkSet;
use rayon::prelude::*;

fn map_text<S, T, F>(rows: &[Option<S>], f: F) -> Vec<Option<T>>
where
    S: AsRef<str> + Sync,
    T: Send,
    F: Fn(&str) -> Option<T> + Sync,
{
    rows.par_iter()
        .map(|row| row.as_ref().and_then(|text| f(text.as_ref())))
        .collect()
}

/// Whether each row is an IPv4 or IPv6 address
pub fn is_valid<S: AsRef<str> + Sync>(rows: &[Option<S>]) -> Vec<Option<bool>> {
    map_text(rows, |text| Some(crate::addr::is_valid(text)))
}

/// Whether each row is an RFC 1918 IPv4 address
pub fn is_private<S: AsRef<str> + Sync>(rows: &[Option<S>]) -> Vec<Option<bool>> {
    map_text(rows, |text| Some(classify::is_private(text)))
}

/// Numeric value of each IPv4 row; null for anything that is not IPv4
pub fn ipv4_to_numeric<S: AsRef<str> + Sync>(rows: &[Option<S>]) -> Vec<Option<u32>> {
    map_text(rows, codec::ipv4_to_numeric)
}

/// Dotted-decimal text for each numeric row; null when out of range
pub fn numeric_to_ipv4<T: Ipv4Numeric + Sync>(rows: &[Option<T>]) -> Vec<Option<String>> {
    rows.par_iter()
        .map(|row| row.as_ref().and_then(codec::numeric_to_ipv4))
        .collect()
}

/// Every address candidate in each row, in order of appearance
pub fn extract_all_ips<S: AsRef<str> + Sync>(
    rows: &[Option<S>],
    include_v6: bool,
) -> Vec<Option<Vec<String>>> {
    let extractor = IpExtractor::new(include_v6);
    map_text(rows, |text| Some(extractor.extract_all(text)))
}

/// Membership of each row in the set of `networks`
///
/// The network set is validated and built first; one bad literal fails the
/// whole call. Rows that are not addresses map to null.
pub fn is_in<S, N>(rows: &[Option<S>], networks: &[Option<N>]) -> Result<Vec<Option<bool>>>
where
    S: AsRef<str> + Sync,
    N: AsRef<str>,
{
    let set = NetworkSet::from_literals(networks.iter().map(Option::as_ref))?;
    Ok(map_text(rows, |text| set.is_in(text)))
}
