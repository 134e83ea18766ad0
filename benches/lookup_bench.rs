use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use iptools::mmdb::{IpVersion, MmdbWriter, RecordSize};
use iptools::{columns, DataValue, IpAddress, MmdbDatabase, NetworkSet};
use std::collections::HashMap;
use std::hint::black_box;
use std::net::Ipv4Addr;

fn generate_addrs(count: usize) -> Vec<Option<String>> {
    (0..count as u32)
        .map(|i| Some(Ipv4Addr::from(i.wrapping_mul(2_654_435_761)).to_string()))
        .collect()
}

fn generate_networks(count: usize) -> Vec<Option<String>> {
    (0..count as u32)
        .map(|i| {
            let base = i.wrapping_mul(40_503) << 8;
            Some(format!("{}/24", Ipv4Addr::from(base)))
        })
        .collect()
}

fn build_database(networks: usize, record_size: RecordSize) -> MmdbDatabase {
    let mut writer = MmdbWriter::new(IpVersion::V6).with_record_size(record_size);
    for (i, cidr) in generate_networks(networks).into_iter().flatten().enumerate() {
        let mut entry = HashMap::new();
        entry.insert(
            "autonomous_system_number".to_string(),
            DataValue::Uint32(i as u32),
        );
        entry.insert(
            "autonomous_system_organization".to_string(),
            DataValue::String(format!("ORG-{}", i % 50)),
        );
        writer.insert(&cidr, DataValue::Map(entry)).unwrap();
    }
    MmdbDatabase::from_bytes(writer.build().unwrap()).unwrap()
}

fn bench_is_in(c: &mut Criterion) {
    let rows = generate_addrs(10_000);
    let mut group = c.benchmark_group("is_in");
    group.throughput(Throughput::Elements(rows.len() as u64));

    for count in [10, 1_000, 10_000].iter() {
        let networks = generate_networks(*count);
        group.bench_with_input(BenchmarkId::new("column", count), &networks, |b, nets| {
            b.iter(|| black_box(columns::is_in(&rows, nets).unwrap()));
        });

        let set = NetworkSet::from_literals(networks.iter().map(Option::as_ref)).unwrap();
        let parsed: Vec<IpAddress> = rows
            .iter()
            .flatten()
            .filter_map(|r| IpAddress::parse(r).ok())
            .collect();
        group.bench_with_input(BenchmarkId::new("prebuilt", count), &parsed, |b, addrs| {
            b.iter(|| {
                for addr in addrs {
                    black_box(set.contains(addr));
                }
            });
        });
    }

    group.finish();
}

fn bench_mmdb_lookup(c: &mut Criterion) {
    let addrs: Vec<IpAddress> = generate_addrs(1_000)
        .into_iter()
        .flatten()
        .filter_map(|r| IpAddress::parse(&r).ok())
        .collect();
    let mut group = c.benchmark_group("mmdb_lookup");
    group.throughput(Throughput::Elements(addrs.len() as u64));

    for (name, record_size) in [
        ("24", RecordSize::Bits24),
        ("28", RecordSize::Bits28),
        ("32", RecordSize::Bits32),
    ] {
        let db = build_database(5_000, record_size);
        group.bench_with_input(BenchmarkId::new("record_bits", name), &addrs, |b, addrs| {
            b.iter(|| {
                for addr in addrs {
                    black_box(db.lookup(addr).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let rows: Vec<Option<String>> = (0..1_000)
        .map(|i| {
            Some(format!(
                "Oct 18 12:00:{:02} sshd[{}]: Failed password from 203.0.113.{} port 22 via 2001:db8::{:x}",
                i % 60,
                1000 + i,
                i % 256,
                i
            ))
        })
        .collect();

    let mut group = c.benchmark_group("extract_all_ips");
    group.throughput(Throughput::Elements(rows.len() as u64));
    for include_v6 in [false, true] {
        group.bench_with_input(
            BenchmarkId::new("include_v6", include_v6),
            &rows,
            |b, rows| b.iter(|| black_box(columns::extract_all_ips(rows, include_v6))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_is_in, bench_mmdb_lookup, bench_extract);
criterion_main!(benches);
