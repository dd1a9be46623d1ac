use std::{hint::black_box, iter::repeat_with};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ringstore::{
    codec::{
        fragment::{encode_row_fragment, merge_all},
        key::{decode_row_key, encode_row_key},
    },
    Cell, Clustering, ColumnId, ColumnType, DecoratedKey, PartitionKey, Row, SortOrder,
    TableSchema, Token, Value,
};

fn schema() -> TableSchema {
    TableSchema::builder("bench", "kv")
        .clustering("a", ColumnType::Int64, SortOrder::Ascending)
        .clustering("b", ColumnType::Text, SortOrder::Descending)
        .column("v", ColumnType::Text)
        .column("w", ColumnType::Int64)
        .build()
        .unwrap()
}

fn random_key() -> (DecoratedKey, Clustering) {
    let pk: Vec<u8> = repeat_with(|| fastrand::u8(..)).take(16).collect();
    let text: String = repeat_with(fastrand::alphanumeric).take(24).collect();
    (
        DecoratedKey {
            token: Token::new(fastrand::i64(..)),
            key: PartitionKey::new(pk),
        },
        Clustering::Row(vec![Value::Int64(fastrand::i64(..)), Value::Text(text)]),
    )
}

fn key_codec(c: &mut Criterion) {
    let schema = schema();
    let keys: Vec<_> = repeat_with(random_key).take(1024).collect();
    let encoded: Vec<Vec<u8>> = keys
        .iter()
        .map(|(pk, clustering)| encode_row_key(pk, clustering, &schema).unwrap())
        .collect();

    let mut group = c.benchmark_group("key");
    group.bench_function("encode", |b| {
        b.iter(|| {
            for (pk, clustering) in &keys {
                black_box(encode_row_key(pk, clustering, &schema).unwrap());
            }
        })
    });
    group.bench_function("decode", |b| {
        b.iter(|| {
            for key in &encoded {
                black_box(decode_row_key(key, &schema).unwrap());
            }
        })
    });
    group.finish();
}

fn fragment_merge(c: &mut Criterion) {
    let schema = schema();
    let clustering = Clustering::Row(vec![Value::Int64(1), Value::Text("a".into())]);

    let mut group = c.benchmark_group("merge");
    for operands in [2usize, 8, 64] {
        let fragments: Vec<Vec<u8>> = (0..operands)
            .map(|i| {
                let value: String = repeat_with(fastrand::alphanumeric).take(64).collect();
                let ts = fastrand::i64(0..1_000);
                let row = Row::new(clustering.clone())
                    .with_liveness(i as i64)
                    .with_cell(Cell::live(ColumnId(0), ts, value))
                    .with_cell(Cell::live(ColumnId(1), ts, i as i64));
                encode_row_fragment(&row, &schema).unwrap()
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(operands), &fragments, |b, frags| {
            b.iter(|| black_box(merge_all(None, frags.iter().map(Vec::as_slice)).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, key_codec, fragment_merge);
criterion_main!(benches);
