//! Test-only fixtures shared by unit tests.

use std::sync::Arc;

use tempfile::TempDir;

use crate::{
    option::StoreOptions,
    registry::EngineRegistry,
    schema::{SchemaCatalog, TableSchema},
    table::TableHandle,
    token::{Partitioner, Token},
    types::{ColumnType, SortOrder},
};

/// `(a int ASC, b text ASC)` clustering with value columns `c1`, `c2` and the
/// static column `s`, ids 0, 1 and 2.
pub(crate) fn two_column_schema() -> TableSchema {
    TableSchema::builder("ks", "t")
        .clustering("a", ColumnType::Int32, SortOrder::Ascending)
        .clustering("b", ColumnType::Text, SortOrder::Ascending)
        .column("c1", ColumnType::Text)
        .column("c2", ColumnType::Text)
        .static_column("s", ColumnType::Text)
        .build()
        .expect("valid test schema")
}

/// Places a key at the token spelled by its first eight bytes, so tests can
/// choose exactly where on the ring data lands.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LeadingTokenPartitioner;

impl Partitioner for LeadingTokenPartitioner {
    fn token(&self, key: &[u8]) -> Token {
        let mut raw = [0u8; 8];
        let len = key.len().min(8);
        raw[..len].copy_from_slice(&key[..len]);
        Token::new(i64::from_be_bytes(raw))
    }
}

/// Partition key landing on `token` under [`LeadingTokenPartitioner`].
pub(crate) fn key_at(token: i64, suffix: &str) -> Vec<u8> {
    let mut key = token.to_be_bytes().to_vec();
    key.extend_from_slice(suffix.as_bytes());
    key
}

/// A registry under a fresh temp dir with [`two_column_schema`] registered.
pub(crate) fn open_test_table() -> (TempDir, EngineRegistry, Arc<TableHandle>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let catalog = Arc::new(SchemaCatalog::new());
    let schema = catalog.register(two_column_schema());
    let registry = EngineRegistry::new(StoreOptions::from(dir.path()).keyspace("ks"), catalog)
        .with_partitioner(Arc::new(LeadingTokenPartitioner));
    let table = registry.get_or_open(schema.id()).expect("open table");
    (dir, registry, table)
}
