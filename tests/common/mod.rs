//! Common test utilities for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use ringstore::{
    Cell, Clustering, ColumnId, ColumnType, EngineRegistry, Partitioner, Row, SchemaCatalog,
    SortOrder, StoreOptions, TableHandle, TableSchema, Token, TokenRange, Value,
};
use tempfile::TempDir;

pub const KEYSPACE: &str = "ks";

pub const C1: ColumnId = ColumnId(0);
pub const C2: ColumnId = ColumnId(1);
pub const S: ColumnId = ColumnId(2);

/// `(a int, b text)` clustering, value columns `c1`, `c2`, static column `s`.
pub fn scenario_schema(name: &str) -> TableSchema {
    TableSchema::builder(KEYSPACE, name)
        .clustering("a", ColumnType::Int32, SortOrder::Ascending)
        .clustering("b", ColumnType::Text, SortOrder::Ascending)
        .column("c1", ColumnType::Text)
        .column("c2", ColumnType::Text)
        .static_column("s", ColumnType::Text)
        .build()
        .expect("schema builder configuration should succeed")
}

/// Places a key at the token spelled by its first eight big-endian bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct LeadingTokenPartitioner;

impl Partitioner for LeadingTokenPartitioner {
    fn token(&self, key: &[u8]) -> Token {
        let mut raw = [0u8; 8];
        let len = key.len().min(8);
        raw[..len].copy_from_slice(&key[..len]);
        Token::new(i64::from_be_bytes(raw))
    }
}

/// A partition key that lands on `token`.
pub fn key_at(token: i64, suffix: &str) -> Vec<u8> {
    let mut key = token.to_be_bytes().to_vec();
    key.extend_from_slice(suffix.as_bytes());
    key
}

pub fn clustering(a: i32, b: &str) -> Vec<Value> {
    vec![Value::Int32(a), Value::Text(b.to_string())]
}

pub fn cell_row(a: i32, b: &str, column: ColumnId, ts: i64, value: &str) -> Row {
    Row::new(Clustering::Row(clustering(a, b))).with_cell(Cell::live(column, ts, value))
}

/// One store rooted in its own temp dir.
pub struct TestStore {
    pub dir: TempDir,
    pub catalog: Arc<SchemaCatalog>,
    pub registry: EngineRegistry,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self::at(dir)
    }

    /// Reopen a store over an existing directory.
    pub fn at(dir: TempDir) -> Self {
        let catalog = Arc::new(SchemaCatalog::new());
        let registry = EngineRegistry::new(
            StoreOptions::from(dir.path()).keyspace(KEYSPACE),
            catalog.clone(),
        )
        .with_partitioner(Arc::new(LeadingTokenPartitioner));
        TestStore {
            dir,
            catalog,
            registry,
        }
    }

    pub fn open(&self, schema: TableSchema) -> Arc<TableHandle> {
        let schema = self.catalog.register(schema);
        self.registry.get_or_open(schema.id()).unwrap()
    }
}

/// Tokens of every live row in the table, in key order.
pub fn live_tokens(table: &TableHandle) -> Vec<i64> {
    table
        .scan_token_range(&TokenRange::full_ring())
        .map(|item| item.unwrap().0.token.value())
        .collect()
}
