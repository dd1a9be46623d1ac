//! Table schemas as supplied by the host schema service.

use std::{cmp::Ordering, collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{
    error::{Error, Result},
    types::{ColumnType, SortOrder, Value},
};

/// Identifier of a table.
pub type TableId = Ulid;

/// Stable identifier of a non-key column inside value fragments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnId(pub u16);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a column belongs to clustered rows or to the partition's static row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Regular,
    Static,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClusteringColumn {
    pub name: String,
    pub ty: ColumnType,
    pub order: SortOrder,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub id: ColumnId,
    pub name: String,
    pub ty: ColumnType,
    pub kind: ColumnKind,
}

/// Clustering layout and value columns of one table.
#[derive(Clone, Debug, PartialEq)]
pub struct TableSchema {
    id: TableId,
    keyspace: String,
    name: String,
    clustering: Vec<ClusteringColumn>,
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn builder(keyspace: impl Into<String>, name: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder {
            id: None,
            keyspace: keyspace.into(),
            name: name.into(),
            clustering: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `keyspace.name`, used in logs and errors.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.keyspace, self.name)
    }

    pub fn clustering(&self) -> &[ClusteringColumn] {
        &self.clustering
    }

    /// Value columns ordered by id.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, id: ColumnId) -> Option<&ColumnDef> {
        self.columns
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|idx| &self.columns[idx])
    }

    pub fn has_static_columns(&self) -> bool {
        self.columns.iter().any(|c| c.kind == ColumnKind::Static)
    }

    /// Compare two full or partial clustering prefixes in clustering order.
    ///
    /// A strict prefix sorts before its extensions.
    pub fn compare_clustering(&self, a: &[Value], b: &[Value]) -> Ordering {
        for ((left, right), column) in a.iter().zip(b).zip(&self.clustering) {
            let ord = column.order.apply(left.compare(right));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.len().cmp(&b.len())
    }

    /// Check clustering values (a full key or a prefix) against the declared
    /// clustering columns.
    pub(crate) fn check_clustering(&self, values: &[Value], allow_prefix: bool) -> Result<()> {
        let arity = self.clustering.len();
        if values.len() > arity || (!allow_prefix && values.len() != arity) {
            return Err(Error::schema_mismatch(format!(
                "table {} has {arity} clustering columns, got {}",
                self.qualified_name(),
                values.len()
            )));
        }
        for (value, column) in values.iter().zip(&self.clustering) {
            value.expect_type(column.ty, &column.name)?;
        }
        Ok(())
    }
}

pub struct TableSchemaBuilder {
    id: Option<TableId>,
    keyspace: String,
    name: String,
    clustering: Vec<ClusteringColumn>,
    columns: Vec<(String, ColumnType, ColumnKind)>,
}

impl TableSchemaBuilder {
    /// Use a host-assigned id instead of a freshly generated one.
    pub fn id(mut self, id: TableId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn clustering(mut self, name: impl Into<String>, ty: ColumnType, order: SortOrder) -> Self {
        self.clustering.push(ClusteringColumn {
            name: name.into(),
            ty,
            order,
        });
        self
    }

    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push((name.into(), ty, ColumnKind::Regular));
        self
    }

    pub fn static_column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push((name.into(), ty, ColumnKind::Static));
        self
    }

    /// Assign column ids in declaration order and validate name uniqueness.
    pub fn build(self) -> Result<TableSchema> {
        let mut seen = std::collections::HashSet::new();
        let names = self
            .clustering
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.columns.iter().map(|(name, _, _)| name.as_str()));
        for name in names {
            if !seen.insert(name) {
                return Err(Error::schema_mismatch(format!(
                    "duplicate column `{name}` in {}.{}",
                    self.keyspace, self.name
                )));
            }
        }
        if self.columns.len() > usize::from(u16::MAX) {
            return Err(Error::schema_mismatch("too many columns"));
        }

        let columns = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(idx, (name, ty, kind))| ColumnDef {
                id: ColumnId(idx as u16),
                name,
                ty,
                kind,
            })
            .collect();

        Ok(TableSchema {
            id: self.id.unwrap_or_else(Ulid::new),
            keyspace: self.keyspace,
            name: self.name,
            clustering: self.clustering,
            columns,
        })
    }
}

/// Host schema service.
pub trait SchemaService: Send + Sync {
    fn table_schema(&self, id: TableId) -> Option<Arc<TableSchema>>;
}

/// A [`SchemaService`] backed by an in-process map, for embedding and tests.
#[derive(Default)]
pub struct SchemaCatalog {
    tables: RwLock<HashMap<TableId, Arc<TableSchema>>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, schema: TableSchema) -> Arc<TableSchema> {
        let schema = Arc::new(schema);
        self.tables.write().insert(schema.id(), schema.clone());
        schema
    }
}

impl SchemaService for SchemaCatalog {
    fn table_schema(&self, id: TableId) -> Option<Arc<TableSchema>> {
        self.tables.read().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_ids_in_declaration_order() {
        let schema = TableSchema::builder("ks", "t")
            .clustering("ck", ColumnType::Int32, SortOrder::Ascending)
            .column("a", ColumnType::Text)
            .static_column("s", ColumnType::Int64)
            .column("b", ColumnType::Blob)
            .build()
            .unwrap();

        let ids: Vec<_> = schema.columns().iter().map(|c| (c.name.as_str(), c.id)).collect();
        assert_eq!(ids, vec![("a", ColumnId(0)), ("s", ColumnId(1)), ("b", ColumnId(2))]);
        assert_eq!(schema.column(ColumnId(1)).unwrap().kind, ColumnKind::Static);
        assert!(schema.has_static_columns());
        assert_eq!(schema.qualified_name(), "ks.t");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = TableSchema::builder("ks", "t")
            .clustering("x", ColumnType::Int32, SortOrder::Ascending)
            .column("x", ColumnType::Text)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));
    }

    #[test]
    fn clustering_comparison_respects_order_and_prefixes() {
        let schema = TableSchema::builder("ks", "t")
            .clustering("a", ColumnType::Int32, SortOrder::Ascending)
            .clustering("b", ColumnType::Text, SortOrder::Descending)
            .build()
            .unwrap();

        let a1x = [Value::Int32(1), Value::Text("x".into())];
        let a1y = [Value::Int32(1), Value::Text("y".into())];
        let a2 = [Value::Int32(2)];
        assert_eq!(schema.compare_clustering(&a1y, &a1x), Ordering::Less);
        assert_eq!(schema.compare_clustering(&a1x, &a2), Ordering::Less);
        assert_eq!(schema.compare_clustering(&a2[..], &[Value::Int32(2), Value::Text("a".into())]), Ordering::Less);
    }

    #[test]
    fn check_clustering_validates_arity_and_types() {
        let schema = TableSchema::builder("ks", "t")
            .clustering("a", ColumnType::Int32, SortOrder::Ascending)
            .clustering("b", ColumnType::Text, SortOrder::Ascending)
            .build()
            .unwrap();

        assert!(schema.check_clustering(&[Value::Int32(1)], true).is_ok());
        assert!(schema.check_clustering(&[Value::Int32(1)], false).is_err());
        assert!(schema
            .check_clustering(&[Value::Int32(1), Value::Int32(2)], false)
            .is_err());
    }

    #[test]
    fn catalog_resolves_registered_tables() {
        let catalog = SchemaCatalog::new();
        let schema = catalog.register(
            TableSchema::builder("ks", "t")
                .column("v", ColumnType::Text)
                .build()
                .unwrap(),
        );
        assert_eq!(catalog.table_schema(schema.id()), Some(schema));
        assert!(catalog.table_schema(Ulid::new()).is_none());
    }
}
