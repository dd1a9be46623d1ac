//! Owner of every open table.
//!
//! The registry is an explicit, long-lived service object. Each table id maps
//! to a cell that is initialized at most once; the map lock is only held long
//! enough to fetch or insert that cell, so opening one table never blocks
//! operations on another.

use std::{collections::HashMap, sync::Arc};

use log::Level;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::{
    engine::TableEngine,
    error::{Error, Result},
    logging::store_log,
    option::StoreOptions,
    schema::{SchemaService, TableId, TableSchema},
    table::TableHandle,
    token::{Partitioner, Xxh3Partitioner},
};

type Slot = Arc<OnceCell<Arc<TableHandle>>>;

pub struct EngineRegistry {
    options: StoreOptions,
    schemas: Arc<dyn SchemaService>,
    partitioner: Arc<dyn Partitioner>,
    tables: Mutex<HashMap<TableId, Slot>>,
}

impl EngineRegistry {
    pub fn new(options: StoreOptions, schemas: Arc<dyn SchemaService>) -> Self {
        EngineRegistry {
            options,
            schemas,
            partitioner: Arc::new(Xxh3Partitioner),
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the default [`Xxh3Partitioner`] for tables opened afterwards.
    pub fn with_partitioner(self, partitioner: Arc<dyn Partitioner>) -> Self {
        EngineRegistry {
            partitioner,
            ..self
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Whether tables of `keyspace` are stored by this registry.
    pub fn serves(&self, keyspace: &str) -> bool {
        self.options.keyspace == keyspace
    }

    /// Return the handle for `id`, opening its engine on first use.
    ///
    /// Concurrent callers for the same id all observe the single handle the
    /// winner opened. A failed open leaves nothing behind, so a later call
    /// retries it.
    pub fn get_or_open(&self, id: TableId) -> Result<Arc<TableHandle>> {
        let slot = self.tables.lock().entry(id).or_default().clone();
        slot.get_or_try_init(|| self.open(id)).cloned()
    }

    /// The handle for `id` if it is already open.
    pub fn get(&self, id: TableId) -> Option<Arc<TableHandle>> {
        self.tables
            .lock()
            .get(&id)
            .and_then(|slot| slot.get().cloned())
    }

    /// Ids of every open table.
    pub fn open_tables(&self) -> Vec<TableId> {
        self.tables
            .lock()
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    fn open(&self, id: TableId) -> Result<Arc<TableHandle>> {
        let schema = self
            .schemas
            .table_schema(id)
            .ok_or(Error::UnknownTable(id))?;

        let handle = self.open_engine(&schema).map(|engine| {
            Arc::new(TableHandle::new(
                schema.clone(),
                engine,
                self.partitioner.clone(),
            ))
        });
        match &handle {
            Ok(handle) => store_log!(
                Level::Info,
                table: schema.qualified_name(),
                "table_open",
                "id={} path={}",
                id,
                handle.engine().path().display()
            ),
            Err(err) => store_log!(
                Level::Error,
                table: schema.qualified_name(),
                "table_open_failed",
                "id={} error={}",
                id,
                err
            ),
        }
        handle
    }

    fn open_engine(&self, schema: &TableSchema) -> Result<TableEngine> {
        let failure = |source: Box<dyn std::error::Error + Send + Sync>| Error::EngineOpenFailure {
            table: schema.qualified_name(),
            source,
        };

        if !self.serves(schema.keyspace()) {
            return Err(failure(
                format!(
                    "keyspace `{}` is not served by this store (serving `{}`)",
                    schema.keyspace(),
                    self.options.keyspace
                )
                .into(),
            ));
        }

        let dir = self.options.table_dir(schema);
        std::fs::create_dir_all(&dir).map_err(|err| failure(Box::new(err)))?;
        TableEngine::open(&dir, &self.options).map_err(|err| failure(Box::new(err)))
    }
}
