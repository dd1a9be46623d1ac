use std::path::PathBuf;

use crate::schema::TableSchema;

/// Environment variable overriding the storage root.
pub const DIR_ENV: &str = "RINGSTORE_DIR";
/// Environment variable overriding the keyspace served by this store.
pub const KEYSPACE_ENV: &str = "RINGSTORE_KEYSPACE";

pub const DEFAULT_DIR: &str = "/data/ringstore";
pub const DEFAULT_KEYSPACE: &str = "ringstore";

/// Configuration shared by every table engine opened through one registry.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub(crate) root: PathBuf,
    pub(crate) keyspace: String,
    pub(crate) write_buffer_size: usize,
    pub(crate) max_background_jobs: i32,
    pub(crate) max_subcompactions: u32,
    pub(crate) bytes_per_sync: u64,
    pub(crate) bloom_bits_per_key: f64,
    pub(crate) compression: bool,
}

impl<P> From<P> for StoreOptions
where
    P: Into<PathBuf>,
{
    fn from(root: P) -> Self {
        StoreOptions {
            root: root.into(),
            keyspace: DEFAULT_KEYSPACE.to_string(),
            write_buffer_size: 64 * 1024 * 1024,
            max_background_jobs: 4,
            max_subcompactions: 2,
            bytes_per_sync: 1024 * 1024,
            bloom_bits_per_key: 10.0,
            compression: true,
        }
    }
}

impl StoreOptions {
    /// Options rooted at `$RINGSTORE_DIR` serving `$RINGSTORE_KEYSPACE`, falling
    /// back to [`DEFAULT_DIR`] and [`DEFAULT_KEYSPACE`].
    pub fn from_env() -> Self {
        let root = std::env::var(DIR_ENV).unwrap_or_else(|_| DEFAULT_DIR.to_string());
        let keyspace =
            std::env::var(KEYSPACE_ENV).unwrap_or_else(|_| DEFAULT_KEYSPACE.to_string());
        StoreOptions::from(root).keyspace(keyspace)
    }

    pub fn root(self, root: impl Into<PathBuf>) -> Self {
        StoreOptions {
            root: root.into(),
            ..self
        }
    }

    pub fn keyspace(self, keyspace: impl Into<String>) -> Self {
        StoreOptions {
            keyspace: keyspace.into(),
            ..self
        }
    }

    pub fn write_buffer_size(self, write_buffer_size: usize) -> Self {
        StoreOptions {
            write_buffer_size,
            ..self
        }
    }

    pub fn max_background_jobs(self, max_background_jobs: i32) -> Self {
        StoreOptions {
            max_background_jobs,
            ..self
        }
    }

    pub fn max_subcompactions(self, max_subcompactions: u32) -> Self {
        StoreOptions {
            max_subcompactions,
            ..self
        }
    }

    pub fn bytes_per_sync(self, bytes_per_sync: u64) -> Self {
        StoreOptions {
            bytes_per_sync,
            ..self
        }
    }

    pub fn bloom_bits_per_key(self, bloom_bits_per_key: f64) -> Self {
        StoreOptions {
            bloom_bits_per_key,
            ..self
        }
    }

    pub fn compression(self, compression: bool) -> Self {
        StoreOptions {
            compression,
            ..self
        }
    }

    pub fn root_dir(&self) -> &PathBuf {
        &self.root
    }

    pub fn served_keyspace(&self) -> &str {
        &self.keyspace
    }
}

impl StoreOptions {
    /// `<root>/<keyspace>/<table>-<id>`; the id suffix keeps a dropped and
    /// recreated table from reusing stale files.
    pub(crate) fn table_dir(&self, schema: &TableSchema) -> PathBuf {
        self.root
            .join(schema.keyspace())
            .join(format!("{}-{}", schema.name(), schema.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::TableSchema, types::ColumnType};

    #[test]
    fn table_dir_nests_keyspace_and_table() {
        let schema = TableSchema::builder("ks", "events")
            .column("v", ColumnType::Text)
            .build()
            .unwrap();
        let options = StoreOptions::from("/tmp/root");
        let dir = options.table_dir(&schema);

        assert!(dir.starts_with("/tmp/root/ks"));
        assert_eq!(
            dir.file_name().unwrap().to_string_lossy(),
            format!("events-{}", schema.id())
        );
    }

    #[test]
    fn setters_override_defaults() {
        let options = StoreOptions::from("/a")
            .root("/b")
            .keyspace("other")
            .compression(false)
            .write_buffer_size(1024);

        assert_eq!(options.root_dir(), &PathBuf::from("/b"));
        assert_eq!(options.served_keyspace(), "other");
        assert!(!options.compression);
        assert_eq!(options.write_buffer_size, 1024);
    }
}
