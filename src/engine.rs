//! Thin wrapper over one embedded RocksDB instance per table.

use std::path::{Path, PathBuf};

use log::Level;
use rocksdb::{
    BlockBasedOptions, DBCompressionType, DBIteratorWithThreadMode, ErrorKind,
    IngestExternalFileOptions, IteratorMode, MergeOperands, Options, ReadOptions, SstFileWriter,
    WriteBatch, DB,
};

use crate::{
    codec::fragment,
    error::{Error, Result},
    logging::store_log,
    option::StoreOptions,
};

/// Name the merge operator is registered under; stored in the engine's
/// OPTIONS file, so it must never change.
pub const MERGE_OPERATOR_NAME: &str = "ringstore.fragment";

/// Metadata of one live SST file.
#[derive(Clone, Debug)]
pub(crate) struct LiveFileMeta {
    pub(crate) name: String,
    pub(crate) start_key: Vec<u8>,
    pub(crate) end_key: Vec<u8>,
}

pub(crate) struct TableEngine {
    db: DB,
    options: Options,
    path: PathBuf,
}

fn merge_fragments(key: &[u8], existing: Option<&[u8]>, operands: &MergeOperands) -> Option<Vec<u8>> {
    match fragment::merge_all(existing, operands.iter()) {
        Ok(merged) => Some(merged),
        Err(err) => {
            // Returning nothing makes the engine fail the read with Corruption.
            store_log!(
                Level::Error,
                "merge_failed",
                "key_len={} operands={} error={}",
                key.len(),
                operands.len(),
                err
            );
            None
        }
    }
}

pub(crate) fn engine_options(options: &StoreOptions) -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.set_allow_concurrent_memtable_write(true);
    opts.set_enable_write_thread_adaptive_yield(true);
    opts.set_write_buffer_size(options.write_buffer_size);
    opts.set_max_background_jobs(options.max_background_jobs);
    opts.set_max_subcompactions(options.max_subcompactions);
    opts.set_bytes_per_sync(options.bytes_per_sync);
    opts.set_compression_type(if options.compression {
        DBCompressionType::Lz4
    } else {
        DBCompressionType::None
    });

    let mut table = BlockBasedOptions::default();
    table.set_bloom_filter(options.bloom_bits_per_key, false);
    opts.set_block_based_table_factory(&table);

    opts.set_merge_operator_associative(MERGE_OPERATOR_NAME, merge_fragments);
    opts
}

/// Map engine errors, keeping merge failures distinguishable as corruption.
pub(crate) fn map_engine_error(err: rocksdb::Error) -> Error {
    if err.kind() == ErrorKind::Corruption {
        Error::corrupt(err.into_string())
    } else {
        Error::Engine(err)
    }
}

impl TableEngine {
    pub(crate) fn open(path: impl AsRef<Path>, options: &StoreOptions) -> std::result::Result<Self, rocksdb::Error> {
        let path = path.as_ref().to_path_buf();
        let opts = engine_options(options);
        let db = DB::open(&opts, &path)?;
        Ok(TableEngine {
            db,
            options: opts,
            path,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn merge(&self, key: &[u8], fragment: &[u8]) -> Result<()> {
        self.db.merge(key, fragment).map_err(map_engine_error)
    }

    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get(key).map_err(map_engine_error)
    }

    /// Ordered scan of `[lo, hi)`.
    pub(crate) fn scan(&self, lo: &[u8], hi: &[u8]) -> EntryIter<'_> {
        let mut read = ReadOptions::default();
        read.set_iterate_lower_bound(lo.to_vec());
        read.set_iterate_upper_bound(hi.to_vec());
        EntryIter {
            inner: self.db.iterator_opt(IteratorMode::Start, read),
            done: false,
        }
    }

    /// Whether any key lives in `[lo, hi)`.
    ///
    /// A key whose merge fails to decode still counts: it exists, and range
    /// deletes must be able to drop it.
    pub(crate) fn has_entries(&self, lo: &[u8], hi: &[u8]) -> Result<bool> {
        match self.scan(lo, hi).next() {
            Some(Ok(_)) | Some(Err(Error::CorruptFragment(_))) => Ok(true),
            Some(Err(err)) => Err(err),
            None => Ok(false),
        }
    }

    /// Drop every key in `[lo, hi)` with a single range tombstone.
    pub(crate) fn delete_range(&self, lo: &[u8], hi: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.delete_range(lo, hi);
        self.db.write(batch).map_err(map_engine_error)
    }

    pub(crate) fn flush(&self) -> Result<()> {
        self.db.flush().map_err(map_engine_error)
    }

    pub(crate) fn live_files(&self) -> Result<Vec<LiveFileMeta>> {
        let files = self.db.live_files().map_err(map_engine_error)?;
        Ok(files
            .into_iter()
            .filter_map(|file| match (file.start_key, file.end_key) {
                (Some(start_key), Some(end_key)) => Some(LiveFileMeta {
                    name: file.name,
                    start_key,
                    end_key,
                }),
                _ => None,
            })
            .collect())
    }

    /// Write the live contents of `[lo, hi)` to a standalone SST as merge
    /// operands. Returns `false` and writes nothing when the span is empty.
    pub(crate) fn write_sst(&self, lo: &[u8], hi: &[u8], path: &Path) -> Result<bool> {
        let mut entries = self.scan(lo, hi).peekable();
        if entries.peek().is_none() {
            return Ok(false);
        }
        let mut writer = SstFileWriter::create(&self.options);
        writer.open(path).map_err(map_engine_error)?;
        for entry in entries {
            let (key, value) = entry?;
            writer.merge(&key, &value).map_err(map_engine_error)?;
        }
        writer.finish().map_err(map_engine_error)?;
        Ok(true)
    }

    pub(crate) fn ingest(&self, paths: Vec<PathBuf>) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut opts = IngestExternalFileOptions::default();
        opts.set_move_files(false);
        self.db
            .ingest_external_file_opts(&opts, paths)
            .map_err(map_engine_error)
    }
}

/// Forward iterator over raw engine entries; stops after the first error.
pub(crate) struct EntryIter<'a> {
    inner: DBIteratorWithThreadMode<'a, DB>,
    done: bool,
}

impl Iterator for EntryIter<'_> {
    type Item = Result<(Box<[u8]>, Box<[u8]>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next()? {
            Ok(entry) => Some(Ok(entry)),
            Err(err) => {
                self.done = true;
                Some(Err(map_engine_error(err)))
            }
        }
    }
}
