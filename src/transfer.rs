//! Bulk transfer of token ranges as engine files.
//!
//! Export cuts the live contents of a range out of the source engine into
//! standalone SST files plus a JSON manifest; import verifies every listed
//! file and only then ingests them. Exported entries are written as merge
//! operands, so ingestion reconciles with whatever the destination already
//! holds for the same keys.

use std::{
    fs::File,
    io::{self, Read},
    ops::Bound,
    path::{Path, PathBuf},
};

use log::Level;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{
    codec::key::token_range_bounds,
    error::{Error, Result},
    logging::store_log,
    range_set::{Span, SpanSet},
    schema::TableId,
    table::TableHandle,
    token::TokenRange,
};

/// Name of the manifest written next to exported files.
pub const MANIFEST_FILE: &str = "transfer.manifest.json";

const CHECKSUM_BUF: usize = 64 * 1024;

/// One exported file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFile {
    /// File name relative to the transfer directory.
    pub name: String,
    pub size: u64,
    pub crc32: u32,
}

/// Everything a destination needs to verify and ingest one export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferManifest {
    pub session: Ulid,
    pub table: TableId,
    pub range: TokenRange,
    /// Source engine files whose key span intersected the range.
    pub source_files: Vec<String>,
    pub files: Vec<TransferFile>,
}

impl TransferManifest {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Write as [`MANIFEST_FILE`] into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Read [`MANIFEST_FILE`] from `dir`.
    ///
    /// A missing or unparsable manifest is reported as
    /// [`Error::IncompleteTransfer`].
    pub fn read_from(dir: &Path) -> Result<Self> {
        let incomplete = |reason: String| Error::IncompleteTransfer {
            file: MANIFEST_FILE.to_string(),
            reason,
        };
        let bytes = std::fs::read(dir.join(MANIFEST_FILE))
            .map_err(|err| incomplete(format!("read failed: {err}")))?;
        serde_json::from_slice(&bytes).map_err(|err| incomplete(format!("parse failed: {err}")))
    }
}

/// Export the rows of `table` whose token falls in `range` into `staging`.
///
/// Memtables are flushed first so the engine's file metadata covers every
/// write acknowledged before the call. One SST is produced per coalesced key
/// span; spans without live entries produce nothing.
pub fn export(table: &TableHandle, range: &TokenRange, staging: &Path) -> Result<TransferManifest> {
    std::fs::create_dir_all(staging)?;
    table.flush()?;

    let wanted = SpanSet::from_spans(
        token_range_bounds(range)
            .into_iter()
            .map(|(lo, hi)| Span::new(Bound::Included(lo), Bound::Excluded(hi)))
            .collect(),
    );

    let mut source_files = Vec::new();
    let mut covered = Vec::new();
    for file in table.engine().live_files()? {
        let span = SpanSet::from_spans(vec![Span::new(
            Bound::Included(file.start_key),
            Bound::Included(file.end_key),
        )]);
        let hit = span.intersect(&wanted);
        if hit.is_empty() {
            continue;
        }
        source_files.push(file.name);
        covered.extend(hit.into_spans());
    }

    let session = Ulid::new();
    let mut files = Vec::new();
    for (idx, span) in SpanSet::from_spans(covered).into_spans().into_iter().enumerate() {
        let Some((lo, hi)) = key_span(span) else {
            continue;
        };
        let name = format!("{session}-{idx:04}.sst");
        let path = staging.join(&name);
        if !table.engine().write_sst(&lo, &hi, &path)? {
            continue;
        }
        let (size, crc32) = checksum_file(&path)?;
        files.push(TransferFile { name, size, crc32 });
    }

    let manifest = TransferManifest {
        session,
        table: table.id(),
        range: *range,
        source_files,
        files,
    };
    manifest.write_to(staging)?;

    table
        .metrics_ref()
        .record_files_exported(manifest.files.len() as u64);
    store_log!(
        Level::Info,
        table: table.schema().qualified_name(),
        "export",
        "session={} range={} files={} bytes={}",
        session,
        range,
        manifest.files.len(),
        manifest.total_size()
    );
    Ok(manifest)
}

/// Verify every file listed in `manifest` under `dir`, then ingest them all.
///
/// Nothing is ingested unless every file is present with the recorded size
/// and checksum. Returns the number of files ingested.
pub fn import(table: &TableHandle, manifest: &TransferManifest, dir: &Path) -> Result<usize> {
    if manifest.table != table.id() {
        return Err(Error::IncompleteTransfer {
            file: MANIFEST_FILE.to_string(),
            reason: format!("manifest is for table {}, not {}", manifest.table, table.id()),
        });
    }

    let mut paths = Vec::with_capacity(manifest.files.len());
    for file in &manifest.files {
        paths.push(verify(file, dir).inspect_err(|err| {
            store_log!(
                Level::Warn,
                table: table.schema().qualified_name(),
                "import_rejected",
                "session={} {}",
                manifest.session,
                err
            );
        })?);
    }

    table.engine().ingest(paths)?;
    table
        .metrics_ref()
        .record_files_imported(manifest.files.len() as u64);
    store_log!(
        Level::Info,
        table: table.schema().qualified_name(),
        "import",
        "session={} range={} files={} bytes={}",
        manifest.session,
        manifest.range,
        manifest.files.len(),
        manifest.total_size()
    );
    Ok(manifest.files.len())
}

fn verify(file: &TransferFile, dir: &Path) -> Result<PathBuf> {
    let incomplete = |reason: String| Error::IncompleteTransfer {
        file: file.name.clone(),
        reason,
    };

    if Path::new(&file.name).file_name().map(|n| n.to_str()) != Some(Some(file.name.as_str())) {
        return Err(incomplete("file name must not contain a path".to_string()));
    }

    let path = dir.join(&file.name);
    let (size, crc32) = checksum_file(&path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => incomplete("file is missing".to_string()),
        _ => incomplete(err.to_string()),
    })?;
    if size != file.size {
        return Err(incomplete(format!(
            "expected {} bytes, found {size}",
            file.size
        )));
    }
    if crc32 != file.crc32 {
        return Err(incomplete(format!(
            "checksum {crc32:#010x} does not match {:#010x}",
            file.crc32
        )));
    }
    Ok(path)
}

// Turn a coalesced span into `[lo, hi)`; `k ++ 0x00` is the least key above `k`.
fn key_span(span: Span<Vec<u8>>) -> Option<(Vec<u8>, Vec<u8>)> {
    let successor = |mut key: Vec<u8>| {
        key.push(0);
        key
    };
    let lo = match span.start {
        Bound::Included(key) => key,
        Bound::Excluded(key) => successor(key),
        Bound::Unbounded => return None,
    };
    let hi = match span.end {
        Bound::Included(key) => successor(key),
        Bound::Excluded(key) => key,
        Bound::Unbounded => return None,
    };
    (lo < hi).then_some((lo, hi))
}

fn checksum_file(path: &Path) -> io::Result<(u64, u32)> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; CHECKSUM_BUF];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hasher.finalize()))
}
