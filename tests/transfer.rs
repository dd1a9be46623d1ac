mod common;

use common::{cell_row, clustering, key_at, live_tokens, scenario_schema, TestStore, C1, C2};
use ringstore::{
    transfer::{export, import, MANIFEST_FILE},
    ColumnFilter, Error, PartitionUpdate, TokenRange, TransferManifest, Value,
};
use tempfile::TempDir;

fn write(table: &ringstore::TableHandle, token: i64, column: ringstore::ColumnId, ts: i64, value: &str) {
    table
        .apply(&PartitionUpdate::new(key_at(token, "k")).row(cell_row(1, "a", column, ts, value)))
        .unwrap();
}

#[test]
fn exported_range_merges_into_destination() {
    let schema = scenario_schema("t");
    let source = TestStore::new();
    let src = source.open(schema.clone());
    let dest = TestStore::new();
    let dst = dest.open(schema);

    write(&src, 10, C1, 5, "from-source");
    write(&src, 50, C1, 5, "x");
    write(&src, 150, C1, 5, "outside");
    write(&dst, 50, C2, 6, "y");

    let staging = TempDir::new().unwrap();
    let range = TokenRange::new(0, 100);
    let manifest = export(&src, &range, staging.path()).unwrap();
    assert!(!manifest.files.is_empty());
    assert!(!manifest.source_files.is_empty());
    assert_eq!(manifest.range, range);
    assert_eq!(TransferManifest::read_from(staging.path()).unwrap(), manifest);
    assert!(staging.path().join(MANIFEST_FILE).exists());

    let imported = import(&dst, &manifest, staging.path()).unwrap();
    assert_eq!(imported, manifest.files.len());
    assert_eq!(live_tokens(&dst), vec![10, 50]);

    let row = dst
        .get_row(key_at(50, "k"), clustering(1, "a"), &ColumnFilter::All)
        .unwrap()
        .unwrap();
    assert_eq!(row.value(C1), Some(&Value::Text("x".into())));
    assert_eq!(row.value(C2), Some(&Value::Text("y".into())));

    assert_eq!(src.metrics().files_exported, manifest.files.len() as u64);
    assert_eq!(dst.metrics().files_imported, manifest.files.len() as u64);
}

#[test]
fn tombstones_travel_with_the_range() {
    let schema = scenario_schema("t");
    let source = TestStore::new();
    let src = source.open(schema.clone());
    let dest = TestStore::new();
    let dst = dest.open(schema);

    write(&dst, 50, C1, 3, "stale");
    src.delete_partition(key_at(50, "k"), 7).unwrap();

    let staging = TempDir::new().unwrap();
    let manifest = export(&src, &TokenRange::new(0, 100), staging.path()).unwrap();
    import(&dst, &manifest, staging.path()).unwrap();

    assert!(live_tokens(&dst).is_empty());
}

#[test]
fn damaged_transfer_is_rejected_without_ingesting() {
    let schema = scenario_schema("t");
    let source = TestStore::new();
    let src = source.open(schema.clone());
    let dest = TestStore::new();
    let dst = dest.open(schema);

    // Two disjoint spans so the export yields more than one file.
    write(&src, -200, C1, 1, "a");
    write(&src, 10, C1, 1, "b");
    let staging = TempDir::new().unwrap();
    let manifest = export(&src, &TokenRange::new(0, -100), staging.path()).unwrap();
    assert_eq!(manifest.files.len(), 2);

    let victim = staging.path().join(&manifest.files[1].name);
    let mut bytes = std::fs::read(&victim).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    std::fs::write(&victim, &bytes).unwrap();

    match import(&dst, &manifest, staging.path()) {
        Err(Error::IncompleteTransfer { file, .. }) => assert_eq!(file, manifest.files[1].name),
        other => panic!("expected incomplete transfer, got {other:?}"),
    }
    assert!(live_tokens(&dst).is_empty());

    std::fs::remove_file(&victim).unwrap();
    let err = import(&dst, &manifest, staging.path()).unwrap_err();
    assert!(err.is_retryable());
    assert!(live_tokens(&dst).is_empty());
    assert_eq!(dst.metrics().files_imported, 0);
}

#[test]
fn empty_range_exports_no_files() {
    let store = TestStore::new();
    let table = store.open(scenario_schema("t"));
    write(&table, 500, C1, 1, "v");

    let staging = TempDir::new().unwrap();
    let manifest = export(&table, &TokenRange::new(0, 100), staging.path()).unwrap();
    assert!(manifest.files.is_empty());
    assert_eq!(import(&table, &manifest, staging.path()).unwrap(), 0);
}

#[test]
fn manifest_for_another_table_is_refused() {
    let source = TestStore::new();
    let src = source.open(scenario_schema("a"));
    let other = source.open(scenario_schema("b"));
    write(&src, 10, C1, 1, "v");

    let staging = TempDir::new().unwrap();
    let manifest = export(&src, &TokenRange::new(0, 100), staging.path()).unwrap();
    assert!(matches!(
        import(&other, &manifest, staging.path()),
        Err(Error::IncompleteTransfer { .. })
    ));
}
