use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Value, json};

use slate_engine::schema::{
    ColumnDecl, KeyColumnDecl, RowData, SchemaFragment, SchemaResolver, TableSchema,
};
use slate_engine::storage::{StoreKind, Table};
use slate_engine::sync::{DocumentSync, PatchOp, SyncOptions};
use slate_engine::{Conversion, EngineError};

fn _task_schema() -> Arc<TableSchema> {
    let fragment = SchemaFragment::new("Tasks")
        .with_key(
            "id",
            KeyColumnDecl::new().with_local(Conversion::TextToInt, Conversion::IntToText),
        )
        .with_column("name", ColumnDecl::new());
    SchemaResolver::new().resolve(&Arc::new(fragment)).unwrap()
}

fn _note_schema() -> Arc<TableSchema> {
    let fragment = SchemaFragment::new("Notes")
        .with_column("name", ColumnDecl::new())
        .with_column("notes", ColumnDecl::new());
    SchemaResolver::new().resolve(&Arc::new(fragment)).unwrap()
}

fn _row(pairs: &[(&str, Value)]) -> RowData {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn _document_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("tasks.json")
}

fn _write_document(path: &Path, document: &Value) {
    fs::write(path, serde_json::to_string(document).unwrap()).unwrap();
}

fn _read_document(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn _sync(path: &Path) -> DocumentSync {
    DocumentSync::file(path, SyncOptions::default())
}

#[test]
fn load_reads_an_associative_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    _write_document(&path, &json!({"1": {"name": "a"}, "2": {"name": "b"}}));

    let mut table =
        Table::open_mut(&_task_schema(), StoreKind::Associative, _sync(&path)).unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.keys().unwrap(), vec![json!(1), json!(2)]);
    let handle = table.get(1).unwrap();
    assert_eq!(table.value(&handle, "name").unwrap(), json!("a"));
}

#[test]
fn load_missing_document_starts_empty_when_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);

    let table = Table::open_mut(&_task_schema(), StoreKind::Sequential, _sync(&path)).unwrap();

    assert_eq!(table.len(), 0);
}

#[test]
fn load_missing_document_fails_when_not_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    let options = SyncOptions {
        allow_missing: false,
        update_on_change: false,
    };

    let result = Table::open_mut(
        &_task_schema(),
        StoreKind::Sequential,
        DocumentSync::file(&path, options),
    );

    assert!(matches!(result, Err(EngineError::DocumentMissing(_))));
}

#[test]
fn open_gives_a_read_only_view() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    _write_document(&path, &json!([{"name": "a"}]));

    let mut table = Table::open(&_task_schema(), StoreKind::Sequential, _sync(&path)).unwrap();

    assert_eq!(table.len(), 1);
    assert!(matches!(
        table.append(_row(&[("name", json!("b"))])),
        Err(EngineError::StoreIsImmutable)
    ));
}

#[test]
fn append_records_a_tail_add_patch() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    let mut table =
        Table::open_mut(&_task_schema(), StoreKind::Sequential, _sync(&path)).unwrap();

    let handle = table.append(_row(&[("name", json!("a"))])).unwrap();
    table.release(handle);

    assert_eq!(
        table.pending_patches(),
        &[PatchOp::add("/-", json!({"name": "a"}))]
    );
}

#[test]
fn flush_writes_the_patched_document_and_clears_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    let mut table =
        Table::open_mut(&_task_schema(), StoreKind::Sequential, _sync(&path)).unwrap();
    let handle = table.append(_row(&[("name", json!("a"))])).unwrap();
    table.release(handle);

    let applied = table.flush().unwrap();

    assert_eq!(applied, 1);
    assert_eq!(table.pending_patches().len(), 0);
    assert_eq!(_read_document(&path), json!([{"name": "a"}]));
}

#[test]
fn flush_twice_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    let mut table =
        Table::open_mut(&_task_schema(), StoreKind::Sequential, _sync(&path)).unwrap();
    let handle = table.append(_row(&[("name", json!("a"))])).unwrap();
    table.release(handle);
    table.flush().unwrap();

    let applied = table.flush().unwrap();

    assert_eq!(applied, 0);
    assert_eq!(_read_document(&path), json!([{"name": "a"}]));
}

#[test]
fn add_records_a_keyed_add_patch() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    let mut table =
        Table::open_mut(&_task_schema(), StoreKind::Associative, _sync(&path)).unwrap();

    let handle = table.add(7, _row(&[("name", json!("g"))])).unwrap();
    table.release(handle);

    assert_eq!(
        table.pending_patches(),
        &[PatchOp::add("/7", json!({"name": "g"}))]
    );

    table.flush().unwrap();
    assert_eq!(_read_document(&path), json!({"7": {"name": "g"}}));
}

#[test]
fn set_records_a_minimal_replace() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    _write_document(&path, &json!([{"name": "a", "notes": "x"}]));
    let mut table =
        Table::open_mut(&_note_schema(), StoreKind::Sequential, _sync(&path)).unwrap();
    let handle = table.get(0).unwrap();

    table.set(&handle, "name", json!("z")).unwrap();

    assert_eq!(
        table.pending_patches(),
        &[PatchOp::replace("/0/name", json!("z"))]
    );

    table.flush().unwrap();
    assert_eq!(
        _read_document(&path),
        json!([{"name": "z", "notes": "x"}])
    );
}

#[test]
fn associative_delete_flushes_against_unchanged_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    _write_document(&path, &json!({"1": {"name": "a"}, "2": {"name": "b"}}));
    let mut table =
        Table::open_mut(&_task_schema(), StoreKind::Associative, _sync(&path)).unwrap();

    let doomed = table.get(1).unwrap();
    table.delete(doomed).unwrap();

    assert_eq!(table.pending_patches(), &[PatchOp::remove("/1")]);

    let applied = table.flush().unwrap();

    assert_eq!(applied, 1);
    assert_eq!(_read_document(&path), json!({"2": {"name": "b"}}));
}

#[test]
fn sequential_delete_conflicts_when_the_document_changed_underneath() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    _write_document(&path, &json!([{"name": "a"}, {"name": "b"}]));
    let mut table =
        Table::open_mut(&_task_schema(), StoreKind::Sequential, _sync(&path)).unwrap();
    let doomed = table.get(0).unwrap();
    table.delete(doomed).unwrap();

    // The document changes underneath before the flush.
    _write_document(&path, &json!([{"name": "zzz"}, {"name": "b"}]));

    let result = table.flush();

    let (state_file, patch_file) = match result {
        Err(EngineError::SyncConflict {
            state_file,
            patch_file,
            ..
        }) => (state_file, patch_file),
        other => panic!("expected a sync conflict, got {:?}", other),
    };

    // Primary document untouched, log preserved, both side files written.
    assert_eq!(
        _read_document(&path),
        json!([{"name": "zzz"}, {"name": "b"}])
    );
    assert_eq!(table.pending_patches().len(), 2);
    assert!(patch_file.ends_with(".jsonpatch"));
    assert_eq!(_read_document(Path::new(&state_file)), json!([{"name": "b"}]));
    let saved_patches = _read_document(Path::new(&patch_file));
    assert_eq!(
        saved_patches,
        json!([
            {"op": "test", "path": "/0", "value": {"name": "a"}},
            {"op": "remove", "path": "/0"}
        ])
    );

    // Restoring the document makes the retry succeed.
    _write_document(&path, &json!([{"name": "a"}, {"name": "b"}]));
    let applied = table.flush().unwrap();
    assert_eq!(applied, 2);
    assert_eq!(_read_document(&path), json!([{"name": "b"}]));
}

#[test]
fn update_on_change_is_rejected_for_sequential_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    let options = SyncOptions {
        allow_missing: true,
        update_on_change: true,
    };

    let result = Table::open_mut(
        &_task_schema(),
        StoreKind::Sequential,
        DocumentSync::file(&path, options),
    );

    assert!(matches!(result, Err(EngineError::UnsupportedStore(_))));
}

#[test]
fn update_on_change_merges_external_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    _write_document(&path, &json!({"1": {"name": "a"}}));
    let options = SyncOptions {
        allow_missing: true,
        update_on_change: true,
    };
    let mut table = Table::open_mut(
        &_task_schema(),
        StoreKind::Associative,
        DocumentSync::file(&path, options),
    )
    .unwrap();

    // Someone else adds a row to the document.
    _write_document(&path, &json!({"1": {"name": "a"}, "9": {"name": "ext"}}));

    let handle = table.add(2, _row(&[("name", json!("b"))])).unwrap();
    table.release(handle);

    assert_eq!(table.len(), 3);
    assert_eq!(table.keys().unwrap(), vec![json!(1), json!(9), json!(2)]);
}

#[test]
fn reload_rebinds_associative_handles_by_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    _write_document(&path, &json!({"1": {"name": "a"}, "2": {"name": "b"}}));
    let mut table =
        Table::open_mut(&_task_schema(), StoreKind::Associative, _sync(&path)).unwrap();
    let gone = table.get(1).unwrap();
    let kept = table.get(2).unwrap();

    _write_document(&path, &json!({"2": {"name": "b2"}}));
    table.reload().unwrap();

    assert!(matches!(
        table.value(&gone, "name"),
        Err(EngineError::StaleHandle)
    ));
    assert_eq!(table.value(&kept, "name").unwrap(), json!("b2"));
}

#[test]
fn reload_invalidates_all_sequential_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    _write_document(&path, &json!([{"name": "a"}]));
    let mut table =
        Table::open_mut(&_task_schema(), StoreKind::Sequential, _sync(&path)).unwrap();
    let handle = table.get(0).unwrap();

    table.reload().unwrap();

    assert!(matches!(
        table.value(&handle, "name"),
        Err(EngineError::StaleHandle)
    ));
    assert_eq!(table.len(), 1);
}

#[test]
fn reload_keeps_unflushed_mutations() {
    let dir = tempfile::tempdir().unwrap();
    let path = _document_path(&dir);
    _write_document(&path, &json!({"1": {"name": "a"}}));
    let mut table =
        Table::open_mut(&_task_schema(), StoreKind::Associative, _sync(&path)).unwrap();
    let handle = table.add(2, _row(&[("name", json!("b"))])).unwrap();
    table.release(handle);

    table.reload().unwrap();

    assert_eq!(table.len(), 2);
    let handle = table.get(2).unwrap();
    assert_eq!(table.value(&handle, "name").unwrap(), json!("b"));
    // Still pending: the reload applies the log to memory, not to disk.
    assert_eq!(table.pending_patches().len(), 1);
}
