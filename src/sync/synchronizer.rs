use std::path::PathBuf;

use chrono::Utc;
use log::{debug, error};
use serde_json::Value;

use crate::errors::EngineError;
use crate::storage::RowStore;

use super::document::{DocumentIo, FileDocument};
use super::patch::{PatchError, PatchOp, apply_all, diff};

/// The remote store kind this synchronizer speaks.
pub const JSON_KIND: &str = "json";

/// How a synchronizer behaves around the document.
///
/// `allow_missing` makes an absent document load as an empty table instead
/// of failing. `update_on_change` re-runs the reload after every recorded
/// mutation; it is only accepted for associative tables, since sequential
/// positions are not stable across a reload.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub allow_missing: bool,
    pub update_on_change: bool,
}

impl Default for SyncOptions {
    fn default() -> SyncOptions {
        SyncOptions {
            allow_missing: true,
            update_on_change: false,
        }
    }
}

/// Keeps one table and one external JSON document in step.
///
/// Every mutation routed through the table appends the minimal patch
/// operations describing it, path-qualified by the row's document key. The
/// log is append-only between flushes and cleared only after a verified
/// successful write, so a failed flush loses nothing.
pub struct DocumentSync {
    io: Box<dyn DocumentIo>,
    options: SyncOptions,
    patches: Vec<PatchOp>,
}

impl DocumentSync {
    pub fn new(io: Box<dyn DocumentIo>, options: SyncOptions) -> DocumentSync {
        DocumentSync {
            io,
            options,
            patches: Vec::new(),
        }
    }

    pub fn file(path: impl Into<PathBuf>, options: SyncOptions) -> DocumentSync {
        //! Convenience constructor for the common file-backed case.

        DocumentSync::new(Box::new(FileDocument::new(path)), options)
    }

    pub fn kind(&self) -> &'static str {
        JSON_KIND
    }

    pub fn allow_missing(&self) -> bool {
        self.options.allow_missing
    }

    pub fn update_on_change(&self) -> bool {
        self.options.update_on_change
    }

    pub fn location(&self) -> String {
        self.io.location()
    }

    /// The operations recorded since the last successful flush.
    pub fn patches(&self) -> &[PatchOp] {
        &self.patches
    }

    pub(crate) fn read_document(&self) -> Result<Option<Value>, EngineError> {
        self.io.read()
    }

    pub(crate) fn record_append(&mut self, record: Value) {
        self.patches.push(PatchOp::add("/-", record));
    }

    pub(crate) fn record_add(&mut self, token: &str, record: Value) {
        self.patches.push(PatchOp::add(format!("/{}", token), record));
    }

    pub(crate) fn record_update(&mut self, token: &str, before: &Value, after: &Value) {
        let prefix = format!("/{}", token);
        for op in diff(before, after) {
            self.patches.push(op.prefixed(&prefix));
        }
    }

    pub(crate) fn record_remove_sequential(&mut self, token: &str, expected: Value) {
        // The test pins what is about to be removed, so a document that
        // changed underneath fails the flush instead of losing the wrong row.
        self.patches.push(PatchOp::test(format!("/{}", token), expected));
        self.patches.push(PatchOp::remove(format!("/{}", token)));
    }

    pub(crate) fn record_remove_associative(&mut self, token: &str) {
        self.patches.push(PatchOp::remove(format!("/{}", token)));
    }

    pub(crate) fn reconciled_document(
        &self,
        store: &RowStore,
    ) -> Result<Option<Value>, EngineError> {
        //! The freshly-read document with the pending log replayed onto it:
        //! external edits and unflushed local mutations combined. `None` if
        //! the document does not exist yet.

        let document = match self.io.read()? {
            Some(document) => document,
            None => return Ok(None),
        };
        match apply_all(document, &self.patches) {
            Ok(patched) => Ok(Some(patched)),
            Err(err) => Err(self.conflict(store, err)),
        }
    }

    pub(crate) fn flush(&mut self, store: &RowStore) -> Result<usize, EngineError> {
        //! Read-verify-write. Re-reads the document, replays the log onto it
        //! and only then overwrites the document with the result. On success
        //! the log is cleared and the number of applied operations returned;
        //! an empty log is a no-op. On a precondition failure nothing is
        //! written to the document, the log is kept for retry, and the
        //! current state plus the unapplied log go to timestamped side files.

        if self.patches.is_empty() {
            return Ok(0);
        }
        let base = match self.io.read()? {
            Some(document) => document,
            None => store.empty_document(),
        };
        let patched = match apply_all(base, &self.patches) {
            Ok(patched) => patched,
            Err(err) => return Err(self.conflict(store, err)),
        };
        self.io.write(&patched)?;
        let applied = self.patches.len();
        self.patches.clear();
        debug!(
            "applied {} patch operations to {}",
            applied,
            self.io.location()
        );
        Ok(applied)
    }

    fn conflict(&self, store: &RowStore, err: PatchError) -> EngineError {
        //! Build the failure artifacts: the table's full current state and
        //! the unapplied patch log, under unique timestamped names next to
        //! the document. The primary document and the in-memory log are both
        //! left untouched for retry or manual reconciliation.

        let stamp = Utc::now().timestamp();
        let state = match store.to_document(self.kind()) {
            Ok(state) => state,
            Err(_) => Value::Null,
        };
        let state_file = match self.io.write_aside(&stamp.to_string(), &state) {
            Ok(path) => path,
            Err(write_err) => format!("<not written: {}>", write_err),
        };
        let log_value = match serde_json::to_value(&self.patches) {
            Ok(value) => value,
            Err(_) => Value::Null,
        };
        let patch_file = match self.io.write_aside(&format!("{}.jsonpatch", stamp), &log_value) {
            Ok(path) => path,
            Err(write_err) => format!("<not written: {}>", write_err),
        };
        error!(
            "failed to apply patches to {}; current state in {}, patches in {}",
            self.io.location(),
            state_file,
            patch_file
        );
        EngineError::SyncConflict {
            document: self.io.location(),
            reason: err.to_string(),
            state_file,
            patch_file,
        }
    }
}
