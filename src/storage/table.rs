use std::fmt::Display;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::EngineError;
use crate::schema::{RowData, TableSchema};
use crate::sync::{DocumentSync, PatchOp, token_from_value};
use crate::values::KeyValue;

use super::handles::{HandleRegistry, RowHandle};
use super::store::{Address, RowAddress, RowStore, StoreKind};

/// A table: one row store, the resolved schema it follows, the registry of
/// live handles into it, and optionally a document synchronizer.
///
/// The table is the sole owner of its row data. Handles carry no data, only
/// a ticket back into the registry, so any number of them may coexist over
/// the same row; every access goes through the table. When a synchronizer is
/// attached, every mutation also appends its patch operations, and
/// [`Table::flush`] pushes them to the document.
pub struct Table {
    schema: Arc<TableSchema>,
    store: RowStore,
    handles: HandleRegistry,
    sync: Option<DocumentSync>,
}

impl Table {
    pub fn sequential(schema: &Arc<TableSchema>) -> Table {
        //! A mutable in-memory table addressed by position.

        Table {
            schema: Arc::clone(schema),
            store: RowStore::new(schema, StoreKind::Sequential, true),
            handles: HandleRegistry::new(),
            sync: None,
        }
    }

    pub fn associative(schema: &Arc<TableSchema>) -> Table {
        //! A mutable in-memory table addressed by key.

        Table {
            schema: Arc::clone(schema),
            store: RowStore::new(schema, StoreKind::Associative, true),
            handles: HandleRegistry::new(),
            sync: None,
        }
    }

    pub fn sequential_snapshot(
        schema: &Arc<TableSchema>,
        rows: Vec<RowData>,
    ) -> Result<Table, EngineError> {
        //! A read-only table built from the given rows, in order. Every
        //! mutating operation on it fails with
        //! [`EngineError::StoreIsImmutable`].

        let mut table = Table::sequential(schema);
        for row in rows {
            table.store.append(row)?;
        }
        table.store.freeze();
        Ok(table)
    }

    pub fn associative_snapshot(
        schema: &Arc<TableSchema>,
        entries: Vec<(Value, RowData)>,
    ) -> Result<Table, EngineError> {
        //! A read-only table built from `(local key, row)` pairs, in order.

        let mut table = Table::associative(schema);
        for (key, row) in entries {
            let stored = table.schema.key().local_set.apply(key)?;
            table.store.add(KeyValue::from_value(&stored)?, row)?;
        }
        table.store.freeze();
        Ok(table)
    }

    pub fn open(
        schema: &Arc<TableSchema>,
        kind: StoreKind,
        sync: DocumentSync,
    ) -> Result<Table, EngineError> {
        //! A read-only view of a document.

        Table::with_sync(schema, kind, sync, false)
    }

    pub fn open_mut(
        schema: &Arc<TableSchema>,
        kind: StoreKind,
        sync: DocumentSync,
    ) -> Result<Table, EngineError> {
        //! A mutable table synchronized to a document. Mutations accumulate
        //! patch operations; [`Table::flush`] applies them to the document.

        Table::with_sync(schema, kind, sync, true)
    }

    fn with_sync(
        schema: &Arc<TableSchema>,
        kind: StoreKind,
        sync: DocumentSync,
        mutable: bool,
    ) -> Result<Table, EngineError> {
        if sync.update_on_change() && kind == StoreKind::Sequential {
            return Err(EngineError::UnsupportedStore(
                "update-on-change requires an associative store".to_string(),
            ));
        }
        let mut table = Table {
            schema: Arc::clone(schema),
            store: RowStore::new(schema, kind, mutable),
            handles: HandleRegistry::new(),
            sync: Some(sync),
        };
        table.load()?;
        Ok(table)
    }

    fn load(&mut self) -> Result<(), EngineError> {
        //! Initial read of the document into the store. An absent document
        //! is an empty table when allow-missing is configured, an error
        //! otherwise.

        let (document, allow_missing, location) = match &self.sync {
            Some(sync) => (sync.read_document()?, sync.allow_missing(), sync.location()),
            None => return Ok(()),
        };
        let kind = self.sync_kind();
        match document {
            Some(document) => self.store.load_from(&document, kind)?,
            None if allow_missing => self.store.clear(),
            None => return Err(EngineError::DocumentMissing(location)),
        }
        Ok(())
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn is_sequential(&self) -> bool {
        self.store.is_sequential()
    }

    pub fn is_associative(&self) -> bool {
        self.store.is_associative()
    }

    pub fn is_mutable(&self) -> bool {
        self.store.is_mutable()
    }

    pub fn get(&mut self, address: impl Into<Address>) -> Result<RowHandle, EngineError> {
        //! A new registered handle for the row at the given position or key.

        let address = self.store.resolve(&address.into())?;
        self.store.tuple(&address)?;
        Ok(self.handles.register(address))
    }

    pub fn release(&mut self, handle: RowHandle) {
        //! Drop a handle out of tracking. Releasing a stale handle is fine.

        self.handles.release(handle);
    }

    pub fn contains(&self, address: impl Into<Address>) -> bool {
        match self.store.resolve(&address.into()) {
            Ok(address) => self.store.tuple(&address).is_ok(),
            Err(_) => false,
        }
    }

    pub fn address_of(&self, handle: &RowHandle) -> Result<RowAddress, EngineError> {
        self.handles.address(handle)
    }

    pub fn key_of(&self, handle: &RowHandle) -> Result<Value, EngineError> {
        //! The row's identity in local type: its position for a sequential
        //! table, its converted key for an associative one.

        let address = self.handles.address(handle)?;
        self.local_key(&address)
    }

    pub fn keys(&self) -> Result<Vec<Value>, EngineError> {
        //! Every row's identity in table-iteration order.

        self.store
            .addresses()
            .iter()
            .map(|address| self.local_key(address))
            .collect()
    }

    pub fn value(&self, handle: &RowHandle, column: &str) -> Result<Value, EngineError> {
        let address = self.handles.address(handle)?;
        let column = self
            .schema
            .column(column)
            .ok_or_else(|| EngineError::UnknownField(column.to_string()))?;
        let raw = self.store.tuple(&address)?[column.slot()].clone();
        column.local_get.apply(raw)
    }

    pub fn values(&self, column: &str) -> Result<Vec<Value>, EngineError> {
        //! One column's values in table-iteration order, with the local get
        //! conversion applied. Selection predicates are built by mapping
        //! over this.

        let column = self
            .schema
            .column(column)
            .ok_or_else(|| EngineError::UnknownField(column.to_string()))?;
        self.store
            .addresses()
            .iter()
            .map(|address| {
                let raw = self.store.tuple(address)?[column.slot()].clone();
                column.local_get.apply(raw)
            })
            .collect()
    }

    pub fn select<I>(&mut self, selection: I) -> Vec<RowHandle>
    where
        I: IntoIterator<Item = bool>,
    {
        //! Handles for every row paired with `true` in the selection,
        //! consumed in lockstep with table-iteration order. A shorter
        //! selection stops the iteration early; extra values are ignored.

        let mut selected = Vec::new();
        for (address, keep) in self.store.addresses().into_iter().zip(selection) {
            if keep {
                selected.push(self.handles.register(address));
            }
        }
        selected
    }

    pub fn select_one<I>(&mut self, selection: I) -> Result<RowHandle, EngineError>
    where
        I: IntoIterator<Item = bool>,
    {
        //! The unique selected row. Zero matches and multiple matches are
        //! both checked before anything is returned.

        let mut matched: Option<RowAddress> = None;
        for (address, keep) in self.store.addresses().into_iter().zip(selection) {
            if keep {
                if matched.is_some() {
                    return Err(EngineError::MultipleMatches);
                }
                matched = Some(address);
            }
        }
        match matched {
            Some(address) => Ok(self.handles.register(address)),
            None => Err(EngineError::NoMatch),
        }
    }

    pub fn append(&mut self, data: RowData) -> Result<RowHandle, EngineError> {
        //! Append a row to a sequential table and return its handle. The
        //! whole row is validated before anything is written.

        let position = self.store.append(data)?;
        let address = RowAddress::Position(position);
        if self.sync.is_some() {
            let record = self.remote_record(&address)?;
            if let Some(sync) = self.sync.as_mut() {
                sync.record_append(record);
            }
            self.after_change()?;
        }
        Ok(self.handles.register(address))
    }

    pub fn append_many<I>(&mut self, rows: I) -> Result<usize, EngineError>
    where
        I: IntoIterator<Item = RowData>,
    {
        //! Bulk append. This is not atomic: rows appended before an error
        //! are kept.

        let mut appended = 0;
        for row in rows {
            let handle = self.append(row)?;
            self.handles.release(handle);
            appended += 1;
        }
        Ok(appended)
    }

    pub fn add(&mut self, key: impl Into<Value>, data: RowData) -> Result<RowHandle, EngineError> {
        //! Insert a row into an associative table under the given local key
        //! and return its handle.

        let stored = self.schema.key().local_set.apply(key.into())?;
        let stored_key = KeyValue::from_value(&stored)?;
        self.store.add(stored_key.clone(), data)?;
        let address = RowAddress::Key(stored_key);
        if self.sync.is_some() {
            let record = self.remote_record(&address)?;
            let token = self.row_token(&address)?;
            if let Some(sync) = self.sync.as_mut() {
                sync.record_add(&token, record);
            }
            self.after_change()?;
        }
        Ok(self.handles.register(address))
    }

    pub fn set(&mut self, handle: &RowHandle, column: &str, value: Value) -> Result<(), EngineError> {
        //! Write one field of the row behind the handle.

        let address = self.handles.address(handle)?;
        let before = match &self.sync {
            Some(_) => Some(self.remote_record(&address)?),
            None => None,
        };
        self.store.set(&address, column, value)?;
        if let Some(before) = before {
            let after = self.remote_record(&address)?;
            let token = self.row_token(&address)?;
            if let Some(sync) = self.sync.as_mut() {
                sync.record_update(&token, &before, &after);
            }
            self.after_change()?;
        }
        Ok(())
    }

    pub fn delete(&mut self, handle: RowHandle) -> Result<(), EngineError> {
        //! Remove the row behind the handle. Every other live handle past a
        //! deleted sequential row shifts down with its row; handles to the
        //! deleted row itself go stale.

        let address = self.handles.address(&handle)?;
        self.store.ensure_mutable()?;
        let removal = match &self.sync {
            Some(_) => Some((self.row_token(&address)?, self.remote_record(&address)?)),
            None => None,
        };
        self.store.delete(&address)?;
        match &address {
            RowAddress::Position(pos) => self.handles.on_delete(*pos, self.store.len()),
            RowAddress::Key(key) => self.handles.kill_key(key),
        }
        self.handles.release(handle);
        if let Some((token, expected)) = removal {
            if let Some(sync) = self.sync.as_mut() {
                match &address {
                    RowAddress::Position(_) => sync.record_remove_sequential(&token, expected),
                    RowAddress::Key(_) => sync.record_remove_associative(&token),
                }
            }
            self.after_change()?;
        }
        Ok(())
    }

    pub fn reload(&mut self) -> Result<(), EngineError> {
        //! Replace the in-memory data with the freshly-read document plus
        //! the pending patch log, so unflushed local mutations survive.
        //! Sequential handles do not survive a reload; associative handles
        //! re-bind by key and go stale only if their key vanished.

        let reconciled = match &self.sync {
            Some(sync) => sync.reconciled_document(&self.store)?,
            None => return Ok(()),
        };
        let document = match reconciled {
            Some(document) => document,
            None => return Ok(()),
        };
        let kind = self.sync_kind();
        self.store.load_from(&document, kind)?;
        if self.store.is_sequential() {
            self.handles.invalidate_positions();
        } else {
            let store = &self.store;
            self.handles.invalidate_missing(|key| store.contains_key(key));
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<usize, EngineError> {
        //! Apply the accumulated patch log to the document; see
        //! [`DocumentSync::flush`]. Returns the number of operations
        //! applied; a table without a synchronizer flushes nothing.

        match self.sync.as_mut() {
            Some(sync) => sync.flush(&self.store),
            None => Ok(0),
        }
    }

    pub fn pending_patches(&self) -> &[PatchOp] {
        //! The operations recorded since the last successful flush.

        match &self.sync {
            Some(sync) => sync.patches(),
            None => &[],
        }
    }

    fn after_change(&mut self) -> Result<(), EngineError> {
        //! In update-on-change mode every recorded mutation is followed by
        //! a reload, trading consistency-with-disk for immediacy.

        let update = match &self.sync {
            Some(sync) => sync.update_on_change(),
            None => false,
        };
        if update {
            self.reload()?;
        }
        Ok(())
    }

    fn sync_kind(&self) -> &'static str {
        match &self.sync {
            Some(sync) => sync.kind(),
            None => crate::sync::JSON_KIND,
        }
    }

    fn local_key(&self, address: &RowAddress) -> Result<Value, EngineError> {
        let stored = match address {
            RowAddress::Position(pos) => Value::from(*pos as i64),
            RowAddress::Key(key) => key.to_value(),
        };
        self.schema.key().local_get.apply(stored)
    }

    fn remote_record(&self, address: &RowAddress) -> Result<Value, EngineError> {
        let tuple = self.store.tuple(address)?;
        self.schema.record_from_tuple(tuple, self.sync_kind())
    }

    fn row_token(&self, address: &RowAddress) -> Result<String, EngineError> {
        //! The document-level path token for a row: its written key for an
        //! associative table, its position for a sequential one.

        let written = match address {
            RowAddress::Position(pos) => self
                .schema
                .key()
                .remote_write
                .apply(Value::from(*pos as i64))?,
            RowAddress::Key(key) => self.schema.key().remote_write.apply(key.to_value())?,
        };
        token_from_value(&written)
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.schema)?;
        for address in self.store.addresses() {
            if let Ok(tuple) = self.store.tuple(&address) {
                let label = match &address {
                    RowAddress::Position(pos) => pos.to_string(),
                    RowAddress::Key(key) => key.to_string(),
                };
                let cells: Vec<String> = tuple.iter().map(|value| value.to_string()).collect();
                writeln!(f, "{:>4} | {}", label, cells.join(" | "))?;
            }
        }
        Ok(())
    }
}
