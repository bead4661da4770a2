use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::errors::EngineError;
use crate::schema::{RowData, TableSchema};
use crate::values::KeyValue;

/// How a caller names a row: an integer or a piece of text.
///
/// What the value means depends on the store kind. For a sequential store an
/// integer is a position (negative values resolve from the end); for an
/// associative store either form is the key in the identity column's local
/// type, converted to its stored form before lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Address {
    Int(i64),
    Text(String),
}

impl Address {
    fn to_value(&self) -> Value {
        match self {
            Address::Int(i) => Value::from(*i),
            Address::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<i64> for Address {
    fn from(value: i64) -> Address {
        Address::Int(value)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Address {
        Address::Text(value.to_string())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Address {
        Address::Text(value)
    }
}

/// A resolved row location inside a store: a physical position for
/// sequential data, a stored key for associative data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAddress {
    Position(usize),
    Key(KeyValue),
}

/// The addressing axis of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sequential,
    Associative,
}

enum StoreData {
    Sequential(Vec<Vec<Value>>),
    Associative(IndexMap<KeyValue, Vec<Value>>),
}

/// Physical tuple storage, one fixed-length tuple per row.
///
/// The four store variants come from two independent axes: the addressing
/// mode lives in the data enum and the mutability gate is a flag checked
/// before every write. All marshalling between tuples, field mappings and
/// remote records is shared through the schema, so no variant reimplements
/// conversion logic.
pub struct RowStore {
    schema: Arc<TableSchema>,
    data: StoreData,
    mutable: bool,
}

impl RowStore {
    pub fn new(schema: &Arc<TableSchema>, kind: StoreKind, mutable: bool) -> RowStore {
        let data = match kind {
            StoreKind::Sequential => StoreData::Sequential(Vec::new()),
            StoreKind::Associative => StoreData::Associative(IndexMap::new()),
        };
        RowStore {
            schema: Arc::clone(schema),
            data,
            mutable,
        }
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn kind(&self) -> StoreKind {
        match &self.data {
            StoreData::Sequential(_) => StoreKind::Sequential,
            StoreData::Associative(_) => StoreKind::Associative,
        }
    }

    pub fn is_sequential(&self) -> bool {
        self.kind() == StoreKind::Sequential
    }

    pub fn is_associative(&self) -> bool {
        self.kind() == StoreKind::Associative
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub(crate) fn freeze(&mut self) {
        self.mutable = false;
    }

    pub fn len(&self) -> usize {
        match &self.data {
            StoreData::Sequential(rows) => rows.len(),
            StoreData::Associative(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ensure_mutable(&self) -> Result<(), EngineError> {
        if self.mutable {
            Ok(())
        } else {
            Err(EngineError::StoreIsImmutable)
        }
    }

    pub fn resolve_index(&self, index: i64) -> Result<usize, EngineError> {
        //! Resolve a possibly-negative position against the current length.

        let len = self.len();
        let resolved = if index < 0 { index + len as i64 } else { index };
        if resolved < 0 || resolved >= len as i64 {
            return Err(EngineError::IndexOutOfBounds { index, len });
        }
        Ok(resolved as usize)
    }

    pub fn resolve(&self, address: &Address) -> Result<RowAddress, EngineError> {
        //! Resolve a caller-facing address to a physical one. For an
        //! associative store the local key is converted to its stored form;
        //! membership is not checked here.

        match &self.data {
            StoreData::Sequential(_) => match address {
                Address::Int(index) => Ok(RowAddress::Position(self.resolve_index(*index)?)),
                Address::Text(text) => Err(EngineError::NotFound(text.clone())),
            },
            StoreData::Associative(_) => {
                let stored = self.schema.key().local_set.apply(address.to_value())?;
                Ok(RowAddress::Key(KeyValue::from_value(&stored)?))
            }
        }
    }

    pub fn contains_key(&self, key: &KeyValue) -> bool {
        match &self.data {
            StoreData::Sequential(_) => false,
            StoreData::Associative(rows) => rows.contains_key(key),
        }
    }

    pub fn addresses(&self) -> Vec<RowAddress> {
        //! Every row's address in table-iteration order.

        match &self.data {
            StoreData::Sequential(rows) => (0..rows.len()).map(RowAddress::Position).collect(),
            StoreData::Associative(rows) => {
                rows.keys().cloned().map(RowAddress::Key).collect()
            }
        }
    }

    pub fn tuple(&self, address: &RowAddress) -> Result<&[Value], EngineError> {
        match (&self.data, address) {
            (StoreData::Sequential(rows), RowAddress::Position(pos)) => rows
                .get(*pos)
                .map(|tuple| tuple.as_slice())
                .ok_or_else(|| EngineError::IndexOutOfBounds {
                    index: *pos as i64,
                    len: rows.len(),
                }),
            (StoreData::Associative(rows), RowAddress::Key(key)) => rows
                .get(key)
                .map(|tuple| tuple.as_slice())
                .ok_or_else(|| EngineError::NotFound(key.to_string())),
            _ => Err(EngineError::UnsupportedStore(
                "address does not match store kind".to_string(),
            )),
        }
    }

    pub fn append(&mut self, data: RowData) -> Result<usize, EngineError> {
        //! Append a row built from a name-to-value mapping; sequential
        //! stores only. Returns the new row's position.

        self.ensure_mutable()?;
        if let StoreData::Associative(_) = &self.data {
            return Err(EngineError::UnsupportedStore(
                "append requires a sequential store".to_string(),
            ));
        }
        let tuple = self.schema.tuple_from_fields(data)?;
        if let StoreData::Sequential(rows) = &mut self.data {
            rows.push(tuple);
            Ok(rows.len() - 1)
        } else {
            Err(EngineError::UnsupportedStore(
                "append requires a sequential store".to_string(),
            ))
        }
    }

    pub fn add(&mut self, key: KeyValue, data: RowData) -> Result<(), EngineError> {
        //! Insert a row under a stored key; associative stores only.

        self.ensure_mutable()?;
        match &self.data {
            StoreData::Sequential(_) => {
                return Err(EngineError::UnsupportedStore(
                    "add requires an associative store".to_string(),
                ));
            }
            StoreData::Associative(rows) => {
                if rows.contains_key(&key) {
                    return Err(EngineError::DuplicateKey(key.to_string()));
                }
            }
        }
        let tuple = self.schema.tuple_from_fields(data)?;
        if let StoreData::Associative(rows) = &mut self.data {
            rows.insert(key, tuple);
        }
        Ok(())
    }

    pub fn set(&mut self, address: &RowAddress, column: &str, value: Value) -> Result<(), EngineError> {
        //! Write one cell, applying the column's store-direction conversion
        //! first so a conversion failure never reaches the tuple.

        self.ensure_mutable()?;
        let (slot, conversion) = match self.schema.column(column) {
            Some(column) => (column.slot(), column.local_set),
            None => return Err(EngineError::UnknownField(column.to_string())),
        };
        let stored = conversion.apply(value)?;
        let tuple = self.tuple_mut(address)?;
        tuple[slot] = stored;
        Ok(())
    }

    pub fn delete(&mut self, address: &RowAddress) -> Result<(), EngineError> {
        //! Remove a whole row. For sequential stores every row past the
        //! removed one shifts down by one; remapping registered handles is
        //! the caller's follow-up, with the post-removal length.

        self.ensure_mutable()?;
        match (&mut self.data, address) {
            (StoreData::Sequential(rows), RowAddress::Position(pos)) => {
                if *pos >= rows.len() {
                    return Err(EngineError::IndexOutOfBounds {
                        index: *pos as i64,
                        len: rows.len(),
                    });
                }
                rows.remove(*pos);
                Ok(())
            }
            (StoreData::Associative(rows), RowAddress::Key(key)) => match rows.shift_remove(key) {
                Some(_) => Ok(()),
                None => Err(EngineError::NotFound(key.to_string())),
            },
            _ => Err(EngineError::UnsupportedStore(
                "address does not match store kind".to_string(),
            )),
        }
    }

    fn tuple_mut(&mut self, address: &RowAddress) -> Result<&mut Vec<Value>, EngineError> {
        match (&mut self.data, address) {
            (StoreData::Sequential(rows), RowAddress::Position(pos)) => {
                let len = rows.len();
                rows.get_mut(*pos).ok_or(EngineError::IndexOutOfBounds {
                    index: *pos as i64,
                    len,
                })
            }
            (StoreData::Associative(rows), RowAddress::Key(key)) => rows
                .get_mut(key)
                .ok_or_else(|| EngineError::NotFound(key.to_string())),
            _ => Err(EngineError::UnsupportedStore(
                "address does not match store kind".to_string(),
            )),
        }
    }

    pub(crate) fn clear(&mut self) {
        match &mut self.data {
            StoreData::Sequential(rows) => rows.clear(),
            StoreData::Associative(rows) => rows.clear(),
        }
    }

    pub(crate) fn load_from(&mut self, document: &Value, kind: &str) -> Result<(), EngineError> {
        //! Replace the whole store from a remote document. This path skips
        //! the mutability gate: loading is how read-only stores get their
        //! contents in the first place.

        match self.kind() {
            StoreKind::Sequential => {
                let records = document
                    .as_array()
                    .ok_or_else(|| EngineError::ConversionFailed {
                        expected: "array document",
                        value: document.to_string(),
                    })?;
                let mut rows = Vec::with_capacity(records.len());
                for record in records {
                    rows.push(self.schema.tuple_from_record(record, kind)?);
                }
                self.data = StoreData::Sequential(rows);
            }
            StoreKind::Associative => {
                let records = document
                    .as_object()
                    .ok_or_else(|| EngineError::ConversionFailed {
                        expected: "object document",
                        value: document.to_string(),
                    })?;
                let mut rows = IndexMap::with_capacity(records.len());
                for (raw_key, record) in records {
                    let stored = self
                        .schema
                        .key()
                        .remote_read
                        .apply(Value::String(raw_key.clone()))?;
                    let key = KeyValue::from_value(&stored)?;
                    rows.insert(key, self.schema.tuple_from_record(record, kind)?);
                }
                self.data = StoreData::Associative(rows);
            }
        }
        Ok(())
    }

    pub(crate) fn to_document(&self, kind: &str) -> Result<Value, EngineError> {
        //! The full remote representation of the store's current state.

        match &self.data {
            StoreData::Sequential(rows) => {
                let mut records = Vec::with_capacity(rows.len());
                for tuple in rows {
                    records.push(self.schema.record_from_tuple(tuple, kind)?);
                }
                Ok(Value::Array(records))
            }
            StoreData::Associative(rows) => {
                let mut records = Map::new();
                for (key, tuple) in rows {
                    let written = self.schema.key().remote_write.apply(key.to_value())?;
                    let document_key = match written {
                        Value::String(s) => s,
                        Value::Number(n) => n.to_string(),
                        other => {
                            return Err(EngineError::ConversionFailed {
                                expected: "document key",
                                value: other.to_string(),
                            });
                        }
                    };
                    records.insert(document_key, self.schema.record_from_tuple(tuple, kind)?);
                }
                Ok(Value::Object(records))
            }
        }
    }

    pub(crate) fn empty_document(&self) -> Value {
        match &self.data {
            StoreData::Sequential(_) => Value::Array(Vec::new()),
            StoreData::Associative(_) => Value::Object(Map::new()),
        }
    }
}
