use std::fmt::Display;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::errors::EngineError;

use super::column::{ColumnSchema, KeyColumnSchema};

/// A row's data by column name, as accepted by `append` and `add`.
pub type RowData = IndexMap<String, Value>;

/// The resolved shape of a table: an ordered column list and the one
/// identity column. Built once by the resolver, immutable afterwards.
///
/// Slot indices are the positions in the column list, so they always form a
/// dense `0..n-1` permutation and the key column occupies no slot.
pub struct TableSchema {
    columns: IndexMap<String, ColumnSchema>,
    key: KeyColumnSchema,
}

impl TableSchema {
    pub(crate) fn new(columns: IndexMap<String, ColumnSchema>, key: KeyColumnSchema) -> TableSchema {
        TableSchema { columns, key }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.values()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.get(name)
    }

    pub fn key(&self) -> &KeyColumnSchema {
        &self.key
    }

    pub(crate) fn tuple_from_fields(&self, mut data: RowData) -> Result<Vec<Value>, EngineError> {
        //! Convert a name-to-value mapping into a physical tuple using each
        //! column's local conversion. The whole row is validated before
        //! anything is returned, so a failure never leaves a partial write.

        let mut tuple = Vec::with_capacity(self.columns.len());
        for column in self.columns.values() {
            let value = match data.swap_remove(column.name()) {
                Some(value) => value,
                None => match column.default() {
                    Some(default) => default.clone(),
                    None => {
                        return Err(EngineError::MissingRequiredField(column.name().to_string()));
                    }
                },
            };
            tuple.push(column.local_set.apply(value)?);
        }
        if !data.is_empty() {
            let leftover: Vec<String> = data.keys().cloned().collect();
            return Err(EngineError::UnknownField(leftover.join(", ")));
        }
        Ok(tuple)
    }

    pub(crate) fn tuple_from_record(
        &self,
        record: &Value,
        kind: &str,
    ) -> Result<Vec<Value>, EngineError> {
        //! Read one remote record into a physical tuple with each column's
        //! remote read conversion, honoring declared defaults for absent
        //! keys.

        let map = record
            .as_object()
            .ok_or_else(|| EngineError::ConversionFailed {
                expected: "record object",
                value: record.to_string(),
            })?;
        self.columns
            .values()
            .map(|column| column.read_from(map, kind))
            .collect()
    }

    pub(crate) fn record_from_tuple(
        &self,
        tuple: &[Value],
        kind: &str,
    ) -> Result<Value, EngineError> {
        let mut record = Map::new();
        for column in self.columns.values() {
            column.write_to(tuple[column.slot()].clone(), &mut record, kind)?;
        }
        Ok(Value::Object(record))
    }
}

impl Display for TableSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let columns: Vec<&str> = self.columns.keys().map(|name| name.as_str()).collect();
        write!(f, "[{}] {}", self.key.name(), columns.join(" | "))
    }
}
