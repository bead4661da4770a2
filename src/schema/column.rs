use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::errors::EngineError;
use crate::values::Conversion;

/// Where a column lives in a remote document.
///
/// A column may use a different key per remote store kind, with an optional
/// fallback entry used for kinds that have no entry of their own. A mapping
/// with no entries at all resolves to the column's own name. A kind that is
/// missing from a non-empty mapping with no fallback is an error, so a
/// schema that was written for one store kind does not silently leak wrong
/// keys into another.
#[derive(Clone)]
pub struct RemoteKey {
    by_kind: IndexMap<String, String>,
    fallback: Option<String>,
}

impl RemoteKey {
    pub fn fixed(key: impl Into<String>) -> RemoteKey {
        //! A single key used for every remote store kind.

        RemoteKey {
            by_kind: IndexMap::new(),
            fallback: Some(key.into()),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>, key: impl Into<String>) -> RemoteKey {
        self.by_kind.insert(kind.into(), key.into());
        self
    }

    pub(crate) fn resolve(&self, kind: &str, column: &str) -> Result<String, EngineError> {
        if let Some(key) = self.by_kind.get(kind) {
            return Ok(key.clone());
        }
        if let Some(key) = &self.fallback {
            return Ok(key.clone());
        }
        if self.by_kind.is_empty() {
            return Ok(column.to_string());
        }
        Err(EngineError::RemoteKeyUnresolved {
            column: column.to_string(),
            kind: kind.to_string(),
        })
    }
}

impl Default for RemoteKey {
    fn default() -> RemoteKey {
        //! No mapping at all; the column's own name is used everywhere.

        RemoteKey {
            by_kind: IndexMap::new(),
            fallback: None,
        }
    }
}

/// What a schema fragment says about one column.
///
/// Declarations are inert data until the resolver turns them into
/// [`ColumnSchema`]s with assigned slots. The four conversions cover the two
/// directions on each side of the store boundary: `local_get`/`local_set`
/// apply at field access and store writes, `remote_read`/`remote_write`
/// apply when moving rows to and from a remote document.
#[derive(Clone)]
pub struct ColumnDecl {
    pub(crate) remote_key: RemoteKey,
    pub(crate) default: Option<Value>,
    pub(crate) local_get: Conversion,
    pub(crate) local_set: Conversion,
    pub(crate) remote_read: Conversion,
    pub(crate) remote_write: Conversion,
    pub(crate) factory: Option<Arc<dyn ColumnFactory>>,
}

impl ColumnDecl {
    pub fn new() -> ColumnDecl {
        ColumnDecl {
            remote_key: RemoteKey::default(),
            default: None,
            local_get: Conversion::Identity,
            local_set: Conversion::Identity,
            remote_read: Conversion::Identity,
            remote_write: Conversion::Identity,
            factory: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> ColumnDecl {
        //! Columns without a default are required in every appended row.

        self.default = Some(value.into());
        self
    }

    pub fn with_remote_key(mut self, remote_key: RemoteKey) -> ColumnDecl {
        self.remote_key = remote_key;
        self
    }

    pub fn with_local(mut self, get: Conversion, set: Conversion) -> ColumnDecl {
        self.local_get = get;
        self.local_set = set;
        self
    }

    pub fn with_remote(mut self, read: Conversion, write: Conversion) -> ColumnDecl {
        self.remote_read = read;
        self.remote_write = write;
        self
    }

    pub fn with_factory(mut self, factory: Arc<dyn ColumnFactory>) -> ColumnDecl {
        //! An explicit implementation class for this column, taking priority
        //! over any composition-wide default.

        self.factory = Some(factory);
        self
    }
}

impl Default for ColumnDecl {
    fn default() -> ColumnDecl {
        ColumnDecl::new()
    }
}

/// What a schema fragment says about the identity column.
///
/// Key columns never have a default and no remote key mapping: for an
/// associative document the written key *is* the document-level key, and for
/// a sequential one it is the row's position.
#[derive(Clone)]
pub struct KeyColumnDecl {
    pub(crate) local_get: Conversion,
    pub(crate) local_set: Conversion,
    pub(crate) remote_read: Conversion,
    pub(crate) remote_write: Conversion,
}

impl KeyColumnDecl {
    pub fn new() -> KeyColumnDecl {
        KeyColumnDecl {
            local_get: Conversion::Identity,
            local_set: Conversion::Identity,
            remote_read: Conversion::Identity,
            remote_write: Conversion::Identity,
        }
    }

    pub fn with_local(mut self, get: Conversion, set: Conversion) -> KeyColumnDecl {
        self.local_get = get;
        self.local_set = set;
        self
    }

    pub fn with_remote(mut self, read: Conversion, write: Conversion) -> KeyColumnDecl {
        self.remote_read = read;
        self.remote_write = write;
        self
    }
}

impl Default for KeyColumnDecl {
    fn default() -> KeyColumnDecl {
        KeyColumnDecl::new()
    }
}

/// A resolved column: name, slot, and conversions, immutable once built.
#[derive(Clone)]
pub struct ColumnSchema {
    name: String,
    slot: usize,
    remote_key: RemoteKey,
    default: Option<Value>,
    pub(crate) local_get: Conversion,
    pub(crate) local_set: Conversion,
    pub(crate) remote_read: Conversion,
    pub(crate) remote_write: Conversion,
}

impl ColumnSchema {
    pub fn from_decl(name: &str, slot: usize, decl: &ColumnDecl) -> ColumnSchema {
        //! The plain translation of a declaration into a resolved column.
        //! Custom [`ColumnFactory`] implementations may adjust the
        //! declaration before delegating here.

        ColumnSchema {
            name: name.to_string(),
            slot,
            remote_key: decl.remote_key.clone(),
            default: decl.default.clone(),
            local_get: decl.local_get,
            local_set: decl.local_set,
            remote_read: decl.remote_read,
            remote_write: decl.remote_write,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn remote_key_for(&self, kind: &str) -> Result<String, EngineError> {
        self.remote_key.resolve(kind, &self.name)
    }

    pub(crate) fn read_from(
        &self,
        record: &Map<String, Value>,
        kind: &str,
    ) -> Result<Value, EngineError> {
        //! Read this column out of a remote record, honoring the declared
        //! default when the key is absent.

        let key = self.remote_key_for(kind)?;
        let raw = match record.get(&key) {
            Some(value) => value.clone(),
            None => match &self.default {
                Some(default) => default.clone(),
                None => return Err(EngineError::MissingRequiredField(self.name.clone())),
            },
        };
        self.remote_read.apply(raw)
    }

    pub(crate) fn write_to(
        &self,
        value: Value,
        record: &mut Map<String, Value>,
        kind: &str,
    ) -> Result<(), EngineError> {
        let key = self.remote_key_for(kind)?;
        record.insert(key, self.remote_write.apply(value)?);
        Ok(())
    }
}

/// The resolved identity column. Exactly one exists per table schema.
#[derive(Clone)]
pub struct KeyColumnSchema {
    name: String,
    pub(crate) local_get: Conversion,
    pub(crate) local_set: Conversion,
    pub(crate) remote_read: Conversion,
    pub(crate) remote_write: Conversion,
}

impl KeyColumnSchema {
    pub(crate) fn from_decl(name: &str, decl: &KeyColumnDecl) -> KeyColumnSchema {
        KeyColumnSchema {
            name: name.to_string(),
            local_get: decl.local_get,
            local_set: decl.local_set,
            remote_read: decl.remote_read,
            remote_write: decl.remote_write,
        }
    }

    pub(crate) fn identity(name: &str) -> KeyColumnSchema {
        KeyColumnSchema::from_decl(name, &KeyColumnDecl::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builds the resolved column for a declaration.
///
/// The resolver picks the factory as follows: the declaration's own factory
/// if it has one, otherwise the composition's default, otherwise the
/// resolver's fallback. No factory anywhere is a resolution-time error.
pub trait ColumnFactory {
    fn build(&self, name: &str, slot: usize, decl: &ColumnDecl) -> ColumnSchema;
}

/// The stock factory: a faithful translation of the declaration.
pub struct DefaultColumnFactory;

impl ColumnFactory for DefaultColumnFactory {
    fn build(&self, name: &str, slot: usize, decl: &ColumnDecl) -> ColumnSchema {
        ColumnSchema::from_decl(name, slot, decl)
    }
}
