use std::sync::Arc;

use indexmap::IndexMap;

use crate::errors::EngineError;

use super::column::{
    ColumnDecl, ColumnFactory, ColumnSchema, DefaultColumnFactory, KeyColumnDecl, KeyColumnSchema,
};
use super::fragment::{FragmentDecl, SchemaFragment, linearize};
use super::resolved::TableSchema;

/// Turns a fragment composition into one [`TableSchema`].
///
/// Resolution is eager: every failure a schema can produce (an unorderable
/// composition, two key columns in one fragment, a column with no resolvable
/// implementation class, a key whose conversions do not round-trip) is
/// raised here, before any row exists.
pub struct SchemaResolver {
    fallback_factory: Option<Arc<dyn ColumnFactory>>,
}

impl SchemaResolver {
    pub fn new() -> SchemaResolver {
        //! A resolver with [`DefaultColumnFactory`] as the fallback for
        //! declarations that name no implementation class.

        SchemaResolver {
            fallback_factory: Some(Arc::new(DefaultColumnFactory)),
        }
    }

    pub fn without_fallback() -> SchemaResolver {
        //! A resolver with no fallback: every column must find its factory
        //! on its declaration or somewhere in the composition.

        SchemaResolver {
            fallback_factory: None,
        }
    }

    pub fn resolve(&self, fragment: &Arc<SchemaFragment>) -> Result<Arc<TableSchema>, EngineError> {
        let mro = linearize(fragment)?;

        // The most specific fragment that sets a default factory wins.
        let default_factory = mro
            .iter()
            .find_map(|frag| frag.default_factory.clone())
            .or_else(|| self.fallback_factory.clone());

        // Walk least to most specific, folding declarations into one ordered
        // mapping. A column redeclaration keeps the original position; a key
        // or attribute declaration removes a like-named column entirely, so
        // a later redeclaration lands at the end.
        let mut columns: IndexMap<String, ColumnDecl> = IndexMap::new();
        let mut key: Option<(String, KeyColumnDecl)> = None;

        for frag in mro.iter().rev() {
            let mut key_declared_here = false;
            for decl in &frag.decls {
                match decl {
                    FragmentDecl::Column(name, decl) => {
                        columns.insert(name.clone(), decl.clone());
                    }
                    FragmentDecl::Key(name, decl) => {
                        if key_declared_here {
                            return Err(EngineError::MultipleKeyColumns(frag.name.clone()));
                        }
                        key_declared_here = true;
                        key = Some((name.clone(), decl.clone()));
                        columns.shift_remove(name);
                    }
                    FragmentDecl::Attribute(name) => {
                        columns.shift_remove(name);
                    }
                }
            }
        }

        let key = match &key {
            Some((name, decl)) => KeyColumnSchema::from_decl(name, decl),
            None => KeyColumnSchema::identity("index"),
        };
        if !key.local_get.is_inverse_of(&key.local_set)
            || !key.remote_read.is_inverse_of(&key.remote_write)
        {
            return Err(EngineError::KeyConversionNotInvertible(
                key.name().to_string(),
            ));
        }

        let mut resolved: IndexMap<String, ColumnSchema> = IndexMap::with_capacity(columns.len());
        for (slot, (name, decl)) in columns.iter().enumerate() {
            let factory = decl
                .factory
                .clone()
                .or_else(|| default_factory.clone())
                .ok_or_else(|| EngineError::ColumnClassUnresolved(name.clone()))?;
            resolved.insert(name.clone(), factory.build(name, slot, decl));
        }

        Ok(Arc::new(TableSchema::new(resolved, key)))
    }
}

impl Default for SchemaResolver {
    fn default() -> SchemaResolver {
        SchemaResolver::new()
    }
}
