use std::sync::Arc;

use crate::errors::EngineError;

use super::column::{ColumnDecl, ColumnFactory, KeyColumnDecl};

/// One named thing a fragment contributes, in declaration order.
///
/// `Attribute` is a non-column name: it contributes nothing itself but
/// shadows a like-named column from a less specific fragment, removing it
/// from the resolved schema entirely.
#[derive(Clone)]
pub(crate) enum FragmentDecl {
    Column(String, ColumnDecl),
    Key(String, KeyColumnDecl),
    Attribute(String),
}

/// One composable piece of a table definition.
///
/// A fragment declares columns (and at most one key column) and may compose
/// other fragments, most general listed first, the way a derived definition
/// lists its bases. Fragments are identified by pointer, not by name, so the
/// same name may appear in unrelated compositions.
pub struct SchemaFragment {
    pub(super) name: String,
    pub(super) bases: Vec<Arc<SchemaFragment>>,
    pub(super) decls: Vec<FragmentDecl>,
    pub(super) default_factory: Option<Arc<dyn ColumnFactory>>,
}

impl SchemaFragment {
    pub fn new(name: impl Into<String>) -> SchemaFragment {
        SchemaFragment {
            name: name.into(),
            bases: Vec::new(),
            decls: Vec::new(),
            default_factory: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_base(mut self, base: &Arc<SchemaFragment>) -> SchemaFragment {
        //! Compose another fragment under this one. Order matters: earlier
        //! bases are more general in the linearization.

        self.bases.push(Arc::clone(base));
        self
    }

    pub fn with_column(mut self, name: impl Into<String>, decl: ColumnDecl) -> SchemaFragment {
        self.decls.push(FragmentDecl::Column(name.into(), decl));
        self
    }

    pub fn with_key(mut self, name: impl Into<String>, decl: KeyColumnDecl) -> SchemaFragment {
        self.decls.push(FragmentDecl::Key(name.into(), decl));
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>) -> SchemaFragment {
        //! Declare a non-column name that shadows any like-named column
        //! contributed by a less specific fragment.

        self.decls.push(FragmentDecl::Attribute(name.into()));
        self
    }

    pub fn with_default_factory(mut self, factory: Arc<dyn ColumnFactory>) -> SchemaFragment {
        self.default_factory = Some(factory);
        self
    }
}

/// C3 linearization of a fragment composition, most specific first.
///
/// A candidate may be emitted only while it does not appear in the tail of
/// any pending chain; the first such candidate (in declaration order) wins.
/// If no candidate qualifies the composition cannot be ordered
/// monotonically and resolution fails.
pub(crate) fn linearize(
    fragment: &Arc<SchemaFragment>,
) -> Result<Vec<Arc<SchemaFragment>>, EngineError> {
    let mut mro = vec![Arc::clone(fragment)];
    if fragment.bases.is_empty() {
        return Ok(mro);
    }

    let mut pending: Vec<Vec<Arc<SchemaFragment>>> = Vec::new();
    for base in &fragment.bases {
        pending.push(linearize(base)?);
    }
    pending.push(fragment.bases.clone());

    loop {
        pending.retain(|chain| !chain.is_empty());
        if pending.is_empty() {
            return Ok(mro);
        }

        let good = pending.iter().find_map(|chain| {
            let head = &chain[0];
            let in_a_tail = pending
                .iter()
                .any(|other| other.iter().skip(1).any(|f| Arc::ptr_eq(f, head)));
            if in_a_tail {
                None
            } else {
                Some(Arc::clone(head))
            }
        });

        let head = match good {
            Some(head) => head,
            None => {
                let heads: Vec<&str> = pending.iter().map(|chain| chain[0].name()).collect();
                return Err(EngineError::AmbiguousComposition(heads.join(", ")));
            }
        };

        mro.push(Arc::clone(&head));
        for chain in pending.iter_mut() {
            if Arc::ptr_eq(&chain[0], &head) {
                chain.remove(0);
            }
        }
    }
}
