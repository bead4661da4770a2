use thiserror::Error;

/// All the ways the engine can fail.
///
/// The schema variants ([`EngineError::AmbiguousComposition`],
/// [`EngineError::MultipleKeyColumns`], [`EngineError::ColumnClassUnresolved`],
/// [`EngineError::KeyConversionNotInvertible`]) are raised while a table type
/// is being resolved and are fatal. The per-call variants leave the table
/// state unchanged. [`EngineError::SyncConflict`] aborts only the disk write,
/// never the in-memory state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot order schema fragments: {0}")]
    AmbiguousComposition(String),

    #[error("multiple key columns declared on fragment '{0}'")]
    MultipleKeyColumns(String),

    #[error("cannot determine column class for '{0}'")]
    ColumnClassUnresolved(String),

    #[error("key column '{0}': conversions are not mutual inverses")]
    KeyConversionNotInvertible(String),

    #[error("index {index} out of bounds; length is {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("key '{0}' already exists")]
    DuplicateKey(String),

    #[error("does not exist: row '{0}'")]
    NotFound(String),

    #[error("missing required field '{0}'")]
    MissingRequiredField(String),

    #[error("unknown fields provided: {0}")]
    UnknownField(String),

    #[error("no rows selected")]
    NoMatch,

    #[error("more than one row selected")]
    MultipleMatches,

    #[error("attempting to modify immutable store")]
    StoreIsImmutable,

    #[error("row handle is no longer valid")]
    StaleHandle,

    #[error("invalid value {value}: not compatible with {expected}")]
    ConversionFailed {
        expected: &'static str,
        value: String,
    },

    #[error("no remote key for column '{column}' in store kind '{kind}'")]
    RemoteKeyUnresolved { column: String, kind: String },

    #[error("operation not supported by this store: {0}")]
    UnsupportedStore(String),

    #[error("document '{0}' does not exist")]
    DocumentMissing(String),

    #[error(
        "failed to apply patches to '{document}': {reason}; \
         current state written to '{state_file}', patches to '{patch_file}'"
    )]
    SyncConflict {
        document: String,
        reason: String,
        state_file: String,
        patch_file: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
