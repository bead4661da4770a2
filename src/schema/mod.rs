//! Schema composition needs to have the following components
//! - Column declarations and their resolved forms (conversions, remote keys)
//! - Fragments (composable table definitions, linearized C3-style)
//! - The resolver (fold declarations into one ordered, slot-assigned schema)
//!

//  All modules of this lib
mod column;
mod fragment;
mod resolved;
mod resolver;

//  External API
pub use column::{
    ColumnDecl, ColumnFactory, ColumnSchema, DefaultColumnFactory, KeyColumnDecl, KeyColumnSchema,
    RemoteKey,
};
pub use fragment::SchemaFragment;
pub use resolved::{RowData, TableSchema};
pub use resolver::SchemaResolver;
