//! Row storage needs to have the following components
//! - Row store (physical tuples; {sequential, associative} x {immutable, mutable})
//! - Handle registry (live row handles, remapped across deletions)
//! - Table (the facade tying store, schema, handles and synchronizer together)
//!

//  All modules of this lib
mod handles;
mod store;
mod table;

//  External API
pub use handles::RowHandle;
pub use store::{Address, RowAddress, RowStore, StoreKind};
pub use table::Table;
