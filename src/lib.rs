//! A small embedded tabular data engine.
//!
//! Tables are built from composable schema fragments resolved into one
//! ordered, slot-assigned column list; rows live in a store that is
//! sequential or associative, mutable or immutable; external code holds row
//! handles that stay valid across structural mutation; and a table can be
//! kept in step with an external JSON document through minimal patch
//! operations instead of full rewrites.

//  All modules of this lib
mod errors;
mod values;

pub mod schema;
pub mod storage;
pub mod sync;

//  External API
pub use errors::EngineError;
pub use serde_json::Value;
pub use values::{Conversion, KeyValue};
