//! Document synchronization needs to have the following components
//! - Patch operations (atomic add/remove/replace/test, diff and apply)
//! - Document I/O (where the JSON lives; files by default)
//! - The synchronizer (patch log, load/reload/flush, conflict artifacts)
//!

//  All modules of this lib
mod document;
mod patch;
mod synchronizer;

//  External API
pub use document::{DocumentIo, FileDocument};
pub use patch::{OpKind, PatchError, PatchOp, apply, apply_all, diff};
pub use synchronizer::{DocumentSync, JSON_KIND, SyncOptions};

pub(crate) use patch::token_from_value;
