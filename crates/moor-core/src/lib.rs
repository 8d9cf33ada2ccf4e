//! Core types for the Moor handle layer.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! engine-side [`Object`] with its strong/weak reference tallies, the
//! strongly-typed identifiers shared by every other crate (including the
//! [`SlotAddr`] slot address), the error taxonomy, and the
//! [`FatalErrorHandler`] capability consumed from the embedding platform.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod fatal;
pub mod id;
pub mod object;

pub use error::{HandleError, UsageError};
pub use fatal::{FatalErrorHandler, LogFatalHandler};
pub use id::{IsolateId, ObjectId, ScopeId, SlotAddr, ThreadKey};
pub use object::{Object, RefKind};
