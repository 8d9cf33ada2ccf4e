//! Moor: the handle and reference lifetime layer of a scripting-engine
//! embedding API.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Moor sub-crates. For most users, adding `moor` as a single
//! dependency is sufficient. The C surface lives in `moor-ffi`.
//!
//! # Quick start
//!
//! ```rust
//! use moor::prelude::*;
//!
//! let isolate = Isolate::new(IsolateConfig::default()).unwrap();
//! let _entered = isolate.entered();
//! let object = Object::new(42u64);
//!
//! // A local lives until its scope closes; a persistent until disposed.
//! let kept = {
//!     let scope = isolate.handle_scope().unwrap();
//!     let local = scope.create(&object).unwrap();
//!     assert_eq!(object.strong_count(), 1);
//!     isolate.persist_local(local).unwrap()
//! };
//! assert_eq!(object.strong_count(), 1);
//!
//! isolate.dispose(kept).unwrap();
//! assert!(object.is_destroyed());
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `moor-core` | `Object`, IDs, slot addresses, errors, fatal handler |
//! | [`arena`] | `moor-arena` | `SlabAllocator` slot storage |
//! | [`isolate`] | `moor-isolate` | Isolates, scopes, persistents, weak sweep, lockers |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, IDs, and errors (`moor-core`).
pub use moor_core as types;

/// Slab-based slot storage (`moor-arena`).
///
/// Embedders rarely touch [`arena::SlabAllocator`] directly; it backs both
/// local and persistent handle storage.
pub use moor_arena as arena;

/// Isolates and handles (`moor-isolate`).
pub use moor_isolate as isolate;

/// Common imports for typical Moor usage.
///
/// ```rust
/// use moor::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use moor_core::{FatalErrorHandler, HandleError, Object, SlotAddr, UsageError};

    // Configuration
    pub use moor_arena::ArenaConfig;
    pub use moor_isolate::IsolateConfig;

    // Isolates and handles
    pub use moor_isolate::{
        EnterGuard, HandleScope, Isolate, Local, Locker, Persistent, Unlocker,
    };

    // Weak references
    pub use moor_isolate::{SweepReport, WeakCallbackInfo, WeakOutcome, WeakParam};
}
