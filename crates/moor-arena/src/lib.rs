//! Slab-based bump allocation of reference slots.
//!
//! Stores owning references to engine [`Object`](moor_core::Object)s in
//! fixed-size slabs that are appended on demand and truncated from the end.
//! Occupied slots never move, so a [`SlotAddr`](moor_core::SlotAddr) stays
//! valid until the slot is deleted.
//!
//! # Architecture
//!
//! ```text
//! SlabAllocator
//! ├── Slab[0]  (full)      [obj][obj][obj]...[obj]
//! ├── Slab[1]  (full)      [obj][obj][obj]...[obj]
//! └── Slab[n]  (last)      [obj][obj][----free----]
//!                                     ^ frontier.next_free   ^ frontier.limit
//! ```
//!
//! # Reference accounting
//!
//! - **add:** one retain per inserted object.
//! - **adopt:** takes over an already-counted reference (no retain).
//! - **delete:** the single place that releases; every removed slot drops
//!   the reference with the kind (strong or weak) it was held as.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod frontier;
pub mod slab;

// Public re-exports for the primary API surface.
pub use allocator::SlabAllocator;
pub use config::ArenaConfig;
pub use error::ArenaError;
pub use frontier::{AddResult, Checkpoint, Frontier};
pub use slab::{Slab, Slot};
