//! Isolates, handle scopes, persistent handles and thread entry.
//!
//! An [`Isolate`] owns all handle storage for one engine instance:
//!
//! ```text
//!   Isolate ─┬─ heap mutex ─┬─ ScopeStack (thread A) ── SlabAllocator (locals)
//!            │              ├─ ScopeStack (thread B) ── SlabAllocator (locals)
//!            │              └─ PersistentStore ──────── SlabAllocator + weak table
//!            ├─ IsolateThreadRegistry (entered threads, entry counts)
//!            └─ lock (Locker / Unlocker)
//! ```
//!
//! Threads [`enter`](Isolate::enter) the isolate, open [`HandleScope`]s
//! and create [`Local`] handles inside them. [`Persistent`] handles
//! survive scopes and may be made weak; the engine collector runs
//! [`Isolate::collect_weak`] to process weak handles whose objects have no
//! strong referrers left.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod handle;
pub mod isolate;
pub mod locker;
pub mod persistent;
pub mod registry;
pub mod scope;

pub use config::{ConfigError, IsolateConfig, RootObserver};
pub use handle::{EnterGuard, HandleScope, Local, Persistent};
pub use isolate::{Isolate, IsolateStats, RootEvent, RootKind};
pub use locker::{Locker, Unlocker};
pub use persistent::{
    PersistentStore, SweepReport, WeakCallback, WeakCallbackInfo, WeakOutcome, WeakParam,
};
pub use registry::{ExitOutcome, IsolateThreadRegistry, ThreadEntry};
pub use scope::{Escaped, RootTransition, ScopeStack};
