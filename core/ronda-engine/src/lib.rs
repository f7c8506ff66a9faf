//! # ronda-engine
//!
//! Patrol round engine for the Vigia monitoring dashboard, providing the
//! round lifecycle, slot reminders, channel ledger, and historical status
//! resolution shared by all clients.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Clients can wrap with
//!   async if needed; timers run on plain threads and only talk outward
//!   through channels.
//! - **Single-writer**: One [`RoundSession`] per operator terminal; clients
//!   provide their own synchronization (`Mutex`, `RwLock`) if they share it.
//! - **Graceful degradation**: Missing or corrupt store files load as empty
//!   stores; failed writes and missing history sources are degraded-mode
//!   signals, not hard failures.
//! - **No singletons**: Every session, store, and resolver is an explicit
//!   value owned by the caller.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ronda_engine::{EngineConfig, RoundSession, RoundStore, IndexStore, SubjectCatalog};
//!
//! let (sink, slot_due) = std::sync::mpsc::channel();
//! let mut session = RoundSession::new(
//!     EngineConfig::default(),
//!     SubjectCatalog::from_names(catalog_names),
//!     sink,
//!     RoundStore::load(&storage.rounds_file()),
//!     IndexStore::load(&storage.index_file()),
//! );
//! session.set_operator("gomez")?;
//! session.add_work_item("Banco Central")?;
//! session.start()?;
//! ```

// Public modules
pub mod catalog;
pub mod config;
pub mod elapsed;
pub mod error;
pub mod ledger;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod store;
pub mod validate;

// Re-export commonly used items at crate root
pub use catalog::SubjectCatalog;
pub use config::{load_engine_config, save_engine_config, EngineConfig};
pub use error::{EngineError, PersistTarget, Result};
pub use resolver::{HistoricalIndexResolver, ResolverUpdate, SourceReadiness, SourceState};
pub use scheduler::{plan, SlotPlan, SlotScheduler};
pub use session::{FinalizeOutcome, RoundSession};
pub use storage::StorageConfig;
pub use store::{IndexStore, RoundStore};
pub use validate::{validate, Issue};
