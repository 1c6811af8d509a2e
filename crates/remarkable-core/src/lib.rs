//! # ReMarkable Core Library
//!
//! This library provides the event record model and the multi-calendar
//! sync engine behind ReMarkable. A standalone CLI binary exposes every
//! operation; any GUI is a thin layer over the same core.
//!
//! ## Architecture
//!
//! - **Normalization**: every write canonicalizes titles, bodies and ids so
//!   legacy and malformed input is repaired on first touch
//! - **Store**: validated CRUD, soft delete, parent/child and link graph
//!   maintenance, echo-suppressed cross-process broadcast
//! - **Sync**: per-event plan/actual policies fanned out to remote calendars
//!   by a reconciler that runs after the local write has committed
//! - **Conflicts**: overlap and attendee analysis over stored events
//!
//! ## Key Components
//!
//! - [`EventStore`]: the store facade
//! - [`Reconciler`]: remote calendar reconciliation
//! - [`ConflictDetector`]: scheduling conflict analysis
//! - [`Config`]: application configuration management

pub mod conflict;
pub mod contacts;
pub mod content;
pub mod error;
pub mod event;
pub mod ids;
pub mod storage;
pub mod store;
pub mod sync;

pub use conflict::{
    conflict_summary, format_conflict_message, ConflictCandidate, ConflictDetector, ConflictRecord,
    ConflictSummary, OverlapType, TimeSlot,
};
pub use contacts::{Contact, ContactLookup, ContactRef, MemoryContacts};
pub use content::{EventLog, EventTitle, RichDoc};
pub use error::{ConfigError, CoreError, RemoteSyncError, StorageError, ValidationError};
pub use event::{Event, EventDraft, EventPatch, SyncStatus};
pub use ids::IdKind;
pub use storage::{Config, SqlitePersistence};
pub use store::{
    ChangeKind, ChangeNotification, ChangeOrigin, EventPersistence, EventStore, InProcessBroadcast,
    MemoryPersistence, StoreSettings, WriteOptions,
};
pub use sync::{
    ActualSyncConfig, ActualSyncMode, MemoryCalendar, PlanSyncConfig, ReconcileReport, Reconciler,
    RemoteCalendar, SyncKind, SyncMode,
};
