//! Title and body canonicalization.

pub mod event_log;
pub mod markup;
pub mod rich;
pub mod title;

pub use event_log::{
    content_hash, normalize_event_log, EventLog, EventLogInput, EventLogVersion, LogSyncState,
    PartialEventLog,
};
pub use rich::{Block, Inline, Marks, RichDoc};
pub use title::{normalize_title, EventTitle, TitleInput, TitleParts};
