//! Multi-calendar sync: modes, policy, outbound payloads, the remote
//! calendar capability and the reconciler that drives it.

pub mod mode;
pub mod payload;
pub mod policy;
pub mod reconciler;
pub mod remote;

pub use mode::{ActualSyncConfig, ActualSyncMode, PlanSyncConfig, SyncKind, SyncMode};
pub use payload::{prepare_outbound_payload, recover_participants, OutboundPayload, RecoveredParticipants};
pub use policy::{can_receive, can_send, remote_event_count};
pub use reconciler::{InboundOutcome, ReconcileReport, Reconciler};
pub use remote::{MemoryCalendar, RemoteCalendar, RemoteError, StoredRemoteEvent};
