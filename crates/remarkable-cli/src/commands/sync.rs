//! Sync policy inspection commands for CLI.

use clap::Subcommand;
use remarkable_core::sync::{prepare_outbound_payload, remote_event_count};
use remarkable_core::SyncKind;
use serde_json::json;

use super::{open_store, print_json, CliResult};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Number of remote copies the event's configs call for
    Count {
        /// Event ID
        id: String,
    },
    /// Show the body a remote calendar would receive
    Preview {
        /// Event ID
        id: String,
        /// Which occurrence: plan or actual
        #[arg(long, default_value = "plan")]
        kind: SyncKind,
    },
}

pub async fn run(action: SyncAction) -> CliResult {
    let store = open_store()?;

    match action {
        SyncAction::Count { id } => {
            let event = store
                .get_by_id(&id)
                .await?
                .ok_or_else(|| format!("event not found: {id}"))?;
            print_json(&json!({
                "eventId": event.id,
                "remoteEventCount": remote_event_count(&event),
            }))?;
        }
        SyncAction::Preview { id, kind } => {
            let event = store
                .get_by_id(&id)
                .await?
                .ok_or_else(|| format!("event not found: {id}"))?;
            let (mode, targets) = event
                .sync_target(kind)
                .ok_or_else(|| format!("event {id} has no {kind} sync config"))?;
            print_json(&json!({
                "mode": mode,
                "canSend": mode.can_send(),
                "targetCalendars": targets,
                "payload": prepare_outbound_payload(&event, mode),
            }))?;
        }
    }
    Ok(())
}
