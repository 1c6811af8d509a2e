//! Link and tree commands for CLI.

use clap::Subcommand;
use serde_json::json;

use super::{open_store, print_json, CliResult};

#[derive(Subcommand)]
pub enum LinkAction {
    /// Link one event to another
    Add {
        /// Source event ID
        from: String,
        /// Target event ID
        to: String,
    },
    /// Remove a link
    Remove {
        /// Source event ID
        from: String,
        /// Target event ID
        to: String,
    },
    /// Recompute backlinks for one event, or for every event
    Rebuild {
        /// Event ID (default: all events)
        id: Option<String>,
    },
}

pub async fn run(action: LinkAction) -> CliResult {
    let store = open_store()?;

    match action {
        LinkAction::Add { from, to } => {
            let source = store.add_link(&from, &to).await?;
            print_json(&source)?;
        }
        LinkAction::Remove { from, to } => {
            let source = store.remove_link(&from, &to).await?;
            print_json(&source)?;
        }
        LinkAction::Rebuild { id: Some(id) } => {
            let event = store.rebuild_backlinks(&id).await?;
            print_json(&event)?;
        }
        LinkAction::Rebuild { id: None } => {
            let changed = store.rebuild_all_backlinks().await?;
            print_json(&json!({ "changed": changed }))?;
        }
    }
    Ok(())
}

/// Print the breadth-first tree below `id`.
pub async fn tree(id: &str) -> CliResult {
    let store = open_store()?;
    let nodes: Vec<_> = store
        .get_tree(id)
        .await?
        .into_iter()
        .map(|node| {
            json!({
                "depth": node.depth,
                "id": node.event.id,
                "title": node.event.title.plain,
                "parentEventId": node.event.parent_event_id,
            })
        })
        .collect();
    print_json(&nodes)
}
