//! Event management commands for CLI.

use chrono::NaiveDateTime;
use clap::Subcommand;
use remarkable_core::{
    ActualSyncConfig, ActualSyncMode, Config, EventDraft, EventPatch, PlanSyncConfig, SyncMode,
    WriteOptions,
};

use super::{open_store, parse_attendees, parse_time, print_json, split_list, CliResult};

#[derive(Subcommand)]
pub enum EventAction {
    /// Create a new event
    Create {
        /// Event title, stored as given
        title: String,
        /// Start time (YYYY-MM-DD HH:MM)
        #[arg(long, value_parser = parse_time)]
        start: Option<NaiveDateTime>,
        /// End time (YYYY-MM-DD HH:MM)
        #[arg(long, value_parser = parse_time)]
        end: Option<NaiveDateTime>,
        /// Create as a task (start and end become optional)
        #[arg(long)]
        task: bool,
        /// Plain-text body
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
        /// Parent event ID
        #[arg(long)]
        parent: Option<String>,
        /// Comma-separated attendee emails
        #[arg(long)]
        attendees: Option<String>,
        /// Plan sync mode (receive-only, send-only, send-only-private, bidirectional, bidirectional-private)
        #[arg(long)]
        plan_mode: Option<String>,
        /// Comma-separated plan target calendars
        #[arg(long)]
        plan_calendars: Option<String>,
        /// Actual sync mode (any mode except receive-only)
        #[arg(long)]
        actual_mode: Option<String>,
        /// Comma-separated actual target calendars
        #[arg(long)]
        actual_calendars: Option<String>,
        /// Persist without requesting remote reconciliation
        #[arg(long)]
        skip_sync: bool,
    },
    /// Import events from a JSON array of drafts
    Import {
        /// Path to a JSON file
        path: String,
        #[arg(long)]
        skip_sync: bool,
    },
    /// Update an event
    Update {
        /// Event ID
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_parser = parse_time)]
        start: Option<NaiveDateTime>,
        #[arg(long, value_parser = parse_time)]
        end: Option<NaiveDateTime>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// Comma-separated tags (replaces the current list)
        #[arg(long)]
        tags: Option<String>,
        /// New parent event ID
        #[arg(long)]
        parent: Option<String>,
        /// Detach from the current parent
        #[arg(long, conflicts_with = "parent")]
        no_parent: bool,
        /// Set completed status
        #[arg(long)]
        completed: Option<bool>,
        /// Raw JSON patch merged before the flags above
        #[arg(long)]
        patch: Option<String>,
        #[arg(long)]
        skip_sync: bool,
    },
    /// Show an event
    Show {
        /// Event ID
        id: String,
    },
    /// List events, optionally within a time range
    List {
        #[arg(long, value_parser = parse_time, requires = "to")]
        from: Option<NaiveDateTime>,
        #[arg(long, value_parser = parse_time, requires = "from")]
        to: Option<NaiveDateTime>,
        /// Include soft-deleted events
        #[arg(long, conflicts_with = "from")]
        include_deleted: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Soft-delete an event
    Delete {
        /// Event ID
        id: String,
    },
    /// Restore a soft-deleted event
    Restore {
        /// Event ID
        id: String,
    },
    /// Permanently remove events
    Purge {
        /// Purge a single event instead of everything past the retention window
        id: Option<String>,
        /// Purge a live event too
        #[arg(long, requires = "id")]
        force: bool,
        /// Retention window in days (default: store.purge_after_days)
        #[arg(long, conflicts_with = "id")]
        days: Option<u32>,
    },
    /// Check an event in
    Checkin {
        /// Event ID
        id: String,
    },
    /// Uncheck an event
    Uncheck {
        /// Event ID
        id: String,
    },
}

pub async fn run(action: EventAction) -> CliResult {
    let store = open_store()?;

    match action {
        EventAction::Create {
            title,
            start,
            end,
            task,
            description,
            location,
            tags,
            parent,
            attendees,
            plan_mode,
            plan_calendars,
            actual_mode,
            actual_calendars,
            skip_sync,
        } => {
            let plan_sync_config = match plan_mode {
                Some(mode) => Some(PlanSyncConfig {
                    mode: mode.parse::<SyncMode>()?,
                    target_calendars: plan_calendars.as_deref().map(split_list).unwrap_or_default(),
                }),
                None => None,
            };
            let actual_sync_config = match actual_mode {
                Some(mode) => Some(ActualSyncConfig {
                    mode: mode.parse::<ActualSyncMode>()?,
                    target_calendars: actual_calendars
                        .as_deref()
                        .map(split_list)
                        .unwrap_or_default(),
                }),
                None => None,
            };

            let draft = EventDraft {
                title: Some(title.into()),
                start_time: start,
                end_time: end,
                is_task: task.then_some(true),
                description,
                location,
                tags: tags.as_deref().map(split_list),
                parent_event_id: parent,
                attendees: attendees.as_deref().map(parse_attendees),
                plan_sync_config,
                actual_sync_config,
                ..EventDraft::default()
            };
            let event = store.create(draft, WriteOptions { skip_sync }).await?;
            print_json(&event)?;
        }
        EventAction::Import { path, skip_sync } => {
            let raw = std::fs::read_to_string(&path)?;
            let drafts: Vec<EventDraft> = serde_json::from_str(&raw)?;
            let report = store.batch_create(drafts, WriteOptions { skip_sync }).await;
            print_json(&report)?;
        }
        EventAction::Update {
            id,
            title,
            start,
            end,
            description,
            location,
            tags,
            parent,
            no_parent,
            completed,
            patch,
            skip_sync,
        } => {
            let mut patch: EventPatch = match patch {
                Some(raw) => serde_json::from_str(&raw)?,
                None => EventPatch::default(),
            };
            if let Some(title) = title {
                patch.title = Some(title.into());
            }
            if let Some(start) = start {
                patch.start_time = Some(Some(start));
            }
            if let Some(end) = end {
                patch.end_time = Some(Some(end));
            }
            if description.is_some() {
                patch.event_log = None;
                patch.description = description;
            }
            if let Some(location) = location {
                patch.location = Some(Some(location));
            }
            if let Some(tags) = tags {
                patch.tags = Some(split_list(&tags));
            }
            if parent.is_some() {
                patch.parent_event_id = Some(parent);
            } else if no_parent {
                patch.parent_event_id = Some(None);
            }
            if completed.is_some() {
                patch.is_completed = completed;
            }

            let event = store.update(&id, patch, WriteOptions { skip_sync }).await?;
            print_json(&event)?;
        }
        EventAction::Show { id } => match store.get_by_id(&id).await? {
            Some(event) => print_json(&event)?,
            None => return Err(format!("event not found: {id}").into()),
        },
        EventAction::List {
            from,
            to,
            include_deleted,
            limit,
        } => {
            let events = match (from, to) {
                (Some(from), Some(to)) => {
                    let mut events = store.query_by_range(from, to).await?;
                    if let Some(limit) = limit {
                        events.truncate(limit);
                    }
                    events
                }
                _ => store.list(include_deleted, limit).await?,
            };
            print_json(&events)?;
        }
        EventAction::Delete { id } => {
            let event = store.delete(&id).await?;
            print_json(&event)?;
        }
        EventAction::Restore { id } => {
            let event = store.restore(&id).await?;
            print_json(&event)?;
        }
        EventAction::Purge { id, force, days } => match id {
            Some(id) => {
                store.hard_delete(&id, force).await?;
                print_json(&serde_json::json!({ "purged": [id] }))?;
            }
            None => {
                let days = days.unwrap_or_else(|| Config::load_or_default().store.purge_after_days);
                let report = store.purge_older_than(days, None).await?;
                print_json(&report)?;
            }
        },
        EventAction::Checkin { id } => {
            let event = store.check_in(&id).await?;
            print_json(&event)?;
        }
        EventAction::Uncheck { id } => {
            let event = store.uncheck(&id).await?;
            print_json(&event)?;
        }
    }
    Ok(())
}
