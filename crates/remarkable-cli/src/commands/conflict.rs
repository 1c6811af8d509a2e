//! Conflict analysis commands for CLI.

use chrono::{NaiveDate, NaiveDateTime};
use clap::Subcommand;
use remarkable_core::{
    conflict_summary, format_conflict_message, Config, ConflictCandidate, ConflictDetector,
};
use serde_json::json;

use super::{open_store, parse_attendees, parse_time, print_json, CliResult};

#[derive(Subcommand)]
pub enum ConflictAction {
    /// List stored events overlapping a proposed time range
    Check {
        #[arg(long, value_parser = parse_time)]
        start: NaiveDateTime,
        #[arg(long, value_parser = parse_time)]
        end: NaiveDateTime,
        /// Comma-separated attendee emails
        #[arg(long)]
        attendees: Option<String>,
        /// Event ID to leave out (the event being edited)
        #[arg(long)]
        exclude: Option<String>,
    },
    /// Busy attendees within a time range
    Attendees {
        /// Comma-separated attendee emails
        attendees: String,
        #[arg(long, value_parser = parse_time)]
        start: NaiveDateTime,
        #[arg(long, value_parser = parse_time)]
        end: NaiveDateTime,
        #[arg(long)]
        exclude: Option<String>,
    },
    /// Suggest the first free slot within working hours
    Suggest {
        /// Slot length in minutes
        #[arg(long)]
        duration: u32,
        /// Comma-separated attendee emails
        #[arg(long)]
        attendees: Option<String>,
        /// Day to search (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

pub async fn run(action: ConflictAction) -> CliResult {
    let config = Config::load_or_default();
    let detector = ConflictDetector::new(open_store()?).with_config(config.conflicts);

    match action {
        ConflictAction::Check {
            start,
            end,
            attendees,
            exclude,
        } => {
            let candidate = ConflictCandidate {
                attendees: attendees.as_deref().map(parse_attendees).unwrap_or_default(),
                ..ConflictCandidate::new(start, end)
            };
            let conflicts = detector.detect_conflicts(&candidate, exclude.as_deref()).await?;
            let summary = conflict_summary(&conflicts);
            let entries: Vec<_> = conflicts
                .iter()
                .map(|c| {
                    json!({
                        "eventId": c.conflicting_event.id,
                        "overlapType": c.overlap_type,
                        "overlapStart": c.overlap_start,
                        "overlapEnd": c.overlap_end,
                        "conflictingAttendees": c.conflicting_attendees,
                        "message": format_conflict_message(c),
                    })
                })
                .collect();
            print_json(&json!({
                "summary": summary,
                "message": summary.to_string(),
                "conflicts": entries,
            }))?;
        }
        ConflictAction::Attendees {
            attendees,
            start,
            end,
            exclude,
        } => {
            let attendees = parse_attendees(&attendees);
            let busy = detector
                .detect_attendee_conflicts(&attendees, start, end, exclude.as_deref())
                .await?;
            let busy: serde_json::Map<_, _> = busy
                .into_iter()
                .map(|(email, records)| {
                    let ids: Vec<_> = records.into_iter().map(|r| r.conflicting_event.id).collect();
                    (email, json!(ids))
                })
                .collect();
            print_json(&busy)?;
        }
        ConflictAction::Suggest {
            duration,
            attendees,
            date,
        } => {
            let attendees = attendees.as_deref().map(parse_attendees).unwrap_or_default();
            let slot = detector
                .suggest_alternative_slot(duration, &attendees, date)
                .await?;
            print_json(&slot)?;
        }
    }
    Ok(())
}
