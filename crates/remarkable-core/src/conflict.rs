//! Read-only scheduling analysis: time overlaps, per-attendee conflicts and
//! free-slot suggestions.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::contacts::{ContactLookup, ContactRef};
use crate::error::Result;
use crate::event::Event;
use crate::storage::ConflictsConfig;
use crate::store::EventStore;

/// How two intervals overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapType {
    /// One interval contains the other
    Full,
    Partial,
}

/// Proposed time range to check.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictCandidate {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub attendees: Vec<ContactRef>,
}

impl ConflictCandidate {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            attendees: Vec::new(),
        }
    }

    /// `None` for events without both time bounds.
    pub fn from_event(event: &Event) -> Option<Self> {
        let (start, end) = event.time_range()?;
        Some(Self {
            start,
            end,
            attendees: event.attendees.clone(),
        })
    }
}

/// One existing event colliding with a candidate. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub conflicting_event: Event,
    /// Candidate attendees also on the conflicting event
    pub conflicting_attendees: Vec<ContactRef>,
    pub overlap_type: OverlapType,
    pub overlap_start: NaiveDateTime,
    pub overlap_end: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Counts by overlap type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConflictSummary {
    pub total: usize,
    pub full: usize,
    pub partial: usize,
}

impl fmt::Display for ConflictSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            return f.write_str("No conflicts");
        }
        write!(
            f,
            "{} conflict{} ({} full, {} partial)",
            self.total,
            if self.total == 1 { "" } else { "s" },
            self.full,
            self.partial
        )
    }
}

/// Conflict analysis over the store's active events.
pub struct ConflictDetector {
    store: Arc<EventStore>,
    contacts: Option<Arc<dyn ContactLookup>>,
    config: ConflictsConfig,
}

impl fmt::Debug for ConflictDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictDetector")
            .field("config", &self.config)
            .field("contacts", &self.contacts.is_some())
            .finish_non_exhaustive()
    }
}

impl ConflictDetector {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self {
            store,
            contacts: None,
            config: ConflictsConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ConflictsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_contacts(mut self, contacts: Arc<dyn ContactLookup>) -> Self {
        self.contacts = Some(contacts);
        self
    }

    /// Every active timed event overlapping `candidate`, except `exclude_id`.
    pub async fn detect_conflicts(
        &self,
        candidate: &ConflictCandidate,
        exclude_id: Option<&str>,
    ) -> Result<Vec<ConflictRecord>> {
        let events = self.candidates(candidate.start, candidate.end).await?;
        Ok(events
            .into_iter()
            .filter(|e| Some(e.id.as_str()) != exclude_id)
            .filter_map(|existing| {
                let record = overlap_record(candidate.start, candidate.end, existing)?;
                let shared = shared_attendees(&candidate.attendees, &record.conflicting_event.attendees);
                Some(ConflictRecord {
                    conflicting_attendees: shared,
                    ..record
                })
            })
            .collect())
    }

    /// Per attendee email (lowercased), the overlapping events where that
    /// attendee is organizer or invitee. Attendees without conflicts are
    /// absent from the map.
    pub async fn detect_attendee_conflicts(
        &self,
        attendees: &[ContactRef],
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_id: Option<&str>,
    ) -> Result<BTreeMap<String, Vec<ConflictRecord>>> {
        let events = self.candidates(start, end).await?;
        Ok(attendee_conflicts(&events, attendees, start, end, exclude_id))
    }

    /// First slot of `duration_minutes` inside working hours on
    /// `preferred_date` (today when `None`) where no attendee is busy.
    /// Slots must end by the end of the working day. Only the one date is
    /// searched.
    pub async fn suggest_alternative_slot(
        &self,
        duration_minutes: u32,
        attendees: &[ContactRef],
        preferred_date: Option<NaiveDate>,
    ) -> Result<Option<TimeSlot>> {
        let date = preferred_date.unwrap_or_else(|| Local::now().date_naive());
        let (Some(day_start), Some(day_end)) = (
            work_time(date, self.config.work_day_start_hour),
            work_time(date, self.config.work_day_end_hour),
        ) else {
            return Ok(None);
        };
        let events = self.candidates(day_start, day_end).await?;
        let step = Duration::minutes(i64::from(self.config.slot_step_minutes.max(1)));
        let length = Duration::minutes(i64::from(duration_minutes));

        let mut start = day_start;
        while start < day_end {
            let end = start + length;
            if end <= day_end && attendee_conflicts(&events, attendees, start, end, None).is_empty() {
                debug!(target: "remarkable::conflicts", %start, %end, "suggested slot");
                return Ok(Some(TimeSlot { start, end }));
            }
            start += step;
        }
        Ok(None)
    }

    /// Replace each reference with the matching contact record when the
    /// lookup knows it (by id first, then email). Unknown references pass
    /// through unchanged.
    pub async fn resolve_attendees(&self, attendees: &[ContactRef]) -> Result<Vec<ContactRef>> {
        let Some(contacts) = &self.contacts else {
            return Ok(attendees.to_vec());
        };
        let mut resolved = Vec::with_capacity(attendees.len());
        for attendee in attendees {
            let mut found = None;
            if let Some(id) = &attendee.id {
                found = contacts.get_by_id(id).await?;
            }
            if found.is_none() {
                if let Some(email) = attendee.email_key() {
                    found = contacts.get_by_email(&email).await?;
                }
            }
            resolved.push(found.as_ref().map_or_else(|| attendee.clone(), ContactRef::from));
        }
        Ok(resolved)
    }

    async fn candidates(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<Event>> {
        Ok(self
            .store
            .query_by_range(start, end)
            .await?
            .into_iter()
            .filter(|e| !e.is_subordinate() && e.time_range().is_some())
            .collect())
    }
}

/// Human-readable description of one conflict.
pub fn format_conflict_message(conflict: &ConflictRecord) -> String {
    let time = |t: &NaiveDateTime| t.format("%m-%d %H:%M").to_string();
    let mut message = format!(
        "Conflicts with \"{}\"\nTime: {} - {}\nType: {}",
        conflict.conflicting_event.title.plain,
        time(&conflict.overlap_start),
        time(&conflict.overlap_end),
        match conflict.overlap_type {
            OverlapType::Full => "full overlap",
            OverlapType::Partial => "partial overlap",
        }
    );
    let names: Vec<&str> = conflict
        .conflicting_attendees
        .iter()
        .filter_map(|a| a.name.as_deref().or(a.email.as_deref()))
        .collect();
    if !names.is_empty() {
        message.push_str("\nAttendees: ");
        message.push_str(&names.join(", "));
    }
    message
}

pub fn conflict_summary(conflicts: &[ConflictRecord]) -> ConflictSummary {
    let full = conflicts
        .iter()
        .filter(|c| c.overlap_type == OverlapType::Full)
        .count();
    ConflictSummary {
        total: conflicts.len(),
        full,
        partial: conflicts.len() - full,
    }
}

/// Half-open intersection of `[s1, e1)` and `[s2, e2)`.
fn time_overlap(
    s1: NaiveDateTime,
    e1: NaiveDateTime,
    s2: NaiveDateTime,
    e2: NaiveDateTime,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = s1.max(s2);
    let end = e1.min(e2);
    (start < end).then_some((start, end))
}

fn overlap_type(s1: NaiveDateTime, e1: NaiveDateTime, s2: NaiveDateTime, e2: NaiveDateTime) -> OverlapType {
    if (s1 <= s2 && e1 >= e2) || (s2 <= s1 && e2 >= e1) {
        OverlapType::Full
    } else {
        OverlapType::Partial
    }
}

fn overlap_record(start: NaiveDateTime, end: NaiveDateTime, existing: Event) -> Option<ConflictRecord> {
    let (other_start, other_end) = existing.time_range()?;
    let (overlap_start, overlap_end) = time_overlap(start, end, other_start, other_end)?;
    Some(ConflictRecord {
        overlap_type: overlap_type(start, end, other_start, other_end),
        conflicting_event: existing,
        conflicting_attendees: Vec::new(),
        overlap_start,
        overlap_end,
    })
}

fn shared_attendees(ours: &[ContactRef], theirs: &[ContactRef]) -> Vec<ContactRef> {
    ours.iter()
        .filter(|a| theirs.iter().any(|b| a.same_person(b)))
        .cloned()
        .collect()
}

fn attendee_conflicts(
    events: &[Event],
    attendees: &[ContactRef],
    start: NaiveDateTime,
    end: NaiveDateTime,
    exclude_id: Option<&str>,
) -> BTreeMap<String, Vec<ConflictRecord>> {
    let mut by_email: BTreeMap<String, Vec<ConflictRecord>> = BTreeMap::new();
    for attendee in attendees {
        let Some(email) = attendee.email_key() else {
            continue;
        };
        let busy = events
            .iter()
            .filter(|e| Some(e.id.as_str()) != exclude_id)
            .filter(|e| {
                e.attendees.iter().any(|a| a.same_person(attendee))
                    || e.organizer.as_ref().is_some_and(|o| o.same_person(attendee))
            })
            .filter_map(|e| {
                let record = overlap_record(start, end, e.clone())?;
                Some(ConflictRecord {
                    conflicting_attendees: vec![attendee.clone()],
                    ..record
                })
            });
        by_email.entry(email.clone()).or_default().extend(busy);
        if by_email.get(&email).is_some_and(Vec::is_empty) {
            by_email.remove(&email);
        }
    }
    by_email
}

fn work_time(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    if hour == 24 {
        return date.succ_opt().map(|d| d.and_time(NaiveTime::MIN));
    }
    date.and_hms_opt(hour, 0, 0)
}
