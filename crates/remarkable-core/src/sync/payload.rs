//! Remote-facing event bodies and private-mode attendee redaction.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::mode::SyncMode;
use crate::contacts::ContactRef;
use crate::event::Event;

const PARTICIPANTS_PREFIX: &str = "Participants: ";

/// What a remote calendar receives for one copy of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundPayload {
    pub source_event_id: String,
    pub title: String,
    pub description: String,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub is_all_day: bool,
    pub location: Option<String>,
    pub organizer: Option<String>,
    /// Invitee emails; always empty under private modes
    pub attendees: Vec<String>,
}

/// Description with any leading participants line split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredParticipants {
    pub attendees: Vec<ContactRef>,
    pub description: String,
}

/// Build the remote body for `event` under `mode`.
///
/// Private modes keep attendees off the invitee list and fold them into a
/// leading `Participants: ...` line of the description instead.
pub fn prepare_outbound_payload(event: &Event, mode: SyncMode) -> OutboundPayload {
    let participants: Vec<String> = event.attendees.iter().filter_map(participant_label).collect();
    let body = event.event_log.plain_text.clone();

    let (description, attendees) = if mode.is_private() {
        let description = if participants.is_empty() {
            body
        } else {
            format!("{PARTICIPANTS_PREFIX}{}\n\n{body}", participants.join(", "))
        };
        (description, Vec::new())
    } else {
        let invitees = event
            .attendees
            .iter()
            .filter_map(|a| a.email.clone())
            .collect();
        (body, invitees)
    };

    OutboundPayload {
        source_event_id: event.id.clone(),
        title: event.title.plain.clone(),
        description,
        start_time: event.start_time,
        end_time: event.end_time,
        is_all_day: event.is_all_day,
        location: event.location.clone(),
        organizer: event.organizer.as_ref().and_then(|o| o.email.clone()),
        attendees,
    }
}

/// Inverse of the private-mode redaction: split a leading participants line
/// from free-form description text.
pub fn recover_participants(description: &str) -> RecoveredParticipants {
    let Some(rest) = description.strip_prefix(PARTICIPANTS_PREFIX) else {
        return RecoveredParticipants {
            attendees: Vec::new(),
            description: description.to_string(),
        };
    };

    let (line, remainder) = rest.split_once('\n').unwrap_or((rest, ""));
    let remainder = remainder.strip_prefix('\n').unwrap_or(remainder);

    let attendees = line
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            if p.contains('@') {
                ContactRef::email(p)
            } else {
                ContactRef {
                    name: Some(p.to_string()),
                    ..ContactRef::default()
                }
            }
        })
        .collect();

    RecoveredParticipants {
        attendees,
        description: remainder.to_string(),
    }
}

fn participant_label(contact: &ContactRef) -> Option<String> {
    contact
        .email
        .clone()
        .or_else(|| contact.name.clone())
        .filter(|label| !label.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{normalize_event, EventDraft};
    use chrono::Utc;

    fn event_with(attendees: &[&str], description: &str) -> Event {
        let draft = EventDraft {
            attendees: Some(attendees.iter().map(|a| ContactRef::email(*a)).collect()),
            description: Some(description.to_string()),
            ..EventDraft::task("1:1")
        };
        normalize_event(draft, None, Utc::now())
    }

    #[test]
    fn test_public_modes_pass_attendees_through() {
        let event = event_with(&["a@x.com", "b@y.com"], "agenda");
        let payload = prepare_outbound_payload(&event, SyncMode::Bidirectional);
        assert_eq!(payload.attendees, vec!["a@x.com", "b@y.com"]);
        assert_eq!(payload.description, "agenda");
    }

    #[test]
    fn test_private_modes_redact_into_description() {
        let event = event_with(&["a@x.com", "b@y.com"], "agenda\nsecond line");
        for mode in [SyncMode::SendOnlyPrivate, SyncMode::BidirectionalPrivate] {
            let payload = prepare_outbound_payload(&event, mode);
            assert!(payload.attendees.is_empty());
            assert!(payload
                .description
                .starts_with("Participants: a@x.com, b@y.com"));

            let recovered = recover_participants(&payload.description);
            let emails: Vec<_> = recovered
                .attendees
                .iter()
                .filter_map(|a| a.email.clone())
                .collect();
            assert_eq!(emails, vec!["a@x.com", "b@y.com"]);
            assert_eq!(recovered.description, "agenda\nsecond line");
        }
    }

    #[test]
    fn test_private_mode_with_empty_body() {
        let event = event_with(&["a@x.com"], "");
        let payload = prepare_outbound_payload(&event, SyncMode::SendOnlyPrivate);
        let recovered = recover_participants(&payload.description);
        assert_eq!(recovered.attendees.len(), 1);
        assert_eq!(recovered.description, "");
    }

    #[test]
    fn test_recover_leaves_plain_descriptions_alone() {
        let recovered = recover_participants("Notes about participants: none");
        assert!(recovered.attendees.is_empty());
        assert_eq!(recovered.description, "Notes about participants: none");
    }
}
