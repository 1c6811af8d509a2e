//! Typed, offline-safe identifiers.
//!
//! Ids look like `event_V1StGXR8_Z5jdHi6B-myT`: a type prefix, an underscore,
//! and a 21-character payload drawn from a 64-symbol URL-safe alphabet using the
//! operating system's CSPRNG. 126 bits of entropy per id means independent
//! writers never need to coordinate before assigning one.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the random payload after the prefix separator.
pub const PAYLOAD_LEN: usize = 21;

const ALPHABET: &[u8; 64] = b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";

/// Entity kinds that receive generated ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Event,
    Tag,
    Contact,
    Attachment,
    User,
}

impl IdKind {
    pub const ALL: [IdKind; 5] = [
        IdKind::Event,
        IdKind::Tag,
        IdKind::Contact,
        IdKind::Attachment,
        IdKind::User,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            IdKind::Event => "event",
            IdKind::Tag => "tag",
            IdKind::Contact => "contact",
            IdKind::Attachment => "attachment",
            IdKind::User => "user",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Mint a fresh id for `kind`.
pub fn generate(kind: IdKind) -> String {
    let mut rng = OsRng;
    let mut id = String::with_capacity(kind.prefix().len() + 1 + PAYLOAD_LEN);
    id.push_str(kind.prefix());
    id.push('_');
    for _ in 0..PAYLOAD_LEN {
        id.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
    }
    id
}

/// Shorthand for `generate(IdKind::Event)`.
pub fn generate_event_id() -> String {
    generate(IdKind::Event)
}

/// Check an id's prefix and payload. With `kind` set, the prefix must match it.
pub fn validate(id: &str, kind: Option<IdKind>) -> bool {
    parse_kind(id).is_some_and(|found| kind.map_or(true, |expected| expected == found))
}

/// Return the kind encoded in a well-formed id.
pub fn parse_kind(id: &str) -> Option<IdKind> {
    let (prefix, payload) = id.split_once('_')?;
    let kind = IdKind::from_prefix(prefix)?;
    let well_formed =
        payload.len() == PAYLOAD_LEN && payload.bytes().all(|b| ALPHABET.contains(&b));
    well_formed.then_some(kind)
}

/// Return `candidate` when it is a valid id of `kind`, otherwise a fresh one.
///
/// The second element is true when a replacement happened so the caller can
/// record the data-quality event.
pub fn ensure_valid(candidate: Option<&str>, kind: IdKind) -> (String, bool) {
    match candidate {
        Some(id) if validate(id, Some(kind)) => (id.to_string(), false),
        _ => (generate(kind), true),
    }
}
