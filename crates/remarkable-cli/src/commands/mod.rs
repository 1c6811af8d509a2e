pub mod config;
pub mod conflict;
pub mod event;
pub mod link;
pub mod sync;

use chrono::NaiveDateTime;
use remarkable_core::content::rich::parse_timestamp;
use remarkable_core::storage::get_or_create_device_id;
use remarkable_core::{Config, ContactRef, EventStore, SqlitePersistence, StoreSettings};
use serde::Serialize;
use std::sync::Arc;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the store over the SQLite database in the data directory.
pub fn open_store() -> Result<Arc<EventStore>, Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let persistence = Arc::new(SqlitePersistence::open()?);
    let store = EventStore::new(persistence)
        .with_settings(StoreSettings::from(&config))
        .with_sender_id(get_or_create_device_id()?);
    Ok(Arc::new(store))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a local timestamp: `YYYY-MM-DD HH:MM[:SS]` or RFC 3339.
pub fn parse_time(value: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(value)
        .or_else(|| NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M").ok())
        .ok_or_else(|| format!("invalid timestamp '{value}'"))
}

/// Split a comma-separated argument, dropping empty items.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn parse_attendees(value: &str) -> Vec<ContactRef> {
    split_list(value).into_iter().map(ContactRef::email).collect()
}
