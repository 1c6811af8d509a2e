//! Contact references carried on events, and the lookup capability used to
//! resolve them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Reference to a contact identity. Events never own contact records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ContactRef {
    pub fn email(email: impl Into<String>) -> Self {
        ContactRef {
            email: Some(email.into()),
            ..ContactRef::default()
        }
    }

    /// Lowercased email, used for all attendee comparisons.
    pub fn email_key(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
    }

    pub fn same_person(&self, other: &ContactRef) -> bool {
        match (self.email_key(), other.email_key()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// A resolved contact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
}

impl From<&Contact> for ContactRef {
    fn from(contact: &Contact) -> Self {
        ContactRef {
            id: Some(contact.id.clone()),
            email: contact.email.clone(),
            name: contact.name.clone(),
        }
    }
}

/// Contact book lookup supplied by the host.
#[async_trait]
pub trait ContactLookup: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Contact>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<Contact>>;
}

/// Fixed in-memory contact book.
#[derive(Debug, Clone, Default)]
pub struct MemoryContacts {
    by_id: HashMap<String, Contact>,
}

impl MemoryContacts {
    pub fn new(contacts: impl IntoIterator<Item = Contact>) -> Self {
        Self {
            by_id: contacts.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }
}

#[async_trait]
impl ContactLookup for MemoryContacts {
    async fn get_by_id(&self, id: &str) -> Result<Option<Contact>> {
        Ok(self.by_id.get(id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Contact>> {
        let wanted = email.trim().to_lowercase();
        Ok(self
            .by_id
            .values()
            .find(|c| c.email.as_deref().map(str::to_lowercase).as_deref() == Some(wanted.as_str()))
            .cloned())
    }
}
