//! Sync direction modes and per-kind configurations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Direction policy between a local event and its remote copies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Remote changes flow in; nothing is pushed
    ReceiveOnly,
    /// Pushed with attendees as invitees; remote edits ignored
    SendOnly,
    /// Pushed with attendees folded into the description
    SendOnlyPrivate,
    Bidirectional,
    BidirectionalPrivate,
}

impl SyncMode {
    pub const ALL: [SyncMode; 5] = [
        SyncMode::ReceiveOnly,
        SyncMode::SendOnly,
        SyncMode::SendOnlyPrivate,
        SyncMode::Bidirectional,
        SyncMode::BidirectionalPrivate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::ReceiveOnly => "receive-only",
            SyncMode::SendOnly => "send-only",
            SyncMode::SendOnlyPrivate => "send-only-private",
            SyncMode::Bidirectional => "bidirectional",
            SyncMode::BidirectionalPrivate => "bidirectional-private",
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, SyncMode::SendOnlyPrivate | SyncMode::BidirectionalPrivate)
    }

    pub fn can_send(&self) -> bool {
        !matches!(self, SyncMode::ReceiveOnly)
    }

    pub fn can_receive(&self) -> bool {
        matches!(
            self,
            SyncMode::ReceiveOnly | SyncMode::Bidirectional | SyncMode::BidirectionalPrivate
        )
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "mode".into(),
                message: format!("unknown sync mode '{s}'"),
            })
    }
}

/// Modes allowed for the actual-occurrence config: anything that sends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ActualSyncMode {
    SendOnly,
    SendOnlyPrivate,
    Bidirectional,
    BidirectionalPrivate,
}

impl From<ActualSyncMode> for SyncMode {
    fn from(mode: ActualSyncMode) -> Self {
        match mode {
            ActualSyncMode::SendOnly => SyncMode::SendOnly,
            ActualSyncMode::SendOnlyPrivate => SyncMode::SendOnlyPrivate,
            ActualSyncMode::Bidirectional => SyncMode::Bidirectional,
            ActualSyncMode::BidirectionalPrivate => SyncMode::BidirectionalPrivate,
        }
    }
}

impl TryFrom<SyncMode> for ActualSyncMode {
    type Error = ValidationError;

    fn try_from(mode: SyncMode) -> Result<Self, Self::Error> {
        match mode {
            SyncMode::ReceiveOnly => Err(ValidationError::InvalidValue {
                field: "actualSyncConfig.mode".into(),
                message: "receive-only is not allowed for actual occurrences".into(),
            }),
            SyncMode::SendOnly => Ok(ActualSyncMode::SendOnly),
            SyncMode::SendOnlyPrivate => Ok(ActualSyncMode::SendOnlyPrivate),
            SyncMode::Bidirectional => Ok(ActualSyncMode::Bidirectional),
            SyncMode::BidirectionalPrivate => Ok(ActualSyncMode::BidirectionalPrivate),
        }
    }
}

impl FromStr for ActualSyncMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncMode::from_str(s)?.try_into()
    }
}

/// Sync policy for the planned occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanSyncConfig {
    pub mode: SyncMode,
    #[serde(default)]
    pub target_calendars: Vec<String>,
}

/// Sync policy for the actual (logged) occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActualSyncConfig {
    pub mode: ActualSyncMode,
    #[serde(default)]
    pub target_calendars: Vec<String>,
}

/// Which of the two occurrences a remote copy represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Plan,
    Actual,
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncKind::Plan => f.write_str("plan"),
            SyncKind::Actual => f.write_str("actual"),
        }
    }
}

impl FromStr for SyncKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(SyncKind::Plan),
            "actual" => Ok(SyncKind::Actual),
            other => Err(ValidationError::InvalidValue {
                field: "kind".into(),
                message: format!("expected 'plan' or 'actual', got '{other}'"),
            }),
        }
    }
}
