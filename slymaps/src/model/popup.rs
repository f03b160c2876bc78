//! Per-panel async state shown alongside a selected place.

use serde::{Deserialize, Serialize};

use crate::clock::EpochMillis;

/// Lifecycle of a popup section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Async state of one popup panel (address, departures, alerts, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopupSection {
    pub id: String,
    pub status: SectionStatus,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub last_fetched: Option<EpochMillis>,
}

impl PopupSection {
    pub fn idle(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: SectionStatus::Idle,
            data: None,
            error: None,
            last_fetched: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status, SectionStatus::Success | SectionStatus::Error)
    }
}
