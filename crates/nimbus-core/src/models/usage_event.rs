//! Usage event model: append-only lifecycle records for audit and billing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UsageEventKind {
    App,
    Service,
    Billing,
}

impl UsageEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Service => "service",
            Self::Billing => "billing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "app" => Some(Self::App),
            "service" => Some(Self::Service),
            "billing" => Some(Self::Billing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum UsageState {
    Created,
    Started,
    Stopped,
    Updated,
    Deleted,
}

impl UsageState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Started => "STARTED",
            Self::Stopped => "STOPPED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(Self::Created),
            "STARTED" => Some(Self::Started),
            "STOPPED" => Some(Self::Stopped),
            "UPDATED" => Some(Self::Updated),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// An event about to be recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewUsageEvent {
    pub kind: UsageEventKind,
    pub state: UsageState,
    pub resource_id: Uuid,
    pub resource_name: String,
    pub organization_id: Uuid,
    pub space_id: Option<Uuid>,
    pub memory_mb: Option<u64>,
    pub instances: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageEvent {
    pub id: Uuid,
    pub kind: UsageEventKind,
    pub state: UsageState,
    pub resource_id: Uuid,
    pub resource_name: String,
    pub organization_id: Uuid,
    pub space_id: Option<Uuid>,
    pub memory_mb: Option<u64>,
    pub instances: Option<u32>,
    pub created_at: DateTime<Utc>,
}
