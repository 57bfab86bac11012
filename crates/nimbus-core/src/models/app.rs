//! Application domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppState {
    #[default]
    Stopped,
    Started,
}

impl AppState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Started => "STARTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STOPPED" => Some(Self::Stopped),
            "STARTED" => Some(Self::Started),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PackageState {
    #[default]
    Pending,
    Staged,
    Failed,
}

impl PackageState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Staged => "STAGED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "STAGED" => Some(Self::Staged),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    pub id: Uuid,
    pub space_id: Uuid,
    /// Unique within the space.
    pub name: String,
    pub state: AppState,
    /// Memory per instance, in megabytes.
    pub memory_mb: u64,
    pub instances: u32,
    pub package_state: PackageState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl App {
    pub fn is_started(&self) -> bool {
        self.state == AppState::Started
    }

    /// Total memory this app consumes while started.
    pub fn total_memory_mb(&self) -> u64 {
        self.memory_mb * u64::from(self.instances)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApp {
    pub space_id: Uuid,
    pub name: String,
    /// Falls back to the configured default when `None`.
    pub memory_mb: Option<u64>,
    pub instances: Option<u32>,
}

/// Storage-facing creation input with defaults already applied.
#[derive(Debug, Clone)]
pub struct NewApp {
    /// Allocated by the caller; usage events written with the app carry it.
    pub id: Uuid,
    pub space_id: Uuid,
    pub name: String,
    pub memory_mb: u64,
    pub instances: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateApp {
    pub name: Option<String>,
    pub state: Option<AppState>,
    pub memory_mb: Option<u64>,
    pub instances: Option<u32>,
    pub package_state: Option<PackageState>,
}
