//! Service instance and service binding domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceInstanceKind {
    Managed { service_plan_id: Uuid },
    UserProvided { syslog_drain_url: Option<String> },
}

impl ServiceInstanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Managed { .. } => "managed",
            Self::UserProvided { .. } => "user_provided",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInstance {
    pub id: Uuid,
    pub space_id: Uuid,
    /// Unique within the space.
    pub name: String,
    pub kind: ServiceInstanceKind,
    /// AES-256-GCM ciphertext of the credentials JSON, never serialized.
    #[serde(skip_serializing, default)]
    pub encrypted_credentials: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-facing creation input; credentials are plaintext here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceInstance {
    pub space_id: Uuid,
    pub name: String,
    pub kind: ServiceInstanceKind,
    pub credentials: Option<serde_json::Value>,
}

/// Storage-facing creation input with credentials already encrypted.
#[derive(Debug, Clone)]
pub struct NewServiceInstance {
    /// Allocated by the caller; usage events written with the instance carry it.
    pub id: Uuid,
    pub space_id: Uuid,
    pub name: String,
    pub kind: ServiceInstanceKind,
    pub encrypted_credentials: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateServiceInstance {
    pub name: Option<String>,
    pub credentials: Option<serde_json::Value>,
}

/// Storage-facing update with credentials already encrypted.
#[derive(Debug, Clone, Default)]
pub struct ServiceInstanceChanges {
    pub name: Option<String>,
    pub encrypted_credentials: Option<String>,
}

/// Connects an app to a service instance in the same space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceBinding {
    pub id: Uuid,
    pub app_id: Uuid,
    pub service_instance_id: Uuid,
    pub space_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceBinding {
    pub app_id: Uuid,
    pub service_instance_id: Uuid,
}
