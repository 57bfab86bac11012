//! Control-plane configuration.

use nimbus_core::models::quota::CreateQuotaDefinition;

/// Behavioural switches and defaults for [`crate::ControlPlane`].
#[derive(Clone)]
pub struct ControlConfig {
    /// Record billing usage events for organizations with billing enabled.
    pub billing_event_writing_enabled: bool,
    /// Allow any authenticated user to create organizations.
    pub user_org_creation: bool,
    /// Quota assigned to new organizations that do not name one.
    pub default_quota_name: Option<String>,
    /// Per-instance memory for apps created without an explicit value.
    pub default_app_memory_mb: u64,
    /// AES-256 key for service instance credentials.
    pub credentials_key: [u8; 32],
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            billing_event_writing_enabled: false,
            user_org_creation: false,
            default_quota_name: Some("default".into()),
            default_app_memory_mb: 1024,
            credentials_key: [0u8; 32],
        }
    }
}

impl std::fmt::Debug for ControlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlConfig")
            .field(
                "billing_event_writing_enabled",
                &self.billing_event_writing_enabled,
            )
            .field("user_org_creation", &self.user_org_creation)
            .field("default_quota_name", &self.default_quota_name)
            .field("default_app_memory_mb", &self.default_app_memory_mb)
            .field("credentials_key", &"<redacted>")
            .finish()
    }
}

/// Records every fresh platform starts with.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub default_quota: CreateQuotaDefinition,
    pub shared_domains: Vec<String>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            default_quota: CreateQuotaDefinition {
                name: "default".into(),
                memory_limit_mb: 10_240,
                instance_memory_limit_mb: None,
                total_services: Some(100),
                total_routes: Some(1000),
            },
            shared_domains: Vec::new(),
        }
    }
}
