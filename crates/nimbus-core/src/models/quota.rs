//! Quota definition domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named resource limits assignable to organizations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaDefinition {
    pub id: Uuid,
    pub name: String,
    /// Total memory of all started app instances, in megabytes.
    pub memory_limit_mb: u64,
    /// Per-instance memory cap, if any.
    pub instance_memory_limit_mb: Option<u64>,
    pub total_services: Option<u32>,
    pub total_routes: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuotaDefinition {
    pub name: String,
    pub memory_limit_mb: u64,
    pub instance_memory_limit_mb: Option<u64>,
    pub total_services: Option<u32>,
    pub total_routes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateQuotaDefinition {
    pub name: Option<String>,
    pub memory_limit_mb: Option<u64>,
    pub instance_memory_limit_mb: Option<u64>,
    pub total_services: Option<u32>,
    pub total_routes: Option<u32>,
}

/// Current consumption of an organization against its quota.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrganizationUsage {
    pub memory_limit_mb: Option<u64>,
    pub memory_used_mb: u64,
    /// `None` when no quota applies. Negative when a quota was lowered
    /// below current usage.
    pub memory_remaining_mb: Option<i64>,
}

impl OrganizationUsage {
    pub fn new(memory_limit_mb: Option<u64>, memory_used_mb: u64) -> Self {
        let memory_remaining_mb = memory_limit_mb.map(|limit| {
            i64::try_from(limit)
                .unwrap_or(i64::MAX)
                .saturating_sub(i64::try_from(memory_used_mb).unwrap_or(i64::MAX))
        });
        Self {
            memory_limit_mb,
            memory_used_mb,
            memory_remaining_mb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_memory_subtracts_usage() {
        let usage = OrganizationUsage::new(Some(500), 450);
        assert_eq!(usage.memory_remaining_mb, Some(50));
    }

    #[test]
    fn no_quota_means_unbounded() {
        assert_eq!(OrganizationUsage::new(None, 4096).memory_remaining_mb, None);
    }

    #[test]
    fn lowered_quota_goes_negative() {
        assert_eq!(
            OrganizationUsage::new(Some(100), 300).memory_remaining_mb,
            Some(-200)
        );
    }
}
