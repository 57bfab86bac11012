//! Platform seeding: the default quota and the shared domains.

use nimbus_core::error::NimbusResult;
use nimbus_core::models::domain::CreateDomain;
use nimbus_core::repository::{DomainRepository, QuotaDefinitionRepository, ResourceStore};
use tracing::info;

use super::ControlPlane;
use crate::config::SeedConfig;
use crate::constraints::ProposedChange;

/// What a seed run created. Records that already existed are left alone.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub quota_created: bool,
    pub domains_created: Vec<String>,
}

impl<S: ResourceStore> ControlPlane<S> {
    /// Creates any missing seed records. Safe to run on every start.
    pub async fn seed(&self, seed: &SeedConfig) -> NimbusResult<SeedReport> {
        let mut report = SeedReport::default();

        let quota_name = &seed.default_quota.name;
        if self.store.quotas().find_by_name(quota_name).await?.is_none() {
            self.validate(ProposedChange::CreateQuota { name: quota_name })
                .await?;
            self.store.quotas().create(seed.default_quota.clone()).await?;
            report.quota_created = true;
        }

        for name in &seed.shared_domains {
            if self.store.domains().find_by_name(name).await?.is_some() {
                continue;
            }
            self.validate(ProposedChange::CreateDomain { name }).await?;
            self.store
                .domains()
                .create(CreateDomain {
                    name: name.clone(),
                    owning_organization_id: None,
                })
                .await?;
            report.domains_created.push(name.clone());
        }

        info!(
            quota_created = report.quota_created,
            domains_created = report.domains_created.len(),
            "Platform seeded"
        );
        Ok(report)
    }
}
