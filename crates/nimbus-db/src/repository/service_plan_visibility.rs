//! SurrealDB implementation of [`ServicePlanVisibilityRepository`].

use chrono::{DateTime, Utc};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::service_plan_visibility::{
    CreateServicePlanVisibility, ServicePlanVisibility,
};
use nimbus_core::repository::ServicePlanVisibilityRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, classify, id_strings, parse_uuid};

const ENTITY: &str = "service_plan_visibility";

#[derive(Debug, SurrealValue)]
struct VisibilityRow {
    record_id: String,
    service_plan_id: String,
    organization_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VisibilityRow {
    fn try_into_visibility(self) -> Result<ServicePlanVisibility, DbError> {
        Ok(ServicePlanVisibility {
            id: parse_uuid(ENTITY, &self.record_id)?,
            service_plan_id: parse_uuid(ENTITY, &self.service_plan_id)?,
            organization_id: parse_uuid(ENTITY, &self.organization_id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_visibilities(rows: Vec<VisibilityRow>) -> Result<Vec<ServicePlanVisibility>, DbError> {
    rows.into_iter()
        .map(VisibilityRow::try_into_visibility)
        .collect()
}

/// SurrealDB implementation of the ServicePlanVisibility repository.
#[derive(Clone)]
pub struct SurrealServicePlanVisibilityRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealServicePlanVisibilityRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ServicePlanVisibilityRepository for SurrealServicePlanVisibilityRepository<C> {
    async fn create(&self, input: CreateServicePlanVisibility) -> NimbusResult<ServicePlanVisibility> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('service_plan_visibility', $id) SET \
                 service_plan_id = $plan, organization_id = $org_id",
            )
            .bind(("id", id.to_string()))
            .bind(("plan", input.service_plan_id.to_string()))
            .bind(("org_id", input.organization_id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(
                ENTITY,
                format!("{}/{}", input.service_plan_id, input.organization_id),
            ))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<ServicePlanVisibility> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('service_plan_visibility', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<VisibilityRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_visibility()?)
    }

    async fn list_by_organizations(
        &self,
        organization_ids: &[Uuid],
    ) -> NimbusResult<Vec<ServicePlanVisibility>> {
        if organization_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM service_plan_visibility \
                 WHERE organization_id IN $org_ids ORDER BY created_at ASC",
            )
            .bind(("org_ids", id_strings(organization_ids)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<VisibilityRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_visibilities(rows)?)
    }

    async fn list_all(&self) -> NimbusResult<Vec<ServicePlanVisibility>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM service_plan_visibility \
                 ORDER BY created_at ASC",
            )
            .await
            .map_err(DbError::from)?;
        let rows: Vec<VisibilityRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_visibilities(rows)?)
    }

    async fn delete(&self, id: Uuid) -> NimbusResult<()> {
        self.db
            .query("DELETE type::record('service_plan_visibility', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, id))?;
        Ok(())
    }
}
