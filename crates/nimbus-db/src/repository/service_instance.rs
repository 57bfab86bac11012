//! SurrealDB implementation of [`ServiceInstanceRepository`].
//!
//! Credentials arrive already encrypted; this layer never sees plaintext.

use chrono::{DateTime, Utc};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::service_instance::{
    NewServiceInstance, ServiceInstance, ServiceInstanceChanges, ServiceInstanceKind,
};
use nimbus_core::models::usage_event::NewUsageEvent;
use nimbus_core::repository::ServiceInstanceRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::usage_event::{event_documents, with_events};
use super::{CountRow, total};
use crate::error::{DbError, classify, id_strings, parse_uuid};

const ENTITY: &str = "service_instance";

#[derive(Debug, SurrealValue)]
struct ServiceInstanceRow {
    record_id: String,
    space_id: String,
    name: String,
    kind: String,
    service_plan_id: Option<String>,
    syslog_drain_url: Option<String>,
    encrypted_credentials: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ServiceInstanceRow {
    fn try_into_instance(self) -> Result<ServiceInstance, DbError> {
        let kind = match (self.kind.as_str(), self.service_plan_id) {
            ("managed", Some(plan)) => ServiceInstanceKind::Managed {
                service_plan_id: parse_uuid(ENTITY, &plan)?,
            },
            ("managed", None) => {
                return Err(DbError::corrupt(ENTITY, "managed instance without a plan"));
            }
            ("user_provided", _) => ServiceInstanceKind::UserProvided {
                syslog_drain_url: self.syslog_drain_url,
            },
            (other, _) => {
                return Err(DbError::corrupt(ENTITY, format!("unknown kind '{other}'")));
            }
        };
        Ok(ServiceInstance {
            id: parse_uuid(ENTITY, &self.record_id)?,
            space_id: parse_uuid(ENTITY, &self.space_id)?,
            name: self.name,
            kind,
            encrypted_credentials: self.encrypted_credentials,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_instances(rows: Vec<ServiceInstanceRow>) -> Result<Vec<ServiceInstance>, DbError> {
    rows.into_iter()
        .map(ServiceInstanceRow::try_into_instance)
        .collect()
}

/// SurrealDB implementation of the ServiceInstance repository.
#[derive(Clone)]
pub struct SurrealServiceInstanceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealServiceInstanceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ServiceInstanceRepository for SurrealServiceInstanceRepository<C> {
    async fn create(
        &self,
        input: NewServiceInstance,
        events: Vec<NewUsageEvent>,
    ) -> NimbusResult<ServiceInstance> {
        let mut sets = vec!["space_id = $space_id", "name = $name", "kind = $kind"];
        let (plan, drain) = match &input.kind {
            ServiceInstanceKind::Managed { service_plan_id } => {
                sets.push("service_plan_id = $plan");
                (Some(service_plan_id.to_string()), None)
            }
            ServiceInstanceKind::UserProvided { syslog_drain_url } => {
                if syslog_drain_url.is_some() {
                    sets.push("syslog_drain_url = $drain");
                }
                (None, syslog_drain_url.clone())
            }
        };
        if input.encrypted_credentials.is_some() {
            sets.push("encrypted_credentials = $credentials");
        }

        let mut builder = self
            .db
            .query(with_events(&format!(
                "CREATE type::record('service_instance', $id) SET {}",
                sets.join(", ")
            )))
            .bind(("id", input.id.to_string()))
            .bind(("events", event_documents(&events)))
            .bind(("space_id", input.space_id.to_string()))
            .bind(("name", input.name.clone()))
            .bind(("kind", input.kind.as_str()));
        if let Some(plan) = plan {
            builder = builder.bind(("plan", plan));
        }
        if let Some(drain) = drain {
            builder = builder.bind(("drain", drain));
        }
        if let Some(credentials) = input.encrypted_credentials {
            builder = builder.bind(("credentials", credentials));
        }
        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, &input.name))?;

        self.get_by_id(input.id).await
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<ServiceInstance> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('service_instance', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ServiceInstanceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_instance()?)
    }

    async fn find_by_name(
        &self,
        space_id: Uuid,
        name: &str,
    ) -> NimbusResult<Option<ServiceInstance>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM service_instance \
                 WHERE space_id = $space_id AND name = $name",
            )
            .bind(("space_id", space_id.to_string()))
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ServiceInstanceRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_instances(rows)?.into_iter().next())
    }

    async fn update(
        &self,
        id: Uuid,
        changes: ServiceInstanceChanges,
        events: Vec<NewUsageEvent>,
    ) -> NimbusResult<ServiceInstance> {
        let mut sets = Vec::new();
        if changes.name.is_some() {
            sets.push("name = $name");
        }
        if changes.encrypted_credentials.is_some() {
            sets.push("encrypted_credentials = $credentials");
        }
        sets.push("updated_at = time::now()");

        let key = changes.name.clone().unwrap_or_else(|| id.to_string());
        let mut builder = self
            .db
            .query(with_events(&format!(
                "UPDATE type::record('service_instance', $id) SET {}",
                sets.join(", ")
            )))
            .bind(("id", id.to_string()))
            .bind(("events", event_documents(&events)));
        if let Some(name) = changes.name {
            builder = builder.bind(("name", name));
        }
        if let Some(credentials) = changes.encrypted_credentials {
            builder = builder.bind(("credentials", credentials));
        }
        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, key))?;

        self.get_by_id(id).await
    }

    async fn list_by_spaces(&self, space_ids: &[Uuid]) -> NimbusResult<Vec<ServiceInstance>> {
        if space_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM service_instance \
                 WHERE space_id IN $space_ids ORDER BY created_at ASC",
            )
            .bind(("space_ids", id_strings(space_ids)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ServiceInstanceRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_instances(rows)?)
    }

    async fn count_by_organization(&self, organization_id: Uuid) -> NimbusResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM service_instance WHERE space_id IN \
                 (SELECT VALUE meta::id(id) FROM space WHERE organization_id = $org_id) \
                 GROUP ALL",
            )
            .bind(("org_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let counts: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(total(counts))
    }
}
