//! SurrealDB implementation of [`ServiceBindingRepository`].

use chrono::{DateTime, Utc};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::service_instance::ServiceBinding;
use nimbus_core::repository::ServiceBindingRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, classify, id_strings, parse_uuid};

const ENTITY: &str = "service_binding";

#[derive(Debug, SurrealValue)]
struct ServiceBindingRow {
    record_id: String,
    app_id: String,
    service_instance_id: String,
    space_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ServiceBindingRow {
    fn try_into_binding(self) -> Result<ServiceBinding, DbError> {
        Ok(ServiceBinding {
            id: parse_uuid(ENTITY, &self.record_id)?,
            app_id: parse_uuid(ENTITY, &self.app_id)?,
            service_instance_id: parse_uuid(ENTITY, &self.service_instance_id)?,
            space_id: parse_uuid(ENTITY, &self.space_id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the ServiceBinding repository.
#[derive(Clone)]
pub struct SurrealServiceBindingRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealServiceBindingRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn select_where(
        &self,
        filter: &str,
        key: &'static str,
        value: Vec<String>,
    ) -> NimbusResult<Vec<ServiceBinding>> {
        let mut result = self
            .db
            .query(format!(
                "SELECT meta::id(id) AS record_id, * FROM service_binding \
                 WHERE {filter} ORDER BY created_at ASC"
            ))
            .bind((key, value))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ServiceBindingRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(ServiceBindingRow::try_into_binding)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}

impl<C: Connection> ServiceBindingRepository for SurrealServiceBindingRepository<C> {
    async fn create(
        &self,
        app_id: Uuid,
        service_instance_id: Uuid,
        space_id: Uuid,
    ) -> NimbusResult<ServiceBinding> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('service_binding', $id) SET \
                 app_id = $app_id, service_instance_id = $si_id, space_id = $space_id",
            )
            .bind(("id", id.to_string()))
            .bind(("app_id", app_id.to_string()))
            .bind(("si_id", service_instance_id.to_string()))
            .bind(("space_id", space_id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, format!("{app_id}/{service_instance_id}")))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<ServiceBinding> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('service_binding', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ServiceBindingRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_binding()?)
    }

    async fn list_by_spaces(&self, space_ids: &[Uuid]) -> NimbusResult<Vec<ServiceBinding>> {
        if space_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select_where("space_id IN $ids", "ids", id_strings(space_ids))
            .await
    }

    async fn list_by_app(&self, app_id: Uuid) -> NimbusResult<Vec<ServiceBinding>> {
        self.select_where("app_id IN $ids", "ids", vec![app_id.to_string()])
            .await
    }

    async fn list_by_service_instance(
        &self,
        service_instance_id: Uuid,
    ) -> NimbusResult<Vec<ServiceBinding>> {
        self.select_where(
            "service_instance_id IN $ids",
            "ids",
            vec![service_instance_id.to_string()],
        )
        .await
    }

    async fn delete(&self, id: Uuid) -> NimbusResult<()> {
        self.db
            .query("DELETE type::record('service_binding', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, id))?;
        Ok(())
    }
}
