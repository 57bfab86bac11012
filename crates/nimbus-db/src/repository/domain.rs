//! SurrealDB implementation of [`DomainRepository`].
//!
//! A domain with no `owning_organization_id` is shared.

use chrono::{DateTime, Utc};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::domain::{CreateDomain, Domain, DomainKind};
use nimbus_core::repository::DomainRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, classify, id_strings, parse_opt_uuid, parse_uuid};

const ENTITY: &str = "domain";

#[derive(Debug, SurrealValue)]
struct DomainRow {
    record_id: String,
    name: String,
    owning_organization_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DomainRow {
    fn try_into_domain(self) -> Result<Domain, DbError> {
        let kind = match parse_opt_uuid(ENTITY, self.owning_organization_id.as_deref())? {
            Some(owning_organization_id) => DomainKind::Private {
                owning_organization_id,
            },
            None => DomainKind::Shared,
        };
        Ok(Domain {
            id: parse_uuid(ENTITY, &self.record_id)?,
            name: self.name,
            kind,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_domains(rows: Vec<DomainRow>) -> Result<Vec<Domain>, DbError> {
    rows.into_iter().map(DomainRow::try_into_domain).collect()
}

/// SurrealDB implementation of the Domain repository.
#[derive(Clone)]
pub struct SurrealDomainRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDomainRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> DomainRepository for SurrealDomainRepository<C> {
    async fn create(&self, input: CreateDomain) -> NimbusResult<Domain> {
        let id = Uuid::new_v4();
        let query = if input.owning_organization_id.is_some() {
            "CREATE type::record('domain', $id) SET name = $name, \
             owning_organization_id = $owner"
        } else {
            "CREATE type::record('domain', $id) SET name = $name"
        };

        let mut builder = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("name", input.name.clone()));
        if let Some(owner) = input.owning_organization_id {
            builder = builder.bind(("owner", owner.to_string()));
        }
        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, &input.name))?;

        info!(domain_id = %id, name = %input.name, "Domain created");
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<Domain> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('domain', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<DomainRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_domain()?)
    }

    async fn find_by_name(&self, name: &str) -> NimbusResult<Option<Domain>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM domain WHERE name = $name")
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<DomainRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_domains(rows)?.into_iter().next())
    }

    async fn list_usable_by(&self, organization_ids: &[Uuid]) -> NimbusResult<Vec<Domain>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM domain \
                 WHERE owning_organization_id = NONE \
                 OR owning_organization_id IN $owners \
                 ORDER BY created_at ASC",
            )
            .bind(("owners", id_strings(organization_ids)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<DomainRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_domains(rows)?)
    }

    async fn list_all(&self) -> NimbusResult<Vec<Domain>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM domain ORDER BY created_at ASC")
            .await
            .map_err(DbError::from)?;
        let rows: Vec<DomainRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_domains(rows)?)
    }

    async fn delete(&self, id: Uuid) -> NimbusResult<()> {
        self.db
            .query("DELETE type::record('domain', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, id))?;
        info!(domain_id = %id, "Domain deleted");
        Ok(())
    }
}
