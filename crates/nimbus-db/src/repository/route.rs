//! SurrealDB implementation of [`RouteRepository`].
//!
//! `(domain_id, host, path)` is globally unique; an empty host or path is
//! stored as the empty string so the unique index covers it.

use chrono::{DateTime, Utc};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::route::{CreateRoute, Route};
use nimbus_core::repository::RouteRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, total};
use crate::error::{DbError, classify, id_strings, parse_uuid};

const ENTITY: &str = "route";

#[derive(Debug, SurrealValue)]
struct RouteRow {
    record_id: String,
    space_id: String,
    domain_id: String,
    host: String,
    path: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RouteRow {
    fn try_into_route(self) -> Result<Route, DbError> {
        Ok(Route {
            id: parse_uuid(ENTITY, &self.record_id)?,
            space_id: parse_uuid(ENTITY, &self.space_id)?,
            domain_id: parse_uuid(ENTITY, &self.domain_id)?,
            host: self.host,
            path: self.path,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_routes(rows: Vec<RouteRow>) -> Result<Vec<Route>, DbError> {
    rows.into_iter().map(RouteRow::try_into_route).collect()
}

/// SurrealDB implementation of the Route repository.
#[derive(Clone)]
pub struct SurrealRouteRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRouteRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn count(&self, filter: &str, key: &'static str, value: String) -> NimbusResult<u64> {
        let mut result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM route WHERE {filter} GROUP ALL"
            ))
            .bind((key, value))
            .await
            .map_err(DbError::from)?;
        let counts: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(total(counts))
    }
}

impl<C: Connection> RouteRepository for SurrealRouteRepository<C> {
    async fn create(&self, input: CreateRoute) -> NimbusResult<Route> {
        let id = Uuid::new_v4();
        let path = input.path.unwrap_or_default();
        let key = format!("{}{}", input.host, path);

        self.db
            .query(
                "CREATE type::record('route', $id) SET \
                 space_id = $space_id, domain_id = $domain_id, \
                 host = $host, path = $path",
            )
            .bind(("id", id.to_string()))
            .bind(("space_id", input.space_id.to_string()))
            .bind(("domain_id", input.domain_id.to_string()))
            .bind(("host", input.host))
            .bind(("path", path))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, key))?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<Route> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('route', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<RouteRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_route()?)
    }

    async fn find(&self, domain_id: Uuid, host: &str, path: &str) -> NimbusResult<Option<Route>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM route \
                 WHERE domain_id = $domain_id AND host = $host AND path = $path",
            )
            .bind(("domain_id", domain_id.to_string()))
            .bind(("host", host.to_string()))
            .bind(("path", path.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<RouteRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_routes(rows)?.into_iter().next())
    }

    async fn list_by_spaces(&self, space_ids: &[Uuid]) -> NimbusResult<Vec<Route>> {
        if space_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM route \
                 WHERE space_id IN $space_ids ORDER BY created_at ASC",
            )
            .bind(("space_ids", id_strings(space_ids)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<RouteRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_routes(rows)?)
    }

    async fn count_by_domain(&self, domain_id: Uuid) -> NimbusResult<u64> {
        self.count("domain_id = $domain_id", "domain_id", domain_id.to_string())
            .await
    }

    async fn count_by_organization(&self, organization_id: Uuid) -> NimbusResult<u64> {
        self.count(
            "space_id IN (SELECT VALUE meta::id(id) FROM space WHERE organization_id = $org_id)",
            "org_id",
            organization_id.to_string(),
        )
        .await
    }

    async fn delete(&self, id: Uuid) -> NimbusResult<()> {
        self.db
            .query("DELETE type::record('route', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, id))?;
        Ok(())
    }
}
