//! SurrealDB implementation of [`AppRepository`].
//!
//! Writes commit together with the usage events they are handed.

use chrono::{DateTime, Utc};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::app::{App, AppState, NewApp, PackageState, UpdateApp};
use nimbus_core::models::usage_event::NewUsageEvent;
use nimbus_core::repository::AppRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::usage_event::{event_documents, with_events};
use crate::error::{DbError, classify, id_strings, parse_uuid};

const ENTITY: &str = "app";

#[derive(Debug, SurrealValue)]
struct AppRow {
    record_id: String,
    space_id: String,
    name: String,
    state: String,
    memory_mb: u64,
    instances: u32,
    package_state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AppRow {
    fn try_into_app(self) -> Result<App, DbError> {
        Ok(App {
            id: parse_uuid(ENTITY, &self.record_id)?,
            space_id: parse_uuid(ENTITY, &self.space_id)?,
            name: self.name,
            state: AppState::parse(&self.state)
                .ok_or_else(|| DbError::corrupt(ENTITY, format!("unknown state '{}'", self.state)))?,
            memory_mb: self.memory_mb,
            instances: self.instances,
            package_state: PackageState::parse(&self.package_state).ok_or_else(|| {
                DbError::corrupt(
                    ENTITY,
                    format!("unknown package state '{}'", self.package_state),
                )
            })?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_apps(rows: Vec<AppRow>) -> Result<Vec<App>, DbError> {
    rows.into_iter().map(AppRow::try_into_app).collect()
}

#[derive(Debug, SurrealValue)]
struct FootprintRow {
    memory_mb: u64,
    instances: u32,
}

/// SurrealDB implementation of the App repository.
#[derive(Clone)]
pub struct SurrealAppRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAppRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AppRepository for SurrealAppRepository<C> {
    async fn create(&self, input: NewApp, events: Vec<NewUsageEvent>) -> NimbusResult<App> {
        self.db
            .query(with_events(
                "CREATE type::record('app', $id) SET \
                 space_id = $space_id, name = $name, \
                 state = 'STOPPED', package_state = 'PENDING', \
                 memory_mb = $memory_mb, instances = $instances",
            ))
            .bind(("id", input.id.to_string()))
            .bind(("space_id", input.space_id.to_string()))
            .bind(("name", input.name.clone()))
            .bind(("memory_mb", input.memory_mb))
            .bind(("instances", input.instances))
            .bind(("events", event_documents(&events)))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, &input.name))?;

        self.get_by_id(input.id).await
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<App> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('app', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<AppRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_app()?)
    }

    async fn find_by_name(&self, space_id: Uuid, name: &str) -> NimbusResult<Option<App>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM app \
                 WHERE space_id = $space_id AND name = $name",
            )
            .bind(("space_id", space_id.to_string()))
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<AppRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_apps(rows)?.into_iter().next())
    }

    async fn update(
        &self,
        id: Uuid,
        input: UpdateApp,
        events: Vec<NewUsageEvent>,
    ) -> NimbusResult<App> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.state.is_some() {
            sets.push("state = $state");
        }
        if input.memory_mb.is_some() {
            sets.push("memory_mb = $memory_mb");
        }
        if input.instances.is_some() {
            sets.push("instances = $instances");
        }
        if input.package_state.is_some() {
            sets.push("package_state = $package_state");
        }
        sets.push("updated_at = time::now()");

        let key = input.name.clone().unwrap_or_else(|| id.to_string());
        let mut builder = self
            .db
            .query(with_events(&format!(
                "UPDATE type::record('app', $id) SET {}",
                sets.join(", ")
            )))
            .bind(("id", id.to_string()))
            .bind(("events", event_documents(&events)));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(state) = input.state {
            builder = builder.bind(("state", state.as_str()));
        }
        if let Some(memory_mb) = input.memory_mb {
            builder = builder.bind(("memory_mb", memory_mb));
        }
        if let Some(instances) = input.instances {
            builder = builder.bind(("instances", instances));
        }
        if let Some(package_state) = input.package_state {
            builder = builder.bind(("package_state", package_state.as_str()));
        }

        builder
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, key))?;

        self.get_by_id(id).await
    }

    async fn list_by_spaces(&self, space_ids: &[Uuid]) -> NimbusResult<Vec<App>> {
        if space_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM app \
                 WHERE space_id IN $space_ids ORDER BY created_at ASC",
            )
            .bind(("space_ids", id_strings(space_ids)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<AppRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_apps(rows)?)
    }

    async fn started_memory_mb(&self, organization_id: Uuid) -> NimbusResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT memory_mb, instances FROM app \
                 WHERE state = 'STARTED' AND space_id IN \
                 (SELECT VALUE meta::id(id) FROM space WHERE organization_id = $org_id)",
            )
            .bind(("org_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<FootprintRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .iter()
            .map(|r| r.memory_mb.saturating_mul(u64::from(r.instances)))
            .sum())
    }
}
