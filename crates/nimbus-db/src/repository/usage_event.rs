//! SurrealDB implementation of [`UsageEventSink`] and
//! [`UsageEventRepository`].
//!
//! Events are append-only. Each one is written from a JSON document whose
//! optional keys are left out entirely, so absent values land as NONE.

use chrono::{DateTime, Utc};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::usage_event::{NewUsageEvent, UsageEvent, UsageEventKind, UsageState};
use nimbus_core::repository::{
    PaginatedResult, Pagination, UsageEventRepository, UsageEventSink,
};
use serde_json::{Map, Value};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, total};
use crate::error::{DbError, classify, parse_opt_uuid, parse_uuid};

const ENTITY: &str = "usage_event";

/// Inserts the event held in `$e`. Also the body of the cascade's
/// `FOR $e IN $events` loop.
pub(crate) const CREATE_EVENT: &str = "CREATE type::record('usage_event', $e.event_id) SET \
     kind = $e.kind, state = $e.state, \
     resource_id = $e.resource_id, resource_name = $e.resource_name, \
     organization_id = $e.organization_id, space_id = $e.space_id, \
     memory_mb = $e.memory_mb, instances = $e.instances, sequence = $e.sequence";

/// Wraps a single write in a transaction that also inserts every event
/// bound as `$events`.
pub(crate) fn with_events(statement: &str) -> String {
    format!(
        "BEGIN TRANSACTION;\n{statement};\nFOR $e IN $events {{ {CREATE_EVENT}; }};\nCOMMIT TRANSACTION;"
    )
}

/// The `$events` binding, one document per event in emission order.
pub(crate) fn event_documents(events: &[NewUsageEvent]) -> Value {
    Value::Array(
        events
            .iter()
            .enumerate()
            .map(|(seq, event)| event_document(Uuid::new_v4(), seq, event))
            .collect(),
    )
}

/// Storage document for one event.
pub(crate) fn event_document(id: Uuid, sequence: usize, event: &NewUsageEvent) -> Value {
    let mut doc = Map::new();
    doc.insert("event_id".into(), id.to_string().into());
    doc.insert("sequence".into(), sequence.into());
    doc.insert("kind".into(), event.kind.as_str().into());
    doc.insert("state".into(), event.state.as_str().into());
    doc.insert("resource_id".into(), event.resource_id.to_string().into());
    doc.insert("resource_name".into(), event.resource_name.clone().into());
    doc.insert(
        "organization_id".into(),
        event.organization_id.to_string().into(),
    );
    if let Some(space_id) = event.space_id {
        doc.insert("space_id".into(), space_id.to_string().into());
    }
    if let Some(memory_mb) = event.memory_mb {
        doc.insert("memory_mb".into(), memory_mb.into());
    }
    if let Some(instances) = event.instances {
        doc.insert("instances".into(), instances.into());
    }
    Value::Object(doc)
}

#[derive(Debug, SurrealValue)]
struct UsageEventRow {
    record_id: String,
    kind: String,
    state: String,
    resource_id: String,
    resource_name: String,
    organization_id: String,
    space_id: Option<String>,
    memory_mb: Option<u64>,
    instances: Option<u32>,
    created_at: DateTime<Utc>,
}

impl UsageEventRow {
    fn try_into_event(self) -> Result<UsageEvent, DbError> {
        Ok(UsageEvent {
            id: parse_uuid(ENTITY, &self.record_id)?,
            kind: UsageEventKind::parse(&self.kind)
                .ok_or_else(|| DbError::corrupt(ENTITY, format!("unknown kind '{}'", self.kind)))?,
            state: UsageState::parse(&self.state)
                .ok_or_else(|| DbError::corrupt(ENTITY, format!("unknown state '{}'", self.state)))?,
            resource_id: parse_uuid(ENTITY, &self.resource_id)?,
            resource_name: self.resource_name,
            organization_id: parse_uuid(ENTITY, &self.organization_id)?,
            space_id: parse_opt_uuid(ENTITY, self.space_id.as_deref())?,
            memory_mb: self.memory_mb,
            instances: self.instances,
            created_at: self.created_at,
        })
    }
}

fn into_events(rows: Vec<UsageEventRow>) -> Result<Vec<UsageEvent>, DbError> {
    rows.into_iter().map(UsageEventRow::try_into_event).collect()
}

/// SurrealDB implementation of the usage event log.
#[derive(Clone)]
pub struct SurrealUsageEventRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUsageEventRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<UsageEvent> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('usage_event', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UsageEventRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_event()?)
    }
}

impl<C: Connection> UsageEventSink for SurrealUsageEventRepository<C> {
    async fn record(&self, event: NewUsageEvent) -> NimbusResult<UsageEvent> {
        let id = Uuid::new_v4();

        self.db
            .query(CREATE_EVENT)
            .bind(("e", event_document(id, 0, &event)))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, event.resource_id))?;

        self.get_by_id(id).await
    }
}

impl<C: Connection> UsageEventRepository for SurrealUsageEventRepository<C> {
    async fn list(&self, pagination: Pagination) -> NimbusResult<PaginatedResult<UsageEvent>> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM usage_event GROUP ALL; \
                 SELECT meta::id(id) AS record_id, * FROM usage_event \
                 ORDER BY created_at ASC, sequence ASC LIMIT $limit START $offset;",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let counts: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<UsageEventRow> = result.take(1).map_err(DbError::from)?;
        Ok(PaginatedResult {
            items: into_events(rows)?,
            total: total(counts),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_for_resource(&self, resource_id: Uuid) -> NimbusResult<Vec<UsageEvent>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM usage_event \
                 WHERE resource_id = $resource_id \
                 ORDER BY created_at ASC, sequence ASC",
            )
            .bind(("resource_id", resource_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UsageEventRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_events(rows)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_optionals_are_left_out_of_the_document() {
        let event = NewUsageEvent {
            kind: UsageEventKind::Billing,
            state: UsageState::Stopped,
            resource_id: Uuid::new_v4(),
            resource_name: "web".into(),
            organization_id: Uuid::new_v4(),
            space_id: None,
            memory_mb: Some(256),
            instances: None,
        };
        let doc = event_document(Uuid::new_v4(), 3, &event);
        let obj = doc.as_object().unwrap();
        assert!(!obj.contains_key("space_id"));
        assert!(!obj.contains_key("instances"));
        assert_eq!(obj["memory_mb"], 256);
        assert_eq!(obj["state"], "STOPPED");
        assert_eq!(obj["sequence"], 3);
    }

    #[test]
    fn events_share_the_write_transaction() {
        let sql = with_events("CREATE app:x");
        let lines: Vec<&str> = sql.lines().collect();
        assert_eq!(lines.first(), Some(&"BEGIN TRANSACTION;"));
        assert_eq!(lines[1], "CREATE app:x;");
        assert!(lines[2].starts_with("FOR $e IN $events"));
        assert_eq!(lines.last(), Some(&"COMMIT TRANSACTION;"));
    }
}
