//! Transactional executor for deletion plans.
//!
//! A plan becomes a single transaction:
//!
//! 1. one guard statement that throws if the subtree no longer matches the
//!    plan (root gone, child counts changed, started apps changed);
//! 2. the planned usage events;
//! 3. the deletion steps, in plan order.
//!
//! Record ids are inlined as string literals. They are formatted from
//! `Uuid` values, never from caller text.

use nimbus_core::error::NimbusResult;
use nimbus_core::models::deletion::{DeletedSet, DeletionPlan, ResourceKind};
use nimbus_core::repository::CascadeRepository;
use surrealdb::{Connection, Surreal};
use tracing::info;
use uuid::Uuid;

use super::usage_event::{CREATE_EVENT, event_documents};
use crate::error::{DbError, STALE_PLAN, classify};

/// `['<uuid>', ...]`
fn id_list<'a>(ids: impl IntoIterator<Item = &'a Uuid>) -> String {
    let quoted: Vec<String> = ids.into_iter().map(|id| format!("'{id}'")).collect();
    format!("[{}]", quoted.join(", "))
}

fn guard_statement(plan: &DeletionPlan) -> String {
    let root_table = plan.root_kind.table();
    let mut conditions = vec![format!(
        "array::len((SELECT VALUE id FROM {root_table} WHERE meta::id(id) = '{}')) = 0",
        plan.root_id
    )];

    for guard in &plan.guards {
        if guard.parent_ids.is_empty() {
            continue;
        }
        conditions.push(format!(
            "array::len((SELECT VALUE id FROM {} WHERE {} IN {})) != {}",
            guard.kind.table(),
            guard.parent_column,
            id_list(&guard.parent_ids),
            guard.expected
        ));
    }

    let app_ids: Vec<Uuid> = plan.ids(ResourceKind::App).collect();
    if !app_ids.is_empty() {
        let mut started = plan.started_app_ids.clone();
        started.sort_unstable();
        conditions.push(format!(
            "array::sort((SELECT VALUE meta::id(id) FROM app \
             WHERE meta::id(id) IN {} AND state = 'STARTED')) != array::sort({})",
            id_list(&app_ids),
            id_list(&started)
        ));
    }

    let chain: Vec<String> = conditions
        .iter()
        .map(|c| format!("IF {c} {{ THROW '{STALE_PLAN}' }}"))
        .collect();
    format!("{};", chain.join(" ELSE "))
}

fn build_transaction(plan: &DeletionPlan) -> String {
    let mut statements = vec!["BEGIN TRANSACTION;".to_string(), guard_statement(plan)];

    if !plan.usage_events.is_empty() {
        statements.push(format!("FOR $e IN $events {{ {CREATE_EVENT}; }};"));
    }

    for step in &plan.steps {
        if step.ids.is_empty() {
            continue;
        }
        let column = step.kind.key_column().unwrap_or("meta::id(id)");
        statements.push(format!(
            "DELETE {} WHERE {column} IN {};",
            step.kind.table(),
            id_list(&step.ids)
        ));
    }

    statements.push("COMMIT TRANSACTION;".to_string());
    statements.join("\n")
}

/// SurrealDB executor for [`DeletionPlan`]s.
#[derive(Clone)]
pub struct SurrealCascadeRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCascadeRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CascadeRepository for SurrealCascadeRepository<C> {
    async fn execute(&self, plan: &DeletionPlan) -> NimbusResult<DeletedSet> {
        self.db
            .query(build_transaction(plan))
            .bind(("events", event_documents(&plan.usage_events)))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(plan.root_kind.table(), plan.root_id))?;

        let deleted = plan.deleted_set();
        info!(
            root = plan.root_kind.table(),
            root_id = %plan.root_id,
            organization_id = %plan.organization_id,
            removed = deleted.len(),
            events = plan.usage_events.len(),
            "Cascade delete committed"
        );
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use nimbus_core::models::deletion::{DeletionStep, PlanGuard};

    use super::*;

    fn space_plan(space: Uuid, app: Uuid, started: bool) -> DeletionPlan {
        DeletionPlan {
            root_kind: ResourceKind::Space,
            root_id: space,
            organization_id: Uuid::new_v4(),
            steps: vec![
                DeletionStep {
                    kind: ResourceKind::App,
                    ids: vec![app],
                },
                DeletionStep {
                    kind: ResourceKind::Route,
                    ids: vec![],
                },
                DeletionStep {
                    kind: ResourceKind::SpaceRoles,
                    ids: vec![space],
                },
                DeletionStep {
                    kind: ResourceKind::Space,
                    ids: vec![space],
                },
            ],
            usage_events: vec![],
            guards: vec![PlanGuard {
                kind: ResourceKind::App,
                parent_column: "space_id",
                parent_ids: vec![space],
                expected: 1,
            }],
            started_app_ids: if started { vec![app] } else { vec![] },
        }
    }

    #[test]
    fn guard_is_the_first_statement() {
        let space = Uuid::new_v4();
        let sql = build_transaction(&space_plan(space, Uuid::new_v4(), true));
        let lines: Vec<&str> = sql.lines().collect();
        assert_eq!(lines[0], "BEGIN TRANSACTION;");
        assert!(lines[1].starts_with("IF array::len((SELECT VALUE id FROM space"));
        assert!(lines[1].contains(&format!("WHERE space_id IN ['{space}'])) != 1")));
        assert!(lines[1].contains(STALE_PLAN));
    }

    #[test]
    fn empty_steps_are_skipped_and_edges_use_key_columns() {
        let space = Uuid::new_v4();
        let sql = build_transaction(&space_plan(space, Uuid::new_v4(), false));
        assert!(!sql.contains("DELETE route"));
        assert!(sql.contains(&format!("DELETE space_role WHERE space_id IN ['{space}'];")));
        assert!(sql.contains(&format!(
            "DELETE space WHERE meta::id(id) IN ['{space}'];"
        )));
        assert!(!sql.contains("FOR $e IN $events"));
    }

    #[test]
    fn steps_follow_plan_order() {
        let sql = build_transaction(&space_plan(Uuid::new_v4(), Uuid::new_v4(), false));
        let app = sql.find("DELETE app").unwrap();
        let roles = sql.find("DELETE space_role").unwrap();
        let space = sql.find("DELETE space WHERE").unwrap();
        assert!(app < roles && roles < space);
    }
}
