//! SurrealDB implementation of [`RoleRepository`].
//!
//! Role assignments are `org_role` (user -> organization) and `space_role`
//! (user -> space) edges. Each edge also carries its endpoints as plain
//! string fields so assignments can be filtered and deleted without
//! graph traversal.

use nimbus_core::error::NimbusResult;
use nimbus_core::models::role::{
    OrgRole, OrgRoleAssignment, SpaceRole, SpaceRoleAssignment, UserRoles,
};
use nimbus_core::models::space::Space;
use nimbus_core::repository::RoleRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use crate::error::{
    DbError, LAST_MANAGER, SPACE_ROLES_REMAIN, classify, classify_membership, parse_uuid,
};

/// Idempotent grant of one organization role.
///
/// RELATE requires literal record-id syntax, so the UUIDs are embedded
/// directly; they come from `Uuid` values and are safe to inline.
pub(crate) fn grant_org_role_stmt(organization_id: Uuid, user_id: Uuid, role: OrgRole) -> String {
    let role = role.as_str();
    format!(
        "IF array::len((SELECT VALUE id FROM org_role \
         WHERE organization_id = '{organization_id}' AND user_id = '{user_id}' \
         AND role = '{role}')) = 0 {{ \
         RELATE user:`{user_id}` -> org_role -> organization:`{organization_id}` \
         SET user_id = '{user_id}', organization_id = '{organization_id}', \
         role = '{role}' }};"
    )
}

/// Fails when `$user_id` is the organization's only manager.
const SOLE_MANAGER_CONDITION: &str = "\
    array::len((SELECT VALUE id FROM org_role WHERE organization_id = $org_id \
        AND role = 'manager' AND user_id = $user_id)) > 0 \
    AND array::len((SELECT VALUE id FROM org_role WHERE organization_id = $org_id \
        AND role = 'manager' AND user_id != $user_id)) = 0";

#[derive(Debug, SurrealValue)]
struct OrgRoleRow {
    user_id: String,
    organization_id: String,
    role: String,
}

impl OrgRoleRow {
    fn try_into_assignment(self) -> Result<OrgRoleAssignment, DbError> {
        Ok(OrgRoleAssignment {
            user_id: parse_uuid("org_role", &self.user_id)?,
            organization_id: parse_uuid("org_role", &self.organization_id)?,
            role: OrgRole::parse(&self.role)
                .ok_or_else(|| DbError::corrupt("org_role", format!("unknown role '{}'", self.role)))?,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct SpaceRoleRow {
    user_id: String,
    space_id: String,
    organization_id: String,
    role: String,
}

impl SpaceRoleRow {
    fn try_into_assignment(self) -> Result<SpaceRoleAssignment, DbError> {
        Ok(SpaceRoleAssignment {
            user_id: parse_uuid("space_role", &self.user_id)?,
            space_id: parse_uuid("space_role", &self.space_id)?,
            organization_id: parse_uuid("space_role", &self.organization_id)?,
            role: SpaceRole::parse(&self.role).ok_or_else(|| {
                DbError::corrupt("space_role", format!("unknown role '{}'", self.role))
            })?,
        })
    }
}

fn org_assignments(rows: Vec<OrgRoleRow>) -> Result<Vec<OrgRoleAssignment>, DbError> {
    rows.into_iter().map(OrgRoleRow::try_into_assignment).collect()
}

fn space_assignments(rows: Vec<SpaceRoleRow>) -> Result<Vec<SpaceRoleAssignment>, DbError> {
    rows.into_iter()
        .map(SpaceRoleRow::try_into_assignment)
        .collect()
}

/// SurrealDB implementation of the Role repository.
#[derive(Clone)]
pub struct SurrealRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> RoleRepository for SurrealRoleRepository<C> {
    async fn add_org_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    ) -> NimbusResult<()> {
        let mut statements = vec![
            "BEGIN TRANSACTION;".to_string(),
            grant_org_role_stmt(organization_id, user_id, OrgRole::User),
        ];
        if role != OrgRole::User {
            statements.push(grant_org_role_stmt(organization_id, user_id, role));
        }
        statements.push("COMMIT TRANSACTION;".to_string());

        self.db
            .query(statements.join("\n"))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify("org_role", format!("{organization_id}/{user_id}")))?;

        info!(%organization_id, %user_id, role = role.as_str(), "Organization role granted");
        Ok(())
    }

    async fn remove_org_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: OrgRole,
    ) -> NimbusResult<()> {
        let mut statements = vec!["BEGIN TRANSACTION;".to_string()];
        if role == OrgRole::Manager {
            statements.push(format!(
                "IF {SOLE_MANAGER_CONDITION} {{ THROW '{LAST_MANAGER}' }};"
            ));
        }
        statements.push(
            "DELETE org_role WHERE organization_id = $org_id \
             AND user_id = $user_id AND role = $role;"
                .to_string(),
        );
        statements.push("COMMIT TRANSACTION;".to_string());

        self.db
            .query(statements.join("\n"))
            .bind(("org_id", organization_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .bind(("role", role.as_str()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify_membership("org_role", organization_id, Some(user_id)))?;

        info!(%organization_id, %user_id, role = role.as_str(), "Organization role revoked");
        Ok(())
    }

    async fn org_role_holders(&self, organization_id: Uuid, role: OrgRole) -> NimbusResult<Vec<Uuid>> {
        let mut result = self
            .db
            .query(
                "SELECT user_id, organization_id, role, created_at FROM org_role \
                 WHERE organization_id = $org_id AND role = $role \
                 ORDER BY created_at ASC",
            )
            .bind(("org_id", organization_id.to_string()))
            .bind(("role", role.as_str()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<OrgRoleRow> = result.take(0).map_err(DbError::from)?;
        Ok(org_assignments(rows)?
            .into_iter()
            .map(|a| a.user_id)
            .collect())
    }

    async fn org_members(&self, organization_id: Uuid) -> NimbusResult<Vec<OrgRoleAssignment>> {
        let mut result = self
            .db
            .query(
                "SELECT user_id, organization_id, role, created_at FROM org_role \
                 WHERE organization_id = $org_id ORDER BY created_at ASC",
            )
            .bind(("org_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<OrgRoleRow> = result.take(0).map_err(DbError::from)?;
        Ok(org_assignments(rows)?)
    }

    async fn add_space_role(&self, space: &Space, user_id: Uuid, role: SpaceRole) -> NimbusResult<()> {
        let space_id = space.id;
        let organization_id = space.organization_id;
        let role_str = role.as_str();
        let query = format!(
            "IF array::len((SELECT VALUE id FROM space_role \
             WHERE space_id = $space_id AND user_id = $user_id AND role = $role)) = 0 {{ \
             RELATE user:`{user_id}` -> space_role -> space:`{space_id}` \
             SET user_id = $user_id, space_id = $space_id, \
             organization_id = $org_id, role = $role }};"
        );

        self.db
            .query(query)
            .bind(("space_id", space_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .bind(("org_id", organization_id.to_string()))
            .bind(("role", role_str))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify("space_role", format!("{space_id}/{user_id}")))?;

        info!(%space_id, %user_id, role = role_str, "Space role granted");
        Ok(())
    }

    async fn remove_space_role(&self, space_id: Uuid, user_id: Uuid, role: SpaceRole) -> NimbusResult<()> {
        self.db
            .query(
                "DELETE space_role WHERE space_id = $space_id \
                 AND user_id = $user_id AND role = $role",
            )
            .bind(("space_id", space_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .bind(("role", role.as_str()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify("space_role", space_id))?;
        Ok(())
    }

    async fn space_members(&self, space_id: Uuid) -> NimbusResult<Vec<SpaceRoleAssignment>> {
        let mut result = self
            .db
            .query(
                "SELECT user_id, space_id, organization_id, role, created_at \
                 FROM space_role WHERE space_id = $space_id \
                 ORDER BY created_at ASC",
            )
            .bind(("space_id", space_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<SpaceRoleRow> = result.take(0).map_err(DbError::from)?;
        Ok(space_assignments(rows)?)
    }

    async fn roles_for_user(&self, user_id: Uuid) -> NimbusResult<UserRoles> {
        let mut result = self
            .db
            .query(
                "SELECT user_id, organization_id, role, created_at FROM org_role \
                 WHERE user_id = $user_id ORDER BY created_at ASC; \
                 SELECT user_id, space_id, organization_id, role, created_at \
                 FROM space_role WHERE user_id = $user_id \
                 ORDER BY created_at ASC;",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let org_rows: Vec<OrgRoleRow> = result.take(0).map_err(DbError::from)?;
        let space_rows: Vec<SpaceRoleRow> = result.take(1).map_err(DbError::from)?;
        Ok(UserRoles {
            org_roles: org_assignments(org_rows)?,
            space_roles: space_assignments(space_rows)?,
        })
    }

    async fn remove_user_from_organization(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        recursive: bool,
    ) -> NimbusResult<()> {
        // One guard statement, first in the transaction, covering both
        // refusal reasons.
        let guard = if recursive {
            format!("IF {SOLE_MANAGER_CONDITION} {{ THROW '{LAST_MANAGER}' }};")
        } else {
            format!(
                "IF array::len((SELECT VALUE id FROM space_role \
                 WHERE organization_id = $org_id AND user_id = $user_id)) > 0 \
                 {{ THROW '{SPACE_ROLES_REMAIN}' }} \
                 ELSE IF {SOLE_MANAGER_CONDITION} {{ THROW '{LAST_MANAGER}' }};"
            )
        };
        let statements = [
            "BEGIN TRANSACTION;",
            &guard,
            "DELETE space_role WHERE organization_id = $org_id AND user_id = $user_id;",
            "DELETE org_role WHERE organization_id = $org_id AND user_id = $user_id;",
            "COMMIT TRANSACTION;",
        ];

        self.db
            .query(statements.join("\n"))
            .bind(("org_id", organization_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify_membership("org_role", organization_id, Some(user_id)))?;

        info!(%organization_id, %user_id, recursive, "User removed from organization");
        Ok(())
    }
}
