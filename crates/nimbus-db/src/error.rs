//! Database-specific error types and conversions.

use std::fmt::Display;

use nimbus_core::error::{ConstraintViolation, NimbusError, ValidationError};
use tracing::warn;
use uuid::Uuid;

/// Thrown by transaction guards when removing the last manager.
pub(crate) const LAST_MANAGER: &str = "nimbus:last_manager";
/// Thrown by cascade guards when the subtree changed after planning.
pub(crate) const STALE_PLAN: &str = "nimbus:stale_plan";
/// Thrown when a user still holds space roles in an organization.
pub(crate) const SPACE_ROLES_REMAIN: &str = "nimbus:space_roles_remain";

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt {entity} row: {message}")]
    Corrupt { entity: String, message: String },

    #[error("Unique index violation on {entity}: {key}")]
    Duplicate { entity: String, key: String },

    #[error("Organization {organization_id} would lose its last manager")]
    LastManager { organization_id: Uuid },

    #[error("User {user_id} still holds space roles in organization {organization_id}")]
    SpaceRolesRemain { organization_id: Uuid, user_id: Uuid },

    #[error("Deletion plan is stale")]
    StalePlan,
}

impl DbError {
    pub(crate) fn corrupt(entity: &str, message: impl Display) -> Self {
        Self::Corrupt {
            entity: entity.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn not_found(entity: &str, id: impl Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}

/// Maps a failed statement to the most specific [`DbError`].
///
/// Unique index violations become [`DbError::Duplicate`] for `entity` and
/// `key`; guard sentinels become their dedicated variants.
pub(crate) fn classify<E: Display>(entity: &str, key: impl Display) -> impl FnOnce(E) -> DbError {
    let entity = entity.to_string();
    let key = key.to_string();
    move |err| {
        let message = err.to_string();
        if message.contains("already contains") {
            warn!(%entity, %key, "unique index rejected write");
            DbError::Duplicate { entity, key }
        } else if message.contains(STALE_PLAN) {
            DbError::StalePlan
        } else {
            DbError::Query(message)
        }
    }
}

/// Like [`classify`], for writes guarded by the membership sentinels.
pub(crate) fn classify_membership<E: Display>(
    entity: &str,
    organization_id: Uuid,
    user_id: Option<Uuid>,
) -> impl FnOnce(E) -> DbError {
    let entity = entity.to_string();
    move |err| {
        let message = err.to_string();
        if message.contains(LAST_MANAGER) {
            DbError::LastManager { organization_id }
        } else if let (true, Some(user_id)) = (message.contains(SPACE_ROLES_REMAIN), user_id) {
            DbError::SpaceRolesRemain {
                organization_id,
                user_id,
            }
        } else {
            classify(&entity, organization_id)(message)
        }
    }
}

/// Parses a stored UUID string.
pub(crate) fn parse_uuid(entity: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::corrupt(entity, format!("invalid UUID: {e}")))
}

pub(crate) fn parse_opt_uuid(entity: &str, value: Option<&str>) -> Result<Option<Uuid>, DbError> {
    value.map(|v| parse_uuid(entity, v)).transpose()
}

pub(crate) fn id_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

impl From<DbError> for NimbusError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => NimbusError::NotFound { entity, id },
            DbError::Duplicate { entity, key } => {
                ValidationError::DuplicateName { entity, name: key }.into()
            }
            DbError::LastManager { organization_id } => {
                ConstraintViolation::LastManagerRemoval { organization_id }.into()
            }
            DbError::SpaceRolesRemain {
                organization_id,
                user_id,
            } => ConstraintViolation::AssociationNotEmpty {
                entity: "organization".into(),
                id: organization_id,
                association: format!("space roles of user {user_id}"),
            }
            .into(),
            DbError::StalePlan => NimbusError::Conflict {
                message: "resources changed while the deletion was being planned; retry".into(),
            },
            other => NimbusError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_detects_unique_index_violations() {
        let err = classify::<&str>("organization", "acme")(
            "Database index `idx_organization_name` already contains 'acme'",
        );
        assert!(matches!(err, DbError::Duplicate { .. }));
        let nimbus: NimbusError = err.into();
        assert!(matches!(
            nimbus,
            NimbusError::Validation(ValidationError::DuplicateName { .. })
        ));
    }

    #[test]
    fn classify_detects_stale_plans() {
        let err = classify::<String>("organization", "x")(format!(
            "An error occurred: {STALE_PLAN}"
        ));
        assert!(matches!(err, DbError::StalePlan));
        assert_eq!(NimbusError::from(err).status_code(), 409);
    }

    #[test]
    fn other_failures_are_database_errors() {
        let err = classify::<&str>("space", "x")("parse error");
        assert_eq!(NimbusError::from(err).status_code(), 500);
    }
}
