//! Error types for the Nimbus control plane.

use thiserror::Error;
use uuid::Uuid;

/// Field-level validation failures (client-recoverable).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{entity} name '{name}' is already taken")]
    DuplicateName { entity: String, name: String },

    #[error("{field} is invalid: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("{field} is required")]
    Required { field: String },
}

/// Domain invariant breaches detected by the constraint engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintViolation {
    #[error(
        "app space {app_space_id} does not match service instance space {service_instance_space_id}"
    )]
    InvalidServiceBinding {
        app_space_id: Uuid,
        service_instance_space_id: Uuid,
    },

    #[error("private domain {domain_id} is not owned by organization {organization_id}")]
    UnauthorizedAccessToPrivateDomain {
        domain_id: Uuid,
        organization_id: Uuid,
    },

    #[error("organization {organization_id} must retain at least one manager")]
    LastManagerRemoval { organization_id: Uuid },

    #[error("{entity} {id} still has associated {association}")]
    AssociationNotEmpty {
        entity: String,
        id: Uuid,
        association: String,
    },

    #[error("quota exceeded for organization {organization_id}: {message}")]
    QuotaExceeded {
        organization_id: Uuid,
        message: String,
    },

    #[error("invalid relation: {message}")]
    InvalidRelation { message: String },

    #[error("organization {organization_id} is suspended")]
    OrganizationSuspended { organization_id: Uuid },
}

impl ConstraintViolation {
    /// Stable machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidServiceBinding { .. } => "InvalidServiceBinding",
            Self::UnauthorizedAccessToPrivateDomain { .. } => "UnauthorizedAccessToPrivateDomain",
            Self::LastManagerRemoval { .. } => "LastManagerRemoval",
            Self::AssociationNotEmpty { .. } => "AssociationNotEmpty",
            Self::QuotaExceeded { .. } => "QuotaExceeded",
            Self::InvalidRelation { .. } => "InvalidRelation",
            Self::OrganizationSuspended { .. } => "OrganizationSuspended",
        }
    }
}

#[derive(Debug, Error)]
pub enum NimbusError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Constraint violation: {0}")]
    Constraint(#[from] ConstraintViolation),

    #[error("Authentication failed: {reason}")]
    Unauthenticated { reason: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NimbusError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// HTTP-equivalent status class for the transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) | Self::Constraint(_) => 422,
            Self::Unauthenticated { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::Conflict { .. } => 409,
            Self::Database(_) | Self::Crypto(_) | Self::Internal(_) => 500,
        }
    }
}

pub type NimbusResult<T> = Result<T, NimbusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violations_surface_as_unprocessable() {
        let err: NimbusError = ConstraintViolation::LastManagerRemoval {
            organization_id: Uuid::new_v4(),
        }
        .into();
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn duplicate_name_is_a_validation_error() {
        let err: NimbusError = ValidationError::DuplicateName {
            entity: "organization".into(),
            name: "acme".into(),
        }
        .into();
        assert_eq!(err.status_code(), 422);
        assert!(err.to_string().contains("acme"));
    }

    #[test]
    fn reason_codes_are_stable() {
        let v = ConstraintViolation::AssociationNotEmpty {
            entity: "organization".into(),
            id: Uuid::nil(),
            association: "space roles".into(),
        };
        assert_eq!(v.reason_code(), "AssociationNotEmpty");
    }
}
