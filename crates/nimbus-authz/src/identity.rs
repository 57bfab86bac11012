//! Identity resolution: access token → [`Permissions`].

use nimbus_core::error::NimbusResult;
use nimbus_core::models::role::GlobalRole;
use nimbus_core::repository::RoleRepository;
use tracing::debug;
use uuid::Uuid;

use crate::config::AuthzConfig;
use crate::error::AuthzError;
use crate::policy::Permissions;
use crate::token::{self, AccessTokenClaims};

/// Resolves bearer tokens into the caller's role set.
///
/// Generic over the role repository so that the authorization layer
/// has no dependency on the database crate.
pub struct IdentityResolver<R: RoleRepository> {
    roles: R,
    config: AuthzConfig,
}

impl<R: RoleRepository> IdentityResolver<R> {
    pub fn new(roles: R, config: AuthzConfig) -> Self {
        Self { roles, config }
    }

    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }

    /// Global roles granted by the token's scopes.
    pub fn global_roles(&self, claims: &AccessTokenClaims) -> Vec<GlobalRole> {
        [
            (&self.config.admin_scope, GlobalRole::Admin),
            (&self.config.admin_read_only_scope, GlobalRole::AdminReadOnly),
            (&self.config.global_auditor_scope, GlobalRole::GlobalAuditor),
        ]
        .into_iter()
        .filter(|(scope, _)| claims.has_scope(scope))
        .map(|(_, role)| role)
        .collect()
    }

    /// Validates `token` and loads the subject's stored org and space roles.
    pub async fn resolve(&self, token: &str) -> NimbusResult<Permissions> {
        let claims = token::decode_access_token(token, &self.config)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthzError::InvalidSubject(claims.sub.clone()))?;

        let global_roles = self.global_roles(&claims);
        let roles = self.roles.roles_for_user(user_id).await?;
        debug!(
            %user_id,
            global_roles = global_roles.len(),
            org_roles = roles.org_roles.len(),
            space_roles = roles.space_roles.len(),
            "Resolved identity"
        );

        Ok(Permissions::new(user_id, global_roles, roles))
    }
}
