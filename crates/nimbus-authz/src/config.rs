//! Identity and authorization configuration.

/// Configuration for access-token validation and scope mapping.
#[derive(Debug, Clone)]
pub struct AuthzConfig {
    /// PEM-encoded Ed25519 private key for JWT signing. Only needed by
    /// issuers (the seed tooling and tests); validation uses the public key.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for JWT verification.
    pub jwt_public_key_pem: String,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Access token lifetime in seconds (default: 600 = 10 minutes).
    pub access_token_lifetime_secs: u64,
    /// Scope granting the `admin` global role.
    pub admin_scope: String,
    /// Scope granting the `admin_read_only` global role.
    pub admin_read_only_scope: String,
    /// Scope granting the `global_auditor` global role.
    pub global_auditor_scope: String,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            jwt_issuer: "nimbus".into(),
            access_token_lifetime_secs: 600,
            admin_scope: "cloud_controller.admin".into(),
            admin_read_only_scope: "cloud_controller.admin_read_only".into(),
            global_auditor_scope: "cloud_controller.global_auditor".into(),
        }
    }
}
