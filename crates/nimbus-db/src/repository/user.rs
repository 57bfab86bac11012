//! SurrealDB implementation of [`UserRepository`].
//!
//! Users are identities known to the control plane. Credentials live with
//! the external token issuer, so the record only carries a username.

use chrono::{DateTime, Utc};
use nimbus_core::error::NimbusResult;
use nimbus_core::models::user::{CreateUser, User};
use nimbus_core::repository::UserRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, classify, parse_uuid};

const ENTITY: &str = "user";

#[derive(Debug, SurrealValue)]
struct UserRow {
    record_id: String,
    username: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, DbError> {
        Ok(User {
            id: parse_uuid(ENTITY, &self.record_id)?,
            username: self.username,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> NimbusResult<User> {
        // Token subjects are minted elsewhere; honour a caller-supplied id.
        let id = input.id.unwrap_or_else(Uuid::new_v4);

        self.db
            .query("CREATE type::record('user', $id) SET username = $username")
            .bind(("id", id.to_string()))
            .bind(("username", input.username.clone()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(classify(ENTITY, &input.username))?;

        info!(user_id = %id, username = %input.username, "User created");
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> NimbusResult<User> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('user', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(ENTITY, id))?;
        Ok(row.try_into_user()?)
    }

    async fn find_by_username(&self, username: &str) -> NimbusResult<Option<User>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM user WHERE username = $username")
            .bind(("username", username.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(UserRow::try_into_user)
            .transpose()?)
    }
}
