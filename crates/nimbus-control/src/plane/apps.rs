use nimbus_authz::policy::{Child, Operation, Permissions};
use nimbus_core::error::{NimbusResult, ValidationError};
use nimbus_core::models::app::{App, AppState, CreateApp, NewApp, UpdateApp};
use nimbus_core::models::deletion::DeletedSet;
use nimbus_core::models::usage_event::UsageState;
use nimbus_core::repository::{AppRepository, PaginatedResult, Pagination, ResourceStore};
use tracing::info;
use uuid::Uuid;

use super::{ControlPlane, space_node};
use crate::constraints::ProposedChange;
use crate::usage::AppUsage;

fn positive_memory(memory_mb: Option<u64>) -> Result<(), ValidationError> {
    if memory_mb == Some(0) {
        return Err(ValidationError::InvalidFormat {
            field: "app.memory_mb".into(),
            message: "must be greater than zero".into(),
        });
    }
    Ok(())
}

impl<S: ResourceStore> ControlPlane<S> {
    /// Creates a stopped app in a space.
    pub async fn create_app(&self, perms: &Permissions, input: CreateApp) -> NimbusResult<App> {
        let (space, organization) = self.visible_space(perms, input.space_id).await?;
        perms
            .authorize(Operation::Create(Child::App), &space_node(&space))
            .into_result("space", space.id)?;
        Self::ensure_writable(perms, &organization)?;

        self.validate(ProposedChange::CreateApp {
            space_id: space.id,
            name: &input.name,
        })
        .await?;
        positive_memory(input.memory_mb)?;

        let new_app = NewApp {
            id: Uuid::new_v4(),
            space_id: space.id,
            name: input.name,
            memory_mb: input.memory_mb.unwrap_or(self.config.default_app_memory_mb),
            instances: input.instances.unwrap_or(1),
        };
        let events = self
            .emitter
            .app_events(&organization, &new_app, UsageState::Created);
        self.store.apps().create(new_app, events).await
    }

    pub async fn get_app(&self, perms: &Permissions, id: Uuid) -> NimbusResult<App> {
        let app = self.store.apps().get_by_id(id).await?;
        self.authorize_in_space(perms, Operation::Read, "app", id, app.space_id)
            .await?;
        Ok(app)
    }

    /// Visible apps, optionally limited to one space.
    pub async fn list_apps(
        &self,
        perms: &Permissions,
        space_id: Option<Uuid>,
        pagination: Pagination,
    ) -> NimbusResult<PaginatedResult<App>> {
        let scope = self.listing_scope(perms, space_id).await?;
        let apps = self.store.apps().list_by_spaces(&scope).await?;
        Ok(PaginatedResult::from_vec(apps, pagination))
    }

    /// Renames, scales, starts or stops an app.
    ///
    /// Starting an app, or scaling one that is running, must fit the
    /// organization's memory quota.
    pub async fn update_app(
        &self,
        perms: &Permissions,
        id: Uuid,
        input: UpdateApp,
    ) -> NimbusResult<App> {
        let app = self.store.apps().get_by_id(id).await?;
        let (_, organization) = self
            .authorize_in_space(perms, Operation::Update, "app", id, app.space_id)
            .await?;

        if let Some(name) = &input.name {
            self.validate(ProposedChange::RenameApp { app: &app, name })
                .await?;
        }
        positive_memory(input.memory_mb)?;

        let state = input.state.unwrap_or(app.state);
        let memory_mb = input.memory_mb.unwrap_or(app.memory_mb);
        let instances = input.instances.unwrap_or(app.instances);
        let starting = state == AppState::Started && !app.is_started();
        let stopping = state == AppState::Stopped && app.is_started();
        let scaling = state == AppState::Started
            && app.is_started()
            && (memory_mb != app.memory_mb || instances != app.instances);

        if starting || scaling {
            self.validate(ProposedChange::RunApp {
                organization: &organization,
                app_id: Some(id),
                memory_mb,
                instances,
            })
            .await?;
        }

        let transition = if starting {
            Some(UsageState::Started)
        } else if stopping {
            Some(UsageState::Stopped)
        } else if scaling {
            Some(UsageState::Updated)
        } else {
            None
        };
        let events = match transition {
            Some(transition) => {
                let after = AppUsage {
                    name: input.name.as_deref().unwrap_or(&app.name),
                    memory_mb,
                    instances,
                    ..AppUsage::from(&app)
                };
                self.emitter.app_events(&organization, after, transition)
            }
            None => Vec::new(),
        };

        let updated = self.store.apps().update(id, input, events).await?;
        if let Some(state) = transition {
            info!(app_id = %id, state = state.as_str(), "App state changed");
        }
        Ok(updated)
    }

    pub async fn start_app(&self, perms: &Permissions, id: Uuid) -> NimbusResult<App> {
        self.update_app(
            perms,
            id,
            UpdateApp {
                state: Some(AppState::Started),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn stop_app(&self, perms: &Permissions, id: Uuid) -> NimbusResult<App> {
        self.update_app(
            perms,
            id,
            UpdateApp {
                state: Some(AppState::Stopped),
                ..Default::default()
            },
        )
        .await
    }

    /// Deletes an app and its service bindings.
    pub async fn delete_app(&self, perms: &Permissions, id: Uuid) -> NimbusResult<DeletedSet> {
        let app = self.store.apps().get_by_id(id).await?;
        let (_, organization) = self
            .authorize_in_space(perms, Operation::Delete, "app", id, app.space_id)
            .await?;
        let plan = self.planner().plan_app(&organization, &app).await?;
        self.execute_plan(&plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_memory_is_rejected() {
        assert!(positive_memory(Some(0)).is_err());
        assert!(positive_memory(Some(1)).is_ok());
        assert!(positive_memory(None).is_ok());
    }
}
