//! Usage event emission.
//!
//! The emitter turns lifecycle transitions into [`NewUsageEvent`]s. Billing
//! events are added next to app and service events when billing event
//! writing is enabled platform-wide and for the owning organization.
//!
//! Events are built before the write that causes them and handed to the
//! repository, which commits them in the same transaction.

use nimbus_core::models::app::{App, NewApp};
use nimbus_core::models::organization::Organization;
use nimbus_core::models::service_instance::{
    NewServiceInstance, ServiceInstance, ServiceInstanceKind,
};
use nimbus_core::models::usage_event::{NewUsageEvent, UsageEventKind, UsageState};
use uuid::Uuid;

/// The app fields a usage event records.
#[derive(Debug, Clone, Copy)]
pub struct AppUsage<'a> {
    pub id: Uuid,
    pub space_id: Uuid,
    pub name: &'a str,
    pub memory_mb: u64,
    pub instances: u32,
}

impl<'a> From<&'a App> for AppUsage<'a> {
    fn from(app: &'a App) -> Self {
        Self {
            id: app.id,
            space_id: app.space_id,
            name: &app.name,
            memory_mb: app.memory_mb,
            instances: app.instances,
        }
    }
}

impl<'a> From<&'a NewApp> for AppUsage<'a> {
    fn from(app: &'a NewApp) -> Self {
        Self {
            id: app.id,
            space_id: app.space_id,
            name: &app.name,
            memory_mb: app.memory_mb,
            instances: app.instances,
        }
    }
}

/// The service instance fields a usage event records.
#[derive(Debug, Clone, Copy)]
pub struct ServiceUsage<'a> {
    pub id: Uuid,
    pub space_id: Uuid,
    pub name: &'a str,
    pub kind: &'a ServiceInstanceKind,
}

impl<'a> From<&'a ServiceInstance> for ServiceUsage<'a> {
    fn from(instance: &'a ServiceInstance) -> Self {
        Self {
            id: instance.id,
            space_id: instance.space_id,
            name: &instance.name,
            kind: &instance.kind,
        }
    }
}

impl<'a> From<&'a NewServiceInstance> for ServiceUsage<'a> {
    fn from(instance: &'a NewServiceInstance) -> Self {
        Self {
            id: instance.id,
            space_id: instance.space_id,
            name: &instance.name,
            kind: &instance.kind,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UsageEventEmitter {
    billing_event_writing_enabled: bool,
}

impl UsageEventEmitter {
    pub fn new(billing_event_writing_enabled: bool) -> Self {
        Self {
            billing_event_writing_enabled,
        }
    }

    fn bills(&self, organization: &Organization) -> bool {
        self.billing_event_writing_enabled && organization.billing_enabled
    }

    fn with_billing(&self, organization: &Organization, event: NewUsageEvent) -> Vec<NewUsageEvent> {
        if self.bills(organization) {
            let billing = NewUsageEvent {
                kind: UsageEventKind::Billing,
                ..event.clone()
            };
            vec![event, billing]
        } else {
            vec![event]
        }
    }

    /// Events for an app entering `state`.
    ///
    /// Only start and stop transitions are billed.
    pub fn app_events<'a>(
        &self,
        organization: &Organization,
        app: impl Into<AppUsage<'a>>,
        state: UsageState,
    ) -> Vec<NewUsageEvent> {
        let app = app.into();
        let event = NewUsageEvent {
            kind: UsageEventKind::App,
            state,
            resource_id: app.id,
            resource_name: app.name.to_string(),
            organization_id: organization.id,
            space_id: Some(app.space_id),
            memory_mb: Some(app.memory_mb),
            instances: Some(app.instances),
        };
        match state {
            UsageState::Started | UsageState::Stopped => self.with_billing(organization, event),
            _ => vec![event],
        }
    }

    /// Events for a service instance entering `state`.
    ///
    /// Only managed instances are billed, on creation and deletion.
    pub fn service_events<'a>(
        &self,
        organization: &Organization,
        instance: impl Into<ServiceUsage<'a>>,
        state: UsageState,
    ) -> Vec<NewUsageEvent> {
        let instance = instance.into();
        let event = NewUsageEvent {
            kind: UsageEventKind::Service,
            state,
            resource_id: instance.id,
            resource_name: instance.name.to_string(),
            organization_id: organization.id,
            space_id: Some(instance.space_id),
            memory_mb: None,
            instances: None,
        };
        let billable = matches!(instance.kind, ServiceInstanceKind::Managed { .. })
            && matches!(state, UsageState::Created | UsageState::Deleted);
        if billable {
            self.with_billing(organization, event)
        } else {
            vec![event]
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use nimbus_core::models::app::{AppState, PackageState};
    use nimbus_core::models::organization::OrganizationStatus;
    use uuid::Uuid;

    use super::*;

    fn org(billing_enabled: bool) -> Organization {
        Organization {
            id: Uuid::new_v4(),
            name: "acme".into(),
            status: OrganizationStatus::Active,
            billing_enabled,
            quota_definition_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn app() -> App {
        App {
            id: Uuid::new_v4(),
            space_id: Uuid::new_v4(),
            name: "web".into(),
            state: AppState::Started,
            memory_mb: 256,
            instances: 2,
            package_state: PackageState::Staged,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stop_event_references_app_and_organization() {
        let org = org(false);
        let app = app();
        let events = UsageEventEmitter::new(true).app_events(&org, &app, UsageState::Stopped);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_id, app.id);
        assert_eq!(events[0].organization_id, org.id);
        assert_eq!(events[0].memory_mb, Some(256));
    }

    #[test]
    fn billing_requires_both_switches() {
        let app = app();
        let billed = org(true);
        assert_eq!(
            UsageEventEmitter::new(true)
                .app_events(&billed, &app, UsageState::Started)
                .iter()
                .map(|e| e.kind)
                .collect::<Vec<_>>(),
            vec![UsageEventKind::App, UsageEventKind::Billing]
        );
        assert_eq!(
            UsageEventEmitter::new(false)
                .app_events(&billed, &app, UsageState::Started)
                .len(),
            1
        );
        assert_eq!(
            UsageEventEmitter::new(true)
                .app_events(&billed, &app, UsageState::Created)
                .len(),
            1
        );
    }

    #[test]
    fn user_provided_services_are_not_billed() {
        let org = org(true);
        let instance = ServiceInstance {
            id: Uuid::new_v4(),
            space_id: Uuid::new_v4(),
            name: "logs".into(),
            kind: ServiceInstanceKind::UserProvided {
                syslog_drain_url: None,
            },
            encrypted_credentials: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let events =
            UsageEventEmitter::new(true).service_events(&org, &instance, UsageState::Created);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, UsageEventKind::Service);
    }
}
