//! Service plan visibility: makes a non-public service plan available to
//! one organization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServicePlanVisibility {
    pub id: Uuid,
    pub service_plan_id: Uuid,
    pub organization_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServicePlanVisibility {
    pub service_plan_id: Uuid,
    pub organization_id: Uuid,
}
