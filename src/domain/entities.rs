//! Domain entities mirrored from the members store.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::AccountStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub status: AccountStatus,
    pub is_admin: bool,
    pub plan_id: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRecord {
    pub id: i64,
    pub name: String,
    /// Monthly price in cents.
    pub amount_cents: i64,
    pub created_at: OffsetDateTime,
}

impl PlanRecord {
    /// Price rendered as dollars, e.g. `$10.00`.
    pub fn formatted_amount(&self) -> String {
        let sign = if self.amount_cents < 0 { "-" } else { "" };
        let cents = self.amount_cents.unsigned_abs();
        format!("{sign}${}.{:02}", cents / 100, cents % 100)
    }
}
