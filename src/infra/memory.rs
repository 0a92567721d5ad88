//! In-process members store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{MembersRepo, NewUserRecord, RepoError};
use crate::domain::entities::{PlanRecord, UserRecord};
use crate::domain::types::AccountStatus;

const EMAIL_CONSTRAINT: &str = "users_email_key";

/// Users keyed by lowercased email, plus a fixed plan catalogue.
#[derive(Clone)]
pub struct MemoryMembersRepo {
    users: Arc<DashMap<String, UserRecord>>,
    plans: Arc<Vec<PlanRecord>>,
}

impl Default for MemoryMembersRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMembersRepo {
    /// Empty user table with the Bronze, Silver and Gold plans.
    pub fn new() -> Self {
        let now = OffsetDateTime::now_utc();
        let plans = [("Bronze", 1000), ("Silver", 2000), ("Gold", 3000)]
            .into_iter()
            .zip(1..)
            .map(|((name, amount_cents), id)| PlanRecord {
                id,
                name: name.to_string(),
                amount_cents,
                created_at: now,
            })
            .collect();

        Self {
            users: Arc::new(DashMap::new()),
            plans: Arc::new(plans),
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

fn key(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// One round of SHA-256 salted with the user id. This is not a password KDF
/// and is only fit for the in-process store.
fn password_digest(id: Uuid, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl MembersRepo for MemoryMembersRepo {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.users.get(&key(email)).map(|entry| entry.value().clone()))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.value().id == id)
            .map(|entry| entry.value().clone()))
    }

    async fn insert_user(&self, user: NewUserRecord) -> Result<UserRecord, RepoError> {
        let email = user.email.trim();
        if !email.contains('@') {
            return Err(RepoError::InvalidInput {
                message: format!("`{email}` is not an email address"),
            });
        }
        if user.password.is_empty() {
            return Err(RepoError::InvalidInput {
                message: "password must not be empty".to_string(),
            });
        }

        match self.users.entry(key(email)) {
            Entry::Occupied(_) => Err(RepoError::Duplicate {
                constraint: EMAIL_CONSTRAINT.to_string(),
            }),
            Entry::Vacant(slot) => {
                let id = Uuid::new_v4();
                let now = OffsetDateTime::now_utc();
                let record = UserRecord {
                    id,
                    email: email.to_string(),
                    first_name: user.first_name,
                    last_name: user.last_name,
                    password_digest: password_digest(id, &user.password),
                    status: AccountStatus::Pending,
                    is_admin: false,
                    plan_id: None,
                    created_at: now,
                    updated_at: now,
                };
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn activate_user(&self, email: &str) -> Result<UserRecord, RepoError> {
        let mut entry = self.users.get_mut(&key(email)).ok_or(RepoError::NotFound)?;
        let user = entry.value_mut();
        user.status = AccountStatus::Active;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn password_matches(
        &self,
        user: &UserRecord,
        candidate: &str,
    ) -> Result<bool, RepoError> {
        let computed = password_digest(user.id, candidate);
        Ok(computed
            .as_bytes()
            .ct_eq(user.password_digest.as_bytes())
            .into())
    }

    async fn list_plans(&self) -> Result<Vec<PlanRecord>, RepoError> {
        Ok(self.plans.as_ref().clone())
    }

    async fn find_plan(&self, id: i64) -> Result<Option<PlanRecord>, RepoError> {
        Ok(self.plans.iter().find(|plan| plan.id == id).cloned())
    }

    async fn subscribe_user_to_plan(&self, user_id: Uuid, plan_id: i64) -> Result<(), RepoError> {
        if !self.plans.iter().any(|plan| plan.id == plan_id) {
            return Err(RepoError::NotFound);
        }

        let mut entry = self
            .users
            .iter_mut()
            .find(|entry| entry.value().id == user_id)
            .ok_or(RepoError::NotFound)?;
        let user = entry.value_mut();
        user.plan_id = Some(plan_id);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}
