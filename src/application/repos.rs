//! Repository traits describing the members store.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{PlanRecord, UserRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[async_trait]
pub trait MembersRepo: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    /// Insert an inactive account. Fails with [`RepoError::Duplicate`] when the
    /// email is already registered.
    async fn insert_user(&self, user: NewUserRecord) -> Result<UserRecord, RepoError>;

    async fn activate_user(&self, email: &str) -> Result<UserRecord, RepoError>;

    /// Constant-time comparison of a candidate password against the stored digest.
    async fn password_matches(&self, user: &UserRecord, candidate: &str)
    -> Result<bool, RepoError>;

    async fn list_plans(&self) -> Result<Vec<PlanRecord>, RepoError>;

    async fn find_plan(&self, id: i64) -> Result<Option<PlanRecord>, RepoError>;

    async fn subscribe_user_to_plan(&self, user_id: Uuid, plan_id: i64) -> Result<(), RepoError>;
}
