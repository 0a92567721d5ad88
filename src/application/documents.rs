//! Document generation for subscription mail.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use time::{OffsetDateTime, macros::format_description};

use crate::domain::entities::{PlanRecord, UserRecord};

/// Attachment name used for generated manuals.
pub const MANUAL_ATTACHMENT_NAME: &str = "manual.txt";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to write `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("document generation failed: {0}")]
    Generation(String),
}

impl DocumentError {
    pub fn generation(err: impl std::fmt::Display) -> Self {
        Self::Generation(err.to_string())
    }
}

/// A document written to the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    /// Name the recipient sees.
    pub name: String,
    pub path: PathBuf,
}

#[async_trait]
pub trait InvoiceGenerator: Send + Sync {
    async fn invoice(&self, user: &UserRecord, plan: &PlanRecord) -> Result<String, DocumentError>;
}

#[async_trait]
pub trait ManualGenerator: Send + Sync {
    async fn manual(
        &self,
        user: &UserRecord,
        plan: &PlanRecord,
    ) -> Result<GeneratedDocument, DocumentError>;
}

/// Invoice body is the plan's formatted monthly amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanInvoiceGenerator;

#[async_trait]
impl InvoiceGenerator for PlanInvoiceGenerator {
    async fn invoice(&self, _user: &UserRecord, plan: &PlanRecord) -> Result<String, DocumentError> {
        Ok(plan.formatted_amount())
    }
}

/// Writes a plain-text manual into the scratch directory.
///
/// Files are kept after delivery; the operator owns `storage.scratch_dir`
/// and its retention.
#[derive(Debug, Clone)]
pub struct ScratchManualWriter {
    scratch_dir: PathBuf,
}

impl ScratchManualWriter {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    fn contents(user: &UserRecord, plan: &PlanRecord) -> String {
        format!(
            "Manual for {name}\n\n\
             Plan: {plan_name}\n\
             Price: {amount} per month\n\n\
             Sign in with {email} to manage your subscription.\n",
            name = user.full_name(),
            plan_name = plan.name,
            amount = plan.formatted_amount(),
            email = user.email,
        )
    }
}

#[async_trait]
impl ManualGenerator for ScratchManualWriter {
    async fn manual(
        &self,
        user: &UserRecord,
        plan: &PlanRecord,
    ) -> Result<GeneratedDocument, DocumentError> {
        let stamp = OffsetDateTime::now_utc()
            .format(format_description!("[year]-[month]-[day]-[hour][minute]"))
            .map_err(DocumentError::generation)?;
        let prefix = format!("{stamp}_{}_", user.id);
        let contents = Self::contents(user, plan);
        let dir = self.scratch_dir.clone();

        let path = tokio::task::spawn_blocking(move || -> Result<PathBuf, DocumentError> {
            let io_error = |source| DocumentError::Io {
                path: dir.clone(),
                source,
            };
            std::fs::create_dir_all(&dir).map_err(io_error)?;
            let mut file = tempfile::Builder::new()
                .prefix(&prefix)
                .suffix("_manual.txt")
                .tempfile_in(&dir)
                .map_err(io_error)?;
            file.write_all(contents.as_bytes()).map_err(io_error)?;
            let (_, path) = file.keep().map_err(|err| io_error(err.error))?;
            Ok(path)
        })
        .await
        .map_err(DocumentError::generation)??;

        Ok(GeneratedDocument {
            name: MANUAL_ATTACHMENT_NAME.to_string(),
            path,
        })
    }
}
