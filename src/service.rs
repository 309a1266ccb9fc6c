//! Application service: the store plus the policies and sinks operations need
//!
//! Operations are spread over `impl Service` blocks in `pets`, `parent_request`,
//! `lineage`, `breeding`, `adoption` and `notify`.

use crate::config::ApproverPolicy;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::notify::{NotificationSink, StoreNotifier};
use std::sync::Arc;

#[derive(Clone)]
pub struct Service {
    db: Database,
    notifier: Arc<dyn NotificationSink>,
    approver: ApproverPolicy,
}

impl Service {
    /// Service storing notifications in the same database
    pub fn new(db: Database, approver: ApproverPolicy) -> Self {
        let notifier = Arc::new(StoreNotifier::new(db.clone()));
        Self { db, notifier, approver }
    }

    /// Replace the notification sink
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn approver(&self) -> ApproverPolicy {
        self.approver
    }

    pub(crate) fn notifier(&self) -> &dyn NotificationSink {
        self.notifier.as_ref()
    }
}

/// The verified caller, or `Unauthorized` for anonymous calls
pub fn require_user(viewer: Option<&str>) -> Result<&str> {
    match viewer {
        Some(user) if !user.trim().is_empty() => Ok(user),
        _ => Err(AppError::Unauthorized("Sign in required".to_string())),
    }
}
