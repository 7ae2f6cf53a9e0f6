//! Notification fan-out and per-user read state.
//!
//! A broadcast writes one row addressed to every active user. Each recipient
//! then marks it read or clears it independently on that shared row.

use chrono::{DateTime, FixedOffset};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use khidmat_common::{AppError, AppResult, IdGenerator};
use khidmat_db::{
    entities::notification::{self, NotificationType},
    repositories::{NotificationRepository, UserRepository},
};

/// Message body of a broadcast: bare text, or text plus the miqaat it is about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NotificationMessage {
    Text(String),
    #[serde(rename_all = "camelCase")]
    Structured {
        text: String,
        #[serde(default)]
        miqaat_id: Option<String>,
    },
}

impl NotificationMessage {
    fn into_parts(self) -> (String, Option<String>) {
        match self {
            Self::Text(text) => (text, None),
            Self::Structured { text, miqaat_id } => (text, miqaat_id),
        }
    }
}

impl From<String> for NotificationMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for NotificationMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Input for a general broadcast.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastInput {
    #[validate(length(min = 1, max = 2000))]
    pub message: String,

    #[serde(default = "default_broadcast_type")]
    pub notification_type: NotificationType,

    #[serde(default)]
    pub miqaat_id: Option<String>,
}

const fn default_broadcast_type() -> NotificationType {
    NotificationType::General
}

/// A notification as seen by one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub miqaat_id: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<FixedOffset>,
    pub read: bool,
}

impl NotificationView {
    fn for_user(model: notification::Model, user_id: &str) -> AppResult<Self> {
        let read = model.readers()?.iter().any(|id| id == user_id);
        Ok(Self {
            id: model.id,
            message: model.message,
            notification_type: model.notification_type,
            miqaat_id: model.miqaat_id,
            created_by: model.created_by,
            created_at: model.created_at,
            read,
        })
    }
}

/// Notification service for business logic.
#[derive(Clone)]
pub struct NotificationService {
    notification_repo: NotificationRepository,
    user_repo: UserRepository,
    id_gen: IdGenerator,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub const fn new(notification_repo: NotificationRepository, user_repo: UserRepository) -> Self {
        Self {
            notification_repo,
            user_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create one notification addressed to every active user.
    ///
    /// Returns `None` without writing anything when there are no active users.
    pub async fn broadcast(
        &self,
        notification_type: NotificationType,
        message: impl Into<NotificationMessage> + Send,
        created_by: &str,
    ) -> AppResult<Option<notification::Model>> {
        let (text, miqaat_id) = message.into().into_parts();

        let audience = self.user_repo.find_active_ids().await?;
        if audience.is_empty() {
            tracing::info!(kind = ?notification_type, "No active users, notification skipped");
            return Ok(None);
        }

        let model = notification::ActiveModel {
            id: Set(self.id_gen.generate()),
            message: Set(text),
            notification_type: Set(notification_type),
            miqaat_id: Set(miqaat_id),
            created_by: Set(created_by.to_string()),
            for_users: Set(json!(audience)),
            read_by: Set(json!([])),
            created_at: Set(chrono::Utc::now().into()),
        };

        let created = self.notification_repo.create(model).await?;
        tracing::info!(
            notification_id = %created.id,
            kind = ?notification_type,
            recipients = audience.len(),
            "Notification broadcast"
        );
        Ok(Some(created))
    }

    /// [`Self::broadcast`] as a side effect: failures are logged and dropped.
    pub async fn broadcast_best_effort(
        &self,
        notification_type: NotificationType,
        message: impl Into<NotificationMessage> + Send,
        created_by: &str,
    ) -> Option<notification::Model> {
        match self.broadcast(notification_type, message, created_by).await {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(error = %e, kind = ?notification_type, "Notification fan-out failed");
                None
            }
        }
    }

    /// Administrative general broadcast.
    pub async fn broadcast_input(
        &self,
        input: BroadcastInput,
        created_by: &str,
    ) -> AppResult<Option<notification::Model>> {
        input.validate()?;
        let message = NotificationMessage::Structured {
            text: input.message,
            miqaat_id: input.miqaat_id,
        };
        self.broadcast(input.notification_type, message, created_by)
            .await
    }

    /// Notifications currently addressed to a user, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<NotificationView>> {
        self.notification_repo
            .find_for_user(user_id)
            .await?
            .into_iter()
            .map(|n| NotificationView::for_user(n, user_id))
            .collect()
    }

    /// Number of unread notifications for a user.
    pub async fn unread_count(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.count_unread(user_id).await
    }

    /// Mark one notification read. Idempotent.
    ///
    /// The write is guarded on the user being a recipient, and the view is
    /// built from the row as stored afterwards.
    pub async fn mark_read(&self, id: &str, user_id: &str) -> AppResult<NotificationView> {
        self.notification_repo.add_reader(id, user_id).await?;
        let model = self.addressed_to(id, user_id).await?;
        NotificationView::for_user(model, user_id)
    }

    /// Mark every notification addressed to a user read. Returns how many changed.
    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.add_reader_everywhere(user_id).await
    }

    /// Remove a notification from a user's listing.
    pub async fn clear(&self, id: &str, user_id: &str) -> AppResult<()> {
        if self.notification_repo.remove_recipient(id, user_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Notification {id}")))
        }
    }

    /// Remove every notification from a user's listing. Returns how many were cleared.
    pub async fn clear_all(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo
            .remove_recipient_everywhere(user_id)
            .await
    }

    /// Load a notification, treating one not addressed to the user as absent.
    async fn addressed_to(&self, id: &str, user_id: &str) -> AppResult<notification::Model> {
        let model = self.notification_repo.get_by_id(id).await?;
        if model.recipients()?.iter().any(|r| r == user_id) {
            Ok(model)
        } else {
            Err(AppError::NotFound(format!("Notification {id}")))
        }
    }
}
