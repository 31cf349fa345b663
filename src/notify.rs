//! Run notifications.
//!
//! After a release or sync the result can be posted to a chat robot
//! webhook. Delivery problems are logged and never change the outcome of
//! the run.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ReleaseContext;
use crate::error::{Result, ShipyardError};

/// Variable holding the robot webhook URL.
pub const ROBOT_URL_KEY: &str = "GL_MESSAGE_CP_WECHAT_ROBOT";

/// Variable holding the message template.
pub const TEMPLATE_KEY: &str = "GL_MESSAGE_CP_WECHAT_TEMPLATE";

/// Template used when none is configured.
const DEFAULT_TEMPLATE: &str = "${result}: ${message}";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Outcome of a run, as reported to a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Whether the run succeeded.
    pub success: bool,
    /// Summary or error text.
    pub message: String,
}

impl Notification {
    /// A successful run.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// A failed run.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Something that can deliver a notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the notification.
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Posts markdown messages to a chat robot webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    template: String,
}

impl WebhookNotifier {
    /// Creates a notifier for a webhook URL and template.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(url: &str, template: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ShipyardError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
            template: template.unwrap_or_else(|| String::from(DEFAULT_TEMPLATE)),
        })
    }

    /// Builds a notifier from the context, or `None` if no robot is set.
    pub async fn from_context(ctx: &ReleaseContext) -> Option<Self> {
        let url = ctx.get(ROBOT_URL_KEY).await?;
        let template = ctx.get(TEMPLATE_KEY).await;
        match Self::new(&url, template) {
            Ok(notifier) => Some(notifier),
            Err(e) => {
                warn!("Notifications disabled: {e}");
                None
            }
        }
    }

    /// Fills `${result}` and `${message}` into the template.
    #[must_use]
    pub fn render(&self, notification: &Notification) -> String {
        let result = if notification.success { "success" } else { "failure" };
        self.template
            .replace("${result}", result)
            .replace("${message}", &notification.message)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let content = self.render(notification);
        debug!("Notification content: {content}");

        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "msgtype": "markdown", "markdown": { "content": content } }))
            .send()
            .await
            .map_err(|e| ShipyardError::internal(format!("Webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShipyardError::internal(format!("Webhook answered {status}")));
        }
        info!("Notification sent");
        Ok(())
    }
}

/// Sends a notification if a notifier is configured, logging any failure.
pub async fn notify_quietly(notifier: Option<&dyn Notifier>, notification: &Notification) {
    if let Some(notifier) = notifier
        && let Err(e) = notifier.notify(notification).await
    {
        warn!("Failed to send notification: {e}");
    }
}
