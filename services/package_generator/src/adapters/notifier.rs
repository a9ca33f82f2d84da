//! services/package_generator/src/adapters/notifier.rs
//!
//! Publishes "package generated" events for downstream consumers (lesson
//! notices, client refresh). Implements the `CompletionNotifier` port.

use async_trait::async_trait;
use chrono::SecondsFormat;
use conversation_package_core::{
    domain::Package,
    ports::{CompletionNotifier, PortError, PortResult},
};
use serde::Serialize;
use tracing::debug;

pub const PACKAGE_GENERATED_EVENT: &str = "package.generated";

/// The message body published after every successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageGeneratedEvent {
    pub event: String,
    pub user_id: String,
    pub language: String,
    pub package_id: String,
    pub package_name: String,
    pub generated_at: String,
    pub updated: bool,
}

impl PackageGeneratedEvent {
    pub fn from_package(package: &Package, updated: bool) -> Self {
        Self {
            event: PACKAGE_GENERATED_EVENT.to_string(),
            user_id: package.user_id.clone(),
            language: package.language.clone(),
            package_id: package.id.to_string(),
            package_name: package.name.clone(),
            generated_at: package.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            updated,
        }
    }

    pub fn subject(&self) -> &'static str {
        if self.updated {
            "Package updated"
        } else {
            "Package generated"
        }
    }
}

/// Publishes completion events to an SNS topic.
#[derive(Clone)]
pub struct SnsCompletionNotifier {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsCompletionNotifier {
    pub fn new(client: aws_sdk_sns::Client, topic_arn: String) -> Self {
        Self { client, topic_arn }
    }
}

#[async_trait]
impl CompletionNotifier for SnsCompletionNotifier {
    async fn notify(&self, package: &Package, was_update: bool) -> PortResult<()> {
        let event = PackageGeneratedEvent::from_package(package, was_update);
        let body =
            serde_json::to_string(&event).map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(body)
            .subject(event.subject())
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("failed to publish to sns: {e}")))?;

        debug!(package_id = %package.id, updated = was_update, "Published package generated event");
        Ok(())
    }
}
