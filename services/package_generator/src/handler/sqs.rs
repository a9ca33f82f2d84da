//! services/package_generator/src/handler/sqs.rs
//!
//! Drives the generation pipeline for one SQS batch.
//!
//! Records are processed one after another. A malformed message or a failed
//! event is reported as a single item failure and never blocks its siblings.

use chrono::Utc;
use conversation_package_core::pipeline::{GenerationPipeline, ProcessOutcome};
use tracing::{error, info, warn};

use super::protocol::{
    parse_session_message, BatchItemFailure, MalformedMessage, SqsBatchResponse, SqsEvent,
};

const BODY_PREVIEW_CHARS: usize = 200;

pub async fn handle_sqs_batch(pipeline: &GenerationPipeline, event: SqsEvent) -> SqsBatchResponse {
    let mut response = SqsBatchResponse::default();
    let total = event.records.len();

    for record in event.records {
        let body = record.body.as_deref().unwrap_or_default();
        let parsed = if body.trim().is_empty() {
            Err(MalformedMessage::EmptyBody)
        } else {
            parse_session_message(body, Utc::now())
        };

        let session = match parsed {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    message_id = %record.message_id,
                    error = %e,
                    body_preview = %preview(body),
                    "Rejecting malformed session message"
                );
                response.batch_item_failures.push(BatchItemFailure {
                    item_identifier: record.message_id,
                });
                continue;
            }
        };

        match pipeline.process(&session).await {
            Ok(ProcessOutcome::Skipped(reason)) => {
                info!(
                    message_id = %record.message_id,
                    session_id = %session.session_id,
                    ?reason,
                    "Session consumed without generation"
                );
            }
            Ok(ProcessOutcome::Generated {
                package_id,
                was_update,
            }) => {
                info!(
                    message_id = %record.message_id,
                    session_id = %session.session_id,
                    %package_id,
                    was_update,
                    "Session processed"
                );
            }
            Err(e) => {
                error!(
                    message_id = %record.message_id,
                    session_id = %session.session_id,
                    error = %e,
                    "Process session failed"
                );
                response.batch_item_failures.push(BatchItemFailure {
                    item_identifier: record.message_id,
                });
            }
        }
    }

    info!(
        total,
        failed = response.batch_item_failures.len(),
        "SQS batch complete"
    );
    response
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}
