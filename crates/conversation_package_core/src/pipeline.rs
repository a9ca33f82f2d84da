//! crates/conversation_package_core/src/pipeline.rs
//!
//! The session-to-package generation workflow.
//!
//! One `process` call handles one session completion event, sequentially:
//! attribute the event, apply the freshness gate, gather history, generate,
//! upsert the package, record state, then notify. The state write happens only
//! after the package write, so a crash between the two costs at most one
//! redundant regeneration on redelivery.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{normalize_language, AnalysisRecord, Package, SessionCompletionEvent};
use crate::ports::{
    AnalysisHistoryReader, Clock, CompletionNotifier, GenerationRequest, GenerationStateTracker,
    PackageGenerationService, PackageStore, PortResult, SystemClock, UserContextReader,
};

pub const DEFAULT_FRESHNESS_WINDOW_SECS: i64 = 60 * 60;
pub const DEFAULT_ANALYSIS_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Minimum interval between two generation runs for the same (user, language).
    pub freshness_window: Duration,
    /// How many of the newest analysis records are read per run.
    pub analysis_history_limit: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            freshness_window: Duration::seconds(DEFAULT_FRESHNESS_WINDOW_SECS),
            analysis_history_limit: DEFAULT_ANALYSIS_HISTORY_LIMIT,
        }
    }
}

/// The collaborators the pipeline is built from. Constructed once at process start.
#[derive(Clone)]
pub struct PipelinePorts {
    pub analysis: Arc<dyn AnalysisHistoryReader>,
    pub state: Arc<dyn GenerationStateTracker>,
    pub packages: Arc<dyn PackageStore>,
    pub profiles: Arc<dyn UserContextReader>,
    pub generator: Arc<dyn PackageGenerationService>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingUser,
    MissingLanguage,
    RecentlyProcessed { last_processed_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The event was consumed without generating anything.
    Skipped(SkipReason),
    Generated { package_id: Uuid, was_update: bool },
}

pub struct GenerationPipeline {
    ports: PipelinePorts,
    notifier: Option<Arc<dyn CompletionNotifier>>,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
}

impl GenerationPipeline {
    pub fn new(ports: PipelinePorts, settings: PipelineSettings) -> Self {
        Self {
            ports,
            notifier: None,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Processes one session completion event.
    ///
    /// Skips are returned as `Ok(ProcessOutcome::Skipped(..))`. Storage and
    /// generation failures are returned as errors so the queue can redeliver.
    pub async fn process(&self, event: &SessionCompletionEvent) -> PortResult<ProcessOutcome> {
        let Some(user_id) = event
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            warn!(session_id = %event.session_id, "Skipping session: missing userId");
            return Ok(ProcessOutcome::Skipped(SkipReason::MissingUser));
        };

        let display_language = event.target_language.as_deref().unwrap_or_default().trim();
        let Some(language) = normalize_language(display_language) else {
            warn!(
                session_id = %event.session_id,
                user_id,
                "Skipping session: missing or empty targetLanguage"
            );
            return Ok(ProcessOutcome::Skipped(SkipReason::MissingLanguage));
        };

        let now = self.clock.now();
        let last_processed_at = self
            .ports
            .state
            .get_last_processed_at(user_id, &language)
            .await?;
        if let Some(last) = last_processed_at {
            if now.signed_duration_since(last) < self.settings.freshness_window {
                info!(
                    user_id,
                    language = %language,
                    last_processed_at = %last,
                    "Skipping session: package generated within the freshness window"
                );
                return Ok(ProcessOutcome::Skipped(SkipReason::RecentlyProcessed {
                    last_processed_at: last,
                }));
            }
        }

        let history = self
            .ports
            .analysis
            .list_by_user(user_id, self.settings.analysis_history_limit)
            .await?;
        let fetched = history.len();
        let records = select_new_records(history, last_processed_at, &language);
        debug!(
            user_id,
            language = %language,
            fetched,
            selected = records.len(),
            "Selected analysis records for generation"
        );

        let existing = self
            .ports
            .packages
            .find_by_user_and_language(user_id, &language)
            .await?;
        let user_context = self.ports.profiles.get_context(user_id).await?;

        let generated = self
            .ports
            .generator
            .generate(GenerationRequest {
                target_language: &language,
                existing_package: existing.as_ref(),
                analysis_records: &records,
                user_context: user_context.as_ref(),
            })
            .await?;

        let now = self.clock.now();
        let was_update = existing.is_some();
        let package = match &existing {
            Some(current) => current.evolve(display_language, generated, now),
            None => Package::create(user_id, &language, display_language, generated, now),
        };

        self.ports.packages.save(&package).await?;
        self.ports
            .state
            .set_last_processed_at(user_id, &language, now)
            .await?;

        info!(
            user_id,
            language = %language,
            package_id = %package.id,
            version = package.version,
            was_update,
            conversations = package.conversations.len(),
            "Package generated"
        );

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(&package, was_update).await {
                warn!(
                    package_id = %package.id,
                    error = %e,
                    "Failed to publish package generated notification"
                );
            }
        }

        Ok(ProcessOutcome::Generated {
            package_id: package.id,
            was_update,
        })
    }
}

/// Keeps records newer than the last run whose language matches (or is unset),
/// preserving the reader's order.
pub fn select_new_records(
    records: Vec<AnalysisRecord>,
    last_processed_at: Option<DateTime<Utc>>,
    language: &str,
) -> Vec<AnalysisRecord> {
    records
        .into_iter()
        .filter(|record| last_processed_at.map_or(true, |last| record.created_at > last))
        .filter(|record| record.matches_language(language))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AnalysisResult;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn record(created_at: DateTime<Utc>, language: Option<&str>) -> AnalysisRecord {
        AnalysisRecord {
            user_id: "u1".to_string(),
            conversation_package_id: "pkg".to_string(),
            topic_key: format!("topic-{}", created_at.timestamp()),
            result: AnalysisResult::default(),
            target_language: language.map(str::to_string),
            targets_hit: Vec::new(),
            targets_missed: Vec::new(),
            created_at,
        }
    }

    #[test]
    fn keeps_only_records_strictly_after_last_run_in_order() {
        let records = vec![
            record(at(2), None),
            record(at(1), None),
            record(at(0), None),
            record(at(-1), None),
            record(at(-2), None),
            record(at(-3), None),
        ];

        let selected = select_new_records(records, Some(at(0)), "spanish");
        let times: Vec<_> = selected.iter().map(|r| r.created_at).collect();

        assert_eq!(times, vec![at(2), at(1)]);
    }

    #[test]
    fn without_prior_state_keeps_everything_in_language() {
        let records = vec![
            record(at(3), Some("Spanish")),
            record(at(2), Some("french")),
            record(at(1), None),
        ];

        let selected = select_new_records(records, None, "spanish");
        let times: Vec<_> = selected.iter().map(|r| r.created_at).collect();

        assert_eq!(times, vec![at(3), at(1)]);
    }

    #[test]
    fn default_settings_use_one_hour_window() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.freshness_window, Duration::hours(1));
        assert_eq!(settings.analysis_history_limit, 500);
    }
}
