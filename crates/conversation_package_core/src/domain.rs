//! crates/conversation_package_core/src/domain.rs
//!
//! Defines the pure, core data structures for package generation.
//! These structs carry `serde` derives so adapters can move them in and out of
//! prompts, JSON columns and queue payloads without extra mapping layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A voice session finished. Emitted by the session broker onto the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCompletionEvent {
    pub session_id: String,
    pub user_id: Option<String>,
    pub target_language: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub ttl: Option<i64>,
}

/// One checkable learning objective inside a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub key: String,
    pub description: String,
    /// A yes/no question the transcript analysis answers later.
    pub check: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
}

/// One lesson unit within a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub instruction: String,
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notes {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub content: String,
}

/// The structurally valid output of the generation model, before it is
/// attached to a user and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPackage {
    pub name: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub conversations: Vec<Conversation>,
    pub notes: Notes,
}

/// The per-user, per-language curriculum.
///
/// `id` and `created_at` are fixed at first creation. `version` starts at 1 and
/// increases by one on every regeneration; stores use it as an optimistic
/// concurrency token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: Uuid,
    pub user_id: String,
    /// Normalized lookup key (trimmed, lowercase).
    pub language: String,
    /// Language as the client sent it, for display.
    pub display_language: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub conversations: Vec<Conversation>,
    pub notes: Notes,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Package {
    /// Builds the first version of a package for a (user, language) pair.
    pub fn create(
        user_id: &str,
        language: &str,
        display_language: &str,
        generated: GeneratedPackage,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            language: language.to_string(),
            display_language: display_language.to_string(),
            name: generated.name,
            description: generated.description,
            category: generated.category,
            tags: generated.tags,
            conversations: generated.conversations,
            notes: generated.notes,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Evolves an existing package, keeping its identity and creation time.
    pub fn evolve(&self, display_language: &str, generated: GeneratedPackage, now: DateTime<Utc>) -> Self {
        Self {
            id: self.id,
            user_id: self.user_id.clone(),
            language: self.language.clone(),
            display_language: display_language.to_string(),
            name: generated.name,
            description: generated.description,
            category: generated.category,
            tags: generated.tags,
            conversations: generated.conversations,
            notes: generated.notes,
            version: self.version + 1,
            created_at: self.created_at,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_positive: bool,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordUsage {
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub pronunciation: String,
    #[serde(default)]
    pub meaning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub feedback: Vec<Feedback>,
    #[serde(default)]
    pub words_used: Vec<WordUsage>,
}

/// One scored transcript evaluation, written by the analysis service.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub user_id: String,
    pub conversation_package_id: String,
    pub topic_key: String,
    pub result: AnalysisResult,
    pub target_language: Option<String>,
    pub targets_hit: Vec<Target>,
    pub targets_missed: Vec<Target>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Records without a language are treated as language-agnostic.
    pub fn matches_language(&self, language: &str) -> bool {
        match self.target_language.as_deref().and_then(normalize_language) {
            Some(own) => own == language,
            None => true,
        }
    }
}

/// Optional profile signals used to personalize generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    pub profession: Option<String>,
    pub initial_fluency: Option<String>,
    pub purpose_of_usage: Option<String>,
}

impl UserContext {
    /// Trims every field, drops empty ones, and returns `None` when nothing is left.
    pub fn from_fields(
        profession: Option<String>,
        initial_fluency: Option<String>,
        purpose_of_usage: Option<String>,
    ) -> Option<Self> {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let context = Self {
            profession: clean(profession),
            initial_fluency: clean(initial_fluency),
            purpose_of_usage: clean(purpose_of_usage),
        };
        if context.is_empty() {
            None
        } else {
            Some(context)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.profession.is_none() && self.initial_fluency.is_none() && self.purpose_of_usage.is_none()
    }
}

/// Trims and lowercases a language tag. Returns `None` for blank input.
pub fn normalize_language(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(language: Option<&str>) -> AnalysisRecord {
        AnalysisRecord {
            user_id: "u1".to_string(),
            conversation_package_id: "pkg".to_string(),
            topic_key: "greetings".to_string(),
            result: AnalysisResult::default(),
            target_language: language.map(str::to_string),
            targets_hit: Vec::new(),
            targets_missed: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn normalize_language_trims_and_lowercases() {
        assert_eq!(normalize_language("  Spanish "), Some("spanish".to_string()));
        assert_eq!(normalize_language("   "), None);
        assert_eq!(normalize_language(""), None);
    }

    #[test]
    fn language_match_is_case_insensitive_and_allows_unset() {
        assert!(record(Some("SPANISH")).matches_language("spanish"));
        assert!(record(None).matches_language("spanish"));
        assert!(record(Some(" ")).matches_language("spanish"));
        assert!(!record(Some("french")).matches_language("spanish"));
    }

    #[test]
    fn empty_user_context_is_absent() {
        assert_eq!(UserContext::from_fields(Some("  ".into()), None, None), None);
        let context = UserContext::from_fields(Some(" nurse ".into()), None, Some("travel".into()))
            .expect("context");
        assert_eq!(context.profession.as_deref(), Some("nurse"));
        assert_eq!(context.purpose_of_usage.as_deref(), Some("travel"));
    }

    #[test]
    fn evolve_keeps_identity_and_bumps_version() {
        let generated = GeneratedPackage {
            name: "Basics".to_string(),
            description: String::new(),
            category: "language".to_string(),
            tags: vec!["spanish".to_string()],
            conversations: Vec::new(),
            notes: Notes::default(),
        };
        let created_at = Utc::now();
        let first = Package::create("u1", "spanish", "Spanish", generated.clone(), created_at);
        let later = created_at + chrono::Duration::hours(2);
        let second = first.evolve("Spanish", generated, later);

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, created_at);
        assert_eq!(second.updated_at, later);
        assert_eq!(second.version, 2);
    }

    #[test]
    fn partial_analysis_result_uses_defaults() {
        let result: AnalysisResult = serde_json::from_value(serde_json::json!({
            "feedback": [{ "content": "Nice greeting", "targets": ["hello"] }],
            "wordsUsed": [{ "pronunciation": "OH-lah", "meaning": "hi" }]
        }))
        .expect("partial result decodes");

        assert_eq!(result.feedback[0].content, "Nice greeting");
        assert!(!result.feedback[0].is_positive);
        assert_eq!(result.words_used[0].word, "");
        assert_eq!(result.words_used[0].meaning, "hi");
    }
}
