//! services/package_generator/src/adapters/generation_llm.rs
//!
//! This module contains the adapter for the package-generation LLM.
//! It implements the `PackageGenerationService` port from the `core` crate.
//!
//! Two prompts are sent per call: fixed curriculum rules (system) and a dump of
//! the learner's current state (user). The model is asked for a JSON object,
//! which is then normalized by `conversation_package_core::normalize`.

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use conversation_package_core::{
    domain::{AnalysisRecord, Conversation, GeneratedPackage, Notes, Package, Target, UserContext},
    normalize::{parse_generated_package, MIN_TARGETS_PER_CONVERSATION},
    ports::{GenerationRequest, PackageGenerationService, PortError, PortResult},
};
use serde::Serialize;
use tracing::{debug, info};

const SYSTEM_INSTRUCTIONS: &str = r#"You are an expert language curriculum designer. You generate a single learning package for a user for ONE language ({language}).

Output a JSON object with exactly these keys: name, description, category, tags (array of strings), conversations, notes (object with title, details, content), language.

RULES:
1. The user has at most ONE package per language. Your output is that one package for {language}.
2. CONVERSATIONS: an array of conversation topics. Each has: name, description (one line), instruction, targets (array of { key, description, check, amount? }).
   - The FIRST one or two conversations must be REVIEW: test what the user already learned. Each review instruction MUST tell the tutor to START the conversation with a specific word or phrase (e.g. "Start the conversation by saying [word] and encourage the user to respond in {language}") so the user is tested on that word.
   - After review, add ONE new lesson conversation that builds on previous material.
   - No duplicate words: only introduce NEW words or concepts in the new lesson; reuse existing words only in review.
3. SPEAKING-FOCUSED: instructions must name the language being learned ({language}) and state that the goal is speaking practice. The tutor conducts the conversation in {language} where appropriate and prompts the user to speak.
4. NOTES: notes.content holds a short study guide: words and phrases for this lesson with pronunciation and meaning, what the user is learning, and writing tips if relevant. Notes also say what the user needs to work on next, based on their past feedback.
5. TARGETS: every conversation has at least {min_targets} targets. key is a slug unique within the conversation, description is short, check is a yes/no question a reviewer can answer from the transcript, amount is an optional repetition count. Review targets check that the user used the review word correctly; new lesson targets check the new objectives.
6. Use category "language" and tags that include the language name and "speaking".
7. PERSONALIZATION: when a learner profile is given, choose topics and vocabulary that fit the learner's profession, starting fluency and reason for learning."#;

const CLOSING_INSTRUCTION: &str =
    "Return ONLY valid JSON with keys: name, description, category, tags, conversations, notes, language. No markdown.";

/// Model settings for package generation.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    /// Upper bound on one model call, including the response body.
    pub timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.4,
            timeout: Duration::from_secs(60),
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `PackageGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiPackageAdapter {
    client: Client<OpenAIConfig>,
    settings: GenerationSettings,
}

impl OpenAiPackageAdapter {
    /// Creates a new `OpenAiPackageAdapter`.
    pub fn new(client: Client<OpenAIConfig>, settings: GenerationSettings) -> Self {
        Self { client, settings }
    }
}

//=========================================================================================
// Prompt Construction
//=========================================================================================

/// The curriculum rules for one language.
pub fn system_prompt(language: &str) -> String {
    SYSTEM_INSTRUCTIONS
        .replace("{language}", language)
        .replace("{min_targets}", &MIN_TARGETS_PER_CONVERSATION.to_string())
}

#[derive(Serialize)]
struct PackageSnapshot<'a> {
    name: &'a str,
    description: &'a str,
    conversations: &'a [Conversation],
    notes: &'a Notes,
}

/// The per-call learner state: existing package, recent analysis and profile.
pub fn context_prompt(request: &GenerationRequest<'_>) -> PortResult<String> {
    let mut parts: Vec<String> = Vec::new();
    parts.push(format!("Language: {}", request.target_language));
    parts.push(String::new());

    push_existing_package(&mut parts, request.existing_package)?;
    push_analysis(&mut parts, request.analysis_records);
    if let Some(context) = request.user_context {
        push_user_context(&mut parts, context);
    }

    parts.push(String::new());
    parts.push(CLOSING_INSTRUCTION.to_string());
    Ok(parts.join("\n"))
}

fn push_existing_package(parts: &mut Vec<String>, existing: Option<&Package>) -> PortResult<()> {
    match existing {
        Some(package) => {
            let snapshot = PackageSnapshot {
                name: &package.name,
                description: &package.description,
                conversations: &package.conversations,
                notes: &package.notes,
            };
            let json = serde_json::to_string_pretty(&snapshot)
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
            parts.push(
                "EXISTING PACKAGE (evolve from this; do not duplicate words already covered):"
                    .to_string(),
            );
            parts.push(json);
        }
        None => parts.push(
            "No existing package for this user and language. Create a new beginner package."
                .to_string(),
        ),
    }
    parts.push(String::new());
    Ok(())
}

fn push_analysis(parts: &mut Vec<String>, records: &[AnalysisRecord]) {
    if records.is_empty() {
        parts.push(
            "No new analysis results since the last run. If there is an existing package, output an evolved version (e.g. add one small new lesson or adjust notes). If there is no existing package, create a first lesson."
                .to_string(),
        );
        return;
    }

    parts.push(
        "RECENT ANALYSIS RESULTS (what the user did since the last run; use this to decide review and next steps):"
            .to_string(),
    );
    for (index, record) in records.iter().enumerate() {
        parts.push(format!(
            "--- Result {} ({}, topic: {}) ---",
            index + 1,
            record.created_at.to_rfc3339(),
            record.topic_key
        ));
        parts.push(format!("Targets HIT: {}", target_keys(&record.targets_hit)));
        parts.push(format!("Targets MISSED: {}", target_keys(&record.targets_missed)));
        if !record.result.feedback.is_empty() {
            parts.push("Feedback:".to_string());
            for feedback in &record.result.feedback {
                let polarity = if feedback.is_positive { "positive" } else { "needs work" };
                parts.push(format!("  - [{polarity}] {}", feedback.content));
            }
        }
        if !record.result.words_used.is_empty() {
            let words: Vec<&str> = record
                .result
                .words_used
                .iter()
                .map(|w| w.word.as_str())
                .collect();
            parts.push(format!(
                "Words the user said in the target language: {}",
                words.join(", ")
            ));
        }
        parts.push(String::new());
    }
    parts.push(
        "From the above: include REVIEW of what they missed or struggled with, then ONE new topic building on it. Do not duplicate words; only evolve."
            .to_string(),
    );
}

fn push_user_context(parts: &mut Vec<String>, context: &UserContext) {
    parts.push(String::new());
    parts.push("LEARNER PROFILE (personalize topics and vocabulary):".to_string());
    if let Some(profession) = &context.profession {
        parts.push(format!("Profession: {profession}"));
    }
    if let Some(fluency) = &context.initial_fluency {
        parts.push(format!("Initial fluency: {fluency}"));
    }
    if let Some(purpose) = &context.purpose_of_usage {
        parts.push(format!("Purpose of learning: {purpose}"));
    }
}

fn target_keys(targets: &[Target]) -> String {
    let keys: Vec<&str> = targets.iter().map(|t| t.key.as_str()).collect();
    // A JSON array of strings cannot fail to serialize.
    serde_json::to_string(&keys).unwrap_or_else(|_| "[]".to_string())
}

//=========================================================================================
// `PackageGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl PackageGenerationService for OpenAiPackageAdapter {
    async fn generate(&self, request: GenerationRequest<'_>) -> PortResult<GeneratedPackage> {
        let language = request.target_language;
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt(language))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(context_prompt(&request)?)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.settings.model)
            .messages(messages)
            .response_format(ResponseFormat::JsonObject)
            .temperature(self.settings.temperature)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        info!(
            language,
            model = %self.settings.model,
            analysis_records = request.analysis_records.len(),
            has_existing_package = request.existing_package.is_some(),
            "Requesting package generation"
        );

        let chat = self.client.chat();
        let response = tokio::time::timeout(self.settings.timeout, chat.create(chat_request))
            .await
            .map_err(|_| {
                PortError::Generation(format!(
                    "generation request timed out after {}s",
                    self.settings.timeout.as_secs_f32()
                ))
            })?
            .map_err(|e: OpenAIError| PortError::Generation(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Generation("Generation LLM response contained no text content.".to_string())
            })?;
        debug!(bytes = content.len(), "Received generation response");

        parse_generated_package(&content, language)
    }
}
