//! services/package_generator/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! data ports from the `core` crate: analysis history, generation state, the
//! package store and user profiles. It handles all interactions with PostgreSQL
//! using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conversation_package_core::domain::{
    AnalysisRecord, AnalysisResult, Conversation, Notes, Package, Target, UserContext,
};
use conversation_package_core::ports::{
    AnalysisHistoryReader, GenerationStateTracker, PackageStore, PortError, PortResult,
    UserContextReader,
};
use conversation_package_core::normalize::whole_amount;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage-facing ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn storage_error(e: sqlx::Error) -> PortError {
    PortError::Storage(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct AnalysisRow {
    user_id: String,
    conversation_package_id: String,
    topic_key: String,
    result: Json<Value>,
    target_language: Option<String>,
    targets_hit: Json<Value>,
    targets_missed: Json<Value>,
    created_at: DateTime<Utc>,
}

impl AnalysisRow {
    /// Rows are written by the analysis service, so a bad column degrades to
    /// its default instead of failing the whole history read.
    fn to_domain(self) -> AnalysisRecord {
        let result = match serde_json::from_value::<AnalysisResult>(self.result.0) {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    user_id = %self.user_id,
                    topic_key = %self.topic_key,
                    error = %e,
                    "Ignoring unreadable analysis result"
                );
                AnalysisResult::default()
            }
        };

        AnalysisRecord {
            user_id: self.user_id,
            conversation_package_id: self.conversation_package_id,
            topic_key: self.topic_key,
            result,
            target_language: self.target_language,
            targets_hit: stored_targets(&self.targets_hit.0),
            targets_missed: stored_targets(&self.targets_missed.0),
            created_at: self.created_at,
        }
    }
}

/// Targets as the analysis service stores them; every field may be missing
/// or of the wrong type.
fn stored_targets(value: &Value) -> Vec<Target> {
    let text = |target: &Value, key: &str| {
        target
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| item.is_object())
                .map(|item| Target {
                    key: text(item, "key"),
                    description: text(item, "description"),
                    check: text(item, "check"),
                    amount: item
                        .get("amount")
                        .and_then(Value::as_number)
                        .and_then(whole_amount),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(FromRow)]
struct PackageRow {
    id: Uuid,
    user_id: String,
    language: String,
    display_language: String,
    name: String,
    description: String,
    category: String,
    tags: Vec<String>,
    conversations: Json<Vec<Conversation>>,
    notes: Json<Notes>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PackageRow {
    fn to_domain(self) -> Package {
        Package {
            id: self.id,
            user_id: self.user_id,
            language: self.language,
            display_language: self.display_language,
            name: self.name,
            description: self.description,
            category: self.category,
            tags: self.tags,
            conversations: self.conversations.0,
            notes: self.notes.0,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ProfileRow {
    profession: Option<String>,
    initial_fluency: Option<String>,
    purpose_of_usage: Option<String>,
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl AnalysisHistoryReader for DbAdapter {
    async fn list_by_user(&self, user_id: &str, limit: usize) -> PortResult<Vec<AnalysisRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, AnalysisRow>(
            "SELECT user_id, conversation_package_id, topic_key, result, target_language, \
                    targets_hit, targets_missed, created_at \
             FROM analysis_results \
             WHERE user_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(AnalysisRow::to_domain).collect())
    }
}

#[async_trait]
impl GenerationStateTracker for DbAdapter {
    async fn get_last_processed_at(
        &self,
        user_id: &str,
        language: &str,
    ) -> PortResult<Option<DateTime<Utc>>> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT last_processed_at FROM generation_state WHERE user_id = $1 AND language = $2",
        )
        .bind(user_id)
        .bind(language)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(|(at,)| at))
    }

    async fn set_last_processed_at(
        &self,
        user_id: &str,
        language: &str,
        at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO generation_state (user_id, language, last_processed_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, language) DO UPDATE \
             SET last_processed_at = GREATEST(generation_state.last_processed_at, EXCLUDED.last_processed_at)",
        )
        .bind(user_id)
        .bind(language)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl PackageStore for DbAdapter {
    async fn find_by_user_and_language(
        &self,
        user_id: &str,
        language: &str,
    ) -> PortResult<Option<Package>> {
        let row = sqlx::query_as::<_, PackageRow>(
            "SELECT id, user_id, language, display_language, name, description, category, tags, \
                    conversations, notes, version, created_at, updated_at \
             FROM conversation_packages \
             WHERE user_id = $1 AND language = $2",
        )
        .bind(user_id)
        .bind(language)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(PackageRow::to_domain))
    }

    async fn save(&self, package: &Package) -> PortResult<()> {
        let result = if package.version <= 1 {
            sqlx::query(
                "INSERT INTO conversation_packages \
                    (id, user_id, language, display_language, name, description, category, tags, \
                     conversations, notes, version, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
                 ON CONFLICT (user_id, language) DO NOTHING",
            )
            .bind(package.id)
            .bind(&package.user_id)
            .bind(&package.language)
            .bind(&package.display_language)
            .bind(&package.name)
            .bind(&package.description)
            .bind(&package.category)
            .bind(&package.tags)
            .bind(Json(&package.conversations))
            .bind(Json(&package.notes))
            .bind(package.version)
            .bind(package.created_at)
            .bind(package.updated_at)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                "UPDATE conversation_packages \
                 SET display_language = $2, name = $3, description = $4, category = $5, tags = $6, \
                     conversations = $7, notes = $8, version = $9, updated_at = $10 \
                 WHERE id = $1 AND version = $11",
            )
            .bind(package.id)
            .bind(&package.display_language)
            .bind(&package.name)
            .bind(&package.description)
            .bind(&package.category)
            .bind(&package.tags)
            .bind(Json(&package.conversations))
            .bind(Json(&package.notes))
            .bind(package.version)
            .bind(package.updated_at)
            .bind(package.version - 1)
            .execute(&self.pool)
            .await
        }
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::Conflict(format!(
                "package {} for user {} ({}) was modified concurrently",
                package.id, package.user_id, package.language
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl UserContextReader for DbAdapter {
    async fn get_context(&self, user_id: &str) -> PortResult<Option<UserContext>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT profession, initial_fluency, purpose_of_usage FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.and_then(|r| {
            UserContext::from_fields(r.profession, r.initial_fluency, r.purpose_of_usage)
        }))
    }
}
