//! services/package_generator/src/bin/package_generator.rs

use async_openai::{config::OpenAIConfig, Client};
use conversation_package_core::pipeline::{GenerationPipeline, PipelinePorts};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use package_generator_lib::{
    adapters::{
        db::DbAdapter,
        generation_llm::{GenerationSettings, OpenAiPackageAdapter},
        notifier::SnsCompletionNotifier,
    },
    config::Config,
    error::ServiceError,
    handler::{handle_sqs_batch, SqsBatchResponse, SqsEvent},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let pipeline = Arc::new(build_pipeline().await?);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<SqsEvent>| {
        let pipeline = pipeline.clone();
        async move { Ok::<SqsBatchResponse, Error>(handle_sqs_batch(&pipeline, event.payload).await) }
    }))
    .await
}

/// Resolves every external dependency once, at cold start.
async fn build_pipeline() -> Result<GenerationPipeline, ServiceError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();
    info!("Configuration loaded. Initializing package generator...");

    // --- 2. Connect to Database & Run Migrations ---
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;

    // --- 3. Initialize Service Adapters ---
    let mut openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
    if let Some(api_base) = &config.openai_api_base {
        openai_config = openai_config.with_api_base(api_base);
    }
    let generator = Arc::new(OpenAiPackageAdapter::new(
        Client::with_config(openai_config),
        GenerationSettings {
            model: config.generation_model.clone(),
            temperature: config.generation_temperature,
            timeout: config.generation_timeout,
        },
    ));

    // --- 4. Build the Pipeline ---
    let pipeline = GenerationPipeline::new(
        PipelinePorts {
            analysis: db_adapter.clone(),
            state: db_adapter.clone(),
            packages: db_adapter.clone(),
            profiles: db_adapter,
            generator,
        },
        config.pipeline_settings(),
    );

    let pipeline = match &config.package_generated_topic_arn {
        Some(topic_arn) => {
            let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            let notifier = SnsCompletionNotifier::new(
                aws_sdk_sns::Client::new(&aws_config),
                topic_arn.clone(),
            );
            info!(topic_arn = %topic_arn, "Completion notifications enabled");
            pipeline.with_notifier(Arc::new(notifier))
        }
        None => {
            info!("PACKAGE_GENERATED_TOPIC_ARN not set; completion notifications disabled");
            pipeline
        }
    };

    info!(
        model = %config.generation_model,
        freshness_window_secs = config.freshness_window.num_seconds(),
        analysis_history_limit = config.analysis_history_limit,
        "Package generator ready"
    );
    Ok(pipeline)
}
