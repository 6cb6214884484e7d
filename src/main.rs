use std::sync::Arc;

use video_intel::adapters::content_index::HttpContentIndex;
use video_intel::adapters::diarization::{Diarizer, HttpDiarizer, PollSchedule};
use video_intel::adapters::generation::{HttpGenerator, StructuredGenerator};
use video_intel::adapters::notify::{Notifier, WebhookNotifier};
use video_intel::adapters::storage::{HttpObjectStorage, ObjectStorage};
use video_intel::adapters::thumbnail::{FfmpegThumbnailGenerator, ThumbnailGenerator};
use video_intel::adapters::transcription::{HttpTranscriber, Transcriber};
use video_intel::adapters::ContentIndex;
use video_intel::health::{DatabaseProbe, HealthCheckWorkflow, ServiceProbe};
use video_intel::pipeline::{VideoPipeline, VideoPipelineInput};
use video_intel::store::{PgVideoStore, VideoStore};
use video_intel::workflow::{PgCheckpointStore, WorkflowRuntime};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize production-grade logging
    init_logging().expect("Failed to initialize logging");

    // Create the database connection pool
    let db_pool = video_intel::db::create_pool()
        .await
        .expect("Failed to create database pool.");

    // Workflow + artifact tables are created on startup if missing
    let checkpoint_store = PgCheckpointStore::new(db_pool.clone());
    checkpoint_store
        .setup()
        .await
        .expect("Failed to set up workflow tables");

    let video_store = PgVideoStore::new(db_pool.clone());
    video_store
        .setup()
        .await
        .expect("Failed to set up artifact tables");

    // Retention: checkpoints for long-finished runs are dead weight
    if let Err(e) = checkpoint_store.cleanup_old_checkpoints(30).await {
        tracing::warn!("Failed to clean up old checkpoints: {}", e);
    }

    let checkpoint_store = Arc::new(checkpoint_store);
    let runtime = Arc::new(WorkflowRuntime::new(checkpoint_store));
    let video_store: Arc<PgVideoStore> = Arc::new(video_store);

    // Initialize the transcription client if an API key is provided
    let transcriber = match HttpTranscriber::from_env() {
        Some(client) => {
            tracing::info!("Initializing transcription client...");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!(
                "TRANSCRIPTION_API_KEY not found. Video runs will fail until it is set."
            );
            None
        }
    };

    // Initialize the diarization client if an API key is provided
    let diarizer = match HttpDiarizer::from_env() {
        Some(client) => {
            tracing::info!("Initializing diarization client...");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("DIARIZATION_API_KEY not found. Speaker detection will be disabled.");
            None
        }
    };

    // Initialize the structured-generation client if an API key is provided
    let generator = match HttpGenerator::from_env() {
        Some(client) => {
            tracing::info!("Initializing generation client...");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("GENERATION_API_KEY not found. Analysis stages will fail until it is set.");
            None
        }
    };

    // Initialize object storage if credentials are provided
    let storage = match HttpObjectStorage::from_env() {
        Some(client) => {
            tracing::info!("Initializing object storage client...");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("STORAGE_BASE_URL/STORAGE_TOKEN not found. Thumbnails will be disabled.");
            None
        }
    };

    // Thumbnail generation requires ffmpeg on PATH
    let thumbnailer = match FfmpegThumbnailGenerator::new() {
        Some(generator) => {
            tracing::info!("ffmpeg found, thumbnail generation enabled");
            Some(Arc::new(generator))
        }
        None => {
            tracing::warn!("ffmpeg not found on PATH. Thumbnail generation will be disabled.");
            None
        }
    };

    let content_index = match HttpContentIndex::from_env() {
        Some(client) => {
            tracing::info!("Initializing content index client...");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!(
                "CONTENT_INDEX_ENDPOINT/CONTENT_INDEX_TOKEN not found. Index sync will be disabled."
            );
            None
        }
    };

    let notifier = match WebhookNotifier::from_env() {
        Some(client) => {
            tracing::info!("Initializing webhook notifier...");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("NOTIFY_WEBHOOK_URL not found. Notifications will be disabled.");
            None
        }
    };

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("health") => {
            let workflow = HealthCheckWorkflow {
                database: Some(Arc::new(DatabaseProbe {
                    pool: db_pool.clone(),
                }) as Arc<dyn ServiceProbe>),
                storage: storage
                    .clone()
                    .map(|s| s as Arc<dyn ServiceProbe>),
                generation: generator
                    .clone()
                    .map(|g| g as Arc<dyn ServiceProbe>),
                store: video_store.clone() as Arc<dyn VideoStore>,
                notifier: notifier.clone().map(|n| n as Arc<dyn Notifier>),
            };
            let overall = workflow.run().await.expect("Health check workflow failed");
            println!(
                "{}",
                serde_json::to_string_pretty(&overall).expect("Failed to serialize health result")
            );
        }
        Some("run") => {
            let payload = args
                .next()
                .or_else(|| std::env::var("PIPELINE_INPUT").ok())
                .expect("Usage: video_intel run '<json payload>'");
            let input: VideoPipelineInput =
                serde_json::from_str(&payload).expect("Invalid pipeline input payload");

            let pipeline = VideoPipeline {
                runtime,
                store: video_store as Arc<dyn VideoStore>,
                transcriber: transcriber.map(|t| t as Arc<dyn Transcriber>),
                diarizer: diarizer.map(|d| d as Arc<dyn Diarizer>),
                generator: generator.map(|g| g as Arc<dyn StructuredGenerator>),
                storage: storage.map(|s| s as Arc<dyn ObjectStorage>),
                thumbnailer: thumbnailer.map(|t| t as Arc<dyn ThumbnailGenerator>),
                content_index: content_index.map(|c| c as Arc<dyn ContentIndex>),
                notifier: notifier.map(|n| n as Arc<dyn Notifier>),
                diarization_polling: PollSchedule::default(),
            };

            match pipeline.run(input).await {
                Ok(output) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&output)
                            .expect("Failed to serialize pipeline output")
                    );
                    if !output.success {
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    tracing::error!("Pipeline run aborted: {}", e);
                    std::process::exit(2);
                }
            }
        }
        _ => {
            eprintln!("Usage: video_intel run '<json payload>' | video_intel health");
            std::process::exit(2);
        }
    }
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt, Layer};

    // Get log level from environment or default to INFO for production
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,video_intel=trace,sqlx=info,reqwest=info,hyper=info".to_string()
        } else {
            "info,video_intel=info,sqlx=warn,reqwest=warn,hyper=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    // Configure structured logging for production
    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for production (easier for log aggregation)
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        // Human-readable logging for development
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    // Log startup information
    tracing::info!("🎬 Video intelligence pipeline starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) { "development" } else { "production" }
    );
    tracing::info!("Log level: {}", log_level);

    // Log environment configuration
    let db_configured = std::env::var("DATABASE_URL").is_ok();
    let transcription_configured = std::env::var("TRANSCRIPTION_API_KEY").is_ok();
    let diarization_configured = std::env::var("DIARIZATION_API_KEY").is_ok();
    let generation_configured = std::env::var("GENERATION_API_KEY").is_ok();
    let storage_configured =
        std::env::var("STORAGE_BASE_URL").is_ok() && std::env::var("STORAGE_TOKEN").is_ok();

    tracing::info!(
        "Configuration - Database: {}, Transcription: {}, Diarization: {}, Generation: {}, Storage: {}",
        if db_configured { "✅" } else { "❌" },
        if transcription_configured { "✅" } else { "❌" },
        if diarization_configured { "✅" } else { "❌" },
        if generation_configured { "✅" } else { "❌" },
        if storage_configured { "✅" } else { "❌" }
    );

    Ok(())
}
