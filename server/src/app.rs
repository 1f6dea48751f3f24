//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{ApiServer, ApiState};
use crate::core::cli::{self, CliConfig, Commands, SystemCommands};
use crate::core::config::AppConfig;
use crate::core::constants::{AGGREGATION_WORKER_CONCURRENCY, APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::core::storage::AppStorage;
use crate::data::cache::{AdmissionSampler, CacheService};
use crate::data::sqlite::SqliteService;
use crate::data::topics::TopicService;
use crate::domain::alerts::HttpDispatcher;
use crate::domain::{AlertEngine, EventProcessor, RealtimePublisher};
use crate::queue::{JobQueue, Worker, scheduler, worker};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: Arc<AppConfig>,
    pub storage: AppStorage,
    pub database: Arc<SqliteService>,
    pub cache: Arc<CacheService>,
    pub topics: Arc<TopicService>,
    pub queue: JobQueue,
    pub sampler: Arc<AdmissionSampler>,
    pub realtime: RealtimePublisher,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::System {
                command: system_cmd,
            }) => {
                return Self::handle_system_command(system_cmd);
            }
            Some(Commands::Start) | None => {}
        }

        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = Arc::new(AppConfig::load(cli)?);
        let storage = AppStorage::init().await?;

        let cache = Arc::new(
            CacheService::new(&config.cache)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to initialize cache service: {}", e))?,
        );
        tracing::debug!(backend = cache.backend_name(), "Cache initialized");

        let sampler = Arc::new(AdmissionSampler::new(
            Arc::clone(&cache),
            config.ingest.soft_limit_per_sec,
            config.ingest.hard_limit_per_sec,
        ));

        let database = Arc::new(
            SqliteService::init(&storage)
                .await
                .context("Failed to initialize database")?,
        );

        let topics = Arc::new(
            TopicService::from_cache_config(&config.cache)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to initialize topic service: {}", e))?,
        );
        tracing::debug!(backend = topics.backend_name(), "Topics initialized");

        let queue = JobQueue::new(database.pool().clone());
        let realtime = RealtimePublisher::new(Arc::clone(&topics));
        let shutdown = ShutdownService::new(Arc::clone(&database));

        Ok(Self {
            shutdown,
            config,
            storage,
            database,
            cache,
            topics,
            queue,
            sampler,
            realtime,
        })
    }

    fn handle_system_command(cmd: SystemCommands) -> Result<()> {
        match cmd {
            SystemCommands::Prune { yes } => Self::prune_data(yes),
        }
    }

    fn prune_data(skip_confirm: bool) -> Result<()> {
        let data_dir = AppStorage::resolve_data_dir();

        if !data_dir.exists() {
            println!(
                "Nothing to prune. Data directory does not exist: {}",
                data_dir.display()
            );
            return Ok(());
        }

        let data_dir = data_dir.canonicalize().unwrap_or(data_dir);

        println!("This will permanently delete the local data directory:");
        println!("  {}", data_dir.display());
        println!();
        println!(
            "Make sure the server is not running. \
             Deleting data while the server is running will cause data corruption."
        );

        if !skip_confirm {
            print!("\nContinue? [y/N] ");
            std::io::Write::flush(&mut std::io::stdout())?;

            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;

            if !matches!(input.trim().to_lowercase().as_str(), "y" | "yes") {
                println!("Aborted.");
                return Ok(());
            }
        }

        std::fs::remove_dir_all(&data_dir)
            .with_context(|| format!("Failed to delete data directory: {}", data_dir.display()))?;
        println!("Pruned: {}", data_dir.display());
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await;

        let state = ApiState {
            database: Arc::clone(&app.database),
            cache: Arc::clone(&app.cache),
            queue: app.queue.clone(),
            sampler: Arc::clone(&app.sampler),
            realtime: app.realtime.clone(),
            config: Arc::clone(&app.config),
            shutdown_rx: app.shutdown.subscribe(),
        };

        let server = ApiServer::new(state, app.shutdown.clone());
        server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }

    pub async fn start_background_tasks(&self) {
        self.shutdown
            .register(
                self.database
                    .start_checkpoint_task(self.shutdown.subscribe()),
            )
            .await;

        // Worker pools: one per job class, each with its own concurrency
        let event_processor = Arc::new(EventProcessor::new(
            Arc::clone(&self.database),
            Arc::clone(&self.cache),
            self.queue.clone(),
            self.realtime.clone(),
        ));
        self.shutdown
            .register(
                Worker::new(
                    Arc::clone(&self.database),
                    event_processor,
                    self.config.queue.event_concurrency,
                )
                .start(self.shutdown.subscribe()),
            )
            .await;

        let alert_engine = Arc::new(AlertEngine::new(
            Arc::clone(&self.database),
            Arc::new(HttpDispatcher::new(self.config.alerts.clone())),
            self.config.alerts.clone(),
        ));
        self.shutdown
            .register(
                Worker::new(
                    Arc::clone(&self.database),
                    alert_engine,
                    self.config.queue.alert_concurrency,
                )
                .start(self.shutdown.subscribe()),
            )
            .await;

        let aggregation_runner = Arc::new(crate::domain::aggregation::AggregationRunner::new(
            Arc::clone(&self.database),
            self.config.retention.clone(),
        ));
        self.shutdown
            .register(
                Worker::new(
                    Arc::clone(&self.database),
                    aggregation_runner,
                    AGGREGATION_WORKER_CONCURRENCY,
                )
                .start(self.shutdown.subscribe()),
            )
            .await;

        // Nightly schedule and queue housekeeping
        self.shutdown
            .register(scheduler::start(self.queue.clone(), self.shutdown.subscribe()))
            .await;
        self.shutdown
            .register(worker::start_maintenance_task(
                Arc::clone(&self.database),
                self.shutdown.subscribe(),
            ))
            .await;

        tracing::debug!("Background tasks started");
    }
}
