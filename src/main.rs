use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vm_central::background_jobs::{create_scheduler, jobs::UpdateVmStatusJob};
use vm_central::config::{
    AppConfig, CentralSettings, CliConfig, CloudWorkerSettings, ConfigNotifier, ConfigWatcher,
    JobsSettings,
};
use vm_central::delegation::{
    channels, CloudWorker, DelegationClient, MessageBus, SimulatedProvisioner,
};
use vm_central::metrics;
use vm_central::security::CredentialHasher;
use vm_central::store::{
    InMemoryRepository, SqliteStore, UserRecord, UserRepository, VmRecord, VmRepository,
};
use vm_central::task::{NewUser, Task, TaskContext, Tasks};
use vm_central::utils::format_duration;
use vm_central::{Principal, Role, SystemPrincipal};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the command line, and it is
    /// re-read periodically.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Keep all records in memory instead of SQLite.
    #[clap(long)]
    pub in_memory: bool,

    /// How often the config file is re-read, in milliseconds.
    #[clap(long)]
    pub config_scan_period_ms: Option<u64>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            in_memory: self.in_memory,
            config_scan_period_ms: self.config_scan_period_ms,
        }
    }
}

fn open_repositories(
    central: &CentralSettings,
) -> Result<(Arc<UserRepository>, Arc<VmRepository>)> {
    let Some(db_path) = &central.db_path else {
        info!("Using in-memory store, nothing will be persisted");
        let users: Arc<UserRepository> = Arc::new(InMemoryRepository::<UserRecord>::new());
        let vms: Arc<VmRepository> = Arc::new(InMemoryRepository::<VmRecord>::new());
        return Ok((users, vms));
    };

    info!("Opening SQLite database at {:?}...", db_path);
    let store = SqliteStore::open(db_path)
        .with_context(|| format!("Failed to open database at {:?}", db_path))?;
    let users: Arc<UserRepository> = Arc::new(store.users());
    let vms: Arc<VmRepository> = Arc::new(store.vms());
    Ok((users, vms))
}

/// Creates the configured admin account unless it already exists.
async fn bootstrap_admin(tasks: &Tasks, central: &CentralSettings) -> Result<()> {
    let admin = tasks
        .create_user(NewUser {
            username: central.admin_username.clone(),
            password: central.admin_password.clone(),
            first_name: "Admin".to_string(),
            last_name: "Admin".to_string(),
            role: Role::Admin,
        })
        .ensure_unique(false)
        .submit_trusted(&Principal::from(SystemPrincipal::Root))
        .await
        .context("Failed to bootstrap admin account")?;
    info!("Admin account {} ({}) ready", admin.username, admin.id);
    Ok(())
}

async fn start_cloud_worker(
    bus: Arc<MessageBus>,
    settings: &CloudWorkerSettings,
    notifier: &ConfigNotifier,
    shutdown_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let provisioner = Arc::new(SimulatedProvisioner::new(Duration::from_millis(
        settings.provisioning_latency_ms,
    )));
    let worker = CloudWorker::new(bus, settings, provisioner)
        .with_config_changes(notifier.subscribe::<CloudWorkerSettings>());
    worker.start(shutdown_token).await
}

/// Pings the cloud worker every `period` and logs when it does not answer.
fn spawn_health_check(
    client: DelegationClient,
    period: Duration,
    shutdown_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first immediate tick, wait for the first interval
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => break,
                _ = ticker.tick() => match client.health_check().await {
                    Ok(()) => debug!("Cloud worker is healthy"),
                    Err(e) => warn!("Cloud worker health check failed: {}", e),
                },
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let started = Instant::now();
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let cli_config = cli_args.to_cli_config();
    let config = AppConfig::load(&cli_config, cli_args.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize metrics system
    info!("Initializing metrics...");
    metrics::init_metrics();

    let (users, vms) = open_repositories(&config.central)?;

    let shutdown_token = CancellationToken::new();
    let notifier = Arc::new(ConfigNotifier::new());
    let bus = Arc::new(MessageBus::new());
    let delegation = DelegationClient::new(
        bus.clone(),
        Duration::from_millis(config.cloud_worker.request_timeout_ms),
    );

    let tasks = Tasks::new(TaskContext {
        users,
        vms,
        delegation: delegation.clone(),
        hasher: CredentialHasher::default(),
    });

    let worker_task = if config.cloud_worker.disabled {
        info!("Cloud worker disabled");
        None
    } else {
        let token = shutdown_token.clone();
        let worker = start_cloud_worker(bus.clone(), &config.cloud_worker, &notifier, token);
        Some(worker.await)
    };
    if !bus.has_handler(channels::RESOURCE_CREATE).await {
        warn!(
            "Nobody serves {}, new VMs stay INITIALIZING until the status job runs",
            channels::RESOURCE_CREATE
        );
    }

    bootstrap_admin(&tasks, &config.central).await?;

    let (mut scheduler, scheduler_handle) =
        create_scheduler(tasks.clone(), config.jobs.clone(), shutdown_token.clone());
    scheduler.register_job(Arc::new(UpdateVmStatusJob)).await;
    let scheduler_task = scheduler
        .with_config_changes(notifier.subscribe::<JobsSettings>())
        .start();

    let watcher_task = cli_args.config.clone().map(|path| {
        let watcher = ConfigWatcher::new(path, cli_config, notifier.clone(), config.clone());
        tokio::spawn(watcher.run(shutdown_token.clone()))
    });

    let health_check_task = match config.runtime.health_check_period_ms {
        0 => None,
        period_ms => Some(spawn_health_check(
            delegation,
            Duration::from_millis(period_ms),
            shutdown_token.clone(),
        )),
    };

    info!(
        "{} background jobs registered",
        scheduler_handle.list_jobs().await.len()
    );
    info!("Ready in {}", format_duration(started.elapsed()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    shutdown_token.cancel();

    let _ = scheduler_task.await;
    let remaining = [worker_task, watcher_task, health_check_task];
    for task in remaining.into_iter().flatten() {
        let _ = task.await;
    }
    debug!("Final metrics:\n{}", metrics::gather());
    info!("Bye");
    Ok(())
}
