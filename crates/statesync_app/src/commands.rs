use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;
use statesync_core::{JobPhase, Notification, PresetId, ScopeKey};
use statesync_engine::{
    storage_from_config, ApiClient, ClientConfig, HttpPresetService, JobRegistry, JobStatus,
    LocalCache, LogNotificationSink, NotificationSink, ProgressClient, ProgressHandle, StateStore,
};
use statesync_logging::sync_debug;

use crate::config::DEFAULT_CONFIG_FILE;
use crate::logging::LogDestination;

#[derive(Debug, Parser)]
#[command(name = "statesync", version, about = "Scoped UI state, presets and job progress")]
pub struct Cli {
    /// RON configuration file.
    #[arg(long, short, default_value = DEFAULT_CONFIG_FILE, env = "STATESYNC_CONFIG")]
    pub config: PathBuf,

    /// Overrides `base_url` from the configuration file.
    #[arg(long, env = "STATESYNC_BASE_URL")]
    pub base_url: Option<String>,

    /// Overrides `storage_dir` from the configuration file.
    #[arg(long, env = "STATESYNC_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Session cookie for the API origin, as `name=value`. Repeatable.
    #[arg(long, value_name = "NAME=VALUE")]
    pub cookie: Vec<String>,

    #[arg(long, value_enum, default_value_t = LogDestination::Terminal)]
    pub log: LogDestination,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// More output per occurrence (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the current state of a scope, e.g. `table:orders`.
    Show { scope: ScopeKey },
    /// Set one fragment. The value is parsed as JSON, or taken as a string.
    Set {
        scope: ScopeKey,
        key: String,
        value: String,
    },
    /// Saved-state presets.
    #[command(subcommand)]
    Presets(PresetCommand),
    /// List jobs still registered as in flight.
    Jobs,
    /// Follow a job's progress; without an id, resumes the most recent job.
    Watch {
        job_id: Option<String>,
        #[arg(long)]
        title: Option<String>,
    },
    /// Ask the server to cancel a job.
    Cancel { job_id: String },
}

#[derive(Debug, Subcommand)]
pub enum PresetCommand {
    List {
        scope: ScopeKey,
    },
    /// Save the scope's current state as a new preset.
    Save {
        scope: ScopeKey,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Make a preset active on the server and load it locally.
    Activate {
        scope: ScopeKey,
        id: PresetId,
    },
    /// Load whichever preset the server marks active.
    Restore {
        scope: ScopeKey,
    },
    Delete {
        scope: ScopeKey,
        id: PresetId,
    },
    /// Build a preset with a server-side factory job.
    Generate {
        scope: ScopeKey,
        factory: String,
        name: String,
        /// Follow the job until it finishes.
        #[arg(long)]
        watch: bool,
    },
}

/// Prints notifications for the user and keeps a copy in the log.
struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn emit(&self, notification: Notification) {
        println!("[{}] {}", notification.job_id, notification.message);
        LogNotificationSink.emit(notification);
    }
}

struct Services {
    store: StateStore,
    progress: ProgressClient,
}

impl Services {
    fn build(config: &ClientConfig) -> Result<Self> {
        let storage = storage_from_config(config);
        let api = ApiClient::new(config).context("failed to build HTTP client")?;
        let presets = Arc::new(HttpPresetService::new(
            api.clone(),
            config.presets_path.clone(),
        ));
        let store = StateStore::new(
            LocalCache::with_debounce(storage.clone(), config.debounce()),
            presets,
        );
        let registry = Arc::new(JobRegistry::new(storage));
        let progress = ProgressClient::new(api, config, registry, Arc::new(ConsoleSink));
        Ok(Self { store, progress })
    }
}

pub async fn run(command: Command, config: &ClientConfig) -> Result<()> {
    let mut services = Services::build(config)?;
    let result = dispatch(command, &mut services).await;
    services.store.flush();
    result
}

async fn dispatch(command: Command, services: &mut Services) -> Result<()> {
    let store = &mut services.store;
    match command {
        Command::Show { scope } => {
            let record = store.get_current(&scope);
            println!("{}", pretty(&Value::Object(record.data))?);
        }
        Command::Set { scope, key, value } => {
            store.set_fragment(&scope, key, parse_fragment_value(&value));
            let record = store.get_current(&scope);
            println!("{}", pretty(&Value::Object(record.data))?);
        }
        Command::Presets(command) => run_preset_command(command, services).await?,
        Command::Jobs => {
            let jobs = services.progress.registry().list_active();
            if jobs.is_empty() {
                println!("No jobs in flight");
            }
            let now = Utc::now();
            for job in jobs {
                let age = (now - job.started_at).num_seconds().max(0);
                println!(
                    "{}  {}  started {}m{:02}s ago",
                    job.job_id,
                    job.title.as_deref().unwrap_or("-"),
                    age / 60,
                    age % 60
                );
            }
        }
        Command::Watch { job_id, title } => {
            let handle = services
                .progress
                .observe(job_id.as_deref(), title.as_deref())?;
            watch(handle).await?;
        }
        Command::Cancel { job_id } => {
            services
                .progress
                .cancel_job(&job_id)
                .await
                .with_context(|| format!("failed to cancel job {job_id}"))?;
            println!("Cancellation requested for {job_id}");
        }
    }
    Ok(())
}

async fn run_preset_command(command: PresetCommand, services: &mut Services) -> Result<()> {
    let store = &mut services.store;
    match command {
        PresetCommand::List { scope } => {
            let presets = store.list_presets(&scope).await?;
            if presets.is_empty() {
                println!("No presets for {scope}");
            }
            for preset in presets {
                let marker = if preset.is_active { "*" } else { " " };
                println!(
                    "{marker} {:>5}  {}  (updated {})",
                    preset.id,
                    preset.name,
                    preset.updated_at.to_rfc3339()
                );
            }
        }
        PresetCommand::Save {
            scope,
            name,
            description,
        } => {
            let created = store
                .save_as_new_preset(&scope, &name, &description)
                .await
                .with_context(|| format!("failed to save preset {name:?}"))?;
            println!("Saved preset {} ({})", created.id, created.name);
        }
        PresetCommand::Activate { scope, id } => {
            store
                .activate_preset(&scope, id)
                .await
                .with_context(|| format!("failed to activate preset {id}"))?;
            println!("Preset {id} is active for {scope}");
        }
        PresetCommand::Restore { scope } => match store.restore_active_preset(&scope).await? {
            Some(preset) => println!("Loaded active preset {} ({})", preset.id, preset.name),
            None => println!("No active preset for {scope}"),
        },
        PresetCommand::Delete { scope, id } => {
            store.delete_preset(&scope, id).await?;
            println!("Deleted preset {id}");
        }
        PresetCommand::Generate {
            scope,
            factory,
            name,
            watch: follow,
        } => {
            let job_id = store
                .preset_service()
                .start_factory(&scope, &factory, &name)
                .await
                .with_context(|| format!("failed to start factory {factory}"))?;
            println!("Started job {job_id}");
            if follow {
                let handle = services.progress.observe(Some(&job_id), Some(&name))?;
                watch(handle).await?;
            } else {
                services.progress.registry().register(&job_id, Some(&name));
            }
        }
    }
    Ok(())
}

/// Prints progress lines until the job settles or the user interrupts.
async fn watch(mut handle: ProgressHandle) -> Result<()> {
    println!("Watching job {}", handle.job_id());
    let outcome = tokio::select! {
        status = follow(&mut handle) => Some(status),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(status) = outcome else {
        handle.close();
        println!("Stopped watching; the job keeps running on the server");
        return Ok(());
    };

    match status.phase {
        JobPhase::Done | JobPhase::Cancelled => Ok(()),
        JobPhase::Errored => bail!("job {} failed", status.job_id),
        _ => match status.error {
            Some(err) => bail!("lost job {}: {}", status.job_id, err),
            None => bail!("observation of job {} ended early", status.job_id),
        },
    }
}

async fn follow(handle: &mut ProgressHandle) -> JobStatus {
    let mut last_line = String::new();
    loop {
        let status = match handle.changed().await {
            Some(status) => status,
            None => return handle.status(),
        };
        if let Some(view) = status.view() {
            let line = view.summary();
            if line != last_line {
                println!("{line}");
                last_line = line;
            }
        }
        if status.is_settled() {
            sync_debug!("Job {} settled in {:?}", status.job_id, status.phase);
            return status;
        }
    }
}

fn pretty(value: &Value) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to format state")
}

/// `42`, `true` and `{"a": 1}` are JSON; anything else is a plain string.
pub fn parse_fragment_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
