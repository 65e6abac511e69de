use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use i2v_client::actions::{MergeCapability, TaskActions};
use i2v_client::api::{FolderKind, HttpTaskApi, TaskApi};
use i2v_client::batch::{submit_batch, BatchPlan, TaskForm};
use i2v_client::config::{ClientConfig, API_KEY_ENV};
use i2v_client::credentials::{CredentialStore, KeyUpdate};
use i2v_client::poller::{PollEvent, TaskPoller};
use i2v_client::render::{render_detail, render_task_list};
use i2v_client::selection::MergeSelection;
use i2v_client::task::TaskId;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "i2v")]
#[command(about = "Image-to-video task client - submit, watch and manage generation jobs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend address, overrides config and I2V_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the cached API key
    Key {
        #[command(subcommand)]
        action: KeyCommand,
    },

    /// Submit images as a batch of generation tasks
    Submit {
        /// Source images
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Tasks per image
        #[arg(short = 'n', long, default_value = "1")]
        repeat: usize,

        #[arg(short, long)]
        prompt: Option<String>,

        /// Extra instructions for prompt refinement
        #[arg(long)]
        user_prompt: Option<String>,

        /// Fixed seed; repeats get random seeds when unset
        #[arg(long)]
        seed: Option<u32>,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        vlm_model: Option<String>,

        #[arg(long)]
        llm_model: Option<String>,

        #[arg(long)]
        negative_prompt: Option<String>,

        /// e.g. 1280x720
        #[arg(long)]
        image_size: Option<String>,

        /// Extend the generated video
        #[arg(long)]
        extend: bool,
    },

    /// Print the task tree once
    List {
        /// Raw JSON instead of the tree
        #[arg(long)]
        json: bool,
    },

    /// Poll the task list until interrupted
    Watch,

    /// Show one task
    Show { id: String },

    /// Delete a task and its files
    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Resubmit a task with its stored parameters
    Regenerate { id: String },

    /// Start a new task from the last frame of a task's video
    LastFrame {
        id: String,

        /// Replacement prompt
        #[arg(short, long)]
        prompt: Option<String>,

        /// Show the carried-over prompt and read a replacement from stdin
        #[arg(long, conflicts_with = "prompt")]
        edit: bool,
    },

    /// Reveal a task's files on the backend host
    OpenFolder {
        id: String,

        #[arg(long = "type", value_enum, default_value = "auto")]
        kind: FolderArg,
    },

    /// Ask the backend to re-check every unfinished video
    CheckAll,

    /// Check a single task's video now
    Check { id: String },

    /// Concatenate the videos of two or more completed tasks
    Merge {
        #[arg(required = true, num_args = 2..)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Print the stored key, masked
    Show,
    /// Store a key without validating it
    Set { value: String },
    /// Remove the stored key
    Clear,
    /// Validate a key against the backend and store it on success
    Test { value: Option<String> },
}

#[derive(Clone, Copy, ValueEnum)]
enum FolderArg {
    Auto,
    Image,
    Video,
}

impl From<FolderArg> for FolderKind {
    fn from(value: FolderArg) -> Self {
        match value {
            FolderArg::Auto => FolderKind::Auto,
            FolderArg::Image => FolderKind::Image,
            FolderArg::Video => FolderKind::Video,
        }
    }
}

struct Context {
    config: ClientConfig,
    api: Arc<HttpTaskApi>,
    store: CredentialStore,
    api_key: String,
}

impl Context {
    fn load(config_path: Option<PathBuf>, base_url: Option<String>) -> Result<Self> {
        let mut config = ClientConfig::load_or_default(config_path.as_deref())?.with_env();
        if let Some(url) = base_url {
            config = config.with_base_url(url);
        }

        let store = CredentialStore::new(config.credentials_path());
        let env_key = std::env::var(API_KEY_ENV).ok();
        let api_key = store.resolve(env_key.as_deref());
        if api_key.is_empty() {
            warn!("no API key configured, run `i2v key test <key>`");
        }

        let api = Arc::new(HttpTaskApi::from_config(&config));
        Ok(Self {
            config,
            api,
            store,
            api_key,
        })
    }

    fn poller(&self) -> TaskPoller {
        TaskPoller::new(self.api.clone(), self.config.poller_config())
            .with_api_key(self.api_key.clone())
    }

    fn actions(&self) -> TaskActions {
        TaskActions::new(self.api.clone()).with_api_key(self.api_key.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    let ctx = Context::load(cli.config, cli.base_url)?;

    match cli.command {
        Commands::Key { action } => key_command(&ctx, action).await,
        Commands::Submit {
            images,
            repeat,
            prompt,
            user_prompt,
            seed,
            model,
            vlm_model,
            llm_model,
            negative_prompt,
            image_size,
            extend,
        } => {
            let form = TaskForm {
                prompt,
                user_prompt,
                seed,
                model,
                vlm_model,
                llm_model,
                negative_prompt,
                image_size,
                extend,
                api_key: Some(ctx.api_key.clone()).filter(|k| !k.is_empty()),
            };
            submit_command(&ctx, images, repeat, form).await
        }
        Commands::List { json } => list_command(&ctx, json).await,
        Commands::Watch => watch_command(&ctx).await,
        Commands::Show { id } => show_command(&ctx, id.into()).await,
        Commands::Delete { id, yes } => delete_command(&ctx, id.into(), yes).await,
        Commands::Regenerate { id } => {
            let result = ctx.actions().regenerate(&id.into()).await?;
            print_result(result.message_or("Regeneration started"), result.task_id.as_ref());
            Ok(())
        }
        Commands::LastFrame { id, prompt, edit } => {
            last_frame_command(&ctx, id.into(), prompt, edit).await
        }
        Commands::OpenFolder { id, kind } => {
            let result = ctx.actions().open_folder(&id.into(), kind.into()).await?;
            println!("{}", result.message_or("Folder opened"));
            Ok(())
        }
        Commands::CheckAll => check_all_command(&ctx).await,
        Commands::Check { id } => check_command(&ctx, id.into()).await,
        Commands::Merge { ids } => merge_command(&ctx, ids).await,
    }
}

fn print_result(message: &str, task_id: Option<&TaskId>) {
    match task_id {
        Some(id) => println!("{message} (task #{id})"),
        None => println!("{message}"),
    }
}

fn mask(key: &str) -> String {
    let visible: String = key.chars().take(6).collect();
    format!("{visible}****")
}

/// Read one trimmed line from stdin after printing `prompt`.
fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn key_command(ctx: &Context, action: KeyCommand) -> Result<()> {
    match action {
        KeyCommand::Show => match ctx.store.load()? {
            Some(key) => println!("{}", mask(&key)),
            None => println!("No API key stored ({})", ctx.store.path().display()),
        },
        KeyCommand::Set { value } => match ctx.store.set(&value)? {
            KeyUpdate::Saved => println!("API key saved"),
            KeyUpdate::Cleared => println!("API key cleared"),
        },
        KeyCommand::Clear => {
            ctx.store.clear()?;
            println!("API key cleared");
        }
        KeyCommand::Test { value } => {
            let value = value.unwrap_or_else(|| ctx.api_key.clone());
            let check = ctx.store.test(&*ctx.api, &value).await?;
            if check.success {
                println!("API key valid, saved: {}", check.message);
            } else {
                bail!("API key rejected: {}", check.message);
            }
        }
    }
    Ok(())
}

async fn submit_command(
    ctx: &Context,
    images: Vec<PathBuf>,
    repeat: usize,
    form: TaskForm,
) -> Result<()> {
    for image in &images {
        if !image.exists() {
            warn!("Image does not exist: {:?}", image);
        }
    }

    let plan = BatchPlan::new(&images, repeat, &form)?;
    info!(
        "Submitting {} tasks ({} images x {})",
        plan.len(),
        images.len(),
        repeat
    );

    let bar = ProgressBar::new(plan.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} ({percent}%) {msg}")?
            .progress_chars("=> "),
    );

    let outcome = submit_batch(&*ctx.api, &plan, |progress| {
        bar.set_position(progress.completed as u64);
        bar.set_message(format!("{} created", progress.succeeded));
    })
    .await;
    bar.finish_and_clear();

    println!(
        "Batch {}: {}/{} tasks created",
        outcome.batch_id,
        outcome.succeeded(),
        outcome.total
    );
    for failure in &outcome.failures {
        println!(
            "  #{} {}: {}",
            failure.batch_index,
            failure.image.display(),
            failure.error
        );
    }
    if outcome.succeeded() == 0 {
        bail!("no tasks were created");
    }
    Ok(())
}

async fn list_command(ctx: &Context, json: bool) -> Result<()> {
    let tasks = ctx.poller().fetch_with_retry().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else {
        print!("{}", render_task_list(&tasks));
    }
    Ok(())
}

async fn watch_command(ctx: &Context) -> Result<()> {
    let poller = Arc::new(ctx.poller());
    info!(
        "Watching {} every {:?}, Ctrl-C to stop",
        ctx.config.base_url,
        poller.config().interval
    );
    let (mut events, handle) = poller.spawn();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(PollEvent::Tasks(tasks)) => {
                    println!("--");
                    print!("{}", render_task_list(&tasks));
                }
                Some(PollEvent::Report(report)) => {
                    if !report.updated.is_empty() {
                        info!("{} video(s) finished", report.updated.len());
                    }
                }
                Some(PollEvent::Error(error)) => warn!("Poll failed: {}", error),
                None => break,
            },
            _ = &mut interrupted => break,
        }
    }

    handle.abort();
    Ok(())
}

async fn show_command(ctx: &Context, id: TaskId) -> Result<()> {
    let task = ctx.actions().detail(&id).await?;
    print!("{}", render_detail(&task, &ctx.config.base_url));
    Ok(())
}

async fn delete_command(ctx: &Context, id: TaskId, yes: bool) -> Result<()> {
    let result = ctx
        .actions()
        .delete(&id, |id| {
            if yes {
                return true;
            }
            let question = format!("Delete task #{id} and its files? [y/N] ");
            matches!(
                read_line(&question).map(|a| a.to_ascii_lowercase()).as_deref(),
                Ok("y") | Ok("yes")
            )
        })
        .await;

    match result {
        Ok(message) => println!("{}", message.message_or("Task deleted")),
        Err(i2v_client::ClientError::Cancelled) => println!("Cancelled"),
        Err(error) => return Err(error.into()),
    }
    Ok(())
}

async fn last_frame_command(
    ctx: &Context,
    id: TaskId,
    prompt: Option<String>,
    edit: bool,
) -> Result<()> {
    let actions = ctx.actions();
    let prompt = if edit {
        let carried = actions.carried_prompt(&id).await?;
        println!("Current prompt: {}", carried.as_deref().unwrap_or("(none)"));
        Some(read_line("New prompt (empty keeps it): ")?)
    } else {
        prompt
    };

    let result = actions
        .regenerate_from_last_frame(&id, prompt.as_deref())
        .await?;
    print_result(
        result.message_or("Last-frame task created"),
        result.task_id.as_ref(),
    );
    Ok(())
}

async fn check_all_command(ctx: &Context) -> Result<()> {
    let report = ctx.actions().check_all_videos().await?;
    println!(
        "{}",
        report.message.as_deref().unwrap_or("Video check finished")
    );
    if !report.updated_tasks.is_empty() {
        println!("{}", serde_json::to_string_pretty(&report.updated_tasks)?);
    }
    Ok(())
}

async fn check_command(ctx: &Context, id: TaskId) -> Result<()> {
    let task = ctx.api.get_task(&id).await?;
    if task.has_video() {
        println!("Task #{id} already has a video");
        return Ok(());
    }
    if ctx.poller().check_task(&task).await? {
        println!("Task #{id}: video stored");
    } else {
        println!("Task #{id}: {}", task.status.label());
    }
    Ok(())
}

async fn merge_command(ctx: &Context, ids: Vec<String>) -> Result<()> {
    let actions = ctx.actions();
    if let MergeCapability::Unavailable { message } = actions.detect_merge_capability().await {
        bail!("Video merging is unavailable: {}", message);
    }

    let selection = MergeSelection::new();
    for id in ids {
        selection.select_id(id.into());
    }
    let result = actions.merge(&selection).await?;
    print_result(result.message_or("Merge submitted"), result.task_id.as_ref());
    Ok(())
}
