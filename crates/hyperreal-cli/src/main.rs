//! HyperReal CLI
//!
//! The `hyperreal` command drives the identity-preserving dataset factory.
//!
//! ## Commands
//!
//! - `plan`: list the shot catalog
//! - `select`: show which references a scene would send
//! - `run`: work through the plan and export the captioned dataset
//! - `generate`: one free-form image outside the plan

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hyperreal_core::{
    export_dataset, select, AspectRatio, ForgeError, GenerationClient, GenerationOptions,
    ImageSize, PlanCatalog, QualityGate, ReferenceSet, ReferenceSlot, RunConfig, RunEvent,
    RunReport, RunSupervisor, StyleMode, DEFAULT_SUBJECT,
};
use hyperreal_remote::{GeminiClient, GeminiConfig};
use tokio::sync::broadcast;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "hyperreal")]
#[command(author = "HyperReal Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Identity-preserving image dataset factory", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and events
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the shots of a dataset plan
    Plan {
        /// Plan file (JSON array of shots); the built-in plan when omitted
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Show the references a scene description would send
    Select {
        /// Scene text to classify (shot type, expression, ...)
        #[arg(long)]
        scene: String,

        #[command(flatten)]
        references: ReferenceArgs,
    },

    /// Run the factory over the plan and export the dataset
    Run {
        #[command(flatten)]
        references: ReferenceArgs,

        /// Trigger word the dataset is captioned with
        #[arg(long)]
        trigger: String,

        /// Export directory (images/ and captions/ are created inside)
        #[arg(long)]
        out: PathBuf,

        /// Plan file (JSON array of shots); the built-in plan when omitted
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Plan index to start from
        #[arg(long)]
        start_at: Option<usize>,

        #[command(flatten)]
        generation: GenerationArgs,

        /// Minimum accepted quality score (0-10)
        #[arg(long, default_value_t = QualityGate::DEFAULT_THRESHOLD)]
        threshold: u8,

        /// Regenerations allowed per shot when the score is below threshold
        #[arg(long, default_value_t = 0)]
        max_retries: u32,

        /// Skip the quality judge entirely
        #[arg(long)]
        no_judge: bool,

        /// Pause between shots
        #[arg(long, default_value_t = 4)]
        cooldown_secs: u64,

        /// Subject noun used in prompts and fallback captions
        #[arg(long, default_value = DEFAULT_SUBJECT)]
        subject: String,

        /// Generation service API key
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Generate one image from a free-form prompt
    Generate {
        /// What the image should show
        #[arg(long)]
        prompt: String,

        #[command(flatten)]
        references: ReferenceArgs,

        /// Trigger word the caption starts with
        #[arg(long)]
        trigger: String,

        /// Export directory
        #[arg(long)]
        out: PathBuf,

        #[command(flatten)]
        generation: GenerationArgs,

        /// Generation service API key
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

/// Reference images, one flag per slot.
#[derive(Args, Debug, Default, Clone)]
struct ReferenceArgs {
    /// Front-facing identity portrait (required for run and generate)
    #[arg(long)]
    front: Option<PathBuf>,

    /// Side profile
    #[arg(long)]
    side: Option<PathBuf>,

    /// Three-quarter view
    #[arg(long)]
    three_quarter: Option<PathBuf>,

    /// Expressive close-up
    #[arg(long)]
    expression: Option<PathBuf>,

    /// Strict 90-degree profile
    #[arg(long)]
    side90: Option<PathBuf>,

    /// Product or prop image; repeat for up to four
    #[arg(long)]
    product: Vec<PathBuf>,
}

impl ReferenceArgs {
    fn load(&self) -> Result<ReferenceSet> {
        if self.product.len() > ReferenceSlot::PRODUCTS.len() {
            bail!(
                "at most {} product images are supported, got {}",
                ReferenceSlot::PRODUCTS.len(),
                self.product.len()
            );
        }

        let slots = [
            (ReferenceSlot::Front, &self.front),
            (ReferenceSlot::Side, &self.side),
            (ReferenceSlot::ThreeQuarter, &self.three_quarter),
            (ReferenceSlot::Expression, &self.expression),
            (ReferenceSlot::Side90, &self.side90),
        ];
        let products = ReferenceSlot::PRODUCTS.into_iter().zip(&self.product);

        let mut set = ReferenceSet::new();
        for (slot, path) in slots
            .into_iter()
            .filter_map(|(slot, path)| path.as_ref().map(|p| (slot, p)))
            .chain(products)
        {
            set.load_file(slot, path)
                .with_context(|| format!("Failed to load {} reference {:?}", slot, path))?;
        }
        Ok(set)
    }
}

#[derive(Args, Debug, Clone)]
struct GenerationArgs {
    /// Output aspect ratio (1:1, 3:4, 4:3, 9:16, 16:9)
    #[arg(long, default_value_t = AspectRatio::Square)]
    aspect_ratio: AspectRatio,

    /// Resolution tier (1K, 2K, 4K)
    #[arg(long, default_value_t = ImageSize::OneK)]
    image_size: ImageSize,

    /// Clean lifestyle look instead of the raw analog style
    #[arg(long)]
    polished: bool,
}

impl GenerationArgs {
    fn options(&self) -> GenerationOptions {
        GenerationOptions {
            aspect_ratio: self.aspect_ratio,
            image_size: self.image_size,
            style: if self.polished {
                StyleMode::Polished
            } else {
                StyleMode::Raw
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    hyperreal_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Plan { plan } => cmd_plan(plan.as_deref(), cli.json),
        Commands::Select { scene, references } => cmd_select(&scene, &references, cli.json),
        Commands::Run {
            references,
            trigger,
            out,
            plan,
            start_at,
            generation,
            threshold,
            max_retries,
            no_judge,
            cooldown_secs,
            subject,
            api_key,
        } => {
            let gate = (!no_judge).then(|| QualityGate::new(threshold, max_retries));
            let config = RunConfig::default()
                .with_generation(generation.options())
                .with_quality_gate(gate)
                .with_cooldown(Duration::from_secs(cooldown_secs))
                .with_subject(subject);
            let client = gemini_client(api_key)?;
            let plan = load_plan(plan.as_deref())?;
            let references = references.load()?;
            cmd_run(client, plan, references, &trigger, &out, start_at, config, cli.json).await
        }
        Commands::Generate {
            prompt,
            references,
            trigger,
            out,
            generation,
            api_key,
        } => {
            let client = gemini_client(api_key)?;
            let references = references.load()?;
            cmd_generate(client, &references, &prompt, &trigger, &out, generation.options()).await
        }
    }
}

fn gemini_client(api_key: Option<String>) -> Result<Arc<dyn GenerationClient>> {
    let mut config = GeminiConfig::from_env();
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        config = config.with_api_key(&key);
    }
    if config.api_key.is_none() {
        bail!("No API key: pass --api-key or set GEMINI_API_KEY");
    }
    let client = GeminiClient::new(config).context("Failed to build generation client")?;
    Ok(Arc::new(client))
}

fn load_plan(path: Option<&Path>) -> Result<PlanCatalog> {
    match path {
        Some(path) => PlanCatalog::from_json_file(path)
            .with_context(|| format!("Failed to load plan {:?}", path)),
        None => Ok(PlanCatalog::builtin()),
    }
}

fn cmd_plan(path: Option<&Path>, json: bool) -> Result<()> {
    let plan = load_plan(path)?;

    if json {
        let items: Vec<_> = plan.iter().collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for (index, item) in plan.iter().enumerate() {
        println!(
            "{:>3}  #{:<3} {} | {} | {}",
            index, item.id, item.shot_type, item.expression, item.lighting
        );
    }
    println!("{} shots", plan.len());
    Ok(())
}

fn cmd_select(scene: &str, references: &ReferenceArgs, json: bool) -> Result<()> {
    let references = references.load()?;
    let selection = select(&references, scene);

    if json {
        println!("{}", serde_json::to_string_pretty(&selection)?);
        return Ok(());
    }

    println!("Scene: {}", selection.category);
    if selection.is_empty() {
        println!("  (no references would be sent)");
    }
    for entry in selection.iter() {
        println!("  - {}", entry.label());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    client: Arc<dyn GenerationClient>,
    plan: PlanCatalog,
    references: ReferenceSet,
    trigger: &str,
    out: &Path,
    start_at: Option<usize>,
    config: RunConfig,
    json: bool,
) -> Result<()> {
    let supervisor = Arc::new(RunSupervisor::new(client, plan));
    if let Some(index) = start_at {
        supervisor.seek(index).context("Invalid --start-at")?;
    }

    let stopper = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping at the next step");
                supervisor.stop();
            }
        })
    };

    let result = run_and_export(&supervisor, references, trigger, out, config, json).await;
    stopper.abort();
    let report = result?;

    println!(
        "Run {} stopped ({}) at shot {} of {}, {} new images",
        report.run_id,
        report.stop_reason,
        report.cursor,
        supervisor.plan().len(),
        report.artifacts_created
    );
    Ok(())
}

/// Start a run, stream its events, and export whatever it produced.
///
/// Artifacts are exported even when the run fails part-way.
async fn run_and_export(
    supervisor: &RunSupervisor,
    references: ReferenceSet,
    trigger: &str,
    out: &Path,
    config: RunConfig,
    json: bool,
) -> Result<RunReport> {
    let printer = tokio::spawn(print_events(supervisor.subscribe(), json));

    supervisor
        .start(references, trigger, config)
        .context("Run could not start")?;
    let outcome = supervisor.wait().await;

    match &outcome {
        Err(ForgeError::Join(_)) => printer.abort(),
        _ => {
            printer.await.ok();
        }
    }

    let artifacts = supervisor.artifacts();
    let written = export_dataset(&artifacts, trigger, out)
        .with_context(|| format!("Failed to export dataset to {:?}", out))?;
    info!(written, out = %out.display(), "Dataset exported");

    match outcome.context("Run failed")? {
        Some(report) => Ok(report),
        None => bail!("Run task was not found"),
    }
}

/// Print run events until the run reports that it stopped.
async fn print_events(mut events: broadcast::Receiver<RunEvent>, json: bool) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event printer fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if json {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
        } else {
            println!("{}", render_event(&event));
        }

        if matches!(event, RunEvent::Stopped { .. }) {
            break;
        }
    }
}

fn render_event(event: &RunEvent) -> String {
    match event {
        RunEvent::PhaseChanged { phase, cursor } => format!("[{cursor}] {phase}"),
        RunEvent::ArtifactCreated {
            artifact_id,
            plan_id,
        } => match plan_id {
            Some(id) => format!("  created {artifact_id} for shot #{id}"),
            None => format!("  created {artifact_id}"),
        },
        RunEvent::CaptionUpdated {
            artifact_id,
            degraded,
        } => {
            if *degraded {
                format!("  captioned {artifact_id} (fallback caption)")
            } else {
                format!("  captioned {artifact_id}")
            }
        }
        RunEvent::QualityScored {
            plan_id,
            score,
            attempt,
            accepted,
        } => format!(
            "  shot #{plan_id} attempt {attempt}: {score}/10 {}",
            if *accepted { "accepted" } else { "rejected" }
        ),
        RunEvent::Stopped { reason } => format!("Stopped: {reason}"),
        RunEvent::Failed { phase, message } => match phase {
            Some(phase) => format!("Failed during {phase}: {message}"),
            None => format!("Failed: {message}"),
        },
    }
}

async fn cmd_generate(
    client: Arc<dyn GenerationClient>,
    references: &ReferenceSet,
    prompt: &str,
    trigger: &str,
    out: &Path,
    options: GenerationOptions,
) -> Result<()> {
    let supervisor = RunSupervisor::new(client, PlanCatalog::builtin());
    let artifact = supervisor
        .generate_single(references, prompt, trigger, options)
        .await
        .context("Generation failed")?;

    export_dataset(&[artifact.clone()], trigger, out)
        .with_context(|| format!("Failed to export image to {:?}", out))?;

    println!("{}: {}", artifact.id, artifact.caption);
    Ok(())
}
