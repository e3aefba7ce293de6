use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use script_relay::api::HttpGenerationClient;
use script_relay::config::Config;
use script_relay::init;
use script_relay::progress::{duration_gauge, estimated_minutes};
use script_relay::prompt::{Blueprint, GenerationSpec, TargetFormat, parse_keywords};
use script_relay::relay::{RelayController, RelayFailure, RelaySettings, RelayStatus};
use script_relay::snapshot::{JsonFileSnapshotStore, SnapshotStore};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Short,
    Long,
}

impl From<FormatArg> for TargetFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Short => TargetFormat::Short,
            FormatArg::Long => TargetFormat::Long,
        }
    }
}

#[derive(Parser)]
#[command(name = "script-relay")]
#[command(about = "Generate long-form video scripts as a relay of 5-minute chapters")]
#[command(version)]
struct Cli {
    /// Target length, e.g. 30s, 10m, 60 minutes
    #[arg(short, long, default_value = "1m")]
    duration: String,

    #[arg(short, long, value_enum, default_value = "long")]
    format: FormatArg,

    /// Narrator persona key
    #[arg(short, long, default_value = "senior-expert")]
    tone: String,

    /// Comma separated keywords the script must mention
    #[arg(short, long)]
    keywords: Option<String>,

    #[arg(long, default_value = "")]
    title: String,

    #[arg(long, default_value = "")]
    target: String,

    #[arg(long, default_value = "")]
    hook: String,

    /// Outline, one section per line
    #[arg(long, default_value = "")]
    storyline: String,

    /// Rewrite an existing script instead of starting from scratch
    #[arg(long)]
    regenerate: Option<PathBuf>,

    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Overrides output_dir from the config
    #[arg(short, long)]
    out: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let code = run(cli).await?;
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut cfg = Config::load(&cli.config).await?;
    if let Some(out) = cli.out {
        cfg.output_dir = out;
    }
    init::ensure_directories(&cfg).await?;

    let mut spec = GenerationSpec::new(cli.format.into(), cli.duration, cli.tone).with_blueprint(Blueprint {
        title: cli.title,
        target: cli.target,
        hook: cli.hook,
        storyline: cli.storyline,
    });
    if let Some(keywords) = cli.keywords.as_deref() {
        spec = spec.with_keywords(parse_keywords(keywords));
    }
    if let Some(path) = &cli.regenerate {
        let original = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read script to regenerate: {}", path.display()))?;
        spec = spec.regenerate_from(&original);
    }

    let client = HttpGenerationClient::new(&cfg)?;
    info!("generation endpoint: {}", client.endpoint());
    let relay = RelayController::new(Box::new(client), RelaySettings::from(&cfg))?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current step");
            trigger.cancel();
        }
    });

    let outcome = relay
        .run_with(&spec, &cancel, |session| {
            let p = session.progress();
            info!(
                "progress {}% ({}/{} scenes, status {})",
                p.percent,
                p.completed_scenes,
                p.total_scenes,
                session.status().label()
            );
        })
        .await;

    if let Some(snapshot) = &outcome.snapshot {
        let store = JsonFileSnapshotStore::new(cfg.snapshot_path.clone());
        store.save(snapshot).await?;
        info!("saved interrupted script to {}", store.path().display());
    }

    if !outcome.script.is_empty() {
        let name = init::script_file_name(&spec, Utc::now(), outcome.is_partial());
        let path = init::write_script(&cfg.output_dir, &name, &outcome.script).await?;
        info!(
            "wrote {} (~{:.1} min read, {:?} against {:.1} min target)",
            path.display(),
            estimated_minutes(&outcome.script),
            duration_gauge(&outcome.script, spec.target_minutes()),
            spec.target_minutes()
        );
    }

    Ok(match outcome.status {
        RelayStatus::Completed => 0,
        RelayStatus::Cancelled => 130,
        RelayStatus::Failed(RelayFailure::QuotaExceeded { .. }) => 3,
        _ => 1,
    })
}
