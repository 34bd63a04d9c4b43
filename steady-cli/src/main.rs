use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use steady_core::clients::betteruptime::DEFAULT_BASE_URL;
use steady_core::clients::{ApiClient, AuthScheme, BetterUptime, Flagsmith, HttpClient, ReqwestClient};
use steady_core::reconciler::feature::{FeatureReconciler, FeatureSpec};
use steady_core::reconciler::monitor::{MonitorReconciler, MonitorSpec};
use steady_core::reconciler::segment::{SegmentReconciler, SegmentSpec};
use steady_core::reconciler::segment_priority::{PriorityReorderSpec, SegmentPriorityReconciler};
use steady_core::reconciler::status_page::{StatusPageReconciler, StatusPageSpec};
use steady_core::reconciler::tag::{TagReconciler, TagSpec};
use steady_core::reconciler::user_group::{UserGroupReconciler, UserGroupSpec};
use steady_core::reports::{SlaReader, SlaSpec, StatsReader, StatsSpec, StatusReportReconciler, StatusReportSpec};
use steady_core::{Outcome, ReconcileError, Reconciler};

mod input;

use input::Task;

const BETTERUPTIME_KEY_ENV: &str = "BETTERUPTIME_API_KEY";
const FLAGSMITH_KEY_ENV: &str = "FLAGSMITH_API_KEY";

#[derive(Parser)]
#[command(name = "steady")]
#[command(about = "Converge Better Uptime and Flagsmith resources to a declared state", long_about = None)]
struct Cli {
    /// Validate the input and report without calling any API
    #[arg(long, global = true)]
    check: bool,

    /// API token, overriding the input file and the environment
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Better Uptime API base URL
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    betteruptime_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Parameters file (JSON or YAML), `-` for stdin
    #[arg(short, long)]
    input: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Converge an uptime monitor
    Monitor(InputArgs),
    /// Read the SLA of a monitor
    MonitorSla(InputArgs),
    /// Converge a status page with its scoped sections and resources
    StatusPage(InputArgs),
    /// Create a status page report or post updates to one
    StatusPageReport(InputArgs),
    /// Converge a Flagsmith project tag
    Tag(InputArgs),
    /// Converge a Flagsmith feature
    Feature(InputArgs),
    /// Converge a Flagsmith user group and its permissions
    UserGroup(InputArgs),
    /// Converge a Flagsmith segment
    Segment(InputArgs),
    /// Move pricing-plan segment overrides behind the others
    SegmentPriorityReorder(InputArgs),
    /// Count enabled and disabled states per feature
    Stats(InputArgs),
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("steady=info,steady_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(outcome) => match serde_json::to_string(&outcome) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to render outcome: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!("{:#}", e);
            println!("{}", failure(&e));
            ExitCode::FAILURE
        }
    }
}

/// `{"failed": true, "msg", "status"?, "body"?}`
fn failure(err: &anyhow::Error) -> Value {
    let mut report = Map::new();
    report.insert("failed".to_string(), json!(true));
    report.insert("msg".to_string(), json!(format!("{err:#}")));
    if let Some(ReconcileError::Upstream { status, body, .. }) = err.downcast_ref::<ReconcileError>() {
        report.insert("status".to_string(), json!(status));
        report.insert("body".to_string(), json!(body));
    }
    Value::Object(report)
}

fn run(cli: &Cli) -> Result<Outcome> {
    match &cli.command {
        Commands::Monitor(args) => {
            let task: Task<MonitorSpec> = input::load(&args.input)?;
            task.params.validate()?;
            with_better_uptime(cli, &task, |bu| MonitorReconciler::new(bu).reconcile(&task.params))
        }
        Commands::MonitorSla(args) => {
            let task: Task<SlaSpec> = input::load(&args.input)?;
            with_better_uptime(cli, &task, |bu| SlaReader::new(bu).read(&task.params))
        }
        Commands::StatusPage(args) => {
            let task: Task<StatusPageSpec> = input::load(&args.input)?;
            task.params.validate()?;
            with_better_uptime(cli, &task, |bu| StatusPageReconciler::new(bu).reconcile(&task.params))
        }
        Commands::StatusPageReport(args) => {
            let task: Task<StatusReportSpec> = input::load(&args.input)?;
            task.params.validate()?;
            with_better_uptime(cli, &task, |bu| StatusReportReconciler::new(bu).reconcile(&task.params))
        }
        Commands::Tag(args) => {
            let task: Task<TagSpec> = input::load(&args.input)?;
            with_flagsmith(cli, &task, AuthScheme::ApiKey, |fs| TagReconciler::new(fs).reconcile(&task.params))
        }
        Commands::Feature(args) => {
            let task: Task<FeatureSpec> = input::load(&args.input)?;
            with_flagsmith(cli, &task, AuthScheme::Token, |fs| FeatureReconciler::new(fs).reconcile(&task.params))
        }
        Commands::UserGroup(args) => {
            let task: Task<UserGroupSpec> = input::load(&args.input)?;
            with_flagsmith(cli, &task, AuthScheme::Token, |fs| UserGroupReconciler::new(fs).reconcile(&task.params))
        }
        Commands::Segment(args) => {
            let task: Task<SegmentSpec> = input::load(&args.input)?;
            with_flagsmith(cli, &task, AuthScheme::ApiKey, |fs| SegmentReconciler::new(fs).reconcile(&task.params))
        }
        Commands::SegmentPriorityReorder(args) => {
            let task: Task<PriorityReorderSpec> = input::load(&args.input)?;
            with_flagsmith(cli, &task, AuthScheme::ApiKey, |fs| {
                SegmentPriorityReconciler::new(fs).reconcile(&task.params)
            })
        }
        Commands::Stats(args) => {
            let task: Task<StatsSpec> = input::load(&args.input)?;
            with_flagsmith(cli, &task, AuthScheme::Token, |fs| StatsReader::new(fs).read(&task.params))
        }
    }
}

/// Token from `--api-key`, the input file, or `env`, in that order.
fn api_key<T>(cli: &Cli, task: &Task<T>, env: &str) -> Result<String> {
    cli.api_key
        .clone()
        .or_else(|| task.api_key.clone())
        .or_else(|| std::env::var(env).ok())
        .with_context(|| format!("missing API key: pass --api-key, set api_key or {env}"))
}

fn with_better_uptime<T>(
    cli: &Cli,
    task: &Task<T>,
    run: impl FnOnce(&BetterUptime<'_>) -> steady_core::Result<Outcome>,
) -> Result<Outcome> {
    if cli.check {
        debug!("Check mode, skipping Better Uptime calls");
        return Ok(Outcome::unchanged());
    }
    let token = api_key(cli, task, BETTERUPTIME_KEY_ENV)?;
    let http = ReqwestClient::new()?;
    let api = ApiClient::new(&http as &dyn HttpClient, AuthScheme::Bearer, &token);
    let client = BetterUptime::new(api, cli.betteruptime_url.as_str());
    Ok(run(&client)?)
}

fn with_flagsmith<T>(
    cli: &Cli,
    task: &Task<T>,
    scheme: AuthScheme,
    run: impl FnOnce(&Flagsmith<'_>) -> steady_core::Result<Outcome>,
) -> Result<Outcome> {
    if cli.check {
        debug!("Check mode, skipping Flagsmith calls");
        return Ok(Outcome::unchanged());
    }
    let base_url = task
        .base_url
        .as_deref()
        .context("missing required parameter: base_url")?;
    let token = api_key(cli, task, FLAGSMITH_KEY_ENV)?;
    let http = ReqwestClient::new()?;
    let api = ApiClient::new(&http as &dyn HttpClient, scheme, &token);
    let client = Flagsmith::new(api, base_url);
    Ok(run(&client)?)
}
