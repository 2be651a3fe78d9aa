// confrun
// Command-line front door: resolves the requested targets, drives the
// orchestrator, and prints the final report.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use conformance_service::{
    ApiClient, Credentials, ExecutionOrchestrator, FrontendSession, OrchestratorConfig,
    PropertyDocument, ReportFormat, ReportFormatter, StatusDisplay, TargetCatalog, TargetGraph,
    TreeKind,
};

/// Parent group under which all suites live on the platform.
const TEST_GROUP_PREFIX: &str = "/FHIRSandbox/Nictiz";

#[derive(Debug, Parser)]
#[command(name = "confrun", about = "Launch and await conformance test executions")]
struct Args {
    /// The targets to execute (both numbers and names are supported)
    target: Vec<String>,

    /// List all available targets
    #[arg(short, long)]
    list: bool,

    /// Just launch the executions, don't wait for them to finish,
    /// unless a target explicitly blocks
    #[arg(long)]
    start_only: bool,

    /// Resolve targets against the production tree
    #[arg(long)]
    production: bool,

    /// Date T to use (default is the most recent Monday)
    #[arg(short = 'T', value_name = "DATE")]
    date_t: Option<String>,

    /// Projection for the final report
    #[arg(long, value_name = "FORMAT", default_value_t = ReportFormat::Summary)]
    report_format: ReportFormat,

    /// Root of the suite repository
    #[arg(short = 'r', long, value_name = "DIR", default_value = ".")]
    repo_root: PathBuf,

    /// The property document to use
    #[arg(short = 'f', long, value_name = "FILE", default_value = "properties.yml")]
    properties_file: PathBuf,

    /// Base URL of the remote platform
    #[arg(
        long,
        value_name = "URL",
        default_value = "https://touchstone.aegis.net/touchstone"
    )]
    base_url: String,

    /// Ceiling for simultaneously active executions
    #[arg(long, value_name = "N", default_value_t = 4)]
    max_parallel: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let content = fs::read_to_string(&args.properties_file)
        .wrap_err_with(|| format!("couldn't read {}", args.properties_file.display()))?;
    let document = PropertyDocument::from_str(&content)?;
    let graph = TargetGraph::from_str(&content)?;

    let mut catalog = TargetCatalog::new(&args.repo_root, document)?;
    if let Some(date) = args.date_t {
        catalog = catalog.with_date_t(date);
    }

    if args.list {
        // Declared names take precedence; without a targets section
        // the directory catalog is all there is to list.
        let lines = if graph.is_empty() {
            catalog.listing(true)
        } else {
            graph.listing()
        };
        for line in lines {
            println!("{}", line);
        }
        return Ok(());
    }

    if args.target.is_empty() {
        eprintln!(
            "You need to specify at least one target (use --list to show the available targets)"
        );
        std::process::exit(1);
    }

    let kind = if args.production {
        TreeKind::Production
    } else {
        TreeKind::Dev
    };
    let outcome = graph.unwrap_targets(&args.target, &catalog, kind)?;
    for message in &outcome.unresolved {
        eprintln!("{}", message);
    }
    if outcome.targets.is_empty() {
        eprintln!("None of the given targets could be resolved");
        std::process::exit(1);
    }

    let credentials = Credentials::from_env()?;
    let session = FrontendSession::new(&args.base_url, TEST_GROUP_PREFIX, credentials.clone())?;
    session.login().await?;

    let api = ApiClient::new(&args.base_url, credentials);
    let config = OrchestratorConfig {
        max_parallel: args.max_parallel,
        start_only: args.start_only,
        ..OrchestratorConfig::default()
    };
    let mut orchestrator =
        ExecutionOrchestrator::new(session.clone(), api, StatusDisplay::stdout(), config);

    let run = orchestrator.execute_targets(outcome.targets).await;
    // Always try to logout, otherwise we'll have too many open
    // sessions on the platform.
    session.logout().await;
    run?;

    if !args.start_only {
        let formatter = ReportFormatter::new(&args.base_url);
        print!(
            "{}",
            formatter.render(args.report_format, orchestrator.executions())
        );
    }

    Ok(())
}
