// Session Insights CLI - analyze a captured session's logs across environments

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use insights_core::{
    AnalysisObserver, AnalysisOrchestrator, Config, Environment, EnvironmentAnalysisResult, EnvironmentPhase,
    HttpLogService, InsightsError, InsightsPort, SessionCapture,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

fn build_cli() -> Command {
    Command::new("insights")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Cross-environment log analysis for captured sessions")
        .arg(
            Arg::new("session")
                .short('s')
                .long("session")
                .value_name("FILE")
                .help("Captured session JSON file"),
        )
        .arg(
            Arg::new("env")
                .short('e')
                .long("env")
                .value_name("ENV")
                .help("Analyze a single environment (hq, kamino, lightbridge, ardent)"),
        )
        .arg(
            Arg::new("since")
                .long("since")
                .value_name("TEXT")
                .help("Time filter, e.g. \"last 30 minutes\", \"2 hours ago\" or \"3d\""),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .value_name("TOKEN")
                .help("API token for the log service"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Config file (defaults to .insights.toml or ~/.config/insights/config.toml)"),
        )
        .arg(
            Arg::new("export")
                .long("export")
                .value_name("DIR")
                .help("Write the analyzed logs to this directory"),
        )
        .arg(
            Arg::new("show-prompt")
                .long("show-prompt")
                .help("Print each generated prompt before it is sent")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
}

struct ConsoleObserver {
    show_prompt: bool,
}

impl AnalysisObserver for ConsoleObserver {
    fn on_environment_phase(&self, environment: Environment, phase: EnvironmentPhase) {
        if phase.is_terminal() {
            info!("{} finished: {:?}", environment, phase);
        } else {
            debug!("{} -> {:?}", environment, phase);
        }
    }

    fn on_prompt(&self, environment: Environment, prompt: &str) {
        if self.show_prompt {
            println!("----- Prompt for {} -----", environment);
            println!("{}", prompt);
            println!("-------------------------");
        }
    }
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let mut config = Config::load_from_path(Path::new(path))?;
            config.apply_env_overrides();
            config
        }
        None => Config::load()?,
    };

    if let Some(token) = matches.get_one::<String>("token") {
        config.service.api_token = Some(token.clone());
    }
    Ok(config)
}

fn load_session(path: &str) -> Result<SessionCapture> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read session file {}", path))?;
    let session = serde_json::from_str::<SessionCapture>(&content)
        .with_context(|| format!("Failed to parse session file {}", path))?;
    Ok(session)
}

fn print_result(result: &EnvironmentAnalysisResult) {
    match result {
        EnvironmentAnalysisResult::Success(success) => {
            println!(
                "\n=== {} ({} logs, {} selected) ===",
                success.environment, success.log_count, success.selected_count
            );
            println!("{}", success.analysis);
        }
        EnvironmentAnalysisResult::Empty { environment, message, .. } => {
            println!("\n=== {} ===\n{}", environment, message);
        }
        EnvironmentAnalysisResult::Failure { environment, error, retryable } => {
            println!("\n=== {} ===\n❌ {}", environment, error);
            if *retryable {
                println!("   Retry with: insights --env {}", environment.key());
            }
        }
    }
}

/// Print guidance for failures the user can fix, else the raw message.
fn report_failure(e: &InsightsError) {
    match e.guidance() {
        Some(guidance) => {
            eprintln!("❌ {}: {}", guidance.title, guidance.message);
            eprintln!("   → {}", guidance.action);
        }
        None => eprintln!("❌ {}", e),
    }
}

async fn run(matches: &ArgMatches, orchestrator: &AnalysisOrchestrator) -> std::result::Result<(), InsightsError> {
    let export_dir = matches.get_one::<String>("export").map(PathBuf::from);

    match matches.get_one::<String>("env") {
        Some(name) => {
            let environment = Environment::from_key(name)
                .ok_or_else(|| InsightsError::Config(format!("Unknown environment: {}", name)))?;
            let result = orchestrator.analyze_environment(environment).await?;
            print_result(&result);
            if let Some(dir) = export_dir {
                tokio::fs::create_dir_all(&dir).await?;
                let path = orchestrator.export_environment(environment, &dir).await?;
                println!("📄 Exported {}", path.display());
            }
        }
        None => {
            let run = orchestrator.analyze_all().await?;
            for result in &run.results {
                print_result(result);
            }
            println!("\n=== Summary ===\n{}", run.narrative);

            if let Some(dir) = export_dir {
                tokio::fs::create_dir_all(&dir).await?;
                for path in orchestrator.export_all(&dir).await? {
                    println!("📄 Exported {}", path.display());
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let filter = if matches.get_flag("verbose") {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Session Insights CLI");
    let config = load_config(&matches)?;
    let service = Arc::new(HttpLogService::new(&config.service)?);
    let observer = Arc::new(ConsoleObserver {
        show_prompt: matches.get_flag("show-prompt"),
    });
    let orchestrator = AnalysisOrchestrator::new(config, service).with_observer(observer);

    match matches.get_one::<String>("session") {
        Some(path) => orchestrator.set_session(Some(load_session(path)?)),
        None => debug!("No session file given"),
    }

    if let Some(text) = matches.get_one::<String>("since") {
        match orchestrator.apply_time_filter(text) {
            Some(filter) => info!("Using time filter {}", filter),
            None => eprintln!("⚠️  Could not understand time filter '{}', keeping the current filter", text),
        }
    }

    if let Err(e) = run(&matches, &orchestrator).await {
        error!("Analysis failed: {}", e);
        report_failure(&e);
        std::process::exit(1);
    }
    Ok(())
}
