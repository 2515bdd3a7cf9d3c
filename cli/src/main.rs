mod scenario;

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use wayfinder::auth::AuthStore;
use wayfinder::config::{ConfigError, NavigatorConfig};
use wayfinder::port::{MemoryPort, NavigationPort};
use wayfinder::registry::{RegistryError, normalize_path};
use wayfinder::{AuthSnapshot, Navigator, RouteRegistry};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("io failed: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scenario line {line}: {source}")]
    Scenario {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Parser, Debug)]
#[command(name = "wayfinder", about = "Inspect route tables and replay navigation scenarios")]
struct Cli {
    /// Route config file. WAYFINDER_AUTH_TIMEOUT_MS and WAYFINDER_HOME_PATH
    /// override values from the file.
    #[arg(long, global = true, required = false, env = "WAYFINDER_ROUTES_FILE")]
    config: PathBuf,

    /// Log orchestrator decisions to stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved route table, one JSON line per route.
    Routes,
    /// Show how a path resolves.
    Check { path: String },
    /// Replay a JSON-lines scenario against an in-memory port.
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Scenario file, or - for stdin.
    scenario: String,

    /// Location the port starts at.
    #[arg(long, default_value = "/")]
    start: String,

    /// Auth snapshot before the first step.
    #[arg(long, value_enum, default_value_t = InitialAuth::Loading)]
    initial_auth: InitialAuth,

    /// Delay `go` for a path, as PATH=MILLIS. Repeatable.
    #[arg(long, value_parser = parse_latency)]
    latency: Vec<(String, Duration)>,

    /// Make `go` fail with not-found for a path. Repeatable.
    #[arg(long)]
    missing: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum InitialAuth {
    Loading,
    Anonymous,
}

#[derive(Serialize)]
struct CheckReport<'a> {
    path: &'a str,
    matched: Option<&'a str>,
    requires_auth: bool,
    login_path: Option<&'a str>,
    is_login_path: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN })
        .init();

    let config = NavigatorConfig::from_file(&cli.config)?.with_env_overrides();

    match cli.command {
        Command::Routes => run_routes(&config),
        Command::Check { path } => run_check(&config, &path),
        Command::Replay(args) => run_replay(&config, args).await,
    }
}

fn run_routes(config: &NavigatorConfig) -> Result<(), CliError> {
    let registry = config.registry()?;
    for route in registry.routes() {
        print_json(route)?;
    }
    Ok(())
}

fn run_check(config: &NavigatorConfig, path: &str) -> Result<(), CliError> {
    let registry = config.registry()?;
    let report = CheckReport {
        path,
        matched: match registry.resolve(path) {
            Ok(route) => Some(route.path.as_str()),
            Err(_) => None,
        },
        requires_auth: registry.requires_auth(path),
        login_path: registry.login_path_for(path),
        is_login_path: registry.is_login_path(normalize_path(path)),
    };
    print_json(&report)
}

async fn run_replay(config: &NavigatorConfig, args: ReplayArgs) -> Result<(), CliError> {
    let steps = if args.scenario == "-" {
        scenario::parse(io::stdin().lock())?
    } else {
        scenario::parse(BufReader::new(File::open(&args.scenario)?))?
    };

    let mut port = MemoryPort::new(args.start);
    for (path, delay) in args.latency {
        port = port.with_latency(path, delay);
    }
    for path in args.missing {
        port = port.with_missing(path);
    }
    let port = Arc::new(port);

    let initial = match args.initial_auth {
        InitialAuth::Loading => AuthSnapshot::loading(),
        InitialAuth::Anonymous => AuthSnapshot::anonymous(),
    };
    let (store, publisher) = AuthStore::new(initial);
    let registry: Arc<RouteRegistry> = Arc::new(config.registry()?);
    let navigator = Navigator::start(registry, Arc::clone(&port) as Arc<dyn NavigationPort>, &store, config.options());

    for observation in scenario::Replay::new(navigator, publisher).run(steps).await {
        print_json(&observation)?;
    }
    for visit in port.history() {
        print_json(&serde_json::json!({ "event": "visit", "path": visit.path, "state": visit.state }))?;
    }
    Ok(())
}

fn parse_latency(raw: &str) -> Result<(String, Duration), String> {
    let Some((path, millis)) = raw.rsplit_once('=') else {
        return Err(format!("expected PATH=MILLIS, got `{raw}`"));
    };
    let millis = millis.parse::<u64>().map_err(|e| format!("invalid millis `{millis}`: {e}"))?;
    Ok((path.to_owned(), Duration::from_millis(millis)))
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
