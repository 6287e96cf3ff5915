use clap::{Parser, ValueEnum};
use console::{Term, set_colors_enabled, style};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process;
use tokio::signal;

use ipsift::{
    Action, IpsiftError, LogObserver, Observer, Orchestrator, ProgressEvent, Publisher, RunConfig,
    RunFailure, RunReport, RunRequest, RunStatus, SourceError, SourceId, StoreClient, fmt,
};

mod config_store;
mod logging;

use config_store::ConfigStore;

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "ipsift")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Probe candidate IPs, keep the fastest, publish them to a KV store")]
#[command(long_about = Some(
    "Fetch a list of IPv4 addresses and CIDR blocks, measure TCP/TLS connect latency,\n\
     and upload the fastest entries to a remote store.\n\
     \n\
     Examples:\n\
       ipsift --source official --port 443\n\
       ipsift --file my-ips.txt --dry-run\n\
       ipsift --source as13335 --action append --best 32\n\
       ipsift --health"
))]
struct Args {
    /// Config file (default: <config dir>/ipsift/config.toml)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Write a default config file and exit
    #[arg(long)]
    create_config: bool,

    /// Remote store base URL
    #[arg(long)]
    worker_url: Option<String>,

    /// Remote store API key
    #[arg(long)]
    api_key: Option<String>,

    /// Candidate source: official, cm, as13335, as209242, proxyip or an http(s) URL
    #[arg(short = 's', long)]
    source: Option<String>,

    /// Read candidates from a local file instead of a source
    #[arg(long, conflicts_with = "source")]
    file: Option<PathBuf>,

    /// Port to probe
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// How the store merges the upload
    #[arg(short = 'a', long, value_enum)]
    action: Option<Action>,

    /// Store key to write
    #[arg(long)]
    key: Option<String>,

    /// Per-attempt timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Concurrent probes
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Trials per address
    #[arg(short = 't', long)]
    trials: Option<u32>,

    /// Number of addresses to keep
    #[arg(short = 'b', long)]
    best: Option<usize>,

    /// Cap on resolved candidates (0 = all)
    #[arg(short = 'l', long)]
    limit: Option<usize>,

    /// Addresses sampled per CIDR block
    #[arg(long)]
    cidr_sample: Option<usize>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Probe and select, but do not upload
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Check the store's health endpoint and exit
    #[arg(long)]
    health: bool,

    /// Show store statistics and exit
    #[arg(long)]
    store_stats: bool,

    /// Show the records currently in the store and exit
    #[arg(long)]
    show_current: bool,

    /// Output format: text or json
    #[arg(short = 'f', long, default_value = "text", value_enum)]
    format: OutputFormat,

    /// Alias for JSON output
    #[arg(short = 'j', long)]
    json: bool,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,

    /// Disable colored output
    #[arg(long = "no-color", alias = "nocolor")]
    no_color: bool,

    /// Show every selected record and debug logs
    #[arg(short = 'v', long)]
    verbose: bool,
}

/// Prints progress lines to stderr, keeping stdout for the result.
struct TermObserver {
    term: Term,
}

impl Observer for TermObserver {
    fn notify(&self, event: &ProgressEvent) {
        self.term.write_line(&fmt::text::render_event(event)).ok();
    }
}

#[tokio::main]
async fn main() {
    let mut args = Args::parse();

    if args.json {
        args.format = OutputFormat::Json;
    }
    let want_color = matches!(args.format, OutputFormat::Text)
        && io::stdout().is_terminal()
        && std::env::var_os("NO_COLOR").is_none()
        && !args.no_color;
    set_colors_enabled(want_color);
    console::set_colors_enabled_stderr(want_color && io::stderr().is_terminal());
    logging::init(args.verbose);

    let term = Term::stdout();

    if args.create_config {
        let code = match ConfigStore::create_default(args.config.as_deref()) {
            Ok(store) => {
                term.write_line(&format!(
                    "{} {}",
                    style("Created config:").green().bold(),
                    store.path().display()
                ))
                .ok();
                0
            }
            Err(e) => {
                term.write_line(&style(format!("Error: {}", e)).red().to_string())
                    .ok();
                2
            }
        };
        process::exit(code);
    }

    let config = match ConfigStore::load(args.config.as_deref()) {
        Ok(store) => apply_overrides(store.data, &args),
        Err(e) => {
            term.write_line(&style(format!("Error: {}", e)).red().to_string())
                .ok();
            process::exit(2);
        }
    };

    if args.health || args.store_stats || args.show_current {
        process::exit(diagnostics(&term, &config, &args).await);
    }

    let request = match build_request(&config, &args) {
        Ok(r) => r,
        Err(e) => process::exit(handle_error(&term, e)),
    };

    let report = if request.dry_run {
        match Orchestrator::offline(config) {
            Ok(orch) => execute(&orch, &request, &args).await,
            Err(e) => process::exit(handle_error(&term, e)),
        }
    } else {
        match Orchestrator::from_config(config) {
            Ok(orch) => execute(&orch, &request, &args).await,
            Err(e) => process::exit(handle_error(&term, e)),
        }
    };

    output(&term, &report, &args);
    process::exit(exit_code(&report));
}

fn apply_overrides(mut cfg: RunConfig, args: &Args) -> RunConfig {
    if let Some(v) = &args.worker_url {
        cfg.worker_url = v.clone();
    }
    if let Some(v) = &args.api_key {
        cfg.worker_api_key = v.clone();
    }
    if let Some(v) = &args.source {
        cfg.default_ip_source = v.clone();
    }
    if let Some(v) = args.port {
        cfg.default_port = v;
    }
    if let Some(v) = args.action {
        cfg.default_action = v;
    }
    if let Some(v) = &args.key {
        cfg.store_key = v.clone();
    }
    if let Some(v) = args.timeout {
        cfg.timeout = v;
    }
    if let Some(v) = args.workers {
        cfg.max_workers = v;
    }
    if let Some(v) = args.trials {
        cfg.test_count = v;
    }
    if let Some(v) = args.best {
        cfg.best_count = v;
    }
    if let Some(v) = args.limit {
        cfg.ip_count = v;
    }
    if let Some(v) = args.cidr_sample {
        cfg.cidr_sample = v;
    }
    if let Some(v) = args.seed {
        cfg.sample_seed = Some(v);
    }
    cfg
}

fn build_request(cfg: &RunConfig, args: &Args) -> Result<RunRequest, IpsiftError> {
    let mut request = RunRequest::from_config(cfg).or_else(|e| match (&args.file, e) {
        // a bad default source does not matter when --file replaces it
        (Some(_), _) => Ok(RunRequest {
            source: SourceId::Inline(String::new()),
            port: cfg.default_port,
            action: cfg.default_action,
            dry_run: false,
        }),
        (None, e) => Err(e),
    })?;
    if let Some(path) = &args.file {
        request.source = SourceId::File(path.clone());
    }
    request.dry_run = args.dry_run;
    Ok(request)
}

async fn execute<P: Publisher>(
    orch: &Orchestrator<P>,
    request: &RunRequest,
    args: &Args,
) -> RunReport {
    let cancel = orch.cancel_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight probes");
            cancel.cancel();
        }
    });
    match args.format {
        OutputFormat::Text => {
            let observer = TermObserver {
                term: Term::stderr(),
            };
            orch.run(request, &observer).await
        }
        OutputFormat::Json => orch.run(request, &LogObserver).await,
    }
}

async fn diagnostics(term: &Term, cfg: &RunConfig, args: &Args) -> i32 {
    if let Err(e) = cfg.validate_store() {
        return handle_error(term, e.into());
    }
    let client = match StoreClient::new(&cfg.worker_url, &cfg.worker_api_key, cfg.http_timeout()) {
        Ok(c) => c,
        Err(e) => return handle_error(term, e.into()),
    };
    let json = matches!(args.format, OutputFormat::Json);

    if args.health {
        match client.health().await {
            Ok(status) if json => print_json(&serde_json::json!({ "status": status }), args.pretty),
            Ok(status) => {
                term.write_line(&format!(
                    "{} {}",
                    style("Store health:").cyan().bold(),
                    style(status).green()
                ))
                .ok();
            }
            Err(e) => return handle_error(term, e.into()),
        }
    }
    if args.store_stats {
        match client.stats().await {
            Ok(stats) if json => print_json(&stats, args.pretty),
            Ok(stats) => {
                term.write_line(&fmt::text::render_store_stats(&stats)).ok();
            }
            Err(e) => return handle_error(term, e.into()),
        }
    }
    if args.show_current {
        match client.fetch_current(&cfg.store_key).await {
            Ok(ips) if json => print_json(&serde_json::json!({ "key": cfg.store_key, "ips": ips }), args.pretty),
            Ok(ips) => {
                term.write_line(&fmt::text::render_current(&cfg.store_key, &ips))
                    .ok();
            }
            Err(e) => return handle_error(term, e.into()),
        }
    }
    0
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) {
    match fmt::json::to_string(value, pretty) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("error serializing: {}", e),
    }
}

fn output(term: &Term, report: &RunReport, args: &Args) {
    match args.format {
        OutputFormat::Text => {
            term.write_line(&fmt::text::render_report(report, args.verbose))
                .ok();
        }
        OutputFormat::Json => match fmt::json::report_to_json(report, args.pretty) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("error serializing: {}", e),
        },
    }
}

fn exit_code(report: &RunReport) -> i32 {
    match &report.status {
        RunStatus::Uploaded { .. } | RunStatus::DryRun => 0,
        RunStatus::Failed(RunFailure::Sync(_)) => 3,
        RunStatus::Failed(RunFailure::Cancelled { .. }) => 130,
        RunStatus::Failed(_) => 1,
    }
}

fn handle_error(term: &Term, err: IpsiftError) -> i32 {
    term.write_line(&style(format!("Error: {}", err)).red().to_string())
        .ok();
    match err {
        IpsiftError::Config(_) | IpsiftError::Source(SourceError::UnknownSource(_)) => 2,
        IpsiftError::Sync(_) => 3,
        _ => 1,
    }
}
