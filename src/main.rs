use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regwatch::{
    config::Config,
    detector::DetectorPipeline,
    discovery::DiscoveryCoordinator,
    feed::HttpFeed,
    model::PackageInfo,
    registry::{HttpResolver, Resolver},
    report::{markdown, GithubReporter, Reporter},
    risk,
    scan::ScanCoordinator,
    state::StateStore,
};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Exit codes for scheduler integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    /// An ad-hoc scan found something that clears the reporting bar.
    pub const FINDINGS: u8 = 2;
}

#[derive(Parser)]
#[command(name = "regwatch")]
#[command(
    author,
    version,
    about = "Monitor a registry change feed and scan new package versions for security findings"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume the change feed and record newly published versions
    Discover,

    /// Scan one package ad hoc (does not touch discovery/scan state)
    Scan {
        /// Package name, e.g. `lodash` or `@types/node`
        package: String,

        /// Specific version; defaults to the latest published
        #[arg(long)]
        version: Option<String>,

        /// Report to the configured issue tracker instead of printing
        #[arg(long)]
        report: bool,
    },

    /// Scan everything discovered but not yet scanned
    ScanPending,

    /// Show the cursor and the discovered/scanned set sizes
    State,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Discover => discover(&config).await,
        Commands::Scan {
            package,
            version,
            report,
        } => scan_one(&config, &package, version.as_deref(), report).await,
        Commands::ScanPending => scan_pending(&config).await,
        Commands::State => {
            show_state(&config);
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent("regwatch/0.1.0")
        .build()
        .context("failed to build HTTP client")
}

/// Builds the reporter when a target repository and token are configured.
fn reporter_for(config: &Config) -> Result<Option<GithubReporter>> {
    let Some(repo) = config.github.repo.as_deref() else {
        return Ok(None);
    };
    let token = std::env::var(&config.github.token_env).with_context(|| {
        format!(
            "github.repo is configured but {} is not set",
            config.github.token_env
        )
    })?;
    Ok(Some(GithubReporter::new(repo, &token)?))
}

async fn discover(config: &Config) -> Result<u8> {
    let client = http_client(config)?;
    let feed = HttpFeed::new(client.clone(), &config.feed_url);
    let resolver = HttpResolver::new(client, &config.registry_url);
    let store = StateStore::new(config.state_dir());

    let coordinator = DiscoveryCoordinator::new(
        &feed,
        &resolver,
        &store,
        config.page_size,
        config.max_per_run,
    );
    let run = coordinator.run().await?;

    println!(
        "Examined {} feed entries, discovered {} new versions (cursor {}).",
        run.entries_seen,
        run.discovered.len(),
        run.cursor
    );
    for id in &run.discovered {
        println!("  {}", id);
    }
    Ok(exit_codes::SUCCESS)
}

async fn scan_pending(config: &Config) -> Result<u8> {
    let client = http_client(config)?;
    let resolver = HttpResolver::new(client.clone(), &config.registry_url);
    let store = StateStore::new(config.state_dir());
    let pipeline = DetectorPipeline::new(
        client,
        config.max_tarball_bytes(),
        config.subprocess_timeout(),
    );
    let reporter = reporter_for(config)?;
    let reporter_ref: Option<&dyn Reporter> = reporter.as_ref().map(|r| r as &dyn Reporter);

    let coordinator = ScanCoordinator::new(
        &store,
        &resolver,
        &pipeline,
        reporter_ref,
        config.max_per_run,
    );
    let run = coordinator.run().await?;

    println!(
        "Scanned {} packages ({} reported, {} failed).",
        run.scanned.len(),
        run.reported,
        run.failed
    );
    Ok(exit_codes::SUCCESS)
}

async fn scan_one(
    config: &Config,
    package: &str,
    version: Option<&str>,
    report: bool,
) -> Result<u8> {
    let client = http_client(config)?;
    let resolver = HttpResolver::new(client.clone(), &config.registry_url);

    let info = match version {
        Some(version) => resolver.resolve_version(package, version).await?,
        None => resolver.resolve_latest(package).await?,
    };
    let info: PackageInfo = info.with_context(|| match version {
        Some(version) => format!("{}@{} does not resolve", package, version),
        None => format!("{} does not resolve", package),
    })?;

    let store = StateStore::new(config.state_dir());
    let pipeline = DetectorPipeline::new(
        client,
        config.max_tarball_bytes(),
        config.subprocess_timeout(),
    );
    let coordinator = ScanCoordinator::new(&store, &resolver, &pipeline, None, config.max_per_run);

    let scan_report = coordinator.scan_package(&info).await?;
    let reportable = risk::should_report(&scan_report.risk);

    if report && reportable {
        match reporter_for(config)? {
            Some(reporter) => reporter.report(&scan_report).await?,
            None => warn!("--report given but no github.repo is configured"),
        }
    }
    println!("{}", markdown::issue_body(&scan_report));

    if reportable {
        Ok(exit_codes::FINDINGS)
    } else {
        Ok(exit_codes::SUCCESS)
    }
}

fn show_state(config: &Config) {
    let store = StateStore::new(config.state_dir());
    let discovered = store.load_discovered();
    let scanned = store.load_scanned();
    let pending = discovered.difference(&scanned).count();

    println!("State directory: {}", store.dir().display());
    match store.load_cursor() {
        Some(cursor) => println!("Cursor:     {}", cursor),
        None => println!("Cursor:     (none - next discovery seeds from the feed)"),
    }
    println!("Discovered: {}", discovered.len());
    println!("Scanned:    {}", scanned.len());
    println!("Pending:    {}", pending);
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'regwatch config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
