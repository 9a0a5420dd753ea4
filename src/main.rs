use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use farol::cache::{RealmCache, SqliteStorage};
use farol::config::Config;
use farol::models::NetworkIdentity;
use farol::probe::HealthProbe;
use farol::scanner::CandidateScanner;
use farol::selector::RealmSelector;
use farol::session::RealmSession;

#[derive(Parser)]
#[command(
    name = "farol",
    version,
    about = "Realm discovery, health validation and selection for catalyst server clusters",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Select a realm and print the committed choice
    Select {
        /// Network to select for
        #[arg(short, long, default_value = "mainnet")]
        network: NetworkIdentity,

        /// Explicit realm, as "name" or "name-layer"
        #[arg(short, long)]
        realm: Option<String>,

        /// Pin selection to a single catalyst domain
        #[arg(long)]
        pin: Option<String>,

        /// Minimum compatible catalyst version
        #[arg(long)]
        min_version: Option<semver::Version>,

        /// Preview mode: local stub realm, no network
        #[arg(long, default_value = "false")]
        preview: bool,
    },

    /// Scan and print the current candidate set without committing
    Scan {
        /// Minimum compatible catalyst version
        #[arg(long)]
        min_version: Option<semver::Version>,
    },

    /// Probe a single server's status endpoint
    Probe {
        /// Server domain, e.g. https://peer.example.com
        domain: String,
    },

    /// Print what the cache knows about a network
    Cached {
        /// Network to inspect
        #[arg(short, long, default_value = "mainnet")]
        network: NetworkIdentity,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, &cli.log_format);

    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Select {
            network,
            realm,
            pin,
            min_version,
            preview,
        } => {
            config.network = network;
            if realm.is_some() {
                config.selection.explicit_realm = realm;
            }
            if pin.is_some() {
                config.selection.pinned_domain = pin;
            }
            if min_version.is_some() {
                config.selection.min_version = min_version;
            }
            if preview {
                config.selection.preview_mode = true;
            }
            select(config).await
        }
        Commands::Scan { min_version } => {
            if min_version.is_some() {
                config.selection.min_version = min_version;
            }
            scan(config).await
        }
        Commands::Probe { domain } => probe(config, &domain).await,
        Commands::Cached { network } => cached(config, network).await,
    }
}

fn init_tracing(verbose: bool, format: &str) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn select(config: Config) -> Result<()> {
    if let Some(parent) = config.storage.sqlite_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let storage = Arc::new(SqliteStorage::open(&config.storage.sqlite_path)?);
    let session = RealmSession::new(
        config.network,
        RealmSelector::new(config.discovery.clone())?,
        RealmCache::new(storage),
    );

    let realm = session.initialize(&config.selection).await?;

    println!("realm:    {}", realm.catalyst_name);
    println!("domain:   {}", realm.domain);
    println!("layer:    {}", realm.layer);
    println!("version:  {}", realm.lighthouse_version);
    Ok(())
}

async fn scan(config: Config) -> Result<()> {
    let scanner = CandidateScanner::new(config.discovery.clone())?;
    let report = scanner.scan(&config.selection).await?;

    println!("scanned at {}", report.scanned_at.to_rfc3339());
    for candidate in report.set.all() {
        println!(
            "{:<40} {:<16} {:<8} v{:<10} {}/{}",
            candidate.domain,
            candidate.catalyst_name,
            candidate.layer,
            candidate.lighthouse_version,
            candidate.users_count,
            candidate.max_users,
        );
    }
    Ok(())
}

async fn probe(config: Config, domain: &str) -> Result<()> {
    let probe = HealthProbe::new(config.discovery.probe_timeout())?;
    let report = probe.probe(domain).await;

    if report.reachable {
        println!("reachable ({} ms)", report.latency.as_millis());
        if let Some(version) = report.version {
            println!("version:  {version}");
        }
        if let Some(status) = report.status {
            println!("status:   {}", serde_json::to_string_pretty(&status)?);
        }
    } else {
        println!("unreachable ({} ms)", report.latency.as_millis());
    }
    Ok(())
}

async fn cached(config: Config, network: NetworkIdentity) -> Result<()> {
    let storage = Arc::new(SqliteStorage::open(&config.storage.sqlite_path)?);
    let entry = RealmCache::new(storage).load(network).await?;

    match entry.realm {
        Some(realm) => println!("realm: {} ({})", realm.catalyst_name, realm.domain),
        None => println!("realm: none cached"),
    }
    println!("candidates: {}", entry.candidates.len());
    for candidate in entry.candidates {
        println!("  {} ({})", candidate.catalyst_name, candidate.domain);
    }
    Ok(())
}
