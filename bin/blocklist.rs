//! # Blocklist
//!
//! Maintenance job and operator CLI for the spam blocklist.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin blocklist -- run                  # purge + reconcile every interval
//! cargo run --bin blocklist -- sync                 # one maintenance cycle
//! cargo run --bin blocklist -- check-domain evil.example
//! cargo run --bin blocklist -- scan-contracts polygon 0xabc...,0xdef...
//! cargo run --bin blocklist -- --memory sync        # no database
//! ```
//!
//! Press Ctrl+C to stop `run` gracefully.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use spam_blocklist::{
    database::{self, BlocklistStore, PgStore},
    memory_store::MemoryStore,
    network::Network,
    reconciler::{Reconciler, RunSummary},
    reports::ReportStore,
    service::{ApiKeys, BlocklistService},
    settings::Settings,
    sources::{self, BulkSource, SourcesConfig},
    verification_cache::VerificationCache,
    verifiers::{AlchemySpamContracts, GoogleSafeBrowsing, MnemonicHqWalletScan, VerifySource},
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tokio::time::{interval, Duration};

/// Spam blocklist aggregator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (optional; environment variables override it)
    #[arg(short, long, default_value = "Config.toml")]
    config: String,

    /// Keep everything in memory instead of PostgreSQL
    #[arg(long)]
    memory: bool,

    /// API key presented to protected operations
    #[arg(long)]
    api_key: Option<String>,

    /// Prometheus listen address (observability builds)
    #[arg(long, default_value = "0.0.0.0:9898")]
    metrics_addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Purge expired verdicts and reconcile all sources on a timer
    Run,
    /// Run one purge + reconcile cycle and exit
    Sync,
    /// Delete expired verified domains
    Purge,
    /// Check one domain (store first, then the verifier)
    CheckDomain { domain: String },
    /// Check a comma separated list of domains
    ScanDomains { domains: String },
    /// Check a comma separated list of contract addresses
    ScanContracts { network: String, addresses: String },
    /// Scan a wallet for spam NFTs and record their contracts
    ScanWallet { network: String, wallet: String },
    /// Report a contract as spam on behalf of a wallet
    Report {
        network: String,
        contract: String,
        wallet: String,
    },
    /// Show reported contracts, or the reporters of one contract
    Reports {
        network: String,
        contract: Option<String>,
    },
}

struct App {
    settings: Settings,
    reconciler: Reconciler,
    service: BlocklistService,
}

fn init_logging(level: &str) {
    #[cfg(feature = "observability")]
    {
        let level = tracing::Level::from_str(level).unwrap_or(tracing::Level::INFO);
        tracing_subscriber::fmt().json().with_max_level(level).init();
    }
    #[cfg(not(feature = "observability"))]
    {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    }
}

async fn build_app(cli: &Cli, settings: Settings) -> Result<App> {
    let store: Arc<dyn BlocklistStore> = if cli.memory {
        println!("⚠️  Using the in-memory store; nothing is persisted");
        Arc::new(MemoryStore::new())
    } else {
        let pool = database::connect(&settings.database).await?;
        println!("✅ Database connected");
        Arc::new(PgStore::new(pool))
    };

    let list_client = sources::http_client(Duration::from_secs(settings.sources.fetch_timeout_seconds))?;

    // Bulk sources: static lists plus the Alchemy spam feed per network.
    let sources_config = if settings.sources.config_path.exists() {
        SourcesConfig::load(&settings.sources.config_path).await?
    } else {
        println!(
            "⚠️  {} not found, no static lists configured",
            settings.sources.config_path.display()
        );
        SourcesConfig::default()
    };
    let mut bulk: Vec<Arc<dyn BulkSource>> =
        sources::build_list_sources(&sources_config, &settings.sources.lists_dir, &list_client)?;
    let alchemy_client = sources::http_client(Duration::from_secs(settings.verifiers.alchemy.timeout_seconds))?;
    for source in AlchemySpamContracts::from_settings(&settings.verifiers.alchemy, &alchemy_client) {
        bulk.push(Arc::new(source));
    }
    println!("✅ {} bulk sources configured", bulk.len());

    let reconciler = Reconciler::new(
        store.clone(),
        bulk,
        Duration::from_secs(settings.sources.fetch_timeout_seconds),
    );

    let google_client = sources::http_client(Duration::from_secs(settings.verifiers.google.timeout_seconds))?;
    let google: Option<Arc<dyn VerifySource>> =
        GoogleSafeBrowsing::from_settings(&settings.verifiers.google, google_client)
            .map(|g| Arc::new(g) as Arc<dyn VerifySource>);
    let cache = Arc::new(VerificationCache::new(
        store.clone(),
        google,
        settings.cache.default_ttl_seconds,
    ));

    let reports = Arc::new(ReportStore::new(settings.reports.path.clone()));
    let mut service = BlocklistService::new(
        store.clone(),
        cache,
        reports,
        ApiKeys::from_settings(&settings.api),
    )
    .with_scan_concurrency(settings.cache.scan_concurrency);

    let mnemonic_client =
        sources::http_client(Duration::from_secs(settings.verifiers.mnemonichq.timeout_seconds))?;
    if let Some(scanner) =
        MnemonicHqWalletScan::from_settings(&settings.verifiers.mnemonichq, mnemonic_client, store)
    {
        service = service.with_wallet_scanner(Arc::new(scanner));
    }

    Ok(App {
        settings,
        reconciler,
        service,
    })
}

async fn maintenance_cycle(app: &App) -> Option<RunSummary> {
    let started = Instant::now();
    if app.settings.reconciler.purge_before_run {
        match app.service.cache().purge_expired().await {
            Ok(purged) => println!("🧹 Purged {} expired verified domains", purged),
            Err(e) => eprintln!("❌ Purge failed: {}", e),
        }
    }
    match app.reconciler.run().await {
        Ok(summary) => {
            print_summary(&summary);
            println!("✅ Cycle completed in {:?}", started.elapsed());
            Some(summary)
        }
        Err(e) => {
            eprintln!("❌ Reconciliation failed: {}", e);
            None
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Reconciliation summary ({} ms):", summary.elapsed_ms);
    for s in &summary.sources {
        let status = match &s.failure {
            Some(reason) => format!("FAILED: {}", reason).red().to_string(),
            None => "ok".green().to_string(),
        };
        println!(
            "   • {} [{}] processed={} invalid={} added={} known={} failed_writes={} {}",
            s.source, s.category, s.processed, s.invalid, s.added, s.already_known, s.failed_writes, status
        );
    }
    println!("   Total added: {}\n", summary.total_added());
}

fn flag_label(flagged: bool) -> String {
    if flagged {
        "FLAGGED".red().bold().to_string()
    } else {
        "clean".green().to_string()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::from_file(&cli.config)?;
    init_logging(&settings.log.level);

    #[cfg(feature = "observability")]
    spam_blocklist::metrics::install_prometheus_exporter(cli.metrics_addr.parse()?)?;
    #[cfg(not(feature = "observability"))]
    let _ = &cli.metrics_addr;

    let app = build_app(&cli, settings).await?;
    let key = cli.api_key.as_deref();

    match &cli.command {
        Command::Run => {
            let every = app.settings.reconciler.interval_seconds.max(1);
            println!("🚀 Starting blocklist maintenance loop (every {} seconds)", every);
            let mut ticker = interval(Duration::from_secs(every));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        maintenance_cycle(&app).await;
                    }
                    _ = signal::ctrl_c() => {
                        println!("\n🛑 Shutdown requested, exiting");
                        break;
                    }
                }
            }
        }
        Command::Sync => {
            if maintenance_cycle(&app).await.is_none() {
                anyhow::bail!("reconciliation failed");
            }
        }
        Command::Purge => {
            let purged = app.service.cache().purge_expired().await?;
            println!("🧹 Purged {} expired verified domains", purged);
        }
        Command::CheckDomain { domain } => {
            let lookup = app.service.check_domain(key, domain).await?;
            println!("{} {} ({:?})", lookup.key, flag_label(lookup.flagged), lookup.state);
        }
        Command::ScanDomains { domains } => {
            for (input, flagged) in app.service.scan_domains(key, domains).await? {
                println!("{} {}", input, flag_label(flagged));
            }
        }
        Command::ScanContracts { network, addresses } => {
            let network = Network::from_str(network)?;
            for (input, flagged) in app.service.scan_contracts(key, network, addresses).await? {
                println!("{} {}", input, flag_label(flagged));
            }
        }
        Command::ScanWallet { network, wallet } => {
            let network = Network::from_str(network)?;
            let scan = app.service.scan_wallet(key, network, wallet).await?;
            println!("{} on {}: {}", scan.address, scan.network, scan.summary());
            for contract in &scan.spam_contracts {
                let marker = if scan.newly_recorded.contains(contract) { " (new)" } else { "" };
                println!("   • {}{}", contract.red(), marker);
            }
        }
        Command::Report {
            network,
            contract,
            wallet,
        } => {
            let network = Network::from_str(network)?;
            let outcome = app.service.report_contract(key, network, contract, wallet).await?;
            if outcome.recorded {
                println!(
                    "✅ {} reported {} on {} ({} reporters)",
                    outcome.wallet, outcome.contract, outcome.network, outcome.reporters
                );
            } else {
                println!("ℹ️  {} had already reported {}", outcome.wallet, outcome.contract);
            }
        }
        Command::Reports { network, contract } => {
            let network = Network::from_str(network)?;
            match contract {
                Some(contract) => {
                    for wallet in app.service.contract_reporters(key, network, contract).await? {
                        println!("{}", wallet);
                    }
                }
                None => {
                    println!("{}", serde_json::to_string_pretty(&app.service.reported_contracts(key, network).await?)?);
                }
            }
        }
    }

    Ok(())
}
