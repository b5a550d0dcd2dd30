//! Seed and inspect a client registry from the command line
//!
//! Run with: cargo run -p seed-data -- --demo --search juan --audit 10

mod demo_data;

use anyhow::{Context, Result};
use clap::Parser;
use clientele::contact::format_phone;
use clientele::logging::init_logging;
use clientele::{ClientRecord, ClientRegistry, ClientRegistryApi, RegistryConfig};
use std::path::PathBuf;
use std::time::Duration;

use demo_data::DEMO_CLIENTS;

const DEFAULT_DATA_DIR: &str = "clinic-data";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the registry databases (overrides config and CLIENTELE_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "CLIENTELE_CONFIG")]
    config: Option<PathBuf>,

    /// Register the demo clients
    #[arg(long)]
    demo: bool,

    /// Show only clients matching this term
    #[arg(short, long)]
    search: Option<String>,

    /// Show the newest N audit entries
    #[arg(short, long)]
    audit: Option<usize>,

    /// Remove every client before anything else
    #[arg(long)]
    clear: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<RegistryConfig> {
    let mut config = match &args.config {
        Some(path) => RegistryConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RegistryConfig::default(),
    };
    config.apply_env();
    if let Some(dir) = &args.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if config.data_dir.is_none() {
        config.data_dir = Some(PathBuf::from(DEFAULT_DATA_DIR));
    }
    Ok(config)
}

fn print_clients(clients: &[ClientRecord]) {
    if clients.is_empty() {
        println!("  (no clients)");
        return;
    }
    for client in clients {
        println!(
            "  #{:<4} {:<28} {:<32} {}",
            client.id,
            client.name,
            client.email,
            format_phone(&client.phone)
        );
    }
}

async fn insert_demo_clients(registry: &ClientRegistry) -> usize {
    let mut inserted = 0;
    for demo in DEMO_CLIENTS {
        let outcome = registry
            .register(demo.name.to_string(), demo.email.to_string(), demo.phone.to_string())
            .await;
        match outcome.into_result() {
            Ok(id) => {
                inserted += 1;
                tracing::debug!(client_id = id, name = demo.name, "demo client registered");
            }
            Err(err) => eprintln!("Failed to register {}: {}", demo.name, err),
        }
    }
    inserted
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let level = if args.verbose { "debug" } else { config.log_level.as_str() };
    init_logging(level).context("Failed to initialize logging")?;

    let data_dir = config.data_dir.clone().unwrap_or_default();
    let registry = ClientRegistry::open(config)
        .with_context(|| format!("Failed to open registry in {}", data_dir.display()))?;

    if args.clear {
        registry.clear_all().await.context("Failed to clear clients")?;
        println!("Cleared all clients.");
    }

    if args.demo {
        println!("Inserting demo clients...");
        let inserted = insert_demo_clients(&registry).await;
        println!("Inserted {} of {} demo clients.", inserted, DEMO_CLIENTS.len());
    }

    match &args.search {
        Some(term) => {
            registry.set_search_term(term.clone());
            let mut rx = registry.subscribe_search();
            let state =
                tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| !s.is_searching))
                    .await
                    .context("Search timed out")?
                    .context("Search engine stopped")?
                    .clone();
            println!("Clients matching \"{}\" ({}):", term, state.filtered_results.len());
            print_clients(&state.filtered_results);
        }
        None => {
            let listing = registry.listing();
            println!("Clients ({}):", listing.len());
            print_clients(&listing);
        }
    }

    if let Some(limit) = args.audit {
        let (entries, failure) = registry.recent_audit(limit);
        if let Some(err) = failure {
            eprintln!("Audit log unavailable: {}", err);
        }
        println!("Audit log ({} newest):", entries.len());
        for entry in entries {
            let at = chrono::DateTime::from_timestamp_millis(entry.timestamp_millis)
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| entry.timestamp_millis.to_string());
            println!("  [{}] {}", at, entry.event);
        }
    }

    let last_email = registry.last_used_email();
    if !last_email.is_empty() {
        println!("Last used email: {}", last_email);
    }

    Ok(())
}
