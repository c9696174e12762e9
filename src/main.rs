use anyhow::{bail, Result};
use std::env;
use std::sync::Arc;

// Use library instead of local modules
use exit_watch::{
    init_tracing, AddressStore, AllowlistManager, Config, IngestionPipeline, SqliteStore,
};

const USAGE: &str =
    "usage: exit-watch <ingest | count | allow list | allow add <ip>... | allow remove <ip>...>";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = Config::from_env()?;

    run_command(&config, &args).await
}

async fn run_command(config: &Config, args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("ingest") => run_ingest(config).await,
        Some("count") => run_count(config),
        Some("allow") => run_allow(config, &args[1..]),
        _ => bail!(USAGE),
    }
}

async fn run_ingest(config: &Config) -> Result<()> {
    println!("🧅 Exit-node ingestion - feed → lookup → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    println!("✓ Database opened: {:?}", config.db_path);

    let pipeline = IngestionPipeline::from_config(config, store.clone())?;

    println!("\n📡 Fetching {} ...", config.feed_url);
    let report = pipeline.run_once().await?;

    println!("✓ Fetched: {} addresses", report.fetched);
    println!("✓ Created: {} records", report.created);
    println!("✓ Already present: {}", report.already_present);
    if report.lookup_failures > 0 {
        println!("⚠️  Country lookup failed: {} (retried next cycle)", report.lookup_failures);
    }
    if report.store_failures > 0 {
        println!("⚠️  Store failures: {}", report.store_failures);
    }

    println!("\n🔍 Database contains {} exit nodes", store.count_addresses()?);
    Ok(())
}

fn run_count(config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.db_path)?;
    println!("{}", store.count_addresses()?);
    Ok(())
}

fn run_allow(config: &Config, args: &[String]) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let manager = AllowlistManager::new(store);

    match args.first().map(String::as_str) {
        Some("list") => {
            for address in manager.list()? {
                println!("{}", address);
            }
        }
        Some("add") if args.len() > 1 => {
            let added = manager.add(&args[1..])?;
            println!("✓ Added {} of {} addresses", added, args.len() - 1);
        }
        Some("remove") if args.len() > 1 => {
            let removed = manager.remove(&args[1..])?;
            println!("✓ Removed {} of {} addresses", removed, args.len() - 1);
        }
        _ => bail!(USAGE),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unknown_command_returns_usage_error() {
        let config = Config::default();

        for bad in [args(&[]), args(&["serve"])] {
            let err = run_command(&config, &bad).await.unwrap_err();
            assert_eq!(err.to_string(), USAGE);
        }
    }
}
