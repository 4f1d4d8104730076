use anyhow::{Context, Result};
use clap::Parser;
use strinks::db::BeerDb;
use strinks::log_utils;
use strinks::settings::Settings;
use strinks::untappd::UntappdCache;
use tracing::info;

#[derive(Parser, Debug, Clone)]
struct Args {
    /// Overrides STRINKS_DB
    #[arg(short, long)]
    database: Option<String>,

    /// Delete expired entries after printing the statistics
    #[arg(long)]
    cleanup: bool,
}

fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    log_utils::init(&settings.log_file)?;
    let args = Args::parse();

    let database = args.database.as_deref().unwrap_or(&settings.database);
    let db = BeerDb::open(database).with_context(|| format!("Cannot open {database}"))?;
    let cache = UntappdCache::with_default_duration(&db);

    let stats = cache.stats()?;
    println!("Untappd cache: {stats}");

    if args.cleanup {
        let removed = cache.cleanup_expired()?;
        info!(removed, "Cleaned up Untappd cache");
        println!("Removed {removed} expired entries");
    }
    Ok(())
}
