use anyhow::{Context, Result};
use clap::Parser;
use strinks::db::BeerDb;
use strinks::log_utils;
use strinks::reqwest_utils::{build_client, DEFAULT_TIMEOUT};
use strinks::settings::Settings;
use strinks::sync::fetch_breweries;
use strinks::untappd::{init_backends, UntappdClient};
use tracing::info;

/// Looks up the details of breweries only known by name.
#[derive(Parser, Debug, Clone)]
struct Args {
    /// Overrides STRINKS_DB
    #[arg(short, long)]
    database: Option<String>,

    #[arg(long, default_value_t = 3)]
    max_cycles: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    log_utils::init(&settings.log_file)?;
    let args = Args::parse();

    let database = args.database.as_deref().unwrap_or(&settings.database);
    let db = BeerDb::open(database).with_context(|| format!("Cannot open {database}"))?;
    let http = build_client(DEFAULT_TIMEOUT)?;
    let backends = init_backends(&db, &settings, &http)?;
    let mut client = UntappdClient::new(backends)?.with_max_cycles(args.max_cycles);

    let summary = fetch_breweries(&db, &mut client).await?;
    info!("Done: {summary}");
    Ok(())
}
