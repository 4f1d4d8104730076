use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use strinks::db::BeerDb;
use strinks::log_utils;
use strinks::models::{ShopBeer, ShopInfo};
use strinks::reqwest_utils::{build_client, DEFAULT_TIMEOUT};
use strinks::scrape::{prepare_listing, scrape_shop};
use strinks::settings::Settings;
use strinks::translation::NoTranslation;
use strinks::untappd::{init_backends, UntappdClient};
use tracing::info;

#[derive(Parser, Debug, Clone)]
struct Args {
    /// CSV export of the shop's listings
    listings: String,

    #[arg(short, long)]
    shop_name: String,

    #[arg(long, default_value = "")]
    shop_url: String,

    #[arg(long, default_value = "")]
    shop_image_url: String,

    #[arg(long, default_value_t = 0)]
    shipping_fee: u32,

    #[arg(long)]
    free_shipping_over: Option<u32>,

    /// Overrides STRINKS_DB
    #[arg(short, long)]
    database: Option<String>,

    /// Full rotations through the Untappd backends before a listing is given up
    #[arg(long, default_value_t = 3)]
    max_cycles: usize,

    /// How long a cached Untappd search stays valid
    #[arg(long, default_value_t = 30)]
    cache_days: i64,
}

fn read_listings(path: &str) -> Result<Vec<ShopBeer>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("Cannot open {path}"))?;
    let mut listings = Vec::new();
    for record in reader.deserialize() {
        let listing: ShopBeer = record.with_context(|| format!("Invalid listing in {path}"))?;
        listings.extend(prepare_listing(listing));
    }
    Ok(listings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install prometheus exporter")?;
    let settings = Settings::from_env()?;
    log_utils::init(&settings.log_file)?;

    let args = Args::parse();
    info!("Starting scrape of {}", args.shop_name);

    let database = args.database.as_deref().unwrap_or(&settings.database);
    let db = BeerDb::open(database).with_context(|| format!("Cannot open {database}"))?;
    let listings = read_listings(&args.listings)?;
    info!("{} listings to match", listings.len());

    let http = build_client(DEFAULT_TIMEOUT)?;
    let backends = init_backends(&db, &settings, &http)?;
    let mut client = UntappdClient::new(backends)?
        .with_max_cycles(args.max_cycles)
        .with_cache_duration(chrono::Duration::days(args.cache_days));

    let shop = ShopInfo {
        name: args.shop_name,
        url: args.shop_url,
        image_url: args.shop_image_url,
        shipping_fee: args.shipping_fee,
        free_shipping_over: args.free_shipping_over,
    };
    let summary = scrape_shop(&db, &mut client, &NoTranslation, &shop, listings).await?;
    info!("Done: {summary}");
    info!("{}", prometheus.render());
    Ok(())
}
