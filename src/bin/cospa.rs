use anyhow::{Context, Result};
use clap::Parser;
use strinks::db::{BeerDb, CospaFilter};
use strinks::log_utils;
use strinks::profiles::BeerProfile;
use strinks::settings::Settings;
use tracing::info;

#[derive(Parser, Debug, Clone)]
struct Args {
    #[arg(short, long, value_enum, default_value_t = BeerProfile::default())]
    profile: BeerProfile,

    /// Overrides the profile's value factor
    #[arg(long)]
    value_factor: Option<f64>,

    #[arg(short, long)]
    search: Option<String>,

    #[arg(long)]
    shop_id: Option<i64>,

    #[arg(long, value_delimiter = ',')]
    styles: Option<Vec<String>>,

    #[arg(long, value_delimiter = ',')]
    countries: Option<Vec<String>>,

    #[arg(long)]
    min_price: Option<u32>,

    #[arg(long)]
    max_price: Option<u32>,

    /// Hide beers this Untappd user already rated
    #[arg(long)]
    exclude_user_had: Option<i64>,

    #[arg(short, long, default_value_t = 20)]
    limit: usize,

    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// List countries with offerings instead
    #[arg(long)]
    list_countries: bool,

    /// Overrides STRINKS_DB
    #[arg(short, long)]
    database: Option<String>,
}

fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    log_utils::init(&settings.log_file)?;
    let args = Args::parse();

    let database = args.database.as_deref().unwrap_or(&settings.database);
    let db = BeerDb::open(database).with_context(|| format!("Cannot open {database}"))?;

    if args.list_countries {
        for (country, count) in db.get_countries()? {
            println!("{country}: {count}");
        }
        return Ok(());
    }

    let filter = CospaFilter {
        limit: args.limit,
        offset: args.offset,
        value_factor: args.value_factor.unwrap_or(args.profile.value_factor()),
        search: args.search,
        shop_id: args.shop_id,
        styles: args.styles,
        countries: args.countries,
        min_price: args.min_price,
        max_price: args.max_price,
        exclude_user_had: args.exclude_user_had,
    };
    info!(profile = %args.profile, "Ranking offerings");
    for offering in db.get_best_cospa(&filter)? {
        println!(
            "{:.2} {} - {} ({}, {:.2}) at {}: {}¥ / {}mL ({:.2}¥/mL) {}",
            offering.value,
            offering.brewery_name,
            offering.beer_name,
            offering.style,
            offering.rating,
            offering.shop_name,
            offering.price,
            offering.milliliters,
            offering.price_per_ml(),
            offering.url,
        );
    }
    Ok(())
}
