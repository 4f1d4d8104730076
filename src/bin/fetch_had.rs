use anyhow::{anyhow, Context, Result};
use clap::Parser;
use strinks::db::BeerDb;
use strinks::log_utils;
use strinks::reqwest_utils::{build_client, DEFAULT_TIMEOUT};
use strinks::settings::Settings;
use strinks::sync::store_had_beers;
use strinks::untappd::api::{shared_limiter, user_agent, ApiAuth, UntappdApi};
use tracing::{info, warn};

/// Imports the rated check-ins of registered users.
#[derive(Parser, Debug, Clone)]
struct Args {
    /// Overrides STRINKS_DB
    #[arg(short, long)]
    database: Option<String>,

    /// Only this user; every registered user otherwise
    #[arg(short, long)]
    user_id: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    log_utils::init(&settings.log_file)?;
    let args = Args::parse();

    let database = args.database.as_deref().unwrap_or(&settings.database);
    let db = BeerDb::open(database).with_context(|| format!("Cannot open {database}"))?;
    let users = match args.user_id {
        Some(user_id) => vec![db
            .get_user(user_id)?
            .ok_or_else(|| anyhow!("Unknown user {user_id}"))?],
        None => db.get_users()?,
    };

    let http = build_client(DEFAULT_TIMEOUT)?;
    let client_id = settings.untappd.as_ref().map(|creds| creds.client_id.as_str());
    let limiter = shared_limiter();
    let mut failed = 0;
    for user in &users {
        info!("Fetching had beers of {}", user.user_name);
        let mut api = UntappdApi::new(
            http.clone(),
            ApiAuth::AccessToken(user.access_token.clone()),
            user_agent(client_id),
            limiter.clone(),
        );
        let since = db.get_latest_rating_time(user.id)?;
        let had = match api.had_beers(since).await {
            Ok(had) => had,
            Err(e) => {
                warn!(user = %user.user_name, "{e}");
                failed += 1;
                continue;
            }
        };
        let summary = store_had_beers(&db, user.id, had)?;
        info!("{}: {summary}", user.user_name);
    }
    info!("Done: {} user(s), {failed} failed", users.len());
    Ok(())
}
