use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;

use super::api::{shared_limiter, user_agent, ApiAuth, UntappdApi};
use super::structs::{BeerSearchHit, UntappdBeerResult, UntappdBreweryResult, UntappdError};
use super::web::UntappdWeb;
use crate::db::BeerDb;
use crate::models::BeerId;
use crate::settings::Settings;

/// One way of querying Untappd. Any failure that another backend could get
/// past is reported as [`UntappdError::RateLimited`].
///
/// The store is handed to every lookup so a backend can reuse what earlier
/// runs already saved.
#[allow(async_fn_in_trait)]
pub trait UntappdBackend: std::fmt::Display {
    async fn search_beer(
        &mut self,
        db: &BeerDb,
        query: &str,
    ) -> Result<Option<BeerSearchHit>, UntappdError>;

    async fn beer_info(&mut self, db: &BeerDb, beer_id: BeerId) -> Result<UntappdBeerResult, UntappdError>;

    /// `Ok(None)` when the backend has no brewery search.
    async fn search_breweries(
        &mut self,
        query: &str,
    ) -> Result<Option<Vec<UntappdBreweryResult>>, UntappdError>;

    fn describe(&self) -> String {
        self.to_string()
    }
}

pub enum Backend {
    Api(UntappdApi),
    Web(UntappdWeb),
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Api(api) => api.fmt(f),
            Backend::Web(web) => web.fmt(f),
        }
    }
}

impl UntappdBackend for Backend {
    async fn search_beer(
        &mut self,
        db: &BeerDb,
        query: &str,
    ) -> Result<Option<BeerSearchHit>, UntappdError> {
        match self {
            Backend::Api(api) => api.search_beer(query).await,
            Backend::Web(web) => web.search_beer(db, query).await,
        }
    }

    async fn beer_info(&mut self, db: &BeerDb, beer_id: BeerId) -> Result<UntappdBeerResult, UntappdError> {
        match self {
            Backend::Api(api) => api.beer_info(beer_id).await,
            Backend::Web(web) => web.beer_info(db, beer_id).await,
        }
    }

    async fn search_breweries(
        &mut self,
        query: &str,
    ) -> Result<Option<Vec<UntappdBreweryResult>>, UntappdError> {
        match self {
            Backend::Api(api) => api.search_breweries(query).await.map(Some),
            Backend::Web(_) => Ok(None),
        }
    }
}

/// Backends in the order they are tried: app user tokens, the app's own
/// credentials, real user tokens, then the web scraper.
pub fn init_backends(db: &BeerDb, settings: &Settings, http: &Client) -> Result<Vec<Backend>> {
    let client_id = settings.untappd.as_ref().map(|creds| creds.client_id.as_str());
    let limiter = shared_limiter();
    let api = |auth| {
        Backend::Api(UntappdApi::new(
            http.clone(),
            auth,
            user_agent(client_id),
            limiter.clone(),
        ))
    };

    let mut backends = Vec::new();
    let app_tokens = db
        .get_access_tokens(Some(true))
        .context("Cannot read app user tokens")?;
    backends.extend(app_tokens.into_iter().map(|token| api(ApiAuth::AccessToken(token))));
    if let Some(credentials) = &settings.untappd {
        backends.push(api(ApiAuth::App(credentials.clone())));
    }
    let user_tokens = db
        .get_access_tokens(Some(false))
        .context("Cannot read user tokens")?;
    backends.extend(user_tokens.into_iter().map(|token| api(ApiAuth::AccessToken(token))));
    backends.push(Backend::Web(UntappdWeb::new(http.clone())));

    info!(
        "Untappd backends: {}",
        backends.iter().map(|backend| backend.describe()).collect::<Vec<_>>().join(", ")
    );
    Ok(backends)
}
