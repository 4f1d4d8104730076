//! Untappd v4 API backend, authenticated either as the app or as a user.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::increment_counter;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::rank::best_match;
use super::rate_limit::{self, Limiter};
use super::structs::{BeerSearchHit, FlavorTag, UntappdBeerResult, UntappdBreweryResult, UntappdError};
use crate::models::{BeerId, BreweryId};
use crate::reqwest_utils::send_to_text;
use crate::settings::UntappdCredentials;

pub const API_URL: &str = "https://api.untappd.com/v4";
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(10 * 60);
const BEER_SEARCH_LIMIT: u32 = 10;
const BREWERY_SEARCH_LIMIT: u32 = 50;
const HAD_BEERS_PAGE: usize = 50;
const CHECKIN_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

pub fn user_agent(client_id: Option<&str>) -> String {
    format!("Strinks ({})", client_id.unwrap_or_default())
}

/// The limiter every API backend shares: Untappd counts requests per app.
pub fn shared_limiter() -> Arc<Limiter> {
    Arc::new(rate_limit::every(Duration::from_secs(1)))
}

#[derive(Debug, Clone)]
pub enum ApiAuth {
    AccessToken(String),
    App(UntappdCredentials),
}

impl ApiAuth {
    fn query_params(&self) -> Vec<(&'static str, String)> {
        match self {
            ApiAuth::AccessToken(token) => vec![("access_token", token.clone())],
            ApiAuth::App(credentials) => vec![
                ("client_id", credentials.client_id.clone()),
                ("client_secret", credentials.client_secret.clone()),
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(default = "ok_code")]
    code: u16,
}

fn ok_code() -> u16 {
    200
}

impl Default for Meta {
    fn default() -> Self {
        Meta { code: ok_code() }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    // Absent meta means success.
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Items<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SearchBeerResponse {
    beers: Items<SearchBeerItem>,
}

#[derive(Debug, Deserialize)]
struct SearchBeerItem {
    beer: SearchBeer,
    brewery: SearchBrewery,
}

#[derive(Debug, Deserialize)]
struct SearchBeer {
    bid: BeerId,
    beer_name: String,
}

#[derive(Debug, Deserialize)]
struct SearchBrewery {
    brewery_name: String,
}

#[derive(Debug, Deserialize)]
struct BeerInfoResponse {
    beer: ApiBeer,
}

#[derive(Debug, Deserialize)]
struct ApiBeer {
    bid: BeerId,
    beer_name: String,
    beer_label: String,
    #[serde(default)]
    beer_label_hd: Option<String>,
    beer_style: String,
    beer_abv: f64,
    beer_ibu: f64,
    rating_score: f64,
    #[serde(default)]
    weighted_rating_score: Option<f64>,
    #[serde(default)]
    rating_count: Option<i64>,
    #[serde(default)]
    beer_description: Option<String>,
    #[serde(default)]
    stats: Option<ApiStats>,
    brewery: ApiBrewery,
    #[serde(default)]
    flavor_profile: Option<Items<ApiFlavorTag>>,
}

#[derive(Debug, Deserialize)]
struct ApiStats {
    #[serde(default)]
    total_user_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiFlavorTag {
    tag_id: i64,
    tag_name: String,
    total_count: i64,
}

#[derive(Debug, Deserialize)]
struct ApiBrewery {
    brewery_id: BreweryId,
    brewery_name: String,
    #[serde(default)]
    brewery_label: String,
    #[serde(default)]
    country_name: String,
    #[serde(default)]
    location: Option<ApiLocation>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiLocation {
    #[serde(default)]
    brewery_city: Option<String>,
    #[serde(default)]
    brewery_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchBreweryResponse {
    brewery: Items<SearchBreweryItem>,
}

#[derive(Debug, Deserialize)]
struct SearchBreweryItem {
    brewery: ApiBrewery,
}

#[derive(Debug, Deserialize)]
struct UserBeersResponse {
    beers: Items<UserBeerItem>,
}

#[derive(Debug, Deserialize)]
struct UserBeerItem {
    recent_created_at: String,
    // The user's own rating, 0 or absent when the beer was never rated.
    #[serde(default)]
    rating_score: Option<f64>,
    beer: UserBeer,
    brewery: ApiBrewery,
}

#[derive(Debug, Deserialize)]
struct UserBeer {
    bid: BeerId,
    beer_name: String,
    beer_label: String,
    #[serde(default)]
    beer_label_hd: Option<String>,
    beer_style: String,
    beer_abv: f64,
    #[serde(default)]
    beer_ibu: f64,
    #[serde(default)]
    rating_score: f64,
    #[serde(default)]
    beer_description: Option<String>,
}

/// A beer from a user's check-in history.
#[derive(Debug, Clone, PartialEq)]
pub struct HadBeer {
    pub beer: UntappdBeerResult,
    pub rating: Option<f64>,
    pub checked_in_at: DateTime<Utc>,
}

// Untappd sends "" for unknown locations.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl ApiBrewery {
    fn city_state(&mut self) -> (Option<String>, Option<String>) {
        let location = self.location.take().unwrap_or_default();
        (
            non_empty(location.brewery_city),
            non_empty(location.brewery_state),
        )
    }
}

fn pick_search_result(query: &str, items: &[SearchBeerItem]) -> Option<BeerId> {
    if items.is_empty() {
        return None;
    }
    let names = items
        .iter()
        .map(|item| format!("{} {}", item.brewery.brewery_name, item.beer.beer_name));
    Some(items[best_match(query, names)].beer.bid)
}

fn beer_from_info(beer: ApiBeer) -> UntappdBeerResult {
    let ApiBeer {
        bid,
        beer_name,
        beer_label,
        beer_label_hd,
        beer_style,
        beer_abv,
        beer_ibu,
        rating_score,
        weighted_rating_score,
        rating_count,
        beer_description,
        stats,
        mut brewery,
        flavor_profile,
    } = beer;
    let (brewery_city, brewery_state) = brewery.city_state();
    let tags = flavor_profile.map(|profile| {
        profile
            .items
            .into_iter()
            .map(|tag| FlavorTag {
                tag_id: tag.tag_id,
                name: tag.tag_name,
                count: tag.total_count,
            })
            .collect()
    });
    UntappdBeerResult {
        beer_id: bid,
        image_url: non_empty(beer_label_hd).unwrap_or(beer_label),
        name: beer_name,
        brewery: brewery.brewery_name,
        brewery_id: brewery.brewery_id,
        brewery_country: brewery.country_name,
        brewery_city,
        brewery_state,
        style: beer_style,
        abv: beer_abv,
        ibu: beer_ibu,
        rating: rating_score,
        weighted_rating: weighted_rating_score,
        rating_count,
        total_user_count: stats.and_then(|stats| stats.total_user_count),
        description: beer_description,
        tags,
    }
}

fn had_beer_from_item(item: UserBeerItem) -> Result<HadBeer, chrono::ParseError> {
    let UserBeerItem {
        recent_created_at,
        rating_score,
        beer,
        mut brewery,
    } = item;
    let checked_in_at = DateTime::parse_from_str(&recent_created_at, CHECKIN_DATE_FORMAT)?;
    let (brewery_city, brewery_state) = brewery.city_state();
    Ok(HadBeer {
        beer: UntappdBeerResult {
            beer_id: beer.bid,
            image_url: non_empty(beer.beer_label_hd).unwrap_or(beer.beer_label),
            name: beer.beer_name,
            brewery: brewery.brewery_name,
            brewery_id: brewery.brewery_id,
            brewery_country: brewery.country_name,
            brewery_city,
            brewery_state,
            style: beer.beer_style,
            abv: beer.beer_abv,
            ibu: beer.beer_ibu,
            rating: beer.rating_score,
            weighted_rating: None,
            rating_count: None,
            total_user_count: None,
            description: beer.beer_description,
            tags: None,
        },
        rating: rating_score.filter(|rating| *rating > 0.0),
        checked_in_at: checked_in_at.with_timezone(&Utc),
    })
}

fn brewery_from_search(item: SearchBreweryItem) -> UntappdBreweryResult {
    let mut brewery = item.brewery;
    let (city, state) = brewery.city_state();
    UntappdBreweryResult {
        brewery_id: brewery.brewery_id,
        image_url: brewery.brewery_label,
        name: brewery.brewery_name,
        country: brewery.country_name,
        city,
        state,
    }
}

pub struct UntappdApi {
    http: Client,
    auth: ApiAuth,
    user_agent: String,
    limiter: Arc<Limiter>,
    rate_limited_until: Option<Instant>,
}

impl std::fmt::Display for UntappdApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.auth {
            ApiAuth::AccessToken(token) => {
                let prefix: String = token.chars().take(5).collect();
                write!(f, "UntappdApi(auth={prefix}...)")
            }
            ApiAuth::App(_) => write!(f, "UntappdApi(auth=APP)"),
        }
    }
}

impl UntappdApi {
    pub fn new(http: Client, auth: ApiAuth, user_agent: String, limiter: Arc<Limiter>) -> Self {
        UntappdApi {
            http,
            auth,
            user_agent,
            limiter,
            rate_limited_until: None,
        }
    }

    fn check_cooldown(&self) -> Result<(), UntappdError> {
        match self.rate_limited_until {
            Some(until) if until > Instant::now() => {
                Err(UntappdError::rate_limited(self, "cooling down"))
            }
            _ => Ok(()),
        }
    }

    fn start_cooldown(&mut self, reason: impl std::fmt::Display) -> UntappdError {
        self.rate_limited_until = Some(Instant::now() + RATE_LIMIT_COOLDOWN);
        increment_counter!("untappd_api_cooldown");
        warn!(backend = %self, %reason, "Untappd API failure, cooling down");
        UntappdError::rate_limited(&*self, reason)
    }

    async fn api_request<T: DeserializeOwned>(
        &mut self,
        uri: &str,
        params: &[(&str, String)],
    ) -> Result<T, UntappdError> {
        self.check_cooldown()?;
        self.limiter.until_ready().await;

        let request = self
            .http
            .get(format!("{API_URL}{uri}"))
            .query(params)
            .query(&self.auth.query_params())
            .header(header::USER_AGENT, &self.user_agent);
        let resp = match send_to_text(request).await {
            Ok(resp) => resp,
            Err(e) => return Err(self.start_cooldown(e)),
        };
        if resp.status != StatusCode::OK {
            return Err(self.start_cooldown(format!("HTTP {}", resp.status)));
        }
        let envelope: Envelope = match resp.json() {
            Ok(envelope) => envelope,
            Err(e) => return Err(self.start_cooldown(e)),
        };
        if envelope.meta.code != 200 {
            return Err(self.start_cooldown(format!("API code {}", envelope.meta.code)));
        }
        serde_json::from_value(envelope.response)
            .map_err(|e| UntappdError::rate_limited(&*self, format!("unexpected {uri} response: {e}")))
    }

    /// Search results carry no ratings, so the hit is the beer id alone.
    #[instrument(skip(self), fields(backend = %self))]
    pub async fn search_beer(&mut self, query: &str) -> Result<Option<BeerSearchHit>, UntappdError> {
        if query.is_empty() {
            return Ok(None);
        }
        let search: SearchBeerResponse = self
            .api_request(
                "/search/beer",
                &[("q", query.to_string()), ("limit", BEER_SEARCH_LIMIT.to_string())],
            )
            .await?;
        let hit = pick_search_result(query, &search.beers.items).map(BeerSearchHit::id_only);
        if hit.is_none() {
            debug!("No Untappd result");
        }
        Ok(hit)
    }

    pub async fn beer_info(&mut self, beer_id: BeerId) -> Result<UntappdBeerResult, UntappdError> {
        let info: BeerInfoResponse = self
            .api_request(
                &format!("/beer/info/{beer_id}"),
                &[
                    ("compact", "enhanced".to_string()),
                    ("ratingEnhanced", "true".to_string()),
                ],
            )
            .await?;
        Ok(beer_from_info(info.beer))
    }

    pub async fn search_breweries(
        &mut self,
        query: &str,
    ) -> Result<Vec<UntappdBreweryResult>, UntappdError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let search: SearchBreweryResponse = self
            .api_request(
                "/search/brewery",
                &[("q", query.to_string()), ("limit", BREWERY_SEARCH_LIMIT.to_string())],
            )
            .await?;
        Ok(search
            .brewery
            .items
            .into_iter()
            .map(brewery_from_search)
            .collect())
    }

    /// Beers the authenticated user checked in from the day of `since` on,
    /// oldest first.
    #[instrument(skip(self), fields(backend = %self))]
    pub async fn had_beers(&mut self, since: Option<DateTime<Utc>>) -> Result<Vec<HadBeer>, UntappdError> {
        let start_date = since
            .map(|since| since.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "1970-01-01".to_string());
        let end_date = (Utc::now() + chrono::Duration::days(1))
            .format("%Y-%m-%d")
            .to_string();
        let mut had = Vec::new();
        let mut fetched = 0;
        loop {
            let page: UserBeersResponse = self
                .api_request(
                    "/user/beers/",
                    &[
                        ("offset", fetched.to_string()),
                        ("limit", HAD_BEERS_PAGE.to_string()),
                        ("sort", "date_asc".to_string()),
                        ("start_date", start_date.clone()),
                        ("end_date", end_date.clone()),
                    ],
                )
                .await?;
            let count = page.beers.items.len();
            fetched += count;
            for item in page.beers.items {
                let bid = item.beer.bid;
                match had_beer_from_item(item) {
                    Ok(beer) => had.push(beer),
                    Err(e) => warn!(beer_id = bid, "Invalid check-in date: {e}"),
                }
            }
            debug!(fetched, "Fetched had beers");
            if count < HAD_BEERS_PAGE {
                return Ok(had);
            }
        }
    }
}
