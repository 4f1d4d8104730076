//! Anonymous backend scraping untappd.com search and beer pages.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{header, Client};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};

use super::rank::best_match;
use super::rate_limit::{self, Limiter};
use super::structs::{BeerSearchHit, UntappdBeerResult, UntappdBreweryResult, UntappdError};
use crate::db::BeerDb;
use crate::models::{BeerId, BreweryId};
use crate::reqwest_utils::send_to_text_with_retries;

const BASE_URL: &str = "https://untappd.com";
const REFERER: &str = "https://untappd.com/home";
const USER_AGENT: &str = "Mozilla/5.0 (Linux) Gecko/20100101 Firefox/81.0";
const MAX_REQ_PER_HOUR: u32 = 1000;
const REQ_COOLDOWN: Duration = Duration::from_secs(5);
const FETCH_ATTEMPTS: usize = 3;
const ALL_COUNTRIES: &str = "Show All Countries";

lazy_static! {
    static ref BREWERY_ID_IN_IMAGE: Regex = Regex::new(r"brewery-([0-9]+)_").unwrap();
}

fn create_selector(selectors: &str) -> Result<Selector> {
    Selector::parse(selectors).map_err(|_| anyhow!("couldn't build selector {selectors}"))
}

fn get_element<'a>(item: &ElementRef<'a>, selectors: &str) -> Result<ElementRef<'a>> {
    item.select(&create_selector(selectors)?)
        .next()
        .ok_or_else(|| anyhow!("No {selectors} element"))
}

fn get_attr<'a>(item: &ElementRef<'a>, selectors: &str, attr: &str) -> Result<&'a str> {
    get_element(item, selectors)?
        .value()
        .attr(attr)
        .ok_or_else(|| anyhow!("{selectors} has no {attr}"))
}

fn get_text(item: &ElementRef, selectors: &str) -> Result<String> {
    Ok(get_element(item, selectors)?
        .text()
        .collect::<String>()
        .trim()
        .to_string())
}

// Untappd prints "N/A" for unknown ABV, IBU and ratings.
fn parse_stat(text: &str) -> Result<f64> {
    let text = text.trim();
    if text == "N/A" {
        return Ok(f64::NAN);
    }
    text.parse().with_context(|| format!("Invalid number {text}"))
}

/// A beer as shown on a search result card or a beer page, before brewery lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct BeerCard {
    pub beer_id: BeerId,
    pub image_url: String,
    pub name: String,
    pub brewery_name: String,
    pub brewery_url: String,
    pub style: String,
    pub abv: f64,
    pub ibu: f64,
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreweryInfo {
    pub brewery_id: BreweryId,
    pub image_url: String,
    pub country: String,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl BreweryInfo {
    pub fn into_brewery(self, name: &str) -> UntappdBreweryResult {
        UntappdBreweryResult {
            brewery_id: self.brewery_id,
            image_url: self.image_url,
            name: name.to_string(),
            country: self.country,
            city: self.city,
            state: self.state,
        }
    }
}

impl From<UntappdBreweryResult> for BreweryInfo {
    fn from(brewery: UntappdBreweryResult) -> Self {
        BreweryInfo {
            brewery_id: brewery.brewery_id,
            image_url: brewery.image_url,
            country: brewery.country,
            city: brewery.city,
            state: brewery.state,
        }
    }
}

fn parse_card(item: &ElementRef, beer_id: Option<BeerId>) -> Result<BeerCard> {
    let beer_id = match beer_id {
        Some(beer_id) => beer_id,
        None => {
            let href = get_attr(item, "a.label", "href")?;
            let id = href.rsplit('/').next().unwrap_or_default();
            id.parse()
                .with_context(|| format!("Invalid beer link {href}"))?
        }
    };
    let abv = get_text(item, "p.abv")?;
    let ibu = get_text(item, "p.ibu")?;
    Ok(BeerCard {
        beer_id,
        image_url: get_attr(item, "a.label img", "src")?.to_string(),
        name: get_text(item, "p.name")?,
        brewery_name: get_text(item, "p.brewery")?,
        brewery_url: get_attr(item, "p.brewery a", "href")?.to_string(),
        style: get_text(item, "p.style")?,
        abv: parse_stat(abv.split('%').next().unwrap_or_default())?,
        ibu: parse_stat(ibu.split(' ').next().unwrap_or_default())?,
        rating: parse_stat(get_attr(item, "div.caps", "data-rating")?)?,
    })
}

/// Result cards of a search page; cards missing a field are skipped.
pub fn parse_search_page(html: &str) -> Result<Vec<BeerCard>> {
    let document = Html::parse_document(html);
    let selector = create_selector("div.beer-item")?;
    Ok(document
        .select(&selector)
        .filter_map(|item| match parse_card(&item, None) {
            Ok(card) => Some(card),
            Err(e) => {
                debug!("Skipping Untappd result: {e}");
                None
            }
        })
        .collect())
}

pub fn parse_beer_page(html: &str, beer_id: BeerId) -> Result<BeerCard> {
    let document = Html::parse_document(html);
    let content = get_element(&document.root_element(), "div.content")
        .with_context(|| format!("Beer {beer_id} not found on Untappd"))?;
    parse_card(&content, Some(beer_id))
}

/// Country names of the top rated filter, longest first so that suffix
/// matching prefers "Democratic Republic of the Congo" over "Congo".
pub fn parse_countries(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let picker = get_element(&document.root_element(), "select#sort_picker")?;
    let option = create_selector("option")?;
    let mut countries: Vec<String> = picker
        .select(&option)
        .map(|option| option.text().collect::<String>().trim().to_string())
        .filter(|country| !country.is_empty() && country != ALL_COUNTRIES)
        .collect();
    if countries.is_empty() {
        return Err(anyhow!("No countries in selector"));
    }
    countries.sort_by_key(|country| std::cmp::Reverse(country.chars().count()));
    Ok(countries)
}

/// `City, State, Country` into its parts; the country must be a known one.
pub fn split_location(
    location: &str,
    countries: &[String],
) -> Option<(String, Option<String>, Option<String>)> {
    let country = countries
        .iter()
        .find(|country| location.ends_with(country.as_str()))?;
    let rest = location[..location.len() - country.len()]
        .trim()
        .trim_end_matches(',')
        .trim();
    let (city, state) = match rest.split_once(',') {
        Some((city, state)) => {
            let state = state
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            (Some(city.trim().to_string()), Some(state).filter(|s| !s.is_empty()))
        }
        None if rest.is_empty() => (None, None),
        None => (Some(rest.to_string()), None),
    };
    Some((country.clone(), city, state))
}

pub fn parse_brewery_page(html: &str, countries: &[String]) -> Result<BreweryInfo> {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let image_url = get_attr(&root, r#"meta[property="og:image"]"#, "content")?;
    let brewery_id = BREWERY_ID_IN_IMAGE
        .captures(image_url)
        .and_then(|captures| captures[1].parse().ok())
        .ok_or_else(|| anyhow!("No brewery id in {image_url}"))?;

    let name = get_element(&root, "h1")?;
    let container = name
        .parent()
        .and_then(ElementRef::wrap)
        .ok_or_else(|| anyhow!("Brewery name has no container"))?;
    let paragraph = create_selector("p")?;
    let location = container
        .select(&paragraph)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty() && !text.starts_with("Subsidiary") && !text.contains("Brewery"))
        .ok_or_else(|| anyhow!("No brewery location"))?;
    let (country, city, state) = split_location(&location, countries)
        .ok_or_else(|| anyhow!("Unknown country in location {location}"))?;

    Ok(BreweryInfo {
        brewery_id,
        image_url: image_url.to_string(),
        country,
        city,
        state,
    })
}

fn to_result(card: BeerCard, brewery: &BreweryInfo) -> UntappdBeerResult {
    UntappdBeerResult {
        beer_id: card.beer_id,
        image_url: card.image_url,
        name: card.name,
        brewery: card.brewery_name,
        brewery_id: brewery.brewery_id,
        brewery_country: brewery.country.clone(),
        brewery_city: brewery.city.clone(),
        brewery_state: brewery.state.clone(),
        style: card.style,
        abv: card.abv,
        ibu: card.ibu,
        rating: card.rating,
        weighted_rating: None,
        rating_count: None,
        total_user_count: None,
        description: None,
        tags: None,
    }
}

pub struct UntappdWeb {
    http: Client,
    spacing: Limiter,
    hourly: Limiter,
    countries: Option<Vec<String>>,
}

impl std::fmt::Display for UntappdWeb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UntappdWeb()")
    }
}

impl UntappdWeb {
    pub fn new(http: Client) -> Self {
        UntappdWeb {
            http,
            spacing: rate_limit::every(REQ_COOLDOWN),
            hourly: rate_limit::per_hour(MAX_REQ_PER_HOUR),
            countries: None,
        }
    }

    async fn fetch(&self, url: &str, query: &[(&str, &str)]) -> Result<String, UntappdError> {
        self.hourly.until_ready().await;
        self.spacing.until_ready().await;
        let request = self
            .http
            .get(url)
            .query(query)
            .header(header::REFERER, REFERER)
            .header(header::USER_AGENT, USER_AGENT);
        let resp = send_to_text_with_retries(request, FETCH_ATTEMPTS)
            .await
            .map_err(|e| UntappdError::rate_limited(self, format!("{e:#}")))?;
        if resp.status.as_u16() >= 300 {
            return Err(UntappdError::rate_limited(self, format!("HTTP {} for {url}", resp.status)));
        }
        Ok(resp.text)
    }

    async fn countries(&mut self) -> Result<Vec<String>, UntappdError> {
        if let Some(countries) = &self.countries {
            return Ok(countries.clone());
        }
        info!("Fetching Untappd country list");
        let page = self.fetch(&format!("{BASE_URL}/beer/top_rated"), &[]).await?;
        let countries =
            parse_countries(&page).map_err(|e| UntappdError::rate_limited(&*self, e))?;
        info!(count = countries.len(), "Loaded Untappd countries");
        self.countries = Some(countries.clone());
        Ok(countries)
    }

    /// Stored breweries are reused by name; a fetched brewery page is saved
    /// for later runs.
    async fn brewery_info(
        &mut self,
        db: &BeerDb,
        brewery_name: &str,
        brewery_url: &str,
    ) -> Result<BreweryInfo, UntappdError> {
        if let Some(brewery) = db.get_brewery_by_name(brewery_name)? {
            debug!(brewery_name, "Brewery already stored");
            return Ok(brewery.into());
        }
        let countries = self.countries().await?;
        let page = self.fetch(&format!("{BASE_URL}{brewery_url}"), &[]).await?;
        let info = parse_brewery_page(&page, &countries).map_err(|e| {
            warn!(brewery_url, "Cannot read brewery page: {e}");
            UntappdError::rate_limited(&*self, e)
        })?;
        db.insert_brewery(&info.clone().into_brewery(brewery_name))?;
        Ok(info)
    }

    /// The closest card is picked before its brewery is looked up.
    #[instrument(skip(self, db))]
    pub async fn search_beer(
        &mut self,
        db: &BeerDb,
        query: &str,
    ) -> Result<Option<BeerSearchHit>, UntappdError> {
        if query.is_empty() {
            return Ok(None);
        }
        let page = self.fetch(&format!("{BASE_URL}/search"), &[("q", query)]).await?;
        let mut cards =
            parse_search_page(&page).map_err(|e| UntappdError::rate_limited(&*self, e))?;
        if cards.is_empty() {
            return Ok(None);
        }
        let best = best_match(
            query,
            cards
                .iter()
                .map(|card| format!("{} {}", card.brewery_name, card.name)),
        );
        let card = cards.swap_remove(best);
        let brewery = self
            .brewery_info(db, &card.brewery_name, &card.brewery_url)
            .await?;
        Ok(Some(to_result(card, &brewery).into()))
    }

    pub async fn beer_info(&mut self, db: &BeerDb, beer_id: BeerId) -> Result<UntappdBeerResult, UntappdError> {
        let page = self.fetch(&format!("{BASE_URL}/beer/{beer_id}"), &[]).await?;
        let card =
            parse_beer_page(&page, beer_id).map_err(|e| UntappdError::rate_limited(&*self, e))?;
        let brewery = self
            .brewery_info(db, &card.brewery_name, &card.brewery_url)
            .await?;
        Ok(to_result(card, &brewery))
    }
}
