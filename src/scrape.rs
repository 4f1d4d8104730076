use std::collections::HashSet;

use anyhow::{Context, Result};
use metrics::increment_counter;
use tracing::{debug, error, info, instrument, warn};

use crate::db::BeerDb;
use crate::models::{BeerId, ShopBeer, ShopId, ShopInfo};
use crate::parsing::{
    clean_beer_name, extract_brewery_beer, extract_brewery_from_description, is_beer_set,
    keep_until_japanese, parse_volume_ml,
};
use crate::translation::{MemoTranslator, Translate};
use crate::untappd::{UntappdBackend, UntappdClient};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub found: usize,
    pub not_found: usize,
    pub errors: usize,
}

impl std::fmt::Display for ScrapeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} found, {} not found, {} errors",
            self.found, self.not_found, self.errors
        )
    }
}

/// Fills what a shop export left out from the listing title and description.
/// Sets and listings without a volume or a price cannot be ranked and are dropped.
pub fn prepare_listing(mut beer: ShopBeer) -> Option<ShopBeer> {
    if is_beer_set(&beer.raw_name) {
        debug!("Skipping set {}", beer.raw_name);
        return None;
    }
    if beer.milliliters == 0 {
        beer.milliliters = parse_volume_ml(&beer.raw_name)
            .or_else(|| beer.description.as_deref().and_then(parse_volume_ml))?;
    }
    if beer.price == 0 {
        return None;
    }
    if beer.brewery_name.is_none() && beer.beer_name.is_none() {
        let (brewery_name, beer_name) = split_title(&beer.raw_name, beer.description.as_deref());
        beer.brewery_name = brewery_name;
        beer.beer_name = beer_name;
    }
    Some(beer)
}

fn split_title(raw_name: &str, description: Option<&str>) -> (Option<String>, Option<String>) {
    if let Some(brewery) = description.and_then(extract_brewery_from_description) {
        // The description brewery is lowercased; the title keeps its own casing.
        let mut beer_name = raw_name.trim();
        if raw_name.to_lowercase().starts_with(&brewery) {
            if let Some(rest) = raw_name.get(brewery.len()..).map(str::trim) {
                if !rest.is_empty() {
                    beer_name = rest;
                }
            }
        }
        return (Some(brewery), Some(beer_name.to_string()));
    }
    let clean = clean_beer_name(raw_name);
    // Titles such as "Brewery - Beer ブルワリー ビール" split on their Latin part.
    match extract_brewery_beer(keep_until_japanese(&clean).trim()) {
        (Some(brewery), Some(beer)) => (Some(brewery), Some(beer)),
        _ => extract_brewery_beer(&clean),
    }
}

async fn store_listing<B: UntappdBackend>(
    db: &BeerDb,
    client: &mut UntappdClient<B>,
    translator: &impl Translate,
    shop_id: ShopId,
    offering: &ShopBeer,
    found_ids: &mut HashSet<BeerId>,
) -> Result<bool> {
    let Some((beer, query)) = client.try_find_beer(db, offering, translator).await? else {
        info!("{}: Not found on Untappd", offering.raw_name);
        return Ok(false);
    };
    info!(
        "[Shop] '{}' -> [Query] '{query}' -> [Untappd] '{} - {}'",
        offering.raw_name, beer.brewery, beer.name
    );
    db.insert_beer(&beer)
        .with_context(|| format!("Cannot store beer {}", beer.beer_id))?;
    db.insert_offering(shop_id, beer.beer_id, offering)
        .with_context(|| format!("Cannot store offering {}", offering.url))?;
    found_ids.insert(beer.beer_id);
    info!(
        "- {} - {}: {}¥ ({}mL)",
        beer.brewery, beer.name, offering.price, offering.milliliters
    );
    Ok(true)
}

/// Matches a shop's listings on Untappd and replaces the shop's offerings with them.
#[instrument(skip_all, fields(shop = %shop.name))]
pub async fn scrape_shop<B: UntappdBackend>(
    db: &BeerDb,
    client: &mut UntappdClient<B>,
    translator: &impl Translate,
    shop: &ShopInfo,
    beers: impl IntoIterator<Item = ShopBeer>,
) -> Result<ScrapeSummary> {
    let shop_id = db
        .insert_shop(shop)
        .with_context(|| format!("Cannot store shop {}", shop.name))?;
    let translator = MemoTranslator::new(translator);
    let mut found_ids = HashSet::new();
    let mut summary = ScrapeSummary::default();

    for offering in beers {
        match store_listing(db, client, &translator, shop_id, &offering, &mut found_ids).await {
            Ok(true) => {
                increment_counter!("scrape_found", "shop" => shop.name.clone());
                summary.found += 1;
            }
            Ok(false) => {
                increment_counter!("scrape_not_found", "shop" => shop.name.clone());
                summary.not_found += 1;
            }
            Err(e) => {
                increment_counter!("scrape_error", "shop" => shop.name.clone());
                error!("{}: {e:#}", offering.raw_name);
                summary.errors += 1;
            }
        }
    }

    // A failed listing may still be on sale, so nothing is removed after errors.
    if summary.errors > 0 {
        warn!(
            errors = summary.errors,
            "Some listings failed, keeping the shop's previous offerings"
        );
    } else {
        db.remove_expired_offerings(shop_id, &found_ids)
            .context("Cannot remove expired offerings")?;
    }
    info!("{summary}");
    Ok(summary)
}
