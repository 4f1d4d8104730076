//! Brings Untappd data the pipeline does not fetch on its own into the store:
//! what users already drank, and brewery details.

use anyhow::{Context, Result};
use metrics::increment_counter;
use tracing::{debug, info, instrument, warn};

use crate::db::BeerDb;
use crate::models::UserId;
use crate::untappd::api::HadBeer;
use crate::untappd::{UntappdBackend, UntappdClient};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HadSummary {
    pub new_beers: usize,
    pub new_ratings: usize,
}

impl std::fmt::Display for HadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fetched {} new rating(s) and added {} new beer(s)",
            self.new_ratings, self.new_beers
        )
    }
}

/// Saves a user's rated check-ins. Beers already stored keep their richer
/// record; unrated check-ins are skipped.
#[instrument(skip(db, had))]
pub fn store_had_beers(
    db: &BeerDb,
    user_id: UserId,
    had: impl IntoIterator<Item = HadBeer>,
) -> Result<HadSummary> {
    let mut summary = HadSummary::default();
    for HadBeer {
        beer,
        rating,
        checked_in_at,
    } in had
    {
        let Some(rating) = rating else {
            debug!(beer_id = beer.beer_id, "Not rated");
            continue;
        };
        let known = db
            .get_beer(beer.beer_id)
            .with_context(|| format!("Cannot read beer {}", beer.beer_id))?
            .is_some();
        if !known {
            db.insert_beer(&beer)
                .with_context(|| format!("Cannot store beer {}", beer.beer_id))?;
            summary.new_beers += 1;
        }
        db.insert_rating(beer.beer_id, user_id, rating, checked_in_at)
            .with_context(|| format!("Cannot store rating of beer {}", beer.beer_id))?;
        summary.new_ratings += 1;
        debug!("{beer}: {rating}");
    }
    Ok(summary)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrewerySummary {
    pub searched: usize,
    pub stored: usize,
    pub errors: usize,
}

impl std::fmt::Display for BrewerySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} breweries searched, {} stored, {} errors",
            self.searched, self.stored, self.errors
        )
    }
}

/// Searches Untappd for every brewery only known through beer results and
/// stores what comes back.
#[instrument(skip_all)]
pub async fn fetch_breweries<B: UntappdBackend>(
    db: &BeerDb,
    client: &mut UntappdClient<B>,
) -> Result<BrewerySummary> {
    let names = db
        .get_breweries_missing_details()
        .context("Cannot list breweries")?;
    info!("{} breweries to look up", names.len());
    let mut summary = BrewerySummary::default();
    for name in names {
        summary.searched += 1;
        let breweries = match client.search_breweries(&name).await {
            Ok(breweries) => breweries,
            Err(e) => {
                increment_counter!("brewery_fetch_error");
                warn!(brewery = %name, "{e}");
                summary.errors += 1;
                continue;
            }
        };
        for brewery in breweries {
            db.insert_brewery(&brewery)
                .with_context(|| format!("Cannot store brewery {}", brewery.name))?;
            debug!(brewery = %brewery.name, id = brewery.brewery_id, "Stored brewery");
            summary.stored += 1;
        }
    }
    info!("{summary}");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::db::tests::beer_result;
    use crate::untappd::client::tests::MockBackend;
    use crate::untappd::UntappdBreweryResult;

    fn had(beer_id: i64, name: &str, rating: Option<f64>) -> HadBeer {
        HadBeer {
            beer: beer_result(beer_id, name, 3.8),
            rating,
            checked_in_at: Utc::now() - Duration::days(beer_id),
        }
    }

    #[test]
    fn stores_rated_check_ins() {
        let db = BeerDb::open_in_memory().unwrap();
        db.insert_beer(&beer_result(1, "Stored", 4.1)).unwrap();
        let check_ins = vec![had(1, "Thin", Some(4.0)), had(2, "New", Some(3.5)), had(3, "Unrated", None)];
        let latest = check_ins[0].checked_in_at;
        let summary = store_had_beers(&db, 7, check_ins).unwrap();
        assert_eq!(
            summary,
            HadSummary {
                new_beers: 1,
                new_ratings: 2
            }
        );
        assert_eq!(db.get_beer(1).unwrap().unwrap().name, "Stored");
        assert_eq!(db.get_beer(2).unwrap().unwrap().name, "New");
        assert!(db.get_beer(3).unwrap().is_none());
        assert_eq!(db.get_latest_rating_time(7).unwrap(), Some(latest));
    }

    #[tokio::test(start_paused = true)]
    async fn fills_breweries_known_only_through_beers() {
        let db = BeerDb::open_in_memory().unwrap();
        db.insert_beer(&beer_result(1, "Beer Geek Breakfast", 3.9)).unwrap();
        let mikkeller = UntappdBreweryResult {
            brewery_id: 1,
            image_url: "https://untappd.example/brewery-1_x.jpeg".to_string(),
            name: "Mikkeller".to_string(),
            country: "Denmark".to_string(),
            city: Some("København".to_string()),
            state: None,
        };
        let api = MockBackend::named("api").with_breweries(vec![mikkeller.clone()]);
        let mut client = UntappdClient::new(vec![api]).unwrap();
        let summary = fetch_breweries(&db, &mut client).await.unwrap();
        assert_eq!(
            summary,
            BrewerySummary {
                searched: 1,
                stored: 1,
                errors: 0
            }
        );
        assert_eq!(db.get_brewery_by_name("Mikkeller").unwrap(), Some(mikkeller));
        assert!(db.get_breweries_missing_details().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn brewery_search_failures_are_counted() {
        let db = BeerDb::open_in_memory().unwrap();
        db.insert_beer(&beer_result(1, "Beer Geek Breakfast", 3.9)).unwrap();
        let mut client = UntappdClient::new(vec![MockBackend::named("down").failing()])
            .unwrap()
            .with_max_cycles(1);
        let summary = fetch_breweries(&db, &mut client).await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(db.get_breweries_missing_details().unwrap(), vec!["Mikkeller"]);
    }
}
