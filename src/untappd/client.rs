//! Resolution of shop listings to Untappd beers across a ring of backends.
//!
//! Backends are tried in order and the client moves to the next one whenever
//! the current one reports a rate limit. Going around the whole ring faster
//! than [`MIN_SECS_BETWEEN_RESTARTS`] makes the client wait for the rest of
//! that time, and an hour after the last restart it goes back to the head of
//! the ring since Untappd limits reset hourly.

use std::time::Duration;

use chrono::Utc;
use metrics::increment_counter;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::backend::{Backend, UntappdBackend};
use super::cache::{CacheStatus, UntappdCache};
use super::structs::{BeerSearchHit, UntappdBeerResult, UntappdBreweryResult, UntappdError};
use crate::db::BeerDb;
use crate::models::{BeerId, ShopBeer};
use crate::queries::untappd_queries;
use crate::translation::Translate;

pub const MIN_SECS_BETWEEN_RESTARTS: u64 = 300;
pub const RATE_LIMIT_RESET: Duration = Duration::from_secs(3600);
pub const BEER_CACHE_DAYS: i64 = 30;
pub const DEFAULT_MAX_CYCLES: usize = 3;

pub struct UntappdClient<B = Backend> {
    backends: Vec<B>,
    backend_idx: usize,
    last_time_at_first: Instant,
    max_cycles: usize,
    cache_duration: chrono::Duration,
}

impl<B: UntappdBackend> UntappdClient<B> {
    pub fn new(backends: Vec<B>) -> Result<Self, UntappdError> {
        if backends.is_empty() {
            return Err(UntappdError::NoBackends);
        }
        Ok(UntappdClient {
            backends,
            backend_idx: 0,
            last_time_at_first: Instant::now(),
            max_cycles: DEFAULT_MAX_CYCLES,
            cache_duration: chrono::Duration::days(BEER_CACHE_DAYS),
        })
    }

    /// Full rotations through the ring before a call gives up.
    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles.max(1);
        self
    }

    pub fn with_cache_duration(mut self, cache_duration: chrono::Duration) -> Self {
        self.cache_duration = cache_duration;
        self
    }

    pub fn backends(&self) -> &[B] {
        &self.backends
    }

    pub fn backend_idx(&self) -> usize {
        self.backend_idx
    }

    pub fn current_backend(&self) -> &B {
        &self.backends[self.backend_idx]
    }

    pub async fn next_backend(&mut self) {
        self.backend_idx = (self.backend_idx + 1) % self.backends.len();
        increment_counter!("untappd_backend_switch");
        debug!(backend = %self.current_backend(), "Switching Untappd backend");
        if self.backend_idx == 0 {
            let min_gap = Duration::from_secs(MIN_SECS_BETWEEN_RESTARTS);
            let elapsed = self.last_time_at_first.elapsed();
            if elapsed < min_gap {
                warn!("Went through all backends too fast, waiting a bit...");
                tokio::time::sleep(min_gap - elapsed).await;
            }
            self.last_time_at_first = Instant::now();
        }
    }

    fn reset_if_stale(&mut self) {
        if self.last_time_at_first.elapsed() > RATE_LIMIT_RESET {
            debug!("Untappd rate limits have reset, back to the first backend");
            self.backend_idx = 0;
            self.last_time_at_first = Instant::now();
        }
    }

    // Moves on after a rate limit; other errors and running out of cycles end the call.
    async fn rotate_after(&mut self, error: UntappdError, switches: &mut usize) -> Result<(), UntappdError> {
        if !error.is_rate_limit() {
            return Err(error);
        }
        increment_counter!("untappd_rate_limited");
        warn!(backend = %self.current_backend(), "{error}");
        *switches += 1;
        if *switches >= self.max_cycles * self.backends.len() {
            return Err(UntappdError::Exhausted {
                cycles: self.max_cycles,
            });
        }
        self.next_backend().await;
        Ok(())
    }

    async fn query_beer(&mut self, db: &BeerDb, query: &str) -> Result<Option<BeerSearchHit>, UntappdError> {
        self.reset_if_stale();
        let mut switches = 0;
        loop {
            let result = self.backends[self.backend_idx].search_beer(db, query).await;
            match result {
                Ok(beer) => return Ok(beer),
                Err(e) => self.rotate_after(e, &mut switches).await?,
            }
        }
    }

    async fn query_beer_info(&mut self, db: &BeerDb, beer_id: BeerId) -> Result<UntappdBeerResult, UntappdError> {
        let mut switches = 0;
        loop {
            let result = self.backends[self.backend_idx].beer_info(db, beer_id).await;
            match result {
                Ok(beer) => return Ok(beer),
                Err(e) => self.rotate_after(e, &mut switches).await?,
            }
        }
    }

    /// Stored record when updated less than a month ago, otherwise fresh from Untappd.
    pub async fn get_beer_from_id(
        &mut self,
        db: &BeerDb,
        beer_id: BeerId,
    ) -> Result<UntappdBeerResult, UntappdError> {
        match fresh_stored_beer(db, beer_id)? {
            Some(beer) => Ok(beer),
            None => self.query_beer_info(db, beer_id).await,
        }
    }

    // A fresh stored record wins over whatever the search brought back.
    async fn resolve_hit(&mut self, db: &BeerDb, hit: BeerSearchHit) -> Result<UntappdBeerResult, UntappdError> {
        if let Some(beer) = fresh_stored_beer(db, hit.beer_id)? {
            return Ok(beer);
        }
        match hit.details {
            Some(beer) => Ok(beer),
            None => self.query_beer_info(db, hit.beer_id).await,
        }
    }

    /// The matching beer and the query that found it.
    #[instrument(skip_all, fields(beer = %beer.raw_name))]
    pub async fn try_find_beer(
        &mut self,
        db: &BeerDb,
        beer: &ShopBeer,
        translator: &impl Translate,
    ) -> Result<Option<(UntappdBeerResult, String)>, UntappdError> {
        self.reset_if_stale();
        let cache = UntappdCache::new(db, self.cache_duration);
        for query in untappd_queries(beer, translator) {
            match cache.get(&query)? {
                (Some(beer_id), CacheStatus::Hit) => {
                    let found = self.get_beer_from_id(db, beer_id).await?;
                    return Ok(Some((found, query)));
                }
                (None, CacheStatus::Hit) => continue,
                (_, CacheStatus::Miss | CacheStatus::Expired) => {
                    let hit = self.query_beer(db, &query).await?;
                    cache.set(&query, hit.as_ref().map(|hit| hit.beer_id))?;
                    if let Some(hit) = hit {
                        let found = self.resolve_hit(db, hit).await?;
                        info!(query = %query, "Found {found}");
                        return Ok(Some((found, query)));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Empty when no backend can search breweries.
    pub async fn search_breweries(
        &mut self,
        query: &str,
    ) -> Result<Vec<UntappdBreweryResult>, UntappdError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.reset_if_stale();
        let mut switches = 0;
        let mut unsupported = 0;
        loop {
            let result = self.backends[self.backend_idx]
                .search_breweries(query)
                .await;
            match result {
                Ok(Some(breweries)) => return Ok(breweries),
                Ok(None) => {
                    unsupported += 1;
                    if unsupported >= self.backends.len() {
                        return Ok(Vec::new());
                    }
                    self.next_backend().await;
                }
                Err(e) => self.rotate_after(e, &mut switches).await?,
            }
        }
    }
}

fn fresh_stored_beer(db: &BeerDb, beer_id: BeerId) -> Result<Option<UntappdBeerResult>, UntappdError> {
    match db.get_beer(beer_id)? {
        Some(beer) if Utc::now() - beer.updated_at < chrono::Duration::days(BEER_CACHE_DAYS) => {
            Ok(Some(beer.to_result()))
        }
        Some(_) => {
            debug!(beer_id, "Stored beer is stale, updating");
            Ok(None)
        }
        None => Ok(None),
    }
}
