use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::models::{BeerId, BreweryId};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FlavorTag {
    pub tag_id: i64,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UntappdBeerResult {
    pub beer_id: BeerId,
    pub image_url: String,
    pub name: String,
    pub brewery: String,
    pub brewery_id: BreweryId,
    pub brewery_country: String,
    pub brewery_city: Option<String>,
    pub brewery_state: Option<String>,
    pub style: String,
    pub abv: f64,
    pub ibu: f64,
    pub rating: f64,
    pub weighted_rating: Option<f64>,
    pub rating_count: Option<i64>,
    pub total_user_count: Option<i64>,
    pub description: Option<String>,
    pub tags: Option<BTreeSet<FlavorTag>>,
}

impl std::fmt::Display for UntappdBeerResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {} ({}, {}%, {:.2})",
            self.brewery, self.name, self.style, self.abv, self.rating
        )
    }
}

/// The beer a search settled on. Backends whose search already yields the
/// whole record hand it over in `details`.
#[derive(Debug, Clone, PartialEq)]
pub struct BeerSearchHit {
    pub beer_id: BeerId,
    pub details: Option<UntappdBeerResult>,
}

impl BeerSearchHit {
    pub fn id_only(beer_id: BeerId) -> Self {
        BeerSearchHit {
            beer_id,
            details: None,
        }
    }
}

impl From<UntappdBeerResult> for BeerSearchHit {
    fn from(beer: UntappdBeerResult) -> Self {
        BeerSearchHit {
            beer_id: beer.beer_id,
            details: Some(beer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UntappdBreweryResult {
    pub brewery_id: BreweryId,
    pub image_url: String,
    pub name: String,
    pub country: String,
    pub city: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Error)]
pub enum UntappdError {
    /// The backend refused, failed or timed out; the caller should rotate.
    #[error("{backend} is rate limited: {reason}")]
    RateLimited { backend: String, reason: String },

    #[error("no Untappd backend configured")]
    NoBackends,

    #[error("every Untappd backend failed during {cycles} full rotations")]
    Exhausted { cycles: usize },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl UntappdError {
    pub fn rate_limited(backend: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        UntappdError::RateLimited {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, UntappdError::RateLimited { .. })
    }
}
