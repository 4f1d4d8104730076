pub mod api;
pub mod backend;
pub mod cache;
pub mod client;
pub mod rank;
pub mod rate_limit;
pub mod structs;
pub mod web;

pub use backend::{init_backends, Backend, UntappdBackend};
pub use cache::{CacheStats, CacheStatus, UntappdCache};
pub use client::UntappdClient;
pub use structs::{BeerSearchHit, FlavorTag, UntappdBeerResult, UntappdBreweryResult, UntappdError};
