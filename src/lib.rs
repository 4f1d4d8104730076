pub mod db;
pub mod log_utils;
pub mod models;
pub mod parsing;
pub mod profiles;
pub mod queries;
pub mod reqwest_utils;
pub mod scrape;
pub mod settings;
pub mod sync;
pub mod translation;
pub mod untappd;
