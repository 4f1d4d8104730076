//! Persistent memo of Untappd search outcomes, keyed by normalized query.
//!
//! A "not found" outcome is cached too (as a NULL beer id), so a listing that
//! Untappd does not know is not searched again until its entry expires.

use chrono::{DateTime, Duration, Utc};
use metrics::increment_counter;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::db::BeerDb;
use crate::models::BeerId;

pub const DEFAULT_CACHE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Expired,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub expired: usize,
    pub valid: usize,
    pub found: usize,
    pub not_found: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} entries ({} valid, {} expired), {} found, {} not found",
            self.total, self.valid, self.expired, self.found, self.not_found
        )
    }
}

pub struct UntappdCache<'a> {
    db: &'a BeerDb,
    duration: Duration,
}

impl<'a> UntappdCache<'a> {
    pub fn new(db: &'a BeerDb, duration: Duration) -> Self {
        UntappdCache { db, duration }
    }

    pub fn with_default_duration(db: &'a BeerDb) -> Self {
        Self::new(db, Duration::days(DEFAULT_CACHE_DAYS))
    }

    pub fn get(&self, query: &str) -> rusqlite::Result<(Option<BeerId>, CacheStatus)> {
        self.get_at(query, Utc::now())
    }

    /// The beer id is only returned on a hit; `(None, Hit)` is a cached miss on Untappd.
    pub fn get_at(
        &self,
        query: &str,
        now: DateTime<Utc>,
    ) -> rusqlite::Result<(Option<BeerId>, CacheStatus)> {
        let entry: Option<(Option<BeerId>, DateTime<Utc>)> = self
            .db
            .connection()
            .query_row(
                "SELECT beer_id, expires_at FROM untappd_cache WHERE query = ?1",
                params![query],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let result = match entry {
            None => {
                increment_counter!("untappd_cache_miss");
                (None, CacheStatus::Miss)
            }
            Some((_, expires_at)) if expires_at <= now => {
                increment_counter!("untappd_cache_expired");
                (None, CacheStatus::Expired)
            }
            Some((beer_id, _)) => {
                increment_counter!("untappd_cache_hit");
                (beer_id, CacheStatus::Hit)
            }
        };
        debug!(query, status = ?result.1, "Untappd cache lookup");
        Ok(result)
    }

    pub fn set(&self, query: &str, beer_id: Option<BeerId>) -> rusqlite::Result<()> {
        self.set_at(query, beer_id, Utc::now())
    }

    pub fn set_at(
        &self,
        query: &str,
        beer_id: Option<BeerId>,
        now: DateTime<Utc>,
    ) -> rusqlite::Result<()> {
        self.db.connection().execute(
            "INSERT INTO untappd_cache (query, beer_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(query) DO UPDATE SET
                beer_id = excluded.beer_id,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at",
            params![query, beer_id, now, now + self.duration],
        )?;
        Ok(())
    }

    pub fn cleanup_expired(&self) -> rusqlite::Result<usize> {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> rusqlite::Result<usize> {
        self.db.connection().execute(
            "DELETE FROM untappd_cache WHERE expires_at <= ?1",
            params![now],
        )
    }

    pub fn stats(&self) -> rusqlite::Result<CacheStats> {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> rusqlite::Result<CacheStats> {
        let (total, expired, found): (i64, i64, i64) = self.db.connection().query_row(
            "SELECT COUNT(*),
                COALESCE(SUM(expires_at <= ?1), 0),
                COUNT(beer_id)
             FROM untappd_cache",
            params![now],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let (total, expired, found) = (total as usize, expired as usize, found as usize);
        Ok(CacheStats {
            total,
            expired,
            valid: total - expired,
            found,
            not_found: total - found,
        })
    }
}
