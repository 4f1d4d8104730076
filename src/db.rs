use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info, instrument};

use crate::models::{BeerId, BreweryId, ShopBeer, ShopId, ShopInfo, UserId};
use crate::untappd::{FlavorTag, UntappdBeerResult, UntappdBreweryResult};

/// Users with this last name hold tokens of the app itself, not of real people.
pub const APP_USER_MARKER: &str = "APP";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS breweries (
        brewery_id INTEGER NOT NULL PRIMARY KEY,
        image_url TEXT NOT NULL,
        name TEXT NOT NULL,
        country TEXT NOT NULL,
        city TEXT,
        state TEXT);
    CREATE INDEX IF NOT EXISTS breweries_name ON breweries(name);
    CREATE TABLE IF NOT EXISTS beers (
        beer_id INTEGER NOT NULL PRIMARY KEY,
        image_url TEXT NOT NULL,
        name TEXT NOT NULL,
        brewery_id INTEGER NOT NULL,
        style TEXT NOT NULL,
        abv REAL,
        ibu REAL,
        rating REAL,
        weighted_rating REAL,
        rating_count INTEGER,
        total_user_count INTEGER,
        description TEXT,
        updated_at TEXT NOT NULL);
    CREATE TABLE IF NOT EXISTS flavor_tags (
        tag_id INTEGER NOT NULL PRIMARY KEY,
        name TEXT NOT NULL);
    CREATE TABLE IF NOT EXISTS beer_tags (
        beer_id INTEGER NOT NULL,
        tag_id INTEGER NOT NULL,
        count INTEGER NOT NULL,
        PRIMARY KEY(beer_id, tag_id));
    CREATE TABLE IF NOT EXISTS shops (
        shop_id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        url TEXT NOT NULL,
        image_url TEXT NOT NULL,
        shipping_fee INTEGER NOT NULL,
        free_shipping_over INTEGER);
    CREATE TABLE IF NOT EXISTS offerings (
        shop_id INTEGER NOT NULL,
        beer_id INTEGER NOT NULL,
        url TEXT NOT NULL,
        milliliters INTEGER NOT NULL,
        price INTEGER NOT NULL,
        image_url TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY(shop_id, beer_id));
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER NOT NULL PRIMARY KEY,
        user_name TEXT NOT NULL,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        avatar_url TEXT NOT NULL,
        access_token TEXT NOT NULL);
    CREATE TABLE IF NOT EXISTS user_ratings (
        user_id INTEGER NOT NULL,
        beer_id INTEGER NOT NULL,
        rating REAL NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY(user_id, beer_id));
    CREATE TABLE IF NOT EXISTS untappd_cache (
        query TEXT NOT NULL PRIMARY KEY,
        beer_id INTEGER,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL);
    CREATE INDEX IF NOT EXISTS untappd_cache_expires_at ON untappd_cache(expires_at);
";

// SQLite turns NaN into NULL; keep that explicit both ways.
fn nan_to_null(value: f64) -> Option<f64> {
    (!value.is_nan()).then_some(value)
}

fn null_to_nan(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

/// A beer row joined with its brewery.
#[derive(Debug, Clone)]
pub struct Beer {
    pub beer_id: BeerId,
    pub image_url: String,
    pub name: String,
    pub brewery_id: BreweryId,
    pub brewery_name: String,
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
    pub updated_at: DateTime<Utc>,
    pub tags: BTreeSet<FlavorTag>,
}

impl Beer {
    pub fn to_result(&self) -> UntappdBeerResult {
        UntappdBeerResult {
            beer_id: self.beer_id,
            image_url: self.image_url.clone(),
            name: self.name.clone(),
            brewery: self.brewery_name.clone(),
            brewery_id: self.brewery_id,
            brewery_country: self.brewery_country.clone(),
            brewery_city: self.brewery_city.clone(),
            brewery_state: self.brewery_state.clone(),
            style: self.style.clone(),
            abv: self.abv,
            ibu: self.ibu,
            rating: self.rating,
            weighted_rating: self.weighted_rating,
            rating_count: self.rating_count,
            total_user_count: self.total_user_count,
            description: self.description.clone(),
            tags: Some(self.tags.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: String,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct CospaFilter {
    pub limit: usize,
    pub offset: usize,
    pub value_factor: f64,
    pub search: Option<String>,
    pub shop_id: Option<ShopId>,
    pub styles: Option<Vec<String>>,
    pub countries: Option<Vec<String>>,
    pub min_price: Option<u32>,
    pub max_price: Option<u32>,
    pub exclude_user_had: Option<UserId>,
}

impl Default for CospaFilter {
    fn default() -> Self {
        CospaFilter {
            limit: 20,
            offset: 0,
            value_factor: 8.0,
            search: None,
            shop_id: None,
            styles: None,
            countries: None,
            min_price: None,
            max_price: None,
            exclude_user_had: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankedOffering {
    pub beer_id: BeerId,
    pub beer_name: String,
    pub brewery_name: String,
    pub brewery_country: String,
    pub style: String,
    pub abv: f64,
    pub rating: f64,
    pub shop_id: ShopId,
    pub shop_name: String,
    pub url: String,
    pub price: u32,
    pub milliliters: u32,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub value: f64,
}

impl RankedOffering {
    pub fn price_per_ml(&self) -> f64 {
        self.price as f64 / self.milliliters as f64
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub struct BeerDb {
    connection: Connection,
}

impl BeerDb {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> rusqlite::Result<Self> {
        connection.execute_batch(SCHEMA)?;
        Ok(BeerDb { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn insert_brewery(&self, brewery: &UntappdBreweryResult) -> rusqlite::Result<()> {
        self.connection.execute(
            "INSERT INTO breweries (brewery_id, image_url, name, country, city, state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(brewery_id) DO UPDATE SET
                image_url = excluded.image_url,
                name = excluded.name,
                country = excluded.country,
                city = excluded.city,
                state = excluded.state",
            params![
                brewery.brewery_id,
                brewery.image_url,
                brewery.name,
                brewery.country,
                brewery.city,
                brewery.state
            ],
        )?;
        Ok(())
    }

    pub fn get_brewery_by_name(&self, name: &str) -> rusqlite::Result<Option<UntappdBreweryResult>> {
        self.connection
            .query_row(
                "SELECT brewery_id, image_url, name, country, city, state
                 FROM breweries WHERE name = ?1",
                params![name],
                |row| {
                    Ok(UntappdBreweryResult {
                        brewery_id: row.get(0)?,
                        image_url: row.get(1)?,
                        name: row.get(2)?,
                        country: row.get(3)?,
                        city: row.get(4)?,
                        state: row.get(5)?,
                    })
                },
            )
            .optional()
    }

    /// Upserts the beer (and the brewery fields it carries) with `updated_at = now`.
    #[instrument(skip_all, fields(beer_id = beer.beer_id))]
    pub fn insert_beer(&self, beer: &UntappdBeerResult) -> rusqlite::Result<()> {
        let transaction = self.connection.unchecked_transaction()?;
        // Beer results have no brewery label, keep the one we may already know.
        transaction.execute(
            "INSERT INTO breweries (brewery_id, image_url, name, country, city, state)
             VALUES (?1, '', ?2, ?3, ?4, ?5)
             ON CONFLICT(brewery_id) DO UPDATE SET
                name = excluded.name,
                country = excluded.country,
                city = COALESCE(excluded.city, city),
                state = COALESCE(excluded.state, state)",
            params![
                beer.brewery_id,
                beer.brewery,
                beer.brewery_country,
                beer.brewery_city,
                beer.brewery_state
            ],
        )?;
        transaction.execute(
            "INSERT INTO beers (beer_id, image_url, name, brewery_id, style, abv, ibu, rating,
                weighted_rating, rating_count, total_user_count, description, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(beer_id) DO UPDATE SET
                image_url = excluded.image_url,
                name = excluded.name,
                brewery_id = excluded.brewery_id,
                style = excluded.style,
                abv = excluded.abv,
                ibu = excluded.ibu,
                rating = excluded.rating,
                weighted_rating = excluded.weighted_rating,
                rating_count = excluded.rating_count,
                total_user_count = excluded.total_user_count,
                description = excluded.description,
                updated_at = excluded.updated_at",
            params![
                beer.beer_id,
                beer.image_url,
                beer.name,
                beer.brewery_id,
                beer.style,
                nan_to_null(beer.abv),
                nan_to_null(beer.ibu),
                nan_to_null(beer.rating),
                beer.weighted_rating,
                beer.rating_count,
                beer.total_user_count,
                beer.description,
                Utc::now()
            ],
        )?;
        if let Some(tags) = &beer.tags {
            transaction.execute("DELETE FROM beer_tags WHERE beer_id = ?1", params![beer.beer_id])?;
            for tag in tags {
                transaction.execute(
                    "INSERT INTO flavor_tags (tag_id, name) VALUES (?1, ?2)
                     ON CONFLICT(tag_id) DO UPDATE SET name = excluded.name",
                    params![tag.tag_id, tag.name],
                )?;
                transaction.execute(
                    "INSERT INTO beer_tags (beer_id, tag_id, count) VALUES (?1, ?2, ?3)",
                    params![beer.beer_id, tag.tag_id, tag.count],
                )?;
            }
        }
        transaction.commit()
    }

    pub fn get_beer(&self, beer_id: BeerId) -> rusqlite::Result<Option<Beer>> {
        let beer = self
            .connection
            .query_row(
                "SELECT b.beer_id, b.image_url, b.name, b.brewery_id,
                    COALESCE(br.name, ''), COALESCE(br.country, ''), br.city, br.state,
                    b.style, b.abv, b.ibu, b.rating, b.weighted_rating, b.rating_count,
                    b.total_user_count, b.description, b.updated_at
                 FROM beers b LEFT JOIN breweries br ON br.brewery_id = b.brewery_id
                 WHERE b.beer_id = ?1",
                params![beer_id],
                |row| {
                    Ok(Beer {
                        beer_id: row.get(0)?,
                        image_url: row.get(1)?,
                        name: row.get(2)?,
                        brewery_id: row.get(3)?,
                        brewery_name: row.get(4)?,
                        brewery_country: row.get(5)?,
                        brewery_city: row.get(6)?,
                        brewery_state: row.get(7)?,
                        style: row.get(8)?,
                        abv: null_to_nan(row.get(9)?),
                        ibu: null_to_nan(row.get(10)?),
                        rating: null_to_nan(row.get(11)?),
                        weighted_rating: row.get(12)?,
                        rating_count: row.get(13)?,
                        total_user_count: row.get(14)?,
                        description: row.get(15)?,
                        updated_at: row.get(16)?,
                        tags: BTreeSet::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut beer) = beer else {
            return Ok(None);
        };
        let mut statement = self.connection.prepare(
            "SELECT t.tag_id, t.name, bt.count FROM beer_tags bt
             JOIN flavor_tags t ON t.tag_id = bt.tag_id WHERE bt.beer_id = ?1",
        )?;
        beer.tags = statement
            .query_map(params![beer_id], |row| {
                Ok(FlavorTag {
                    tag_id: row.get(0)?,
                    name: row.get(1)?,
                    count: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(Some(beer))
    }

    pub fn insert_shop(&self, shop: &ShopInfo) -> rusqlite::Result<ShopId> {
        self.connection.query_row(
            "INSERT INTO shops (name, url, image_url, shipping_fee, free_shipping_over)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                url = excluded.url,
                image_url = excluded.image_url,
                shipping_fee = excluded.shipping_fee,
                free_shipping_over = excluded.free_shipping_over
             RETURNING shop_id",
            params![
                shop.name,
                shop.url,
                shop.image_url,
                shop.shipping_fee,
                shop.free_shipping_over
            ],
            |row| row.get(0),
        )
    }

    pub fn get_shops(&self) -> rusqlite::Result<Vec<(ShopId, String)>> {
        let mut statement = self
            .connection
            .prepare("SELECT shop_id, name FROM shops ORDER BY name")?;
        let shops = statement
            .query_map((), |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect();
        shops
    }

    /// Offerings are stored per unit: multi-packs are divided by their quantity.
    pub fn insert_offering(
        &self,
        shop_id: ShopId,
        beer_id: BeerId,
        offering: &ShopBeer,
    ) -> rusqlite::Result<()> {
        let now = Utc::now();
        self.connection.execute(
            "INSERT INTO offerings (shop_id, beer_id, url, milliliters, price, image_url,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(shop_id, beer_id) DO UPDATE SET
                url = excluded.url,
                milliliters = excluded.milliliters,
                price = excluded.price,
                image_url = excluded.image_url,
                updated_at = excluded.updated_at",
            params![
                shop_id,
                beer_id,
                offering.url,
                offering.milliliters,
                offering.unit_price().round() as i64,
                offering.image_url,
                now
            ],
        )?;
        Ok(())
    }

    /// Deletes the shop's offerings whose beer is not in `valid_ids`.
    #[instrument(skip(self, valid_ids), fields(valid = valid_ids.len()))]
    pub fn remove_expired_offerings(
        &self,
        shop_id: ShopId,
        valid_ids: &HashSet<BeerId>,
    ) -> rusqlite::Result<usize> {
        let mut sql = "DELETE FROM offerings WHERE shop_id = ?".to_string();
        let mut values: Vec<Value> = vec![shop_id.into()];
        if !valid_ids.is_empty() {
            sql.push_str(&format!(" AND beer_id NOT IN ({})", placeholders(valid_ids.len())));
            values.extend(valid_ids.iter().map(|id| Value::from(*id)));
        }
        let removed = self.connection.execute(&sql, params_from_iter(values))?;
        info!(removed, "Removed expired offerings");
        Ok(removed)
    }

    pub fn insert_user(&self, user: &User) -> rusqlite::Result<()> {
        self.connection.execute(
            "INSERT INTO users (id, user_name, first_name, last_name, avatar_url, access_token)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                user_name = excluded.user_name,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                avatar_url = excluded.avatar_url,
                access_token = excluded.access_token",
            params![
                user.id,
                user.user_name,
                user.first_name,
                user.last_name,
                user.avatar_url,
                user.access_token
            ],
        )?;
        Ok(())
    }

    pub fn get_users(&self) -> rusqlite::Result<Vec<User>> {
        let mut statement = self.connection.prepare(
            "SELECT id, user_name, first_name, last_name, avatar_url, access_token
             FROM users ORDER BY id",
        )?;
        let users = statement.query_map((), user_from_row)?.collect();
        users
    }

    pub fn get_user(&self, user_id: UserId) -> rusqlite::Result<Option<User>> {
        self.connection
            .query_row(
                "SELECT id, user_name, first_name, last_name, avatar_url, access_token
                 FROM users WHERE id = ?1",
                params![user_id],
                user_from_row,
            )
            .optional()
    }

    /// Tokens of app users (`Some(true)`), real users (`Some(false)`) or everyone.
    pub fn get_access_tokens(&self, is_app: Option<bool>) -> rusqlite::Result<Vec<String>> {
        let (sql, values): (&str, Vec<Value>) = match is_app {
            None => ("SELECT access_token FROM users ORDER BY id", vec![]),
            Some(true) => (
                "SELECT access_token FROM users WHERE last_name = ? ORDER BY id",
                vec![APP_USER_MARKER.to_string().into()],
            ),
            Some(false) => (
                "SELECT access_token FROM users WHERE last_name != ? ORDER BY id",
                vec![APP_USER_MARKER.to_string().into()],
            ),
        };
        let mut statement = self.connection.prepare(sql)?;
        let tokens = statement
            .query_map(params_from_iter(values), |row| row.get::<_, String>(0))?
            .filter(|token| !matches!(token, Ok(token) if token.is_empty()))
            .collect();
        tokens
    }

    pub fn insert_rating(
        &self,
        beer_id: BeerId,
        user_id: UserId,
        rating: f64,
        updated_at: DateTime<Utc>,
    ) -> rusqlite::Result<()> {
        self.connection.execute(
            "INSERT INTO user_ratings (user_id, beer_id, rating, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, beer_id) DO UPDATE SET
                rating = excluded.rating,
                updated_at = excluded.updated_at",
            params![user_id, beer_id, rating, updated_at],
        )?;
        Ok(())
    }

    /// When the user's most recent rating was made, if any.
    pub fn get_latest_rating_time(&self, user_id: UserId) -> rusqlite::Result<Option<DateTime<Utc>>> {
        self.connection.query_row(
            "SELECT MAX(updated_at) FROM user_ratings WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
    }

    /// Breweries only known through beer results, without a label.
    pub fn get_breweries_missing_details(&self) -> rusqlite::Result<Vec<String>> {
        let mut statement = self
            .connection
            .prepare("SELECT DISTINCT name FROM breweries WHERE image_url = '' ORDER BY name")?;
        let names = statement.query_map((), |row| row.get(0))?.collect();
        names
    }

    /// Countries of breweries with current offerings, by number of distinct beers.
    pub fn get_countries(&self) -> rusqlite::Result<Vec<(String, i64)>> {
        let mut statement = self.connection.prepare(
            "SELECT br.country, COUNT(DISTINCT b.beer_id) AS count
             FROM beers b
             JOIN breweries br ON br.brewery_id = b.brewery_id
             JOIN offerings o ON o.beer_id = b.beer_id
             GROUP BY br.country
             ORDER BY count DESC, br.country",
        )?;
        let countries = statement
            .query_map((), |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect();
        countries
    }

    /// Beers ranked by `value_factor ^ rating / (price / ml)`, each with its
    /// best offering. A zero value factor ranks by newest offering instead.
    #[instrument(skip(self))]
    pub fn get_best_cospa(&self, filter: &CospaFilter) -> rusqlite::Result<Vec<RankedOffering>> {
        let value_factor = filter.value_factor;
        self.connection.create_scalar_function(
            "beer_value",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            move |ctx| {
                let rating: f64 = ctx.get(0)?;
                let cost: f64 = ctx.get(1)?;
                Ok(value_factor.powf(rating) / cost)
            },
        )?;

        // SQLite takes the bare columns of a grouped row from the row holding
        // its single MAX(), which picks the offering shown for each beer.
        let first_dibs = value_factor == 0.0;
        let (created_at, value) = match first_dibs {
            true => (
                "MAX(o.created_at) AS newest",
                "beer_value(b.rating, CAST(o.price AS REAL) / o.milliliters) AS value",
            ),
            false => (
                "o.created_at",
                "MAX(beer_value(b.rating, CAST(o.price AS REAL) / o.milliliters)) AS value",
            ),
        };
        let mut sql = format!(
            "SELECT b.beer_id, b.name, br.name, br.country, b.style, b.abv, b.rating,
                s.shop_id, s.name, o.url, o.price, o.milliliters, o.image_url, {created_at},
                {value}
             FROM offerings o
             JOIN beers b ON b.beer_id = o.beer_id
             JOIN breweries br ON br.brewery_id = b.brewery_id
             JOIN shops s ON s.shop_id = o.shop_id
             WHERE b.rating IS NOT NULL AND b.rating != 0
                AND o.price != 0 AND o.milliliters != 0"
        );
        let mut values: Vec<Value> = Vec::new();

        if let Some(search) = &filter.search {
            let like = format!("%{}%", escape_like(search));
            sql.push_str(" AND (b.name LIKE ? ESCAPE '\\' OR br.name LIKE ? ESCAPE '\\')");
            values.push(like.clone().into());
            values.push(like.into());
        }
        if let Some(min_price) = filter.min_price {
            sql.push_str(" AND o.price >= ?");
            values.push(i64::from(min_price).into());
        }
        if let Some(max_price) = filter.max_price {
            sql.push_str(" AND o.price <= ?");
            values.push(i64::from(max_price).into());
        }
        if let Some(shop_id) = filter.shop_id {
            sql.push_str(" AND o.shop_id = ?");
            values.push(shop_id.into());
        }
        if let Some(styles) = &filter.styles {
            sql.push_str(&format!(" AND b.style IN ({})", placeholders(styles.len())));
            values.extend(styles.iter().map(|style| Value::from(style.clone())));
        }
        if let Some(countries) = &filter.countries {
            sql.push_str(&format!(" AND br.country IN ({})", placeholders(countries.len())));
            values.extend(countries.iter().map(|country| Value::from(country.clone())));
        }
        if let Some(user_id) = filter.exclude_user_had {
            sql.push_str(
                " AND NOT EXISTS (SELECT 1 FROM user_ratings ur
                    WHERE ur.beer_id = b.beer_id AND ur.user_id = ?)",
            );
            values.push(user_id.into());
        }
        sql.push_str(" GROUP BY b.beer_id");
        match first_dibs {
            true => sql.push_str(" ORDER BY newest DESC, b.beer_id"),
            false => sql.push_str(" ORDER BY value DESC, b.beer_id"),
        }
        sql.push_str(" LIMIT ? OFFSET ?");
        values.push((filter.limit as i64).into());
        values.push((filter.offset as i64).into());
        debug!(%sql, "Ranking offerings");

        let mut statement = self.connection.prepare(&sql)?;
        let offerings = statement
            .query_map(params_from_iter(values), ranked_offering_from_row)?
            .collect();
        offerings
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        user_name: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        avatar_url: row.get(4)?,
        access_token: row.get(5)?,
    })
}

fn ranked_offering_from_row(row: &Row<'_>) -> rusqlite::Result<RankedOffering> {
    Ok(RankedOffering {
        beer_id: row.get(0)?,
        beer_name: row.get(1)?,
        brewery_name: row.get(2)?,
        brewery_country: row.get(3)?,
        style: row.get(4)?,
        abv: null_to_nan(row.get(5)?),
        rating: row.get(6)?,
        shop_id: row.get(7)?,
        shop_name: row.get(8)?,
        url: row.get(9)?,
        price: row.get(10)?,
        milliliters: row.get(11)?,
        image_url: row.get(12)?,
        created_at: row.get(13)?,
        value: row.get(14)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn beer_result(beer_id: BeerId, name: &str, rating: f64) -> UntappdBeerResult {
        UntappdBeerResult {
            beer_id,
            image_url: format!("https://untappd.example/beer/{beer_id}.jpg"),
            name: name.to_string(),
            brewery: "Mikkeller".to_string(),
            brewery_id: 1,
            brewery_country: "Denmark".to_string(),
            brewery_city: Some("Copenhagen".to_string()),
            brewery_state: None,
            style: "Stout - Imperial / Double".to_string(),
            abv: 10.9,
            ibu: f64::NAN,
            rating,
            weighted_rating: None,
            rating_count: Some(1200),
            total_user_count: None,
            description: None,
            tags: None,
        }
    }

    fn shop_beer(url: &str, price: u32, milliliters: u32) -> ShopBeer {
        ShopBeer {
            raw_name: url.to_string(),
            url: url.to_string(),
            milliliters,
            price,
            quantity: 1,
            ..Default::default()
        }
    }

    fn shop(name: &str) -> ShopInfo {
        ShopInfo {
            name: name.to_string(),
            url: format!("https://{name}.example"),
            image_url: String::new(),
            shipping_fee: 1000,
            free_shipping_over: Some(10000),
        }
    }

    #[test]
    fn beer_round_trip_keeps_nan_and_tags() {
        let db = BeerDb::open_in_memory().unwrap();
        let mut beer = beer_result(42, "Beer Geek Breakfast", 3.9);
        beer.tags = Some(BTreeSet::from([FlavorTag {
            tag_id: 7,
            name: "coffee".to_string(),
            count: 12,
        }]));
        db.insert_beer(&beer).unwrap();

        let stored = db.get_beer(42).unwrap().unwrap();
        assert_eq!(stored.name, "Beer Geek Breakfast");
        assert_eq!(stored.brewery_name, "Mikkeller");
        assert_eq!(stored.brewery_city.as_deref(), Some("Copenhagen"));
        assert!(stored.ibu.is_nan());
        assert_eq!(stored.tags.len(), 1);
        assert!(Utc::now() - stored.updated_at < chrono::Duration::minutes(1));
        assert_eq!(stored.to_result().rating, 3.9);
        assert!(db.get_beer(43).unwrap().is_none());
    }

    #[test]
    fn brewery_lookup_by_name() {
        let db = BeerDb::open_in_memory().unwrap();
        db.insert_brewery(&UntappdBreweryResult {
            brewery_id: 5,
            image_url: "https://untappd.example/brewery-5_abc_hd.jpeg".to_string(),
            name: "Minoh Beer".to_string(),
            country: "Japan".to_string(),
            city: Some("Minoh".to_string()),
            state: Some("Osaka".to_string()),
        })
        .unwrap();
        let brewery = db.get_brewery_by_name("Minoh Beer").unwrap().unwrap();
        assert_eq!(brewery.brewery_id, 5);
        assert_eq!(brewery.state.as_deref(), Some("Osaka"));
        assert!(db.get_brewery_by_name("Unknown").unwrap().is_none());
    }

    #[test]
    fn shops_are_upserted_by_name() {
        let db = BeerDb::open_in_memory().unwrap();
        let first = db.insert_shop(&shop("volta")).unwrap();
        let mut updated = shop("volta");
        updated.shipping_fee = 500;
        assert_eq!(db.insert_shop(&updated).unwrap(), first);
        assert_ne!(db.insert_shop(&shop("antenna")).unwrap(), first);
        assert_eq!(db.get_shops().unwrap().len(), 2);
    }

    #[test]
    fn expired_offerings_are_removed() {
        let db = BeerDb::open_in_memory().unwrap();
        let shop_id = db.insert_shop(&shop("volta")).unwrap();
        for beer_id in 1..=3 {
            db.insert_beer(&beer_result(beer_id, "Beer", 3.5)).unwrap();
            db.insert_offering(shop_id, beer_id, &shop_beer("u", 500, 330))
                .unwrap();
        }
        let removed = db
            .remove_expired_offerings(shop_id, &HashSet::from([1, 3]))
            .unwrap();
        assert_eq!(removed, 1);
        let removed = db.remove_expired_offerings(shop_id, &HashSet::new()).unwrap();
        assert_eq!(removed, 2);
    }

    #[test]
    fn offering_upsert_keeps_creation_time_and_uses_unit_price() {
        let db = BeerDb::open_in_memory().unwrap();
        let shop_id = db.insert_shop(&shop("volta")).unwrap();
        db.insert_beer(&beer_result(1, "Beer", 3.5)).unwrap();
        db.insert_offering(shop_id, 1, &shop_beer("first", 500, 330))
            .unwrap();
        let created: DateTime<Utc> = db
            .connection()
            .query_row("SELECT created_at FROM offerings", (), |row| row.get(0))
            .unwrap();

        let mut pack = shop_beer("second", 2000, 330);
        pack.quantity = 4;
        db.insert_offering(shop_id, 1, &pack).unwrap();
        let (url, price, created_again): (String, i64, DateTime<Utc>) = db
            .connection()
            .query_row("SELECT url, price, created_at FROM offerings", (), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .unwrap();
        assert_eq!(url, "second");
        assert_eq!(price, 500);
        assert_eq!(created_again, created);
    }

    #[test]
    fn access_tokens_split_app_and_users() {
        let db = BeerDb::open_in_memory().unwrap();
        for (id, last_name, token) in [(1, "APP", "app-token"), (2, "Doe", "user-token"), (3, "Roe", "")] {
            db.insert_user(&User {
                id,
                user_name: format!("user{id}"),
                first_name: "Jo".to_string(),
                last_name: last_name.to_string(),
                avatar_url: String::new(),
                access_token: token.to_string(),
            })
            .unwrap();
        }
        assert_eq!(db.get_access_tokens(Some(true)).unwrap(), vec!["app-token"]);
        assert_eq!(db.get_access_tokens(Some(false)).unwrap(), vec!["user-token"]);
        assert_eq!(db.get_access_tokens(None).unwrap().len(), 2);
    }

    #[test]
    fn cospa_ranking_and_filters() {
        let db = BeerDb::open_in_memory().unwrap();
        let volta = db.insert_shop(&shop("volta")).unwrap();
        let antenna = db.insert_shop(&shop("antenna")).unwrap();
        db.insert_beer(&beer_result(1, "Cheap Lager", 3.0)).unwrap();
        db.insert_beer(&beer_result(2, "Great Stout", 4.2)).unwrap();
        db.insert_beer(&beer_result(3, "Unrated_Thing", 0.0)).unwrap();
        db.insert_offering(volta, 1, &shop_beer("lager", 300, 350)).unwrap();
        db.insert_offering(antenna, 2, &shop_beer("stout", 900, 330)).unwrap();
        db.insert_offering(volta, 3, &shop_beer("thing", 400, 330)).unwrap();

        let ranked = db.get_best_cospa(&CospaFilter::default()).unwrap();
        assert_eq!(
            ranked.iter().map(|o| o.beer_id).collect::<Vec<_>>(),
            vec![2, 1]
        );

        let cheapest = CospaFilter {
            value_factor: 1.0,
            ..Default::default()
        };
        let ranked = db.get_best_cospa(&cheapest).unwrap();
        assert_eq!(ranked[0].beer_id, 1);
        assert!((ranked[0].price_per_ml() - 300.0 / 350.0).abs() < 1e-9);

        let search = CospaFilter {
            search: Some("stout".to_string()),
            ..Default::default()
        };
        assert_eq!(db.get_best_cospa(&search).unwrap().len(), 1);

        // `_` must not act as a wildcard.
        let search = CospaFilter {
            search: Some("Great_Stout".to_string()),
            ..Default::default()
        };
        assert!(db.get_best_cospa(&search).unwrap().is_empty());

        let by_shop = CospaFilter {
            shop_id: Some(volta),
            max_price: Some(350),
            ..Default::default()
        };
        let ranked = db.get_best_cospa(&by_shop).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].shop_name, "volta");

        db.insert_rating(2, 99, 4.0, Utc::now()).unwrap();
        let not_had = CospaFilter {
            exclude_user_had: Some(99),
            countries: Some(vec!["Denmark".to_string()]),
            ..Default::default()
        };
        let ranked = db.get_best_cospa(&not_had).unwrap();
        assert_eq!(ranked.iter().map(|o| o.beer_id).collect::<Vec<_>>(), vec![1]);

        assert_eq!(
            db.get_countries().unwrap(),
            vec![("Denmark".to_string(), 3)]
        );
    }

    #[test]
    fn first_dibs_orders_by_creation() {
        let db = BeerDb::open_in_memory().unwrap();
        let volta = db.insert_shop(&shop("volta")).unwrap();
        db.insert_beer(&beer_result(1, "Old", 4.5)).unwrap();
        db.insert_beer(&beer_result(2, "New", 3.0)).unwrap();
        db.insert_offering(volta, 1, &shop_beer("old", 300, 350)).unwrap();
        db.insert_offering(volta, 2, &shop_beer("new", 900, 350)).unwrap();
        db.connection()
            .execute(
                "UPDATE offerings SET created_at = ?1 WHERE beer_id = 1",
                params![Utc::now() - chrono::Duration::days(3)],
            )
            .unwrap();
        let first_dibs = CospaFilter {
            value_factor: 0.0,
            ..Default::default()
        };
        let ranked = db.get_best_cospa(&first_dibs).unwrap();
        assert_eq!(ranked.iter().map(|o| o.beer_id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn beer_sold_by_two_shops_is_ranked_once() {
        let db = BeerDb::open_in_memory().unwrap();
        let volta = db.insert_shop(&shop("volta")).unwrap();
        let antenna = db.insert_shop(&shop("antenna")).unwrap();
        db.insert_beer(&beer_result(1, "Hazy Jane", 3.7)).unwrap();
        db.insert_beer(&beer_result(2, "Punk IPA", 3.6)).unwrap();
        db.insert_offering(volta, 1, &shop_beer("volta-hazy", 900, 330)).unwrap();
        db.insert_offering(antenna, 1, &shop_beer("antenna-hazy", 600, 330)).unwrap();
        db.insert_offering(volta, 2, &shop_beer("volta-punk", 500, 330)).unwrap();

        let ranked = db.get_best_cospa(&CospaFilter::default()).unwrap();
        let mut ids: Vec<_> = ranked.iter().map(|o| o.beer_id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        let hazy = ranked.iter().find(|o| o.beer_id == 1).unwrap();
        assert_eq!(hazy.shop_id, antenna);
        assert_eq!(hazy.price, 600);
        assert_eq!(hazy.url, "antenna-hazy");

        // First dibs shows each beer with its newest offering.
        db.connection()
            .execute(
                "UPDATE offerings SET created_at = ?1 WHERE url = 'antenna-hazy'",
                params![Utc::now() - chrono::Duration::days(3)],
            )
            .unwrap();
        let first_dibs = CospaFilter {
            value_factor: 0.0,
            ..Default::default()
        };
        let ranked = db.get_best_cospa(&first_dibs).unwrap();
        assert_eq!(ranked.len(), 2);
        let hazy = ranked.iter().find(|o| o.beer_id == 1).unwrap();
        assert_eq!(hazy.url, "volta-hazy");

        // Filters apply before grouping: the cheaper offering is out of the shop filter.
        let volta_only = CospaFilter {
            shop_id: Some(volta),
            ..Default::default()
        };
        let ranked = db.get_best_cospa(&volta_only).unwrap();
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|o| o.shop_id == volta));
    }

    #[test]
    fn users_and_latest_rating() {
        let db = BeerDb::open_in_memory().unwrap();
        let user = User {
            id: 7,
            user_name: "jo".to_string(),
            first_name: "Jo".to_string(),
            last_name: "Doe".to_string(),
            avatar_url: String::new(),
            access_token: "token".to_string(),
        };
        db.insert_user(&user).unwrap();
        assert_eq!(db.get_users().unwrap(), vec![user.clone()]);
        assert_eq!(db.get_user(7).unwrap(), Some(user));
        assert_eq!(db.get_user(8).unwrap(), None);

        assert_eq!(db.get_latest_rating_time(7).unwrap(), None);
        let older = Utc::now() - chrono::Duration::days(10);
        let newer = Utc::now() - chrono::Duration::days(2);
        db.insert_rating(1, 7, 4.0, newer).unwrap();
        db.insert_rating(2, 7, 3.5, older).unwrap();
        db.insert_rating(3, 8, 3.5, Utc::now()).unwrap();
        assert_eq!(db.get_latest_rating_time(7).unwrap(), Some(newer));
    }

    #[test]
    fn breweries_known_only_through_beers() {
        let db = BeerDb::open_in_memory().unwrap();
        db.insert_beer(&beer_result(1, "Beer Geek Breakfast", 3.9)).unwrap();
        assert_eq!(db.get_breweries_missing_details().unwrap(), vec!["Mikkeller"]);
        db.insert_brewery(&UntappdBreweryResult {
            brewery_id: 1,
            image_url: "https://untappd.example/brewery-1_x.jpeg".to_string(),
            name: "Mikkeller".to_string(),
            country: "Denmark".to_string(),
            city: None,
            state: None,
        })
        .unwrap();
        assert!(db.get_breweries_missing_details().unwrap().is_empty());
    }
}
