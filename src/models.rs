use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize};

use crate::parsing::parse_price;

pub type BeerId = i64;
pub type BreweryId = i64;
pub type ShopId = i64;
pub type UserId = i64;

/// A listing as scraped from a shop page, before any Untappd matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopBeer {
    pub raw_name: String,
    pub url: String,
    pub milliliters: u32,
    // Total price for `quantity` units, in yen.
    #[serde(deserialize_with = "deserialize_price")]
    pub price: u32,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub available: Option<u32>,
    #[serde(default)]
    pub beer_name: Option<String>,
    #[serde(default)]
    pub brewery_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Product page text; some shops only name the brewery there.
    #[serde(default)]
    pub description: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

// Exports carry either plain yen amounts or the shop's text, e.g. `¥1,650`.
fn deserialize_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Price {
        Yen(u32),
        Text(String),
    }

    match Price::deserialize(deserializer)? {
        Price::Yen(yen) => Ok(yen),
        Price::Text(text) => {
            parse_price(&text).ok_or_else(|| D::Error::custom(format!("invalid price {text:?}")))
        }
    }
}

impl ShopBeer {
    pub fn unit_price(&self) -> f64 {
        self.price as f64 / self.quantity.max(1) as f64
    }

    pub fn price_per_ml(&self) -> f64 {
        self.unit_price() / self.milliliters as f64
    }
}

impl std::fmt::Display for ShopBeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}¥ / {}ml x{})",
            self.raw_name, self.price, self.milliliters, self.quantity
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopInfo {
    pub name: String,
    pub url: String,
    pub image_url: String,
    pub shipping_fee: u32,
    pub free_shipping_over: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_prices() {
        let beer = ShopBeer {
            raw_name: "Hazy Jane 4 pack".to_string(),
            milliliters: 330,
            price: 1320,
            quantity: 4,
            ..Default::default()
        };
        assert_eq!(beer.unit_price(), 330.0);
        assert_eq!(beer.price_per_ml(), 1.0);
    }

    #[test]
    fn reads_csv_listings_with_defaults() {
        let data = "raw_name,url,milliliters,price,beer_name,brewery_name,image_url\n\
                    ミッケラー Beer Geek,https://shop.example/1,330,990,Beer Geek,ミッケラー,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let beers: Vec<ShopBeer> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(beers.len(), 1);
        assert_eq!(beers[0].quantity, 1);
        assert_eq!(beers[0].brewery_name.as_deref(), Some("ミッケラー"));
        assert_eq!(beers[0].image_url, None);
        assert_eq!(beers[0].available, None);
        assert_eq!(beers[0].description, None);
    }

    #[test]
    fn reads_shop_price_text() {
        let data = "raw_name,url,milliliters,price,description\n\
                    Hazy Jane,https://shop.example/1,330,\"¥1,650\",\n\
                    Punk IPA,https://shop.example/2,330,３３０円,醸造所:UK/BrewDog\n\
                    Lager,https://shop.example/3,330,480,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let beers: Vec<ShopBeer> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            beers.iter().map(|beer| beer.price).collect::<Vec<_>>(),
            vec![1650, 330, 480]
        );
        assert_eq!(beers[1].description.as_deref(), Some("醸造所:UK/BrewDog"));

        let data = "raw_name,url,milliliters,price\nSold out,https://shop.example/4,330,SOLD OUT\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        assert!(reader.deserialize::<ShopBeer>().next().unwrap().is_err());
    }
}
