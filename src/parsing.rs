//! Helpers shared by shop listing parsers: volumes, prices and name cleanup.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Ordered from the most specific listing format to the loosest one.
    static ref MILLILITER_PATTERNS: Vec<Regex> = [
        r"容量:([0-9]+)ml",
        r"【ml】[^0-9]*([0-9]+)",
        r"volume ([0-9]+)ml",
        r"/([0-9]+)ml",
        r"([0-9]{3,4})ml",
        r"([0-9]+)\s*ml",
        r"([0-9]+)ｍｌ",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("invalid milliliter pattern"))
    .collect();
    static ref CENTILITER: Regex = Regex::new(r"([0-9]{1,3}(?:\.[0-9]{1,2})?)cl").unwrap();
    static ref FIRST_NUMBER: Regex = Regex::new(r"([0-9]+)").unwrap();
    static ref JP_BRACKETS: Regex = Regex::new(r"【[^】]*】").unwrap();
    static ref SQUARE_BRACKETS: Regex = Regex::new(r"\s*\[[^\]]+\]\s*").unwrap();
    static ref VOLUME_IN_PARENS: Regex = Regex::new(r"\([0-9０-９]+(ml|ｍｌ)\)").unwrap();
    static ref ARRIVAL_DATE: Regex = Regex::new(r"\s*\([0-9]{1,2}/[0-9]{1,2}入荷予定\)").unwrap();
    static ref BOTTLE_SUFFIX: Regex =
        Regex::new(r"\s*(大瓶|初期|Magnum|Jeroboam|alc[.].*)*$").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref DESCRIPTION_BREWERY: Regex = Regex::new(r"ブリュワリー：([^<]+)<").unwrap();
    static ref DESCRIPTION_BREWERY_SLASH: Regex = Regex::new(r"醸造所:.*/([^\n]*)").unwrap();
    static ref BREWERY_COMPANY_SUFFIX: Regex = Regex::new(r"( (Beer|Brewery) )?Co\.").unwrap();
}

const BREWERY_BEER_SEPARATORS: [&str; 5] = [" - ", "／", " / ", "/", "　"];
const SET_INDICATORS: [&str; 4] = ["本セット", "セット", "pack", "case"];

/// Japanese scripts start at U+3000 (ideographic space).
pub fn keep_until_japanese(text: &str) -> String {
    text.chars().take_while(|c| (*c as u32) < 0x3000).collect()
}

pub fn normalize_numbers(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            _ => c,
        })
        .collect()
}

pub fn parse_milliliters(text: &str) -> Option<u32> {
    let text = normalize_numbers(text).to_lowercase();
    MILLILITER_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(&text))
        .and_then(|captures| captures[1].parse().ok())
}

pub fn parse_centiliters(text: &str) -> Option<u32> {
    let text = text.to_lowercase();
    let centiliters: f64 = CENTILITER.captures(&text)?[1].parse().ok()?;
    Some((centiliters * 10.0).round() as u32)
}

pub fn parse_volume_ml(text: &str) -> Option<u32> {
    parse_milliliters(text).or_else(|| parse_centiliters(text))
}

/// Yen price from a listing string such as `¥1,650` or `3,300円`.
pub fn parse_price(text: &str) -> Option<u32> {
    let text = normalize_numbers(text)
        .replace([',', '円', '¥', '￥'], "")
        .trim()
        .to_string();
    FIRST_NUMBER.captures(&text)?[1].parse().ok()
}

pub fn clean_beer_name(text: &str) -> String {
    let text = JP_BRACKETS.replace_all(text, "");
    let text = SQUARE_BRACKETS.replace_all(&text, " ");
    let text = VOLUME_IN_PARENS
        .split(&text)
        .next()
        .unwrap_or_default()
        .to_string();
    let text = ARRIVAL_DATE.replace_all(&text, "");
    let text = BOTTLE_SUFFIX.replace(&text, "");
    let text = text.replace("限定醸造", "").replace('\t', " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Splits `Brewery - Beer` style titles on the first known separator.
pub fn extract_brewery_beer(text: &str) -> (Option<String>, Option<String>) {
    for separator in BREWERY_BEER_SEPARATORS {
        if let Some((brewery, beer)) = text.split_once(separator) {
            let (brewery, beer) = (brewery.trim(), beer.trim());
            if !brewery.is_empty() && !beer.is_empty() {
                return (Some(brewery.to_string()), Some(beer.to_string()));
            }
        }
    }
    (None, None)
}

pub fn is_beer_set(text: &str) -> bool {
    let text = text.to_lowercase();
    SET_INDICATORS
        .iter()
        .any(|indicator| text.contains(indicator))
}

pub fn extract_brewery_from_description(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    if let Some(captures) = DESCRIPTION_BREWERY.captures(&lowered) {
        return Some(captures[1].trim().to_string());
    }
    let captures = DESCRIPTION_BREWERY_SLASH.captures(text)?;
    let brewery = BREWERY_COMPANY_SUFFIX.replace_all(captures[1].trim(), "");
    let brewery = brewery.trim();
    match brewery.is_empty() {
        true => None,
        false => Some(brewery.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_latin_prefix() {
        assert_eq!(keep_until_japanese("Hazy IPA ヘイジーIPA"), "Hazy IPA ");
        assert_eq!(keep_until_japanese("ビール"), "");
        assert_eq!(keep_until_japanese("Stout"), "Stout");
    }

    #[test]
    fn normalizes_full_width_digits() {
        assert_eq!(normalize_numbers("３５０ml"), "350ml");
        assert_eq!(normalize_numbers("abc 12"), "abc 12");
    }

    #[test]
    fn parses_milliliters_in_shop_formats() {
        assert_eq!(parse_milliliters("容量:330ml"), Some(330));
        assert_eq!(parse_milliliters("【ML】 500"), Some(500));
        assert_eq!(parse_milliliters("Volume 473mL"), Some(473));
        assert_eq!(parse_milliliters("瓶/750ml"), Some(750));
        assert_eq!(parse_milliliters("Some IPA 350 ml"), Some(350));
        assert_eq!(parse_milliliters("缶 ３５０ｍｌ"), Some(350));
        assert_eq!(parse_milliliters("Some IPA"), None);
    }

    #[test]
    fn parses_centiliters() {
        assert_eq!(parse_centiliters("Gueuze 37.5cl"), Some(375));
        assert_eq!(parse_centiliters("75CL"), Some(750));
        assert_eq!(parse_volume_ml("Kriek 37.5cl"), Some(375));
        assert_eq!(parse_volume_ml("IPA 440ml"), Some(440));
        assert_eq!(parse_volume_ml("IPA"), None);
    }

    #[test]
    fn parses_prices() {
        assert_eq!(parse_price("¥1,650"), Some(1650));
        assert_eq!(parse_price("3,300円(税込)"), Some(3300));
        assert_eq!(parse_price("￥８８０"), Some(880));
        assert_eq!(parse_price("sold out"), None);
    }

    #[test]
    fn cleans_beer_names() {
        assert_eq!(clean_beer_name("【限定】Hazy Jane (330ml)"), "Hazy Jane");
        assert_eq!(clean_beer_name("Pale Ale [NEW] Citra"), "Pale Ale Citra");
        assert_eq!(clean_beer_name("Saison (7/15入荷予定)"), "Saison");
        assert_eq!(clean_beer_name("Tripel\tKarmeliet Magnum"), "Tripel Karmeliet");
        assert_eq!(clean_beer_name("限定醸造 ヴァイツェン"), "ヴァイツェン");
    }

    #[test]
    fn splits_brewery_and_beer() {
        assert_eq!(
            extract_brewery_beer("Omnipollo - Noa Pecan Mud Cake"),
            (Some("Omnipollo".to_string()), Some("Noa Pecan Mud Cake".to_string()))
        );
        assert_eq!(
            extract_brewery_beer("うちゅうブルーイング／Space Rain"),
            (Some("うちゅうブルーイング".to_string()), Some("Space Rain".to_string()))
        );
        assert_eq!(extract_brewery_beer("Just a name"), (None, None));
        assert_eq!(extract_brewery_beer("Trailing / "), (None, None));
    }

    #[test]
    fn detects_sets() {
        assert!(is_beer_set("飲み比べ6本セット"));
        assert!(is_beer_set("Mixed 4-Pack"));
        assert!(!is_beer_set("West Coast IPA"));
    }

    #[test]
    fn extracts_brewery_from_descriptions() {
        assert_eq!(
            extract_brewery_from_description("<p>ブリュワリー：Mikkeller<br></p>"),
            Some("mikkeller".to_string())
        );
        assert_eq!(
            extract_brewery_from_description("醸造所:アメリカ/Sierra Nevada Brewing Co.\n"),
            Some("sierra nevada brewing".to_string())
        );
        assert_eq!(extract_brewery_from_description("no brewery here"), None);
    }
}
