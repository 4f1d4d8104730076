//! Candidate Untappd search strings for a scraped listing.
//!
//! Shops name the same beer in many ways: Japanese or English brewery names,
//! style suffixes, volume and promotion notes in brackets. The queries go from
//! the most precise (brewery + beer as given by the shop) to the loosest
//! (machine translation of the full title), and their normalized form is the
//! key of the Untappd query cache.

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

use crate::models::ShopBeer;
use crate::translation::{has_japanese, translate_brewery, Translate};

// Number of trailing words that may be dropped from `brewery beer`.
const MAX_SUFFIX_TRIMS: usize = 2;

lazy_static! {
    static ref PARENTHETICALS: Regex =
        Regex::new(r"\([^)]*\)|（[^）]*）|【[^】]*】|\[[^\]]*\]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

pub fn normalize_query(query: &str) -> String {
    WHITESPACE
        .replace_all(query.trim(), " ")
        .to_lowercase()
}

pub fn strip_parentheticals(text: &str) -> String {
    let stripped = PARENTHETICALS.replace_all(text, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").to_string()
}

fn trimmed_suffixes(name: &str, brewery: Option<&str>) -> Vec<String> {
    let brewery = brewery.map(normalize_query);
    let mut trimmed = Vec::new();
    let mut current = name.trim();
    for _ in 0..MAX_SUFFIX_TRIMS {
        let Some((head, _)) = current.rsplit_once(' ') else {
            break;
        };
        let head = head.trim_end();
        if head.is_empty() || brewery.as_deref() == Some(normalize_query(head).as_str()) {
            break;
        }
        trimmed.push(head.to_string());
        current = head;
    }
    trimmed
}

/// Deduplicated, normalized queries in the order they should be tried.
pub fn untappd_queries(beer: &ShopBeer, translator: &impl Translate) -> Vec<String> {
    let mut candidates = Vec::new();
    let mut clean_name = None;
    let mut brewery = beer.brewery_name.as_deref().map(str::trim);

    if let (Some(brewery_name), Some(beer_name)) = (brewery, beer.beer_name.as_deref()) {
        let name = format!("{brewery_name} {}", beer_name.trim());
        candidates.push(name.clone());
        clean_name = Some(name);
        if let Some(translated) = translate_brewery(brewery_name) {
            let name = format!("{translated} {}", beer_name.trim());
            candidates.push(name.clone());
            clean_name = Some(name);
            brewery = Some(translated);
        }
    }

    candidates.push(beer.raw_name.clone());
    let stripped_name = strip_parentheticals(&beer.raw_name);
    candidates.push(stripped_name.clone());

    if let Some(clean_name) = &clean_name {
        candidates.extend(trimmed_suffixes(clean_name, brewery));
    }

    for text in std::iter::once(&stripped_name).chain(clean_name.as_ref()) {
        if !has_japanese(text) {
            continue;
        }
        candidates.extend(translator.to_romaji(text));
        candidates.extend(translator.translate(text));
    }

    candidates
        .iter()
        .map(|candidate| normalize_query(candidate))
        .filter(|candidate| !candidate.is_empty())
        .unique()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::NoTranslation;

    struct FakeTranslator;

    impl Translate for FakeTranslator {
        fn to_romaji(&self, text: &str) -> Option<String> {
            Some(format!("romaji {text}"))
        }

        fn translate(&self, text: &str) -> Option<String> {
            Some(format!("EN {text}"))
        }
    }

    fn shop_beer(raw_name: &str, brewery: Option<&str>, beer: Option<&str>) -> ShopBeer {
        ShopBeer {
            raw_name: raw_name.to_string(),
            brewery_name: brewery.map(str::to_string),
            beer_name: beer.map(str::to_string),
            milliliters: 330,
            price: 900,
            quantity: 1,
            ..Default::default()
        }
    }

    #[test]
    fn normalizes_queries() {
        assert_eq!(normalize_query("  Hazy   Jane\tIPA "), "hazy jane ipa");
    }

    #[test]
    fn strips_all_bracket_kinds() {
        assert_eq!(
            strip_parentheticals("【限定】Beer Geek (330ml) [NEW] （缶）"),
            "Beer Geek"
        );
    }

    #[test]
    fn query_order_with_translated_brewery() {
        let beer = shop_beer(
            "ミッケラー ビアギーク ブレックファスト (330ml)",
            Some("ミッケラー"),
            Some("Beer Geek Breakfast"),
        );
        assert_eq!(
            untappd_queries(&beer, &NoTranslation),
            vec![
                "ミッケラー beer geek breakfast",
                "mikkeller beer geek breakfast",
                "ミッケラー ビアギーク ブレックファスト (330ml)",
                "ミッケラー ビアギーク ブレックファスト",
                "mikkeller beer geek",
                "mikkeller beer",
            ]
        );
    }

    #[test]
    fn japanese_names_get_romaji_and_translation() {
        let beer = shop_beer(
            "ミッケラー ビアギーク (330ml)",
            Some("ミッケラー"),
            Some("Beer Geek"),
        );
        let queries = untappd_queries(&beer, &FakeTranslator);
        assert_eq!(
            &queries[queries.len() - 2..],
            &["romaji ミッケラー ビアギーク", "en ミッケラー ビアギーク"]
        );
        // The translated clean name has no Japanese left.
        assert!(!queries.iter().any(|q| q == "romaji mikkeller beer geek"));
    }

    #[test]
    fn suffix_trimming_stops_at_brewery() {
        let beer = shop_beer("Stone IPA", Some("Stone"), Some("IPA"));
        assert_eq!(untappd_queries(&beer, &NoTranslation), vec!["stone ipa"]);

        let beer = shop_beer(
            "Uchu Brewing Space Rain",
            Some("Uchu Brewing"),
            Some("Space Rain"),
        );
        assert_eq!(
            untappd_queries(&beer, &NoTranslation),
            vec!["uchu brewing space rain", "uchu brewing space"]
        );
    }

    #[test]
    fn raw_name_only() {
        let beer = shop_beer("Hazy IPA (缶)", None, None);
        assert_eq!(
            untappd_queries(&beer, &FakeTranslator),
            vec!["hazy ipa (缶)", "hazy ipa"]
        );
        let beer = shop_beer("  ", None, None);
        assert!(untappd_queries(&beer, &NoTranslation).is_empty());
    }
}
