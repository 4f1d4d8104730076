use std::cell::RefCell;
use std::collections::HashMap;

use lazy_static::lazy_static;

lazy_static! {
    /// Japanese brewery names as shops print them, mapped to their Untappd name.
    pub static ref BREWERY_JP_EN: HashMap<&'static str, &'static str> = HashMap::from([
        ("yマーケット", "Y.Market"),
        ("うしとらブルワリー", "Ushitora"),
        ("うちゅうブルーイング", "Uchu Brewing"),
        ("やみぞ森林のビール", "Daigo Shinrinbussan"),
        ("ろまんちっく村", "Romantic Village"),
        ("アウトベールセル", "Oud Berseel"),
        ("アルマナック", "Almanach"),
        ("アルヴィンヌ", "Alvine"),
        ("イーヴィル ツイン", "Evil Twin"),
        ("オムニポロ", "Omnipollo"),
        ("カマドブリュワリー", "Camado"),
        ("カルミネーション", "Culmination"),
        ("キャプテンローレンス", "Captain Lawrence"),
        ("クルーリパブリック", "CREW Republic"),
        ("ストーン", "Stone"),
        ("ソングバード", "Songbird"),
        ("ディレイラ", "Derailleur"),
        ("ノーザンモンク", "Northern Monk"),
        ("ノースアイランドビール", "North Island Beer"),
        ("ビアへるん", "Beer Hearn"),
        ("ファイアーストーンウォーカー", "Firestone Walker"),
        ("ファウンダーズ", "Founders"),
        ("ブリュードッグ", "Brewdog"),
        ("ブレイクサイド", "Breakside"),
        ("ベアレン", "Bearen"),
        ("ベアレン醸造所", "Bearen"),
        ("ベアードビール", "Baird"),
        ("ベルチング ビーバー", "Belching Beaver"),
        ("ミッケラー", "Mikkeller"),
        ("ヨロッコビール", "Yorocco"),
        ("ラーヴィグ", "Lervig"),
        ("リパブリュー", "Repubrew"),
        ("リヴィジョン", "Revision"),
        ("リーフマンス", "Liefmans"),
        ("ロコビア", "LOCOBEER"),
        ("ロストアビィ", "Lost Abbey"),
        ("ローデンバッハ", "Rodenbach"),
        ("京都醸造", "Kyoto Brewing"),
        ("伊勢角屋麦酒", "Ise Kadoya"),
        ("反射炉ビヤ", "Hansharo"),
        ("城端麦酒", "Johana"),
        ("富士桜高原麦酒", "Fujizakura"),
        ("常陸野ネストビール", "Hitachino"),
        ("湘南ビール", "Shonan Beer"),
        ("箕面ビール", "Minoh"),
        ("鬼伝説", "Oni Densetsu"),
    ]);
}

pub fn has_japanese(text: &str) -> bool {
    text.chars().any(|c| c as u32 > 0x3000)
}

pub fn translate_brewery(brewery: &str) -> Option<&'static str> {
    BREWERY_JP_EN.get(brewery.trim()).copied()
}

/// Transliteration and machine translation of Japanese product names.
///
/// Both are external services; `None` means no output is available and the
/// caller should carry on without that variant.
pub trait Translate {
    fn to_romaji(&self, text: &str) -> Option<String>;
    fn translate(&self, text: &str) -> Option<String>;
}

impl<T: Translate + ?Sized> Translate for &T {
    fn to_romaji(&self, text: &str) -> Option<String> {
        (**self).to_romaji(text)
    }

    fn translate(&self, text: &str) -> Option<String> {
        (**self).translate(text)
    }
}

pub struct NoTranslation;

impl Translate for NoTranslation {
    fn to_romaji(&self, _text: &str) -> Option<String> {
        None
    }

    fn translate(&self, _text: &str) -> Option<String> {
        None
    }
}

/// Remembers every answer of the wrapped collaborator, failures included,
/// so each text reaches the underlying service at most once.
pub struct MemoTranslator<T> {
    inner: T,
    romaji: RefCell<HashMap<String, Option<String>>>,
    translations: RefCell<HashMap<String, Option<String>>>,
}

impl<T: Translate> MemoTranslator<T> {
    pub fn new(inner: T) -> Self {
        MemoTranslator {
            inner,
            romaji: RefCell::new(HashMap::new()),
            translations: RefCell::new(HashMap::new()),
        }
    }

    fn memoized(
        memo: &RefCell<HashMap<String, Option<String>>>,
        text: &str,
        compute: impl FnOnce() -> Option<String>,
    ) -> Option<String> {
        if let Some(known) = memo.borrow().get(text) {
            return known.clone();
        }
        let value = compute();
        memo.borrow_mut().insert(text.to_string(), value.clone());
        value
    }
}

impl<T: Translate> Translate for MemoTranslator<T> {
    fn to_romaji(&self, text: &str) -> Option<String> {
        Self::memoized(&self.romaji, text, || self.inner.to_romaji(text))
    }

    fn translate(&self, text: &str) -> Option<String> {
        Self::memoized(&self.translations, text, || self.inner.translate(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingTranslator {
        calls: Cell<usize>,
    }

    impl Translate for CountingTranslator {
        fn to_romaji(&self, text: &str) -> Option<String> {
            self.calls.set(self.calls.get() + 1);
            Some(format!("romaji({text})"))
        }

        fn translate(&self, _text: &str) -> Option<String> {
            self.calls.set(self.calls.get() + 1);
            None
        }
    }

    #[test]
    fn detects_japanese() {
        assert!(has_japanese("志賀高原 IPA"));
        assert!(has_japanese("ヘイジー"));
        assert!(!has_japanese("Hazy IPA"));
        assert!(!has_japanese(""));
    }

    #[test]
    fn translates_known_breweries() {
        assert_eq!(translate_brewery("ミッケラー"), Some("Mikkeller"));
        assert_eq!(translate_brewery(" 箕面ビール "), Some("Minoh"));
        assert_eq!(translate_brewery("Unknown"), None);
    }

    #[test]
    fn memo_calls_each_text_once() {
        let memo = MemoTranslator::new(CountingTranslator {
            calls: Cell::new(0),
        });
        assert_eq!(memo.to_romaji("ビール"), Some("romaji(ビール)".to_string()));
        assert_eq!(memo.to_romaji("ビール"), Some("romaji(ビール)".to_string()));
        assert_eq!(memo.translate("ビール"), None);
        assert_eq!(memo.translate("ビール"), None);
        assert_eq!(memo.inner.calls.get(), 2);
    }

    #[test]
    fn no_translation_is_silent() {
        assert_eq!(NoTranslation.to_romaji("ビール"), None);
        assert_eq!(NoTranslation.translate("ビール"), None);
    }
}
