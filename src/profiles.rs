use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Ranking presets: the higher the value factor, the more rating beats price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BeerProfile {
    FirstDibs,
    Cheapest,
    GreatDeals,
    Balanced,
    #[default]
    Salaryman,
    HighClass,
    NoExpense,
}

impl BeerProfile {
    pub const ALL: [BeerProfile; 7] = [
        BeerProfile::FirstDibs,
        BeerProfile::Cheapest,
        BeerProfile::GreatDeals,
        BeerProfile::Balanced,
        BeerProfile::Salaryman,
        BeerProfile::HighClass,
        BeerProfile::NoExpense,
    ];

    /// Zero ranks by novelty instead of value.
    pub fn value_factor(self) -> f64 {
        match self {
            BeerProfile::FirstDibs => 0.0,
            BeerProfile::Cheapest => 1.0,
            BeerProfile::GreatDeals => 2.0,
            BeerProfile::Balanced => 4.0,
            BeerProfile::Salaryman => 8.0,
            BeerProfile::HighClass => 12.0,
            BeerProfile::NoExpense => 99999999999.0,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BeerProfile::FirstDibs => "First Dibs",
            BeerProfile::Cheapest => "The Cheapest Stuff",
            BeerProfile::GreatDeals => "Great Deals",
            BeerProfile::Balanced => "Balanced Drinker",
            BeerProfile::Salaryman => "Salaryman Connoisseur",
            BeerProfile::HighClass => "High Class",
            BeerProfile::NoExpense => "I Spare No Expense",
        }
    }

    /// Unknown names fall back to the default profile.
    pub fn from_name(name: &str) -> Self {
        BeerProfile::from_str(name, true).unwrap_or_default()
    }
}

impl std::fmt::Display for BeerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
