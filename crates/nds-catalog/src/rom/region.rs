use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

/// Coarse geographic classification of a cartridge release
#[derive(
    Serialize,
    Deserialize,
    Default,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
)]
pub enum RegionCode {
    #[default]
    Any,
    Eur,
    Usa,
    Jpn,
    Chi,
    Aus,
    Da,
    Ru,
    Es,
}

impl RegionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionCode::Any => "ANY",
            RegionCode::Eur => "EUR",
            RegionCode::Usa => "USA",
            RegionCode::Jpn => "JPN",
            RegionCode::Chi => "CHI",
            RegionCode::Aus => "AUS",
            RegionCode::Da => "DA",
            RegionCode::Ru => "RU",
            RegionCode::Es => "ES",
        }
    }
}

impl Display for RegionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        RegionCode::iter()
            .find(|region| region.as_str().eq_ignore_ascii_case(s))
            .ok_or(format!("Unknown region: {}", s))
    }
}

/// Region for every letter A to Z, indexed by `letter - b'A'`
pub type RegionTable = [RegionCode; 26];

use RegionCode::{Any, Aus, Chi, Da, Es, Eur, Jpn, Ru, Usa};

/// Active mapping from the fourth game id character to a region
pub const REGION_TABLE: RegionTable = [
    Any, Any, Chi, Eur, Usa, Eur, Any, Eur, Eur, Jpn, Any, Usa, Eur, // A..M
    Eur, Any, Eur, Da, Ru, Es, Usa, Aus, Eur, Eur, Eur, Eur, Eur, // N..Z
];

/// Older mapping still found in catalogs written before Q, R and S were split out
pub const LEGACY_REGION_TABLE: RegionTable = [
    Any, Any, Chi, Eur, Usa, Eur, Any, Eur, Eur, Jpn, Any, Usa, Eur, // A..M
    Eur, Any, Eur, Eur, Eur, Eur, Usa, Aus, Eur, Eur, Eur, Eur, Eur, // N..Z
];

#[derive(Debug, Clone, Copy)]
pub struct RegionResolver {
    table: &'static RegionTable,
}

impl Default for RegionResolver {
    fn default() -> Self {
        Self::new(&REGION_TABLE)
    }
}

impl RegionResolver {
    pub const fn new(table: &'static RegionTable) -> Self {
        Self { table }
    }

    pub fn resolve(&self, game_id: &str) -> RegionCode {
        match region_letter(game_id) {
            Some(letter) if letter.is_ascii_uppercase() => {
                self.table[(letter as u8 - b'A') as usize]
            }
            _ => RegionCode::Any,
        }
    }
}

/// Shorthand for resolving against the active table
pub fn resolve_region(game_id: &str) -> RegionCode {
    RegionResolver::default().resolve(game_id)
}

fn region_letter(game_id: &str) -> Option<char> {
    game_id.chars().nth(3).map(|c| c.to_ascii_uppercase())
}

/// Languages tried after the one implied by the game id, in order
pub const COVER_LANGUAGE_FALLBACK: [&str; 21] = [
    "EN", "US", "FR", "DE", "ES", "IT", "NL", "PT", "JA", "CH", "AU", "SE", "DA", "NO", "FI", "TR",
    "KO", "ZH", "RU", "MX", "CA",
];

fn cover_language(letter: char) -> &'static str {
    match letter {
        'C' => "ZH",
        'D' => "DE",
        'E' | 'L' | 'T' => "US",
        'F' => "FR",
        'H' => "NL",
        'I' => "IT",
        'J' => "JA",
        'K' => "KO",
        'M' => "SE",
        'N' => "NO",
        'Q' => "DA",
        'R' => "RU",
        'S' => "ES",
        'U' => "AU",
        _ => "EN",
    }
}

/// Ordered, duplicate free list of cover languages to query for a game id
pub fn cover_language_candidates(game_id: &str) -> Vec<&'static str> {
    let primary = region_letter(game_id)
        .map(cover_language)
        .unwrap_or("EN");

    std::iter::once(primary)
        .chain(COVER_LANGUAGE_FALLBACK)
        .unique()
        .collect()
}
