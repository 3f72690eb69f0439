use serde::{Deserialize, Serialize};
use std::{fmt::Display, path::Path, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

pub mod banner;
pub mod header;
pub mod id;
pub mod region;

/// File extensions recognized as cartridge images
pub const ROM_EXTENSIONS: [&str; 2] = ["nds", "dsi"];

pub fn is_rom_path(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            ROM_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(extension))
        })
}

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
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Nds,
    Dsi,
}

impl Platform {
    /// Guesses from the extension, anything unrecognized is a plain DS image
    pub fn guess(rom_path: impl AsRef<Path>) -> Self {
        match rom_path
            .as_ref()
            .extension()
            .and_then(|extension| extension.to_str())
        {
            Some(extension) if extension.eq_ignore_ascii_case("dsi") => Platform::Dsi,
            _ => Platform::Nds,
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Nds => write!(f, "nds"),
            Platform::Dsi => write!(f, "dsi"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        Platform::iter()
            .find(|platform| s == platform.to_string())
            .ok_or(format!("Unknown platform: {}", s))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rom_extensions() {
        assert!(is_rom_path("game.nds"));
        assert!(is_rom_path("GAME.DSI"));
        assert!(!is_rom_path("game.zip"));
        assert!(!is_rom_path("nds"));
    }

    #[test]
    fn platform_guess() {
        assert_eq!(Platform::guess("a/b.dsi"), Platform::Dsi);
        assert_eq!(Platform::guess("a/b.nds"), Platform::Nds);
        assert_eq!("DSi".parse::<Platform>(), Ok(Platform::Dsi));
    }
}
