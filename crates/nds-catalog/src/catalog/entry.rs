use crate::{
    rom::{id::Uid, region::RegionCode, Platform},
    store::COVERS_DIRECTORY,
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, path::PathBuf};

const MAX_ARTIFACT_KEY_LENGTH: usize = 100;

/// Where the cover of a variant lives
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq, Hash)]
pub enum CoverRef {
    #[default]
    None,
    /// Absolute URL hosted elsewhere
    Remote(String),
    /// Bare filename inside the cover directory
    Local(String),
}

impl CoverRef {
    pub fn is_local(&self) -> bool {
        matches!(self, CoverRef::Local(_))
    }

    /// Store relative path of a local cover
    pub fn local_path(&self) -> Option<String> {
        match self {
            CoverRef::Local(filename) => Some(format!("{}/{}", COVERS_DIRECTORY, filename)),
            _ => None,
        }
    }
}

/// What the user wants the cover of a variant to become
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverSource {
    None,
    Remote(String),
    LocalFile(PathBuf),
    /// Image already in memory, usually from a cover lookup
    Bytes(Vec<u8>),
}

impl CoverSource {
    /// Distinguishes a URL from a path on the local disk
    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        if input.is_empty() {
            CoverSource::None
        } else if input.starts_with("http://") || input.starts_with("https://") {
            CoverSource::Remote(input.to_string())
        } else {
            CoverSource::LocalFile(PathBuf::from(input))
        }
    }
}

/// A single packaged release of one cartridge
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RomVariant {
    pub id: Uid,
    pub region: RegionCode,
    pub version: String,
    pub game_id: String,
    pub extracted_region_from_rom: RegionCode,
    pub archive_relative_path: String,
    pub packed_filename: String,
    /// Name of the rom inside the archive, unknown for records predating packing
    pub inner_filename: Option<String>,
    pub filesize: u64,
    pub cover_ref: CoverRef,
    /// Filesystem name shared by the archive and cover, fixed at creation
    pub artifact_key: String,
}

impl RomVariant {
    /// Display label used in progress reports and listings
    pub fn label(&self) -> String {
        let name = self
            .inner_filename
            .as_deref()
            .unwrap_or(self.packed_filename.as_str());

        format!("{} [{}]", name, self.region)
    }
}

/// A logical game holding every variant sharing a cartridge id
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GameEntry {
    pub id: Uid,
    pub name: String,
    pub creator: String,
    pub platform: Platform,
    pub game_id: String,
    pub variants: Vec<RomVariant>,
}

impl GameEntry {
    pub fn variant(&self, id: Uid) -> Option<&RomVariant> {
        self.variants.iter().find(|variant| variant.id == id)
    }
}

/// Filesystem safe slug joining a variant to its files
pub fn artifact_key(game_id: &str, region: RegionCode, id: Uid) -> String {
    let base = if game_id.trim().is_empty() {
        "rom"
    } else {
        game_id
    };

    slugify(&format!("{}_{}_{}", base, region, id.short()))
}

pub fn slugify(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .take(MAX_ARTIFACT_KEY_LENGTH)
        .collect()
}

/// Case insensitive ordering of entries by name
pub fn compare_names(a: &GameEntry, b: &GameEntry) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Orders variants by region code, then by version
pub fn compare_regions(a: &RomVariant, b: &RomVariant) -> Ordering {
    a.region
        .as_str()
        .cmp(b.region.as_str())
        .then_with(|| a.version.cmp(&b.version))
        .then_with(|| a.id.cmp(&b.id))
}
