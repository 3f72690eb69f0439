use super::{CatalogDecoder, DecodeContext, SchemaError};
use crate::{
    catalog::{artifact_key, Catalog, CoverRef, GameEntry, RomVariant},
    rom::{id::Uid, region::RegionCode, Platform},
    store::ROMS_DIRECTORY,
};
use std::{collections::HashSet, fmt::Write};

const SCHEMA_MARKER: &str = "#schema=";
const SEPARATOR: char = '\t';

/// Tab separated, one line per variant generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FlatVersion {
    /// id, name, platform, region, version, creator, download_url, filename, filesize
    V1,
    /// V1 plus a trailing icon_url
    V2,
}

impl FlatVersion {
    fn from_marker(marker: &str) -> Option<Self> {
        match marker.trim() {
            "1" => Some(FlatVersion::V1),
            "2" => Some(FlatVersion::V2),
            _ => None,
        }
    }

    fn from_field_count(count: usize) -> Self {
        if count >= 10 {
            FlatVersion::V2
        } else {
            FlatVersion::V1
        }
    }
}

/// Works out which flat generation an input is, if it is one at all
fn sniff(input: &str) -> Option<FlatVersion> {
    for line in input.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(marker) = line.strip_prefix(SCHEMA_MARKER) {
            return FlatVersion::from_marker(marker);
        }

        if line.starts_with('#') {
            continue;
        }

        // The first record decides when there is no marker
        return line
            .contains(SEPARATOR)
            .then(|| FlatVersion::from_field_count(line.split(SEPARATOR).count()));
    }

    None
}

pub struct FlatDecoder {
    version: FlatVersion,
}

impl FlatDecoder {
    pub fn new(version: FlatVersion) -> Self {
        Self { version }
    }
}

impl CatalogDecoder for FlatDecoder {
    fn name(&self) -> &'static str {
        match self.version {
            FlatVersion::V1 => "flat v1",
            FlatVersion::V2 => "flat v2",
        }
    }

    fn can_decode(&self, input: &str) -> bool {
        sniff(input) == Some(self.version)
    }

    fn decode(&self, input: &str, context: &DecodeContext) -> Result<Vec<GameEntry>, SchemaError> {
        let mut seen = HashSet::new();
        let entries: Vec<GameEntry> = input
            .lines()
            .map(|line| line.trim_end_matches(['\r', '\n']))
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
            .enumerate()
            .map(|(index, line)| {
                let record = FlatRecord::parse(line);
                let seed = unique_seed(&mut seen, record.seed(index), index);
                record.into_entry(seed, context)
            })
            .collect();

        tracing::info!(
            "Read {} records from a {} catalog",
            entries.len(),
            self.name()
        );

        Ok(entries)
    }
}

/// One line of a flat catalog, short lines padded with defaults
struct FlatRecord<'a> {
    id: &'a str,
    name: &'a str,
    platform: &'a str,
    region: &'a str,
    version: &'a str,
    creator: &'a str,
    download_url: &'a str,
    filename: &'a str,
    filesize: &'a str,
    icon_url: &'a str,
}

impl<'a> FlatRecord<'a> {
    fn parse(line: &'a str) -> Self {
        let fields: Vec<&str> = line.split(SEPARATOR).collect();
        let field = |index: usize, default: &'static str| -> &'a str {
            fields.get(index).copied().unwrap_or(default)
        };

        Self {
            id: field(0, ""),
            name: field(1, ""),
            platform: field(2, "nds"),
            region: field(3, "ANY"),
            version: field(4, ""),
            creator: field(5, ""),
            download_url: field(6, ""),
            filename: field(7, ""),
            filesize: field(8, "0"),
            icon_url: field(9, ""),
        }
    }

    /// Older catalogs had no stable ids, ours are derived from this so repeated loads agree
    fn seed(&self, index: usize) -> String {
        if self.id.trim().is_empty() {
            format!("row:{}", index)
        } else {
            self.id.trim().to_string()
        }
    }

    fn into_entry(self, seed: String, context: &DecodeContext) -> GameEntry {
        let entry_id = Uid::derive(&format!("entry:{}", seed));
        let variant_id = Uid::derive(&format!("variant:{}", seed));

        let region = self.region.parse().unwrap_or_else(|err| {
            tracing::warn!("Record {}: {}, assuming ANY", seed, err);
            RegionCode::Any
        });
        let platform = self.platform.parse().unwrap_or_else(|err| {
            tracing::warn!("Record {}: {}, assuming nds", seed, err);
            Platform::Nds
        });

        let packed_filename = last_segment(self.download_url)
            .or_else(|| last_segment(self.filename))
            .unwrap_or_default()
            .to_string();
        let archive_relative_path = if packed_filename.is_empty() {
            String::new()
        } else {
            format!("{}/{}", ROMS_DIRECTORY, packed_filename)
        };

        let variant = RomVariant {
            id: variant_id,
            region,
            version: self.version.to_string(),
            game_id: String::new(),
            extracted_region_from_rom: RegionCode::Any,
            archive_relative_path,
            packed_filename,
            inner_filename: None,
            filesize: self.filesize.trim().parse().unwrap_or(0),
            cover_ref: legacy_cover(self.icon_url, context),
            artifact_key: artifact_key(&seed, region, variant_id),
        };

        GameEntry {
            id: entry_id,
            name: self.name.to_string(),
            creator: self.creator.to_string(),
            platform,
            game_id: String::new(),
            variants: vec![variant],
        }
    }
}

/// Rows sharing an id would derive the same identifiers, later ones get the row index appended
fn unique_seed(seen: &mut HashSet<String>, seed: String, index: usize) -> String {
    if seen.insert(seed.clone()) {
        return seed;
    }

    tracing::warn!("Record {} reuses id {:?}, keeping it as its own entry", index, seed);
    let mut suffix = index;
    loop {
        let candidate = format!("{}#{}", seed, suffix);
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

fn last_segment(path: &str) -> Option<&str> {
    path.trim()
        .rsplit(['/', '\\'])
        .next()
        .filter(|segment| !segment.is_empty())
}

fn legacy_cover(icon_url: &str, context: &DecodeContext) -> CoverRef {
    let icon_url = icon_url.trim();

    if icon_url.is_empty() {
        return CoverRef::None;
    }

    let ours = context
        .base_url
        .as_deref()
        .map(|base| base.trim_end_matches('/'))
        .is_some_and(|base| !base.is_empty() && icon_url.starts_with(base));
    let remote = icon_url.starts_with("http://") || icon_url.starts_with("https://");

    if remote && !ours {
        return CoverRef::Remote(icon_url.to_string());
    }

    last_segment(icon_url)
        .map(|filename| CoverRef::Local(filename.to_string()))
        .unwrap_or_default()
}

fn clean(field: &str) -> String {
    field.replace(['\t', '\r', '\n'], " ")
}

/// Writes the newest flat layout, one line per variant.
///
/// With a base URL rom and cover columns become absolute links, without one they stay
/// relative to the store root
pub fn export_flat(catalog: &Catalog, base_url: Option<&str>) -> String {
    let base = base_url
        .map(|base| base.trim_end_matches('/'))
        .filter(|base| !base.is_empty());
    let link = |relative: &str| match base {
        Some(base) if !relative.is_empty() => format!("{}/{}", base, relative),
        _ => relative.to_string(),
    };

    let mut output = format!("{}2\n", SCHEMA_MARKER);

    for (entry, variant) in catalog.variants() {
        let icon_url = match &variant.cover_ref {
            CoverRef::None => String::new(),
            CoverRef::Remote(url) => url.clone(),
            local => link(&local.local_path().unwrap_or_default()),
        };
        let filename = variant
            .inner_filename
            .as_deref()
            .unwrap_or(variant.packed_filename.as_str());

        let fields = [
            variant.id.to_string(),
            clean(&entry.name),
            entry.platform.to_string(),
            variant.region.to_string(),
            clean(&variant.version),
            clean(&entry.creator),
            link(&variant.archive_relative_path),
            clean(filename),
            variant.filesize.to_string(),
            icon_url,
        ];

        let _ = writeln!(output, "{}", fields.join("\t"));
    }

    output
}
