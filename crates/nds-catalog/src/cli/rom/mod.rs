use super::Session;
use clap::Subcommand;
use nds_catalog::{
    catalog::CoverSource,
    rom::{header::CartridgeHeader, id::Uid, region::RegionCode},
};
use std::{error::Error, path::PathBuf};

#[derive(Clone, Debug, Subcommand)]
pub enum RomAction {
    /// Pack a rom into the store, filing it under the game sharing its cartridge id
    Add {
        path: PathBuf,
        /// Defaults to the region the cartridge id implies
        #[clap(short, long)]
        region: Option<RegionCode>,
        /// Defaults to the version byte of the header
        #[clap(short, long)]
        version: Option<String>,
        #[clap(long)]
        creator: Option<String>,
        /// Local image or URL
        #[clap(short, long, conflicts_with = "lookup_cover")]
        cover: Option<String>,
        /// Look the cover up on the cover host by cartridge id
        #[clap(short, long)]
        lookup_cover: bool,
    },
    Edit {
        variant: Uid,
        #[clap(short, long)]
        region: Option<RegionCode>,
        #[clap(short, long)]
        version: Option<String>,
        #[clap(short, long, conflicts_with = "clear_cover")]
        cover: Option<String>,
        #[clap(long)]
        clear_cover: bool,
    },
    Remove {
        variant: Uid,
    },
}

pub fn rom_add(
    session: &mut Session,
    path: PathBuf,
    region: Option<RegionCode>,
    version: Option<String>,
    creator: Option<String>,
    cover: Option<String>,
    lookup_cover: bool,
) -> Result<(), Box<dyn Error>> {
    let header = CartridgeHeader::from_file(&path)?;

    let cover_source = match cover {
        Some(cover) => CoverSource::parse(&cover),
        None if lookup_cover => {
            CoverSource::lookup(&session.config.cover_provider(), &header.game_id)
        }
        None => CoverSource::None,
    };

    let added = session.catalog.ingest(
        &header,
        &path,
        region.unwrap_or(header.region_code),
        version.unwrap_or_else(|| header.rom_version.to_string()),
        cover_source,
    )?;

    if creator.is_some() {
        session.catalog.edit_game(added.entry, None, creator, None)?;
    }

    session.save()?;
    println!("Added variant {} to game {}", added.variant, added.entry);

    Ok(())
}

pub fn rom_edit(
    session: &mut Session,
    variant: Uid,
    region: Option<RegionCode>,
    version: Option<String>,
    cover: Option<String>,
    clear_cover: bool,
) -> Result<(), Box<dyn Error>> {
    let (current_region, current_version) = session
        .catalog
        .variant(variant)
        .map(|(_, current)| (current.region, current.version.clone()))
        .ok_or_else(|| format!("No variant with id {}", variant))?;

    let cover_source = if clear_cover {
        Some(CoverSource::None)
    } else {
        cover.as_deref().map(CoverSource::parse)
    };

    session.catalog.edit_variant(
        variant,
        region.unwrap_or(current_region),
        version.unwrap_or(current_version),
        cover_source,
    )?;
    session.save()?;

    Ok(())
}

pub fn rom_remove(session: &mut Session, variant: Uid) -> Result<(), Box<dyn Error>> {
    session.catalog.remove_variant(variant)?;
    session.save()?;

    Ok(())
}
