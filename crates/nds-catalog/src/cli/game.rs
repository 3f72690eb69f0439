use super::Session;
use clap::Subcommand;
use nds_catalog::rom::{id::Uid, Platform};
use std::error::Error;

#[derive(Clone, Debug, Subcommand)]
pub enum GameAction {
    /// Remove the game with this cartridge id along with every variant and file it has
    Remove { game_id: String },
    Edit {
        entry: Uid,
        #[clap(short, long)]
        name: Option<String>,
        #[clap(short, long)]
        creator: Option<String>,
        #[clap(short, long)]
        platform: Option<Platform>,
    },
}

pub fn game_remove(session: &mut Session, game_id: String) -> Result<(), Box<dyn Error>> {
    session.catalog.remove_game(&game_id)?;
    session.save()?;

    Ok(())
}

pub fn game_edit(
    session: &mut Session,
    entry: Uid,
    name: Option<String>,
    creator: Option<String>,
    platform: Option<Platform>,
) -> Result<(), Box<dyn Error>> {
    session.catalog.edit_game(entry, name, creator, platform)?;
    session.save()?;

    Ok(())
}
