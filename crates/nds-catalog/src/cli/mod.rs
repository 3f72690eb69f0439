use clap::{Parser, Subcommand};
use game::{game_edit, game_remove, GameAction};
use nds_catalog::{
    catalog::Catalog,
    config::GlobalConfig,
    migration::backfill,
    persistence::{self, SchemaError},
};
use rom::{rom_add, rom_edit, rom_remove, RomAction};
use std::{error::Error, path::PathBuf};

pub mod game;
pub mod library;
pub mod rom;

#[derive(Debug, Parser)]
#[command(version, about = "Catalog of Nintendo DS roms, their variants and covers")]
pub struct Cli {
    /// Config file to use instead of the one in the data directory
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub action: CliAction,
}

#[derive(Clone, Debug, Subcommand)]
pub enum CliAction {
    #[command(flatten)]
    Catalog(CatalogAction),
    #[command(about = Some("Extract the banner icon of a rom as a png"))]
    Icon { rom: PathBuf, output: PathBuf },
}

/// Commands that load the catalog first
#[derive(Clone, Debug, Subcommand)]
pub enum CatalogAction {
    #[command(about = Some("Commands relating to single rom variants"))]
    Rom {
        #[clap(subcommand)]
        action: RomAction,
    },
    #[command(about = Some("Commands relating to whole games"))]
    Game {
        #[clap(subcommand)]
        action: GameAction,
    },
    #[command(about = Some("Print every game and its variants"))]
    List,
    #[command(about = Some("Repack bare roms left by older versions into archives"))]
    Migrate,
    #[command(about = Some("Write the catalog in the flat tab separated format"))]
    Export {
        path: PathBuf,
        /// Keep paths relative instead of prefixing the configured base url
        #[clap(short, long)]
        relative: bool,
    },
}

/// Config and catalog shared by every command
pub struct Session {
    pub config: GlobalConfig,
    pub catalog: Catalog,
}

impl Session {
    pub fn open(config: GlobalConfig) -> Result<Self, SchemaError> {
        let mut catalog = persistence::load(
            &config.catalog_file,
            config.store(),
            &config.decode_context(),
        )?;
        backfill(&mut catalog);

        Ok(Self { config, catalog })
    }

    pub fn save(&self) -> Result<(), SchemaError> {
        persistence::save(&self.catalog, &self.config.catalog_file)
    }
}

pub fn handle_cli(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => GlobalConfig::load_from(path)?,
        None => GlobalConfig::load().unwrap_or_else(|err| {
            tracing::debug!("Using default config: {}", err);
            GlobalConfig::default()
        }),
    };

    match cli.action {
        CliAction::Catalog(action) => {
            let mut session = Session::open(config)?;
            handle_catalog_action(&mut session, action)
        }
        // Icons come straight from the rom, no catalog needed
        CliAction::Icon { rom, output } => library::icon(rom, output),
    }
}

fn handle_catalog_action(
    session: &mut Session,
    action: CatalogAction,
) -> Result<(), Box<dyn Error>> {
    match action {
        CatalogAction::Rom { action } => match action {
            RomAction::Add {
                path,
                region,
                version,
                creator,
                cover,
                lookup_cover,
            } => rom_add(
                session,
                path,
                region,
                version,
                creator,
                cover,
                lookup_cover,
            )?,
            RomAction::Edit {
                variant,
                region,
                version,
                cover,
                clear_cover,
            } => rom_edit(session, variant, region, version, cover, clear_cover)?,
            RomAction::Remove { variant } => rom_remove(session, variant)?,
        },
        CatalogAction::Game { action } => match action {
            GameAction::Remove { game_id } => game_remove(session, game_id)?,
            GameAction::Edit {
                entry,
                name,
                creator,
                platform,
            } => game_edit(session, entry, name, creator, platform)?,
        },
        CatalogAction::List => library::list(session),
        CatalogAction::Migrate => library::migrate(session)?,
        CatalogAction::Export { path, relative } => library::export(session, path, relative)?,
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::fs;

    #[test]
    fn catalog_commands_stay_top_level() {
        let cli = Cli::try_parse_from(["nds-catalog", "export", "out.tsv", "--relative"]).unwrap();
        assert!(matches!(
            cli.action,
            CliAction::Catalog(CatalogAction::Export { relative: true, .. })
        ));

        let cli = Cli::try_parse_from(["nds-catalog", "icon", "game.nds", "icon.png"]).unwrap();
        assert!(matches!(cli.action, CliAction::Icon { .. }));
    }

    #[test]
    fn icon_skips_unreadable_catalog() {
        let directory = tempfile::tempdir().unwrap();
        let catalog_file = directory.path().join("catalog.ron");
        fs::write(&catalog_file, "(schema: 99, games: [])").unwrap();
        let config = GlobalConfig {
            store_root: directory.path().join("store"),
            catalog_file,
            ..Default::default()
        };
        let config_path = directory.path().join("config.ron");
        config.save_to(&config_path).unwrap();

        // Not a rom, so the icon command fails on the rom itself
        let not_a_rom = directory.path().join("cover.png");
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))
            .save(&not_a_rom)
            .unwrap();
        let config_arg = config_path.to_string_lossy().into_owned();
        let rom_arg = not_a_rom.to_string_lossy().into_owned();
        let output = directory.path().join("icon.png");
        let output_arg = output.to_string_lossy().into_owned();

        let icon = Cli::try_parse_from([
            "nds-catalog",
            "--config",
            config_arg.as_str(),
            "icon",
            rom_arg.as_str(),
            output_arg.as_str(),
        ])
        .unwrap();
        let err = handle_cli(icon).unwrap_err();
        assert!(err.downcast_ref::<SchemaError>().is_none());
        assert!(!output.exists());

        let list = Cli::try_parse_from(["nds-catalog", "--config", config_arg.as_str(), "list"]).unwrap();
        let err = handle_cli(list).unwrap_err();
        assert!(err.downcast_ref::<SchemaError>().is_some());
    }
}
