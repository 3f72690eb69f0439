use super::Session;
use nds_catalog::{
    catalog::CoverRef,
    migration::{MigrationEngine, MigrationState},
    persistence::export_flat,
    rom::{banner::BannerIcon, header::CartridgeHeader},
};
use std::{
    error::Error,
    fs::{self, File},
    io::BufReader,
    path::PathBuf,
};

pub fn list(session: &Session) {
    for entry in session.catalog.sorted() {
        println!(
            "{} [{}] {} {}",
            entry.name,
            if entry.game_id.is_empty() {
                "????"
            } else {
                entry.game_id.as_str()
            },
            entry.platform,
            entry.id
        );

        for variant in &entry.variants {
            let cover = match &variant.cover_ref {
                CoverRef::None => String::from("no cover"),
                CoverRef::Remote(url) => url.clone(),
                local => local.local_path().unwrap_or_default(),
            };

            println!(
                "    {} {} v{} {} ({} bytes, {})",
                variant.id,
                variant.region,
                variant.version,
                variant.archive_relative_path,
                variant.filesize,
                cover
            );
        }
    }
}

pub fn migrate(session: &mut Session) -> Result<(), Box<dyn Error>> {
    let mut engine = MigrationEngine::new();
    let items = engine.scan(&session.catalog);

    if items.is_empty() {
        println!("Nothing to repack");
        // Backfill on load may still have changed something
        session.save()?;
        return Ok(());
    }

    let job = MigrationEngine::spawn(items, session.catalog.store().clone());
    let state = engine.finish(&mut session.catalog, job, |progress| {
        println!(
            "[{}/{}] {}",
            progress.processed, progress.total, progress.label
        );
    });

    if let MigrationState::Failed { packed, failures } = state {
        println!("Repacked {}, {} failed:", packed, failures.len());
        for failure in failures {
            println!("    {}", failure);
        }
    }

    session.save()?;

    Ok(())
}

pub fn export(session: &Session, path: PathBuf, relative: bool) -> Result<(), Box<dyn Error>> {
    let base_url = session.config.base_url.as_deref().filter(|_| !relative);
    fs::write(&path, export_flat(&session.catalog, base_url))?;
    tracing::info!("Exported {} entries to {}", session.catalog.len(), path.display());

    Ok(())
}

pub fn icon(rom: PathBuf, output: PathBuf) -> Result<(), Box<dyn Error>> {
    let header = CartridgeHeader::from_file(&rom)?;
    let mut reader = BufReader::new(File::open(&rom)?);

    match BannerIcon::read(&mut reader, header.banner_offset)? {
        Some(icon) => {
            icon.to_rgba().save(&output)?;
            tracing::info!("Wrote icon of {} to {}", rom.display(), output.display());
            Ok(())
        }
        None => Err(format!("{} has no banner icon", rom.display()).into()),
    }
}
