use crate::{
    cover_art::{lookup_cover, CoverProvider},
    rom::{
        header::{CartridgeHeader, HeaderError},
        id::{Uid, VariantRef},
        region::RegionCode,
        Platform,
    },
    store::{ArtifactError, ArtifactStore, RomPacker},
};
use indexmap::IndexMap;
use std::path::Path;

mod entry;

pub use entry::{
    artifact_key, compare_names, compare_regions, slugify, CoverRef, CoverSource, GameEntry,
    RomVariant,
};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("no variant with id {0}")]
    UnknownVariant(Uid),
    #[error("no entry with id {0}")]
    UnknownEntry(Uid),
    #[error("no game with cartridge id {0:?}")]
    UnknownGame(String),
}

/// Every game and variant, plus the artifact tree their files live in.
///
/// Not meant for concurrent mutation, callers needing that must serialize access themselves
#[derive(Debug, Clone)]
pub struct Catalog {
    store: ArtifactStore,
    entries: IndexMap<Uid, GameEntry>,
}

impl Catalog {
    pub fn new(store: ArtifactStore) -> Self {
        Self::from_entries(store, Vec::new())
    }

    pub fn from_entries(store: ArtifactStore, entries: Vec<GameEntry>) -> Self {
        let mut by_id: IndexMap<Uid, GameEntry> = IndexMap::with_capacity(entries.len());

        for entry in entries {
            match by_id.get_mut(&entry.id) {
                // Never drop variants, a repeated id joins the entry seen first
                Some(existing) => {
                    tracing::warn!(
                        "Entry {} appears twice, merging {} into {}",
                        entry.id,
                        entry.name,
                        existing.name
                    );
                    existing.variants.extend(entry.variants);
                }
                None => {
                    by_id.insert(entry.id, entry);
                }
            }
        }

        Self {
            store,
            entries: by_id,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = &GameEntry> {
        self.entries.values()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut GameEntry> {
        self.entries.values_mut()
    }

    pub fn variants(&self) -> impl Iterator<Item = (&GameEntry, &RomVariant)> {
        self.entries
            .values()
            .flat_map(|entry| entry.variants.iter().map(move |variant| (entry, variant)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by name, their variants sorted by region
    pub fn sorted(&self) -> Vec<GameEntry> {
        let mut entries: Vec<GameEntry> = self.entries.values().cloned().collect();
        entries.sort_by(compare_names);

        for entry in &mut entries {
            entry.variants.sort_by(compare_regions);
        }

        entries
    }

    pub fn entry(&self, id: Uid) -> Option<&GameEntry> {
        self.entries.get(&id)
    }

    pub fn variant(&self, id: Uid) -> Option<(&GameEntry, &RomVariant)> {
        self.variants().find(|(_, variant)| variant.id == id)
    }

    pub(crate) fn variant_mut(&mut self, id: Uid) -> Option<&mut RomVariant> {
        self.entries
            .values_mut()
            .flat_map(|entry| entry.variants.iter_mut())
            .find(|variant| variant.id == id)
    }

    pub fn find_entry_by_game_id(&self, game_id: &str) -> Option<&GameEntry> {
        if game_id.is_empty() {
            return None;
        }

        self.entries.values().find(|entry| entry.game_id == game_id)
    }

    /// Packs the rom and files it under the entry for its cartridge id, creating one if needed
    pub fn ingest(
        &mut self,
        header: &CartridgeHeader,
        source_rom_path: impl AsRef<Path>,
        region: RegionCode,
        version: impl Into<String>,
        cover_source: CoverSource,
    ) -> Result<VariantRef, CatalogError> {
        let source_rom_path = source_rom_path.as_ref();
        let id = Uid::generate();
        let key = artifact_key(&header.game_id, region, id);

        let packed = self.store.pack_rom(source_rom_path, &key)?;
        let cover_ref = self.store_cover_source(&key, cover_source).unwrap_or_default();

        let variant = RomVariant {
            id,
            region,
            version: version.into(),
            game_id: header.game_id.clone(),
            extracted_region_from_rom: header.region_code,
            archive_relative_path: packed.relative_path,
            packed_filename: packed.packed_filename,
            inner_filename: Some(packed.inner_filename),
            filesize: packed.filesize,
            cover_ref,
            artifact_key: key,
        };

        let existing = self
            .find_entry_by_game_id(&header.game_id)
            .map(|entry| entry.id);

        let entry_id = match existing.and_then(|id| self.entries.get_mut(&id)) {
            Some(entry) => {
                tracing::info!(
                    "Adding {} as a new variant of \"{}\"",
                    variant.label(),
                    entry.name
                );
                entry.variants.push(variant);
                entry.id
            }
            None => {
                let entry = GameEntry {
                    id: Uid::generate(),
                    name: header.title.clone(),
                    creator: String::new(),
                    platform: Platform::guess(source_rom_path),
                    game_id: header.game_id.clone(),
                    variants: vec![variant],
                };
                tracing::info!(
                    "Created entry \"{}\" for cartridge {}",
                    entry.name,
                    entry.game_id
                );
                let entry_id = entry.id;
                self.entries.insert(entry_id, entry);
                entry_id
            }
        };

        Ok(VariantRef {
            entry: entry_id,
            variant: id,
        })
    }

    /// Parses the header of the file and ingests it with the regions and version it declares
    /// unless told otherwise
    pub fn ingest_file(
        &mut self,
        source_rom_path: impl AsRef<Path>,
        region: Option<RegionCode>,
        version: Option<String>,
        cover_source: CoverSource,
    ) -> Result<VariantRef, CatalogError> {
        let source_rom_path = source_rom_path.as_ref();
        let header = CartridgeHeader::from_file(source_rom_path)?;

        self.ingest(
            &header,
            source_rom_path,
            region.unwrap_or(header.region_code),
            version.unwrap_or_else(|| header.rom_version.to_string()),
            cover_source,
        )
    }

    pub fn edit_variant(
        &mut self,
        variant_id: Uid,
        new_region: RegionCode,
        new_version: impl Into<String>,
        new_cover_source: Option<CoverSource>,
    ) -> Result<(), CatalogError> {
        let (key, old_cover) = self
            .variant(variant_id)
            .map(|(_, variant)| (variant.artifact_key.clone(), variant.cover_ref.clone()))
            .ok_or(CatalogError::UnknownVariant(variant_id))?;

        let new_cover = match new_cover_source {
            Some(source) => {
                let stored = self.store_cover_source(&key, source);

                if stored.is_none() {
                    tracing::warn!("Keeping the previous cover of variant {}", variant_id);
                }

                stored
            }
            None => None,
        };

        // The new cover is already on disk, a stale file left behind must not undo the edit
        if let (CoverRef::Local(old_filename), Some(new_cover)) = (&old_cover, &new_cover) {
            let old_path = old_cover.local_path().unwrap_or_default();
            let cleanup = match new_cover {
                // Same key means the new cover replaced the old file in place
                CoverRef::Local(new_filename) if new_filename == old_filename => Ok(()),
                CoverRef::Local(_) => self.store.remove_relative(&old_path),
                _ => self
                    .store
                    .remove_cover(&key)
                    .and_then(|_| self.store.remove_relative(&old_path)),
            };

            if let Err(err) = cleanup {
                tracing::warn!("Could not remove the previous cover {}: {}", old_path, err);
            }
        }

        let variant = self
            .variant_mut(variant_id)
            .ok_or(CatalogError::UnknownVariant(variant_id))?;
        variant.region = new_region;
        variant.version = new_version.into();
        if let Some(new_cover) = new_cover {
            variant.cover_ref = new_cover;
        }

        tracing::info!("Edited variant {}", variant.label());
        Ok(())
    }

    pub fn edit_game(
        &mut self,
        entry_id: Uid,
        name: Option<String>,
        creator: Option<String>,
        platform: Option<Platform>,
    ) -> Result<(), CatalogError> {
        let entry = self
            .entries
            .get_mut(&entry_id)
            .ok_or(CatalogError::UnknownEntry(entry_id))?;

        if let Some(name) = name {
            entry.name = name;
        }
        if let Some(creator) = creator {
            entry.creator = creator;
        }
        if let Some(platform) = platform {
            entry.platform = platform;
        }

        Ok(())
    }

    /// Deletes the variant and its files, dropping the entry once it has no variants left
    pub fn remove_variant(&mut self, variant_id: Uid) -> Result<(), CatalogError> {
        let (entry_id, variant) = self
            .variant(variant_id)
            .map(|(entry, variant)| (entry.id, variant.clone()))
            .ok_or(CatalogError::UnknownVariant(variant_id))?;

        self.remove_artifacts(&variant)?;

        let now_empty = match self.entries.get_mut(&entry_id) {
            Some(entry) => {
                entry.variants.retain(|variant| variant.id != variant_id);
                entry.variants.is_empty()
            }
            None => false,
        };

        tracing::info!("Removed variant {}", variant.label());

        if now_empty {
            if let Some(entry) = self.entries.shift_remove(&entry_id) {
                tracing::info!("Removed entry \"{}\" as it has no variants left", entry.name);
            }
        }

        Ok(())
    }

    pub fn remove_entry(&mut self, entry_id: Uid) -> Result<(), CatalogError> {
        let variants = self
            .entries
            .get(&entry_id)
            .map(|entry| entry.variants.clone())
            .ok_or(CatalogError::UnknownEntry(entry_id))?;

        // Drop variants one at a time so a failure leaves the rest consistent
        for variant in variants {
            self.remove_variant(variant.id)?;
        }

        // Variant removal already dropped it, this covers entries that were empty on load
        self.entries.shift_remove(&entry_id);
        Ok(())
    }

    /// Removes the entry with the given cartridge id along with all its files
    pub fn remove_game(&mut self, game_id: &str) -> Result<(), CatalogError> {
        let entry_id = self
            .find_entry_by_game_id(game_id)
            .map(|entry| entry.id)
            .ok_or_else(|| CatalogError::UnknownGame(game_id.to_string()))?;

        self.remove_entry(entry_id)
    }

    /// Folds entries sharing a cartridge id into the first of them, returns how many were folded
    pub fn merge_duplicate_entries(&mut self) -> usize {
        let mut merged = 0;
        let mut index = 0;

        while index < self.entries.len() {
            let game_id = self.entries[index].game_id.clone();

            if !game_id.is_empty() {
                let duplicates: Vec<Uid> = self
                    .entries
                    .values()
                    .skip(index + 1)
                    .filter(|entry| entry.game_id == game_id)
                    .map(|entry| entry.id)
                    .collect();

                for duplicate in duplicates {
                    if let Some(entry) = self.entries.shift_remove(&duplicate) {
                        tracing::info!(
                            "Merging \"{}\" into \"{}\" as both are cartridge {}",
                            entry.name,
                            self.entries[index].name,
                            game_id
                        );
                        self.entries[index].variants.extend(entry.variants);
                        merged += 1;
                    }
                }
            }

            index += 1;
        }

        merged
    }

    fn remove_artifacts(&self, variant: &RomVariant) -> Result<(), ArtifactError> {
        self.store.remove_rom(&variant.artifact_key)?;
        self.store.remove_cover(&variant.artifact_key)?;

        // Records from older generations may point at files not named after the key
        self.store.remove_relative(&variant.archive_relative_path)?;
        if let Some(cover) = variant.cover_ref.local_path() {
            self.store.remove_relative(&cover)?;
        }

        Ok(())
    }

    /// Resolves a cover source into a reference, `None` when a local image could not be stored
    fn store_cover_source(&self, key: &str, source: CoverSource) -> Option<CoverRef> {
        match source {
            CoverSource::None => Some(CoverRef::None),
            CoverSource::Remote(url) => Some(CoverRef::Remote(url)),
            CoverSource::LocalFile(path) => self.store.store_cover(path, key).map(CoverRef::Local),
            CoverSource::Bytes(bytes) => {
                self.store.store_cover_bytes(&bytes, key).map(CoverRef::Local)
            }
        }
    }
}

impl CoverSource {
    /// Asks the provider for a cover, settling for no cover if it has none
    pub fn lookup(provider: &impl CoverProvider, game_id: &str) -> Self {
        lookup_cover(provider, game_id)
            .map(CoverSource::Bytes)
            .unwrap_or(CoverSource::None)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{cover_art::test::FakeProvider, rom::header::test::build_header};
    use image::{Rgba, RgbaImage};
    use std::{fs, path::PathBuf};
    use tempfile::TempDir;

    struct Fixture {
        directory: TempDir,
        catalog: Catalog,
    }

    impl Fixture {
        fn new() -> Self {
            let directory = tempfile::tempdir().unwrap();
            let catalog = Catalog::new(ArtifactStore::new(directory.path().join("store")));
            Self { directory, catalog }
        }

        fn rom(&self, name: &str, title: &[u8], game_id: &[u8]) -> (PathBuf, CartridgeHeader) {
            let path = self.directory.path().join(name);
            let mut bytes = build_header(title, game_id, b"01", 0);
            bytes.extend_from_slice(name.as_bytes());
            fs::write(&path, &bytes).unwrap();

            (path, CartridgeHeader::parse(&bytes).unwrap())
        }

        fn cover(&self, name: &str) -> PathBuf {
            let path = self.directory.path().join(name);
            RgbaImage::from_pixel(300, 300, Rgba([1, 2, 3, 255]))
                .save(&path)
                .unwrap();
            path
        }
    }

    #[test]
    fn ingest_scenario() {
        let mut fixture = Fixture::new();
        let (path, header) = fixture.rom("pokemon.nds", b"POKEMON\0\0\0\0\0", b"CPUE");

        let reference = fixture
            .catalog
            .ingest(&header, &path, header.region_code, "0", CoverSource::None)
            .unwrap();
        let (entry, variant) = fixture.catalog.variant(reference.variant).unwrap();

        assert_eq!(entry.id, reference.entry);
        assert_eq!(entry.name, "POKEMON");
        assert_eq!(variant.region, RegionCode::Usa);
        assert_eq!(variant.artifact_key, format!("cpue_usa_{}", variant.id.short()));
        assert_eq!(variant.artifact_key.len(), "cpue_usa_".len() + 8);
        assert_eq!(variant.inner_filename.as_deref(), Some("pokemon.nds"));
        assert_eq!(variant.cover_ref, CoverRef::None);
        assert!(fixture
            .catalog
            .store()
            .resolve(&variant.archive_relative_path)
            .is_file());
    }

    #[test]
    fn same_game_id_becomes_variant() {
        let mut fixture = Fixture::new();
        let (usa, usa_header) = fixture.rom("usa.nds", b"GAME", b"AGME");
        let (eur, eur_header) = fixture.rom("eur.nds", b"GAME", b"AGME");

        let first = fixture
            .catalog
            .ingest(&usa_header, &usa, RegionCode::Usa, "0", CoverSource::None)
            .unwrap();
        let second = fixture
            .catalog
            .ingest(&eur_header, &eur, RegionCode::Eur, "1", CoverSource::None)
            .unwrap();

        assert_eq!(first.entry, second.entry);
        assert_eq!(fixture.catalog.len(), 1);

        let entry = fixture.catalog.find_entry_by_game_id("AGME").unwrap();
        assert_eq!(entry.variants.len(), 2);
        assert_eq!(entry.variants[0].id, first.variant);
        assert_eq!(entry.variants[1].id, second.variant);
        assert_ne!(entry.variants[0].artifact_key, entry.variants[1].artifact_key);
    }

    #[test]
    fn same_region_keys_do_not_collide() {
        let mut fixture = Fixture::new();
        let (a, header) = fixture.rom("a.nds", b"GAME", b"AGME");
        let (b, _) = fixture.rom("b.nds", b"GAME", b"AGME");

        fixture
            .catalog
            .ingest(&header, &a, RegionCode::Usa, "0", CoverSource::None)
            .unwrap();
        fixture
            .catalog
            .ingest(&header, &b, RegionCode::Usa, "0", CoverSource::None)
            .unwrap();

        let entry = fixture.catalog.find_entry_by_game_id("AGME").unwrap();
        assert_ne!(entry.variants[0].artifact_key, entry.variants[1].artifact_key);
        assert_eq!(
            fs::read_dir(fixture.catalog.store().roms_directory())
                .unwrap()
                .count(),
            2
        );
    }

    #[test]
    fn missing_cover_lookup_still_ingests() {
        let mut fixture = Fixture::new();
        let (path, header) = fixture.rom("game.nds", b"GAME", b"CPUE");
        let provider = FakeProvider::default();

        let cover = CoverSource::lookup(&provider, &header.game_id);
        let reference = fixture
            .catalog
            .ingest(&header, &path, header.region_code, "0", cover)
            .unwrap();

        assert_eq!(provider.queried.borrow().len(), 21);
        let (_, variant) = fixture.catalog.variant(reference.variant).unwrap();
        assert_eq!(variant.cover_ref, CoverRef::None);
    }

    #[test]
    fn truncated_rom_changes_nothing() {
        let mut fixture = Fixture::new();
        let path = fixture.directory.path().join("short.nds");
        fs::write(&path, [0; 16]).unwrap();

        assert!(matches!(
            fixture
                .catalog
                .ingest_file(&path, None, None, CoverSource::None),
            Err(CatalogError::Header(_))
        ));
        assert!(fixture.catalog.is_empty());
    }

    #[test]
    fn edit_cover_transitions() {
        let mut fixture = Fixture::new();
        let (path, header) = fixture.rom("game.nds", b"GAME", b"AGME");
        let first_cover = fixture.cover("first.png");
        let second_cover = fixture.cover("second.png");

        let reference = fixture
            .catalog
            .ingest(
                &header,
                &path,
                RegionCode::Usa,
                "0",
                CoverSource::LocalFile(first_cover),
            )
            .unwrap();
        let (_, variant) = fixture.catalog.variant(reference.variant).unwrap();
        let key = variant.artifact_key.clone();
        let cover_path = fixture
            .catalog
            .store()
            .cover_path(&ArtifactStore::cover_filename(&key));
        assert_eq!(variant.cover_ref, CoverRef::Local(format!("{}.png", key)));
        assert!(cover_path.is_file());

        // New local file overwrites under the same key
        fixture
            .catalog
            .edit_variant(
                reference.variant,
                RegionCode::Eur,
                "2",
                Some(CoverSource::LocalFile(second_cover)),
            )
            .unwrap();
        let (_, variant) = fixture.catalog.variant(reference.variant).unwrap();
        assert_eq!(variant.region, RegionCode::Eur);
        assert_eq!(variant.version, "2");
        assert_eq!(variant.artifact_key, key);
        assert!(cover_path.is_file());

        // Switching to a remote cover deletes the local file
        fixture
            .catalog
            .edit_variant(
                reference.variant,
                RegionCode::Eur,
                "2",
                Some(CoverSource::Remote("https://example.com/c.png".to_string())),
            )
            .unwrap();
        let (_, variant) = fixture.catalog.variant(reference.variant).unwrap();
        assert_eq!(
            variant.cover_ref,
            CoverRef::Remote("https://example.com/c.png".to_string())
        );
        assert!(!cover_path.exists());

        fixture
            .catalog
            .edit_variant(reference.variant, RegionCode::Eur, "2", Some(CoverSource::None))
            .unwrap();
        let (_, variant) = fixture.catalog.variant(reference.variant).unwrap();
        assert_eq!(variant.cover_ref, CoverRef::None);
    }

    #[test]
    fn failed_cover_edit_keeps_previous() {
        let mut fixture = Fixture::new();
        let (path, header) = fixture.rom("game.nds", b"GAME", b"AGME");
        let reference = fixture
            .catalog
            .ingest(
                &header,
                &path,
                RegionCode::Usa,
                "0",
                CoverSource::Remote("https://example.com/c.png".to_string()),
            )
            .unwrap();

        fixture
            .catalog
            .edit_variant(
                reference.variant,
                RegionCode::Usa,
                "0",
                Some(CoverSource::Bytes(b"garbage".to_vec())),
            )
            .unwrap();

        let (_, variant) = fixture.catalog.variant(reference.variant).unwrap();
        assert_eq!(
            variant.cover_ref,
            CoverRef::Remote("https://example.com/c.png".to_string())
        );
    }

    #[test]
    fn repeated_entry_ids_keep_variants() {
        let fixture = Fixture::new();
        let (path, header) = fixture.rom("game.nds", b"GAME", b"AGME");
        let mut source = Catalog::new(fixture.catalog.store().clone());
        source
            .ingest(&header, &path, RegionCode::Usa, "0", CoverSource::None)
            .unwrap();
        let entry = source.entries().next().unwrap().clone();
        let mut twin = entry.clone();
        twin.variants[0].id = Uid::generate();

        let catalog = Catalog::from_entries(source.store().clone(), vec![entry, twin]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.variants().count(), 2);
    }

    #[test]
    fn stuck_old_cover_does_not_undo_edit() {
        let mut fixture = Fixture::new();
        let (path, header) = fixture.rom("game.nds", b"GAME", b"AGME");
        let new_cover = fixture.cover("new.png");
        let reference = fixture
            .catalog
            .ingest(&header, &path, RegionCode::Usa, "0", CoverSource::None)
            .unwrap();

        // A directory where the old cover file should be cannot be removed
        let stuck = fixture.catalog.store().cover_path("stuck");
        fs::create_dir_all(&stuck).unwrap();
        fixture
            .catalog
            .variant_mut(reference.variant)
            .unwrap()
            .cover_ref = CoverRef::Local("stuck".to_string());

        fixture
            .catalog
            .edit_variant(
                reference.variant,
                RegionCode::Jpn,
                "1",
                Some(CoverSource::LocalFile(new_cover)),
            )
            .unwrap();

        let (_, variant) = fixture.catalog.variant(reference.variant).unwrap();
        let filename = ArtifactStore::cover_filename(&variant.artifact_key);
        assert_eq!(variant.region, RegionCode::Jpn);
        assert_eq!(variant.version, "1");
        assert_eq!(variant.cover_ref, CoverRef::Local(filename.clone()));
        assert!(fixture.catalog.store().cover_path(&filename).is_file());
        assert!(stuck.is_dir());
    }

    #[test]
    fn removing_last_variant_removes_entry() {
        let mut fixture = Fixture::new();
        let (a, header) = fixture.rom("a.nds", b"GAME", b"AGME");
        let (b, _) = fixture.rom("b.nds", b"GAME", b"AGME");
        let cover = fixture.cover("cover.png");

        let first = fixture
            .catalog
            .ingest(&header, &a, RegionCode::Usa, "0", CoverSource::LocalFile(cover))
            .unwrap();
        let second = fixture
            .catalog
            .ingest(&header, &b, RegionCode::Eur, "0", CoverSource::None)
            .unwrap();
        let store = fixture.catalog.store().clone();

        fixture.catalog.remove_variant(first.variant).unwrap();
        assert_eq!(fixture.catalog.len(), 1);
        assert_eq!(fs::read_dir(store.roms_directory()).unwrap().count(), 1);
        assert_eq!(fs::read_dir(store.covers_directory()).unwrap().count(), 0);

        fixture.catalog.remove_variant(second.variant).unwrap();
        assert!(fixture.catalog.is_empty());
        assert!(fixture.catalog.entry(first.entry).is_none());
        assert_eq!(fs::read_dir(store.roms_directory()).unwrap().count(), 0);

        assert!(matches!(
            fixture.catalog.remove_variant(second.variant),
            Err(CatalogError::UnknownVariant(_))
        ));
    }

    #[test]
    fn remove_game_by_cartridge_id() {
        let mut fixture = Fixture::new();
        let (a, header) = fixture.rom("a.nds", b"GAME", b"AGME");
        let (b, other) = fixture.rom("b.nds", b"OTHER", b"BOTE");

        fixture
            .catalog
            .ingest(&header, &a, RegionCode::Usa, "0", CoverSource::None)
            .unwrap();
        fixture
            .catalog
            .ingest(&other, &b, RegionCode::Usa, "0", CoverSource::None)
            .unwrap();

        fixture.catalog.remove_game("AGME").unwrap();
        assert_eq!(fixture.catalog.len(), 1);
        assert!(fixture.catalog.find_entry_by_game_id("AGME").is_none());
        assert!(matches!(
            fixture.catalog.remove_game("AGME"),
            Err(CatalogError::UnknownGame(_))
        ));
    }

    #[test]
    fn merge_duplicates() {
        let mut fixture = Fixture::new();
        let (a, header) = fixture.rom("a.nds", b"GAME", b"AGME");
        let first = fixture
            .catalog
            .ingest(&header, &a, RegionCode::Usa, "0", CoverSource::None)
            .unwrap();

        // Simulate a second entry for the same cartridge, as legacy loads produce
        let mut duplicate = fixture.catalog.entry(first.entry).unwrap().clone();
        duplicate.id = Uid::generate();
        duplicate.variants[0].id = Uid::generate();
        let moved = duplicate.variants[0].id;
        let entries: Vec<GameEntry> = fixture
            .catalog
            .entries()
            .cloned()
            .chain(std::iter::once(duplicate))
            .collect();
        let mut catalog = Catalog::from_entries(fixture.catalog.store().clone(), entries);

        assert_eq!(catalog.merge_duplicate_entries(), 1);
        assert_eq!(catalog.len(), 1);
        let entry = catalog.entry(first.entry).unwrap();
        assert_eq!(entry.variants.len(), 2);
        assert_eq!(entry.variants[1].id, moved);
    }

    #[test]
    fn sorted_view() {
        let mut fixture = Fixture::new();
        let (a, zelda) = fixture.rom("a.nds", b"zelda", b"AZEE");
        let (b, animal) = fixture.rom("b.nds", b"Animal", b"AANE");
        let (c, animal_jpn) = fixture.rom("c.nds", b"Animal", b"AANJ");

        fixture
            .catalog
            .ingest(&zelda, &a, RegionCode::Usa, "0", CoverSource::None)
            .unwrap();
        fixture
            .catalog
            .ingest(&animal, &b, RegionCode::Usa, "0", CoverSource::None)
            .unwrap();
        fixture
            .catalog
            .ingest(&animal_jpn, &c, RegionCode::Jpn, "0", CoverSource::None)
            .unwrap();

        let sorted = fixture.catalog.sorted();
        let names: Vec<_> = sorted.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, ["Animal", "Animal", "zelda"]);
    }
}
