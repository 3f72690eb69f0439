//! Bringing older catalogs up to date.
//!
//! Loading only fills in what can be learned from files already on disk. Repacking bare roms
//! left behind by older versions into archives is a separate, explicit step that reports progress
//! per item and never lets one failing rom stop the rest.

use crate::{
    catalog::Catalog,
    rom::{header::CartridgeHeader, id::Uid, is_rom_path, region::resolve_region},
    store::{is_archive, ArtifactError, ArtifactStore, PackedRom, RomPacker, ROMS_DIRECTORY},
};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
    thread::{self, JoinHandle},
};

#[derive(Debug, thiserror::Error)]
pub enum MigrationItemError {
    #[error("could not repack {label}: {source}")]
    Pack {
        variant: Uid,
        label: String,
        source: ArtifactError,
    },
}

impl MigrationItemError {
    pub fn variant(&self) -> Uid {
        match self {
            MigrationItemError::Pack { variant, .. } => *variant,
        }
    }
}

#[derive(Debug, Default)]
pub enum MigrationState {
    #[default]
    Idle,
    Scanning,
    Repacking {
        processed: usize,
        total: usize,
    },
    Done {
        packed: usize,
    },
    /// Some items could not be repacked, the rest were
    Failed {
        packed: usize,
        failures: Vec<MigrationItemError>,
    },
}

impl MigrationState {
    pub fn is_finished(&self) -> bool {
        matches!(self, MigrationState::Done { .. } | MigrationState::Failed { .. })
    }
}

/// Emitted after every item, whether it succeeded or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationProgress {
    pub processed: usize,
    pub total: usize,
    pub label: String,
}

/// A variant whose rom still sits bare in the rom directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackItem {
    pub variant: Uid,
    pub artifact_key: String,
    pub legacy_path: PathBuf,
    pub label: String,
}

#[derive(Debug)]
pub struct RepackOutcome {
    pub variant: Uid,
    pub result: Result<PackedRom, MigrationItemError>,
}

/// One finished item of a background repack
#[derive(Debug)]
pub struct RepackEvent {
    pub outcome: RepackOutcome,
    pub progress: MigrationProgress,
}

/// Repack running on its own thread
pub struct RepackJob {
    events: Receiver<RepackEvent>,
    handle: JoinHandle<()>,
}

impl RepackJob {
    /// Blocks until the next event, `None` once the worker is gone
    pub fn next_event(&self) -> Option<RepackEvent> {
        self.events.recv().ok()
    }

    pub fn join(self) {
        if self.handle.join().is_err() {
            tracing::error!("Repack worker panicked");
        }
    }
}

/// What [`backfill`] managed to fill in
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    /// Variants pointed back at an archive a repack left behind
    pub relinked: usize,
    pub inner_filenames: usize,
    pub game_ids: usize,
    pub merged_entries: usize,
}

#[derive(Default)]
struct Findings {
    variant: Option<Uid>,
    inner_filename: Option<String>,
    header: Option<CartridgeHeader>,
}

/// Fills in the rom name and cartridge id of variants from the files they point at, then folds
/// entries that turn out to share a cartridge id
pub fn backfill(catalog: &mut Catalog) -> BackfillReport {
    let store = catalog.store().clone();
    let mut report = BackfillReport {
        relinked: relink_packed(catalog),
        ..Default::default()
    };

    let pending: Vec<(Uid, String, bool, bool)> = catalog
        .variants()
        .filter(|(_, variant)| variant.inner_filename.is_none() || variant.game_id.is_empty())
        .map(|(_, variant)| {
            (
                variant.id,
                variant.archive_relative_path.clone(),
                variant.inner_filename.is_none(),
                variant.game_id.is_empty(),
            )
        })
        .collect();

    let findings: Vec<Findings> = pending
        .par_iter()
        .map(|(id, relative_path, wants_name, wants_header)| {
            inspect(&store, *id, relative_path, *wants_name, *wants_header)
        })
        .collect();

    for finding in findings {
        let Some(variant) = finding.variant.and_then(|id| catalog.variant_mut(id)) else {
            continue;
        };

        if let Some(inner_filename) = finding.inner_filename {
            variant.inner_filename = Some(inner_filename);
            report.inner_filenames += 1;
        }

        if let Some(header) = finding.header.filter(|header| !header.game_id.is_empty()) {
            variant.extracted_region_from_rom = resolve_region(&header.game_id);
            variant.game_id = header.game_id;
            report.game_ids += 1;
        }
    }

    for entry in catalog.entries_mut() {
        if !entry.game_id.is_empty() {
            continue;
        }

        if let Some(game_id) = entry
            .variants
            .iter()
            .map(|variant| &variant.game_id)
            .find(|game_id| !game_id.is_empty())
        {
            entry.game_id = game_id.clone();
        }
    }

    report.merged_entries = catalog.merge_duplicate_entries();

    if report != BackfillReport::default() {
        tracing::info!(
            "Relinked {} archives, backfilled {} rom names and {} cartridge ids, merged {} entries",
            report.relinked,
            report.inner_filenames,
            report.game_ids,
            report.merged_entries
        );
    }

    report
}

/// Variants whose recorded file is gone while the archive for their key exists were packed by a
/// repack whose results never made it back, point them at the archive
fn relink_packed(catalog: &mut Catalog) -> usize {
    let store = catalog.store().clone();
    let stranded: Vec<(Uid, String)> = catalog
        .variants()
        .filter(|(_, variant)| !variant.artifact_key.is_empty())
        .filter(|(_, variant)| {
            variant.archive_relative_path.is_empty()
                || !store.resolve(&variant.archive_relative_path).is_file()
        })
        .filter(|(_, variant)| store.packed_path(&variant.artifact_key).is_file())
        .map(|(_, variant)| (variant.id, variant.artifact_key.clone()))
        .collect();

    let mut relinked = 0;

    for (id, key) in stranded {
        let archive = store.packed_path(&key);
        let filesize = match fs::metadata(&archive) {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                tracing::warn!("Could not inspect {}: {}", archive.display(), err);
                continue;
            }
        };
        let inner_filename = store.inner_rom_name(&archive).unwrap_or_else(|err| {
            tracing::warn!("Could not list {}: {}", archive.display(), err);
            None
        });

        let Some(variant) = catalog.variant_mut(id) else {
            continue;
        };

        let packed_filename = ArtifactStore::packed_filename(&key);
        tracing::info!(
            "Relinking {} to {}",
            variant.label(),
            archive.display()
        );
        variant.archive_relative_path = format!("{}/{}", ROMS_DIRECTORY, packed_filename);
        variant.packed_filename = packed_filename;
        variant.filesize = filesize;
        if inner_filename.is_some() {
            variant.inner_filename = inner_filename;
        }
        relinked += 1;
    }

    relinked
}

fn inspect(
    store: &ArtifactStore,
    id: Uid,
    relative_path: &str,
    wants_name: bool,
    wants_header: bool,
) -> Findings {
    let path = store.resolve(relative_path);
    if relative_path.is_empty() || !path.is_file() {
        tracing::debug!("Nothing on disk for variant {} at {}", id, path.display());
        return Findings::default();
    }

    if is_archive(&path) {
        let inner_filename = wants_name
            .then(|| store.inner_rom_name(&path))
            .transpose()
            .unwrap_or_else(|err| {
                tracing::warn!("Could not list {}: {}", path.display(), err);
                None
            })
            .flatten();
        let header = wants_header
            .then(|| store.read_inner_header(&path))
            .transpose()
            .unwrap_or_else(|err| {
                tracing::warn!("Could not read {}: {}", path.display(), err);
                None
            })
            .flatten();

        return Findings {
            variant: Some(id),
            inner_filename,
            header,
        };
    }

    if !is_rom_path(&path) {
        return Findings::default();
    }

    let inner_filename = wants_name
        .then(|| path.file_name())
        .flatten()
        .map(|name| name.to_string_lossy().into_owned());
    let header = wants_header
        .then(|| CartridgeHeader::from_file(&path))
        .and_then(|header| {
            header
                .inspect_err(|err| tracing::warn!("Unreadable header in {}: {}", path.display(), err))
                .ok()
        });

    Findings {
        variant: Some(id),
        inner_filename,
        header,
    }
}

/// Drives a repack from scanning to applying results, tracking where it is
#[derive(Debug, Default)]
pub struct MigrationEngine {
    state: MigrationState,
    packed: usize,
    failures: Vec<MigrationItemError>,
}

impl MigrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    /// Finds every variant whose archive is missing but whose bare rom is still on disk
    pub fn scan(&mut self, catalog: &Catalog) -> Vec<RepackItem> {
        self.state = MigrationState::Scanning;
        self.packed = 0;
        self.failures.clear();
        let store = catalog.store();

        let candidates: Vec<RepackItem> = catalog
            .variants()
            .filter(|(_, variant)| !variant.packed_filename.is_empty())
            .map(|(_, variant)| RepackItem {
                variant: variant.id,
                artifact_key: variant.artifact_key.clone(),
                legacy_path: store.roms_directory().join(&variant.packed_filename),
                label: variant.label(),
            })
            .collect();

        let items: Vec<RepackItem> = candidates
            .into_par_iter()
            .filter(|item| {
                is_rom_path(&item.legacy_path)
                    && item.legacy_path.is_file()
                    && !store.packed_path(&item.artifact_key).exists()
            })
            .collect();

        tracing::info!("Found {} bare roms to repack", items.len());
        self.state = if items.is_empty() {
            MigrationState::Done { packed: 0 }
        } else {
            MigrationState::Repacking {
                processed: 0,
                total: items.len(),
            }
        };

        items
    }

    /// Updates the progress counters from a report
    pub fn observe(&mut self, progress: &MigrationProgress) {
        self.state = MigrationState::Repacking {
            processed: progress.processed,
            total: progress.total,
        };
    }

    /// Packs every item, deleting its bare rom once the archive is in place. Each outcome is
    /// handed over as soon as its item is done
    pub fn repack(
        items: Vec<RepackItem>,
        packer: &impl RomPacker,
        mut on_item: impl FnMut(RepackOutcome, MigrationProgress),
    ) {
        let total = items.len();

        for (index, item) in items.into_iter().enumerate() {
            let result = packer
                .pack_rom(&item.legacy_path, &item.artifact_key)
                .map(|packed| {
                    remove_legacy(&item.legacy_path);
                    packed
                })
                .map_err(|source| {
                    tracing::error!("Could not repack {}: {}", item.label, source);
                    MigrationItemError::Pack {
                        variant: item.variant,
                        label: item.label.clone(),
                        source,
                    }
                });

            on_item(
                RepackOutcome {
                    variant: item.variant,
                    result,
                },
                MigrationProgress {
                    processed: index + 1,
                    total,
                    label: item.label,
                },
            );
        }
    }

    /// Runs [`Self::repack`] on a worker thread, sending every outcome over a channel
    pub fn spawn<P>(items: Vec<RepackItem>, packer: P) -> RepackJob
    where
        P: RomPacker + Send + 'static,
    {
        let (sender, events) = mpsc::channel();

        let handle = thread::spawn(move || {
            Self::repack(items, &packer, |outcome, progress| {
                // Nobody listening is fine, backfill relinks whatever got packed
                let _ = sender.send(RepackEvent { outcome, progress });
            });
        });

        RepackJob { events, handle }
    }

    /// Points a successfully repacked variant at its archive, a failed one stays untouched
    pub fn apply_outcome(&mut self, catalog: &mut Catalog, outcome: RepackOutcome) {
        match outcome.result {
            Ok(archive) => {
                let Some(variant) = catalog.variant_mut(outcome.variant) else {
                    tracing::warn!("Variant {} vanished during repack", outcome.variant);
                    return;
                };

                variant.archive_relative_path = archive.relative_path;
                variant.packed_filename = archive.packed_filename;
                variant.inner_filename = Some(archive.inner_filename);
                variant.filesize = archive.filesize;
                self.packed += 1;
            }
            Err(err) => self.failures.push(err),
        }
    }

    /// Applies a batch of outcomes and settles the state
    pub fn apply(&mut self, catalog: &mut Catalog, outcomes: Vec<RepackOutcome>) -> &MigrationState {
        for outcome in outcomes {
            self.apply_outcome(catalog, outcome);
        }

        self.settle()
    }

    fn settle(&mut self) -> &MigrationState {
        let packed = std::mem::take(&mut self.packed);
        let failures = std::mem::take(&mut self.failures);

        self.state = if failures.is_empty() {
            tracing::info!("Repacked {} roms", packed);
            MigrationState::Done { packed }
        } else {
            tracing::warn!("Repacked {} roms, {} failed", packed, failures.len());
            MigrationState::Failed { packed, failures }
        };

        &self.state
    }

    /// Scans, repacks and applies on the calling thread
    pub fn run(
        &mut self,
        catalog: &mut Catalog,
        packer: &impl RomPacker,
        mut progress: impl FnMut(&MigrationProgress),
    ) -> &MigrationState {
        let items = self.scan(catalog);
        if items.is_empty() {
            return &self.state;
        }

        Self::repack(items, packer, |outcome, report| {
            self.apply_outcome(catalog, outcome);
            progress(&report);
            self.observe(&report);
        });

        self.settle()
    }

    /// Applies outcomes of a [`RepackJob`] as they arrive until the worker is done or gone
    pub fn finish(
        &mut self,
        catalog: &mut Catalog,
        job: RepackJob,
        mut progress: impl FnMut(&MigrationProgress),
    ) -> &MigrationState {
        while let Some(RepackEvent {
            outcome,
            progress: report,
        }) = job.next_event()
        {
            self.apply_outcome(catalog, outcome);
            progress(&report);
            self.observe(&report);
        }
        job.join();

        self.settle()
    }
}

fn remove_legacy(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed bare rom {}", path.display()),
        Err(err) => tracing::warn!("Could not remove bare rom {}: {}", path.display(), err),
    }
}
