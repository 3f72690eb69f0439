use crate::rom::{header::CartridgeHeader, is_rom_path};
use std::{
    fs::{self, File},
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

pub mod cover;

pub const ROMS_DIRECTORY: &str = "roms";
pub const COVERS_DIRECTORY: &str = "covers";
pub const ARCHIVE_EXTENSION: &str = "zip";
pub const COVER_EXTENSION: &str = "png";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("archive error on {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        source: zip::result::ZipError,
    },
    #[error("{} has no file name", .0.display())]
    MissingFileName(PathBuf),
}

impl ArtifactError {
    fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    fn archive(path: impl Into<PathBuf>) -> impl FnOnce(zip::result::ZipError) -> Self {
        let path = path.into();
        move |source| Self::Archive { path, source }
    }
}

/// Where a packed rom ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRom {
    /// Relative to the store root, always `/` separated
    pub relative_path: String,
    pub packed_filename: String,
    pub inner_filename: String,
    /// Size of the archive, not the rom inside it
    pub filesize: u64,
}

/// Anything able to wrap a rom into a single entry archive keyed by artifact key
pub trait RomPacker: Sync {
    fn pack_rom(&self, source: &Path, artifact_key: &str) -> Result<PackedRom, ArtifactError>;
}

/// Owns the on disk `roms/` and `covers/` trees
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Directories are created lazily on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn roms_directory(&self) -> PathBuf {
        self.root.join(ROMS_DIRECTORY)
    }

    pub fn covers_directory(&self) -> PathBuf {
        self.root.join(COVERS_DIRECTORY)
    }

    pub fn packed_filename(artifact_key: &str) -> String {
        format!("{}.{}", artifact_key, ARCHIVE_EXTENSION)
    }

    pub fn cover_filename(artifact_key: &str) -> String {
        format!("{}.{}", artifact_key, COVER_EXTENSION)
    }

    /// Canonical location of the archive for a key
    pub fn packed_path(&self, artifact_key: &str) -> PathBuf {
        self.roms_directory().join(Self::packed_filename(artifact_key))
    }

    pub fn cover_path(&self, cover_filename: &str) -> PathBuf {
        self.covers_directory().join(cover_filename)
    }

    /// Turns a store relative path back into a real one
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        relative_path
            .split('/')
            .filter(|component| !component.is_empty())
            .fold(self.root.clone(), |path, component| path.join(component))
    }

    pub fn unpack_rom(
        &self,
        archive_path: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> Result<Option<PathBuf>, ArtifactError> {
        let archive_path = archive_path.as_ref();
        let destination = destination.as_ref();
        let mut archive = open_archive(archive_path)?;

        // Archives we write hold exactly one rom, for anything else the largest wins
        let mut canonical: Option<(usize, String, u64)> = None;
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .map_err(ArtifactError::archive(archive_path))?;

            let Some(name) = rom_entry_name(entry.is_file(), entry.enclosed_name()) else {
                continue;
            };

            if canonical
                .as_ref()
                .map_or(true, |(_, _, size)| entry.size() > *size)
            {
                canonical = Some((index, name, entry.size()));
            }
        }

        let Some((index, name, _)) = canonical else {
            tracing::warn!("No rom found inside {}", archive_path.display());
            return Ok(None);
        };

        fs::create_dir_all(destination).map_err(ArtifactError::io(destination))?;
        let output_path = destination.join(&name);
        let mut entry = archive
            .by_index(index)
            .map_err(ArtifactError::archive(archive_path))?;

        write_atomically(&output_path, |file| io::copy(&mut entry, file).map(|_| ()))?;
        tracing::info!(
            "Unpacked {} from {} to {}",
            name,
            archive_path.display(),
            output_path.display()
        );

        Ok(Some(output_path))
    }

    /// Name of the rom stored inside a pack archive, if it is one
    pub fn inner_rom_name(
        &self,
        archive_path: impl AsRef<Path>,
    ) -> Result<Option<String>, ArtifactError> {
        let archive_path = archive_path.as_ref();
        let mut archive = open_archive(archive_path)?;

        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .map_err(ArtifactError::archive(archive_path))?;

            if let Some(name) = rom_entry_name(entry.is_file(), entry.enclosed_name()) {
                return Ok(Some(name));
            }
        }

        Ok(None)
    }

    /// Header of the rom inside a pack archive. Unparseable headers are logged and skipped
    pub fn read_inner_header(
        &self,
        archive_path: impl AsRef<Path>,
    ) -> Result<Option<CartridgeHeader>, ArtifactError> {
        let archive_path = archive_path.as_ref();
        let mut archive = open_archive(archive_path)?;

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(ArtifactError::archive(archive_path))?;

            let Some(name) = rom_entry_name(entry.is_file(), entry.enclosed_name()) else {
                continue;
            };

            return match CartridgeHeader::from_reader(&mut entry) {
                Ok(header) => Ok(Some(header.with_fallback_title(
                    Path::new(&name)
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .unwrap_or_default(),
                ))),
                Err(err) => {
                    tracing::warn!("Unreadable header in {}: {}", archive_path.display(), err);
                    Ok(None)
                }
            };
        }

        Ok(None)
    }

    /// Stores a cover from disk, any failure is logged and yields nothing
    pub fn store_cover(&self, source: impl AsRef<Path>, artifact_key: &str) -> Option<String> {
        let source = source.as_ref();

        match fs::read(source) {
            Ok(bytes) => self.store_cover_bytes(&bytes, artifact_key),
            Err(err) => {
                tracing::warn!("Could not read cover {}: {}", source.display(), err);
                None
            }
        }
    }

    pub fn store_cover_bytes(&self, bytes: &[u8], artifact_key: &str) -> Option<String> {
        let filename = Self::cover_filename(artifact_key);
        let destination = self.cover_path(&filename);

        let result = fs::create_dir_all(self.covers_directory())
            .map_err(ArtifactError::io(self.covers_directory()))
            .and_then(|_| {
                write_atomically(&destination, |file| {
                    cover::convert_cover(bytes, file)
                        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
                })
            });

        if let Err(err) = result {
            tracing::warn!("Could not store cover for {}: {}", artifact_key, err);
            return None;
        }

        // Older generations kept covers in their original format
        if let Err(err) = remove_by_stem(&self.covers_directory(), artifact_key, Some(filename.as_str())) {
            tracing::warn!("Could not clean stale covers for {}: {}", artifact_key, err);
        }

        tracing::info!("Stored cover {}", destination.display());
        Some(filename)
    }

    pub fn remove_cover(&self, artifact_key: &str) -> Result<(), ArtifactError> {
        remove_by_stem(&self.covers_directory(), artifact_key, None)
    }

    pub fn remove_rom(&self, artifact_key: &str) -> Result<(), ArtifactError> {
        remove_by_stem(&self.roms_directory(), artifact_key, None)
    }

    /// Removes a single store relative file, missing files are fine
    pub fn remove_relative(&self, relative_path: &str) -> Result<(), ArtifactError> {
        if relative_path.is_empty() {
            return Ok(());
        }

        remove_file_if_present(&self.resolve(relative_path))
    }
}

impl RomPacker for ArtifactStore {
    fn pack_rom(&self, source: &Path, artifact_key: &str) -> Result<PackedRom, ArtifactError> {
        let inner_filename = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ArtifactError::MissingFileName(source.to_path_buf()))?;
        let packed_filename = Self::packed_filename(artifact_key);
        let destination = self.roms_directory().join(&packed_filename);

        fs::create_dir_all(self.roms_directory()).map_err(ArtifactError::io(self.roms_directory()))?;
        let mut rom = BufReader::new(File::open(source).map_err(ArtifactError::io(source))?);

        write_atomically(&destination, |file| {
            let mut writer = ZipWriter::new(file);
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

            writer
                .start_file(inner_filename.as_str(), options)
                .map_err(io::Error::other)?;
            io::copy(&mut rom, &mut writer)?;
            writer.finish().map_err(io::Error::other)?;

            Ok(())
        })?;

        let filesize = fs::metadata(&destination)
            .map_err(ArtifactError::io(&destination))?
            .len();

        tracing::info!(
            "Packed {} into {} ({} bytes)",
            source.display(),
            destination.display(),
            filesize
        );

        Ok(PackedRom {
            relative_path: format!("{}/{}", ROMS_DIRECTORY, packed_filename),
            packed_filename,
            inner_filename,
            filesize,
        })
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>, ArtifactError> {
    let file = File::open(path).map_err(ArtifactError::io(path))?;
    ZipArchive::new(BufReader::new(file)).map_err(ArtifactError::archive(path))
}

/// Returns whether the file at the path opens as a zip archive
pub fn is_archive(path: impl AsRef<Path>) -> bool {
    File::open(path)
        .ok()
        .is_some_and(|file| ZipArchive::new(BufReader::new(file)).is_ok())
}

fn rom_entry_name(is_file: bool, name: Option<PathBuf>) -> Option<String> {
    let name = name.filter(|_| is_file)?;
    if !is_rom_path(&name) {
        return None;
    }

    name.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Writes into a sibling temporary file and renames it over the destination once complete
fn write_atomically(
    destination: &Path,
    write: impl FnOnce(&mut File) -> io::Result<()>,
) -> Result<(), ArtifactError> {
    let directory = destination.parent().unwrap_or(Path::new("."));
    let mut temporary = NamedTempFile::new_in(directory).map_err(ArtifactError::io(directory))?;

    write(temporary.as_file_mut())
        .and_then(|_| temporary.as_file_mut().flush())
        .map_err(ArtifactError::io(destination))?;

    temporary
        .persist(destination)
        .map_err(|err| ArtifactError::io(destination)(err.error))?;

    Ok(())
}

fn remove_file_if_present(path: &Path) -> Result<(), ArtifactError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("Removed {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ArtifactError::io(path)(err)),
    }
}

/// Deletes every file in `directory` named `stem` with any extension, sparing `keep`
fn remove_by_stem(directory: &Path, stem: &str, keep: Option<&str>) -> Result<(), ArtifactError> {
    if !directory.is_dir() {
        return Ok(());
    }

    for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|err| ArtifactError::io(directory)(err.into()))?;
        let path = entry.path();

        if !entry.file_type().is_file() || path.file_stem().and_then(|s| s.to_str()) != Some(stem) {
            continue;
        }

        if keep.is_some_and(|keep| path.file_name().and_then(|s| s.to_str()) == Some(keep)) {
            continue;
        }

        remove_file_if_present(path)?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Read;

    fn write_rom(directory: &Path, name: &str, size: usize) -> PathBuf {
        let path = directory.join(name);
        let bytes: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        fs::write(&path, bytes).unwrap();
        path
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 255]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn pack_unpack_preserves_bytes_and_name() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path().join("store"));
        let rom = write_rom(directory.path(), "Cool Game (E).nds", 0x4000);

        let packed = store.pack_rom(&rom, "cpue_usa_0011aabb").unwrap();
        assert_eq!(packed.relative_path, "roms/cpue_usa_0011aabb.zip");
        assert_eq!(packed.packed_filename, "cpue_usa_0011aabb.zip");
        assert_eq!(packed.inner_filename, "Cool Game (E).nds");
        assert_eq!(
            packed.filesize,
            fs::metadata(store.packed_path("cpue_usa_0011aabb"))
                .unwrap()
                .len()
        );

        let unpacked = store
            .unpack_rom(store.resolve(&packed.relative_path), directory.path().join("out"))
            .unwrap()
            .unwrap();
        assert_eq!(unpacked.file_name().unwrap(), "Cool Game (E).nds");
        assert_eq!(fs::read(unpacked).unwrap(), fs::read(rom).unwrap());
    }

    #[test]
    fn packing_twice_replaces() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path().join("store"));
        let first = write_rom(directory.path(), "first.nds", 100);
        let second = write_rom(directory.path(), "second.nds", 200);

        store.pack_rom(&first, "key").unwrap();
        store.pack_rom(&second, "key").unwrap();

        assert_eq!(
            store.inner_rom_name(store.packed_path("key")).unwrap(),
            Some("second.nds".to_string())
        );
        assert_eq!(fs::read_dir(store.roms_directory()).unwrap().count(), 1);
    }

    #[test]
    fn failed_pack_keeps_previous_archive() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path().join("store"));
        let first = write_rom(directory.path(), "first.nds", 100);
        store.pack_rom(&first, "key").unwrap();
        let before = fs::read(store.packed_path("key")).unwrap();

        let missing = directory.path().join("gone.nds");
        assert!(matches!(
            store.pack_rom(&missing, "key"),
            Err(ArtifactError::Io { path, .. }) if path == missing
        ));

        assert_eq!(fs::read(store.packed_path("key")).unwrap(), before);
        assert_eq!(
            store.inner_rom_name(store.packed_path("key")).unwrap(),
            Some("first.nds".to_string())
        );
        assert_eq!(fs::read_dir(store.roms_directory()).unwrap().count(), 1);
    }

    #[test]
    fn unpack_picks_largest_rom() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path());
        let archive_path = directory.path().join("odd.zip");

        let mut writer = ZipWriter::new(File::create(&archive_path).unwrap());
        for (name, size) in [("small.nds", 10), ("readme.txt", 5000), ("big.dsi", 300)] {
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(&vec![7; size]).unwrap();
        }
        writer.finish().unwrap();

        let out = directory.path().join("out");
        let unpacked = store.unpack_rom(&archive_path, &out).unwrap().unwrap();
        assert_eq!(unpacked.file_name().unwrap(), "big.dsi");
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);

        let mut contents = Vec::new();
        File::open(unpacked).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents.len(), 300);
    }

    #[test]
    fn unpack_without_rom() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path());
        let archive_path = directory.path().join("docs.zip");

        let mut writer = ZipWriter::new(File::create(&archive_path).unwrap());
        writer.start_file("readme.txt", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap();

        assert_eq!(store.unpack_rom(&archive_path, directory.path()).unwrap(), None);
    }

    #[test]
    fn cover_is_shrunk_png() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path().join("store"));
        let source = directory.path().join("cover.png");
        write_png(&source, 512, 512);

        let filename = store.store_cover(&source, "cpue_usa_0011aabb").unwrap();
        assert_eq!(filename, "cpue_usa_0011aabb.png");

        let stored = image::open(store.cover_path(&filename)).unwrap();
        assert_eq!((stored.width(), stored.height()), (192, 192));
    }

    #[test]
    fn broken_cover_is_not_fatal() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path().join("store"));
        let source = directory.path().join("cover.png");
        fs::write(&source, b"definitely not a png").unwrap();

        assert_eq!(store.store_cover(&source, "key"), None);
        assert_eq!(store.store_cover(directory.path().join("missing.png"), "key"), None);
        assert!(!store.cover_path("key.png").exists());
    }

    #[test]
    fn failed_cover_keeps_previous() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path().join("store"));
        let source = directory.path().join("cover.png");
        write_png(&source, 64, 64);

        assert_eq!(
            store.store_cover_bytes(&fs::read(&source).unwrap(), "key").as_deref(),
            Some("key.png")
        );
        let before = fs::read(store.cover_path("key.png")).unwrap();

        assert_eq!(store.store_cover_bytes(b"garbage", "key"), None);
        assert_eq!(fs::read(store.cover_path("key.png")).unwrap(), before);
        assert_eq!(fs::read_dir(store.covers_directory()).unwrap().count(), 1);
    }

    #[test]
    fn remove_by_stem_any_extension() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path());
        fs::create_dir_all(store.covers_directory()).unwrap();
        fs::write(store.cover_path("key.jpg"), b"a").unwrap();
        fs::write(store.cover_path("key.png"), b"b").unwrap();
        fs::write(store.cover_path("other.png"), b"c").unwrap();

        store.remove_cover("key").unwrap();
        assert!(!store.cover_path("key.jpg").exists());
        assert!(!store.cover_path("key.png").exists());
        assert!(store.cover_path("other.png").exists());

        // Absent files and directories are fine
        store.remove_cover("key").unwrap();
        store.remove_rom("key").unwrap();
    }

    #[test]
    fn new_cover_drops_stale_formats() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path());
        fs::create_dir_all(store.covers_directory()).unwrap();
        fs::write(store.cover_path("key.jpg"), b"old").unwrap();
        let source = directory.path().join("new.png");
        write_png(&source, 16, 16);

        assert_eq!(store.store_cover(&source, "key").as_deref(), Some("key.png"));
        assert!(!store.cover_path("key.jpg").exists());
        assert!(store.cover_path("key.png").exists());
    }

    #[test]
    fn header_inside_archive() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path());
        let rom = directory.path().join("game.nds");
        fs::write(
            &rom,
            crate::rom::header::test::build_header(b"INSIDE", b"AINE", b"01", 2),
        )
        .unwrap();
        store.pack_rom(&rom, "key").unwrap();

        let header = store
            .read_inner_header(store.packed_path("key"))
            .unwrap()
            .unwrap();
        assert_eq!(header.title, "INSIDE");
        assert_eq!(header.game_id, "AINE");
        assert_eq!(header.rom_version, 2);
    }

    #[test]
    fn archive_detection() {
        let directory = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(directory.path());
        let rom = write_rom(directory.path(), "bare.nds", 64);
        store.pack_rom(&rom, "packed").unwrap();

        assert!(!is_archive(&rom));
        assert!(is_archive(store.packed_path("packed")));
    }
}
