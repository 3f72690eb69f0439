//! Reading and writing the catalog.
//!
//! Catalogs on disk come in several generations. Each generation has a decoder that can tell
//! whether it understands an input, and the first one that does normalizes it into the
//! current model. Writing always produces the current structured schema.

use crate::{
    catalog::{Catalog, GameEntry},
    store::ArtifactStore,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

mod flat;
mod structured;

pub use flat::{export_flat, FlatDecoder, FlatVersion};
pub use structured::{StructuredDecoder, CURRENT_SCHEMA};

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed structured catalog: {0}")]
    Structured(#[from] ron::error::SpannedError),
    #[error("could not encode catalog: {0}")]
    Encode(#[from] ron::Error),
    #[error("catalog schema {0} is newer than this program understands")]
    UnsupportedVersion(u32),
    #[error("no decoder recognizes this catalog")]
    Unrecognized,
}

/// Information decoders need beyond the text itself
#[derive(Debug, Clone, Default)]
pub struct DecodeContext {
    /// Prefix older catalogs put in front of local cover and rom paths
    pub base_url: Option<String>,
}

/// One generation of the on disk catalog format
pub trait CatalogDecoder {
    fn name(&self) -> &'static str;

    fn can_decode(&self, input: &str) -> bool;

    fn decode(&self, input: &str, context: &DecodeContext) -> Result<Vec<GameEntry>, SchemaError>;
}

/// Every known generation, newest first
pub fn decoders() -> Vec<Box<dyn CatalogDecoder>> {
    vec![
        Box::new(StructuredDecoder),
        Box::new(FlatDecoder::new(FlatVersion::V2)),
        Box::new(FlatDecoder::new(FlatVersion::V1)),
    ]
}

pub fn decode(input: &str, context: &DecodeContext) -> Result<Vec<GameEntry>, SchemaError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let decoder = decoders()
        .into_iter()
        .find(|decoder| decoder.can_decode(input))
        .ok_or(SchemaError::Unrecognized)?;

    tracing::debug!("Decoding catalog with the {} decoder", decoder.name());
    decoder.decode(input, context)
}

pub fn encode<'a>(entries: impl IntoIterator<Item = &'a GameEntry>) -> Result<String, SchemaError> {
    structured::encode(entries)
}

/// Loads the catalog at `path`. A missing file is an empty catalog
pub fn load(
    path: impl AsRef<Path>,
    store: ArtifactStore,
    context: &DecodeContext,
) -> Result<Catalog, SchemaError> {
    let path = path.as_ref();

    let input = match fs::read_to_string(path) {
        Ok(input) => input,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::info!("No catalog at {}, starting empty", path.display());
            return Ok(Catalog::new(store));
        }
        Err(source) => {
            return Err(SchemaError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let entries = decode(&input, context)?;
    tracing::info!("Loaded {} entries from {}", entries.len(), path.display());

    Ok(Catalog::from_entries(store, entries))
}

/// Like [`load`] but an unreadable catalog degrades to an empty one
pub fn load_or_default(
    path: impl AsRef<Path>,
    store: ArtifactStore,
    context: &DecodeContext,
) -> Catalog {
    let path = path.as_ref();

    match load(path, store.clone(), context) {
        Ok(catalog) => catalog,
        Err(err) => {
            tracing::error!(
                "Could not load catalog {}, starting empty: {}",
                path.display(),
                err
            );
            Catalog::new(store)
        }
    }
}

/// Writes the catalog in the current schema, replacing the file only once fully written
pub fn save(catalog: &Catalog, path: impl AsRef<Path>) -> Result<(), SchemaError> {
    let path = path.as_ref();
    write_atomically(path, &encode(catalog.entries())?)?;
    tracing::info!("Saved {} entries to {}", catalog.len(), path.display());

    Ok(())
}

pub(crate) fn write_atomically(path: &Path, contents: &str) -> Result<(), SchemaError> {
    let io_error = |source: io::Error| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    };
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(directory).map_err(io_error)?;
    let temporary = NamedTempFile::new_in(directory).map_err(io_error)?;
    fs::write(temporary.path(), contents).map_err(io_error)?;
    temporary.persist(path).map_err(|err| io_error(err.error))?;

    Ok(())
}
