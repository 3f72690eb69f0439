use super::{CatalogDecoder, DecodeContext, SchemaError};
use crate::catalog::GameEntry;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

/// Flat generations were 1 and 2
pub const CURRENT_SCHEMA: u32 = 3;

#[derive(Serialize, Deserialize)]
struct CatalogDocument<G> {
    schema: u32,
    games: Vec<G>,
}

/// Only peeks at the version so newer documents get a clear error instead of a parse failure
#[derive(Deserialize)]
struct SchemaHeader {
    schema: u32,
}

pub struct StructuredDecoder;

impl CatalogDecoder for StructuredDecoder {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn can_decode(&self, input: &str) -> bool {
        input.trim_start().starts_with('(')
    }

    fn decode(&self, input: &str, _context: &DecodeContext) -> Result<Vec<GameEntry>, SchemaError> {
        let options = ron::Options::default();
        let header: SchemaHeader = options.from_str(input)?;

        if header.schema > CURRENT_SCHEMA {
            return Err(SchemaError::UnsupportedVersion(header.schema));
        }

        let document: CatalogDocument<GameEntry> = options.from_str(input)?;
        Ok(document.games)
    }
}

pub(super) fn encode<'a>(
    entries: impl IntoIterator<Item = &'a GameEntry>,
) -> Result<String, SchemaError> {
    let document = CatalogDocument {
        schema: CURRENT_SCHEMA,
        games: entries.into_iter().collect::<Vec<_>>(),
    };

    Ok(ron::ser::to_string_pretty(
        &document,
        PrettyConfig::default(),
    )?)
}
