use crate::rom::region::cover_language_candidates;
use std::{io::Read, time::Duration};

pub const DEFAULT_COVER_HOST: &str = "art.gametdb.com";
pub const DEFAULT_COVER_TIMEOUT: Duration = Duration::from_secs(5);
// Covers are small, anything bigger than this is not a cover
const MAX_COVER_SIZE: u64 = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CoverFetchError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("could not read body of {url}: {source}")]
    Body {
        url: String,
        source: std::io::Error,
    },
}

/// Source of cover art for a cartridge id in a given language
pub trait CoverProvider {
    /// `Ok(None)` means the provider has no image for this language
    fn fetch(&self, game_id: &str, language: &str) -> Result<Option<Vec<u8>>, CoverFetchError>;
}

/// Queries each candidate language in order, the first image found wins.
/// Not finding anything is an ordinary outcome
pub fn lookup_cover(provider: &impl CoverProvider, game_id: &str) -> Option<Vec<u8>> {
    if game_id.chars().count() != 4 {
        tracing::debug!("Skipping cover lookup for malformed game id {:?}", game_id);
        return None;
    }

    for language in cover_language_candidates(game_id) {
        match provider.fetch(game_id, language) {
            Ok(Some(bytes)) => {
                tracing::info!("Found cover for {} in language {}", game_id, language);
                return Some(bytes);
            }
            Ok(None) => {
                tracing::debug!("No cover for {} in language {}", game_id, language);
            }
            Err(err) => {
                tracing::warn!("Cover lookup for {} in {} failed: {}", game_id, language, err);
            }
        }
    }

    tracing::info!("No cover found for {}", game_id);
    None
}

/// Fetches from `https://{host}/ds/coverS/{lang}/{game_id}.png`
pub struct HttpCoverProvider {
    agent: ureq::Agent,
    host: String,
}

impl HttpCoverProvider {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            host: host.into(),
        }
    }

    pub fn url(&self, game_id: &str, language: &str) -> String {
        format!(
            "https://{}/ds/coverS/{}/{}.png",
            self.host, language, game_id
        )
    }
}

impl Default for HttpCoverProvider {
    fn default() -> Self {
        Self::new(DEFAULT_COVER_HOST, DEFAULT_COVER_TIMEOUT)
    }
}

impl CoverProvider for HttpCoverProvider {
    fn fetch(&self, game_id: &str, language: &str) -> Result<Option<Vec<u8>>, CoverFetchError> {
        let url = self.url(game_id, language);

        // Existence check first so misses stay cheap
        match self.agent.head(&url).call() {
            Ok(_) => {}
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(err) => {
                return Err(CoverFetchError::Request {
                    url,
                    message: err.to_string(),
                })
            }
        }

        let response = match self.agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(err) => {
                return Err(CoverFetchError::Request {
                    url,
                    message: err.to_string(),
                })
            }
        };

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_COVER_SIZE)
            .read_to_end(&mut bytes)
            .map_err(|source| CoverFetchError::Body {
                url: url.clone(),
                source,
            })?;

        Ok(Some(bytes))
    }
}
