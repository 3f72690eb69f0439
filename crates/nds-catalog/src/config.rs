use crate::{
    cover_art::{HttpCoverProvider, DEFAULT_COVER_HOST, DEFAULT_COVER_TIMEOUT},
    persistence::DecodeContext,
    store::ArtifactStore,
};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;
use std::{
    fs::{create_dir_all, File},
    ops::Deref,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};

pub static STORAGE_DIRECTORY: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nds-catalog")
});

pub static CONFIG_LOCATION: LazyLock<PathBuf> =
    LazyLock::new(|| STORAGE_DIRECTORY.join("config.ron"));

#[serde_inline_default]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Root of the `roms/` and `covers/` trees
    #[serde_inline_default(STORAGE_DIRECTORY.join("store"))]
    pub store_root: PathBuf,
    #[serde_inline_default(STORAGE_DIRECTORY.join("catalog.ron"))]
    pub catalog_file: PathBuf,
    /// Prefix older flat catalogs used for hosted files, also used when exporting
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde_inline_default(DEFAULT_COVER_HOST.to_string())]
    pub cover_cdn_host: String,
    #[serde_inline_default(DEFAULT_COVER_TIMEOUT.as_secs())]
    pub cover_timeout_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            store_root: STORAGE_DIRECTORY.join("store"),
            catalog_file: STORAGE_DIRECTORY.join("catalog.ron"),
            base_url: None,
            cover_cdn_host: DEFAULT_COVER_HOST.to_string(),
            cover_timeout_secs: DEFAULT_COVER_TIMEOUT.as_secs(),
        }
    }
}

impl GlobalConfig {
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(CONFIG_LOCATION.deref())
    }

    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from(CONFIG_LOCATION.deref())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let config_file = File::create(path)?;
        ron::ser::to_writer_pretty(config_file, self, PrettyConfig::default())?;

        Ok(())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let config_file = File::open(path)?;
        let config = ron::de::from_reader(config_file)?;

        Ok(config)
    }

    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.store_root)
    }

    pub fn decode_context(&self) -> DecodeContext {
        DecodeContext {
            base_url: self.base_url.clone(),
        }
    }

    pub fn cover_provider(&self) -> HttpCoverProvider {
        HttpCoverProvider::new(
            &self.cover_cdn_host,
            Duration::from_secs(self.cover_timeout_secs),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: GlobalConfig =
            ron::from_str("(base_url: Some(\"https://example.com\"))").unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://example.com"));
        assert_eq!(config.cover_cdn_host, DEFAULT_COVER_HOST);
        assert_eq!(config.catalog_file, GlobalConfig::default().catalog_file);
    }

    #[test]
    fn save_then_load() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("nested").join("config.ron");
        let config = GlobalConfig {
            store_root: directory.path().join("store"),
            cover_timeout_secs: 1,
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(GlobalConfig::load_from(&path).unwrap(), config);
    }
}
