//! Source catalog - packs of loop sounds and their media locators

use crate::audio::SourceDescriptor;
use crate::config::AppConfig;
use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default media host for catalog sounds
pub const DEFAULT_MEDIA_BASE_URL: &str = "https://curriculum.code.org/media/musiclab";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sound {
    pub name: String,
    #[serde(rename = "type", default)]
    pub sound_type: String,
    #[serde(default)]
    pub path: String,
    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pack {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub sounds: Vec<Sound>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Library folder under the media base
    pub path: String,
    #[serde(default)]
    pub packs: Vec<Pack>,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a catalog file. `~` and environment variables are expanded.
    pub fn load(path: &str) -> Result<Self, CatalogError> {
        let expanded = shellexpand::full(path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| path.to_string());
        let content = std::fs::read_to_string(Path::new(&expanded))?;
        let catalog = Self::from_json(&content)?;
        tracing::info!(
            "[Catalog] Loaded {} pack(s) from {:?}",
            catalog.packs.len(),
            expanded
        );
        Ok(catalog)
    }

    /// Load the catalog named by `catalog_path` in the config. With no
    /// path configured the catalog is empty.
    pub fn from_config(config: &AppConfig) -> Result<Self, CatalogError> {
        match config.expanded_catalog_path() {
            Some(path) => Self::load(&path),
            None => {
                tracing::info!("[Catalog] No catalog configured, starting empty");
                Ok(Self::default())
            }
        }
    }

    pub fn pack(&self, index: usize) -> Option<&Pack> {
        self.packs.get(index)
    }

    pub fn sound(&self, pack: usize, sound: usize) -> Option<&Sound> {
        self.pack(pack)?.sounds.get(sound)
    }

    /// Media locator of one sound
    pub fn media_url(&self, pack: &Pack, sound: &Sound, base_url: &str) -> String {
        let segments = [
            base_url.trim_end_matches('/'),
            self.path.as_str(),
            pack.path.as_str(),
            sound.path.as_str(),
        ];
        let prefix = segments
            .iter()
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}.mp3", prefix, sound.src)
    }

    /// Resolve a (pack, sound) selection. Out-of-range indices give `None`.
    pub fn resolve(&self, pack: usize, sound: usize, base_url: &str) -> Option<SourceDescriptor> {
        let pack_entry = self.pack(pack)?;
        let sound_entry = pack_entry.sounds.get(sound)?;
        Some(SourceDescriptor {
            url: self.media_url(pack_entry, sound_entry, base_url),
            pack: pack_entry.name.clone(),
            sound: sound_entry.name.clone(),
            sound_type: sound_entry.sound_type.clone(),
        })
    }
}
