//! Source - the selected loop a pipeline plays

use serde::{Deserialize, Serialize};

/// A playable source resolved from the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    /// Media locator handed to the player
    pub url: String,
    /// Pack display name
    pub pack: String,
    /// Sound display name
    pub sound: String,
    /// Sound category (beat, bass, lead, ...)
    #[serde(default)]
    pub sound_type: String,
}

impl SourceDescriptor {
    /// Source from a bare media locator
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let sound = url
            .rsplit('/')
            .next()
            .map(|s| s.trim_end_matches(".mp3").to_string())
            .unwrap_or_default();
        Self {
            url,
            pack: String::new(),
            sound,
            sound_type: String::new(),
        }
    }

    /// Name shown in the status line
    pub fn display_name(&self) -> &str {
        &self.sound
    }
}
