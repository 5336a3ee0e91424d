use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::write_json_atomically;

/// User preferences stored as `preferences.json` in the library root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub general: GeneralPreferences,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralPreferences {
    /// Whether a single finger (or mouse drag) paints instead of navigating.
    pub touch_drawing: bool,
}

impl Default for GeneralPreferences {
    fn default() -> Self {
        Self { touch_drawing: true }
    }
}

impl Preferences {
    /// Reads preferences, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("ignoring malformed {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                log::warn!("cannot read {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomically(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::TempDir;

    #[test]
    fn missing_fields_take_defaults() {
        let prefs: Preferences = serde_json::from_str(r#"{"general":{}}"#).unwrap();
        assert!(prefs.general.touch_drawing);
        let prefs: Preferences = serde_json::from_str("{}").unwrap();
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = TempDir::new("tessel-prefs");
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Preferences::load_or_default(&path), Preferences::default());
    }

    #[test]
    fn saved_preferences_load_back() {
        let dir = TempDir::new("tessel-prefs");
        let path = dir.path().join("preferences.json");
        let prefs = Preferences { general: GeneralPreferences { touch_drawing: false } };
        prefs.save(&path).unwrap();
        assert_eq!(Preferences::load_or_default(&path), prefs);
    }
}
