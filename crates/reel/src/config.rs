use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Persisted player configuration (`<config dir>/reel/player.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Initial loop flag for newly opened clips.
    #[serde(default)]
    pub looping: bool,
    /// Where playback restarts when a looping clip runs out.
    #[serde(default = "default_loop_restart_secs")]
    pub loop_restart_secs: f64,
    /// Extra roots the file locator searches, in order.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    /// Decoder worker threads; 0 leaves the choice to the backend.
    #[serde(default)]
    pub decoder_threads: usize,
}

fn default_version() -> u32 { 1 }
fn default_loop_restart_secs() -> f64 { 2.0 }

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            looping: false,
            loop_restart_secs: 2.0,
            search_paths: Vec::new(),
            decoder_threads: 0,
        }
    }
}

impl PlayerConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("reel").join("player.json"))
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`; a missing or malformed file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        if let Some(path) = Self::default_path() {
            if let Err(e) = self.save_to(&path) {
                log::warn!("Failed to save config {}: {e}", path.display());
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PlayerConfig::default();
        assert_eq!(c.version, 1);
        assert!(!c.looping);
        assert!((c.loop_restart_secs - 2.0).abs() < 1e-12);
        assert!(c.search_paths.is_empty());
        assert_eq!(c.decoder_threads, 0);
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let c: PlayerConfig = serde_json::from_str(r#"{"looping": true}"#).unwrap();
        assert!(c.looping);
        assert_eq!(c.version, 1);
        assert!((c.loop_restart_secs - 2.0).abs() < 1e-12);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("player.json");
        let mut c = PlayerConfig::default();
        c.loop_restart_secs = 0.0;
        c.search_paths.push(PathBuf::from("/media/clips"));
        c.save_to(&path).unwrap();

        let loaded = PlayerConfig::load_from(&path);
        assert_eq!(loaded.loop_restart_secs, 0.0);
        assert_eq!(loaded.search_paths, vec![PathBuf::from("/media/clips")]);
    }

    #[test]
    fn invalid_or_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        assert!(!PlayerConfig::load_from(&path).looping);
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(PlayerConfig::load_from(&path).version, 1);
    }
}
