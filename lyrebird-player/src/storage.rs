//! Preset persistence
//!
//! Named prompt/config snapshots behind an injected store trait, so the
//! engine and API never touch the persistence mechanism directly. The
//! file-backed store writes one JSON document per preset under the data
//! directory; the in-memory store backs tests.

use crate::error::{Error, Result};
use crate::session::{GenerationConfig, WeightedPrompt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

/// A saved prompt mix and generation config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub prompts: Vec<WeightedPrompt>,
    pub config: GenerationConfig,
}

/// Key-value preset storage.
pub trait PresetStore: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<Preset>>;
    fn save(&self, name: &str, preset: &Preset) -> Result<()>;
    fn list(&self) -> Result<Vec<String>>;
    fn delete(&self, name: &str) -> Result<()>;
}

/// One JSON file per preset under the data directory.
pub struct FilePresetStore {
    dir: PathBuf,
}

impl FilePresetStore {
    /// Open a store rooted at `dir`, creating it if missing.
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        info!("preset store at {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::InvalidInput(format!(
                "preset name must be non-empty alphanumeric/dash/underscore: {:?}",
                name
            )));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }
}

impl PresetStore for FilePresetStore {
    fn load(&self, name: &str) -> Result<Option<Preset>> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)?;
        let preset = serde_json::from_str(&contents)
            .map_err(|e| Error::Storage(format!("malformed preset {:?}: {}", name, e)))?;
        Ok(Some(preset))
    }

    fn save(&self, name: &str, preset: &Preset) -> Result<()> {
        let path = self.path_for(name)?;
        let contents = serde_json::to_string_pretty(preset)
            .map_err(|e| Error::Storage(format!("failed to serialize preset: {}", e)))?;
        std::fs::write(&path, contents)?;

        debug!("saved preset {:?}", name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(Error::NotFound(format!("preset {:?}", name)));
        }
        std::fs::remove_file(&path)?;

        debug!("deleted preset {:?}", name);
        Ok(())
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryPresetStore {
    presets: Mutex<HashMap<String, Preset>>,
}

impl MemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresetStore for MemoryPresetStore {
    fn load(&self, name: &str) -> Result<Option<Preset>> {
        Ok(self.presets.lock().unwrap().get(name).cloned())
    }

    fn save(&self, name: &str, preset: &Preset) -> Result<()> {
        self.presets
            .lock()
            .unwrap()
            .insert(name.to_string(), preset.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.presets.lock().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<()> {
        match self.presets.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("preset {:?}", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_preset() -> Preset {
        Preset {
            prompts: vec![WeightedPrompt {
                text: "warm analog synth".to_string(),
                weight: 1.0,
            }],
            config: GenerationConfig {
                bpm: Some(100),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FilePresetStore::new(dir.path().to_path_buf()).unwrap();

        store.save("evening", &sample_preset()).unwrap();
        let loaded = store.load("evening").unwrap().unwrap();
        assert_eq!(loaded, sample_preset());
    }

    #[test]
    fn test_file_store_missing_preset_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FilePresetStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.load("nothing").unwrap().is_none());
    }

    #[test]
    fn test_file_store_rejects_path_traversal_names() {
        let dir = TempDir::new().unwrap();
        let store = FilePresetStore::new(dir.path().to_path_buf()).unwrap();

        assert!(store.save("../escape", &sample_preset()).is_err());
        assert!(store.save("", &sample_preset()).is_err());
        assert!(store.save("with space", &sample_preset()).is_err());
    }

    #[test]
    fn test_file_store_list_sorted() {
        let dir = TempDir::new().unwrap();
        let store = FilePresetStore::new(dir.path().to_path_buf()).unwrap();

        store.save("b", &sample_preset()).unwrap();
        store.save("a", &sample_preset()).unwrap();
        assert_eq!(store.list().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_file_store_delete() {
        let dir = TempDir::new().unwrap();
        let store = FilePresetStore::new(dir.path().to_path_buf()).unwrap();

        store.save("gone", &sample_preset()).unwrap();
        store.delete("gone").unwrap();
        assert!(store.load("gone").unwrap().is_none());
        assert!(store.delete("gone").is_err());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryPresetStore::new();
        store.save("x", &sample_preset()).unwrap();
        assert_eq!(store.load("x").unwrap().unwrap(), sample_preset());
        assert_eq!(store.list().unwrap(), vec!["x"]);
        store.delete("x").unwrap();
        assert!(store.load("x").unwrap().is_none());
    }
}
