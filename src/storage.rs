use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Flat-file JSON storage. Each named store round-trips a whole collection
/// through `<data_dir>/<name>.json`; every save rewrites the file.
#[derive(Clone)]
pub struct Storage {
    data_dir: Arc<PathBuf>,
}

impl Storage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Arc::new(data_dir.into()),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.json"))
    }

    /// Loads a store, falling back to the default on a missing or corrupt
    /// file. The fallback is persisted immediately so the file exists from
    /// then on.
    pub fn load_or_default<T>(&self, name: &str) -> anyhow::Result<T>
    where
        T: Default + Serialize + DeserializeOwned,
    {
        match fs::read(self.path(name)) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(value),
                Err(err) => {
                    tracing::warn!("store {name} is corrupt ({err}), resetting to empty");
                    let value = T::default();
                    self.save(name, &value)?;
                    Ok(value)
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let value = T::default();
                self.save(name, &value)?;
                Ok(value)
            }
            Err(err) => Err(err).with_context(|| format!("reading store {name}")),
        }
    }

    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        fs::create_dir_all(self.data_dir.as_ref())
            .with_context(|| format!("creating data dir {}", self.data_dir.display()))?;
        let json = serde_json::to_vec_pretty(value)?;
        fs::write(self.path(name), json).with_context(|| format!("writing store {name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_store_initializes_empty_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());

        let loaded: Vec<String> = storage.load_or_default("groups").unwrap();
        assert!(loaded.is_empty());
        assert!(dir.path().join("groups.json").exists());
    }

    #[test]
    fn corrupt_store_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("trades.json"), b"{not json").unwrap();

        let storage = Storage::new(dir.path());
        let loaded: Vec<u64> = storage.load_or_default("trades").unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());

        let before = vec!["alex".to_owned(), "bob".to_owned()];
        storage.save("members", &before).unwrap();
        let after: Vec<String> = storage.load_or_default("members").unwrap();
        assert_eq!(before, after);
    }
}
