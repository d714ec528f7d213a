//! Durable key-value storage backends

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// String key-value store for different storage backends
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

type Entries = BTreeMap<String, String>;

/// TOML-file backed store.
///
/// The file is read on first access and cached; every mutation rewrites it
/// before returning.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Option<Entries>>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Entries>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_file(&self) -> Entries {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Entries::new(),
        };
        match toml::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable credentials file {}: {}",
                    self.path.display(),
                    e
                );
                Entries::new()
            }
        }
    }

    fn write_file(&self, entries: &Entries) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("Failed to create credentials directory")?;
        }

        let content = toml::to_string_pretty(entries).context("Failed to serialize credentials")?;
        fs::write(&self.path, content).context("Failed to write credentials file")?;

        // Set restrictive permissions on credentials file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms)
                .context("Failed to set credentials permissions")?;
        }

        Ok(())
    }

    fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Entries) -> bool,
    {
        let mut guard = self.lock();
        let mut next = guard.get_or_insert_with(|| self.read_file()).clone();
        if mutate(&mut next) {
            // The cache only changes once the file does.
            self.write_file(&next)?;
            *guard = Some(next);
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let mut guard = self.lock();
        guard
            .get_or_insert_with(|| self.read_file())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some())
    }
}

/// In-process store, lost on exit.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
