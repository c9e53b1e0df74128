//! Stable, small-integer ids for worksheets.
//!
//! Hosts identify sheets with volatile GUID-like strings that change across sessions and are
//! unwieldy in reports. `StableIdMapper` assigns each one a positive integer in first-seen order
//! and persists the mapping in the document's settings area, so the same sheet keeps its number
//! for the life of the document.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// Settings key holding the `guid → id` map.
pub const MAP_KEY: &str = "gridlock-sheet-id-map";
/// Settings key holding the last assigned id.
pub const COUNTER_KEY: &str = "gridlock-sheet-id-counter";

/// Failure reading or persisting document settings.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("settings record '{0}' has an unexpected shape")]
    Corrupt(&'static str),
    #[error("settings store rejected the write: {0}")]
    Rejected(String),
    #[error("no sheet ids left to assign after {0}")]
    Exhausted(u32),
}

/// A document-scoped key/value settings area.
///
/// Reads come from a local cache; `refresh` reloads the cache from the backing storage and
/// `save` writes all pending values back.
pub trait SettingsStore {
    fn refresh(&mut self) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Option<JsonValue>;

    fn set(&mut self, key: &str, value: JsonValue);

    fn save(&mut self) -> Result<(), StoreError>;
}

impl<S: SettingsStore + ?Sized> SettingsStore for Box<S> {
    fn refresh(&mut self) -> Result<(), StoreError> {
        (**self).refresh()
    }

    fn get(&self, key: &str) -> Option<JsonValue> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: JsonValue) {
        (**self).set(key, value);
    }

    fn save(&mut self) -> Result<(), StoreError> {
        (**self).save()
    }
}

/// Settings kept in memory; `save` and `refresh` always succeed.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: IndexMap<String, JsonValue>,
    saves: usize,
}

impl MemorySettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed `save` calls.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl SettingsStore for MemorySettings {
    fn refresh(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn get(&self, key: &str) -> Option<JsonValue> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: JsonValue) {
        self.values.insert(key.to_owned(), value);
    }

    fn save(&mut self) -> Result<(), StoreError> {
        self.saves += 1;
        Ok(())
    }
}

/// Settings persisted as one JSON object in a file.
///
/// `save` writes to a sibling temp file and renames it over the target, so a crash never leaves
/// a half-written settings file. A missing file reads as empty settings.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
    values: serde_json::Map<String, JsonValue>,
}

impl FileSettings {
    /// Opens the settings file at `path`, loading its current contents.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut settings = Self {
            path: path.into(),
            values: serde_json::Map::new(),
        };
        settings.refresh()?;
        Ok(settings)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettings {
    fn refresh(&mut self) -> Result<(), StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.values.clear();
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str(&text)? {
            JsonValue::Object(values) => {
                self.values = values;
                Ok(())
            }
            _ => Err(StoreError::Corrupt("<root>")),
        }
    }

    fn get(&self, key: &str) -> Option<JsonValue> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: JsonValue) {
        self.values.insert(key.to_owned(), value);
    }

    fn save(&mut self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec_pretty(&self.values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Maps volatile sheet ids to persisted small integers.
///
/// The mapping is loaded once in `open` and cached; every assignment is persisted before the
/// new id is returned. Ids are never reassigned or reused except through `clear`.
#[derive(Debug)]
pub struct StableIdMapper<S: SettingsStore> {
    store: S,
    map: IndexMap<String, u32>,
    counter: u32,
    dirty: bool,
}

impl<S: SettingsStore> StableIdMapper<S> {
    /// Refreshes `store` and loads the current mapping from it.
    pub fn open(mut store: S) -> Result<Self, StoreError> {
        store.refresh()?;
        let map: IndexMap<String, u32> = match store.get(MAP_KEY) {
            None | Some(JsonValue::Null) => IndexMap::new(),
            Some(JsonValue::Object(entries)) => entries
                .into_iter()
                .map(|(guid, id)| {
                    let id = id
                        .as_u64()
                        .and_then(|id| u32::try_from(id).ok())
                        .filter(|id| *id > 0)
                        .ok_or(StoreError::Corrupt(MAP_KEY))?;
                    Ok((guid, id))
                })
                .collect::<Result<_, StoreError>>()?,
            Some(_) => return Err(StoreError::Corrupt(MAP_KEY)),
        };
        let stored_counter = match store.get(COUNTER_KEY) {
            None | Some(JsonValue::Null) => 0,
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(StoreError::Corrupt(COUNTER_KEY))?,
        };
        // the counter never trails the largest assigned id
        let counter = map.values().copied().max().unwrap_or(0).max(stored_counter);
        tracing::debug!(sheets = map.len(), counter, "loaded sheet id map");
        Ok(Self {
            store,
            map,
            counter,
            dirty: false,
        })
    }

    /// Returns the id of `guid`, assigning and persisting the next one if it has none.
    ///
    /// If persisting fails, the assignment is undone and the error returned.
    pub fn get_or_assign(&mut self, guid: &str) -> Result<u32, StoreError> {
        if let Some(id) = self.map.get(guid) {
            return Ok(*id);
        }
        let previous = self.counter;
        let id = self.next_id()?;
        self.map.insert(guid.to_owned(), id);
        self.dirty = true;
        if let Err(err) = self.persist() {
            self.map.shift_remove(guid);
            self.counter = previous;
            return Err(err);
        }
        tracing::debug!(guid, id, "assigned stable sheet id");
        Ok(id)
    }

    /// Resolves many guids at once, persisting once if any new id was assigned.
    ///
    /// A persistence failure or running out of ids rolls back every assignment made by this call.
    pub fn batch_resolve<'g>(
        &mut self,
        guids: impl IntoIterator<Item = &'g str>,
    ) -> Result<IndexMap<String, u32>, StoreError> {
        let (saved_len, saved_counter) = (self.map.len(), self.counter);
        let mut resolved = IndexMap::new();
        for guid in guids {
            let id = match self.map.get(guid) {
                Some(id) => *id,
                None => match self.next_id() {
                    Ok(id) => {
                        self.map.insert(guid.to_owned(), id);
                        id
                    }
                    Err(err) => {
                        self.map.truncate(saved_len);
                        self.counter = saved_counter;
                        return Err(err);
                    }
                },
            };
            resolved.insert(guid.to_owned(), id);
        }
        if self.map.len() > saved_len {
            self.dirty = true;
            if let Err(err) = self.persist() {
                self.map.truncate(saved_len);
                self.counter = saved_counter;
                return Err(err);
            }
            tracing::debug!(assigned = self.map.len() - saved_len, "assigned stable sheet ids");
        }
        Ok(resolved)
    }

    /// The id of `guid`, without assigning one.
    #[must_use]
    pub fn get_existing(&self, guid: &str) -> Option<u32> {
        self.map.get(guid).copied()
    }

    /// A copy of the full mapping in assignment order.
    #[must_use]
    pub fn all(&self) -> IndexMap<String, u32> {
        self.map.clone()
    }

    /// Forgets every mapping and restarts numbering at 1.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.map.clear();
        self.counter = 0;
        self.dirty = true;
        self.persist()
    }

    /// Persists pending changes and returns the store.
    pub fn close(mut self) -> Result<S, StoreError> {
        self.persist()?;
        Ok(self.store)
    }

    fn next_id(&mut self) -> Result<u32, StoreError> {
        let id = self.counter.checked_add(1).ok_or(StoreError::Exhausted(self.counter))?;
        self.counter = id;
        Ok(id)
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        let map: serde_json::Map<String, JsonValue> =
            self.map.iter().map(|(guid, id)| (guid.clone(), JsonValue::from(*id))).collect();
        self.store.set(MAP_KEY, JsonValue::Object(map));
        self.store.set(COUNTER_KEY, JsonValue::from(self.counter));
        self.store.save()?;
        self.dirty = false;
        Ok(())
    }
}
