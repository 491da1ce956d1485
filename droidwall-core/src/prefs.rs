//! Persisted key-value state.
//!
//! Reads go straight to the store; writes are staged in a
//! [`PreferenceEditor`] and applied together by [`PreferenceStore::commit`],
//! so a failed operation can drop its editor and leave state untouched.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use droidwall_config::constants::prefs;
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::Builder;
use tracing::debug;

use crate::error::PreferenceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    String(String),
}

/// Staged preference changes. `None` removes the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceEditor {
    changes: BTreeMap<String, Option<PreferenceValue>>,
}

impl PreferenceEditor {
    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.changes
            .insert(key.into(), Some(PreferenceValue::String(value.into())));
        self
    }

    pub fn put_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.changes
            .insert(key.into(), Some(PreferenceValue::Bool(value)));
        self
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.changes.insert(key.into(), None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    fn apply_to(self, values: &mut BTreeMap<String, PreferenceValue>) {
        for (key, change) in self.changes {
            match change {
                Some(value) => {
                    values.insert(key, value);
                }
                None => {
                    values.remove(&key);
                }
            }
        }
    }
}

pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<PreferenceValue>;

    fn commit(&self, editor: PreferenceEditor) -> Result<(), PreferenceError>;

    fn edit(&self) -> PreferenceEditor {
        PreferenceEditor::default()
    }

    /// String value, or `None` when missing or stored as a bool.
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(PreferenceValue::String(value)) => Some(value),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(PreferenceValue::Bool(value)) => Some(value),
            Some(PreferenceValue::String(value)) => value.trim().parse().ok(),
            None => None,
        }
    }
}

/// In-memory store used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<BTreeMap<String, PreferenceValue>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<PreferenceValue> {
        self.values.read().get(key).cloned()
    }

    fn commit(&self, editor: PreferenceEditor) -> Result<(), PreferenceError> {
        editor.apply_to(&mut self.values.write());
        Ok(())
    }
}

/// Store backed by a JSON object on disk.
///
/// Commits hold an exclusive lock on `<file>.lock` and replace the file
/// atomically.
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    values: RwLock<BTreeMap<String, PreferenceValue>>,
}

impl JsonFilePreferences {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PreferenceError> {
        let path = path.into();
        let values = read_values(&path)?;
        debug!(path = %path.display(), keys = values.len(), "preferences loaded");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn commit_error(&self, source: std::io::Error) -> PreferenceError {
        PreferenceError::Commit {
            path: self.path.clone(),
            source,
        }
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Option<PreferenceValue> {
        self.values.read().get(key).cloned()
    }

    fn commit(&self, editor: PreferenceEditor) -> Result<(), PreferenceError> {
        if editor.is_empty() {
            return Ok(());
        }

        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|source| self.commit_error(source))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|source| self.commit_error(source))?;
        lock.lock_exclusive()
            .map_err(|source| self.commit_error(source))?;

        // Merge onto what is on disk so concurrent writers do not clobber
        // each other's keys.
        let mut merged = read_values(&self.path)?;
        let changes = editor.len();
        editor.apply_to(&mut merged);

        let encoded = serde_json::to_vec_pretty(&merged).map_err(PreferenceError::Encode)?;
        let written = write_atomic(parent, &self.path, &encoded);
        let unlocked = FileExt::unlock(&lock);
        written.map_err(|source| self.commit_error(source))?;
        unlocked.map_err(|source| self.commit_error(source))?;

        debug!(path = %self.path.display(), changes, "preferences committed");
        *self.values.write() = merged;
        Ok(())
    }
}

fn read_values(path: &Path) -> Result<BTreeMap<String, PreferenceValue>, PreferenceError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(PreferenceError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&contents).map_err(|source| PreferenceError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomic(dir: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut temp_file = Builder::new().prefix(".prefs").tempfile_in(dir)?;
    temp_file.write_all(contents)?;
    temp_file.as_file_mut().sync_all()?;
    let file: File = temp_file.persist(path).map_err(|error| error.error)?;
    drop(file);
    Ok(())
}

/// Parse a persisted id list such as `"10001|10005|-10"`.
///
/// Malformed tokens are skipped.
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(prefs::ID_LIST_SEPARATOR)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| match token.parse::<i64>() {
            Ok(id) => Some(id),
            Err(err) => {
                debug!(token, error = %err, "skipping malformed id in persisted list");
                None
            }
        })
        .collect()
}

pub fn format_id_list<I>(ids: I) -> String
where
    I: IntoIterator<Item = i64>,
{
    ids.into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(&prefs::ID_LIST_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;

    #[test]
    fn parse_skips_malformed_tokens() {
        assert_eq!(parse_id_list("10001|abc||-10| 42 "), vec![10001, -10, 42]);
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn format_joins_with_pipe() {
        assert_eq!(format_id_list([1000, -11, 10005]), "1000|-11|10005");
        assert_eq!(format_id_list(Vec::new()), "");
    }

    #[test]
    fn memory_store_applies_staged_changes_on_commit() -> Result<(), PreferenceError> {
        let store = MemoryPreferences::new();
        let mut editor = store.edit();
        editor.put_bool("Enabled", true).put_string("BlockMode", "blacklist");
        assert_eq!(store.get_bool("Enabled"), None);

        store.commit(editor)?;
        assert_eq!(store.get_bool("Enabled"), Some(true));
        assert_eq!(store.get_string("BlockMode").as_deref(), Some("blacklist"));

        let mut editor = store.edit();
        editor.remove("BlockMode");
        store.commit(editor)?;
        assert_eq!(store.get_string("BlockMode"), None);
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[test]
    fn file_store_round_trips_and_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("state").join("prefs.json");

        let store = JsonFilePreferences::open(&path)?;
        assert_eq!(store.get_bool("Enabled"), None);

        let mut editor = store.edit();
        editor
            .put_bool("Enabled", true)
            .put_string("AllowedUidsWifi", "10001|10002");
        store.commit(editor)?;

        let reopened = JsonFilePreferences::open(&path)?;
        assert_eq!(reopened.get_bool("Enabled"), Some(true));
        assert_eq!(
            reopened.get_string("AllowedUidsWifi").as_deref(),
            Some("10001|10002")
        );
        Ok(())
    }

    #[test]
    fn file_store_merges_concurrent_writers() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("prefs.json");
        let first = JsonFilePreferences::open(&path)?;
        let second = JsonFilePreferences::open(&path)?;

        let mut editor = first.edit();
        editor.put_string("cache.label.com.example", "Example");
        first.commit(editor)?;

        let mut editor = second.edit();
        editor.put_bool("LogEnabled", true);
        second.commit(editor)?;

        let reopened = JsonFilePreferences::open(&path)?;
        assert_eq!(
            reopened.get_string("cache.label.com.example").as_deref(),
            Some("Example")
        );
        assert_eq!(reopened.get_bool("LogEnabled"), Some(true));
        Ok(())
    }

    #[test]
    fn corrupt_file_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{not json")?;
        assert!(matches!(
            JsonFilePreferences::open(&path),
            Err(PreferenceError::Corrupt { .. })
        ));
        Ok(())
    }
}
