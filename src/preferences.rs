//! Local key-value storage for small client-side values.
//!
//! The device identifier, the persisted session and the UI preferences (view
//! mode, sort field/order, form-collapsed flag) are kept behind the
//! `PreferenceStore` trait so callers inject the storage instead of reaching
//! for ambient globals. Losing a preference never affects correctness.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{VaultError, VaultResult};
use crate::search::{SortField, SortOrder};
use crate::views::ViewMode;

pub const VIEW_MODE_KEY: &str = "view_mode";
pub const SORT_FIELD_KEY: &str = "sort_field";
pub const SORT_ORDER_KEY: &str = "sort_order";
pub const FORM_COLLAPSED_KEY: &str = "form_collapsed";

/// Persistent string key-value storage.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> VaultResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> VaultResult<()>;

    fn remove(&self, key: &str) -> VaultResult<()>;
}

fn poisoned() -> VaultError {
    VaultError::Other("preference store lock poisoned".to_string())
}

/// Preferences stored as a flat JSON object on disk.
///
/// Every write rewrites the whole file.
pub struct FilePreferenceStore {
    path: PathBuf,
    data: Mutex<BTreeMap<String, String>>,
}

impl FilePreferenceStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A corrupt file is treated as empty; it is replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> VaultResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable preferences file");
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, data: &BTreeMap<String, String>) -> VaultResult<()> {
        let content = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        let data = self.data.lock().map_err(|_| poisoned())?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        let mut data = self.data.lock().map_err(|_| poisoned())?;
        data.insert(key.to_string(), value.to_string());
        self.save(&data)
    }

    fn remove(&self, key: &str) -> VaultResult<()> {
        let mut data = self.data.lock().map_err(|_| poisoned())?;
        if data.remove(key).is_some() {
            self.save(&data)?;
        }
        Ok(())
    }
}

/// In-process preferences, lost when dropped.
///
/// Can be switched to "unavailable" to simulate storage that cannot be read
/// or written.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    data: Mutex<BTreeMap<String, String>>,
    unavailable: Mutex<bool>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        if let Ok(mut flag) = self.unavailable.lock() {
            *flag = !available;
        }
    }

    fn check_available(&self) -> VaultResult<()> {
        let unavailable = *self.unavailable.lock().map_err(|_| poisoned())?;
        if unavailable {
            return Err(VaultError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "preference storage unavailable",
            )));
        }
        Ok(())
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        self.check_available()?;
        let data = self.data.lock().map_err(|_| poisoned())?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        self.check_available()?;
        let mut data = self.data.lock().map_err(|_| poisoned())?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> VaultResult<()> {
        self.check_available()?;
        let mut data = self.data.lock().map_err(|_| poisoned())?;
        data.remove(key);
        Ok(())
    }
}

/// Display preferences for the idea list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewPreferences {
    pub view_mode: ViewMode,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub form_collapsed: bool,
}

impl ViewPreferences {
    /// Load preferences, falling back to the default for anything missing,
    /// unreadable or unparsable.
    pub fn load(store: &dyn PreferenceStore) -> Self {
        let read = |key: &str| match store.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(key, error = %e, "Preference unavailable, using default");
                None
            }
        };

        let defaults = Self::default();
        Self {
            view_mode: read(VIEW_MODE_KEY)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.view_mode),
            sort_field: read(SORT_FIELD_KEY)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sort_field),
            sort_order: read(SORT_ORDER_KEY)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sort_order),
            form_collapsed: read(FORM_COLLAPSED_KEY)
                .map(|v| v == "true")
                .unwrap_or(defaults.form_collapsed),
        }
    }

    pub fn save(&self, store: &dyn PreferenceStore) -> VaultResult<()> {
        store.set(VIEW_MODE_KEY, self.view_mode.as_str())?;
        store.set(SORT_FIELD_KEY, self.sort_field.as_str())?;
        store.set(SORT_ORDER_KEY, self.sort_order.as_str())?;
        store.set(
            FORM_COLLAPSED_KEY,
            if self.form_collapsed { "true" } else { "false" },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("preferences.json");

        {
            let store = FilePreferenceStore::open(&path).unwrap();
            store.set("color", "blue").unwrap();
        }

        {
            let store = FilePreferenceStore::open(&path).unwrap();
            assert_eq!(store.get("color").unwrap(), Some("blue".to_string()));
            store.remove("color").unwrap();
        }

        let store = FilePreferenceStore::open(&path).unwrap();
        assert!(store.get("color").unwrap().is_none());
    }

    #[test]
    fn test_file_store_corrupt_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("preferences.json");
        fs::write(&path, "{not json").unwrap();

        let store = FilePreferenceStore::open(&path).unwrap();
        assert!(store.get("anything").unwrap().is_none());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_memory_store_unavailable() {
        let store = MemoryPreferenceStore::new();
        store.set("k", "v").unwrap();
        store.set_available(false);
        assert!(store.get("k").is_err());
        assert!(store.set("k", "w").is_err());
        store.set_available(true);
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_view_preferences_defaults() {
        let store = MemoryPreferenceStore::new();
        let prefs = ViewPreferences::load(&store);
        assert_eq!(prefs.view_mode, ViewMode::Grid);
        assert_eq!(prefs.sort_field, SortField::CreatedAt);
        assert_eq!(prefs.sort_order, SortOrder::Desc);
        assert!(!prefs.form_collapsed);
    }

    #[test]
    fn test_view_preferences_roundtrip() {
        let store = MemoryPreferenceStore::new();
        let prefs = ViewPreferences {
            view_mode: ViewMode::Table,
            sort_field: SortField::Title,
            sort_order: SortOrder::Asc,
            form_collapsed: true,
        };
        prefs.save(&store).unwrap();
        assert_eq!(ViewPreferences::load(&store), prefs);
    }

    #[test]
    fn test_view_preferences_garbage_falls_back() {
        let store = MemoryPreferenceStore::new();
        store.set(VIEW_MODE_KEY, "carousel").unwrap();
        store.set(SORT_ORDER_KEY, "sideways").unwrap();
        let prefs = ViewPreferences::load(&store);
        assert_eq!(prefs.view_mode, ViewMode::Grid);
        assert_eq!(prefs.sort_order, SortOrder::Desc);
    }

    #[test]
    fn test_view_preferences_unavailable_store() {
        let store = MemoryPreferenceStore::new();
        store.set_available(false);
        assert_eq!(ViewPreferences::load(&store), ViewPreferences::default());
    }
}
