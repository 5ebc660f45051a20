use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::models::{CoreError, CoreErrorKind};
use crate::persistence::{PersistenceResult, SettingsStore};

#[derive(Default)]
pub struct InMemorySettingsStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: Mutex::new(
                values
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }

    fn lock_values(&self) -> PersistenceResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.values.lock().map_err(|_| CoreError {
            operation: None,
            kind: CoreErrorKind::Internal,
            message: "settings store mutex poisoned".to_string(),
        })
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn get(&self, key: &str) -> PersistenceResult<Option<String>> {
        Ok(self.lock_values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PersistenceResult<()> {
        if key.is_empty() {
            return Err(CoreError::new(
                None,
                CoreErrorKind::InvalidInput,
                "settings key must not be empty",
            ));
        }
        self.lock_values()?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PersistenceResult<()> {
        self.lock_values()?.remove(key);
        Ok(())
    }

    fn list(&self) -> PersistenceResult<Vec<(String, String)>> {
        Ok(self
            .lock_values()?
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
