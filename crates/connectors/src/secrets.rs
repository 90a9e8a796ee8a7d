use std::collections::BTreeMap;
use std::sync::Mutex;

/// SecretStore resolves declared secret names to values. Discovery only
/// ever calls `has`; `get` is called by the executor when a run starts,
/// and resolved values are never logged or surfaced in results.
pub trait SecretStore: Send + Sync {
    fn has(&self, name: &str) -> bool;
    fn get(&self, name: &str) -> Option<String>;
}

/// In-process secret store, used by tests and by embedders that load
/// secrets from their own configuration layer.
#[derive(Default)]
pub struct InMemorySecrets(Mutex<BTreeMap<String, String>>);

impl InMemorySecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        self.0.lock().unwrap().insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) {
        self.0.lock().unwrap().remove(name);
    }
}

impl<const N: usize> From<[(&str, &str); N]> for InMemorySecrets {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let store = Self::new();
        for (name, value) in pairs {
            store.insert(name, value);
        }
        store
    }
}

impl SecretStore for InMemorySecrets {
    fn has(&self, name: &str) -> bool {
        self.0.lock().unwrap().contains_key(name)
    }

    fn get(&self, name: &str) -> Option<String> {
        self.0.lock().unwrap().get(name).cloned()
    }
}
