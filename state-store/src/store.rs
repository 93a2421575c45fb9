//! Typed, write-through record storage
//!
//! This module provides the core storage primitive:
//! - `StateStore`: one versioned record of typed properties, persisted through a `Backend`
//! - `Batch`: several writes applied and persisted as one

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::Backend;
use crate::error::{Result, StoreError};
use crate::property::Property;

/// On-disk shape of the record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    schema_version: u32,
    #[serde(default)]
    values: Map<String, Value>,
}

/// Writes to be committed together with [`StateStore::commit`]
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use state_store::{Batch, MemoryBackend, Property, StateStore};
///
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// struct Token(String);
/// impl Property for Token {
///     const KEY: &'static str = "token";
/// }
///
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// struct Delivered(bool);
/// impl Property for Delivered {
///     const KEY: &'static str = "delivered";
/// }
///
/// let store = StateStore::open(MemoryBackend::new(), 1).unwrap();
/// let mut batch = Batch::new();
/// batch.set(Token("t2".into())).unwrap().set(Delivered(false)).unwrap();
/// assert!(store.commit(batch).unwrap());
/// ```
#[derive(Debug, Default)]
pub struct Batch {
    writes: Vec<(&'static str, Option<Value>)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a property value
    pub fn set<P: Property>(&mut self, value: P) -> Result<&mut Self> {
        self.writes.push((P::KEY, Some(serde_json::to_value(&value)?)));
        Ok(self)
    }

    /// Queue removal of a property
    pub fn remove<P: Property>(&mut self) -> &mut Self {
        self.writes.push((P::KEY, None));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

struct Inner {
    document: Mutex<Document>,
    backend: Box<dyn Backend>,
}

/// Durable record of typed properties
///
/// Every mutation is applied and persisted under a single lock before the
/// call returns, so each `set`/`remove` is atomic, immediately durable and
/// observed by other threads in call order. There is no caching layer
/// between a write and the backend.
///
/// The handle is cheap to clone; clones share the same record.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use state_store::{MemoryBackend, Property, StateStore};
///
/// #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
/// struct RelayUrl(String);
/// impl Property for RelayUrl {
///     const KEY: &'static str = "relay_url";
/// }
///
/// let store = StateStore::open(MemoryBackend::new(), 1).unwrap();
/// assert!(store.set(RelayUrl("https://relay.example".into())).unwrap());
/// assert_eq!(store.get::<RelayUrl>(), Some(RelayUrl("https://relay.example".into())));
/// ```
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Inner>,
}

impl StateStore {
    /// Open the record persisted in `backend`
    ///
    /// A missing document yields an empty record at `schema_version`. A
    /// document from an older schema is stamped forward and re-persisted;
    /// one from a newer schema is refused so it is never silently truncated.
    pub fn open(backend: impl Backend, schema_version: u32) -> Result<Self> {
        let document = match backend.load()? {
            None => Document {
                schema_version,
                values: Map::new(),
            },
            Some(bytes) => {
                let mut document: Document = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;

                if document.schema_version > schema_version {
                    return Err(StoreError::UnsupportedSchema {
                        found: document.schema_version,
                        supported: schema_version,
                    });
                }

                if document.schema_version < schema_version {
                    tracing::info!(
                        "Migrating state document from schema {} to {}",
                        document.schema_version,
                        schema_version
                    );
                    document.schema_version = schema_version;
                    backend.persist(&serde_json::to_vec(&document)?)?;
                }

                document
            }
        };

        Ok(Self {
            inner: Arc::new(Inner {
                document: Mutex::new(document),
                backend: Box::new(backend),
            }),
        })
    }

    /// Get a property value
    ///
    /// Returns `None` if the property is unset. A stored value that no longer
    /// decodes as `P` is logged and reported as unset.
    pub fn get<P: Property>(&self) -> Option<P> {
        let value = self.inner.document.lock().values.get(P::KEY).cloned()?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Stored value for '{}' is unreadable: {}", P::KEY, e);
                None
            }
        }
    }

    /// Set a property value, returning whether the value changed
    ///
    /// Writing the value already stored is a no-op and does not touch the backend.
    pub fn set<P: Property>(&self, value: P) -> Result<bool> {
        let encoded = serde_json::to_value(&value)?;
        self.write(P::KEY, Some(encoded))
    }

    /// Remove a property, returning whether it existed
    pub fn remove<P: Property>(&self) -> Result<bool> {
        self.write(P::KEY, None)
    }

    /// Check if a property is set
    pub fn contains<P: Property>(&self) -> bool {
        self.inner.document.lock().values.contains_key(P::KEY)
    }

    /// Keys of all properties currently set
    pub fn keys(&self) -> Vec<String> {
        self.inner.document.lock().values.keys().cloned().collect()
    }

    /// Number of properties currently set
    pub fn len(&self) -> usize {
        self.inner.document.lock().values.len()
    }

    /// Check if no property is set
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Schema version the record is stamped with
    pub fn schema_version(&self) -> u32 {
        self.inner.document.lock().schema_version
    }

    /// Remove every property, keeping the schema version
    pub fn clear(&self) -> Result<()> {
        let mut document = self.inner.document.lock();
        if document.values.is_empty() {
            return Ok(());
        }
        let previous = std::mem::take(&mut document.values);
        if let Err(e) = self.persist(&document) {
            document.values = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Apply every write in `batch` and persist them with a single backend write
    ///
    /// Either all writes take effect or, if persisting fails, none do.
    /// Returns whether anything changed; an unchanged record does not touch
    /// the backend.
    pub fn commit(&self, batch: Batch) -> Result<bool> {
        let mut document = self.inner.document.lock();
        let previous = document.values.clone();

        for (key, value) in batch.writes {
            match value {
                Some(v) => {
                    document.values.insert(key.to_string(), v);
                }
                None => {
                    document.values.remove(key);
                }
            }
        }

        if document.values == previous {
            return Ok(false);
        }

        if let Err(e) = self.persist(&document) {
            document.values = previous;
            return Err(e);
        }

        Ok(true)
    }

    fn write(&self, key: &str, value: Option<Value>) -> Result<bool> {
        let mut document = self.inner.document.lock();
        let previous = document.values.get(key).cloned();
        if previous == value {
            return Ok(false);
        }

        match value {
            Some(v) => {
                document.values.insert(key.to_string(), v);
            }
            None => {
                document.values.remove(key);
            }
        }

        if let Err(e) = self.persist(&document) {
            // Keep memory consistent with what is on the backend
            match previous {
                Some(v) => {
                    document.values.insert(key.to_string(), v);
                }
                None => {
                    document.values.remove(key);
                }
            }
            return Err(e);
        }

        Ok(true)
    }

    fn persist(&self, document: &Document) -> Result<()> {
        let bytes = serde_json::to_vec(document)?;
        self.inner.backend.persist(&bytes)
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let document = self.inner.document.lock();
        f.debug_struct("StateStore")
            .field("schema_version", &document.schema_version)
            .field("property_count", &document.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FileBackend, MemoryBackend};

    #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
    struct TestProp(i32);

    impl Property for TestProp {
        const KEY: &'static str = "test";
    }

    #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
    struct OtherProp(String);

    impl Property for OtherProp {
        const KEY: &'static str = "other";
    }

    struct FailingBackend;

    impl Backend for FailingBackend {
        fn load(&self) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn persist(&self, _bytes: &[u8]) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }
    }

    #[test]
    fn test_state_store_basic() {
        let store = StateStore::open(MemoryBackend::new(), 1).unwrap();

        assert!(store.is_empty());
        assert!(store.get::<TestProp>().is_none());

        // Set returns true (value changed)
        assert!(store.set(TestProp(42)).unwrap());
        assert_eq!(store.get::<TestProp>(), Some(TestProp(42)));

        // Same value returns false
        assert!(!store.set(TestProp(42)).unwrap());

        // Different value returns true
        assert!(store.set(TestProp(99)).unwrap());
        assert_eq!(store.get::<TestProp>(), Some(TestProp(99)));
    }

    #[test]
    fn test_remove() {
        let store = StateStore::open(MemoryBackend::new(), 1).unwrap();
        store.set(OtherProp("hello".to_string())).unwrap();

        assert!(store.contains::<OtherProp>());
        assert!(store.remove::<OtherProp>().unwrap());
        assert!(!store.remove::<OtherProp>().unwrap());
        assert!(store.get::<OtherProp>().is_none());
    }

    #[test]
    fn test_writes_survive_reopen() {
        let backend = MemoryBackend::new();
        let store = StateStore::open(backend.clone(), 1).unwrap();
        store.set(TestProp(7)).unwrap();
        store.set(OtherProp("kept".to_string())).unwrap();
        drop(store);

        let reopened = StateStore::open(backend, 1).unwrap();
        assert_eq!(reopened.get::<TestProp>(), Some(TestProp(7)));
        assert_eq!(reopened.get::<OtherProp>(), Some(OtherProp("kept".to_string())));
        assert_eq!(reopened.schema_version(), 1);
    }

    #[test]
    fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registration.json");

        let store = StateStore::open(FileBackend::new(&path), 1).unwrap();
        store.set(TestProp(3)).unwrap();
        store.remove::<TestProp>().unwrap();
        store.set(OtherProp("durable".to_string())).unwrap();
        drop(store);

        let reopened = StateStore::open(FileBackend::new(&path), 1).unwrap();
        assert!(reopened.get::<TestProp>().is_none());
        assert_eq!(reopened.get::<OtherProp>(), Some(OtherProp("durable".to_string())));
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let backend = MemoryBackend::with_document(r#"{"schema_version":5,"values":{}}"#);
        let err = StateStore::open(backend, 2).unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnsupportedSchema {
                found: 5,
                supported: 2
            }
        ));
    }

    #[test]
    fn test_older_schema_is_stamped_forward() {
        let backend = MemoryBackend::with_document(r#"{"values":{"test":11}}"#);
        let store = StateStore::open(backend.clone(), 2).unwrap();

        assert_eq!(store.schema_version(), 2);
        assert_eq!(store.get::<TestProp>(), Some(TestProp(11)));

        let persisted: Value = serde_json::from_slice(&backend.snapshot().unwrap()).unwrap();
        assert_eq!(persisted["schema_version"], 2);
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let backend = MemoryBackend::with_document("not json");
        assert!(matches!(
            StateStore::open(backend, 1),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_undecodable_value_reads_as_unset() {
        let backend = MemoryBackend::with_document(r#"{"schema_version":1,"values":{"test":"nope"}}"#);
        let store = StateStore::open(backend, 1).unwrap();
        assert!(store.get::<TestProp>().is_none());
        assert!(store.contains::<TestProp>());
    }

    #[test]
    fn test_failed_persist_leaves_value_unchanged() {
        let store = StateStore::open(FailingBackend, 1).unwrap();
        assert!(store.set(TestProp(1)).is_err());
        assert!(store.get::<TestProp>().is_none());
    }

    #[test]
    fn test_commit_applies_all_writes() {
        let backend = MemoryBackend::new();
        let store = StateStore::open(backend.clone(), 1).unwrap();
        store.set(OtherProp("gone".to_string())).unwrap();

        let mut batch = Batch::new();
        batch.set(TestProp(5)).unwrap().remove::<OtherProp>();
        assert!(store.commit(batch).unwrap());

        let reopened = StateStore::open(backend, 1).unwrap();
        assert_eq!(reopened.get::<TestProp>(), Some(TestProp(5)));
        assert!(!reopened.contains::<OtherProp>());
    }

    #[test]
    fn test_commit_without_changes_is_noop() {
        let store = StateStore::open(MemoryBackend::new(), 1).unwrap();
        store.set(TestProp(5)).unwrap();

        let mut batch = Batch::new();
        batch.set(TestProp(5)).unwrap().remove::<OtherProp>();
        assert!(!store.commit(batch).unwrap());
        assert!(!store.commit(Batch::new()).unwrap());
    }

    #[test]
    fn test_failed_commit_leaves_every_value_unchanged() {
        let store = StateStore::open(FailingBackend, 1).unwrap();

        let mut batch = Batch::new();
        batch
            .set(TestProp(1))
            .unwrap()
            .set(OtherProp("x".to_string()))
            .unwrap();
        assert!(store.commit(batch).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_keeps_schema_version() {
        let store = StateStore::open(MemoryBackend::new(), 3).unwrap();
        store.set(TestProp(1)).unwrap();
        store.set(OtherProp("x".to_string())).unwrap();
        assert_eq!(store.len(), 2);

        store.clear().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.schema_version(), 3);
    }

    #[test]
    fn test_store_clone_shares_state() {
        let store = StateStore::open(MemoryBackend::new(), 1).unwrap();
        let cloned = store.clone();

        store.set(TestProp(42)).unwrap();
        assert_eq!(cloned.get::<TestProp>(), Some(TestProp(42)));
    }
}
