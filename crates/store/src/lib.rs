//! Document collections with atomic operations and unique indexes.
//!
//! HMS does not prescribe a storage engine; the engines only require a
//! document store with per-operation atomicity and a uniqueness-constraint
//! facility. This crate provides exactly that contract, in-process:
//!
//! - A [`Collection<T>`] holds documents of one type, keyed by [`DocId`].
//! - Each operation (insert, get, update, delete, find) takes the collection
//!   lock once, so every operation is atomic with respect to every other.
//! - Unique indexes are declared at collection construction time. A racing
//!   duplicate insert is resolved under the write lock: exactly one caller
//!   wins, the other receives [`StoreError::DuplicateKey`]. Callers that use
//!   a check-then-insert pattern therefore still get a conflict error (not a
//!   torn write) when the pre-check races.
//! - [`Collection::update_with`] runs the caller's closure inside the write
//!   lock, so a read-check-write sequence on a single document (for example a
//!   status-transition check) is one critical section.
//!
//! The store holds no cross-collection transactions: multi-document
//! consistency is the engines' responsibility (resolve references first,
//! persist last).

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use hms_id::DocId;

/// Errors surfaced by collection operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No document with the given identifier exists.
    #[error("document {0} not found")]
    NotFound(DocId),
    /// A document with the same identifier already exists.
    #[error("document {0} already exists")]
    IdExists(DocId),
    /// A unique index rejected the write.
    #[error("duplicate {index}: {value}")]
    DuplicateKey {
        /// Name of the violated index (for example `drug_code`, `email`).
        index: &'static str,
        /// The conflicting key value.
        value: String,
    },
    /// The collection lock was poisoned by a panicking writer.
    #[error("collection lock poisoned")]
    Poisoned,
}

/// A document that can be stored in a [`Collection`].
pub trait Document: Clone {
    /// Returns the document's identifier.
    fn id(&self) -> DocId;
}

type KeyFn<T> = Box<dyn Fn(&T) -> Option<String> + Send + Sync>;

struct UniqueIndex<T> {
    name: &'static str,
    key: KeyFn<T>,
    entries: HashMap<String, DocId>,
}

struct Inner<T> {
    docs: BTreeMap<DocId, T>,
    indexes: Vec<UniqueIndex<T>>,
}

/// A set of documents of one type, with optional unique indexes.
pub struct Collection<T> {
    inner: RwLock<Inner<T>>,
}

/// Builder for a [`Collection`], used to declare unique indexes up front.
pub struct CollectionBuilder<T> {
    indexes: Vec<UniqueIndex<T>>,
}

impl<T: Document> CollectionBuilder<T> {
    /// Declares a unique index.
    ///
    /// `key` extracts the indexed value from a document; returning `None`
    /// exempts that document from the index (sparse semantics).
    pub fn unique_index(
        mut self,
        name: &'static str,
        key: impl Fn(&T) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.indexes.push(UniqueIndex {
            name,
            key: Box::new(key),
            entries: HashMap::new(),
        });
        self
    }

    /// Finalises the builder into a usable collection.
    pub fn build(self) -> Collection<T> {
        Collection {
            inner: RwLock::new(Inner {
                docs: BTreeMap::new(),
                indexes: self.indexes,
            }),
        }
    }
}

impl<T: Document> Default for Collection<T> {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<T: Document> Collection<T> {
    /// Starts building a collection.
    pub fn builder() -> CollectionBuilder<T> {
        CollectionBuilder {
            indexes: Vec::new(),
        }
    }

    /// Inserts a new document.
    ///
    /// The identifier and all unique keys are checked and claimed under a
    /// single write lock. Of two racing inserts with the same unique key,
    /// exactly one succeeds.
    ///
    /// # Errors
    ///
    /// * [`StoreError::IdExists`] if the identifier is already present.
    /// * [`StoreError::DuplicateKey`] if a unique index rejects the document.
    pub fn insert(&self, doc: T) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let id = doc.id();

        if inner.docs.contains_key(&id) {
            return Err(StoreError::IdExists(id));
        }
        Self::check_indexes(&inner, &doc, id)?;

        let keys: Vec<(usize, Option<String>)> = inner
            .indexes
            .iter()
            .enumerate()
            .map(|(i, idx)| (i, (idx.key)(&doc)))
            .collect();
        for (i, key) in keys {
            if let Some(key) = key {
                inner.indexes[i].entries.insert(key, id);
            }
        }
        inner.docs.insert(id, doc);
        Ok(())
    }

    /// Returns a copy of the document with the given identifier, if any.
    pub fn get(&self, id: &DocId) -> Result<Option<T>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.docs.get(id).cloned())
    }

    /// Atomically mutates a single document.
    ///
    /// The closure runs under the collection's write lock on a copy of the
    /// stored document; if it returns `Ok`, the copy replaces the original
    /// and the unique indexes are re-validated (a mutation that changes a
    /// unique key to an already-claimed value fails with
    /// [`StoreError::DuplicateKey`] and leaves the document untouched).
    ///
    /// Returns the updated document.
    pub fn update_with<E, F>(&self, id: &DocId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: From<StoreError>,
    {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| E::from(StoreError::Poisoned))?;

        let mut updated = inner
            .docs
            .get(id)
            .cloned()
            .ok_or_else(|| E::from(StoreError::NotFound(*id)))?;
        f(&mut updated)?;

        Self::check_indexes(&inner, &updated, *id).map_err(E::from)?;
        Self::reindex(&mut inner, id, &updated);
        inner.docs.insert(*id, updated.clone());
        Ok(updated)
    }

    /// Removes a document. Returns true if it existed.
    pub fn delete(&self, id: &DocId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        match inner.docs.remove(id) {
            Some(doc) => {
                let keys: Vec<(usize, Option<String>)> = inner
                    .indexes
                    .iter()
                    .enumerate()
                    .map(|(i, idx)| (i, (idx.key)(&doc)))
                    .collect();
                for (i, key) in keys {
                    if let Some(key) = key {
                        inner.indexes[i].entries.remove(&key);
                    }
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns copies of all documents matching the predicate.
    pub fn find<P>(&self, predicate: P) -> Result<Vec<T>, StoreError>
    where
        P: Fn(&T) -> bool,
    {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.docs.values().filter(|d| predicate(d)).cloned().collect())
    }

    /// Returns the first document matching the predicate, if any.
    pub fn find_one<P>(&self, predicate: P) -> Result<Option<T>, StoreError>
    where
        P: Fn(&T) -> bool,
    {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.docs.values().find(|d| predicate(d)).cloned())
    }

    /// Returns the number of stored documents.
    pub fn len(&self) -> Result<usize, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.docs.len())
    }

    /// Returns true if the collection holds no documents.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Verifies that `doc`'s unique keys are unclaimed or claimed by `id` itself.
    fn check_indexes(inner: &Inner<T>, doc: &T, id: DocId) -> Result<(), StoreError> {
        for idx in &inner.indexes {
            if let Some(key) = (idx.key)(doc) {
                if let Some(owner) = idx.entries.get(&key) {
                    if *owner != id {
                        return Err(StoreError::DuplicateKey {
                            index: idx.name,
                            value: key,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Drops the old index entries for `id` and claims the updated document's keys.
    fn reindex(inner: &mut Inner<T>, id: &DocId, updated: &T) {
        let old = inner.docs.get(id).cloned();
        for i in 0..inner.indexes.len() {
            if let Some(old_doc) = &old {
                if let Some(old_key) = (inner.indexes[i].key)(old_doc) {
                    inner.indexes[i].entries.remove(&old_key);
                }
            }
            if let Some(new_key) = (inner.indexes[i].key)(updated) {
                inner.indexes[i].entries.insert(new_key, *id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Debug, PartialEq)]
    struct Card {
        id: DocId,
        code: String,
        label: String,
    }

    impl Document for Card {
        fn id(&self) -> DocId {
            self.id
        }
    }

    fn coded_collection() -> Collection<Card> {
        Collection::builder()
            .unique_index("code", |c: &Card| Some(c.code.clone()))
            .build()
    }

    fn card(code: &str, label: &str) -> Card {
        Card {
            id: DocId::new(),
            code: code.into(),
            label: label.into(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let coll = coded_collection();
        let doc = card("A1", "first");
        coll.insert(doc.clone()).unwrap();

        let fetched = coll.get(&doc.id).unwrap();
        assert_eq!(fetched, Some(doc));
    }

    #[test]
    fn test_get_missing_is_none() {
        let coll = coded_collection();
        assert_eq!(coll.get(&DocId::new()).unwrap(), None);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let coll = coded_collection();
        coll.insert(card("A1", "first")).unwrap();

        let err = coll.insert(card("A1", "second")).unwrap_err();
        match err {
            StoreError::DuplicateKey { index, value } => {
                assert_eq!(index, "code");
                assert_eq!(value, "A1");
            }
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
        assert_eq!(coll.len().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let coll = coded_collection();
        let doc = card("A1", "first");
        coll.insert(doc.clone()).unwrap();

        let twin = Card {
            code: "B2".into(),
            ..doc
        };
        assert!(matches!(coll.insert(twin), Err(StoreError::IdExists(_))));
    }

    #[test]
    fn test_update_with_mutates_atomically() {
        let coll = coded_collection();
        let doc = card("A1", "first");
        coll.insert(doc.clone()).unwrap();

        let updated: Card = coll
            .update_with(&doc.id, |c| {
                c.label = "renamed".into();
                Ok::<(), StoreError>(())
            })
            .unwrap();
        assert_eq!(updated.label, "renamed");
        assert_eq!(coll.get(&doc.id).unwrap().unwrap().label, "renamed");
    }

    #[test]
    fn test_update_with_missing_doc() {
        let coll = coded_collection();
        let result: Result<Card, StoreError> =
            coll.update_with(&DocId::new(), |_| Ok(()));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_update_changing_key_to_claimed_value_conflicts() {
        let coll = coded_collection();
        let a = card("A1", "first");
        let b = card("B2", "second");
        coll.insert(a.clone()).unwrap();
        coll.insert(b.clone()).unwrap();

        let result: Result<Card, StoreError> = coll.update_with(&b.id, |c| {
            c.code = "A1".into();
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
        // The losing update left the document untouched.
        assert_eq!(coll.get(&b.id).unwrap().unwrap().code, "B2");
    }

    #[test]
    fn test_update_can_move_key() {
        let coll = coded_collection();
        let a = card("A1", "first");
        coll.insert(a.clone()).unwrap();

        let _: Card = coll
            .update_with(&a.id, |c| {
                c.code = "A2".into();
                Ok::<(), StoreError>(())
            })
            .unwrap();

        // The old key is released for reuse.
        coll.insert(card("A1", "reused")).unwrap();
    }

    #[test]
    fn test_delete_releases_unique_key() {
        let coll = coded_collection();
        let a = card("A1", "first");
        coll.insert(a.clone()).unwrap();

        assert!(coll.delete(&a.id).unwrap());
        assert!(!coll.delete(&a.id).unwrap());
        coll.insert(card("A1", "second")).unwrap();
    }

    #[test]
    fn test_find_filters() {
        let coll = coded_collection();
        coll.insert(card("A1", "keep")).unwrap();
        coll.insert(card("B2", "keep")).unwrap();
        coll.insert(card("C3", "drop")).unwrap();

        let kept = coll.find(|c| c.label == "keep").unwrap();
        assert_eq!(kept.len(), 2);

        let one = coll.find_one(|c| c.code == "B2").unwrap();
        assert_eq!(one.unwrap().label, "keep");
    }

    #[test]
    fn test_concurrent_duplicate_insert_one_wins() {
        let coll = Arc::new(coded_collection());

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let coll = Arc::clone(&coll);
                std::thread::spawn(move || coll.insert(card("SAME", &format!("writer-{i}"))))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::DuplicateKey { .. })))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(coll.len().unwrap(), 1);
    }
}
