use serde::{Deserialize, Serialize};
use serde_with::{serde_as, VecSkipError};

use crate::identity::{DocumentKey, FileFingerprint};
use crate::model::WindowState;

pub const DEFAULT_ARCHIVE_CAPACITY: usize = 500;

/// Which entries go first when the archive is over capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Oldest-created first. Updating an entry does not protect it.
    #[default]
    #[serde(alias = "insertion_order")]
    Insertion,
    /// Least recently saved first.
    Lru,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentArchiveEntry {
    pub document: DocumentKey,
    #[serde(default)]
    pub windows: Vec<WindowState>,
}

/// Capped, document-keyed history of windows.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentArchive {
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    entries: Vec<DocumentArchiveEntry>,
    #[serde(default = "default_capacity")]
    capacity: usize,
    #[serde(skip)]
    policy: EvictionPolicy,
}

fn default_capacity() -> usize {
    DEFAULT_ARCHIVE_CAPACITY
}

impl Default for DocumentArchive {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_CAPACITY, EvictionPolicy::default())
    }
}

impl DocumentArchive {
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            policy,
        }
    }

    /// Applies configured limits to an archive loaded from disk.
    pub fn with_limits(mut self, capacity: usize, policy: EvictionPolicy) -> Self {
        self.capacity = capacity;
        self.policy = policy;
        self.evict();
        self
    }

    pub fn entries(&self) -> &[DocumentArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find_exact(&self, key: &DocumentKey) -> Option<&DocumentArchiveEntry> {
        self.entries.iter().find(|entry| &entry.document == key)
    }

    /// First entry with this fingerprint, whatever its locator.
    pub fn find_by_fingerprint(
        &self,
        fingerprint: &FileFingerprint,
    ) -> Option<&DocumentArchiveEntry> {
        self.entries
            .iter()
            .find(|entry| &entry.document.fingerprint == fingerprint)
    }

    /// Replaces the window list stored for `key`.
    ///
    /// An exact key match is updated in place. Otherwise the first entry for
    /// which `same_document` holds is re-keyed and updated in place. Failing
    /// both, a new entry is appended. Eviction runs afterwards.
    pub fn upsert<F>(&mut self, key: &DocumentKey, windows: Vec<WindowState>, same_document: F)
    where
        F: Fn(&DocumentKey) -> bool,
    {
        let position = self
            .entries
            .iter()
            .position(|entry| &entry.document == key)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|entry| same_document(&entry.document))
            });

        match position {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.document = key.clone();
                entry.windows = windows;
                if self.policy == EvictionPolicy::Lru {
                    let entry = self.entries.remove(index);
                    self.entries.push(entry);
                }
            }
            None => self.entries.push(DocumentArchiveEntry {
                document: key.clone(),
                windows,
            }),
        }

        self.evict();
    }

    fn evict(&mut self) {
        if self.entries.len() > self.capacity {
            let excess = self.entries.len() - self.capacity;
            self.entries.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LocatorToken;
    use crate::model::DocumentViewState;

    fn key(n: usize) -> DocumentKey {
        DocumentKey {
            locator: LocatorToken::from_bytes(format!("doc-{n}").into_bytes()),
            fingerprint: FileFingerprint {
                size: n as i64,
                mod_time: n as f64,
            },
        }
    }

    fn window(key: &DocumentKey, page: usize) -> WindowState {
        WindowState {
            document: key.clone(),
            view: DocumentViewState {
                page_index: page,
                ..DocumentViewState::default()
            },
            frame: None,
            layout_mode: Default::default(),
            layout_direction: Default::default(),
            paired_page_layout: None,
        }
    }

    fn never(_: &DocumentKey) -> bool {
        false
    }

    #[test]
    fn update_replaces_windows_in_place() {
        let mut archive = DocumentArchive::default();
        let a = key(1);
        let b = key(2);
        archive.upsert(&a, vec![window(&a, 1), window(&a, 2)], never);
        archive.upsert(&b, vec![window(&b, 5)], never);
        archive.upsert(&a, vec![window(&a, 9)], never);

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.entries()[0].document, a);
        assert_eq!(archive.entries()[0].windows, vec![window(&a, 9)]);
    }

    #[test]
    fn eviction_keeps_most_recently_created_entries() {
        let mut archive = DocumentArchive::default();
        for n in 0..DEFAULT_ARCHIVE_CAPACITY {
            let k = key(n);
            archive.upsert(&k, vec![window(&k, 0)], never);
        }
        // Touching the oldest entry must not save it from eviction.
        let oldest = key(0);
        archive.upsert(&oldest, vec![window(&oldest, 42)], never);

        for n in DEFAULT_ARCHIVE_CAPACITY..DEFAULT_ARCHIVE_CAPACITY + 25 {
            let k = key(n);
            archive.upsert(&k, vec![window(&k, 0)], never);
        }

        assert_eq!(archive.len(), DEFAULT_ARCHIVE_CAPACITY);
        assert!(archive.find_exact(&key(0)).is_none());
        assert!(archive.find_exact(&key(24)).is_none());
        assert!(archive.find_exact(&key(25)).is_some());
        assert!(archive
            .find_exact(&key(DEFAULT_ARCHIVE_CAPACITY + 24))
            .is_some());
    }

    #[test]
    fn lru_policy_moves_updated_entries_to_the_back() {
        let mut archive = DocumentArchive::new(3, EvictionPolicy::Lru);
        for n in 0..3 {
            let k = key(n);
            archive.upsert(&k, vec![window(&k, 0)], never);
        }
        let first = key(0);
        archive.upsert(&first, vec![window(&first, 1)], never);
        let fresh = key(3);
        archive.upsert(&fresh, vec![window(&fresh, 0)], never);

        assert!(archive.find_exact(&key(0)).is_some());
        assert!(archive.find_exact(&key(1)).is_none());
    }

    #[test]
    fn same_document_predicate_rekeys_existing_entry() {
        let mut archive = DocumentArchive::default();
        let old = key(7);
        archive.upsert(&old, vec![window(&old, 3)], never);

        let mut moved = key(7);
        moved.locator = LocatorToken::from_bytes(b"renamed".to_vec());
        let old_locator = old.locator.clone();
        archive.upsert(&moved, vec![window(&moved, 4)], |candidate| {
            candidate.locator == old_locator
        });

        assert_eq!(archive.len(), 1);
        assert_eq!(archive.entries()[0].document, moved);
    }

    #[test]
    fn fingerprint_lookup_ignores_locator() {
        let mut archive = DocumentArchive::default();
        let stored = key(11);
        archive.upsert(&stored, vec![window(&stored, 6)], never);

        let mut probe = key(11);
        probe.locator = LocatorToken::from_bytes(b"elsewhere".to_vec());
        assert!(archive.find_exact(&probe).is_none());
        let found = archive.find_by_fingerprint(&probe.fingerprint).unwrap();
        assert_eq!(found.windows[0].view.page_index, 6);
    }

    #[test]
    fn loaded_archive_is_trimmed_to_configured_capacity() {
        let mut archive = DocumentArchive::default();
        for n in 0..10 {
            let k = key(n);
            archive.upsert(&k, Vec::new(), never);
        }
        let archive = archive.with_limits(4, EvictionPolicy::Insertion);
        assert_eq!(archive.len(), 4);
        assert_eq!(archive.entries()[0].document, key(6));
    }
}
