use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::archive::{DocumentArchive, EvictionPolicy, DEFAULT_ARCHIVE_CAPACITY};
use crate::error::StoreError;
use crate::identity::{DocumentKey, IdentityResolver};
use crate::model::{SessionSnapshot, WindowState};

pub const SESSION_KEY: &str = "session";
pub const DOCUMENTS_KEY: &str = "documents";

/// Durable storage for named blobs.
pub trait BlobStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// One `<key>.json` file per blob, replaced atomically through a temp file.
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.blob_path(key);
        let read_err = |source| StoreError::Read {
            key: key.to_owned(),
            source,
        };
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(read_err(err)),
        };
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(read_err)?;
        Ok(Some(buf))
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.blob_path(key);
        let tmp = path.with_extension("json.tmp");
        let write = || -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.flush()?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };
        write().map_err(|source| StoreError::Write {
            key: key.to_owned(),
            source,
        })
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    inner: Mutex<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().get(key).cloned()
    }

    pub fn put_raw(&self, key: &str, bytes: Vec<u8>) {
        self.inner.lock().insert(key.to_owned(), bytes);
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.lock().get(key).cloned())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.lock().insert(key.to_owned(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// The two-tier store: the latest session snapshot plus the per-document
/// archive. The archive is kept in memory and written out whole.
pub struct PersistentStore {
    blobs: Arc<dyn BlobStore>,
    resolver: Arc<dyn IdentityResolver>,
    archive: DocumentArchive,
}

impl PersistentStore {
    pub fn open(blobs: Arc<dyn BlobStore>, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self::open_with_limits(
            blobs,
            resolver,
            DEFAULT_ARCHIVE_CAPACITY,
            EvictionPolicy::default(),
        )
    }

    #[instrument(skip(blobs, resolver))]
    pub fn open_with_limits(
        blobs: Arc<dyn BlobStore>,
        resolver: Arc<dyn IdentityResolver>,
        capacity: usize,
        policy: EvictionPolicy,
    ) -> Self {
        let archive = decode_blob::<DocumentArchive>(blobs.as_ref(), DOCUMENTS_KEY)
            .unwrap_or_default()
            .with_limits(capacity, policy);
        debug!(entries = archive.len(), "document archive loaded");
        Self {
            blobs,
            resolver,
            archive,
        }
    }

    pub fn resolver(&self) -> &dyn IdentityResolver {
        self.resolver.as_ref()
    }

    pub fn archive(&self) -> &DocumentArchive {
        &self.archive
    }

    /// Replaces the session snapshot and folds the windows into the archive.
    ///
    /// Both writes are always attempted; the first failure is returned.
    pub fn save_session(&mut self, windows: &[WindowState]) -> Result<(), StoreError> {
        self.save_session_closing(windows, &[])
    }

    /// Like [`save_session`](Self::save_session), while `closed` windows are
    /// going away. A closed window only reaches the archive when no open
    /// window shows the same document.
    #[instrument(skip_all, fields(windows = windows.len(), closed = closed.len()))]
    pub fn save_session_closing(
        &mut self,
        windows: &[WindowState],
        closed: &[WindowState],
    ) -> Result<(), StoreError> {
        let snapshot = SessionSnapshot {
            windows: windows.to_vec(),
        };
        let session_result = encode_blob(&snapshot, SESSION_KEY)
            .and_then(|bytes| self.blobs.save(SESSION_KEY, &bytes));
        if let Err(err) = &session_result {
            warn!(%err, "session snapshot was not saved");
        }

        let mut archived = windows.to_vec();
        archived.extend(
            closed
                .iter()
                .filter(|gone| windows.iter().all(|open| open.document != gone.document))
                .cloned(),
        );
        self.fold_into_archive(&archived);
        let archive_result = encode_blob(&self.archive, DOCUMENTS_KEY)
            .and_then(|bytes| self.blobs.save(DOCUMENTS_KEY, &bytes));
        if let Err(err) = &archive_result {
            warn!(%err, "document archive was not saved");
        }

        session_result.and(archive_result)
    }

    /// The last saved snapshot; empty when missing or unreadable.
    pub fn load_session(&self) -> SessionSnapshot {
        decode_blob(self.blobs.as_ref(), SESSION_KEY).unwrap_or_default()
    }

    /// Saved windows for the document at `path`, or nothing.
    #[instrument(skip(self))]
    pub fn load_archived_windows(&self, path: &Path) -> Vec<WindowState> {
        match self.resolver.resolve(path) {
            Ok(key) => self.archived_windows_for(&key),
            Err(err) => {
                debug!(%err, "no identity for path; nothing archived");
                Vec::new()
            }
        }
    }

    /// Exact key first, then the first entry with the same fingerprint.
    pub fn archived_windows_for(&self, key: &DocumentKey) -> Vec<WindowState> {
        self.archive
            .find_exact(key)
            .or_else(|| self.archive.find_by_fingerprint(&key.fingerprint))
            .map(|entry| entry.windows.clone())
            .unwrap_or_default()
    }

    fn fold_into_archive(&mut self, windows: &[WindowState]) {
        let mut groups: Vec<(DocumentKey, Vec<WindowState>)> = Vec::new();
        for window in windows {
            match groups.iter_mut().find(|(key, _)| key == &window.document) {
                Some((_, list)) => list.push(window.clone()),
                None => groups.push((window.document.clone(), vec![window.clone()])),
            }
        }

        let resolver = Arc::clone(&self.resolver);
        for (key, list) in groups {
            self.archive.upsert(&key, list, |candidate| {
                candidate.fingerprint == key.fingerprint && resolver.same_target(candidate, &key)
            });
        }
    }
}

fn encode_blob<T: serde::Serialize>(value: &T, key: &str) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|source| StoreError::Encode {
        key: key.to_owned(),
        source,
    })
}

/// Reads and decodes a blob. Every failure is logged and reported as `None`.
fn decode_blob<T: serde::de::DeserializeOwned>(blobs: &dyn BlobStore, key: &str) -> Option<T> {
    let bytes = match blobs.load(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(err) => {
            warn!(%err, "treating unreadable blob as empty");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(source) => {
            let err = StoreError::Decode {
                key: key.to_owned(),
                source,
            };
            warn!(%err, "treating corrupt blob as empty");
            None
        }
    }
}
