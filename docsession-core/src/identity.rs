use std::fs;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use tracing::debug;
use uuid::Uuid;

use crate::error::{IdentityError, UnresolvableLocator};

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::from_bytes([
        0x7b, 0x2c, 0x58, 0xf1, 0x99, 0xc6, 0x5a, 0x5c, 0xa6, 0xea, 0x50, 0xf9, 0xe7, 0xf1, 0xcc,
        0x20,
    ])
});

/// Size and modification time of a file. Not unique, but changes whenever the
/// file is rewritten, which is all the restore path needs to know.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub size: i64,
    /// Seconds since the Unix epoch; negative for earlier timestamps.
    pub mod_time: f64,
}

impl FileFingerprint {
    pub fn from_metadata(metadata: &fs::Metadata) -> io::Result<Self> {
        let modified = metadata.modified()?;
        let mod_time = match modified.duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_secs_f64(),
            Err(err) => -err.duration().as_secs_f64(),
        };
        Ok(Self {
            size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            mod_time,
        })
    }

    pub fn of_path(path: &Path) -> io::Result<Self> {
        Self::from_metadata(&fs::metadata(path)?)
    }
}

impl PartialEq for FileFingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.mod_time.to_bits() == other.mod_time.to_bits()
    }
}

impl Eq for FileFingerprint {}

impl Hash for FileFingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.size.hash(state);
        self.mod_time.to_bits().hash(state);
    }
}

/// Opaque, durable reference to a file. Only an [`IdentityResolver`] knows how
/// to turn it back into a path.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocatorToken(#[serde_as(as = "Base64")] Vec<u8>);

impl LocatorToken {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub locator: LocatorToken,
    pub fingerprint: FileFingerprint,
}

impl DocumentKey {
    /// Stable id derived from the locator, used to tag log records.
    pub fn document_id(&self) -> Uuid {
        Uuid::new_v5(&DOCUMENT_NAMESPACE, self.locator.as_bytes())
    }
}

pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, path: &Path) -> Result<DocumentKey, IdentityError>;

    fn locator_of(&self, key: &DocumentKey) -> Result<PathBuf, UnresolvableLocator>;

    fn fingerprint_matches(&self, key: &DocumentKey, path: &Path) -> bool {
        match FileFingerprint::of_path(path) {
            Ok(current) => current == key.fingerprint,
            Err(_) => false,
        }
    }

    /// Whether both keys currently resolve to the same file.
    fn same_target(&self, a: &DocumentKey, b: &DocumentKey) -> bool {
        match (self.locator_of(a), self.locator_of(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LocatorRecord {
    path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inode: Option<u64>,
}

/// Resolver backed by the local filesystem.
///
/// The locator records the canonical path and, on Unix, the device and inode
/// numbers. A file renamed inside its directory is found again by inode; moves
/// across directories degrade to "not found".
#[derive(Debug, Default, Clone, Copy)]
pub struct FsIdentityResolver;

impl FsIdentityResolver {
    pub fn new() -> Self {
        Self
    }

    fn decode(key: &DocumentKey) -> Result<LocatorRecord, UnresolvableLocator> {
        serde_json::from_slice(key.locator.as_bytes()).map_err(UnresolvableLocator::Corrupt)
    }

    fn find_by_serial(record: &LocatorRecord) -> Option<PathBuf> {
        let (device, inode) = (record.device?, record.inode?);
        let parent = record.path.parent()?;
        let entries = fs::read_dir(parent).ok()?;
        entries.flatten().find_map(|entry| {
            let metadata = entry.metadata().ok()?;
            match file_serial(&metadata) {
                (Some(d), Some(i)) if d == device && i == inode && metadata.is_file() => {
                    Some(entry.path())
                }
                _ => None,
            }
        })
    }
}

impl IdentityResolver for FsIdentityResolver {
    fn resolve(&self, path: &Path) -> Result<DocumentKey, IdentityError> {
        let unreadable = |source| IdentityError::Unreadable {
            path: path.to_path_buf(),
            source,
        };
        let canonical = path.canonicalize().map_err(unreadable)?;
        let metadata = fs::metadata(&canonical).map_err(unreadable)?;
        let fingerprint = FileFingerprint::from_metadata(&metadata).map_err(unreadable)?;
        let (device, inode) = file_serial(&metadata);
        let record = LocatorRecord {
            path: canonical,
            device,
            inode,
        };
        let bytes = serde_json::to_vec(&record).map_err(|source| IdentityError::Locator {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(DocumentKey {
            locator: LocatorToken::from_bytes(bytes),
            fingerprint,
        })
    }

    fn locator_of(&self, key: &DocumentKey) -> Result<PathBuf, UnresolvableLocator> {
        let record = Self::decode(key)?;
        if record.path.is_file() {
            return Ok(record.path);
        }
        if let Some(found) = Self::find_by_serial(&record) {
            debug!(from = ?record.path, to = ?found, "document was renamed");
            return Ok(found);
        }
        Err(UnresolvableLocator::Missing { path: record.path })
    }
}

#[cfg(unix)]
fn file_serial(metadata: &fs::Metadata) -> (Option<u64>, Option<u64>) {
    use std::os::unix::fs::MetadataExt;
    (Some(metadata.dev()), Some(metadata.ino()))
}

#[cfg(not(unix))]
fn file_serial(_metadata: &fs::Metadata) -> (Option<u64>, Option<u64>) {
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn resolve_is_stable_for_same_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.pdf");
        std::fs::write(&file_path, b"dummy").unwrap();

        let resolver = FsIdentityResolver::new();
        let first = resolver.resolve(&file_path).unwrap();
        let second = resolver.resolve(&file_path).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.document_id(), second.document_id());
        assert_eq!(first.fingerprint.size, 5);
    }

    #[test]
    fn resolve_fails_for_missing_file() {
        let dir = tempdir().unwrap();
        let err = FsIdentityResolver::new()
            .resolve(&dir.path().join("absent.pdf"))
            .unwrap_err();
        assert!(matches!(err, IdentityError::Unreadable { .. }));
    }

    #[test]
    fn locator_resolves_back_to_the_canonical_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.pdf");
        std::fs::write(&file_path, b"dummy").unwrap();

        let resolver = FsIdentityResolver::new();
        let key = resolver.resolve(&file_path).unwrap();
        let located = resolver.locator_of(&key).unwrap();
        assert_eq!(located, file_path.canonicalize().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn locator_follows_rename_within_directory() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("draft.pdf");
        std::fs::write(&original, b"contents").unwrap();

        let resolver = FsIdentityResolver::new();
        let key = resolver.resolve(&original).unwrap();

        let renamed = dir.path().join("final.pdf");
        std::fs::rename(&original, &renamed).unwrap();

        let located = resolver.locator_of(&key).unwrap();
        assert_eq!(located, renamed.canonicalize().unwrap());
    }

    #[test]
    fn locator_of_deleted_file_is_unresolvable() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("gone.pdf");
        std::fs::write(&file_path, b"dummy").unwrap();

        let resolver = FsIdentityResolver::new();
        let key = resolver.resolve(&file_path).unwrap();
        std::fs::remove_file(&file_path).unwrap();

        assert!(matches!(
            resolver.locator_of(&key),
            Err(UnresolvableLocator::Missing { .. })
        ));
    }

    #[test]
    fn garbage_locator_is_reported_as_corrupt() {
        let key = DocumentKey {
            locator: LocatorToken::from_bytes(vec![0xff, 0x00, 0x13]),
            fingerprint: FileFingerprint {
                size: 1,
                mod_time: 1.0,
            },
        };
        assert!(matches!(
            FsIdentityResolver::new().locator_of(&key),
            Err(UnresolvableLocator::Corrupt(_))
        ));
    }

    #[test]
    fn fingerprint_detects_rewrite() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.pdf");
        std::fs::write(&file_path, b"short").unwrap();

        let resolver = FsIdentityResolver::new();
        let key = resolver.resolve(&file_path).unwrap();
        assert!(resolver.fingerprint_matches(&key, &file_path));

        std::fs::write(&file_path, b"a much longer body").unwrap();
        assert!(!resolver.fingerprint_matches(&key, &file_path));
        assert!(!resolver.fingerprint_matches(&key, &dir.path().join("other.pdf")));
    }

    #[test]
    fn key_survives_json_round_trip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.pdf");
        std::fs::write(&file_path, b"dummy").unwrap();

        let key = FsIdentityResolver::new().resolve(&file_path).unwrap();
        let encoded = serde_json::to_string(&key).unwrap();
        let decoded: DocumentKey = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, key);
    }
}
