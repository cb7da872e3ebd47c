use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The file behind a path could not be turned into a [`crate::DocumentKey`].
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("cannot read {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot build a locator for {path:?}: {source}")]
    Locator {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A stored locator no longer leads to an openable file.
#[derive(Debug, Error)]
pub enum UnresolvableLocator {
    #[error("locator token is not readable: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("document no longer exists at {path:?}")]
    Missing { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write blob `{key}`: {source}")]
    Write {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read blob `{key}`: {source}")]
    Read {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode blob `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode blob `{key}`: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("cannot open {path:?} and there is no previous session to restore")]
    NothingToOpen {
        path: PathBuf,
        #[source]
        source: IdentityError,
    },
}
