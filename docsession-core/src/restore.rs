//! Startup decision: which windows to open.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{IdentityError, RestoreError};
use crate::model::WindowState;
use crate::store::PersistentStore;

/// What the process was started with.
#[derive(Debug, Clone, Default)]
pub struct LaunchInputs {
    pub explicit_path: Option<PathBuf>,
    /// Files handed over by the environment before startup finished.
    pub requested_files: Vec<PathBuf>,
}

impl LaunchInputs {
    pub fn new(explicit_path: Option<PathBuf>) -> Self {
        Self {
            explicit_path,
            requested_files: Vec::new(),
        }
    }

    /// Reads requested files from a path-list environment variable.
    pub fn with_requested_from_env(mut self, var: impl AsRef<OsStr>) -> Self {
        if let Some(value) = env::var_os(var) {
            self.requested_files = env::split_paths(&value)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreScope {
    ExplicitDocument,
    RequestedDocuments,
    FullSession,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedWindow {
    pub path: PathBuf,
    /// `None` opens a fresh window at the start of the document.
    pub saved: Option<WindowState>,
    pub fingerprint_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedDocument {
    pub path: Option<PathBuf>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestorePlan {
    pub scope: RestoreScope,
    pub windows: Vec<PlannedWindow>,
    pub skipped: Vec<SkippedDocument>,
}

impl RestorePlan {
    fn new(scope: RestoreScope) -> Self {
        Self {
            scope,
            windows: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

pub struct RestorePolicy<'a> {
    store: &'a PersistentStore,
}

impl<'a> RestorePolicy<'a> {
    pub fn new(store: &'a PersistentStore) -> Self {
        Self { store }
    }

    /// Evaluated once at startup. An explicit path wins, then requested
    /// files, then the last session.
    #[instrument(skip(self, inputs), fields(explicit = ?inputs.explicit_path))]
    pub fn plan(&self, inputs: &LaunchInputs) -> Result<RestorePlan, RestoreError> {
        if let Some(path) = &inputs.explicit_path {
            let mut plan = RestorePlan::new(RestoreScope::ExplicitDocument);
            match self.plan_document(path, &mut plan) {
                Ok(()) => return Ok(plan),
                Err(source) => {
                    let mut fallback = self.plan_session();
                    if fallback.windows.is_empty() {
                        return Err(RestoreError::NothingToOpen {
                            path: path.clone(),
                            source,
                        });
                    }
                    warn!(%source, "explicit document unusable; restoring last session");
                    fallback.skipped.insert(
                        0,
                        SkippedDocument {
                            path: Some(path.clone()),
                            reason: source.to_string(),
                        },
                    );
                    return Ok(fallback);
                }
            }
        }

        if !inputs.requested_files.is_empty() {
            let mut plan = RestorePlan::new(RestoreScope::RequestedDocuments);
            for path in &inputs.requested_files {
                if let Err(err) = self.plan_document(path, &mut plan) {
                    warn!(%err, "requested document skipped");
                    plan.skipped.push(SkippedDocument {
                        path: Some(path.clone()),
                        reason: err.to_string(),
                    });
                }
            }
            return Ok(plan);
        }

        Ok(self.plan_session())
    }

    fn plan_document(&self, path: &Path, plan: &mut RestorePlan) -> Result<(), IdentityError> {
        let key = self.store.resolver().resolve(path)?;
        let saved = self.store.archived_windows_for(&key);
        if saved.is_empty() {
            debug!(path = %path.display(), "no history; fresh window");
            plan.windows.push(PlannedWindow {
                path: path.to_path_buf(),
                saved: None,
                fingerprint_ok: true,
            });
            return Ok(());
        }
        for window in saved {
            let fingerprint_ok = window.document.fingerprint == key.fingerprint;
            plan.windows.push(PlannedWindow {
                path: path.to_path_buf(),
                saved: Some(window),
                fingerprint_ok,
            });
        }
        Ok(())
    }

    fn plan_session(&self) -> RestorePlan {
        let mut plan = RestorePlan::new(RestoreScope::FullSession);
        let resolver = self.store.resolver();
        for window in self.store.load_session().windows {
            match resolver.locator_of(&window.document) {
                Ok(path) => {
                    let fingerprint_ok = resolver.fingerprint_matches(&window.document, &path);
                    plan.windows.push(PlannedWindow {
                        path,
                        saved: Some(window),
                        fingerprint_ok,
                    });
                }
                Err(err) => {
                    info!(%err, "session window skipped");
                    plan.skipped.push(SkippedDocument {
                        path: None,
                        reason: err.to_string(),
                    });
                }
            }
        }
        plan
    }
}
