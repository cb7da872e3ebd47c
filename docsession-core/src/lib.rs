use std::path::Path;

use anyhow::Result;

pub mod archive;
pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod navigation;
pub mod restore;
pub mod scheduler;
pub mod session;
pub mod signals;
pub mod store;
pub mod surface;

pub use archive::{DocumentArchive, DocumentArchiveEntry, EvictionPolicy};
pub use codec::{ViewStateCodec, ViewingSurface};
pub use config::SessionConfig;
pub use error::{IdentityError, RestoreError, StoreError, UnresolvableLocator};
pub use identity::{DocumentKey, FileFingerprint, FsIdentityResolver, IdentityResolver};
pub use model::{
    BookmarkState, DocumentViewState, LayoutDirection, LayoutMode, PageLayout, PagePoint,
    PageSize, Rect, SessionSnapshot, WindowState, Zoom,
};
pub use navigation::{MarkAction, MarkKey, NavFeedback, NavigationCore};
pub use restore::{LaunchInputs, RestorePlan, RestorePolicy, RestoreScope};
pub use scheduler::{Clock, SaveScheduler, SystemClock};
pub use session::{Command, DocumentWindow, Session, SessionEvent};
pub use signals::WindowId;
pub use store::{BlobStore, FileBlobStore, PersistentStore};
pub use surface::PagedSurface;

/// Opens a file into a live viewing surface.
#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn ViewingSurface>>;
}
