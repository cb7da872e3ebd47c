use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::codec::{ViewStateCodec, ViewingSurface};
use crate::error::StoreError;
use crate::identity::{DocumentKey, IdentityResolver};
use crate::model::{BookmarkState, PagePoint, Rect, WindowState, Zoom};
use crate::navigation::{MarkAction, MarkKey, NavFeedback, NavOutcome, NavigationCore};
use crate::restore::RestorePlan;
use crate::scheduler::{SaveScheduler, SaveSink};
use crate::signals::{SignalBus, SurfaceSignal, WindowId};
use crate::store::PersistentStore;
use crate::DocumentProvider;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage { count: usize },
    PrevPage { count: usize },
    GotoPage { page: usize },
    ScaleBy { factor: f64 },
    ResetScale,
    AdjustViewport { dx: f64, dy: f64 },
    BeginMark(MarkAction),
    MarkKey(MarkKey),
    JumpBackward,
    JumpForward,
    FollowLink { page: usize, point: Option<PagePoint> },
    CycleLayout,
    ToggleLayoutDirection,
    TogglePairedPages,
    ResizeWindow { frame: Rect },
    SwitchWindow { index: usize },
    NextWindow,
    PrevWindow,
    CloseWindow { index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    WindowOpened(WindowId),
    WindowClosed(WindowId),
    ActiveWindowChanged(WindowId),
    RedrawNeeded(WindowId),
    Feedback(NavFeedback),
}

/// One open view on a document.
pub struct DocumentWindow {
    id: WindowId,
    path: PathBuf,
    key: DocumentKey,
    surface: Box<dyn ViewingSurface>,
    navigation: NavigationCore,
}

impl DocumentWindow {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn surface(&self) -> &dyn ViewingSurface {
        self.surface.as_ref()
    }

    pub fn navigation(&self) -> &NavigationCore {
        &self.navigation
    }

    /// Captures the window under the fingerprint of the content it opened.
    /// Only the locator follows the file, so a rewrite while open still
    /// invalidates the saved point.
    fn capture(&self, resolver: &dyn IdentityResolver) -> Option<WindowState> {
        let key = match resolver.resolve(&self.path) {
            Ok(current) => DocumentKey {
                locator: current.locator,
                fingerprint: self.key.fingerprint,
            },
            Err(err) => {
                debug!(%err, "document unreadable; saving under its last known key");
                self.key.clone()
            }
        };
        ViewStateCodec::capture_window(self.surface.as_ref(), &self.navigation, &key)
    }
}

fn capture_all(resolver: &dyn IdentityResolver, windows: &[DocumentWindow]) -> Vec<WindowState> {
    windows
        .iter()
        .filter_map(|window| window.capture(resolver))
        .collect()
}

/// Writes the current window list through the store.
struct Persister<'a> {
    store: &'a mut PersistentStore,
    windows: &'a [DocumentWindow],
    closed: Vec<WindowState>,
}

impl SaveSink for Persister<'_> {
    fn persist(&mut self) -> Result<(), StoreError> {
        let states = capture_all(self.store.resolver(), self.windows);
        self.store.save_session_closing(&states, &self.closed)
    }
}

pub struct Session {
    windows: Vec<DocumentWindow>,
    active: usize,
    store: PersistentStore,
    scheduler: SaveScheduler,
    bus: SignalBus,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Session {
    pub fn new(store: PersistentStore, scheduler: SaveScheduler) -> Self {
        Self {
            windows: Vec::new(),
            active: 0,
            store,
            scheduler,
            bus: SignalBus::new(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn drain_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    pub fn scheduler(&self) -> &SaveScheduler {
        &self.scheduler
    }

    pub fn windows(&self) -> &[DocumentWindow] {
        &self.windows
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> Option<&DocumentWindow> {
        self.windows.get(self.active)
    }

    /// Opens a window and, when given, applies a saved window state to it.
    #[instrument(skip(self, provider, saved), fields(restored = saved.is_some()))]
    pub async fn open_with<P: DocumentProvider + ?Sized>(
        &mut self,
        provider: &P,
        path: PathBuf,
        saved: Option<&WindowState>,
        fingerprint_ok: bool,
    ) -> Result<WindowId> {
        let key = self
            .store
            .resolver()
            .resolve(&path)
            .with_context(|| format!("cannot identify {:?}", path))?;
        let mut surface = provider
            .open(&path)
            .await
            .with_context(|| format!("failed to open {:?}", path))?;
        let mut navigation = NavigationCore::new();
        if let Some(saved) = saved {
            ViewStateCodec::restore(surface.as_mut(), &mut navigation, saved, fingerprint_ok);
        }

        let id = Uuid::new_v4();
        surface.attach_notifier(self.bus.subscribe(id));
        info!(window = %id, document = %key.document_id(), "window opened");
        self.windows.push(DocumentWindow {
            id,
            path,
            key,
            surface,
            navigation,
        });
        self.active = self.windows.len() - 1;
        let mut events = self.events.lock();
        events.push(SessionEvent::WindowOpened(id));
        events.push(SessionEvent::ActiveWindowChanged(id));
        Ok(id)
    }

    /// Opens every planned window. Windows that fail to open are skipped.
    #[instrument(skip_all, fields(scope = ?plan.scope, planned = plan.windows.len()))]
    pub async fn restore<P: DocumentProvider + ?Sized>(
        &mut self,
        provider: &P,
        plan: &RestorePlan,
    ) -> usize {
        let mut opened = 0;
        for planned in &plan.windows {
            match self
                .open_with(
                    provider,
                    planned.path.clone(),
                    planned.saved.as_ref(),
                    planned.fingerprint_ok,
                )
                .await
            {
                Ok(_) => opened += 1,
                Err(err) => warn!(error = %format!("{err:#}"), "skipping window"),
            }
        }
        if opened > 0 {
            self.active = 0;
            let id = self.windows[0].id;
            self.events.lock().push(SessionEvent::ActiveWindowChanged(id));
        }
        opened
    }

    /// Opens a second window on the active document at the same position.
    pub async fn duplicate_active<P: DocumentProvider + ?Sized>(
        &mut self,
        provider: &P,
    ) -> Result<Option<WindowId>> {
        let Some(window) = self.active() else {
            return Ok(None);
        };
        let path = window.path.clone();
        let state = window.capture(self.store.resolver());
        let id = self.open_with(provider, path, state.as_ref(), true).await?;
        self.scheduler.schedule_save();
        Ok(Some(id))
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::NextPage { count } => self.on_active(|surface, _| {
                let page = surface.current_page_index()?;
                surface.navigate_to(page.saturating_add(count), None);
                Some(NavOutcome::Moved)
            }),
            Command::PrevPage { count } => self.on_active(|surface, _| {
                let page = surface.current_page_index()?;
                surface.navigate_to(page.saturating_sub(count), None);
                Some(NavOutcome::Moved)
            }),
            Command::GotoPage { page } => self.on_active(|surface, navigation| {
                surface.current_page_index()?;
                navigation.navigate(surface, BookmarkState::at_page(page));
                Some(NavOutcome::Moved)
            }),
            Command::FollowLink { page, point } => self.on_active(|surface, navigation| {
                surface.current_page_index()?;
                let target = BookmarkState {
                    page_index: page,
                    point_in_page: point,
                };
                navigation.navigate(surface, target);
                Some(NavOutcome::Moved)
            }),
            Command::ScaleBy { factor } => self.on_active(|surface, _| {
                let base = surface.effective_scale();
                surface.set_zoom(Zoom::Scale(base * factor));
                Some(NavOutcome::Moved)
            }),
            Command::ResetScale => self.on_active(|surface, _| {
                surface.set_zoom(Zoom::Auto);
                Some(NavOutcome::Moved)
            }),
            Command::AdjustViewport { dx, dy } => self.on_active(|surface, _| {
                let page = surface.current_page_index()?;
                let point = surface.current_point_in_page()?;
                surface.navigate_to(page, Some(PagePoint::new(point.x + dx, point.y + dy)));
                Some(NavOutcome::Moved)
            }),
            Command::BeginMark(action) => self.on_active(|_, navigation| {
                navigation.begin_mark(action);
                Some(NavOutcome::Pending(action))
            }),
            Command::MarkKey(key) => {
                self.on_active(|surface, navigation| Some(navigation.press_key(key, surface)))
            }
            Command::JumpBackward => {
                self.on_active(|surface, navigation| Some(navigation.go_back(surface)))
            }
            Command::JumpForward => {
                self.on_active(|surface, navigation| Some(navigation.go_forward(surface)))
            }
            Command::CycleLayout => self.on_active(|surface, _| {
                let mut layout = surface.layout();
                layout.mode = layout.mode.next();
                surface.set_layout(layout);
                Some(NavOutcome::Moved)
            }),
            Command::ToggleLayoutDirection => self.on_active(|surface, _| {
                let mut layout = surface.layout();
                layout.direction = layout.direction.toggled();
                surface.set_layout(layout);
                Some(NavOutcome::Moved)
            }),
            Command::TogglePairedPages => self.on_active(|surface, _| {
                let mut layout = surface.layout();
                layout.paired_pages = !layout.paired_pages;
                surface.set_layout(layout);
                Some(NavOutcome::Moved)
            }),
            Command::ResizeWindow { frame } => self.on_active(|surface, _| {
                surface.set_frame(Some(frame));
                Some(NavOutcome::Moved)
            }),
            Command::SwitchWindow { index } => self.switch_to(index),
            Command::NextWindow => {
                if !self.windows.is_empty() {
                    self.switch_to((self.active + 1) % self.windows.len());
                }
            }
            Command::PrevWindow => {
                if !self.windows.is_empty() {
                    let len = self.windows.len();
                    self.switch_to((self.active + len - 1) % len);
                }
            }
            Command::CloseWindow { index } => {
                // Closing goes through the surface like any other close request.
                if let Some(window) = self.windows.get(index) {
                    window.surface.request_close();
                }
                self.route_signals();
            }
        }
        Ok(())
    }

    fn on_active<F>(&mut self, f: F)
    where
        F: FnOnce(&mut dyn ViewingSurface, &mut NavigationCore) -> Option<NavOutcome>,
    {
        let Some(window) = self.windows.get_mut(self.active) else {
            return;
        };
        let id = window.id;
        let Some(outcome) = f(window.surface.as_mut(), &mut window.navigation) else {
            return;
        };
        match outcome {
            NavOutcome::Feedback(feedback) => {
                debug!(%feedback, "navigation feedback");
                self.events.lock().push(SessionEvent::Feedback(feedback));
            }
            // Marks do not move the view, so the surface stays silent.
            NavOutcome::MarkSet(_) => self.scheduler.schedule_save(),
            NavOutcome::Moved | NavOutcome::JumpedToMark(_) => {
                self.events.lock().push(SessionEvent::RedrawNeeded(id));
            }
            NavOutcome::Ignored | NavOutcome::Pending(_) => {}
        }
    }

    fn switch_to(&mut self, index: usize) {
        if index < self.windows.len() && index != self.active {
            self.active = index;
            let id = self.windows[index].id;
            self.events.lock().push(SessionEvent::ActiveWindowChanged(id));
        }
    }

    /// Closes a window and flushes the reduced window set, unless the
    /// application is terminating.
    fn close_window(&mut self, index: usize) {
        if index >= self.windows.len() {
            return;
        }
        let window = self.windows.remove(index);
        let closed = window.capture(self.store.resolver());
        let id = window.id;
        // Revokes the surface's subscription.
        drop(window);

        let mut persister = Persister {
            store: &mut self.store,
            windows: &self.windows,
            closed: closed.into_iter().collect(),
        };
        self.scheduler.on_window_closing(&mut persister);

        let mut events = self.events.lock();
        events.push(SessionEvent::WindowClosed(id));
        if self.windows.is_empty() {
            self.active = 0;
        } else {
            if self.active > index || self.active >= self.windows.len() {
                self.active = self.active.saturating_sub(1);
            }
            events.push(SessionEvent::ActiveWindowChanged(self.windows[self.active].id));
        }
    }

    fn close_window_by_id(&mut self, id: WindowId) {
        if let Some(index) = self.windows.iter().position(|window| window.id == id) {
            self.close_window(index);
        }
    }

    /// Feeds surface signals to the scheduler and runs a due save.
    /// Returns whether a save ran.
    pub fn pump(&mut self) -> bool {
        self.route_signals();
        let mut persister = Persister {
            store: &mut self.store,
            windows: &self.windows,
            closed: Vec::new(),
        };
        self.scheduler.poll(&mut persister)
    }

    /// Time until the pending save is due, if one is pending.
    pub fn next_save_in(&self) -> Option<Duration> {
        self.scheduler.time_until_due()
    }

    /// Saves every open window, then closes them all without further saves.
    #[instrument(skip(self), fields(windows = self.windows.len()))]
    pub fn terminate(&mut self) {
        self.route_signals();
        let mut persister = Persister {
            store: &mut self.store,
            windows: &self.windows,
            closed: Vec::new(),
        };
        self.scheduler.on_terminate(&mut persister);
        while !self.windows.is_empty() {
            self.close_window(self.windows.len() - 1);
        }
        info!(saves = self.scheduler.saves(), "session terminated");
    }

    fn route_signals(&mut self) {
        for (window, signal) in self.bus.drain() {
            match signal {
                SurfaceSignal::ViewStateChanged | SurfaceSignal::FrameChanged(_) => {
                    self.scheduler.schedule_save();
                }
                SurfaceSignal::WindowClosing => self.close_window_by_id(window),
            }
        }
    }
}
