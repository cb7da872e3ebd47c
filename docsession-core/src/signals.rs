//! Change notifications from viewing surfaces to the session.
//!
//! A surface only ever holds a [`SurfaceNotifier`], a weak handle into the
//! session's [`SignalBus`]. Dropping the notifier revokes the subscription, so
//! a destroyed surface can no longer trigger saves.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::Rect;

pub type WindowId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceSignal {
    ViewStateChanged,
    WindowClosing,
    FrameChanged(Rect),
}

#[derive(Default)]
struct BusState {
    next_subscription: u64,
    live: HashSet<u64>,
    queue: Vec<(WindowId, SurfaceSignal)>,
}

#[derive(Default, Clone)]
pub struct SignalBus {
    state: Arc<Mutex<BusState>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, window: WindowId) -> SurfaceNotifier {
        let mut state = self.state.lock();
        let subscription = state.next_subscription;
        state.next_subscription += 1;
        state.live.insert(subscription);
        SurfaceNotifier {
            subscription,
            window,
            bus: Arc::downgrade(&self.state),
        }
    }

    /// Takes every queued signal, in delivery order.
    pub fn drain(&self) -> Vec<(WindowId, SurfaceSignal)> {
        std::mem::take(&mut self.state.lock().queue)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().live.len()
    }
}

pub struct SurfaceNotifier {
    subscription: u64,
    window: WindowId,
    bus: Weak<Mutex<BusState>>,
}

impl SurfaceNotifier {
    pub fn on_view_state_changed(&self) {
        self.send(SurfaceSignal::ViewStateChanged);
    }

    pub fn on_window_closing(&self) {
        self.send(SurfaceSignal::WindowClosing);
    }

    pub fn on_window_frame_changed(&self, frame: Rect) {
        self.send(SurfaceSignal::FrameChanged(frame));
    }

    fn send(&self, signal: SurfaceSignal) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut state = bus.lock();
        if state.live.contains(&self.subscription) {
            state.queue.push((self.window, signal));
        }
    }
}

impl Drop for SurfaceNotifier {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            let mut state = bus.lock();
            state.live.remove(&self.subscription);
            let window = self.window;
            state.queue.retain(|(id, _)| *id != window);
        }
    }
}

impl std::fmt::Debug for SurfaceNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceNotifier")
            .field("subscription", &self.subscription)
            .field("window", &self.window)
            .finish()
    }
}
