use std::path::{Path, PathBuf};

use crate::codec::{clamp_page, ViewingSurface};
use crate::model::{PageLayout, PagePoint, PageSize, Rect, Zoom};
use crate::signals::SurfaceNotifier;

pub const MIN_SCALE: f64 = 0.25;
pub const MAX_SCALE: f64 = 4.0;

/// An in-memory viewing surface over a list of page sizes.
///
/// The anchor is the top-left corner of the viewport in page space. Every
/// change that affects persisted state is reported through the notifier.
#[derive(Debug)]
pub struct PagedSurface {
    path: PathBuf,
    pages: Vec<PageSize>,
    page: usize,
    anchor: PagePoint,
    zoom: Zoom,
    layout: PageLayout,
    frame: Option<Rect>,
    notifier: Option<SurfaceNotifier>,
}

impl PagedSurface {
    pub fn new(path: PathBuf, pages: Vec<PageSize>) -> Self {
        Self {
            path,
            pages,
            page: 0,
            anchor: PagePoint::new(0.0, 0.0),
            zoom: Zoom::Auto,
            layout: PageLayout::default(),
            frame: None,
            notifier: None,
        }
    }

    fn page_size(&self, page_index: usize) -> Option<PageSize> {
        self.pages.get(page_index).copied()
    }

    fn changed(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.on_view_state_changed();
        }
    }
}

fn clamp_point(point: PagePoint, size: PageSize) -> PagePoint {
    let clamp = |value: f64, max: f64| {
        if value.is_finite() {
            value.clamp(0.0, max.max(0.0))
        } else {
            0.0
        }
    };
    PagePoint::new(clamp(point.x, size.width), clamp(point.y, size.height))
}

impl ViewingSurface for PagedSurface {
    fn current_page_index(&self) -> Option<usize> {
        (!self.pages.is_empty()).then_some(self.page)
    }

    fn current_point_in_page(&self) -> Option<PagePoint> {
        (!self.pages.is_empty()).then_some(self.anchor)
    }

    fn current_zoom(&self) -> Zoom {
        self.zoom
    }

    /// Auto fits the page width into the frame.
    fn effective_scale(&self) -> f64 {
        match self.zoom {
            Zoom::Scale(scale) => scale,
            Zoom::Auto => {
                let (Some(frame), Some(size)) = (self.frame, self.page_size(self.page)) else {
                    return 1.0;
                };
                let columns = if self.layout.mode.is_side_by_side() { 2.0 } else { 1.0 };
                if size.width <= 0.0 || frame.width <= 0.0 {
                    1.0
                } else {
                    (frame.width / (size.width * columns)).clamp(MIN_SCALE, MAX_SCALE)
                }
            }
        }
    }

    fn set_zoom(&mut self, zoom: Zoom) {
        let zoom = match zoom {
            Zoom::Scale(scale) if Zoom::is_valid_scale(scale) => {
                Zoom::Scale(scale.clamp(MIN_SCALE, MAX_SCALE))
            }
            Zoom::Scale(_) => Zoom::Auto,
            Zoom::Auto => Zoom::Auto,
        };
        if zoom != self.zoom {
            self.zoom = zoom;
            self.changed();
        }
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn navigate_to(&mut self, page_index: usize, point: Option<PagePoint>) {
        if self.pages.is_empty() {
            return;
        }
        let page = clamp_page(page_index, self.pages.len());
        let anchor = clamp_point(point.unwrap_or(PagePoint::new(0.0, 0.0)), self.pages[page]);
        if page != self.page || anchor != self.anchor {
            self.page = page;
            self.anchor = anchor;
            self.changed();
        }
    }

    fn layout(&self) -> PageLayout {
        self.layout
    }

    fn set_layout(&mut self, layout: PageLayout) {
        if layout != self.layout {
            self.layout = layout;
            self.changed();
        }
    }

    fn frame(&self) -> Option<Rect> {
        self.frame
    }

    fn set_frame(&mut self, frame: Option<Rect>) {
        if frame == self.frame {
            return;
        }
        self.frame = frame;
        if let (Some(notifier), Some(frame)) = (&self.notifier, frame) {
            notifier.on_window_frame_changed(frame);
        }
    }

    fn document_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn attach_notifier(&mut self, notifier: SurfaceNotifier) {
        self.notifier = Some(notifier);
    }

    fn request_close(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.on_window_closing();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use crate::signals::{SignalBus, SurfaceSignal};

    fn surface(pages: usize) -> PagedSurface {
        PagedSurface::new(PathBuf::from("/docs/b.pdf"), vec![PageSize::LETTER; pages])
    }

    #[test]
    fn navigation_clamps_page_and_point() {
        let mut surface = surface(5);
        surface.navigate_to(12, Some(PagePoint::new(-4.0, 9000.0)));
        assert_eq!(surface.current_page_index(), Some(4));
        assert_eq!(
            surface.current_point_in_page(),
            Some(PagePoint::new(0.0, PageSize::LETTER.height))
        );
    }

    #[test]
    fn empty_surface_reports_nothing_and_ignores_navigation() {
        let mut surface = surface(0);
        surface.navigate_to(3, None);
        assert_eq!(surface.current_page_index(), None);
        assert_eq!(surface.current_point_in_page(), None);
    }

    #[test]
    fn page_moves_without_a_point_land_at_the_top() {
        let mut surface = surface(10);
        surface.navigate_to(2, Some(PagePoint::new(30.0, 300.0)));
        surface.navigate_to(5, None);
        assert_eq!(surface.current_page_index(), Some(5));
        assert_eq!(surface.current_point_in_page(), Some(PagePoint::new(0.0, 0.0)));
    }

    #[test]
    fn invalid_scale_falls_back_to_auto() {
        let mut surface = surface(1);
        surface.set_zoom(Zoom::Scale(0.0));
        assert_eq!(surface.current_zoom(), Zoom::Auto);
        surface.set_zoom(Zoom::Scale(40.0));
        assert_eq!(surface.current_zoom(), Zoom::Scale(MAX_SCALE));
    }

    #[test]
    fn auto_zoom_fits_width_of_frame() {
        let mut surface = surface(1);
        surface.set_frame(Some(Rect::new(0.0, 0.0, 1224.0, 800.0)));
        assert_eq!(surface.effective_scale(), 2.0);
        surface.set_zoom(Zoom::Scale(1.5));
        assert_eq!(surface.effective_scale(), 1.5);
    }

    #[test]
    fn changes_are_reported_through_the_notifier() {
        let bus = SignalBus::new();
        let window = Uuid::new_v4();
        let mut surface = surface(4);
        surface.attach_notifier(bus.subscribe(window));

        surface.navigate_to(1, None);
        surface.navigate_to(1, None);
        surface.navigate_to(1, Some(PagePoint::new(0.0, 50.0)));
        surface.set_frame(Some(Rect::new(1.0, 2.0, 3.0, 4.0)));

        assert_eq!(
            bus.drain(),
            vec![
                (window, SurfaceSignal::ViewStateChanged),
                (window, SurfaceSignal::ViewStateChanged),
                (window, SurfaceSignal::FrameChanged(Rect::new(1.0, 2.0, 3.0, 4.0))),
            ]
        );
    }

    #[test]
    fn close_request_goes_through_the_notifier() {
        let bus = SignalBus::new();
        let window = Uuid::new_v4();
        let mut surface = surface(1);
        surface.request_close();
        assert!(bus.drain().is_empty());

        surface.attach_notifier(bus.subscribe(window));
        surface.request_close();
        assert_eq!(bus.drain(), vec![(window, SurfaceSignal::WindowClosing)]);
    }

    #[test]
    fn dropped_surface_no_longer_signals() {
        let bus = SignalBus::new();
        let mut surface = surface(2);
        surface.attach_notifier(bus.subscribe(Uuid::new_v4()));
        surface.navigate_to(1, None);
        drop(surface);
        assert!(bus.drain().is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
