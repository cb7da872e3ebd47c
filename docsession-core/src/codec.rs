use std::path::Path;

use crate::identity::DocumentKey;
use crate::model::{DocumentViewState, PageLayout, PagePoint, Rect, WindowState, Zoom};
use crate::navigation::NavigationCore;
use crate::signals::SurfaceNotifier;

/// What the core needs from a live viewing surface.
pub trait ViewingSurface: Send {
    /// `None` when nothing is displayed (for example an empty document).
    fn current_page_index(&self) -> Option<usize>;
    /// Page-local position of the viewport anchor (top-left of the viewport).
    fn current_point_in_page(&self) -> Option<PagePoint>;
    fn current_zoom(&self) -> Zoom;
    /// Scale actually in use; for auto zoom, the fitted one.
    fn effective_scale(&self) -> f64;
    fn set_zoom(&mut self, zoom: Zoom);
    fn page_count(&self) -> usize;
    /// `None` scrolls to the top of the page.
    fn navigate_to(&mut self, page_index: usize, point: Option<PagePoint>);
    fn layout(&self) -> PageLayout;
    fn set_layout(&mut self, layout: PageLayout);
    fn frame(&self) -> Option<Rect>;
    fn set_frame(&mut self, frame: Option<Rect>);
    fn document_path(&self) -> Option<&Path>;
    fn attach_notifier(&mut self, notifier: SurfaceNotifier);
    /// Asks the owner to close this window through the notifier.
    fn request_close(&self);
}

pub fn clamp_page(page_index: usize, page_count: usize) -> usize {
    page_index.min(page_count.saturating_sub(1))
}

pub struct ViewStateCodec;

impl ViewStateCodec {
    pub fn capture(
        surface: &dyn ViewingSurface,
        navigation: &NavigationCore,
    ) -> Option<DocumentViewState> {
        surface.document_path()?;
        let page_index = surface.current_page_index()?;
        let marks = navigation.export_marks();
        let view = DocumentViewState {
            page_index,
            point_in_page: surface.current_point_in_page(),
            scale_factor: None,
            uses_auto_scale: false,
            marks: (!marks.is_empty()).then_some(marks),
        };
        Some(view.with_zoom(surface.current_zoom()))
    }

    pub fn capture_window(
        surface: &dyn ViewingSurface,
        navigation: &NavigationCore,
        document: &DocumentKey,
    ) -> Option<WindowState> {
        let view = Self::capture(surface, navigation)?;
        let layout = surface.layout();
        Some(WindowState {
            document: document.clone(),
            view,
            frame: surface.frame(),
            layout_mode: layout.mode,
            layout_direction: layout.direction,
            paired_page_layout: Some(layout.paired_pages),
        })
    }

    /// Applies a saved window to a freshly opened surface.
    ///
    /// Layout, frame and zoom are applied before navigating. The exact point is
    /// only trusted when `fingerprint_ok`; otherwise the top of the clamped page
    /// is shown. Marks follow the same rule.
    pub fn restore(
        surface: &mut dyn ViewingSurface,
        navigation: &mut NavigationCore,
        saved: &WindowState,
        fingerprint_ok: bool,
    ) {
        surface.set_layout(saved.page_layout());
        if saved.frame.is_some() {
            surface.set_frame(saved.frame);
        }
        surface.set_zoom(saved.view.zoom());

        let page_count = surface.page_count();
        if page_count > 0 {
            let page = clamp_page(saved.view.page_index, page_count);
            let point = saved.view.point_in_page.filter(|_| fingerprint_ok);
            surface.navigate_to(page, point);
        }

        if let Some(marks) = &saved.view.marks {
            navigation.import_marks(marks, fingerprint_ok);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use crate::identity::{FileFingerprint, LocatorToken};
    use crate::model::{BookmarkState, LayoutDirection, LayoutMode, PageSize};
    use crate::surface::PagedSurface;

    fn key() -> DocumentKey {
        DocumentKey {
            locator: LocatorToken::from_bytes(b"doc".to_vec()),
            fingerprint: FileFingerprint {
                size: 10,
                mod_time: 5.0,
            },
        }
    }

    fn surface(pages: usize) -> PagedSurface {
        PagedSurface::new(
            PathBuf::from("/docs/paper.pdf"),
            vec![PageSize::LETTER; pages],
        )
    }

    fn saved(page: usize, zoom: Zoom) -> WindowState {
        let mut marks = BTreeMap::new();
        marks.insert('a', BookmarkState::at_point(1, PagePoint::new(10.0, 10.0)));
        WindowState {
            document: key(),
            view: DocumentViewState {
                page_index: page,
                point_in_page: Some(PagePoint::new(100.0, 200.0)),
                marks: Some(marks),
                ..DocumentViewState::default()
            }
            .with_zoom(zoom),
            frame: Some(Rect::new(5.0, 5.0, 900.0, 700.0)),
            layout_mode: LayoutMode::TwoUp,
            layout_direction: LayoutDirection::Horizontal,
            paired_page_layout: None,
        }
    }

    #[test]
    fn capture_reads_page_point_zoom_and_marks() {
        let mut surface = surface(10);
        let mut navigation = NavigationCore::new();
        surface.navigate_to(3, Some(PagePoint::new(20.0, 40.0)));
        surface.set_zoom(Zoom::Scale(1.5));
        navigation.set_mark('q', &surface);

        let view = ViewStateCodec::capture(&surface, &navigation).unwrap();
        assert_eq!(view.page_index, 3);
        assert_eq!(view.point_in_page, Some(PagePoint::new(20.0, 40.0)));
        assert_eq!(view.zoom(), Zoom::Scale(1.5));
        assert!(!view.uses_auto_scale);
        assert_eq!(view.marks.unwrap().len(), 1);
    }

    #[test]
    fn capture_omits_empty_marks_and_records_auto_zoom() {
        let surface = surface(2);
        let view = ViewStateCodec::capture(&surface, &NavigationCore::new()).unwrap();
        assert!(view.marks.is_none());
        assert!(view.uses_auto_scale);
        assert_eq!(view.scale_factor, None);
    }

    #[test]
    fn capture_fails_without_pages() {
        let surface = surface(0);
        assert!(ViewStateCodec::capture(&surface, &NavigationCore::new()).is_none());
    }

    #[test]
    fn restore_with_matching_fingerprint_reaches_exact_point() {
        let mut surface = surface(10);
        let mut navigation = NavigationCore::new();
        ViewStateCodec::restore(
            &mut surface,
            &mut navigation,
            &saved(7, Zoom::Scale(2.0)),
            true,
        );

        assert_eq!(surface.current_page_index(), Some(7));
        assert_eq!(
            surface.current_point_in_page(),
            Some(PagePoint::new(100.0, 200.0))
        );
        assert_eq!(surface.current_zoom(), Zoom::Scale(2.0));
        assert_eq!(surface.frame(), Some(Rect::new(5.0, 5.0, 900.0, 700.0)));
        let layout = surface.layout();
        assert_eq!(layout.mode, LayoutMode::TwoUp);
        assert_eq!(layout.direction, LayoutDirection::Horizontal);
        assert!(layout.paired_pages);
        assert_eq!(
            navigation.export_marks()[&'a'].point_in_page,
            Some(PagePoint::new(10.0, 10.0))
        );
    }

    #[test]
    fn restore_after_fingerprint_change_clamps_and_drops_point() {
        let mut surface = surface(4);
        let mut navigation = NavigationCore::new();
        ViewStateCodec::restore(&mut surface, &mut navigation, &saved(9, Zoom::Auto), false);

        assert_eq!(surface.current_page_index(), Some(3));
        assert_eq!(
            surface.current_point_in_page(),
            Some(PagePoint::new(0.0, 0.0))
        );
        assert_eq!(surface.current_zoom(), Zoom::Auto);
        assert_eq!(navigation.export_marks()[&'a'].point_in_page, None);
        assert_eq!(navigation.export_marks()[&'a'].page_index, 1);
    }

    #[test]
    fn restore_on_empty_document_does_not_navigate() {
        let mut surface = surface(0);
        let mut navigation = NavigationCore::new();
        ViewStateCodec::restore(&mut surface, &mut navigation, &saved(2, Zoom::Auto), true);
        assert_eq!(surface.current_page_index(), None);
    }
}
