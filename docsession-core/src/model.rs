use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnError, VecSkipError};

use crate::identity::DocumentKey;

/// A point in page space (PDF points, origin at the top-left of the page).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PagePoint {
    pub x: f64,
    pub y: f64,
}

impl PagePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Screen-space rectangle of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Unscaled page dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// One letter-keyed mark, also used as a jump-list location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookmarkState {
    pub page_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_in_page: Option<PagePoint>,
}

impl BookmarkState {
    pub fn at_page(page_index: usize) -> Self {
        Self {
            page_index,
            point_in_page: None,
        }
    }

    pub fn at_point(page_index: usize, point: PagePoint) -> Self {
        Self {
            page_index,
            point_in_page: Some(point),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zoom {
    /// Fit the page to the window.
    Auto,
    Scale(f64),
}

impl Zoom {
    pub fn is_valid_scale(scale: f64) -> bool {
        scale.is_finite() && scale > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DocumentViewState {
    pub page_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_in_page: Option<PagePoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f64>,
    pub uses_auto_scale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marks: Option<BTreeMap<char, BookmarkState>>,
}

impl DocumentViewState {
    pub fn with_zoom(mut self, zoom: Zoom) -> Self {
        match zoom {
            Zoom::Auto => {
                self.uses_auto_scale = true;
                self.scale_factor = None;
            }
            Zoom::Scale(scale) => {
                self.uses_auto_scale = false;
                self.scale_factor = Some(scale);
            }
        }
        self
    }

    /// The authoritative zoom mode. Auto-scale wins; a missing or invalid
    /// explicit scale also falls back to auto.
    pub fn zoom(&self) -> Zoom {
        if self.uses_auto_scale {
            return Zoom::Auto;
        }
        match self.scale_factor {
            Some(scale) if Zoom::is_valid_scale(scale) => Zoom::Scale(scale),
            _ => Zoom::Auto,
        }
    }

    pub fn location(&self) -> BookmarkState {
        BookmarkState {
            page_index: self.page_index,
            point_in_page: self.point_in_page,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    SinglePage,
    #[default]
    SinglePageContinuous,
    TwoUp,
    TwoUpContinuous,
}

impl LayoutMode {
    pub fn is_side_by_side(self) -> bool {
        matches!(self, LayoutMode::TwoUp | LayoutMode::TwoUpContinuous)
    }

    pub fn next(self) -> Self {
        match self {
            LayoutMode::SinglePage => LayoutMode::SinglePageContinuous,
            LayoutMode::SinglePageContinuous => LayoutMode::TwoUp,
            LayoutMode::TwoUp => LayoutMode::TwoUpContinuous,
            LayoutMode::TwoUpContinuous => LayoutMode::SinglePage,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LayoutMode::SinglePage => "single",
            LayoutMode::SinglePageContinuous => "continuous",
            LayoutMode::TwoUp => "two-up",
            LayoutMode::TwoUpContinuous => "two-up continuous",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutDirection {
    #[default]
    Vertical,
    Horizontal,
}

impl LayoutDirection {
    pub fn toggled(self) -> Self {
        match self {
            LayoutDirection::Vertical => LayoutDirection::Horizontal,
            LayoutDirection::Horizontal => LayoutDirection::Vertical,
        }
    }
}

/// Live page layout of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageLayout {
    pub mode: LayoutMode,
    pub direction: LayoutDirection,
    pub paired_pages: bool,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowState {
    pub document: DocumentKey,
    #[serde(default)]
    pub view: DocumentViewState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<Rect>,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub layout_mode: LayoutMode,
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default)]
    pub layout_direction: LayoutDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_page_layout: Option<bool>,
}

impl WindowState {
    /// Layout to apply when restoring this window. Paired pages default to on
    /// for side-by-side layouts when nothing explicit was saved.
    pub fn page_layout(&self) -> PageLayout {
        PageLayout {
            mode: self.layout_mode,
            direction: self.layout_direction,
            paired_pages: self
                .paired_page_layout
                .unwrap_or_else(|| self.layout_mode.is_side_by_side()),
        }
    }
}

/// Everything open at the time of the last save.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionSnapshot {
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    pub windows: Vec<WindowState>,
}

impl SessionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
