use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use docsession_core::{DocumentProvider, PageSize, PagedSurface, ViewingSurface};
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

/// Runtime override for the pdfium shared library location.
pub const PDFIUM_LIBRARY_ENV: &str = "DOCSESSION_PDFIUM_LIBRARY_PATH";

/// Opens PDF files as paged surfaces. Only page geometry is read.
pub struct PdfiumSurfaceFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumSurfaceFactory {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }

    #[instrument(skip(self))]
    pub fn page_sizes(&self, path: &Path) -> Result<Vec<PageSize>> {
        let document = self
            .pdfium
            .load_pdf_from_file(path, None)
            .with_context(|| format!("failed to open {:?}", path))?;
        let sizes: Vec<PageSize> = document
            .pages()
            .iter()
            .map(|page| normalize_page_size(page.width().value, page.height().value))
            .collect();
        debug!(pages = sizes.len(), "document loaded");
        Ok(sizes)
    }
}

#[async_trait]
impl DocumentProvider for PdfiumSurfaceFactory {
    async fn open(&self, path: &Path) -> Result<Box<dyn ViewingSurface>> {
        let absolute: PathBuf = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let sizes = self.page_sizes(&absolute)?;
        Ok(Box::new(PagedSurface::new(absolute, sizes)))
    }
}

/// Pages with a broken media box fall back to US Letter.
pub fn normalize_page_size(width: f32, height: f32) -> PageSize {
    let valid = |v: f32| v.is_finite() && v > 0.0;
    if valid(width) && valid(height) {
        PageSize::new(f64::from(width), f64::from(height))
    } else {
        PageSize::LETTER
    }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = env::var_os(PDFIUM_LIBRARY_ENV)?;
    if path.is_empty() {
        return None;
    }
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                "failed to load Pdfium from {}: {}",
                Path::new(&path).display(),
                err
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}
