//! Page assembler – slices a rendered surface into fixed-size PDF pages
//! using `printpdf` (v0.8 ops-based API).
//!
//! Every page is produced the same way: open a page-sized canvas, translate
//! it by `(0, -page_index * page_height)`, draw the whole surface and seal
//! the page. Pages are assembled strictly in order, one at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use printpdf::{Mm, PdfPage, PdfSaveOptions};

use crate::canvas::{FinishedPage, PageCanvas, Resources};
use crate::error::AssemblyError;
use crate::geometry::{PageGeometry, MM_PER_PT};
use crate::pagination::PaginationResult;
use crate::surface::RenderedSurface;

/// Upper bound on pages per document.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Shared flag telling a running assembly to stop at the next page boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Document-level options for the assembled PDF.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Title embedded in the PDF metadata.
    pub title: String,
    /// The sink refuses to allocate pages past this count.
    pub max_pages: usize,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            title: "papiro output".to_string(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// A finished PDF and the number of pages it holds.
#[derive(Debug, Clone)]
pub struct AssembledPdf {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Ordered, write-once page sink producing one PDF document.
pub struct PdfSink {
    resources: Resources,
    geometry: PageGeometry,
    pages: Vec<PdfPage>,
    max_pages: usize,
}

impl PdfSink {
    pub fn new(geometry: PageGeometry, options: &AssemblyOptions) -> Self {
        Self {
            resources: Resources::new(&options.title),
            geometry,
            pages: Vec::new(),
            max_pages: options.max_pages,
        }
    }

    /// Number of sealed pages so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Open page `page_number` (1-based). Pages must be opened in order and
    /// the previous one finished first.
    pub fn start_page(&mut self, page_number: usize) -> Result<PageCanvas<'_>, AssemblyError> {
        let expected = self.pages.len() + 1;
        if page_number != expected {
            return Err(AssemblyError::PageAllocation {
                page: page_number,
                reason: format!("expected page {expected} next"),
            });
        }
        if self.pages.len() >= self.max_pages {
            return Err(AssemblyError::PageAllocation {
                page: page_number,
                reason: format!("page limit of {} reached", self.max_pages),
            });
        }
        Ok(PageCanvas::new(page_number, self.geometry, &mut self.resources))
    }

    /// Append a sealed page to the document.
    pub fn finish_page(&mut self, page: FinishedPage) -> Result<(), AssemblyError> {
        let expected = self.pages.len() + 1;
        if page.page_number != expected {
            return Err(AssemblyError::PageAllocation {
                page: page.page_number,
                reason: format!("page finished out of order, expected page {expected}"),
            });
        }
        let width = Mm(self.geometry.page_width_pt() * MM_PER_PT);
        let height = Mm(self.geometry.page_height_pt() * MM_PER_PT);
        self.pages.push(PdfPage::new(width, height, page.ops));
        Ok(())
    }

    /// Serialise the document. Consumes the sink, so its resources are
    /// released whether or not the caller keeps the bytes.
    pub fn save(mut self) -> AssembledPdf {
        let page_count = self.pages.len();
        let pages = std::mem::take(&mut self.pages);
        self.resources.doc.with_pages(pages);
        let mut warnings = Vec::new();
        let bytes = self.resources.doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            log::debug!("PDF serialised with {} warning(s)", warnings.len());
        }
        AssembledPdf { bytes, page_count }
    }
}

/// Assemble `pagination.page_count` pages from `surface`.
///
/// Any page that cannot be allocated or drawn aborts the whole document; no
/// page is ever skipped. When `cancel` fires, assembly stops before the next
/// page with [`AssemblyError::Cancelled`].
pub fn assemble_pdf<S: RenderedSurface + ?Sized>(
    surface: &S,
    geometry: &PageGeometry,
    pagination: &PaginationResult,
    options: &AssemblyOptions,
    cancel: Option<&CancelToken>,
) -> Result<AssembledPdf, AssemblyError> {
    let mut sink = PdfSink::new(*geometry, options);

    for (page_index, y_offset) in pagination.page_offsets().enumerate() {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            log::warn!("Assembly cancelled before page {}", page_index + 1);
            return Err(AssemblyError::Cancelled);
        }

        let mut canvas = sink.start_page(page_index + 1)?;
        canvas.save();
        canvas.translate(0.0, -(y_offset as f32));
        surface.draw(&mut canvas)?;
        canvas.restore();
        let page = canvas.finish();
        sink.finish_page(page)?;
    }

    let assembled = sink.save();
    log::info!(
        "Assembled {} page(s), {} bytes",
        assembled.page_count,
        assembled.bytes.len()
    );
    Ok(assembled)
}
