//! Pagination – how many fixed-size pages a continuous document needs.
//!
//! Renderer-reported content heights are often a few pixels off because of
//! sub-pixel rounding, so a document that only marginally overflows its last
//! page is absorbed into that page instead of producing a near-blank extra
//! page. The overhang tolerance is the fraction of a page height below which
//! that happens.

use crate::geometry::PageGeometry;

/// Number of pages needed for `content_height_px` of content.
///
/// Always returns at least one page: zero, negative or unmeasured heights
/// fall back to a single page. A zero `page_height_px` also yields one page,
/// and `overhang_tolerance` is clamped into `[0, 1)`.
pub fn pages_from_height(content_height_px: i64, page_height_px: u32, overhang_tolerance: f64) -> u32 {
    if page_height_px == 0 {
        return 1;
    }
    let tolerance = if overhang_tolerance.is_nan() {
        0.0
    } else {
        overhang_tolerance.clamp(0.0, 1.0 - f64::EPSILON)
    };

    let exact_pages = content_height_px as f64 / page_height_px as f64;
    let remainder = exact_pages - exact_pages.floor();

    let page_count = if remainder < tolerance {
        exact_pages.floor()
    } else {
        exact_pages.ceil()
    };

    if page_count < 1.0 {
        1
    } else if page_count >= u32::MAX as f64 {
        u32::MAX
    } else {
        page_count as u32
    }
}

/// Outcome of paginating one rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationResult {
    pub page_count: u32,
    pub content_height_px: i64,
    pub page_height_px: u32,
}

impl PaginationResult {
    /// Document-space y offset of every page, in page order.
    pub fn page_offsets(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.page_count).map(move |i| i as i64 * self.page_height_px as i64)
    }
}

/// Paginate `content_height_px` against a document's geometry.
pub fn paginate(content_height_px: i64, geometry: &PageGeometry) -> PaginationResult {
    let page_count = pages_from_height(
        content_height_px,
        geometry.page_height_px,
        geometry.overhang_tolerance,
    );
    log::debug!(
        "Paginated {content_height_px}px into {page_count} page(s) of {}px",
        geometry.page_height_px
    );
    PaginationResult {
        page_count,
        content_height_px,
        page_height_px: geometry.page_height_px,
    }
}
