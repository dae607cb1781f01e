//! Page geometry – the fixed page size every PDF page of a document shares.
//!
//! Renderers work in device pixels; PDF pages are measured in points
//! (1 pt = 1/72 inch). A [`PageGeometry`] ties the two together with a scale
//! factor so that an A4 page rendered at 3× becomes 1785 × 2526 pixels but
//! is still emitted as a 595 × 842 pt PDF page.

use serde::{Deserialize, Serialize};

/// Millimetres per PDF point.
pub const MM_PER_PT: f32 = 0.352_778;

/// Default pixels-per-point factor: a balance between raster quality and
/// the memory needed for a full-document bitmap.
pub const DEFAULT_SCALE: f32 = 3.0;

/// Default fraction of a page height that trailing content may overhang
/// before it earns a page of its own.
pub const DEFAULT_OVERHANG_TOLERANCE: f64 = 0.02;

/// Standard paper sizes, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaperSize {
    #[default]
    A4,
    Letter,
    Legal,
    /// Custom width × height in points.
    Custom { width_pt: f32, height_pt: f32 },
}

impl PaperSize {
    /// Portrait `(width, height)` in points.
    pub fn dimensions_pt(&self) -> (f32, f32) {
        match self {
            PaperSize::A4 => (595.0, 842.0),
            PaperSize::Letter => (612.0, 792.0),
            PaperSize::Legal => (612.0, 1008.0),
            PaperSize::Custom { width_pt, height_pt } => (*width_pt, *height_pt),
        }
    }
}

/// Page orientation for the generated PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width > height.
    Landscape,
}

/// Immutable per-document page configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Page width in device pixels.
    pub page_width_px: u32,
    /// Page height in device pixels.
    pub page_height_px: u32,
    /// Fraction of a page in `[0, 1)`; see [`crate::pagination`].
    pub overhang_tolerance: f64,
    /// Device pixels per PDF point.
    pub scale: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::for_paper(PaperSize::A4, PageOrientation::Portrait, DEFAULT_SCALE)
    }
}

impl PageGeometry {
    /// Geometry for a paper size rendered at `scale` pixels per point.
    pub fn for_paper(paper: PaperSize, orientation: PageOrientation, scale: f32) -> Self {
        let (w, h) = paper.dimensions_pt();
        let (w, h) = match orientation {
            PageOrientation::Portrait => (w, h),
            PageOrientation::Landscape => (h, w),
        };
        let scale = if scale > 0.0 { scale } else { 1.0 };
        Self {
            page_width_px: (w * scale).round() as u32,
            page_height_px: (h * scale).round() as u32,
            overhang_tolerance: DEFAULT_OVERHANG_TOLERANCE,
            scale,
        }
    }

    /// Same geometry with a different overhang tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.overhang_tolerance = tolerance;
        self
    }

    /// Page width in PDF points.
    pub fn page_width_pt(&self) -> f32 {
        self.px_to_pt(self.page_width_px as f32)
    }

    /// Page height in PDF points.
    pub fn page_height_pt(&self) -> f32 {
        self.px_to_pt(self.page_height_px as f32)
    }

    pub fn px_to_pt(&self, px: f32) -> f32 {
        px / self.scale
    }
}
