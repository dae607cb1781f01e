//! Page canvas – a page-sized drawing target that records printpdf ops.
//!
//! Coordinates are device pixels with the origin at the top-left of the
//! page. A save/translate/restore stack offsets everything drawn, which is
//! how the assembler selects a page slice: translating by `(0, -y)` and then
//! drawing the *whole* surface leaves only `[y, y + page_height)` on the
//! page. Anything outside the page is cropped by the PDF media box.

use std::collections::HashMap;

use printpdf::*;

use crate::error::AssemblyError;
use crate::geometry::PageGeometry;

/// A printpdf XObject together with the pixel dimensions of the source image.
struct EmbeddedImage {
    xobj_id: XObjectId,
    px_width: usize,
    px_height: usize,
}

/// Document-wide resources shared by every page of one PDF.
pub(crate) struct Resources {
    pub(crate) doc: PdfDocument,
    images: HashMap<String, EmbeddedImage>,
}

impl Resources {
    pub(crate) fn new(title: &str) -> Self {
        Self {
            doc: PdfDocument::new(title),
            images: HashMap::new(),
        }
    }

    /// Register an encoded image once per document under `key`.
    fn image(&mut self, key: &str, encoded: &[u8]) -> Result<&EmbeddedImage, AssemblyError> {
        if !self.images.contains_key(key) {
            let mut warnings = Vec::new();
            let raw = RawImage::decode_from_bytes(encoded, &mut warnings)
                .map_err(|e| AssemblyError::Image(e.to_string()))?;
            let embedded = EmbeddedImage {
                px_width: raw.width,
                px_height: raw.height,
                xobj_id: self.doc.add_image(&raw),
            };
            log::debug!(
                "Embedded image '{key}' ({}x{} px)",
                embedded.px_width,
                embedded.px_height
            );
            self.images.insert(key.to_string(), embedded);
        }
        self.images
            .get(key)
            .ok_or_else(|| AssemblyError::Image(format!("image '{key}' missing after registration")))
    }
}

/// A sealed page: its ops can no longer be changed.
pub struct FinishedPage {
    pub(crate) page_number: usize,
    pub(crate) ops: Vec<Op>,
}

impl FinishedPage {
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }
}

/// Drawing target for one page of the output document.
pub struct PageCanvas<'a> {
    page_number: usize,
    geometry: PageGeometry,
    resources: &'a mut Resources,
    ops: Vec<Op>,
    offset: (f32, f32),
    saved: Vec<(f32, f32)>,
}

impl<'a> PageCanvas<'a> {
    pub(crate) fn new(page_number: usize, geometry: PageGeometry, resources: &'a mut Resources) -> Self {
        Self {
            page_number,
            geometry,
            resources,
            ops: Vec::new(),
            offset: (0.0, 0.0),
            saved: Vec::new(),
        }
    }

    /// 1-based page number.
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn width_px(&self) -> u32 {
        self.geometry.page_width_px
    }

    pub fn height_px(&self) -> u32 {
        self.geometry.page_height_px
    }

    /// Push the current translation.
    pub fn save(&mut self) {
        self.saved.push(self.offset);
    }

    /// Pop the last saved translation. Unbalanced calls reset to the origin.
    pub fn restore(&mut self) {
        self.offset = self.saved.pop().unwrap_or((0.0, 0.0));
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.offset.0 += dx;
        self.offset.1 += dy;
    }

    /// Current translation in pixels.
    pub fn offset(&self) -> (f32, f32) {
        self.offset
    }

    /// Whether a rectangle, after translation, overlaps the page at all.
    pub fn is_visible(&self, x: f32, y: f32, width: f32, height: f32) -> bool {
        let (left, top) = (x + self.offset.0, y + self.offset.1);
        left < self.geometry.page_width_px as f32
            && top < self.geometry.page_height_px as f32
            && left + width > 0.0
            && top + height > 0.0
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Fill a rectangle with an RGB colour (components in `0.0..=1.0`).
    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, rgb: [f32; 3]) {
        if !self.is_visible(x, y, width, height) {
            return;
        }
        let x1 = self.geometry.px_to_pt(x + self.offset.0);
        let x2 = self.geometry.px_to_pt(x + self.offset.0 + width);
        // PDF origin is bottom-left.
        let y1 = self.pdf_y(y + height);
        let y2 = self.pdf_y(y);

        self.ops.push(Op::SetFillColor {
            col: Color::Rgb(Rgb {
                r: rgb[0],
                g: rgb[1],
                b: rgb[2],
                icc_profile: None,
            }),
        });
        let corner = |x: f32, y: f32| LinePoint {
            p: Point { x: Pt(x), y: Pt(y) },
            bezier: false,
        };
        self.ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: vec![corner(x1, y1), corner(x2, y1), corner(x2, y2), corner(x1, y2)],
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    /// Draw an encoded (PNG/JPEG) image with its top-left corner at `(x, y)`,
    /// scaled to `width × height` pixels.
    ///
    /// The image is embedded once per document under `key`; later pages only
    /// reference it.
    pub fn draw_image(
        &mut self,
        key: &str,
        encoded: &[u8],
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<(), AssemblyError> {
        if !self.is_visible(x, y, width, height) {
            return Ok(());
        }
        let translate_x = self.geometry.px_to_pt(x + self.offset.0);
        let translate_y = self.pdf_y(y + height);
        let (width_pt, height_pt) = (self.geometry.px_to_pt(width), self.geometry.px_to_pt(height));

        let image = self.resources.image(key, encoded)?;
        // At dpi=72 printpdf renders 1 px = 1 pt, so scale = desired_pt / px_dim.
        let scale_x = if image.px_width > 0 {
            width_pt / image.px_width as f32
        } else {
            1.0
        };
        let scale_y = if image.px_height > 0 {
            height_pt / image.px_height as f32
        } else {
            1.0
        };
        let id = image.xobj_id.clone();

        self.ops.push(Op::UseXobject {
            id,
            transform: XObjectTransform {
                translate_x: Some(Pt(translate_x)),
                translate_y: Some(Pt(translate_y)),
                dpi: Some(72.0),
                scale_x: Some(scale_x),
                scale_y: Some(scale_y),
                rotate: None,
            },
        });
        Ok(())
    }

    /// Seal the page.
    pub fn finish(self) -> FinishedPage {
        FinishedPage {
            page_number: self.page_number,
            ops: self.ops,
        }
    }

    /// PDF-space y (points, bottom-left origin) of a top-left pixel y
    /// before translation.
    fn pdf_y(&self, y_px: f32) -> f32 {
        self.geometry.page_height_pt() - self.geometry.px_to_pt(y_px + self.offset.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> PageGeometry {
        PageGeometry {
            page_width_px: 200,
            page_height_px: 100,
            overhang_tolerance: 0.02,
            scale: 2.0,
        }
    }

    #[test]
    fn translate_save_restore() {
        let mut resources = Resources::new("t");
        let mut canvas = PageCanvas::new(1, geometry(), &mut resources);
        canvas.save();
        canvas.translate(0.0, -100.0);
        canvas.translate(5.0, -50.0);
        assert_eq!(canvas.offset(), (5.0, -150.0));
        canvas.restore();
        assert_eq!(canvas.offset(), (0.0, 0.0));
        canvas.restore();
        assert_eq!(canvas.offset(), (0.0, 0.0));
    }

    #[test]
    fn visibility_follows_translation() {
        let mut resources = Resources::new("t");
        let mut canvas = PageCanvas::new(2, geometry(), &mut resources);
        canvas.translate(0.0, -100.0);
        // First page slice is above the visible area now.
        assert!(!canvas.is_visible(0.0, 0.0, 200.0, 100.0));
        assert!(canvas.is_visible(0.0, 100.0, 200.0, 100.0));
        assert!(canvas.is_visible(0.0, 0.0, 200.0, 101.0));
    }

    #[test]
    fn hidden_rects_emit_nothing() {
        let mut resources = Resources::new("t");
        let mut canvas = PageCanvas::new(1, geometry(), &mut resources);
        canvas.fill_rect(0.0, 150.0, 200.0, 20.0, [1.0, 0.0, 0.0]);
        assert!(canvas.ops().is_empty());
        canvas.fill_rect(0.0, 50.0, 200.0, 20.0, [1.0, 0.0, 0.0]);
        assert_eq!(canvas.ops().len(), 2);
        let page = canvas.finish();
        assert_eq!(page.page_number(), 1);
        assert_eq!(page.ops().len(), 2);
    }

    #[test]
    fn undecodable_image_is_an_error() {
        let mut resources = Resources::new("t");
        let mut canvas = PageCanvas::new(1, geometry(), &mut resources);
        let err = canvas
            .draw_image("bad", b"not an image", 0.0, 0.0, 10.0, 10.0)
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Image(_)));
    }
}
