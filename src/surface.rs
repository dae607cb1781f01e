//! Rendered surfaces – what a renderer hands to the page assembler.

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::{ImageFormat, ImageReader, RgbaImage};

use crate::canvas::PageCanvas;
use crate::error::AssemblyError;

/// A fully rendered document of fixed width and measurable height.
///
/// `draw` paints the *entire* content with its top-left corner at the
/// canvas origin, spanning the canvas width. The caller translates the
/// canvas first to select a page slice, so implementations never need to
/// know which page they are on. Heights are in page pixels.
pub trait RenderedSurface {
    fn width_px(&self) -> u32;

    /// Content height in pixels. May be 0 (or negative) when unmeasured.
    fn height_px(&self) -> i64;

    fn draw(&self, canvas: &mut PageCanvas<'_>) -> Result<(), AssemblyError>;
}

impl<T: RenderedSurface + ?Sized> RenderedSurface for Box<T> {
    fn width_px(&self) -> u32 {
        (**self).width_px()
    }

    fn height_px(&self) -> i64 {
        (**self).height_px()
    }

    fn draw(&self, canvas: &mut PageCanvas<'_>) -> Result<(), AssemblyError> {
        (**self).draw(canvas)
    }
}

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// A surface backed by one tall raster screenshot of the document.
#[derive(Debug, Clone)]
pub struct BitmapSurface {
    key: String,
    encoded: Arc<[u8]>,
    width_px: u32,
    bitmap_height_px: u32,
    content_height_px: i64,
}

impl BitmapSurface {
    /// Wrap encoded PNG or JPEG bytes. Only the image header is read here.
    pub fn from_encoded(encoded: impl Into<Arc<[u8]>>) -> Result<Self, AssemblyError> {
        let encoded: Arc<[u8]> = encoded.into();
        let (width_px, bitmap_height_px) = ImageReader::new(Cursor::new(&encoded[..]))
            .with_guessed_format()
            .map_err(|e| AssemblyError::Image(e.to_string()))?
            .into_dimensions()
            .map_err(|e| AssemblyError::Image(e.to_string()))?;

        Ok(Self {
            key: format!("surface-{}", NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed)),
            encoded,
            width_px,
            bitmap_height_px,
            content_height_px: bitmap_height_px as i64,
        })
    }

    /// Encode an in-memory RGBA bitmap as PNG.
    pub fn from_rgba(bitmap: &RgbaImage) -> Result<Self, AssemblyError> {
        let mut png = Vec::new();
        bitmap
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| AssemblyError::Image(e.to_string()))?;
        Self::from_encoded(png)
    }

    /// Override the content height reported to the paginator, e.g. with the
    /// renderer's own measurement when it differs from the bitmap height.
    pub fn with_content_height(mut self, content_height_px: i64) -> Self {
        self.content_height_px = content_height_px;
        self
    }

    pub fn bitmap_height_px(&self) -> u32 {
        self.bitmap_height_px
    }

    /// Bitmap height once scaled to `width_px` wide, keeping the aspect
    /// ratio. A zero width on either side leaves the height unscaled.
    pub fn height_at_width(&self, width_px: u32) -> i64 {
        if width_px == 0 || self.width_px == 0 {
            return self.bitmap_height_px as i64;
        }
        (self.bitmap_height_px as f64 * width_px as f64 / self.width_px as f64).round() as i64
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }
}

impl RenderedSurface for BitmapSurface {
    fn width_px(&self) -> u32 {
        self.width_px
    }

    fn height_px(&self) -> i64 {
        self.content_height_px
    }

    /// Draws the bitmap stretched to the page width. Screenshots taken in
    /// CSS pixels rather than device pixels still fill the page.
    fn draw(&self, canvas: &mut PageCanvas<'_>) -> Result<(), AssemblyError> {
        let page_width = canvas.width_px();
        canvas.draw_image(
            &self.key,
            &self.encoded,
            0.0,
            0.0,
            page_width as f32,
            self.height_at_width(page_width) as f32,
        )
    }
}
