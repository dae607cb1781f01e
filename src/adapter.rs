//! Renderer adapters – the seam between this crate and whatever actually
//! lays out and paints HTML (a platform WebView, headless Chromium, …).
//!
//! One adapter instance serves exactly one conversion; a
//! [`RendererFactory`] creates a fresh, isolated instance per call. Dropping
//! an adapter must release everything it holds, which is how a conversion
//! that lost the timeout race is torn down.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ConvertError;
use crate::geometry::PageGeometry;
use crate::surface::BitmapSurface;

#[allow(async_fn_in_trait)]
pub trait RendererAdapter {
    type Surface: crate::surface::RenderedSurface + Send + 'static;

    /// Load `html` at the geometry's page width. Resolves once the renderer
    /// signals that loading finished, or fails with [`ConvertError::Render`].
    async fn load(&mut self, html: &str, geometry: &PageGeometry) -> Result<(), ConvertError>;

    /// Wait for layout to settle. The default sleeps for `settle`; adapters
    /// with an explicit readiness signal should wait for that instead.
    async fn wait_for_layout(&mut self, settle: Duration) {
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
    }

    /// Total content height in device pixels. `<= 0` means unmeasured.
    async fn measure_content_height(&mut self) -> Result<i64, ConvertError>;

    /// Re-layout the document at its full content height so everything can
    /// be drawn.
    async fn relayout(&mut self, content_height_px: u32) -> Result<(), ConvertError>;

    /// Snapshot the laid-out document. The surface is drawn at page width,
    /// so its height must be in page pixels.
    async fn surface(&mut self) -> Result<Self::Surface, ConvertError>;

    /// Release the renderer once the surface has been taken. Adapters that
    /// are simply dropped (e.g. on timeout) must still clean up in `Drop`.
    async fn close(self)
    where
        Self: Sized,
    {
    }
}

#[allow(async_fn_in_trait)]
pub trait RendererFactory {
    type Adapter: RendererAdapter;

    async fn create(&self) -> Result<Self::Adapter, ConvertError>;
}

/// Serves a screenshot the host has already rendered, e.g. a mobile WebView
/// drawn into a bitmap. The HTML passed to `load` is only checked, not
/// rendered.
#[derive(Debug, Clone)]
pub struct StaticRenderer {
    encoded: Arc<[u8]>,
    content_height_px: Option<i64>,
    page_width_px: u32,
    loaded: bool,
}

impl StaticRenderer {
    /// `encoded` is a PNG or JPEG of the whole document.
    pub fn new(encoded: impl Into<Arc<[u8]>>) -> Self {
        Self {
            encoded: encoded.into(),
            content_height_px: None,
            page_width_px: 0,
            loaded: false,
        }
    }

    /// Report this height (in page pixels) instead of the bitmap height.
    pub fn with_content_height(mut self, content_height_px: i64) -> Self {
        self.content_height_px = Some(content_height_px);
        self
    }

    fn bitmap(&self) -> Result<BitmapSurface, ConvertError> {
        Ok(BitmapSurface::from_encoded(Arc::clone(&self.encoded))?)
    }
}

impl RendererFactory for StaticRenderer {
    type Adapter = StaticRenderer;

    async fn create(&self) -> Result<Self::Adapter, ConvertError> {
        Ok(Self {
            loaded: false,
            ..self.clone()
        })
    }
}

impl RendererAdapter for StaticRenderer {
    type Surface = BitmapSurface;

    async fn load(&mut self, html: &str, geometry: &PageGeometry) -> Result<(), ConvertError> {
        if html.trim().is_empty() {
            return Err(ConvertError::Render("nothing to load".to_string()));
        }
        self.page_width_px = geometry.page_width_px;
        self.loaded = true;
        Ok(())
    }

    async fn wait_for_layout(&mut self, _settle: Duration) {}

    async fn measure_content_height(&mut self) -> Result<i64, ConvertError> {
        if !self.loaded {
            return Err(ConvertError::Render("content measured before load".to_string()));
        }
        match self.content_height_px {
            Some(h) => Ok(h),
            None => Ok(self.bitmap()?.height_at_width(self.page_width_px)),
        }
    }

    async fn relayout(&mut self, _content_height_px: u32) -> Result<(), ConvertError> {
        Ok(())
    }

    async fn surface(&mut self) -> Result<Self::Surface, ConvertError> {
        let surface = self.bitmap()?;
        let height = match self.content_height_px {
            Some(h) => h,
            None => surface.height_at_width(self.page_width_px),
        };
        Ok(surface.with_content_height(height))
    }
}
