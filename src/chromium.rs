//! Headless Chromium renderer adapter (feature `chromium`).
//!
//! Each adapter launches its own browser so concurrent conversions never
//! share page content. The viewport is one page wide in CSS pixels with a
//! device scale factor equal to the geometry scale, so screenshots come out
//! at the page's device-pixel width.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::adapter::{RendererAdapter, RendererFactory};
use crate::error::ConvertError;
use crate::geometry::PageGeometry;
use crate::surface::{BitmapSurface, RenderedSurface};

/// Resolves once web fonts have loaded and two animation frames have been
/// painted.
const LAYOUT_READY_JS: &str = "document.fonts.ready.then(() => new Promise(r => \
    requestAnimationFrame(() => requestAnimationFrame(() => r(true)))))";

const CONTENT_HEIGHT_JS: &str =
    "Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0)";

fn render_err(e: impl std::fmt::Display) -> ConvertError {
    ConvertError::Render(e.to_string())
}

/// Launches one headless browser per conversion.
#[derive(Debug, Clone, Default)]
pub struct ChromiumFactory {
    /// Run Chromium without its sandbox (needed in most containers).
    pub no_sandbox: bool,
}

impl RendererFactory for ChromiumFactory {
    type Adapter = ChromiumRenderer;

    async fn create(&self) -> Result<Self::Adapter, ConvertError> {
        let mut builder = BrowserConfig::builder();
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(render_err)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(render_err)?;
        // Drive the CDP handler on a background task.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        log::debug!("Launched headless Chromium");

        Ok(ChromiumRenderer {
            browser,
            handler_task,
            page: None,
            geometry: PageGeometry::default(),
            content_height_px: 0,
        })
    }
}

pub struct ChromiumRenderer {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Option<Page>,
    geometry: PageGeometry,
    content_height_px: u32,
}

impl ChromiumRenderer {
    fn page(&self) -> Result<&Page, ConvertError> {
        self.page
            .as_ref()
            .ok_or_else(|| ConvertError::Render("no document loaded".to_string()))
    }

    async fn set_viewport(&self, height_px: u32) -> Result<(), ConvertError> {
        let scale = self.geometry.scale as f64;
        let css_width = (self.geometry.page_width_px as f64 / scale).round() as i64;
        let css_height = ((height_px as f64 / scale).ceil() as i64).max(1);
        let params = SetDeviceMetricsOverrideParams::new(css_width, css_height, scale, false);
        self.page()?.execute(params).await.map_err(render_err)?;
        Ok(())
    }
}

impl Drop for ChromiumRenderer {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

impl RendererAdapter for ChromiumRenderer {
    type Surface = BitmapSurface;

    async fn load(&mut self, html: &str, geometry: &PageGeometry) -> Result<(), ConvertError> {
        self.geometry = *geometry;
        let page = self.browser.new_page("about:blank").await.map_err(render_err)?;
        self.page = Some(page);
        self.set_viewport(geometry.page_height_px).await?;
        // Waits for the load event of the new content.
        self.page()?.set_content(html).await.map_err(render_err)?;
        Ok(())
    }

    async fn wait_for_layout(&mut self, settle: Duration) {
        let ready = match self.page() {
            Ok(page) => tokio::time::timeout(settle.max(Duration::from_millis(50)), page.evaluate(LAYOUT_READY_JS))
                .await
                .map(|r| r.is_ok())
                .unwrap_or(false),
            Err(_) => false,
        };
        if !ready {
            log::debug!("No layout readiness signal within {settle:?}");
        }
    }

    async fn measure_content_height(&mut self) -> Result<i64, ConvertError> {
        let css_height: f64 = self
            .page()?
            .evaluate(CONTENT_HEIGHT_JS)
            .await
            .map_err(render_err)?
            .into_value()
            .map_err(render_err)?;
        let height = (css_height * self.geometry.scale as f64).round() as i64;
        log::debug!("Measured content height {height}px");
        Ok(height)
    }

    async fn relayout(&mut self, content_height_px: u32) -> Result<(), ConvertError> {
        self.content_height_px = content_height_px;
        self.set_viewport(content_height_px).await
    }

    /// Captures the viewport, which `relayout` sized to the full content.
    /// A full-page capture would reset the device scale factor to 1 and
    /// return CSS pixels.
    async fn surface(&mut self) -> Result<Self::Surface, ConvertError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let png = self.page()?.screenshot(params).await.map_err(render_err)?;
        let surface = BitmapSurface::from_encoded(png)?;
        if surface.width_px() != self.geometry.page_width_px {
            log::debug!(
                "Screenshot is {}px wide, page is {}px; scaling to fit",
                surface.width_px(),
                self.geometry.page_width_px
            );
        }
        Ok(surface.with_content_height(self.content_height_px as i64))
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            log::debug!("Chromium close failed: {e}");
        }
        self.handler_task.abort();
    }
}
