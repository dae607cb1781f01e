//! Integration tests for the papiro pipeline.
//!
//! These tests validate:
//! - Page counts follow the overhang-tolerance rule
//! - Assembled PDFs hold exactly the computed number of equal-sized pages
//! - The conversion service reports every failure as a result value
//! - The deadline bounds a renderer that never finishes
//! - Template substitution

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use papiro::adapter::{RendererAdapter, RendererFactory, StaticRenderer};
use papiro::canvas::PageCanvas;
use papiro::pagination::{pages_from_height, paginate};
use papiro::render::{assemble_pdf, AssemblyOptions};
use papiro::surface::{BitmapSurface, RenderedSurface};
use papiro::templates::{self, replace_tags, TemplateValues};
use papiro::{AssemblyError, ConvertError, ConverterConfig, HtmlToPdfService, PageGeometry, PageOrientation, PaperSize};

// =====================================================================
// Helper
// =====================================================================

/// 50 × 100 pt pages at one pixel per point.
fn small_geometry() -> PageGeometry {
    PageGeometry::for_paper(
        PaperSize::Custom {
            width_pt: 50.0,
            height_pt: 100.0,
        },
        PageOrientation::Portrait,
        1.0,
    )
}

fn small_config(output_dir: &Path) -> ConverterConfig {
    ConverterConfig {
        paper: PaperSize::Custom {
            width_pt: 50.0,
            height_pt: 100.0,
        },
        scale: 1.0,
        load_settle_ms: 0,
        relayout_settle_ms: 0,
        timeout_ms: 10_000,
        output_dir: output_dir.to_path_buf(),
        ..ConverterConfig::default()
    }
}

/// A striped bitmap so every page slice has visible content.
fn document_png(width: u32, height: u32) -> Vec<u8> {
    let bitmap = RgbaImage::from_fn(width, height, |_, y| {
        if (y / 10) % 2 == 0 {
            Rgba([20, 20, 20, 255])
        } else {
            Rgba([250, 250, 250, 255])
        }
    });
    BitmapSurface::from_rgba(&bitmap).unwrap().encoded().to_vec()
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

fn pdf_page_count(bytes: &[u8]) -> usize {
    let doc = lopdf::Document::load_mem(bytes).expect("produced PDF should parse");
    doc.get_pages().len()
}

fn pdf_media_boxes(bytes: &[u8]) -> Vec<Vec<f32>> {
    let doc = lopdf::Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            // MediaBox may be inherited from the page tree.
            let mut node = doc.get_dictionary(*id).unwrap();
            loop {
                if let Ok(media_box) = node.get(b"MediaBox") {
                    return media_box
                        .as_array()
                        .unwrap()
                        .iter()
                        .map(|v| v.as_float().unwrap())
                        .collect();
                }
                let parent = node.get(b"Parent").unwrap().as_reference().unwrap();
                node = doc.get_dictionary(parent).unwrap();
            }
        })
        .collect()
}

fn pdf_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

// =====================================================================
// Pagination
// =====================================================================

#[test]
fn pagination_reference_values() {
    assert_eq!(pages_from_height(842, 842, 0.02), 1);
    assert_eq!(pages_from_height(850, 842, 0.02), 1);
    assert_eq!(pages_from_height(860, 842, 0.02), 2);
    assert_eq!(pages_from_height(1684, 842, 0.02), 2);
    assert_eq!(pages_from_height(0, 842, 0.02), 1);
}

#[test]
fn pagination_never_returns_zero() {
    for height in [-10_000, -1, 0, 1, 16, 841, 842, 843, 100_000] {
        assert!(pages_from_height(height, 842, 0.02) >= 1, "height {height}");
    }
}

// =====================================================================
// Page assembly
// =====================================================================

#[test]
fn assembled_page_count_matches_pagination() {
    let geometry = small_geometry();
    for height in [1, 100, 101, 102, 150, 200, 201, 205, 333, 1000] {
        let surface = BitmapSurface::from_encoded(document_png(50, height)).unwrap();
        let pagination = paginate(surface.height_px(), &geometry);
        let pdf = assemble_pdf(&surface, &geometry, &pagination, &AssemblyOptions::default(), None)
            .unwrap();

        assert_valid_pdf(&pdf.bytes);
        let expected = pages_from_height(height as i64, geometry.page_height_px, 0.02) as usize;
        assert_eq!(pdf.page_count, expected, "height {height}");
        assert_eq!(pdf_page_count(&pdf.bytes), expected, "height {height}");
    }
}

#[test]
fn assembled_pages_share_one_size() {
    let geometry = PageGeometry::default();
    let surface = BitmapSurface::from_encoded(document_png(1785, 6000)).unwrap();
    let pagination = paginate(surface.height_px(), &geometry);
    let pdf =
        assemble_pdf(&surface, &geometry, &pagination, &AssemblyOptions::default(), None).unwrap();

    assert_eq!(pdf.page_count, 3);
    let boxes = pdf_media_boxes(&pdf.bytes);
    assert_eq!(boxes.len(), 3);
    for media_box in &boxes {
        assert_eq!(media_box, &boxes[0]);
        // A4 in points, within rounding of the mm conversion.
        assert!((media_box[2] - media_box[0] - 595.0).abs() < 1.0, "{media_box:?}");
        assert!((media_box[3] - media_box[1] - 842.0).abs() < 1.0, "{media_box:?}");
    }
}

#[test]
fn bitmap_is_embedded_once() {
    let geometry = small_geometry();
    let surface = BitmapSurface::from_encoded(document_png(50, 450)).unwrap();
    let pagination = paginate(surface.height_px(), &geometry);
    let pdf = assemble_pdf(&surface, &geometry, &pagination, &AssemblyOptions::default(), None)
        .unwrap();
    assert_eq!(pdf.page_count, 5);

    let doc = lopdf::Document::load_mem(&pdf.bytes).unwrap();
    let images = doc
        .objects
        .values()
        .filter(|obj| {
            obj.as_stream()
                .ok()
                .and_then(|s| s.dict.get(b"Subtype").ok())
                .and_then(|v| v.as_name().ok())
                == Some(&b"Image"[..])
        })
        .count();
    assert_eq!(images, 1);
}

// =====================================================================
// Conversion service
// =====================================================================

#[tokio::test]
async fn convert_and_save_writes_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("generated_pdfs");
    let service = HtmlToPdfService::with_config(
        StaticRenderer::new(document_png(50, 250)),
        small_config(&output_dir),
    );

    let result = service.convert_and_save("<h1>Hello</h1>", Some("hello.pdf")).await;

    assert!(result.success, "{:?}", result.error_message);
    assert!(result.error_message.is_none());
    let path = result.file_path.unwrap();
    assert_eq!(path, output_dir.join("hello.pdf"));
    let bytes = std::fs::read(&path).unwrap();
    assert_valid_pdf(&bytes);
    assert_eq!(pdf_page_count(&bytes), 3);
}

#[tokio::test]
async fn default_file_name_is_time_stamped() {
    let dir = tempfile::tempdir().unwrap();
    let service = HtmlToPdfService::with_config(
        StaticRenderer::new(document_png(50, 80)),
        small_config(dir.path()),
    );

    let result = service.convert_and_save("<p>x</p>", None).await;

    assert!(result.success);
    let name = result.file_path.unwrap().file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("doc_") && name.ends_with(".pdf"), "{name}");
    assert_eq!(name.len(), "doc_20260101_000000.pdf".len());
}

#[tokio::test]
async fn blank_html_is_rejected_without_rendering() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("never_created");
    let service = HtmlToPdfService::with_config(
        StaticRenderer::new(document_png(50, 80)),
        small_config(&output_dir),
    );

    for html in ["", "   ", "\n\t"] {
        let result = service.convert_and_save(html, None).await;
        assert!(!result.success);
        assert!(result.file_path.is_none());
        assert_eq!(result.error_message.as_deref(), Some("HTML content cannot be empty."));
    }
    assert!(!output_dir.exists());
}

#[tokio::test]
async fn unmeasured_height_yields_one_page() {
    let dir = tempfile::tempdir().unwrap();
    let service = HtmlToPdfService::with_config(
        StaticRenderer::new(document_png(50, 60)).with_content_height(0),
        small_config(dir.path()),
    );

    let result = service.convert_and_save("<p>x</p>", Some("one.pdf")).await;

    assert!(result.success, "{:?}", result.error_message);
    let bytes = std::fs::read(result.file_path.unwrap()).unwrap();
    assert_eq!(pdf_page_count(&bytes), 1);
}

#[tokio::test]
async fn page_allocation_failure_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConverterConfig {
        max_pages: 2,
        ..small_config(dir.path())
    };
    let service = HtmlToPdfService::with_config(StaticRenderer::new(document_png(50, 450)), config);

    let result = service.convert_and_save("<p>long</p>", Some("long.pdf")).await;

    assert!(!result.success);
    let message = result.error_message.unwrap();
    assert!(message.starts_with("could not allocate page 3"), "{message}");
    assert!(pdf_files(dir.path()).is_empty(), "partial output left behind");
}

// =====================================================================
// Renderer failures and the deadline
// =====================================================================

/// Adapter that fails to load, like a WebView reporting a main-frame error.
#[derive(Clone)]
struct FailingRenderer;

impl RendererFactory for FailingRenderer {
    type Adapter = FailingRenderer;

    async fn create(&self) -> Result<Self::Adapter, ConvertError> {
        Ok(FailingRenderer)
    }
}

impl RendererAdapter for FailingRenderer {
    type Surface = BitmapSurface;

    async fn load(&mut self, _html: &str, _geometry: &PageGeometry) -> Result<(), ConvertError> {
        Err(ConvertError::Render(
            "WebView Error: net::ERR_NAME_NOT_RESOLVED (Code: -2)".to_string(),
        ))
    }

    async fn measure_content_height(&mut self) -> Result<i64, ConvertError> {
        unreachable!("never loaded")
    }

    async fn relayout(&mut self, _content_height_px: u32) -> Result<(), ConvertError> {
        unreachable!("never loaded")
    }

    async fn surface(&mut self) -> Result<Self::Surface, ConvertError> {
        unreachable!("never loaded")
    }
}

/// Adapter whose render-complete signal never arrives.
struct HangingRenderer {
    dropped: Arc<AtomicBool>,
}

impl Drop for HangingRenderer {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

struct HangingFactory {
    dropped: Arc<AtomicBool>,
}

impl RendererFactory for HangingFactory {
    type Adapter = HangingRenderer;

    async fn create(&self) -> Result<Self::Adapter, ConvertError> {
        Ok(HangingRenderer {
            dropped: Arc::clone(&self.dropped),
        })
    }
}

impl RendererAdapter for HangingRenderer {
    type Surface = BitmapSurface;

    async fn load(&mut self, _html: &str, _geometry: &PageGeometry) -> Result<(), ConvertError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn measure_content_height(&mut self) -> Result<i64, ConvertError> {
        Ok(0)
    }

    async fn relayout(&mut self, _content_height_px: u32) -> Result<(), ConvertError> {
        Ok(())
    }

    async fn surface(&mut self) -> Result<Self::Surface, ConvertError> {
        Err(ConvertError::Render("never rendered".to_string()))
    }
}

#[tokio::test]
async fn render_error_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let service = HtmlToPdfService::with_config(FailingRenderer, small_config(dir.path()));

    let result = service.convert_and_save("<img src='http://nowhere'>", None).await;

    assert!(!result.success);
    assert_eq!(
        result.error_message.as_deref(),
        Some("WebView Error: net::ERR_NAME_NOT_RESOLVED (Code: -2)")
    );
}

#[tokio::test]
async fn timeout_bounds_a_hanging_renderer() {
    let dir = tempfile::tempdir().unwrap();
    let dropped = Arc::new(AtomicBool::new(false));
    let config = ConverterConfig {
        timeout_ms: 200,
        ..small_config(dir.path())
    };
    let service = HtmlToPdfService::with_config(
        HangingFactory {
            dropped: Arc::clone(&dropped),
        },
        config,
    );

    let started = Instant::now();
    let result = service.convert_and_save("<p>never</p>", Some("never.pdf")).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!result.success);
    let message = result.error_message.unwrap();
    assert!(message.starts_with("PDF generation timed out after 0.2 seconds."), "{message}");
    assert!(dropped.load(Ordering::SeqCst), "renderer should be torn down");
    assert!(pdf_files(dir.path()).is_empty());
}

/// Surface whose drawing outlasts the deadline.
struct SlowSurface {
    draw_time: Duration,
}

impl RenderedSurface for SlowSurface {
    fn width_px(&self) -> u32 {
        50
    }

    fn height_px(&self) -> i64 {
        100
    }

    fn draw(&self, canvas: &mut PageCanvas<'_>) -> Result<(), AssemblyError> {
        std::thread::sleep(self.draw_time);
        canvas.fill_rect(0.0, 0.0, 50.0, 100.0, [0.5, 0.5, 0.5]);
        Ok(())
    }
}

/// Adapter that renders instantly but hands back a slow surface.
struct SlowDrawRenderer;

impl RendererFactory for SlowDrawRenderer {
    type Adapter = SlowDrawRenderer;

    async fn create(&self) -> Result<Self::Adapter, ConvertError> {
        Ok(SlowDrawRenderer)
    }
}

impl RendererAdapter for SlowDrawRenderer {
    type Surface = SlowSurface;

    async fn load(&mut self, _html: &str, _geometry: &PageGeometry) -> Result<(), ConvertError> {
        Ok(())
    }

    async fn measure_content_height(&mut self) -> Result<i64, ConvertError> {
        Ok(100)
    }

    async fn relayout(&mut self, _content_height_px: u32) -> Result<(), ConvertError> {
        Ok(())
    }

    async fn surface(&mut self) -> Result<Self::Surface, ConvertError> {
        Ok(SlowSurface {
            draw_time: Duration::from_millis(600),
        })
    }
}

#[tokio::test]
async fn late_assembly_never_writes_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConverterConfig {
        timeout_ms: 100,
        ..small_config(dir.path())
    };
    let service = HtmlToPdfService::with_config(SlowDrawRenderer, config);

    let result = service.convert_and_save("<p>slow</p>", Some("slow.pdf")).await;
    assert!(!result.success);
    assert!(result
        .error_message
        .unwrap()
        .starts_with("PDF generation timed out"));

    // Let the abandoned worker finish its page.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(pdf_files(dir.path()).is_empty(), "file written after the deadline");
}

/// Static renderer that records whether it was closed.
struct ClosingRenderer {
    inner: StaticRenderer,
    closed: Arc<AtomicBool>,
}

impl RendererFactory for ClosingRenderer {
    type Adapter = ClosingRenderer;

    async fn create(&self) -> Result<Self::Adapter, ConvertError> {
        Ok(ClosingRenderer {
            inner: self.inner.create().await?,
            closed: Arc::clone(&self.closed),
        })
    }
}

impl RendererAdapter for ClosingRenderer {
    type Surface = BitmapSurface;

    async fn load(&mut self, html: &str, geometry: &PageGeometry) -> Result<(), ConvertError> {
        self.inner.load(html, geometry).await
    }

    async fn measure_content_height(&mut self) -> Result<i64, ConvertError> {
        self.inner.measure_content_height().await
    }

    async fn relayout(&mut self, content_height_px: u32) -> Result<(), ConvertError> {
        self.inner.relayout(content_height_px).await
    }

    async fn surface(&mut self) -> Result<Self::Surface, ConvertError> {
        self.inner.surface().await
    }

    async fn close(self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn renderer_is_closed_after_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let closed = Arc::new(AtomicBool::new(false));
    let factory = ClosingRenderer {
        inner: StaticRenderer::new(document_png(50, 150)),
        closed: Arc::clone(&closed),
    };
    let service = HtmlToPdfService::with_config(factory, small_config(dir.path()));

    let result = service.convert_and_save("<p>x</p>", Some("closed.pdf")).await;

    assert!(result.success, "{:?}", result.error_message);
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn css_pixel_screenshot_fills_page_width() {
    // A renderer that snapshots at 1 px per CSS pixel on a 3x geometry.
    let dir = tempfile::tempdir().unwrap();
    let config = ConverterConfig {
        scale: 3.0,
        ..small_config(dir.path())
    };
    let service = HtmlToPdfService::with_config(
        StaticRenderer::new(document_png(50, 150)).with_content_height(450),
        config,
    );

    let result = service.convert_and_save("<p>x</p>", Some("css.pdf")).await;

    assert!(result.success, "{:?}", result.error_message);
    let bytes = std::fs::read(result.file_path.unwrap()).unwrap();
    // 450 device pixels over 300 px pages.
    assert_eq!(pdf_page_count(&bytes), 2);
}

// =====================================================================
// Templates
// =====================================================================

#[test]
fn template_substitution_reference_values() {
    let values = TemplateValues::new().with("Name", "World");
    assert_eq!(replace_tags("Hello {{Name}}!", &values), "Hello World!");
    assert_eq!(replace_tags("{{Unknown}}", &TemplateValues::new()), "{{Unknown}}");
    assert_eq!(replace_tags("{{Name}}", &TemplateValues::new().with_none("Name")), "");
}

#[test]
fn report_template_fills_completely() {
    let values = TemplateValues::new()
        .with("LogoBase64", templates::bytes_to_data_uri(&document_png(2, 2), "image/png"))
        .with("CompanyName", templates::html_encode("Acme & Sons"))
        .with("ClientName", "Client Inc")
        .with("ReportNumber", "2026-001")
        .with("ReportDate", "01/02/2026")
        .with("Description", templates::html_encode("<quarterly> review"))
        .with("TotalAmount", templates::format_currency(9000.0, &templates::CurrencyFormat::PT_BR))
        .with("GeneratedAt", "01/02/2026 10:00:00");

    let html = replace_tags(templates::report_template(), &values);

    assert!(!html.contains("{{"), "unfilled tag left in output");
    assert!(html.contains("Acme &amp; Sons"));
    assert!(html.contains("&lt;quarterly&gt; review"));
    assert!(html.contains("R$ 9.000,00"));
    assert!(html.contains("data:image/png;base64,"));
}
