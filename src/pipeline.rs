//! Pipeline – ties together rendering, pagination and page assembly into a
//! single call bounded by a deadline.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::adapter::{RendererAdapter, RendererFactory};
use crate::error::{AssemblyError, ConvertError};
use crate::geometry::{PageGeometry, PageOrientation, PaperSize, DEFAULT_OVERHANG_TOLERANCE, DEFAULT_SCALE};
use crate::pagination::paginate;
use crate::render::{assemble_pdf, AssemblyOptions, CancelToken, DEFAULT_MAX_PAGES};

/// Configuration for the conversion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    pub paper: PaperSize,
    pub orientation: PageOrientation,
    /// Device pixels per PDF point.
    pub scale: f32,
    pub overhang_tolerance: f64,
    /// Deadline for one whole conversion, in milliseconds.
    pub timeout_ms: u64,
    /// Settle delay after the renderer reports the content loaded.
    pub load_settle_ms: u64,
    /// Settle delay after re-layout at full content height.
    pub relayout_settle_ms: u64,
    /// Directory PDFs are written to; created when missing.
    pub output_dir: PathBuf,
    pub max_pages: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            title: "papiro output".to_string(),
            paper: PaperSize::A4,
            orientation: PageOrientation::Portrait,
            scale: DEFAULT_SCALE,
            overhang_tolerance: DEFAULT_OVERHANG_TOLERANCE,
            timeout_ms: 30_000,
            load_settle_ms: 800,
            relayout_settle_ms: 200,
            output_dir: std::env::temp_dir().join("generated_pdfs"),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl ConverterConfig {
    pub fn geometry(&self) -> PageGeometry {
        PageGeometry::for_paper(self.paper, self.orientation, self.scale)
            .with_tolerance(self.overhang_tolerance)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn load_settle(&self) -> Duration {
        Duration::from_millis(self.load_settle_ms)
    }

    pub fn relayout_settle(&self) -> Duration {
        Duration::from_millis(self.relayout_settle_ms)
    }

    /// Deserialise from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn assembly_options(&self) -> AssemblyOptions {
        AssemblyOptions {
            title: self.title.clone(),
            max_pages: self.max_pages,
        }
    }
}

/// Outcome of [`HtmlToPdfService::convert_and_save`]. Check `success` before
/// trusting `file_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    pub file_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

impl ConversionResult {
    pub fn success(path: PathBuf) -> Self {
        Self {
            success: true,
            file_path: Some(path),
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            file_path: None,
            error_message: Some(message.into()),
        }
    }
}

impl From<Result<PathBuf, ConvertError>> for ConversionResult {
    fn from(result: Result<PathBuf, ConvertError>) -> Self {
        match result {
            Ok(path) => Self::success(path),
            Err(e) => Self::failure(e.user_message()),
        }
    }
}

/// HTML → PDF file conversion on top of a renderer factory.
pub struct HtmlToPdfService<F> {
    factory: F,
    config: ConverterConfig,
}

impl<F: RendererFactory> HtmlToPdfService<F> {
    pub fn new(factory: F) -> Self {
        Self::with_config(factory, ConverterConfig::default())
    }

    pub fn with_config(factory: F, config: ConverterConfig) -> Self {
        Self { factory, config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Convert `html` and save it as `file_name` in the output directory.
    ///
    /// Never fails: every error is folded into the returned result.
    pub async fn convert_and_save(&self, html: &str, file_name: Option<&str>) -> ConversionResult {
        let result = self.try_convert_and_save(html, file_name).await;
        match &result {
            Ok(path) => log::info!("Wrote '{}'", path.display()),
            Err(e) => log::warn!("Conversion failed: {e}"),
        }
        result.into()
    }

    /// Typed variant of [`convert_and_save`](Self::convert_and_save).
    pub async fn try_convert_and_save(
        &self,
        html: &str,
        file_name: Option<&str>,
    ) -> Result<PathBuf, ConvertError> {
        if html.trim().is_empty() {
            return Err(ConvertError::Input);
        }

        let file_name = resolve_file_name(file_name, Local::now());
        fs::create_dir_all(&self.config.output_dir)?;
        let output_path = self.config.output_dir.join(file_name);

        let cancel = CancelToken::new();
        let deadline = self.config.timeout();
        log::debug!(
            "Converting {} bytes of HTML to '{}' (deadline {deadline:?})",
            html.len(),
            output_path.display()
        );

        match tokio::time::timeout(deadline, self.run(html, &output_path, cancel.clone())).await {
            Ok(result) => result,
            Err(_) => {
                // The pipeline future (and the adapter it owns) is dropped
                // here; the flag stops an assembly already on a worker.
                cancel.cancel();
                Err(ConvertError::Timeout {
                    secs: deadline.as_secs_f64(),
                })
            }
        }
    }

    async fn run(
        &self,
        html: &str,
        output_path: &Path,
        cancel: CancelToken,
    ) -> Result<PathBuf, ConvertError> {
        let geometry = self.config.geometry();

        let mut adapter = self.factory.create().await?;
        adapter.load(html, &geometry).await?;
        adapter.wait_for_layout(self.config.load_settle()).await;

        let mut content_height = adapter.measure_content_height().await?;
        if content_height <= 0 {
            log::warn!("Renderer reported content height {content_height}; assuming one page");
            content_height = geometry.page_height_px as i64;
        }

        adapter
            .relayout(content_height.min(u32::MAX as i64) as u32)
            .await?;
        adapter.wait_for_layout(self.config.relayout_settle()).await;

        let pagination = paginate(content_height, &geometry);
        let surface = adapter.surface().await?;
        adapter.close().await;

        let options = self.config.assembly_options();
        let path = output_path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<PathBuf, ConvertError> {
            let pdf = assemble_pdf(&surface, &geometry, &pagination, &options, Some(&cancel))?;
            write_atomically(&path, &pdf.bytes, &cancel)?;
            Ok(path)
        })
        .await
        .map_err(|e| ConvertError::Worker(format!("assembly task failed: {e}")))?
    }
}

/// The file name to write: the last path component of `requested`, or a
/// time-stamped default when none was given.
pub fn resolve_file_name(requested: Option<&str>, now: DateTime<Local>) -> String {
    requested
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("doc_{}.pdf", now.format("%Y%m%d_%H%M%S")))
}

/// Write through a temporary file in the target directory so a failed
/// write never leaves a partial PDF behind.
///
/// The file only appears under `path` if `cancel` is still clear once the
/// bytes are on disk; otherwise the temporary file is discarded.
fn write_atomically(path: &Path, bytes: &[u8], cancel: &CancelToken) -> Result<(), ConvertError> {
    if cancel.is_cancelled() {
        return Err(AssemblyError::Cancelled.into());
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    if cancel.is_cancelled() {
        log::debug!("Deadline passed while writing '{}'; discarding", path.display());
        return Err(AssemblyError::Cancelled.into());
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_file_name_is_time_stamped() {
        let now = Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(resolve_file_name(None, now), "doc_20260307_090501.pdf");
        assert_eq!(resolve_file_name(Some("   "), now), "doc_20260307_090501.pdf");
        assert_eq!(resolve_file_name(Some("/"), now), "doc_20260307_090501.pdf");
    }

    #[test]
    fn requested_file_name_keeps_last_component() {
        let now = Local::now();
        assert_eq!(resolve_file_name(Some("report.pdf"), now), "report.pdf");
        assert_eq!(resolve_file_name(Some("../../etc/report.pdf"), now), "report.pdf");
    }

    #[test]
    fn config_json_uses_defaults_for_missing_fields() {
        let config = ConverterConfig::from_json(r#"{ "timeout_ms": 500, "orientation": "landscape" }"#)
            .unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.orientation, PageOrientation::Landscape);
        assert_eq!(config.load_settle_ms, 800);
        let g = config.geometry();
        assert!(g.page_width_px > g.page_height_px);
    }

    #[test]
    fn cancelled_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.pdf");
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = write_atomically(&path, b"%PDF-1.7", &cancel).unwrap_err();

        assert!(matches!(err, ConvertError::Assembly(AssemblyError::Cancelled)));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn write_replaces_target_in_one_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        fs::write(&path, b"old").unwrap();

        write_atomically(&path, b"%PDF-new", &CancelToken::new()).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"%PDF-new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn result_from_error_uses_user_message() {
        let result: ConversionResult = Err(ConvertError::Input).into();
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("HTML content cannot be empty."));
        assert!(result.file_path.is_none());
    }
}
