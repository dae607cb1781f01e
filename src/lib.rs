//! # papiro – paginated PDFs from rendered HTML
//!
//! HTML layout and painting are left to a renderer (a platform WebView,
//! headless Chromium, …) that produces one tall surface for the whole
//! document. This crate turns that surface into a PDF:
//!
//! 1. **Render** – a [`RendererAdapter`](adapter::RendererAdapter) loads the
//!    HTML and measures its content height ([`adapter`])
//! 2. **Paginate** – content height → page count with an overhang
//!    tolerance ([`pagination`])
//! 3. **Assemble** – slice the surface into fixed-size pages via canvas
//!    translation and emit PDF bytes via printpdf ([`render`], [`canvas`])
//!
//! [`pipeline`] runs the three stages under a deadline and writes the file.
//! [`templates`] fills `{{Tag}}` placeholders before conversion, and a
//! C-compatible FFI surface is exposed via the [`ffi`] module.

pub mod adapter;
pub mod canvas;
#[cfg(feature = "chromium")]
pub mod chromium;
pub mod error;
pub mod ffi;
pub mod geometry;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod surface;
pub mod templates;

// Re-exports for convenience
pub use error::{AssemblyError, ConvertError};
pub use geometry::{PageGeometry, PageOrientation, PaperSize};
pub use pagination::pages_from_height;
pub use pipeline::{ConversionResult, ConverterConfig, HtmlToPdfService};
pub use templates::{replace_tags, TemplateValues};
