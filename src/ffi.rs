//! C-compatible FFI API for mobile and cross-language hosts.
//!
//! The host owns the WebView: it renders the HTML, snapshots the whole
//! document into one tall PNG/JPEG and hands the encoded bytes here for
//! pagination and PDF assembly.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names.
//!
//! ## Memory management
//! - Buffers returned by `papiro_*` functions are allocated on the Rust heap.
//! - Callers **must** free them with `papiro_free_buffer` / `papiro_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int` (0 = success, non-zero = error).
//! - Error details can be retrieved via `papiro_last_error`.
//!
//! ## Thread safety
//! - `papiro_last_error` uses a thread-local, so it is safe to call from
//!   multiple threads.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;

use crate::geometry::{PageGeometry, PageOrientation, PaperSize, DEFAULT_OVERHANG_TOLERANCE, DEFAULT_SCALE};
use crate::pagination::{pages_from_height, paginate};
use crate::render::{assemble_pdf, AssemblyOptions, DEFAULT_MAX_PAGES};
use crate::surface::{BitmapSurface, RenderedSurface};
use crate::templates::{replace_tags, TemplateValues};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

// ---------------------------------------------------------------------------
// C-compatible configuration types
// ---------------------------------------------------------------------------

/// Page orientation for use in [`PapiroPageConfig`].
#[repr(C)]
#[derive(Clone, Copy)]
pub enum PapiroPageOrientation {
    Portrait = 0,
    Landscape = 1,
}

/// Optional page configuration for `papiro_assemble_image`.
///
/// Fields set to `0` (or `NULL` for `title`) fall back to their defaults:
/// - `paper_width_pt` / `paper_height_pt` → A4 (595 × 842 pt)
/// - `scale`              → 3 device pixels per point
/// - `overhang_tolerance` → 0.02 (pass a negative value for 0)
/// - `max_pages`          → 1000
/// - `title`              → "papiro output"
#[repr(C)]
pub struct PapiroPageConfig {
    pub title: *const c_char,
    pub paper_width_pt: f32,
    pub paper_height_pt: f32,
    pub scale: f32,
    pub overhang_tolerance: f64,
    pub max_pages: u32,
    pub orientation: PapiroPageOrientation,
}

/// # Safety
/// `cfg.title`, if non-null, must point to a valid null-terminated UTF-8 string.
unsafe fn page_config_from_c(cfg: &PapiroPageConfig) -> (PageGeometry, AssemblyOptions) {
    let defaults = AssemblyOptions::default();

    let title = if cfg.title.is_null() {
        defaults.title
    } else {
        CStr::from_ptr(cfg.title)
            .to_str()
            .map(str::to_string)
            .unwrap_or(defaults.title)
    };

    let paper = if cfg.paper_width_pt > 0.0 && cfg.paper_height_pt > 0.0 {
        PaperSize::Custom {
            width_pt: cfg.paper_width_pt,
            height_pt: cfg.paper_height_pt,
        }
    } else {
        PaperSize::A4
    };
    let orientation = match cfg.orientation {
        PapiroPageOrientation::Portrait => PageOrientation::Portrait,
        PapiroPageOrientation::Landscape => PageOrientation::Landscape,
    };
    let scale = if cfg.scale > 0.0 { cfg.scale } else { DEFAULT_SCALE };
    let tolerance = if cfg.overhang_tolerance == 0.0 {
        DEFAULT_OVERHANG_TOLERANCE
    } else {
        cfg.overhang_tolerance.max(0.0)
    };
    let max_pages = if cfg.max_pages == 0 {
        DEFAULT_MAX_PAGES
    } else {
        cfg.max_pages as usize
    };

    let geometry = PageGeometry::for_paper(paper, orientation, scale).with_tolerance(tolerance);
    (geometry, AssemblyOptions { title, max_pages })
}

/// # Safety
/// `p`, if non-null, must point to a valid null-terminated string.
unsafe fn c_str<'a>(p: *const c_char, what: &str) -> Result<&'a str, String> {
    if p.is_null() {
        return Err(format!("Null pointer argument: {what}"));
    }
    CStr::from_ptr(p)
        .to_str()
        .map_err(|e| format!("Invalid UTF-8 in {what}: {e}"))
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Number of pages needed for `content_height_px` of content.
#[no_mangle]
pub extern "C" fn papiro_pages_from_height(
    content_height_px: i64,
    page_height_px: u32,
    overhang_tolerance: f64,
) -> u32 {
    pages_from_height(content_height_px, page_height_px, overhang_tolerance)
}

/// Replace `{{Tag}}` placeholders in `template`.
///
/// `values_json` is a flat JSON object of tag → string (or `null`).
///
/// # Returns
/// `0` on success; `*out_ptr` receives a string to free with
/// `papiro_free_string`.
///
/// # Safety
/// `template` and `values_json` must be valid null-terminated strings and
/// `out_ptr` a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn papiro_replace_tags(
    template: *const c_char,
    values_json: *const c_char,
    out_ptr: *mut *mut c_char,
) -> c_int {
    if out_ptr.is_null() {
        set_last_error("Null pointer argument: out_ptr");
        return 1;
    }
    let (template, json) = match (c_str(template, "template"), c_str(values_json, "values_json")) {
        (Ok(t), Ok(j)) => (t, j),
        (Err(e), _) | (_, Err(e)) => {
            set_last_error(&e);
            return 2;
        }
    };

    let values = match TemplateValues::from_json(json) {
        Ok(v) => v,
        Err(e) => {
            set_last_error(&format!("Invalid values JSON: {e}"));
            return 3;
        }
    };

    match CString::new(replace_tags(template, &values)) {
        Ok(cs) => {
            *out_ptr = cs.into_raw();
            0
        }
        Err(_) => {
            set_last_error("Output contained null byte");
            4
        }
    }
}

/// Paginate a rendered document snapshot and assemble it into a PDF.
///
/// # Parameters
/// - `image_ptr`, `image_len`: encoded PNG/JPEG of the whole document
/// - `content_height_px`: measured content height; `<= 0` uses the image height
/// - `cfg`: optional pointer to a [`PapiroPageConfig`]; pass `NULL` for defaults
/// - `out_buf`, `out_len`: PDF output (free with `papiro_free_buffer`)
/// - `out_page_count`: optional; receives the number of pages written
///
/// # Returns
/// `0` on success, non-zero on error. On error, call `papiro_last_error`.
///
/// # Safety
/// - `image_ptr` must point to `image_len` valid bytes.
/// - `cfg`, if non-null, must point to a fully-initialised [`PapiroPageConfig`].
/// - `out_buf` and `out_len` must be valid pointers.
#[no_mangle]
pub unsafe extern "C" fn papiro_assemble_image(
    image_ptr: *const u8,
    image_len: u32,
    content_height_px: i64,
    cfg: *const PapiroPageConfig,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
    out_page_count: *mut u32,
) -> c_int {
    if image_ptr.is_null() || out_buf.is_null() || out_len.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }

    let encoded = slice::from_raw_parts(image_ptr, image_len as usize).to_vec();
    let surface = match BitmapSurface::from_encoded(encoded) {
        Ok(s) => s,
        Err(e) => {
            set_last_error(&e.to_string());
            return 2;
        }
    };
    let (geometry, options) = if cfg.is_null() {
        (PageGeometry::default(), AssemblyOptions::default())
    } else {
        page_config_from_c(&*cfg)
    };

    // The bitmap is drawn at page width, so its own height is rescaled too.
    let content_height_px = if content_height_px > 0 {
        content_height_px
    } else {
        surface.height_at_width(geometry.page_width_px)
    };
    let surface = surface.with_content_height(content_height_px);

    let pagination = paginate(surface.height_px(), &geometry);
    match assemble_pdf(&surface, &geometry, &pagination, &options, None) {
        Ok(pdf) => {
            if !out_page_count.is_null() {
                *out_page_count = pdf.page_count as u32;
            }
            let len = pdf.bytes.len() as u32;
            let buf = pdf.bytes.into_boxed_slice();
            *out_buf = Box::into_raw(buf) as *mut u8;
            *out_len = len;
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            3
        }
    }
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a PDF buffer returned by `papiro_assemble_image`.
///
/// # Safety
/// `buf` must have been returned by a previous `papiro_*` call, and `len`
/// must be the corresponding length.
#[no_mangle]
pub unsafe extern "C" fn papiro_free_buffer(buf: *mut u8, len: u32) {
    if !buf.is_null() {
        let _ = Box::from_raw(slice::from_raw_parts_mut(buf, len as usize));
    }
}

/// Free a string returned by `papiro_replace_tags`.
///
/// # Safety
/// `s` must have been returned by Rust's `CString::into_raw`.
#[no_mangle]
pub unsafe extern "C" fn papiro_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Retrieve the last error message. Returns a null-terminated string.
///
/// The returned pointer is valid until the next `papiro_*` call on the same
/// thread. The caller should **not** free this pointer.
///
/// Returns null if no error has occurred.
#[no_mangle]
pub extern "C" fn papiro_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        let borrow = e.borrow();
        match borrow.as_ref() {
            Some(cs) => cs.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Return the library version as a null-terminated string.
/// The caller must **not** free this pointer.
#[no_mangle]
pub extern "C" fn papiro_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
