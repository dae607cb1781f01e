//! HTML templates with `{{TagName}}` placeholders, plus the small helpers
//! used to prepare values for them.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use chrono::{DateTime, TimeZone};
use regex::{Captures, Regex};

/// `dd/MM/yyyy`.
pub const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y";

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("tag pattern is valid"))
}

/// Values for template tags. A tag mapped to `None` is replaced by an empty
/// string; a tag missing from the map is left in the output untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValues {
    values: HashMap<String, Option<String>>,
}

impl TemplateValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(tag, Some(value.into()));
        self
    }

    pub fn with_none(mut self, tag: impl Into<String>) -> Self {
        self.insert(tag, None);
        self
    }

    pub fn insert(&mut self, tag: impl Into<String>, value: Option<String>) {
        self.values.insert(tag.into(), value);
    }

    /// Copy every tag of `other` into `self`; tags present in both take
    /// the value from `other`.
    pub fn merge(&mut self, other: TemplateValues) {
        self.values.extend(other.values);
    }

    /// `None` when the tag is unknown, `Some(None)` when mapped to nothing.
    pub fn get(&self, tag: &str) -> Option<Option<&str>> {
        self.values.get(tag).map(|v| v.as_deref())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Load values from a flat JSON object. Strings are used as-is, `null`
    /// maps to nothing and any other value is stringified.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let values = map
            .into_iter()
            .map(|(tag, value)| {
                let value = match value {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                };
                (tag, value)
            })
            .collect();
        Ok(Self { values })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TemplateValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        }
    }
}

/// Replace every `{{TagName}}` in `template` with its value.
///
/// Tag names are one or more word characters and match case-sensitively.
/// Substitution is a single pass: placeholders inside replacement values
/// are not expanded.
pub fn replace_tags(template: &str, values: &TemplateValues) -> String {
    if template.is_empty() {
        return String::new();
    }
    tag_pattern()
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.unwrap_or_default().to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Escape HTML special characters.
pub fn html_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// `data:<mime>;base64,<data>` for embedding bytes in HTML.
pub fn bytes_to_data_uri(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{mime_type};base64,{}", BASE64_STD.encode(bytes))
}

/// Read `reader` to the end and return it as a data URI.
pub fn reader_to_data_uri<R: Read>(mut reader: R, mime_type: &str) -> io::Result<String> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes_to_data_uri(&bytes, mime_type))
}

/// Load an image file as a data URI. A missing file yields an empty string
/// so the template simply renders without the image.
pub fn image_to_data_uri(path: impl AsRef<Path>, mime_type: &str) -> io::Result<String> {
    match fs::read(path.as_ref()) {
        Ok(bytes) => Ok(bytes_to_data_uri(&bytes, mime_type)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("Image '{}' not found", path.as_ref().display());
            Ok(String::new())
        }
        Err(e) => Err(e),
    }
}

/// Format a date with a strftime pattern, `None` if the pattern is invalid.
pub fn format_date<Tz>(date: &DateTime<Tz>, format: &str) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    write!(out, "{}", date.format(format)).ok()?;
    Some(out)
}

/// How currency amounts are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyFormat {
    pub symbol: &'static str,
    pub decimal_separator: char,
    pub thousands_separator: char,
}

impl CurrencyFormat {
    /// `R$ 1.234,56`
    pub const PT_BR: Self = Self {
        symbol: "R$ ",
        decimal_separator: ',',
        thousands_separator: '.',
    };

    /// `$1,234.56`
    pub const EN_US: Self = Self {
        symbol: "$",
        decimal_separator: '.',
        thousands_separator: ',',
    };
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self::PT_BR
    }
}

/// Format `value` with two decimal places.
pub fn format_currency(value: f64, format: &CurrencyFormat) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(format.thousands_separator);
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!(
        "{sign}{}{grouped}{}{:02}",
        format.symbol,
        format.decimal_separator,
        cents % 100
    )
}

/// Report template using `{{CompanyName}}`, `{{ClientName}}`,
/// `{{ReportNumber}}`, `{{ReportDate}}`, `{{Description}}`,
/// `{{TotalAmount}}`, `{{LogoBase64}}` and `{{GeneratedAt}}`.
pub fn report_template() -> &'static str {
    r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
    body { font-family: Helvetica, Arial, sans-serif; margin: 40px; color: #1a202c; }
    header { display: flex; align-items: center; border-bottom: 2px solid #2b6cb0; }
    header img { width: 64px; height: 64px; margin-right: 16px; }
    table { width: 100%; border-collapse: collapse; margin-top: 24px; }
    th { text-align: left; background: #edf2f7; padding: 8px; }
    td { padding: 8px; }
    .total { text-align: right; font-size: 20px; font-weight: bold; margin-top: 24px; }
    footer { margin-top: 48px; font-size: 11px; color: #718096; }
</style>
</head>
<body>
<header>
    <img src="{{LogoBase64}}" />
    <h1>{{CompanyName}}</h1>
</header>
<table>
    <tr><th>Client</th><td>{{ClientName}}</td></tr>
    <tr><th>Report</th><td>#{{ReportNumber}}</td></tr>
    <tr><th>Date</th><td>{{ReportDate}}</td></tr>
</table>
<h2>Description</h2>
<p>{{Description}}</p>
<p class="total">Total: {{TotalAmount}}</p>
<footer>Generated at {{GeneratedAt}}</footer>
</body>
</html>
"##
}
