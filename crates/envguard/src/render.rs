//! Redacted report rendering
//!
//! The renderer reads values only through [`ResolvedField::disclose`], which
//! masks every sensitive field whatever its state.

use colored::Colorize;
use envguard_core::format;
use serde::Serialize;
use serde_json::Value;

use crate::classify::classify_document;
use crate::report::{ResolvedField, ValidationReport};
use crate::schema::SchemaDocument;
use crate::sensitive::Disclosed;

/// Output format for `load`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Rendering knobs
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub mask: String,
    pub quiet: bool,
    pub color: bool,
    pub max_value_width: usize,
    pub format: OutputFormat,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            mask: "********".to_string(),
            quiet: false,
            color: false,
            max_value_width: 80,
            format: OutputFormat::Text,
        }
    }
}

/// Render a report in the configured format
pub fn render(report: &ValidationReport, opts: &RenderOptions) -> String {
    match opts.format {
        OutputFormat::Text => render_text(report, opts),
        OutputFormat::Json => {
            if opts.quiet && report.ok() {
                return String::new();
            }
            let mut out = serde_json::to_string_pretty(&render_json(report, opts))
                .unwrap_or_else(|_| "{}".to_string());
            out.push('\n');
            out
        }
    }
}

/// One line per field plus a summary; quiet mode prints failures only
pub fn render_text(report: &ValidationReport, opts: &RenderOptions) -> String {
    let mut out = String::new();

    if opts.quiet {
        for field in report.failures() {
            if let Some(err) = field.error() {
                out.push_str(&format!("{}: {}\n", field.name(), err.kind()));
            }
        }
        return out;
    }

    for field in report.fields() {
        out.push_str(&field_line(field, opts));
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&summary_line(report, opts));
    out.push('\n');
    out
}

fn field_line(field: &ResolvedField, opts: &RenderOptions) -> String {
    let status = if field.is_ok() {
        paint("ok  ", opts.color, |s| s.green().to_string())
    } else {
        paint("FAIL", opts.color, |s| s.red().bold().to_string())
    };
    let marker = if field.effective_sensitivity {
        paint("(sensitive)", opts.color, |s| s.yellow().to_string())
    } else {
        paint("(public)", opts.color, |s| s.dimmed().to_string())
    };

    let mut line = format!(
        "{} {}: {} {}",
        status,
        field.name(),
        display_value(field, opts),
        marker
    );
    if let Some(err) = field.error() {
        line.push_str(&format!(" - {}: {}", err.kind(), err));
    }
    line
}

fn display_value(field: &ResolvedField, opts: &RenderOptions) -> String {
    match field.disclose(&opts.mask) {
        Some(Disclosed::Masked(mask)) => mask.to_string(),
        Some(Disclosed::Plain(value)) => {
            format::truncate(&value.escape_debug().to_string(), opts.max_value_width)
        }
        None => "<unset>".to_string(),
    }
}

fn summary_line(report: &ValidationReport, opts: &RenderOptions) -> String {
    let fields = format::count(report.fields().len(), "field");
    let errors = format::count(report.error_count(), "error");
    if report.ok() {
        format!(
            "{}: {}, {}",
            paint("PASS", opts.color, |s| s.green().bold().to_string()),
            fields,
            errors
        )
    } else {
        format!(
            "{}: {}, {}",
            paint("FAIL", opts.color, |s| s.red().bold().to_string()),
            fields,
            errors
        )
    }
}

fn paint(text: &str, color: bool, style: impl FnOnce(&str) -> String) -> String {
    if color {
        style(text)
    } else {
        text.to_string()
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    ok: bool,
    error_count: usize,
    fields: Vec<JsonField<'a>>,
}

#[derive(Serialize)]
struct JsonField<'a> {
    name: &'a str,
    sensitive: bool,
    required: bool,
    #[serde(rename = "type")]
    type_constraint: String,
    /// Masked, plain, or `null` when absent and public
    value: Option<String>,
    error: Option<JsonError>,
}

#[derive(Serialize)]
struct JsonError {
    kind: &'static str,
    message: String,
}

/// Quiet mode: failing names and error kinds only
#[derive(Serialize)]
struct JsonQuietReport<'a> {
    ok: bool,
    error_count: usize,
    fields: Vec<JsonFailure<'a>>,
}

#[derive(Serialize)]
struct JsonFailure<'a> {
    name: &'a str,
    kind: &'static str,
}

/// JSON document for `--format json`
pub fn render_json(report: &ValidationReport, opts: &RenderOptions) -> Value {
    if opts.quiet {
        let doc = JsonQuietReport {
            ok: report.ok(),
            error_count: report.error_count(),
            fields: report
                .failures()
                .filter_map(|field| {
                    field.error().map(|err| JsonFailure {
                        name: field.name(),
                        kind: err.kind(),
                    })
                })
                .collect(),
        };
        return serde_json::to_value(doc).unwrap_or(Value::Null);
    }

    let doc = JsonReport {
        ok: report.ok(),
        error_count: report.error_count(),
        fields: report
            .fields()
            .iter()
            .map(|field| JsonField {
                name: field.name(),
                sensitive: field.effective_sensitivity,
                required: field.required,
                type_constraint: field.declaration.type_constraint.to_string(),
                value: field.disclose(&opts.mask).map(|d| d.to_string()),
                error: field.error().map(|err| JsonError {
                    kind: err.kind(),
                    message: err.to_string(),
                }),
            })
            .collect(),
    };
    serde_json::to_value(doc).unwrap_or(Value::Null)
}

/// Field table for `check`: declarations only, no values
pub fn render_schema(doc: &SchemaDocument, color: bool) -> String {
    let name_width = doc
        .fields
        .iter()
        .map(|f| f.name.len())
        .chain(std::iter::once(4))
        .max()
        .unwrap_or(4);
    let types: Vec<String> = doc
        .fields
        .iter()
        .map(|f| f.type_constraint.to_string())
        .collect();
    let type_width = types.iter().map(String::len).chain(std::iter::once(4)).max().unwrap_or(4);

    let mut out = String::new();
    let header = format!(
        "{}  {}  {:<9}  {}",
        format::pad("NAME", name_width),
        format::pad("TYPE", type_width),
        "SENSITIVE",
        "REQUIRED"
    );
    out.push_str(&paint(&header, color, |s| s.bold().to_string()));
    out.push('\n');

    let sensitivity = classify_document(doc);
    for ((field, ty), &sensitive) in doc.fields.iter().zip(&types).zip(&sensitivity) {
        let sensitive = if sensitive { "yes" } else { "no" };
        let required = if field.is_required(&doc.defaults) { "yes" } else { "no" };
        out.push_str(&format!(
            "{}  {}  {:<9}  {}\n",
            format::pad(&field.name, name_width),
            format::pad(ty, type_width),
            sensitive,
            required
        ));
    }
    out.push('\n');
    out.push_str(&format!("{}\n", format::count(doc.len(), "field")));
    out
}
