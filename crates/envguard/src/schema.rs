//! Schema parsing
//!
//! A schema is a dotenv-style file where comment lines starting with `@`
//! carry directives for the `KEY=value` line that follows:
//!
//! ```text
//! # @defaultSensitive=false
//!
//! # Public environment name
//! # @type=enum(dev,staging,prod)
//! NODE_ENV=dev
//!
//! # @type=string @required @sensitive
//! DATABASE_PASSWORD=
//! ```
//!
//! Document defaults (`@defaultSensitive`, `@defaultRequired`) must come
//! before the first field. A blank line drops directives that have not been
//! attached to a field yet.

use std::collections::HashMap;

use crate::constraint::TypeConstraint;
use crate::error::SchemaError;
use crate::expr::{is_identifier, ValueExpression};

/// Per-field sensitivity annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sensitivity {
    Sensitive,
    NotSensitive,
    /// No annotation: use the document default
    #[default]
    Inherited,
}

/// Per-field (or document-wide) required policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Requirement {
    Required,
    Optional,
    /// Required unless the field carries a literal fallback
    Infer,
    /// No annotation: use the document default
    #[default]
    Inherited,
}

impl Requirement {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "true" => Some(Requirement::Required),
            "false" => Some(Requirement::Optional),
            "infer" => Some(Requirement::Infer),
            _ => None,
        }
    }
}

/// Document-level defaults, threaded through parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalDefaults {
    pub default_sensitive: bool,
    /// Never `Inherited`
    pub default_required: Requirement,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            default_sensitive: true,
            default_required: Requirement::Infer,
        }
    }
}

/// One schema entry
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDeclaration {
    pub name: String,
    pub type_constraint: TypeConstraint,
    pub sensitivity: Sensitivity,
    pub required: Requirement,
    pub value: ValueExpression,
    /// Position in the schema, used for report ordering
    pub order: usize,
    /// Line of the `KEY=value` declaration
    pub line: usize,
    /// Free-form comment lines preceding the declaration
    pub description: Option<String>,
}

impl FieldDeclaration {
    fn new(name: String, value: ValueExpression, order: usize, line: usize) -> Self {
        Self {
            name,
            type_constraint: TypeConstraint::default(),
            sensitivity: Sensitivity::Inherited,
            required: Requirement::Inherited,
            value,
            order,
            line,
            description: None,
        }
    }

    fn apply(&mut self, directive: FieldDirective) {
        match directive {
            FieldDirective::Type(constraint) => self.type_constraint = constraint,
            FieldDirective::Sensitive(true) => self.sensitivity = Sensitivity::Sensitive,
            FieldDirective::Sensitive(false) => self.sensitivity = Sensitivity::NotSensitive,
            FieldDirective::Required(requirement) => self.required = requirement,
        }
    }

    /// Resolve required-ness against the document defaults
    pub fn is_required(&self, defaults: &GlobalDefaults) -> bool {
        let policy = match self.required {
            Requirement::Inherited => defaults.default_required,
            explicit => explicit,
        };
        match policy {
            Requirement::Required => true,
            Requirement::Optional => false,
            Requirement::Infer | Requirement::Inherited => !self.value.is_literal(),
        }
    }
}

/// A parsed schema
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaDocument {
    pub fields: Vec<FieldDeclaration>,
    pub defaults: GlobalDefaults,
}

impl SchemaDocument {
    /// Parse a schema with the built-in defaults (sensitive, infer)
    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        Self::parse_with(text, GlobalDefaults::default())
    }

    /// Parse a schema starting from the given defaults; directives in the
    /// document header override them
    pub fn parse_with(text: &str, defaults: GlobalDefaults) -> Result<Self, SchemaError> {
        let parsed = Parser::new(Mode::Document).parse(text)?;
        let mut doc = SchemaDocument {
            fields: Vec::with_capacity(parsed.entries.len()),
            defaults,
        };
        for directive in parsed.defaults {
            match directive {
                DefaultDirective::Sensitive(value) => doc.defaults.default_sensitive = value,
                DefaultDirective::Required(value) => doc.defaults.default_required = value,
            }
        }
        for entry in parsed.entries {
            let order = doc.fields.len();
            let mut field = FieldDeclaration::new(entry.name, entry.value, order, entry.line);
            field.description = entry.description;
            for directive in entry.directives {
                field.apply(directive);
            }
            doc.fields.push(field);
        }
        Ok(doc)
    }

    /// Merge an environment overlay (e.g. `.env.prod`) into this document.
    ///
    /// Existing fields take the overlay's value expression and any directives
    /// it carries; new keys are appended in overlay order.
    pub fn apply_overlay(&mut self, text: &str) -> Result<(), SchemaError> {
        let parsed = Parser::new(Mode::Overlay).parse(text)?;
        for entry in parsed.entries {
            match self.fields.iter_mut().find(|f| f.name == entry.name) {
                Some(field) => {
                    field.value = entry.value;
                    field.line = entry.line;
                    if entry.description.is_some() {
                        field.description = entry.description;
                    }
                    for directive in entry.directives {
                        field.apply(directive);
                    }
                }
                None => {
                    let order = self.fields.len();
                    let mut field =
                        FieldDeclaration::new(entry.name, entry.value, order, entry.line);
                    field.description = entry.description;
                    for directive in entry.directives {
                        field.apply(directive);
                    }
                    self.fields.push(field);
                }
            }
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDeclaration> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FieldDirective {
    Type(TypeConstraint),
    Sensitive(bool),
    Required(Requirement),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DefaultDirective {
    Sensitive(bool),
    Required(Requirement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Document,
    Overlay,
}

struct Entry {
    name: String,
    line: usize,
    value: ValueExpression,
    directives: Vec<FieldDirective>,
    description: Option<String>,
}

#[derive(Default)]
struct Parsed {
    defaults: Vec<DefaultDirective>,
    entries: Vec<Entry>,
}

struct Parser {
    mode: Mode,
    parsed: Parsed,
    first_lines: HashMap<String, usize>,
    /// Directive tokens waiting for the next field, with their line numbers
    pending_directives: Vec<(usize, String)>,
    pending_description: Vec<String>,
}

impl Parser {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            parsed: Parsed::default(),
            first_lines: HashMap::new(),
            pending_directives: Vec::new(),
            pending_description: Vec::new(),
        }
    }

    fn parse(mut self, text: &str) -> Result<Parsed, SchemaError> {
        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();

            if line.is_empty() {
                self.pending_directives.clear();
                self.pending_description.clear();
            } else if let Some(comment) = line.strip_prefix('#') {
                self.comment(line_no, comment.trim())?;
            } else {
                self.declaration(line_no, line)?;
            }
        }
        Ok(self.parsed)
    }

    fn comment(&mut self, line: usize, comment: &str) -> Result<(), SchemaError> {
        if !comment.starts_with('@') {
            if !comment.is_empty() && !comment.chars().all(|c| c == '-') {
                self.pending_description.push(comment.to_string());
            }
            return Ok(());
        }

        for token in tokenize(comment) {
            let (name, value) = split_directive(&token);
            match name {
                "defaultSensitive" | "defaultRequired" => {
                    let directive = parse_default(line, name, value)?;
                    if self.mode == Mode::Overlay {
                        return Err(SchemaError::DefaultInOverlay {
                            line,
                            directive: name.to_string(),
                        });
                    }
                    if !self.parsed.entries.is_empty() {
                        return Err(SchemaError::DefaultAfterField {
                            line,
                            directive: name.to_string(),
                        });
                    }
                    self.parsed.defaults.push(directive);
                }
                _ => self.pending_directives.push((line, token)),
            }
        }
        Ok(())
    }

    fn declaration(&mut self, line: usize, text: &str) -> Result<(), SchemaError> {
        let text = text.strip_prefix("export ").map(str::trim_start).unwrap_or(text);
        let (key, raw_value) = text
            .split_once('=')
            .ok_or(SchemaError::MalformedLine { line })?;
        let name = key.trim();
        if !is_identifier(name) {
            return Err(SchemaError::InvalidName {
                line,
                name: name.to_string(),
            });
        }

        if let Some(&first_line) = self.first_lines.get(name) {
            return Err(SchemaError::DuplicateField {
                name: name.to_string(),
                line,
                first_line,
            });
        }

        let value =
            ValueExpression::parse(raw_value).map_err(|reason| SchemaError::InvalidExpression {
                line,
                field: name.to_string(),
                reason,
            })?;

        let directives = std::mem::take(&mut self.pending_directives)
            .into_iter()
            .map(|(directive_line, token)| parse_field_directive(directive_line, name, &token))
            .collect::<Result<Vec<_>, _>>()?;

        let description = if self.pending_description.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending_description).join("\n"))
        };

        self.first_lines.insert(name.to_string(), line);
        self.parsed.entries.push(Entry {
            name: name.to_string(),
            line,
            value,
            directives,
            description,
        });
        Ok(())
    }
}

/// Split a directive line on whitespace outside parentheses and quotes
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '(') => {
                depth += 1;
                current.push(c);
            }
            (None, ')') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, c) if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn split_directive(token: &str) -> (&str, Option<&str>) {
    let body = token.strip_prefix('@').unwrap_or(token);
    match body.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (body, None),
    }
}

fn parse_bool(value: Option<&str>) -> Option<bool> {
    match value {
        None | Some("true") => Some(true),
        Some("false") => Some(false),
        Some(_) => None,
    }
}

fn parse_default(
    line: usize,
    name: &str,
    value: Option<&str>,
) -> Result<DefaultDirective, SchemaError> {
    let invalid = || SchemaError::InvalidDirectiveValue {
        line,
        directive: name.to_string(),
        value: value.unwrap_or_default().to_string(),
        field: None,
    };
    // Document defaults always need an explicit value.
    let value = value.ok_or_else(invalid)?;
    match name {
        "defaultSensitive" => parse_bool(Some(value))
            .map(DefaultDirective::Sensitive)
            .ok_or_else(invalid),
        _ => Requirement::parse(value)
            .map(DefaultDirective::Required)
            .ok_or_else(invalid),
    }
}

fn parse_field_directive(line: usize, field: &str, token: &str) -> Result<FieldDirective, SchemaError> {
    let (name, value) = split_directive(token);
    let invalid = || SchemaError::InvalidDirectiveValue {
        line,
        directive: name.to_string(),
        value: value.unwrap_or_default().to_string(),
        field: Some(field.to_string()),
    };

    match name {
        "type" => {
            let spec = value.ok_or_else(invalid)?;
            TypeConstraint::parse(spec)
                .map(FieldDirective::Type)
                .map_err(|reason| SchemaError::InvalidType {
                    line,
                    field: field.to_string(),
                    reason,
                })
        }
        "sensitive" => parse_bool(value)
            .map(FieldDirective::Sensitive)
            .ok_or_else(invalid),
        "required" => match value {
            None => Ok(FieldDirective::Required(Requirement::Required)),
            Some(v) => Requirement::parse(v)
                .map(FieldDirective::Required)
                .ok_or_else(invalid),
        },
        other => Err(SchemaError::UnknownDirective {
            line,
            directive: other.to_string(),
            field: Some(field.to_string()),
        }),
    }
}
