//! Error taxonomy
//!
//! `SchemaError` is fatal and aborts an invocation before any value is
//! resolved. Everything else is recorded per field in the report. None of
//! these types ever carries a resolved value, so their `Display` output is
//! safe to print for sensitive fields.

use std::fmt;
use thiserror::Error;

/// Fatal schema problems
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("line {line}: field '{name}' is declared more than once (first declared on line {first_line})")]
    DuplicateField {
        name: String,
        line: usize,
        first_line: usize,
    },

    #[error("line {line}: unknown directive '@{directive}'{}", field_suffix(.field))]
    UnknownDirective {
        line: usize,
        directive: String,
        field: Option<String>,
    },

    #[error("line {line}: invalid value '{value}' for '@{directive}'{}", field_suffix(.field))]
    InvalidDirectiveValue {
        line: usize,
        directive: String,
        value: String,
        field: Option<String>,
    },

    #[error("line {line}: invalid type for field '{field}': {reason}")]
    InvalidType {
        line: usize,
        field: String,
        reason: String,
    },

    #[error("line {line}: '@{directive}' must appear before the first field declaration")]
    DefaultAfterField { line: usize, directive: String },

    #[error("line {line}: '@{directive}' is not allowed in an environment overlay")]
    DefaultInOverlay { line: usize, directive: String },

    #[error("line {line}: expected KEY=value")]
    MalformedLine { line: usize },

    #[error("line {line}: invalid field name '{name}'")]
    InvalidName { line: usize, name: String },

    #[error("line {line}: field '{field}': {reason}")]
    InvalidExpression {
        line: usize,
        field: String,
        reason: String,
    },

    #[error("dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
}

fn field_suffix(field: &Option<String>) -> String {
    match field {
        Some(name) => format!(" on field '{}'", name),
        None => String::new(),
    }
}

/// Per-field failure to obtain a raw value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no resolver registered for '{0}'")]
    UnknownResolver(String),

    #[error("resolver '{kind}' is unavailable: {reason}")]
    Unavailable { kind: String, reason: String },

    #[error("invalid arguments for '{kind}': {reason}")]
    InvalidArguments { kind: String, reason: String },

    #[error("command '{program}' exited with {}", exit_description(.code))]
    CommandFailed { program: String, code: Option<i32> },

    #[error("command '{program}' timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("command '{program}' produced output that is not valid UTF-8")]
    NotUtf8 { program: String },

    #[error("interpolation failed: '{0}' is not set")]
    UnsetReference(String),

    #[error("dependency '{0}' failed to resolve")]
    DependencyFailed(String),

    #[error("resolver '{kind}' failed: {message}")]
    Plugin { kind: String, message: String },
}

impl ResolutionError {
    /// Replace every occurrence of `secret` in the error's text with `placeholder`
    pub fn scrub(self, secret: &str, placeholder: &str) -> Self {
        if secret.is_empty() {
            return self;
        }
        let s = |text: String| text.replace(secret, placeholder);
        match self {
            ResolutionError::UnknownResolver(kind) => ResolutionError::UnknownResolver(s(kind)),
            ResolutionError::Unavailable { kind, reason } => ResolutionError::Unavailable {
                kind: s(kind),
                reason: s(reason),
            },
            ResolutionError::InvalidArguments { kind, reason } => {
                ResolutionError::InvalidArguments {
                    kind: s(kind),
                    reason: s(reason),
                }
            }
            ResolutionError::CommandFailed { program, code } => ResolutionError::CommandFailed {
                program: s(program),
                code,
            },
            ResolutionError::Timeout { program, secs } => ResolutionError::Timeout {
                program: s(program),
                secs,
            },
            ResolutionError::NotUtf8 { program } => ResolutionError::NotUtf8 {
                program: s(program),
            },
            ResolutionError::UnsetReference(name) => ResolutionError::UnsetReference(s(name)),
            ResolutionError::DependencyFailed(name) => ResolutionError::DependencyFailed(s(name)),
            ResolutionError::Plugin { kind, message } => ResolutionError::Plugin {
                kind: s(kind),
                message: s(message),
            },
        }
    }
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    }
}

/// Why a value failed its type constraint
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    NotAnInteger,
    LeadingZeros,
    PortOutOfRange,
    NotBoolean,
    NotInEnum,
    NotAUrl,
    NotANumber,
    NotWhole,
    BelowMin(f64),
    AboveMax(f64),
    MissingPrefix(String),
    MissingSubstring(String),
    TooShort(usize),
    TooLong(usize),
    PatternMismatch(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NotAnInteger => write!(f, "not an integer"),
            Violation::LeadingZeros => write!(f, "has leading zeros"),
            Violation::PortOutOfRange => write!(f, "outside the range 1-65535"),
            Violation::NotBoolean => write!(f, "must be exactly 'true' or 'false'"),
            Violation::NotInEnum => write!(f, "not one of the allowed values"),
            Violation::NotAUrl => write!(f, "not a well-formed absolute URL"),
            Violation::NotANumber => write!(f, "not a number"),
            Violation::NotWhole => write!(f, "not a whole number"),
            Violation::BelowMin(min) => write!(f, "below the minimum {}", min),
            Violation::AboveMax(max) => write!(f, "above the maximum {}", max),
            Violation::MissingPrefix(prefix) => write!(f, "does not start with '{}'", prefix),
            Violation::MissingSubstring(needle) => write!(f, "does not contain '{}'", needle),
            Violation::TooShort(n) => write!(f, "shorter than {} characters", n),
            Violation::TooLong(n) => write!(f, "longer than {} characters", n),
            Violation::PatternMismatch(pattern) => write!(f, "does not match /{}/", pattern),
        }
    }
}

/// Coarse description of what a raw value looked like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    Empty,
    Integer,
    Decimal,
    BooleanLike,
    UrlLike,
    Text,
}

impl ValueShape {
    /// Classify a raw value without retaining any of it
    pub fn of(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            ValueShape::Empty
        } else if trimmed.parse::<i64>().is_ok() {
            ValueShape::Integer
        } else if trimmed.parse::<f64>().is_ok() {
            ValueShape::Decimal
        } else if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            ValueShape::BooleanLike
        } else if trimmed.contains("://") {
            ValueShape::UrlLike
        } else {
            ValueShape::Text
        }
    }
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueShape::Empty => "empty value",
            ValueShape::Integer => "integer",
            ValueShape::Decimal => "decimal number",
            ValueShape::BooleanLike => "boolean-like text",
            ValueShape::UrlLike => "URL-like text",
            ValueShape::Text => "text",
        };
        f.write_str(s)
    }
}

/// A value that failed its type constraint
#[derive(Error, Debug, Clone, PartialEq)]
#[error("expected {expected}: {violation} (got {shape})")]
pub struct ValidationError {
    /// The constraint, as written in the schema
    pub expected: String,
    pub violation: Violation,
    pub shape: ValueShape,
}

/// Everything that can go wrong for one field
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("required value is missing")]
    MissingRequired,
}

impl FieldError {
    /// Stable name of the error kind, used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            FieldError::Resolution(_) => "ResolutionError",
            FieldError::Validation(_) => "ValidationError",
            FieldError::MissingRequired => "MissingRequired",
        }
    }
}

/// Refusals and failures of the run gate
#[derive(Error, Debug)]
pub enum InjectError {
    #[error("validation failed with {0} error(s); refusing to launch")]
    ValidationFailed(usize),

    #[error("no command given")]
    EmptyCommand,

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_replaces_secret_text() {
        let err = ResolutionError::Unavailable {
            kind: "exec".into(),
            reason: "'s3cret-tool' not found on PATH".into(),
        };
        let scrubbed = err.scrub("s3cret-tool", "${TOOL}");
        assert_eq!(
            scrubbed.to_string(),
            "resolver 'exec' is unavailable: '${TOOL}' not found on PATH"
        );

        let err = ResolutionError::CommandFailed {
            program: "s3cret-tool".into(),
            code: Some(1),
        };
        assert!(!err.scrub("s3cret-tool", "${TOOL}").to_string().contains("s3cret"));
    }

    #[test]
    fn test_scrub_ignores_empty_secret() {
        let err = ResolutionError::UnknownResolver("vault".into());
        assert_eq!(err.clone().scrub("", "x"), err);
    }

    #[test]
    fn test_shape_classification() {
        assert_eq!(ValueShape::of(""), ValueShape::Empty);
        assert_eq!(ValueShape::of("  "), ValueShape::Empty);
        assert_eq!(ValueShape::of("70000"), ValueShape::Integer);
        assert_eq!(ValueShape::of("1.5"), ValueShape::Decimal);
        assert_eq!(ValueShape::of("TRUE"), ValueShape::BooleanLike);
        assert_eq!(ValueShape::of("postgres://db"), ValueShape::UrlLike);
        assert_eq!(ValueShape::of("hunter2"), ValueShape::Text);
    }

    #[test]
    fn test_field_error_kinds() {
        assert_eq!(FieldError::MissingRequired.kind(), "MissingRequired");
        let err: FieldError = ResolutionError::UnsetReference("A".into()).into();
        assert_eq!(err.kind(), "ResolutionError");
        let err: FieldError = ValidationError {
            expected: "port".into(),
            violation: Violation::PortOutOfRange,
            shape: ValueShape::Integer,
        }
        .into();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_validation_message_names_constraint_and_shape() {
        let err = ValidationError {
            expected: "port".into(),
            violation: Violation::PortOutOfRange,
            shape: ValueShape::Integer,
        };
        assert_eq!(
            err.to_string(),
            "expected port: outside the range 1-65535 (got integer)"
        );
    }

    #[test]
    fn test_schema_error_messages() {
        let err = SchemaError::DuplicateField {
            name: "API_KEY".into(),
            line: 7,
            first_line: 2,
        };
        assert!(err.to_string().contains("line 7"));
        assert!(err.to_string().contains("API_KEY"));

        let err = SchemaError::UnknownDirective {
            line: 3,
            directive: "secret".into(),
            field: Some("TOKEN".into()),
        };
        assert_eq!(
            err.to_string(),
            "line 3: unknown directive '@secret' on field 'TOKEN'"
        );

        let err = SchemaError::DependencyCycle(vec!["A".into(), "B".into(), "A".into()]);
        assert_eq!(err.to_string(), "dependency cycle: A -> B -> A");
    }

    #[test]
    fn test_command_failure_message() {
        let err = ResolutionError::CommandFailed {
            program: "op".into(),
            code: Some(1),
        };
        assert_eq!(err.to_string(), "command 'op' exited with status 1");
        let err = ResolutionError::CommandFailed {
            program: "op".into(),
            code: None,
        };
        assert!(err.to_string().contains("killed by signal"));
    }
}
