//! Type constraints declared with `@type=...`
//!
//! Grammar: `name` or `name(args)`. `enum` takes a comma-separated list of
//! literals; `string` and `number` take comma-separated `key=value` options.

use regex::Regex;
use std::fmt;

/// Options for `string`
#[derive(Debug, Clone, Default)]
pub struct StringRules {
    pub starts_with: Option<String>,
    pub contains: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub matches: Option<Regex>,
}

impl PartialEq for StringRules {
    fn eq(&self, other: &Self) -> bool {
        self.starts_with == other.starts_with
            && self.contains == other.contains
            && self.min_length == other.min_length
            && self.max_length == other.max_length
            && self.matches.as_ref().map(Regex::as_str) == other.matches.as_ref().map(Regex::as_str)
    }
}

/// Options for `number`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberRules {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub is_int: bool,
}

/// What a field's value must look like
#[derive(Debug, Clone, PartialEq)]
pub enum TypeConstraint {
    String(StringRules),
    Url,
    Port,
    Boolean,
    Enum(Vec<String>),
    Number(NumberRules),
}

impl Default for TypeConstraint {
    fn default() -> Self {
        TypeConstraint::String(StringRules::default())
    }
}

impl TypeConstraint {
    /// Parse the value of a `@type=` directive
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        let (name, args) = match spec.find('(') {
            Some(open) => {
                let inner = spec[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| format!("missing ')' in '{}'", spec))?;
                (&spec[..open], Some(inner))
            }
            None => (spec, None),
        };

        match (name, args) {
            ("string", None) => Ok(TypeConstraint::String(StringRules::default())),
            ("string", Some(args)) => parse_string_rules(args).map(TypeConstraint::String),
            ("url", None) => Ok(TypeConstraint::Url),
            ("port", None) => Ok(TypeConstraint::Port),
            ("boolean", None) => Ok(TypeConstraint::Boolean),
            ("number", None) => Ok(TypeConstraint::Number(NumberRules::default())),
            ("number", Some(args)) => parse_number_rules(args).map(TypeConstraint::Number),
            ("enum", Some(args)) => {
                let values: Vec<String> = split_args(args)
                    .into_iter()
                    .map(|v| unquote(v).to_string())
                    .collect();
                if values.is_empty() || values.iter().any(String::is_empty) {
                    return Err("enum needs at least one non-empty value".to_string());
                }
                Ok(TypeConstraint::Enum(values))
            }
            ("enum", None) => Err("enum needs a list of values, e.g. enum(dev,prod)".to_string()),
            ("url" | "port" | "boolean", Some(_)) => {
                Err(format!("'{}' does not take options", name))
            }
            _ => Err(format!("unknown type '{}'", name)),
        }
    }
}

fn split_args(args: &str) -> Vec<&str> {
    args.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn key_values(args: &str) -> Result<Vec<(&str, &str)>, String> {
    split_args(args)
        .into_iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(k, v)| (k.trim(), unquote(v.trim())))
                .ok_or_else(|| format!("expected key=value, found '{}'", arg))
        })
        .collect()
}

fn parse_string_rules(args: &str) -> Result<StringRules, String> {
    let mut rules = StringRules::default();
    for (key, value) in key_values(args)? {
        match key {
            "startsWith" => rules.starts_with = Some(value.to_string()),
            "contains" => rules.contains = Some(value.to_string()),
            "minLength" => rules.min_length = Some(parse_usize(key, value)?),
            "maxLength" => rules.max_length = Some(parse_usize(key, value)?),
            "matches" => {
                let re = Regex::new(value)
                    .map_err(|e| format!("invalid pattern for 'matches': {}", e))?;
                rules.matches = Some(re);
            }
            other => return Err(format!("unknown string option '{}'", other)),
        }
    }
    Ok(rules)
}

fn parse_number_rules(args: &str) -> Result<NumberRules, String> {
    let mut rules = NumberRules::default();
    for (key, value) in key_values(args)? {
        match key {
            "min" => rules.min = Some(parse_f64(key, value)?),
            "max" => rules.max = Some(parse_f64(key, value)?),
            "isInt" => {
                rules.is_int = match value {
                    "true" => true,
                    "false" => false,
                    _ => return Err(format!("'isInt' must be true or false, found '{}'", value)),
                }
            }
            other => return Err(format!("unknown number option '{}'", other)),
        }
    }
    Ok(rules)
}

fn parse_usize(key: &str, value: &str) -> Result<usize, String> {
    value
        .parse()
        .map_err(|_| format!("'{}' must be a non-negative integer, found '{}'", key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, String> {
    value
        .parse()
        .map_err(|_| format!("'{}' must be a number, found '{}'", key, value))
}

impl fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeConstraint::String(rules) => {
                let mut opts = Vec::new();
                if let Some(prefix) = &rules.starts_with {
                    opts.push(format!("startsWith={}", prefix));
                }
                if let Some(needle) = &rules.contains {
                    opts.push(format!("contains={}", needle));
                }
                if let Some(n) = rules.min_length {
                    opts.push(format!("minLength={}", n));
                }
                if let Some(n) = rules.max_length {
                    opts.push(format!("maxLength={}", n));
                }
                if let Some(re) = &rules.matches {
                    opts.push(format!("matches={}", re.as_str()));
                }
                write_with_options(f, "string", &opts)
            }
            TypeConstraint::Url => f.write_str("url"),
            TypeConstraint::Port => f.write_str("port"),
            TypeConstraint::Boolean => f.write_str("boolean"),
            TypeConstraint::Enum(values) => write!(f, "enum({})", values.join(", ")),
            TypeConstraint::Number(rules) => {
                let mut opts = Vec::new();
                if let Some(min) = rules.min {
                    opts.push(format!("min={}", min));
                }
                if let Some(max) = rules.max {
                    opts.push(format!("max={}", max));
                }
                if rules.is_int {
                    opts.push("isInt=true".to_string());
                }
                write_with_options(f, "number", &opts)
            }
        }
    }
}

fn write_with_options(f: &mut fmt::Formatter<'_>, name: &str, opts: &[String]) -> fmt::Result {
    if opts.is_empty() {
        f.write_str(name)
    } else {
        write!(f, "{}({})", name, opts.join(", "))
    }
}
