//! Value expressions
//!
//! The right-hand side of a `KEY=value` line is one of:
//! - empty: look up the process environment variable of the same name
//! - a literal, optionally quoted, which may interpolate `${NAME}`
//! - a call `kind(arg arg ...)` handled by the resolver registered as `kind`
//!
//! Interpolation grammar: `${NAME}` substitutes a value, `$$` is a literal
//! `$`, and any other `$` is kept as-is. Single-quoted literals are raw.
//! Call arguments are split into words with shell-style quoting before each
//! word is interpolated on its own.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::ResolutionError;

/// One piece of an interpolatable string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Ref(String),
}

/// A string that may reference other values
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// A template with no references
    pub fn plain(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        Self {
            segments: vec![Segment::Text(text.to_string())],
        }
    }

    /// Parse `${NAME}` references out of a string
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                text.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    text.push('$');
                }
                Some('{') => {
                    chars.next();
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err("unterminated '${' reference".to_string());
                    }
                    if !is_identifier(&name) {
                        return Err(format!("invalid reference '${{{}}}'", name));
                    }
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Ref(name));
                }
                _ => text.push('$'),
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names referenced by this template, in order of appearance
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Ref(name) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }

    /// Substitute references using `lookup`
    pub fn render<F>(&self, mut lookup: F) -> Result<String, ResolutionError>
    where
        F: FnMut(&str) -> Result<String, ResolutionError>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Ref(name) => out.push_str(&lookup(name)?),
            }
        }
        Ok(out)
    }
}

/// Unparsed source of a field's value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueExpression {
    /// `KEY=` - read `KEY` from the process environment
    Empty,
    /// `KEY=value` - a default, possibly interpolated
    Literal(Template),
    /// `KEY=kind(args)` - delegate to a resolver plugin
    Call { kind: String, args: Vec<Template> },
}

impl ValueExpression {
    /// Parse the text after `=`
    pub fn parse(raw: &str) -> Result<Self, String> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(ValueExpression::Empty);
        }

        if let Some(rest) = value.strip_prefix('\'') {
            let end = rest
                .find('\'')
                .ok_or_else(|| "unterminated single quote".to_string())?;
            expect_only_comment(&rest[end + 1..])?;
            return Ok(ValueExpression::Literal(Template::plain(&rest[..end])));
        }

        if let Some(rest) = value.strip_prefix('"') {
            let (inner, consumed) = unescape_double_quoted(rest)?;
            expect_only_comment(&rest[consumed..])?;
            return Ok(ValueExpression::Literal(Template::parse(&inner)?));
        }

        if let Some(call) = parse_call(value)? {
            return Ok(call);
        }
        let uncommented = strip_inline_comment(value);
        if let Some(call) = parse_call(uncommented)? {
            return Ok(call);
        }

        Ok(ValueExpression::Literal(Template::parse(uncommented)?))
    }

    /// Every name this expression interpolates
    pub fn references(&self) -> Vec<&str> {
        match self {
            ValueExpression::Empty => Vec::new(),
            ValueExpression::Literal(template) => template.references().collect(),
            ValueExpression::Call { args, .. } => {
                args.iter().flat_map(|arg| arg.references()).collect()
            }
        }
    }

    /// Whether this expression carries a fallback value of its own
    pub fn is_literal(&self) -> bool {
        matches!(self, ValueExpression::Literal(_))
    }
}

fn call_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z][A-Za-z0-9_-]*)\((.*)\)$").expect("call pattern is valid")
    })
}

fn parse_call(value: &str) -> Result<Option<ValueExpression>, String> {
    let Some(caps) = call_pattern().captures(value) else {
        return Ok(None);
    };
    let kind = caps[1].to_string();
    let args = split_words(&caps[2])?
        .iter()
        .map(|word| match word {
            Word::Raw(text) => Ok(Template::plain(text)),
            Word::Interpolated(text) => Template::parse(text),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(ValueExpression::Call { kind, args }))
}

// A ` #` outside quotes starts a trailing comment on unquoted values.
fn strip_inline_comment(value: &str) -> &str {
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end(),
        None => value,
    }
}

fn expect_only_comment(rest: &str) -> Result<(), String> {
    let rest = rest.trim();
    if rest.is_empty() || rest.starts_with('#') {
        Ok(())
    } else {
        Err("unexpected text after closing quote".to_string())
    }
}

/// Returns the unescaped body and the number of bytes consumed, closing quote included
fn unescape_double_quoted(rest: &str) -> Result<(String, usize), String> {
    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((out, idx + 1)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            other => out.push(other),
        }
    }
    Err("unterminated double quote".to_string())
}

#[derive(Debug, PartialEq, Eq)]
enum Word {
    /// Came entirely from single quotes
    Raw(String),
    Interpolated(String),
}

/// Shell-style word splitting for call arguments
fn split_words(input: &str) -> Result<Vec<Word>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut only_single_quoted = true;
    let mut chars = input.chars();

    let mut finish = |current: &mut String, in_word: &mut bool, raw: &mut bool| {
        if *in_word {
            let text = std::mem::take(current);
            words.push(if *raw {
                Word::Raw(text)
            } else {
                Word::Interpolated(text)
            });
        }
        *in_word = false;
        *raw = true;
    };

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                finish(&mut current, &mut in_word, &mut only_single_quoted);
            }
            '\'' => {
                in_word = true;
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '\'' {
                        closed = true;
                        break;
                    }
                    // Keep '$' literal when the word is later interpolated.
                    if c == '$' {
                        current.push('$');
                    }
                    current.push(c);
                }
                if !closed {
                    return Err("unterminated single quote in arguments".to_string());
                }
            }
            '"' => {
                in_word = true;
                only_single_quoted = false;
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some(next) => current.push(next),
                            None => break,
                        },
                        other => current.push(other),
                    }
                }
                if !closed {
                    return Err("unterminated double quote in arguments".to_string());
                }
            }
            '\\' => {
                in_word = true;
                only_single_quoted = false;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            other => {
                in_word = true;
                only_single_quoted = false;
                current.push(other);
            }
        }
    }
    finish(&mut current, &mut in_word, &mut only_single_quoted);

    // Words made only of single-quoted text had '$' doubled above; undo it.
    Ok(words
        .into_iter()
        .map(|word| match word {
            Word::Raw(text) => Word::Raw(text.replace("$$", "$")),
            other => other,
        })
        .collect())
}

/// Field and reference names: `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
