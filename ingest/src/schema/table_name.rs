use regex::Regex;

use crate::bail;
use crate::error::{ErrorKind, IngestResult};
use crate::schema::column_name::normalize_name;
use crate::types::{Record, Value, get_path};

const PLACEHOLDER_PATTERN: &str = r"\{\{(.*?)\}\}";

/// Result of extracting a table name from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableNameOutcome {
    Name(String),
    /// The template rendered to an empty, `null` or `false` name: the record is not stored.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Alternative {
    Literal(String),
    Path(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Placeholder(Vec<Alternative>),
}

/// Renders the table name of records from a template such as `events_{{ .type || "other" }}`.
///
/// Each placeholder lists alternatives separated by `||`: dot paths into the record or quoted
/// literals. The first alternative with a non-empty value wins.
#[derive(Debug, Clone)]
pub struct TableNameExtractor {
    template: String,
    segments: Vec<Segment>,
}

impl TableNameExtractor {
    pub fn new(template: &str) -> IngestResult<Self> {
        let regex = Regex::new(PLACEHOLDER_PATTERN)?;

        let mut segments = Vec::new();
        let mut last_end = 0;
        for captures in regex.captures_iter(template) {
            let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
                continue;
            };

            push_text(&mut segments, template, &template[last_end..whole.start()])?;
            segments.push(Segment::Placeholder(parse_alternatives(
                template,
                inner.as_str(),
            )?));
            last_end = whole.end();
        }
        push_text(&mut segments, template, &template[last_end..])?;

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Renders the table name of a nested record.
    pub fn extract(&self, record: &Record) -> TableNameOutcome {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Placeholder(alternatives) => {
                    rendered.push_str(&render_placeholder(alternatives, record))
                }
            }
        }

        match rendered.trim() {
            "" | "null" | "false" => TableNameOutcome::Skip,
            name => TableNameOutcome::Name(normalize_name(name)),
        }
    }
}

fn push_text(segments: &mut Vec<Segment>, template: &str, text: &str) -> IngestResult<()> {
    if text.contains("{{") || text.contains("}}") {
        bail!(
            ErrorKind::ConfigError,
            "Table name template is malformed",
            format!("unbalanced braces in `{template}`")
        );
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }

    Ok(())
}

fn parse_alternatives(template: &str, inner: &str) -> IngestResult<Vec<Alternative>> {
    split_alternatives(inner)
        .into_iter()
        .map(|alternative| parse_alternative(template, alternative.trim()))
        .collect()
}

/// Splits on `||` outside of quoted literals.
fn split_alternatives(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote = None;
    let mut start = 0;
    let bytes = inner.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        match (quote, bytes[index]) {
            (None, b'"' | b'\'') => quote = Some(bytes[index]),
            (Some(open), c) if c == open => quote = None,
            (None, b'|') if bytes.get(index + 1) == Some(&b'|') => {
                parts.push(&inner[start..index]);
                index += 2;
                start = index;
                continue;
            }
            _ => {}
        }
        index += 1;
    }
    parts.push(&inner[start..]);

    parts
}

fn parse_alternative(template: &str, alternative: &str) -> IngestResult<Alternative> {
    for quote in ['"', '\''] {
        if let Some(literal) = alternative
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return Ok(Alternative::Literal(literal.to_string()));
        }
    }

    if let Some(path) = alternative.strip_prefix('.') {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().all(|segment| !segment.is_empty()) {
            return Ok(Alternative::Path(segments));
        }
    }

    bail!(
        ErrorKind::ConfigError,
        "Table name template is malformed",
        format!("`{alternative}` in `{template}` is neither a `.path` nor a quoted literal")
    )
}

fn render_placeholder(alternatives: &[Alternative], record: &Record) -> String {
    let mut last = String::new();
    for alternative in alternatives {
        let (rendered, truthy) = match alternative {
            Alternative::Literal(literal) => (literal.clone(), !literal.is_empty()),
            Alternative::Path(path) => match get_path(record, path) {
                None => (String::new(), false),
                Some(value) => (value.to_string(), is_truthy(value)),
            },
        };

        if truthy {
            return rendered;
        }
        last = rendered;
    }

    last
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}
