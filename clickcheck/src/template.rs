//! Minimal text templates for URLs and message bodies.
//!
//! A template is literal text with `{{ .Name }}` placeholders (the leading dot
//! and the inner whitespace are optional). Rendering substitutes the named
//! field; a placeholder naming a field that was not supplied is an error.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::TemplateError;

/// Named values available to a template.
pub type Fields = BTreeMap<String, String>;

/// Anything that can turn a named template and fields into bytes.
pub trait Renderer {
    fn render(&self, name: &str, fields: &Fields) -> Result<Vec<u8>, TemplateError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }

            let after_open = &rest[start + 2..];
            let end = after_open.find("}}").ok_or(TemplateError::Syntax {
                offset: offset + start,
                reason: "unclosed action",
            })?;

            let inner = after_open[..end].trim();
            let name = inner.strip_prefix('.').unwrap_or(inner);
            if !is_identifier(name) {
                return Err(TemplateError::Syntax {
                    offset: offset + start,
                    reason: "expected a field reference",
                });
            }
            segments.push(Segment::Field(name.to_string()));

            let consumed = start + 2 + end + 2;
            rest = &rest[consumed..];
            offset += consumed;
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Whether any placeholder refers to `name`.
    pub fn references(&self, name: &str) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Field(f) if f == name))
    }

    pub fn render(&self, fields: &Fields) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = fields
                        .get(name)
                        .ok_or_else(|| TemplateError::Render(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Templates stored as `<name>.tpl` files in a directory.
#[derive(Debug, Clone)]
pub struct TemplateDir {
    root: PathBuf,
}

impl TemplateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path a template name resolves to. A trailing `.tpl` on the name is
    /// accepted.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let stem = name.strip_suffix(".tpl").unwrap_or(name);
        self.root.join(format!("{}.tpl", stem))
    }

    pub fn load(&self, name: &str) -> Result<Template, TemplateError> {
        let path = self.path_for(name);
        let source = read_template(name, &path)?;
        debug!(template = %path.display(), length = source.len(), "template_loaded");
        Template::parse(&source)
    }
}

fn read_template(name: &str, path: &Path) -> Result<String, TemplateError> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TemplateError::NotFound {
                name: name.to_string(),
                path: path.display().to_string(),
            }
        } else {
            TemplateError::Io {
                path: path.display().to_string(),
                source: e,
            }
        }
    })
}

impl Renderer for TemplateDir {
    fn render(&self, name: &str, fields: &Fields) -> Result<Vec<u8>, TemplateError> {
        Ok(self.load(name)?.render(fields)?.into_bytes())
    }
}
