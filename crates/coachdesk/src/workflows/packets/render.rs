//! Placeholder substitution over packet templates.
//!
//! Rendering is a pure function of the template and the context: identical inputs always
//! produce identical output.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;

use super::context::{ContextResolver, ContextValue};
use super::template::{ContentBlock, ContentKind, PacketTemplate, PacketType};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("required placeholder '{path}' is missing in block '{block_id}'")]
    MissingPlaceholder { path: String, block_id: String },
    #[error("malformed placeholder '{token}' in block '{block_id}'")]
    MalformedPlaceholder { token: String, block_id: String },
    #[error("data source '{path}' for block '{block_id}' is missing")]
    MissingDataSource { path: String, block_id: String },
    #[error("data source '{path}' for block '{block_id}' is not a table or list")]
    UnstructuredDataSource { path: String, block_id: String },
    #[error("no template for packet type {packet_type}")]
    TemplateNotFound { packet_type: PacketType },
}

impl RenderError {
    /// Dotted path at fault, when the failure is about missing or bad data.
    pub fn path(&self) -> Option<&str> {
        match self {
            RenderError::MissingPlaceholder { path, .. }
            | RenderError::MissingDataSource { path, .. }
            | RenderError::UnstructuredDataSource { path, .. } => Some(path),
            RenderError::MalformedPlaceholder { .. } | RenderError::TemplateNotFound { .. } => {
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedBlock {
    pub id: String,
    pub kind: ContentKind,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ContextValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedSection {
    pub id: String,
    pub title: String,
    pub blocks: Vec<RenderedBlock>,
}

/// Ordered sections handed to the archive and delivery collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPacket {
    pub template_id: String,
    pub packet_type: PacketType,
    pub sections: Vec<RenderedSection>,
}

impl RenderedPacket {
    pub fn blocks(&self) -> impl Iterator<Item = &RenderedBlock> {
        self.sections.iter().flat_map(|section| section.blocks.iter())
    }

    /// Plain-text rendering used by logs and the CLI demo.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str("## ");
            out.push_str(&section.title);
            out.push('\n');
            for block in &section.blocks {
                if !block.text.is_empty() {
                    out.push_str(&block.text);
                    out.push('\n');
                }
                if let Some(ContextValue::List(rows)) = &block.data {
                    for row in rows {
                        out.push_str("  - ");
                        out.push_str(&row.to_string());
                        out.push('\n');
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("valid placeholder regex"))
}

fn stray_brace_pattern() -> &'static Regex {
    static STRAY: OnceLock<Regex> = OnceLock::new();
    STRAY.get_or_init(|| Regex::new(r"\{\{[^{}]*\}?|\}\}").expect("valid stray brace regex"))
}

fn path_pattern() -> &'static Regex {
    static PATH: OnceLock<Regex> = OnceLock::new();
    PATH.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)+$").expect("valid path regex")
    })
}

/// Every `scope.path` referenced by a block's content, in order of appearance.
pub fn placeholders(content: &str) -> Vec<String> {
    token_pattern()
        .captures_iter(content)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Render every section of `template` against `context`, failing on the first required gap.
pub fn render(
    template: &PacketTemplate,
    context: &impl ContextResolver,
) -> Result<RenderedPacket, RenderError> {
    let mut sections = Vec::with_capacity(template.sections.len());
    for section in &template.sections {
        let mut blocks = Vec::with_capacity(section.blocks.len());
        // References to blocks the template does not define are dropped.
        for block in section.blocks.iter().filter_map(|id| template.block(id)) {
            blocks.push(render_block(block, context)?);
        }
        sections.push(RenderedSection {
            id: section.id.clone(),
            title: section.title.clone(),
            blocks,
        });
    }

    Ok(RenderedPacket {
        template_id: template.id.clone(),
        packet_type: template.packet_type,
        sections,
    })
}

pub fn render_block(
    block: &ContentBlock,
    context: &impl ContextResolver,
) -> Result<RenderedBlock, RenderError> {
    let text = substitute(block, context)?;

    let data = match (&block.data_source, block.kind.is_structured()) {
        (Some(path), true) => {
            let value = context
                .resolve(path)
                .ok_or_else(|| RenderError::MissingDataSource {
                    path: path.clone(),
                    block_id: block.id.clone(),
                })?;
            if !value.is_structured() {
                return Err(RenderError::UnstructuredDataSource {
                    path: path.clone(),
                    block_id: block.id.clone(),
                });
            }
            Some(value.clone())
        }
        _ => None,
    };

    Ok(RenderedBlock {
        id: block.id.clone(),
        kind: block.kind,
        text,
        data,
    })
}

fn substitute(block: &ContentBlock, context: &impl ContextResolver) -> Result<String, RenderError> {
    // Braces left over once complete tokens are removed belong to an unterminated placeholder.
    let remainder = token_pattern().replace_all(&block.content, "");
    if let Some(stray) = stray_brace_pattern().find(&remainder) {
        return Err(RenderError::MalformedPlaceholder {
            token: stray.as_str().to_string(),
            block_id: block.id.clone(),
        });
    }

    let mut failure = None;
    let rendered = token_pattern().replace_all(&block.content, |caps: &Captures| {
        if failure.is_some() {
            return String::new();
        }
        let path = &caps[1];
        if !path_pattern().is_match(path) {
            failure = Some(RenderError::MalformedPlaceholder {
                token: caps[0].to_string(),
                block_id: block.id.clone(),
            });
            return String::new();
        }
        match context.resolve(path) {
            Some(value) => value.to_string(),
            None if block.is_optional(path) => String::new(),
            None => {
                failure = Some(RenderError::MissingPlaceholder {
                    path: path.to_string(),
                    block_id: block.id.clone(),
                });
                String::new()
            }
        }
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(rendered.into_owned()),
    }
}
