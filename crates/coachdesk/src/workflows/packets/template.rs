use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of generated document. Together with a client id it forms the generation dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacketType {
    Nutrition,
    Training,
    Lifestyle,
}

impl PacketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Nutrition => "NUTRITION",
            PacketType::Training => "TRAINING",
            PacketType::Lifestyle => "LIFESTYLE",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PacketType::Nutrition => "Nutrition Plan",
            PacketType::Training => "Training Plan",
            PacketType::Lifestyle => "Lifestyle Guide",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PacketType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "NUTRITION" => Ok(Self::Nutrition),
            "TRAINING" => Ok(Self::Training),
            "LIFESTYLE" => Ok(Self::Lifestyle),
            other => Err(format!("unknown packet type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Table,
    List,
    Chart,
    Image,
    Heading,
    Divider,
}

impl ContentKind {
    /// Structured kinds resolve `data_source` to a value instead of substituting text only.
    pub fn is_structured(&self) -> bool {
        matches!(self, ContentKind::Table | ContentKind::Chart)
    }
}

/// Reusable piece of template content with `{{scope.path}}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,
    pub kind: ContentKind,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    /// Placeholder paths that render as an empty string when absent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional: Vec<String>,
}

impl ContentBlock {
    pub fn new(id: &str, kind: ContentKind, content: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            content: content.to_string(),
            data_source: None,
            optional: Vec::new(),
        }
    }

    pub fn with_data_source(mut self, path: &str) -> Self {
        self.data_source = Some(path.to_string());
        self
    }

    pub fn with_optional(mut self, paths: &[&str]) -> Self {
        self.optional.extend(paths.iter().map(|path| path.to_string()));
        self
    }

    pub fn is_optional(&self, path: &str) -> bool {
        self.optional.iter().any(|optional| optional == path)
    }
}

/// Titled section listing content block ids in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketSection {
    pub id: String,
    pub title: String,
    pub blocks: Vec<String>,
}

impl PacketSection {
    pub fn new(id: &str, title: &str, blocks: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            blocks: blocks.iter().map(|block| block.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketTemplate {
    pub id: String,
    pub packet_type: PacketType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub sections: Vec<PacketSection>,
    pub blocks: Vec<ContentBlock>,
}

impl PacketTemplate {
    pub fn block(&self, id: &str) -> Option<&ContentBlock> {
        self.blocks.iter().find(|block| block.id == id)
    }

    pub fn matches_segment(&self, segment: Option<&str>) -> bool {
        match (&self.segment, segment) {
            (Some(filter), Some(segment)) => filter.eq_ignore_ascii_case(segment),
            _ => false,
        }
    }
}
