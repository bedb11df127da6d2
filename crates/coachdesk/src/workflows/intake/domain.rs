use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::workflows::packets::PacketType;

/// Identifier of a single question in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub String);

impl QuestionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QuestionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for QuestionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a question block (one page of the intake).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub String);

impl BlockId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BlockId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Published question definition. Immutable once part of a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl Question {
    pub fn new(id: &str, label: &str, kind: QuestionKind) -> Self {
        Self {
            id: QuestionId::from(id),
            label: label.to_string(),
            required: false,
            kind,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Question type together with the constraints that only make sense for that type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuestionKind {
    ShortText {
        #[serde(default)]
        max_length: Option<usize>,
    },
    LongText {
        #[serde(default)]
        max_length: Option<usize>,
    },
    Number {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        step: Option<f64>,
        #[serde(default)]
        unit: Option<String>,
    },
    Range {
        min: f64,
        max: f64,
        #[serde(default)]
        step: Option<f64>,
        #[serde(default)]
        unit: Option<String>,
    },
    SingleSelect {
        options: Vec<String>,
    },
    MultiSelect {
        options: Vec<String>,
    },
    SingleChoice {
        options: Vec<String>,
    },
    MultiChoice {
        options: Vec<String>,
    },
    Date {
        #[serde(default)]
        earliest: Option<NaiveDate>,
        #[serde(default)]
        latest: Option<NaiveDate>,
    },
}

impl QuestionKind {
    pub fn options(&self) -> Option<&[String]> {
        match self {
            QuestionKind::SingleSelect { options }
            | QuestionKind::MultiSelect { options }
            | QuestionKind::SingleChoice { options }
            | QuestionKind::MultiChoice { options } => Some(options),
            _ => None,
        }
    }

    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            QuestionKind::MultiSelect { .. } | QuestionKind::MultiChoice { .. }
        )
    }
}

pub(crate) fn owned_options(options: &[&str]) -> Vec<String> {
    options.iter().map(|option| option.to_string()).collect()
}

/// Titled, ordered group of questions; the unit of pagination and progress tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionBlock {
    pub id: BlockId,
    pub title: String,
    pub questions: Vec<Question>,
}

/// A respondent's answer. Untagged so API payloads can send plain JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Number(f64),
    List(Vec<String>),
    Date(NaiveDate),
    Text(String),
}

impl AnswerValue {
    pub fn text(value: &str) -> Self {
        AnswerValue::Text(value.to_string())
    }

    pub fn list(values: &[&str]) -> Self {
        AnswerValue::List(owned_options(values))
    }

    /// Blank text and empty lists count as "not answered".
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::List(items) => items.iter().all(|item| item.trim().is_empty()),
            AnswerValue::Number(_) | AnswerValue::Date(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AnswerValue::Number(value) if value.is_finite() => Some(*value),
            AnswerValue::Text(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            AnswerValue::Date(date) => Some(*date),
            AnswerValue::Text(text) => parse_calendar_date(text),
            _ => None,
        }
    }

    /// Values of a list answer, or the single scalar rendered as text.
    pub fn items(&self) -> Vec<String> {
        match self {
            AnswerValue::List(items) => items.clone(),
            other => vec![other.to_string()],
        }
    }

    /// De-duplicated copy (first occurrence wins) for list answers.
    pub fn normalized(self) -> Self {
        match self {
            AnswerValue::List(items) => {
                let mut unique: Vec<String> = Vec::with_capacity(items.len());
                for item in items {
                    if !unique.contains(&item) {
                        unique.push(item);
                    }
                }
                AnswerValue::List(unique)
            }
            other => other,
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Number(value) => write!(f, "{value}"),
            AnswerValue::List(items) => f.write_str(&items.join(", ")),
            AnswerValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            AnswerValue::Text(text) => f.write_str(text),
        }
    }
}

pub(crate) fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Answers keyed by question id. Keys are unique and ordering carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntakeResponses(BTreeMap<QuestionId, AnswerValue>);

impl IntakeResponses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, question: &str, value: AnswerValue) -> Self {
        self.insert(QuestionId::from(question), value);
        self
    }

    pub fn insert(&mut self, question: QuestionId, value: AnswerValue) -> Option<AnswerValue> {
        self.0.insert(question, value)
    }

    pub fn remove(&mut self, question: &QuestionId) -> Option<AnswerValue> {
        self.0.remove(question)
    }

    pub fn get(&self, question: &QuestionId) -> Option<&AnswerValue> {
        self.0.get(question)
    }

    /// The stored value only when it is non-empty.
    pub fn answered(&self, question: &QuestionId) -> Option<&AnswerValue> {
        self.0.get(question).filter(|value| !value.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &AnswerValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &QuestionId> {
        self.0.keys()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&QuestionId) -> bool) {
        self.0.retain(|question, _| keep(question));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Element a branching rule controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RuleTarget {
    Block(BlockId),
    Question(QuestionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    IsSet,
    IsNotSet,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[default]
    All,
    Any,
}

/// Single comparison against the current answer of `field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: QuestionId,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AnswerValue>,
}

impl Condition {
    pub fn new(field: &str, operator: ConditionOperator, value: Option<AnswerValue>) -> Self {
        Self {
            field: QuestionId::from(field),
            operator,
            value,
        }
    }

    pub fn equals(field: &str, value: AnswerValue) -> Self {
        Self::new(field, ConditionOperator::Equals, Some(value))
    }
}

/// Node of a predicate tree: a leaf condition or a nested group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    Condition(Condition),
    Group(PredicateGroup),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateGroup {
    #[serde(default)]
    pub combinator: Combinator,
    pub conditions: Vec<Predicate>,
}

impl PredicateGroup {
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self {
            combinator: Combinator::All,
            conditions: conditions.into_iter().map(Predicate::Condition).collect(),
        }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Self {
            combinator: Combinator::Any,
            conditions: conditions.into_iter().map(Predicate::Condition).collect(),
        }
    }
}

/// Visibility rule for a block or question. Stateless; evaluated fresh on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchingRule {
    pub target: RuleTarget,
    #[serde(flatten)]
    pub predicate: PredicateGroup,
}

impl BranchingRule {
    pub fn block(id: &str, predicate: PredicateGroup) -> Self {
        Self {
            target: RuleTarget::Block(BlockId::from(id)),
            predicate,
        }
    }

    pub fn question(id: &str, predicate: PredicateGroup) -> Self {
        Self {
            target: RuleTarget::Question(QuestionId::from(id)),
            predicate,
        }
    }
}

/// Packet type generated on submission when `when` holds (always when absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRequirement {
    pub packet_type: PacketType,
    #[serde(default)]
    pub when: Option<PredicateGroup>,
}

/// Whether answers to questions hidden at submission time are kept in the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiddenAnswerPolicy {
    #[default]
    Retain,
    Purge,
}

impl std::str::FromStr for HiddenAnswerPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "retain" | "keep" => Ok(Self::Retain),
            "purge" | "drop" => Ok(Self::Purge),
            other => Err(format!("unknown hidden answer policy '{other}'")),
        }
    }
}
