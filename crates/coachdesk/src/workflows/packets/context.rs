//! Typed render context: named scopes of nested values resolved by dotted path.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::workflows::intake::{AnswerValue, IntakeResponses};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<ContextValue>),
    Map(BTreeMap<String, ContextValue>),
}

impl ContextValue {
    pub fn text(value: impl Into<String>) -> Self {
        ContextValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ContextValue::Null)
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ContextValue::List(_) | ContextValue::Map(_))
    }

    fn child(&self, key: &str) -> Option<&ContextValue> {
        match self {
            ContextValue::Map(entries) => entries.get(key),
            ContextValue::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }
}

/// Substitution form: whole numbers drop the fraction, lists join with ", ".
impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Null => Ok(()),
            ContextValue::Bool(true) => f.write_str("yes"),
            ContextValue::Bool(false) => f.write_str("no"),
            ContextValue::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{value}")
                }
            }
            ContextValue::Text(text) => f.write_str(text),
            ContextValue::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            ContextValue::Map(entries) => {
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::Text(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        ContextValue::Text(value)
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        ContextValue::Number(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        ContextValue::Bool(value)
    }
}

impl From<NaiveDate> for ContextValue {
    fn from(value: NaiveDate) -> Self {
        ContextValue::Text(value.format("%Y-%m-%d").to_string())
    }
}

impl<T: Into<ContextValue>> From<Option<T>> for ContextValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ContextValue::Null, Into::into)
    }
}

impl From<&AnswerValue> for ContextValue {
    fn from(value: &AnswerValue) -> Self {
        match value {
            AnswerValue::Number(number) => ContextValue::Number(*number),
            AnswerValue::Text(text) => ContextValue::Text(text.clone()),
            AnswerValue::Date(date) => (*date).into(),
            AnswerValue::List(items) => {
                ContextValue::List(items.iter().map(|item| item.as_str().into()).collect())
            }
        }
    }
}

/// Lookup seam the renderer depends on. `Null` values are reported as absent.
pub trait ContextResolver {
    fn resolve(&self, path: &str) -> Option<&ContextValue>;
}

/// Scope name to value tree. Ordered maps keep rendering deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RenderContext {
    scopes: BTreeMap<String, ContextValue>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: &str, fields: BTreeMap<String, ContextValue>) -> Self {
        self.scopes
            .insert(scope.to_string(), ContextValue::Map(fields));
        self
    }

    /// Set `scope.key`, creating the scope when needed.
    pub fn insert(&mut self, scope: &str, key: &str, value: impl Into<ContextValue>) {
        let entry = self
            .scopes
            .entry(scope.to_string())
            .or_insert_with(|| ContextValue::Map(BTreeMap::new()));
        if let ContextValue::Map(fields) = entry {
            fields.insert(key.to_string(), value.into());
        } else {
            let mut fields = BTreeMap::new();
            fields.insert(key.to_string(), value.into());
            *entry = ContextValue::Map(fields);
        }
    }

    pub fn scope(&self, scope: &str) -> Option<&ContextValue> {
        self.scopes.get(scope)
    }

    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    /// `answers.*` scope holding every answer keyed by question id.
    pub fn answers_scope(responses: &IntakeResponses) -> BTreeMap<String, ContextValue> {
        responses
            .iter()
            .map(|(question, value)| (question.as_str().to_string(), value.into()))
            .collect()
    }
}

impl ContextResolver for RenderContext {
    fn resolve(&self, path: &str) -> Option<&ContextValue> {
        let mut segments = path.split('.');
        let scope = segments.next()?;
        let mut current = self.scopes.get(scope)?;
        for segment in segments {
            current = current.child(segment)?;
        }
        (!current.is_null()).then_some(current)
    }
}
