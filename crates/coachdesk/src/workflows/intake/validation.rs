use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{
    parse_calendar_date, AnswerValue, BlockId, IntakeResponses, Question, QuestionId, QuestionKind,
};

const STEP_TOLERANCE: f64 = 1e-6;

/// Field-level validation failure shown next to the offending question.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("an answer is required")]
    Required,
    #[error("expected {expected}")]
    TypeMismatch { expected: &'static str },
    #[error("answer must be at most {max} characters")]
    TooLong { max: usize },
    #[error("value must be at least {min}")]
    BelowMinimum { min: f64 },
    #[error("value must be at most {max}")]
    AboveMaximum { max: f64 },
    #[error("value must be in steps of {step}")]
    StepMismatch { step: f64 },
    #[error("'{value}' is not one of the available options")]
    UnknownOption { value: String },
    #[error("'{raw}' is not a valid calendar date")]
    InvalidDate { raw: String },
    #[error("date must be on or after {earliest}")]
    TooEarly { earliest: NaiveDate },
    #[error("date must be on or before {latest}")]
    TooLate { latest: NaiveDate },
}

/// Result of checking a single question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionValidation {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl QuestionValidation {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// First failure for one question, with the block that contains it when known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub question_id: QuestionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<BlockId>,
    #[serde(flatten)]
    pub error: ValidationError,
    pub message: String,
}

impl FieldError {
    pub(crate) fn new(
        question_id: QuestionId,
        block_id: Option<BlockId>,
        error: ValidationError,
    ) -> Self {
        let message = error.to_string();
        Self {
            question_id,
            block_id,
            error,
            message,
        }
    }
}

/// Aggregate outcome for a set of questions; errors keep question order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntakeValidation {
    pub valid: bool,
    pub errors: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_invalid_block: Option<BlockId>,
}

impl IntakeValidation {
    pub(crate) fn from_errors(errors: Vec<FieldError>) -> Self {
        let first_invalid_block = errors.iter().find_map(|error| error.block_id.clone());
        Self {
            valid: errors.is_empty(),
            errors,
            first_invalid_block,
        }
    }

    pub fn error_for(&self, question: &QuestionId) -> Option<&ValidationError> {
        self.errors
            .iter()
            .find(|error| &error.question_id == question)
            .map(|error| &error.error)
    }

    pub fn failing_questions(&self) -> Vec<&QuestionId> {
        self.errors.iter().map(|error| &error.question_id).collect()
    }
}

/// Check one candidate value against its question definition. Never mutates anything.
pub fn validate(question: &Question, value: Option<&AnswerValue>) -> QuestionValidation {
    let Some(value) = value.filter(|value| !value.is_empty()) else {
        let errors = if question.required {
            vec![ValidationError::Required]
        } else {
            Vec::new()
        };
        return QuestionValidation::from_errors(errors);
    };

    let errors = match &question.kind {
        QuestionKind::ShortText { max_length } | QuestionKind::LongText { max_length } => {
            check_text(value, *max_length)
        }
        QuestionKind::Number { min, max, step, .. } => check_number(value, *min, *max, *step),
        QuestionKind::Range { min, max, step, .. } => {
            check_number(value, Some(*min), Some(*max), *step)
        }
        QuestionKind::SingleSelect { options } | QuestionKind::SingleChoice { options } => {
            check_single_option(value, options)
        }
        QuestionKind::MultiSelect { options } | QuestionKind::MultiChoice { options } => {
            check_multiple_options(value, options)
        }
        QuestionKind::Date { earliest, latest } => check_date(value, *earliest, *latest),
    };

    QuestionValidation::from_errors(errors)
}

/// Validate every given question against `responses`, surfacing the first error per question.
pub fn validate_all(questions: &[&Question], responses: &IntakeResponses) -> IntakeValidation {
    let errors = collect_errors(questions.iter().copied(), responses, None);
    IntakeValidation::from_errors(errors)
}

pub(crate) fn collect_errors<'q>(
    questions: impl Iterator<Item = &'q Question>,
    responses: &IntakeResponses,
    block_id: Option<&BlockId>,
) -> Vec<FieldError> {
    questions
        .filter_map(|question| {
            validate(question, responses.get(&question.id))
                .errors
                .into_iter()
                .next()
                .map(|error| FieldError::new(question.id.clone(), block_id.cloned(), error))
        })
        .collect()
}

fn check_text(value: &AnswerValue, max_length: Option<usize>) -> Vec<ValidationError> {
    if matches!(value, AnswerValue::List(_)) {
        return vec![ValidationError::TypeMismatch {
            expected: "a text answer",
        }];
    }

    let text = value.to_string();
    match max_length {
        Some(max) if text.trim().chars().count() > max => vec![ValidationError::TooLong { max }],
        _ => Vec::new(),
    }
}

fn check_number(
    value: &AnswerValue,
    min: Option<f64>,
    max: Option<f64>,
    step: Option<f64>,
) -> Vec<ValidationError> {
    let Some(number) = value.as_number() else {
        return vec![ValidationError::TypeMismatch {
            expected: "a number",
        }];
    };

    let mut errors = Vec::new();
    if let Some(min) = min {
        if number < min {
            errors.push(ValidationError::BelowMinimum { min });
        }
    }
    if let Some(max) = max {
        if number > max {
            errors.push(ValidationError::AboveMaximum { max });
        }
    }
    if let Some(step) = step.filter(|step| *step > 0.0) {
        let offset = (number - min.unwrap_or(0.0)) / step;
        if (offset - offset.round()).abs() > STEP_TOLERANCE {
            errors.push(ValidationError::StepMismatch { step });
        }
    }
    errors
}

fn check_single_option(value: &AnswerValue, options: &[String]) -> Vec<ValidationError> {
    let selected = match value {
        AnswerValue::List(items) if items.len() == 1 => items[0].clone(),
        AnswerValue::List(_) => {
            return vec![ValidationError::TypeMismatch {
                expected: "a single option",
            }]
        }
        other => other.to_string(),
    };

    if options.iter().any(|option| option == &selected) {
        Vec::new()
    } else {
        vec![ValidationError::UnknownOption { value: selected }]
    }
}

fn check_multiple_options(value: &AnswerValue, options: &[String]) -> Vec<ValidationError> {
    if matches!(value, AnswerValue::Number(_) | AnswerValue::Date(_)) {
        return vec![ValidationError::TypeMismatch {
            expected: "a list of options",
        }];
    }

    let mut seen: Vec<String> = Vec::new();
    let mut errors = Vec::new();
    for item in value.items() {
        if seen.contains(&item) {
            continue;
        }
        if !options.iter().any(|option| option == &item) {
            errors.push(ValidationError::UnknownOption {
                value: item.clone(),
            });
        }
        seen.push(item);
    }
    errors
}

fn check_date(
    value: &AnswerValue,
    earliest: Option<NaiveDate>,
    latest: Option<NaiveDate>,
) -> Vec<ValidationError> {
    let date = match value {
        AnswerValue::Date(date) => *date,
        AnswerValue::Text(raw) => match parse_calendar_date(raw) {
            Some(date) => date,
            None => return vec![ValidationError::InvalidDate { raw: raw.clone() }],
        },
        AnswerValue::Number(_) | AnswerValue::List(_) => {
            return vec![ValidationError::TypeMismatch {
                expected: "a calendar date (YYYY-MM-DD)",
            }]
        }
    };

    let mut errors = Vec::new();
    if let Some(earliest) = earliest {
        if date < earliest {
            errors.push(ValidationError::TooEarly { earliest });
        }
    }
    if let Some(latest) = latest {
        if date > latest {
            errors.push(ValidationError::TooLate { latest });
        }
    }
    errors
}
