//! Visibility evaluation for blocks and questions.
//!
//! Evaluation is a pure function of the rule set and the current responses. A condition whose
//! field has no answer only matches `is-not-set`; every other operator treats it as false, so a
//! rule pointing at a field that does not exist degrades to "condition false" instead of failing.

use std::cmp::Ordering;

use super::domain::{
    AnswerValue, BlockId, BranchingRule, Combinator, Condition, ConditionOperator,
    IntakeResponses, Predicate, PredicateGroup, Question, QuestionBlock, QuestionId, RuleTarget,
};

const NUMERIC_TOLERANCE: f64 = 1e-9;

/// Borrowing view over a rule set that answers visibility questions.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityEvaluator<'a> {
    rules: &'a [BranchingRule],
}

impl<'a> VisibilityEvaluator<'a> {
    pub fn new(rules: &'a [BranchingRule]) -> Self {
        Self { rules }
    }

    /// Ids of the visible blocks, in source order.
    pub fn visible_blocks(
        &self,
        blocks: &[QuestionBlock],
        responses: &IntakeResponses,
    ) -> Vec<BlockId> {
        blocks
            .iter()
            .filter(|block| self.block_visible(&block.id, responses))
            .map(|block| block.id.clone())
            .collect()
    }

    /// Visible questions of one block, in source order.
    pub fn visible_questions<'q>(
        &self,
        questions: &'q [Question],
        responses: &IntakeResponses,
    ) -> Vec<&'q Question> {
        questions
            .iter()
            .filter(|question| self.question_visible(&question.id, responses))
            .collect()
    }

    pub fn block_visible(&self, block: &BlockId, responses: &IntakeResponses) -> bool {
        self.target_visible(
            |target| matches!(target, RuleTarget::Block(id) if id == block),
            responses,
        )
    }

    pub fn question_visible(&self, question: &QuestionId, responses: &IntakeResponses) -> bool {
        self.target_visible(
            |target| matches!(target, RuleTarget::Question(id) if id == question),
            responses,
        )
    }

    // Rules sharing a target are AND-ed; no rule means visible.
    fn target_visible(
        &self,
        is_target: impl Fn(&RuleTarget) -> bool,
        responses: &IntakeResponses,
    ) -> bool {
        self.rules
            .iter()
            .filter(|rule| is_target(&rule.target))
            .all(|rule| rule.predicate.evaluate(responses))
    }
}

/// Free-function form of [`VisibilityEvaluator::visible_blocks`].
pub fn visible_blocks(
    blocks: &[QuestionBlock],
    rules: &[BranchingRule],
    responses: &IntakeResponses,
) -> Vec<BlockId> {
    VisibilityEvaluator::new(rules).visible_blocks(blocks, responses)
}

/// Free-function form of [`VisibilityEvaluator::visible_questions`].
pub fn visible_questions<'q>(
    questions: &'q [Question],
    rules: &[BranchingRule],
    responses: &IntakeResponses,
) -> Vec<&'q Question> {
    VisibilityEvaluator::new(rules).visible_questions(questions, responses)
}

impl PredicateGroup {
    /// `ALL` over nothing is true, `ANY` over nothing is false.
    pub fn evaluate(&self, responses: &IntakeResponses) -> bool {
        match self.combinator {
            Combinator::All => self
                .conditions
                .iter()
                .all(|predicate| predicate.evaluate(responses)),
            Combinator::Any => self
                .conditions
                .iter()
                .any(|predicate| predicate.evaluate(responses)),
        }
    }
}

impl Predicate {
    pub fn evaluate(&self, responses: &IntakeResponses) -> bool {
        match self {
            Predicate::Condition(condition) => condition.matches(responses),
            Predicate::Group(group) => group.evaluate(responses),
        }
    }
}

impl Condition {
    pub fn matches(&self, responses: &IntakeResponses) -> bool {
        let answer = responses.answered(&self.field);
        let expected = self.value.as_ref();

        match self.operator {
            ConditionOperator::IsSet => answer.is_some(),
            ConditionOperator::IsNotSet => answer.is_none(),
            ConditionOperator::Equals => both(answer, expected, values_equal),
            ConditionOperator::NotEquals => both(answer, expected, |a, e| !values_equal(a, e)),
            ConditionOperator::Contains => both(answer, expected, contains),
            ConditionOperator::GreaterThan => both(answer, expected, |a, e| {
                compare(a, e) == Some(Ordering::Greater)
            }),
            ConditionOperator::LessThan => {
                both(answer, expected, |a, e| compare(a, e) == Some(Ordering::Less))
            }
        }
    }
}

fn both(
    answer: Option<&AnswerValue>,
    expected: Option<&AnswerValue>,
    test: impl Fn(&AnswerValue, &AnswerValue) -> bool,
) -> bool {
    match (answer, expected) {
        (Some(answer), Some(expected)) => test(answer, expected),
        _ => false,
    }
}

fn values_equal(answer: &AnswerValue, expected: &AnswerValue) -> bool {
    match (answer, expected) {
        (AnswerValue::List(items), AnswerValue::List(wanted)) => {
            let mut left: Vec<&String> = items.iter().collect();
            let mut right: Vec<&String> = wanted.iter().collect();
            left.sort();
            left.dedup();
            right.sort();
            right.dedup();
            left == right
        }
        (AnswerValue::List(items), scalar) => items.len() == 1 && items[0] == scalar.to_string(),
        (scalar, AnswerValue::List(wanted)) => {
            wanted.len() == 1 && wanted[0] == scalar.to_string()
        }
        _ => {
            if let (Some(left), Some(right)) = (answer.as_number(), expected.as_number()) {
                return (left - right).abs() < NUMERIC_TOLERANCE;
            }
            if let (Some(left), Some(right)) = (answer.as_date(), expected.as_date()) {
                return left == right;
            }
            answer.to_string() == expected.to_string()
        }
    }
}

fn contains(answer: &AnswerValue, expected: &AnswerValue) -> bool {
    match answer {
        AnswerValue::List(items) => expected
            .items()
            .iter()
            .all(|wanted| items.iter().any(|item| item == wanted)),
        AnswerValue::Text(text) => match expected {
            AnswerValue::List(_) => false,
            other => text.contains(&other.to_string()),
        },
        AnswerValue::Number(_) | AnswerValue::Date(_) => false,
    }
}

fn compare(answer: &AnswerValue, expected: &AnswerValue) -> Option<Ordering> {
    if let (Some(left), Some(right)) = (answer.as_number(), expected.as_number()) {
        return left.partial_cmp(&right);
    }
    if let (Some(left), Some(right)) = (answer.as_date(), expected.as_date()) {
        return Some(left.cmp(&right));
    }
    None
}
