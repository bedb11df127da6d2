use std::sync::Arc;

use crate::workflows::intake::{
    AnswerValue, BranchingRule, Condition, ConditionOperator, IntakeCatalog, IntakeResponses,
    PredicateGroup, Question, QuestionBlock, QuestionKind,
};

pub(super) fn catalog() -> Arc<IntakeCatalog> {
    Arc::new(IntakeCatalog::standard())
}

/// Answers that satisfy every always-visible required question of the standard catalog.
pub(super) fn complete_responses() -> IntakeResponses {
    IntakeResponses::new()
        .with("preferred_name", AnswerValue::text("Jordan"))
        .with("age", AnswerValue::Number(34.0))
        .with("sex", AnswerValue::text("male"))
        .with("height_cm", AnswerValue::Number(180.0))
        .with("weight_kg", AnswerValue::Number(82.0))
        .with("primary_goal", AnswerValue::text("maintain"))
        .with("activity_level", AnswerValue::text("moderate"))
        .with("training_days", AnswerValue::Number(4.0))
        .with("equipment", AnswerValue::list(&["dumbbells", "bands"]))
        .with("injuries", AnswerValue::text("no"))
        .with("cooking_frequency", AnswerValue::text("often"))
        .with("meal_prep_minutes", AnswerValue::Number(30.0))
        .with("sleep_hours", AnswerValue::Number(7.5))
        .with("stress_level", AnswerValue::Number(4.0))
}

pub(super) fn number_question(id: &str) -> Question {
    Question::new(
        id,
        id,
        QuestionKind::Number {
            min: None,
            max: None,
            step: None,
            unit: None,
        },
    )
}

pub(super) fn block(id: &str, questions: &[&str]) -> QuestionBlock {
    QuestionBlock {
        id: id.into(),
        title: id.to_string(),
        questions: questions.iter().map(|id| number_question(id)).collect(),
    }
}

pub(super) fn condition(
    field: &str,
    operator: ConditionOperator,
    value: Option<AnswerValue>,
) -> Condition {
    Condition::new(field, operator, value)
}

pub(super) fn question_rule(target: &str, condition: Condition) -> BranchingRule {
    BranchingRule::question(target, PredicateGroup::all(vec![condition]))
}
