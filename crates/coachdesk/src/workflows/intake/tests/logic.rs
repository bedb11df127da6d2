use super::common::*;
use crate::workflows::intake::{
    visible_blocks, visible_questions, AnswerValue, BlockId, BranchingRule, Combinator,
    ConditionOperator, IntakeResponses, Predicate, PredicateGroup,
};

fn ids(questions: &[&crate::workflows::intake::Question]) -> Vec<String> {
    questions
        .iter()
        .map(|question| question.id.as_str().to_string())
        .collect()
}

#[test]
fn unruled_elements_are_visible_in_source_order() {
    let blocks = vec![block("b1", &["q1", "q2"]), block("b2", &["q3"])];
    let responses = IntakeResponses::new();

    let visible = visible_blocks(&blocks, &[], &responses);

    assert_eq!(visible, vec![BlockId::from("b1"), BlockId::from("b2")]);
    assert_eq!(
        ids(&visible_questions(&blocks[0].questions, &[], &responses)),
        vec!["q1", "q2"]
    );
}

#[test]
fn missing_field_only_matches_is_not_set() {
    let responses = IntakeResponses::new();
    let operators = [
        (ConditionOperator::Equals, false),
        (ConditionOperator::NotEquals, false),
        (ConditionOperator::Contains, false),
        (ConditionOperator::GreaterThan, false),
        (ConditionOperator::LessThan, false),
        (ConditionOperator::IsSet, false),
        (ConditionOperator::IsNotSet, true),
    ];

    for (operator, expected) in operators {
        let check = condition("ghost", operator, Some(AnswerValue::Number(1.0)));
        assert_eq!(check.matches(&responses), expected, "{operator:?}");
    }
}

#[test]
fn rule_on_nonexistent_field_hides_target_without_failing() {
    let blocks = vec![block("b1", &["q1", "q2"])];
    let rules = vec![question_rule(
        "q2",
        condition(
            "does_not_exist",
            ConditionOperator::Equals,
            Some(AnswerValue::text("x")),
        ),
    )];

    let visible = visible_questions(&blocks[0].questions, &rules, &IntakeResponses::new());

    assert_eq!(ids(&visible), vec!["q1"]);
}

#[test]
fn multiple_rules_for_one_target_are_anded() {
    let blocks = vec![block("b1", &["a", "b", "target"])];
    let rules = vec![
        question_rule(
            "target",
            condition("a", ConditionOperator::GreaterThan, Some(AnswerValue::Number(5.0))),
        ),
        question_rule(
            "target",
            condition("b", ConditionOperator::LessThan, Some(AnswerValue::Number(3.0))),
        ),
    ];

    let only_first = IntakeResponses::new().with("a", AnswerValue::Number(9.0));
    let both = only_first.clone().with("b", AnswerValue::Number(1.0));

    assert_eq!(
        ids(&visible_questions(&blocks[0].questions, &rules, &only_first)),
        vec!["a", "b"]
    );
    assert_eq!(
        ids(&visible_questions(&blocks[0].questions, &rules, &both)),
        vec!["a", "b", "target"]
    );
}

#[test]
fn any_combinator_and_nested_groups() {
    let blocks = vec![block("b1", &["x", "y", "target"])];
    let rules = vec![BranchingRule::question(
        "target",
        PredicateGroup {
            combinator: Combinator::Any,
            conditions: vec![
                Predicate::Condition(condition(
                    "x",
                    ConditionOperator::Equals,
                    Some(AnswerValue::Number(1.0)),
                )),
                Predicate::Group(PredicateGroup::all(vec![
                    condition("y", ConditionOperator::IsSet, None),
                    condition("x", ConditionOperator::IsNotSet, None),
                ])),
            ],
        },
    )];

    let via_x = IntakeResponses::new().with("x", AnswerValue::Number(1.0));
    let via_group = IntakeResponses::new().with("y", AnswerValue::Number(2.0));
    let neither = IntakeResponses::new()
        .with("x", AnswerValue::Number(2.0))
        .with("y", AnswerValue::Number(2.0));

    for (responses, visible) in [(via_x, true), (via_group, true), (neither, false)] {
        let shown = ids(&visible_questions(&blocks[0].questions, &rules, &responses));
        assert_eq!(shown.contains(&"target".to_string()), visible);
    }
}

#[test]
fn empty_groups_follow_identity_elements() {
    let responses = IntakeResponses::new();
    assert!(PredicateGroup::all(Vec::new()).evaluate(&responses));
    assert!(!PredicateGroup::any(Vec::new()).evaluate(&responses));
}

#[test]
fn operator_semantics_cover_lists_numbers_and_dates() {
    let responses = IntakeResponses::new()
        .with("equipment", AnswerValue::list(&["bands", "dumbbells"]))
        .with("goal", AnswerValue::list(&["lose_fat"]))
        .with("age", AnswerValue::text("42"))
        .with("notes", AnswerValue::text("bad left knee"))
        .with("goal_date", AnswerValue::text("2026-06-01"))
        .with("blank", AnswerValue::text("  "));

    let cases = [
        ("equipment", ConditionOperator::Contains, Some(AnswerValue::text("bands")), true),
        ("equipment", ConditionOperator::Contains, Some(AnswerValue::text("barbell")), false),
        ("goal", ConditionOperator::Equals, Some(AnswerValue::text("lose_fat")), true),
        ("age", ConditionOperator::Equals, Some(AnswerValue::Number(42.0)), true),
        ("age", ConditionOperator::GreaterThan, Some(AnswerValue::Number(40.0)), true),
        ("notes", ConditionOperator::Contains, Some(AnswerValue::text("knee")), true),
        ("notes", ConditionOperator::GreaterThan, Some(AnswerValue::Number(1.0)), false),
        ("goal_date", ConditionOperator::LessThan, Some(AnswerValue::text("2026-12-31")), true),
        ("blank", ConditionOperator::IsSet, None, false),
        ("blank", ConditionOperator::IsNotSet, None, true),
    ];

    for (field, operator, value, expected) in cases {
        let check = condition(field, operator, value);
        assert_eq!(check.matches(&responses), expected, "{field} {operator:?}");
    }
}

#[test]
fn visibility_is_deterministic_and_idempotent() {
    let catalog = catalog();
    let responses = complete_responses().with("sex", AnswerValue::text("female"));

    let first = catalog.visible_block_ids(&responses);
    let second = catalog.visible_block_ids(&responses);

    assert_eq!(first, second);
    let positions: Vec<usize> = first
        .iter()
        .filter_map(|id| catalog.blocks().iter().position(|block| &block.id == id))
        .collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
}
