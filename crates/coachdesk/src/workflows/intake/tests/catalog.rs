use super::common::*;
use crate::workflows::intake::{
    AnswerValue, BlockId, CatalogError, IntakeCatalog, IntakeResponses, QuestionBlock,
    QuestionId, QuestionKind,
};

#[test]
fn pregnancy_block_only_for_female_respondents() {
    let catalog = catalog();
    let pregnancy = BlockId::from("pregnancy");

    let male = complete_responses();
    let female = complete_responses().with("sex", AnswerValue::text("female"));

    assert!(!catalog.visible_block_ids(&male).contains(&pregnancy));
    assert!(catalog.visible_block_ids(&female).contains(&pregnancy));
}

#[test]
fn hidden_block_hides_its_questions_regardless_of_question_rules() {
    let catalog = catalog();
    let responses = complete_responses().with("pregnancy_status", AnswerValue::text("pregnant"));

    assert!(!catalog.is_question_visible(&QuestionId::from("pregnancy_trimester"), &responses));

    let female = responses.with("sex", AnswerValue::text("female"));
    assert!(catalog.is_question_visible(&QuestionId::from("pregnancy_trimester"), &female));
}

#[test]
fn submission_fails_iff_a_visible_required_question_is_bad() {
    let catalog = catalog();
    let complete = complete_responses();
    assert!(catalog.validate(&complete).valid);

    let required: Vec<QuestionId> = catalog
        .visible(&complete)
        .iter()
        .flat_map(|visible| visible.questions.iter())
        .filter(|question| question.required)
        .map(|question| question.id.clone())
        .collect();
    assert!(!required.is_empty());

    for question in required {
        let mut responses = complete.clone();
        responses.remove(&question);
        let report = catalog.validate(&responses);
        assert!(!report.valid, "{question} missing should fail");
        assert_eq!(report.failing_questions(), vec![&question]);
    }
}

#[test]
fn lookups_resolve_blocks_and_questions() {
    let catalog = catalog();
    let question = QuestionId::from("meal_prep_minutes");

    assert!(catalog.question(&question).is_some());
    assert_eq!(
        catalog.block_of(&question).map(|block| block.id.as_str()),
        Some("nutrition")
    );
    assert!(catalog.block(&BlockId::from("missing")).is_none());
    assert!(catalog.validate_block(&BlockId::from("missing"), &IntakeResponses::new()).is_none());
}

#[test]
fn new_rejects_duplicate_ids_and_optionless_choices() {
    let duplicate_blocks = IntakeCatalog::new(
        vec![block("b1", &["q1"]), block("b1", &["q2"])],
        Vec::new(),
        Vec::new(),
    );
    assert!(matches!(
        duplicate_blocks,
        Err(CatalogError::DuplicateBlock(_))
    ));

    let duplicate_questions = IntakeCatalog::new(
        vec![block("b1", &["q1"]), block("b2", &["q1"])],
        Vec::new(),
        Vec::new(),
    );
    assert!(matches!(
        duplicate_questions,
        Err(CatalogError::DuplicateQuestion(_))
    ));

    let mut empty_choice = block("b1", &["q1"]);
    empty_choice.questions[0].kind = QuestionKind::SingleSelect {
        options: Vec::new(),
    };
    let optionless = IntakeCatalog::new(vec![empty_choice], Vec::new(), Vec::new());
    assert!(matches!(optionless, Err(CatalogError::MissingOptions(_))));

    let ok: Result<IntakeCatalog, CatalogError> = IntakeCatalog::new(
        vec![QuestionBlock {
            id: BlockId::from("only"),
            title: "Only".to_string(),
            questions: Vec::new(),
        }],
        Vec::new(),
        Vec::new(),
    );
    assert!(ok.is_ok());
}

#[test]
fn catalog_round_trips_through_json_definitions() {
    let catalog = catalog();
    let blocks = serde_json::to_value(catalog.blocks()).expect("blocks serialize");
    let rules = serde_json::to_value(catalog.rules()).expect("rules serialize");

    assert_eq!(blocks[0]["questions"][1]["type"], "number");
    assert_eq!(rules[0]["target"]["kind"], "block");
    assert_eq!(rules[0]["combinator"], "ALL");

    let restored = IntakeCatalog::new(
        serde_json::from_value(blocks).expect("blocks deserialize"),
        serde_json::from_value(rules).expect("rules deserialize"),
        catalog.packet_requirements().to_vec(),
    )
    .expect("restored catalog is valid");
    assert_eq!(restored.blocks(), catalog.blocks());
}
