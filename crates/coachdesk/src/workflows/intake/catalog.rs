use std::collections::HashSet;

use super::domain::{
    owned_options, AnswerValue, BlockId, BranchingRule, Condition, ConditionOperator,
    IntakeResponses, PacketRequirement, PredicateGroup, Question, QuestionBlock, QuestionId,
    QuestionKind,
};
use super::logic::VisibilityEvaluator;
use super::validation::{collect_errors, IntakeValidation};
use crate::workflows::packets::PacketType;

/// Structural problems detected while assembling a catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("block id '{0}' is declared more than once")]
    DuplicateBlock(BlockId),
    #[error("question id '{0}' is declared more than once")]
    DuplicateQuestion(QuestionId),
    #[error("question '{0}' declares a choice type without options")]
    MissingOptions(QuestionId),
}

/// Published question blocks, their branching rules, and the packets a submission produces.
#[derive(Debug, Clone)]
pub struct IntakeCatalog {
    blocks: Vec<QuestionBlock>,
    rules: Vec<BranchingRule>,
    packet_requirements: Vec<PacketRequirement>,
}

/// Visible questions of one visible block.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleBlock<'c> {
    pub block: &'c QuestionBlock,
    pub questions: Vec<&'c Question>,
}

impl IntakeCatalog {
    pub fn new(
        blocks: Vec<QuestionBlock>,
        rules: Vec<BranchingRule>,
        packet_requirements: Vec<PacketRequirement>,
    ) -> Result<Self, CatalogError> {
        let mut block_ids = HashSet::new();
        let mut question_ids = HashSet::new();
        for block in &blocks {
            if !block_ids.insert(block.id.clone()) {
                return Err(CatalogError::DuplicateBlock(block.id.clone()));
            }
            for question in &block.questions {
                if !question_ids.insert(question.id.clone()) {
                    return Err(CatalogError::DuplicateQuestion(question.id.clone()));
                }
                if question
                    .kind
                    .options()
                    .is_some_and(|options| options.is_empty())
                {
                    return Err(CatalogError::MissingOptions(question.id.clone()));
                }
            }
        }

        Ok(Self {
            blocks,
            rules,
            packet_requirements,
        })
    }

    /// Coaching intake used by the service out of the box.
    pub fn standard() -> Self {
        Self {
            blocks: standard_blocks(),
            rules: standard_rules(),
            packet_requirements: standard_packet_requirements(),
        }
    }

    pub fn blocks(&self) -> &[QuestionBlock] {
        &self.blocks
    }

    pub fn rules(&self) -> &[BranchingRule] {
        &self.rules
    }

    pub fn packet_requirements(&self) -> &[PacketRequirement] {
        &self.packet_requirements
    }

    pub fn block(&self, id: &BlockId) -> Option<&QuestionBlock> {
        self.blocks.iter().find(|block| &block.id == id)
    }

    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.blocks
            .iter()
            .flat_map(|block| block.questions.iter())
            .find(|question| &question.id == id)
    }

    pub fn block_of(&self, question: &QuestionId) -> Option<&QuestionBlock> {
        self.blocks
            .iter()
            .find(|block| block.questions.iter().any(|q| &q.id == question))
    }

    pub fn evaluator(&self) -> VisibilityEvaluator<'_> {
        VisibilityEvaluator::new(&self.rules)
    }

    pub fn visible_block_ids(&self, responses: &IntakeResponses) -> Vec<BlockId> {
        self.evaluator().visible_blocks(&self.blocks, responses)
    }

    /// Visible blocks with their visible questions, in catalog order.
    pub fn visible(&self, responses: &IntakeResponses) -> Vec<VisibleBlock<'_>> {
        let evaluator = self.evaluator();
        self.blocks
            .iter()
            .filter(|block| evaluator.block_visible(&block.id, responses))
            .map(|block| VisibleBlock {
                block,
                questions: evaluator.visible_questions(&block.questions, responses),
            })
            .collect()
    }

    /// A question counts as visible only when its block is visible too.
    pub fn is_question_visible(&self, question: &QuestionId, responses: &IntakeResponses) -> bool {
        let evaluator = self.evaluator();
        self.block_of(question).is_some_and(|block| {
            evaluator.block_visible(&block.id, responses)
                && evaluator.question_visible(question, responses)
        })
    }

    /// Per-step validation of one block's visible questions. A hidden block has nothing to check.
    pub fn validate_block(
        &self,
        block_id: &BlockId,
        responses: &IntakeResponses,
    ) -> Option<IntakeValidation> {
        let block = self.block(block_id)?;
        let evaluator = self.evaluator();
        if !evaluator.block_visible(block_id, responses) {
            return Some(IntakeValidation::from_errors(Vec::new()));
        }
        let questions = evaluator.visible_questions(&block.questions, responses);
        let errors = collect_errors(questions.into_iter(), responses, Some(block_id));
        Some(IntakeValidation::from_errors(errors))
    }

    /// Exhaustive validation across every visible block. Hidden questions are never checked.
    pub fn validate(&self, responses: &IntakeResponses) -> IntakeValidation {
        let errors = self
            .visible(responses)
            .into_iter()
            .flat_map(|visible| {
                collect_errors(
                    visible.questions.into_iter(),
                    responses,
                    Some(&visible.block.id),
                )
            })
            .collect();
        IntakeValidation::from_errors(errors)
    }

    /// Packet types a submission with these answers must produce, in declaration order.
    pub fn required_packets(&self, responses: &IntakeResponses) -> Vec<PacketType> {
        let mut packets = Vec::new();
        for requirement in &self.packet_requirements {
            let applies = requirement
                .when
                .as_ref()
                .map_or(true, |predicate| predicate.evaluate(responses));
            if applies && !packets.contains(&requirement.packet_type) {
                packets.push(requirement.packet_type);
            }
        }
        packets
    }
}

fn standard_blocks() -> Vec<QuestionBlock> {
    vec![
        QuestionBlock {
            id: BlockId::from("about_you"),
            title: "About you".to_string(),
            questions: vec![
                Question::new(
                    "preferred_name",
                    "What should your coach call you?",
                    QuestionKind::ShortText {
                        max_length: Some(60),
                    },
                ),
                Question::new(
                    "age",
                    "How old are you?",
                    QuestionKind::Number {
                        min: Some(13.0),
                        max: Some(100.0),
                        step: Some(1.0),
                        unit: Some("years".to_string()),
                    },
                )
                .required(),
                Question::new(
                    "sex",
                    "Sex used for metabolic calculations",
                    QuestionKind::SingleChoice {
                        options: owned_options(&["female", "male"]),
                    },
                )
                .required(),
            ],
        },
        QuestionBlock {
            id: BlockId::from("pregnancy"),
            title: "Pregnancy and postpartum".to_string(),
            questions: vec![
                Question::new(
                    "pregnancy_status",
                    "Are you currently pregnant or postpartum?",
                    QuestionKind::SingleChoice {
                        options: owned_options(&["no", "pregnant", "postpartum"]),
                    },
                )
                .required(),
                Question::new(
                    "pregnancy_trimester",
                    "Which trimester are you in?",
                    QuestionKind::SingleSelect {
                        options: owned_options(&["first", "second", "third"]),
                    },
                )
                .required(),
            ],
        },
        QuestionBlock {
            id: BlockId::from("body_metrics"),
            title: "Body metrics".to_string(),
            questions: vec![
                Question::new(
                    "height_cm",
                    "Height",
                    QuestionKind::Number {
                        min: Some(120.0),
                        max: Some(230.0),
                        step: None,
                        unit: Some("cm".to_string()),
                    },
                )
                .required(),
                Question::new(
                    "weight_kg",
                    "Current weight",
                    QuestionKind::Number {
                        min: Some(35.0),
                        max: Some(300.0),
                        step: None,
                        unit: Some("kg".to_string()),
                    },
                )
                .required(),
            ],
        },
        QuestionBlock {
            id: BlockId::from("goals"),
            title: "Goals".to_string(),
            questions: vec![
                Question::new(
                    "primary_goal",
                    "What is your primary goal?",
                    QuestionKind::SingleSelect {
                        options: owned_options(&[
                            "lose_fat",
                            "build_muscle",
                            "maintain",
                            "performance",
                        ]),
                    },
                )
                .required(),
                Question::new(
                    "target_weight_kg",
                    "Target weight",
                    QuestionKind::Number {
                        min: Some(35.0),
                        max: Some(300.0),
                        step: None,
                        unit: Some("kg".to_string()),
                    },
                )
                .required(),
                Question::new(
                    "goal_date",
                    "When would you like to reach it?",
                    QuestionKind::Date {
                        earliest: None,
                        latest: None,
                    },
                ),
            ],
        },
        QuestionBlock {
            id: BlockId::from("training"),
            title: "Training background".to_string(),
            questions: vec![
                Question::new(
                    "activity_level",
                    "How active is a typical week?",
                    QuestionKind::SingleChoice {
                        options: owned_options(&[
                            "sedentary",
                            "light",
                            "moderate",
                            "active",
                            "very_active",
                        ]),
                    },
                )
                .required(),
                Question::new(
                    "training_days",
                    "Days per week available for training",
                    QuestionKind::Range {
                        min: 0.0,
                        max: 7.0,
                        step: Some(1.0),
                        unit: Some("days".to_string()),
                    },
                )
                .required(),
                Question::new(
                    "equipment",
                    "Which equipment can you use?",
                    QuestionKind::MultiSelect {
                        options: owned_options(&[
                            "none",
                            "dumbbells",
                            "barbell",
                            "machines",
                            "bands",
                            "kettlebells",
                        ]),
                    },
                ),
                Question::new(
                    "injuries",
                    "Any injuries or limitations?",
                    QuestionKind::SingleChoice {
                        options: owned_options(&["yes", "no"]),
                    },
                )
                .required(),
                Question::new(
                    "injury_details",
                    "Describe your injuries or limitations",
                    QuestionKind::LongText {
                        max_length: Some(2000),
                    },
                )
                .required(),
            ],
        },
        QuestionBlock {
            id: BlockId::from("nutrition"),
            title: "Nutrition habits".to_string(),
            questions: vec![
                Question::new(
                    "dietary_preferences",
                    "Dietary preferences",
                    QuestionKind::MultiChoice {
                        options: owned_options(&[
                            "omnivore",
                            "vegetarian",
                            "vegan",
                            "pescatarian",
                            "keto",
                            "halal",
                            "kosher",
                        ]),
                    },
                ),
                Question::new(
                    "allergies",
                    "Food allergies or intolerances",
                    QuestionKind::LongText {
                        max_length: Some(1000),
                    },
                ),
                Question::new(
                    "cooking_frequency",
                    "How often do you cook?",
                    QuestionKind::SingleSelect {
                        options: owned_options(&["never", "sometimes", "often", "daily"]),
                    },
                )
                .required(),
                Question::new(
                    "meal_prep_minutes",
                    "Minutes per day you can spend on meal prep",
                    QuestionKind::Number {
                        min: Some(0.0),
                        max: Some(240.0),
                        step: Some(5.0),
                        unit: Some("minutes".to_string()),
                    },
                )
                .required(),
            ],
        },
        QuestionBlock {
            id: BlockId::from("lifestyle"),
            title: "Lifestyle".to_string(),
            questions: vec![
                Question::new(
                    "sleep_hours",
                    "Average hours of sleep per night",
                    QuestionKind::Number {
                        min: Some(0.0),
                        max: Some(24.0),
                        step: Some(0.5),
                        unit: Some("hours".to_string()),
                    },
                )
                .required(),
                Question::new(
                    "stress_level",
                    "Stress level over the last month",
                    QuestionKind::Range {
                        min: 1.0,
                        max: 10.0,
                        step: Some(1.0),
                        unit: None,
                    },
                )
                .required(),
                Question::new(
                    "coach_notes",
                    "Anything else your coach should know?",
                    QuestionKind::LongText {
                        max_length: Some(2000),
                    },
                ),
            ],
        },
    ]
}

fn standard_rules() -> Vec<BranchingRule> {
    vec![
        BranchingRule::block(
            "pregnancy",
            PredicateGroup::all(vec![Condition::equals("sex", AnswerValue::text("female"))]),
        ),
        BranchingRule::question(
            "pregnancy_trimester",
            PredicateGroup::all(vec![Condition::equals(
                "pregnancy_status",
                AnswerValue::text("pregnant"),
            )]),
        ),
        BranchingRule::question(
            "target_weight_kg",
            PredicateGroup::any(vec![
                Condition::equals("primary_goal", AnswerValue::text("lose_fat")),
                Condition::equals("primary_goal", AnswerValue::text("build_muscle")),
            ]),
        ),
        BranchingRule::question(
            "injury_details",
            PredicateGroup::all(vec![Condition::equals("injuries", AnswerValue::text("yes"))]),
        ),
        BranchingRule::question(
            "meal_prep_minutes",
            PredicateGroup::all(vec![Condition::new(
                "cooking_frequency",
                ConditionOperator::NotEquals,
                Some(AnswerValue::text("never")),
            )]),
        ),
    ]
}

fn standard_packet_requirements() -> Vec<PacketRequirement> {
    vec![
        PacketRequirement {
            packet_type: PacketType::Nutrition,
            when: None,
        },
        PacketRequirement {
            packet_type: PacketType::Training,
            when: None,
        },
        PacketRequirement {
            packet_type: PacketType::Lifestyle,
            when: Some(PredicateGroup::any(vec![
                Condition::new(
                    "stress_level",
                    ConditionOperator::GreaterThan,
                    Some(AnswerValue::Number(6.0)),
                ),
                Condition::new(
                    "sleep_hours",
                    ConditionOperator::LessThan,
                    Some(AnswerValue::Number(6.0)),
                ),
            ])),
        },
    ]
}
