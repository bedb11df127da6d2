use std::sync::Arc;

use serde::Serialize;

use super::catalog::IntakeCatalog;
use super::domain::{
    AnswerValue, BlockId, HiddenAnswerPolicy, IntakeResponses, Question, QuestionId,
};
use super::validation::IntakeValidation;
use crate::workflows::packets::PacketType;

/// Errors raised while a respondent works through the intake.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntakeError {
    #[error("unknown question '{0}'")]
    UnknownQuestion(QuestionId),
    #[error("unknown block '{0}'")]
    UnknownBlock(BlockId),
    #[error("intake already submitted")]
    AlreadySubmitted,
    #[error("intake has {} invalid answer(s)", .0.errors.len())]
    Invalid(IntakeValidation),
}

/// Progress through the visible blocks of an intake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntakeProgress {
    pub visible_blocks: usize,
    pub completed_blocks: usize,
    pub percent_complete: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_block: Option<BlockId>,
}

/// Frozen answers plus the packets they must produce.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmittedIntake {
    pub responses: IntakeResponses,
    pub packets: Vec<PacketType>,
    pub hidden_answers: Vec<QuestionId>,
}

/// One respondent's in-progress intake.
#[derive(Debug, Clone)]
pub struct IntakeSession {
    catalog: Arc<IntakeCatalog>,
    responses: IntakeResponses,
    submitted: bool,
}

impl IntakeSession {
    pub fn new(catalog: Arc<IntakeCatalog>) -> Self {
        Self::resume(catalog, IntakeResponses::new())
    }

    /// Continue a session from previously saved answers.
    pub fn resume(catalog: Arc<IntakeCatalog>, responses: IntakeResponses) -> Self {
        Self {
            catalog,
            responses,
            submitted: false,
        }
    }

    pub fn catalog(&self) -> &IntakeCatalog {
        &self.catalog
    }

    pub fn responses(&self) -> &IntakeResponses {
        &self.responses
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Store an answer. Answers to currently hidden questions are accepted and kept.
    pub fn record(
        &mut self,
        question: impl Into<QuestionId>,
        value: AnswerValue,
    ) -> Result<(), IntakeError> {
        let question = question.into();
        self.ensure_open()?;
        if self.catalog.question(&question).is_none() {
            return Err(IntakeError::UnknownQuestion(question));
        }
        self.responses.insert(question, value.normalized());
        Ok(())
    }

    pub fn clear(&mut self, question: impl Into<QuestionId>) -> Result<(), IntakeError> {
        let question = question.into();
        self.ensure_open()?;
        if self.catalog.question(&question).is_none() {
            return Err(IntakeError::UnknownQuestion(question));
        }
        self.responses.remove(&question);
        Ok(())
    }

    pub fn visible_blocks(&self) -> Vec<BlockId> {
        self.catalog.visible_block_ids(&self.responses)
    }

    pub fn visible_questions(&self, block: &BlockId) -> Result<Vec<&Question>, IntakeError> {
        let found = self
            .catalog
            .block(block)
            .ok_or_else(|| IntakeError::UnknownBlock(block.clone()))?;
        let evaluator = self.catalog.evaluator();
        if !evaluator.block_visible(block, &self.responses) {
            return Ok(Vec::new());
        }
        Ok(evaluator.visible_questions(&found.questions, &self.responses))
    }

    pub fn validate_block(&self, block: &BlockId) -> Result<IntakeValidation, IntakeError> {
        self.catalog
            .validate_block(block, &self.responses)
            .ok_or_else(|| IntakeError::UnknownBlock(block.clone()))
    }

    pub fn validate(&self) -> IntakeValidation {
        self.catalog.validate(&self.responses)
    }

    pub fn progress(&self) -> IntakeProgress {
        let visible = self.visible_blocks();
        let mut completed = 0;
        let mut current_block = None;
        for block in &visible {
            let valid = self
                .catalog
                .validate_block(block, &self.responses)
                .is_some_and(|report| report.valid);
            if valid {
                completed += 1;
            } else if current_block.is_none() {
                current_block = Some(block.clone());
            }
        }

        let percent_complete = if visible.is_empty() {
            100
        } else {
            ((completed * 100) / visible.len()) as u8
        };

        IntakeProgress {
            visible_blocks: visible.len(),
            completed_blocks: completed,
            percent_complete,
            current_block,
        }
    }

    /// Validate everything that is visible and freeze the session on success.
    pub fn submit(&mut self, policy: HiddenAnswerPolicy) -> Result<SubmittedIntake, IntakeError> {
        self.ensure_open()?;
        let report = self.validate();
        if !report.valid {
            return Err(IntakeError::Invalid(report));
        }

        let hidden_answers: Vec<QuestionId> = self
            .responses
            .keys()
            .filter(|question| !self.catalog.is_question_visible(question, &self.responses))
            .cloned()
            .collect();

        let mut responses = self.responses.clone();
        if policy == HiddenAnswerPolicy::Purge {
            responses.retain(|question| !hidden_answers.contains(question));
        }

        // Packet predicates see the same answers the packets are rendered from.
        let packets = self.catalog.required_packets(&responses);
        self.submitted = true;

        Ok(SubmittedIntake {
            responses,
            packets,
            hidden_answers,
        })
    }

    fn ensure_open(&self) -> Result<(), IntakeError> {
        if self.submitted {
            Err(IntakeError::AlreadySubmitted)
        } else {
            Ok(())
        }
    }
}

