//! Conditional intake: which questions a respondent sees, and whether their answers hold up.
//!
//! Visibility and validation are pure functions of the catalog and the current responses.
//! [`IntakeSession`] is the only stateful piece; it freezes on submission.

pub mod catalog;
pub mod domain;
pub mod logic;
pub mod session;
pub mod validation;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogError, IntakeCatalog, VisibleBlock};
pub use domain::{
    AnswerValue, BlockId, BranchingRule, Combinator, Condition, ConditionOperator,
    HiddenAnswerPolicy, IntakeResponses, PacketRequirement, Predicate, PredicateGroup, Question,
    QuestionBlock, QuestionId, QuestionKind, RuleTarget,
};
pub use logic::{visible_blocks, visible_questions, VisibilityEvaluator};
pub use session::{IntakeError, IntakeProgress, IntakeSession, SubmittedIntake};
pub use validation::{
    validate, validate_all, FieldError, IntakeValidation, QuestionValidation, ValidationError,
};
