//! Error types for formgate kernel decisions.

use crate::capability::Capability;
use crate::form::FormState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a form is not taking answers right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// State is `Closed` or `Archived`.
    NotAcceptingAnswers,
    /// State is `Active` but `expires_at` has passed.
    Expired,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::NotAcceptingAnswers => f.write_str("not accepting answers"),
            UnavailableReason::Expired => f.write_str("expired"),
        }
    }
}

/// Which answer rule rejected a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerRule {
    Required,
    Cardinality,
    Membership,
    Format,
    Range,
    RangeOrder,
}

impl AnswerRule {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerRule::Required => "required",
            AnswerRule::Cardinality => "cardinality",
            AnswerRule::Membership => "membership",
            AnswerRule::Format => "format",
            AnswerRule::Range => "range",
            AnswerRule::RangeOrder => "range_order",
        }
    }
}

impl fmt::Display for AnswerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller-correctable rejection naming exactly one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidAnswer {
    /// Deterministic identifier of this rejection (see [`crate::witness`]).
    pub witness_id: String,
    pub question_id: u64,
    /// 1-based display position of the question.
    pub order: u32,
    pub rule: AnswerRule,
    pub message: String,
}

impl fmt::Display for InvalidAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "question {} ({}): {}",
            self.order, self.rule, self.message
        )
    }
}

/// The submission taxonomy surfaced to controllers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// No `submit` capability. Rendered the same as "form not found".
    #[error("form not found")]
    AccessDenied,

    #[error("form unavailable: {0}")]
    FormUnavailable(UnavailableReason),

    #[error("already submitted")]
    AlreadySubmitted,

    #[error("invalid answer: {0}")]
    InvalidAnswer(InvalidAnswer),

    /// File resolution or write failure, after the internal retry.
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl SubmitError {
    /// Stable machine-readable code for JSON surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::AccessDenied => "access_denied",
            SubmitError::FormUnavailable(_) => "form_unavailable",
            SubmitError::AlreadySubmitted => "already_submitted",
            SubmitError::InvalidAnswer(_) => "invalid_answer",
            SubmitError::StorageFailure(_) => "storage_failure",
        }
    }
}

/// Question settings rejected at save time. The whole settings object
/// is refused; nothing is partially applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("unknown question type `{0}`")]
    UnknownType(String),

    #[error("extraSettings for `{question_type}` is malformed: {message}")]
    Shape {
        question_type: String,
        message: String,
    },

    #[error("extraSettings for `{question_type}` is inconsistent: {message}")]
    Inconsistent {
        question_type: String,
        message: String,
    },

    #[error("invalid validation pattern `{pattern}`: {message}")]
    Pattern { pattern: String, message: String },

    #[error("question type `{0}` does not take options")]
    OptionsNotAllowed(String),

    #[error("duplicate option id {0}")]
    DuplicateOption(u64),

    #[error("question order must be >= 1")]
    InvalidOrder,
}

/// Share-creation invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShareError {
    #[error("share target must not be empty")]
    EmptyTarget,

    #[error("`results_delete` requires `results`")]
    DeleteWithoutView,

    #[error("`embed` is only valid on link shares")]
    EmbedOnNonLink,

    #[error("`embed` cannot be combined with `{0}`")]
    EmbedCombined(Capability),
}

/// Illegal lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move form from {from:?} to {to:?}")]
pub struct LifecycleError {
    pub from: FormState,
    pub to: FormState,
}

/// An access-flag integer outside the known encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("access flag value {0} is outside the known encoding 0..=5")]
pub struct AccessFlagsError(pub i64);
