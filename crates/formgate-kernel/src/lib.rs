//! # formgate kernel
//!
//! Decides two things about a shared survey:
//!
//! 1. which capabilities (`submit`, `results`, `results_delete`, `embed`)
//!    an actor holds on a form, given its owner, visibility flags and shares;
//! 2. whether a raw answer payload is an admissible submission for the
//!    form's question definitions.
//!
//! ## Architecture
//!
//! ```text
//! Share registry        ← grants per form (user / group / circle / link)
//!     │
//! Access resolver       ← owner ∪ permit-all ∪ matching shares
//!     │
//! Lifecycle gate        ← state, expiry, one-submission-per-actor
//!     │
//! Answer validation     ← required → cardinality → membership → format → range
//!     │
//! Submission commit     ← lives in formgate-store (atomic write)
//! ```
//!
//! Nothing here reads the clock or touches storage; every time-dependent
//! decision takes `now` explicitly.

pub mod access;
pub mod capability;
pub mod error;
pub mod form;
pub mod lifecycle;
pub mod question;
pub mod share;
pub mod validate;
pub mod witness;

pub use access::{AccessFlags, AccessPolicy, Actor, is_listed_for, resolve_access, resolve_link};
pub use capability::{Capability, CapabilitySet};
pub use error::{
    AccessFlagsError, AnswerRule, InvalidAnswer, LifecycleError, SettingsError, ShareError,
    SubmitError, UnavailableReason,
};
pub use form::{EditLease, Form, FormState};
pub use lifecycle::{Admission, can_accept};
pub use question::{
    ChoiceOption, OTHER_ANSWER_PREFIX, Question, QuestionDraft, QuestionSettings, QuestionType,
    TextValidation, renumber,
};
pub use share::{Share, ShareKind};
pub use validate::{AnswerValue, RawAnswers, ValidatedAnswer, validate_answers};
