//! Persisted records: one JSONL line each.

use chrono::{DateTime, Utc};
use formgate_kernel::{Form, Question, Share};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A form together with everything the engine reads about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormRecord {
    pub form: Form,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shares: Vec<Share>,
}

impl FormRecord {
    pub fn new(form: Form) -> Self {
        Self {
            form,
            questions: Vec::new(),
            shares: Vec::new(),
        }
    }
}

/// One stored answer value.
///
/// `File` holds the permanent reference produced by upload resolution;
/// staged tokens never reach storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoredValue {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Choice {
        option_id: u64,
        text: String,
    },
    Other {
        text: String,
    },
    File {
        reference: String,
        size: u64,
    },
}

impl StoredValue {
    /// Display text, as an export would show it.
    pub fn text(&self) -> &str {
        match self {
            StoredValue::Text { text }
            | StoredValue::Choice { text, .. }
            | StoredValue::Other { text } => text,
            StoredValue::File { reference, .. } => reference,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: u64,
    #[serde(flatten)]
    pub value: StoredValue,
}

/// A submission and its answers.
///
/// Answers are nested so that they are written, replaced and deleted only
/// together with their submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: u64,
    pub form_id: u64,
    /// User id, or a pseudonym on anonymous forms.
    pub submitter: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipKind {
    Group,
    /// Closed-membership team.
    Circle,
}

impl MembershipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MembershipKind::Group => "group",
            MembershipKind::Circle => "circle",
        }
    }
}

impl fmt::Display for MembershipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MembershipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "group" => Ok(MembershipKind::Group),
            "circle" => Ok(MembershipKind::Circle),
            other => Err(format!(
                "unknown membership kind `{other}` (expected group, circle)"
            )),
        }
    }
}

/// Something that can belong to a group or circle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Member {
    User(String),
    Group(String),
    Circle(String),
}

impl Member {
    /// The member viewed as a container, when it is one.
    pub fn as_container(&self) -> Option<(MembershipKind, &str)> {
        match self {
            Member::User(_) => None,
            Member::Group(id) => Some((MembershipKind::Group, id)),
            Member::Circle(id) => Some((MembershipKind::Circle, id)),
        }
    }

    pub fn container(kind: MembershipKind, id: impl Into<String>) -> Self {
        match kind {
            MembershipKind::Group => Member::Group(id.into()),
            MembershipKind::Circle => Member::Circle(id.into()),
        }
    }
}

/// A group or circle and its direct members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRecord {
    pub kind: MembershipKind,
    pub id: String,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// A tagged JSONL line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    Form(FormRecord),
    Submission(Submission),
    Membership(MembershipRecord),
}
