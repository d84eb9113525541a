//! Form: the unit of sharing and submission.

use crate::access::AccessFlags;
use crate::error::LifecycleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored lifecycle classification, independent of expiry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    #[default]
    Active,
    Closed,
    Archived,
}

impl FormState {
    pub fn as_str(self) -> &'static str {
        match self {
            FormState::Active => "active",
            FormState::Closed => "closed",
            FormState::Archived => "archived",
        }
    }
}

impl std::str::FromStr for FormState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(FormState::Active),
            "closed" => Ok(FormState::Closed),
            "archived" => Ok(FormState::Archived),
            other => Err(format!(
                "unknown form state `{other}` (expected active, closed, archived)"
            )),
        }
    }
}

/// Pessimistic edit lease on a form's questions and options.
///
/// Expiry is evaluated on read; an expired lease is simply free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditLease {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EditLease {
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Whether this lease prevents `user` from editing at `now`.
    pub fn blocks(&self, user: &str, now: DateTime<Utc>) -> bool {
        self.is_held_at(now) && self.holder != user
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: u64,
    /// Public identifier; doubles as the legacy link token.
    pub hash: String,
    #[serde(default)]
    pub title: String,
    pub owner: String,
    #[serde(default)]
    pub state: FormState,
    /// `None` means the form never expires (`0` on the wire).
    #[serde(default, with = "expiry_seconds")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submit_multiple: bool,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub allow_edit_submissions: bool,
    #[serde(default)]
    pub access: AccessFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<EditLease>,
}

impl Form {
    pub fn new(id: u64, hash: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id,
            hash: hash.into(),
            title: String::new(),
            owner: owner.into(),
            state: FormState::Active,
            expires_at: None,
            submit_multiple: false,
            is_anonymous: false,
            allow_edit_submissions: false,
            access: AccessFlags::default(),
            lease: None,
        }
    }

    pub fn is_owner(&self, user: Option<&str>) -> bool {
        user.is_some_and(|user| user == self.owner)
    }

    /// Expiry is derived from time, never stored as a transition.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Apply an owner-triggered state change.
    ///
    /// Allowed: `Active ⇄ Closed`, `Active/Closed → Archived`.
    /// Archived is terminal. Re-entering the current state is a no-op.
    pub fn transition(&mut self, to: FormState) -> Result<(), LifecycleError> {
        let from = self.state;
        let allowed = matches!(
            (from, to),
            (FormState::Active, FormState::Closed)
                | (FormState::Closed, FormState::Active)
                | (FormState::Active, FormState::Archived)
                | (FormState::Closed, FormState::Archived)
        );
        if from == to && from != FormState::Archived {
            return Ok(());
        }
        if !allowed {
            return Err(LifecycleError { from, to });
        }
        self.state = to;
        Ok(())
    }

    /// Current lease holder, ignoring expired leases.
    pub fn lease_holder_at(&self, now: DateTime<Utc>) -> Option<&str> {
        self.lease
            .as_ref()
            .filter(|lease| lease.is_held_at(now))
            .map(|lease| lease.holder.as_str())
    }
}

/// Unix-seconds encoding where `0` means "never".
mod expiry_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.map(|at| at.timestamp()).unwrap_or(0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        if seconds <= 0 {
            return Ok(None);
        }
        DateTime::<Utc>::from_timestamp(seconds, 0)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("expiresAt out of range: {seconds}")))
    }
}
