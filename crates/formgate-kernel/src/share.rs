//! Share registry records: explicit capability grants on one form.

use crate::capability::{Capability, CapabilitySet};
use crate::error::ShareError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareKind {
    User,
    Group,
    Circle,
    Link,
}

impl ShareKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ShareKind::User => "user",
            ShareKind::Group => "group",
            ShareKind::Circle => "circle",
            ShareKind::Link => "link",
        }
    }
}

impl std::str::FromStr for ShareKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user" => Ok(ShareKind::User),
            "group" => Ok(ShareKind::Group),
            "circle" => Ok(ShareKind::Circle),
            "link" => Ok(ShareKind::Link),
            other => Err(format!(
                "unknown share kind `{other}` (expected user, group, circle, link)"
            )),
        }
    }
}

/// A grant of capabilities to a user, group, circle or link token.
///
/// Construct through [`Share::new`], which enforces:
/// - `submit` is always present;
/// - `results_delete` requires `results`;
/// - `embed` only on link shares, and only alongside `submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub id: u64,
    pub form_id: u64,
    pub kind: ShareKind,
    /// User id, group id, circle id, or link token.
    pub target: String,
    pub capabilities: CapabilitySet,
}

impl Share {
    pub fn new(
        id: u64,
        form_id: u64,
        kind: ShareKind,
        target: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Result<Self, ShareError> {
        let target = target.into().trim().to_string();
        if target.is_empty() {
            return Err(ShareError::EmptyTarget);
        }
        let mut capabilities: CapabilitySet = capabilities.into_iter().collect();
        capabilities.insert(Capability::Submit);
        check_capabilities(kind, &capabilities)?;
        Ok(Self {
            id,
            form_id,
            kind,
            target,
            capabilities,
        })
    }

    /// Re-check the invariants on a share loaded from storage.
    pub fn validate(&self) -> Result<(), ShareError> {
        if self.target.trim().is_empty() {
            return Err(ShareError::EmptyTarget);
        }
        check_capabilities(self.kind, &self.capabilities)
    }

    /// Whether `token` unlocks this share. Exact match only.
    pub fn matches_token(&self, token: &str) -> bool {
        self.kind == ShareKind::Link && self.target == token
    }
}

fn check_capabilities(kind: ShareKind, capabilities: &CapabilitySet) -> Result<(), ShareError> {
    if capabilities.contains(Capability::DeleteResults)
        && !capabilities.contains(Capability::ViewResults)
    {
        return Err(ShareError::DeleteWithoutView);
    }
    if capabilities.contains(Capability::Embed) {
        if kind != ShareKind::Link {
            return Err(ShareError::EmbedOnNonLink);
        }
        if let Some(extra) = capabilities
            .iter()
            .find(|c| !matches!(c, Capability::Submit | Capability::Embed))
        {
            return Err(ShareError::EmbedCombined(extra));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_extra() -> Vec<Capability> {
        Vec::new()
    }

    #[test]
    fn submit_is_implied() {
        let share = Share::new(1, 1, ShareKind::User, "bob", no_extra()).expect("valid share");
        assert!(share.capabilities.can_submit());
        assert_eq!(share.capabilities.len(), 1);
    }

    #[test]
    fn delete_requires_view() {
        let err = Share::new(1, 1, ShareKind::Group, "staff", [Capability::DeleteResults])
            .expect_err("delete without view");
        assert_eq!(err, ShareError::DeleteWithoutView);

        let share = Share::new(
            1,
            1,
            ShareKind::Group,
            "staff",
            [Capability::DeleteResults, Capability::ViewResults],
        )
        .expect("delete with view");
        assert_eq!(share.capabilities.len(), 3);
    }

    #[test]
    fn embed_only_on_plain_link_shares() {
        assert_eq!(
            Share::new(1, 1, ShareKind::User, "bob", [Capability::Embed]),
            Err(ShareError::EmbedOnNonLink)
        );
        assert_eq!(
            Share::new(
                1,
                1,
                ShareKind::Link,
                "tok",
                [Capability::Embed, Capability::ViewResults]
            ),
            Err(ShareError::EmbedCombined(Capability::ViewResults))
        );
        Share::new(1, 1, ShareKind::Link, "tok", [Capability::Embed]).expect("link embed");
    }

    #[test]
    fn token_match_is_exact() {
        let share =
            Share::new(1, 1, ShareKind::Link, "AbCdEf123", no_extra()).expect("link share");
        assert!(share.matches_token("AbCdEf123"));
        assert!(!share.matches_token("AbCdEf"));
        assert!(!share.matches_token("abcdef123"));
        assert!(!share.matches_token("AbCdEf1234"));

        let user =
            Share::new(2, 1, ShareKind::User, "AbCdEf123", no_extra()).expect("user share");
        assert!(!user.matches_token("AbCdEf123"));
    }

    #[test]
    fn empty_target_rejected() {
        assert_eq!(
            Share::new(1, 1, ShareKind::User, "  ", no_extra()),
            Err(ShareError::EmptyTarget)
        );
    }
}
