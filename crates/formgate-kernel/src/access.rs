//! Access resolution: who may do what on a form.
//!
//! Resolution order:
//! 1. the owner holds every capability, regardless of flags or shares;
//! 2. `permit_all_users` grants `submit` to any authenticated actor, but only
//!    while the installation policy allows it;
//! 3. user/group/circle shares matching the actor are unioned in.
//!
//! Link shares are not actor-scoped and are resolved separately through
//! [`resolve_link`].

use crate::capability::{Capability, CapabilitySet};
use crate::error::AccessFlagsError;
use crate::form::Form;
use crate::share::{Share, ShareKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Form-level visibility flags, stored as named booleans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessFlags {
    #[serde(default)]
    pub permit_all_users: bool,
    #[serde(default)]
    pub show_to_all_users: bool,
    #[serde(default)]
    pub legacy_link_enabled: bool,
}

const LEGACY_LINK_OFFSET: i64 = 3;

impl AccessFlags {
    /// Decode the historical integer encoding.
    ///
    /// `0` none, `1` permit all, `2` permit all + show to all; `+3` when the
    /// legacy link is enabled. Values from 6 upward only arise from the old
    /// double-counted legacy bit and are refused.
    pub fn from_wire(value: i64) -> Result<Self, AccessFlagsError> {
        if !(0..2 * LEGACY_LINK_OFFSET).contains(&value) {
            return Err(AccessFlagsError(value));
        }
        let legacy_link_enabled = value >= LEGACY_LINK_OFFSET;
        let base = value % LEGACY_LINK_OFFSET;
        Ok(Self {
            permit_all_users: base >= 1,
            show_to_all_users: base == 2,
            legacy_link_enabled,
        })
    }

    /// Encode to the historical integer.
    ///
    /// `show_to_all_users` without `permit_all_users` has no integer form and
    /// encodes as plain permit-all-off.
    pub fn to_wire(self) -> i64 {
        let base = match (self.permit_all_users, self.show_to_all_users) {
            (false, _) => 0,
            (true, false) => 1,
            (true, true) => 2,
        };
        if self.legacy_link_enabled {
            base + LEGACY_LINK_OFFSET
        } else {
            base
        }
    }
}

/// Installation-wide access policy, passed explicitly into resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicy {
    /// When false, `permit_all_users` on individual forms is ignored.
    pub allow_permit_all: bool,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            allow_permit_all: true,
        }
    }
}

/// The party asking for access.
///
/// Memberships are expected to be transitively expanded by the caller's
/// directory (a user in circle A, which is a member of circle B, lists both).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub groups: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub circles: BTreeSet<String>,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn with_circles<I, S>(mut self, circles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.circles.extend(circles.into_iter().map(Into::into));
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }

    /// Whether a non-link share targets this actor directly or through
    /// a group or circle.
    fn matches(&self, share: &Share) -> bool {
        match share.kind {
            ShareKind::User => self.user_id() == Some(share.target.as_str()),
            ShareKind::Group => self.is_authenticated() && self.groups.contains(&share.target),
            ShareKind::Circle => self.is_authenticated() && self.circles.contains(&share.target),
            ShareKind::Link => false,
        }
    }
}

/// Effective identity-scoped capabilities of `actor` on `form`.
///
/// Shares belonging to other forms are ignored.
pub fn resolve_access(
    actor: &Actor,
    form: &Form,
    shares: &[Share],
    policy: AccessPolicy,
) -> CapabilitySet {
    if form.is_owner(actor.user_id()) {
        return CapabilitySet::all();
    }

    let mut capabilities = CapabilitySet::empty();
    if policy.allow_permit_all && form.access.permit_all_users && actor.is_authenticated() {
        capabilities.insert(Capability::Submit);
    }

    for share in shares
        .iter()
        .filter(|share| share.form_id == form.id && actor.matches(share))
    {
        capabilities.union_with(&share.capabilities);
    }
    capabilities
}

/// Capabilities unlocked by holding a link token, if any.
///
/// Token comparison is exact. With the legacy link enabled, the form's own
/// hash also acts as a token granting `submit`.
pub fn resolve_link(form: &Form, shares: &[Share], token: &str) -> Option<CapabilitySet> {
    if token.is_empty() {
        return None;
    }

    let mut capabilities = CapabilitySet::empty();
    let mut unlocked = false;
    for share in shares
        .iter()
        .filter(|share| share.form_id == form.id && share.matches_token(token))
    {
        capabilities.union_with(&share.capabilities);
        unlocked = true;
    }
    if form.access.legacy_link_enabled && form.hash == token {
        capabilities.insert(Capability::Submit);
        unlocked = true;
    }

    unlocked.then_some(capabilities)
}

/// Whether the form shows up in the actor's navigation.
///
/// Presentation only; this never grants a capability.
pub fn is_listed_for(actor: &Actor, form: &Form, shares: &[Share], policy: AccessPolicy) -> bool {
    if form.is_owner(actor.user_id()) {
        return true;
    }
    if shares
        .iter()
        .any(|share| share.form_id == form.id && actor.matches(share))
    {
        return true;
    }
    policy.allow_permit_all
        && actor.is_authenticated()
        && form.access.permit_all_users
        && form.access.show_to_all_users
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> Form {
        Form::new(1, "formhash", "alice")
    }

    fn share(id: u64, kind: ShareKind, target: &str, caps: &[Capability]) -> Share {
        Share::new(id, 1, kind, target, caps.iter().copied()).expect("valid share")
    }

    #[test]
    fn owner_holds_everything_even_with_policy_off() {
        let mut form = form();
        form.access = AccessFlags::from_wire(0).expect("flags");
        let caps = resolve_access(
            &Actor::user("alice"),
            &form,
            &[],
            AccessPolicy {
                allow_permit_all: false,
            },
        );
        assert_eq!(caps, CapabilitySet::all());
    }

    #[test]
    fn permit_all_requires_policy_and_identity() {
        let mut form = form();
        form.access.permit_all_users = true;

        let enabled = AccessPolicy::default();
        let disabled = AccessPolicy {
            allow_permit_all: false,
        };

        assert!(resolve_access(&Actor::user("bob"), &form, &[], enabled).can_submit());
        assert!(resolve_access(&Actor::user("bob"), &form, &[], disabled).is_empty());
        assert!(resolve_access(&Actor::anonymous(), &form, &[], enabled).is_empty());
    }

    #[test]
    fn shares_union_across_direct_and_indirect_matches() {
        let form = form();
        let shares = vec![
            share(1, ShareKind::User, "bob", &[]),
            share(2, ShareKind::Group, "staff", &[Capability::ViewResults]),
            share(
                3,
                ShareKind::Circle,
                "board",
                &[Capability::ViewResults, Capability::DeleteResults],
            ),
            share(4, ShareKind::Group, "other", &[Capability::ViewResults]),
        ];

        let actor = Actor::user("bob")
            .with_groups(["staff"])
            .with_circles(["board"]);
        let caps = resolve_access(&actor, &form, &shares, AccessPolicy::default());
        assert_eq!(
            caps.wire_names(),
            vec!["submit", "results", "results_delete"]
        );

        let outsider = Actor::user("carol");
        assert!(resolve_access(&outsider, &form, &shares, AccessPolicy::default()).is_empty());
    }

    #[test]
    fn link_shares_never_fold_into_identity_result() {
        let form = form();
        let shares = vec![share(1, ShareKind::Link, "tok123", &[Capability::Embed])];
        let actor = Actor::user("tok123");
        assert!(resolve_access(&actor, &form, &shares, AccessPolicy::default()).is_empty());

        let caps = resolve_link(&form, &shares, "tok123").expect("token unlocks");
        assert_eq!(caps.wire_names(), vec!["submit", "embed"]);
        assert!(resolve_link(&form, &shares, "tok12").is_none());
        assert!(resolve_link(&form, &shares, "").is_none());
    }

    #[test]
    fn legacy_hash_unlocks_only_when_enabled() {
        let mut form = form();
        assert!(resolve_link(&form, &[], "formhash").is_none());

        form.access.legacy_link_enabled = true;
        let caps = resolve_link(&form, &[], "formhash").expect("legacy link");
        assert!(caps.can_submit());
        assert!(resolve_link(&form, &[], "formhas").is_none());
    }

    #[test]
    fn shares_for_other_forms_are_ignored() {
        let form = form();
        let foreign =
            Share::new(9, 2, ShareKind::User, "bob", [Capability::ViewResults]).expect("share");
        assert!(
            resolve_access(&Actor::user("bob"), &form, &[foreign], AccessPolicy::default())
                .is_empty()
        );
    }

    #[test]
    fn wire_flags_decode_with_legacy_offset() {
        let cases = [
            (0, (false, false, false)),
            (1, (true, false, false)),
            (2, (true, true, false)),
            (3, (false, false, true)),
            (4, (true, false, true)),
            (5, (true, true, true)),
        ];
        for (value, (permit, show, legacy)) in cases {
            let flags = AccessFlags::from_wire(value).expect("known value");
            assert_eq!(flags.permit_all_users, permit, "value {value}");
            assert_eq!(flags.show_to_all_users, show, "value {value}");
            assert_eq!(flags.legacy_link_enabled, legacy, "value {value}");
            assert_eq!(flags.to_wire(), value);
        }
    }

    #[test]
    fn double_counted_legacy_values_are_refused() {
        // 6..=8 can only come from the legacy bit added twice.
        for value in [6, 7, 8, -1] {
            assert_eq!(AccessFlags::from_wire(value), Err(AccessFlagsError(value)));
        }
    }

    #[test]
    fn listing_requires_show_to_all_for_strangers() {
        let mut form = form();
        form.access.permit_all_users = true;
        let policy = AccessPolicy::default();
        assert!(!is_listed_for(&Actor::user("bob"), &form, &[], policy));

        form.access.show_to_all_users = true;
        assert!(is_listed_for(&Actor::user("bob"), &form, &[], policy));
        assert!(!is_listed_for(
            &Actor::user("bob"),
            &form,
            &[],
            AccessPolicy {
                allow_permit_all: false
            }
        ));
        assert!(is_listed_for(&Actor::user("alice"), &form, &[], policy));
    }
}
