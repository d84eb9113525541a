//! Membership directory: expands a user into the groups and circles they
//! belong to, directly or through nested containers.

use crate::memory::MemoryStore;
use crate::record::{Member, MembershipKind};
use formgate_kernel::Actor;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Reverse membership index: member to the containers that list it.
#[derive(Debug, Clone, Default)]
pub struct MembershipDirectory {
    parents: BTreeMap<Member, BTreeSet<(MembershipKind, String)>>,
}

impl MembershipDirectory {
    pub fn from_store(store: &MemoryStore) -> Self {
        let mut parents: BTreeMap<Member, BTreeSet<(MembershipKind, String)>> = BTreeMap::new();
        for record in store.memberships() {
            for member in &record.members {
                parents
                    .entry(member.clone())
                    .or_default()
                    .insert((record.kind, record.id.clone()));
            }
        }
        Self { parents }
    }

    /// Every container `user_id` is transitively a member of.
    ///
    /// Cycles between containers are tolerated; each container is visited once.
    pub fn containers_of(&self, user_id: &str) -> BTreeSet<(MembershipKind, String)> {
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([Member::User(user_id.to_string())]);
        while let Some(member) = queue.pop_front() {
            let Some(parents) = self.parents.get(&member) else {
                continue;
            };
            for (kind, id) in parents {
                if found.insert((*kind, id.clone())) {
                    queue.push_back(Member::container(*kind, id.clone()));
                }
            }
        }
        found
    }

    /// Build the actor for an identity, with memberships expanded.
    /// `None` (or an empty id) is the anonymous actor.
    pub fn actor_for(&self, user_id: Option<&str>) -> Actor {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            return Actor::anonymous();
        };
        let mut groups = Vec::new();
        let mut circles = Vec::new();
        for (kind, id) in self.containers_of(user_id) {
            match kind {
                MembershipKind::Group => groups.push(id),
                MembershipKind::Circle => circles.push(id),
            }
        }
        Actor::user(user_id)
            .with_groups(groups)
            .with_circles(circles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> Member {
        Member::User(id.to_string())
    }

    #[test]
    fn nested_memberships_expand_transitively() {
        let mut store = MemoryStore::default();
        store.add_member(MembershipKind::Circle, "a", user("bob"));
        store.add_member(MembershipKind::Circle, "b", Member::Circle("a".to_string()));
        store.add_member(MembershipKind::Group, "staff", Member::Circle("b".to_string()));
        store.add_member(MembershipKind::Group, "other", user("carol"));

        let actor = MembershipDirectory::from_store(&store).actor_for(Some("bob"));
        assert_eq!(
            actor.circles.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(
            actor.groups.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["staff"]
        );
    }

    #[test]
    fn cycles_terminate() {
        let mut store = MemoryStore::default();
        store.add_member(MembershipKind::Group, "x", user("bob"));
        store.add_member(MembershipKind::Group, "x", Member::Group("y".to_string()));
        store.add_member(MembershipKind::Group, "y", Member::Group("x".to_string()));

        let containers = MembershipDirectory::from_store(&store).containers_of("bob");
        assert_eq!(containers.len(), 2);
    }

    #[test]
    fn anonymous_has_no_memberships() {
        let mut store = MemoryStore::default();
        store.add_member(MembershipKind::Group, "staff", user(""));
        let directory = MembershipDirectory::from_store(&store);
        assert_eq!(directory.actor_for(None), Actor::anonymous());
        assert_eq!(directory.actor_for(Some("")), Actor::anonymous());
    }
}
