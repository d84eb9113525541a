//! Capabilities an actor can hold on a form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// One permission exchanged across the controller boundary.
///
/// Wire names are fixed: `submit`, `results`, `results_delete`, `embed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "submit")]
    Submit,
    #[serde(rename = "results")]
    ViewResults,
    #[serde(rename = "results_delete")]
    DeleteResults,
    #[serde(rename = "embed")]
    Embed,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Submit,
        Capability::ViewResults,
        Capability::DeleteResults,
        Capability::Embed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Submit => "submit",
            Capability::ViewResults => "results",
            Capability::DeleteResults => "results_delete",
            Capability::Embed => "embed",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "submit" => Ok(Capability::Submit),
            "results" => Ok(Capability::ViewResults),
            "results_delete" => Ok(Capability::DeleteResults),
            "embed" => Ok(Capability::Embed),
            other => Err(format!(
                "unknown capability `{other}` (expected submit, results, results_delete, embed)"
            )),
        }
    }
}

/// An ordered, duplicate-free set of capabilities.
///
/// Serializes as a sorted list of wire names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every capability; what a form owner holds.
    pub fn all() -> Self {
        Self(Capability::ALL.into_iter().collect())
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn union_with(&mut self, other: &CapabilitySet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn can_submit(&self) -> bool {
        self.contains(Capability::Submit)
    }

    pub fn wire_names(&self) -> Vec<&'static str> {
        self.iter().map(Capability::as_str).collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_from_str() {
        for capability in Capability::ALL {
            let parsed: Capability = capability.as_str().parse().expect("wire name parses");
            assert_eq!(parsed, capability);
        }
        assert!("edit".parse::<Capability>().is_err());
    }

    #[test]
    fn set_serializes_as_sorted_wire_names() {
        let set: CapabilitySet = [Capability::Embed, Capability::Submit].into_iter().collect();
        insta::assert_json_snapshot!(set, @r#"
        [
          "submit",
          "embed"
        ]
        "#);
    }

    #[test]
    fn union_accumulates_without_duplicates() {
        let mut left: CapabilitySet = [Capability::Submit].into_iter().collect();
        let right: CapabilitySet = [Capability::Submit, Capability::ViewResults]
            .into_iter()
            .collect();
        left.union_with(&right);
        assert_eq!(left.len(), 2);
        assert!(left.contains(Capability::ViewResults));
    }
}
