//! Group membership to VLAN mapping

use serde::Deserialize;

/// One `(group, vlan)` row of an assignment table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct VlanAssignment {
    pub group: u64,
    pub vlan: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VlanMapping {
    #[serde(default)]
    pub default_vlan: Option<u32>,
    /// Checked in declared order
    #[serde(default)]
    pub assignments: Vec<VlanAssignment>,
    /// Only consulted when the user requested a VLAN; checked first
    #[serde(default)]
    pub assignments_if_requested: Vec<VlanAssignment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlanDecision {
    Assigned(u32),
    /// No VLAN requested and nothing configured for the user
    Unassigned,
    /// The requested VLAN is not available to the user
    Denied,
}

impl VlanMapping {
    /// Every group referenced by either assignment table
    pub fn referenced_groups(&self) -> impl Iterator<Item = u64> + '_ {
        self.assignments
            .iter()
            .chain(self.assignments_if_requested.iter())
            .map(|a| a.group)
    }

    pub fn decide(&self, groups: &[u64], requested: Option<u32>) -> VlanDecision {
        match requested {
            Some(vlan) => {
                let held = |a: &VlanAssignment| a.vlan == vlan && groups.contains(&a.group);
                if self.assignments_if_requested.iter().any(held)
                    || self.assignments.iter().any(held)
                    || self.default_vlan == Some(vlan)
                {
                    VlanDecision::Assigned(vlan)
                } else {
                    VlanDecision::Denied
                }
            }
            None => self
                .assignments
                .iter()
                .find(|a| groups.contains(&a.group))
                .map(|a| a.vlan)
                .or(self.default_vlan)
                .map_or(VlanDecision::Unassigned, VlanDecision::Assigned),
        }
    }
}
