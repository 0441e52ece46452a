//! Connection admission policy.
//!
//! [`can_add_connection`] is the only gate in front of the graph store: the
//! store appends whatever it is given, so every wire that originates from a
//! user gesture must pass through here first.

use crate::behavior::behavior_for_id;
use crate::id::NodeId;
use crate::label::ResolveContext;
use crate::model::{ConnectionPath, Labels};
use std::collections::{HashMap, HashSet};

/// Per-label outbound capacity of resource nodes.
pub trait CapacityTable {
    fn capacity_for_label(&self, label: &str) -> usize;
}

/// Default capacity table: every lettered node may emit one wire, a blank
/// (structural) node none. Individual labels can be overridden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterCapacity {
    /// Capacity of any non-blank label without an override.
    pub default_capacity: usize,
    overrides: HashMap<String, usize>,
}

impl Default for LetterCapacity {
    fn default() -> Self {
        Self {
            default_capacity: 1,
            overrides: HashMap::new(),
        }
    }
}

impl LetterCapacity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override one label. Lookups are case-insensitive.
    #[must_use]
    pub fn with(mut self, label: &str, capacity: usize) -> Self {
        self.overrides.insert(label.trim().to_ascii_uppercase(), capacity);
        self
    }
}

impl CapacityTable for LetterCapacity {
    fn capacity_for_label(&self, label: &str) -> usize {
        let key = label.trim();
        if key.is_empty() {
            return 0;
        }
        self.overrides
            .get(&key.to_ascii_uppercase())
            .copied()
            .unwrap_or(self.default_capacity)
    }
}

/// Table capacity for `label` plus the node's boost, if a boost hook is given.
pub fn outbound_capacity(
    table: &dyn CapacityTable,
    boost: Option<&dyn Fn(NodeId) -> usize>,
    node_id: NodeId,
    label: &str,
) -> usize {
    let extra = boost.map_or(0, |f| f(node_id));
    table.capacity_for_label(label).saturating_add(extra)
}

/// Everything [`can_add_connection`] needs to judge one candidate wire.
pub struct AdmissionRequest<'a> {
    pub connection: &'a ConnectionPath,
    /// Existing wires of the room the candidate would join.
    pub connections: &'a [ConnectionPath],
    pub labels: &'a Labels,
    /// Plain resource boxes of the room. `None` skips the by-label check.
    pub resource_node_ids: Option<&'a HashSet<NodeId>>,
    pub capacity: &'a dyn CapacityTable,
    pub capacity_boost: Option<&'a dyn Fn(NodeId) -> usize>,
}

impl<'a> AdmissionRequest<'a> {
    pub fn new(
        connection: &'a ConnectionPath,
        connections: &'a [ConnectionPath],
        labels: &'a Labels,
        capacity: &'a dyn CapacityTable,
    ) -> Self {
        Self {
            connection,
            connections,
            labels,
            resource_node_ids: None,
            capacity,
            capacity_boost: None,
        }
    }

    #[must_use]
    pub fn resource_nodes(mut self, ids: &'a HashSet<NodeId>) -> Self {
        self.resource_node_ids = Some(ids);
        self
    }

    #[must_use]
    pub fn boost(mut self, boost: &'a dyn Fn(NodeId) -> usize) -> Self {
        self.capacity_boost = Some(boost);
        self
    }
}

fn outgoing_count(connections: &[ConnectionPath], id: NodeId) -> usize {
    connections.iter().filter(|c| c.from_id == id).count()
}

fn incoming_count(connections: &[ConnectionPath], id: NodeId) -> usize {
    connections.iter().filter(|c| c.to_id == id).count()
}

/// Checks, in order: source element limit, target element limit, target
/// admission rule, resource-node capacity by label. Stops at the first
/// failure.
pub fn can_add_connection(req: &AdmissionRequest<'_>) -> bool {
    let from = req.connection.from_id;
    let to = req.connection.to_id;

    if let Some(max) = behavior_for_id(from).and_then(|b| b.max_outgoing)
        && outgoing_count(req.connections, from) >= max
    {
        log::debug!("rejected {from} -> {to}: source at its outgoing limit {max}");
        return false;
    }

    let to_behavior = behavior_for_id(to);
    if let Some(max) = to_behavior.and_then(|b| b.max_incoming)
        && incoming_count(req.connections, to) >= max
    {
        log::debug!("rejected {from} -> {to}: target at its incoming limit {max}");
        return false;
    }

    if let Some(behavior) = to_behavior {
        let ctx = ResolveContext::new(req.labels, req.connections);
        if !behavior.can_accept_incoming(to, from, &ctx) {
            log::debug!("rejected {from} -> {to}: input type mismatch");
            return false;
        }
    }

    if req.resource_node_ids.is_some_and(|ids| ids.contains(&from)) {
        let label = req.labels.get(&from).map_or("", String::as_str);
        let capacity = outbound_capacity(req.capacity, req.capacity_boost, from, label);
        if outgoing_count(req.connections, from) >= capacity {
            log::debug!("rejected {from} -> {to}: resource capacity {capacity} used up");
            return false;
        }
    }

    true
}

/// Outbound slots a resource node still has, for badge display.
pub fn remaining_outbound(
    table: &dyn CapacityTable,
    boost: Option<&dyn Fn(NodeId) -> usize>,
    node_id: NodeId,
    label: &str,
    connections: &[ConnectionPath],
) -> usize {
    outbound_capacity(table, boost, node_id, label).saturating_sub(outgoing_count(connections, node_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn id(s: &str) -> NodeId {
        NodeId::intern(s)
    }

    fn wire(from: &str, to: &str) -> ConnectionPath {
        ConnectionPath::new(id(from), id(to), vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)])
    }

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().map(|(k, v)| (id(k), v.to_string())).collect()
    }

    fn admits(candidate: &ConnectionPath, existing: &[ConnectionPath], l: &Labels) -> bool {
        let table = LetterCapacity::default();
        can_add_connection(&AdmissionRequest::new(candidate, existing, l, &table))
    }

    #[test]
    fn converter_accepts_a_single_input_and_output() {
        let l = labels(&[("adm-A", "A"), ("adm-B", "B"), ("converter-a1", "1/a")]);
        let existing = [wire("adm-A", "converter-a1")];
        assert!(!admits(&wire("adm-B", "converter-a1"), &existing, &l));
        assert!(admits(&wire("converter-a1", "adm-B"), &existing, &l));

        let with_output = [wire("adm-A", "converter-a1"), wire("converter-a1", "adm-B")];
        assert!(!admits(&wire("converter-a1", "adm-A"), &with_output, &l));
    }

    #[test]
    fn combiner_allows_two_inputs_of_matching_type() {
        let l = labels(&[("adm-1", "1"), ("adm-2", "2"), ("adm-t", "t"), ("combiner-a1", "+")]);
        let existing = [wire("adm-1", "combiner-a1")];
        assert!(admits(&wire("adm-2", "combiner-a1"), &existing, &l));
        assert!(!admits(&wire("adm-t", "combiner-a1"), &existing, &l));

        let full = [wire("adm-1", "combiner-a1"), wire("adm-2", "combiner-a1")];
        assert!(!admits(&wire("adm-t", "combiner-a1"), &full, &l));
    }

    #[test]
    fn combiner_type_check_uses_resolved_labels() {
        // The first input is a converter turning "C" into "3", so a number
        // may join but a letter may not.
        let l = labels(&[
            ("adm-C", "C"),
            ("adm-4", "4"),
            ("adm-d", "d"),
            ("converter-a2", "1/a"),
            ("combiner-a2", "+"),
        ]);
        let existing = [wire("adm-C", "converter-a2"), wire("converter-a2", "combiner-a2")];
        assert!(admits(&wire("adm-4", "combiner-a2"), &existing, &l));
        assert!(!admits(&wire("adm-d", "combiner-a2"), &existing, &l));
    }

    #[test]
    fn resource_capacity_comes_from_label_and_boost() {
        let l = labels(&[("adm-R", "R"), ("adm-X", "X"), ("adm-Y", "Y"), ("adm-blank", "")]);
        let resources: HashSet<NodeId> = [id("adm-R"), id("adm-blank")].into_iter().collect();
        let table = LetterCapacity::default();
        let existing = [wire("adm-R", "adm-X")];
        let candidate = wire("adm-R", "adm-Y");

        let plain = AdmissionRequest::new(&candidate, &existing, &l, &table).resource_nodes(&resources);
        assert!(!can_add_connection(&plain));

        let boost = |node: NodeId| usize::from(node == id("adm-R"));
        let boosted = AdmissionRequest::new(&candidate, &existing, &l, &table)
            .resource_nodes(&resources)
            .boost(&boost);
        assert!(can_add_connection(&boosted));

        let blank = wire("adm-blank", "adm-X");
        let req = AdmissionRequest::new(&blank, &[], &l, &table).resource_nodes(&resources);
        assert!(!can_add_connection(&req));
    }

    #[test]
    fn without_resource_ids_the_label_check_is_skipped() {
        let l = labels(&[("adm-S", "S"), ("adm-T", "T"), ("adm-U", "U")]);
        let existing = [wire("adm-S", "adm-T")];
        assert!(admits(&wire("adm-S", "adm-U"), &existing, &l));
    }

    #[test]
    fn capacity_overrides_are_case_insensitive() {
        let table = LetterCapacity::new().with("e", 3);
        assert_eq!(table.capacity_for_label("E"), 3);
        assert_eq!(table.capacity_for_label("F"), 1);
        assert_eq!(table.capacity_for_label(" "), 0);
        let node = id("adm-E");
        let connections = [wire("adm-E", "adm-X")];
        assert_eq!(remaining_outbound(&table, None, node, "E", &connections), 2);
    }
}
