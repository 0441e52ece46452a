//! Flow labels: what value a wire carries.
//!
//! The label leaving a box is its stored label, unless the box is a
//! placeable element, in which case it is derived from whatever flows
//! into it. Resolution walks upstream depth-first and stops at any element
//! already on the current path, so a wire loop shows the stored label.

use crate::behavior::behavior_for_id;
use crate::id::{INCOMING_STUB_PREFIX, NodeId};
use crate::model::{ConnectionPath, IncomingStub, Labels};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelType {
    Number,
    Text,
}

/// `Number` when entirely ASCII digits, `Text` otherwise; blank is untyped.
pub fn label_type(label: Option<&str>) -> Option<LabelType> {
    let trimmed = label?.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        Some(LabelType::Number)
    } else {
        Some(LabelType::Text)
    }
}

/// Combiner rule. Blank inputs are dropped; one input passes through; two
/// inputs must share a type and are summed (numbers) or concatenated in
/// connection order (text). Anything else yields `None`.
pub fn combine_labels<S: AsRef<str>>(labels: &[S]) -> Option<String> {
    let cleaned: Vec<&str> = labels
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty())
        .collect();
    match cleaned.as_slice() {
        [] => None,
        [single] => Some((*single).to_string()),
        [first, second, ..] => {
            let first_type = label_type(Some(first))?;
            if label_type(Some(second)) != Some(first_type) {
                return None;
            }
            match first_type {
                LabelType::Number => {
                    let a: u128 = first.parse().ok()?;
                    let b: u128 = second.parse().ok()?;
                    a.checked_add(b).map(|sum| sum.to_string())
                }
                LabelType::Text => Some(format!("{first}{second}")),
            }
        }
    }
}

fn letter_position(c: char) -> Option<u32> {
    c.is_ascii_alphabetic()
        .then(|| u32::from(c.to_ascii_uppercase()) - u32::from('A') + 1)
}

/// Converter rule.
///
/// - a single letter becomes its 1-based alphabet position (`"c"` → `"3"`)
/// - several letters become the product of their positions (`"bb"` → `"4"`)
/// - a number from 1 to 26 becomes its uppercase letter (`"1"` → `"A"`)
///
/// Any other shape, or a product too large to represent, passes through.
pub fn convert_label(label: &str) -> String {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return label.to_string();
    }
    if trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        let product = trimmed
            .chars()
            .filter_map(letter_position)
            .try_fold(1u128, |acc, pos| acc.checked_mul(u128::from(pos)));
        return match product {
            Some(value) => value.to_string(),
            None => label.to_string(),
        };
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit())
        && let Ok(value) = trimmed.parse::<u32>()
        && (1..=26).contains(&value)
        && let Some(letter) = char::from_u32(u32::from('A') + value - 1)
    {
        return letter.to_string();
    }
    label.to_string()
}

/// Read-only view over one room used during resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub labels: &'a Labels,
    pub connections: &'a [ConnectionPath],
}

impl<'a> ResolveContext<'a> {
    pub fn new(labels: &'a Labels, connections: &'a [ConnectionPath]) -> Self {
        Self { labels, connections }
    }

    /// Resolve from a fresh, empty visited set.
    pub fn flow_label(&self, id: NodeId) -> Option<String> {
        self.resolve(id, &mut HashSet::new())
    }

    pub(crate) fn resolve(&self, id: NodeId, visited: &mut HashSet<NodeId>) -> Option<String> {
        let stored = self.labels.get(&id).cloned();
        let Some(behavior) = behavior_for_id(id) else {
            return stored;
        };
        if !visited.insert(id) {
            log::trace!("label cycle reached {id}, using stored label");
            return stored;
        }
        behavior.resolve_label(id, self, visited).or(stored)
    }
}

/// Effective label leaving `id`, given the room's stored labels and wires.
pub fn resolve_flow_label(id: NodeId, labels: &Labels, connections: &[ConnectionPath]) -> Option<String> {
    ResolveContext::new(labels, connections).flow_label(id)
}

/// Replace every incoming-stub entry of a room's label map with the
/// room's current stubs, leaving other labels untouched.
pub fn sync_incoming_stub_labels(labels: &mut Labels, incoming: &[IncomingStub]) {
    labels.retain(|id, _| !id.has_prefix(INCOMING_STUB_PREFIX));
    for stub in incoming {
        labels.insert(stub.id, stub.label.clone());
    }
}
