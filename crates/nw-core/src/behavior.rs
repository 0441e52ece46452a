//! Placeable behavior registry.
//!
//! Element kinds are told apart by id prefix only. A small ordered table
//! maps each prefix to a [`PlaceableBehavior`] carrying the kind's wire
//! limits; the label rule and admission rule are a closed set of functions
//! selected by [`PlaceableKind`]. Plain resource nodes have no entry: their
//! outbound capacity comes from the admission policy's capacity table.

use crate::id::{COMBINER_ID_PREFIX, CONVERTER_ID_PREFIX, NodeId};
use crate::label::{ResolveContext, combine_labels, convert_label, label_type};
use crate::model::ConnectionPath;
use smallvec::SmallVec;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceableKind {
    /// One input, one output; letter ↔ number transform.
    Converter,
    /// Two inputs, one output; sums numbers or concatenates text.
    Combiner,
}

/// What a box id denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Resource,
    Placeable(PlaceableKind),
    IncomingStub,
}

impl ElementKind {
    pub fn of(id: NodeId) -> Self {
        if let Some(behavior) = behavior_for_id(id) {
            ElementKind::Placeable(behavior.kind)
        } else if id.is_incoming_stub() {
            ElementKind::IncomingStub
        } else {
            ElementKind::Resource
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceableBehavior {
    pub kind: PlaceableKind,
    pub id_prefix: &'static str,
    pub max_incoming: Option<usize>,
    pub max_outgoing: Option<usize>,
    /// Label shown while the element has no input.
    pub idle_label: &'static str,
}

/// Ordered; the first prefix match wins.
pub static PLACEABLE_BEHAVIORS: [PlaceableBehavior; 2] = [
    PlaceableBehavior {
        kind: PlaceableKind::Converter,
        id_prefix: CONVERTER_ID_PREFIX,
        max_incoming: Some(1),
        max_outgoing: Some(1),
        idle_label: "1/a",
    },
    PlaceableBehavior {
        kind: PlaceableKind::Combiner,
        id_prefix: COMBINER_ID_PREFIX,
        max_incoming: Some(2),
        max_outgoing: Some(1),
        idle_label: "+",
    },
];

pub fn behavior_for_id(id: NodeId) -> Option<&'static PlaceableBehavior> {
    PLACEABLE_BEHAVIORS
        .iter()
        .find(|behavior| id.has_prefix(behavior.id_prefix))
}

pub fn behavior_for_kind(kind: PlaceableKind) -> &'static PlaceableBehavior {
    match kind {
        PlaceableKind::Converter => &PLACEABLE_BEHAVIORS[0],
        PlaceableKind::Combiner => &PLACEABLE_BEHAVIORS[1],
    }
}

impl PlaceableBehavior {
    /// Label flowing out of element `id`, or `None` to fall back to the
    /// stored label. `visited` already contains `id`.
    pub(crate) fn resolve_label(
        &self,
        id: NodeId,
        ctx: &ResolveContext<'_>,
        visited: &mut HashSet<NodeId>,
    ) -> Option<String> {
        match self.kind {
            PlaceableKind::Converter => {
                let incoming = ctx.connections.iter().find(|c| c.to_id == id)?;
                let upstream = ctx
                    .resolve(incoming.from_id, visited)
                    .filter(|l| !l.trim().is_empty())?;
                Some(convert_label(&upstream))
            }
            PlaceableKind::Combiner => {
                let incoming: SmallVec<[&ConnectionPath; 2]> =
                    ctx.connections.iter().filter(|c| c.to_id == id).collect();
                if incoming.is_empty() {
                    return None;
                }
                // Each branch walks with its own copy of the visited set so
                // siblings sharing an ancestor don't trip each other's guard.
                let labels: SmallVec<[String; 2]> = incoming
                    .iter()
                    .filter_map(|c| ctx.resolve(c.from_id, &mut visited.clone()))
                    .collect();
                combine_labels(&labels)
            }
        }
    }

    /// Extra admission rule applied to the target of a candidate wire.
    pub fn can_accept_incoming(&self, to_id: NodeId, from_id: NodeId, ctx: &ResolveContext<'_>) -> bool {
        match self.kind {
            PlaceableKind::Converter => true,
            PlaceableKind::Combiner => {
                let incoming: SmallVec<[&ConnectionPath; 2]> =
                    ctx.connections.iter().filter(|c| c.to_id == to_id).collect();
                match incoming.as_slice() {
                    [] => true,
                    [existing] => {
                        let existing_type = label_type(ctx.flow_label(existing.from_id).as_deref());
                        let new_type = label_type(ctx.flow_label(from_id).as_deref());
                        match (existing_type, new_type) {
                            (Some(a), Some(b)) => a == b,
                            _ => false,
                        }
                    }
                    _ => false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_lookup_first_match_wins() {
        let conv = behavior_for_id(NodeId::intern("converter-12")).unwrap();
        assert_eq!(conv.kind, PlaceableKind::Converter);
        assert_eq!(conv.max_incoming, Some(1));
        let comb = behavior_for_id(NodeId::intern("combiner-0")).unwrap();
        assert_eq!(comb.kind, PlaceableKind::Combiner);
        assert_eq!(comb.max_incoming, Some(2));
        assert_eq!(comb.max_outgoing, Some(1));
        assert!(behavior_for_id(NodeId::intern("root-A")).is_none());
    }

    #[test]
    fn element_kind_by_prefix() {
        assert_eq!(ElementKind::of(NodeId::intern("root-A")), ElementKind::Resource);
        assert_eq!(
            ElementKind::of(NodeId::intern("incoming-4")),
            ElementKind::IncomingStub
        );
        assert_eq!(
            ElementKind::of(NodeId::intern("combiner-1")),
            ElementKind::Placeable(PlaceableKind::Combiner)
        );
        assert_eq!(behavior_for_kind(PlaceableKind::Converter).id_prefix, "converter-");
    }
}
