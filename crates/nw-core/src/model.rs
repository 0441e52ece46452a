//! Core data model for a play session.
//!
//! A session is a fixed tree of rooms (see [`crate::tree`]). Inside each
//! room, boxes are wired together with [`ConnectionPath`]s. A wire that
//! enters a zoomable box continues inside that box's room as an
//! [`IncomingStub`]; a value exported from a room to its boundary is
//! recorded there as an [`OutgoingStub`], which grants the room's node an
//! extra outbound slot in the parent room.

use crate::geometry::{Point, Square};
use crate::id::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stored (placed) labels of the boxes in one room, keyed by id.
pub type Labels = HashMap<NodeId, String>;

// ─── Stubs ───────────────────────────────────────────────────────────────

/// Local segment drawn at a room boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StubSegment {
    pub start: Point,
    pub end: Point,
}

/// A wire whose source lives in the parent room, drawn at the boundary
/// of the room it enters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingStub {
    pub id: NodeId,
    /// The value arriving through the wire.
    pub label: String,
    /// Node in the parent room the wire originates from.
    pub source_id: NodeId,
    pub start: Point,
    pub end: Point,
}

impl IncomingStub {
    pub fn new(id: NodeId, label: impl Into<String>, source_id: NodeId, segment: StubSegment) -> Self {
        Self {
            id,
            label: label.into(),
            source_id,
            start: segment.start,
            end: segment.end,
        }
    }

    pub fn segment(&self) -> [Point; 2] {
        [self.start, self.end]
    }
}

/// Export bookkeeping recorded against the room whose node gains capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingStub {
    pub id: NodeId,
    pub label: String,
    pub source_id: NodeId,
    pub start: Point,
    pub end: Point,
    #[serde(default)]
    pub points: Vec<Point>,
}

// ─── Connections ─────────────────────────────────────────────────────────

/// A directed wire inside one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPath {
    pub from_id: NodeId,
    pub to_id: NodeId,
    /// Poly-line from the start anchor to the end anchor.
    pub points: Vec<Point>,
    /// The stub this wire created in the target's room, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming_stub: Option<IncomingStub>,
}

impl ConnectionPath {
    pub fn new(from_id: NodeId, to_id: NodeId, points: Vec<Point>) -> Self {
        Self {
            from_id,
            to_id,
            points,
            incoming_stub: None,
        }
    }

    #[must_use]
    pub fn with_stub(mut self, stub: IncomingStub) -> Self {
        self.incoming_stub = Some(stub);
        self
    }

    pub fn touches(&self, id: NodeId) -> bool {
        self.from_id == id || self.to_id == id
    }

    pub fn stub_id(&self) -> Option<NodeId> {
        self.incoming_stub.as_ref().map(|s| s.id)
    }

    /// Same endpoints and geometry; the stub backlink is ignored.
    pub fn same_wire(&self, other: &ConnectionPath) -> bool {
        self.from_id == other.from_id && self.to_id == other.to_id && self.points == other.points
    }
}

// ─── Box geometry ────────────────────────────────────────────────────────

/// Projection of a resource node or placed element into the displayed room.
/// Supplied by the layout collaborator; the engine never computes layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxInfo {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    /// Zoomable: the node has a room of its own.
    pub has_children: bool,
    pub can_start_connection: bool,
}

impl BoxInfo {
    pub fn new(id: NodeId, x: f32, y: f32, size: f32) -> Self {
        Self {
            id,
            x,
            y,
            size,
            has_children: false,
            can_start_connection: true,
        }
    }

    #[must_use]
    pub fn zoomable(mut self, has_children: bool) -> Self {
        self.has_children = has_children;
        self
    }

    /// A square grab handle centred on the free end of an incoming stub,
    /// so a wire can be extended from it inside the child room.
    pub fn for_incoming_stub(stub: &IncomingStub, size: f32) -> Self {
        let half = size / 2.0;
        Self::new(stub.id, stub.end.x - half, stub.end.y - half, size)
    }

    pub fn square(&self) -> Square {
        Square::new(self.x, self.y, self.size)
    }

    pub fn contains(&self, p: Point) -> bool {
        self.square().contains(p)
    }
}

/// Topmost box containing `p`. Later entries are drawn above earlier ones.
pub fn box_at_point(p: Point, boxes: &[BoxInfo]) -> Option<&BoxInfo> {
    boxes.iter().rev().find(|b| b.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_hit_test_prefers_the_topmost_box() {
        let a = BoxInfo::new(NodeId::intern("hit-a"), 0.0, 0.0, 50.0);
        let b = BoxInfo::new(NodeId::intern("hit-b"), 25.0, 25.0, 50.0);
        let boxes = [a, b];
        let hit = box_at_point(Point::new(30.0, 30.0), &boxes).unwrap();
        assert_eq!(hit.id, NodeId::intern("hit-b"));
        let hit = box_at_point(Point::new(10.0, 10.0), &boxes).unwrap();
        assert_eq!(hit.id, NodeId::intern("hit-a"));
        assert!(box_at_point(Point::new(200.0, 0.0), &boxes).is_none());
    }

    #[test]
    fn stub_handle_is_centred_on_stub_end() {
        let stub = IncomingStub::new(
            NodeId::intern("incoming-handle"),
            "A",
            NodeId::intern("root-A"),
            StubSegment {
                start: Point::new(0.0, 20.0),
                end: Point::new(30.0, 20.0),
            },
        );
        let handle = BoxInfo::for_incoming_stub(&stub, 10.0);
        assert_eq!(handle.id, stub.id);
        assert!(handle.contains(stub.end));
        assert_eq!(handle.square().center(), stub.end);
    }

    #[test]
    fn connection_identity_ignores_stub() {
        let a = ConnectionPath::new(
            NodeId::intern("wire-x"),
            NodeId::intern("wire-y"),
            vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
        );
        let stub = IncomingStub::new(
            NodeId::intern("incoming-ident"),
            "",
            a.from_id,
            StubSegment {
                start: Point::default(),
                end: Point::default(),
            },
        );
        let b = a.clone().with_stub(stub);
        assert!(a.same_wire(&b));
        assert_ne!(a, b);
    }
}
