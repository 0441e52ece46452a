pub mod admission;
pub mod behavior;
pub mod collision;
pub mod geometry;
pub mod id;
pub mod label;
pub mod model;
pub mod store;
pub mod tree;

pub use admission::{AdmissionRequest, CapacityTable, LetterCapacity, can_add_connection};
pub use behavior::{ElementKind, PlaceableBehavior, PlaceableKind, behavior_for_id, behavior_for_kind};
pub use collision::{PlacementConfig, has_placement_collision};
pub use geometry::{Point, Square};
pub use id::NodeId;
pub use label::{LabelType, combine_labels, convert_label, resolve_flow_label, sync_incoming_stub_labels};
pub use model::*;
pub use store::{GraphStore, ListenerId, Room};
pub use tree::{NodeSpec, NodeTree, TreeNode};
