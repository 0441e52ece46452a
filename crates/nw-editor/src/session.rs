//! Play session: the authoritative game state.
//!
//! The session owns the graph store and the room tree, tracks which room is
//! displayed, and keeps per-room presentation state (stored labels, resource
//! ids, box layout). Pointer input is routed through the gesture machine and
//! the resulting intents are applied here:
//!
//! - **Wires**: admitted by `can_add_connection`, then committed together
//!   with the incoming stub they create in the target's room.
//! - **Navigation**: double click enters a zoomable box, a right double
//!   click goes back up.
//! - **Exports**: a wire released at the view edge carrying the room's own
//!   letter records an outgoing stub, raising the room node's capacity in
//!   its parent.
//!
//! After every mutation the session drains the store's change feed and
//! trims parent wires that a shrunken export count no longer pays for.

use crate::gesture::{DragAction, DragConfig, DragStateMachine, ViewSize};
use crate::input::{InputEvent, PointerButton};
use nw_core::admission::{AdmissionRequest, CapacityTable, LetterCapacity, can_add_connection, remaining_outbound};
use nw_core::behavior::{PlaceableKind, behavior_for_id, behavior_for_kind};
use nw_core::collision::{PlacementConfig, has_placement_collision};
use nw_core::geometry::{Point, distance_to_segment};
use nw_core::id::NodeId;
use nw_core::label::{resolve_flow_label, sync_incoming_stub_labels};
use nw_core::model::*;
use nw_core::store::GraphStore;
use nw_core::tree::NodeTree;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Fallback resource box size, as a share of the smaller view side, for
/// rooms whose layout has not been supplied yet.
const FALLBACK_BOX_RATIO: f32 = 0.2;

/// Presentation-side state of one room.
#[derive(Debug, Clone, Default)]
struct RoomView {
    labels: Labels,
    resource_ids: HashSet<NodeId>,
    /// Resource boxes as laid out by the presentation.
    layout: Vec<BoxInfo>,
    /// Converters and combiners placed by the player.
    placed: Vec<BoxInfo>,
}

impl RoomView {
    fn seed(tree: &NodeTree, room: NodeId) -> Self {
        let children = tree.children_of(room);
        Self {
            labels: children.iter().map(|n| (n.id, n.label.clone())).collect(),
            resource_ids: children.iter().map(|n| n.id).collect(),
            layout: Vec::new(),
            placed: Vec::new(),
        }
    }
}

pub struct Session {
    tree: NodeTree,
    store: GraphStore,
    capacity: Box<dyn CapacityTable>,
    drag: DragStateMachine,
    placement: PlacementConfig,
    view: ViewSize,
    rooms: HashMap<NodeId, RoomView>,
    /// Navigation stack; the last entry is the displayed room.
    stack: Vec<NodeId>,
    pointer: Point,
    last_secondary_ms: Option<f64>,
    /// Rooms reported by the store since the last reconciliation.
    changed: Rc<RefCell<Vec<NodeId>>>,
}

impl Session {
    pub fn new(tree: NodeTree, view: ViewSize) -> Self {
        let mut store = GraphStore::new();
        let changed = Rc::new(RefCell::new(Vec::new()));
        let feed = Rc::clone(&changed);
        store.on_graph_changed(move |room| feed.borrow_mut().push(room));

        let root = tree.root_id();
        let mut rooms = HashMap::new();
        rooms.insert(root, RoomView::seed(&tree, root));

        Self {
            tree,
            store,
            capacity: Box::new(LetterCapacity::default()),
            drag: DragStateMachine::default(),
            placement: PlacementConfig::default(),
            view,
            rooms,
            stack: vec![root],
            pointer: Point::default(),
            last_secondary_ms: None,
            changed,
        }
    }

    /// Load the room tree from JSON and open its root room.
    pub fn from_json(json: &str, view: ViewSize) -> Result<Self, String> {
        Ok(Self::new(NodeTree::from_json(json)?, view))
    }

    #[must_use]
    pub fn with_capacity_table(mut self, table: impl CapacityTable + 'static) -> Self {
        self.capacity = Box::new(table);
        self
    }

    #[must_use]
    pub fn with_drag_config(mut self, config: DragConfig) -> Self {
        self.drag = DragStateMachine::new(config);
        self
    }

    #[must_use]
    pub fn with_placement(mut self, config: PlacementConfig) -> Self {
        self.placement = config;
        self
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn current_room(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.tree.root_id())
    }

    /// Rooms from the root down to the displayed one.
    pub fn breadcrumbs(&self) -> &[NodeId] {
        &self.stack
    }

    pub fn view(&self) -> ViewSize {
        self.view
    }

    pub fn set_view(&mut self, view: ViewSize) {
        self.view = view;
    }

    pub fn labels(&self, room: NodeId) -> Option<&Labels> {
        self.rooms.get(&room).map(|r| &r.labels)
    }

    /// Label flowing out of `id` in the displayed room.
    pub fn flow_label(&self, id: NodeId) -> Option<String> {
        let room = self.current_room();
        let labels = self.rooms.get(&room)?;
        resolve_flow_label(id, &labels.labels, self.store.connections(room))
    }

    /// Outbound slots a resource node in the displayed room has left.
    pub fn remaining_outbound(&self, id: NodeId) -> usize {
        let room = self.current_room();
        let label = self
            .rooms
            .get(&room)
            .and_then(|r| r.labels.get(&id))
            .map_or("", String::as_str);
        let boost: &dyn Fn(NodeId) -> usize = &|node| self.store.outbound_capacity_boost(node);
        remaining_outbound(self.capacity.as_ref(), Some(boost), id, label, self.store.connections(room))
    }

    /// Hit-test list for `room`: laid-out resource boxes, then placed
    /// elements, then grab handles on incoming stubs.
    pub fn boxes(&self, room: NodeId) -> Vec<BoxInfo> {
        let Some(view) = self.rooms.get(&room) else {
            return Vec::new();
        };
        let connections = self.store.connections(room);
        let mut boxes: Vec<BoxInfo> = view.layout.iter().chain(&view.placed).cloned().collect();
        for b in &mut boxes {
            b.can_start_connection = if view.resource_ids.contains(&b.id) {
                let label = view.labels.get(&b.id).map_or("", String::as_str);
                let boost: &dyn Fn(NodeId) -> usize = &|node| self.store.outbound_capacity_boost(node);
                remaining_outbound(self.capacity.as_ref(), Some(boost), b.id, label, connections) > 0
            } else {
                let used = connections.iter().filter(|c| c.from_id == b.id).count();
                behavior_for_id(b.id)
                    .and_then(|behavior| behavior.max_outgoing)
                    .is_none_or(|max| used < max)
            };
        }
        boxes.extend(
            self.store
                .incoming_stubs(room)
                .iter()
                .map(|stub| BoxInfo::for_incoming_stub(stub, self.placement.min_size)),
        );
        boxes
    }

    // ─── Layout ──────────────────────────────────────────────────────────

    /// Install the presentation's layout of a room's resource boxes.
    /// Zoomability is taken from the room tree.
    pub fn set_room_boxes(&mut self, room: NodeId, boxes: Vec<BoxInfo>) {
        let tree = &self.tree;
        let layout = boxes
            .into_iter()
            .map(|b| {
                let zoomable = tree.is_zoomable(b.id);
                b.zoomable(zoomable)
            })
            .collect();
        self.room_view_mut(room).layout = layout;
    }

    fn room_view_mut(&mut self, room: NodeId) -> &mut RoomView {
        let tree = &self.tree;
        self.rooms.entry(room).or_insert_with(|| RoomView::seed(tree, room))
    }

    // ─── Input ───────────────────────────────────────────────────────────

    /// Route one input event. Returns the gesture actions for the
    /// presentation; wire, navigation and export intents among them have
    /// already been applied.
    pub fn handle_input(&mut self, event: &InputEvent, now_ms: f64) -> Vec<DragAction> {
        if let Some(p) = event.position() {
            self.pointer = p;
        }
        let room = self.current_room();
        match event {
            InputEvent::PointerDown {
                x,
                y,
                button: PointerButton::Secondary,
            } => self.handle_secondary(Point::new(*x, *y), now_ms),
            InputEvent::PointerDown {
                x,
                y,
                button: PointerButton::Primary,
            } => {
                let p = Point::new(*x, *y);
                let boxes = self.boxes(room);
                match box_at_point(p, &boxes) {
                    Some(hit) => self.drag.start_drag(hit, p),
                    None => Vec::new(),
                }
            }
            InputEvent::PointerDown { .. } => Vec::new(),
            InputEvent::PointerMove { x, y } => {
                let boxes = self.boxes(room);
                self.drag.move_drag(Point::new(*x, *y), &boxes)
            }
            InputEvent::PointerUp {
                x,
                y,
                button: PointerButton::Primary,
            } => {
                let boxes = self.boxes(room);
                let actions = self.drag.end_drag(Point::new(*x, *y), &boxes, now_ms, self.view);
                for action in &actions {
                    self.apply_action(action);
                }
                actions
            }
            InputEvent::PointerUp { .. } => Vec::new(),
            InputEvent::Key { key } => {
                let kind = match key.as_str() {
                    "1" => Some(PlaceableKind::Converter),
                    "2" => Some(PlaceableKind::Combiner),
                    _ => None,
                };
                if let Some(kind) = kind {
                    self.place_element(kind, self.pointer);
                }
                Vec::new()
            }
        }
    }

    /// Right press: delete the element or wire under the pointer; two
    /// presses on empty space in quick succession leave the room.
    fn handle_secondary(&mut self, p: Point, now_ms: f64) -> Vec<DragAction> {
        let room = self.current_room();
        let boxes = self.boxes(room);
        if let Some(hit) = box_at_point(p, &boxes).map(|b| b.id)
            && behavior_for_id(hit).is_some()
        {
            self.last_secondary_ms = None;
            return self.delete_element(hit).unwrap_or_default();
        }
        if let Some(wire) = self.wire_at_point(p) {
            self.last_secondary_ms = None;
            self.delete_wire(&wire);
            return Vec::new();
        }
        match self.last_secondary_ms {
            Some(last) if now_ms - last < self.drag.config().double_click_ms => {
                self.last_secondary_ms = None;
                self.exit_room().unwrap_or_default()
            }
            _ => {
                self.last_secondary_ms = Some(now_ms);
                Vec::new()
            }
        }
    }

    /// Topmost wire of the displayed room passing within grab distance.
    pub fn wire_at_point(&self, p: Point) -> Option<ConnectionPath> {
        let tolerance = self.placement.stroke_width / 2.0 + self.placement.clearance;
        self.store
            .connections(self.current_room())
            .iter()
            .rev()
            .find(|c| c.points.windows(2).any(|seg| distance_to_segment(p, seg[0], seg[1]) <= tolerance))
            .cloned()
    }

    /// Apply one gesture intent. Returns whether the session changed.
    pub fn apply_action(&mut self, action: &DragAction) -> bool {
        match action {
            DragAction::DragDraw { .. } | DragAction::DragClear => false,
            DragAction::ConnectionAdded {
                from_id,
                to_id,
                points,
                incoming_stub,
            } => self.connect(*from_id, *to_id, points.clone(), *incoming_stub),
            DragAction::DoubleClick { box_id } => self.enter_room(*box_id).is_some(),
            DragAction::EdgeDrop { from_id, point, points } => self.export_to_edge(*from_id, *point, points),
        }
    }

    // ─── Wiring ──────────────────────────────────────────────────────────

    fn connect(&mut self, from_id: NodeId, to_id: NodeId, points: Vec<Point>, segment: StubSegment) -> bool {
        if to_id.is_incoming_stub() {
            return false;
        }
        let room = self.current_room();
        if !self.is_present(room, from_id) || !self.is_present(room, to_id) {
            log::debug!("{room}: {from_id} -> {to_id} refused, endpoint is gone");
            return false;
        }
        let Some(view) = self.rooms.get(&room) else {
            return false;
        };
        let connection = ConnectionPath::new(from_id, to_id, points);
        let admitted = {
            let boost = |node: NodeId| self.store.outbound_capacity_boost(node);
            let req = AdmissionRequest::new(
                &connection,
                self.store.connections(room),
                &view.labels,
                self.capacity.as_ref(),
            )
            .resource_nodes(&view.resource_ids)
            .boost(&boost);
            can_add_connection(&req)
        };
        if !admitted {
            return false;
        }

        let label = resolve_flow_label(from_id, &view.labels, self.store.connections(room)).unwrap_or_default();
        if self.tree.is_zoomable(to_id) {
            let stub = IncomingStub::new(self.store.create_incoming_stub_id(), label, from_id, segment);
            self.store.add_connection(room, connection.with_stub(stub.clone()));
            self.store.add_incoming_stub(to_id, stub);
        } else {
            self.store.add_connection(room, connection);
        }
        self.reconcile();
        true
    }

    /// Whether `id` is still a box of `room`: labelled, and either laid out,
    /// placed, or one of the room's incoming stubs.
    fn is_present(&self, room: NodeId, id: NodeId) -> bool {
        let Some(view) = self.rooms.get(&room) else {
            return false;
        };
        view.labels.contains_key(&id)
            && (view.layout.iter().chain(&view.placed).any(|b| b.id == id)
                || self.store.incoming_stubs(room).iter().any(|s| s.id == id))
    }

    /// Delete one wire of the displayed room along with its stub.
    pub fn delete_wire(&mut self, connection: &ConnectionPath) -> bool {
        let room = self.current_room();
        let removed = self.store.remove_connection_with_stub(room, connection);
        self.reconcile();
        removed
    }

    // ─── Elements ────────────────────────────────────────────────────────

    /// Spawn a converter or combiner centred at `center` in the displayed
    /// room. `None` when the spot is not free.
    pub fn place_element(&mut self, kind: PlaceableKind, center: Point) -> Option<NodeId> {
        let room = self.current_room();
        let behavior = behavior_for_kind(kind);
        let base = self
            .rooms
            .get(&room)
            .and_then(|r| r.layout.first())
            .map_or(self.view.min_side() * FALLBACK_BOX_RATIO, |b| b.size);
        let size = self.placement.size_for(base);
        let boxes: Vec<BoxInfo> = self
            .rooms
            .get(&room)
            .map(|r| r.layout.iter().chain(&r.placed).cloned().collect())
            .unwrap_or_default();
        if has_placement_collision(
            center,
            size,
            &boxes,
            self.store.connections(room),
            self.store.incoming_stubs(room),
            &self.placement,
        ) {
            log::debug!("{room}: no room for a {kind:?} at ({}, {})", center.x, center.y);
            return None;
        }

        let id = NodeId::with_prefix(behavior.id_prefix);
        let half = size / 2.0;
        let view = self.room_view_mut(room);
        view.labels.insert(id, behavior.idle_label.to_string());
        view.placed.push(BoxInfo::new(id, center.x - half, center.y - half, size));
        log::debug!("{room}: placed {id}");
        Some(id)
    }

    /// Remove a placed converter or combiner with all its wires, cancelling
    /// a gesture that started on it. Resource nodes cannot be deleted.
    /// Returns the actions for the presentation, or `None` if nothing was
    /// deleted.
    pub fn delete_element(&mut self, id: NodeId) -> Option<Vec<DragAction>> {
        behavior_for_id(id)?;
        let room = self.current_room();
        let view = self.rooms.get_mut(&room)?;
        let before = view.placed.len();
        view.placed.retain(|b| b.id != id);
        if view.placed.len() == before {
            return None;
        }
        view.labels.remove(&id);
        let actions = if self.drag.start_id() == Some(id) {
            self.drag.clear()
        } else {
            Vec::new()
        };
        self.store.remove_connections_for_box(room, id);
        log::debug!("{room}: deleted {id}");
        self.reconcile();
        Some(actions)
    }

    // ─── Navigation ──────────────────────────────────────────────────────

    /// Open the room of a zoomable child of the displayed room. The returned
    /// actions erase any preview line of the gesture this cancels.
    pub fn enter_room(&mut self, id: NodeId) -> Option<Vec<DragAction>> {
        let current = self.current_room();
        if !self.tree.is_zoomable(id) || self.tree.parent_of(id) != Some(current) {
            return None;
        }
        let actions = self.drag.clear();
        let incoming = self.store.incoming_stubs(id).to_vec();
        let view = self.room_view_mut(id);
        sync_incoming_stub_labels(&mut view.labels, &incoming);
        self.stack.push(id);
        log::debug!("entered {id}");
        Some(actions)
    }

    /// Go back to the parent room. The root room cannot be left.
    pub fn exit_room(&mut self) -> Option<Vec<DragAction>> {
        if self.stack.len() <= 1 {
            return None;
        }
        let actions = self.drag.clear();
        let left = self.stack.pop();
        log::debug!("left {left:?}");
        Some(actions)
    }

    // ─── Exports ─────────────────────────────────────────────────────────

    /// Record an export from the displayed room. The source must carry the
    /// room's own letter and may export only once.
    pub fn export_to_edge(&mut self, from_id: NodeId, point: Point, points: &[Point]) -> bool {
        let room = self.current_room();
        if self.tree.parent_of(room).is_none() {
            return false;
        }
        let Some(room_label) = self.tree.label(room).filter(|l| !l.trim().is_empty()) else {
            return false;
        };
        let Some(label) = self.flow_label(from_id) else {
            return false;
        };
        if !label.trim().eq_ignore_ascii_case(room_label.trim()) {
            log::debug!("{room}: export of {label:?} refused, room is {room_label:?}");
            return false;
        }
        if self.store.outgoing_stubs(room).iter().any(|s| s.source_id == from_id) {
            return false;
        }
        let stub = OutgoingStub {
            id: self.store.create_outgoing_stub_id(),
            label,
            source_id: from_id,
            start: points.first().copied().unwrap_or(point),
            end: point,
            points: points.to_vec(),
        };
        self.store.add_outgoing_stub(room, stub);
        self.reconcile();
        true
    }

    // ─── Reconciliation ──────────────────────────────────────────────────

    /// Drain the store's change feed until it settles: refresh stub labels
    /// of every touched room and drop parent wires beyond capacity.
    fn reconcile(&mut self) {
        loop {
            let mut pending: Vec<NodeId> = self.changed.borrow_mut().drain(..).collect();
            if pending.is_empty() {
                break;
            }
            pending.dedup();
            for room in pending {
                if let Some(view) = self.rooms.get_mut(&room) {
                    sync_incoming_stub_labels(&mut view.labels, self.store.incoming_stubs(room));
                }
                self.trim_parent_wires(room);
            }
        }
    }

    /// The node `room` may feed at most its table capacity plus its export
    /// count into its parent room; the oldest wires beyond that go.
    fn trim_parent_wires(&mut self, room: NodeId) {
        let Some(parent) = self.tree.parent_of(room) else {
            return;
        };
        let label = self.tree.label(room).unwrap_or_default();
        let capacity = self
            .capacity
            .capacity_for_label(label)
            .saturating_add(self.store.outbound_capacity_boost(room));
        let from_room: Vec<ConnectionPath> = self
            .store
            .connections(parent)
            .iter()
            .filter(|c| c.from_id == room)
            .cloned()
            .collect();
        let excess = from_room.len().saturating_sub(capacity);
        for connection in from_room.iter().take(excess) {
            log::debug!("{parent}: {room} over capacity, dropping wire to {}", connection.to_id);
            self.store.remove_connection_with_stub(parent, connection);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("room", &self.current_room())
            .field("stack", &self.stack)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
