//! Connection graph store.
//!
//! One [`Room`] per tree node that has been wired into, holding the room's
//! wires, the stubs entering it, and the exports recorded from it. The store
//! validates nothing: callers run [`crate::admission::can_add_connection`]
//! before adding. What it does own are the cascades that keep the three
//! collections consistent:
//!
//! - Removing an incoming stub removes every wire attached to it, including
//!   the wire in the parent room that created it.
//! - Removing a wire that created a stub (via [`GraphStore::remove_connection_with_stub`]
//!   or [`GraphStore::remove_connections_for_box`]) removes that stub in the
//!   target's room, which cascades further down.
//! - Every wire removed from a room trims the room's outgoing stubs by one,
//!   oldest first, so an export never outlives the wiring that produced it.
//!
//! All removals are idempotent. Listeners hear about every mutating call that
//! changed something, synchronously and possibly more than once per user
//! action.

use crate::id::{INCOMING_STUB_PREFIX, NodeId, OUTGOING_STUB_PREFIX};
use crate::model::{ConnectionPath, IncomingStub, OutgoingStub};
use std::collections::HashMap;
use std::fmt;

/// Wires and stubs of one room, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Room {
    pub connections: Vec<ConnectionPath>,
    pub incoming: Vec<IncomingStub>,
    pub outgoing: Vec<OutgoingStub>,
}

impl Room {
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty() && self.incoming.is_empty() && self.outgoing.is_empty()
    }
}

/// Handle returned by [`GraphStore::on_graph_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(NodeId)>;

#[derive(Default)]
pub struct GraphStore {
    rooms: HashMap<NodeId, Room>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphStore")
            .field("rooms", &self.rooms)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn room(&self, room: NodeId) -> Option<&Room> {
        self.rooms.get(&room)
    }

    pub fn connections(&self, room: NodeId) -> &[ConnectionPath] {
        self.rooms.get(&room).map(|r| r.connections.as_slice()).unwrap_or_default()
    }

    pub fn incoming_stubs(&self, room: NodeId) -> &[IncomingStub] {
        self.rooms.get(&room).map(|r| r.incoming.as_slice()).unwrap_or_default()
    }

    pub fn outgoing_stubs(&self, room: NodeId) -> &[OutgoingStub] {
        self.rooms.get(&room).map(|r| r.outgoing.as_slice()).unwrap_or_default()
    }

    /// Extra outbound slots for `node_id` in its parent room: one per
    /// export recorded in the node's own room.
    pub fn outbound_capacity_boost(&self, node_id: NodeId) -> usize {
        self.outgoing_stubs(node_id).len()
    }

    // ─── Id generation ───────────────────────────────────────────────────

    pub fn create_incoming_stub_id(&self) -> NodeId {
        NodeId::with_prefix(INCOMING_STUB_PREFIX)
    }

    pub fn create_outgoing_stub_id(&self) -> NodeId {
        NodeId::with_prefix(OUTGOING_STUB_PREFIX)
    }

    // ─── Listeners ───────────────────────────────────────────────────────

    /// Register a callback fired with the room id after each change.
    pub fn on_graph_changed(&mut self, listener: impl FnMut(NodeId) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns whether the listener was still registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, room: NodeId) {
        for (_, listener) in &mut self.listeners {
            listener(room);
        }
    }

    fn notify_all(&mut self, rooms: &[NodeId]) {
        for room in rooms {
            self.notify(*room);
        }
    }

    fn room_mut(&mut self, room: NodeId) -> &mut Room {
        self.rooms.entry(room).or_default()
    }

    // ─── Connections ─────────────────────────────────────────────────────

    /// Append a wire. The store applies no policy, so this always succeeds.
    pub fn add_connection(&mut self, room: NodeId, connection: ConnectionPath) -> bool {
        log::debug!("{room}: wire {} -> {}", connection.from_id, connection.to_id);
        self.room_mut(room).connections.push(connection);
        self.notify(room);
        true
    }

    /// Remove the first wire matching `connection` (endpoints and points).
    /// Any stub the wire created is left in place.
    pub fn remove_connection(&mut self, room: NodeId, connection: &ConnectionPath) -> bool {
        if self.take_connection(room, connection).is_none() {
            return false;
        }
        self.trim_outgoing(room, 1);
        self.notify(room);
        true
    }

    /// Remove a wire together with the incoming stub it created in the
    /// target's room. User-facing wire deletion goes through here.
    pub fn remove_connection_with_stub(&mut self, room: NodeId, connection: &ConnectionPath) -> bool {
        let Some(removed) = self.take_connection(room, connection) else {
            return false;
        };
        self.trim_outgoing(room, 1);
        let mut touched = vec![room];
        if let Some(stub) = &removed.incoming_stub {
            self.cascade_remove_stub(removed.to_id, stub.id, &mut touched);
        }
        self.notify_all(&touched);
        true
    }

    /// Remove every wire touching `box_id`, cascading to the stubs those
    /// wires created. Returns how many wires left this room.
    pub fn remove_connections_for_box(&mut self, room: NodeId, box_id: NodeId) -> usize {
        let mut touched = Vec::new();
        let removed = self.cascade_remove_touching(room, box_id, &mut touched);
        self.notify_all(&touched);
        removed
    }

    fn take_connection(&mut self, room: NodeId, connection: &ConnectionPath) -> Option<ConnectionPath> {
        let list = &mut self.rooms.get_mut(&room)?.connections;
        let pos = list.iter().position(|c| c.same_wire(connection))?;
        log::debug!("{room}: unwire {} -> {}", connection.from_id, connection.to_id);
        Some(list.remove(pos))
    }

    /// Drop wires touching `id` from `room` and follow their stubs down.
    /// Every room that changed is appended to `touched`.
    fn cascade_remove_touching(&mut self, room: NodeId, id: NodeId, touched: &mut Vec<NodeId>) -> usize {
        let Some(r) = self.rooms.get_mut(&room) else {
            return 0;
        };
        let (removed, kept): (Vec<_>, Vec<_>) = r.connections.drain(..).partition(|c| c.touches(id));
        r.connections = kept;
        if removed.is_empty() {
            return 0;
        }
        log::debug!("{room}: removed {} wire(s) touching {id}", removed.len());
        self.trim_outgoing(room, removed.len());
        if !touched.contains(&room) {
            touched.push(room);
        }
        for conn in &removed {
            if let Some(stub) = &conn.incoming_stub {
                self.cascade_remove_stub(conn.to_id, stub.id, touched);
            }
        }
        removed.len()
    }

    fn cascade_remove_stub(&mut self, room: NodeId, stub_id: NodeId, touched: &mut Vec<NodeId>) -> bool {
        let Some(r) = self.rooms.get_mut(&room) else {
            return false;
        };
        let before = r.incoming.len();
        r.incoming.retain(|s| s.id != stub_id);
        if r.incoming.len() == before {
            return false;
        }
        log::debug!("{room}: removed incoming stub {stub_id}");
        if !touched.contains(&room) {
            touched.push(room);
        }
        self.remove_backlinked(stub_id, touched);
        self.cascade_remove_touching(room, stub_id, touched);
        true
    }

    /// Drop the wires, in any room, that created stub `stub_id`.
    fn remove_backlinked(&mut self, stub_id: NodeId, touched: &mut Vec<NodeId>) {
        let feeding: Vec<NodeId> = self
            .rooms
            .iter()
            .filter(|(_, r)| r.connections.iter().any(|c| c.stub_id() == Some(stub_id)))
            .map(|(id, _)| *id)
            .collect();
        for room in feeding {
            let Some(r) = self.rooms.get_mut(&room) else {
                continue;
            };
            let before = r.connections.len();
            r.connections.retain(|c| c.stub_id() != Some(stub_id));
            let removed = before - r.connections.len();
            log::debug!("{room}: removed {removed} wire(s) feeding stub {stub_id}");
            self.trim_outgoing(room, removed);
            if !touched.contains(&room) {
                touched.push(room);
            }
        }
    }

    // ─── Incoming stubs ──────────────────────────────────────────────────

    pub fn add_incoming_stub(&mut self, room: NodeId, stub: IncomingStub) {
        log::debug!("{room}: incoming stub {} from {}", stub.id, stub.source_id);
        self.room_mut(room).incoming.push(stub);
        self.notify(room);
    }

    /// Remove a stub and every wire attached to it.
    pub fn remove_incoming_stub(&mut self, room: NodeId, stub_id: NodeId) -> bool {
        let mut touched = Vec::new();
        let removed = self.cascade_remove_stub(room, stub_id, &mut touched);
        self.notify_all(&touched);
        removed
    }

    // ─── Outgoing stubs ──────────────────────────────────────────────────

    pub fn add_outgoing_stub(&mut self, room: NodeId, stub: OutgoingStub) {
        log::debug!("{room}: outgoing stub {} ({})", stub.id, stub.label);
        self.room_mut(room).outgoing.push(stub);
        self.notify(room);
    }

    pub fn remove_outgoing_stub(&mut self, room: NodeId, stub_id: NodeId) -> bool {
        let Some(r) = self.rooms.get_mut(&room) else {
            return false;
        };
        let before = r.outgoing.len();
        r.outgoing.retain(|s| s.id != stub_id);
        if r.outgoing.len() == before {
            return false;
        }
        self.notify(room);
        true
    }

    /// Drop up to `count` outgoing stubs, oldest first.
    pub fn remove_outgoing_stubs(&mut self, room: NodeId, count: usize) -> usize {
        let removed = self.trim_outgoing(room, count);
        if removed > 0 {
            self.notify(room);
        }
        removed
    }

    pub fn remove_outgoing_stubs_for_source(&mut self, room: NodeId, source_id: NodeId) -> usize {
        let Some(r) = self.rooms.get_mut(&room) else {
            return 0;
        };
        let before = r.outgoing.len();
        r.outgoing.retain(|s| s.source_id != source_id);
        let removed = before - r.outgoing.len();
        if removed > 0 {
            self.notify(room);
        }
        removed
    }

    fn trim_outgoing(&mut self, room: NodeId, count: usize) -> usize {
        let Some(r) = self.rooms.get_mut(&room) else {
            return 0;
        };
        let n = count.min(r.outgoing.len());
        if n > 0 {
            log::debug!("{room}: trimmed {n} outgoing stub(s)");
            r.outgoing.drain(..n);
        }
        n
    }

    /// Forget everything recorded for a room.
    pub fn clear_room(&mut self, room: NodeId) -> bool {
        match self.rooms.remove(&room) {
            Some(r) if !r.is_empty() => {
                self.notify(room);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::model::StubSegment;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn id(s: &str) -> NodeId {
        NodeId::intern(s)
    }

    fn wire(from: NodeId, to: NodeId) -> ConnectionPath {
        ConnectionPath::new(from, to, vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)])
    }

    fn stub(stub_id: NodeId, source: NodeId) -> IncomingStub {
        IncomingStub::new(
            stub_id,
            "A",
            source,
            StubSegment {
                start: Point::new(0.0, 0.0),
                end: Point::new(12.0, 0.0),
            },
        )
    }

    fn export(store: &GraphStore, source: NodeId, label: &str) -> OutgoingStub {
        OutgoingStub {
            id: store.create_outgoing_stub_id(),
            label: label.to_string(),
            source_id: source,
            start: Point::default(),
            end: Point::default(),
            points: Vec::new(),
        }
    }

    fn recorder(store: &mut GraphStore) -> Rc<RefCell<Vec<NodeId>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        store.on_graph_changed(move |room| sink.borrow_mut().push(room));
        log
    }

    #[test]
    fn unknown_rooms_read_as_empty() {
        let store = GraphStore::new();
        assert!(store.connections(id("st-none")).is_empty());
        assert!(store.incoming_stubs(id("st-none")).is_empty());
        assert!(store.outgoing_stubs(id("st-none")).is_empty());
        assert_eq!(store.outbound_capacity_boost(id("st-none")), 0);
    }

    #[test]
    fn removing_a_stub_removes_its_wires() {
        let mut store = GraphStore::new();
        let room = id("st-room1");
        let stub_id = store.create_incoming_stub_id();
        store.add_incoming_stub(room, stub(stub_id, id("st-src")));
        store.add_connection(room, wire(stub_id, id("st-x")));

        assert!(store.remove_incoming_stub(room, stub_id));
        assert!(store.connections(room).is_empty());
        assert!(store.incoming_stubs(room).is_empty());
        assert!(!store.remove_incoming_stub(room, stub_id));
    }

    #[test]
    fn second_removal_is_silent() {
        let mut store = GraphStore::new();
        let room = id("st-room2");
        let child = id("st-child2b");
        let w = wire(id("st-a"), id("st-b"));
        let s = store.create_incoming_stub_id();
        let fed = wire(id("st-c"), child).with_stub(stub(s, id("st-c")));
        store.add_connection(room, w.clone());
        store.add_connection(room, fed.clone());
        store.add_connection(room, wire(id("converter-st2"), id("st-d")));
        store.add_incoming_stub(child, stub(s, id("st-c")));
        let events = recorder(&mut store);

        assert!(store.remove_connection(room, &w));
        assert!(!store.remove_connection(room, &w));
        assert!(store.remove_connection_with_stub(room, &fed));
        assert!(!store.remove_connection_with_stub(room, &fed));
        assert_eq!(store.remove_connections_for_box(room, id("converter-st2")), 1);
        assert_eq!(store.remove_connections_for_box(room, id("converter-st2")), 0);
        assert!(!store.remove_incoming_stub(child, s));
        assert_eq!(store.remove_outgoing_stubs(room, 3), 0);
        assert_eq!(store.remove_outgoing_stubs_for_source(room, id("st-a")), 0);

        assert_eq!(events.borrow().as_slice(), &[room, room, child, room]);
        assert!(store.connections(room).is_empty());
        assert!(store.incoming_stubs(child).is_empty());
    }

    #[test]
    fn removing_a_stub_drops_the_wire_that_created_it() {
        let mut store = GraphStore::new();
        let parent = id("st-parent6");
        let child = id("st-child6");
        let s = store.create_incoming_stub_id();
        store.add_connection(parent, wire(id("st-src6"), child).with_stub(stub(s, id("st-src6"))));
        store.add_connection(parent, wire(id("st-other6"), id("st-x6")));
        store.add_incoming_stub(child, stub(s, id("st-src6")));
        store.add_connection(child, wire(s, id("st-leaf6")));
        store.add_outgoing_stub(parent, export(&store, id("st-src6"), "A"));
        let events = recorder(&mut store);

        assert!(store.remove_incoming_stub(child, s));
        let left: Vec<NodeId> = store.connections(parent).iter().map(|c| c.from_id).collect();
        assert_eq!(left, vec![id("st-other6")]);
        assert!(store.connections(child).is_empty());
        assert_eq!(store.outbound_capacity_boost(parent), 0);
        assert_eq!(events.borrow().as_slice(), &[child, parent]);

        events.borrow_mut().clear();
        assert!(!store.remove_incoming_stub(child, s));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn wire_deletion_follows_stub_into_child_rooms() {
        let mut store = GraphStore::new();
        let parent = id("st-parent");
        let child = id("st-child");
        let grandchild = id("st-grandchild");

        // parent: src -> child (stub s1 in child)
        // child:  s1 -> grandchild (stub s2 in grandchild)
        // grandchild: s2 -> leaf
        let s1 = store.create_incoming_stub_id();
        let s2 = store.create_incoming_stub_id();
        let top = wire(id("st-src"), child).with_stub(stub(s1, id("st-src")));
        store.add_connection(parent, top.clone());
        store.add_incoming_stub(child, stub(s1, id("st-src")));
        store.add_connection(child, wire(s1, grandchild).with_stub(stub(s2, s1)));
        store.add_incoming_stub(grandchild, stub(s2, s1));
        store.add_connection(grandchild, wire(s2, id("st-leaf")));

        let events = recorder(&mut store);
        assert!(store.remove_connection_with_stub(parent, &top));

        for room in [parent, child, grandchild] {
            assert!(store.connections(room).is_empty(), "{room} still wired");
            assert!(store.incoming_stubs(room).is_empty(), "{room} still has stubs");
        }
        assert_eq!(events.borrow().as_slice(), &[parent, child, grandchild]);
    }

    #[test]
    fn plain_removal_keeps_the_stub() {
        let mut store = GraphStore::new();
        let parent = id("st-parent2");
        let child = id("st-child2");
        let s = store.create_incoming_stub_id();
        let w = wire(id("st-src2"), child).with_stub(stub(s, id("st-src2")));
        store.add_connection(parent, w.clone());
        store.add_incoming_stub(child, stub(s, id("st-src2")));

        assert!(store.remove_connection(parent, &w));
        assert_eq!(store.incoming_stubs(child).len(), 1);
    }

    #[test]
    fn box_removal_trims_exports_oldest_first() {
        let mut store = GraphStore::new();
        let room = id("st-room3");
        let elem = id("converter-st3");
        store.add_connection(room, wire(id("st-in"), elem));
        store.add_connection(room, wire(elem, id("st-out")));
        store.add_connection(room, wire(id("st-p"), id("st-q")));
        let first = export(&store, id("st-in"), "A");
        let second = export(&store, id("st-in"), "A");
        let third = export(&store, id("st-in"), "A");
        let kept = third.id;
        store.add_outgoing_stub(room, first);
        store.add_outgoing_stub(room, second);
        store.add_outgoing_stub(room, third);

        assert_eq!(store.remove_connections_for_box(room, elem), 2);
        assert_eq!(store.connections(room).len(), 1);
        let remaining: Vec<NodeId> = store.outgoing_stubs(room).iter().map(|s| s.id).collect();
        assert_eq!(remaining, vec![kept]);
        assert_eq!(store.outbound_capacity_boost(room), 1);
        assert_eq!(store.remove_connections_for_box(room, elem), 0);
    }

    #[test]
    fn outgoing_stub_removal_variants() {
        let mut store = GraphStore::new();
        let room = id("st-room4");
        let a = export(&store, id("st-a4"), "A");
        let b = export(&store, id("st-b4"), "B");
        let a_id = a.id;
        store.add_outgoing_stub(room, a);
        store.add_outgoing_stub(room, b);
        store.add_outgoing_stub(room, export(&store, id("st-b4"), "B"));

        assert_eq!(store.remove_outgoing_stubs_for_source(room, id("st-b4")), 2);
        assert!(store.remove_outgoing_stub(room, a_id));
        assert!(!store.remove_outgoing_stub(room, a_id));
        assert_eq!(store.remove_outgoing_stubs(room, 5), 0);
    }

    #[test]
    fn listeners_can_unsubscribe() {
        let mut store = GraphStore::new();
        let room = id("st-room5");
        let hits = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&hits);
        let handle = store.on_graph_changed(move |_| *counter.borrow_mut() += 1);

        store.add_connection(room, wire(id("st-a5"), id("st-b5")));
        assert!(store.remove_listener(handle));
        assert!(!store.remove_listener(handle));
        store.add_connection(room, wire(id("st-b5"), id("st-a5")));
        assert_eq!(*hits.borrow(), 1);
        assert!(store.clear_room(room));
        assert!(!store.clear_room(room));
    }
}
