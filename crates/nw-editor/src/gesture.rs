//! Wire-drawing gesture state machine.
//!
//! Press on a box arms a gesture. Leaving the box starts a preview wire
//! that is anchored on the box edge and re-emitted on every move. Releasing
//! over another box completes the wire; releasing anywhere else discards it,
//! and a motionless press-release on a zoomable box counts toward a double
//! click. The machine never touches the graph store: it only returns
//! [`DragAction`]s for the session to apply.

use nw_core::geometry::Point;
use nw_core::id::NodeId;
use nw_core::model::{BoxInfo, StubSegment, box_at_point};

/// Stub length as a share of the smaller view side.
const STUB_LENGTH_RATIO: f32 = 0.12;

/// Timing and distance thresholds of the gesture machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragConfig {
    /// Two clicks on the same box closer than this form a double click.
    pub double_click_ms: f64,
    /// Travel beyond this distance from the press marks the gesture as moved.
    pub drag_threshold: f32,
    /// Minimum gap between recorded path points.
    pub point_spacing: f32,
    /// Width of the band along the view boundary that accepts edge exports.
    pub edge_margin: f32,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            double_click_ms: 350.0,
            drag_threshold: 6.0,
            point_spacing: 6.0,
            edge_margin: 24.0,
        }
    }
}

/// Size of the displayed room view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSize {
    pub width: f32,
    pub height: f32,
}

impl ViewSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn min_side(&self) -> f32 {
        self.width.min(self.height)
    }

    /// Whether `p` lies within `margin` of any side of the view.
    pub fn near_edge(&self, p: Point, margin: f32) -> bool {
        p.x <= margin || p.y <= margin || p.x >= self.width - margin || p.y >= self.height - margin
    }
}

/// What the presentation (and the session) should do after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum DragAction {
    /// Redraw the preview wire through these points.
    DragDraw { points: Vec<Point> },
    /// Discard the preview wire.
    DragClear,
    /// A wire was dropped on another box.
    ConnectionAdded {
        from_id: NodeId,
        to_id: NodeId,
        points: Vec<Point>,
        /// Where the wire enters the target's room, in that room's space.
        incoming_stub: StubSegment,
    },
    DoubleClick { box_id: NodeId },
    /// A wire was released at the view boundary.
    EdgeDrop {
        from_id: NodeId,
        point: Point,
        points: Vec<Point>,
    },
}

/// Observable phase of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    Armed,
    DrawingOutside,
}

#[derive(Debug, Clone)]
struct Gesture {
    start_box: BoxInfo,
    start_point: Point,
    moved: bool,
    path: Vec<Point>,
    last_outside: Option<Point>,
    start_anchor: Option<Point>,
    line_active: bool,
}

impl Gesture {
    fn new(start_box: BoxInfo, start_point: Point) -> Self {
        Self {
            start_box,
            start_point,
            moved: false,
            path: Vec::new(),
            last_outside: None,
            start_anchor: None,
            line_active: false,
        }
    }

    /// Extend the path, collapsing points closer than `spacing`.
    fn push_path_point(&mut self, point: Point, spacing: f32) {
        match self.path.last_mut() {
            Some(last) if last.distance(point) <= spacing => *last = point,
            _ => self.path.push(point),
        }
    }

    /// `[anchor, ...path]` with the final path point swapped for `end`.
    fn points_with_end(&self, anchor: Point, end: Option<Point>) -> Vec<Point> {
        let mut points = Vec::with_capacity(self.path.len() + 1);
        points.push(anchor);
        points.extend_from_slice(&self.path);
        if let Some(end) = end
            && !self.path.is_empty()
            && let Some(last) = points.last_mut()
        {
            *last = end;
        }
        points
    }
}

#[derive(Debug, Clone, Default)]
enum DragState {
    #[default]
    Idle,
    Armed(Gesture),
    DrawingOutside(Gesture),
}

#[derive(Debug, Clone, Copy)]
struct ClickRecord {
    target: NodeId,
    at_ms: f64,
}

/// Stub segment for a wire ending at `edge_point` on `target`, expressed in
/// the target room's view: the start sits at the same relative position on
/// the view boundary and the segment points toward the view centre.
pub fn incoming_stub_segment(target: &BoxInfo, edge_point: Point, view: ViewSize) -> StubSegment {
    let size = target.size.max(f32::EPSILON);
    let local_x = edge_point.x - target.x;
    let local_y = edge_point.y - target.y;
    let half = size / 2.0;
    let dx = half - local_x;
    let dy = half - local_y;
    let length = match dx.hypot(dy) {
        l if l > 0.0 => l,
        _ => 1.0,
    };
    let start = Point::new(local_x / size * view.width, local_y / size * view.height);
    let stub_length = view.min_side() * STUB_LENGTH_RATIO;
    StubSegment {
        start,
        end: Point::new(start.x + dx / length * stub_length, start.y + dy / length * stub_length),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DragStateMachine {
    config: DragConfig,
    state: DragState,
    last_click: Option<ClickRecord>,
}

impl DragStateMachine {
    pub fn new(config: DragConfig) -> Self {
        Self {
            config,
            state: DragState::Idle,
            last_click: None,
        }
    }

    pub fn config(&self) -> &DragConfig {
        &self.config
    }

    pub fn phase(&self) -> DragPhase {
        match self.state {
            DragState::Idle => DragPhase::Idle,
            DragState::Armed(_) => DragPhase::Armed,
            DragState::DrawingOutside(_) => DragPhase::DrawingOutside,
        }
    }

    /// Id of the box the active gesture started on.
    pub fn start_id(&self) -> Option<NodeId> {
        match &self.state {
            DragState::Idle => None,
            DragState::Armed(g) | DragState::DrawingOutside(g) => Some(g.start_box.id),
        }
    }

    /// Arm a gesture on `start_box`. A gesture still in flight is
    /// cancelled first.
    pub fn start_drag(&mut self, start_box: &BoxInfo, point: Point) -> Vec<DragAction> {
        let actions = self.clear();
        log::trace!("drag armed on {}", start_box.id);
        self.state = DragState::Armed(Gesture::new(start_box.clone(), point));
        actions
    }

    pub fn move_drag(&mut self, point: Point, boxes: &[BoxInfo]) -> Vec<DragAction> {
        let mut g = match std::mem::take(&mut self.state) {
            DragState::Idle => return Vec::new(),
            DragState::Armed(g) | DragState::DrawingOutside(g) => g,
        };
        let mut actions = Vec::new();

        if !g.moved && g.start_point.distance(point) > self.config.drag_threshold {
            g.moved = true;
        }

        if g.start_box.contains(point) {
            g.path.clear();
            g.last_outside = None;
            g.start_anchor = None;
            if g.line_active {
                g.line_active = false;
                actions.push(DragAction::DragClear);
            }
            self.state = DragState::Armed(g);
            return actions;
        }

        let start_square = g.start_box.square();
        let anchor = *g
            .start_anchor
            .get_or_insert_with(|| start_square.edge_point_toward(point));
        let target = box_at_point(point, boxes).filter(|b| b.id != g.start_box.id);

        if target.is_none() {
            g.push_path_point(point, self.config.point_spacing);
            g.last_outside = Some(point);
        }
        let end = target.map(|t| t.square().edge_point_toward(g.last_outside.unwrap_or(anchor)));
        let points = g.points_with_end(anchor, end);

        g.line_active = true;
        self.state = DragState::DrawingOutside(g);
        actions.push(DragAction::DragDraw { points });
        actions
    }

    pub fn end_drag(&mut self, point: Point, boxes: &[BoxInfo], now_ms: f64, view: ViewSize) -> Vec<DragAction> {
        let g = match std::mem::take(&mut self.state) {
            DragState::Idle => return Vec::new(),
            DragState::Armed(g) | DragState::DrawingOutside(g) => g,
        };
        let target = box_at_point(point, boxes).filter(|b| b.id != g.start_box.id);
        let moved = (g.moved && g.line_active) || target.is_some();
        let anchor = g
            .start_anchor
            .unwrap_or_else(|| g.start_box.square().edge_point_toward(point));

        if let Some(target) = target {
            let end = target.square().edge_point_toward(g.last_outside.unwrap_or(point));
            let points = if g.path.is_empty() {
                vec![anchor, end]
            } else {
                g.points_with_end(anchor, Some(end))
            };
            log::trace!("drag dropped {} -> {}", g.start_box.id, target.id);
            return vec![DragAction::ConnectionAdded {
                from_id: g.start_box.id,
                to_id: target.id,
                points,
                incoming_stub: incoming_stub_segment(target, end, view),
            }];
        }

        let mut actions = Vec::new();
        if g.line_active {
            actions.push(DragAction::DragClear);
            if view.near_edge(point, self.config.edge_margin) {
                actions.push(DragAction::EdgeDrop {
                    from_id: g.start_box.id,
                    point,
                    points: g.points_with_end(anchor, None),
                });
            }
        }

        if !moved && g.start_box.has_children {
            let id = g.start_box.id;
            match self.last_click {
                Some(last) if last.target == id && now_ms - last.at_ms < self.config.double_click_ms => {
                    self.last_click = None;
                    log::trace!("double click on {id}");
                    actions.push(DragAction::DoubleClick { box_id: id });
                }
                _ => {
                    self.last_click = Some(ClickRecord { target: id, at_ms: now_ms });
                }
            }
        }
        actions
    }

    /// Drop any gesture in flight, e.g. when navigation starts.
    pub fn clear(&mut self) -> Vec<DragAction> {
        match std::mem::take(&mut self.state) {
            DragState::Idle => Vec::new(),
            DragState::Armed(g) | DragState::DrawingOutside(g) => {
                if g.line_active {
                    vec![DragAction::DragClear]
                } else {
                    Vec::new()
                }
            }
        }
    }
}
