//! Free-space test for spawning converters and combiners.

use crate::geometry::{Point, circle_intersects_path, circle_intersects_square};
use crate::model::{BoxInfo, ConnectionPath, IncomingStub};

/// Sizing and spacing of placed elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementConfig {
    /// Element size relative to the room's resource boxes.
    pub scale: f32,
    pub min_size: f32,
    /// Gap kept free around the element.
    pub clearance: f32,
    /// Drawn wire thickness.
    pub stroke_width: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            scale: 0.5,
            min_size: 24.0,
            clearance: 6.0,
            stroke_width: 4.0,
        }
    }
}

impl PlacementConfig {
    pub fn size_for(&self, base_box_size: f32) -> f32 {
        (base_box_size * self.scale).max(self.min_size)
    }
}

/// Whether an element of `size` centred at `center` would overlap a box,
/// a wire, or an incoming stub segment, including the clearance margin.
pub fn has_placement_collision(
    center: Point,
    size: f32,
    boxes: &[BoxInfo],
    connections: &[ConnectionPath],
    incoming: &[IncomingStub],
    config: &PlacementConfig,
) -> bool {
    let radius = size / 2.0;
    let inflated = radius + config.clearance;
    if boxes
        .iter()
        .any(|b| circle_intersects_square(center, inflated, &b.square()))
    {
        return true;
    }

    let path_radius = radius + config.stroke_width / 2.0 + config.clearance;
    connections
        .iter()
        .any(|c| circle_intersects_path(center, path_radius, &c.points))
        || incoming
            .iter()
            .any(|s| circle_intersects_path(center, path_radius, &s.segment()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NodeId;
    use crate::model::StubSegment;

    #[test]
    fn size_is_scaled_with_a_floor() {
        let config = PlacementConfig::default();
        assert_eq!(config.size_for(100.0), 50.0);
        assert_eq!(config.size_for(30.0), 24.0);
    }

    #[test]
    fn boxes_block_with_clearance() {
        let config = PlacementConfig::default();
        let boxes = [BoxInfo::new(NodeId::intern("col-a"), 0.0, 0.0, 50.0)];
        // radius 12 + clearance 6 = 18 from the right edge at x=50
        assert!(has_placement_collision(Point::new(67.0, 25.0), 24.0, &boxes, &[], &[], &config));
        assert!(!has_placement_collision(Point::new(69.0, 25.0), 24.0, &boxes, &[], &[], &config));
    }

    #[test]
    fn wires_and_stubs_block_with_stroke_margin() {
        let config = PlacementConfig::default();
        let wire = ConnectionPath::new(
            NodeId::intern("col-x"),
            NodeId::intern("col-y"),
            vec![Point::new(0.0, 0.0), Point::new(200.0, 0.0)],
        );
        // radius 12 + stroke 2 + clearance 6 = 20
        assert!(has_placement_collision(Point::new(100.0, 19.0), 24.0, &[], &[wire.clone()], &[], &config));
        assert!(!has_placement_collision(Point::new(100.0, 21.0), 24.0, &[], &[wire], &[], &config));

        let stub = IncomingStub::new(
            NodeId::intern("incoming-col"),
            "A",
            NodeId::intern("col-x"),
            StubSegment {
                start: Point::new(0.0, 100.0),
                end: Point::new(0.0, 140.0),
            },
        );
        assert!(has_placement_collision(Point::new(10.0, 120.0), 24.0, &[], &[], &[stub], &config));
    }
}
