//! Enriched path data
//!
//! A [`PathPlan`] maps each stage to its ordered segments; a segment's point
//! order is its traversal order.

use nalgebra::{Point3, UnitQuaternion};
use polishkit_core::{BlendZone, Stage};
use std::collections::BTreeMap;

/// A tool pose with motion parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathPoint {
    pub position: Point3<f64>,
    pub orientation: UnitQuaternion<f64>,
    /// Feed speed in mm/s
    pub speed: f64,
    pub zone: BlendZone,
}

/// Points traversed contiguously without lift-off
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    /// Unique within a stage
    pub id: usize,
    pub name: String,
    pub points: Vec<PathPoint>,
}

impl PathSegment {
    pub fn new(stage: Stage, id: usize, points: Vec<PathPoint>) -> Self {
        Self {
            id,
            name: format!("{}_{}", stage, id),
            points,
        }
    }

    pub fn first(&self) -> Option<&PathPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PathPoint> {
        self.points.last()
    }

    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| (w[1].position - w[0].position).norm())
            .sum()
    }
}

/// Segments per stage, iterated rough before fine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathPlan {
    stages: BTreeMap<Stage, Vec<PathSegment>>,
}

impl PathPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a stage's segments, dropping empty ones. A stage with no
    /// segments left is not stored.
    pub fn insert(&mut self, stage: Stage, segments: Vec<PathSegment>) {
        let segments: Vec<PathSegment> = segments
            .into_iter()
            .filter(|s| !s.points.is_empty())
            .collect();
        if segments.is_empty() {
            self.stages.remove(&stage);
        } else {
            self.stages.insert(stage, segments);
        }
    }

    pub fn segments(&self, stage: Stage) -> &[PathSegment] {
        self.stages.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stages with at least one segment, in execution order.
    pub fn stages(&self) -> impl Iterator<Item = (Stage, &[PathSegment])> {
        self.stages.iter().map(|(stage, segs)| (*stage, segs.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn segment_count(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    pub fn point_count(&self) -> usize {
        self.stages
            .values()
            .flat_map(|segs| segs.iter())
            .map(|s| s.points.len())
            .sum()
    }

    /// Every planned position across all stages.
    pub fn positions(&self) -> impl Iterator<Item = Point3<f64>> + '_ {
        self.stages
            .values()
            .flat_map(|segs| segs.iter())
            .flat_map(|s| s.points.iter().map(|p| p.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64) -> PathPoint {
        PathPoint {
            position: Point3::new(x, 0.0, 0.0),
            orientation: UnitQuaternion::identity(),
            speed: 100.0,
            zone: BlendZone::Fine,
        }
    }

    #[test]
    fn test_segment_name_and_length() {
        let seg = PathSegment::new(Stage::Rough, 3, vec![point(0.0), point(4.0), point(5.0)]);
        assert_eq!(seg.name, "rough_3");
        assert_eq!(seg.length(), 5.0);
    }

    #[test]
    fn test_plan_drops_empty_segments_and_stages() {
        let mut plan = PathPlan::new();
        plan.insert(Stage::Fine, vec![PathSegment::new(Stage::Fine, 0, vec![point(1.0)])]);
        plan.insert(Stage::Rough, vec![PathSegment::new(Stage::Rough, 0, vec![])]);

        let stages: Vec<Stage> = plan.stages().map(|(s, _)| s).collect();
        assert_eq!(stages, vec![Stage::Fine]);
        assert!(plan.segments(Stage::Rough).is_empty());
        assert_eq!(plan.segment_count(), 1);
        assert_eq!(plan.point_count(), 1);
    }

    #[test]
    fn test_stages_iterate_rough_first() {
        let mut plan = PathPlan::new();
        plan.insert(Stage::Fine, vec![PathSegment::new(Stage::Fine, 0, vec![point(1.0)])]);
        plan.insert(Stage::Rough, vec![PathSegment::new(Stage::Rough, 0, vec![point(2.0)])]);
        let stages: Vec<Stage> = plan.stages().map(|(s, _)| s).collect();
        assert_eq!(stages, vec![Stage::Rough, Stage::Fine]);
    }
}
