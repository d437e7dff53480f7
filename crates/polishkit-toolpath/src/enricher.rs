//! Pose and feed attachment
//!
//! Each raw point gets the stage's feed speed and blend zone plus an
//! orientation aligned with the nearest non-degenerate face. Points with no
//! usable face nearby (empty or fully degenerate meshes) fall back to the +Z
//! normal, which is a simplification: the tool approaches straight down.

use nalgebra::Vector3;
use polishkit_core::error::{ensure_positive, Result};
use polishkit_core::Stage;
use tracing::debug;

use crate::analysis::FaceNormalIndex;
use crate::cancel::CancelFlag;
use crate::mesh::Mesh;
use crate::path::{PathPoint, PathSegment};
use crate::planner::RawSegment;
use crate::pose::PoseCalculator;

/// Converts raw segments into named, posed segments for one mesh.
#[derive(Debug, Clone)]
pub struct PathEnricher {
    normals: FaceNormalIndex,
    pose: PoseCalculator,
}

impl PathEnricher {
    pub fn new(mesh: &Mesh) -> Self {
        Self::with_pose(mesh, PoseCalculator::default())
    }

    pub fn with_pose(mesh: &Mesh, pose: PoseCalculator) -> Self {
        Self {
            normals: FaceNormalIndex::new(mesh),
            pose,
        }
    }

    /// Attach poses. Segment order and point order are kept as given; ids
    /// are assigned `0..` over the non-empty raw segments.
    pub fn enrich(&self, raw: &[RawSegment], stage: Stage, speed: f64) -> Result<Vec<PathSegment>> {
        self.enrich_with_cancel(raw, stage, speed, &CancelFlag::new())
    }

    pub fn enrich_with_cancel(
        &self,
        raw: &[RawSegment],
        stage: Stage,
        speed: f64,
        cancel: &CancelFlag,
    ) -> Result<Vec<PathSegment>> {
        ensure_positive("speed", speed).map_err(|e| e.in_stage(stage))?;
        let zone = stage.blend_zone();

        let mut segments = Vec::with_capacity(raw.len());
        let mut fallbacks = 0usize;
        for segment in raw.iter().filter(|s| !s.points.is_empty()) {
            cancel.check()?;

            let mut points = Vec::with_capacity(segment.points.len());
            for position in &segment.points {
                let normal = match self.normals.normal_near(position) {
                    Some(n) => n,
                    None => {
                        fallbacks += 1;
                        Vector3::z()
                    }
                };
                points.push(PathPoint {
                    position: *position,
                    orientation: self.pose.orientation_from_normal(&normal)?,
                    speed,
                    zone,
                });
            }
            segments.push(PathSegment::new(stage, segments.len(), points));
        }

        if fallbacks > 0 {
            debug!("{} {} points used the +Z fallback normal", fallbacks, stage);
        }
        debug!("Enriched {} {} segments", segments.len(), stage);
        Ok(segments)
    }
}
