//! Raw path generation
//!
//! Three strategies turn mesh vertices into unordered-to-ordered point lists:
//!
//! - **Adaptive**: horizontal Z bands of thickness `spacing`; each band is
//!   ordered by curvature bias and then by the tour sequencer.
//! - **Parallel**: scan lines `spacing` apart across the bounding box, either
//!   along X (lines at Y offsets) or along Y (lines at X offsets). Vertices are
//!   assigned to the line whose half-spacing band contains them and ordered
//!   along the scan axis.
//! - **Spiral**: a parametric spiral shrinking inward while climbing from the
//!   lowest to the highest vertex, each sample pulled onto the surface by an
//!   inverse-distance average of its nearest vertices.

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::{Point2, Point3};
use polishkit_core::error::{ensure_positive, Result};
use polishkit_core::{CurvatureBias, PathStrategy, PolishError, ScanDirection};
use std::collections::BTreeMap;
use std::f64::consts::TAU;
use tracing::{debug, info};

use crate::analysis::{nearest_n, point_tree, CurvatureField};
use crate::cancel::CancelFlag;
use crate::mesh::Mesh;
use crate::sequencer::{PathSequencer, TourStrategy};

/// Added to projection distances so a sample on top of a vertex stays finite.
const IDW_EPSILON: f64 = 1e-6;

/// Spiral shape parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpiralParams {
    pub revolutions: u32,
    pub points_per_revolution: u32,
    /// Vertices averaged when projecting a sample onto the surface.
    pub projection_neighbors: usize,
}

impl Default for SpiralParams {
    fn default() -> Self {
        Self {
            revolutions: 5,
            points_per_revolution: 20,
            projection_neighbors: 3,
        }
    }
}

/// Inputs for one planning run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerParams {
    pub strategy: PathStrategy,
    /// Band thickness (adaptive) or line spacing (parallel), in mm.
    pub spacing: f64,
    pub scan_direction: ScanDirection,
    pub curvature_bias: CurvatureBias,
    pub tour: TourStrategy,
    pub spiral: SpiralParams,
    /// Order whole segments greedily by start point from the mesh centroid.
    pub reorder_segments: bool,
}

impl PlannerParams {
    pub fn new(strategy: PathStrategy, spacing: f64) -> Self {
        Self {
            strategy,
            spacing,
            scan_direction: ScanDirection::default(),
            curvature_bias: CurvatureBias::default(),
            tour: TourStrategy::default(),
            spiral: SpiralParams::default(),
            reorder_segments: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_positive("spacing", self.spacing)?;
        if self.strategy == PathStrategy::Spiral {
            if self.spiral.revolutions == 0 {
                return Err(PolishError::invalid_parameter(
                    "spiral_revolutions",
                    "must be at least 1",
                ));
            }
            if self.spiral.points_per_revolution == 0 {
                return Err(PolishError::invalid_parameter(
                    "spiral_points_per_revolution",
                    "must be at least 1",
                ));
            }
            if self.spiral.projection_neighbors == 0 {
                return Err(PolishError::invalid_parameter(
                    "spiral_projection_neighbors",
                    "must be at least 1",
                ));
            }
        }
        Ok(())
    }
}

/// Where a raw segment came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentTag {
    AdaptiveLayer { z_level: f64 },
    ParallelLine { direction: ScanDirection, offset: f64 },
    Spiral,
}

/// Ordered positions before poses are attached
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegment {
    pub tag: SegmentTag,
    pub points: Vec<Point3<f64>>,
}

/// Stateless path generator
#[derive(Debug, Clone, Copy, Default)]
pub struct PathPlanner;

impl PathPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Plan raw segments. Never returns empty segments.
    pub fn plan(
        &self,
        mesh: &Mesh,
        curvature: &CurvatureField,
        params: &PlannerParams,
    ) -> Result<Vec<RawSegment>> {
        self.plan_with_cancel(mesh, curvature, params, &CancelFlag::new())
    }

    /// Like [`plan`](Self::plan), checking `cancel` between segments.
    pub fn plan_with_cancel(
        &self,
        mesh: &Mesh,
        curvature: &CurvatureField,
        params: &PlannerParams,
        cancel: &CancelFlag,
    ) -> Result<Vec<RawSegment>> {
        params.validate()?;
        if mesh.is_empty() {
            debug!("Empty mesh, no {} paths planned", params.strategy);
            return Ok(Vec::new());
        }

        let sequencer = PathSequencer::new(params.tour);
        let mut segments = match params.strategy {
            PathStrategy::Adaptive => adaptive(mesh, curvature, params, &sequencer, cancel)?,
            PathStrategy::Parallel => parallel(mesh, params, cancel)?,
            PathStrategy::Spiral => vec![spiral(mesh, &params.spiral)],
        };
        segments.retain(|s| !s.points.is_empty());

        if params.reorder_segments {
            if let Some(origin) = mesh.centroid() {
                segments = reorder(segments, origin, &sequencer);
            }
        }

        info!(
            "Planned {} {} segments with {} points",
            segments.len(),
            params.strategy,
            segments.iter().map(|s| s.points.len()).sum::<usize>()
        );
        Ok(segments)
    }
}

fn adaptive(
    mesh: &Mesh,
    curvature: &CurvatureField,
    params: &PlannerParams,
    sequencer: &PathSequencer,
    cancel: &CancelFlag,
) -> Result<Vec<RawSegment>> {
    let vertices = mesh.vertices();
    if params.curvature_bias != CurvatureBias::None && curvature.len() != vertices.len() {
        return Err(PolishError::invalid_geometry(format!(
            "curvature field has {} values for {} vertices",
            curvature.len(),
            vertices.len()
        )));
    }

    let Some(bounds) = mesh.bounds() else {
        return Ok(Vec::new());
    };
    let step = params.spacing;
    let min_z = bounds.min.z;
    let band_count = ((bounds.extent(2) / step).ceil() as usize).max(1);

    // Only occupied bands are stored, so a tiny step costs nothing extra.
    let mut bands: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, v) in vertices.iter().enumerate() {
        let band = (((v.z - min_z) / step).floor() as usize).min(band_count - 1);
        bands.entry(band).or_default().push(idx);
    }
    debug!(
        "Adaptive slicing: {} of {} bands occupied, {:.3} mm thick",
        bands.len(),
        band_count,
        step
    );

    let mut segments = Vec::with_capacity(bands.len());
    for (band, mut members) in bands {
        cancel.check()?;

        match params.curvature_bias {
            CurvatureBias::None => {}
            CurvatureBias::Ascending => members.sort_by(|&a, &b| {
                curvature.values()[a].total_cmp(&curvature.values()[b])
            }),
            CurvatureBias::Descending => members.sort_by(|&a, &b| {
                curvature.values()[b].total_cmp(&curvature.values()[a])
            }),
        }

        let points: Vec<Point3<f64>> = members.iter().map(|&i| vertices[i]).collect();
        segments.push(RawSegment {
            tag: SegmentTag::AdaptiveLayer {
                z_level: min_z + band as f64 * step,
            },
            points: sequencer.sequence(&points),
        });
    }
    Ok(segments)
}

fn parallel(mesh: &Mesh, params: &PlannerParams, cancel: &CancelFlag) -> Result<Vec<RawSegment>> {
    let Some(bounds) = mesh.bounds() else {
        return Ok(Vec::new());
    };
    let direction = params.scan_direction;
    let across = direction.across_axis();
    let along = direction.along_axis();
    let spacing = params.spacing;
    let origin = bounds.min[across];
    let last_line = (bounds.extent(across) / spacing).floor() as usize;

    let mut lines: BTreeMap<usize, Vec<Point3<f64>>> = BTreeMap::new();
    for v in mesh.vertices() {
        // Band [line - s/2, line + s/2) around line i at origin + i*s.
        let line = ((v[across] - origin) / spacing + 0.5).floor() as usize;
        if line <= last_line {
            lines.entry(line).or_default().push(*v);
        }
    }
    debug!(
        "Parallel scan along {}: {} of {} lines occupied, {:.3} mm apart",
        direction,
        lines.len(),
        last_line.saturating_add(1),
        spacing
    );

    let mut segments = Vec::with_capacity(lines.len());
    for (i, mut points) in lines {
        cancel.check()?;
        points.sort_by(|a, b| a[along].total_cmp(&b[along]));
        segments.push(RawSegment {
            tag: SegmentTag::ParallelLine {
                direction,
                offset: origin + i as f64 * spacing,
            },
            points,
        });
    }
    Ok(segments)
}

fn spiral(mesh: &Mesh, params: &SpiralParams) -> RawSegment {
    let vertices = mesh.vertices();
    let (Some(center), Some(bounds)) = (mesh.centroid(), mesh.bounds()) else {
        return RawSegment {
            tag: SegmentTag::Spiral,
            points: Vec::new(),
        };
    };

    let center_xy = Point2::new(center.x, center.y);
    let radius = vertices
        .iter()
        .map(|v| (Point2::new(v.x, v.y) - center_xy).norm())
        .fold(0.0, f64::max);

    let total = params.revolutions as usize * params.points_per_revolution as usize;
    let per_rev = f64::from(params.points_per_revolution);
    let (min_z, max_z) = (bounds.min.z, bounds.max.z);

    let Some(tree) = point_tree(vertices) else {
        return RawSegment {
            tag: SegmentTag::Spiral,
            points: Vec::new(),
        };
    };
    let points = (0..total)
        .map(|i| {
            let angle = TAU * i as f64 / per_rev;
            let t = i as f64 / total as f64;
            let r = radius * (1.0 - t);
            let sample = Point3::new(
                center_xy.x + r * angle.cos(),
                center_xy.y + r * angle.sin(),
                min_z + (max_z - min_z) * t,
            );
            project(&tree, vertices, &sample, params.projection_neighbors)
        })
        .collect();

    debug!(
        "Spiral: {} samples, radius {:.3} mm, z {:.3}..{:.3}",
        total, radius, min_z, max_z
    );
    RawSegment {
        tag: SegmentTag::Spiral,
        points,
    }
}

/// Inverse-distance weighted average of the `k` nearest vertices.
fn project(
    tree: &ImmutableKdTree<f64, 3>,
    vertices: &[Point3<f64>],
    sample: &Point3<f64>,
    k: usize,
) -> Point3<f64> {
    let mut weight_sum = 0.0;
    let mut acc = nalgebra::Vector3::zeros();
    for (index, distance) in nearest_n(tree, sample, k) {
        let w = 1.0 / (distance + IDW_EPSILON);
        acc += vertices[index].coords * w;
        weight_sum += w;
    }
    if weight_sum > 0.0 {
        Point3::from(acc / weight_sum)
    } else {
        *sample
    }
}

fn reorder(segments: Vec<RawSegment>, origin: Point3<f64>, sequencer: &PathSequencer) -> Vec<RawSegment> {
    let starts: Vec<Point3<f64>> = std::iter::once(origin)
        .chain(segments.iter().filter_map(|s| s.points.first().copied()))
        .collect();
    if starts.len() != segments.len() + 1 {
        return segments;
    }

    let order = sequencer.order(&starts);
    let mut slots: Vec<Option<RawSegment>> = segments.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter(|&i| i > 0)
        .filter_map(|i| slots[i - 1].take())
        .collect()
}

/// Fraction of mesh vertices within 1.5 tool radii of a planned position.
pub fn coverage(mesh: &Mesh, positions: &[Point3<f64>], tool_radius: f64) -> f64 {
    let Some(tree) = point_tree(positions).filter(|_| !mesh.is_empty()) else {
        return 0.0;
    };
    let reach_squared = (tool_radius * 1.5).powi(2);
    let covered = mesh
        .vertices()
        .iter()
        .filter(|v| {
            tree.nearest_one::<SquaredEuclidean>(&[v.x, v.y, v.z])
                .distance
                < reach_squared
        })
        .count();
    covered as f64 / mesh.vertex_count() as f64
}
