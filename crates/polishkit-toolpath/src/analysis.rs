//! Local surface analysis
//!
//! Curvature here is a planarity proxy, not differential-geometry curvature:
//! for each vertex the covariance of its `k` nearest neighbours is decomposed
//! and the ratio `λ0 / λ2` of its smallest to largest eigenvalue is reported.
//! Flat neighbourhoods give values near 0; sharp or noisy ones approach 1.

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use polishkit_core::error::{ensure_non_negative, ensure_positive, Result};
use polishkit_core::LengthUnit;
use std::f64::consts::PI;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mesh::Mesh;

/// Eigenvalue spread below which a neighbourhood counts as a single point.
const EIGEN_EPSILON: f64 = 1e-12;

/// Young's modulus of steel in N/mm² (210 GPa).
const STEEL_MODULUS: f64 = 210_000.0;

/// Fraction of the mean bounding-box size taken as the nominal radius of
/// curvature.
const NOMINAL_RADIUS_FRACTION: f64 = 0.1;

/// Per-vertex planarity ratio in `[0, 1]`, indexed like the mesh vertices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurvatureField {
    values: Vec<f64>,
}

impl CurvatureField {
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Eigenvalue ratio `λ0 / λ2` of the neighbourhood around `vertex`.
    pub fn planarity(&self, vertex: usize) -> Option<f64> {
        self.values.get(vertex).copied()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f64>() / self.values.len() as f64
        }
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }
}

/// Stateless curvature and normal estimation
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshAnalyzer;

impl MeshAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Planarity ratio for every vertex from its `k` nearest neighbours.
    ///
    /// Vertices with fewer than three neighbours get 0. An empty mesh gives an
    /// empty field.
    pub fn estimate_curvature(&self, mesh: &Mesh, k: usize) -> CurvatureField {
        let vertices = mesh.vertices();
        let Some(tree) = point_tree(vertices) else {
            return CurvatureField::default();
        };

        let values: Vec<f64> = vertices
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                let neighbors: Vec<Point3<f64>> = nearest_n(&tree, v, k + 1)
                    .into_iter()
                    .filter(|&(i, _)| i != idx)
                    .take(k)
                    .map(|(i, _)| vertices[i])
                    .collect();
                planarity_ratio(&neighbors)
            })
            .collect();

        let field = CurvatureField::from_values(values);
        debug!(
            "Curvature estimated for {} vertices (k={}, mean={:.4}, max={:.4})",
            field.len(),
            k,
            field.mean(),
            field.max()
        );
        field
    }

    /// Unit normal per face from the winding order.
    ///
    /// Degenerate triangles give a zero vector.
    pub fn estimate_normals(&self, mesh: &Mesh) -> Vec<Vector3<f64>> {
        (0..mesh.face_count())
            .filter_map(|i| mesh.triangle(i))
            .map(|[a, b, c]| {
                let cross = (b - a).cross(&(c - a));
                let norm = cross.norm();
                if norm > 0.0 && norm.is_finite() {
                    cross / norm
                } else {
                    Vector3::zeros()
                }
            })
            .collect()
    }

    /// Summary of the mesh and its curvature field.
    pub fn report(&self, mesh: &Mesh, curvature: &CurvatureField) -> GeometryReport {
        let bounds = mesh.bounds();
        let degenerate_faces = self
            .estimate_normals(mesh)
            .iter()
            .filter(|n| n.norm_squared() == 0.0)
            .count();

        GeometryReport {
            vertex_count: mesh.vertex_count(),
            face_count: mesh.face_count(),
            degenerate_faces,
            bounds_min: bounds.map(|b| b.min.into()),
            bounds_max: bounds.map(|b| b.max.into()),
            size: bounds.map(|b| b.size().into()),
            center: bounds.map(|b| b.center().into()),
            surface_area: mesh.surface_area(),
            signed_volume: mesh.signed_volume(),
            mean_curvature: curvature.mean(),
            max_curvature: curvature.max(),
            source_unit: mesh.source_unit(),
            cad_system: mesh.metadata().cad_system.clone(),
            contact_pressure: None,
        }
    }
}

fn planarity_ratio(neighbors: &[Point3<f64>]) -> f64 {
    if neighbors.len() < 3 {
        return 0.0;
    }

    let count = neighbors.len() as f64;
    let centroid = neighbors
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / count;

    let mut cov = Matrix3::zeros();
    for p in neighbors {
        let diff = p.coords - centroid;
        cov += diff * diff.transpose();
    }
    cov /= count;

    let eigen = SymmetricEigen::new(cov);
    let mut lambda = [
        eigen.eigenvalues[0],
        eigen.eigenvalues[1],
        eigen.eigenvalues[2],
    ];
    lambda.sort_by(f64::total_cmp);

    if lambda[2] > EIGEN_EPSILON {
        (lambda[0] / lambda[2]).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// k-d tree over `points`, `None` when there are none. Items are indices
/// into the slice.
pub(crate) fn point_tree(points: &[Point3<f64>]) -> Option<ImmutableKdTree<f64, 3>> {
    if points.is_empty() {
        return None;
    }
    let coords: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
    Some(ImmutableKdTree::new_from_slice(&coords))
}

/// Up to `n` nearest items as `(index, distance)`, ordered by distance and
/// then index so equidistant neighbours come back in a stable order.
pub(crate) fn nearest_n(
    tree: &ImmutableKdTree<f64, 3>,
    query: &Point3<f64>,
    n: usize,
) -> Vec<(usize, f64)> {
    if n == 0 {
        return Vec::new();
    }
    let mut found: Vec<(usize, f64)> = tree
        .nearest_n::<SquaredEuclidean>(&[query.x, query.y, query.z], n)
        .into_iter()
        .map(|nn| (nn.item as usize, nn.distance))
        .collect();
    found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    found
        .into_iter()
        .map(|(i, d2)| (i, d2.sqrt()))
        .collect()
}

/// Face normals with nearest-face lookup by position
#[derive(Debug, Clone)]
pub struct FaceNormalIndex {
    tree: Option<ImmutableKdTree<f64, 3>>,
    normals: Vec<Vector3<f64>>,
}

impl FaceNormalIndex {
    /// How many nearby faces to try before giving up on degenerate ones.
    const SEARCH_DEPTH: usize = 8;

    pub fn new(mesh: &Mesh) -> Self {
        let centroids: Vec<Point3<f64>> = (0..mesh.face_count())
            .filter_map(|i| mesh.face_centroid(i))
            .collect();
        Self {
            tree: point_tree(&centroids),
            normals: MeshAnalyzer.estimate_normals(mesh),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normals.is_empty()
    }

    /// Normal of the closest non-degenerate face, if any is near.
    pub fn normal_near(&self, point: &Point3<f64>) -> Option<Vector3<f64>> {
        let tree = self.tree.as_ref()?;
        nearest_n(tree, point, Self::SEARCH_DEPTH)
            .into_iter()
            .filter_map(|(i, _)| self.normals.get(i).copied())
            .find(|n| n.norm_squared() > 0.0)
    }
}

/// Mesh summary for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryReport {
    pub vertex_count: usize,
    pub face_count: usize,
    pub degenerate_faces: usize,
    pub bounds_min: Option<[f64; 3]>,
    pub bounds_max: Option<[f64; 3]>,
    pub size: Option<[f64; 3]>,
    pub center: Option<[f64; 3]>,
    pub surface_area: f64,
    pub signed_volume: f64,
    /// Mean planarity ratio
    pub mean_curvature: f64,
    pub max_curvature: f64,
    pub source_unit: LengthUnit,
    pub cad_system: Option<String>,
    /// Peak contact pressure at the target force (MPa), with force control
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_pressure: Option<f64>,
}

/// Peak Hertz contact pressure in MPa for a tool of `tool_radius` mm pressed
/// with `force` N onto a surface of `curvature` 1/mm, assuming steel on both
/// sides.
///
/// A flat or concave surface (`curvature <= 0`) gives the mean pressure over
/// the tool face instead.
pub fn contact_pressure(tool_radius: f64, force: f64, curvature: f64) -> Result<f64> {
    ensure_positive("tool_radius", tool_radius)?;
    ensure_non_negative("force", force)?;

    if curvature <= 0.0 || !curvature.is_finite() {
        return Ok(force / (PI * tool_radius * tool_radius));
    }

    let effective_radius = 1.0 / curvature;
    let contact_radius = (3.0 * force * effective_radius / (4.0 * STEEL_MODULUS)).cbrt();
    if contact_radius == 0.0 {
        return Ok(0.0);
    }
    Ok(1.5 * force / (PI * contact_radius * contact_radius))
}

/// Rough surface curvature (1/mm) from the part size: the inverse of a tenth
/// of the mean bounding-box edge. `None` for an empty or point-like mesh.
pub fn nominal_curvature(mesh: &Mesh) -> Option<f64> {
    let size = mesh.bounds()?.size();
    let mean = (size.x + size.y + size.z) / 3.0;
    (mean > 0.0).then(|| 1.0 / (mean * NOMINAL_RADIUS_FRACTION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid(n: usize, z: impl Fn(f64, f64) -> f64) -> Mesh {
        let mut vertices = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let (x, y) = (i as f64, j as f64);
                vertices.push(Point3::new(x, y, z(x, y)));
            }
        }
        let mut faces = Vec::new();
        for i in 0..n - 1 {
            for j in 0..n - 1 {
                let a = i * n + j;
                faces.push([a, a + n, a + n + 1]);
                faces.push([a, a + n + 1, a + 1]);
            }
        }
        Mesh::new(vertices, faces).unwrap()
    }

    #[test]
    fn test_flat_grid_has_zero_curvature() {
        let mesh = grid(6, |_, _| 0.0);
        let field = MeshAnalyzer.estimate_curvature(&mesh, 8);
        assert_eq!(field.len(), mesh.vertex_count());
        assert!(field.values().iter().all(|&c| c.abs() < 1e-9));
    }

    #[test]
    fn test_bumpy_surface_has_positive_curvature() {
        let mesh = grid(6, |x, y| ((x * 1.7).sin() + (y * 2.3).cos()) * 2.0);
        let field = MeshAnalyzer.estimate_curvature(&mesh, 8);
        assert!(field.max() > 0.0);
        assert!(field.values().iter().all(|&c| (0.0..=1.0).contains(&c)));
    }

    #[test]
    fn test_too_few_neighbors_is_zero() {
        let mesh = Mesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 1.0),
            ],
            vec![[0, 1, 2]],
        )
        .unwrap();
        let field = MeshAnalyzer.estimate_curvature(&mesh, 10);
        assert_eq!(field.values(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_empty_mesh_gives_empty_field() {
        let field = MeshAnalyzer.estimate_curvature(&Mesh::empty(), 10);
        assert!(field.is_empty());
        assert_eq!(field.mean(), 0.0);
    }

    #[test]
    fn test_normals_follow_winding() {
        let mesh = grid(2, |_, _| 0.0);
        let normals = MeshAnalyzer.estimate_normals(&mesh);
        assert_eq!(normals.len(), 2);
        for n in normals {
            assert!((n - Vector3::z()).norm() < 1e-12);
        }
    }

    #[test]
    fn test_degenerate_face_gives_zero_normal() {
        let mesh = Mesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
            ],
            vec![[0, 1, 2]],
        )
        .unwrap();
        let normals = MeshAnalyzer.estimate_normals(&mesh);
        assert_eq!(normals, vec![Vector3::zeros()]);
        assert!(FaceNormalIndex::new(&mesh)
            .normal_near(&Point3::origin())
            .is_none());
    }

    #[test]
    fn test_report() {
        let mesh = grid(3, |_, _| 1.0);
        let field = MeshAnalyzer.estimate_curvature(&mesh, 4);
        let report = MeshAnalyzer.report(&mesh, &field);
        assert_eq!(report.vertex_count, 9);
        assert_eq!(report.face_count, 8);
        assert_eq!(report.bounds_min, Some([0.0, 0.0, 1.0]));
        assert_eq!(report.size, Some([2.0, 2.0, 0.0]));
        assert!((report.surface_area - 4.0).abs() < 1e-9);
        assert_eq!(report.degenerate_faces, 0);
    }

    #[test]
    fn test_nearest_n_on_flat_grid_is_ordered() {
        let points: Vec<_> = (0..20)
            .flat_map(|i| (0..20).map(move |j| Point3::new(i as f64, j as f64, 0.0)))
            .collect();
        let tree = point_tree(&points).unwrap();
        let found = nearest_n(&tree, &Point3::new(7.0, 3.0, 0.0), 5);

        assert_eq!(found[0], (7 * 20 + 3, 0.0));
        // Four neighbours at distance 1, in index order
        let ring: Vec<usize> = found[1..].iter().map(|&(i, _)| i).collect();
        assert_eq!(ring, vec![6 * 20 + 3, 7 * 20 + 2, 7 * 20 + 4, 8 * 20 + 3]);
        assert!(found[1..].iter().all(|&(_, d)| (d - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_point_tree_of_nothing() {
        assert!(point_tree(&[]).is_none());
    }

    #[test]
    fn test_curvature_is_repeatable_on_coplanar_duplicates() {
        let mut mesh = grid(8, |_, _| 0.0);
        let doubled: Vec<_> = mesh.vertices().iter().chain(mesh.vertices()).copied().collect();
        mesh = Mesh::new(doubled, vec![]).unwrap();
        let first = MeshAnalyzer.estimate_curvature(&mesh, 10);
        let second = MeshAnalyzer.estimate_curvature(&mesh, 10);
        assert_eq!(first, second);
        assert!(first.values().iter().all(|&c| c.abs() < 1e-9));
    }

    #[test]
    fn test_contact_pressure_flat_is_mean_pressure() {
        let p = contact_pressure(4.0, 30.0, 0.0).unwrap();
        assert!((p - 30.0 / (PI * 16.0)).abs() < 1e-12);
        assert_eq!(contact_pressure(4.0, 30.0, -0.5).unwrap(), p);
    }

    #[test]
    fn test_contact_pressure_rises_with_curvature() {
        let gentle = contact_pressure(4.0, 30.0, 0.01).unwrap();
        let sharp = contact_pressure(4.0, 30.0, 0.5).unwrap();
        assert!(gentle > contact_pressure(4.0, 30.0, 0.0).unwrap());
        assert!(sharp > gentle);

        // R = 20 mm: a = cbrt(3 * 30 * 20 / (4 * 210000))
        let a = (1800.0f64 / 840_000.0).cbrt();
        let expected = 45.0 / (PI * a * a);
        assert!((contact_pressure(4.0, 30.0, 0.05).unwrap() - expected).abs() < 1e-9);

        assert_eq!(contact_pressure(4.0, 0.0, 0.05).unwrap(), 0.0);
    }

    #[test]
    fn test_contact_pressure_rejects_bad_inputs() {
        assert!(matches!(
            contact_pressure(0.0, 30.0, 0.1),
            Err(polishkit_core::PolishError::InvalidParameter { .. })
        ));
        assert!(contact_pressure(4.0, -1.0, 0.1).is_err());
    }

    #[test]
    fn test_nominal_curvature_from_bounds() {
        let mesh = grid(3, |_, _| 0.0);
        let k = nominal_curvature(&mesh).unwrap();
        assert!((k - 7.5).abs() < 1e-12);
        assert_eq!(nominal_curvature(&Mesh::empty()), None);
    }

    proptest! {
        #[test]
        fn prop_nearest_n_matches_brute_force_distances(
            coords in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0, -5.0f64..5.0), 1..120),
            q in (-60.0f64..60.0, -60.0f64..60.0, -10.0f64..10.0),
            n in 1usize..12,
        ) {
            let points: Vec<_> = coords.iter().map(|&(x, y, z)| Point3::new(x, y, z)).collect();
            let query = Point3::new(q.0, q.1, q.2);
            let tree = point_tree(&points).unwrap();

            let mut expected: Vec<f64> = points.iter().map(|p| (p - query).norm()).collect();
            expected.sort_by(f64::total_cmp);
            expected.truncate(n);

            let found: Vec<f64> = nearest_n(&tree, &query, n).iter().map(|&(_, d)| d).collect();
            prop_assert_eq!(found.len(), expected.len());
            for (a, b) in found.iter().zip(&expected) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }

        #[test]
        fn prop_curvature_in_unit_range(
            coords in prop::collection::vec((-20.0f64..20.0, -20.0f64..20.0, -20.0f64..20.0), 0..80),
            k in 1usize..16,
        ) {
            let vertices: Vec<_> = coords.iter().map(|&(x, y, z)| Point3::new(x, y, z)).collect();
            let mesh = Mesh::new(vertices, vec![]).unwrap();
            let field = MeshAnalyzer.estimate_curvature(&mesh, k);
            prop_assert_eq!(field.len(), mesh.vertex_count());
            prop_assert!(field.values().iter().all(|&c| (0.0..=1.0).contains(&c)));
        }
    }
}
