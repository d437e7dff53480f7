//! Triangle mesh and STL import

use nalgebra::{Point3, Vector3};
use polishkit_core::{LengthUnit, PolishError, Result};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

use crate::metadata::{HeaderMetadataReader, MetadataReader, StlMetadata};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBounds {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl MeshBounds {
    /// Bounds of a point set, `None` when the set is empty.
    pub fn from_points(points: &[Point3<f64>]) -> Option<Self> {
        let first = points.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in &points[1..] {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        Some(Self { min, max })
    }

    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Extent along one axis (0 = X, 1 = Y, 2 = Z).
    pub fn extent(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }
}

/// Indexed triangle mesh, always in millimetres
#[derive(Debug, Clone)]
pub struct Mesh {
    vertices: Vec<Point3<f64>>,
    faces: Vec<[usize; 3]>,
    metadata: StlMetadata,
    source_unit: LengthUnit,
}

impl Mesh {
    /// Build a mesh, rejecting faces that index past the vertex array.
    pub fn new(vertices: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Result<Self> {
        if let Some((face_idx, face)) = faces
            .iter()
            .enumerate()
            .find(|(_, f)| f.iter().any(|&v| v >= vertices.len()))
        {
            return Err(PolishError::invalid_geometry(format!(
                "face {} references vertex {:?} but the mesh has {} vertices",
                face_idx,
                face,
                vertices.len()
            )));
        }

        if let Some(idx) = vertices
            .iter()
            .position(|v| !(v.x.is_finite() && v.y.is_finite() && v.z.is_finite()))
        {
            return Err(PolishError::invalid_geometry(format!(
                "vertex {} has a non-finite coordinate",
                idx
            )));
        }

        Ok(Self {
            vertices,
            faces,
            metadata: StlMetadata::default(),
            source_unit: LengthUnit::Millimeter,
        })
    }

    /// A mesh with no vertices or faces.
    pub fn empty() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            metadata: StlMetadata::default(),
            source_unit: LengthUnit::Millimeter,
        }
    }

    /// Convert an `stl_io` indexed mesh.
    pub fn from_stl_mesh(stl_mesh: &stl_io::IndexedMesh) -> Result<Self> {
        let vertices = stl_mesh
            .vertices
            .iter()
            .map(|v| Point3::new(f64::from(v[0]), f64::from(v[1]), f64::from(v[2])))
            .collect();
        let faces = stl_mesh.faces.iter().map(|f| f.vertices).collect();
        Self::new(vertices, faces)
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    pub fn metadata(&self) -> &StlMetadata {
        &self.metadata
    }

    /// Unit the raw file values were expressed in before normalisation.
    pub fn source_unit(&self) -> LengthUnit {
        self.source_unit
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn bounds(&self) -> Option<MeshBounds> {
        MeshBounds::from_points(&self.vertices)
    }

    /// Mean vertex position.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.vertices.is_empty() {
            return None;
        }
        let sum = self
            .vertices
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + v.coords);
        Some(Point3::from(sum / self.vertices.len() as f64))
    }

    /// Corner positions of one face.
    pub fn triangle(&self, face: usize) -> Option<[Point3<f64>; 3]> {
        let [a, b, c] = *self.faces.get(face)?;
        Some([self.vertices[a], self.vertices[b], self.vertices[c]])
    }

    /// Centroid of one face.
    pub fn face_centroid(&self, face: usize) -> Option<Point3<f64>> {
        let [a, b, c] = self.triangle(face)?;
        Some(Point3::from((a.coords + b.coords + c.coords) / 3.0))
    }

    pub fn surface_area(&self) -> f64 {
        (0..self.faces.len())
            .filter_map(|i| self.triangle(i))
            .map(|[a, b, c]| (b - a).cross(&(c - a)).norm() * 0.5)
            .sum()
    }

    /// Signed volume from the divergence theorem; only meaningful for closed meshes.
    pub fn signed_volume(&self) -> f64 {
        (0..self.faces.len())
            .filter_map(|i| self.triangle(i))
            .map(|[a, b, c]| a.coords.dot(&b.coords.cross(&c.coords)) / 6.0)
            .sum()
    }

    fn scale(&mut self, factor: f64) {
        for v in &mut self.vertices {
            v.coords *= factor;
        }
    }
}

/// Loads STL data and normalises it to millimetres.
///
/// Scale is applied only when the caller forces a unit or the header carries
/// an explicit `UNITS` hint. Headers without hints are taken as millimetres.
#[derive(Debug, Clone, Default)]
pub struct StlImporter<R = HeaderMetadataReader> {
    force_unit: Option<LengthUnit>,
    reader: R,
}

impl StlImporter<HeaderMetadataReader> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: MetadataReader> StlImporter<R> {
    /// Use a different metadata reader for file imports.
    pub fn with_reader(reader: R) -> Self {
        Self {
            force_unit: None,
            reader,
        }
    }

    /// Treat the input as `unit` regardless of header hints.
    pub fn with_force_unit(mut self, unit: Option<LengthUnit>) -> Self {
        self.force_unit = unit;
        self
    }

    /// Import an STL file.
    pub fn import_file(&self, path: &Path) -> Result<Mesh> {
        debug!("Importing STL file: {}", path.display());

        let metadata = self.reader.read_metadata(path)?;
        let data = std::fs::read(path)?;
        let mesh = self.parse(&data, metadata)?;

        info!(
            "Loaded {}: {} vertices, {} faces ({} -> mm)",
            path.display(),
            mesh.vertex_count(),
            mesh.face_count(),
            mesh.source_unit
        );
        Ok(mesh)
    }

    /// Import STL data already held in memory.
    pub fn import_bytes(&self, data: &[u8]) -> Result<Mesh> {
        debug!("Importing STL from memory ({} bytes)", data.len());
        let metadata = StlMetadata::from_bytes(data, data.len() as u64);
        self.parse(data, metadata)
    }

    fn parse(&self, data: &[u8], metadata: StlMetadata) -> Result<Mesh> {
        let mut cursor = Cursor::new(data);
        let stl = stl_io::read_stl(&mut cursor)
            .map_err(|e| PolishError::UnsupportedFormat(format!("failed to parse STL: {}", e)))?;
        debug!("STL contains {} faces", stl.faces.len());

        let mut mesh = Mesh::from_stl_mesh(&stl)?;

        let unit = self.force_unit.or(metadata.unit).unwrap_or_default();
        let factor = unit.to_mm_factor();
        if factor != 1.0 {
            debug!("Scaling mesh from {} by factor {}", unit, factor);
            mesh.scale(factor);
        }
        mesh.source_unit = unit;
        mesh.metadata = metadata;

        Ok(mesh)
    }
}
