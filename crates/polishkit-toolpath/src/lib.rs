//! # PolishKit Toolpath
//!
//! Geometry side of the polishing pipeline: STL import with header hint
//! sniffing, curvature and normal analysis, tool poses, tour sequencing and
//! the three path strategies.
//!
//! Everything here is a stateless service taking data by reference and
//! returning new data.

pub mod analysis;
pub mod cancel;
pub mod enricher;
pub mod mesh;
pub mod metadata;
pub mod path;
pub mod planner;
pub mod pose;
pub mod sequencer;

pub use analysis::{
    contact_pressure, nominal_curvature, CurvatureField, FaceNormalIndex, GeometryReport,
    MeshAnalyzer,
};
pub use cancel::CancelFlag;
pub use enricher::PathEnricher;
pub use mesh::{Mesh, MeshBounds, StlImporter};
pub use metadata::{HeaderMetadataReader, MetadataReader, StlFormat, StlMetadata};
pub use path::{PathPlan, PathPoint, PathSegment};
pub use planner::{coverage, PathPlanner, PlannerParams, RawSegment, SegmentTag, SpiralParams};
pub use pose::{quaternion_components, PoseCalculator};
pub use sequencer::{tour_length, PathSequencer, TourStrategy};
