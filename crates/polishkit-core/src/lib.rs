//! # PolishKit Core
//!
//! Core types shared by every PolishKit crate: the pipeline error taxonomy,
//! length-unit normalisation and the small enumerations that describe a
//! polishing job (stages, path strategies, scan directions, blend zones).

pub mod error;
pub mod types;
pub mod units;

pub use error::{PolishError, Result};
pub use types::{BlendZone, CurvatureBias, PathStrategy, ScanDirection, Stage};
pub use units::LengthUnit;
