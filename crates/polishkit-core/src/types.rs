//! Shared enumerations describing a polishing job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PolishError;

/// Polishing pass. Rough always runs before fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Rough,
    Fine,
}

impl Stage {
    /// Both stages in execution order.
    pub const ALL: [Stage; 2] = [Stage::Rough, Stage::Fine];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rough => "rough",
            Self::Fine => "fine",
        }
    }

    /// Blend zone class used for every move of this stage.
    pub fn blend_zone(self) -> BlendZone {
        match self {
            Self::Rough => BlendZone::Medium,
            Self::Fine => BlendZone::Fine,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PolishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rough" => Ok(Self::Rough),
            "fine" => Ok(Self::Fine),
            _ => Err(PolishError::invalid_parameter(
                "stage",
                format!("unknown stage '{}'", s),
            )),
        }
    }
}

/// Path generation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStrategy {
    /// Horizontal Z bands, each ordered by the sequencer
    Adaptive,
    /// Straight scan lines at a fixed spacing
    Parallel,
    /// Shrinking, rising spiral projected onto the surface
    Spiral,
}

impl fmt::Display for PathStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adaptive => write!(f, "adaptive"),
            Self::Parallel => write!(f, "parallel"),
            Self::Spiral => write!(f, "spiral"),
        }
    }
}

impl FromStr for PathStrategy {
    type Err = PolishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "adaptive" => Ok(Self::Adaptive),
            "parallel" => Ok(Self::Parallel),
            "spiral" => Ok(Self::Spiral),
            _ => Err(PolishError::invalid_parameter(
                "strategy",
                format!("unknown strategy '{}' (expected adaptive, parallel or spiral)", s),
            )),
        }
    }
}

/// Scan direction for the parallel strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanDirection {
    /// 0°: lines run along X, stepped across Y
    X,
    /// 90°: lines run along Y, stepped across X
    Y,
}

impl Default for ScanDirection {
    fn default() -> Self {
        Self::X
    }
}

impl ScanDirection {
    /// Build from an angle in degrees. Only 0° and 90° are supported.
    pub fn from_degrees(angle: f64) -> Result<Self, PolishError> {
        if angle == 0.0 {
            Ok(Self::X)
        } else if angle == 90.0 {
            Ok(Self::Y)
        } else {
            Err(PolishError::invalid_parameter(
                "scan_direction",
                format!("unsupported scan angle {}° (expected 0 or 90)", angle),
            ))
        }
    }

    /// Coordinate index points are ordered by along a scan line.
    pub fn along_axis(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
        }
    }

    /// Coordinate index the scan lines are stepped across.
    pub fn across_axis(self) -> usize {
        match self {
            Self::X => 1,
            Self::Y => 0,
        }
    }

    pub fn degrees(self) -> f64 {
        match self {
            Self::X => 0.0,
            Self::Y => 90.0,
        }
    }
}

impl fmt::Display for ScanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => write!(f, "x"),
            Self::Y => write!(f, "y"),
        }
    }
}

/// Motion blend zone class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendZone {
    Fine,
    Medium,
    Large,
}

impl BlendZone {
    /// Name of the zonedata constant declared for this class.
    pub fn rapid_name(self) -> &'static str {
        match self {
            Self::Fine => "zFine",
            Self::Medium => "zMedium",
            Self::Large => "zLarge",
        }
    }
}

/// How curvature biases the visiting order inside an adaptive band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurvatureBias {
    /// Keep vertex order
    None,
    /// Seed the band tour at the flattest point
    Ascending,
    /// Seed the band tour at the most curved point
    Descending,
}

impl Default for CurvatureBias {
    fn default() -> Self {
        Self::Ascending
    }
}
