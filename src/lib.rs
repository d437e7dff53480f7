//! # PolishKit
//!
//! Turns an STL surface into an ABB RAPID program for two-stage robotic
//! polishing: a rough pass followed by a fine pass.
//!
//! ## Architecture
//!
//! PolishKit is organized as a workspace with multiple crates:
//!
//! 1. **polishkit-core** - Error taxonomy, length units, stage and strategy enums
//! 2. **polishkit-settings** - Pipeline configuration, validation, persistence
//! 3. **polishkit-toolpath** - STL import, curvature analysis, path planning, poses
//! 4. **polishkit-rapid** - RAPID module generation and structural validation
//! 5. **polishkit** - The [`PolishingCore`] façade and the command-line binary
//!
//! ## Pipeline
//!
//! load → analyze → plan (rough, fine) → generate

pub mod session;

pub use polishkit_core::{
    BlendZone, CurvatureBias, LengthUnit, PathStrategy, PolishError, Result, ScanDirection, Stage,
};
pub use polishkit_rapid::{validate_program, RapidGenerator, RapidProgram, ValidationReport};
pub use polishkit_settings::{GenerationContext, PipelineConfig};
pub use polishkit_toolpath::{
    CancelFlag, GeometryReport, Mesh, PathPlan, PathPoint, PathSegment, StlImporter, StlMetadata,
};
pub use session::{PlanSummary, PolishingCore, StageSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Logs go to stderr so a program printed on stdout stays clean. The level
/// defaults to `info` and follows `RUST_LOG` when set.
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_line_number(true),
            )
            .try_init()?;
    }

    Ok(())
}
