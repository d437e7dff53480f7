//! Pipeline configuration for PolishKit
//!
//! Every recognised option is an explicit, typed field. Values are checked by
//! [`PipelineConfig::validate`] and frozen into a [`GenerationContext`], which
//! is the only form the planner and code generator accept. Nothing is read
//! from ambient or global state.
//!
//! Configuration is organised into:
//! - Program identity (module name, robot model, tool name)
//! - Tool geometry (diameter, length, mass)
//! - Per-stage path settings (strategy, spacing, scan direction, speed)
//! - Feature toggles (force control, motion optimisation, error recovery)
//! - Analysis and spiral tuning

use crate::error::{SettingsError, SettingsResult};
use polishkit_core::error::{ensure_non_negative, ensure_positive};
use polishkit_core::{CurvatureBias, LengthUnit, PathStrategy, PolishError, ScanDirection, Stage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum identifier length accepted by the controller.
const MAX_IDENTIFIER_LEN: usize = 32;

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the emitted module
    pub program_name: String,
    /// Robot model written into the program header
    pub robot_model: String,
    /// Identifier of the tooldata declaration
    pub tool_name: String,
    /// Polishing tool diameter (mm)
    pub tool_diameter: f64,
    /// Tool length along the flange Z axis (mm)
    pub tool_length: f64,
    /// Tool mass (kg)
    pub tool_mass: f64,

    /// Rough stage strategy
    pub strategy: PathStrategy,
    /// Rough pass spacing as a fraction of the tool radius
    pub stepover_ratio: f64,
    /// Rough stage scan direction (parallel strategy only)
    pub scan_direction: ScanDirection,
    /// Fine stage strategy
    pub fine_strategy: PathStrategy,
    /// Fine pass spacing as a fraction of the tool diameter
    pub fine_spacing_ratio: f64,
    /// Fine stage scan direction (parallel strategy only)
    pub fine_scan_direction: ScanDirection,

    /// Rough feed speed (mm/s)
    pub rough_speed: f64,
    /// Fine feed speed (mm/s)
    pub fine_speed: f64,
    /// Lift-off height above each segment's entry and exit points (mm)
    pub safety_height: f64,

    /// Emit force-control procedures and activate them in each stage
    pub enable_force_control: bool,
    /// Emit motion-optimisation procedures and activate them in each stage
    pub enable_motion_optimization: bool,
    /// Contact force setpoint (N), only meaningful with force control
    pub target_force: f64,
    /// Emit an `ErrorHandler` procedure that backs off after a collision stop
    pub enable_error_recovery: bool,
    /// Back-off distance along the tool Z axis after a collision stop (mm)
    pub recovery_retract: f64,

    /// Neighbour count for curvature estimation
    pub curvature_neighbors: usize,
    /// Visiting bias inside adaptive bands
    pub curvature_bias: CurvatureBias,
    /// Number of spiral turns
    pub spiral_revolutions: u32,
    /// Spiral samples per turn
    pub spiral_points_per_revolution: u32,
    /// Mesh vertices blended when projecting a spiral sample
    pub spiral_projection_neighbors: usize,
    /// Reorder whole segments by nearest start point
    pub reorder_segments: bool,

    /// Force the source unit instead of trusting header hints
    pub force_unit: Option<LengthUnit>,
    /// Free text written into the header, e.g. a generation timestamp
    pub timestamp: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            program_name: "Polishing_Module".to_string(),
            robot_model: "IRB 2600-12/1.85".to_string(),
            tool_name: "tPolishingTool".to_string(),
            tool_diameter: 8.0,
            tool_length: 200.0,
            tool_mass: 0.5,
            strategy: PathStrategy::Adaptive,
            stepover_ratio: 0.5,
            scan_direction: ScanDirection::X,
            fine_strategy: PathStrategy::Parallel,
            fine_spacing_ratio: 0.3,
            fine_scan_direction: ScanDirection::Y,
            rough_speed: 300.0,
            fine_speed: 200.0,
            safety_height: 50.0,
            enable_force_control: false,
            enable_motion_optimization: false,
            target_force: 30.0,
            enable_error_recovery: false,
            recovery_retract: 10.0,
            curvature_neighbors: 10,
            curvature_bias: CurvatureBias::Ascending,
            spiral_revolutions: 5,
            spiral_points_per_revolution: 20,
            spiral_projection_neighbors: 3,
            reorder_segments: false,
            force_unit: None,
            timestamp: None,
        }
    }
}

impl PipelineConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rough strategy by name, rejecting unknown names.
    pub fn with_strategy_name(mut self, name: &str) -> Result<Self, PolishError> {
        self.strategy = name.parse()?;
        Ok(self)
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = match extension(path).as_deref() {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(SettingsError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ))
            }
        };

        config.validate()?;
        debug!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match extension(path).as_deref() {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            other => {
                return Err(SettingsError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ))
            }
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), PolishError> {
        validate_identifier("program_name", &self.program_name)?;
        validate_identifier("tool_name", &self.tool_name)?;
        validate_single_line("robot_model", &self.robot_model)?;
        if let Some(ts) = &self.timestamp {
            validate_single_line("timestamp", ts)?;
        }

        ensure_positive("tool_diameter", self.tool_diameter)?;
        ensure_positive("tool_length", self.tool_length)?;
        ensure_positive("tool_mass", self.tool_mass)?;
        ensure_positive("stepover_ratio", self.stepover_ratio)?;
        ensure_positive("fine_spacing_ratio", self.fine_spacing_ratio)?;
        ensure_positive("rough_speed", self.rough_speed)?;
        ensure_positive("fine_speed", self.fine_speed)?;
        ensure_non_negative("safety_height", self.safety_height)?;

        if self.enable_force_control {
            ensure_positive("target_force", self.target_force)?;
        }
        if self.enable_error_recovery {
            ensure_positive("recovery_retract", self.recovery_retract)?;
        }

        if self.curvature_neighbors == 0 {
            return Err(PolishError::invalid_parameter(
                "curvature_neighbors",
                "must be at least 1",
            ));
        }
        if self.spiral_revolutions == 0 {
            return Err(PolishError::invalid_parameter(
                "spiral_revolutions",
                "must be at least 1",
            ));
        }
        if self.spiral_points_per_revolution == 0 {
            return Err(PolishError::invalid_parameter(
                "spiral_points_per_revolution",
                "must be at least 1",
            ));
        }
        if self.spiral_projection_neighbors == 0 {
            return Err(PolishError::invalid_parameter(
                "spiral_projection_neighbors",
                "must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Default location of the config file in the platform config directory.
pub fn default_config_path() -> SettingsResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("polishkit").join("config.toml"))
        .ok_or_else(|| SettingsError::ConfigDirectory("no platform config directory".to_string()))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

fn validate_identifier(name: &str, value: &str) -> Result<(), PolishError> {
    let mut chars = value.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_valid = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !starts_with_letter || !rest_valid {
        return Err(PolishError::invalid_parameter(
            name,
            format!(
                "'{}' is not a valid identifier (letter followed by letters, digits or '_')",
                value
            ),
        ));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(PolishError::invalid_parameter(
            name,
            format!("'{}' exceeds {} characters", value, MAX_IDENTIFIER_LEN),
        ));
    }
    Ok(())
}

fn validate_single_line(name: &str, value: &str) -> Result<(), PolishError> {
    if value.contains(['\n', '\r', '"']) {
        return Err(PolishError::invalid_parameter(
            name,
            "must be a single line without quotes",
        ));
    }
    Ok(())
}

/// Path settings resolved for one stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSettings {
    pub stage: Stage,
    pub strategy: PathStrategy,
    /// Absolute distance between adjacent passes (mm)
    pub spacing: f64,
    pub scan_direction: ScanDirection,
    /// Feed speed (mm/s)
    pub speed: f64,
}

/// Validated, immutable parameter bundle consumed by planning and codegen.
///
/// The only way to obtain one is [`GenerationContext::from_config`], so every
/// holder can rely on the constraints checked there.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationContext {
    config: PipelineConfig,
}

impl GenerationContext {
    /// Validate `config` and freeze it.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PolishError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tool_radius(&self) -> f64 {
        self.config.tool_diameter / 2.0
    }

    /// Target force when force control is enabled.
    pub fn force_control(&self) -> Option<f64> {
        self.config
            .enable_force_control
            .then_some(self.config.target_force)
    }

    /// Back-off distance when error recovery is enabled.
    pub fn error_recovery(&self) -> Option<f64> {
        self.config
            .enable_error_recovery
            .then_some(self.config.recovery_retract)
    }

    /// Resolve strategy, spacing, direction and speed for `stage`.
    pub fn stage(&self, stage: Stage) -> StageSettings {
        let c = &self.config;
        match stage {
            Stage::Rough => StageSettings {
                stage,
                strategy: c.strategy,
                spacing: self.tool_radius() * c.stepover_ratio,
                scan_direction: c.scan_direction,
                speed: c.rough_speed,
            },
            Stage::Fine => StageSettings {
                stage,
                strategy: c.fine_strategy,
                spacing: c.tool_diameter * c.fine_spacing_ratio,
                scan_direction: c.fine_scan_direction,
                speed: c.fine_speed,
            },
        }
    }
}

impl Default for GenerationContext {
    fn default() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let config = PipelineConfig {
            stepover_ratio: 0.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PolishError::InvalidParameter { ref name, .. } if name == "stepover_ratio"));

        let config = PipelineConfig {
            rough_speed: -10.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            safety_height: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_target_force_only_checked_when_enabled() {
        let mut config = PipelineConfig {
            target_force: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.enable_force_control = true;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PolishError::InvalidParameter { ref name, .. } if name == "target_force"));
    }

    #[test]
    fn test_identifier_validation() {
        let config = PipelineConfig {
            program_name: "1st module".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            tool_name: "t".repeat(40),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            robot_model: "IRB\"bad".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_name() {
        let config = PipelineConfig::new().with_strategy_name("spiral").unwrap();
        assert_eq!(config.strategy, PathStrategy::Spiral);

        let err = PipelineConfig::new().with_strategy_name("invalid").unwrap_err();
        assert!(matches!(err, PolishError::InvalidParameter { .. }));
    }

    #[test]
    fn test_stage_resolution() {
        let ctx = GenerationContext::from_config(&PipelineConfig::default()).unwrap();

        let rough = ctx.stage(Stage::Rough);
        assert_eq!(rough.strategy, PathStrategy::Adaptive);
        assert_eq!(rough.spacing, 2.0);
        assert_eq!(rough.speed, 300.0);

        let fine = ctx.stage(Stage::Fine);
        assert_eq!(fine.strategy, PathStrategy::Parallel);
        assert_eq!(fine.scan_direction, ScanDirection::Y);
        assert!((fine.spacing - 2.4).abs() < 1e-12);
        assert_eq!(fine.speed, 200.0);
    }

    #[test]
    fn test_context_rejects_invalid_config() {
        let config = PipelineConfig {
            tool_diameter: 0.0,
            ..Default::default()
        };
        assert!(GenerationContext::from_config(&config).is_err());
    }

    #[test]
    fn test_force_control_accessor() {
        let config = PipelineConfig {
            enable_force_control: true,
            target_force: 25.0,
            ..Default::default()
        };
        let ctx = GenerationContext::from_config(&config).unwrap();
        assert_eq!(ctx.force_control(), Some(25.0));
        assert_eq!(GenerationContext::default().force_control(), None);
    }

    #[test]
    fn test_error_recovery_accessor_and_validation() {
        let mut config = PipelineConfig {
            enable_error_recovery: true,
            recovery_retract: 15.0,
            ..Default::default()
        };
        let ctx = GenerationContext::from_config(&config).unwrap();
        assert_eq!(ctx.error_recovery(), Some(15.0));
        assert_eq!(GenerationContext::default().error_recovery(), None);

        config.recovery_retract = 0.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PolishError::InvalidParameter { ref name, .. } if name == "recovery_retract"));
    }
}
