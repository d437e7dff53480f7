//! Pipeline façade
//!
//! [`PolishingCore`] owns the loaded mesh and the current plan for one
//! load → analyze → plan → enrich → generate cycle. Every mutating step takes
//! `&mut self`, so a session cannot run two steps at once; callers wanting a
//! background run move the session to a worker and keep a [`CancelFlag`].

use polishkit_core::{PathStrategy, PolishError, Result, Stage};
use polishkit_rapid::{RapidGenerator, RapidProgram};
use polishkit_settings::{GenerationContext, PipelineConfig};
use polishkit_toolpath::{
    contact_pressure, coverage, nominal_curvature, CancelFlag, CurvatureField, GeometryReport, Mesh, MeshAnalyzer, PathEnricher,
    PathPlan, PathPlanner, PathSegment, PlannerParams, RawSegment, SpiralParams, StlImporter,
    TourStrategy,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

type StageResults<T> = BTreeMap<Stage, Result<Vec<T>>>;

/// Result of one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub strategy: PathStrategy,
    pub segments: usize,
    pub points: usize,
    /// Why the stage failed, if it did
    pub error: Option<String>,
}

/// Outcome of [`PolishingCore::plan`] or [`PolishingCore::enrich`]
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub stages: Vec<StageSummary>,
    /// Fraction of mesh vertices within reach of a planned point
    pub coverage: f64,
}

impl PlanSummary {
    pub fn is_complete(&self) -> bool {
        self.stages.iter().all(|s| s.error.is_none())
    }
}

/// Orchestrates the polishing pipeline.
#[derive(Debug)]
pub struct PolishingCore {
    ctx: GenerationContext,
    mesh: Option<Mesh>,
    curvature: Option<CurvatureField>,
    raw: StageResults<RawSegment>,
    outcomes: StageResults<PathSegment>,
    plan: PathPlan,
    cancel: CancelFlag,
}

impl PolishingCore {
    /// Create a session, rejecting an invalid configuration up front.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            ctx: GenerationContext::from_config(config)?,
            mesh: None,
            curvature: None,
            raw: BTreeMap::new(),
            outcomes: BTreeMap::new(),
            plan: PathPlan::new(),
            cancel: CancelFlag::new(),
        })
    }

    pub fn context(&self) -> &GenerationContext {
        &self.ctx
    }

    /// Replace the configuration. Any existing plan is discarded.
    pub fn set_config(&mut self, config: &PipelineConfig) -> Result<()> {
        self.ctx = GenerationContext::from_config(config)?;
        self.clear_plan();
        Ok(())
    }

    /// Flag that cancels the running, or next, plan or enrich call.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref()
    }

    /// Load an STL file. The previous model stays in place if loading fails.
    pub fn load_model(&mut self, path: &Path) -> Result<&Mesh> {
        let mesh = StlImporter::new()
            .with_force_unit(self.ctx.config().force_unit)
            .import_file(path)?;
        Ok(self.install(mesh))
    }

    /// Load STL data already in memory.
    pub fn load_bytes(&mut self, data: &[u8]) -> Result<&Mesh> {
        let mesh = StlImporter::new()
            .with_force_unit(self.ctx.config().force_unit)
            .import_bytes(data)?;
        Ok(self.install(mesh))
    }

    /// Use an already-built mesh.
    pub fn load_mesh(&mut self, mesh: Mesh) -> &Mesh {
        self.install(mesh)
    }

    fn install(&mut self, mesh: Mesh) -> &Mesh {
        if mesh.metadata().is_vendor_specific {
            info!(
                "Vendor STL detected: {:?}, part {:?}",
                mesh.metadata().cad_system,
                mesh.metadata().part_name
            );
        }
        self.curvature = None;
        self.clear_plan();
        self.mesh.insert(mesh)
    }

    fn clear_plan(&mut self) {
        self.raw.clear();
        self.outcomes.clear();
        self.plan = PathPlan::new();
    }

    /// Curvature and geometry summary of the loaded model.
    ///
    /// With force control enabled the report also carries the estimated
    /// contact pressure at the target force.
    pub fn analyze(&mut self) -> Result<GeometryReport> {
        let mesh = self.mesh.as_ref().ok_or(PolishError::NoModelLoaded)?;
        let field = MeshAnalyzer.estimate_curvature(mesh, self.ctx.config().curvature_neighbors);
        let mut report = MeshAnalyzer.report(mesh, &field);
        if let (Some(force), Some(curvature)) = (self.ctx.force_control(), nominal_curvature(mesh)) {
            let pressure = contact_pressure(self.ctx.tool_radius(), force, curvature)?;
            info!("Contact pressure at {} N: {:.2} MPa", force, pressure);
            report.contact_pressure = Some(pressure);
        }
        self.curvature = Some(field);
        Ok(report)
    }

    /// Consume a cancel request raised before `step` started.
    fn cancelled_on_entry(&self, step: &str) -> Result<()> {
        self.cancel.check().inspect_err(|_| {
            warn!("{} cancelled before it started", step);
            self.cancel.reset();
        })
    }

    /// Plan raw segments for both stages, analysing first if needed.
    ///
    /// A stage that fails is recorded without discarding the other stage.
    /// Replaces any earlier plan, so [`enrich`](Self::enrich) must follow.
    /// Cancellation leaves the session untouched and clears the flag, as
    /// does finishing normally.
    pub fn plan(&mut self) -> Result<PlanSummary> {
        let mesh = self.mesh.as_ref().ok_or(PolishError::NoModelLoaded)?;
        self.cancelled_on_entry("Planning")?;
        let config = self.ctx.config();
        let curvature = match self.curvature.take() {
            Some(field) => field,
            None => MeshAnalyzer.estimate_curvature(mesh, config.curvature_neighbors),
        };

        let mut raw = BTreeMap::new();
        for stage in Stage::ALL {
            let result = self.plan_stage(mesh, &curvature, stage);
            if let Err(PolishError::Cancelled) = result {
                warn!("Planning cancelled during {} stage", stage);
                self.cancel.reset();
                self.curvature = Some(curvature);
                return Err(PolishError::Cancelled);
            }
            if let Err(e) = &result {
                warn!("{} stage failed to plan: {}", stage, e);
            }
            raw.insert(stage, result);
        }

        let positions: Vec<_> = raw
            .values()
            .flatten()
            .flatten()
            .flat_map(|s| s.points.iter().copied())
            .collect();
        let reach = coverage(mesh, &positions, self.ctx.tool_radius());

        self.curvature = Some(curvature);
        self.raw = raw;
        self.outcomes.clear();
        self.plan = PathPlan::new();
        self.cancel.reset();

        Ok(self.summarize(&self.raw, reach))
    }

    fn plan_stage(
        &self,
        mesh: &Mesh,
        curvature: &CurvatureField,
        stage: Stage,
    ) -> Result<Vec<RawSegment>> {
        let config = self.ctx.config();
        let settings = self.ctx.stage(stage);
        let params = PlannerParams {
            strategy: settings.strategy,
            spacing: settings.spacing,
            scan_direction: settings.scan_direction,
            curvature_bias: config.curvature_bias,
            tour: TourStrategy::NearestNeighbor,
            spiral: SpiralParams {
                revolutions: config.spiral_revolutions,
                points_per_revolution: config.spiral_points_per_revolution,
                projection_neighbors: config.spiral_projection_neighbors,
            },
            reorder_segments: config.reorder_segments,
        };

        PathPlanner
            .plan_with_cancel(mesh, curvature, &params, &self.cancel)
            .map_err(|e| e.in_stage(stage))
    }

    /// Attach poses, speeds and zones to every planned stage, then publish
    /// the result as the current plan in one step.
    ///
    /// Stages that failed to plan stay failed. Cancellation publishes
    /// nothing and clears the flag.
    pub fn enrich(&mut self) -> Result<PlanSummary> {
        let mesh = self.mesh.as_ref().ok_or(PolishError::NoModelLoaded)?;
        self.cancelled_on_entry("Enrichment")?;
        let enricher = PathEnricher::new(mesh);

        let mut outcomes = BTreeMap::new();
        for (&stage, planned) in &self.raw {
            let result = match planned {
                Ok(raw) => {
                    let speed = self.ctx.stage(stage).speed;
                    enricher
                        .enrich_with_cancel(raw, stage, speed, &self.cancel)
                        .map_err(|e| e.in_stage(stage))
                }
                Err(e) => Err(e.clone()),
            };
            if let Err(PolishError::Cancelled) = result {
                warn!("Enrichment cancelled during {} stage", stage);
                self.cancel.reset();
                return Err(PolishError::Cancelled);
            }
            outcomes.insert(stage, result);
        }

        let mut plan = PathPlan::new();
        for (stage, outcome) in &outcomes {
            if let Ok(segments) = outcome {
                plan.insert(*stage, segments.clone());
            }
        }
        let positions: Vec<_> = plan.positions().collect();
        let reach = coverage(mesh, &positions, self.ctx.tool_radius());

        self.outcomes = outcomes;
        self.plan = plan;
        self.cancel.reset();
        info!(
            "Plan ready: {} segments, {} points, coverage {:.1}%",
            self.plan.segment_count(),
            self.plan.point_count(),
            reach * 100.0
        );
        Ok(self.summarize(&self.outcomes, reach))
    }

    fn summarize<T: HasPoints>(&self, results: &StageResults<T>, coverage: f64) -> PlanSummary {
        let stages = Stage::ALL
            .iter()
            .map(|&stage| {
                let strategy = self.ctx.stage(stage).strategy;
                let (segments, points, error) = match results.get(&stage) {
                    Some(Ok(segs)) => (
                        segs.len(),
                        segs.iter().map(HasPoints::point_count).sum(),
                        None,
                    ),
                    Some(Err(e)) => (0, 0, Some(e.to_string())),
                    None => (0, 0, Some("not planned".to_string())),
                };
                StageSummary {
                    stage,
                    strategy,
                    segments,
                    points,
                    error,
                }
            })
            .collect();
        PlanSummary { stages, coverage }
    }

    /// The published plan. Failed stages are absent.
    pub fn current_plan(&self) -> &PathPlan {
        &self.plan
    }

    /// Enrichment result for one stage, `None` before [`enrich`](Self::enrich).
    pub fn stage_result(&self, stage: Stage) -> Option<&Result<Vec<PathSegment>>> {
        self.outcomes.get(&stage)
    }

    /// Render the current plan as RAPID.
    ///
    /// Fails with `IncompletePlan` if a stage failed or was never enriched,
    /// unless `allow_partial` is set.
    pub fn generate(&self, allow_partial: bool) -> Result<RapidProgram> {
        if self.mesh.is_none() {
            return Err(PolishError::NoModelLoaded);
        }

        if !allow_partial {
            for stage in Stage::ALL {
                let reason = match self.outcomes.get(&stage) {
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => e.to_string(),
                    None => "stage has not been planned".to_string(),
                };
                return Err(PolishError::IncompletePlan {
                    stage: stage.to_string(),
                    reason,
                });
            }
        }

        Ok(RapidGenerator.generate(&self.plan, &self.ctx))
    }

    /// Plan, enrich and generate in one call.
    pub fn run(&mut self, allow_partial: bool) -> Result<RapidProgram> {
        self.plan()?;
        self.enrich()?;
        self.generate(allow_partial)
    }
}

trait HasPoints {
    fn point_count(&self) -> usize;
}

impl HasPoints for RawSegment {
    fn point_count(&self) -> usize {
        self.points.len()
    }
}

impl HasPoints for PathSegment {
    fn point_count(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn square() -> Mesh {
        Mesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(20.0, 0.0, 0.0),
                Point3::new(20.0, 20.0, 0.0),
                Point3::new(0.0, 20.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
        .unwrap()
    }

    #[test]
    fn test_steps_before_load_fail() {
        let mut core = PolishingCore::new(&PipelineConfig::default()).unwrap();
        assert_eq!(core.analyze().unwrap_err(), PolishError::NoModelLoaded);
        assert_eq!(core.plan().unwrap_err(), PolishError::NoModelLoaded);
        assert_eq!(core.enrich().unwrap_err(), PolishError::NoModelLoaded);
        assert_eq!(core.generate(true).unwrap_err(), PolishError::NoModelLoaded);
    }

    #[test]
    fn test_plan_without_enrich_is_incomplete() {
        let mut core = PolishingCore::new(&PipelineConfig::default()).unwrap();
        core.load_mesh(square());
        let summary = core.plan().unwrap();
        assert!(summary.is_complete());
        assert!(core.current_plan().is_empty());
        assert!(matches!(
            core.generate(false),
            Err(PolishError::IncompletePlan { .. })
        ));

        core.enrich().unwrap();
        assert!(!core.current_plan().is_empty());
        assert!(core.generate(false).is_ok());
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = PipelineConfig {
            tool_diameter: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            PolishingCore::new(&config),
            Err(PolishError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_cancelled_enrich_keeps_previous_plan() {
        let mut core = PolishingCore::new(&PipelineConfig::default()).unwrap();
        core.load_mesh(square());
        core.run(false).unwrap();
        let before = core.current_plan().clone();

        core.cancel_flag().cancel();
        assert_eq!(core.enrich().unwrap_err(), PolishError::Cancelled);
        assert_eq!(core.current_plan(), &before);

        // The flag is consumed by the cancelled call
        assert!(core.enrich().is_ok());
        assert_eq!(core.current_plan(), &before);
    }

    #[test]
    fn test_cancelled_plan_publishes_nothing() {
        let mut core = PolishingCore::new(&PipelineConfig::default()).unwrap();
        core.load_mesh(square());
        core.run(false).unwrap();
        let before = core.current_plan().clone();

        core.cancel_flag().cancel();
        assert_eq!(core.plan().unwrap_err(), PolishError::Cancelled);
        assert_eq!(core.current_plan(), &before);
        assert!(core.generate(false).is_ok());
    }

    #[test]
    fn test_cancel_before_idle_plan_is_consumed() {
        let mut core = PolishingCore::new(&PipelineConfig::default()).unwrap();
        core.load_mesh(Mesh::empty());

        core.cancel_flag().cancel();
        assert_eq!(core.plan().unwrap_err(), PolishError::Cancelled);
        assert!(!core.cancel_flag().is_cancelled());

        assert!(core.plan().unwrap().is_complete());
        assert!(core.enrich().unwrap().is_complete());
    }

    #[test]
    fn test_contact_pressure_only_with_force_control() {
        let mut core = PolishingCore::new(&PipelineConfig::default()).unwrap();
        core.load_mesh(square());
        assert_eq!(core.analyze().unwrap().contact_pressure, None);

        let config = PipelineConfig {
            enable_force_control: true,
            target_force: 30.0,
            ..Default::default()
        };
        core.set_config(&config).unwrap();
        let pressure = core.analyze().unwrap().contact_pressure.unwrap();
        assert!(pressure.is_finite() && pressure > 0.0);
    }

    #[test]
    fn test_reload_clears_plan() {
        let mut core = PolishingCore::new(&PipelineConfig::default()).unwrap();
        core.load_mesh(square());
        core.run(false).unwrap();
        assert!(!core.current_plan().is_empty());
        core.load_mesh(Mesh::empty());
        assert!(core.current_plan().is_empty());
        assert!(core.stage_result(Stage::Rough).is_none());
    }
}
