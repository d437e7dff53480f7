//! RAPID module generation
//!
//! Output order: header comments, tool/work-object/speed/zone/IO data, one
//! robtarget per path point, optional feature blocks, one procedure per
//! non-empty stage, `main`. Output depends only on the plan and the context,
//! so regenerating an unchanged plan gives byte-identical text.

use polishkit_core::{PolishError, Result, Stage};
use polishkit_settings::GenerationContext;
use polishkit_toolpath::{quaternion_components, PathPlan, PathPoint, PathSegment};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::features::Feature;
use crate::ir::{fixed, Declaration, Module, MoveKind, Motion, Procedure, Stmt, Storage, Target};

pub const WORK_OBJECT: &str = "wWorkpiece";
pub const SPINDLE_SIGNAL: &str = "doSpindleStart";
const RULE: &str = "========================================================";

/// Decimal places for robtarget positions
pub const POSITION_PRECISION: usize = 3;
/// Decimal places for robtarget quaternions
pub const ORIENTATION_PRECISION: usize = 6;

/// Generated program text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RapidProgram(String);

impl RapidProgram {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn line_count(&self) -> usize {
        self.0.lines().count()
    }

    /// Write the program to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.0)?;
        info!("Wrote RAPID program to {}", path.display());
        Ok(())
    }
}

impl fmt::Display for RapidProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RapidProgram {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Robtarget name for one point: `p_{stage}_{segment}_{index:03}`.
pub fn target_name(stage: Stage, segment_id: usize, index: usize) -> String {
    format!("p_{}_{}_{:03}", stage, segment_id, index)
}

pub fn procedure_name(stage: Stage) -> String {
    format!("Path_{}", stage)
}

fn speed_name(stage: Stage) -> &'static str {
    match stage {
        Stage::Rough => "vRough",
        Stage::Fine => "vFine",
    }
}

/// Stateless code generator
#[derive(Debug, Clone, Copy, Default)]
pub struct RapidGenerator;

impl RapidGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Render `plan` as a RAPID module.
    ///
    /// Stages without segments get neither a procedure nor a call in `main`.
    pub fn generate(&self, plan: &PathPlan, ctx: &GenerationContext) -> RapidProgram {
        let config = ctx.config();
        let features = features(ctx);

        let mut module = Module::new(config.program_name.clone());
        header(&mut module, plan, ctx);
        data_declarations(&mut module, ctx);
        targets(&mut module, plan);

        for feature in &features {
            module.blank();
            for item in feature.items() {
                module.items.push(item);
            }
        }

        let mut called = Vec::new();
        for (stage, segments) in plan.stages() {
            if segments.is_empty() {
                debug!("Skipping empty {} stage", stage);
                continue;
            }
            module.blank();
            module.procedure(stage_procedure(stage, segments, ctx, &features));
            called.push(stage);
        }

        module.blank();
        module.procedure(main_procedure(&called));

        let program = RapidProgram(module.render());
        info!(
            "Generated RAPID module {} ({} stages, {} targets, {} lines)",
            config.program_name,
            called.len(),
            plan.point_count(),
            program.line_count()
        );
        program
    }

    /// Generate and write to `path`.
    pub fn generate_to_file(
        &self,
        plan: &PathPlan,
        ctx: &GenerationContext,
        path: &Path,
    ) -> Result<RapidProgram> {
        let program = self.generate(plan, ctx);
        program.save(path).map_err(|e| match e {
            PolishError::Io { reason } => PolishError::Io {
                reason: format!("{}: {}", path.display(), reason),
            },
            other => other,
        })?;
        Ok(program)
    }
}

fn features(ctx: &GenerationContext) -> Vec<Feature> {
    let mut features = Vec::new();
    if ctx.config().enable_motion_optimization {
        features.push(Feature::MotionOptimization);
    }
    if let Some(force) = ctx.force_control() {
        features.push(Feature::ForceControl {
            force,
            tool: ctx.config().tool_name.clone(),
        });
    }
    if let Some(retract) = ctx.error_recovery() {
        features.push(Feature::ErrorRecovery {
            retract,
            tool: ctx.config().tool_name.clone(),
        });
    }
    features
}

fn header(module: &mut Module, plan: &PathPlan, ctx: &GenerationContext) {
    let config = ctx.config();
    module.comment(RULE);
    if let Some(timestamp) = &config.timestamp {
        module.comment(format!("Generated: {}", timestamp));
    }
    module
        .comment(format!("Generator: PolishKit {}", env!("CARGO_PKG_VERSION")))
        .comment(format!("Robot: {}", config.robot_model))
        .comment(format!(
            "Tool: {} (diameter {} mm)",
            config.tool_name,
            fixed(config.tool_diameter, 1)
        ));
    for stage in Stage::ALL {
        let settings = ctx.stage(stage);
        module.comment(format!(
            "{}: {} strategy, {} segments, {} points",
            stage,
            settings.strategy,
            plan.segments(stage).len(),
            plan.segments(stage).iter().map(|s| s.points.len()).sum::<usize>()
        ));
    }
    module.comment(RULE);
}

fn speed_value(tcp: f64) -> String {
    format!("[{}, 500, 5000, 1000]", tcp)
}

fn data_declarations(module: &mut Module, ctx: &GenerationContext) {
    let config = ctx.config();

    module.blank().comment("Tool data").declare(Declaration::new(
        Storage::Pers,
        "tooldata",
        config.tool_name.clone(),
        format!(
            "[TRUE, [[0, 0, {}], [1, 0, 0, 0]], [{}, [0, 0, {}], [1, 0, 0, 0], 0, 0, 0]]",
            fixed(config.tool_length, 1),
            fixed(config.tool_mass, 3),
            fixed(config.tool_length / 2.0, 1)
        ),
    ));

    module.blank().comment("Work object").declare(Declaration::new(
        Storage::Pers,
        "wobjdata",
        WORK_OBJECT,
        "[FALSE, TRUE, \"\", [[0, 0, 0], [1, 0, 0, 0]], [[0, 0, 0], [1, 0, 0, 0]]]",
    ));

    module.blank().comment("Speeds");
    for (name, value) in [
        ("vApproach", "[100, 500, 5000, 1000]".to_string()),
        ("vRetract", "[150, 500, 5000, 1000]".to_string()),
        ("vFast", "[500, 1000, 5000, 1000]".to_string()),
        ("vSlow", "[50, 200, 5000, 1000]".to_string()),
        ("vRough", speed_value(config.rough_speed)),
        ("vFine", speed_value(config.fine_speed)),
    ] {
        module.declare(Declaration::new(Storage::Const, "speeddata", name, value));
    }

    module.blank().comment("Zones");
    for (name, value) in [
        ("zFine", "[FALSE, 0.3, 0.3, 0.3, 0.03, 0.3, 0.3]"),
        ("zMedium", "[FALSE, 1.0, 1.0, 1.0, 0.1, 1.0, 1.0]"),
        ("zLarge", "[FALSE, 5.0, 5.0, 5.0, 0.3, 5.0, 5.0]"),
    ] {
        module.declare(Declaration::new(Storage::Const, "zonedata", name, value));
    }

    module.blank().comment("IO signals");
    for (data_type, name) in [
        ("signaldo", SPINDLE_SIGNAL),
        ("signaldo", "doCoolantOn"),
        ("signaldi", "diEmergencyStop"),
        ("signaldi", "diToolInPlace"),
    ] {
        module.declare(Declaration::bare(Storage::Var, data_type, name));
    }
}

fn robtarget(point: &PathPoint) -> String {
    let p = point.position;
    let [w, x, y, z] = quaternion_components(&point.orientation);
    let pos = |v: f64| fixed(v, POSITION_PRECISION);
    let rot = |v: f64| fixed(v, ORIENTATION_PRECISION);
    format!(
        "[[{},{},{}],[{},{},{},{}],[0,0,0,0],[9E9,9E9,9E9,9E9,9E9,9E9]]",
        pos(p.x),
        pos(p.y),
        pos(p.z),
        rot(w),
        rot(x),
        rot(y),
        rot(z)
    )
}

fn targets(module: &mut Module, plan: &PathPlan) {
    if plan.is_empty() {
        return;
    }
    module.blank().comment("Targets");
    for (stage, segments) in plan.stages() {
        for segment in segments {
            for (idx, point) in segment.points.iter().enumerate() {
                module.declare(Declaration::new(
                    Storage::Const,
                    "robtarget",
                    target_name(stage, segment.id, idx),
                    robtarget(point),
                ));
            }
        }
    }
}

fn stage_procedure(
    stage: Stage,
    segments: &[PathSegment],
    ctx: &GenerationContext,
    features: &[Feature],
) -> Procedure {
    let config = ctx.config();
    let tool = config.tool_name.as_str();
    let lift = config.safety_height;
    let motion = |kind: MoveKind, target: Target, speed: &str, zone: &str| {
        Stmt::Move(Motion {
            kind,
            target,
            speed: speed.to_string(),
            zone: zone.to_string(),
            tool: tool.to_string(),
            wobj: WORK_OBJECT.to_string(),
        })
    };
    let lifted = |base: String| Target::Offset {
        base,
        dx: 0.0,
        dy: 0.0,
        dz: lift,
    };

    let mut proc = Procedure::new(procedure_name(stage));
    proc.push(Stmt::TpWrite(format!("Executing {} polishing...", stage)));
    for stmt in features.iter().filter_map(Feature::activate) {
        proc.push(stmt);
    }

    let stage_speed = ctx.stage(stage).speed;
    // Points at the stage speed use the named speeddata; anything else gets
    // an inline aggregate.
    let speed_of = |point: &PathPoint| {
        if point.speed == stage_speed {
            speed_name(stage).to_string()
        } else {
            speed_value(point.speed)
        }
    };
    for segment in segments {
        let count = segment.points.len();
        if count == 0 {
            continue;
        }
        proc.push(Stmt::Blank)
            .push(Stmt::Comment(format!("Segment {}", segment.name)));

        if lift > 0.0 {
            proc.push(motion(
                MoveKind::Joint,
                lifted(target_name(stage, segment.id, 0)),
                "vApproach",
                "zMedium",
            ));
        }
        for (idx, point) in segment.points.iter().enumerate() {
            proc.push(motion(
                MoveKind::Linear,
                Target::Named(target_name(stage, segment.id, idx)),
                &speed_of(point),
                point.zone.rapid_name(),
            ));
        }
        if lift > 0.0 {
            proc.push(motion(
                MoveKind::Linear,
                lifted(target_name(stage, segment.id, count - 1)),
                "vRetract",
                "zMedium",
            ));
        }
    }

    let closing: Vec<Stmt> = features.iter().rev().filter_map(Feature::deactivate).collect();
    if !closing.is_empty() {
        proc.push(Stmt::Blank);
    }
    for stmt in closing {
        proc.push(stmt);
    }
    proc
}

fn main_procedure(stages: &[Stage]) -> Procedure {
    let mut main = Procedure::new("main");
    main.push(Stmt::TpWrite("Starting Polishing Cycle".to_string()))
        .push(Stmt::SetDo {
            signal: SPINDLE_SIGNAL.to_string(),
            value: 1,
        })
        .push(Stmt::WaitTime(1.0));
    for &stage in stages {
        main.push(Stmt::Call(procedure_name(stage)));
    }
    main.push(Stmt::SetDo {
        signal: SPINDLE_SIGNAL.to_string(),
        value: 0,
    })
    .push(Stmt::TpWrite("Cycle Complete".to_string()));
    main
}
