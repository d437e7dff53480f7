//! Optional feature blocks
//!
//! Each feature contributes module-level declarations and procedures. Force
//! control and motion optimisation also add a pair of calls that bracket every
//! stage procedure; error recovery is a standalone procedure.

use crate::ir::{fixed, Declaration, Item, Procedure, Stmt, Storage};

/// A feature toggled by the generation context
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    /// Constant contact force along the tool Z axis, in newtons.
    ForceControl { force: f64, tool: String },
    /// Acceleration limits and wrist singularity handling.
    MotionOptimization,
    /// Back off along the tool Z axis after a collision stop, in mm.
    ErrorRecovery { retract: f64, tool: String },
}

impl Feature {
    pub const FORCE_ON: &'static str = "ActivateForceControl";
    pub const FORCE_OFF: &'static str = "DeactivateForceControl";
    pub const MOTION_ON: &'static str = "ApplyMotionOptimization";
    pub const MOTION_OFF: &'static str = "RestoreMotionSettings";
    pub const ERROR_HANDLER: &'static str = "ErrorHandler";

    /// Declarations and procedures emitted once per module.
    pub fn items(&self) -> Vec<Item> {
        match self {
            Self::ForceControl { force, tool } => {
                let mut on = Procedure::new(Self::FORCE_ON);
                on.push(Stmt::Instruction(format!(
                    "ForceDef fPolishing, [[0, 0, {}]], {}",
                    fixed(*force, 1),
                    tool
                )))
                .push(Stmt::Instruction("ForceAct fPolishing".to_string()));

                let mut off = Procedure::new(Self::FORCE_OFF);
                off.push(Stmt::Instruction("StopForce".to_string()));

                vec![
                    Item::Comment("Force control".to_string()),
                    Item::Decl(Declaration::new(
                        Storage::Const,
                        "forcedata",
                        "fPolishing",
                        "[1, [[0, 0, 0.1], [1, 0, 0, 0]], 50, 50]",
                    )),
                    Item::Proc(on),
                    Item::Proc(off),
                ]
            }
            Self::MotionOptimization => {
                let mut on = Procedure::new(Self::MOTION_ON);
                on.push(Stmt::Instruction("PathAccLim TRUE \\AccMax:=5, TRUE \\DecelMax:=5".to_string()))
                    .push(Stmt::Instruction("SingArea \\Wrist".to_string()))
                    .push(Stmt::Instruction("ConfL \\Off".to_string()));

                let mut off = Procedure::new(Self::MOTION_OFF);
                off.push(Stmt::Instruction("PathAccLim FALSE, FALSE".to_string()))
                    .push(Stmt::Instruction("SingArea \\Off".to_string()))
                    .push(Stmt::Instruction("ConfL \\On".to_string()));

                vec![
                    Item::Comment("Motion optimisation".to_string()),
                    Item::Proc(on),
                    Item::Proc(off),
                ]
            }
            Self::ErrorRecovery { retract, tool } => {
                let mut handler = Procedure::new(Self::ERROR_HANDLER);
                handler.push(Stmt::If {
                    condition: "ERRNO = ERR_COLL_STOP".to_string(),
                    body: vec![
                        Stmt::Instruction("StopMove".to_string()),
                        Stmt::Instruction(format!(
                            "MoveL RelTool(CRobT(), 0, 0, {}), vSlow, fine, {}",
                            fixed(-retract, 1),
                            tool
                        )),
                        Stmt::Instruction("ExitCycle".to_string()),
                    ],
                });

                vec![
                    Item::Comment("Error recovery".to_string()),
                    Item::Proc(handler),
                ]
            }
        }
    }

    /// Call placed at the start of a stage procedure, if the feature brackets
    /// stages.
    pub fn activate(&self) -> Option<Stmt> {
        match self {
            Self::ForceControl { .. } => Some(Stmt::Call(Self::FORCE_ON.to_string())),
            Self::MotionOptimization => Some(Stmt::Call(Self::MOTION_ON.to_string())),
            Self::ErrorRecovery { .. } => None,
        }
    }

    /// Call placed at the end of a stage procedure.
    pub fn deactivate(&self) -> Option<Stmt> {
        match self {
            Self::ForceControl { .. } => Some(Stmt::Call(Self::FORCE_OFF.to_string())),
            Self::MotionOptimization => Some(Stmt::Call(Self::MOTION_OFF.to_string())),
            Self::ErrorRecovery { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Module;

    #[test]
    fn test_force_block_uses_target_force_and_tool() {
        let feature = Feature::ForceControl {
            force: 42.0,
            tool: "tBuff".to_string(),
        };
        let mut module = Module::new("M");
        for item in feature.items() {
            module.items.push(item);
        }
        let text = module.render();
        assert!(text.contains("ForceDef fPolishing, [[0, 0, 42.0]], tBuff;"));
        assert!(text.contains("PROC DeactivateForceControl()\n    StopForce;\nENDPROC"));
        assert_eq!(
            feature.activate(),
            Some(Stmt::Call("ActivateForceControl".to_string()))
        );
    }

    #[test]
    fn test_motion_block_pairs_procedures() {
        let items = Feature::MotionOptimization.items();
        let procs: Vec<&str> = items
            .iter()
            .filter_map(|i| match i {
                Item::Proc(p) => Some(p.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(procs, vec!["ApplyMotionOptimization", "RestoreMotionSettings"]);
    }

    #[test]
    fn test_error_handler_backs_off_after_collision() {
        let feature = Feature::ErrorRecovery {
            retract: 10.0,
            tool: "tPolishingTool".to_string(),
        };
        let mut module = Module::new("M");
        module.items.extend(feature.items());
        let text = module.render();
        assert!(text.contains(
            "PROC ErrorHandler()\n\
             \x20   IF ERRNO = ERR_COLL_STOP THEN\n\
             \x20       StopMove;\n\
             \x20       MoveL RelTool(CRobT(), 0, 0, -10.0), vSlow, fine, tPolishingTool;\n\
             \x20       ExitCycle;\n\
             \x20   ENDIF\n\
             ENDPROC\n"
        ));
        assert_eq!(feature.activate(), None);
        assert_eq!(feature.deactivate(), None);
    }
}
