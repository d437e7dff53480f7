//! Structural checks on RAPID text
//!
//! Not a grammar check. Verifies block balance, that every robtarget a move
//! uses is declared exactly once before its first use, and that string
//! literals close on the line they open. Targets computed at run time, such
//! as `RelTool(CRobT(), ...)`, are counted as moves but not resolved.

use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Findings from [`validate_program`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub module_count: usize,
    pub endmodule_count: usize,
    pub proc_count: usize,
    pub endproc_count: usize,
    pub target_count: usize,
    pub move_count: usize,
    /// Targets moved to but never declared
    pub undeclared_targets: Vec<String>,
    /// Targets used before their declaration
    pub late_declared_targets: Vec<String>,
    pub duplicate_targets: Vec<String>,
    /// 1-based line numbers with an odd number of quotes
    pub unbalanced_quote_lines: Vec<usize>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.module_count == 1
            && self.endmodule_count == 1
            && self.proc_count == self.endproc_count
            && self.undeclared_targets.is_empty()
            && self.late_declared_targets.is_empty()
            && self.duplicate_targets.is_empty()
            && self.unbalanced_quote_lines.is_empty()
    }

    /// Human-readable problems, empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.module_count != 1 || self.endmodule_count != 1 {
            problems.push(format!(
                "expected one MODULE/ENDMODULE pair, found {}/{}",
                self.module_count, self.endmodule_count
            ));
        }
        if self.proc_count != self.endproc_count {
            problems.push(format!(
                "{} PROC but {} ENDPROC",
                self.proc_count, self.endproc_count
            ));
        }
        for name in &self.undeclared_targets {
            problems.push(format!("target {} is not declared", name));
        }
        for name in &self.late_declared_targets {
            problems.push(format!("target {} is used before it is declared", name));
        }
        for name in &self.duplicate_targets {
            problems.push(format!("target {} is declared more than once", name));
        }
        for line in &self.unbalanced_quote_lines {
            problems.push(format!("line {} has an unterminated string", line));
        }
        problems
    }
}

fn module_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^MODULE\s+\w+").expect("invalid regex pattern"))
}

fn proc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^PROC\s+\w+\s*\(").expect("invalid regex pattern"))
}

fn target_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:CONST|PERS|VAR)\s+robtarget\s+(\w+)").expect("invalid regex pattern")
    })
}

fn move_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Move(?:L|J|AbsJ)\s+(?:Offs\(\s*)?(\w+)\s*(\()?").expect("invalid regex pattern")
    })
}

/// Check the structure of a RAPID module.
pub fn validate_program(text: &str) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut declared_at: HashMap<&str, usize> = HashMap::new();
    let mut first_use: Vec<(&str, usize)> = Vec::new();
    let mut seen_use: HashSet<&str> = HashSet::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('!') {
            continue;
        }

        if line.matches('"').count() % 2 != 0 {
            report.unbalanced_quote_lines.push(idx + 1);
        }

        if module_regex().is_match(line) {
            report.module_count += 1;
        } else if line.starts_with("ENDMODULE") {
            report.endmodule_count += 1;
        } else if proc_regex().is_match(line) {
            report.proc_count += 1;
        } else if line.starts_with("ENDPROC") {
            report.endproc_count += 1;
        } else if let Some(caps) = target_decl_regex().captures(line) {
            let name = caps.get(1).map_or("", |m| m.as_str());
            report.target_count += 1;
            let repeated = declared_at.insert(name, idx).is_some();
            if repeated && !report.duplicate_targets.iter().any(|d| d == name) {
                report.duplicate_targets.push(name.to_string());
            }
        } else if let Some(caps) = move_regex().captures(line) {
            report.move_count += 1;
            if caps.get(2).is_some() {
                continue;
            }
            let name = caps.get(1).map_or("", |m| m.as_str());
            if seen_use.insert(name) {
                first_use.push((name, idx));
            }
        }
    }

    for (name, used_at) in first_use {
        match declared_at.get(name) {
            None => report.undeclared_targets.push(name.to_string()),
            Some(&decl) if decl > used_at => report.late_declared_targets.push(name.to_string()),
            Some(_) => {}
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "MODULE M\n\
        CONST robtarget p1 := [[0,0,0],[1,0,0,0],[0,0,0,0],[9E9,9E9,9E9,9E9,9E9,9E9]];\n\
        PROC main()\n\
        \x20   TPWrite \"go\";\n\
        \x20   MoveJ Offs(p1, 0.0, 0.0, 50.0), v100, z10, tool0 \\WObj:=wobj0;\n\
        \x20   MoveL p1, v100, fine, tool0 \\WObj:=wobj0;\n\
        ENDPROC\n\
        ENDMODULE\n";

    #[test]
    fn test_valid_program() {
        let report = validate_program(GOOD);
        assert!(report.is_valid(), "{:?}", report.problems());
        assert_eq!(report.proc_count, 1);
        assert_eq!(report.target_count, 1);
        assert_eq!(report.move_count, 2);
    }

    #[test]
    fn test_detects_missing_endproc_and_undeclared() {
        let text = "MODULE M\nPROC main()\n    MoveL p9, v100, fine, tool0;\nENDMODULE\n";
        let report = validate_program(text);
        assert!(!report.is_valid());
        assert_eq!(report.endproc_count, 0);
        assert_eq!(report.undeclared_targets, vec!["p9".to_string()]);
    }

    #[test]
    fn test_detects_late_and_duplicate_declarations() {
        let text = "MODULE M\n\
            PROC main()\n    MoveL p1, v100, fine, tool0;\nENDPROC\n\
            CONST robtarget p1 := [];\nCONST robtarget p1 := [];\n\
            ENDMODULE\n";
        let report = validate_program(text);
        assert_eq!(report.late_declared_targets, vec!["p1".to_string()]);
        assert_eq!(report.duplicate_targets, vec!["p1".to_string()]);
    }

    #[test]
    fn test_detects_unterminated_string() {
        let text = "MODULE M\nPROC main()\n    TPWrite \"oops;\nENDPROC\nENDMODULE\n";
        assert_eq!(validate_program(text).unbalanced_quote_lines, vec![3]);
    }

    #[test]
    fn test_computed_targets_are_not_resolved() {
        let text = "MODULE M\n\
            PROC recover()\n    MoveL RelTool(CRobT(), 0, 0, -10.0), vSlow, fine, tool0;\nENDPROC\n\
            ENDMODULE\n";
        let report = validate_program(text);
        assert!(report.is_valid(), "{:?}", report.problems());
        assert_eq!(report.move_count, 1);
    }

    #[test]
    fn test_comments_are_ignored() {
        let text = "MODULE M\n! PROC fake()\n! MoveL ghost, v1, fine, t;\nENDMODULE\n";
        assert!(validate_program(text).is_valid());
    }
}
