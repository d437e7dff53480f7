//! Program tree rendered to RAPID text
//!
//! Modules hold declarations and procedures; procedures hold statements.
//! Neither can contain the other, so every rendered module has one
//! `MODULE`/`ENDMODULE` pair and one `ENDPROC` per `PROC`.

use std::fmt::Write as _;

const INDENT: &str = "    ";

/// Fixed-precision number with negative zero printed as zero.
pub fn fixed(value: f64, precision: usize) -> String {
    let text = format!("{:.*}", precision, value);
    match text.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => text,
    }
}

/// Quote a RAPID string literal.
pub fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\"\""),
            '\\' => out.push_str("\\\\"),
            '\n' | '\r' => out.push(' '),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Const,
    Pers,
    Var,
}

impl Storage {
    fn keyword(self) -> &'static str {
        match self {
            Self::Const => "CONST",
            Self::Pers => "PERS",
            Self::Var => "VAR",
        }
    }
}

/// Data declaration such as `CONST speeddata vFine := [...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub storage: Storage,
    pub data_type: String,
    pub name: String,
    pub value: Option<String>,
}

impl Declaration {
    pub fn new(
        storage: Storage,
        data_type: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            data_type: data_type.into(),
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Declaration without an initial value, e.g. IO signals.
    pub fn bare(storage: Storage, data_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            storage,
            data_type: data_type.into(),
            name: name.into(),
            value: None,
        }
    }

    fn render(&self, out: &mut String) {
        let _ = write!(out, "{} {} {}", self.storage.keyword(), self.data_type, self.name);
        if let Some(value) = &self.value {
            let _ = write!(out, " := {}", value);
        }
        out.push_str(";\n");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Linear,
    Joint,
}

/// Move destination
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Named(String),
    /// `Offs(base, dx, dy, dz)`
    Offset { base: String, dx: f64, dy: f64, dz: f64 },
}

impl Target {
    /// Name of the declared robtarget this move depends on.
    pub fn base(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Offset { base, .. } => base,
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Named(name) => name.clone(),
            Self::Offset { base, dx, dy, dz } => format!(
                "Offs({}, {}, {}, {})",
                base,
                fixed(*dx, 1),
                fixed(*dy, 1),
                fixed(*dz, 1)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Motion {
    pub kind: MoveKind,
    pub target: Target,
    pub speed: String,
    pub zone: String,
    pub tool: String,
    pub wobj: String,
}

/// One line inside a procedure
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Comment(String),
    Blank,
    TpWrite(String),
    SetDo { signal: String, value: u8 },
    WaitTime(f64),
    /// Call of a parameterless procedure
    Call(String),
    Move(Motion),
    /// Any other instruction, rendered verbatim with a trailing `;`
    Instruction(String),
    /// `IF <condition> THEN ... ENDIF`
    If { condition: String, body: Vec<Stmt> },
}

impl Stmt {
    fn render(&self, out: &mut String, depth: usize) {
        let indent = INDENT.repeat(depth);
        match self {
            Self::Blank => {
                out.push('\n');
                return;
            }
            Self::Comment(text) => {
                let _ = writeln!(out, "{}! {}", indent, text);
                return;
            }
            Self::If { condition, body } => {
                let _ = writeln!(out, "{}IF {} THEN", indent, condition);
                for stmt in body {
                    stmt.render(out, depth + 1);
                }
                let _ = writeln!(out, "{}ENDIF", indent);
                return;
            }
            _ => {}
        }

        out.push_str(&indent);
        let _ = match self {
            Self::TpWrite(text) => write!(out, "TPWrite {}", string_literal(text)),
            Self::SetDo { signal, value } => write!(out, "SetDO {}, {}", signal, value),
            Self::WaitTime(seconds) => write!(out, "WaitTime {}", seconds),
            Self::Call(name) => write!(out, "{}", name),
            Self::Move(m) => write!(
                out,
                "{} {}, {}, {}, {} \\WObj:={}",
                match m.kind {
                    MoveKind::Linear => "MoveL",
                    MoveKind::Joint => "MoveJ",
                },
                m.target.render(),
                m.speed,
                m.zone,
                m.tool,
                m.wobj
            ),
            Self::Instruction(text) => write!(out, "{}", text),
            Self::Blank | Self::Comment(_) | Self::If { .. } => Ok(()),
        };
        out.push_str(";\n");
    }
}

/// Parameterless procedure
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub body: Vec<Stmt>,
}

impl Procedure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: Vec::new(),
        }
    }

    pub fn push(&mut self, stmt: Stmt) -> &mut Self {
        self.body.push(stmt);
        self
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "PROC {}()", self.name);
        for stmt in &self.body {
            stmt.render(out, 1);
        }
        out.push_str("ENDPROC\n");
    }
}

/// Module-level entry
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Comment(String),
    Blank,
    Decl(Declaration),
    Proc(Procedure),
}

/// A complete RAPID module
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub items: Vec<Item>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn comment(&mut self, text: impl Into<String>) -> &mut Self {
        self.items.push(Item::Comment(text.into()));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.items.push(Item::Blank);
        self
    }

    pub fn declare(&mut self, decl: Declaration) -> &mut Self {
        self.items.push(Item::Decl(decl));
        self
    }

    pub fn procedure(&mut self, proc: Procedure) -> &mut Self {
        self.items.push(Item::Proc(proc));
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "MODULE {}", self.name);
        for item in &self.items {
            match item {
                Item::Comment(text) if text.is_empty() => out.push_str("!\n"),
                Item::Comment(text) => {
                    let _ = writeln!(out, "! {}", text);
                }
                Item::Blank => out.push('\n'),
                Item::Decl(decl) => decl.render(&mut out),
                Item::Proc(proc) => proc.render(&mut out),
            }
        }
        out.push_str("ENDMODULE\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_drops_negative_zero() {
        assert_eq!(fixed(-0.0001, 3), "0.000");
        assert_eq!(fixed(-1.5, 1), "-1.5");
        assert_eq!(fixed(2.0, 6), "2.000000");
    }

    #[test]
    fn test_string_literal_escapes() {
        assert_eq!(string_literal(r#"say "hi" \ bye"#), r#""say ""hi"" \\ bye""#);
    }

    #[test]
    fn test_module_render() {
        let mut module = Module::new("Demo");
        module.declare(Declaration::bare(Storage::Var, "signaldo", "doOut"));
        let mut main = Procedure::new("main");
        main.push(Stmt::SetDo {
            signal: "doOut".into(),
            value: 1,
        })
        .push(Stmt::Move(Motion {
            kind: MoveKind::Joint,
            target: Target::Offset {
                base: "p1".into(),
                dx: 0.0,
                dy: 0.0,
                dz: 50.0,
            },
            speed: "vFast".into(),
            zone: "zFine".into(),
            tool: "tool0".into(),
            wobj: "wobj0".into(),
        }));
        module.procedure(main);

        let expected = "MODULE Demo\n\
            VAR signaldo doOut;\n\
            PROC main()\n    SetDO doOut, 1;\n    MoveJ Offs(p1, 0.0, 0.0, 50.0), vFast, zFine, tool0 \\WObj:=wobj0;\n\
            ENDPROC\n\
            ENDMODULE\n";
        assert_eq!(module.render(), expected);
    }

    #[test]
    fn test_if_block_indents_body() {
        let mut proc = Procedure::new("Guard");
        proc.push(Stmt::If {
            condition: "ERRNO = ERR_COLL_STOP".into(),
            body: vec![Stmt::Instruction("StopMove".into())],
        });
        let mut text = String::new();
        proc.render(&mut text);
        assert_eq!(
            text,
            "PROC Guard()\n    IF ERRNO = ERR_COLL_STOP THEN\n        StopMove;\n    ENDIF\nENDPROC\n"
        );
    }
}
