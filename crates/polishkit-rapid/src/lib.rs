//! # PolishKit RAPID
//!
//! Renders a [`PathPlan`](polishkit_toolpath::PathPlan) as an ABB RAPID
//! module. Programs are built as a small statement tree ([`ir`]) and rendered
//! last, then can be checked with [`validate_program`].

pub mod features;
pub mod generator;
pub mod ir;
pub mod validate;

pub use features::Feature;
pub use generator::{procedure_name, target_name, RapidGenerator, RapidProgram};
pub use validate::{validate_program, ValidationReport};
