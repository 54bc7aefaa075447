//! Register-type dataflow analysis for Dalvik-style register bytecode.
//!
//! The analyzer builds a control-flow graph over a method's decoded
//! instructions (fallthrough, branch, and exception-handler edges), then
//! iterates instruction effects to a fixed point over the lattice defined in
//! `dexlift-registers`. The converged result carries, for every instruction,
//! the inferred type of each register before and after it executes.
//!
//! Two consumers drive the design. Decompilation wants the register types at
//! every program point plus dead-code marking. Deodexing additionally needs
//! the analysis to *rewrite* instructions mid-flight: a quickened instruction
//! names a field by raw offset or a method by vtable slot, and only the
//! inferred type of the object register says which symbol that is. The two
//! are interleaved because they feed each other, and deodexing decisions are
//! revisited whenever better register information merges in.

mod analyzer;
mod error;
mod node;

pub use analyzer::{analyze, MethodAnalysis, MethodInfo, NoOdexResolver, OdexResolver};
pub use error::{FlowError, Result};
pub use node::{AnalyzedInstruction, InsnIndex};
