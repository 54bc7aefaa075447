//! Decoded-instruction model for a register-based, Dalvik-style bytecode.
//!
//! This crate is the input surface of the analyzer: an [`Opcode`] catalog
//! with the metadata predicates the dataflow pass needs (does it write a
//! register, can it fall through, can it throw, is it a quickened odex-only
//! form), the [`Instruction`] value type with its operand formats, the symbol
//! references an instruction can carry, and the exception-handler table.
//!
//! Byte-level decoding and encoding are out of scope; branch and handler
//! targets are plain instruction indices into the method's decoded sequence.

mod instruction;
mod opcode;

pub use crate::instruction::{FieldRef, Format, Handler, Instruction, MethodRef, TryBlock};
pub use crate::opcode::Opcode;
