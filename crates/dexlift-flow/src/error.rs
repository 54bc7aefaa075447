use dexlift_bytecode::Opcode;

pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors produced by graph construction and by contract-violating queries.
///
/// Unverifiable bytecode is deliberately *not* represented here: a method
/// whose types cannot be resolved degrades to dead/unanalyzable nodes in the
/// result instead of aborting the analysis.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("instruction {index} ({opcode}) does not write a register")]
    NoDestinationRegister { index: i32, opcode: Opcode },

    #[error("instruction {index} is not eligible for deodexing")]
    NotOdexEligible { index: i32 },

    #[error(
        "instruction {index} uses register v{register} but the method declares \
         {register_count} registers"
    )]
    RegisterOutOfRange {
        index: usize,
        register: u16,
        register_count: u16,
    },

    #[error(
        "branch target {target} at instruction {index} is outside the method \
         ({instruction_count} instructions)"
    )]
    InvalidBranchTarget {
        index: usize,
        target: usize,
        instruction_count: usize,
    },

    #[error("exception table entry {entry} refers to out-of-range instruction {index}")]
    InvalidExceptionTable { entry: usize, index: usize },

    #[error("instruction {index} falls through past the end of the method")]
    FallsOffEnd { index: usize },

    #[error("method has no instructions")]
    EmptyMethod,

    #[error(
        "parameters require {required} registers but the method declares only \
         {register_count}"
    )]
    ParameterRegisterOverflow { required: u16, register_count: u16 },
}
