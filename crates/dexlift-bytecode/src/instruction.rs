use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::opcode::Opcode;

/// A resolved method reference: defining class descriptor, member name, and
/// method descriptor (e.g. `(ILjava/lang/String;)V`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub class: SmolStr,
    pub name: SmolStr,
    pub descriptor: SmolStr,
}

impl MethodRef {
    pub fn new(
        class: impl Into<SmolStr>,
        name: impl Into<SmolStr>,
        descriptor: impl Into<SmolStr>,
    ) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// The return-type part of the method descriptor, `"V"` for void.
    #[must_use]
    pub fn return_descriptor(&self) -> &str {
        self.descriptor
            .split_once(')')
            .map(|(_, ret)| ret)
            .unwrap_or("V")
    }
}

/// A resolved instance or static field reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub class: SmolStr,
    pub name: SmolStr,
    pub type_descriptor: SmolStr,
}

impl FieldRef {
    pub fn new(
        class: impl Into<SmolStr>,
        name: impl Into<SmolStr>,
        type_descriptor: impl Into<SmolStr>,
    ) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            type_descriptor: type_descriptor.into(),
        }
    }
}

/// Operand layout of a decoded instruction.
///
/// Register `a` is the destination for writing instructions. Branch and
/// switch targets are instruction indices, already resolved by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    None,
    /// `op vA`
    Reg { a: u16 },
    /// `op vA, vB`
    TwoRegs { a: u16, b: u16 },
    /// `op vA, vB, vC`
    ThreeRegs { a: u16, b: u16, c: u16 },
    /// `op vA, #lit`
    Literal { a: u16, value: i64 },
    /// `op vA, vB, #lit`
    RegLiteral { a: u16, b: u16, value: i64 },
    /// `op vA, type@` (new-instance, check-cast, const-class)
    Type { a: u16, descriptor: SmolStr },
    /// `op vA, vB, type@` (instance-of)
    TwoRegsType { a: u16, b: u16, descriptor: SmolStr },
    /// `op +target`
    Branch { target: usize },
    /// `op vA, +target`
    BranchReg { a: u16, target: usize },
    /// `op vA, vB, +target`
    BranchTwoRegs { a: u16, b: u16, target: usize },
    /// `op vA, payload` with the payload's branch targets resolved.
    Switch { a: u16, targets: Vec<usize> },
    /// `op {vC..vG}, meth@` with argument registers in call order, receiver
    /// first for instance invocations.
    Invoke {
        registers: Vec<u16>,
        method: MethodRef,
    },
    /// `op {vN..vN+count-1}, meth@`
    InvokeRange {
        start: u16,
        count: u16,
        method: MethodRef,
    },
    /// `op vA, vB, field@` (value register, object register)
    Field { a: u16, b: u16, field: FieldRef },
    /// `op vA, field@`
    StaticField { a: u16, field: FieldRef },
    /// Quickened field access: the symbol is gone, only the raw byte offset
    /// into the object remains.
    FieldOffset { a: u16, b: u16, offset: u16 },
    /// Quickened invoke: vtable index instead of a method reference.
    InvokeQuick {
        registers: Vec<u16>,
        vtable_index: u16,
    },
    /// Quickened range invoke.
    InvokeQuickRange {
        start: u16,
        count: u16,
        vtable_index: u16,
    },
}

/// One decoded bytecode operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub format: Format,
}

impl Instruction {
    pub fn new(opcode: Opcode, format: Format) -> Self {
        Self { opcode, format }
    }

    /// The register this instruction writes, if the opcode writes one.
    #[must_use]
    pub fn destination_register(&self) -> Option<u16> {
        if !self.opcode.sets_register() {
            return None;
        }
        match &self.format {
            Format::Reg { a }
            | Format::TwoRegs { a, .. }
            | Format::ThreeRegs { a, .. }
            | Format::Literal { a, .. }
            | Format::RegLiteral { a, .. }
            | Format::Type { a, .. }
            | Format::TwoRegsType { a, .. }
            | Format::Field { a, .. }
            | Format::StaticField { a, .. }
            | Format::FieldOffset { a, .. } => Some(*a),
            _ => None,
        }
    }

    /// The receiver register of an invocation: the first argument register of
    /// a five-register invoke, or the start register of a range invoke.
    #[must_use]
    pub fn invoke_receiver(&self) -> Option<u16> {
        match &self.format {
            Format::Invoke { registers, .. } | Format::InvokeQuick { registers, .. } => {
                registers.first().copied()
            }
            Format::InvokeRange { start, count, .. }
            | Format::InvokeQuickRange { start, count, .. } => (*count > 0).then_some(*start),
            _ => None,
        }
    }

    #[must_use]
    pub fn method_ref(&self) -> Option<&MethodRef> {
        match &self.format {
            Format::Invoke { method, .. } | Format::InvokeRange { method, .. } => Some(method),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_constructor_invocation(&self) -> bool {
        matches!(
            self.opcode,
            Opcode::InvokeDirect | Opcode::InvokeDirectRange | Opcode::InvokeDirectEmpty
        ) && self.method_ref().is_some_and(MethodRef::is_constructor)
    }

    /// Explicit (non-fallthrough) control transfer targets.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<usize> {
        match &self.format {
            Format::Branch { target }
            | Format::BranchReg { target, .. }
            | Format::BranchTwoRegs { target, .. } => vec![*target],
            Format::Switch { targets, .. } => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Low halves of the wide (two-register) values this instruction reads;
    /// each pair's high half is the next register up.
    #[must_use]
    pub fn wide_source_registers(&self) -> Vec<u16> {
        use Opcode::*;
        match (self.opcode, &self.format) {
            (MoveWide | LongToInt, Format::TwoRegs { b, .. }) => vec![*b],
            (ReturnWide, Format::Reg { a }) => vec![*a],
            (AddLong | AddDouble | CmpLong, Format::ThreeRegs { b, c, .. }) => vec![*b, *c],
            (IputWide, Format::Field { a, .. }) => vec![*a],
            (SputWide, Format::StaticField { a, .. }) => vec![*a],
            (IputWideQuick, Format::FieldOffset { a, .. }) => vec![*a],
            _ => Vec::new(),
        }
    }

    /// Every register this instruction reads or writes, for operand
    /// validation. The high half of a wide destination is not listed.
    #[must_use]
    pub fn registers(&self) -> Vec<u16> {
        match &self.format {
            Format::None | Format::Branch { .. } => Vec::new(),
            Format::Reg { a }
            | Format::Literal { a, .. }
            | Format::Type { a, .. }
            | Format::BranchReg { a, .. }
            | Format::Switch { a, .. }
            | Format::StaticField { a, .. } => vec![*a],
            Format::TwoRegs { a, b }
            | Format::RegLiteral { a, b, .. }
            | Format::TwoRegsType { a, b, .. }
            | Format::BranchTwoRegs { a, b, .. }
            | Format::Field { a, b, .. }
            | Format::FieldOffset { a, b, .. } => vec![*a, *b],
            Format::ThreeRegs { a, b, c } => vec![*a, *b, *c],
            Format::Invoke { registers, .. } | Format::InvokeQuick { registers, .. } => {
                registers.clone()
            }
            Format::InvokeRange { start, count, .. }
            | Format::InvokeQuickRange { start, count, .. } => {
                (*start..start.saturating_add(*count)).collect()
            }
        }
    }
}

/// One catch handler: the exception type it catches (`None` for catch-all)
/// and the instruction index of its first instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handler {
    pub exception: Option<SmolStr>,
    pub target: usize,
}

impl Handler {
    pub fn new(exception: Option<&str>, target: usize) -> Self {
        Self {
            exception: exception.map(SmolStr::new),
            target,
        }
    }
}

/// A guarded region of instructions and its handlers. `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryBlock {
    pub start: usize,
    pub end: usize,
    pub handlers: Vec<Handler>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn destination_register_follows_opcode_metadata() {
        let iget = Instruction::new(
            Opcode::Iget,
            Format::Field {
                a: 0,
                b: 1,
                field: FieldRef::new("Lcom/example/Foo;", "count", "I"),
            },
        );
        assert_eq!(iget.destination_register(), Some(0));

        let iput = Instruction::new(
            Opcode::Iput,
            Format::Field {
                a: 0,
                b: 1,
                field: FieldRef::new("Lcom/example/Foo;", "count", "I"),
            },
        );
        assert_eq!(iput.destination_register(), None);

        let ret = Instruction::new(Opcode::ReturnVoid, Format::None);
        assert_eq!(ret.destination_register(), None);
    }

    #[test]
    fn invoke_receiver_is_first_argument() {
        let invoke = Instruction::new(
            Opcode::InvokeDirect,
            Format::Invoke {
                registers: vec![3, 1, 2],
                method: MethodRef::new("Lcom/example/Foo;", "<init>", "(II)V"),
            },
        );
        assert_eq!(invoke.invoke_receiver(), Some(3));
        assert!(invoke.is_constructor_invocation());

        let range = Instruction::new(
            Opcode::InvokeVirtualRange,
            Format::InvokeRange {
                start: 4,
                count: 3,
                method: MethodRef::new("Lcom/example/Foo;", "run", "()V"),
            },
        );
        assert_eq!(range.invoke_receiver(), Some(4));
        assert!(!range.is_constructor_invocation());
    }

    #[test]
    fn return_descriptor_parsing() {
        let m = MethodRef::new("Lcom/example/Foo;", "get", "(I)Ljava/lang/String;");
        assert_eq!(m.return_descriptor(), "Ljava/lang/String;");
        let v = MethodRef::new("Lcom/example/Foo;", "<init>", "()V");
        assert_eq!(v.return_descriptor(), "V");
    }

    #[test]
    fn wide_sources_enumerated() {
        let mv = Instruction::new(Opcode::MoveWide, Format::TwoRegs { a: 0, b: 2 });
        assert_eq!(mv.wide_source_registers(), vec![2]);

        let add = Instruction::new(
            Opcode::AddLong,
            Format::ThreeRegs { a: 0, b: 2, c: 4 },
        );
        assert_eq!(add.wide_source_registers(), vec![2, 4]);

        let narrow = Instruction::new(Opcode::Move, Format::TwoRegs { a: 0, b: 1 });
        assert!(narrow.wide_source_registers().is_empty());
    }

    #[test]
    fn switch_lists_all_targets() {
        let switch = Instruction::new(
            Opcode::PackedSwitch,
            Format::Switch {
                a: 0,
                targets: vec![4, 7, 4],
            },
        );
        assert_eq!(switch.branch_targets(), vec![4, 7, 4]);
    }

    #[test]
    fn range_registers_enumerated() {
        let range = Instruction::new(
            Opcode::InvokeVirtualRange,
            Format::InvokeRange {
                start: 2,
                count: 3,
                method: MethodRef::new("Lcom/example/Foo;", "run", "()V"),
            },
        );
        assert_eq!(range.registers(), vec![2, 3, 4]);
    }
}
