use std::fmt;

use serde::{Deserialize, Serialize};

/// A representative Dalvik opcode catalog.
///
/// Enough of the instruction set for register-type analysis and deodexing;
/// the full binary catalog lives in the decoder, not here. The `*Quick`
/// variants are the optimizer's quickened forms: they address a field by raw
/// byte offset or a method by vtable index instead of a symbol, and only
/// dataflow can recover the generic instruction they stand for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Nop,
    Move,
    MoveWide,
    MoveObject,
    MoveResult,
    MoveResultWide,
    MoveResultObject,
    MoveException,
    ReturnVoid,
    Return,
    ReturnWide,
    ReturnObject,
    Const,
    ConstWide,
    ConstString,
    ConstClass,
    CheckCast,
    InstanceOf,
    ArrayLength,
    NewInstance,
    Goto,
    PackedSwitch,
    SparseSwitch,
    IfEq,
    IfNe,
    IfLt,
    IfGe,
    IfGt,
    IfLe,
    IfEqz,
    IfNez,
    IfLtz,
    IfGez,
    IfGtz,
    IfLez,
    Throw,
    Iget,
    IgetWide,
    IgetObject,
    IgetBoolean,
    IgetByte,
    IgetChar,
    IgetShort,
    Iput,
    IputWide,
    IputObject,
    Sget,
    SgetWide,
    SgetObject,
    Sput,
    SputWide,
    SputObject,
    InvokeVirtual,
    InvokeSuper,
    InvokeDirect,
    InvokeStatic,
    InvokeInterface,
    InvokeVirtualRange,
    InvokeSuperRange,
    InvokeDirectRange,
    InvokeStaticRange,
    InvokeInterfaceRange,
    NegInt,
    NotInt,
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    RemInt,
    AddIntLit8,
    AddIntLit16,
    AddLong,
    AddDouble,
    CmpLong,
    IntToLong,
    LongToInt,
    // Quickened, odex-only forms.
    IgetQuick,
    IgetWideQuick,
    IgetObjectQuick,
    IputQuick,
    IputWideQuick,
    IputObjectQuick,
    InvokeDirectEmpty,
    InvokeVirtualQuick,
    InvokeVirtualQuickRange,
    InvokeSuperQuick,
    InvokeSuperQuickRange,
}

impl Opcode {
    /// Whether executing this instruction writes a register.
    #[must_use]
    pub fn sets_register(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Move | MoveWide
                | MoveObject
                | MoveResult
                | MoveResultWide
                | MoveResultObject
                | MoveException
                | Const
                | ConstWide
                | ConstString
                | ConstClass
                | CheckCast
                | InstanceOf
                | ArrayLength
                | NewInstance
                | Iget
                | IgetWide
                | IgetObject
                | IgetBoolean
                | IgetByte
                | IgetChar
                | IgetShort
                | Sget
                | SgetWide
                | SgetObject
                | NegInt
                | NotInt
                | AddInt
                | SubInt
                | MulInt
                | DivInt
                | RemInt
                | AddIntLit8
                | AddIntLit16
                | AddLong
                | AddDouble
                | CmpLong
                | IntToLong
                | LongToInt
                | IgetQuick
                | IgetWideQuick
                | IgetObjectQuick
        )
    }

    /// Whether the written value occupies a register pair.
    #[must_use]
    pub fn sets_wide_register(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            MoveWide
                | MoveResultWide
                | ConstWide
                | IgetWide
                | SgetWide
                | AddLong
                | AddDouble
                | IntToLong
                | IgetWideQuick
        )
    }

    /// Whether control can fall through to the next instruction.
    #[must_use]
    pub fn can_continue(self) -> bool {
        use Opcode::*;
        !matches!(
            self,
            ReturnVoid | Return | ReturnWide | ReturnObject | Goto | Throw
        )
    }

    /// Whether this instruction can raise an exception, making it a source of
    /// handler edges when covered by a try region.
    #[must_use]
    pub fn can_throw(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            ConstString
                | ConstClass
                | CheckCast
                | InstanceOf
                | ArrayLength
                | NewInstance
                | Throw
                | DivInt
                | RemInt
        ) || self.is_invoke()
            || self.accesses_field()
    }

    /// Whether this is a quickened form that exists only in odexed bytecode.
    #[must_use]
    pub fn odex_only(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            IgetQuick
                | IgetWideQuick
                | IgetObjectQuick
                | IputQuick
                | IputWideQuick
                | IputObjectQuick
                | InvokeDirectEmpty
                | InvokeVirtualQuick
                | InvokeVirtualQuickRange
                | InvokeSuperQuick
                | InvokeSuperQuickRange
        )
    }

    #[must_use]
    pub fn is_invoke(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            InvokeVirtual
                | InvokeSuper
                | InvokeDirect
                | InvokeStatic
                | InvokeInterface
                | InvokeVirtualRange
                | InvokeSuperRange
                | InvokeDirectRange
                | InvokeStaticRange
                | InvokeInterfaceRange
                | InvokeDirectEmpty
                | InvokeVirtualQuick
                | InvokeVirtualQuickRange
                | InvokeSuperQuick
                | InvokeSuperQuickRange
        )
    }

    fn accesses_field(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Iget | IgetWide
                | IgetObject
                | IgetBoolean
                | IgetByte
                | IgetChar
                | IgetShort
                | Iput
                | IputWide
                | IputObject
                | Sget
                | SgetWide
                | SgetObject
                | Sput
                | SputWide
                | SputObject
                | IgetQuick
                | IgetWideQuick
                | IgetObjectQuick
                | IputQuick
                | IputWideQuick
                | IputObjectQuick
        )
    }

    /// The Dalvik mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "nop",
            Move => "move",
            MoveWide => "move-wide",
            MoveObject => "move-object",
            MoveResult => "move-result",
            MoveResultWide => "move-result-wide",
            MoveResultObject => "move-result-object",
            MoveException => "move-exception",
            ReturnVoid => "return-void",
            Return => "return",
            ReturnWide => "return-wide",
            ReturnObject => "return-object",
            Const => "const",
            ConstWide => "const-wide",
            ConstString => "const-string",
            ConstClass => "const-class",
            CheckCast => "check-cast",
            InstanceOf => "instance-of",
            ArrayLength => "array-length",
            NewInstance => "new-instance",
            Goto => "goto",
            PackedSwitch => "packed-switch",
            SparseSwitch => "sparse-switch",
            IfEq => "if-eq",
            IfNe => "if-ne",
            IfLt => "if-lt",
            IfGe => "if-ge",
            IfGt => "if-gt",
            IfLe => "if-le",
            IfEqz => "if-eqz",
            IfNez => "if-nez",
            IfLtz => "if-ltz",
            IfGez => "if-gez",
            IfGtz => "if-gtz",
            IfLez => "if-lez",
            Throw => "throw",
            Iget => "iget",
            IgetWide => "iget-wide",
            IgetObject => "iget-object",
            IgetBoolean => "iget-boolean",
            IgetByte => "iget-byte",
            IgetChar => "iget-char",
            IgetShort => "iget-short",
            Iput => "iput",
            IputWide => "iput-wide",
            IputObject => "iput-object",
            Sget => "sget",
            SgetWide => "sget-wide",
            SgetObject => "sget-object",
            Sput => "sput",
            SputWide => "sput-wide",
            SputObject => "sput-object",
            InvokeVirtual => "invoke-virtual",
            InvokeSuper => "invoke-super",
            InvokeDirect => "invoke-direct",
            InvokeStatic => "invoke-static",
            InvokeInterface => "invoke-interface",
            InvokeVirtualRange => "invoke-virtual/range",
            InvokeSuperRange => "invoke-super/range",
            InvokeDirectRange => "invoke-direct/range",
            InvokeStaticRange => "invoke-static/range",
            InvokeInterfaceRange => "invoke-interface/range",
            NegInt => "neg-int",
            NotInt => "not-int",
            AddInt => "add-int",
            SubInt => "sub-int",
            MulInt => "mul-int",
            DivInt => "div-int",
            RemInt => "rem-int",
            AddIntLit8 => "add-int/lit8",
            AddIntLit16 => "add-int/lit16",
            AddLong => "add-long",
            AddDouble => "add-double",
            CmpLong => "cmp-long",
            IntToLong => "int-to-long",
            LongToInt => "long-to-int",
            IgetQuick => "iget-quick",
            IgetWideQuick => "iget-wide-quick",
            IgetObjectQuick => "iget-object-quick",
            IputQuick => "iput-quick",
            IputWideQuick => "iput-wide-quick",
            IputObjectQuick => "iput-object-quick",
            InvokeDirectEmpty => "invoke-direct-empty",
            InvokeVirtualQuick => "invoke-virtual-quick",
            InvokeVirtualQuickRange => "invoke-virtual-quick/range",
            InvokeSuperQuick => "invoke-super-quick",
            InvokeSuperQuickRange => "invoke-super-quick/range",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminators_do_not_continue() {
        assert!(!Opcode::ReturnVoid.can_continue());
        assert!(!Opcode::Goto.can_continue());
        assert!(!Opcode::Throw.can_continue());
        assert!(Opcode::IfEqz.can_continue());
        assert!(Opcode::PackedSwitch.can_continue());
        assert!(Opcode::InvokeDirect.can_continue());
    }

    #[test]
    fn quick_forms_are_odex_only() {
        assert!(Opcode::IgetQuick.odex_only());
        assert!(Opcode::InvokeVirtualQuickRange.odex_only());
        assert!(Opcode::InvokeDirectEmpty.odex_only());
        assert!(!Opcode::Iget.odex_only());
        assert!(!Opcode::InvokeVirtual.odex_only());
    }

    #[test]
    fn wide_writes_imply_writes() {
        for op in [
            Opcode::MoveWide,
            Opcode::ConstWide,
            Opcode::IgetWide,
            Opcode::SgetWide,
            Opcode::AddLong,
            Opcode::IgetWideQuick,
        ] {
            assert!(op.sets_register(), "{op} should set a register");
            assert!(op.sets_wide_register());
        }
    }
}
