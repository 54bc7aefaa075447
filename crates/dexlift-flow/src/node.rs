use std::cmp::Ordering;
use std::collections::BTreeSet;

use dexlift_bytecode::Instruction;
use dexlift_registers::RegisterType;

use crate::error::{FlowError, Result};

/// Position of an analysis node in a method's instruction stream.
///
/// `-1` is reserved for the synthetic start node that models method entry;
/// real instructions are numbered from 0. The total order over nodes is
/// defined solely by this index, which puts the start node first in any
/// ordered predecessor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InsnIndex(i32);

impl InsnIndex {
    /// The synthetic start node representing method entry.
    pub const START: InsnIndex = InsnIndex(-1);

    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index as i32)
    }

    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// The index into the method's instruction list, `None` for the start
    /// node.
    #[must_use]
    pub fn instruction_index(self) -> Option<usize> {
        (self.0 >= 0).then_some(self.0 as usize)
    }

    /// Slot of this node in the analysis arena, where the start node lives at
    /// slot 0 and instruction `i` at slot `i + 1`.
    #[must_use]
    pub(crate) fn arena_slot(self) -> usize {
        (self.0 + 1) as usize
    }
}

/// One per-instruction analysis node: the instruction's current (possibly
/// deodexed) form, its CFG edges, and the register types flowing in and out.
///
/// Nodes are arena-addressed: edges are [`InsnIndex`] values into the vector
/// owned by the analyzer, never owning links, so loops in the CFG pose no
/// ownership problem.
#[derive(Debug, Clone)]
pub struct AnalyzedInstruction {
    /// Current form of the instruction; replaced by deodexing. `None` only
    /// for the synthetic start node.
    instruction: Option<Instruction>,
    /// The form as originally decoded. Deodexing may have to be redone when
    /// new register information merges in, so the original is kept to revert
    /// to. For non-odexed instructions this always equals `instruction`.
    original_instruction: Option<Instruction>,
    index: InsnIndex,
    /// Ordered by index; the lowest predecessor being the start node marks
    /// this node as a valid method entry point.
    predecessors: BTreeSet<InsnIndex>,
    /// Insertion-order successor sequence; duplicates are preserved (a switch
    /// may branch to the same target twice).
    successors: Vec<InsnIndex>,
    pre_register_types: Vec<RegisterType>,
    post_register_types: Vec<RegisterType>,
    /// Set by the driver after the fixed point: no live, correctly-deodexed
    /// path from method entry reaches this node.
    dead: bool,
}

impl AnalyzedInstruction {
    pub(crate) fn new(instruction: Instruction, index: usize, register_count: u16) -> Self {
        Self {
            original_instruction: Some(instruction.clone()),
            instruction: Some(instruction),
            index: InsnIndex::new(index),
            predecessors: BTreeSet::new(),
            successors: Vec::new(),
            pre_register_types: vec![RegisterType::unknown(); register_count as usize],
            post_register_types: vec![RegisterType::unknown(); register_count as usize],
            dead: false,
        }
    }

    /// The synthetic start node. Its post-state carries the method's entry
    /// register types (parameter seeds).
    pub(crate) fn start(register_count: u16) -> Self {
        Self {
            instruction: None,
            original_instruction: None,
            index: InsnIndex::START,
            predecessors: BTreeSet::new(),
            successors: Vec::new(),
            pre_register_types: vec![RegisterType::unknown(); register_count as usize],
            post_register_types: vec![RegisterType::unknown(); register_count as usize],
            dead: false,
        }
    }

    #[must_use]
    pub fn index(&self) -> InsnIndex {
        self.index
    }

    #[must_use]
    pub fn instruction(&self) -> Option<&Instruction> {
        self.instruction.as_ref()
    }

    #[must_use]
    pub fn original_instruction(&self) -> Option<&Instruction> {
        self.original_instruction.as_ref()
    }

    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub(crate) fn set_dead(&mut self) {
        self.dead = true;
    }

    #[must_use]
    pub fn predecessor_count(&self) -> usize {
        self.predecessors.len()
    }

    #[must_use]
    pub fn successor_count(&self) -> usize {
        self.successors.len()
    }

    pub fn predecessors(&self) -> impl Iterator<Item = InsnIndex> + '_ {
        self.predecessors.iter().copied()
    }

    #[must_use]
    pub fn successors(&self) -> &[InsnIndex] {
        &self.successors
    }

    /// Registers `predecessor`; returns whether it was newly added.
    pub(crate) fn add_predecessor(&mut self, predecessor: InsnIndex) -> bool {
        self.predecessors.insert(predecessor)
    }

    /// Appends to the successor sequence; multiplicity is preserved.
    pub(crate) fn add_successor(&mut self, successor: InsnIndex) {
        self.successors.push(successor);
    }

    /// Whether this node can be the first successfully executed instruction
    /// in the method: either the literal first instruction, or the entry of
    /// an exception handler whose guarded region is reachable from entry.
    /// The driver wires the start node as a predecessor of every such entry,
    /// so the check is O(1).
    #[must_use]
    pub fn is_beginning_instruction(&self) -> bool {
        self.predecessors.first() == Some(&InsnIndex::START)
    }

    #[must_use]
    pub fn register_count(&self) -> u16 {
        self.pre_register_types.len() as u16
    }

    #[must_use]
    pub fn pre_register_types(&self) -> &[RegisterType] {
        &self.pre_register_types
    }

    #[must_use]
    pub fn post_register_types(&self) -> &[RegisterType] {
        &self.post_register_types
    }

    #[must_use]
    pub fn pre_register_type(&self, register: u16) -> &RegisterType {
        &self.pre_register_types[register as usize]
    }

    #[must_use]
    pub fn post_register_type(&self, register: u16) -> &RegisterType {
        &self.post_register_types[register as usize]
    }

    pub(crate) fn seed_post_register_type(&mut self, register: u16, ty: RegisterType) {
        self.post_register_types[register as usize] = ty;
    }

    /// Swap in the generic equivalent recovered for a quickened instruction.
    pub(crate) fn set_deodexed_instruction(&mut self, instruction: Instruction) -> Result<()> {
        if !self.original_is_odex_only() {
            return Err(FlowError::NotOdexEligible {
                index: self.index.raw(),
            });
        }
        self.instruction = Some(instruction);
        Ok(())
    }

    /// Revert to the originally decoded (odexed) form so the instruction can
    /// be deodexed again with better register information.
    pub(crate) fn restore_original_instruction(&mut self) -> Result<()> {
        if !self.original_is_odex_only() {
            return Err(FlowError::NotOdexEligible {
                index: self.index.raw(),
            });
        }
        self.instruction = self.original_instruction.clone();
        Ok(())
    }

    #[must_use]
    pub fn original_is_odex_only(&self) -> bool {
        self.original_instruction
            .as_ref()
            .is_some_and(|insn| insn.opcode.odex_only())
    }

    /// An odex-only instruction that has not (or not yet) been resolved to
    /// its generic form. Its outgoing type information is uninformative and
    /// is excluded from predecessor merges.
    #[must_use]
    pub fn is_unresolvable_odex(&self) -> bool {
        self.original_is_odex_only() && self.instruction == self.original_instruction
    }

    /// Merges `incoming` into the pre-instruction type of `register`.
    ///
    /// On change, this node's verified bit is cleared (it must be re-checked
    /// and possibly re-deodexed) and, iff the instruction does not itself
    /// write that register, the merged value also propagates to the
    /// post-instruction type. Returns whether the post-instruction type
    /// changed, i.e. whether successors must be revisited.
    pub(crate) fn merge_register(
        &mut self,
        register: u16,
        incoming: &RegisterType,
        verified: &mut [bool],
    ) -> bool {
        let slot = register as usize;
        let merged = self.pre_register_types[slot].merge(incoming);
        if merged == self.pre_register_types[slot] {
            return false;
        }

        self.pre_register_types[slot] = merged.clone();
        if let Some(instruction_index) = self.index.instruction_index() {
            verified[instruction_index] = false;
        }

        if !self.sets_register_number(register) {
            self.post_register_types[slot] = merged;
            return true;
        }
        false
    }

    /// Overwrites the post-instruction type of `register`; returns whether it
    /// differs from the previous value.
    pub(crate) fn set_post_register_type(&mut self, register: u16, ty: RegisterType) -> bool {
        let slot = register as usize;
        if self.post_register_types[slot] == ty {
            return false;
        }
        self.post_register_types[slot] = ty;
        true
    }

    #[must_use]
    pub fn sets_register(&self) -> bool {
        self.instruction
            .as_ref()
            .is_some_and(|insn| insn.opcode.sets_register())
    }

    #[must_use]
    pub fn sets_wide_register(&self) -> bool {
        self.instruction
            .as_ref()
            .is_some_and(|insn| insn.opcode.sets_wide_register())
    }

    /// Whether executing this instruction changes the type of `register`.
    ///
    /// Invoking a constructor is the special case: the invoke writes no
    /// register in the ordinary sense, but it retroactively initializes the
    /// receiver register, and every other register holding the *same*
    /// uninitialized value (same allocation site) is initialized along with
    /// it.
    #[must_use]
    pub fn sets_register_number(&self, register: u16) -> bool {
        let Some(instruction) = &self.instruction else {
            return false;
        };

        if instruction.is_constructor_invocation() {
            let Some(receiver) = instruction.invoke_receiver() else {
                return false;
            };
            if register == receiver {
                return true;
            }
            let receiver_type = self.pre_register_type(receiver);
            if !receiver_type.is_uninitialized() {
                return false;
            }
            return self.pre_register_type(register) == receiver_type;
        }

        if !self.sets_register() {
            return false;
        }
        let Some(destination) = instruction.destination_register() else {
            return false;
        };
        register == destination || (self.sets_wide_register() && register == destination + 1)
    }

    /// The register this instruction writes. Contract violation for opcodes
    /// that do not store a value.
    pub fn destination_register(&self) -> Result<u16> {
        match &self.instruction {
            Some(instruction) => {
                instruction
                    .destination_register()
                    .ok_or(FlowError::NoDestinationRegister {
                        index: self.index.raw(),
                        opcode: instruction.opcode,
                    })
            }
            // The synthetic start node stores nothing.
            None => Err(FlowError::NoDestinationRegister {
                index: self.index.raw(),
                opcode: dexlift_bytecode::Opcode::Nop,
            }),
        }
    }

    /// Merge of the post-instruction types of `register` across every
    /// predecessor that is neither dead nor an unresolved odexed instruction.
    ///
    /// `None` when no predecessor qualifies; the caller leaves the
    /// pre-instruction state untouched in that case (resetting to unknown
    /// would break monotonicity during intermediate passes).
    #[must_use]
    pub fn merge_pre_register_type_from_predecessors(
        &self,
        nodes: &[AnalyzedInstruction],
        register: u16,
    ) -> Option<RegisterType> {
        let mut merged: Option<RegisterType> = None;
        for predecessor in &self.predecessors {
            let predecessor = &nodes[predecessor.arena_slot()];
            if predecessor.dead || predecessor.is_unresolvable_odex() {
                continue;
            }
            let ty = predecessor.post_register_type(register);
            merged = Some(match merged {
                Some(acc) => acc.merge(ty),
                None => ty.clone(),
            });
        }
        merged
    }
}

// Node identity is its position in the instruction stream.
impl PartialEq for AnalyzedInstruction {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for AnalyzedInstruction {}

impl PartialOrd for AnalyzedInstruction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AnalyzedInstruction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexlift_bytecode::{FieldRef, Format, MethodRef, Opcode};
    use pretty_assertions::assert_eq;

    fn invoke_init(registers: Vec<u16>) -> Instruction {
        Instruction::new(
            Opcode::InvokeDirect,
            Format::Invoke {
                registers,
                method: MethodRef::new("Lcom/example/Foo;", "<init>", "()V"),
            },
        )
    }

    #[test]
    fn add_predecessor_is_idempotent() {
        let mut node = AnalyzedInstruction::new(
            Instruction::new(Opcode::Nop, Format::None),
            3,
            1,
        );
        assert!(node.add_predecessor(InsnIndex::new(1)));
        assert!(!node.add_predecessor(InsnIndex::new(1)));
        assert_eq!(node.predecessor_count(), 1);

        node.add_successor(InsnIndex::new(4));
        node.add_successor(InsnIndex::new(4));
        assert_eq!(node.successor_count(), 2);
    }

    #[test]
    fn beginning_instruction_requires_start_predecessor() {
        let mut node = AnalyzedInstruction::new(
            Instruction::new(Opcode::Nop, Format::None),
            0,
            1,
        );
        assert!(!node.is_beginning_instruction());

        node.add_predecessor(InsnIndex::new(5));
        assert!(!node.is_beginning_instruction());

        node.add_predecessor(InsnIndex::START);
        assert!(node.is_beginning_instruction());
    }

    #[test]
    fn merge_register_propagates_unless_written() {
        // const v0 writes v0: merging into v0 must not touch the post state.
        let mut node = AnalyzedInstruction::new(
            Instruction::new(Opcode::Const, Format::Literal { a: 0, value: 1 }),
            0,
            2,
        );
        let mut verified = vec![true; 1];

        let incoming = RegisterType::integer();
        assert!(!node.merge_register(0, &incoming, &mut verified));
        assert_eq!(node.pre_register_type(0), &incoming);
        assert_eq!(node.post_register_type(0), &RegisterType::unknown());
        assert!(!verified[0]);

        // v1 is not written: the merge flows through to the post state.
        verified[0] = true;
        assert!(node.merge_register(1, &incoming, &mut verified));
        assert_eq!(node.post_register_type(1), &incoming);
        assert!(!verified[0]);

        // Idempotent: merging the same type again changes nothing.
        verified[0] = true;
        assert!(!node.merge_register(1, &incoming, &mut verified));
        assert!(verified[0]);
    }

    #[test]
    fn constructor_initializes_aliased_registers() {
        // v1 and v2 both hold the same uninitialized reference; v3 holds an
        // unrelated one from a different allocation site.
        let mut node = AnalyzedInstruction::new(invoke_init(vec![1]), 5, 4);
        let uninit = RegisterType::uninit_ref("Lcom/example/Foo;", 2);
        let unrelated = RegisterType::uninit_ref("Lcom/example/Foo;", 4);
        let mut verified = vec![true; 6];
        node.merge_register(1, &uninit, &mut verified);
        node.merge_register(2, &uninit, &mut verified);
        node.merge_register(3, &unrelated, &mut verified);

        assert!(node.sets_register_number(1));
        assert!(node.sets_register_number(2));
        assert!(!node.sets_register_number(3));
        assert!(!node.sets_register_number(0));
    }

    #[test]
    fn constructor_on_initialized_receiver_sets_only_receiver() {
        let mut node = AnalyzedInstruction::new(invoke_init(vec![0]), 1, 2);
        let reference = RegisterType::reference("Lcom/example/Foo;");
        let mut verified = vec![true; 2];
        node.merge_register(0, &reference, &mut verified);
        node.merge_register(1, &reference, &mut verified);

        assert!(node.sets_register_number(0));
        assert!(!node.sets_register_number(1));
    }

    #[test]
    fn wide_write_covers_both_halves() {
        let node = AnalyzedInstruction::new(
            Instruction::new(Opcode::ConstWide, Format::Literal { a: 2, value: 9 }),
            0,
            4,
        );
        assert!(node.sets_register_number(2));
        assert!(node.sets_register_number(3));
        assert!(!node.sets_register_number(1));
    }

    #[test]
    fn deodex_restore_round_trip() {
        let quick = Instruction::new(
            Opcode::IgetQuick,
            Format::FieldOffset {
                a: 0,
                b: 1,
                offset: 8,
            },
        );
        let mut node = AnalyzedInstruction::new(quick.clone(), 0, 2);
        assert!(node.is_unresolvable_odex());

        let generic = Instruction::new(
            Opcode::Iget,
            Format::Field {
                a: 0,
                b: 1,
                field: FieldRef::new("Lcom/example/Foo;", "count", "I"),
            },
        );
        node.set_deodexed_instruction(generic.clone()).unwrap();
        assert_eq!(node.instruction(), Some(&generic));
        assert!(!node.is_unresolvable_odex());

        node.restore_original_instruction().unwrap();
        assert_eq!(node.instruction(), node.original_instruction());
        assert_eq!(node.instruction(), Some(&quick));
    }

    #[test]
    fn deodex_rejected_for_non_odex_instruction() {
        let mut node = AnalyzedInstruction::new(
            Instruction::new(Opcode::Nop, Format::None),
            7,
            1,
        );
        let err = node
            .set_deodexed_instruction(Instruction::new(Opcode::Nop, Format::None))
            .unwrap_err();
        assert!(matches!(err, FlowError::NotOdexEligible { index: 7 }));
        assert!(node.restore_original_instruction().is_err());
    }

    #[test]
    fn destination_register_contract() {
        let node = AnalyzedInstruction::new(
            Instruction::new(Opcode::ReturnVoid, Format::None),
            0,
            1,
        );
        assert!(matches!(
            node.destination_register(),
            Err(FlowError::NoDestinationRegister { .. })
        ));
    }

    #[test]
    fn ordering_is_by_index() {
        let a = AnalyzedInstruction::new(Instruction::new(Opcode::Nop, Format::None), 0, 1);
        let b = AnalyzedInstruction::new(Instruction::new(Opcode::Nop, Format::None), 1, 1);
        let start = AnalyzedInstruction::start(1);
        assert!(start < a && a < b);
        assert_eq!(
            a,
            AnalyzedInstruction::new(Instruction::new(Opcode::ReturnVoid, Format::None), 0, 1)
        );
    }

    #[test]
    fn predecessor_merge_skips_dead_and_unresolved() {
        let mut nodes = vec![AnalyzedInstruction::start(1)];
        nodes.push(AnalyzedInstruction::new(
            Instruction::new(Opcode::Const, Format::Literal { a: 0, value: 1 }),
            0,
            1,
        ));
        nodes.push(AnalyzedInstruction::new(
            Instruction::new(
                Opcode::IgetQuick,
                Format::FieldOffset {
                    a: 0,
                    b: 0,
                    offset: 4,
                },
            ),
            1,
            1,
        ));
        nodes.push(AnalyzedInstruction::new(
            Instruction::new(Opcode::ReturnVoid, Format::None),
            2,
            1,
        ));

        // Give both potential predecessors informative post states.
        nodes[1].set_post_register_type(0, RegisterType::integer());
        nodes[2].set_post_register_type(0, RegisterType::float());

        let mut sink = AnalyzedInstruction::new(
            Instruction::new(Opcode::ReturnVoid, Format::None),
            3,
            1,
        );
        sink.add_predecessor(InsnIndex::new(0));
        sink.add_predecessor(InsnIndex::new(1));

        // The unresolved quickened predecessor contributes nothing.
        assert_eq!(
            sink.merge_pre_register_type_from_predecessors(&nodes, 0),
            Some(RegisterType::integer())
        );

        // A dead predecessor is skipped too; with every predecessor excluded
        // there is no contribution at all.
        nodes[1].set_dead();
        assert_eq!(sink.merge_pre_register_type_from_predecessors(&nodes, 0), None);
    }
}
