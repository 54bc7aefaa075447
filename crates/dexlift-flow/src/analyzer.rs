use std::collections::VecDeque;

use dexlift_bytecode::{FieldRef, Format, Instruction, MethodRef, Opcode, TryBlock};
use dexlift_registers::{Category, RegisterType};

use crate::error::{FlowError, Result};
use crate::node::{AnalyzedInstruction, InsnIndex};

const THROWABLE_DESCRIPTOR: &str = "Ljava/lang/Throwable;";
const STRING_DESCRIPTOR: &str = "Ljava/lang/String;";
const CLASS_DESCRIPTOR: &str = "Ljava/lang/Class;";

/// A single method's decoded body, as handed over by the container format.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub instructions: Vec<Instruction>,
    pub register_count: u16,
    pub try_blocks: Vec<TryBlock>,
    /// Entry type of the `this` register for instance methods, placed just
    /// below the declared parameters. Constructors pass
    /// [`RegisterType::uninit_this`] here.
    pub this_type: Option<RegisterType>,
    /// Entry types of the declared parameters, laid out into the highest
    /// registers; wide types occupy two slots.
    pub parameter_types: Vec<RegisterType>,
}

impl MethodInfo {
    pub fn new(instructions: Vec<Instruction>, register_count: u16) -> Self {
        Self {
            instructions,
            register_count,
            try_blocks: Vec::new(),
            this_type: None,
            parameter_types: Vec::new(),
        }
    }
}

/// Lookup of the symbols a quickened instruction elided: the field living at
/// a raw byte offset and the method behind a vtable slot, both relative to a
/// concrete object type inferred by the dataflow pass.
pub trait OdexResolver {
    fn field_by_offset(&self, class_descriptor: &str, offset: u16) -> Option<FieldRef>;
    fn method_by_vtable_index(
        &self,
        class_descriptor: &str,
        vtable_index: u16,
    ) -> Option<MethodRef>;
}

/// Resolver for odex-free input; every lookup fails, so any quickened
/// instruction is marked unanalyzable instead of deodexed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOdexResolver;

impl OdexResolver for NoOdexResolver {
    fn field_by_offset(&self, _class_descriptor: &str, _offset: u16) -> Option<FieldRef> {
        None
    }

    fn method_by_vtable_index(
        &self,
        _class_descriptor: &str,
        _vtable_index: u16,
    ) -> Option<MethodRef> {
        None
    }
}

/// Runs register-type inference over one method: builds the CFG, iterates to
/// a fixed point, deodexes what the inferred types allow, and marks dead
/// code.
pub fn analyze(method: &MethodInfo, resolver: &dyn OdexResolver) -> Result<MethodAnalysis> {
    let mut nodes = build_graph(method)?;
    seed_entry_state(method, &mut nodes)?;
    run_to_fixed_point(method, resolver, &mut nodes)?;
    mark_dead(&mut nodes);
    Ok(MethodAnalysis {
        nodes,
        register_count: method.register_count,
    })
}

/// The converged analysis of one method: per instruction, the final
/// (possibly deodexed) form, the register types before and after it, the
/// dead flag, and the CFG edges.
#[derive(Debug)]
pub struct MethodAnalysis {
    /// Arena: slot 0 is the synthetic start node, instruction `i` lives at
    /// slot `i + 1`.
    nodes: Vec<AnalyzedInstruction>,
    register_count: u16,
}

impl MethodAnalysis {
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.nodes.len() - 1
    }

    #[must_use]
    pub fn register_count(&self) -> u16 {
        self.register_count
    }

    #[must_use]
    pub fn start_node(&self) -> &AnalyzedInstruction {
        &self.nodes[InsnIndex::START.arena_slot()]
    }

    #[must_use]
    pub fn node(&self, index: usize) -> &AnalyzedInstruction {
        &self.nodes[InsnIndex::new(index).arena_slot()]
    }

    /// Instruction nodes in index order, start node excluded.
    pub fn nodes(&self) -> impl Iterator<Item = &AnalyzedInstruction> {
        self.nodes[1..].iter()
    }

    /// Indices of the instructions executable first: the method entry plus
    /// every reachable exception handler entry.
    #[must_use]
    pub fn beginning_instructions(&self) -> Vec<usize> {
        self.nodes()
            .filter(|node| node.is_beginning_instruction())
            .filter_map(|node| node.index().instruction_index())
            .collect()
    }

    /// Instructions whose quickened form was resolved back to a generic one.
    pub fn deodexed_instructions(&self) -> impl Iterator<Item = (usize, &Instruction)> {
        self.nodes().filter_map(|node| {
            if !node.original_is_odex_only() || node.is_unresolvable_odex() {
                return None;
            }
            Some((node.index().instruction_index()?, node.instruction()?))
        })
    }

    /// Whether any reachable quickened instruction could not be resolved.
    /// The method still analyzed; the affected nodes are dead.
    #[must_use]
    pub fn unverifiable(&self) -> bool {
        self.nodes().any(AnalyzedInstruction::is_unresolvable_odex)
    }
}

// === CFG construction ===

fn build_graph(method: &MethodInfo) -> Result<Vec<AnalyzedInstruction>> {
    let count = method.instructions.len();
    if count == 0 {
        return Err(FlowError::EmptyMethod);
    }

    let mut nodes = Vec::with_capacity(count + 1);
    nodes.push(AnalyzedInstruction::start(method.register_count));
    for (index, instruction) in method.instructions.iter().enumerate() {
        validate_registers(method, index, instruction)?;
        nodes.push(AnalyzedInstruction::new(
            instruction.clone(),
            index,
            method.register_count,
        ));
    }

    for (index, instruction) in method.instructions.iter().enumerate() {
        if instruction.opcode.can_continue() {
            if index + 1 >= count {
                return Err(FlowError::FallsOffEnd { index });
            }
            link(&mut nodes, InsnIndex::new(index), InsnIndex::new(index + 1));
        }
        for target in instruction.branch_targets() {
            if target >= count {
                return Err(FlowError::InvalidBranchTarget {
                    index,
                    target,
                    instruction_count: count,
                });
            }
            link(&mut nodes, InsnIndex::new(index), InsnIndex::new(target));
        }
    }

    for (entry, block) in method.try_blocks.iter().enumerate() {
        if block.start >= block.end || block.end > count {
            return Err(FlowError::InvalidExceptionTable {
                entry,
                index: block.end,
            });
        }
        for handler in &block.handlers {
            if handler.target >= count {
                return Err(FlowError::InvalidExceptionTable {
                    entry,
                    index: handler.target,
                });
            }
        }
        for index in block.start..block.end {
            if method.instructions[index].opcode.can_throw() {
                for handler in &block.handlers {
                    link(
                        &mut nodes,
                        InsnIndex::new(index),
                        InsnIndex::new(handler.target),
                    );
                }
            }
        }
    }

    // Entry edges: the literal first instruction, then the entry of every
    // handler whose guarded region contains a reachable throwing
    // instruction. Iterated because a handler becoming reachable can make
    // further guarded regions reachable. Wiring the start node in directly
    // keeps `is_beginning_instruction` O(1).
    link_unique(&mut nodes, InsnIndex::START, InsnIndex::new(0));
    loop {
        let reachable = reachable_from_start(&nodes);
        let mut changed = false;
        for block in &method.try_blocks {
            let guarded_reachable = (block.start..block.end).any(|index| {
                reachable[InsnIndex::new(index).arena_slot()]
                    && method.instructions[index].opcode.can_throw()
            });
            if !guarded_reachable {
                continue;
            }
            for handler in &block.handlers {
                changed |= link_unique(
                    &mut nodes,
                    InsnIndex::START,
                    InsnIndex::new(handler.target),
                );
            }
        }
        if !changed {
            break;
        }
    }

    Ok(nodes)
}

fn validate_registers(method: &MethodInfo, index: usize, instruction: &Instruction) -> Result<()> {
    for register in instruction.registers() {
        if register >= method.register_count {
            return Err(FlowError::RegisterOutOfRange {
                index,
                register,
                register_count: method.register_count,
            });
        }
    }
    for register in instruction.wide_source_registers() {
        if register + 1 >= method.register_count {
            return Err(FlowError::RegisterOutOfRange {
                index,
                register: register + 1,
                register_count: method.register_count,
            });
        }
    }
    if instruction.opcode.sets_wide_register() {
        if let Some(destination) = instruction.destination_register() {
            if destination + 1 >= method.register_count {
                return Err(FlowError::RegisterOutOfRange {
                    index,
                    register: destination + 1,
                    register_count: method.register_count,
                });
            }
        }
    }
    Ok(())
}

/// Adds an edge, preserving successor multiplicity.
fn link(nodes: &mut [AnalyzedInstruction], from: InsnIndex, to: InsnIndex) {
    nodes[to.arena_slot()].add_predecessor(from);
    nodes[from.arena_slot()].add_successor(to);
}

/// Adds an edge only if it does not exist yet; returns whether it was new.
fn link_unique(nodes: &mut [AnalyzedInstruction], from: InsnIndex, to: InsnIndex) -> bool {
    if nodes[to.arena_slot()].add_predecessor(from) {
        nodes[from.arena_slot()].add_successor(to);
        return true;
    }
    false
}

fn reachable_from_start(nodes: &[AnalyzedInstruction]) -> Vec<bool> {
    let mut reachable = vec![false; nodes.len()];
    let mut stack = vec![InsnIndex::START];
    while let Some(index) = stack.pop() {
        let slot = index.arena_slot();
        if reachable[slot] {
            continue;
        }
        reachable[slot] = true;
        stack.extend(nodes[slot].successors().iter().copied());
    }
    reachable
}

/// Writes the method entry state into the start node's post-registers:
/// `this` (if any) followed by the declared parameters, in the highest
/// registers.
fn seed_entry_state(method: &MethodInfo, nodes: &mut [AnalyzedInstruction]) -> Result<()> {
    let mut required = u16::from(method.this_type.is_some());
    for ty in &method.parameter_types {
        required += if ty.is_wide_low() { 2 } else { 1 };
    }
    if required > method.register_count {
        return Err(FlowError::ParameterRegisterOverflow {
            required,
            register_count: method.register_count,
        });
    }

    let start = &mut nodes[InsnIndex::START.arena_slot()];
    let mut register = method.register_count - required;
    if let Some(this_type) = &method.this_type {
        start.seed_post_register_type(register, this_type.clone());
        register += 1;
    }
    for ty in &method.parameter_types {
        start.seed_post_register_type(register, ty.clone());
        register += 1;
        if let Some(high) = ty.wide_high_half() {
            start.seed_post_register_type(register, high);
            register += 1;
        }
    }
    Ok(())
}

// === Fixed-point iteration ===

fn run_to_fixed_point(
    method: &MethodInfo,
    resolver: &dyn OdexResolver,
    nodes: &mut [AnalyzedInstruction],
) -> Result<()> {
    let count = method.instructions.len();
    let mut verified = vec![false; count];
    let mut queued = vec![false; count];
    let mut worklist = VecDeque::new();

    // Seed every reachable instruction in index order; the beginning
    // instructions come first since the start node's edges point at them.
    let reachable = reachable_from_start(nodes);
    for index in 0..count {
        if reachable[InsnIndex::new(index).arena_slot()] {
            worklist.push_back(index);
            queued[index] = true;
        }
    }

    let mut passes = 0usize;
    while let Some(index) = worklist.pop_front() {
        queued[index] = false;
        passes += 1;

        let post_changed = analyze_instruction(method, resolver, nodes, index, &mut verified)?;
        verified[index] = true;

        if post_changed {
            let successors = nodes[InsnIndex::new(index).arena_slot()]
                .successors()
                .to_vec();
            for successor in successors {
                let Some(successor) = successor.instruction_index() else {
                    continue;
                };
                if !queued[successor] {
                    queued[successor] = true;
                    worklist.push_back(successor);
                }
            }
        }
    }

    tracing::debug!(
        instructions = count,
        passes,
        "register-type analysis converged"
    );
    Ok(())
}

/// One worklist visit: pull the pre-state from the predecessors, re-deodex if
/// needed, execute the instruction's type effect. Returns whether any
/// post-register type changed.
fn analyze_instruction(
    method: &MethodInfo,
    resolver: &dyn OdexResolver,
    nodes: &mut [AnalyzedInstruction],
    index: usize,
    verified: &mut [bool],
) -> Result<bool> {
    let slot = InsnIndex::new(index).arena_slot();

    // Merging can invalidate this node's own verified bit, which is what
    // triggers re-deodexing below.
    let mut merges = Vec::new();
    for register in 0..method.register_count {
        if let Some(merged) =
            nodes[slot].merge_pre_register_type_from_predecessors(nodes, register)
        {
            merges.push((register, merged));
        }
    }
    let mut post_changed = false;
    for (register, merged) in merges {
        post_changed |= nodes[slot].merge_register(register, &merged, verified);
    }

    if nodes[slot].original_is_odex_only() {
        // New register information invalidates a previous deodex decision:
        // fall back to the quickened form and resolve again.
        if !verified[index] && !nodes[slot].is_unresolvable_odex() {
            nodes[slot].restore_original_instruction()?;
        }
        if nodes[slot].is_unresolvable_odex() {
            match try_deodex(&nodes[slot], resolver) {
                Some(generic) => {
                    tracing::debug!(index, opcode = %generic.opcode, "deodexed instruction");
                    nodes[slot].set_deodexed_instruction(generic)?;
                }
                None => {
                    tracing::trace!(index, "not enough type information to deodex");
                    return Ok(post_changed);
                }
            }
        }
    }

    post_changed |= apply_effect(method, nodes, index);
    Ok(post_changed)
}

// === Deodexing ===

fn try_deodex(node: &AnalyzedInstruction, resolver: &dyn OdexResolver) -> Option<Instruction> {
    let instruction = node.instruction()?;
    // invoke-direct-empty still carries its symbol; the rewrite needs no
    // lookup and no register information.
    if instruction.opcode == Opcode::InvokeDirectEmpty {
        return Some(Instruction::new(
            Opcode::InvokeDirect,
            instruction.format.clone(),
        ));
    }
    match &instruction.format {
        Format::FieldOffset { a, b, offset } => {
            let class = resolvable_descriptor(node.pre_register_type(*b))?;
            let field = resolver.field_by_offset(class, *offset)?;
            let opcode = deodexed_field_opcode(instruction.opcode, &field)?;
            Some(Instruction::new(
                opcode,
                Format::Field {
                    a: *a,
                    b: *b,
                    field,
                },
            ))
        }
        Format::InvokeQuick {
            registers,
            vtable_index,
        } => {
            let receiver = *registers.first()?;
            let class = resolvable_descriptor(node.pre_register_type(receiver))?;
            let method = resolver.method_by_vtable_index(class, *vtable_index)?;
            let opcode = deodexed_invoke_opcode(instruction.opcode)?;
            Some(Instruction::new(
                opcode,
                Format::Invoke {
                    registers: registers.clone(),
                    method,
                },
            ))
        }
        Format::InvokeQuickRange {
            start,
            count,
            vtable_index,
        } => {
            if *count == 0 {
                return None;
            }
            let class = resolvable_descriptor(node.pre_register_type(*start))?;
            let method = resolver.method_by_vtable_index(class, *vtable_index)?;
            let opcode = deodexed_invoke_opcode(instruction.opcode)?;
            Some(Instruction::new(
                opcode,
                Format::InvokeRange {
                    start: *start,
                    count: *count,
                    method,
                },
            ))
        }
        _ => None,
    }
}

/// Quickened access needs a concrete object type. `Unknown` defers until
/// more information flows in; `Null` and `Conflicted` can never resolve.
fn resolvable_descriptor(ty: &RegisterType) -> Option<&str> {
    match ty.category() {
        Category::Reference => ty.descriptor(),
        _ => None,
    }
}

fn deodexed_field_opcode(opcode: Opcode, field: &FieldRef) -> Option<Opcode> {
    match opcode {
        Opcode::IgetQuick => Some(match field.type_descriptor.as_bytes().first()? {
            b'Z' => Opcode::IgetBoolean,
            b'B' => Opcode::IgetByte,
            b'C' => Opcode::IgetChar,
            b'S' => Opcode::IgetShort,
            _ => Opcode::Iget,
        }),
        Opcode::IgetWideQuick => Some(Opcode::IgetWide),
        Opcode::IgetObjectQuick => Some(Opcode::IgetObject),
        Opcode::IputQuick => Some(Opcode::Iput),
        Opcode::IputWideQuick => Some(Opcode::IputWide),
        Opcode::IputObjectQuick => Some(Opcode::IputObject),
        _ => None,
    }
}

fn deodexed_invoke_opcode(opcode: Opcode) -> Option<Opcode> {
    match opcode {
        Opcode::InvokeVirtualQuick => Some(Opcode::InvokeVirtual),
        Opcode::InvokeVirtualQuickRange => Some(Opcode::InvokeVirtualRange),
        Opcode::InvokeSuperQuick => Some(Opcode::InvokeSuper),
        Opcode::InvokeSuperQuickRange => Some(Opcode::InvokeSuperRange),
        _ => None,
    }
}

// === Instruction type effects ===

/// Applies the instruction's effect on the registers it writes. This is the
/// only place register types are *computed* rather than propagated.
fn apply_effect(method: &MethodInfo, nodes: &mut [AnalyzedInstruction], index: usize) -> bool {
    let writes = instruction_writes(method, nodes, index);
    let slot = InsnIndex::new(index).arena_slot();
    let mut changed = false;
    for (register, ty) in writes {
        changed |= nodes[slot].set_post_register_type(register, ty);
    }
    changed
}

fn instruction_writes(
    method: &MethodInfo,
    nodes: &[AnalyzedInstruction],
    index: usize,
) -> Vec<(u16, RegisterType)> {
    let node = &nodes[InsnIndex::new(index).arena_slot()];
    let Some(instruction) = node.instruction() else {
        return Vec::new();
    };

    use Opcode::*;
    let mut writes = Vec::new();
    match (instruction.opcode, &instruction.format) {
        (Move | MoveObject, Format::TwoRegs { a, b }) => {
            writes.push((*a, node.pre_register_type(*b).clone()));
        }
        (MoveWide, Format::TwoRegs { a, b }) => {
            writes.push((*a, node.pre_register_type(*b).clone()));
            writes.push((*a + 1, node.pre_register_type(*b + 1).clone()));
        }
        (MoveResult | MoveResultObject, Format::Reg { a }) => {
            if let Some(ty) = previous_result_type(nodes, index) {
                writes.push((*a, ty));
            }
        }
        (MoveResultWide, Format::Reg { a }) => {
            if let Some(ty) = previous_result_type(nodes, index) {
                if let Some(high) = ty.wide_high_half() {
                    writes.push((*a + 1, high));
                }
                writes.push((*a, ty));
            }
        }
        (MoveException, Format::Reg { a }) => {
            writes.push((*a, caught_exception_type(method, index)));
        }
        (Const, Format::Literal { a, value }) => {
            let ty = if *value == 0 {
                RegisterType::null()
            } else {
                RegisterType::integer()
            };
            writes.push((*a, ty));
        }
        (ConstWide, Format::Literal { a, .. }) => {
            push_wide(&mut writes, *a, RegisterType::long());
        }
        (ConstString, Format::Reg { a }) => {
            writes.push((*a, RegisterType::reference(STRING_DESCRIPTOR)));
        }
        (ConstClass, Format::Type { a, .. }) => {
            writes.push((*a, RegisterType::reference(CLASS_DESCRIPTOR)));
        }
        (CheckCast, Format::Type { a, descriptor }) => {
            let ty = RegisterType::from_descriptor(descriptor)
                .unwrap_or_else(RegisterType::conflicted);
            writes.push((*a, ty));
        }
        (InstanceOf, Format::TwoRegsType { a, .. }) => {
            writes.push((*a, RegisterType::boolean()));
        }
        (ArrayLength, Format::TwoRegs { a, .. }) => {
            writes.push((*a, RegisterType::integer()));
        }
        (NewInstance, Format::Type { a, descriptor }) => {
            writes.push((*a, RegisterType::uninit_ref(descriptor.clone(), index as u32)));
        }
        _ if instruction.is_constructor_invocation() => {
            // The invoke writes no register in the ordinary sense, but it
            // initializes the receiver and every register aliasing the same
            // uninitialized value.
            if let Some(receiver) = instruction.invoke_receiver() {
                let receiver_type = node.pre_register_type(receiver);
                let initialized = receiver_type
                    .initialized()
                    .unwrap_or_else(|| receiver_type.clone());
                for register in 0..method.register_count {
                    if node.sets_register_number(register) {
                        writes.push((register, initialized.clone()));
                    }
                }
            }
        }
        (
            Iget | IgetWide | IgetObject | IgetBoolean | IgetByte | IgetChar | IgetShort,
            Format::Field { a, field, .. },
        )
        | (Sget | SgetWide | SgetObject, Format::StaticField { a, field }) => {
            let ty = RegisterType::from_descriptor(&field.type_descriptor)
                .unwrap_or_else(RegisterType::conflicted);
            if instruction.opcode.sets_wide_register() {
                push_wide(&mut writes, *a, ty);
            } else {
                writes.push((*a, ty));
            }
        }
        (NegInt | NotInt | LongToInt, Format::TwoRegs { a, .. }) => {
            writes.push((*a, RegisterType::integer()));
        }
        (
            AddInt | SubInt | MulInt | DivInt | RemInt | CmpLong,
            Format::ThreeRegs { a, .. },
        ) => {
            writes.push((*a, RegisterType::integer()));
        }
        (AddIntLit8 | AddIntLit16, Format::RegLiteral { a, .. }) => {
            writes.push((*a, RegisterType::integer()));
        }
        (AddLong, Format::ThreeRegs { a, .. }) => {
            push_wide(&mut writes, *a, RegisterType::long());
        }
        (AddDouble, Format::ThreeRegs { a, .. }) => {
            push_wide(&mut writes, *a, RegisterType::double());
        }
        (IntToLong, Format::TwoRegs { a, .. }) => {
            push_wide(&mut writes, *a, RegisterType::long());
        }
        // Returns, branches, throws, puts, plain invokes, and nop write
        // nothing. Quickened forms never reach this point: they are either
        // deodexed into a generic opcode first or skipped as unresolved.
        _ => {}
    }
    writes
}

fn push_wide(writes: &mut Vec<(u16, RegisterType)>, register: u16, low: RegisterType) {
    if let Some(high) = low.wide_high_half() {
        writes.push((register + 1, high));
    }
    writes.push((register, low));
}

/// Result type delivered by the invoke (or filled-array) instruction
/// immediately preceding a `move-result*`.
fn previous_result_type(nodes: &[AnalyzedInstruction], index: usize) -> Option<RegisterType> {
    if index == 0 {
        return None;
    }
    let previous = nodes[InsnIndex::new(index - 1).arena_slot()].instruction()?;
    let method = previous.method_ref()?;
    RegisterType::from_descriptor(method.return_descriptor())
}

/// Type of the exception delivered to a handler entry: the merge of every
/// declared catch type targeting this instruction, `Throwable` for catch-all
/// handlers or when the instruction is not a handler entry at all.
fn caught_exception_type(method: &MethodInfo, index: usize) -> RegisterType {
    let mut caught: Option<RegisterType> = None;
    for block in &method.try_blocks {
        for handler in &block.handlers {
            if handler.target != index {
                continue;
            }
            let ty = handler
                .exception
                .as_deref()
                .and_then(RegisterType::from_descriptor)
                .unwrap_or_else(|| RegisterType::reference(THROWABLE_DESCRIPTOR));
            caught = Some(match caught {
                Some(acc) if acc == ty => acc,
                // Distinct catch types are all throwables; the plain
                // reference merge would widen past Throwable to Object.
                Some(_) => RegisterType::reference(THROWABLE_DESCRIPTOR),
                None => ty,
            });
        }
    }
    caught.unwrap_or_else(|| RegisterType::reference(THROWABLE_DESCRIPTOR))
}

// === Dead-code marking ===

/// Marks every node with no live, correctly-deodexed path from method entry.
/// An unresolved quickened instruction is itself dead and is never traversed
/// through: anything reachable only past it is dead too.
fn mark_dead(nodes: &mut [AnalyzedInstruction]) {
    let mut live = vec![false; nodes.len()];
    let mut stack = vec![InsnIndex::START];
    while let Some(index) = stack.pop() {
        let slot = index.arena_slot();
        if live[slot] {
            continue;
        }
        live[slot] = true;
        if nodes[slot].is_unresolvable_odex() {
            continue;
        }
        stack.extend(nodes[slot].successors().iter().copied());
    }

    for (slot, node) in nodes.iter_mut().enumerate() {
        if node.index() == InsnIndex::START {
            continue;
        }
        if !live[slot] || node.is_unresolvable_odex() {
            node.set_dead();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexlift_bytecode::Handler;
    use pretty_assertions::assert_eq;

    fn ret() -> Instruction {
        Instruction::new(Opcode::ReturnVoid, Format::None)
    }

    #[test]
    fn empty_method_is_rejected() {
        let method = MethodInfo::new(Vec::new(), 1);
        assert!(matches!(
            analyze(&method, &NoOdexResolver),
            Err(FlowError::EmptyMethod)
        ));
    }

    #[test]
    fn fallthrough_past_end_is_rejected() {
        let method = MethodInfo::new(
            vec![Instruction::new(Opcode::Nop, Format::None)],
            1,
        );
        assert!(matches!(
            analyze(&method, &NoOdexResolver),
            Err(FlowError::FallsOffEnd { index: 0 })
        ));
    }

    #[test]
    fn branch_target_out_of_range_is_rejected() {
        let method = MethodInfo::new(
            vec![
                Instruction::new(Opcode::Goto, Format::Branch { target: 9 }),
                ret(),
            ],
            1,
        );
        assert!(matches!(
            analyze(&method, &NoOdexResolver),
            Err(FlowError::InvalidBranchTarget { index: 0, target: 9, .. })
        ));
    }

    #[test]
    fn register_out_of_range_is_rejected() {
        let method = MethodInfo::new(
            vec![
                Instruction::new(Opcode::Const, Format::Literal { a: 4, value: 1 }),
                ret(),
            ],
            2,
        );
        assert!(matches!(
            analyze(&method, &NoOdexResolver),
            Err(FlowError::RegisterOutOfRange { register: 4, .. })
        ));
    }

    #[test]
    fn wide_source_at_top_of_frame_is_rejected() {
        // v2 is in range, but its high half v3 is not.
        let method = MethodInfo::new(
            vec![
                Instruction::new(Opcode::MoveWide, Format::TwoRegs { a: 0, b: 2 }),
                ret(),
            ],
            3,
        );
        assert!(matches!(
            analyze(&method, &NoOdexResolver),
            Err(FlowError::RegisterOutOfRange {
                index: 0,
                register: 3,
                register_count: 3,
            })
        ));
    }

    #[test]
    fn exception_table_out_of_range_is_rejected() {
        let mut method = MethodInfo::new(
            vec![
                Instruction::new(Opcode::Nop, Format::None),
                ret(),
            ],
            1,
        );
        method.try_blocks.push(TryBlock {
            start: 0,
            end: 5,
            handlers: vec![Handler::new(None, 1)],
        });
        assert!(matches!(
            analyze(&method, &NoOdexResolver),
            Err(FlowError::InvalidExceptionTable { entry: 0, index: 5 })
        ));
    }

    #[test]
    fn parameter_seeding_overflow_is_rejected() {
        let mut method = MethodInfo::new(vec![ret()], 1);
        method.parameter_types = vec![RegisterType::long()];
        assert!(matches!(
            analyze(&method, &NoOdexResolver),
            Err(FlowError::ParameterRegisterOverflow {
                required: 2,
                register_count: 1,
            })
        ));
    }

    #[test]
    fn parameters_seed_the_highest_registers() {
        let mut method = MethodInfo::new(
            vec![
                Instruction::new(Opcode::Move, Format::TwoRegs { a: 0, b: 3 }),
                ret(),
            ],
            4,
        );
        method.this_type = Some(RegisterType::reference("Lcom/example/Foo;"));
        method.parameter_types = vec![RegisterType::long()];

        let analysis = analyze(&method, &NoOdexResolver).unwrap();
        let entry = analysis.node(0);
        assert_eq!(
            entry.pre_register_type(1),
            &RegisterType::reference("Lcom/example/Foo;")
        );
        assert_eq!(entry.pre_register_type(2), &RegisterType::long());
        assert_eq!(
            entry.pre_register_type(3),
            &RegisterType::long().wide_high_half().unwrap()
        );
        // The move copied the long's high half into v0.
        assert_eq!(
            analysis.node(1).pre_register_type(0),
            &RegisterType::long().wide_high_half().unwrap()
        );
    }
}
