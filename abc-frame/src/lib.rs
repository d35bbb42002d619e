use std::collections::BTreeSet;

use abc_cfg::{FlowGraphVisitor, Flowgraph};
use anyhow::Context;
use portal_abc_common::{Instruction, Label, Op};
use thiserror::Error;
use tracing::trace;

pub mod counter;
pub use counter::{FrameCounter, FrameSizes};

/// Abstract frame operations, one or more per decoded instruction.
///
/// `Output` is whatever representation an implementation produces for an
/// operation; the decoder discards it.
pub trait FrameModelVisitor<B> {
    type Output;

    fn visit(&mut self) {}
    fn visit_end(&mut self) {}

    /// Returns `false` to skip the block's instructions.
    fn visit_block(&mut self, block: B) -> bool;
    fn visit_edge(&mut self, from: B, to: B);
    fn visit_end_block(&mut self, block: B);
    /// Called before the operations of each instruction, with the same
    /// 1-based position `FrameModelEncoder::instruction_index` reports.
    fn visit_instruction(&mut self, _index: usize, _insn: &Instruction) {}

    fn no_frame_effect(&mut self, insn: &Instruction) -> Self::Output;
    fn consume_value(&mut self, insn: &Instruction, count: usize) -> Self::Output;
    fn produce_value(&mut self, insn: &Instruction) -> Self::Output;
    fn consume_and_produce_value(&mut self, insn: &Instruction, count: usize) -> Self::Output;
    fn branch(&mut self, insn: &Instruction, target: B) -> Self::Output;
    fn multiway_branch(&mut self, insn: &Instruction, targets: &[B]) -> Self::Output;
    fn getlocal(&mut self, insn: &Instruction, idx: usize) -> Self::Output;
    fn setlocal(&mut self, insn: &Instruction, idx: usize) -> Self::Output;
    /// In-place change to a local (increment, decrement, kill).
    fn modify_local(&mut self, insn: &Instruction, idx: usize);
    fn move_value_to_scope_stack(&mut self, insn: &Instruction) -> Self::Output;
    fn popscope(&mut self, insn: &Instruction) -> Self::Output;
    fn get_scope_object(&mut self, insn: &Instruction, idx: usize) -> Self::Output;
    /// Called before the `produce_value` of a `hasnext2`, which also
    /// rewrites both of its local operands.
    fn hasnext2(&mut self, insn: &Instruction, object_local: usize, index_local: usize);
    fn dup(&mut self, insn: &Instruction) -> Self::Output;
    fn swap(&mut self, insn: &Instruction) -> Self::Output;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("internal-only opcode {0} in a method body")]
    InternalOnly(Op),
    #[error("opcode {0} has no frame model")]
    Unrecognized(Op),
    #[error("unknown opcode byte {0:#04x}")]
    Unknown(u8),
    #[error("{op} is missing operand {index}")]
    MissingOperand { op: Op, index: usize },
    #[error("{op} operand {index} is out of range")]
    BadOperand { op: Op, index: usize },
    #[error("{op} targets label {label:?}, which starts no block")]
    UnresolvedLabel { op: Op, label: Label },
}

pub fn decode_opcode(byte: u8) -> Result<Op, DecodeError> {
    Op::from_byte(byte).ok_or(DecodeError::Unknown(byte))
}

/// Walks a flow graph and translates every instruction into calls on a
/// [`FrameModelVisitor`].
pub struct FrameModelEncoder<'g, G: Flowgraph, V> {
    graph: &'g G,
    visitor: V,
    visited: BTreeSet<G::Block>,
    current: Option<G::Block>,
    instruction_index: usize,
}

impl<'g, G: Flowgraph, V: FrameModelVisitor<G::Block>> FrameModelEncoder<'g, G, V> {
    pub fn new(graph: &'g G, visitor: V) -> Self {
        Self {
            graph,
            visitor,
            visited: BTreeSet::new(),
            current: None,
            instruction_index: 0,
        }
    }

    /// Drives the visitor over the whole graph and hands it back.
    pub fn run(mut self) -> anyhow::Result<V> {
        self.visitor.visit();
        let graph = self.graph;
        graph.traverse(&mut self)?;
        self.visitor.visit_end();
        Ok(self.visitor)
    }

    pub fn visitor(&self) -> &V {
        &self.visitor
    }

    pub fn current_block(&self) -> Option<G::Block> {
        self.current
    }

    /// Index of the instruction most recently decoded in the current block.
    pub fn instruction_index(&self) -> usize {
        self.instruction_index
    }

    fn block(&self, insn: &Instruction, label: Label) -> Result<G::Block, DecodeError> {
        self.graph
            .block_for(label)
            .ok_or(DecodeError::UnresolvedLabel { op: insn.op, label })
    }

    fn target(&self, insn: &Instruction) -> Result<G::Block, DecodeError> {
        let label = insn.target().ok_or(DecodeError::MissingOperand {
            op: insn.op,
            index: 0,
        })?;
        self.block(insn, label)
    }

    pub fn decode(&mut self, i: &Instruction) -> Result<(), DecodeError> {
        let v = &mut self.visitor;
        match i.op {
            Op::IfLt
            | Op::IfLe
            | Op::IfNlt
            | Op::IfNle
            | Op::IfGt
            | Op::IfGe
            | Op::IfNgt
            | Op::IfNge
            | Op::IfEq
            | Op::IfStrictEq
            | Op::IfNe
            | Op::IfStrictNe => {
                let t = self.target(i)?;
                let v = &mut self.visitor;
                v.consume_value(i, 2);
                v.branch(i, t);
            }
            Op::IfTrue | Op::IfFalse => {
                let t = self.target(i)?;
                let v = &mut self.visitor;
                v.consume_value(i, 1);
                v.branch(i, t);
            }
            Op::Jump => {
                let t = self.target(i)?;
                self.visitor.branch(i, t);
            }
            Op::LookupSwitch => {
                let targets = i
                    .branch_targets()
                    .map(|l| self.block(i, l))
                    .collect::<Result<Vec<_>, _>>()?;
                let v = &mut self.visitor;
                v.consume_value(i, 1);
                v.multiway_branch(i, &targets);
            }

            Op::PushNull
            | Op::PushUndefined
            | Op::PushTrue
            | Op::PushFalse
            | Op::PushNaN
            | Op::PushByte
            | Op::PushShort
            | Op::PushInt
            | Op::PushUInt
            | Op::PushDouble
            | Op::PushString
            | Op::PushNamespace
            | Op::NewFunction
            | Op::GetLex
            | Op::NewActivation
            | Op::NewCatch
            | Op::GetGlobalSlot => {
                v.produce_value(i);
            }

            Op::Bkpt
            | Op::Nop
            | Op::Label
            | Op::Debug
            | Op::DebugLine
            | Op::DebugFile
            | Op::BkptLine
            | Op::Timestamp
            | Op::Dxns
            | Op::ReturnVoid => {
                v.no_frame_effect(i);
            }
            Op::DxnsLate | Op::Throw | Op::ReturnValue | Op::Pop | Op::SetGlobalSlot => {
                v.consume_value(i, 1);
            }

            Op::GetLocal0 | Op::GetLocal1 | Op::GetLocal2 | Op::GetLocal3 => {
                v.getlocal(i, fixed_local(i)?);
            }
            Op::GetLocal => {
                v.getlocal(i, index(i, 0)?);
            }
            Op::SetLocal0 | Op::SetLocal1 | Op::SetLocal2 | Op::SetLocal3 => {
                v.setlocal(i, fixed_local(i)?);
            }
            Op::SetLocal => {
                v.setlocal(i, index(i, 0)?);
            }
            Op::Kill | Op::IncLocal | Op::IncLocalI | Op::DecLocal | Op::DecLocalI => {
                v.modify_local(i, index(i, 0)?);
            }
            Op::HasNext2 => {
                let (object, idx) = (index(i, 0)?, index(i, 1)?);
                v.hasnext2(i, object, idx);
                v.produce_value(i);
            }

            Op::FindPropStrict | Op::FindProperty | Op::FindDef => {
                v.consume_and_produce_value(i, rna(i)?);
            }
            Op::GetProperty | Op::GetDescendants | Op::DeleteProperty | Op::GetSuper | Op::IsType => {
                v.consume_and_produce_value(i, 1 + rna(i)?);
            }
            Op::SetProperty | Op::InitProperty | Op::SetSuper => {
                v.consume_value(i, 2 + rna(i)?);
            }
            Op::CallProperty | Op::CallPropLex | Op::ConstructProp | Op::CallSuper => {
                v.consume_and_produce_value(i, 1 + rna(i)? + index(i, 1)?);
            }
            Op::CallPropVoid | Op::CallSuperVoid => {
                v.consume_value(i, 1 + rna(i)? + index(i, 1)?);
            }

            Op::NewClass
            | Op::CheckFilter
            | Op::AsType
            | Op::Coerce
            | Op::ConvertB
            | Op::CoerceB
            | Op::CoerceO
            | Op::CoerceA
            | Op::ConvertI
            | Op::CoerceI
            | Op::ConvertU
            | Op::CoerceU
            | Op::ConvertD
            | Op::CoerceD
            | Op::UnPlus
            | Op::CoerceS
            | Op::ConvertO
            | Op::ConvertS
            | Op::EscXElem
            | Op::EscXAttr
            | Op::ApplyType
            | Op::GetSlot
            | Op::Not
            | Op::Negate
            | Op::Increment
            | Op::Decrement
            | Op::IncrementI
            | Op::DecrementI
            | Op::NegateI
            | Op::BitNot
            | Op::TypeOf
            | Op::Sxi1
            | Op::Sxi8
            | Op::Sxi16
            | Op::Li8
            | Op::Li16
            | Op::Li32
            | Op::Lf32
            | Op::Lf64 => {
                v.consume_and_produce_value(i, 1);
            }

            Op::AsTypeLate
            | Op::IsTypeLate
            | Op::LessThan
            | Op::GreaterThan
            | Op::LessEquals
            | Op::GreaterEquals
            | Op::Equals
            | Op::StrictEquals
            | Op::InstanceOf
            | Op::In
            | Op::Add
            | Op::Modulo
            | Op::Subtract
            | Op::Divide
            | Op::Multiply
            | Op::AddI
            | Op::SubtractI
            | Op::MultiplyI
            | Op::BitAnd
            | Op::BitOr
            | Op::BitXor
            | Op::LShift
            | Op::RShift
            | Op::URShift
            | Op::NextValue
            | Op::NextName
            | Op::HasNext => {
                v.consume_and_produce_value(i, 2);
            }
            Op::SetSlot | Op::Si8 | Op::Si16 | Op::Si32 | Op::Sf32 | Op::Sf64 => {
                v.consume_value(i, 2);
            }

            Op::CallStatic | Op::CallMethod => {
                v.consume_and_produce_value(i, index(i, 1)? + 1);
            }
            Op::Call => {
                v.consume_and_produce_value(i, 2 + index(i, 0)?);
            }
            Op::Construct => {
                v.consume_and_produce_value(i, 1 + index(i, 0)?);
            }
            Op::ConstructSuper => {
                v.consume_value(i, 1 + index(i, 0)?);
            }
            Op::NewObject => {
                v.consume_and_produce_value(i, 2 * index(i, 0)?);
            }
            Op::NewArray => {
                v.consume_and_produce_value(i, index(i, 0)?);
            }

            Op::PushScope | Op::PushWith => {
                v.move_value_to_scope_stack(i);
            }
            Op::PopScope => {
                v.popscope(i);
            }
            Op::GetScopeObject | Op::GetOuterScope => {
                v.get_scope_object(i, index(i, 0)?);
            }
            Op::GetGlobalScope => {
                v.get_scope_object(i, 0);
            }

            Op::Dup => {
                v.dup(i);
            }
            Op::Swap => {
                v.swap(i);
            }

            Op::CallInterface
            | Op::CallSuperId
            | Op::DeletePropertyLate
            | Op::SetPropertyLate
            | Op::Lix8
            | Op::Lix16
            | Op::FindPropGlobal
            | Op::FindPropGlobalStrict => return Err(DecodeError::InternalOnly(i.op)),
            Op::AddD => return Err(DecodeError::Unrecognized(i.op)),
        }
        Ok(())
    }
}

fn fixed_local(i: &Instruction) -> Result<usize, DecodeError> {
    i.op.fixed_local().ok_or(DecodeError::Unrecognized(i.op))
}

fn index(i: &Instruction, idx: usize) -> Result<usize, DecodeError> {
    let raw = i.int_operand(idx).ok_or(DecodeError::MissingOperand {
        op: i.op,
        index: idx,
    })?;
    usize::try_from(raw).map_err(|_| DecodeError::BadOperand {
        op: i.op,
        index: idx,
    })
}

fn rna(i: &Instruction) -> Result<usize, DecodeError> {
    i.name()
        .map(|n| n.runtime_name_allowance())
        .ok_or(DecodeError::MissingOperand { op: i.op, index: 0 })
}

impl<'g, G: Flowgraph, V: FrameModelVisitor<G::Block>> FlowGraphVisitor<G::Block>
    for FrameModelEncoder<'g, G, V>
{
    fn visit_block(&mut self, block: G::Block) -> bool {
        self.instruction_index = 0;
        if !self.visited.insert(block) {
            return false;
        }
        self.current = Some(block);
        self.visitor.visit_block(block)
    }

    fn visit_instruction(&mut self, insn: &Instruction) -> anyhow::Result<()> {
        self.instruction_index += 1;
        self.visitor.visit_instruction(self.instruction_index, insn);
        trace!(block = ?self.current, index = self.instruction_index, %insn, "decode");
        self.decode(insn).with_context(|| {
            format!(
                "in block {:?} at instruction {}",
                self.current, self.instruction_index
            )
        })
    }

    fn visit_end(&mut self, block: G::Block) -> anyhow::Result<()> {
        let graph = self.graph;
        for s in graph.successors(block).iter().cloned() {
            self.visitor.visit_edge(block, s);
        }
        self.visitor.visit_end_block(block);
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
