use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::iter::once;

use id_arena::{Arena, Id};
use portal_abc_common::{Instruction, InstructionList, Label, Op};
use tracing::debug;

pub mod dom;
pub mod method;
pub use dom::DominatorTree;
pub use method::{ExceptionInfo, MethodBody};

pub type BlockId = Id<BasicBlock>;

/// Receives a flow graph walk: one `visit_block` per reported block, then,
/// if it returned `true`, every instruction and a closing `visit_end`.
pub trait FlowGraphVisitor<B> {
    fn visit_block(&mut self, block: B) -> bool;
    fn visit_instruction(&mut self, insn: &Instruction) -> anyhow::Result<()>;
    fn visit_end(&mut self, block: B) -> anyhow::Result<()>;
}

pub trait Flowgraph {
    type Block: Copy + Eq + Ord + Hash + Debug;
    fn start_block(&self) -> Self::Block;
    fn block_for(&self, label: Label) -> Option<Self::Block>;
    fn catch_targets(&self) -> &[Self::Block];
    fn successors(&self, block: Self::Block) -> &[Self::Block];
    fn instructions(&self, block: Self::Block) -> &[Instruction];

    /// The start block followed by every catch target.
    fn roots(&self) -> Vec<Self::Block> {
        once(self.start_block())
            .chain(self.catch_targets().iter().cloned())
            .collect()
    }
    /// Depth-first preorder from the roots; each reachable block appears once.
    fn preorder(&self) -> Vec<Self::Block> {
        let mut seen = BTreeSet::new();
        let mut out = vec![];
        for r in self.roots() {
            let mut stack = vec![r];
            while let Some(b) = stack.pop() {
                if !seen.insert(b) {
                    continue;
                }
                out.push(b);
                stack.extend(self.successors(b).iter().rev().filter(|s| !seen.contains(*s)));
            }
        }
        out
    }
    fn traverse<V: FlowGraphVisitor<Self::Block> + ?Sized>(
        &self,
        visitor: &mut V,
    ) -> anyhow::Result<()> {
        for b in self.preorder() {
            if visitor.visit_block(b) {
                for i in self.instructions(b) {
                    visitor.visit_instruction(i)?;
                }
                visitor.visit_end(b)?;
            }
        }
        Ok(())
    }
    fn dominance_frontiers(&self) -> BTreeMap<Self::Block, BTreeSet<Self::Block>> {
        DominatorTree::compute(self).frontiers()
    }
}

#[derive(Clone, Default, Debug)]
pub struct BasicBlock {
    pub insns: Vec<Instruction>,
    pub succs: Vec<BlockId>,
}
impl BasicBlock {
    pub fn can_fall_through(&self) -> bool {
        self.insns.last().is_none_or(|i| i.op.can_fall_through())
    }
}

#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    pub blocks: Arena<BasicBlock>,
    entry_order: Vec<BlockId>,
    start: BlockId,
    by_label: BTreeMap<Label, BlockId>,
    catches: Vec<BlockId>,
    dom: OnceCell<DominatorTree<BlockId>>,
}

impl ControlFlowGraph {
    pub fn build(insns: &InstructionList, exceptions: &[ExceptionInfo]) -> Self {
        let catch_labels: BTreeSet<Label> = exceptions.iter().map(|e| e.target).collect();
        let mut blocks: Arena<BasicBlock> = Arena::new();
        let start = blocks.alloc(Default::default());
        let mut entry_order = vec![start];
        let mut by_label = BTreeMap::new();
        let mut catches = vec![];
        let mut pending: Vec<(BlockId, Vec<Label>)> = vec![];

        let labels = insns.active_labels();
        let mut labels = labels.iter().peekable();
        let mut current = start;
        let mut transferred = false;
        for (i, insn) in insns.instructions().iter().enumerate() {
            let at_label = labels.peek().is_some_and(|(_, p)| *p == i);
            if at_label || transferred {
                if !blocks[current].insns.is_empty() {
                    let prev = current;
                    current = blocks.alloc(Default::default());
                    entry_order.push(current);
                    if blocks[prev].can_fall_through() {
                        blocks[prev].succs.push(current);
                    }
                }
                while let Some((l, _)) = labels.next_if(|(_, p)| *p == i) {
                    by_label.insert(*l, current);
                    if catch_labels.contains(l) && !catches.contains(&current) {
                        catches.push(current);
                    }
                }
            }
            blocks[current].insns.push(insn.clone());
            transferred = insn.op.is_transfer_of_control();
            if insn.op.is_branch() {
                pending.push((current, insn.branch_targets().collect()));
            }
        }
        for (from, targets) in pending {
            for l in targets {
                if let Some(t) = by_label.get(&l) {
                    blocks[from].succs.push(*t);
                }
            }
        }
        debug!(
            blocks = entry_order.len(),
            catch_targets = catches.len(),
            "built control flow graph"
        );
        Self {
            blocks,
            entry_order,
            start,
            by_label,
            catches,
            dom: OnceCell::new(),
        }
    }

    /// Blocks in the order their first instruction appears.
    pub fn blocks_in_entry_order(&self) -> &[BlockId] {
        &self.entry_order
    }

    pub fn is_catch_target(&self, b: BlockId) -> bool {
        self.catches.contains(&b)
    }

    pub fn dominator_tree(&self) -> &DominatorTree<BlockId> {
        self.dom.get_or_init(|| DominatorTree::compute(self))
    }

    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.dominator_tree().is_reachable(b)
    }

    /// Zero-based source line nearest the start of `b`: a `debugline` inside
    /// the block, or else the last one in an earlier block, which is taken to
    /// describe the following line.
    pub fn find_line_number(&self, b: BlockId) -> Option<u32> {
        let line = |i: &Instruction| {
            (i.op == Op::DebugLine)
                .then(|| i.immediate())
                .flatten()
                .and_then(|l| u32::try_from(l).ok())
        };
        if let Some(l) = self.blocks[b].insns.iter().find_map(line) {
            return Some(l.saturating_sub(1));
        }
        let pos = self.entry_order.iter().position(|k| *k == b)?;
        self.entry_order[..pos]
            .iter()
            .rev()
            .find_map(|k| self.blocks[*k].insns.iter().rev().find_map(line))
    }
}

impl Flowgraph for ControlFlowGraph {
    type Block = BlockId;

    fn start_block(&self) -> BlockId {
        self.start
    }
    fn block_for(&self, label: Label) -> Option<BlockId> {
        self.by_label.get(&label).cloned()
    }
    fn catch_targets(&self) -> &[BlockId] {
        &self.catches
    }
    fn successors(&self, block: BlockId) -> &[BlockId] {
        &self.blocks[block].succs
    }
    fn instructions(&self, block: BlockId) -> &[Instruction] {
        &self.blocks[block].insns
    }
    fn dominance_frontiers(&self) -> BTreeMap<BlockId, BTreeSet<BlockId>> {
        self.dominator_tree().frontiers()
    }
}

#[cfg(test)]
mod tests {
    use portal_abc_common::{Instruction, InstructionList, Op};
    use pretty_assertions::assert_eq;

    use super::*;

    fn ops(cfg: &ControlFlowGraph, b: BlockId) -> Vec<Op> {
        cfg.instructions(b).iter().map(|i| i.op).collect()
    }

    #[test]
    fn splits_at_labels_and_transfers() {
        let mut il = InstructionList::new();
        let l_else = il.new_label();
        let l_join = il.new_label();
        il.add_op(Op::PushTrue)
            .add(Instruction::branch(Op::IfFalse, l_else))
            .add_imm(Op::PushByte, 1)
            .add(Instruction::branch(Op::Jump, l_join))
            .label_next(l_else)
            .add_imm(Op::PushByte, 2)
            .label_next(l_join)
            .add_op(Op::ReturnValue);
        let cfg = ControlFlowGraph::build(&il, &[]);
        let order = cfg.blocks_in_entry_order().to_vec();
        assert_eq!(order.len(), 4);
        assert_eq!(ops(&cfg, order[0]), vec![Op::PushTrue, Op::IfFalse]);
        assert_eq!(ops(&cfg, order[1]), vec![Op::PushByte, Op::Jump]);
        assert_eq!(ops(&cfg, order[2]), vec![Op::PushByte]);
        assert_eq!(ops(&cfg, order[3]), vec![Op::ReturnValue]);
        assert_eq!(cfg.successors(order[0]), &[order[1], order[2]]);
        assert_eq!(cfg.successors(order[1]), &[order[3]]);
        assert_eq!(cfg.successors(order[2]), &[order[3]]);
        assert_eq!(cfg.block_for(l_join), Some(order[3]));
        assert_eq!(cfg.preorder(), vec![order[0], order[1], order[3], order[2]]);
    }

    #[test]
    fn lookupswitch_edges_and_no_fall_through() {
        let mut il = InstructionList::new();
        let (d, a, b) = (il.new_label(), il.new_label(), il.new_label());
        il.add_imm(Op::PushByte, 0)
            .add(Instruction::lookupswitch(d, [a, b]))
            .label_next(a)
            .add_op(Op::ReturnVoid)
            .label_next(b)
            .add_op(Op::ReturnVoid)
            .label_next(d)
            .add_op(Op::ReturnVoid);
        let cfg = ControlFlowGraph::build(&il, &[]);
        let order = cfg.blocks_in_entry_order();
        assert_eq!(cfg.successors(order[0]), &[order[3], order[1], order[2]]);
        assert!(cfg.successors(order[1]).is_empty());
    }

    #[test]
    fn catch_targets_are_recorded_and_traversed() {
        let mut il = InstructionList::new();
        let (from, to, handler) = (il.new_label(), il.new_label(), il.new_label());
        il.label_next(from)
            .add_op(Op::GetLocal0)
            .add_op(Op::PushScope)
            .add_op(Op::ReturnVoid)
            .label_current(to)
            .label_next(handler)
            .add_op(Op::Pop)
            .add_op(Op::ReturnVoid);
        let cfg = ControlFlowGraph::build(&il, &[ExceptionInfo::new(from, to, handler)]);
        let h = cfg.block_for(handler).unwrap();
        assert!(cfg.is_catch_target(h));
        assert_eq!(cfg.roots(), vec![cfg.start_block(), h]);
        assert!(cfg.is_reachable(h));
        // the `to` label splits the protected range from its return
        assert_eq!(cfg.blocks_in_entry_order().len(), 3);
        assert_eq!(cfg.preorder().last(), Some(&h));
    }

    #[test]
    fn line_numbers_search_backwards() {
        let mut il = InstructionList::new();
        let l = il.new_label();
        il.add_imm(Op::DebugLine, 10)
            .add_op(Op::Nop)
            .label_next(l)
            .add_op(Op::Nop)
            .add_op(Op::ReturnVoid);
        let cfg = ControlFlowGraph::build(&il, &[]);
        assert_eq!(cfg.find_line_number(cfg.start_block()), Some(9));
        assert_eq!(cfg.find_line_number(cfg.block_for(l).unwrap()), Some(10));
    }
}
