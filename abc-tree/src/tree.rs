use std::collections::BTreeMap;
use std::fmt::{Debug, Write};

use abc_cfg::BlockId;
use id_arena::{Arena, Id};
use portal_abc_common::{Instruction, Name, Op};

use crate::frame::{FrameSlot, FrameSpace};
use crate::TreeModelVisitor;

pub type NodeId<B = BlockId> = Id<Node<B>>;

#[derive(Clone, PartialEq, Debug)]
pub enum Node<B = BlockId> {
    Insn {
        insn: Instruction,
        operands: Vec<NodeId<B>>,
    },
    Branch {
        op: Op,
        targets: Vec<B>,
    },
    Merge {
        block: B,
        slot: FrameSlot,
        inputs: Vec<NodeId<B>>,
    },
    Param(usize),
    Exception {
        var: Option<Name>,
        ty: Option<Name>,
    },
    Underflow {
        op: Op,
        count: usize,
        space: FrameSpace,
    },
    Uninitialized(FrameSlot),
}

/// Reference IR: every node lives in one arena and is listed under the
/// block that was being visited when it was created. Parameters, handler
/// values and merge points made before the first block go in the prologue.
#[derive(Clone, Debug)]
pub struct Tree<B = BlockId> {
    pub nodes: Arena<Node<B>>,
    prologue: Vec<NodeId<B>>,
    blocks: Vec<(B, Vec<NodeId<B>>)>,
    current: Option<usize>,
    at: Option<usize>,
    origins: BTreeMap<NodeId<B>, usize>,
}

impl<B> Default for Tree<B> {
    fn default() -> Self {
        Self {
            nodes: Arena::new(),
            prologue: vec![],
            blocks: vec![],
            current: None,
            at: None,
            origins: BTreeMap::new(),
        }
    }
}

impl<B: Copy + PartialEq + Debug> Tree<B> {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, node: Node<B>) -> NodeId<B> {
        let id = self.nodes.alloc(node);
        match self.current {
            Some(c) => self.blocks[c].1.push(id),
            None => self.prologue.push(id),
        }
        if let Some(at) = self.at {
            self.origins.insert(id, at);
        }
        id
    }

    pub fn node(&self, id: NodeId<B>) -> &Node<B> {
        &self.nodes[id]
    }

    /// Blocks in visit order with the nodes created while visiting each.
    pub fn blocks(&self) -> &[(B, Vec<NodeId<B>>)] {
        &self.blocks
    }

    pub fn nodes_in(&self, block: B) -> &[NodeId<B>] {
        self.blocks
            .iter()
            .find(|(b, _)| *b == block)
            .map(|(_, n)| n.as_slice())
            .unwrap_or(&[])
    }

    pub fn merge_points(&self) -> impl Iterator<Item = (NodeId<B>, B, FrameSlot, &[NodeId<B>])> {
        self.nodes.iter().filter_map(|(id, n)| match n {
            Node::Merge {
                block,
                slot,
                inputs,
            } => Some((id, *block, *slot, inputs.as_slice())),
            _ => None,
        })
    }

    pub fn underflows(&self) -> usize {
        self.nodes
            .iter()
            .filter(|(_, n)| matches!(n, Node::Underflow { .. }))
            .count()
    }

    /// Nodes translated from `op`, in creation order.
    pub fn translations_of(&self, op: Op) -> Vec<NodeId<B>> {
        self.nodes
            .iter()
            .filter(|(_, n)| matches!(n, Node::Insn { insn, .. } if insn.op == op))
            .map(|(id, _)| id)
            .collect()
    }

    /// Position within its block of the instruction that created `id`.
    pub fn instruction_index(&self, id: NodeId<B>) -> Option<usize> {
        self.origins.get(&id).copied()
    }

    fn block_name(&self, b: B) -> String {
        match self.blocks.iter().position(|(k, _)| *k == b) {
            Some(i) => format!("b{i}"),
            None => format!("{b:?}"),
        }
    }

    fn render(&self, id: NodeId<B>) -> String {
        let ids = |v: &[NodeId<B>]| {
            v.iter()
                .map(|i| format!("%{}", i.index()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match &self.nodes[id] {
            Node::Insn { insn, operands } if operands.is_empty() => insn.to_string(),
            Node::Insn { insn, operands } => format!("{insn} ({})", ids(operands)),
            Node::Branch { op, targets } => format!(
                "{op} -> {}",
                targets
                    .iter()
                    .map(|t| self.block_name(*t))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Node::Merge {
                block,
                slot,
                inputs,
            } => format!("merge {slot} @{} [{}]", self.block_name(*block), ids(inputs)),
            Node::Param(i) => format!("param {i}"),
            Node::Exception { var, ty } => match (var, ty) {
                (Some(v), Some(t)) => format!("catch {v}: {t}"),
                (Some(v), None) => format!("catch {v}"),
                (None, Some(t)) => format!("catch _: {t}"),
                (None, None) => "catch".to_string(),
            },
            Node::Underflow { op, count, space } => format!("underflow {op} {space} x{count}"),
            Node::Uninitialized(slot) => format!("uninitialized {slot}"),
        }
    }

    /// Text listing of the prologue and every visited block.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let section = |out: &mut String, title: String, ids: &[NodeId<B>]| {
            let _ = writeln!(out, "{title}:");
            for id in ids {
                let _ = writeln!(out, "  %{} = {}", id.index(), self.render(*id));
            }
        };
        if !self.prologue.is_empty() {
            section(&mut out, "prologue".to_string(), &self.prologue);
        }
        for (i, (_, ids)) in self.blocks.iter().enumerate() {
            section(&mut out, format!("b{i}"), ids);
        }
        out
    }
}

impl<B: Copy + PartialEq + Debug> TreeModelVisitor<B> for Tree<B> {
    type Value = NodeId<B>;

    fn visit_block(&mut self, block: B) -> bool {
        self.blocks.push((block, vec![]));
        self.current = Some(self.blocks.len() - 1);
        true
    }
    fn visit_end_block(&mut self, _: B) {
        self.current = None;
        self.at = None;
    }
    fn visit_instruction(&mut self, index: usize, _: &Instruction) {
        self.at = Some(index);
    }

    fn translate(&mut self, insn: &Instruction, operands: Vec<NodeId<B>>) -> NodeId<B> {
        self.alloc(Node::Insn {
            insn: insn.clone(),
            operands,
        })
    }
    fn translate_branch(&mut self, insn: &Instruction, targets: &[B]) -> NodeId<B> {
        self.alloc(Node::Branch {
            op: insn.op,
            targets: targets.to_vec(),
        })
    }
    fn add_merge_point(&mut self, block: B, slot: FrameSlot) -> NodeId<B> {
        self.alloc(Node::Merge {
            block,
            slot,
            inputs: vec![],
        })
    }
    fn add_value(&mut self, merge: &NodeId<B>, value: NodeId<B>) {
        if let Node::Merge { inputs, .. } = &mut self.nodes[*merge] {
            inputs.push(value);
        }
    }
    fn value_stack_underflow(&mut self, insn: &Instruction, count: usize) -> NodeId<B> {
        self.alloc(Node::Underflow {
            op: insn.op,
            count,
            space: FrameSpace::Values,
        })
    }
    fn scope_stack_underflow(&mut self, insn: &Instruction, count: usize) -> NodeId<B> {
        self.alloc(Node::Underflow {
            op: insn.op,
            count,
            space: FrameSpace::Scopes,
        })
    }
    fn translate_parameter(&mut self, idx: usize) -> NodeId<B> {
        self.alloc(Node::Param(idx))
    }
    fn translate_exception_variable(&mut self, var: Option<&Name>, ty: Option<&Name>) -> NodeId<B> {
        self.alloc(Node::Exception {
            var: var.cloned(),
            ty: ty.cloned(),
        })
    }
    fn uninitialized(&mut self, slot: FrameSlot) -> NodeId<B> {
        self.alloc(Node::Uninitialized(slot))
    }
}
