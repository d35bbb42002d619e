use std::collections::BTreeMap;
use std::fmt::Debug;

use abc_frame::FrameModelVisitor;
use portal_abc_common::Instruction;
use tracing::{debug, warn};

use crate::frame::{Frame, FrameSlot, FrameSpace, Slot, StackDepths};
use crate::{EncodeError, EncoderOptions, TreeModelVisitor};

/// Second pass: replays every block against a simulated frame and hands
/// each operation to the client.
///
/// `frames` holds the frame each block is entered with. A visit works on a
/// copy, so edges taken after the target has been visited still reach the
/// target's merge points.
///
/// Errors name blocks by their position in `preorder`, the order the
/// traversal reports them in.
pub struct DrivingPass<'v, B, V: TreeModelVisitor<B>> {
    client: &'v mut V,
    options: EncoderOptions,
    numbers: BTreeMap<B, usize>,
    frames: BTreeMap<B, Frame<V::Value>>,
    handlers: Vec<B>,
    frame: Frame<V::Value>,
    exit: BTreeMap<B, StackDepths>,
    underflows: usize,
    divergence: Option<EncodeError>,
}

impl<'v, B: Copy + Ord + Debug, V: TreeModelVisitor<B>> DrivingPass<'v, B, V> {
    pub fn new(
        client: &'v mut V,
        frames: BTreeMap<B, Frame<V::Value>>,
        handlers: Vec<B>,
        preorder: &[B],
        options: EncoderOptions,
    ) -> Self {
        Self {
            client,
            options,
            numbers: preorder.iter().enumerate().map(|(i, b)| (*b, i)).collect(),
            frames,
            handlers,
            frame: Frame::default(),
            exit: BTreeMap::new(),
            underflows: 0,
            divergence: None,
        }
    }

    /// Exit depths per visited block and the number of underflows seen.
    pub fn finish(self) -> Result<(BTreeMap<B, StackDepths>, usize), EncodeError> {
        match self.divergence {
            Some(e) => Err(e),
            None => Ok((self.exit, self.underflows)),
        }
    }

    fn number(&mut self, block: B) -> usize {
        let next = self.numbers.len();
        *self.numbers.entry(block).or_insert(next)
    }

    fn read(&mut self, slot: FrameSlot, s: Slot<V::Value>) -> V::Value {
        match s {
            Slot::Value(v) | Slot::Merge(v) => v,
            Slot::Empty => self.client.uninitialized(slot),
        }
    }

    fn pop_value(&mut self) -> Option<V::Value> {
        let s = self.frame.values.pop()?;
        let slot = FrameSlot::value(self.frame.values.len());
        Some(self.read(slot, s))
    }

    /// Pops `count` values, top of stack first.
    fn pop_operands(&mut self, count: usize) -> Option<Vec<V::Value>> {
        if self.frame.values.len() < count {
            return None;
        }
        let mut ops = Vec::with_capacity(count);
        for _ in 0..count {
            ops.extend(self.pop_value());
        }
        Some(ops)
    }

    fn push_value(&mut self, v: V::Value) -> V::Value {
        self.frame.values.push(Slot::Value(v.clone()));
        v
    }

    fn value_underflow(&mut self, insn: &Instruction, count: usize) -> V::Value {
        self.underflows += 1;
        debug!(%insn, count, depth = self.frame.values.len(), "value stack underflow");
        self.client.value_stack_underflow(insn, count)
    }

    fn scope_underflow(&mut self, insn: &Instruction, count: usize) -> V::Value {
        self.underflows += 1;
        debug!(%insn, count, depth = self.frame.scopes.len(), "scope stack underflow");
        self.client.scope_stack_underflow(insn, count)
    }

    fn store_local(&mut self, idx: usize, v: V::Value) {
        let slot = FrameSlot::local(idx);
        self.frame.set(slot, Slot::Value(v.clone()));
        if !self.options.pessimistic_catch {
            return;
        }
        for h in self.handlers.iter() {
            if let Some(Slot::Merge(m)) = self.frames.get(h).and_then(|f| f.get(slot)) {
                self.client.add_value(m, v.clone());
            }
        }
    }
}

impl<'v, B: Copy + Ord + Debug, V: TreeModelVisitor<B>> FrameModelVisitor<B>
    for DrivingPass<'v, B, V>
{
    type Output = V::Value;

    fn visit_block(&mut self, block: B) -> bool {
        if self.divergence.is_some() || !self.client.visit_block(block) {
            return false;
        }
        self.frame = self.frames.entry(block).or_default().clone();
        true
    }

    fn visit_edge(&mut self, from: B, to: B) {
        let (from_n, to_n) = (self.number(from), self.number(to));
        let target = self.frames.entry(to).or_default();
        for space in FrameSpace::ALL {
            for (i, s) in self.frame.slots(space).iter().enumerate() {
                let Some(v) = s.value() else {
                    continue;
                };
                let slot = FrameSlot::new(space, i);
                match target.get(slot) {
                    Some(Slot::Merge(m)) => self.client.add_value(m, v.clone()),
                    Some(Slot::Value(existing)) => {
                        if existing == v {
                            continue;
                        }
                        if self.options.verify_edges {
                            if self.divergence.is_none() {
                                self.divergence = Some(EncodeError::DivergentEdge {
                                    from: from_n,
                                    to: to_n,
                                    slot,
                                });
                            }
                        } else {
                            warn!(from = from_n, to = to_n, %slot, "edge value differs from the one in place");
                        }
                    }
                    _ => target.set(slot, Slot::Value(v.clone())),
                }
            }
        }
    }

    fn visit_end_block(&mut self, block: B) {
        self.exit.insert(block, self.frame.depths());
        self.client.visit_end_block(block);
    }
    fn visit_instruction(&mut self, index: usize, insn: &Instruction) {
        self.client.visit_instruction(index, insn);
    }

    fn no_frame_effect(&mut self, insn: &Instruction) -> V::Value {
        self.client.translate(insn, vec![])
    }
    fn consume_value(&mut self, insn: &Instruction, count: usize) -> V::Value {
        match self.pop_operands(count) {
            Some(ops) => self.client.translate(insn, ops),
            None => self.value_underflow(insn, count),
        }
    }
    fn produce_value(&mut self, insn: &Instruction) -> V::Value {
        let v = self.client.translate(insn, vec![]);
        self.push_value(v)
    }
    fn consume_and_produce_value(&mut self, insn: &Instruction, count: usize) -> V::Value {
        match self.pop_operands(count) {
            Some(ops) => {
                let v = self.client.translate(insn, ops);
                self.push_value(v)
            }
            None => self.value_underflow(insn, count),
        }
    }
    fn branch(&mut self, insn: &Instruction, target: B) -> V::Value {
        self.client.translate_branch(insn, &[target])
    }
    fn multiway_branch(&mut self, insn: &Instruction, targets: &[B]) -> V::Value {
        self.client.translate_branch(insn, targets)
    }
    fn getlocal(&mut self, insn: &Instruction, idx: usize) -> V::Value {
        let slot = FrameSlot::local(idx);
        let s = self.frame.get(slot).cloned().unwrap_or(Slot::Empty);
        let local = self.read(slot, s);
        let v = self.client.translate(insn, vec![local]);
        self.push_value(v)
    }
    fn setlocal(&mut self, insn: &Instruction, idx: usize) -> V::Value {
        let v = match self.pop_value() {
            Some(o) => self.client.translate(insn, vec![o]),
            None => self.value_underflow(insn, 1),
        };
        self.store_local(idx, v.clone());
        v
    }
    fn modify_local(&mut self, insn: &Instruction, _: usize) {
        self.client.translate(insn, vec![]);
    }
    fn move_value_to_scope_stack(&mut self, insn: &Instruction) -> V::Value {
        match self.pop_value() {
            Some(o) => {
                let v = self.client.translate(insn, vec![o]);
                self.frame.scopes.push(Slot::Value(v.clone()));
                v
            }
            None => self.value_underflow(insn, 1),
        }
    }
    fn popscope(&mut self, insn: &Instruction) -> V::Value {
        match self.frame.scopes.pop() {
            Some(s) => {
                let scope = self.read(FrameSlot::scope(self.frame.scopes.len()), s);
                self.client.translate(insn, vec![scope])
            }
            None => self.scope_underflow(insn, 1),
        }
    }
    fn get_scope_object(&mut self, insn: &Instruction, idx: usize) -> V::Value {
        match self.frame.scopes.get(idx).cloned() {
            Some(s) => {
                let scope = self.read(FrameSlot::scope(idx), s);
                let v = self.client.translate(insn, vec![scope]);
                self.push_value(v)
            }
            None => self.scope_underflow(insn, 1),
        }
    }
    fn hasnext2(&mut self, _: &Instruction, _: usize, _: usize) {}
    fn dup(&mut self, insn: &Instruction) -> V::Value {
        match self.frame.values.last().cloned() {
            Some(s) => {
                let top = self.read(FrameSlot::value(self.frame.values.len() - 1), s);
                let v = self.client.translate(insn, vec![top]);
                self.push_value(v)
            }
            None => self.value_underflow(insn, 1),
        }
    }
    fn swap(&mut self, insn: &Instruction) -> V::Value {
        let n = self.frame.values.len();
        if n < 2 {
            return self.value_underflow(insn, 2);
        }
        let top = self.frame.values[n - 1].clone();
        let top = self.read(FrameSlot::value(n - 1), top);
        let moved = self.client.translate(insn, vec![top]);
        self.frame.values[n - 1] = self.frame.values[n - 2].clone();
        self.frame.values[n - 2] = Slot::Value(moved);
        let new_top = self.frame.values[n - 1].clone();
        self.read(FrameSlot::value(n - 1), new_top)
    }
}
