use std::collections::{BTreeMap, BTreeSet};

use abc_frame::FrameModelVisitor;
use portal_abc_common::Instruction;

use crate::frame::{FrameSlot, FrameSpace, StackDepths};

/// First pass: records which blocks define each frame slot and the stack
/// depths every block is entered and left with.
///
/// Parameters count as definitions made by the start block. A catch target
/// is entered with the caught value on an otherwise empty stack.
pub struct SetupPass<B> {
    start: B,
    catch_targets: Vec<B>,
    param_count: usize,
    defs: BTreeMap<FrameSlot, BTreeSet<B>>,
    counts: [usize; 3],
    entry: BTreeMap<B, StackDepths>,
    exit: BTreeMap<B, StackDepths>,
    current: Option<B>,
    depths: StackDepths,
}

impl<B: Copy + Ord> SetupPass<B> {
    pub fn new(start: B, catch_targets: Vec<B>, param_count: usize) -> Self {
        Self {
            start,
            catch_targets,
            param_count,
            defs: BTreeMap::new(),
            counts: [param_count, 0, 0],
            entry: BTreeMap::new(),
            exit: BTreeMap::new(),
            current: None,
            depths: StackDepths::default(),
        }
    }

    pub fn def_sites(&self) -> &BTreeMap<FrameSlot, BTreeSet<B>> {
        &self.defs
    }

    /// Number of distinct slots seen in `space`.
    pub fn slot_count(&self, space: FrameSpace) -> usize {
        self.counts[space.index()]
    }

    pub fn entry_depths(&self, block: B) -> StackDepths {
        self.entry.get(&block).copied().unwrap_or_default()
    }

    pub fn exit_depths(&self) -> &BTreeMap<B, StackDepths> {
        &self.exit
    }

    fn touch(&mut self, slot: FrameSlot) {
        let c = &mut self.counts[slot.space.index()];
        *c = (*c).max(slot.index + 1);
    }

    fn define(&mut self, slot: FrameSlot) {
        self.touch(slot);
        if let Some(b) = self.current {
            self.defs.entry(slot).or_default().insert(b);
        }
    }

    fn push_value(&mut self) {
        self.define(FrameSlot::value(self.depths.values));
        self.depths.values += 1;
    }

    fn pop_values(&mut self, count: usize) {
        self.depths.values = self.depths.values.saturating_sub(count);
    }
}

impl<B: Copy + Ord> FrameModelVisitor<B> for SetupPass<B> {
    type Output = ();

    fn visit_block(&mut self, block: B) -> bool {
        let depths = self.entry.get(&block).copied().unwrap_or_else(|| {
            if self.catch_targets.contains(&block) {
                StackDepths {
                    values: 1,
                    scopes: 0,
                }
            } else {
                StackDepths::default()
            }
        });
        self.entry.insert(block, depths);
        self.depths = depths;
        self.current = Some(block);
        if block == self.start {
            for i in 0..self.param_count {
                self.define(FrameSlot::local(i));
            }
        }
        true
    }
    fn visit_edge(&mut self, _: B, to: B) {
        self.entry.insert(to, self.depths);
    }
    fn visit_end_block(&mut self, block: B) {
        for i in 0..self.depths.values {
            self.touch(FrameSlot::value(i));
        }
        for i in 0..self.depths.scopes {
            self.touch(FrameSlot::scope(i));
        }
        self.exit.insert(block, self.depths);
        self.current = None;
    }

    fn no_frame_effect(&mut self, _: &Instruction) {}
    fn consume_value(&mut self, _: &Instruction, count: usize) {
        self.pop_values(count);
    }
    fn produce_value(&mut self, _: &Instruction) {
        self.push_value();
    }
    fn consume_and_produce_value(&mut self, _: &Instruction, count: usize) {
        self.pop_values(count);
        self.push_value();
    }
    fn branch(&mut self, _: &Instruction, _: B) {}
    fn multiway_branch(&mut self, _: &Instruction, _: &[B]) {}
    fn getlocal(&mut self, _: &Instruction, idx: usize) {
        self.touch(FrameSlot::local(idx));
        self.push_value();
    }
    fn setlocal(&mut self, _: &Instruction, idx: usize) {
        self.pop_values(1);
        self.define(FrameSlot::local(idx));
    }
    fn modify_local(&mut self, _: &Instruction, idx: usize) {
        self.define(FrameSlot::local(idx));
    }
    fn move_value_to_scope_stack(&mut self, _: &Instruction) {
        self.pop_values(1);
        self.define(FrameSlot::scope(self.depths.scopes));
        self.depths.scopes += 1;
    }
    fn popscope(&mut self, _: &Instruction) {
        self.depths.scopes = self.depths.scopes.saturating_sub(1);
    }
    fn get_scope_object(&mut self, _: &Instruction, idx: usize) {
        self.touch(FrameSlot::scope(idx));
        self.push_value();
    }
    fn hasnext2(&mut self, _: &Instruction, object_local: usize, index_local: usize) {
        self.define(FrameSlot::local(object_local));
        self.define(FrameSlot::local(index_local));
    }
    fn dup(&mut self, _: &Instruction) {
        self.push_value();
    }
    fn swap(&mut self, _: &Instruction) {
        let n = self.depths.values;
        if n >= 2 {
            self.define(FrameSlot::value(n - 1));
            self.define(FrameSlot::value(n - 2));
        }
    }
}
