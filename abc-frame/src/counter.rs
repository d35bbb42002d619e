use std::collections::BTreeMap;

use portal_abc_common::Instruction;

use crate::FrameModelVisitor;

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct FrameSizes {
    pub max_stack: usize,
    pub max_scope: usize,
    pub max_local: usize,
}

/// Computes the frame sizes a method body needs.
///
/// Depths never go negative; a catch target starts with the caught value on
/// the stack and `initial_scope` entries on the scope stack.
pub struct FrameCounter<B> {
    catch_targets: Vec<B>,
    initial_scope: usize,
    entry: BTreeMap<B, (usize, usize)>,
    stack: usize,
    scope: usize,
    pub sizes: FrameSizes,
}

impl<B: Copy + Ord> FrameCounter<B> {
    pub fn new(catch_targets: Vec<B>, param_count: usize, initial_scope: usize) -> Self {
        Self {
            catch_targets,
            initial_scope,
            entry: BTreeMap::new(),
            stack: 0,
            scope: initial_scope,
            sizes: FrameSizes {
                max_stack: 0,
                max_scope: initial_scope,
                max_local: param_count,
            },
        }
    }

    fn adjust_stack(&mut self, pop: usize, push: usize) {
        self.stack = self.stack.saturating_sub(pop) + push;
        self.sizes.max_stack = self.sizes.max_stack.max(self.stack);
    }

    fn touch_local(&mut self, idx: usize) {
        self.sizes.max_local = self.sizes.max_local.max(idx + 1);
    }
}

impl<B: Copy + Ord> FrameModelVisitor<B> for FrameCounter<B> {
    type Output = ();

    fn visit_block(&mut self, block: B) -> bool {
        (self.stack, self.scope) = if self.catch_targets.contains(&block) {
            (1, self.initial_scope)
        } else {
            self.entry
                .get(&block)
                .cloned()
                .unwrap_or((self.stack, self.scope))
        };
        self.sizes.max_stack = self.sizes.max_stack.max(self.stack);
        true
    }
    fn visit_edge(&mut self, _: B, to: B) {
        self.entry.entry(to).or_insert((self.stack, self.scope));
    }
    fn visit_end_block(&mut self, _: B) {}

    fn no_frame_effect(&mut self, _: &Instruction) {}
    fn consume_value(&mut self, _: &Instruction, count: usize) {
        self.adjust_stack(count, 0);
    }
    fn produce_value(&mut self, _: &Instruction) {
        self.adjust_stack(0, 1);
    }
    fn consume_and_produce_value(&mut self, _: &Instruction, count: usize) {
        self.adjust_stack(count, 1);
    }
    fn branch(&mut self, _: &Instruction, _: B) {}
    fn multiway_branch(&mut self, _: &Instruction, _: &[B]) {}
    fn getlocal(&mut self, _: &Instruction, idx: usize) {
        self.touch_local(idx);
        self.adjust_stack(0, 1);
    }
    fn setlocal(&mut self, _: &Instruction, idx: usize) {
        self.touch_local(idx);
        self.adjust_stack(1, 0);
    }
    fn modify_local(&mut self, _: &Instruction, idx: usize) {
        self.touch_local(idx);
    }
    fn move_value_to_scope_stack(&mut self, _: &Instruction) {
        self.adjust_stack(1, 0);
        self.scope += 1;
        self.sizes.max_scope = self.sizes.max_scope.max(self.scope);
    }
    fn popscope(&mut self, _: &Instruction) {
        self.scope = self.scope.saturating_sub(1);
    }
    fn get_scope_object(&mut self, _: &Instruction, _: usize) {
        self.adjust_stack(0, 1);
    }
    fn hasnext2(&mut self, _: &Instruction, object_local: usize, index_local: usize) {
        self.touch_local(object_local);
        self.touch_local(index_local);
    }
    fn dup(&mut self, _: &Instruction) {
        self.adjust_stack(0, 1);
    }
    fn swap(&mut self, _: &Instruction) {}
}
