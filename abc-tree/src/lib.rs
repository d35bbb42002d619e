use std::collections::BTreeMap;
use std::fmt::Debug;

use abc_cfg::{Flowgraph, MethodBody};
use abc_frame::FrameModelEncoder;
use anyhow::Context;
use portal_abc_common::{Instruction, Label, Name};
use thiserror::Error;
use tracing::debug;

pub mod drive;
pub mod frame;
pub mod phi;
pub mod setup;
pub mod tree;
pub use drive::DrivingPass;
pub use frame::{Frame, FrameSlot, FrameSpace, Slot, StackDepths};
pub use setup::SetupPass;
pub use tree::{Node, Tree};

/// Builds a client IR from the frame operations of a method.
///
/// The encoder never inspects a `Value`; it stores values in frame slots,
/// hands them back as operands, and compares them when two control flow
/// edges disagree about a slot.
pub trait TreeModelVisitor<B> {
    type Value: Clone + PartialEq + Debug;

    fn visit(&mut self) {}
    fn visit_end(&mut self) {}
    /// Returns `false` to skip the block.
    fn visit_block(&mut self, _block: B) -> bool {
        true
    }
    fn visit_end_block(&mut self, _block: B) {}
    /// Called before an instruction is translated. `index` is its 1-based
    /// position in the block most recently passed to `visit_block`.
    fn visit_instruction(&mut self, _index: usize, _insn: &Instruction) {}

    /// `operands` are in pop order: the former top of stack comes first.
    fn translate(&mut self, insn: &Instruction, operands: Vec<Self::Value>) -> Self::Value;
    fn translate_branch(&mut self, insn: &Instruction, targets: &[B]) -> Self::Value;
    fn add_merge_point(&mut self, block: B, slot: FrameSlot) -> Self::Value;
    fn add_value(&mut self, merge: &Self::Value, value: Self::Value);
    fn value_stack_underflow(&mut self, insn: &Instruction, count: usize) -> Self::Value;
    fn scope_stack_underflow(&mut self, insn: &Instruction, count: usize) -> Self::Value;
    fn translate_parameter(&mut self, idx: usize) -> Self::Value;
    fn translate_exception_variable(
        &mut self,
        var: Option<&Name>,
        ty: Option<&Name>,
    ) -> Self::Value;
    /// A slot read before anything was stored in it on this path.
    fn uninitialized(&mut self, slot: FrameSlot) -> Self::Value;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EncoderOptions {
    /// Fail when an edge brings a value that differs from the one already
    /// stored in a slot without a merge point.
    pub verify_edges: bool,
    /// Feed every `setlocal` into the merge points of every handler.
    pub pessimistic_catch: bool,
}
impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            verify_edges: cfg!(debug_assertions),
            pessimistic_catch: true,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("exception handler {0:?} starts no block")]
    UnresolvedHandler(Label),
    /// `from` and `to` are positions in the traversal preorder, the same
    /// numbering `Tree::dump` uses when every block is visited.
    #[error("edge b{from} -> b{to} disagrees about {slot}, which has no merge point")]
    DivergentEdge {
        from: usize,
        to: usize,
        slot: FrameSlot,
    },
}

#[derive(Clone, Debug)]
pub struct EncodingSummary<B> {
    /// Merge points placed at iterated dominance frontiers, in placement order.
    pub merge_points: Vec<(B, FrameSlot)>,
    pub handler_merge_points: usize,
    pub setup_exit_depths: BTreeMap<B, StackDepths>,
    pub driven_exit_depths: BTreeMap<B, StackDepths>,
    pub underflows: usize,
}
impl<B: Copy + Ord> EncodingSummary<B> {
    pub fn merge_points_at(&self, block: B) -> impl Iterator<Item = FrameSlot> + '_ {
        self.merge_points
            .iter()
            .filter(move |(b, _)| *b == block)
            .map(|(_, s)| *s)
    }

    /// Blocks whose simulated exit depths differ from the setup pass.
    pub fn depth_mismatches(&self) -> Vec<B> {
        self.driven_exit_depths
            .iter()
            .filter(|(b, d)| self.setup_exit_depths.get(b) != Some(d))
            .map(|(b, _)| *b)
            .collect()
    }
}

/// Runs the setup pass, merge point placement and the driving pass over one
/// method body.
pub struct TreeModelEncoder<'m, G: Flowgraph> {
    body: &'m MethodBody<G>,
    options: EncoderOptions,
}

impl<'m, G: Flowgraph> TreeModelEncoder<'m, G> {
    pub fn new(body: &'m MethodBody<G>) -> Self {
        Self {
            body,
            options: EncoderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EncoderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn encode<V: TreeModelVisitor<G::Block>>(
        &self,
        visitor: &mut V,
    ) -> anyhow::Result<EncodingSummary<G::Block>> {
        let cfg = &self.body.cfg;
        for ex in self.body.exceptions.iter() {
            if cfg.block_for(ex.target).is_none() {
                return Err(EncodeError::UnresolvedHandler(ex.target).into());
            }
        }
        visitor.visit();

        let setup = SetupPass::new(
            cfg.start_block(),
            cfg.catch_targets().to_vec(),
            self.body.param_count,
        );
        let setup = FrameModelEncoder::new(cfg, setup)
            .run()
            .context("frame setup")?;
        debug!(
            slots = setup.def_sites().len(),
            locals = setup.slot_count(FrameSpace::Locals),
            "setup pass done"
        );

        let frontiers = cfg.dominance_frontiers();
        let merge_points =
            phi::place_merge_points(setup.def_sites(), &frontiers, |b| setup.entry_depths(b));
        let mut frames: BTreeMap<G::Block, Frame<V::Value>> = BTreeMap::new();
        for (b, slot) in merge_points.iter().cloned() {
            let frame = frames.entry(b).or_default();
            if frame.needs_initializer(slot) {
                frame.set(slot, Slot::Merge(visitor.add_merge_point(b, slot)));
            }
        }
        debug!(count = merge_points.len(), "placed merge points");

        let params: Vec<V::Value> = (0..self.body.param_count)
            .map(|i| visitor.translate_parameter(i))
            .collect();
        let start = frames.entry(cfg.start_block()).or_default();
        for (i, p) in params.iter().enumerate() {
            let slot = FrameSlot::local(i);
            match start.get(slot) {
                Some(Slot::Merge(m)) => visitor.add_value(m, p.clone()),
                _ => start.set(slot, Slot::Value(p.clone())),
            }
        }

        let local_count = setup.slot_count(FrameSpace::Locals);
        let mut handler_merge_points = 0;
        for (b, ex) in self.body.catch_blocks() {
            let frame = frames.entry(b).or_default();
            let exception =
                visitor.translate_exception_variable(ex.catch_var.as_ref(), ex.exception_type.as_ref());
            frame.set(FrameSlot::value(0), Slot::Value(exception));
            for i in 0..local_count {
                let slot = FrameSlot::local(i);
                let merge = match frame.get(slot) {
                    Some(Slot::Merge(m)) => m.clone(),
                    _ => {
                        let m = visitor.add_merge_point(b, slot);
                        frame.set(slot, Slot::Merge(m.clone()));
                        handler_merge_points += 1;
                        m
                    }
                };
                if let Some(p) = params.get(i) {
                    visitor.add_value(&merge, p.clone());
                }
            }
        }

        let handlers = self.body.catch_blocks().into_iter().map(|(b, _)| b).collect();
        let preorder = cfg.preorder();
        let driver = DrivingPass::new(visitor, frames, handlers, &preorder, self.options);
        let driver = FrameModelEncoder::new(cfg, driver)
            .run()
            .context("tree construction")?;
        let (driven_exit_depths, underflows) = driver.finish()?;
        visitor.visit_end();
        debug!(underflows, "driving pass done");

        Ok(EncodingSummary {
            merge_points,
            handler_merge_points,
            setup_exit_depths: setup.exit_depths().clone(),
            driven_exit_depths,
            underflows,
        })
    }
}
