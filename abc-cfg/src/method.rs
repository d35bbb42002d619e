use portal_abc_common::{InstructionList, Label, Name};

use crate::{ControlFlowGraph, Flowgraph};

#[derive(Clone, PartialEq, Debug)]
pub struct ExceptionInfo {
    pub from: Label,
    pub to: Label,
    pub target: Label,
    pub exception_type: Option<Name>,
    pub catch_var: Option<Name>,
}
impl ExceptionInfo {
    pub fn new(from: Label, to: Label, target: Label) -> Self {
        Self {
            from,
            to,
            target,
            exception_type: None,
            catch_var: None,
        }
    }
}

/// Everything the frame and tree encoders need to know about one method.
#[derive(Clone, Debug)]
pub struct MethodBody<G = ControlFlowGraph> {
    pub cfg: G,
    pub param_count: usize,
    pub exceptions: Vec<ExceptionInfo>,
}
impl MethodBody {
    pub fn build(
        insns: &InstructionList,
        param_count: usize,
        exceptions: Vec<ExceptionInfo>,
    ) -> Self {
        let cfg = ControlFlowGraph::build(insns, &exceptions);
        Self {
            cfg,
            param_count,
            exceptions,
        }
    }
}
impl<G: Flowgraph> MethodBody<G> {
    /// Catch blocks in exception-table order, each reported once.
    pub fn catch_blocks(&self) -> Vec<(G::Block, &ExceptionInfo)> {
        let mut out: Vec<(G::Block, &ExceptionInfo)> = vec![];
        for ex in self.exceptions.iter() {
            let Some(b) = self.cfg.block_for(ex.target) else {
                continue;
            };
            if out.iter().all(|(k, _)| *k != b) {
                out.push((b, ex));
            }
        }
        out
    }
}
