use abc_cfg::{BlockId, ControlFlowGraph, ExceptionInfo, Flowgraph, MethodBody};
use portal_abc_common::{
    Instruction, InstructionList, Name, NameKind, Namespace, Op, Operand,
};
use pretty_assertions::assert_eq;

use super::*;

#[derive(Clone, PartialEq, Debug)]
enum Ev {
    Block(BlockId),
    Edge(BlockId, BlockId),
    End(BlockId),
    Nothing(Op),
    Consume(Op, usize),
    Produce(Op),
    Cap(Op, usize),
    Branch(Op, BlockId),
    Multi(Op, Vec<BlockId>),
    Get(usize),
    Set(usize),
    Modify(usize),
    ScopePush,
    ScopePop,
    ScopeGet(usize),
    HasNext2(usize, usize),
    Dup,
    Swap,
}

#[derive(Default)]
struct Recorder {
    evs: Vec<Ev>,
    positions: Vec<(usize, Op)>,
}
impl FrameModelVisitor<BlockId> for Recorder {
    type Output = ();
    fn visit_block(&mut self, block: BlockId) -> bool {
        self.evs.push(Ev::Block(block));
        true
    }
    fn visit_edge(&mut self, from: BlockId, to: BlockId) {
        self.evs.push(Ev::Edge(from, to));
    }
    fn visit_end_block(&mut self, block: BlockId) {
        self.evs.push(Ev::End(block));
    }
    fn visit_instruction(&mut self, index: usize, insn: &Instruction) {
        self.positions.push((index, insn.op));
    }
    fn no_frame_effect(&mut self, insn: &Instruction) {
        self.evs.push(Ev::Nothing(insn.op));
    }
    fn consume_value(&mut self, insn: &Instruction, count: usize) {
        self.evs.push(Ev::Consume(insn.op, count));
    }
    fn produce_value(&mut self, insn: &Instruction) {
        self.evs.push(Ev::Produce(insn.op));
    }
    fn consume_and_produce_value(&mut self, insn: &Instruction, count: usize) {
        self.evs.push(Ev::Cap(insn.op, count));
    }
    fn branch(&mut self, insn: &Instruction, target: BlockId) {
        self.evs.push(Ev::Branch(insn.op, target));
    }
    fn multiway_branch(&mut self, insn: &Instruction, targets: &[BlockId]) {
        self.evs.push(Ev::Multi(insn.op, targets.to_vec()));
    }
    fn getlocal(&mut self, _: &Instruction, idx: usize) {
        self.evs.push(Ev::Get(idx));
    }
    fn setlocal(&mut self, _: &Instruction, idx: usize) {
        self.evs.push(Ev::Set(idx));
    }
    fn modify_local(&mut self, _: &Instruction, idx: usize) {
        self.evs.push(Ev::Modify(idx));
    }
    fn move_value_to_scope_stack(&mut self, _: &Instruction) {
        self.evs.push(Ev::ScopePush);
    }
    fn popscope(&mut self, _: &Instruction) {
        self.evs.push(Ev::ScopePop);
    }
    fn get_scope_object(&mut self, _: &Instruction, idx: usize) {
        self.evs.push(Ev::ScopeGet(idx));
    }
    fn hasnext2(&mut self, _: &Instruction, object_local: usize, index_local: usize) {
        self.evs.push(Ev::HasNext2(object_local, index_local));
    }
    fn dup(&mut self, _: &Instruction) {
        self.evs.push(Ev::Dup);
    }
    fn swap(&mut self, _: &Instruction) {
        self.evs.push(Ev::Swap);
    }
}

fn record(il: &InstructionList) -> anyhow::Result<(ControlFlowGraph, Vec<Ev>)> {
    let cfg = ControlFlowGraph::build(il, &[]);
    let r = FrameModelEncoder::new(&cfg, Recorder::default()).run()?;
    Ok((cfg, r.evs))
}

/// Events produced by one instruction, ignoring block bookkeeping.
fn effect_of(insn: Instruction) -> Vec<Ev> {
    let mut il = InstructionList::new();
    il.add(insn).add_op(Op::ReturnVoid);
    let (_, evs) = record(&il).unwrap();
    evs.into_iter()
        .filter(|e| !matches!(e, Ev::Block(_) | Ev::End(_) | Ev::Edge(..) | Ev::Nothing(Op::ReturnVoid)))
        .collect()
}

fn qname(s: &str) -> Name {
    Name::qname(
        Namespace {
            kind: 0x16,
            uri: String::new(),
        },
        s,
    )
}

#[test]
fn getproperty_runtime_name_allowance() {
    assert_eq!(
        effect_of(Instruction::with_name(Op::GetProperty, qname("x"))),
        vec![Ev::Cap(Op::GetProperty, 1)]
    );
    assert_eq!(
        effect_of(Instruction::with_name(Op::GetProperty, Name::runtime(NameKind::MultinameL))),
        vec![Ev::Cap(Op::GetProperty, 2)]
    );
    assert_eq!(
        effect_of(Instruction::with_name(Op::GetProperty, Name::runtime(NameKind::RTQnameL))),
        vec![Ev::Cap(Op::GetProperty, 3)]
    );
    assert_eq!(
        effect_of(Instruction::with_name(Op::SetProperty, Name::runtime(NameKind::RTQname))),
        vec![Ev::Consume(Op::SetProperty, 3)]
    );
    assert_eq!(
        effect_of(Instruction::with_name(Op::FindPropStrict, qname("trace"))),
        vec![Ev::Cap(Op::FindPropStrict, 0)]
    );
}

#[test]
fn call_and_construct_arities() {
    assert_eq!(
        effect_of(Instruction::call(Op::CallProperty, qname("f"), 3)),
        vec![Ev::Cap(Op::CallProperty, 4)]
    );
    assert_eq!(
        effect_of(Instruction::call(Op::CallPropVoid, Name::runtime(NameKind::RTQnameL), 1)),
        vec![Ev::Consume(Op::CallPropVoid, 4)]
    );
    assert_eq!(
        effect_of(Instruction::with_imm(Op::Construct, 2)),
        vec![Ev::Cap(Op::Construct, 3)]
    );
    assert_eq!(
        effect_of(Instruction::with_imm(Op::ConstructSuper, 2)),
        vec![Ev::Consume(Op::ConstructSuper, 3)]
    );
    assert_eq!(
        effect_of(Instruction::with_imm(Op::NewObject, 2)),
        vec![Ev::Cap(Op::NewObject, 4)]
    );
    assert_eq!(
        effect_of(Instruction::with_imm(Op::NewArray, 5)),
        vec![Ev::Cap(Op::NewArray, 5)]
    );
    assert_eq!(
        effect_of(Instruction::with_imm(Op::Call, 1)),
        vec![Ev::Cap(Op::Call, 3)]
    );
    assert_eq!(
        effect_of(Instruction::with_operands(
            Op::CallStatic,
            vec![Operand::Int(7), Operand::Int(2)]
        )),
        vec![Ev::Cap(Op::CallStatic, 3)]
    );
}

#[test]
fn locals_scopes_and_stack_maintenance() {
    assert_eq!(effect_of(Instruction::new(Op::GetLocal2)), vec![Ev::Get(2)]);
    assert_eq!(effect_of(Instruction::with_imm(Op::GetLocal, 9)), vec![Ev::Get(9)]);
    assert_eq!(effect_of(Instruction::new(Op::SetLocal3)), vec![Ev::Set(3)]);
    assert_eq!(effect_of(Instruction::with_imm(Op::IncLocalI, 4)), vec![Ev::Modify(4)]);
    assert_eq!(effect_of(Instruction::with_imm(Op::Kill, 1)), vec![Ev::Modify(1)]);
    assert_eq!(effect_of(Instruction::new(Op::PushWith)), vec![Ev::ScopePush]);
    assert_eq!(effect_of(Instruction::new(Op::PopScope)), vec![Ev::ScopePop]);
    assert_eq!(effect_of(Instruction::new(Op::GetGlobalScope)), vec![Ev::ScopeGet(0)]);
    assert_eq!(
        effect_of(Instruction::with_imm(Op::GetScopeObject, 1)),
        vec![Ev::ScopeGet(1)]
    );
    assert_eq!(effect_of(Instruction::new(Op::Dup)), vec![Ev::Dup]);
    assert_eq!(effect_of(Instruction::new(Op::Swap)), vec![Ev::Swap]);
    assert_eq!(
        effect_of(Instruction::hasnext2(1, 2)),
        vec![Ev::HasNext2(1, 2), Ev::Produce(Op::HasNext2)]
    );
    assert_eq!(effect_of(Instruction::with_imm(Op::PushByte, 1)), vec![Ev::Produce(Op::PushByte)]);
    assert_eq!(effect_of(Instruction::new(Op::DebugFile)), vec![Ev::Nothing(Op::DebugFile)]);
    assert_eq!(effect_of(Instruction::new(Op::Add)), vec![Ev::Cap(Op::Add, 2)]);
    assert_eq!(effect_of(Instruction::new(Op::Si32)), vec![Ev::Consume(Op::Si32, 2)]);
}

#[test]
fn branches_consume_their_comparison_operands() {
    let mut il = InstructionList::new();
    let (l1, l2, d) = (il.new_label(), il.new_label(), il.new_label());
    il.add_op(Op::PushTrue)
        .add_op(Op::PushFalse)
        .add(Instruction::branch(Op::IfLt, l1))
        .add_op(Op::PushTrue)
        .add(Instruction::branch(Op::IfFalse, l2))
        .add_imm(Op::PushByte, 0)
        .add(Instruction::lookupswitch(d, [l1, l2]))
        .label_next(l1)
        .label_next(l2)
        .label_next(d)
        .add_op(Op::ReturnVoid);
    let (cfg, evs) = record(&il).unwrap();
    let exit = cfg.block_for(l1).unwrap();
    let interesting: Vec<_> = evs
        .into_iter()
        .filter(|e| matches!(e, Ev::Consume(..) | Ev::Branch(..) | Ev::Multi(..)))
        .collect();
    assert_eq!(
        interesting,
        vec![
            Ev::Consume(Op::IfLt, 2),
            Ev::Branch(Op::IfLt, exit),
            Ev::Consume(Op::IfFalse, 1),
            Ev::Branch(Op::IfFalse, exit),
            Ev::Consume(Op::LookupSwitch, 1),
            Ev::Multi(Op::LookupSwitch, vec![exit, exit, exit]),
        ]
    );
}

#[test]
fn edges_precede_end_block_and_blocks_visit_once() {
    let mut il = InstructionList::new();
    let head = il.new_label();
    let out = il.new_label();
    il.label_next(head)
        .add_op(Op::PushTrue)
        .add(Instruction::branch(Op::IfFalse, out))
        .add(Instruction::branch(Op::Jump, head))
        .label_next(out)
        .add_op(Op::ReturnVoid);
    let (cfg, evs) = record(&il).unwrap();
    let order = cfg.blocks_in_entry_order().to_vec();
    let blocks: Vec<_> = evs
        .iter()
        .filter_map(|e| match e {
            Ev::Block(b) => Some(*b),
            _ => None,
        })
        .collect();
    assert_eq!(blocks, vec![order[0], order[1], order[2]]);
    let first_end = evs.iter().position(|e| *e == Ev::End(order[0])).unwrap();
    assert_eq!(evs[first_end - 2], Ev::Edge(order[0], order[1]));
    assert_eq!(evs[first_end - 1], Ev::Edge(order[0], order[2]));
}

#[test]
fn internal_only_opcodes_are_fatal() {
    let mut il = InstructionList::new();
    il.add(Instruction::with_name(Op::SetPropertyLate, qname("x")))
        .add_op(Op::ReturnVoid);
    let err = record(&il).unwrap_err();
    assert_eq!(
        err.downcast_ref::<DecodeError>(),
        Some(&DecodeError::InternalOnly(Op::SetPropertyLate))
    );

    let mut il = InstructionList::new();
    il.add_op(Op::AddD).add_op(Op::ReturnVoid);
    let err = record(&il).unwrap_err();
    assert_eq!(
        err.downcast_ref::<DecodeError>(),
        Some(&DecodeError::Unrecognized(Op::AddD))
    );
    assert_eq!(decode_opcode(0x22), Err(DecodeError::Unknown(0x22)));
    assert_eq!(decode_opcode(0x66), Ok(Op::GetProperty));
}

#[test]
fn malformed_operands_are_fatal() {
    let mut il = InstructionList::new();
    il.add_op(Op::GetProperty).add_op(Op::ReturnVoid);
    let err = record(&il).unwrap_err();
    assert_eq!(
        err.downcast_ref::<DecodeError>(),
        Some(&DecodeError::MissingOperand {
            op: Op::GetProperty,
            index: 0
        })
    );

    let mut il = InstructionList::new();
    il.add_imm(Op::GetLocal, -1).add_op(Op::ReturnVoid);
    let err = record(&il).unwrap_err();
    assert_eq!(
        err.downcast_ref::<DecodeError>(),
        Some(&DecodeError::BadOperand {
            op: Op::GetLocal,
            index: 0
        })
    );
}

#[test]
fn frame_sizes() {
    let mut il = InstructionList::new();
    let (from, to, handler) = (il.new_label(), il.new_label(), il.new_label());
    il.label_next(from)
        .add_op(Op::GetLocal0)
        .add_op(Op::PushScope)
        .add_imm(Op::PushByte, 1)
        .add_imm(Op::PushByte, 2)
        .add_op(Op::Add)
        .add_imm(Op::SetLocal, 5)
        .label_next(to)
        .add_op(Op::ReturnVoid)
        .label_next(handler)
        .add_op(Op::Dup)
        .add_op(Op::Dup)
        .add_op(Op::Pop)
        .add_op(Op::Pop)
        .add_op(Op::Throw);
    let body = MethodBody::build(&il, 1, vec![ExceptionInfo::new(from, to, handler)]);
    let counter = FrameCounter::new(body.cfg.catch_targets().to_vec(), body.param_count, 0);
    let counter = FrameModelEncoder::new(&body.cfg, counter).run().unwrap();
    assert_eq!(
        counter.sizes,
        FrameSizes {
            max_stack: 3,
            max_scope: 1,
            max_local: 6,
        }
    );
}

#[test]
fn instruction_index_counts_within_block() {
    let mut il = InstructionList::new();
    il.add_op(Op::Nop).add_op(Op::Nop).add_op(Op::ReturnVoid);
    let cfg = ControlFlowGraph::build(&il, &[]);
    let mut enc = FrameModelEncoder::new(&cfg, Recorder::default());
    assert!(FlowGraphVisitor::visit_block(&mut enc, cfg.start_block()));
    for i in cfg.instructions(cfg.start_block()) {
        enc.visit_instruction(i).unwrap();
    }
    assert_eq!(enc.instruction_index(), 3);
    assert_eq!(enc.current_block(), Some(cfg.start_block()));
    assert!(!FlowGraphVisitor::visit_block(&mut enc, cfg.start_block()));
    assert_eq!(enc.visitor().evs.len(), 4);
    assert_eq!(
        enc.visitor().positions,
        vec![(1, Op::Nop), (2, Op::Nop), (3, Op::ReturnVoid)]
    );
}
