#![no_std]
extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::iter::once;

use either::Either;

pub mod name;
pub mod op;
pub use name::{Name, NameKind, Namespace};
pub use op::{Op, OpFlags};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Label(pub u32);

#[derive(Clone, PartialEq, Debug)]
#[non_exhaustive]
pub enum Operand {
    Int(i64),
    Double(f64),
    Str(String),
    Name(Name),
    Label(Label),
    Namespace(Namespace),
}

#[derive(Clone, PartialEq, Debug)]
pub struct Instruction {
    pub op: Op,
    pub operands: Vec<Operand>,
}
impl Instruction {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            operands: Vec::new(),
        }
    }
    pub fn with_operands(op: Op, operands: Vec<Operand>) -> Self {
        Self { op, operands }
    }
    pub fn with_imm(op: Op, imm: i64) -> Self {
        Self::with_operands(op, alloc::vec![Operand::Int(imm)])
    }
    pub fn with_name(op: Op, name: Name) -> Self {
        Self::with_operands(op, alloc::vec![Operand::Name(name)])
    }
    pub fn branch(op: Op, target: Label) -> Self {
        Self::with_operands(op, alloc::vec![Operand::Label(target)])
    }
    /// A name-bearing call: the multiname followed by the argument count.
    pub fn call(op: Op, name: Name, argc: i64) -> Self {
        Self::with_operands(op, alloc::vec![Operand::Name(name), Operand::Int(argc)])
    }
    pub fn lookupswitch(default: Label, cases: impl IntoIterator<Item = Label>) -> Self {
        Self::with_operands(
            Op::LookupSwitch,
            once(default).chain(cases).map(Operand::Label).collect(),
        )
    }
    pub fn hasnext2(object_local: i64, index_local: i64) -> Self {
        Self::with_operands(
            Op::HasNext2,
            alloc::vec![Operand::Int(object_local), Operand::Int(index_local)],
        )
    }
    pub fn operand(&self, idx: usize) -> Option<&Operand> {
        self.operands.get(idx)
    }
    pub fn int_operand(&self, idx: usize) -> Option<i64> {
        match self.operands.get(idx)? {
            Operand::Int(i) => Some(*i),
            _ => None,
        }
    }
    pub fn immediate(&self) -> Option<i64> {
        self.int_operand(0)
    }
    pub fn name(&self) -> Option<&Name> {
        match self.operands.first()? {
            Operand::Name(n) => Some(n),
            _ => None,
        }
    }
    pub fn target(&self) -> Option<Label> {
        match self.operands.first()? {
            Operand::Label(l) => Some(*l),
            _ => None,
        }
    }
    /// Every label this instruction may transfer control to, in operand order.
    pub fn branch_targets(&self) -> impl Iterator<Item = Label> + '_ {
        if self.op == Op::LookupSwitch {
            Either::Left(self.operands.iter().filter_map(|o| match o {
                Operand::Label(l) => Some(*l),
                _ => None,
            }))
        } else {
            Either::Right(self.target().filter(|_| self.op.is_branch()).into_iter())
        }
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.op.name())?;
        for o in self.operands.iter() {
            match o {
                Operand::Int(i) => write!(f, " {i}")?,
                Operand::Double(d) => write!(f, " {d}")?,
                Operand::Str(s) => write!(f, " {s:?}")?,
                Operand::Name(n) => write!(f, " {n}")?,
                Operand::Label(l) => write!(f, " L{}", l.0)?,
                Operand::Namespace(ns) => write!(f, " ns({})", ns.uri)?,
            }
        }
        Ok(())
    }
}

/// A flat instruction sequence with labels bound to instruction positions.
#[derive(Clone, Default, Debug)]
pub struct InstructionList {
    instructions: Vec<Instruction>,
    labels: Vec<(Label, usize)>,
    next_label: u32,
}
impl InstructionList {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn new_label(&mut self) -> Label {
        let l = Label(self.next_label);
        self.next_label += 1;
        l
    }
    pub fn add(&mut self, insn: Instruction) -> &mut Self {
        self.instructions.push(insn);
        self
    }
    pub fn add_op(&mut self, op: Op) -> &mut Self {
        self.add(Instruction::new(op))
    }
    pub fn add_imm(&mut self, op: Op, imm: i64) -> &mut Self {
        self.add(Instruction::with_imm(op, imm))
    }
    /// Binds `l` to the position of the next instruction added.
    pub fn label_next(&mut self, l: Label) -> &mut Self {
        self.labels.push((l, self.instructions.len()));
        self
    }
    /// Binds `l` to the most recently added instruction.
    pub fn label_current(&mut self, l: Label) -> &mut Self {
        let pos = self.instructions.len().saturating_sub(1);
        self.labels.push((l, pos));
        self
    }
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
    pub fn len(&self) -> usize {
        self.instructions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
    pub fn label_position(&self, l: Label) -> Option<usize> {
        self.labels.iter().find(|(k, _)| *k == l).map(|(_, p)| *p)
    }
    /// Labels that point at an instruction, sorted by position.
    pub fn active_labels(&self) -> Vec<(Label, usize)> {
        let mut v: Vec<_> = self
            .labels
            .iter()
            .cloned()
            .filter(|(_, p)| *p < self.instructions.len())
            .collect();
        v.sort_by_key(|(l, p)| (*p, *l));
        v
    }
    pub fn can_fall_through(&self) -> bool {
        self.instructions.last().is_none_or(|i| i.op.can_fall_through())
    }
}
