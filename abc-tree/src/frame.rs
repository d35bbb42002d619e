use std::fmt::{self, Display};

/// The three independently numbered parts of an activation frame.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum FrameSpace {
    Locals,
    Values,
    Scopes,
}
impl FrameSpace {
    pub const ALL: [FrameSpace; 3] = [FrameSpace::Locals, FrameSpace::Values, FrameSpace::Scopes];

    pub fn index(self) -> usize {
        match self {
            FrameSpace::Locals => 0,
            FrameSpace::Values => 1,
            FrameSpace::Scopes => 2,
        }
    }
}
impl Display for FrameSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrameSpace::Locals => "local",
            FrameSpace::Values => "value",
            FrameSpace::Scopes => "scope",
        })
    }
}

/// Symbolic name of one frame element. Orders by space, then index.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FrameSlot {
    pub space: FrameSpace,
    pub index: usize,
}
impl FrameSlot {
    pub fn new(space: FrameSpace, index: usize) -> Self {
        Self { space, index }
    }
    pub fn local(index: usize) -> Self {
        Self::new(FrameSpace::Locals, index)
    }
    pub fn value(index: usize) -> Self {
        Self::new(FrameSpace::Values, index)
    }
    pub fn scope(index: usize) -> Self {
        Self::new(FrameSpace::Scopes, index)
    }
}
impl Display for FrameSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.space, self.index)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct StackDepths {
    pub values: usize,
    pub scopes: usize,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Slot<T> {
    Empty,
    Value(T),
    /// A merge point; incoming edges add to it instead of replacing it.
    Merge(T),
}
impl<T> Slot<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
    pub fn is_merge(&self) -> bool {
        matches!(self, Slot::Merge(_))
    }
    pub fn value(&self) -> Option<&T> {
        match self {
            Slot::Empty => None,
            Slot::Value(v) | Slot::Merge(v) => Some(v),
        }
    }
}

/// Simulated locals, operand stack and scope stack. Stacks grow at the end.
#[derive(Clone, PartialEq, Debug)]
pub struct Frame<T> {
    pub locals: Vec<Slot<T>>,
    pub values: Vec<Slot<T>>,
    pub scopes: Vec<Slot<T>>,
}
impl<T> Default for Frame<T> {
    fn default() -> Self {
        Self {
            locals: vec![],
            values: vec![],
            scopes: vec![],
        }
    }
}
impl<T> Frame<T> {
    pub fn slots(&self, space: FrameSpace) -> &Vec<Slot<T>> {
        match space {
            FrameSpace::Locals => &self.locals,
            FrameSpace::Values => &self.values,
            FrameSpace::Scopes => &self.scopes,
        }
    }
    pub fn slots_mut(&mut self, space: FrameSpace) -> &mut Vec<Slot<T>> {
        match space {
            FrameSpace::Locals => &mut self.locals,
            FrameSpace::Values => &mut self.values,
            FrameSpace::Scopes => &mut self.scopes,
        }
    }
    pub fn get(&self, slot: FrameSlot) -> Option<&Slot<T>> {
        self.slots(slot.space).get(slot.index)
    }
    /// Stores into `slot`, padding with [`Slot::Empty`] as needed.
    pub fn set(&mut self, slot: FrameSlot, value: Slot<T>) {
        let v = self.slots_mut(slot.space);
        if v.len() <= slot.index {
            v.resize_with(slot.index + 1, || Slot::Empty);
        }
        v[slot.index] = value;
    }
    pub fn needs_initializer(&self, slot: FrameSlot) -> bool {
        self.get(slot).is_none_or(Slot::is_empty)
    }
    pub fn depths(&self) -> StackDepths {
        StackDepths {
            values: self.values.len(),
            scopes: self.scopes.len(),
        }
    }
}
