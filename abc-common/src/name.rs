use alloc::string::String;
use alloc::vec::Vec;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(u8)]
pub enum NameKind {
    Qname = 0x07,
    Multiname = 0x09,
    QnameA = 0x0D,
    MultinameA = 0x0E,
    RTQname = 0x0F,
    RTQnameA = 0x10,
    RTQnameL = 0x11,
    RTQnameLA = 0x12,
    NameL = 0x13,
    NameLA = 0x14,
    MultinameL = 0x1B,
    MultinameLA = 0x1C,
    TypeName = 0x1D,
}
impl NameKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        use NameKind::*;
        Some(match byte {
            0x07 => Qname,
            0x09 => Multiname,
            0x0D => QnameA,
            0x0E => MultinameA,
            0x0F => RTQname,
            0x10 => RTQnameA,
            0x11 => RTQnameL,
            0x12 => RTQnameLA,
            0x13 => NameL,
            0x14 => NameLA,
            0x1B => MultinameL,
            0x1C => MultinameLA,
            0x1D => TypeName,
            _ => return None,
        })
    }
    pub fn is_attribute(self) -> bool {
        matches!(
            self,
            NameKind::QnameA
                | NameKind::MultinameA
                | NameKind::MultinameLA
                | NameKind::RTQnameA
                | NameKind::RTQnameLA
                | NameKind::NameLA
        )
    }
    /// Extra operand-stack values a name of this kind pops at runtime.
    /// The attribute variants of the runtime kinds report zero.
    pub fn runtime_name_allowance(self) -> usize {
        match self {
            NameKind::MultinameL | NameKind::RTQname => 1,
            NameKind::RTQnameL => 2,
            _ => 0,
        }
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Namespace {
    pub kind: u8,
    pub uri: String,
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Name {
    pub kind: NameKind,
    pub base_name: Option<String>,
    pub qualifiers: Vec<Namespace>,
}
impl Name {
    pub fn qname(ns: Namespace, base_name: impl Into<String>) -> Self {
        Self {
            kind: NameKind::Qname,
            base_name: Some(base_name.into()),
            qualifiers: alloc::vec![ns],
        }
    }
    pub fn multiname(qualifiers: Vec<Namespace>, base_name: impl Into<String>) -> Self {
        Self {
            kind: NameKind::Multiname,
            base_name: Some(base_name.into()),
            qualifiers,
        }
    }
    /// A name with no compile-time components; everything comes off the stack.
    pub fn runtime(kind: NameKind) -> Self {
        Self {
            kind,
            base_name: None,
            qualifiers: Vec::new(),
        }
    }
    pub fn runtime_name_allowance(&self) -> usize {
        self.kind.runtime_name_allowance()
    }
    pub fn is_attribute(&self) -> bool {
        self.kind.is_attribute()
    }
}

impl core::fmt::Display for Name {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match (&self.base_name, self.qualifiers.as_slice()) {
            (Some(b), [ns]) if !ns.uri.is_empty() => write!(f, "{}::{}", ns.uri, b),
            (Some(b), _) => f.write_str(b),
            (None, _) => write!(f, "{:?}", self.kind),
        }
    }
}
