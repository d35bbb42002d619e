use bitflags::bitflags;

bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct OpFlags: u8 {
        /// Carries one or more label operands.
        const BRANCH = 0x1;
        /// Ends a basic block.
        const TRANSFER = 0x2;
        /// Control never reaches the next instruction.
        const NO_FALL_THROUGH = 0x4;
        /// Operand 0 is a multiname.
        const NAME_OPERAND = 0x8;
        /// Reserved for the VM; never valid in emitted method bodies.
        const INTERNAL_ONLY = 0x10;
    }
}

macro_rules! opcodes {
    ($($variant:ident = $byte:literal => $name:literal $(| $flag:ident)*;)*) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        #[repr(u8)]
        pub enum Op {
            $($variant = $byte,)*
        }
        impl Op {
            pub const ALL: &'static [Op] = &[$(Op::$variant,)*];
            pub fn from_byte(byte: u8) -> Option<Self> {
                Some(match byte {
                    $($byte => Op::$variant,)*
                    _ => return None,
                })
            }
            pub fn name(self) -> &'static str {
                match self {
                    $(Op::$variant => $name,)*
                }
            }
            pub fn flags(self) -> OpFlags {
                match self {
                    $(Op::$variant => OpFlags::empty() $(| OpFlags::$flag)*,)*
                }
            }
        }
    };
}

opcodes! {
    Bkpt = 0x01 => "bkpt";
    Nop = 0x02 => "nop";
    Throw = 0x03 => "throw" | TRANSFER | NO_FALL_THROUGH;
    GetSuper = 0x04 => "getsuper" | NAME_OPERAND;
    SetSuper = 0x05 => "setsuper" | NAME_OPERAND;
    Dxns = 0x06 => "dxns";
    DxnsLate = 0x07 => "dxnslate";
    Kill = 0x08 => "kill";
    Label = 0x09 => "label";
    IfNlt = 0x0C => "ifnlt" | BRANCH | TRANSFER;
    IfNle = 0x0D => "ifnle" | BRANCH | TRANSFER;
    IfNgt = 0x0E => "ifngt" | BRANCH | TRANSFER;
    IfNge = 0x0F => "ifnge" | BRANCH | TRANSFER;
    Jump = 0x10 => "jump" | BRANCH | TRANSFER | NO_FALL_THROUGH;
    IfTrue = 0x11 => "iftrue" | BRANCH | TRANSFER;
    IfFalse = 0x12 => "iffalse" | BRANCH | TRANSFER;
    IfEq = 0x13 => "ifeq" | BRANCH | TRANSFER;
    IfNe = 0x14 => "ifne" | BRANCH | TRANSFER;
    IfLt = 0x15 => "iflt" | BRANCH | TRANSFER;
    IfLe = 0x16 => "ifle" | BRANCH | TRANSFER;
    IfGt = 0x17 => "ifgt" | BRANCH | TRANSFER;
    IfGe = 0x18 => "ifge" | BRANCH | TRANSFER;
    IfStrictEq = 0x19 => "ifstricteq" | BRANCH | TRANSFER;
    IfStrictNe = 0x1A => "ifstrictne" | BRANCH | TRANSFER;
    LookupSwitch = 0x1B => "lookupswitch" | BRANCH | TRANSFER | NO_FALL_THROUGH;
    PushWith = 0x1C => "pushwith";
    PopScope = 0x1D => "popscope";
    NextName = 0x1E => "nextname";
    HasNext = 0x1F => "hasnext";
    PushNull = 0x20 => "pushnull";
    PushUndefined = 0x21 => "pushundefined";
    NextValue = 0x23 => "nextvalue";
    PushByte = 0x24 => "pushbyte";
    PushShort = 0x25 => "pushshort";
    PushTrue = 0x26 => "pushtrue";
    PushFalse = 0x27 => "pushfalse";
    PushNaN = 0x28 => "pushnan";
    Pop = 0x29 => "pop";
    Dup = 0x2A => "dup";
    Swap = 0x2B => "swap";
    PushString = 0x2C => "pushstring";
    PushInt = 0x2D => "pushint";
    PushUInt = 0x2E => "pushuint";
    PushDouble = 0x2F => "pushdouble";
    PushScope = 0x30 => "pushscope";
    PushNamespace = 0x31 => "pushnamespace";
    HasNext2 = 0x32 => "hasnext2";
    Lix8 = 0x33 => "lix8" | INTERNAL_ONLY;
    Lix16 = 0x34 => "lix16" | INTERNAL_ONLY;
    Li8 = 0x35 => "li8";
    Li16 = 0x36 => "li16";
    Li32 = 0x37 => "li32";
    Lf32 = 0x38 => "lf32";
    Lf64 = 0x39 => "lf64";
    Si8 = 0x3A => "si8";
    Si16 = 0x3B => "si16";
    Si32 = 0x3C => "si32";
    Sf32 = 0x3D => "sf32";
    Sf64 = 0x3E => "sf64";
    NewFunction = 0x40 => "newfunction";
    Call = 0x41 => "call";
    Construct = 0x42 => "construct";
    CallMethod = 0x43 => "callmethod";
    CallStatic = 0x44 => "callstatic";
    CallSuper = 0x45 => "callsuper" | NAME_OPERAND;
    CallProperty = 0x46 => "callproperty" | NAME_OPERAND;
    ReturnVoid = 0x47 => "returnvoid" | TRANSFER | NO_FALL_THROUGH;
    ReturnValue = 0x48 => "returnvalue" | TRANSFER | NO_FALL_THROUGH;
    ConstructSuper = 0x49 => "constructsuper";
    ConstructProp = 0x4A => "constructprop" | NAME_OPERAND;
    CallSuperId = 0x4B => "callsuperid" | INTERNAL_ONLY;
    CallPropLex = 0x4C => "callproplex" | NAME_OPERAND;
    CallInterface = 0x4D => "callinterface" | INTERNAL_ONLY;
    CallSuperVoid = 0x4E => "callsupervoid" | NAME_OPERAND;
    CallPropVoid = 0x4F => "callpropvoid" | NAME_OPERAND;
    Sxi1 = 0x50 => "sxi1";
    Sxi8 = 0x51 => "sxi8";
    Sxi16 = 0x52 => "sxi16";
    ApplyType = 0x53 => "applytype";
    NewObject = 0x55 => "newobject";
    NewArray = 0x56 => "newarray";
    NewActivation = 0x57 => "newactivation";
    NewClass = 0x58 => "newclass";
    GetDescendants = 0x59 => "getdescendants" | NAME_OPERAND;
    NewCatch = 0x5A => "newcatch";
    FindPropGlobalStrict = 0x5B => "findpropglobalstrict" | INTERNAL_ONLY;
    FindPropGlobal = 0x5C => "findpropglobal" | INTERNAL_ONLY;
    FindPropStrict = 0x5D => "findpropstrict" | NAME_OPERAND;
    FindProperty = 0x5E => "findproperty" | NAME_OPERAND;
    FindDef = 0x5F => "finddef" | NAME_OPERAND;
    GetLex = 0x60 => "getlex" | NAME_OPERAND;
    SetProperty = 0x61 => "setproperty" | NAME_OPERAND;
    GetLocal = 0x62 => "getlocal";
    SetLocal = 0x63 => "setlocal";
    GetGlobalScope = 0x64 => "getglobalscope";
    GetScopeObject = 0x65 => "getscopeobject";
    GetProperty = 0x66 => "getproperty" | NAME_OPERAND;
    GetOuterScope = 0x67 => "getouterscope";
    InitProperty = 0x68 => "initproperty" | NAME_OPERAND;
    SetPropertyLate = 0x69 => "setpropertylate" | INTERNAL_ONLY;
    DeleteProperty = 0x6A => "deleteproperty" | NAME_OPERAND;
    DeletePropertyLate = 0x6B => "deletepropertylate" | INTERNAL_ONLY;
    GetSlot = 0x6C => "getslot";
    SetSlot = 0x6D => "setslot";
    GetGlobalSlot = 0x6E => "getglobalslot";
    SetGlobalSlot = 0x6F => "setglobalslot";
    ConvertS = 0x70 => "convert_s";
    EscXElem = 0x71 => "esc_xelem";
    EscXAttr = 0x72 => "esc_xattr";
    ConvertI = 0x73 => "convert_i";
    ConvertU = 0x74 => "convert_u";
    ConvertD = 0x75 => "convert_d";
    ConvertB = 0x76 => "convert_b";
    ConvertO = 0x77 => "convert_o";
    CheckFilter = 0x78 => "checkfilter";
    UnPlus = 0x7A => "unplus";
    Coerce = 0x80 => "coerce" | NAME_OPERAND;
    CoerceB = 0x81 => "coerce_b";
    CoerceA = 0x82 => "coerce_a";
    CoerceI = 0x83 => "coerce_i";
    CoerceD = 0x84 => "coerce_d";
    CoerceS = 0x85 => "coerce_s";
    AsType = 0x86 => "astype" | NAME_OPERAND;
    AsTypeLate = 0x87 => "astypelate";
    CoerceU = 0x88 => "coerce_u";
    CoerceO = 0x89 => "coerce_o";
    Negate = 0x90 => "negate";
    Increment = 0x91 => "increment";
    IncLocal = 0x92 => "inclocal";
    Decrement = 0x93 => "decrement";
    DecLocal = 0x94 => "declocal";
    TypeOf = 0x95 => "typeof";
    Not = 0x96 => "not";
    BitNot = 0x97 => "bitnot";
    AddD = 0x9B => "add_d";
    Add = 0xA0 => "add";
    Subtract = 0xA1 => "subtract";
    Multiply = 0xA2 => "multiply";
    Divide = 0xA3 => "divide";
    Modulo = 0xA4 => "modulo";
    LShift = 0xA5 => "lshift";
    RShift = 0xA6 => "rshift";
    URShift = 0xA7 => "urshift";
    BitAnd = 0xA8 => "bitand";
    BitOr = 0xA9 => "bitor";
    BitXor = 0xAA => "bitxor";
    Equals = 0xAB => "equals";
    StrictEquals = 0xAC => "strictequals";
    LessThan = 0xAD => "lessthan";
    LessEquals = 0xAE => "lessequals";
    GreaterThan = 0xAF => "greaterthan";
    GreaterEquals = 0xB0 => "greaterequals";
    InstanceOf = 0xB1 => "instanceof";
    IsType = 0xB2 => "istype" | NAME_OPERAND;
    IsTypeLate = 0xB3 => "istypelate";
    In = 0xB4 => "in";
    IncrementI = 0xC0 => "increment_i";
    DecrementI = 0xC1 => "decrement_i";
    IncLocalI = 0xC2 => "inclocal_i";
    DecLocalI = 0xC3 => "declocal_i";
    NegateI = 0xC4 => "negate_i";
    AddI = 0xC5 => "add_i";
    SubtractI = 0xC6 => "subtract_i";
    MultiplyI = 0xC7 => "multiply_i";
    GetLocal0 = 0xD0 => "getlocal0";
    GetLocal1 = 0xD1 => "getlocal1";
    GetLocal2 = 0xD2 => "getlocal2";
    GetLocal3 = 0xD3 => "getlocal3";
    SetLocal0 = 0xD4 => "setlocal0";
    SetLocal1 = 0xD5 => "setlocal1";
    SetLocal2 = 0xD6 => "setlocal2";
    SetLocal3 = 0xD7 => "setlocal3";
    Debug = 0xEF => "debug";
    DebugLine = 0xF0 => "debugline";
    DebugFile = 0xF1 => "debugfile";
    BkptLine = 0xF2 => "bkptline";
    Timestamp = 0xF3 => "timestamp";
}

impl Op {
    pub fn byte(self) -> u8 {
        self as u8
    }
    pub fn is_branch(self) -> bool {
        self.flags().contains(OpFlags::BRANCH)
    }
    pub fn is_transfer_of_control(self) -> bool {
        self.flags().contains(OpFlags::TRANSFER)
    }
    pub fn can_fall_through(self) -> bool {
        !self.flags().contains(OpFlags::NO_FALL_THROUGH)
    }
    pub fn is_internal_only(self) -> bool {
        self.flags().contains(OpFlags::INTERNAL_ONLY)
    }
    /// Fixed local index of the `getlocal0..3` / `setlocal0..3` shorthands.
    pub fn fixed_local(self) -> Option<usize> {
        Some(match self {
            Op::GetLocal0 | Op::SetLocal0 => 0,
            Op::GetLocal1 | Op::SetLocal1 => 1,
            Op::GetLocal2 | Op::SetLocal2 => 2,
            Op::GetLocal3 | Op::SetLocal3 => 3,
            _ => return None,
        })
    }
}

impl core::fmt::Display for Op {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Op {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Op::from_byte(value).ok_or(value)
    }
}
