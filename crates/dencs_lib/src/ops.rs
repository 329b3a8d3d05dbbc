use serde::{Deserialize, Serialize};

/// Decoded NCS operation kinds. Closed except for `Unknown`, which carries
/// the raw opcode byte of anything outside the known table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    CopyDownSp,
    ReserveSlot,
    CopyTopSp,
    Const,
    Action,
    LogicalAnd,
    LogicalOr,
    InclusiveOr,
    ExclusiveOr,
    BitwiseAnd,
    Equal,
    NotEqual,
    GreaterEq,
    Greater,
    Less,
    LessEq,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    Complement,
    MoveSp,
    Jump,
    JumpSub,
    JumpIfZero,
    JumpIfNonZero,
    Return,
    Destruct,
    BooleanNot,
    IncrementSp,
    DecrementSp,
    IncrementBp,
    DecrementBp,
    CopyDownBp,
    CopyTopBp,
    SaveBp,
    RestoreBp,
    StoreState,
    NoOp,
    Unknown(u8),
}

impl OpKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpKind::CopyDownSp => "CPDOWNSP",
            OpKind::ReserveSlot => "RSADD",
            OpKind::CopyTopSp => "CPTOPSP",
            OpKind::Const => "CONST",
            OpKind::Action => "ACTION",
            OpKind::LogicalAnd => "LOGAND",
            OpKind::LogicalOr => "LOGOR",
            OpKind::InclusiveOr => "INCOR",
            OpKind::ExclusiveOr => "EXCOR",
            OpKind::BitwiseAnd => "BOOLAND",
            OpKind::Equal => "EQUAL",
            OpKind::NotEqual => "NEQUAL",
            OpKind::GreaterEq => "GEQ",
            OpKind::Greater => "GT",
            OpKind::Less => "LT",
            OpKind::LessEq => "LEQ",
            OpKind::ShiftLeft => "SHLEFT",
            OpKind::ShiftRight => "SHRIGHT",
            OpKind::UnsignedShiftRight => "USHRIGHT",
            OpKind::Add => "ADD",
            OpKind::Sub => "SUB",
            OpKind::Mul => "MUL",
            OpKind::Div => "DIV",
            OpKind::Mod => "MOD",
            OpKind::Negate => "NEG",
            OpKind::Complement => "COMP",
            OpKind::MoveSp => "MOVSP",
            OpKind::Jump => "JMP",
            OpKind::JumpSub => "JSR",
            OpKind::JumpIfZero => "JZ",
            OpKind::JumpIfNonZero => "JNZ",
            OpKind::Return => "RETN",
            OpKind::Destruct => "DESTRUCT",
            OpKind::BooleanNot => "NOT",
            OpKind::IncrementSp => "INCISP",
            OpKind::DecrementSp => "DECISP",
            OpKind::IncrementBp => "INCIBP",
            OpKind::DecrementBp => "DECIBP",
            OpKind::CopyDownBp => "CPDOWNBP",
            OpKind::CopyTopBp => "CPTOPBP",
            OpKind::SaveBp => "SAVEBP",
            OpKind::RestoreBp => "RESTOREBP",
            OpKind::StoreState => "STORE_STATE",
            OpKind::NoOp => "NOP",
            OpKind::Unknown(_) => "??",
        }
    }

    /// Control-transfer operations carry a resolved `jump_target`.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            OpKind::Jump | OpKind::JumpSub | OpKind::JumpIfZero | OpKind::JumpIfNonZero
        )
    }
}

/// Value type carried by reserve-slot, constant and return operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeTag {
    Void,
    Int,
    Float,
    String,
    Object,
    Effect,
    Event,
    Location,
    Talent,
}

impl TypeTag {
    /// Maps an instruction type-qualifier byte to a value type.
    pub fn from_qualifier(q: u8) -> Option<TypeTag> {
        match q {
            0x00 => Some(TypeTag::Void),
            0x03 => Some(TypeTag::Int),
            0x04 => Some(TypeTag::Float),
            0x05 => Some(TypeTag::String),
            0x06 => Some(TypeTag::Object),
            0x10 => Some(TypeTag::Effect),
            0x11 => Some(TypeTag::Event),
            0x12 => Some(TypeTag::Location),
            0x13 => Some(TypeTag::Talent),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            TypeTag::Void => "void",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::String => "string",
            TypeTag::Object => "object",
            TypeTag::Effect => "effect",
            TypeTag::Event => "event",
            TypeTag::Location => "location",
            TypeTag::Talent => "talent",
        }
    }
}

/// Small typed operand values. Operands never alias program structure;
/// cross-operation references live only in `Operation::jump_target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Int(i32),
    Float(f32),
    Str(String),
    Word(u16),
    SignedWord(i16),
    Byte(u8),
    Dword(u32),
}

/// One decoded operation. Immutable input to the whole pipeline.
///
/// `jump_target` is an index into the same operation sequence, resolved by
/// the decoder; it is `None` for non-control operations and for control
/// operations whose raw byte offset did not land on an instruction boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    pub qualifier: u8,
    pub offset: u32,
    pub operands: Vec<Operand>,
    pub jump_target: Option<usize>,
}

impl Operation {
    pub fn new(kind: OpKind) -> Operation {
        Operation {
            kind,
            qualifier: 0,
            offset: 0,
            operands: Vec::new(),
            jump_target: None,
        }
    }

    /// Value type for reserve/constant/return operations, read from the
    /// qualifier byte.
    pub fn value_type(&self) -> Option<TypeTag> {
        TypeTag::from_qualifier(self.qualifier)
    }
}
