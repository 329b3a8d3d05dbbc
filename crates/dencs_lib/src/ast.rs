use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ops::TypeTag;

/// Literal payload of a constant-push command. One variant per constant
/// instruction flavour so int/float/string/object never collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i32),
    Float(f32),
    Str(String),
    Object(u32),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "int {v}"),
            Literal::Float(v) => write!(f, "float {v}"),
            Literal::Str(s) => write!(f, "string \"{s}\""),
            Literal::Object(id) => write!(f, "object {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
    Complement,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
            UnaryOp::Complement => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::UnsignedShiftRight => ">>>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    BitAnd,
    BitXor,
    BitOr,
}

impl LogicalOp {
    pub fn symbol(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
            LogicalOp::BitAnd => "&",
            LogicalOp::BitXor => "^",
            LogicalOp::BitOr => "|",
        }
    }
}

/// Flat stack-effect command. The translation output is always a linear
/// sequence of these; loops and conditionals stay implicit in the jump
/// commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    Constant(Literal),
    /// External engine-routine call: routine id and declared argument count,
    /// both verbatim from the instruction operands.
    Action {
        routine: u16,
        args: u8,
    },
    /// Relative jump distances are in operations, not bytes:
    /// resolved-target-index minus this command's index.
    Jump {
        rel: i32,
    },
    JumpIfZero {
        rel: i32,
    },
    JumpIfNonZero {
        rel: i32,
    },
    CallSub {
        rel: i32,
    },
    Return {
        ty: TypeTag,
    },
    /// Copy at a stack-pointer-relative slot. `down` distinguishes
    /// copy-down (write) from copy-up (read).
    CopyStack {
        down: bool,
        offset: i32,
        size: u16,
    },
    /// Copy at a frame-pointer-relative slot.
    CopyFrame {
        down: bool,
        offset: i32,
        size: u16,
    },
    MoveSp {
        delta: i32,
    },
    Reserve {
        ty: TypeTag,
    },
    Destruct {
        remove: u16,
        keep_offset: i16,
        keep: u16,
    },
    SaveFramePtr,
    RestoreFramePtr,
    StoreState {
        state: u8,
        frame_size: u32,
        stack_size: u32,
    },
    Unary {
        op: UnaryOp,
    },
    Binary {
        op: BinaryOp,
    },
    Logical {
        op: LogicalOp,
    },
    /// Placeholder for an operator or opcode the translator does not
    /// recognize. Never dropped, so positions stay diagnosable.
    Unknown {
        opcode: u8,
        mnemonic: String,
    },
}

/// A command plus the byte offset of the operation it was translated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub offset: u32,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(offset: u32, kind: CommandKind) -> Command {
        Command { offset, kind }
    }

    pub fn is_return(&self) -> bool {
        matches!(self.kind, CommandKind::Return { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CommandKind::Constant(lit) => write!(f, "CONST {lit}"),
            CommandKind::Action { routine, args } => write!(f, "ACTION {routine} #{args}"),
            CommandKind::Jump { rel } => write!(f, "JMP {rel:+}"),
            CommandKind::JumpIfZero { rel } => write!(f, "JZ {rel:+}"),
            CommandKind::JumpIfNonZero { rel } => write!(f, "JNZ {rel:+}"),
            CommandKind::CallSub { rel } => write!(f, "JSR {rel:+}"),
            CommandKind::Return { ty } => write!(f, "RETN {}", ty.keyword()),
            CommandKind::CopyStack { down, offset, size } => {
                let m = if *down { "CPDOWNSP" } else { "CPTOPSP" };
                write!(f, "{m} {offset}, {size}")
            }
            CommandKind::CopyFrame { down, offset, size } => {
                let m = if *down { "CPDOWNBP" } else { "CPTOPBP" };
                write!(f, "{m} {offset}, {size}")
            }
            CommandKind::MoveSp { delta } => write!(f, "MOVSP {delta}"),
            CommandKind::Reserve { ty } => write!(f, "RSADD {}", ty.keyword()),
            CommandKind::Destruct { remove, keep_offset, keep } => {
                write!(f, "DESTRUCT {remove}, {keep_offset}, {keep}")
            }
            CommandKind::SaveFramePtr => write!(f, "SAVEBP"),
            CommandKind::RestoreFramePtr => write!(f, "RESTOREBP"),
            CommandKind::StoreState { state, frame_size, stack_size } => {
                write!(f, "STORE_STATE {state}, {frame_size}, {stack_size}")
            }
            CommandKind::Unary { op } => write!(f, "UNARY {}", op.symbol()),
            CommandKind::Binary { op } => write!(f, "BINARY {}", op.symbol()),
            CommandKind::Logical { op } => write!(f, "LOGICAL {}", op.symbol()),
            CommandKind::Unknown { opcode, mnemonic } => {
                write!(f, "UNKNOWN {mnemonic} (0x{opcode:02x})")
            }
        }
    }
}

/// Identifier of a subroutine: a sequential index until symbol recovery
/// replaces it with a canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubroutineId {
    Index(i32),
    Named(String),
}

impl fmt::Display for SubroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubroutineId::Index(i) => write!(f, "sub{i}"),
            SubroutineId::Named(name) => write!(f, "{name}"),
        }
    }
}

/// One reconstructed callable. Corresponds to exactly one contiguous
/// operation range in the source sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subroutine {
    pub id: SubroutineId,
    pub return_type: TypeTag,
    pub is_main: bool,
    pub start_offset: u32,
    pub commands: Vec<Command>,
    /// Trailing return, split off from `commands` when the range ends with
    /// one; synthesized for the degenerate stub.
    pub terminator: Option<Command>,
}

impl Subroutine {
    pub fn display_name(&self) -> String {
        if self.is_main {
            "main".to_string()
        } else {
            self.id.to_string()
        }
    }
}

/// Per-run diagnostic detail. Never required for emission; purely for
/// tooling and the rendered header comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Subroutines detected before the fallback stub kicked in.
    pub detected: usize,
    /// Subroutines whose return type could be inferred (non-void).
    pub typed: usize,
    /// Set when the fallback stub replaced an empty or untranslatable
    /// result.
    pub degenerate: bool,
    pub trace: Vec<String>,
}

/// Root of the decompilation output. Subroutines are siblings; none owns
/// another. At most one is marked `is_main`, and library inputs have none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Commands of the global-initializer block, empty when the input has no
    /// globals section.
    pub globals: Vec<Command>,
    pub subroutines: Vec<Subroutine>,
    pub diagnostics: Diagnostics,
}

impl Program {
    pub fn main(&self) -> Option<&Subroutine> {
        self.subroutines.iter().find(|s| s.is_main)
    }
}
