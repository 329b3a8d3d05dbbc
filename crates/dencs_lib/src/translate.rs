//! Pure instruction-to-command translation.
//!
//! One operation maps to at most one flat command; no-ops map to none.
//! Unrecognized operators and opcodes map to an explicit placeholder rather
//! than failing, so a single bad instruction never aborts a decompilation.

use crate::ast::{BinaryOp, Command, CommandKind, Literal, LogicalOp, UnaryOp};
use crate::ops::{OpKind, Operand, Operation, TypeTag};

/// Operator commands are dispatched by mnemonic prefix, so qualifier
/// suffixes and future variants of the same operator all land on the same
/// command.
fn operator_command(mnemonic: &str) -> Option<CommandKind> {
    // three-way logicals before the plain binaries: LOGAND/LOGOR would
    // otherwise never be reached behind a hypothetical LOG* binary
    let logical = [
        ("LOGAND", LogicalOp::And),
        ("LOGOR", LogicalOp::Or),
        ("BOOLAND", LogicalOp::BitAnd),
        ("EXCOR", LogicalOp::BitXor),
        ("INCOR", LogicalOp::BitOr),
    ];
    for (prefix, op) in logical {
        if mnemonic.starts_with(prefix) {
            return Some(CommandKind::Logical { op });
        }
    }

    let unary = [
        ("NEG", UnaryOp::Negate),
        ("NOT", UnaryOp::Not),
        ("COMP", UnaryOp::Complement),
    ];
    for (prefix, op) in unary {
        if mnemonic.starts_with(prefix) {
            return Some(CommandKind::Unary { op });
        }
    }

    let binary = [
        ("ADD", BinaryOp::Add),
        ("SUB", BinaryOp::Sub),
        ("MUL", BinaryOp::Mul),
        ("DIV", BinaryOp::Div),
        ("MOD", BinaryOp::Mod),
        ("NEQUAL", BinaryOp::NotEqual),
        ("EQUAL", BinaryOp::Equal),
        ("GEQ", BinaryOp::GreaterEq),
        ("GT", BinaryOp::Greater),
        ("LT", BinaryOp::Less),
        ("LEQ", BinaryOp::LessEq),
        ("SHLEFT", BinaryOp::ShiftLeft),
        ("USHRIGHT", BinaryOp::UnsignedShiftRight),
        ("SHRIGHT", BinaryOp::ShiftRight),
    ];
    for (prefix, op) in binary {
        if mnemonic.starts_with(prefix) {
            return Some(CommandKind::Binary { op });
        }
    }
    None
}

fn is_operator(kind: OpKind) -> bool {
    matches!(
        kind,
        OpKind::LogicalAnd
            | OpKind::LogicalOr
            | OpKind::InclusiveOr
            | OpKind::ExclusiveOr
            | OpKind::BitwiseAnd
            | OpKind::Equal
            | OpKind::NotEqual
            | OpKind::GreaterEq
            | OpKind::Greater
            | OpKind::Less
            | OpKind::LessEq
            | OpKind::ShiftLeft
            | OpKind::ShiftRight
            | OpKind::UnsignedShiftRight
            | OpKind::Add
            | OpKind::Sub
            | OpKind::Mul
            | OpKind::Div
            | OpKind::Mod
            | OpKind::Negate
            | OpKind::Complement
            | OpKind::BooleanNot
    )
}

fn placeholder(op: &Operation) -> CommandKind {
    let opcode = match op.kind {
        OpKind::Unknown(raw) => raw,
        _ => 0,
    };
    CommandKind::Unknown {
        opcode,
        mnemonic: op.kind.mnemonic().to_string(),
    }
}

fn constant(op: &Operation) -> CommandKind {
    let lit = match (op.value_type(), op.operands.first()) {
        (Some(TypeTag::Int), Some(Operand::Int(v))) => Literal::Int(*v),
        (Some(TypeTag::Float), Some(Operand::Float(v))) => Literal::Float(*v),
        (Some(TypeTag::String), Some(Operand::Str(s))) => Literal::Str(s.clone()),
        (Some(TypeTag::Object), Some(Operand::Dword(id))) => Literal::Object(*id),
        _ => return placeholder(op),
    };
    CommandKind::Constant(lit)
}

fn copy(op: &Operation, down: bool, frame: bool) -> CommandKind {
    let (Some(Operand::Int(offset)), Some(Operand::Word(size))) =
        (op.operands.first(), op.operands.get(1))
    else {
        return placeholder(op);
    };
    if frame {
        CommandKind::CopyFrame { down, offset: *offset, size: *size }
    } else {
        CommandKind::CopyStack { down, offset: *offset, size: *size }
    }
}

/// Relative jump distance in operations: resolved target index minus the
/// jumping operation's own index.
fn jump_rel(index: usize, target: usize) -> i32 {
    (target as i64 - index as i64) as i32
}

/// Translates the operation at `index` into a command, or `None` for no-ops
/// and for control transfers whose target was never resolved (the caller
/// records those in its trace).
pub fn translate(index: usize, op: &Operation) -> Option<Command> {
    let kind = match op.kind {
        OpKind::NoOp => return None,
        OpKind::Const => constant(op),
        OpKind::Action => match (op.operands.first(), op.operands.get(1)) {
            (Some(Operand::Word(routine)), Some(Operand::Byte(args))) => CommandKind::Action {
                routine: *routine,
                args: *args,
            },
            _ => placeholder(op),
        },
        OpKind::Jump | OpKind::JumpSub | OpKind::JumpIfZero | OpKind::JumpIfNonZero => {
            let target = op.jump_target?;
            let rel = jump_rel(index, target);
            match op.kind {
                OpKind::Jump => CommandKind::Jump { rel },
                OpKind::JumpSub => CommandKind::CallSub { rel },
                OpKind::JumpIfZero => CommandKind::JumpIfZero { rel },
                _ => CommandKind::JumpIfNonZero { rel },
            }
        }
        OpKind::Return => CommandKind::Return {
            ty: op.value_type().unwrap_or(TypeTag::Void),
        },
        OpKind::CopyDownSp => copy(op, true, false),
        OpKind::CopyTopSp => copy(op, false, false),
        OpKind::CopyDownBp => copy(op, true, true),
        OpKind::CopyTopBp => copy(op, false, true),
        OpKind::MoveSp => match op.operands.first() {
            Some(Operand::Int(delta)) => CommandKind::MoveSp { delta: *delta },
            _ => placeholder(op),
        },
        OpKind::ReserveSlot => CommandKind::Reserve {
            ty: op.value_type().unwrap_or(TypeTag::Void),
        },
        OpKind::Destruct => match (
            op.operands.first(),
            op.operands.get(1),
            op.operands.get(2),
        ) {
            (
                Some(Operand::Word(remove)),
                Some(Operand::SignedWord(keep_offset)),
                Some(Operand::Word(keep)),
            ) => CommandKind::Destruct {
                remove: *remove,
                keep_offset: *keep_offset,
                keep: *keep,
            },
            _ => placeholder(op),
        },
        OpKind::SaveBp => CommandKind::SaveFramePtr,
        OpKind::RestoreBp => CommandKind::RestoreFramePtr,
        OpKind::StoreState => match (op.operands.first(), op.operands.get(1)) {
            (Some(Operand::Dword(frame_size)), Some(Operand::Dword(stack_size))) => {
                CommandKind::StoreState {
                    state: op.qualifier,
                    frame_size: *frame_size,
                    stack_size: *stack_size,
                }
            }
            _ => placeholder(op),
        },
        k if is_operator(k) => match operator_command(k.mnemonic()) {
            Some(kind) => kind,
            None => placeholder(op),
        },
        // increments/decrements and anything undecodable survive as
        // placeholders so their position stays visible downstream
        _ => placeholder(op),
    };
    Some(Command::new(op.offset, kind))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ops::build::*;

    #[test]
    fn constants_keep_their_payload_type() {
        let c = translate(0, &const_int(42)).unwrap();
        assert_eq!(c.kind, CommandKind::Constant(Literal::Int(42)));

        let mut f = op(OpKind::Const);
        f.qualifier = 0x04;
        f.operands = vec![Operand::Float(1.5)];
        assert_eq!(
            translate(0, &f).unwrap().kind,
            CommandKind::Constant(Literal::Float(1.5))
        );

        let mut s = op(OpKind::Const);
        s.qualifier = 0x05;
        s.operands = vec![Operand::Str("door_tag".into())];
        assert_eq!(
            translate(0, &s).unwrap().kind,
            CommandKind::Constant(Literal::Str("door_tag".into()))
        );

        let mut o = op(OpKind::Const);
        o.qualifier = 0x06;
        o.operands = vec![Operand::Dword(0x7f00_0000)];
        assert_eq!(
            translate(0, &o).unwrap().kind,
            CommandKind::Constant(Literal::Object(0x7f00_0000))
        );
    }

    #[test]
    fn mismatched_constant_payload_becomes_placeholder() {
        let mut c = op(OpKind::Const);
        c.qualifier = 0x03;
        c.operands = vec![Operand::Float(1.0)];
        assert!(matches!(
            translate(0, &c).unwrap().kind,
            CommandKind::Unknown { .. }
        ));
    }

    #[test]
    fn action_carries_routine_and_arg_count() {
        let c = translate(0, &action(363, 2)).unwrap();
        assert_eq!(c.kind, CommandKind::Action { routine: 363, args: 2 });
    }

    #[test]
    fn jump_distances_are_index_relative() {
        let c = translate(4, &jmp(1)).unwrap();
        assert_eq!(c.kind, CommandKind::Jump { rel: -3 });

        let c = translate(2, &jsr(7)).unwrap();
        assert_eq!(c.kind, CommandKind::CallSub { rel: 5 });
    }

    #[test]
    fn unresolved_jump_translates_to_nothing() {
        assert_eq!(translate(0, &op(OpKind::Jump)), None);
    }

    #[test]
    fn noop_translates_to_nothing() {
        assert_eq!(translate(0, &op(OpKind::NoOp)), None);
    }

    #[test]
    fn operator_family_dispatch() {
        let cases = [
            (OpKind::Add, CommandKind::Binary { op: BinaryOp::Add }),
            (OpKind::NotEqual, CommandKind::Binary { op: BinaryOp::NotEqual }),
            (OpKind::GreaterEq, CommandKind::Binary { op: BinaryOp::GreaterEq }),
            (OpKind::UnsignedShiftRight, CommandKind::Binary { op: BinaryOp::UnsignedShiftRight }),
            (OpKind::Negate, CommandKind::Unary { op: UnaryOp::Negate }),
            (OpKind::BooleanNot, CommandKind::Unary { op: UnaryOp::Not }),
            (OpKind::Complement, CommandKind::Unary { op: UnaryOp::Complement }),
            (OpKind::LogicalAnd, CommandKind::Logical { op: LogicalOp::And }),
            (OpKind::BitwiseAnd, CommandKind::Logical { op: LogicalOp::BitAnd }),
            (OpKind::ExclusiveOr, CommandKind::Logical { op: LogicalOp::BitXor }),
        ];
        for (kind, want) in cases {
            assert_eq!(translate(0, &op(kind)).unwrap().kind, want);
        }
    }

    #[test]
    fn unknown_opcode_is_exactly_one_placeholder() {
        let mut o = op(OpKind::Unknown(0xEE));
        o.offset = 0x40;
        let c = translate(3, &o).unwrap();
        assert_eq!(c.offset, 0x40);
        assert!(matches!(c.kind, CommandKind::Unknown { opcode: 0xEE, .. }));
    }

    #[test]
    fn copies_distinguish_stack_and_frame_base() {
        let mut c = op(OpKind::CopyDownSp);
        c.operands = vec![Operand::Int(-4), Operand::Word(4)];
        assert_eq!(
            translate(0, &c).unwrap().kind,
            CommandKind::CopyStack { down: true, offset: -4, size: 4 }
        );

        let mut c = op(OpKind::CopyTopBp);
        c.operands = vec![Operand::Int(-8), Operand::Word(4)];
        assert_eq!(
            translate(0, &c).unwrap().kind,
            CommandKind::CopyFrame { down: false, offset: -8, size: 4 }
        );
    }

    #[test]
    fn destruct_and_store_state() {
        let mut d = op(OpKind::Destruct);
        d.operands = vec![
            Operand::Word(12),
            Operand::SignedWord(4),
            Operand::Word(4),
        ];
        assert_eq!(
            translate(0, &d).unwrap().kind,
            CommandKind::Destruct { remove: 12, keep_offset: 4, keep: 4 }
        );

        let mut s = op(OpKind::StoreState);
        s.qualifier = 0x10;
        s.operands = vec![Operand::Dword(8), Operand::Dword(12)];
        assert_eq!(
            translate(0, &s).unwrap().kind,
            CommandKind::StoreState { state: 0x10, frame_size: 8, stack_size: 12 }
        );
    }

    #[test]
    fn increment_is_preserved_as_placeholder() {
        let mut o = op(OpKind::IncrementSp);
        o.operands = vec![Operand::Int(-4)];
        let c = translate(0, &o).unwrap();
        assert!(matches!(
            c.kind,
            CommandKind::Unknown { ref mnemonic, .. } if mnemonic == "INCISP"
        ));
    }

    #[test]
    fn returns_carry_their_qualifier_type() {
        let mut r = retn();
        r.qualifier = 0x03;
        assert_eq!(
            translate(0, &r).unwrap().kind,
            CommandKind::Return { ty: TypeTag::Int }
        );
        assert_eq!(
            translate(0, &retn()).unwrap().kind,
            CommandKind::Return { ty: TypeTag::Void }
        );
    }
}
