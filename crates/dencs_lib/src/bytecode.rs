//! Compiled-script container decoding.
//!
//! Produces the operation sequence the decompiler consumes: every control
//! transfer carries a resolved index into the sequence, or `None` (plus a
//! downstream trace entry) when the raw byte offset does not land on an
//! instruction boundary.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};

use crate::DencsError;
use crate::ops::{OpKind, Operand, Operation};

const SIGNATURE: &[u8; 8] = b"NCS V1.0";
const SIZE_MARKER: u8 = 0x42;
const HEADER_LEN: usize = 13;

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn get_u8(&mut self) -> Result<u8, DencsError> {
        if self.remaining() < 1 {
            return Err(DencsError::Eof);
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn get_u16(&mut self) -> Result<u16, DencsError> {
        if self.remaining() < 2 {
            return Err(DencsError::Eof);
        }
        let v = BigEndian::read_u16(&self.buf[self.pos..self.pos + 2]);
        self.pos += 2;
        Ok(v)
    }

    fn get_i16(&mut self) -> Result<i16, DencsError> {
        Ok(self.get_u16()? as i16)
    }

    fn get_u32(&mut self) -> Result<u32, DencsError> {
        if self.remaining() < 4 {
            return Err(DencsError::Eof);
        }
        let v = BigEndian::read_u32(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(v)
    }

    fn get_i32(&mut self) -> Result<i32, DencsError> {
        Ok(self.get_u32()? as i32)
    }

    fn get_f32(&mut self) -> Result<f32, DencsError> {
        if self.remaining() < 4 {
            return Err(DencsError::Eof);
        }
        let v = BigEndian::read_f32(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(v)
    }

    fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], DencsError> {
        if self.remaining() < n {
            return Err(DencsError::Eof);
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }
}

fn op_kind(raw: u8) -> OpKind {
    match raw {
        0x01 => OpKind::CopyDownSp,
        0x02 => OpKind::ReserveSlot,
        0x03 => OpKind::CopyTopSp,
        0x04 => OpKind::Const,
        0x05 => OpKind::Action,
        0x06 => OpKind::LogicalAnd,
        0x07 => OpKind::LogicalOr,
        0x08 => OpKind::InclusiveOr,
        0x09 => OpKind::ExclusiveOr,
        0x0a => OpKind::BitwiseAnd,
        0x0b => OpKind::Equal,
        0x0c => OpKind::NotEqual,
        0x0d => OpKind::GreaterEq,
        0x0e => OpKind::Greater,
        0x0f => OpKind::Less,
        0x10 => OpKind::LessEq,
        0x11 => OpKind::ShiftLeft,
        0x12 => OpKind::ShiftRight,
        0x13 => OpKind::UnsignedShiftRight,
        0x14 => OpKind::Add,
        0x15 => OpKind::Sub,
        0x16 => OpKind::Mul,
        0x17 => OpKind::Div,
        0x18 => OpKind::Mod,
        0x19 => OpKind::Negate,
        0x1a => OpKind::Complement,
        0x1b => OpKind::MoveSp,
        0x1d => OpKind::Jump,
        0x1e => OpKind::JumpSub,
        0x1f => OpKind::JumpIfZero,
        0x20 => OpKind::Return,
        0x21 => OpKind::Destruct,
        0x22 => OpKind::BooleanNot,
        0x23 => OpKind::DecrementSp,
        0x24 => OpKind::IncrementSp,
        0x25 => OpKind::JumpIfNonZero,
        0x26 => OpKind::CopyDownBp,
        0x27 => OpKind::CopyTopBp,
        0x28 => OpKind::DecrementBp,
        0x29 => OpKind::IncrementBp,
        0x2a => OpKind::SaveBp,
        0x2b => OpKind::RestoreBp,
        0x2c => OpKind::StoreState,
        0x2d => OpKind::NoOp,
        other => OpKind::Unknown(other),
    }
}

/// Struct-comparison qualifiers carry an extra size operand after EQUAL and
/// NEQUAL.
const QUALIFIER_STRUCT: u8 = 0x24;
const QUALIFIER_INT: u8 = 0x03;
const QUALIFIER_FLOAT: u8 = 0x04;
const QUALIFIER_STRING: u8 = 0x05;
const QUALIFIER_OBJECT: u8 = 0x06;

fn read_operands(
    r: &mut Reader<'_>,
    kind: OpKind,
    qualifier: u8,
) -> Result<Vec<Operand>, DencsError> {
    let operands = match kind {
        OpKind::CopyDownSp | OpKind::CopyTopSp | OpKind::CopyDownBp | OpKind::CopyTopBp => {
            vec![Operand::Int(r.get_i32()?), Operand::Word(r.get_u16()?)]
        }
        OpKind::Const => match qualifier {
            QUALIFIER_INT => vec![Operand::Int(r.get_i32()?)],
            QUALIFIER_FLOAT => vec![Operand::Float(r.get_f32()?)],
            QUALIFIER_STRING => {
                let len = r.get_u16()? as usize;
                let bytes = r.get_bytes(len)?;
                vec![Operand::Str(String::from_utf8_lossy(bytes).to_string())]
            }
            QUALIFIER_OBJECT => vec![Operand::Dword(r.get_u32()?)],
            // unknown constant flavour: nothing safe to read
            _ => Vec::new(),
        },
        OpKind::Action => vec![Operand::Word(r.get_u16()?), Operand::Byte(r.get_u8()?)],
        OpKind::Jump | OpKind::JumpSub | OpKind::JumpIfZero | OpKind::JumpIfNonZero => {
            vec![Operand::Int(r.get_i32()?)]
        }
        OpKind::MoveSp
        | OpKind::IncrementSp
        | OpKind::DecrementSp
        | OpKind::IncrementBp
        | OpKind::DecrementBp => vec![Operand::Int(r.get_i32()?)],
        OpKind::Destruct => vec![
            Operand::Word(r.get_u16()?),
            Operand::SignedWord(r.get_i16()?),
            Operand::Word(r.get_u16()?),
        ],
        OpKind::StoreState => vec![Operand::Dword(r.get_u32()?), Operand::Dword(r.get_u32()?)],
        OpKind::Equal | OpKind::NotEqual if qualifier == QUALIFIER_STRUCT => {
            vec![Operand::Word(r.get_u16()?)]
        }
        _ => Vec::new(),
    };
    Ok(operands)
}

/// Decodes a complete `NCS V1.0` image into an operation sequence with
/// resolved jump targets.
pub fn decode_program(buf: &[u8]) -> Result<Vec<Operation>, DencsError> {
    if buf.len() < HEADER_LEN {
        return Err(DencsError::Eof);
    }
    if &buf[..8] != SIGNATURE {
        return Err(DencsError::BadSignature);
    }
    let marker = buf[8];
    if marker != SIZE_MARKER {
        return Err(DencsError::BadSizeMarker(marker));
    }
    let declared = BigEndian::read_u32(&buf[9..13]) as usize;
    // tolerate a trailing-garbage or short declared size by clamping
    let end = declared.clamp(HEADER_LEN, buf.len());

    let mut r = Reader::new(&buf[HEADER_LEN..end]);
    let mut ops = Vec::new();
    while r.remaining() > 0 {
        let offset = (HEADER_LEN + r.pos) as u32;
        let raw = r.get_u8()?;
        let qualifier = r.get_u8()?;
        let kind = op_kind(raw);
        let operands = read_operands(&mut r, kind, qualifier)?;
        ops.push(Operation {
            kind,
            qualifier,
            offset,
            operands,
            jump_target: None,
        });
    }

    resolve_jumps(&mut ops);
    Ok(ops)
}

/// Jump operands are byte offsets relative to the jumping instruction; they
/// only become usable after mapping onto instruction indices.
fn resolve_jumps(ops: &mut [Operation]) {
    let index_of: HashMap<u32, usize> = ops
        .iter()
        .enumerate()
        .map(|(i, o)| (o.offset, i))
        .collect();
    for op in ops.iter_mut() {
        if !op.kind.is_jump() {
            continue;
        }
        let Some(Operand::Int(rel)) = op.operands.first() else {
            continue;
        };
        let target = i64::from(op.offset) + i64::from(*rel);
        op.jump_target = u32::try_from(target)
            .ok()
            .and_then(|t| index_of.get(&t).copied());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ops::TypeTag;

    struct Image {
        body: Vec<u8>,
    }

    impl Image {
        fn new() -> Image {
            Image { body: Vec::new() }
        }

        fn raw(mut self, bytes: &[u8]) -> Image {
            self.body.extend_from_slice(bytes);
            self
        }

        fn finish(self) -> Vec<u8> {
            let mut out = Vec::from(*SIGNATURE);
            out.push(SIZE_MARKER);
            let total = (HEADER_LEN + self.body.len()) as u32;
            out.extend_from_slice(&total.to_be_bytes());
            out.extend_from_slice(&self.body);
            out
        }
    }

    #[test]
    fn rejects_foreign_containers() {
        assert!(matches!(
            decode_program(b"NCS V1.1\x42\x00\x00\x00\x0d"),
            Err(DencsError::BadSignature)
        ));
        assert!(matches!(
            decode_program(b"NCS V1.0\x41\x00\x00\x00\x0d"),
            Err(DencsError::BadSizeMarker(0x41))
        ));
        assert!(matches!(decode_program(b"NCS"), Err(DencsError::Eof)));
    }

    #[test]
    fn decodes_constants_and_actions() {
        let image = Image::new()
            .raw(&[0x04, 0x03, 0x00, 0x00, 0x00, 0x2a]) // CONST int 42
            .raw(&[0x04, 0x05, 0x00, 0x02, b'h', b'i']) // CONST string "hi"
            .raw(&[0x05, 0x00, 0x01, 0x6b, 0x02]) // ACTION 363 #2
            .raw(&[0x20, 0x00]) // RETN
            .finish();
        let ops = decode_program(&image).unwrap();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0].kind, OpKind::Const);
        assert_eq!(ops[0].operands, vec![Operand::Int(42)]);
        assert_eq!(ops[1].operands, vec![Operand::Str("hi".into())]);
        assert_eq!(
            ops[2].operands,
            vec![Operand::Word(363), Operand::Byte(2)]
        );
        assert_eq!(ops[3].kind, OpKind::Return);
        assert_eq!(ops[0].offset, 13);
        assert_eq!(ops[1].offset, 19);
    }

    #[test]
    fn resolves_jump_targets_to_indices() {
        // JSR +8 over a RETN onto an ACTION
        let image = Image::new()
            .raw(&[0x1e, 0x00, 0x00, 0x00, 0x00, 0x08]) // 13: JSR -> 21
            .raw(&[0x20, 0x00]) // 19: RETN
            .raw(&[0x05, 0x00, 0x00, 0x07, 0x00]) // 21: ACTION 7 #0
            .raw(&[0x20, 0x00]) // 26: RETN
            .finish();
        let ops = decode_program(&image).unwrap();
        assert_eq!(ops[0].jump_target, Some(2));
    }

    #[test]
    fn misaligned_jump_target_stays_unresolved() {
        let image = Image::new()
            .raw(&[0x1d, 0x00, 0x00, 0x00, 0x00, 0x03]) // JMP into its own operand
            .raw(&[0x20, 0x00])
            .finish();
        let ops = decode_program(&image).unwrap();
        assert_eq!(ops[0].kind, OpKind::Jump);
        assert_eq!(ops[0].jump_target, None);
    }

    #[test]
    fn reserve_slot_type_comes_from_the_qualifier() {
        let image = Image::new()
            .raw(&[0x02, 0x03]) // RSADD int
            .raw(&[0x02, 0x10]) // RSADD effect
            .finish();
        let ops = decode_program(&image).unwrap();
        assert_eq!(ops[0].value_type(), Some(TypeTag::Int));
        assert_eq!(ops[1].value_type(), Some(TypeTag::Effect));
    }

    #[test]
    fn struct_comparison_reads_its_size_operand() {
        let image = Image::new()
            .raw(&[0x0b, 0x24, 0x00, 0x0c]) // EQUAL struct, size 12
            .raw(&[0x0b, 0x20]) // EQUAL int-int, no extra operand
            .finish();
        let ops = decode_program(&image).unwrap();
        assert_eq!(ops[0].operands, vec![Operand::Word(12)]);
        assert_eq!(ops[1].operands, vec![]);
    }

    #[test]
    fn unknown_opcode_is_carried_not_fatal() {
        let image = Image::new()
            .raw(&[0xee, 0x00]) // unknown opcode, qualifier only
            .raw(&[0x20, 0x00])
            .finish();
        let ops = decode_program(&image).unwrap();
        assert_eq!(ops[0].kind, OpKind::Unknown(0xee));
        assert_eq!(ops[1].kind, OpKind::Return);
    }

    #[test]
    fn truncated_operand_is_a_decode_error() {
        let image = Image::new().raw(&[0x04, 0x03, 0x00]).finish();
        assert!(matches!(decode_program(&image), Err(DencsError::Eof)));
    }

    #[test]
    fn declared_size_clamps_the_instruction_stream() {
        // declared size covers only the first RETN; the trailing byte is
        // ignored
        let mut image = Image::new().raw(&[0x20, 0x00]).finish();
        image.push(0x05);
        let ops = decode_program(&image).unwrap();
        assert_eq!(ops.len(), 1);
    }
}
