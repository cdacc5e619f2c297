use super::bytes::ByteReader;
use super::constant_pool::{Constant, ConstantPool, MemberRef};
use super::reader::{parse_attributes, AttributeInfo};
use super::{ClassFileError, Result};

pub(crate) mod opcodes {
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const LDC2_W: u8 = 0x14;
    pub const IINC: u8 = 0x84;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const INVOKEDYNAMIC: u8 = 0xba;
    pub const NEW: u8 = 0xbb;
    pub const ANEWARRAY: u8 = 0xbd;
    pub const CHECKCAST: u8 = 0xc0;
    pub const INSTANCEOF: u8 = 0xc1;
    pub const WIDE: u8 = 0xc4;
    pub const MULTIANEWARRAY: u8 = 0xc5;
}

use opcodes::*;

/// Exception table entry; `catch_type` 0 means "any"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// Decoded body of a `Code` attribute
#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let max_stack = reader.u16()?;
        let max_locals = reader.u16()?;
        let code_len = reader.u32()? as usize;
        let code = reader.bytes(code_len)?.to_vec();
        let entries = reader.u16()?;
        let mut exception_table = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            exception_table.push(ExceptionEntry {
                start_pc: reader.u16()?,
                end_pc: reader.u16()?,
                handler_pc: reader.u16()?,
                catch_type: reader.u16()?,
            });
        }
        let attributes = parse_attributes(&mut reader)?;
        Ok(Self {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// Byte offset of the bytecode array inside the attribute body
    pub(crate) const CODE_OFFSET: usize = 8;

    /// Byte offset of the exception table length inside the attribute body
    pub(crate) fn exception_table_offset(&self) -> usize {
        Self::CODE_OFFSET + self.code.len()
    }

    /// Decode every instruction into an event
    pub fn instructions(&self, pool: &ConstantPool) -> Result<Vec<Instruction>> {
        let mut instructions = Vec::new();
        let mut offset = 0;
        while offset < self.code.len() {
            let len = instruction_length(&self.code, offset)?;
            instructions.push(decode_instruction(&self.code, offset, pool)?);
            offset += len;
        }
        Ok(instructions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodInsnKind {
    Virtual,
    Special,
    Static,
    Interface,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LdcConstant {
    /// Internal name or array descriptor
    Class(String),
    String(String),
    Other,
}

/// Instruction-level events the shrinker cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `new`, `anewarray`, `checkcast`, `instanceof`; the operand is an
    /// internal name or an array descriptor
    Type { opcode: u8, class: String },
    Field { opcode: u8, member: MemberRef },
    Method { kind: MethodInsnKind, member: MemberRef },
    InvokeDynamic { name: String, descriptor: String },
    Ldc(LdcConstant),
    MultiANewArray { descriptor: String, dimensions: u8 },
    Other { opcode: u8 },
}

fn fixed_operand_length(opcode: u8) -> Option<usize> {
    let len = match opcode {
        0x00..=0x0f => 0,
        0x10 => 1,
        0x11 => 2,
        LDC => 1,
        LDC_W | LDC2_W => 2,
        0x15..=0x19 => 1,
        0x1a..=0x35 => 0,
        0x36..=0x3a => 1,
        0x3b..=0x83 => 0,
        IINC => 2,
        0x85..=0x98 => 0,
        0x99..=0xa8 => 2,
        0xa9 => 1,
        0xac..=0xb1 => 0,
        GETSTATIC..=INVOKESTATIC => 2,
        INVOKEINTERFACE | INVOKEDYNAMIC => 4,
        NEW => 2,
        0xbc => 1,
        ANEWARRAY => 2,
        0xbe | 0xbf => 0,
        CHECKCAST | INSTANCEOF => 2,
        0xc2 | 0xc3 => 0,
        MULTIANEWARRAY => 3,
        0xc6 | 0xc7 => 2,
        0xc8 | 0xc9 => 4,
        _ => return None,
    };
    Some(len)
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32> {
    code.get(offset..offset + 4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(ClassFileError::UnexpectedEof(offset))
}

fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    super::bytes::read_u16_at(code, offset)
}

/// Total length in bytes of the instruction starting at `offset`
pub(crate) fn instruction_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = *code.get(offset).ok_or(ClassFileError::UnexpectedEof(offset))?;
    let len = match opcode {
        TABLESWITCH => {
            let base = offset + 1 + padding(offset);
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            if high < low {
                return Err(ClassFileError::MalformedAttribute("tableswitch"));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            base + 12 + count * 4 - offset
        }
        LOOKUPSWITCH => {
            let base = offset + 1 + padding(offset);
            let pairs = read_i32(code, base + 4)?;
            if pairs < 0 {
                return Err(ClassFileError::MalformedAttribute("lookupswitch"));
            }
            base + 8 + pairs as usize * 8 - offset
        }
        WIDE => {
            let inner = *code
                .get(offset + 1)
                .ok_or(ClassFileError::UnexpectedEof(offset + 1))?;
            if inner == IINC {
                6
            } else {
                4
            }
        }
        _ => {
            1 + fixed_operand_length(opcode)
                .ok_or(ClassFileError::InvalidOpcode { opcode, offset })?
        }
    };
    if offset + len > code.len() {
        return Err(ClassFileError::UnexpectedEof(offset));
    }
    Ok(len)
}

fn padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

/// Width of a constant-pool operand embedded in bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperandWidth {
    Byte,
    Short,
}

/// Positions of every constant-pool index embedded in `code`
pub(crate) fn constant_operands(code: &[u8]) -> Result<Vec<(usize, OperandWidth)>> {
    let mut operands = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let len = instruction_length(code, offset)?;
        match code[offset] {
            LDC => operands.push((offset + 1, OperandWidth::Byte)),
            LDC_W | LDC2_W | GETSTATIC..=INVOKEDYNAMIC | NEW | ANEWARRAY | CHECKCAST
            | INSTANCEOF | MULTIANEWARRAY => operands.push((offset + 1, OperandWidth::Short)),
            _ => {}
        }
        offset += len;
    }
    Ok(operands)
}

fn decode_instruction(code: &[u8], offset: usize, pool: &ConstantPool) -> Result<Instruction> {
    let opcode = code[offset];
    let instruction = match opcode {
        LDC => ldc(pool, code[offset + 1] as u16)?,
        LDC_W | LDC2_W => ldc(pool, read_u16(code, offset + 1)?)?,
        GETSTATIC..=PUTFIELD => Instruction::Field {
            opcode,
            member: pool.member_ref(read_u16(code, offset + 1)?)?,
        },
        INVOKEVIRTUAL..=INVOKEINTERFACE => {
            let kind = match opcode {
                INVOKEVIRTUAL => MethodInsnKind::Virtual,
                INVOKESPECIAL => MethodInsnKind::Special,
                INVOKESTATIC => MethodInsnKind::Static,
                _ => MethodInsnKind::Interface,
            };
            Instruction::Method {
                kind,
                member: pool.member_ref(read_u16(code, offset + 1)?)?,
            }
        }
        INVOKEDYNAMIC => {
            let index = read_u16(code, offset + 1)?;
            match pool.get(index)? {
                Constant::InvokeDynamic { name_and_type, .. } => {
                    let (name, descriptor) = pool.name_and_type(*name_and_type)?;
                    Instruction::InvokeDynamic {
                        name: name.to_string(),
                        descriptor: descriptor.to_string(),
                    }
                }
                _ => {
                    return Err(ClassFileError::WrongConstantType {
                        index,
                        expected: "InvokeDynamic",
                    })
                }
            }
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Instruction::Type {
            opcode,
            class: pool.class_name(read_u16(code, offset + 1)?)?.to_string(),
        },
        MULTIANEWARRAY => Instruction::MultiANewArray {
            descriptor: pool.class_name(read_u16(code, offset + 1)?)?.to_string(),
            dimensions: code[offset + 3],
        },
        _ => Instruction::Other { opcode },
    };
    Ok(instruction)
}

fn ldc(pool: &ConstantPool, index: u16) -> Result<Instruction> {
    let constant = match pool.get(index)? {
        Constant::Class(name) => LdcConstant::Class(pool.utf8(*name)?.to_string()),
        Constant::String(value) => LdcConstant::String(pool.utf8(*value)?.to_string()),
        _ => LdcConstant::Other,
    };
    Ok(Instruction::Ldc(constant))
}
