//! JVM class-file codec
//!
//! Reads class files into a raw model (`ClassFile`) that can be written back
//! unchanged, and drives a `ClassVisitor` over the structural and instruction
//! level facts the shrinker needs.

mod annotations;
mod bytes;
mod code;
mod constant_pool;
pub mod descriptor;
mod reader;
mod remap;
pub mod signature;
mod visitor;
mod writer;

pub use annotations::{Annotation, ElementValue};
pub use code::{CodeAttribute, ExceptionEntry, Instruction, LdcConstant, MethodInsnKind};
pub use constant_pool::{Constant, ConstantPool, MemberRef};
pub use reader::{AttributeInfo, ClassFile, MemberInfo};
pub use remap::compact_constant_pool;
pub use visitor::{
    accept, ClassHeader, ClassVisitor, FieldDecl, InnerClassEntry, MethodDecl, ReadMode,
};

use thiserror::Error;

/// Access flags shared by classes and members
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const SUPER: u16 = 0x0020;
    pub const VOLATILE: u16 = 0x0040;
    pub const BRIDGE: u16 = 0x0040;
    pub const TRANSIENT: u16 = 0x0080;
    pub const VARARGS: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const STRICT: u16 = 0x0800;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;
}

pub const MAGIC: u32 = 0xCAFE_BABE;

/// Errors raised while decoding or encoding class files
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassFileError {
    #[error("unexpected end of data at offset {0}")]
    UnexpectedEof(usize),
    #[error("not a class file (magic {0:#010x})")]
    BadMagic(u32),
    #[error("unknown constant pool tag {tag} at index {index}")]
    BadConstantTag { tag: u8, index: usize },
    #[error("invalid constant pool index {0}")]
    BadConstantIndex(u16),
    #[error("constant pool entry {index} is not a {expected}")]
    WrongConstantType { index: u16, expected: &'static str },
    #[error("invalid opcode {opcode:#04x} at bytecode offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("malformed {0} attribute")]
    MalformedAttribute(&'static str),
    #[error("malformed descriptor or signature `{0}`")]
    MalformedSignature(String),
    #[error("constant pool overflow")]
    ConstantPoolOverflow,
    #[error("attribute {0} cannot be remapped")]
    UnsupportedAttribute(String),
}

pub type Result<T> = std::result::Result<T, ClassFileError>;
