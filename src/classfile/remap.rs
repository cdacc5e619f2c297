//! Constant pool compaction
//!
//! Every pool index reachable from the retained class structure is marked,
//! the mark is closed over pool-internal references, and the surviving
//! entries are renumbered in their original order. Renumbering never moves
//! an entry to a higher index, so one-byte `ldc` operands stay valid.

use super::bytes::{read_u16_at, write_u16_at};
use super::code::{constant_operands, CodeAttribute, OperandWidth};
use super::constant_pool::{Constant, ConstantPool};
use super::reader::{AttributeInfo, ClassFile};
use super::{ClassFileError, Result};

/// Drop unused constant pool entries and renumber all references.
///
/// Returns `Ok(false)` and leaves the class untouched if it carries an
/// attribute whose pool references cannot be located.
pub fn compact_constant_pool(class: &mut ClassFile) -> Result<bool> {
    let pool = std::mem::take(&mut class.constant_pool);

    let mut marked = vec![false; pool.len()];
    let marking = walk_class(class, &pool, &mut |index| {
        if let Some(slot) = marked.get_mut(index as usize) {
            *slot = true;
        }
        index
    });
    match marking {
        Ok(()) => {}
        Err(ClassFileError::UnsupportedAttribute(_)) => {
            class.constant_pool = pool;
            return Ok(false);
        }
        Err(e) => {
            class.constant_pool = pool;
            return Err(e);
        }
    }

    close_over_references(&pool, &mut marked);

    let mut mapping = vec![0u16; pool.len()];
    let mut next: usize = 1;
    for (index, constant) in pool.entries().iter().enumerate() {
        if marked[index] && *constant != Constant::Unusable {
            mapping[index] = next as u16;
            next += if constant.is_wide() { 2 } else { 1 };
        }
    }

    let mut bad_index = None;
    let rewrite = walk_class(class, &pool, &mut |index| {
        let mapped = mapping.get(index as usize).copied().unwrap_or(0);
        if mapped == 0 && bad_index.is_none() {
            bad_index = Some(index);
        }
        mapped
    });
    if let Err(e) = rewrite {
        class.constant_pool = pool;
        return Err(e);
    }
    if let Some(index) = bad_index {
        class.constant_pool = pool;
        return Err(ClassFileError::BadConstantIndex(index));
    }

    let mut compacted = ConstantPool::new();
    for (index, constant) in pool.entries().iter().enumerate() {
        if !marked[index] || *constant == Constant::Unusable {
            continue;
        }
        let mut constant = constant.clone();
        for reference in constant.references_mut() {
            *reference = mapping.get(*reference as usize).copied().unwrap_or(0);
        }
        compacted.push(constant)?;
    }
    class.constant_pool = compacted;
    Ok(true)
}

fn close_over_references(pool: &ConstantPool, marked: &mut [bool]) {
    let mut worklist: Vec<usize> = (0..marked.len()).filter(|i| marked[*i]).collect();
    while let Some(index) = worklist.pop() {
        let mut constant = pool.entries()[index].clone();
        for reference in constant.references_mut() {
            let target = *reference as usize;
            if target < marked.len() && !marked[target] {
                marked[target] = true;
                worklist.push(target);
            }
        }
    }
}

fn walk_class<F: FnMut(u16) -> u16>(
    class: &mut ClassFile,
    pool: &ConstantPool,
    f: &mut F,
) -> Result<()> {
    class.this_class = f(class.this_class);
    if class.super_class != 0 {
        class.super_class = f(class.super_class);
    }
    for interface in &mut class.interfaces {
        *interface = f(*interface);
    }
    for member in class.fields.iter_mut().chain(class.methods.iter_mut()) {
        member.name_index = f(member.name_index);
        member.descriptor_index = f(member.descriptor_index);
        walk_attributes(&mut member.attributes, pool, f)?;
    }
    walk_attributes(&mut class.attributes, pool, f)
}

fn walk_attributes<F: FnMut(u16) -> u16>(
    attributes: &mut [AttributeInfo],
    pool: &ConstantPool,
    f: &mut F,
) -> Result<()> {
    for attribute in attributes {
        let name = pool.utf8(attribute.name_index)?.to_string();
        attribute.name_index = f(attribute.name_index);
        let mut cursor = Cursor {
            data: &mut attribute.data,
            pos: 0,
        };
        cursor.body(&name, pool, f)?;
    }
    Ok(())
}

/// In-place patcher over one attribute body
struct Cursor<'d> {
    data: &'d mut [u8],
    pos: usize,
}

impl<'d> Cursor<'d> {
    fn u8(&mut self) -> Result<u8> {
        let value = *self
            .data
            .get(self.pos)
            .ok_or(ClassFileError::UnexpectedEof(self.pos))?;
        self.pos += 1;
        Ok(value)
    }

    fn u16(&mut self) -> Result<u16> {
        let value = read_u16_at(self.data, self.pos)?;
        self.pos += 2;
        Ok(value)
    }

    fn u32(&mut self) -> Result<u32> {
        let hi = self.u16()? as u32;
        let lo = self.u16()? as u32;
        Ok((hi << 16) | lo)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        if self.pos + len > self.data.len() {
            return Err(ClassFileError::UnexpectedEof(self.pos));
        }
        self.pos += len;
        Ok(())
    }

    fn index<F: FnMut(u16) -> u16>(&mut self, f: &mut F) -> Result<()> {
        let value = read_u16_at(self.data, self.pos)?;
        write_u16_at(self.data, self.pos, f(value))?;
        self.pos += 2;
        Ok(())
    }

    /// An index where zero means "absent"
    fn optional_index<F: FnMut(u16) -> u16>(&mut self, f: &mut F) -> Result<()> {
        if read_u16_at(self.data, self.pos)? == 0 {
            self.pos += 2;
            Ok(())
        } else {
            self.index(f)
        }
    }

    fn index_list<F: FnMut(u16) -> u16>(&mut self, f: &mut F) -> Result<()> {
        let count = self.u16()?;
        for _ in 0..count {
            self.index(f)?;
        }
        Ok(())
    }

    fn body<F: FnMut(u16) -> u16>(
        &mut self,
        name: &str,
        pool: &ConstantPool,
        f: &mut F,
    ) -> Result<()> {
        match name {
            "ConstantValue" | "Signature" | "SourceFile" | "NestHost" | "ModuleMainClass" => {
                self.index(f)
            }
            "Deprecated" | "Synthetic" | "SourceDebugExtension" | "LineNumberTable" => Ok(()),
            "Exceptions" | "NestMembers" | "PermittedSubclasses" | "ModulePackages" => {
                self.index_list(f)
            }
            "InnerClasses" => {
                let count = self.u16()?;
                for _ in 0..count {
                    self.index(f)?;
                    self.optional_index(f)?;
                    self.optional_index(f)?;
                    self.skip(2)?;
                }
                Ok(())
            }
            "EnclosingMethod" => {
                self.index(f)?;
                self.optional_index(f)
            }
            "LocalVariableTable" | "LocalVariableTypeTable" => {
                let count = self.u16()?;
                for _ in 0..count {
                    self.skip(4)?;
                    self.index(f)?;
                    self.index(f)?;
                    self.skip(2)?;
                }
                Ok(())
            }
            "MethodParameters" => {
                let count = self.u8()?;
                for _ in 0..count {
                    self.optional_index(f)?;
                    self.skip(2)?;
                }
                Ok(())
            }
            "BootstrapMethods" => {
                let count = self.u16()?;
                for _ in 0..count {
                    self.index(f)?;
                    self.index_list(f)?;
                }
                Ok(())
            }
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => self.annotations(f),
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                let parameters = self.u8()?;
                for _ in 0..parameters {
                    self.annotations(f)?;
                }
                Ok(())
            }
            "AnnotationDefault" => self.element_value(f),
            "StackMapTable" => self.stack_map_table(f),
            "Code" => self.code(pool, f),
            "Record" => {
                let count = self.u16()?;
                for _ in 0..count {
                    self.index(f)?;
                    self.index(f)?;
                    self.nested_attributes(pool, f)?;
                }
                Ok(())
            }
            other => Err(ClassFileError::UnsupportedAttribute(other.to_string())),
        }
    }

    fn nested_attributes<F: FnMut(u16) -> u16>(
        &mut self,
        pool: &ConstantPool,
        f: &mut F,
    ) -> Result<()> {
        let count = self.u16()?;
        for _ in 0..count {
            let name = pool.utf8(read_u16_at(self.data, self.pos)?)?.to_string();
            self.index(f)?;
            let len = self.u32()? as usize;
            let start = self.pos;
            self.skip(len)?;
            let mut inner = Cursor {
                data: &mut self.data[start..start + len],
                pos: 0,
            };
            inner.body(&name, pool, f)?;
        }
        Ok(())
    }

    fn code<F: FnMut(u16) -> u16>(&mut self, pool: &ConstantPool, f: &mut F) -> Result<()> {
        let code = CodeAttribute::parse(self.data)?;
        let base = CodeAttribute::CODE_OFFSET;
        for (offset, width) in constant_operands(&code.code)? {
            let at = base + offset;
            match width {
                OperandWidth::Byte => {
                    let mapped = f(self.data[at] as u16);
                    if mapped > u8::MAX as u16 {
                        return Err(ClassFileError::MalformedAttribute("Code"));
                    }
                    self.data[at] = mapped as u8;
                }
                OperandWidth::Short => {
                    let value = read_u16_at(self.data, at)?;
                    write_u16_at(self.data, at, f(value))?;
                }
            }
        }
        self.pos = code.exception_table_offset();
        let entries = self.u16()?;
        for _ in 0..entries {
            self.skip(6)?;
            self.optional_index(f)?;
        }
        self.nested_attributes(pool, f)
    }

    fn stack_map_table<F: FnMut(u16) -> u16>(&mut self, f: &mut F) -> Result<()> {
        let frames = self.u16()?;
        for _ in 0..frames {
            let frame_type = self.u8()?;
            match frame_type {
                0..=63 => {}
                64..=127 => self.verification_type(f)?,
                247 => {
                    self.skip(2)?;
                    self.verification_type(f)?;
                }
                248..=251 => self.skip(2)?,
                252..=254 => {
                    self.skip(2)?;
                    for _ in 0..(frame_type - 251) {
                        self.verification_type(f)?;
                    }
                }
                255 => {
                    self.skip(2)?;
                    for _ in 0..2 {
                        let count = self.u16()?;
                        for _ in 0..count {
                            self.verification_type(f)?;
                        }
                    }
                }
                _ => return Err(ClassFileError::MalformedAttribute("StackMapTable")),
            }
        }
        Ok(())
    }

    fn verification_type<F: FnMut(u16) -> u16>(&mut self, f: &mut F) -> Result<()> {
        match self.u8()? {
            7 => self.index(f),
            8 => self.skip(2),
            0..=6 => Ok(()),
            _ => Err(ClassFileError::MalformedAttribute("StackMapTable")),
        }
    }

    fn annotations<F: FnMut(u16) -> u16>(&mut self, f: &mut F) -> Result<()> {
        let count = self.u16()?;
        for _ in 0..count {
            self.annotation(f)?;
        }
        Ok(())
    }

    fn annotation<F: FnMut(u16) -> u16>(&mut self, f: &mut F) -> Result<()> {
        self.index(f)?;
        let pairs = self.u16()?;
        for _ in 0..pairs {
            self.index(f)?;
            self.element_value(f)?;
        }
        Ok(())
    }

    fn element_value<F: FnMut(u16) -> u16>(&mut self, f: &mut F) -> Result<()> {
        match self.u8()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => self.index(f),
            b'e' => {
                self.index(f)?;
                self.index(f)
            }
            b'@' => self.annotation(f),
            b'[' => {
                let count = self.u16()?;
                for _ in 0..count {
                    self.element_value(f)?;
                }
                Ok(())
            }
            _ => Err(ClassFileError::MalformedAttribute("annotation element")),
        }
    }
}
