use super::bytes::ByteReader;
use super::constant_pool::ConstantPool;
use super::descriptor;
use super::{ClassFileError, Result};

/// A decoded annotation instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Field descriptor of the annotation type, e.g. `Ltest/Keep;`
    pub type_descriptor: String,
    /// Declared in `RuntimeVisibleAnnotations`
    pub visible: bool,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    /// Internal name of the annotation type
    pub fn type_name(&self) -> Option<&str> {
        descriptor::class_name_of(&self.type_descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant, identified by its tag
    Const(u8),
    Enum {
        type_descriptor: String,
        name: String,
    },
    /// Return descriptor of a class literal, e.g. `Ltest/Foo;` or `V`
    Class(String),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

pub(crate) fn parse_annotations(
    data: &[u8],
    pool: &ConstantPool,
    visible: bool,
) -> Result<Vec<Annotation>> {
    let mut reader = ByteReader::new(data);
    let count = reader.u16()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(parse_annotation(&mut reader, pool, visible)?);
    }
    Ok(annotations)
}

pub(crate) fn parse_default_value(
    data: &[u8],
    pool: &ConstantPool,
    visible: bool,
) -> Result<ElementValue> {
    let mut reader = ByteReader::new(data);
    parse_element_value(&mut reader, pool, visible)
}

fn parse_annotation(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
    visible: bool,
) -> Result<Annotation> {
    let type_descriptor = pool.utf8(reader.u16()?)?.to_string();
    let pairs = reader.u16()?;
    let mut elements = Vec::with_capacity(pairs as usize);
    for _ in 0..pairs {
        let name = pool.utf8(reader.u16()?)?.to_string();
        let value = parse_element_value(reader, pool, visible)?;
        elements.push((name, value));
    }
    Ok(Annotation {
        type_descriptor,
        visible,
        elements,
    })
}

fn parse_element_value(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
    visible: bool,
) -> Result<ElementValue> {
    let tag = reader.u8()?;
    let value = match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
            reader.u16()?;
            ElementValue::Const(tag)
        }
        b'e' => ElementValue::Enum {
            type_descriptor: pool.utf8(reader.u16()?)?.to_string(),
            name: pool.utf8(reader.u16()?)?.to_string(),
        },
        b'c' => ElementValue::Class(pool.utf8(reader.u16()?)?.to_string()),
        b'@' => ElementValue::Annotation(parse_annotation(reader, pool, visible)?),
        b'[' => {
            let count = reader.u16()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(parse_element_value(reader, pool, visible)?);
            }
            ElementValue::Array(values)
        }
        _ => return Err(ClassFileError::MalformedAttribute("annotation element")),
    };
    Ok(value)
}
