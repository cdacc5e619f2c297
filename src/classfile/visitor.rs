use super::annotations::{parse_annotations, parse_default_value, Annotation, ElementValue};
use super::bytes::ByteReader;
use super::code::{CodeAttribute, Instruction};
use super::reader::{AttributeInfo, ClassFile};
use super::{ClassFileError, Result};

/// How much of a class file to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Full,
    /// Structure only; used for library classes
    SkipCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub major_version: u16,
    pub access: u16,
    pub name: String,
    pub signature: Option<String>,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub inner: String,
    pub outer: Option<String>,
    pub simple_name: Option<String>,
    pub access: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub annotation_default: Option<ElementValue>,
}

impl MethodDecl {
    /// `name:descriptor`
    pub fn id(&self) -> String {
        format!("{}:{}", self.name, self.descriptor)
    }
}

/// Callbacks fired while walking a class file
///
/// All callbacks default to no-ops, so a visitor only implements the events
/// it consumes. Decode errors are converted into the visitor's own error type.
pub trait ClassVisitor {
    type Error: From<ClassFileError>;

    fn visit_header(&mut self, _header: &ClassHeader) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn visit_annotation(
        &mut self,
        _annotation: &Annotation,
    ) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn visit_inner_class(
        &mut self,
        _entry: &InnerClassEntry,
    ) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn visit_field(&mut self, _field: &FieldDecl) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn visit_method(&mut self, _method: &MethodDecl) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn visit_try_catch(
        &mut self,
        _method: &MethodDecl,
        _catch_type: &str,
    ) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn visit_instruction(
        &mut self,
        _method: &MethodDecl,
        _instruction: &Instruction,
    ) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn visit_method_end(&mut self, _method: &MethodDecl) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> std::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// Walk `class` and fire the visitor's callbacks in declaration order:
/// header, class annotations, inner classes, fields, then each method
/// followed by its try-catch types and instructions.
pub fn accept<V: ClassVisitor>(
    class: &ClassFile,
    visitor: &mut V,
    mode: ReadMode,
) -> std::result::Result<(), V::Error> {
    let pool = &class.constant_pool;

    let header = ClassHeader {
        major_version: class.major_version,
        access: class.access_flags,
        name: class.name()?.to_string(),
        signature: signature(class, &class.attributes)?,
        super_name: class.super_name()?.map(str::to_string),
        interfaces: class
            .interface_names()?
            .into_iter()
            .map(str::to_string)
            .collect(),
    };
    visitor.visit_header(&header)?;

    for annotation in annotations(class, &class.attributes)? {
        visitor.visit_annotation(&annotation)?;
    }

    if let Some(attribute) = class.find_attribute(&class.attributes, "InnerClasses") {
        let mut reader = ByteReader::new(&attribute.data);
        let count = reader.u16()?;
        for _ in 0..count {
            let inner = reader.u16()?;
            let outer = reader.u16()?;
            let simple_name = reader.u16()?;
            let access = reader.u16()?;
            let entry = InnerClassEntry {
                inner: pool.class_name(inner)?.to_string(),
                outer: optional(outer, |i| pool.class_name(i))?,
                simple_name: optional(simple_name, |i| pool.utf8(i))?,
                access,
            };
            visitor.visit_inner_class(&entry)?;
        }
    }

    for field in &class.fields {
        let decl = FieldDecl {
            access: field.access_flags,
            name: class.member_name(field)?.to_string(),
            descriptor: class.member_descriptor(field)?.to_string(),
            signature: signature(class, &field.attributes)?,
            annotations: annotations(class, &field.attributes)?,
        };
        visitor.visit_field(&decl)?;
    }

    for method in &class.methods {
        let exceptions = match class.find_attribute(&method.attributes, "Exceptions") {
            Some(attribute) => {
                let mut reader = ByteReader::new(&attribute.data);
                let count = reader.u16()?;
                let mut names = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    names.push(pool.class_name(reader.u16()?)?.to_string());
                }
                names
            }
            None => Vec::new(),
        };
        let annotation_default = class
            .find_attribute(&method.attributes, "AnnotationDefault")
            .map(|a| parse_default_value(&a.data, pool, true))
            .transpose()?;

        let decl = MethodDecl {
            access: method.access_flags,
            name: class.member_name(method)?.to_string(),
            descriptor: class.member_descriptor(method)?.to_string(),
            signature: signature(class, &method.attributes)?,
            exceptions,
            annotations: annotations(class, &method.attributes)?,
            annotation_default,
        };
        visitor.visit_method(&decl)?;

        if mode == ReadMode::Full {
            if let Some(attribute) = class.find_attribute(&method.attributes, "Code") {
                let code = CodeAttribute::parse(&attribute.data)?;
                for entry in &code.exception_table {
                    if entry.catch_type != 0 {
                        visitor.visit_try_catch(&decl, pool.class_name(entry.catch_type)?)?;
                    }
                }
                for instruction in code.instructions(pool)? {
                    visitor.visit_instruction(&decl, &instruction)?;
                }
            }
        }
        visitor.visit_method_end(&decl)?;
    }

    visitor.visit_end()
}

fn optional<'a, F>(index: u16, lookup: F) -> Result<Option<String>>
where
    F: Fn(u16) -> Result<&'a str>,
{
    if index == 0 {
        Ok(None)
    } else {
        lookup(index).map(|s| Some(s.to_string()))
    }
}

fn signature(class: &ClassFile, attributes: &[AttributeInfo]) -> Result<Option<String>> {
    match class.find_attribute(attributes, "Signature") {
        Some(attribute) => {
            let mut reader = ByteReader::new(&attribute.data);
            let index = reader.u16()?;
            Ok(Some(class.constant_pool.utf8(index)?.to_string()))
        }
        None => Ok(None),
    }
}

fn annotations(class: &ClassFile, attributes: &[AttributeInfo]) -> Result<Vec<Annotation>> {
    let mut all = Vec::new();
    for (name, visible) in [
        ("RuntimeVisibleAnnotations", true),
        ("RuntimeInvisibleAnnotations", false),
    ] {
        if let Some(attribute) = class.find_attribute(attributes, name) {
            all.extend(parse_annotations(&attribute.data, &class.constant_pool, visible)?);
        }
    }
    Ok(all)
}
