// Declaration facts gathered in the structural pass

use crate::classfile::{
    accept, Annotation, ClassFile, ClassFileError, ClassHeader, ClassVisitor, FieldDecl,
    MethodDecl, ReadMode,
};

/// A declared field or method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDeclaration {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    /// Internal names of all annotations, visible or not
    pub annotations: Vec<String>,
}

/// Everything the graph needs to register one class
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassDeclaration {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub access: u16,
    pub annotations: Vec<String>,
    pub members: Vec<MemberDeclaration>,
}

impl ClassDeclaration {
    /// Decode the structure of a class, ignoring method bodies
    pub fn read(class: &ClassFile) -> Result<Self, ClassFileError> {
        let mut visitor = StructureVisitor::default();
        accept(class, &mut visitor, ReadMode::SkipCode)?;
        Ok(visitor.declaration)
    }
}

#[derive(Default)]
struct StructureVisitor {
    declaration: ClassDeclaration,
}

fn annotation_names(annotations: &[Annotation]) -> Vec<String> {
    annotations
        .iter()
        .filter_map(|a| a.type_name())
        .map(str::to_string)
        .collect()
}

impl ClassVisitor for StructureVisitor {
    type Error = ClassFileError;

    fn visit_header(&mut self, header: &ClassHeader) -> Result<(), Self::Error> {
        self.declaration.name = header.name.clone();
        self.declaration.super_name = header.super_name.clone();
        self.declaration.interfaces = header.interfaces.clone();
        self.declaration.access = header.access;
        Ok(())
    }

    fn visit_annotation(&mut self, annotation: &Annotation) -> Result<(), Self::Error> {
        if let Some(name) = annotation.type_name() {
            self.declaration.annotations.push(name.to_string());
        }
        Ok(())
    }

    fn visit_field(&mut self, field: &FieldDecl) -> Result<(), Self::Error> {
        self.declaration.members.push(MemberDeclaration {
            name: field.name.clone(),
            descriptor: field.descriptor.clone(),
            access: field.access,
            annotations: annotation_names(&field.annotations),
        });
        Ok(())
    }

    fn visit_method(&mut self, method: &MethodDecl) -> Result<(), Self::Error> {
        self.declaration.members.push(MemberDeclaration {
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            access: method.access,
            annotations: annotation_names(&method.annotations),
        });
        Ok(())
    }
}
