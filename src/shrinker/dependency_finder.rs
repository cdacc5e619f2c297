//! Dependency discovery for program classes
//!
//! `DependencyFinder` walks one class file and records, as plain string
//! keys, every edge the class contributes to the graph. Member references
//! that need virtual dispatch reasoning are collected as unresolved
//! references instead of edges. Nothing here touches the graph, so many
//! classes can be scanned in parallel and committed afterwards.

use crate::classfile::{
    self, access, descriptor, signature, Annotation, ClassFile, ClassHeader, ClassVisitor,
    ElementValue, FieldDecl, InnerClassEntry, Instruction, LdcConstant, MethodDecl,
    MethodInsnKind, ReadMode,
};
use crate::graph::{is_sdk_package, DependencyType, ShrinkerGraph};
use crate::shrinker::ShrinkerError;
use petgraph::graph::NodeIndex;

const CONSTRUCTOR: &str = "<init>";
const CLASS_INITIALIZER: &str = "<clinit>";

/// Which edges the finder keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyFilter {
    All,
    /// Only edges incremental runs recompute
    CodeReferencesOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberKey {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

/// A graph node named by its string identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRef {
    Class(String),
    Member(MemberKey),
}

impl NodeRef {
    /// Node index in `graph`, creating a placeholder if needed
    pub fn intern(&self, graph: &mut ShrinkerGraph) -> NodeIndex {
        match self {
            NodeRef::Class(name) => graph.class_reference(name),
            NodeRef::Member(key) => graph.member_reference(&key.owner, &key.name, &key.descriptor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeFact {
    pub source: NodeRef,
    pub target: NodeRef,
    pub kind: DependencyType,
}

/// A field access or call whose target is found by walking the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnresolvedFact {
    pub source: MemberKey,
    pub target: MemberKey,
    pub invokespecial: bool,
    pub kind: DependencyType,
}

/// Output of scanning one program class
#[derive(Debug, Clone, Default)]
pub struct ClassDependencies {
    pub class: String,
    pub edges: Vec<EdgeFact>,
    pub unresolved: Vec<UnresolvedFact>,
    /// Non-static, non-constructor methods declared by the class
    pub virtual_methods: Vec<MemberKey>,
    /// Implements interfaces and extends something other than `Object`
    pub multiple_inheritance: bool,
}

impl ClassDependencies {
    /// Scan a parsed class file
    pub fn find(
        class: &ClassFile,
        filter: DependencyFilter,
        sdk_filter: bool,
    ) -> Result<Self, ShrinkerError> {
        let mut finder = DependencyFinder::new(filter, sdk_filter);
        classfile::accept(class, &mut finder, ReadMode::Full)?;
        Ok(finder.dependencies)
    }
}

/// A recognised reflective API call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReflectionMethod {
    ClassForName,
    AtomicIntegerFieldUpdater,
    AtomicLongFieldUpdater,
    AtomicReferenceFieldUpdater,
}

impl ReflectionMethod {
    fn find(owner: &str, name: &str, descriptor: &str) -> Option<Self> {
        match (owner, name, descriptor) {
            ("java/lang/Class", "forName", "(Ljava/lang/String;)Ljava/lang/Class;") => {
                Some(ReflectionMethod::ClassForName)
            }
            (
                "java/util/concurrent/atomic/AtomicIntegerFieldUpdater",
                "newUpdater",
                "(Ljava/lang/Class;Ljava/lang/String;)Ljava/util/concurrent/atomic/AtomicIntegerFieldUpdater;",
            ) => Some(ReflectionMethod::AtomicIntegerFieldUpdater),
            (
                "java/util/concurrent/atomic/AtomicLongFieldUpdater",
                "newUpdater",
                "(Ljava/lang/Class;Ljava/lang/String;)Ljava/util/concurrent/atomic/AtomicLongFieldUpdater;",
            ) => Some(ReflectionMethod::AtomicLongFieldUpdater),
            (
                "java/util/concurrent/atomic/AtomicReferenceFieldUpdater",
                "newUpdater",
                "(Ljava/lang/Class;Ljava/lang/Class;Ljava/lang/String;)Ljava/util/concurrent/atomic/AtomicReferenceFieldUpdater;",
            ) => Some(ReflectionMethod::AtomicReferenceFieldUpdater),
            _ => None,
        }
    }

    /// Target named by the constants loaded just before the call, most
    /// recent last
    fn target(self, ldcs: &[LdcConstant]) -> Option<NodeRef> {
        let mut stack = ldcs.iter().rev();
        match self {
            ReflectionMethod::ClassForName => match stack.next() {
                Some(LdcConstant::String(name)) => {
                    Some(NodeRef::Class(descriptor::to_internal_name(name)))
                }
                _ => None,
            },
            ReflectionMethod::AtomicIntegerFieldUpdater | ReflectionMethod::AtomicLongFieldUpdater => {
                let field = match stack.next() {
                    Some(LdcConstant::String(field)) => field,
                    _ => return None,
                };
                let owner = match stack.next() {
                    Some(LdcConstant::Class(owner)) => owner,
                    _ => return None,
                };
                let desc = if self == ReflectionMethod::AtomicIntegerFieldUpdater {
                    "I"
                } else {
                    "J"
                };
                Some(NodeRef::Member(MemberKey::new(owner, field, desc)))
            }
            ReflectionMethod::AtomicReferenceFieldUpdater => {
                let field = match stack.next() {
                    Some(LdcConstant::String(field)) => field,
                    _ => return None,
                };
                let field_type = match stack.next() {
                    Some(LdcConstant::Class(ty)) => ty,
                    _ => return None,
                };
                let owner = match stack.next() {
                    Some(LdcConstant::Class(owner)) => owner,
                    _ => return None,
                };
                let desc = if field_type.starts_with('[') {
                    field_type.clone()
                } else {
                    format!("L{};", field_type)
                };
                Some(NodeRef::Member(MemberKey::new(owner, field, &desc)))
            }
        }
    }
}

/// Visitor recording the dependencies of one class
pub struct DependencyFinder {
    filter: DependencyFilter,
    sdk_filter: bool,
    is_annotation: bool,
    last_ldcs: Vec<LdcConstant>,
    dependencies: ClassDependencies,
}

impl DependencyFinder {
    pub fn new(filter: DependencyFilter, sdk_filter: bool) -> Self {
        Self {
            filter,
            sdk_filter,
            is_annotation: false,
            last_ldcs: Vec::new(),
            dependencies: ClassDependencies::default(),
        }
    }

    pub fn into_dependencies(self) -> ClassDependencies {
        self.dependencies
    }

    fn is_sdk(&self, name: &str) -> bool {
        self.sdk_filter && is_sdk_package(name)
    }

    fn class_node(&self) -> NodeRef {
        NodeRef::Class(self.dependencies.class.clone())
    }

    fn member_node(&self, name: &str, descriptor: &str) -> NodeRef {
        NodeRef::Member(MemberKey::new(&self.dependencies.class, name, descriptor))
    }

    fn method_key(&self, method: &MethodDecl) -> MemberKey {
        MemberKey::new(&self.dependencies.class, &method.name, &method.descriptor)
    }

    fn add(&mut self, source: NodeRef, target: NodeRef, kind: DependencyType) {
        if self.filter == DependencyFilter::CodeReferencesOnly && !kind.is_code_reference() {
            return;
        }
        self.dependencies.edges.push(EdgeFact {
            source,
            target,
            kind,
        });
    }

    fn add_class(&mut self, source: &NodeRef, class: &str, kind: DependencyType) {
        if !self.is_sdk(class) {
            self.add(source.clone(), NodeRef::Class(class.to_string()), kind);
        }
    }

    /// Class named by a field descriptor, if any
    fn add_declaration_type(&mut self, source: &NodeRef, descriptor: &str) {
        if let Some(class) = descriptor::class_name_of(descriptor) {
            self.add_class(source, class, DependencyType::RequiredClassStructure);
        }
    }

    fn add_signature(&mut self, source: &NodeRef, signature: &str) -> Result<(), ShrinkerError> {
        for class in signature::referenced_classes(signature)? {
            self.add_class(source, &class, DependencyType::RequiredClassStructure);
        }
        Ok(())
    }

    /// Visible annotations only; invisible ones are not needed at runtime
    fn add_annotations(&mut self, source: &NodeRef, annotations: &[Annotation]) {
        for annotation in annotations.iter().filter(|a| a.visible) {
            self.add_annotation(source, annotation);
        }
    }

    fn add_annotation(&mut self, source: &NodeRef, annotation: &Annotation) {
        self.add_declaration_type(source, &annotation.type_descriptor);
        for (_, value) in &annotation.elements {
            self.add_element_value(source, value);
        }
    }

    fn add_element_value(&mut self, source: &NodeRef, value: &ElementValue) {
        match value {
            ElementValue::Const(_) => {}
            ElementValue::Class(descriptor) => self.add_declaration_type(source, descriptor),
            ElementValue::Enum {
                type_descriptor,
                name,
            } => {
                if let Some(class) = descriptor::class_name_of(type_descriptor) {
                    if !self.is_sdk(class) {
                        self.add(
                            source.clone(),
                            NodeRef::Class(class.to_string()),
                            DependencyType::RequiredClassStructure,
                        );
                        self.add(
                            source.clone(),
                            NodeRef::Member(MemberKey::new(class, name, type_descriptor)),
                            DependencyType::RequiredClassStructure,
                        );
                    }
                }
            }
            ElementValue::Annotation(nested) => self.add_annotation(source, nested),
            ElementValue::Array(values) => {
                for value in values {
                    self.add_element_value(source, value);
                }
            }
        }
    }

    fn add_unresolved(&mut self, source: MemberKey, target: MemberKey, invokespecial: bool, kind: DependencyType) {
        self.dependencies.unresolved.push(UnresolvedFact {
            source,
            target,
            invokespecial,
            kind,
        });
    }

    fn method_instruction(
        &mut self,
        method: &MethodDecl,
        kind: MethodInsnKind,
        owner: &str,
        name: &str,
        desc: &str,
    ) {
        let source = self.method_key(method);
        let source_node = NodeRef::Member(source.clone());

        // Calls on arrays, like `clone`, have no declaring class
        if !owner.starts_with('[') && !self.is_sdk(owner) {
            self.add(
                source_node.clone(),
                NodeRef::Class(owner.to_string()),
                DependencyType::RequiredCodeReference,
            );
            let target = MemberKey::new(owner, name, desc);
            let special = kind == MethodInsnKind::Special;
            if special && (name == CONSTRUCTOR || owner == self.dependencies.class) {
                self.add(
                    source_node.clone(),
                    NodeRef::Member(target),
                    DependencyType::RequiredCodeReference,
                );
            } else {
                self.add_unresolved(source.clone(), target, special, DependencyType::RequiredCodeReference);
            }
        }

        if let Some(reflection) = ReflectionMethod::find(owner, name, desc) {
            match reflection.target(&self.last_ldcs) {
                Some(class @ NodeRef::Class(_)) => {
                    self.add(source_node, class, DependencyType::RequiredCodeReferenceReflection)
                }
                Some(NodeRef::Member(field)) => self.add_unresolved(
                    source,
                    field,
                    false,
                    DependencyType::RequiredCodeReferenceReflection,
                ),
                None => {}
            }
        }
    }
}

impl ClassVisitor for DependencyFinder {
    type Error = ShrinkerError;

    fn visit_header(&mut self, header: &ClassHeader) -> Result<(), Self::Error> {
        self.dependencies.class = header.name.clone();
        self.is_annotation = header.access & access::ANNOTATION != 0;
        let class = self.class_node();

        if let Some(super_name) = header.super_name.as_deref() {
            if super_name != "java/lang/Object" {
                self.add_class(&class, super_name, DependencyType::RequiredClassStructure);
            }
        }
        if !header.interfaces.is_empty() && header.super_name.as_deref() != Some("java/lang/Object") {
            self.dependencies.multiple_inheritance = true;
        }
        if let Some(signature) = &header.signature {
            self.add_signature(&class, signature)?;
        }
        Ok(())
    }

    fn visit_annotation(&mut self, annotation: &Annotation) -> Result<(), Self::Error> {
        if annotation.visible {
            let class = self.class_node();
            self.add_annotation(&class, annotation);
        }
        Ok(())
    }

    fn visit_inner_class(&mut self, entry: &InnerClassEntry) -> Result<(), Self::Error> {
        // An inner class keeps its outer class
        if entry.inner == self.dependencies.class {
            if let Some(outer) = &entry.outer {
                self.add(
                    self.class_node(),
                    NodeRef::Class(outer.clone()),
                    DependencyType::RequiredClassStructure,
                );
            }
        }
        Ok(())
    }

    fn visit_field(&mut self, field: &FieldDecl) -> Result<(), Self::Error> {
        let node = self.member_node(&field.name, &field.descriptor);
        self.add_declaration_type(&node, &field.descriptor);
        if let Some(signature) = &field.signature {
            self.add_signature(&node, signature)?;
        }
        self.add_annotations(&node, &field.annotations);
        Ok(())
    }

    fn visit_method(&mut self, method: &MethodDecl) -> Result<(), Self::Error> {
        let key = self.method_key(method);
        let node = NodeRef::Member(key.clone());
        let class = self.class_node();
        self.last_ldcs.clear();

        if method.access & access::STATIC == 0 && method.name != CONSTRUCTOR {
            self.dependencies.virtual_methods.push(key);
        }

        for class_name in descriptor::method_classes(&method.descriptor)? {
            self.add_class(&node, class_name, DependencyType::RequiredClassStructure);
        }
        if method.name == CLASS_INITIALIZER || self.is_annotation {
            self.add(class, node.clone(), DependencyType::RequiredClassStructure);
        }
        if let Some(signature) = &method.signature {
            self.add_signature(&node, signature)?;
        }
        for exception in &method.exceptions {
            self.add_class(&node, exception, DependencyType::RequiredClassStructure);
        }
        self.add_annotations(&node, &method.annotations);
        if let Some(default) = &method.annotation_default {
            self.add_element_value(&node, default);
        }
        Ok(())
    }

    fn visit_try_catch(&mut self, method: &MethodDecl, catch_type: &str) -> Result<(), Self::Error> {
        let node = NodeRef::Member(self.method_key(method));
        self.add_class(&node, catch_type, DependencyType::RequiredCodeReference);
        self.last_ldcs.clear();
        Ok(())
    }

    fn visit_instruction(&mut self, method: &MethodDecl, instruction: &Instruction) -> Result<(), Self::Error> {
        match instruction {
            Instruction::Ldc(constant) => {
                if let LdcConstant::Class(operand) = constant {
                    if let Some(class) = descriptor::operand_class_name(operand) {
                        let node = NodeRef::Member(self.method_key(method));
                        self.add_class(&node, class, DependencyType::RequiredCodeReference);
                    }
                }
                self.last_ldcs.push(constant.clone());
                return Ok(());
            }
            Instruction::Type { class, .. } => {
                if let Some(class) = descriptor::operand_class_name(class) {
                    let node = NodeRef::Member(self.method_key(method));
                    self.add_class(&node, class, DependencyType::RequiredCodeReference);
                }
            }
            Instruction::Field { member, .. } => {
                if !self.is_sdk(&member.owner) {
                    let source = self.method_key(method);
                    self.add(
                        NodeRef::Member(source.clone()),
                        NodeRef::Class(member.owner.clone()),
                        DependencyType::RequiredCodeReference,
                    );
                    let target = MemberKey::new(&member.owner, &member.name, &member.descriptor);
                    self.add_unresolved(source, target, false, DependencyType::RequiredCodeReference);
                }
            }
            Instruction::Method { kind, member } => {
                self.method_instruction(method, *kind, &member.owner, &member.name, &member.descriptor);
            }
            Instruction::MultiANewArray { descriptor, .. } => {
                if let Some(class) = descriptor::class_name_of(descriptor) {
                    let node = NodeRef::Member(self.method_key(method));
                    self.add_class(&node, class, DependencyType::RequiredCodeReference);
                }
            }
            Instruction::InvokeDynamic { .. } | Instruction::Other { .. } => {}
        }
        self.last_ldcs.clear();
        Ok(())
    }
}
