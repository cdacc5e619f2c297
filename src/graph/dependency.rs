use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a dependency edge
///
/// The three `Required*` kinds all feed the `required` counter and only
/// differ in where they come from; incremental runs rewrite the two
/// code-reference kinds and never touch the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DependencyType {
    /// Declarations: superclass, descriptor types, annotations, signatures
    RequiredClassStructure,
    /// Instructions inside a method body
    RequiredCodeReference,
    /// Reflective lookups recognised in method bodies
    RequiredCodeReferenceReflection,
    /// Overriding member, needed only if its class is also kept
    IfClassKept,
    /// Class-to-member companion of `IfClassKept`
    ClassIsKept,
}

impl DependencyType {
    pub fn is_required(self) -> bool {
        matches!(
            self,
            DependencyType::RequiredClassStructure
                | DependencyType::RequiredCodeReference
                | DependencyType::RequiredCodeReferenceReflection
        )
    }

    /// Edges recomputed by incremental runs
    pub fn is_code_reference(self) -> bool {
        matches!(
            self,
            DependencyType::RequiredCodeReference | DependencyType::RequiredCodeReferenceReflection
        )
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DependencyType::RequiredClassStructure => "REQUIRED_CLASS_STRUCTURE",
            DependencyType::RequiredCodeReference => "REQUIRED_CODE_REFERENCE",
            DependencyType::RequiredCodeReferenceReflection => "REQUIRED_CODE_REFERENCE_REFLECTION",
            DependencyType::IfClassKept => "IF_CLASS_KEPT",
            DependencyType::ClassIsKept => "CLASS_IS_KEPT",
        };
        write!(f, "{}", name)
    }
}

/// An outgoing edge as seen from its source node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub target: NodeIndex,
    pub kind: DependencyType,
}

impl Dependency {
    pub fn new(target: NodeIndex, kind: DependencyType) -> Self {
        Self { target, kind }
    }
}
