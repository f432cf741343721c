use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Bool,
    Int,
    Float,
    Str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Void,
    Primitive(PrimitiveKind),
    Reference,
}

/// A type as the engine sees it: a name and a coarse kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeDesc {
    pub name: String,
    pub kind: TypeKind,
}

impl TypeDesc {
    pub fn void() -> Self {
        TypeDesc { name: "void".into(), kind: TypeKind::Void }
    }

    pub fn bool() -> Self {
        Self::primitive(PrimitiveKind::Bool)
    }

    pub fn int() -> Self {
        Self::primitive(PrimitiveKind::Int)
    }

    pub fn float() -> Self {
        Self::primitive(PrimitiveKind::Float)
    }

    pub fn string() -> Self {
        Self::primitive(PrimitiveKind::Str)
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        let name = match kind {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Str => "String",
        };
        TypeDesc { name: name.into(), kind: TypeKind::Primitive(kind) }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        TypeDesc { name: name.into(), kind: TypeKind::Reference }
    }

    pub fn is_void(&self) -> bool {
        self.kind == TypeKind::Void
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(_))
    }

    pub fn is_reference(&self) -> bool {
        self.kind == TypeKind::Reference
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Decides whether a value of one type may be used where another is
/// expected.
pub trait TypeOracle: Send + Sync {
    fn is_assignable(&self, target: &TypeDesc, source: &TypeDesc) -> bool;
}

/// Only identical types are compatible.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactTypes;

impl TypeOracle for ExactTypes {
    fn is_assignable(&self, target: &TypeDesc, source: &TypeDesc) -> bool {
        target == source
    }
}

/// Reference subtyping declared as `sub <: super` edges, closed
/// transitively. Primitives and void only match themselves.
#[derive(Debug, Clone, Default)]
pub struct SubtypeTable {
    supertypes: BTreeMap<String, BTreeSet<String>>,
}

impl SubtypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, sub: &str, sup: &str) {
        self.supertypes
            .entry(sub.to_string())
            .or_default()
            .insert(sup.to_string());
    }

    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        let mut stack = vec![sub];
        let mut visited = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == sup {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(parents) = self.supertypes.get(current) {
                stack.extend(parents.iter().map(String::as_str));
            }
        }
        false
    }
}

impl TypeOracle for SubtypeTable {
    fn is_assignable(&self, target: &TypeDesc, source: &TypeDesc) -> bool {
        if target == source {
            return true;
        }
        target.is_reference()
            && source.is_reference()
            && self.is_subtype(&source.name, &target.name)
    }
}

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn test_subtype_table_is_transitive() {
        let mut table = SubtypeTable::new();
        table.declare("ArrayList", "List");
        table.declare("List", "Collection");
        let al = TypeDesc::reference("ArrayList");
        let coll = TypeDesc::reference("Collection");
        assert!(table.is_assignable(&coll, &al));
        assert!(!table.is_assignable(&al, &coll));
        assert!(!ExactTypes.is_assignable(&coll, &al));
    }

    #[test]
    fn test_primitives_only_match_themselves() {
        let table = SubtypeTable::new();
        assert!(table.is_assignable(&TypeDesc::int(), &TypeDesc::int()));
        assert!(!table.is_assignable(&TypeDesc::float(), &TypeDesc::int()));
    }
}
