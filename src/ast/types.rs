use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};
use strum::{Display, EnumString, IntoStaticStr};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum IntegerKind {
    Char,
    Short,
    Int,
    Long,
    LongLong,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum CompositeKind {
    Struct,
    Union,
}

/// C types as far as the memory model needs them.
///
/// Composite types are shared through [`Arc`] so that self-referential
/// structures (`struct node { struct node *next; }`) can be expressed: the
/// composite is declared first and its members are defined afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CType {
    Void,
    Bool,
    Integer { kind: IntegerKind, signed: bool },
    Float,
    Double,
    LongDouble,
    Pointer(Box<CType>),
    Array { element: Box<CType>, length: Option<u64> },
    Composite(Arc<CompositeType>),
}

impl CType {
    pub fn char() -> Self {
        CType::Integer {
            kind: IntegerKind::Char,
            signed: true,
        }
    }

    pub fn int() -> Self {
        CType::Integer {
            kind: IntegerKind::Int,
            signed: true,
        }
    }

    pub fn unsigned_int() -> Self {
        CType::Integer {
            kind: IntegerKind::Int,
            signed: false,
        }
    }

    pub fn long() -> Self {
        CType::Integer {
            kind: IntegerKind::Long,
            signed: true,
        }
    }

    pub fn unsigned_long() -> Self {
        CType::Integer {
            kind: IntegerKind::Long,
            signed: false,
        }
    }

    pub fn pointer_to(target: CType) -> Self {
        CType::Pointer(Box::new(target))
    }

    pub fn array_of(element: CType, length: u64) -> Self {
        CType::Array {
            element: Box::new(element),
            length: Some(length),
        }
    }

    /// Array of `length` chars, the type of byte-range edges.
    pub fn char_array(length: u64) -> Self {
        CType::array_of(CType::char(), length)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, CType::Array { .. })
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, CType::Composite(_))
    }

    /// Pointers and arrays: expressions of these types evaluate to addresses.
    pub fn is_address(&self) -> bool {
        self.is_pointer() || self.is_array()
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, CType::Float | CType::Double | CType::LongDouble)
    }

    /// The type an address of this type points to: the target of a pointer
    /// or the element of an array.
    pub fn pointee(&self) -> Option<&CType> {
        match self {
            CType::Pointer(target) => Some(target),
            CType::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Arc<CompositeType>> {
        match self {
            CType::Composite(composite) => Some(composite),
            _ => None,
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CType::Void => write!(f, "void"),
            CType::Bool => write!(f, "_Bool"),
            CType::Integer { kind, signed } => {
                if !signed {
                    write!(f, "unsigned ")?;
                }
                let name: &'static str = kind.into();
                write!(f, "{}", name.replace('_', " "))
            }
            CType::Float => write!(f, "float"),
            CType::Double => write!(f, "double"),
            CType::LongDouble => write!(f, "long double"),
            CType::Pointer(target) => write!(f, "{}*", target),
            CType::Array {
                element,
                length: Some(length),
            } => write!(f, "{}[{}]", element, length),
            CType::Array {
                element,
                length: None,
            } => write!(f, "{}[]", element),
            CType::Composite(composite) => write!(f, "{} {}", composite.kind, composite.name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Member {
    pub name: String,
    pub ty: CType,
}

impl Member {
    pub fn new(name: &str, ty: CType) -> Self {
        Self {
            name: name.to_owned(),
            ty,
        }
    }
}

/// A struct or union. Two composites are the same type iff kind and tag
/// agree, mirroring C's tag namespace.
pub struct CompositeType {
    pub kind: CompositeKind,
    pub name: String,
    members: OnceLock<Vec<Member>>,
}

impl CompositeType {
    pub fn new(kind: CompositeKind, name: &str, members: Vec<Member>) -> Arc<Self> {
        let composite = Self::declare(kind, name);
        composite.define(members);
        composite
    }

    /// Forward declaration; members are supplied later through [`define`](Self::define).
    pub fn declare(kind: CompositeKind, name: &str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            name: name.to_owned(),
            members: OnceLock::new(),
        })
    }

    /// Returns `false` if the composite has been defined before.
    pub fn define(&self, members: Vec<Member>) -> bool {
        self.members.set(members).is_ok()
    }

    pub fn is_complete(&self) -> bool {
        self.members.get().is_some()
    }

    pub fn is_union(&self) -> bool {
        self.kind == CompositeKind::Union
    }

    pub fn members(&self) -> &[Member] {
        self.members.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members().iter().find(|m| m.name == name)
    }
}

impl fmt::Debug for CompositeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)?;

        if let Some(members) = self.members.get() {
            let names = members
                .iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");

            write!(f, " {{ {} }}", names)?;
        }

        Ok(())
    }
}

impl PartialEq for CompositeType {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.name == other.name
    }
}

impl Eq for CompositeType {}

impl Hash for CompositeType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.name.hash(state);
    }
}

impl PartialOrd for CompositeType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CompositeType {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.kind, &self.name).cmp(&(other.kind, &other.name))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub ty: CType,
}

impl Parameter {
    pub fn new(name: &str, ty: CType) -> Self {
        Self {
            name: name.to_owned(),
            ty,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionSignature {
    pub name: String,
    pub return_type: CType,
    pub parameters: Vec<Parameter>,
}

impl FunctionSignature {
    pub fn new(name: &str, return_type: CType, parameters: Vec<Parameter>) -> Self {
        Self {
            name: name.to_owned(),
            return_type,
            parameters,
        }
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parameters = self
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.ty, p.name))
            .collect::<Vec<_>>()
            .join(", ");

        write!(f, "{} {}({})", self.return_type, self.name, parameters)
    }
}
