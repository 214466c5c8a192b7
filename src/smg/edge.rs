use super::{object::ObjectId, value::SymbolicValue};
use crate::{ast::CType, machine::MachineModel};
use std::fmt;

/// `object[offset .. offset + sizeof(ty)]` holds `value`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HasValueEdge {
    pub object: ObjectId,
    pub offset: u64,
    pub ty: CType,
    pub value: SymbolicValue,
}

impl HasValueEdge {
    pub fn new(object: ObjectId, offset: u64, ty: CType, value: SymbolicValue) -> Self {
        Self {
            object,
            offset,
            ty,
            value,
        }
    }

    pub fn size(&self, machine: &MachineModel) -> u64 {
        machine.size_of(&self.ty)
    }

    /// One past the last byte covered by this edge.
    pub fn end(&self, machine: &MachineModel) -> u64 {
        self.offset + self.size(machine)
    }

    pub fn overlaps(&self, start: u64, end: u64, machine: &MachineModel) -> bool {
        self.offset < end && start < self.end(machine)
    }

    pub fn covers(&self, start: u64, end: u64, machine: &MachineModel) -> bool {
        self.offset <= start && end <= self.end(machine)
    }

    /// Edges on the same field must agree on the value; all other pairs are
    /// consistent with each other.
    pub fn is_consistent_with(&self, other: &HasValueEdge) -> bool {
        self.object != other.object
            || self.offset != other.offset
            || self.ty != other.ty
            || self.value == other.value
    }
}

impl fmt::Display for HasValueEdge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}[{}]:{} -> {}",
            self.object, self.offset, self.ty, self.value
        )
    }
}

/// `value` is the address `object + offset`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointsToEdge {
    pub value: SymbolicValue,
    pub object: ObjectId,
    pub offset: i64,
}

impl PointsToEdge {
    pub fn new(value: SymbolicValue, object: ObjectId, offset: i64) -> Self {
        Self {
            value,
            object,
            offset,
        }
    }

    /// Values and targets correspond one-to-one.
    pub fn is_consistent_with(&self, other: &PointsToEdge) -> bool {
        let same_value = self.value == other.value;
        let same_target = self.object == other.object && self.offset == other.offset;

        same_value == same_target
    }
}

impl fmt::Display for PointsToEdge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} => {}+{}", self.value, self.object, self.offset)
    }
}
