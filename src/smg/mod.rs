//! Symbolic memory graphs.
//!
//! A graph consists of memory objects and symbolic values, connected by
//! has-value edges (`object[offset]:type -> value`) and points-to edges
//! (`value => object + offset`). The core graph in this module does not
//! enforce any of its invariants; mutators are expected to be called in
//! sequences that leave the graph consistent, which can be checked
//! separately with [`consistency::verify_smg`].

pub mod clang;
pub mod consistency;
pub mod edge;
pub mod object;
pub mod plotter;
pub mod value;

pub use clang::*;
pub use edge::*;
pub use object::*;
pub use value::*;

use crate::machine::MachineModel;
use log::trace;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SmgError {
    #[error("object {0} is not part of the memory graph")]
    UnknownObject(ObjectId),

    #[error("value {0} is not part of the memory graph")]
    UnknownValue(SymbolicValue),

    #[error("can not add stack object `{0}` without a stack frame")]
    NoStackFrame(String),

    #[error("can not drop a stack frame from an empty stack")]
    EmptyStack,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Smg {
    machine_model: MachineModel,
    objects: BTreeMap<ObjectId, MemoryObject>,
    validity: BTreeMap<ObjectId, bool>,
    values: BTreeSet<SymbolicValue>,
    /// Has-value edges grouped by the object they belong to. Objects without
    /// edges have no entry.
    has_value_edges: BTreeMap<ObjectId, BTreeSet<HasValueEdge>>,
    points_to_edges: BTreeSet<PointsToEdge>,
    explicit_values: BTreeMap<SymbolicValue, i64>,
    null_object: ObjectId,
    next_object: u32,
    next_value: u64,
}

impl Smg {
    /// Creates a graph containing only the null object and the null value.
    pub fn new(machine_model: MachineModel) -> Self {
        let null_object = ObjectId(0);

        let mut smg = Self {
            machine_model,
            objects: BTreeMap::new(),
            validity: BTreeMap::new(),
            values: BTreeSet::new(),
            has_value_edges: BTreeMap::new(),
            points_to_edges: BTreeSet::new(),
            explicit_values: BTreeMap::new(),
            null_object,
            next_object: 1,
            next_value: 1,
        };

        smg.objects.insert(null_object, MemoryObject::null());
        smg.validity.insert(null_object, false);
        smg.values.insert(SymbolicValue::NULL);
        smg.explicit_values.insert(SymbolicValue::NULL, 0);
        smg.points_to_edges
            .insert(PointsToEdge::new(SymbolicValue::NULL, null_object, 0));

        smg
    }

    pub fn machine_model(&self) -> MachineModel {
        self.machine_model
    }

    pub fn null_object(&self) -> ObjectId {
        self.null_object
    }

    //
    // Objects
    //

    pub fn add_object(&mut self, object: MemoryObject) -> ObjectId {
        self.add_object_with_validity(object, true)
    }

    pub fn add_object_with_validity(&mut self, object: MemoryObject, valid: bool) -> ObjectId {
        let id = ObjectId(self.next_object);
        self.next_object += 1;

        trace!("new object: {} := {}", id, object);

        self.objects.insert(id, object);
        self.validity.insert(id, valid);

        id
    }

    pub fn object(&self, id: ObjectId) -> Option<&MemoryObject> {
        self.objects.get(&id)
    }

    pub fn contains_object(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &MemoryObject)> {
        self.objects.iter().map(|(id, o)| (*id, o))
    }

    pub fn object_ids(&self) -> BTreeSet<ObjectId> {
        self.objects.keys().copied().collect()
    }

    /// Removes the object itself; edges touching it stay untouched.
    pub fn remove_object(&mut self, id: ObjectId) {
        if id == self.null_object {
            return;
        }

        self.objects.remove(&id);
        self.validity.remove(&id);
    }

    /// Removes the object, its has-value edges and all points-to edges into it.
    pub fn remove_object_and_edges(&mut self, id: ObjectId) {
        if id == self.null_object {
            return;
        }

        trace!("remove object: {}", id);

        self.remove_object(id);
        self.remove_has_value_edges_of(id);
        self.points_to_edges.retain(|e| e.object != id);
    }

    pub fn set_validity(&mut self, id: ObjectId, valid: bool) -> Result<(), SmgError> {
        match self.validity.get_mut(&id) {
            Some(validity) => {
                *validity = valid;
                Ok(())
            }
            None => Err(SmgError::UnknownObject(id)),
        }
    }

    pub fn is_object_valid(&self, id: ObjectId) -> Result<bool, SmgError> {
        self.validity
            .get(&id)
            .copied()
            .ok_or(SmgError::UnknownObject(id))
    }

    //
    // Values
    //

    pub fn add_value(&mut self, value: SymbolicValue) {
        self.next_value = self.next_value.max(value.0 + 1);
        self.values.insert(value);
    }

    /// Creates and adds a value distinct from every value seen so far.
    pub fn new_value(&mut self) -> SymbolicValue {
        let value = SymbolicValue(self.next_value);
        self.add_value(value);
        value
    }

    pub fn contains_value(&self, value: SymbolicValue) -> bool {
        self.values.contains(&value)
    }

    pub fn values(&self) -> impl Iterator<Item = SymbolicValue> + '_ {
        self.values.iter().copied()
    }

    /// Removes the value with its points-to edge and explicit binding. The
    /// null value is never removed.
    pub fn remove_value(&mut self, value: SymbolicValue) {
        if value.is_null() {
            return;
        }

        self.values.remove(&value);
        self.explicit_values.remove(&value);
        self.points_to_edges.retain(|e| e.value != value);
    }

    /// The value known to equal `explicit`, created on first use.
    pub fn value_for_explicit(&mut self, explicit: i64) -> SymbolicValue {
        if let Some(value) = self
            .explicit_values
            .iter()
            .find(|(_, e)| **e == explicit)
            .map(|(v, _)| *v)
        {
            return value;
        }

        let value = self.new_value();
        self.explicit_values.insert(value, explicit);

        trace!("new constant: {} := {}", value, explicit);

        value
    }

    pub fn explicit_of(&self, value: SymbolicValue) -> Option<i64> {
        self.explicit_values.get(&value).copied()
    }

    pub fn explicit_values(&self) -> impl Iterator<Item = (SymbolicValue, i64)> + '_ {
        self.explicit_values.iter().map(|(v, e)| (*v, *e))
    }

    //
    // Has-value edges
    //

    pub fn add_has_value_edge(&mut self, edge: HasValueEdge) {
        trace!("new has-value edge: {}", edge);

        self.has_value_edges
            .entry(edge.object)
            .or_default()
            .insert(edge);
    }

    pub fn remove_has_value_edge(&mut self, edge: &HasValueEdge) {
        if let Some(edges) = self.has_value_edges.get_mut(&edge.object) {
            edges.remove(edge);

            if edges.is_empty() {
                self.has_value_edges.remove(&edge.object);
            }
        }
    }

    pub fn remove_has_value_edges_of(&mut self, id: ObjectId) {
        self.has_value_edges.remove(&id);
    }

    pub fn has_value_edges(&self) -> impl Iterator<Item = &HasValueEdge> {
        self.has_value_edges.values().flatten()
    }

    pub fn has_value_edges_of(&self, id: ObjectId) -> impl Iterator<Item = &HasValueEdge> {
        self.has_value_edges.get(&id).into_iter().flatten()
    }

    /// Values stored in `id`, optionally restricted to edges starting at `offset`.
    pub fn values_for_object(&self, id: ObjectId, offset: Option<u64>) -> BTreeSet<SymbolicValue> {
        self.has_value_edges_of(id)
            .filter(|e| offset.map_or(true, |offset| e.offset == offset))
            .map(|e| e.value)
            .collect()
    }

    //
    // Points-to edges
    //

    pub fn add_points_to_edge(&mut self, edge: PointsToEdge) {
        trace!("new points-to edge: {}", edge);

        self.points_to_edges.insert(edge);
    }

    pub fn points_to_edges(&self) -> impl Iterator<Item = &PointsToEdge> {
        self.points_to_edges.iter()
    }

    pub fn points_to_edge(&self, value: SymbolicValue) -> Option<&PointsToEdge> {
        self.points_to_edges.iter().find(|e| e.value == value)
    }

    pub fn value_pointing_to(&self, id: ObjectId, offset: i64) -> Option<SymbolicValue> {
        self.points_to_edges
            .iter()
            .find(|e| e.object == id && e.offset == offset)
            .map(|e| e.value)
    }

    pub fn is_pointer(&self, value: SymbolicValue) -> bool {
        self.points_to_edge(value).is_some()
    }

    pub fn object_pointed_by(&self, value: SymbolicValue) -> Result<Option<ObjectId>, SmgError> {
        if !self.contains_value(value) {
            return Err(SmgError::UnknownValue(value));
        }

        Ok(self.points_to_edge(value).map(|e| e.object))
    }
}
