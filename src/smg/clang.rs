use super::{MemoryObject, ObjectId, Smg, SmgError, SymbolicValue};
use crate::{
    ast::{CType, FunctionSignature},
    machine::MachineModel,
};
use log::{debug, trace, warn};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub const RETURN_VALUE_LABEL: &str = "__retval__";

/// Objects belonging to one active function invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackFrame {
    function: FunctionSignature,
    variables: BTreeMap<String, ObjectId>,
    allocations: BTreeSet<ObjectId>,
    return_object: ObjectId,
}

impl StackFrame {
    pub fn function(&self) -> &FunctionSignature {
        &self.function
    }

    pub fn variable(&self, name: &str) -> Option<ObjectId> {
        self.variables.get(name).copied()
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.variables.iter().map(|(n, o)| (n.as_str(), *o))
    }

    pub fn return_object(&self) -> ObjectId {
        self.return_object
    }

    /// Anonymous stack allocations (`alloca`).
    pub fn allocations(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.allocations.iter().copied()
    }

    /// Every object owned by the frame, including the return slot.
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.variables
            .values()
            .copied()
            .chain(self.allocations.iter().copied())
            .chain(std::iter::once(self.return_object))
    }
}

/// A memory graph partitioned like the memory of a C program: a call stack,
/// a global namespace and a heap. The heap always contains the null object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CLangSmg {
    smg: Smg,
    stack: Vec<StackFrame>,
    globals: BTreeMap<String, ObjectId>,
    heap: BTreeSet<ObjectId>,
    has_leaks: bool,
}

impl CLangSmg {
    pub fn new(machine_model: MachineModel) -> Self {
        let smg = Smg::new(machine_model);

        let mut heap = BTreeSet::new();
        heap.insert(smg.null_object());

        Self {
            smg,
            stack: Vec::new(),
            globals: BTreeMap::new(),
            heap,
            has_leaks: false,
        }
    }

    pub fn smg(&self) -> &Smg {
        &self.smg
    }

    pub fn smg_mut(&mut self) -> &mut Smg {
        &mut self.smg
    }

    pub fn machine_model(&self) -> MachineModel {
        self.smg.machine_model()
    }

    pub fn add_heap_object(&mut self, object: MemoryObject) -> ObjectId {
        let id = self.smg.add_object(object);
        self.heap.insert(id);
        id
    }

    /// Adds a global variable, named by the object's label.
    pub fn add_global_object(&mut self, object: MemoryObject) -> ObjectId {
        let name = object.label().to_owned();
        let id = self.smg.add_object(object);
        self.globals.insert(name, id);
        id
    }

    /// Adds a local variable of the current function, named by the object's label.
    pub fn add_stack_object(&mut self, object: MemoryObject) -> Result<ObjectId, SmgError> {
        if self.stack.is_empty() {
            return Err(SmgError::NoStackFrame(object.label().to_owned()));
        }

        let name = object.label().to_owned();
        let id = self.smg.add_object(object);

        if let Some(frame) = self.stack.last_mut() {
            frame.variables.insert(name, id);
        }

        Ok(id)
    }

    /// Adds an anonymous object to the current frame; it lives until the frame is dropped.
    pub fn add_stack_allocation(&mut self, object: MemoryObject) -> Result<ObjectId, SmgError> {
        if self.stack.is_empty() {
            return Err(SmgError::NoStackFrame(object.label().to_owned()));
        }

        let id = self.smg.add_object(object);

        if let Some(frame) = self.stack.last_mut() {
            frame.allocations.insert(id);
        }

        Ok(id)
    }

    pub fn add_stack_frame(&mut self, function: &FunctionSignature) {
        let size = match function.return_type {
            CType::Void => 0,
            ref ty => self.smg.machine_model().size_of(ty),
        };

        let return_object = self
            .smg
            .add_object(MemoryObject::new(size, RETURN_VALUE_LABEL));

        debug!("enter function: {}", function.name);

        self.stack.push(StackFrame {
            function: function.clone(),
            variables: BTreeMap::new(),
            allocations: BTreeSet::new(),
            return_object,
        });
    }

    /// Pops the current frame and removes all of its objects from the graph.
    pub fn drop_stack_frame(&mut self) -> Result<StackFrame, SmgError> {
        let frame = self.stack.pop().ok_or(SmgError::EmptyStack)?;

        debug!("leave function: {}", frame.function.name);

        for object in frame.objects() {
            self.smg.remove_object_and_edges(object);
        }

        Ok(frame)
    }

    pub fn stack_frames(&self) -> &[StackFrame] {
        &self.stack
    }

    pub fn current_frame(&self) -> Option<&StackFrame> {
        self.stack.last()
    }

    /// Looks `name` up in the current frame, then among the globals.
    pub fn object_for_visible_variable(&self, name: &str) -> Option<ObjectId> {
        self.current_frame()
            .and_then(|frame| frame.variable(name))
            .or_else(|| self.globals.get(name).copied())
    }

    pub fn heap_objects(&self) -> &BTreeSet<ObjectId> {
        &self.heap
    }

    pub fn global_objects(&self) -> &BTreeMap<String, ObjectId> {
        &self.globals
    }

    pub fn stack_objects(&self) -> BTreeSet<ObjectId> {
        self.stack.iter().flat_map(|frame| frame.objects()).collect()
    }

    pub fn is_heap_object(&self, id: ObjectId) -> bool {
        self.heap.contains(&id)
    }

    pub fn is_global_object(&self, id: ObjectId) -> bool {
        self.globals.values().any(|o| *o == id)
    }

    pub fn is_stack_object(&self, id: ObjectId) -> bool {
        self.stack.iter().any(|frame| frame.objects().any(|o| o == id))
    }

    pub fn set_memory_leak(&mut self) {
        self.has_leaks = true;
    }

    pub fn has_memory_leaks(&self) -> bool {
        self.has_leaks
    }

    /// Removes every object that can not be reached from a stack or global
    /// variable, and every value no reachable object holds.
    ///
    /// Unreachable objects that are still valid are leaks: they set the leak
    /// flag and are returned to the caller.
    pub fn prune_unreachable(&mut self) -> Vec<MemoryObject> {
        time_debug!("pruned unreachable objects", {
            let (reached_objects, reached_values) = self.reachable();

            let mut leaked = Vec::new();

            let unreached = self
                .smg
                .object_ids()
                .into_iter()
                .filter(|o| *o != self.smg.null_object() && !reached_objects.contains(o))
                .collect::<Vec<_>>();

            for id in unreached {
                if self.smg.is_object_valid(id).unwrap_or(false) {
                    if let Some(object) = self.smg.object(id) {
                        warn!("memory leak: {} is no longer reachable", object);
                        leaked.push(object.clone());
                    }
                    self.set_memory_leak();
                }

                self.smg.remove_object_and_edges(id);
                self.heap.remove(&id);
            }

            let unreached_values = self
                .smg
                .values()
                .filter(|v| !v.is_null() && !reached_values.contains(v))
                .collect::<Vec<_>>();

            trace!("pruning {} unreachable values", unreached_values.len());

            for value in unreached_values {
                self.smg.remove_value(value);
            }

            leaked
        })
    }

    fn reachable(&self) -> (BTreeSet<ObjectId>, BTreeSet<SymbolicValue>) {
        let mut reached_objects = self.stack_objects();
        reached_objects.extend(self.globals.values().copied());

        let mut reached_values = BTreeSet::new();
        let mut queue = reached_objects.iter().copied().collect::<VecDeque<_>>();

        while let Some(object) = queue.pop_front() {
            for edge in self.smg.has_value_edges_of(object) {
                reached_values.insert(edge.value);

                if let Some(target) = self.smg.points_to_edge(edge.value) {
                    if reached_objects.insert(target.object) {
                        queue.push_back(target.object);
                    }
                }
            }
        }

        (reached_objects, reached_values)
    }
}
