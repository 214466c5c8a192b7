use super::bug::Bug;
use crate::{
    ast::CType,
    machine::MachineModel,
    smg::{CLangSmg, HasValueEdge, ObjectId, PointsToEdge, SymbolicValue},
};
use log::{trace, warn};
use std::fmt;

/// A byte position `object + offset`. The offset may lie outside of the
/// object after pointer arithmetic; accesses through such an address are
/// reported, not performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub object: ObjectId,
    pub offset: i64,
}

impl Address {
    pub fn new(object: ObjectId, offset: i64) -> Self {
        Self { object, offset }
    }

    pub fn shifted(self, by: i64) -> Self {
        Self::new(self.object, self.offset.wrapping_add(by))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}+{}", self.object, self.offset)
    }
}

/// A has-value edge relative to the start of a copied byte range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub offset: u64,
    pub ty: CType,
    pub value: SymbolicValue,
}

/// The abstract state of one program path: the memory graph plus the
/// memory safety violations found on the way to it.
///
/// Memory that was zeroed as a whole (`calloc`, `memset` with zero, global
/// variables) is described by one `char[n]` edge holding the null value.
/// Writes into such a range split the zero edge around the written bytes,
/// and reads of any type inside a zero edge yield the null value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmgState {
    heap: CLangSmg,
    bugs: Vec<Bug>,
    allocations: u64,
}

impl SmgState {
    pub fn new(machine_model: MachineModel) -> Self {
        Self {
            heap: CLangSmg::new(machine_model),
            bugs: Vec::new(),
            allocations: 0,
        }
    }

    pub fn heap(&self) -> &CLangSmg {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut CLangSmg {
        &mut self.heap
    }

    pub fn machine_model(&self) -> MachineModel {
        self.heap.machine_model()
    }

    pub fn bugs(&self) -> &[Bug] {
        &self.bugs
    }

    pub fn record_bug(&mut self, bug: Bug) {
        warn!("{}", bug);

        self.bugs.push(bug);
    }

    pub fn has_invalid_free(&self) -> bool {
        self.bugs.iter().any(Bug::is_invalid_free)
    }

    pub fn has_invalid_read(&self) -> bool {
        self.bugs.iter().any(Bug::is_invalid_read)
    }

    pub fn has_invalid_write(&self) -> bool {
        self.bugs.iter().any(Bug::is_invalid_write)
    }

    pub fn has_memory_leaks(&self) -> bool {
        self.heap.has_memory_leaks()
    }

    /// Unique label for the next object allocated by `function`.
    pub(crate) fn allocation_label(&mut self, function: &str) -> String {
        self.allocations += 1;

        format!("{}_ID{}", function, self.allocations)
    }

    pub fn fresh_value(&mut self) -> SymbolicValue {
        self.heap.smg_mut().new_value()
    }

    pub fn value_for_explicit(&mut self, explicit: i64) -> SymbolicValue {
        self.heap.smg_mut().value_for_explicit(explicit)
    }

    pub fn explicit_of(&self, value: SymbolicValue) -> Option<i64> {
        self.heap.smg().explicit_of(value)
    }

    pub fn object_size(&self, object: ObjectId) -> Option<u64> {
        self.heap.smg().object(object).map(|o| o.size())
    }

    pub fn label_of(&self, object: ObjectId) -> String {
        self.heap
            .smg()
            .object(object)
            .map_or_else(|| object.to_string(), |o| o.label().to_owned())
    }

    /// The value denoting `address`, created together with its points-to
    /// edge on first use.
    pub fn pointer_to(&mut self, address: Address) -> SymbolicValue {
        let smg = self.heap.smg_mut();

        if address.object == smg.null_object() {
            // only the null value may point to the null object
            return if address.offset == 0 {
                SymbolicValue::NULL
            } else {
                smg.new_value()
            };
        }

        if let Some(value) = smg.value_pointing_to(address.object, address.offset) {
            return value;
        }

        let value = smg.new_value();
        smg.add_points_to_edge(PointsToEdge::new(value, address.object, address.offset));

        value
    }

    pub fn pointer_target(&self, value: SymbolicValue) -> Option<Address> {
        self.heap
            .smg()
            .points_to_edge(value)
            .map(|e| Address::new(e.object, e.offset))
    }

    fn check_access(&self, address: Address, size: u64) -> Result<u64, &'static str> {
        let smg = self.heap.smg();

        let object = smg
            .object(address.object)
            .ok_or("object is not part of the memory graph")?;

        if object.is_null() {
            return Err("null pointer dereference");
        }

        if !smg.is_object_valid(address.object).unwrap_or(false) {
            return Err("object was freed or went out of scope");
        }

        let offset =
            u64::try_from(address.offset).map_err(|_| "access before the start of the object")?;

        match offset.checked_add(size) {
            Some(end) if end <= object.size() => Ok(offset),
            _ => Err("access beyond the end of the object"),
        }
    }

    /// Whether `size` bytes at `address` may be read and written.
    pub fn is_accessible(&self, address: Address, size: u64) -> bool {
        self.check_access(address, size).is_ok()
    }

    fn access_or_report<F>(&mut self, address: Address, size: u64, bug: F) -> Option<u64>
    where
        F: FnOnce(String, &'static str) -> Bug,
    {
        match self.check_access(address, size) {
            Ok(offset) => Some(offset),
            Err(reason) => {
                let object = self.label_of(address.object);
                self.record_bug(bug(object, reason));
                None
            }
        }
    }

    fn readable(&mut self, address: Address, size: u64) -> Option<u64> {
        self.access_or_report(address, size, |object, reason| Bug::InvalidRead {
            object,
            offset: address.offset,
            size,
            reason,
        })
    }

    fn writable(&mut self, address: Address, size: u64) -> Option<u64> {
        self.access_or_report(address, size, |object, reason| Bug::InvalidWrite {
            object,
            offset: address.offset,
            size,
            reason,
        })
    }

    /// The value of the field `address:ty`, or `None` if it is unknown.
    ///
    /// Fields are matched by offset and size, not by type. Reads through
    /// invalid addresses are recorded as bugs and yield `None`.
    pub fn read_value(&mut self, address: Address, ty: &CType) -> Option<SymbolicValue> {
        let machine = self.machine_model();
        let size = machine.size_of(ty);

        let offset = self.readable(address, size)?;
        let end = offset + size;

        let smg = self.heap.smg();
        let mut fields = smg.has_value_edges_of(address.object);

        let value = fields
            .find(|e| e.offset == offset && e.size(&machine) == size)
            .map(|e| e.value)
            .or_else(|| {
                smg.has_value_edges_of(address.object)
                    .any(|e| e.value.is_null() && e.covers(offset, end, &machine))
                    .then_some(SymbolicValue::NULL)
            });

        trace!(
            "read {}[{}]:{} -> {}",
            self.label_of(address.object),
            offset,
            ty,
            value.map_or_else(|| String::from("?"), |v| v.to_string())
        );

        value
    }

    /// Replaces whatever `address:ty` overlaps with `value`.
    pub fn write_value(&mut self, address: Address, ty: &CType, value: SymbolicValue) {
        let size = self.machine_model().size_of(ty);

        let offset = match self.writable(address, size) {
            Some(offset) => offset,
            None => return,
        };

        if size == 0 {
            return;
        }

        trace!(
            "write {}[{}]:{} <- {}",
            self.label_of(address.object),
            offset,
            ty,
            value
        );

        self.clear_range(address.object, offset, offset + size);
        self.heap
            .smg_mut()
            .add_has_value_edge(HasValueEdge::new(address.object, offset, ty.clone(), value));
    }

    /// Sets `size` bytes starting at `address` to zero.
    pub fn write_zero(&mut self, address: Address, size: u64) {
        self.write_value(address, &CType::char_array(size), SymbolicValue::NULL);
    }

    /// Writes `value` into each of the `count` bytes starting at `address`.
    pub fn write_bytes(&mut self, address: Address, count: u64, value: SymbolicValue) {
        let start = match self.writable(address, count) {
            Some(start) => start,
            None => return,
        };

        self.clear_range(address.object, start, start + count);

        let smg = self.heap.smg_mut();

        for offset in start..start + count {
            smg.add_has_value_edge(HasValueEdge::new(address.object, offset, CType::char(), value));
        }
    }

    /// Forgets everything known about `size` bytes starting at `address`.
    pub fn forget_range(&mut self, address: Address, size: u64) {
        if let Some(offset) = self.writable(address, size) {
            self.clear_range(address.object, offset, offset + size);
        }
    }

    /// Fields inside `size` bytes starting at `address`, relative to
    /// `address`. Zero edges reaching over the border are cut to the range,
    /// other fields reaching over the border are left out.
    pub fn read_fields(&mut self, address: Address, size: u64) -> Option<Vec<Field>> {
        let machine = self.machine_model();
        let start = self.readable(address, size)?;
        let end = start + size;

        let fields = self
            .heap
            .smg()
            .has_value_edges_of(address.object)
            .filter(|e| e.overlaps(start, end, &machine))
            .filter_map(|e| {
                if e.offset >= start && e.end(&machine) <= end {
                    Some(Field {
                        offset: e.offset - start,
                        ty: e.ty.clone(),
                        value: e.value,
                    })
                } else if e.value.is_null() {
                    let from = e.offset.max(start);
                    let to = e.end(&machine).min(end);

                    Some(Field {
                        offset: from - start,
                        ty: CType::char_array(to - from),
                        value: SymbolicValue::NULL,
                    })
                } else {
                    None
                }
            })
            .collect();

        Some(fields)
    }

    /// Replaces `size` bytes starting at `address` with `fields`.
    pub fn write_fields(&mut self, address: Address, size: u64, fields: &[Field]) {
        let start = match self.writable(address, size) {
            Some(start) => start,
            None => return,
        };

        self.clear_range(address.object, start, start + size);

        let smg = self.heap.smg_mut();

        for field in fields {
            smg.add_has_value_edge(HasValueEdge::new(
                address.object,
                start + field.offset,
                field.ty.clone(),
                field.value,
            ));
        }
    }

    /// Copies `size` bytes from `source` to `target`. If the source can not
    /// be read, the target range becomes unknown.
    pub fn copy_range(&mut self, source: Address, target: Address, size: u64) {
        match self.read_fields(source, size) {
            Some(fields) => self.write_fields(target, size, &fields),
            None => self.forget_range(target, size),
        }
    }

    fn clear_range(&mut self, object: ObjectId, start: u64, end: u64) {
        let machine = self.machine_model();
        let smg = self.heap.smg_mut();

        let overlapping = smg
            .has_value_edges_of(object)
            .filter(|e| e.overlaps(start, end, &machine))
            .cloned()
            .collect::<Vec<_>>();

        for edge in overlapping {
            smg.remove_has_value_edge(&edge);

            if !edge.value.is_null() {
                continue;
            }

            let edge_end = edge.end(&machine);

            if edge.offset < start {
                smg.add_has_value_edge(HasValueEdge::new(
                    object,
                    edge.offset,
                    CType::char_array(start - edge.offset),
                    SymbolicValue::NULL,
                ));
            }

            if end < edge_end {
                smg.add_has_value_edge(HasValueEdge::new(
                    object,
                    end,
                    CType::char_array(edge_end - end),
                    SymbolicValue::NULL,
                ));
            }
        }
    }
}

impl fmt::Display for SmgState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let smg = self.heap.smg();

        for (id, object) in smg.objects() {
            let validity = if smg.is_object_valid(id) == Ok(true) {
                "valid"
            } else {
                "invalid"
            };

            writeln!(f, "{}: {} [{}]", id, object, validity)?;

            for edge in smg.has_value_edges_of(id) {
                match self.pointer_target(edge.value) {
                    Some(target) => writeln!(f, "  {} => {}", edge, target)?,
                    None => writeln!(f, "  {}", edge)?,
                }
            }
        }

        for bug in &self.bugs {
            writeln!(f, "{}", bug)?;
        }

        Ok(())
    }
}
