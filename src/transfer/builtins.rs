use super::{
    bug::Bug,
    evaluator::ExpressionEvaluator,
    state::Address,
    TransferError,
};
use crate::{
    ast::{CType, Expression},
    config::Builtin,
    smg::{ExplicitValue, MemoryObject, SymbolicValue},
};
use log::debug;

fn expect_arguments<'e, const N: usize>(
    function: &str,
    arguments: &'e [Expression],
) -> Result<&'e [Expression; N], TransferError> {
    <&[Expression; N]>::try_from(arguments).map_err(|_| TransferError::BuiltinArity {
        function: function.to_owned(),
        expected: N,
        found: arguments.len(),
    })
}

fn known_size(value: ExplicitValue) -> Option<u64> {
    value.as_known().and_then(|v| u64::try_from(v).ok())
}

impl<'a> ExpressionEvaluator<'a> {
    /// Evaluates a call that is not modeled by call and return edges:
    /// either one of the memory builtins or an external function.
    pub(super) fn call(
        &mut self,
        function: &str,
        arguments: &[Expression],
        ty: &CType,
    ) -> Result<Option<SymbolicValue>, TransferError> {
        match self.options.builtin(function) {
            Some(Builtin::Malloc) => self.malloc(function, arguments),
            Some(Builtin::Calloc) => self.calloc(function, arguments),
            Some(Builtin::Free) => self.free(function, arguments).map(|_| None),
            Some(Builtin::Memset) => self.memset(function, arguments),
            Some(Builtin::Alloca) => self.alloca(function, arguments),
            None => self.external_call(function, arguments, ty),
        }
    }

    fn malloc(
        &mut self,
        function: &str,
        arguments: &[Expression],
    ) -> Result<Option<SymbolicValue>, TransferError> {
        let [size] = expect_arguments::<1>(function, arguments)?;

        let size = self.explicit_value(size)?;

        Ok(self.allocate(function, size, false))
    }

    fn calloc(
        &mut self,
        function: &str,
        arguments: &[Expression],
    ) -> Result<Option<SymbolicValue>, TransferError> {
        let [count, size] = expect_arguments::<2>(function, arguments)?;

        let count = known_size(self.explicit_value(count)?);
        let size = known_size(self.explicit_value(size)?);

        let total = match count.zip(size).and_then(|(c, s)| c.checked_mul(s)) {
            Some(total) => i64::try_from(total).map_or(ExplicitValue::Unknown, ExplicitValue::Known),
            None => ExplicitValue::Unknown,
        };

        Ok(self.allocate(function, total, true))
    }

    fn allocate(&mut self, function: &str, size: ExplicitValue, zeroed: bool) -> Option<SymbolicValue> {
        let size = match known_size(size) {
            Some(size) => size,
            None => {
                debug!("{}: allocation of unknown size, result is unknown", function);
                return None;
            }
        };

        let label = self.state.allocation_label(function);
        let object = self
            .state
            .heap_mut()
            .add_heap_object(MemoryObject::new(size, &label));
        let address = Address::new(object, 0);

        if zeroed {
            self.state.write_zero(address, size);
        }

        debug!("{}: allocated {} of {} bytes", function, label, size);

        Some(self.state.pointer_to(address))
    }

    fn free(&mut self, function: &str, arguments: &[Expression]) -> Result<(), TransferError> {
        let [pointer] = expect_arguments::<1>(function, arguments)?;

        let address = match self.address_value(pointer)? {
            Some(address) => address,
            None => return self.invalid_free(pointer, "pointer does not point to a known object"),
        };

        let heap = self.state.heap();
        let null = heap.smg().null_object();

        if address.object == null {
            if address.offset == 0 {
                debug!("{}: freeing the null pointer has no effect", function);
                return Ok(());
            }

            return self.invalid_free(pointer, "pointer does not point to a known object");
        }

        if !heap.is_heap_object(address.object) {
            return self.invalid_free(pointer, "object was not allocated on the heap");
        }

        if address.offset != 0 {
            return self.invalid_free(pointer, "pointer does not point to the start of an object");
        }

        if !heap.smg().is_object_valid(address.object)? {
            return self.invalid_free(pointer, "object has already been freed");
        }

        debug!("{}: release {}", function, self.state.label_of(address.object));

        let smg = self.state.heap_mut().smg_mut();
        smg.set_validity(address.object, false)?;
        smg.remove_has_value_edges_of(address.object);

        Ok(())
    }

    fn invalid_free(&mut self, pointer: &Expression, reason: &'static str) -> Result<(), TransferError> {
        self.state.record_bug(Bug::InvalidFree {
            pointer: pointer.to_string(),
            reason,
        });

        Ok(())
    }

    fn memset(
        &mut self,
        function: &str,
        arguments: &[Expression],
    ) -> Result<Option<SymbolicValue>, TransferError> {
        let [buffer, byte, count] = expect_arguments::<3>(function, arguments)?;

        let address = self.address_value(buffer)?;
        let byte = self.explicit_value(byte)?;
        let count = self.explicit_value(count)?;

        let address = match address {
            Some(address) => address,
            None => {
                debug!("{}: buffer is unknown, nothing is written", function);
                return Ok(None);
            }
        };

        match (known_size(count), byte.truncate(8, true).as_known()) {
            (Some(count), Some(0)) => self.state.write_zero(address, count),
            (Some(count), _)
                if count > self.options.memset_byte_limit
                    && self.state.is_accessible(address, count) =>
            {
                debug!("{}: {} bytes are too many to track, the range is unknown", function, count);

                self.state.forget_range(address, count);
            }
            (Some(count), byte) if self.state.is_accessible(address, count) => {
                let value = match byte {
                    Some(byte) => self.state.value_for_explicit(byte),
                    None => self.state.fresh_value(),
                };

                self.state.write_bytes(address, count, value);
            }
            (Some(count), _) => self.state.forget_range(address, count),
            (None, _) => {
                debug!("{}: unknown length, forgetting the rest of the buffer", function);

                let rest = self
                    .state
                    .object_size(address.object)
                    .map_or(0, |size| size.saturating_sub(address.offset.max(0) as u64));

                self.state.forget_range(address, rest);
            }
        }

        Ok(Some(self.state.pointer_to(address)))
    }

    fn alloca(
        &mut self,
        function: &str,
        arguments: &[Expression],
    ) -> Result<Option<SymbolicValue>, TransferError> {
        let [size] = expect_arguments::<1>(function, arguments)?;

        let size = match known_size(self.explicit_value(size)?) {
            Some(size) => size,
            None => {
                debug!("{}: allocation of unknown size, result is unknown", function);
                return Ok(None);
            }
        };

        let label = self.state.allocation_label(function);
        let object = self
            .state
            .heap_mut()
            .add_stack_allocation(MemoryObject::new(size, &label))?;

        Ok(Some(self.state.pointer_to(Address::new(object, 0))))
    }

    fn external_call(
        &mut self,
        function: &str,
        arguments: &[Expression],
        ty: &CType,
    ) -> Result<Option<SymbolicValue>, TransferError> {
        for argument in arguments {
            self.symbolic_value(argument)?;
        }

        debug!("{}: external function, result is unknown", function);

        Ok(match ty {
            CType::Void => None,
            _ => Some(self.state.fresh_value()),
        })
    }
}
