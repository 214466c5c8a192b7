//! Evaluation of expressions against a state.
//!
//! Three mutually recursive visitors cover every expression kind:
//!
//! - [`address_of`](ExpressionEvaluator::address_of) resolves lvalues to the
//!   address they designate,
//! - [`address_value`](ExpressionEvaluator::address_value) resolves
//!   expressions of pointer or array type to the address they evaluate to,
//! - [`symbolic_value`](ExpressionEvaluator::symbolic_value) and
//!   [`explicit_value`](ExpressionEvaluator::explicit_value) compute the value
//!   of an rvalue as a graph value or as a concrete integer.
//!
//! Imprecision is never an error: whatever can not be determined is `None`
//! or [`ExplicitValue::Unknown`]. Errors are reserved for expressions which
//! can not occur in well-formed programs.

use super::{
    state::{Address, SmgState},
    TransferError,
};
use crate::{
    ast::{
        BinaryOperator, CType, Expression, Initializer, TypeIdOperator, UnaryOperator,
    },
    config::SmgOptions,
    machine::MachineModel,
    smg::{ExplicitValue, SymbolicValue},
};
use log::{debug, trace};

pub struct ExpressionEvaluator<'a> {
    pub(super) state: &'a mut SmgState,
    pub(super) options: &'a SmgOptions,
    pub(super) machine: MachineModel,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(state: &'a mut SmgState, options: &'a SmgOptions) -> Self {
        let machine = state.machine_model();

        Self {
            state,
            options,
            machine,
        }
    }

    // Public Interface

    /// The address designated by the lvalue `expression`.
    pub fn address_of(&mut self, expression: &Expression) -> Result<Option<Address>, TransferError> {
        match expression {
            Expression::Id { name, .. } => {
                let object = self.state.heap().object_for_visible_variable(name);

                if object.is_none() {
                    debug!("variable `{}` is not visible, address is unknown", name);
                }

                Ok(object.map(|o| Address::new(o, 0)))
            }
            Expression::FieldReference {
                owner,
                field,
                dereference,
                ..
            } => {
                let owner_type = if *dereference {
                    owner.ty().pointee()
                } else {
                    Some(owner.ty())
                };

                let offset = self.field_offset(owner_type, field, owner)?;

                let base = if *dereference {
                    self.address_value(owner)?
                } else {
                    self.address_of(owner)?
                };

                Ok(base.map(|b| b.shifted(offset as i64)))
            }
            Expression::ArraySubscript {
                array,
                subscript,
                ty,
            } => {
                let base = if array.ty().is_array() {
                    self.address_of(array)?
                } else {
                    self.address_value(array)?
                };

                let index = self.explicit_value(subscript)?;
                let element_size = self.machine.size_of(ty) as i64;

                Ok(base
                    .zip(index.as_known())
                    .map(|(b, i)| b.shifted(i.wrapping_mul(element_size))))
            }
            Expression::PointerDereference { operand, .. } => self.address_value(operand),
            Expression::IntegerLiteral { .. }
            | Expression::CharLiteral { .. }
            | Expression::FloatLiteral { .. }
            | Expression::Unary { .. }
            | Expression::Binary { .. }
            | Expression::Cast { .. }
            | Expression::FunctionCall { .. }
            | Expression::TypeId { .. } => Err(TransferError::UnrecognizedExpression {
                expression: expression.to_string(),
                context: "an lvalue",
            }),
        }
    }

    /// The address an expression of pointer or array type evaluates to.
    pub fn address_value(
        &mut self,
        expression: &Expression,
    ) -> Result<Option<Address>, TransferError> {
        match expression {
            Expression::Unary {
                op: UnaryOperator::AddressOf,
                operand,
                ..
            } => self.address_of(operand),
            Expression::Id { ty, .. }
            | Expression::FieldReference { ty, .. }
            | Expression::ArraySubscript { ty, .. }
            | Expression::PointerDereference { ty, .. }
                if ty.is_array() =>
            {
                self.address_of(expression)
            }
            Expression::Id { .. }
            | Expression::FieldReference { .. }
            | Expression::ArraySubscript { .. }
            | Expression::PointerDereference { .. }
            | Expression::FunctionCall { .. } => {
                let value = self.symbolic_value(expression)?;

                Ok(value.and_then(|v| self.state.pointer_target(v)))
            }
            Expression::IntegerLiteral { value: 0, .. } => Ok(Some(self.null_address())),
            Expression::Cast { operand, .. } => self.address_value(operand),
            Expression::Binary {
                op: op @ (BinaryOperator::Plus | BinaryOperator::Minus),
                lhs,
                rhs,
                ..
            } => self.pointer_arithmetic(*op, lhs, rhs),
            Expression::IntegerLiteral { .. }
            | Expression::CharLiteral { .. }
            | Expression::FloatLiteral { .. }
            | Expression::Unary { .. }
            | Expression::Binary { .. }
            | Expression::TypeId { .. } => Ok(None),
        }
    }

    /// The graph value of an rvalue, `None` if it is unknown.
    ///
    /// Addresses are turned into pointer values, which are created on
    /// demand together with their points-to edge. Values of composite type
    /// are never loaded, they are copied by [`assign`](Self::assign).
    pub fn symbolic_value(
        &mut self,
        expression: &Expression,
    ) -> Result<Option<SymbolicValue>, TransferError> {
        match expression {
            Expression::Id { ty, .. }
            | Expression::FieldReference { ty, .. }
            | Expression::ArraySubscript { ty, .. }
            | Expression::PointerDereference { ty, .. } => {
                if ty.is_array() {
                    let address = self.address_of(expression)?;
                    return Ok(address.map(|a| self.state.pointer_to(a)));
                }

                if ty.is_composite() {
                    return Ok(None);
                }

                let address = self.address_of(expression)?;

                Ok(address.and_then(|a| self.state.read_value(a, ty)))
            }
            Expression::FunctionCall {
                function,
                arguments,
                ty,
            } => self.call(function, arguments, ty),
            Expression::Unary {
                op: UnaryOperator::AddressOf,
                operand,
                ..
            } => {
                let address = self.address_of(operand)?;

                Ok(address.map(|a| self.state.pointer_to(a)))
            }
            Expression::Binary {
                op: BinaryOperator::Plus | BinaryOperator::Minus,
                ty,
                ..
            } if ty.is_pointer() => {
                let address = self.address_value(expression)?;

                Ok(address.map(|a| self.state.pointer_to(a)))
            }
            Expression::Cast { operand, ty } => self.cast(operand, ty),
            Expression::IntegerLiteral { .. }
            | Expression::CharLiteral { .. }
            | Expression::FloatLiteral { .. }
            | Expression::Unary { .. }
            | Expression::Binary { .. }
            | Expression::TypeId { .. } => {
                let explicit = self.explicit_value(expression)?;

                Ok(explicit.as_known().map(|v| self.state.value_for_explicit(v)))
            }
        }
    }

    /// The concrete integer value of an rvalue.
    pub fn explicit_value(&mut self, expression: &Expression) -> Result<ExplicitValue, TransferError> {
        match expression {
            Expression::Id { .. }
            | Expression::FieldReference { .. }
            | Expression::ArraySubscript { .. }
            | Expression::PointerDereference { .. }
            | Expression::FunctionCall { .. } => {
                let value = self.symbolic_value(expression)?;

                Ok(self.explicit_of(value))
            }
            Expression::IntegerLiteral { value, .. } => Ok(ExplicitValue::Known(*value)),
            Expression::CharLiteral { value, .. } => Ok(ExplicitValue::Known(i64::from(*value))),
            Expression::FloatLiteral { .. } => Ok(ExplicitValue::Unknown),
            Expression::Unary { op, operand, ty } => match op {
                UnaryOperator::AddressOf => {
                    self.address_of(operand)?;
                    Ok(ExplicitValue::Unknown)
                }
                UnaryOperator::Minus => {
                    let value = self.explicit_value(operand)?;
                    Ok(self.convert(-value, ty))
                }
                UnaryOperator::Tilde => {
                    let value = self.explicit_value(operand)?;
                    Ok(self.convert(!value, ty))
                }
                UnaryOperator::Not => Ok(self
                    .truth_value(operand)?
                    .map_or(ExplicitValue::Unknown, |b| ExplicitValue::from_bool(!b))),
                UnaryOperator::SizeOf => {
                    Ok(ExplicitValue::Known(self.machine.size_of(operand.ty()) as i64))
                }
            },
            Expression::Binary { op, lhs, rhs, ty } => self.binary(*op, lhs, rhs, ty),
            Expression::Cast { operand, ty } => {
                let value = self.explicit_value(operand)?;

                if ty.is_floating() || operand.ty().is_floating() {
                    return Ok(ExplicitValue::Unknown);
                }

                Ok(self.convert(value, ty))
            }
            Expression::TypeId { op, operand, .. } => {
                let value = match op {
                    TypeIdOperator::SizeOf => self.machine.size_of(operand),
                    TypeIdOperator::AlignOf => self.machine.align_of(operand),
                };

                Ok(ExplicitValue::Known(value as i64))
            }
        }
    }

    /// Whether `expression` is non-zero, if that can be decided.
    pub fn truth_value(&mut self, expression: &Expression) -> Result<Option<bool>, TransferError> {
        if expression.ty().is_address() {
            let value = self.symbolic_value(expression)?;

            Ok(value.and_then(|v| self.truth_of(v)))
        } else {
            let value = self.explicit_value(expression)?;

            Ok(value.as_known().map(|v| v != 0))
        }
    }

    /// Evaluates `rhs` and stores it into `lhs`.
    pub fn assign_expression(&mut self, lhs: &Expression, rhs: &Expression) -> Result<(), TransferError> {
        if lhs.ty().is_composite() {
            let source = self.composite_source(rhs)?;
            let target = self.address_of(lhs)?;

            self.store_composite(target, lhs.ty(), source);
        } else {
            let value = self.symbolic_value(rhs)?;
            let target = self.address_of(lhs)?;

            self.store(target, lhs.ty(), value);
        }

        Ok(())
    }

    /// Evaluates `rhs` and stores it as a `ty` at `target`.
    pub fn assign(&mut self, target: Address, ty: &CType, rhs: &Expression) -> Result<(), TransferError> {
        if ty.is_composite() {
            let source = self.composite_source(rhs)?;
            self.store_composite(Some(target), ty, source);
        } else {
            let value = self.symbolic_value(rhs)?;
            self.store(Some(target), ty, value);
        }

        Ok(())
    }

    /// Stores `value` at `target`. Unknown values are stored as fresh values
    /// and stores to unknown addresses are dropped.
    pub fn store(&mut self, target: Option<Address>, ty: &CType, value: Option<SymbolicValue>) {
        match target {
            Some(target) => {
                let value = value.unwrap_or_else(|| self.state.fresh_value());
                self.state.write_value(target, ty, value);
            }
            None => debug!("store of {} to an unknown address is dropped", ty),
        }
    }

    /// Copies a value of type `ty` from `source` to `target`, recursing into
    /// the members of structs.
    pub fn copy_value(&mut self, source: Address, target: Address, ty: &CType) {
        let size = self.machine.size_of(ty);

        if self.state.is_accessible(source, size) {
            self.copy_members(source, target, ty);
        } else {
            // reports the invalid read once and forgets the target
            self.state.copy_range(source, target, size);
        }
    }

    /// Applies a declaration's initializer to the object at `target`.
    pub fn initialize(
        &mut self,
        target: Address,
        ty: &CType,
        initializer: &Initializer,
    ) -> Result<(), TransferError> {
        let items = match initializer {
            Initializer::Expression(expression) => return self.assign(target, ty, expression),
            Initializer::List(items) => items,
        };

        match ty {
            CType::Composite(composite) => {
                let members = if composite.is_union() {
                    &composite.members()[..composite.members().len().min(1)]
                } else {
                    composite.members()
                };

                let mut offset = 0;

                for (member, item) in members.iter().zip(items) {
                    self.initialize(target.shifted(offset as i64), &member.ty, item)?;
                    offset += self.machine.size_of(&member.ty);
                }
            }
            CType::Array { element, .. } => {
                let element_size = self.machine.size_of(element) as i64;

                for (index, item) in items.iter().enumerate() {
                    self.initialize(target.shifted(index as i64 * element_size), element, item)?;
                }
            }
            scalar => {
                if let Some(item) = items.first() {
                    self.initialize(target, scalar, item)?;
                }
            }
        }

        if items.len() > 1 && !ty.is_composite() && !ty.is_array() {
            trace!("excess elements in initializer of {} ignored", ty);
        }

        Ok(())
    }

    // Private Implementation

    fn null_address(&self) -> Address {
        Address::new(self.state.heap().smg().null_object(), 0)
    }

    fn explicit_of(&self, value: Option<SymbolicValue>) -> ExplicitValue {
        value
            .and_then(|v| self.state.explicit_of(v))
            .map_or(ExplicitValue::Unknown, ExplicitValue::Known)
    }

    fn truth_of(&self, value: SymbolicValue) -> Option<bool> {
        if let Some(explicit) = self.state.explicit_of(value) {
            return Some(explicit != 0);
        }

        let null = self.state.heap().smg().null_object();

        self.state
            .pointer_target(value)
            .map(|a| a.object != null || a.offset != 0)
    }

    fn field_offset(
        &self,
        owner_type: Option<&CType>,
        field: &str,
        owner: &Expression,
    ) -> Result<u64, TransferError> {
        let composite = owner_type
            .and_then(CType::as_composite)
            .ok_or_else(|| TransferError::UnresolvableType(owner.to_string()))?;

        self.machine
            .field_offset(composite, field)
            .ok_or_else(|| TransferError::UnknownField {
                composite: composite.name.clone(),
                field: field.to_owned(),
            })
    }

    /// Size of what an address of type `ty` points to; moves of `p + 1`.
    fn pointee_size(&self, ty: &CType) -> i64 {
        ty.pointee().map_or(1, |t| self.machine.size_of(t).max(1) as i64)
    }

    fn pointer_arithmetic(
        &mut self,
        op: BinaryOperator,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<Option<Address>, TransferError> {
        match (lhs.ty().is_address(), rhs.ty().is_address(), op) {
            (true, false, _) => {
                let base = self.address_value(lhs)?;
                let distance = self.explicit_value(rhs)?;
                let scale = self.pointee_size(lhs.ty());

                let distance = distance.as_known().map(|n| match op {
                    BinaryOperator::Minus => n.wrapping_mul(scale).wrapping_neg(),
                    _ => n.wrapping_mul(scale),
                });

                Ok(base.zip(distance).map(|(b, d)| b.shifted(d)))
            }
            (false, true, BinaryOperator::Plus) => {
                let distance = self.explicit_value(lhs)?;
                let base = self.address_value(rhs)?;
                let scale = self.pointee_size(rhs.ty());

                Ok(base
                    .zip(distance.as_known())
                    .map(|(b, n)| b.shifted(n.wrapping_mul(scale))))
            }
            (false, true, _) => {
                // n - p: the offset is mirrored, the object stays
                let distance = self.explicit_value(lhs)?;
                let base = self.address_value(rhs)?;
                let scale = self.pointee_size(rhs.ty());

                Ok(base.zip(distance.as_known()).map(|(b, n)| {
                    Address::new(b.object, n.wrapping_mul(scale).wrapping_sub(b.offset))
                }))
            }
            (true, true, _) | (false, false, _) => Ok(None),
        }
    }

    fn binary(
        &mut self,
        op: BinaryOperator,
        lhs: &Expression,
        rhs: &Expression,
        ty: &CType,
    ) -> Result<ExplicitValue, TransferError> {
        use BinaryOperator::*;

        let combine: fn(ExplicitValue, ExplicitValue) -> ExplicitValue = match op {
            Multiply => |l, r| l * r,
            Divide => |l, r| l / r,
            Modulo => |l, r| l % r,
            Plus => |l, r| l + r,
            Minus => |l, r| l - r,
            ShiftLeft => |l, r| l << r,
            ShiftRight => |l, r| l >> r,
            BinaryAnd => |l, r| l & r,
            BinaryXor => |l, r| l ^ r,
            BinaryOr => |l, r| l | r,
            LessThan | GreaterThan | LessEqual | GreaterEqual | Equals | NotEquals => {
                return self.compare(op, lhs, rhs)
            }
        };

        match (lhs.ty().is_address(), rhs.ty().is_address(), op) {
            (true, true, Minus) => return self.pointer_difference(lhs, rhs),
            (true, _, Plus | Minus) | (_, true, Plus | Minus) => {
                let address = self.pointer_arithmetic(op, lhs, rhs)?;
                let null = self.state.heap().smg().null_object();

                // the numeric value of an address is only known relative to null
                return Ok(match address {
                    Some(a) if a.object == null => ExplicitValue::Known(a.offset),
                    _ => ExplicitValue::Unknown,
                });
            }
            _ => {}
        }

        let l = self.explicit_value(lhs)?;
        let r = self.explicit_value(rhs)?;

        // shifts are performed in the promoted type of the left operand
        let shift = matches!(op, ShiftLeft | ShiftRight);
        let operation = if shift {
            self.machine.promote(lhs.ty())
        } else {
            self.machine.common_type(lhs.ty(), rhs.ty())
        };

        let (l, r, unsigned) = match &operation {
            Some(operation) => {
                let r = if shift { r } else { self.convert(r, operation) };
                (self.convert(l, operation), r, !is_signed(operation))
            }
            None => (l, r, false),
        };

        if shift {
            let width = operation
                .as_ref()
                .and_then(|t| self.machine.bit_width(t))
                .unwrap_or(64);

            if r.as_known().map_or(false, |n| n < 0 || n >= i64::from(width)) {
                return Ok(ExplicitValue::Unknown);
            }
        }

        let result = match op {
            Divide if unsigned => l.unsigned_div(r),
            Modulo if unsigned => l.unsigned_rem(r),
            ShiftRight if unsigned => l.unsigned_shr(r),
            _ => combine(l, r),
        };

        Ok(self.convert(result, ty))
    }

    fn pointer_difference(
        &mut self,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<ExplicitValue, TransferError> {
        let l = self.address_value(lhs)?;
        let r = self.address_value(rhs)?;
        let scale = self.pointee_size(lhs.ty());

        Ok(match (l, r) {
            (Some(l), Some(r)) if l.object == r.object => {
                ExplicitValue::Known(l.offset.wrapping_sub(r.offset) / scale)
            }
            _ => ExplicitValue::Unknown,
        })
    }

    /// Comparisons are decided by explicit values, by offsets inside the
    /// same object, or by identity of the values. Addresses of different
    /// objects are never equal.
    fn compare(
        &mut self,
        op: BinaryOperator,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<ExplicitValue, TransferError> {
        let l = self.symbolic_value(lhs)?;
        let r = self.symbolic_value(rhs)?;

        let (l, r) = match (l, r) {
            (Some(l), Some(r)) => (l, r),
            _ => return Ok(ExplicitValue::Unknown),
        };

        let holds = move |a: i64, b: i64| compare_integers(op, a, b);

        if let (Some(a), Some(b)) = (self.state.explicit_of(l), self.state.explicit_of(r)) {
            let (a, b) = (ExplicitValue::Known(a), ExplicitValue::Known(b));

            return Ok(match self.machine.common_type(lhs.ty(), rhs.ty()) {
                Some(common) if !is_signed(&common) => self
                    .convert(a, &common)
                    .compare_unsigned(self.convert(b, &common), |a, b| compare_integers(op, a, b)),
                Some(common) => self.convert(a, &common).compare(self.convert(b, &common), holds),
                None => a.compare(b, holds),
            });
        }

        if let (Some(a), Some(b)) = (self.state.pointer_target(l), self.state.pointer_target(r)) {
            if a.object == b.object {
                return Ok(ExplicitValue::Known(a.offset).compare(ExplicitValue::Known(b.offset), holds));
            }

            return Ok(match op {
                BinaryOperator::Equals => ExplicitValue::ZERO,
                BinaryOperator::NotEquals => ExplicitValue::ONE,
                _ => ExplicitValue::Unknown,
            });
        }

        if l == r {
            return Ok(ExplicitValue::Known(0).compare(ExplicitValue::Known(0), holds));
        }

        Ok(ExplicitValue::Unknown)
    }

    /// Converts an explicit value to the integer type `ty`.
    fn convert(&self, value: ExplicitValue, ty: &CType) -> ExplicitValue {
        match ty {
            CType::Bool => value
                .as_known()
                .map_or(ExplicitValue::Unknown, |v| ExplicitValue::from_bool(v != 0)),
            _ => match self.machine.bit_width(ty) {
                Some(bits) => value.truncate(bits, is_signed(ty)),
                None => value,
            },
        }
    }

    fn cast(&mut self, operand: &Expression, ty: &CType) -> Result<Option<SymbolicValue>, TransferError> {
        let value = match self.symbolic_value(operand)? {
            Some(value) => value,
            None => return Ok(None),
        };

        if ty.is_floating() || operand.ty().is_floating() {
            return Ok((ty == operand.ty()).then_some(value));
        }

        if let Some(explicit) = self.state.explicit_of(value) {
            let converted = self.convert(ExplicitValue::Known(explicit), ty);
            return Ok(converted.as_known().map(|v| self.state.value_for_explicit(v)));
        }

        if *ty == CType::Bool {
            let truth = self.truth_of(value);
            return Ok(truth.map(|b| self.state.value_for_explicit(b as i64)));
        }

        let source_width = if operand.ty().is_address() {
            Some(self.machine.size_of_pointer() as u32 * 8)
        } else {
            self.machine.bit_width(operand.ty())
        };

        match (source_width, self.machine.bit_width(ty)) {
            (Some(from), Some(to)) if from > to => Ok(None),
            _ => Ok(Some(value)),
        }
    }

    /// Where the value of a composite-typed rvalue is stored, if anywhere.
    pub(super) fn composite_source(&mut self, rhs: &Expression) -> Result<Option<Address>, TransferError> {
        match rhs {
            Expression::Id { .. }
            | Expression::FieldReference { .. }
            | Expression::ArraySubscript { .. }
            | Expression::PointerDereference { .. } => self.address_of(rhs),
            Expression::Cast { operand, .. } => self.composite_source(operand),
            Expression::FunctionCall { .. } => {
                self.symbolic_value(rhs)?;
                Ok(None)
            }
            Expression::IntegerLiteral { .. }
            | Expression::CharLiteral { .. }
            | Expression::FloatLiteral { .. }
            | Expression::Unary { .. }
            | Expression::Binary { .. }
            | Expression::TypeId { .. } => Err(TransferError::UnrecognizedExpression {
                expression: rhs.to_string(),
                context: "a composite value",
            }),
        }
    }

    fn store_composite(&mut self, target: Option<Address>, ty: &CType, source: Option<Address>) {
        match (target, source) {
            (Some(target), Some(source)) => self.copy_value(source, target, ty),
            (Some(target), None) => {
                let size = self.machine.size_of(ty);
                self.state.forget_range(target, size);
            }
            (None, _) => debug!("copy of {} to an unknown address is dropped", ty),
        }
    }

    fn copy_members(&mut self, source: Address, target: Address, ty: &CType) {
        match ty.as_composite() {
            Some(composite) if !composite.is_union() => {
                let mut offset = 0;

                for member in composite.members() {
                    self.copy_members(
                        source.shifted(offset as i64),
                        target.shifted(offset as i64),
                        &member.ty,
                    );

                    offset += self.machine.size_of(&member.ty);
                }
            }
            _ => {
                let size = self.machine.size_of(ty);
                self.state.copy_range(source, target, size);
            }
        }
    }
}

fn is_signed(ty: &CType) -> bool {
    matches!(ty, CType::Integer { signed: true, .. })
}

fn compare_integers<T: Ord>(op: BinaryOperator, l: T, r: T) -> bool {
    match op {
        BinaryOperator::LessThan => l < r,
        BinaryOperator::GreaterThan => l > r,
        BinaryOperator::LessEqual => l <= r,
        BinaryOperator::GreaterEqual => l >= r,
        BinaryOperator::Equals => l == r,
        BinaryOperator::NotEquals => l != r,
        _ => false,
    }
}
