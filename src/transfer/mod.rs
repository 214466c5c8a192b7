//! The transfer relation: successor states of a state along one CFA edge.
//!
//! Every call works on a copy of the given state; the given state is never
//! changed. An edge yields no successor if it is infeasible, two if an
//! allocation is assigned while allocation failures are simulated, and one
//! otherwise.

mod builtins;

pub mod bug;
pub mod evaluator;
pub mod state;

pub use bug::Bug;
pub use evaluator::ExpressionEvaluator;
pub use state::{Address, Field, SmgState};

use crate::{
    ast::{
        CType, CfaEdge, Declaration, Expression, FunctionCall, FunctionSignature, Initializer,
        Statement, VariableDeclaration,
    },
    config::{Builtin, ExportPolicy, RuntimeCheck, SmgOptions},
    smg::{consistency, plotter::SmgPlotter, MemoryObject, SmgError, SymbolicValue},
};
use log::{debug, trace};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TransferError {
    #[error(transparent)]
    Smg(#[from] SmgError),

    #[error("expression `{expression}` can not be used as {context}")]
    UnrecognizedExpression {
        expression: String,
        context: &'static str,
    },

    #[error("{function} expects {expected} argument(s), but got {found}")]
    BuiltinArity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("type of `{0}` is not a complete struct or union")]
    UnresolvableType(String),

    #[error("{composite} has no member named `{field}`")]
    UnknownField { composite: String, field: String },

    #[error("{function} takes {expected} parameter(s), but is called with {found} argument(s)")]
    ParameterMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("analysis has been interrupted")]
    Interrupted,

    #[error("inconsistent memory graph after `{0}`")]
    InconsistentState(String),

    #[error("failed to export state {0:#}")]
    IoError(Arc<std::io::Error>),
}

/// Lets the driver stop a running analysis. Polled once per edge.
pub trait ShutdownNotifier {
    fn shutdown_requested(&self) -> bool;
}

impl ShutdownNotifier for AtomicBool {
    fn shutdown_requested(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

pub struct NeverShutdown;

impl ShutdownNotifier for NeverShutdown {
    fn shutdown_requested(&self) -> bool {
        false
    }
}

enum Argument {
    Scalar(Option<SymbolicValue>),
    Composite(Option<Address>),
}

enum Returned {
    Scalar(Option<SymbolicValue>),
    Composite(Option<Vec<Field>>),
}

pub struct SmgTransferRelation {
    options: SmgOptions,
    exported: AtomicUsize,
}

impl SmgTransferRelation {
    pub fn new(options: SmgOptions) -> Self {
        Self {
            options,
            exported: AtomicUsize::new(0),
        }
    }

    pub fn options(&self) -> &SmgOptions {
        &self.options
    }

    /// A state at the entry of `main`: an empty memory with one stack frame
    /// whose parameters hold unknown values.
    pub fn initial_state(&self, main: &FunctionSignature) -> Result<SmgState, TransferError> {
        let mut state = SmgState::new(self.options.machine_model);

        state.heap_mut().add_stack_frame(main);

        for parameter in &main.parameters {
            let size = self.options.machine_model.size_of(&parameter.ty);
            let object = state
                .heap_mut()
                .add_stack_object(MemoryObject::new(size, &parameter.name))?;

            if !parameter.ty.is_composite() {
                let value = state.fresh_value();
                state.write_value(Address::new(object, 0), &parameter.ty, value);
            }
        }

        Ok(state)
    }

    /// Computes the successors of `state` along `edge`.
    pub fn transfer<S>(
        &self,
        state: &SmgState,
        edge: &CfaEdge,
        shutdown: &S,
    ) -> Result<Vec<SmgState>, TransferError>
    where
        S: ShutdownNotifier + ?Sized,
    {
        if shutdown.shutdown_requested() {
            return Err(TransferError::Interrupted);
        }

        trace!("transfer: {}", edge);

        let successors = match edge {
            CfaEdge::Blank => vec![state.clone()],
            CfaEdge::Declaration(declaration) => {
                vec![self.handle_declaration(state.clone(), declaration)?]
            }
            CfaEdge::Statement(statement) => self.handle_statement(state, statement)?,
            CfaEdge::Assume { condition, truth } => self
                .handle_assume(state, condition, *truth)?
                .into_iter()
                .collect(),
            CfaEdge::FunctionCall(call) => vec![self.handle_function_call(state.clone(), call)?],
            CfaEdge::FunctionReturn(call) => {
                vec![self.handle_function_return(state.clone(), call, edge)?]
            }
            CfaEdge::Return(expression) => {
                vec![self.handle_return(state.clone(), expression.as_ref())?]
            }
        };

        let leaks_before = count_leaks(state);

        for successor in &successors {
            if self.options.runtime_check == RuntimeCheck::Full {
                self.check_consistency(successor, edge)?;
            }

            self.export(successor, edge, leaks_before)?;
        }

        trace!("{} successor(s) after {}", successors.len(), edge);

        Ok(successors)
    }

    // Private Implementation

    fn evaluator<'s>(&'s self, state: &'s mut SmgState) -> ExpressionEvaluator<'s> {
        ExpressionEvaluator::new(state, &self.options)
    }

    fn handle_declaration(
        &self,
        mut state: SmgState,
        declaration: &Declaration,
    ) -> Result<SmgState, TransferError> {
        let variable = match declaration {
            Declaration::Variable(variable) => variable,
            Declaration::Function(function) => {
                trace!("declaration of function {} has no effect", function.name);
                return Ok(state);
            }
        };

        let ty = completed_type(variable);
        let size = self.options.machine_model.size_of(&ty);

        let object = if variable.global {
            match state.heap().global_objects().get(&variable.name) {
                Some(object) => *object,
                None => {
                    let object = state
                        .heap_mut()
                        .add_global_object(MemoryObject::new(size, &variable.name));

                    state.write_zero(Address::new(object, 0), size);
                    object
                }
            }
        } else {
            match state
                .heap()
                .current_frame()
                .and_then(|frame| frame.variable(&variable.name))
            {
                Some(object) if state.object_size(object) == Some(size) => {
                    // declared again on a loop iteration: the old value is gone
                    state.heap_mut().smg_mut().remove_has_value_edges_of(object);
                    object
                }
                Some(shadowed) => {
                    // a sibling block reuses the name with another type
                    state.heap_mut().smg_mut().remove_object_and_edges(shadowed);
                    state
                        .heap_mut()
                        .add_stack_object(MemoryObject::new(size, &variable.name))?
                }
                None => state
                    .heap_mut()
                    .add_stack_object(MemoryObject::new(size, &variable.name))?,
            }
        };

        debug!("declare {}: {} ({} bytes)", variable.name, ty, size);

        if let Some(initializer) = &variable.initializer {
            let target = Address::new(object, 0);

            // elements missing from an initializer list are zero
            if matches!(initializer, Initializer::List(_)) {
                state.write_zero(target, size);
            }

            self.evaluator(&mut state).initialize(target, &ty, initializer)?;
        }

        Ok(state)
    }

    fn handle_statement(
        &self,
        state: &SmgState,
        statement: &Statement,
    ) -> Result<Vec<SmgState>, TransferError> {
        let mut successor = state.clone();

        let (lhs, rhs) = match statement {
            Statement::Expression(expression) => {
                self.evaluator(&mut successor).symbolic_value(expression)?;
                return Ok(vec![successor]);
            }
            Statement::Assignment { lhs, rhs } => (lhs, rhs),
        };

        self.evaluator(&mut successor).assign_expression(lhs, rhs)?;

        if !(self.options.simulate_malloc_failure && self.is_allocation(rhs)) {
            return Ok(vec![successor]);
        }

        debug!("simulate failure of allocation: {} = NULL", lhs);

        let mut failure = state.clone();
        let mut evaluator = self.evaluator(&mut failure);
        let target = evaluator.address_of(lhs)?;
        evaluator.store(target, lhs.ty(), Some(SymbolicValue::NULL));

        Ok(vec![successor, failure])
    }

    fn is_allocation(&self, rhs: &Expression) -> bool {
        match rhs {
            Expression::Cast { operand, .. } => self.is_allocation(operand),
            Expression::FunctionCall { function, .. } => matches!(
                self.options.builtin(function),
                Some(Builtin::Malloc | Builtin::Calloc)
            ),
            _ => false,
        }
    }

    /// Branches are only cut off, never refined: the state is passed on
    /// unchanged unless evaluating the condition revealed a bug.
    fn handle_assume(
        &self,
        state: &SmgState,
        condition: &Expression,
        truth: bool,
    ) -> Result<Option<SmgState>, TransferError> {
        let mut evaluated = state.clone();
        let value = self.evaluator(&mut evaluated).truth_value(condition)?;

        if let Some(value) = value {
            if value != truth {
                trace!("assumption {} == {} is infeasible", condition, truth);
                return Ok(None);
            }
        }

        if evaluated.bugs().len() > state.bugs().len() {
            Ok(Some(evaluated))
        } else {
            Ok(Some(state.clone()))
        }
    }

    fn handle_function_call(
        &self,
        mut state: SmgState,
        call: &FunctionCall,
    ) -> Result<SmgState, TransferError> {
        let function = &call.function;

        if function.parameters.len() != call.arguments.len() {
            return Err(TransferError::ParameterMismatch {
                function: function.name.clone(),
                expected: function.parameters.len(),
                found: call.arguments.len(),
            });
        }

        let mut evaluator = self.evaluator(&mut state);

        let arguments = function
            .parameters
            .iter()
            .zip(&call.arguments)
            .map(|(parameter, argument)| {
                if parameter.ty.is_composite() {
                    evaluator
                        .composite_source(argument)
                        .map(Argument::Composite)
                } else {
                    evaluator.symbolic_value(argument).map(Argument::Scalar)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        state.heap_mut().add_stack_frame(function);

        for (parameter, argument) in function.parameters.iter().zip(arguments) {
            let size = self.options.machine_model.size_of(&parameter.ty);
            let object = state
                .heap_mut()
                .add_stack_object(MemoryObject::new(size, &parameter.name))?;
            let target = Address::new(object, 0);

            let mut evaluator = self.evaluator(&mut state);

            match argument {
                Argument::Scalar(value) => evaluator.store(Some(target), &parameter.ty, value),
                Argument::Composite(Some(source)) => {
                    evaluator.copy_value(source, target, &parameter.ty)
                }
                Argument::Composite(None) => trace!("parameter {} is unknown", parameter.name),
            }
        }

        Ok(state)
    }

    fn handle_function_return(
        &self,
        mut state: SmgState,
        call: &FunctionCall,
        edge: &CfaEdge,
    ) -> Result<SmgState, TransferError> {
        let frame = state.heap().current_frame().ok_or(SmgError::EmptyStack)?;

        if frame.function().name != call.function.name {
            debug!(
                "return edge of {} leaves the frame of {}",
                call.function.name,
                frame.function().name
            );
        }

        let source = Address::new(frame.return_object(), 0);
        let return_type = frame.function().return_type.clone();
        let size = self.options.machine_model.size_of(&return_type);

        let returned = match (&call.result, return_type.is_composite()) {
            (None, _) => None,
            (Some(_), true) => Some(Returned::Composite(state.read_fields(source, size))),
            (Some(_), false) => Some(Returned::Scalar(state.read_value(source, &return_type))),
        };

        state.heap_mut().drop_stack_frame()?;

        if let (Some(lhs), Some(returned)) = (&call.result, returned) {
            let mut evaluator = self.evaluator(&mut state);
            let target = evaluator.address_of(lhs)?;

            match (returned, target) {
                (Returned::Scalar(value), target) => evaluator.store(target, lhs.ty(), value),
                (Returned::Composite(Some(fields)), Some(target)) => {
                    state.write_fields(target, size, &fields)
                }
                (Returned::Composite(None), Some(target)) => state.forget_range(target, size),
                (Returned::Composite(_), None) => {
                    debug!("returned {} is dropped, target is unknown", return_type)
                }
            }
        }

        for object in state.heap_mut().prune_unreachable() {
            state.record_bug(Bug::MemoryLeak {
                object: object.label().to_owned(),
                size: object.size(),
            });
        }

        if self.options.runtime_check == RuntimeCheck::Half {
            self.check_consistency(&state, edge)?;
        }

        Ok(state)
    }

    fn handle_return(
        &self,
        mut state: SmgState,
        expression: Option<&Expression>,
    ) -> Result<SmgState, TransferError> {
        let frame = state.heap().current_frame().ok_or(SmgError::EmptyStack)?;

        let target = Address::new(frame.return_object(), 0);
        let return_type = frame.function().return_type.clone();

        if return_type == CType::Void {
            return Ok(state);
        }

        match expression {
            Some(expression) => self
                .evaluator(&mut state)
                .assign(target, &return_type, expression)?,
            None => {
                let size = self.options.machine_model.size_of(&return_type);
                state.write_zero(target, size);
            }
        }

        Ok(state)
    }

    fn check_consistency(&self, state: &SmgState, edge: &CfaEdge) -> Result<(), TransferError> {
        if consistency::verify_clang_smg(state.heap()) || !self.options.fail_on_inconsistency {
            Ok(())
        } else {
            Err(TransferError::InconsistentState(edge.to_string()))
        }
    }

    fn export(&self, state: &SmgState, edge: &CfaEdge, leaks_before: usize) -> Result<(), TransferError> {
        let directory = match (&self.options.export_directory, self.options.export_policy) {
            (Some(directory), ExportPolicy::Every) => directory,
            (Some(directory), ExportPolicy::Leaks) if count_leaks(state) > leaks_before => directory,
            _ => return Ok(()),
        };

        let name = format!("smg-{:05}", self.exported.fetch_add(1, Ordering::Relaxed));
        let path = directory.join(format!("{}.dot", name));

        debug!("export state after {} to {}", edge, path.display());

        SmgPlotter::new(state.heap(), &name)
            .write_to_file(&path)
            .map_err(|e| TransferError::IoError(Arc::new(e)))
    }
}

fn count_leaks(state: &SmgState) -> usize {
    state.bugs().iter().filter(|b| b.is_memory_leak()).count()
}

/// `int a[] = {1, 2}` declares an array of two elements.
fn completed_type(variable: &VariableDeclaration) -> CType {
    match (&variable.ty, &variable.initializer) {
        (
            CType::Array {
                element,
                length: None,
            },
            Some(Initializer::List(items)),
        ) => CType::Array {
            element: element.clone(),
            length: Some(items.len() as u64),
        },
        (ty, _) => ty.clone(),
    }
}
