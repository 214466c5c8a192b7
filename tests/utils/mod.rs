#![allow(dead_code)]

use smg::{
    ast::{CType, CfaEdge, Expression, FunctionSignature, Statement, VariableDeclaration},
    config::SmgOptions,
    smg::{ExplicitValue, SymbolicValue},
    transfer::{Address, ExpressionEvaluator, NeverShutdown, SmgState, SmgTransferRelation},
};
use log::info;
use std::{
    sync::{Arc, Once},
    time::Instant,
};
use tempfile::{tempdir, TempDir};

static INIT_LOGGER: Once = Once::new();

pub fn init() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn time<F, R>(s: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let result = f();
    let end = Instant::now();

    info!("{}: {:?}", s, end.duration_since(start));

    result
}

pub fn with_temp_dir<F, R>(f: F) -> R
where
    F: FnOnce(Arc<TempDir>) -> R,
{
    let temp_dir = Arc::new(tempdir().unwrap());

    f(temp_dir)
}

pub fn test_options() -> SmgOptions {
    SmgOptions {
        fail_on_inconsistency: true,
        ..Default::default()
    }
}

pub fn main_function() -> FunctionSignature {
    FunctionSignature::new("main", CType::int(), vec![])
}

/// A relation with `options` and a state at the entry of `main`.
pub fn setup(options: SmgOptions) -> (SmgTransferRelation, SmgState) {
    let relation = SmgTransferRelation::new(options);
    let state = relation.initial_state(&main_function()).unwrap();

    (relation, state)
}

/// Follows `edges` from `state`, on every path the relation branches into.
pub fn run(relation: &SmgTransferRelation, state: SmgState, edges: &[CfaEdge]) -> Vec<SmgState> {
    edges.iter().fold(vec![state], |states, edge| {
        states
            .iter()
            .flat_map(|s| relation.transfer(s, edge, &NeverShutdown).unwrap())
            .collect()
    })
}

/// Like [`run`], for edges which never branch.
pub fn run_single(relation: &SmgTransferRelation, state: SmgState, edges: &[CfaEdge]) -> SmgState {
    let mut states = run(relation, state, edges);

    assert_eq!(states.len(), 1, "expected exactly one path");

    states.remove(0)
}

pub fn int_pointer() -> CType {
    CType::pointer_to(CType::int())
}

pub fn void_pointer() -> CType {
    CType::pointer_to(CType::Void)
}

pub fn var(name: &str, ty: CType) -> Expression {
    Expression::id(name, ty)
}

pub fn local(name: &str, ty: CType) -> CfaEdge {
    CfaEdge::declare(VariableDeclaration::local(name, ty))
}

pub fn global(name: &str, ty: CType) -> CfaEdge {
    CfaEdge::declare(VariableDeclaration::global(name, ty))
}

pub fn call(function: &str, arguments: Vec<Expression>, ty: CType) -> Expression {
    Expression::call(function, arguments, ty)
}

pub fn malloc(size: i64) -> Expression {
    call("malloc", vec![Expression::int(size)], void_pointer())
}

pub fn call_statement(function: &str, arguments: Vec<Expression>) -> CfaEdge {
    CfaEdge::Statement(Statement::Expression(call(function, arguments, CType::Void)))
}

pub fn free(pointer: Expression) -> CfaEdge {
    call_statement("free", vec![pointer])
}

/// Evaluates `expression` on a copy of `state`.
pub fn eval(relation: &SmgTransferRelation, state: &SmgState, expression: &Expression) -> ExplicitValue {
    let mut scratch = state.clone();

    ExpressionEvaluator::new(&mut scratch, relation.options())
        .explicit_value(expression)
        .unwrap()
}

/// The object the pointer variable `name` points to, with the offset.
pub fn target_of(state: &SmgState, name: &str, ty: &CType) -> Option<Address> {
    let mut scratch = state.clone();
    let object = scratch.heap().object_for_visible_variable(name)?;
    let value = scratch.read_value(Address::new(object, 0), ty)?;

    scratch.pointer_target(value)
}

pub fn value_of(state: &SmgState, name: &str, ty: &CType) -> Option<SymbolicValue> {
    let mut scratch = state.clone();
    let object = scratch.heap().object_for_visible_variable(name)?;

    scratch.read_value(Address::new(object, 0), ty)
}
