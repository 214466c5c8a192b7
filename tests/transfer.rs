mod utils;

use rayon::prelude::*;
use smg::{
    ast::{
        BinaryOperator, CType, CfaEdge, CompositeKind, CompositeType, Expression, FunctionCall,
        FunctionSignature, Initializer, Member, Parameter, VariableDeclaration,
    },
    config::{ExportPolicy, RuntimeCheck, SmgOptions},
    smg::{ExplicitValue, SymbolicValue},
    transfer::{Bug, NeverShutdown, SmgState, SmgTransferRelation, TransferError},
};
use std::{fs, sync::atomic::AtomicBool};
use utils::*;

fn int(value: i64) -> Expression {
    Expression::int(value)
}

fn subscript(array: &str, ty: &CType, index: i64) -> Expression {
    Expression::subscript(var(array, ty.clone()), int(index))
}

fn inner_outer() -> (CType, CType) {
    let inner = CType::Composite(CompositeType::new(
        CompositeKind::Struct,
        "inner",
        vec![
            Member::new("x", CType::int()),
            Member::new("p", int_pointer()),
        ],
    ));

    let outer = CType::Composite(CompositeType::new(
        CompositeKind::Struct,
        "outer",
        vec![
            Member::new("a", CType::int()),
            Member::new("in", inner.clone()),
        ],
    ));

    (inner, outer)
}

#[test]
fn nested_struct_assignment_copies_every_field() {
    init();

    let (inner, outer) = inner_outer();
    let (relation, state) = setup(test_options());

    let member = |name: &str, field: &str, ty: CType| {
        Expression::field(var(name, outer.clone()), field, ty)
    };
    let nested = |name: &str, field: &str, ty: CType| {
        Expression::field(member(name, "in", inner.clone()), field, ty)
    };

    let state = run_single(
        &relation,
        state,
        &[
            local("s", outer.clone()),
            local("t", outer.clone()),
            CfaEdge::assign(member("s", "a", CType::int()), int(1)),
            CfaEdge::assign(nested("s", "x", CType::int()), int(2)),
            CfaEdge::assign(
                nested("s", "p", int_pointer()),
                Expression::cast(malloc(4), int_pointer()),
            ),
            CfaEdge::assign(var("t", outer.clone()), var("s", outer.clone())),
            CfaEdge::assign(nested("s", "x", CType::int()), int(3)),
        ],
    );

    assert_eq!(eval(&relation, &state, &member("t", "a", CType::int())), ExplicitValue::Known(1));
    assert_eq!(eval(&relation, &state, &nested("t", "x", CType::int())), ExplicitValue::Known(2));
    assert_eq!(eval(&relation, &state, &nested("s", "x", CType::int())), ExplicitValue::Known(3));

    let same_pointer = Expression::binary(
        BinaryOperator::Equals,
        nested("s", "p", int_pointer()),
        nested("t", "p", int_pointer()),
    );

    assert_eq!(eval(&relation, &state, &same_pointer), ExplicitValue::Known(1));
    assert!(state.bugs().is_empty());
}

#[test]
fn infeasible_assumptions_have_no_successor() {
    init();

    let (relation, state) = setup(test_options());
    let x = || var("x", CType::int());

    let state = run_single(
        &relation,
        state,
        &[local("x", CType::int()), CfaEdge::assign(x(), int(1))],
    );

    let condition = Expression::binary(BinaryOperator::Equals, x(), int(2));

    assert!(run(&relation, state.clone(), &[CfaEdge::assume(condition.clone(), true)]).is_empty());
    assert_eq!(
        run(&relation, state.clone(), &[CfaEdge::assume(condition, false)]),
        vec![state]
    );
}

#[test]
fn unknown_conditions_keep_both_branches() {
    init();

    let (relation, state) = setup(test_options());
    let x = || var("x", CType::int());

    let state = run_single(
        &relation,
        state,
        &[
            local("x", CType::int()),
            CfaEdge::assign(x(), call("rand", vec![], CType::int())),
        ],
    );

    let condition = Expression::binary(BinaryOperator::LessThan, x(), int(10));

    for truth in [true, false] {
        assert_eq!(
            run(&relation, state.clone(), &[CfaEdge::assume(condition.clone(), truth)]).len(),
            1
        );
    }

    let sum = Expression::binary(BinaryOperator::Plus, x(), int(1));
    let product = Expression::binary(BinaryOperator::Multiply, x(), int(0));

    assert!(eval(&relation, &state, &sum).is_unknown());
    assert!(eval(&relation, &state, &product).is_unknown());
}

#[test]
fn double_free_is_reported() {
    init();

    let (relation, state) = setup(test_options());
    let p = || var("p", int_pointer());

    let state = run_single(
        &relation,
        state,
        &[
            local("p", int_pointer()),
            CfaEdge::assign(p(), malloc(8)),
            free(p()),
        ],
    );

    assert!(!state.has_invalid_free());

    let state = run_single(&relation, state, &[free(p())]);

    assert!(state.has_invalid_free());
    assert!(matches!(
        state.bugs(),
        [Bug::InvalidFree { reason: "object has already been freed", .. }]
    ));
}

#[test]
fn freeing_null_and_stack_memory() {
    init();

    let (relation, state) = setup(test_options());

    let state = run_single(
        &relation,
        state,
        &[
            local("x", CType::int()),
            free(Expression::cast(int(0), void_pointer())),
        ],
    );

    assert!(state.bugs().is_empty(), "free(NULL) has no effect");

    let state = run_single(
        &relation,
        state,
        &[free(Expression::address_of(var("x", CType::int())))],
    );

    assert!(state.has_invalid_free());
}

#[test]
fn use_after_free_is_an_invalid_read() {
    init();

    let (relation, state) = setup(test_options());
    let p = || var("p", int_pointer());

    let state = run_single(
        &relation,
        state,
        &[
            local("p", int_pointer()),
            local("x", CType::int()),
            CfaEdge::assign(p(), malloc(4)),
            free(p()),
            CfaEdge::assign(var("x", CType::int()), Expression::deref(p())),
        ],
    );

    assert!(state.has_invalid_read());
    assert!(!state.has_invalid_write());
}

#[test]
fn writes_past_the_end_are_invalid() {
    init();

    let array = CType::array_of(CType::int(), 4);
    let (relation, state) = setup(test_options());

    let state = run_single(
        &relation,
        state,
        &[
            local("a", array.clone()),
            CfaEdge::assign(subscript("a", &array, 3), int(1)),
        ],
    );

    assert!(state.bugs().is_empty());

    let state = run_single(
        &relation,
        state,
        &[CfaEdge::assign(subscript("a", &array, 4), int(1))],
    );

    assert!(state.has_invalid_write());
    assert_eq!(eval(&relation, &state, &subscript("a", &array, 3)), ExplicitValue::Known(1));
}

#[test]
fn call_and_return_bind_parameters_and_results() {
    init();

    let (relation, state) = setup(test_options());

    let twice = FunctionSignature::new(
        "twice",
        CType::int(),
        vec![Parameter::new("v", CType::int())],
    );
    let call = FunctionCall {
        function: twice,
        arguments: vec![int(21)],
        result: Some(var("y", CType::int())),
    };

    let state = run_single(
        &relation,
        state,
        &[
            local("y", CType::int()),
            CfaEdge::FunctionCall(call.clone()),
        ],
    );

    assert_eq!(state.heap().stack_frames().len(), 2);
    assert_eq!(eval(&relation, &state, &var("v", CType::int())), ExplicitValue::Known(21));

    let doubled = Expression::binary(BinaryOperator::Multiply, var("v", CType::int()), int(2));

    let state = run_single(
        &relation,
        state,
        &[CfaEdge::Return(Some(doubled)), CfaEdge::FunctionReturn(call)],
    );

    assert_eq!(state.heap().stack_frames().len(), 1);
    assert_eq!(eval(&relation, &state, &var("y", CType::int())), ExplicitValue::Known(42));
    assert!(state.heap().object_for_visible_variable("v").is_none());
}

#[test]
fn structs_are_passed_and_returned_by_value() {
    init();

    let (inner, _) = inner_outer();
    let (relation, state) = setup(test_options());

    let identity = FunctionSignature::new(
        "identity",
        inner.clone(),
        vec![Parameter::new("value", inner.clone())],
    );
    let call = FunctionCall {
        function: identity,
        arguments: vec![var("arg", inner.clone())],
        result: Some(var("result", inner.clone())),
    };
    let x = |name: &str| Expression::field(var(name, inner.clone()), "x", CType::int());

    let state = run_single(
        &relation,
        state,
        &[
            local("arg", inner.clone()),
            local("result", inner.clone()),
            CfaEdge::assign(x("arg"), int(5)),
            CfaEdge::FunctionCall(call.clone()),
            CfaEdge::assign(x("value"), int(6)),
            CfaEdge::Return(Some(var("value", inner.clone()))),
            CfaEdge::FunctionReturn(call),
        ],
    );

    assert_eq!(eval(&relation, &state, &x("arg")), ExplicitValue::Known(5));
    assert_eq!(eval(&relation, &state, &x("result")), ExplicitValue::Known(6));
}

#[test]
fn returning_drops_the_last_reference_to_a_block() {
    init();

    let (relation, state) = setup(test_options());

    let f = FunctionSignature::new("f", CType::Void, vec![]);
    let call = FunctionCall {
        function: f,
        arguments: vec![],
        result: None,
    };

    let state = run_single(
        &relation,
        state,
        &[
            CfaEdge::FunctionCall(call.clone()),
            local("p", int_pointer()),
            CfaEdge::assign(var("p", int_pointer()), malloc(16)),
            CfaEdge::Return(None),
            CfaEdge::FunctionReturn(call),
        ],
    );

    assert!(state.has_memory_leaks());
    assert!(state.heap().has_memory_leaks());
    assert!(matches!(state.bugs(), [Bug::MemoryLeak { size: 16, .. }]));
}

#[test]
fn calloc_memory_reads_as_zero() {
    init();

    let (relation, state) = setup(test_options());
    let p = || var("p", int_pointer());
    let element = |index: i64| Expression::subscript(p(), int(index));

    let state = run_single(
        &relation,
        state,
        &[
            local("p", int_pointer()),
            CfaEdge::assign(
                p(),
                Expression::cast(call("calloc", vec![int(4), int(4)], void_pointer()), int_pointer()),
            ),
            CfaEdge::assign(element(1), int(7)),
        ],
    );

    let third = Expression::deref(Expression::binary(BinaryOperator::Plus, p(), int(2)));

    assert_eq!(eval(&relation, &state, &element(0)), ExplicitValue::Known(0));
    assert_eq!(eval(&relation, &state, &element(1)), ExplicitValue::Known(7));
    assert_eq!(eval(&relation, &state, &third), ExplicitValue::Known(0));
    assert_eq!(eval(&relation, &state, &element(3)), ExplicitValue::Known(0));
}

#[test]
fn malloc_memory_is_unknown() {
    init();

    let (relation, state) = setup(test_options());
    let p = || var("p", int_pointer());

    let state = run_single(
        &relation,
        state,
        &[local("p", int_pointer()), CfaEdge::assign(p(), malloc(8))],
    );

    assert!(eval(&relation, &state, &Expression::deref(p())).is_unknown());
}

#[test]
fn memset_writes_bytes() {
    init();

    let buffer = CType::char_array(8);
    let (relation, state) = setup(test_options());
    let byte = |index: i64| subscript("buf", &buffer, index);

    let state = run_single(
        &relation,
        state,
        &[
            local("buf", buffer.clone()),
            call_statement("memset", vec![var("buf", buffer.clone()), int(0), int(8)]),
            call_statement("memset", vec![var("buf", buffer.clone()), int(65), int(2)]),
        ],
    );

    assert_eq!(eval(&relation, &state, &byte(0)), ExplicitValue::Known(65));
    assert_eq!(eval(&relation, &state, &byte(1)), ExplicitValue::Known(65));
    assert_eq!(eval(&relation, &state, &byte(2)), ExplicitValue::Known(0));
    assert_eq!(eval(&relation, &state, &byte(7)), ExplicitValue::Known(0));
    assert!(state.bugs().is_empty());
}

#[test]
fn pointer_arithmetic_moves_by_element_size() {
    init();

    let array = CType::array_of(CType::int(), 4);
    let (relation, state) = setup(test_options());
    let q = || var("q", int_pointer());

    let state = run_single(
        &relation,
        state,
        &[
            local("a", array.clone()),
            local("q", int_pointer()),
            CfaEdge::assign(
                q(),
                Expression::binary(BinaryOperator::Plus, var("a", array.clone()), int(2)),
            ),
            CfaEdge::assign(Expression::deref(q()), int(9)),
        ],
    );

    let distance = Expression::binary(BinaryOperator::Minus, q(), var("a", array.clone()));

    assert_eq!(eval(&relation, &state, &subscript("a", &array, 2)), ExplicitValue::Known(9));
    assert_eq!(eval(&relation, &state, &distance), ExplicitValue::Known(2));
    assert_eq!(target_of(&state, "q", &int_pointer()).map(|a| a.offset), Some(8));
}

#[test]
fn subtracting_a_pointer_from_an_integer_mirrors_the_offset() {
    init();

    let array = CType::array_of(CType::int(), 4);
    let (relation, state) = setup(test_options());
    let p = || var("p", int_pointer());
    let q = || var("q", int_pointer());

    let state = run_single(
        &relation,
        state,
        &[
            local("a", array.clone()),
            local("p", int_pointer()),
            local("q", int_pointer()),
            CfaEdge::assign(
                p(),
                Expression::binary(BinaryOperator::Plus, var("a", array.clone()), int(1)),
            ),
            CfaEdge::assign(q(), Expression::binary(BinaryOperator::Minus, int(3), p())),
        ],
    );

    let a = state.heap().object_for_visible_variable("a");
    let target = target_of(&state, "q", &int_pointer()).unwrap();

    assert_eq!(Some(target.object), a);
    assert_eq!(target.offset, 3 * 4 - 4);
}

#[test]
fn unsigned_arithmetic_wraps_around() {
    init();

    let (relation, state) = setup(test_options());
    let x = || var("x", CType::unsigned_long());

    let state = run_single(
        &relation,
        state,
        &[
            local("x", CType::unsigned_long()),
            CfaEdge::assign(x(), int(0)),
            CfaEdge::assign(x(), Expression::binary(BinaryOperator::Minus, x(), int(1))),
        ],
    );

    let positive = Expression::binary(BinaryOperator::GreaterThan, x(), int(0));

    assert_eq!(eval(&relation, &state, &positive), ExplicitValue::Known(1));
    assert_eq!(
        run(&relation, state.clone(), &[CfaEdge::assume(positive.clone(), true)]),
        vec![state.clone()]
    );
    assert!(run(&relation, state.clone(), &[CfaEdge::assume(positive, false)]).is_empty());

    let minus_two = Expression::cast(int(-2), CType::unsigned_long());
    let half = Expression::binary(BinaryOperator::Divide, minus_two.clone(), int(2));
    let rest = Expression::binary(BinaryOperator::Modulo, x(), int(10));
    let top = Expression::binary(BinaryOperator::ShiftRight, minus_two, int(60));

    assert_eq!(eval(&relation, &state, &half), ExplicitValue::Known(i64::MAX));
    assert_eq!(eval(&relation, &state, &rest), ExplicitValue::Known(5));
    assert_eq!(eval(&relation, &state, &top), ExplicitValue::Known(0xf));
}

#[test]
fn mixed_sign_operands_are_converted_first() {
    init();

    let (relation, state) = setup(test_options());
    let unsigned_zero = Expression::cast(int(0), CType::unsigned_int());
    let unsigned_max = Expression::cast(int(-1), CType::unsigned_int());

    let below_zero = Expression::binary(BinaryOperator::LessThan, int(-1), unsigned_zero);
    let same = Expression::binary(BinaryOperator::Equals, unsigned_max.clone(), int(-1));
    let widened = Expression::binary(
        BinaryOperator::GreaterThan,
        Expression::cast(unsigned_max, CType::long()),
        int(0),
    );
    let out_of_range = Expression::binary(BinaryOperator::ShiftLeft, int(1), int(40));

    assert_eq!(eval(&relation, &state, &below_zero), ExplicitValue::Known(0));
    assert_eq!(eval(&relation, &state, &same), ExplicitValue::Known(1));
    assert_eq!(eval(&relation, &state, &widened), ExplicitValue::Known(1));
    assert!(eval(&relation, &state, &out_of_range).is_unknown());
}

#[test]
fn redeclaring_a_local_with_another_type() {
    init();

    let (relation, state) = setup(test_options());

    let state = run_single(
        &relation,
        state,
        &[local("x", CType::int()), CfaEdge::assign(var("x", CType::int()), int(1))],
    );
    let shadowed = state.heap().object_for_visible_variable("x").unwrap();

    let state = run_single(
        &relation,
        state,
        &[local("x", CType::long()), CfaEdge::assign(var("x", CType::long()), int(2))],
    );
    let x = state.heap().object_for_visible_variable("x").unwrap();

    assert!(state.bugs().is_empty(), "no bugs in {}", state);
    assert_ne!(x, shadowed);
    assert!(!state.heap().smg().contains_object(shadowed));
    assert_eq!(state.object_size(x), Some(8));
    assert_eq!(
        value_of(&state, "x", &CType::long()).and_then(|v| state.explicit_of(v)),
        Some(2)
    );

    let state = run_single(&relation, state, &[local("x", CType::long())]);

    assert_eq!(state.heap().object_for_visible_variable("x"), Some(x));
    assert!(value_of(&state, "x", &CType::long()).is_none());
}

#[test]
fn long_memsets_stay_cheap() {
    init();

    let (relation, state) = setup(SmgOptions {
        memset_byte_limit: 4,
        ..test_options()
    });
    let buffer = CType::char_array(8);
    let byte = |index: i64| subscript("buf", &buffer, index);
    let memset = |count: i64| {
        call_statement("memset", vec![var("buf", buffer.clone()), int(65), int(count)])
    };

    let state = run_single(
        &relation,
        state,
        &[
            local("buf", buffer.clone()),
            call_statement("memset", vec![var("buf", buffer.clone()), int(0), int(8)]),
            memset(8),
        ],
    );

    assert!(eval(&relation, &state, &byte(0)).is_unknown());
    assert!(eval(&relation, &state, &byte(7)).is_unknown());

    let state = run_single(&relation, state, &[memset(4)]);

    assert_eq!(eval(&relation, &state, &byte(3)), ExplicitValue::Known(65));
    assert!(eval(&relation, &state, &byte(4)).is_unknown());
    assert!(state.bugs().is_empty());

    let (relation, state) = setup(test_options());
    let p = || var("p", CType::pointer_to(CType::char()));
    let count = relation.options().memset_byte_limit as i64;

    let state = time("memset of a large block", || {
        run_single(
            &relation,
            state,
            &[
                local("p", CType::pointer_to(CType::char())),
                CfaEdge::assign(p(), malloc(count)),
                call_statement("memset", vec![p(), int(1), int(count)]),
            ],
        )
    });

    let block = target_of(&state, "p", &CType::pointer_to(CType::char())).unwrap();
    let last = Expression::subscript(p(), int(count - 1));

    assert_eq!(
        state.heap().smg().has_value_edges_of(block.object).count() as i64,
        count
    );
    assert_eq!(eval(&relation, &state, &last), ExplicitValue::Known(1));
}

#[test]
fn overflowing_calloc_sizes_are_unknown() {
    init();

    let (relation, state) = setup(test_options());
    let p = || var("p", void_pointer());

    let state = run_single(
        &relation,
        state,
        &[
            local("p", void_pointer()),
            CfaEdge::assign(p(), call("calloc", vec![int(1 << 62), int(8)], void_pointer())),
        ],
    );

    let null = state.heap().smg().null_object();

    assert!(state.heap().heap_objects().iter().all(|o| *o == null));
    assert!(target_of(&state, "p", &void_pointer()).is_none());
    assert!(state.bugs().is_empty());
}

#[test]
fn initializers_fill_arrays_and_zero_globals() {
    init();

    let array = CType::Array {
        element: Box::new(CType::int()),
        length: None,
    };
    let (relation, state) = setup(test_options());

    let elements = Initializer::List(vec![
        Initializer::Expression(int(1)),
        Initializer::Expression(int(2)),
    ]);

    let state = run_single(
        &relation,
        state,
        &[
            CfaEdge::declare(VariableDeclaration::local("a", array.clone()).with_initializer(elements)),
            global("counter", CType::int()),
        ],
    );

    let a = state.heap().object_for_visible_variable("a").unwrap();

    assert_eq!(state.heap().smg().object(a).map(|o| o.size()), Some(8));
    assert_eq!(eval(&relation, &state, &subscript("a", &array, 1)), ExplicitValue::Known(2));
    assert_eq!(eval(&relation, &state, &var("counter", CType::int())), ExplicitValue::Known(0));
}

#[test]
fn external_calls_return_fresh_values() {
    init();

    let (relation, state) = setup(test_options());
    let x = || var("x", CType::int());

    let state = run_single(
        &relation,
        state,
        &[
            local("x", CType::int()),
            CfaEdge::assign(x(), call("getchar", vec![], CType::int())),
        ],
    );

    let value = value_of(&state, "x", &CType::int()).unwrap();

    assert!(!value.is_null());
    assert!(eval(&relation, &state, &x()).is_unknown());
    assert_eq!(
        eval(&relation, &state, &Expression::binary(BinaryOperator::Equals, x(), x())),
        ExplicitValue::Known(1),
        "a value equals itself"
    );
}

#[test]
fn wrong_argument_count_is_an_error() {
    init();

    let (relation, state) = setup(test_options());

    let result = relation.transfer(
        &state,
        &call_statement("malloc", vec![int(1), int(2)]),
        &NeverShutdown,
    );

    assert!(matches!(
        result,
        Err(TransferError::BuiltinArity { expected: 1, found: 2, .. })
    ));

    let f = FunctionSignature::new("f", CType::Void, vec![Parameter::new("a", CType::int())]);
    let result = relation.transfer(
        &state,
        &CfaEdge::FunctionCall(FunctionCall {
            function: f,
            arguments: vec![],
            result: None,
        }),
        &NeverShutdown,
    );

    assert!(matches!(result, Err(TransferError::ParameterMismatch { .. })));
}

#[test]
fn interrupted_transfer_leaves_state_alone() {
    init();

    let (relation, state) = setup(test_options());
    let before = state.clone();

    let result = relation.transfer(&state, &local("x", CType::int()), &AtomicBool::new(true));

    assert!(matches!(result, Err(TransferError::Interrupted)));
    assert_eq!(state, before);
}

#[test]
fn successors_are_independent() {
    init();

    let (relation, state) = setup(test_options());
    let x = || var("x", CType::int());

    let declared = run_single(&relation, state, &[local("x", CType::int())]);
    let first = run_single(&relation, declared.clone(), &[CfaEdge::assign(x(), int(1))]);
    let second = run_single(&relation, declared.clone(), &[CfaEdge::assign(x(), int(2))]);

    assert_eq!(eval(&relation, &first, &x()), ExplicitValue::Known(1));
    assert_eq!(eval(&relation, &second, &x()), ExplicitValue::Known(2));
    assert!(value_of(&declared, "x", &CType::int()).is_none());
}

#[test]
fn every_state_can_be_exported() {
    init();

    with_temp_dir(|dir| {
        let (relation, state) = setup(SmgOptions {
            export_policy: ExportPolicy::Every,
            export_directory: Some(dir.path().to_path_buf()),
            ..test_options()
        });

        run_single(
            &relation,
            state,
            &[local("p", int_pointer()), CfaEdge::assign(var("p", int_pointer()), malloc(4))],
        );

        let dot = fs::read_to_string(dir.path().join("smg-00001.dot")).unwrap();

        assert!(dot.starts_with("digraph smg_00001 {"));
        assert!(dot.contains("subgraph cluster_frame0_main"));
        assert!(dot.contains("malloc_ID1 (4b)"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    });
}

#[test]
fn only_leaking_states_are_exported() {
    init();

    with_temp_dir(|dir| {
        let (relation, state) = setup(SmgOptions {
            export_policy: ExportPolicy::Leaks,
            export_directory: Some(dir.path().to_path_buf()),
            ..test_options()
        });

        let call = FunctionCall {
            function: FunctionSignature::new("f", CType::Void, vec![]),
            arguments: vec![],
            result: None,
        };

        run_single(
            &relation,
            state,
            &[
                CfaEdge::FunctionCall(call.clone()),
                call_statement("malloc", vec![int(4)]),
                CfaEdge::Return(None),
                CfaEdge::FunctionReturn(call),
            ],
        );

        let exported = fs::read_dir(dir.path()).unwrap().count();

        assert_eq!(exported, 1, "only the state after the leak is written");
    });
}

#[test]
fn full_runtime_check_accepts_regular_programs() {
    init();

    let (relation, state) = setup(SmgOptions {
        runtime_check: RuntimeCheck::Full,
        simulate_malloc_failure: true,
        ..test_options()
    });
    let p = || var("p", int_pointer());

    let states = run(
        &relation,
        state,
        &[
            local("p", int_pointer()),
            CfaEdge::assign(p(), malloc(4)),
            CfaEdge::assign(Expression::deref(p()), int(1)),
            free(p()),
        ],
    );

    assert_eq!(states.len(), 2);
    assert!(!states[0].has_invalid_write());
    assert!(states[1].has_invalid_write(), "the failed allocation is NULL");
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn states_can_be_explored_in_parallel() {
    init();

    assert_send_sync::<SmgState>();
    assert_send_sync::<SmgTransferRelation>();

    let (relation, state) = setup(SmgOptions {
        simulate_malloc_failure: true,
        ..test_options()
    });
    let p = || var("p", int_pointer());

    let states = run(
        &relation,
        state,
        &[local("p", int_pointer()), CfaEdge::assign(p(), malloc(4))],
    );

    let freed = states
        .par_iter()
        .map(|s| relation.transfer(s, &free(p()), &NeverShutdown))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(freed.len(), 2);
    assert!(freed.iter().flatten().all(|s| s.bugs().is_empty()));

    let null = value_of(&states[1], "p", &int_pointer());

    assert_eq!(null, Some(SymbolicValue::NULL));
}
