mod utils;

use proptest::prelude::*;
use smg::{
    ast::{BinaryOperator, CType, CfaEdge, Expression},
    config::{RuntimeCheck, SmgOptions},
    smg::consistency::verify_clang_smg,
    transfer::{NeverShutdown, SmgState, SmgTransferRelation},
};
use utils::*;

const POINTERS: usize = 3;

#[derive(Clone, Debug)]
enum Operation {
    Allocate(usize, i64),
    Calloc(usize, i64),
    Free(usize),
    Store(usize, i64),
    Alias(usize, usize),
    Advance(usize, i64),
    Null(usize),
    Load(usize),
}

fn char_pointer() -> CType {
    CType::pointer_to(CType::char())
}

fn pointer(index: usize) -> Expression {
    var(&format!("p{}", index), char_pointer())
}

impl Operation {
    fn edge(&self) -> CfaEdge {
        match *self {
            Operation::Allocate(p, size) => CfaEdge::assign(pointer(p), malloc(size)),
            Operation::Calloc(p, size) => CfaEdge::assign(
                pointer(p),
                call("calloc", vec![Expression::int(size), Expression::int(1)], void_pointer()),
            ),
            Operation::Free(p) => free(pointer(p)),
            Operation::Store(p, value) => {
                CfaEdge::assign(Expression::deref(pointer(p)), Expression::int(value))
            }
            Operation::Alias(p, q) => CfaEdge::assign(pointer(p), pointer(q)),
            Operation::Advance(p, by) => CfaEdge::assign(
                pointer(p),
                Expression::binary(BinaryOperator::Plus, pointer(p), Expression::int(by)),
            ),
            Operation::Null(p) => CfaEdge::assign(
                pointer(p),
                Expression::cast(Expression::int(0), void_pointer()),
            ),
            Operation::Load(p) => CfaEdge::assign(
                var("c", CType::char()),
                Expression::deref(pointer(p)),
            ),
        }
    }
}

fn operation() -> impl Strategy<Value = Operation> {
    let p = 0..POINTERS;

    prop_oneof![
        (p.clone(), 1..16_i64).prop_map(|(p, size)| Operation::Allocate(p, size)),
        (p.clone(), 1..16_i64).prop_map(|(p, size)| Operation::Calloc(p, size)),
        p.clone().prop_map(Operation::Free),
        (p.clone(), -128..128_i64).prop_map(|(p, value)| Operation::Store(p, value)),
        (p.clone(), p.clone()).prop_map(|(p, q)| Operation::Alias(p, q)),
        (p.clone(), -2..4_i64).prop_map(|(p, by)| Operation::Advance(p, by)),
        p.clone().prop_map(Operation::Null),
        p.prop_map(Operation::Load),
    ]
}

fn relation() -> SmgTransferRelation {
    SmgTransferRelation::new(SmgOptions {
        runtime_check: RuntimeCheck::Full,
        simulate_malloc_failure: true,
        ..test_options()
    })
}

/// All states reachable by running `operations` after declaring the pointers.
fn explore(relation: &SmgTransferRelation, operations: &[Operation]) -> Vec<SmgState> {
    let state = relation.initial_state(&main_function()).unwrap();

    let mut edges = vec![local("c", CType::char())];
    for p in 0..POINTERS {
        edges.push(local(&format!("p{}", p), char_pointer()));
        edges.push(Operation::Null(p).edge());
    }
    edges.extend(operations.iter().map(Operation::edge));

    run(relation, state, &edges)
}

fn assert_invariants(state: &SmgState) {
    let heap = state.heap();
    let smg = heap.smg();
    let machine = smg.machine_model();
    let null = smg.null_object();

    let pointers_to_null = smg.points_to_edges().filter(|e| e.object == null).count();
    assert_eq!(pointers_to_null, 1, "only NULL points to the null object");
    assert_eq!(smg.has_value_edges_of(null).count(), 0);

    let stack = heap.stack_objects();
    for object in heap.heap_objects() {
        assert!(!stack.contains(object));
        assert!(!heap.is_global_object(*object));
    }

    for edge in smg.has_value_edges() {
        let size = smg.object(edge.object).map(|o| o.size()).unwrap();
        assert!(edge.end(&machine) <= size, "field {} out of bounds", edge);
    }

    assert!(verify_clang_smg(heap));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_after_every_sequence(operations in prop::collection::vec(operation(), 0..10)) {
        init();

        let relation = relation();

        for state in explore(&relation, &operations) {
            assert_invariants(&state);
        }
    }

    #[test]
    fn successors_do_not_share_memory(
        operations in prop::collection::vec(operation(), 0..8),
        more in prop::collection::vec(operation(), 1..8),
    ) {
        init();

        let relation = relation();

        for state in explore(&relation, &operations) {
            let snapshot = state.clone();

            for operation in &more {
                let mut successors = relation
                    .transfer(&state, &operation.edge(), &NeverShutdown)
                    .unwrap();

                let untouched = successors.clone();

                if successors.len() == 2 {
                    successors[0].heap_mut().drop_stack_frame().unwrap();

                    prop_assert_ne!(&successors[0], &untouched[0]);
                    prop_assert_eq!(&successors[1], &untouched[1]);
                }
            }

            prop_assert_eq!(&state, &snapshot);
        }
    }

    #[test]
    fn pruning_is_idempotent(operations in prop::collection::vec(operation(), 0..10)) {
        init();

        let relation = relation();

        for mut state in explore(&relation, &operations) {
            state.heap_mut().prune_unreachable();
            let pruned = state.clone();

            let leaked = state.heap_mut().prune_unreachable();

            prop_assert!(leaked.is_empty());
            prop_assert_eq!(&state, &pruned);
            assert_invariants(&state);
        }
    }
}
