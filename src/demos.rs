//! Small C programs, given as control flow automata, which the `run`
//! subcommand analyzes.

use smg::ast::{
    BinaryOperator, CType, CfaEdge, CompositeKind, CompositeType, Expression, FunctionCall,
    FunctionSignature, Initializer, Member, Parameter, Statement, VariableDeclaration,
};

pub type Location = usize;

pub struct Program {
    pub name: &'static str,
    pub description: &'static str,
    pub main: FunctionSignature,
    edges: Vec<(Location, CfaEdge, Location)>,
}

impl Program {
    pub const ENTRY: Location = 0;

    pub fn leaving(&self, location: Location) -> impl Iterator<Item = (&CfaEdge, Location)> {
        self.edges
            .iter()
            .filter(move |(from, _, _)| *from == location)
            .map(|(_, edge, to)| (edge, *to))
    }

    pub fn is_exit(&self, location: Location) -> bool {
        self.leaving(location).next().is_none()
    }
}

pub const PROGRAMS: [&str; 7] = [
    "allocate-free",
    "leak",
    "double-free",
    "use-after-free",
    "out-of-bounds",
    "linked-list",
    "struct-return",
];

pub fn program(name: &str) -> Option<Program> {
    let program = match name {
        "allocate-free" => allocate_free(),
        "leak" => leak(),
        "double-free" => double_free(),
        "use-after-free" => use_after_free(),
        "out-of-bounds" => out_of_bounds(),
        "linked-list" => linked_list(),
        "struct-return" => struct_return(),
        _ => return None,
    };

    Some(program)
}

struct Builder {
    edges: Vec<(Location, CfaEdge, Location)>,
    current: Location,
    next: Location,
}

impl Builder {
    fn new() -> Self {
        Self {
            edges: Vec::new(),
            current: Program::ENTRY,
            next: Program::ENTRY + 1,
        }
    }

    fn fresh(&mut self) -> Location {
        self.next += 1;
        self.next - 1
    }

    fn then(mut self, edge: CfaEdge) -> Self {
        let to = self.fresh();
        self.edges.push((self.current, edge, to));
        self.current = to;
        self
    }

    /// `if (condition) { then } else { otherwise }`
    fn branch(mut self, condition: Expression, then: Vec<CfaEdge>, otherwise: Vec<CfaEdge>) -> Self {
        let join = self.fresh();

        for (truth, body) in [(true, then), (false, otherwise)] {
            let mut from = self.current;
            let mut edges = vec![CfaEdge::assume(condition.clone(), truth)];
            edges.extend(body);

            let last = edges.len() - 1;

            for (index, edge) in edges.into_iter().enumerate() {
                let to = if index == last { join } else { self.fresh() };
                self.edges.push((from, edge, to));
                from = to;
            }
        }

        self.current = join;
        self
    }

    /// Inlines a call of `function` whose body is `body`.
    fn call(
        self,
        function: &FunctionSignature,
        arguments: Vec<Expression>,
        result: Option<Expression>,
        body: Vec<CfaEdge>,
    ) -> Self {
        let call = FunctionCall {
            function: function.clone(),
            arguments,
            result,
        };

        let builder = body
            .into_iter()
            .fold(self.then(CfaEdge::FunctionCall(call.clone())), Builder::then);

        builder.then(CfaEdge::FunctionReturn(call))
    }

    fn build(self, name: &'static str, description: &'static str) -> Program {
        Program {
            name,
            description,
            main: FunctionSignature::new("main", CType::int(), vec![]),
            edges: self.edges,
        }
    }
}

fn int_pointer() -> CType {
    CType::pointer_to(CType::int())
}

fn var(name: &str, ty: CType) -> Expression {
    Expression::id(name, ty)
}

fn null() -> Expression {
    Expression::cast(Expression::int(0), CType::pointer_to(CType::Void))
}

fn malloc(size: Expression, ty: CType) -> Expression {
    let call = Expression::call(
        "malloc",
        vec![size],
        CType::pointer_to(CType::Void),
    );

    Expression::cast(call, ty)
}

fn free(pointer: Expression) -> CfaEdge {
    CfaEdge::Statement(Statement::Expression(Expression::call(
        "free",
        vec![pointer],
        CType::Void,
    )))
}

fn local(name: &str, ty: CType) -> CfaEdge {
    CfaEdge::declare(VariableDeclaration::local(name, ty))
}

fn allocate_free() -> Program {
    let p = || var("p", int_pointer());

    Builder::new()
        .then(local("p", int_pointer()))
        .then(CfaEdge::assign(
            p(),
            malloc(Expression::size_of_type(CType::int()), int_pointer()),
        ))
        .branch(
            Expression::binary(BinaryOperator::NotEquals, p(), null()),
            vec![
                CfaEdge::assign(Expression::deref(p()), Expression::int(42)),
                free(p()),
            ],
            vec![],
        )
        .then(CfaEdge::Return(Some(Expression::int(0))))
        .build("allocate-free", "allocate a block, guard against NULL and release it")
}

fn leak() -> Program {
    let f = FunctionSignature::new("f", CType::Void, vec![]);
    let p = var("p", int_pointer());

    let body = vec![
        local("p", int_pointer()),
        CfaEdge::assign(
            p,
            malloc(Expression::size_of_type(CType::int()), int_pointer()),
        ),
        CfaEdge::Return(None),
    ];

    Builder::new()
        .call(&f, vec![], None, body)
        .then(CfaEdge::Return(Some(Expression::int(0))))
        .build("leak", "a block allocated in a callee is lost when it returns")
}

fn double_free() -> Program {
    let p = || var("p", int_pointer());

    Builder::new()
        .then(local("p", int_pointer()))
        .then(CfaEdge::assign(p(), malloc(Expression::int(8), int_pointer())))
        .then(free(p()))
        .then(free(p()))
        .then(CfaEdge::Return(Some(Expression::int(0))))
        .build("double-free", "the same block is released twice")
}

fn use_after_free() -> Program {
    let p = || var("p", int_pointer());

    Builder::new()
        .then(local("p", int_pointer()))
        .then(local("x", CType::int()))
        .then(CfaEdge::assign(p(), malloc(Expression::int(4), int_pointer())))
        .then(free(p()))
        .then(CfaEdge::assign(var("x", CType::int()), Expression::deref(p())))
        .then(CfaEdge::Return(Some(var("x", CType::int()))))
        .build("use-after-free", "a released block is read")
}

fn out_of_bounds() -> Program {
    let array = CType::array_of(CType::int(), 4);
    let a = || var("a", array.clone());
    let elements = (1..=4)
        .map(|v| Initializer::Expression(Expression::int(v)))
        .collect();

    Builder::new()
        .then(CfaEdge::declare(
            VariableDeclaration::local("a", array.clone()).with_initializer(Initializer::List(elements)),
        ))
        .then(CfaEdge::assign(
            Expression::subscript(a(), Expression::int(4)),
            Expression::int(5),
        ))
        .then(CfaEdge::Return(Some(Expression::subscript(a(), Expression::int(0)))))
        .build("out-of-bounds", "an array on the stack is written past its end")
}

fn linked_list() -> Program {
    let node = CompositeType::declare(CompositeKind::Struct, "node");
    let node_type = CType::Composite(node.clone());
    let node_pointer = CType::pointer_to(node_type.clone());

    node.define(vec![
        Member::new("data", CType::int()),
        Member::new("next", node_pointer.clone()),
    ]);

    let head = || var("head", node_pointer.clone());
    let next = |owner: Expression| Expression::arrow(owner, "next", node_pointer.clone());
    let data = |owner: Expression| Expression::arrow(owner, "data", CType::int());
    let allocate = || malloc(Expression::size_of_type(node_type.clone()), node_pointer.clone());

    Builder::new()
        .then(local("head", node_pointer.clone()))
        .then(CfaEdge::assign(head(), allocate()))
        .then(CfaEdge::assign(data(head()), Expression::int(1)))
        .then(CfaEdge::assign(next(head()), allocate()))
        .then(CfaEdge::assign(data(next(head())), Expression::int(2)))
        .then(CfaEdge::assign(next(next(head())), null()))
        .then(free(next(head())))
        .then(free(head()))
        .then(CfaEdge::Return(Some(Expression::int(0))))
        .build("linked-list", "build a list of two nodes and release it")
}

fn struct_return() -> Program {
    let pair = CType::Composite(CompositeType::new(
        CompositeKind::Struct,
        "pair",
        vec![
            Member::new("first", CType::int()),
            Member::new("second", int_pointer()),
        ],
    ));

    let make = FunctionSignature::new(
        "make_pair",
        pair.clone(),
        vec![Parameter::new("value", CType::int())],
    );

    let r = || var("r", pair.clone());
    let q = || var("q", pair.clone());

    let body = vec![
        local("r", pair.clone()),
        CfaEdge::assign(
            Expression::field(r(), "first", CType::int()),
            var("value", CType::int()),
        ),
        CfaEdge::assign(
            Expression::field(r(), "second", int_pointer()),
            malloc(Expression::int(4), int_pointer()),
        ),
        CfaEdge::Return(Some(r())),
    ];

    Builder::new()
        .then(local("q", pair.clone()))
        .call(&make, vec![Expression::int(7)], Some(q()), body)
        .then(free(Expression::field(q(), "second", int_pointer())))
        .then(CfaEdge::Return(Some(Expression::field(q(), "first", CType::int()))))
        .build("struct-return", "a struct holding a heap pointer is returned by value")
}
