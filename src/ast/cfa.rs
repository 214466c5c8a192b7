use super::{
    expression::Expression,
    types::{CType, FunctionSignature},
};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Initializer {
    Expression(Expression),
    /// `{ a, b, ... }` for structs and arrays, in member/element order.
    List(Vec<Initializer>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDeclaration {
    pub name: String,
    pub ty: CType,
    pub global: bool,
    pub initializer: Option<Initializer>,
}

impl VariableDeclaration {
    pub fn local(name: &str, ty: CType) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            global: false,
            initializer: None,
        }
    }

    pub fn global(name: &str, ty: CType) -> Self {
        Self {
            global: true,
            ..Self::local(name, ty)
        }
    }

    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = Some(initializer);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Declaration {
    Variable(VariableDeclaration),
    /// Prototypes and definitions do not touch memory.
    Function(FunctionSignature),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Assignment { lhs: Expression, rhs: Expression },
    Expression(Expression),
}

/// Call site information shared by a call edge and its matching return edge.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionCall {
    pub function: FunctionSignature,
    pub arguments: Vec<Expression>,
    /// Left-hand side receiving the result (`x = f(...)`), if any.
    pub result: Option<Expression>,
}

/// Edges of a control flow automaton, the unit of work of the transfer relation.
#[derive(Clone, Debug, PartialEq)]
pub enum CfaEdge {
    Blank,
    Declaration(Declaration),
    Statement(Statement),
    Assume { condition: Expression, truth: bool },
    FunctionCall(FunctionCall),
    FunctionReturn(FunctionCall),
    Return(Option<Expression>),
}

impl CfaEdge {
    pub fn assign(lhs: Expression, rhs: Expression) -> Self {
        CfaEdge::Statement(Statement::Assignment { lhs, rhs })
    }

    pub fn declare(declaration: VariableDeclaration) -> Self {
        CfaEdge::Declaration(Declaration::Variable(declaration))
    }

    pub fn assume(condition: Expression, truth: bool) -> Self {
        CfaEdge::Assume { condition, truth }
    }
}

impl fmt::Display for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Initializer::Expression(e) => write!(f, "{}", e),
            Initializer::List(elements) => {
                let elements = elements
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");

                write!(f, "{{ {} }}", elements)
            }
        }
    }
}

impl fmt::Display for CfaEdge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CfaEdge::Blank => write!(f, "<blank>"),
            CfaEdge::Declaration(Declaration::Variable(v)) => {
                write!(f, "{}{} {}", if v.global { "global " } else { "" }, v.ty, v.name)?;
                if let Some(initializer) = &v.initializer {
                    write!(f, " = {}", initializer)?;
                }
                write!(f, ";")
            }
            CfaEdge::Declaration(Declaration::Function(signature)) => write!(f, "{};", signature),
            CfaEdge::Statement(Statement::Assignment { lhs, rhs }) => {
                write!(f, "{} = {};", lhs, rhs)
            }
            CfaEdge::Statement(Statement::Expression(e)) => write!(f, "{};", e),
            CfaEdge::Assume { condition, truth } => {
                write!(f, "[{}{}]", if *truth { "" } else { "!" }, condition)
            }
            CfaEdge::FunctionCall(call) => write!(f, "call {}", call.function.name),
            CfaEdge::FunctionReturn(call) => write!(f, "return from {}", call.function.name),
            CfaEdge::Return(Some(e)) => write!(f, "return {};", e),
            CfaEdge::Return(None) => write!(f, "return;"),
        }
    }
}
